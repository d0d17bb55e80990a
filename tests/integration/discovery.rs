use std::sync::{Arc, Mutex};

use bacstack_core::{
    ApduBody, IHaveRequest, ObjectIdentifier, ObjectType, UnconfirmedRequest,
    UnconfirmedServiceChoice, WhoHasObject,
};
use bacstack_services::vlan::Network;
use bacstack_services::{BasicObject, WhoHasIHaveServices, WhoIsIAmServices};

use crate::*;

/// A global Who-Is fills the caller's cache with every device on the network.
#[tokio::test]
async fn test_who_is_discovers_every_device() -> Result<()> {
    let network = Network::new();
    let client = device_app(&network, 1, 1);
    let devices: Vec<_> = (0..3u8)
        .map(|i| device_app(&network, 10 + i, 100 + u32::from(i)))
        .collect();

    WhoIsIAmServices::who_is(&mut *client.lock().await, None, None, None)?;
    wait_for(&client, "three devices", |app| app.device_info().len() == 3).await?;

    let app = client.lock().await;
    for i in 0..3u8 {
        let info = app
            .device_info()
            .lookup(100 + u32::from(i))
            .expect("device should be cached");
        assert_eq!(info.address, station(10 + i));
        assert_eq!(info.vendor_id, Some(999));
        assert!(app.device_info().has(&station(10 + i)));
    }
    assert_eq!(app.controller_count(), 0);

    // I-Am went back to the requester only
    for device in &devices {
        assert!(device.lock().await.device_info().is_empty());
    }
    Ok(())
}

/// Only devices inside the Who-Is limits answer.
#[tokio::test]
async fn test_who_is_limits_select_devices() -> Result<()> {
    let network = Network::new();
    let client = device_app(&network, 1, 1);
    let _low = device_app(&network, 2, 50);
    let _mid = device_app(&network, 3, 150);
    let _high = device_app(&network, 4, 250);

    WhoIsIAmServices::who_is(&mut *client.lock().await, Some(100), Some(200), None)?;
    wait_for(&client, "device 150", |app| app.device_info().has(150u32)).await?;
    settle().await;

    let app = client.lock().await;
    assert_eq!(app.device_info().len(), 1);
    assert!(!app.device_info().has(50u32));
    assert!(!app.device_info().has(250u32));
    Ok(())
}

/// A device that reappears at another address is re-keyed, not duplicated.
#[tokio::test]
async fn test_moved_device_is_rekeyed() -> Result<()> {
    let network = Network::new();
    let client = device_app(&network, 1, 1);

    let original = device_app(&network, 2, 77);
    WhoIsIAmServices::i_am(&mut *original.lock().await, None)?;
    wait_for(&client, "device 77", |app| app.device_info().has(77u32)).await?;

    network.detach(&station(2));
    let moved = device_app(&network, 5, 77);
    WhoIsIAmServices::i_am(&mut *moved.lock().await, None)?;
    wait_for(&client, "device 77 at its new address", |app| {
        app.device_info()
            .lookup(77u32)
            .is_some_and(|info| info.address == station(5))
    })
    .await?;

    let app = client.lock().await;
    assert_eq!(app.device_info().len(), 1);
    assert!(!app.device_info().has(&station(2)));
    assert!(app.device_info().has(&station(5)));
    Ok(())
}

/// Who-Has by name and by identifier reaches the hosting device only.
#[tokio::test]
async fn test_who_has_finds_hosted_object() -> Result<()> {
    let network = Network::new();
    let heard: Arc<Mutex<Vec<IHaveRequest>>> = Arc::default();

    let log = heard.clone();
    let client = device_app_with(&network, 1, 1, move |builder| {
        builder.handler_fn(UnconfirmedServiceChoice::IHave, move |_, apdu| {
            if let ApduBody::UnconfirmedRequest(UnconfirmedRequest::IHave(i_have)) = &apdu.body {
                log.lock().unwrap().push(i_have.clone());
            }
            Ok(())
        })
    });

    let sensor = ObjectIdentifier::new(ObjectType::AnalogInput, 7);
    let _host = device_app_with(&network, 2, 200, |builder| {
        builder.object(Arc::new(BasicObject::new("boiler-supply", sensor)))
    });
    let _other = device_app(&network, 3, 300);

    WhoHasIHaveServices::who_has(
        &mut *client.lock().await,
        None,
        None,
        WhoHasObject::Name("boiler-supply".to_string()),
        None,
    )?;
    WhoHasIHaveServices::who_has(
        &mut *client.lock().await,
        Some(200),
        Some(200),
        WhoHasObject::Identifier(sensor),
        None,
    )?;
    settle().await;

    let heard = heard.lock().unwrap();
    assert_eq!(heard.len(), 2);
    for i_have in heard.iter() {
        assert_eq!(i_have.device_identifier, ObjectIdentifier::device(200));
        assert_eq!(i_have.object_identifier, sensor);
        assert_eq!(i_have.object_name, "boiler-supply");
    }
    Ok(())
}
