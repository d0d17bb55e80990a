use std::sync::{Arc, Mutex};

use bytes::Bytes;

use bacstack_core::{
    Apdu, ApduBody, ConfirmedServiceChoice, ErrorClass, ErrorCode, RejectReason, ServiceFailure,
};
use bacstack_services::vlan::Network;
use bacstack_services::{Outcome, PendingRequest};

use crate::*;

const SERVER: u8 = 2;

fn read_property(tag: u8) -> Apdu {
    Apdu::confirmed(
        station(SERVER),
        ConfirmedServiceChoice::ReadProperty,
        Bytes::copy_from_slice(&[tag]),
    )
}

async fn send(client: &SharedApplication, apdu: Apdu) -> Result<PendingRequest> {
    let pending = client
        .lock()
        .await
        .request(apdu)?
        .expect("confirmed request returns a handle");
    Ok(pending)
}

async fn outcome(pending: &PendingRequest) -> Outcome {
    tokio::time::timeout(Duration::from_secs(2), pending.wait())
        .await
        .expect("request was never resolved")
}

/// A server that answers every ReadProperty with the request's data.
fn echo_server(network: &Arc<Network>) -> SharedApplication {
    device_app_with(network, SERVER, 2, |builder| {
        builder.handler_fn(ConfirmedServiceChoice::ReadProperty, |app, apdu| {
            let ApduBody::ConfirmedRequest(request) = &apdu.body else {
                return Err(ServiceFailure::Reject(RejectReason::Other));
            };
            app.response(Apdu::complex_ack(
                apdu,
                ConfirmedServiceChoice::ReadProperty,
                request.data.clone(),
            ));
            Ok(())
        })
    })
}

/// A server whose ReadProperty handler fails with `failure`.
fn failing_server(network: &Arc<Network>, failure: fn() -> ServiceFailure) -> SharedApplication {
    device_app_with(network, SERVER, 2, move |builder| {
        builder.handler_fn(ConfirmedServiceChoice::ReadProperty, move |_, _| Err(failure()))
    })
}

/// A server that records ReadProperty requests and never answers them.
fn silent_server(network: &Arc<Network>, seen: Arc<Mutex<Vec<Apdu>>>) -> SharedApplication {
    device_app_with(network, SERVER, 2, move |builder| {
        builder.handler_fn(ConfirmedServiceChoice::ReadProperty, move |_, apdu| {
            seen.lock().unwrap().push(apdu.clone());
            Ok(())
        })
    })
}

fn tag(apdu: &Apdu) -> u8 {
    match &apdu.body {
        ApduBody::ConfirmedRequest(request) => request.data[0],
        other => panic!("expected a confirmed request, got {other:?}"),
    }
}

#[tokio::test]
async fn test_acknowledged_request_succeeds() -> Result<()> {
    let network = Network::new();
    let client = device_app(&network, 1, 1);
    let _server = echo_server(&network);

    let pending = send(&client, read_property(42)).await?;
    match outcome(&pending).await {
        Outcome::Success(ack) => {
            assert_eq!(ack.source, station(SERVER));
            assert_eq!(
                ack.body,
                ApduBody::ComplexAck {
                    service: ConfirmedServiceChoice::ReadProperty,
                    data: Bytes::from_static(&[42]),
                }
            );
        }
        other => panic!("expected success, got {other:?}"),
    }

    wait_for(&client, "controller removal", |app| app.controller_count() == 0).await?;
    Ok(())
}

#[tokio::test]
async fn test_unsupported_service_is_rejected() -> Result<()> {
    let network = Network::new();
    let client = device_app(&network, 1, 1);
    let _server = device_app(&network, SERVER, 2);

    let pending = send(&client, read_property(1)).await?;
    match outcome(&pending).await {
        Outcome::Failure(response) => assert_eq!(
            response.body,
            ApduBody::Reject {
                reason: RejectReason::UnrecognizedService
            }
        ),
        other => panic!("expected reject, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_execution_failure_reaches_client_as_error() -> Result<()> {
    let network = Network::new();
    let client = device_app(&network, 1, 1);
    let _server = failing_server(&network, || {
        ServiceFailure::execution(ErrorClass::Property, ErrorCode::UnknownProperty)
    });

    let pending = send(&client, read_property(1)).await?;
    let Outcome::Failure(response) = outcome(&pending).await else {
        panic!("expected an error response");
    };
    assert_eq!(
        response.body,
        ApduBody::Error {
            service: ConfirmedServiceChoice::ReadProperty,
            class: ErrorClass::Property,
            code: ErrorCode::UnknownProperty,
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_handler_fault_reaches_client_as_operational_problem() -> Result<()> {
    let network = Network::new();
    let client = device_app(&network, 1, 1);
    let _server = failing_server(&network, || {
        ServiceFailure::Other(anyhow::anyhow!("sensor bus offline"))
    });

    let pending = send(&client, read_property(1)).await?;
    let Outcome::Failure(response) = outcome(&pending).await else {
        panic!("expected an error response");
    };
    assert!(matches!(
        response.body,
        ApduBody::Error {
            class: ErrorClass::Device,
            code: ErrorCode::OperationalProblem,
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn test_handler_reject_reaches_client() -> Result<()> {
    let network = Network::new();
    let client = device_app(&network, 1, 1);
    let _server = failing_server(&network, || {
        ServiceFailure::Reject(RejectReason::ParameterOutOfRange)
    });

    let pending = send(&client, read_property(1)).await?;
    let Outcome::Failure(response) = outcome(&pending).await else {
        panic!("expected a reject");
    };
    assert_eq!(
        response.body,
        ApduBody::Reject {
            reason: RejectReason::ParameterOutOfRange
        }
    );
    Ok(())
}

/// Requests to one destination go out one at a time, in submission order.
#[tokio::test]
async fn test_requests_are_serialized_per_destination() -> Result<()> {
    let network = Network::new();
    let client = device_app(&network, 1, 1);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let _server = silent_server(&network, seen.clone());

    let mut pending = Vec::new();
    for i in 1..=3 {
        pending.push(send(&client, read_property(i)).await?);
    }
    settle().await;
    assert_eq!(seen.lock().unwrap().len(), 1, "only the first request is in flight");
    assert_eq!(client.lock().await.queued_for(&station(SERVER)), 2);

    // the caller owns timeouts: expiring the active request releases the next
    for expected in 2..=3u8 {
        client.lock().await.expire_active(&station(SERVER));
        settle().await;
        assert_eq!(tag(seen.lock().unwrap().last().unwrap()), expected);
    }
    client.lock().await.expire_active(&station(SERVER));

    let order: Vec<u8> = seen.lock().unwrap().iter().map(tag).collect();
    assert_eq!(order, vec![1, 2, 3]);
    for request in &pending {
        assert_eq!(request.outcome(), Some(Outcome::TimedOut));
    }
    assert_eq!(client.lock().await.controller_count(), 0);
    Ok(())
}

/// An answer that arrives after its request expired is dropped quietly.
#[tokio::test]
async fn test_late_answer_is_dropped() -> Result<()> {
    let network = Network::new();
    let client = device_app(&network, 1, 1);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let server = silent_server(&network, seen.clone());

    let pending = send(&client, read_property(9)).await?;
    settle().await;
    let expired = client
        .lock()
        .await
        .expire_active(&station(SERVER))
        .expect("request should be active");
    assert_eq!(expired.outcome(), Some(Outcome::TimedOut));

    let request = seen.lock().unwrap()[0].clone();
    server.lock().await.response(Apdu::simple_ack(
        &request,
        ConfirmedServiceChoice::ReadProperty,
    ));
    settle().await;

    assert_eq!(pending.outcome(), Some(Outcome::TimedOut));
    assert_eq!(client.lock().await.controller_count(), 0);

    // the destination is immediately usable again
    let again = send(&client, read_property(10)).await?;
    assert!(client.lock().await.has_controller(&station(SERVER)));
    client.lock().await.expire_active(&station(SERVER));
    assert_eq!(again.outcome(), Some(Outcome::TimedOut));
    Ok(())
}

/// An ack lost on the wire leaves the request open until the caller expires
/// it; the destination then works normally once the network recovers.
#[tokio::test]
async fn test_lost_ack_is_recovered_by_expiry() -> Result<()> {
    let network = Network::new();
    let client = device_app(&network, 1, 1);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let server = device_app_with(&network, SERVER, 2, move |builder| {
        builder.handler_fn(ConfirmedServiceChoice::ReadProperty, move |app, apdu| {
            log.lock().unwrap().push(apdu.clone());
            app.response(Apdu::simple_ack(apdu, ConfirmedServiceChoice::ReadProperty));
            Ok(())
        })
    });

    // the request reaches the server's inbox before the network turns lossy,
    // and the server cannot answer until its lock is released
    let pending = {
        let _held = server.lock().await;
        let pending = send(&client, read_property(5)).await?;
        network.set_drop_rate(1.0);
        pending
    };
    for _ in 0..200 {
        if !seen.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    settle().await;
    assert_eq!(seen.lock().unwrap().len(), 1, "server handled the request");
    assert_eq!(pending.outcome(), None, "ack was lost");
    assert!(client.lock().await.has_controller(&station(SERVER)));

    let expired = client.lock().await.expire_active(&station(SERVER));
    assert!(expired.is_some());
    assert_eq!(pending.outcome(), Some(Outcome::TimedOut));
    assert_eq!(client.lock().await.controller_count(), 0);

    network.set_drop_rate(0.0);
    let again = send(&client, read_property(6)).await?;
    assert!(outcome(&again).await.is_success());
    Ok(())
}
