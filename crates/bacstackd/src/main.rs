//! bacstackd: runs the application layer on a virtual network.
//!
//! Attaches the configured local device and a set of simulated peers,
//! discovers them with Who-Is, issues one confirmed request, and prints what
//! the device information cache learned.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;

use bacstack_core::config::StackConfig;
use bacstack_core::object::MAX_INSTANCE;
use bacstack_core::{
    Address, Apdu, ApduBody, ConfirmedServiceChoice, LocalDevice, ObjectIdentifier, ObjectType,
    ServiceFailure, UnconfirmedRequest, UnconfirmedServiceChoice, WhoHasObject,
};
use bacstack_services::vlan::{self, Network, SharedApplication};
use bacstack_services::{
    ApplicationCore, BasicObject, DeviceInfo, Outcome, Stack, TraceLayer, WhoHasIHaveServices,
    WhoIsIAmServices,
};

/// Time allowed for broadcast replies to arrive.
const DISCOVERY_WINDOW: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = StackConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = StackConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        StackConfig::default()
    });
    let local_address = config.local_address().context("bad network.address")?;
    tracing::info!(
        address = %local_address,
        device = %config.local_device().object_identifier,
        peers = config.network.simulated_peers,
        "bacstackd starting"
    );

    let network = Network::new();

    // Local application
    let (local, _local_task) = vlan::start(
        &network,
        local_address.clone(),
        Stack::new().push(TraceLayer::new("local")),
        |builder| {
            builder
                .local_device(config.local_device())
                .capability(WhoIsIAmServices)
                .capability(WhoHasIHaveServices)
                .handler_fn(UnconfirmedServiceChoice::IHave, log_i_have)
        },
    )
    .context("failed to start local application")?;

    // Simulated peers
    let mut peers = Vec::new();
    for index in 0..config.network.simulated_peers {
        let address = peer_address(index);
        if address == local_address {
            tracing::warn!(%address, "simulated peer collides with local address, skipped");
            continue;
        }
        let (peer, _task) = start_peer(&network, address.clone(), &config, index)?;
        peers.push((address, peer));
    }

    // Discovery
    {
        let mut app = local.lock().await;
        WhoIsIAmServices::who_is(&mut app, None, None, None)?;
        WhoHasIHaveServices::who_has(
            &mut app,
            None,
            None,
            WhoHasObject::Name(peer_object_name(0)),
            None,
        )?;
    }
    tokio::time::sleep(DISCOVERY_WINDOW).await;
    {
        let app = local.lock().await;
        tracing::info!(
            devices = app.device_info().len(),
            services_supported = %app.services_supported(),
            "discovery finished"
        );
        for (_, info) in app.device_info().iter() {
            tracing::info!(
                instance = ?info.device_instance,
                address = %info.address,
                vendor_id = ?info.vendor_id,
                "device discovered"
            );
        }
    }

    // One confirmed request. The peers host no ReadProperty handler, so the
    // answer is a Reject.
    if let Some((address, _)) = peers.first() {
        confirmed_round_trip(&local, address, config.request_timeout()).await?;
    }

    let app = local.lock().await;
    let cache: Vec<&DeviceInfo> = app.device_info().iter().map(|(_, info)| info).collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&cache).context("failed to serialize device cache")?
    );
    Ok(())
}

fn peer_address(index: u32) -> Address {
    Address::local(&(0xB000_0000 | index).to_be_bytes())
}

fn peer_object_name(index: u32) -> String {
    format!("peer-{index}-zone-temp")
}

/// Device instance of the `index`th simulated peer.
fn peer_instance(first: u32, index: u32) -> Result<u32> {
    first
        .checked_add(index)
        .filter(|instance| *instance < MAX_INSTANCE)
        .with_context(|| {
            format!("peer {index} instance out of range (first_peer_instance = {first})")
        })
}

fn start_peer(
    network: &Arc<Network>,
    address: Address,
    config: &StackConfig,
    index: u32,
) -> Result<(SharedApplication, tokio::task::JoinHandle<()>)> {
    let instance = peer_instance(config.network.first_peer_instance, index)?;
    let mut device = LocalDevice::new(format!("peer-{index}"), instance, config.device.vendor_id);
    device.max_apdu_length_accepted = 480;

    let object = BasicObject::new(
        peer_object_name(index),
        ObjectIdentifier::new(ObjectType::AnalogInput, 1),
    );
    vlan::start(network, address.clone(), Stack::new(), |builder| {
        builder
            .local_device(device)
            .object(Arc::new(object))
            .capability(WhoIsIAmServices)
            .capability(WhoHasIHaveServices)
    })
    .with_context(|| format!("failed to start peer {address}"))
}

async fn confirmed_round_trip(
    local: &SharedApplication,
    destination: &Address,
    timeout: Duration,
) -> Result<()> {
    let pending = local
        .lock()
        .await
        .request(Apdu::confirmed(
            destination.clone(),
            ConfirmedServiceChoice::ReadProperty,
            Bytes::from_static(b"\x0c\x02\x00\x00\x01\x19\x4d"),
        ))?
        .context("confirmed request returned no handle")?;

    match tokio::time::timeout(timeout, pending.wait()).await {
        Ok(Outcome::Success(ack)) => {
            tracing::info!(%destination, kind = %ack.kind(), "request acknowledged")
        }
        Ok(Outcome::Failure(response)) => {
            tracing::info!(%destination, response = ?response.body, "request refused")
        }
        Ok(Outcome::TimedOut) => tracing::warn!(%destination, "request expired"),
        Err(_) => {
            local.lock().await.expire_active(destination);
            tracing::warn!(%destination, ?timeout, "no answer, request expired");
        }
    }
    Ok(())
}

fn log_i_have(_app: &mut ApplicationCore, apdu: &Apdu) -> Result<(), ServiceFailure> {
    if let ApduBody::UnconfirmedRequest(UnconfirmedRequest::IHave(i_have)) = &apdu.body {
        tracing::info!(
            device = %i_have.device_identifier,
            object = %i_have.object_identifier,
            name = %i_have.object_name,
            "object found"
        );
    }
    Ok(())
}
