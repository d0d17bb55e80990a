//! bacstack integration test harness.
//!
//! Every test builds its own virtual network and attaches applications to
//! it, so tests share nothing and can run in parallel:
//!
//!   cargo test --test integration
//!
//! Applications are driven the way a real caller would: through the shared
//! handle, never holding its lock across an await on the network.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use bacstack_core::{Address, LocalDevice};
use bacstack_services::vlan::{self, Network, SharedApplication};
use bacstack_services::{
    ApplicationBuilder, ApplicationCore, Stack, TraceLayer, WhoHasIHaveServices, WhoIsIAmServices,
};

mod discovery;
mod requests;

// ── Harness ───────────────────────────────────────────────────────────────────

/// One-byte local station address.
pub fn station(mac: u8) -> Address {
    Address::local(&[mac])
}

/// Attach a device with the discovery capabilities.
pub fn device_app(network: &Arc<Network>, mac: u8, instance: u32) -> SharedApplication {
    device_app_with(network, mac, instance, |builder| builder)
}

/// Attach a device with the discovery capabilities plus whatever `extra` adds.
pub fn device_app_with(
    network: &Arc<Network>,
    mac: u8,
    instance: u32,
    extra: impl FnOnce(ApplicationBuilder) -> ApplicationBuilder,
) -> SharedApplication {
    let stack = Stack::new().push(TraceLayer::new(format!("device-{instance}")));
    let (app, _task) = vlan::start(network, station(mac), stack, |builder| {
        extra(
            builder
                .local_device(LocalDevice::new(format!("device-{instance}"), instance, 999))
                .capability(WhoIsIAmServices)
                .capability(WhoHasIHaveServices),
        )
    })
    .expect("application should start");
    app
}

/// Poll `check` against the application until it holds.
pub async fn wait_for(
    app: &SharedApplication,
    what: &str,
    check: impl Fn(&ApplicationCore) -> bool,
) -> Result<()> {
    for _ in 0..200 {
        if check(&*app.lock().await) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    bail!("timed out waiting for {what}")
}

/// Give in-flight deliveries a chance to land.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// A freshly attached application knows nobody and has nothing in flight.
#[tokio::test]
async fn test_fresh_application_is_empty() {
    let network = Network::new();
    let app = device_app(&network, 1, 1);
    let app = app.lock().await;

    assert!(app.device_info().is_empty());
    assert_eq!(app.controller_count(), 0);
    assert_eq!(app.object_list().len(), 1);
    assert_eq!(network.len(), 1);
}
