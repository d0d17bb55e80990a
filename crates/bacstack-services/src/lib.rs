//! bacstack-services: the application layer.
//! Device information cache, per-destination request serialization, the
//! application core with its service table and object registry, layer
//! composition, discovery capabilities, and an in-memory network.

pub mod application;
pub mod capability;
pub mod controller;
pub mod device_info;
pub mod objects;
pub mod service;
pub mod stack;
pub mod vlan;

#[cfg(test)]
mod testing;

pub use application::{ApplicationBuilder, ApplicationCore};
pub use capability::{WhoHasIHaveServices, WhoIsIAmServices};
pub use controller::{DestinationController, Outcome, PendingRequest, SendFn};
pub use device_info::{DeviceInfo, DeviceInfoCache, DeviceInfoId, DeviceKey};
pub use objects::{BasicObject, ObjectRegistry};
pub use service::{Capability, ServiceHandler, ServiceTable};
pub use stack::{AccessPoint, Layer, LowerLayer, Stack, TraceLayer, UpperLayer};
pub use vlan::{Network, Node, SharedApplication};
