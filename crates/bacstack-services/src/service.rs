//! Service handler registration.
//!
//! An application's handler set is fixed when it is built: each capability
//! contributes its entries to a `ServiceTable`, which the application then
//! consults for every indication and for ServicesSupported.

use std::collections::HashMap;
use std::sync::Arc;

use bacstack_core::{Apdu, ServiceChoice, ServiceFailure};

use crate::application::ApplicationCore;

/// Executes one service for a request received from a peer.
///
/// A confirmed handler that succeeds must send its own ack through
/// `ApplicationCore::response`. Failures are mapped onto responses by the
/// application.
pub trait ServiceHandler: Send + Sync {
    fn handle(&self, app: &mut ApplicationCore, apdu: &Apdu) -> Result<(), ServiceFailure>;
}

impl<F> ServiceHandler for F
where
    F: Fn(&mut ApplicationCore, &Apdu) -> Result<(), ServiceFailure> + Send + Sync,
{
    fn handle(&self, app: &mut ApplicationCore, apdu: &Apdu) -> Result<(), ServiceFailure> {
        self(app, apdu)
    }
}

/// A group of related services installed together.
pub trait Capability {
    fn install(&self, table: &mut ServiceTable);
}

/// Service choice -> handler.
#[derive(Clone, Default)]
pub struct ServiceTable {
    handlers: HashMap<ServiceChoice, Arc<dyn ServiceHandler>>,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A later registration for the same service replaces
    /// the earlier one, which is returned.
    pub fn register(
        &mut self,
        service: impl Into<ServiceChoice>,
        handler: Arc<dyn ServiceHandler>,
    ) -> Option<Arc<dyn ServiceHandler>> {
        let service = service.into();
        let replaced = self.handlers.insert(service, handler);
        if replaced.is_some() {
            tracing::debug!(%service, "service handler replaced");
        }
        replaced
    }

    /// Register a plain function or closure.
    pub fn register_fn<F>(&mut self, service: impl Into<ServiceChoice>, handler: F)
    where
        F: Fn(&mut ApplicationCore, &Apdu) -> Result<(), ServiceFailure> + Send + Sync + 'static,
    {
        self.register(service, Arc::new(handler));
    }

    pub fn get(&self, service: ServiceChoice) -> Option<Arc<dyn ServiceHandler>> {
        self.handlers.get(&service).cloned()
    }

    pub fn contains(&self, service: impl Into<ServiceChoice>) -> bool {
        self.handlers.contains_key(&service.into())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn services(&self) -> impl Iterator<Item = ServiceChoice> + '_ {
        self.handlers.keys().copied()
    }
}
