//! The application core.
//!
//! Routes outbound requests (unconfirmed straight down, confirmed through a
//! per-destination controller), matches inbound confirmations to their
//! controller, and dispatches inbound requests to registered handlers,
//! mapping handler failures onto peer-visible responses.
//!
//! Not internally synchronized. Whoever drives it must serialize calls to
//! `request`, `indication` and `confirmation`.

use std::collections::HashMap;
use std::sync::Arc;

use bacstack_core::{
    Address, Apdu, ApduKind, AppError, ConfirmedServiceChoice, ErrorClass, ErrorCode, LocalDevice,
    LocalObject, ObjectIdentifier, ServiceChoice, ServiceFailure, ServicesSupported,
    UnconfirmedServiceChoice,
};

use crate::controller::{DestinationController, Outcome, PendingRequest};
use crate::device_info::DeviceInfoCache;
use crate::objects::ObjectRegistry;
use crate::service::{Capability, ServiceHandler, ServiceTable};
use crate::stack::{LowerLayer, UpperLayer};

pub struct ApplicationCore {
    lower: Arc<dyn LowerLayer>,
    services: ServiceTable,
    objects: ObjectRegistry,
    device_info: DeviceInfoCache,
    controllers: HashMap<Address, DestinationController>,
}

impl ApplicationCore {
    pub fn builder(lower: Arc<dyn LowerLayer>) -> ApplicationBuilder {
        ApplicationBuilder {
            lower,
            local_device: None,
            objects: Vec::new(),
            device_info: None,
            services: ServiceTable::new(),
        }
    }

    // ── Outbound ─────────────────────────────────────────────────────────────

    /// Send a request. Confirmed requests return a handle that resolves when
    /// the peer answers; unconfirmed requests return `None`.
    pub fn request(&mut self, apdu: Apdu) -> Result<Option<PendingRequest>, AppError> {
        match apdu.kind() {
            ApduKind::UnconfirmedRequest => {
                self.lower.request(apdu);
                Ok(None)
            }
            ApduKind::ConfirmedRequest => {
                let pending = PendingRequest::new(apdu);
                let destination = pending.request().destination.clone();
                let lower = self.lower.clone();
                let controller = self
                    .controllers
                    .entry(destination.clone())
                    .or_insert_with(|| {
                        tracing::debug!(%destination, "destination controller created");
                        DestinationController::new(
                            destination.clone(),
                            Arc::new(move |apdu: Apdu| lower.request(apdu)),
                        )
                    });
                controller.submit(pending.clone());
                Ok(Some(pending))
            }
            kind => Err(AppError::NotARequest(kind)),
        }
    }

    /// Send a response to a request received from a peer.
    pub fn response(&self, apdu: Apdu) {
        self.lower.request(apdu);
    }

    // ── Inbound ──────────────────────────────────────────────────────────────

    /// A response to one of our confirmed requests.
    pub fn confirmation(&mut self, apdu: Apdu) -> Result<(), AppError> {
        let source = apdu.source.clone();
        let Some(controller) = self.controllers.get_mut(&source) else {
            tracing::debug!(%source, kind = %apdu.kind(), "stray confirmation dropped");
            return Ok(());
        };

        let outcome = match apdu.kind() {
            ApduKind::SimpleAck | ApduKind::ComplexAck => Outcome::Success(apdu),
            ApduKind::Error | ApduKind::Reject | ApduKind::Abort => Outcome::Failure(apdu),
            kind => return Err(AppError::UnexpectedConfirmation(kind)),
        };
        controller.resolve(outcome);

        if controller.is_idle() {
            self.controllers.remove(&source);
            tracing::debug!(%source, "destination controller removed");
        }
        Ok(())
    }

    /// A request from a peer.
    pub fn indication(&mut self, apdu: Apdu) -> Result<(), AppError> {
        let Some(service) = apdu.service_choice() else {
            return Err(AppError::NotARequest(apdu.kind()));
        };
        let Some(handler) = self.services.get(service) else {
            if service.is_confirmed() {
                return Err(AppError::UnrecognizedService(service));
            }
            tracing::trace!(%service, source = %apdu.source, "no handler, ignored");
            return Ok(());
        };

        let failure = match handler.handle(self, &apdu) {
            Ok(()) => return Ok(()),
            Err(failure) => failure,
        };

        match failure {
            ServiceFailure::Reject(reason) => Err(AppError::Reject(reason)),
            ServiceFailure::Abort(reason) => Err(AppError::Abort(reason)),
            ServiceFailure::Execution { class, code } => {
                self.answer_with_error(&apdu, class, code);
                Ok(())
            }
            ServiceFailure::Other(err) => {
                tracing::error!(
                    %service,
                    source = %apdu.source,
                    error = ?err,
                    "service handler failed"
                );
                self.answer_with_error(&apdu, ErrorClass::Device, ErrorCode::OperationalProblem);
                Ok(())
            }
        }
    }

    /// Error response for confirmed requests; nothing for unconfirmed ones.
    fn answer_with_error(&self, request: &Apdu, class: ErrorClass, code: ErrorCode) {
        match request.confirmed_service() {
            Some(service) => self.response(Apdu::error_response(request, service, class, code)),
            None => tracing::trace!(
                source = %request.source,
                ?class,
                ?code,
                "error for unconfirmed request dropped"
            ),
        }
    }

    /// Resolve the active request toward `destination` as timed out and let
    /// the queue advance. The core runs no timers; this is for whoever does.
    pub fn expire_active(&mut self, destination: &Address) -> Option<PendingRequest> {
        let controller = self.controllers.get_mut(destination)?;
        let expired = controller.resolve(Outcome::TimedOut);
        if controller.is_idle() {
            self.controllers.remove(destination);
            tracing::debug!(%destination, "destination controller removed");
        }
        if expired.is_some() {
            tracing::debug!(%destination, "active request expired");
        }
        expired
    }

    // ── Introspection ────────────────────────────────────────────────────────

    /// One bit per service with a registered handler.
    pub fn services_supported(&self) -> ServicesSupported {
        let mut supported = ServicesSupported::new();
        for choice in ConfirmedServiceChoice::ALL {
            if self.services.contains(choice) {
                supported.set(choice.services_supported_bit());
            }
        }
        for choice in UnconfirmedServiceChoice::ALL {
            if self.services.contains(choice) {
                supported.set(choice.services_supported_bit());
            }
        }
        supported
    }

    pub fn has_handler(&self, service: impl Into<ServiceChoice>) -> bool {
        self.services.contains(service)
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    pub fn has_controller(&self, destination: &Address) -> bool {
        self.controllers.contains_key(destination)
    }

    /// Requests waiting behind the active one for `destination`.
    pub fn queued_for(&self, destination: &Address) -> usize {
        self.controllers
            .get(destination)
            .map_or(0, DestinationController::queued_len)
    }

    // ── Objects ──────────────────────────────────────────────────────────────

    pub fn local_device(&self) -> Option<&Arc<LocalDevice>> {
        self.objects.local_device()
    }

    pub fn add_object(&mut self, object: Arc<dyn LocalObject>) -> Result<(), AppError> {
        self.objects.add_object(object)
    }

    pub fn remove_object(&mut self, id: ObjectIdentifier) -> Result<Arc<dyn LocalObject>, AppError> {
        self.objects.remove_object(id)
    }

    pub fn get_object_by_id(&self, id: ObjectIdentifier) -> Option<&Arc<dyn LocalObject>> {
        self.objects.get_object_by_id(id)
    }

    pub fn get_object_by_name(&self, name: &str) -> Option<&Arc<dyn LocalObject>> {
        self.objects.get_object_by_name(name)
    }

    pub fn iter_objects(&self) -> impl Iterator<Item = &Arc<dyn LocalObject>> {
        self.objects.iter_objects()
    }

    pub fn object_list(&self) -> &[ObjectIdentifier] {
        self.objects.object_list()
    }

    // ── Peer devices ─────────────────────────────────────────────────────────

    pub fn device_info(&self) -> &DeviceInfoCache {
        &self.device_info
    }

    pub fn device_info_mut(&mut self) -> &mut DeviceInfoCache {
        &mut self.device_info
    }
}

impl UpperLayer for ApplicationCore {
    fn indication(&mut self, apdu: Apdu) -> Result<(), AppError> {
        ApplicationCore::indication(self, apdu)
    }

    fn confirmation(&mut self, apdu: Apdu) -> Result<(), AppError> {
        ApplicationCore::confirmation(self, apdu)
    }
}

/// Assembles an application: local device, cache, and handler set.
pub struct ApplicationBuilder {
    lower: Arc<dyn LowerLayer>,
    local_device: Option<LocalDevice>,
    objects: Vec<Arc<dyn LocalObject>>,
    device_info: Option<DeviceInfoCache>,
    services: ServiceTable,
}

impl ApplicationBuilder {
    pub fn local_device(mut self, device: LocalDevice) -> Self {
        self.local_device = Some(device);
        self
    }

    /// Host an object alongside the local device.
    pub fn object(mut self, object: Arc<dyn LocalObject>) -> Self {
        self.objects.push(object);
        self
    }

    /// Use a cache shared with other components instead of a fresh one.
    pub fn device_info_cache(mut self, cache: DeviceInfoCache) -> Self {
        self.device_info = Some(cache);
        self
    }

    pub fn capability(mut self, capability: impl Capability) -> Self {
        capability.install(&mut self.services);
        self
    }

    pub fn handler(
        mut self,
        service: impl Into<ServiceChoice>,
        handler: Arc<dyn ServiceHandler>,
    ) -> Self {
        self.services.register(service, handler);
        self
    }

    pub fn handler_fn<F>(mut self, service: impl Into<ServiceChoice>, handler: F) -> Self
    where
        F: Fn(&mut ApplicationCore, &Apdu) -> Result<(), ServiceFailure> + Send + Sync + 'static,
    {
        self.services.register_fn(service, handler);
        self
    }

    pub fn build(self) -> Result<ApplicationCore, AppError> {
        let mut objects = match self.local_device {
            Some(device) => ObjectRegistry::with_local_device(device)?,
            None => ObjectRegistry::new(),
        };
        for object in self.objects {
            objects.add_object(object)?;
        }
        tracing::debug!(
            services = self.services.len(),
            device = ?objects.local_device().map(|d| d.object_identifier),
            "application built"
        );
        Ok(ApplicationCore {
            lower: self.lower,
            services: self.services,
            objects,
            device_info: self.device_info.unwrap_or_default(),
            controllers: HashMap::new(),
        })
    }
}
