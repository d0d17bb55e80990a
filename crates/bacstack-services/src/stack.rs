//! Layer interfaces and stack composition.
//!
//! Messages travel down through `LowerLayer::request` and up through
//! `UpperLayer::indication`/`confirmation`. A `Stack` is an explicit list of
//! intermediate layers bound on top of a bottom transport, and the
//! `AccessPoint` sits between inbound traffic and the application.

use std::sync::Arc;

use bacstack_core::{Apdu, ApduKind, AppError, RejectReason};

/// Accepts fully formed messages for transmission.
pub trait LowerLayer: Send + Sync {
    fn request(&self, apdu: Apdu);
}

/// Receives inbound traffic.
pub trait UpperLayer {
    /// A fresh request from a peer.
    fn indication(&mut self, apdu: Apdu) -> Result<(), AppError>;

    /// A response to one of our confirmed requests.
    fn confirmation(&mut self, apdu: Apdu) -> Result<(), AppError>;
}

/// An intermediate component on the downward path.
pub trait Layer: Send + Sync {
    fn request(&self, apdu: Apdu, below: &dyn LowerLayer);
}

struct Bound {
    layer: Arc<dyn Layer>,
    below: Arc<dyn LowerLayer>,
}

impl LowerLayer for Bound {
    fn request(&self, apdu: Apdu) {
        self.layer.request(apdu, self.below.as_ref());
    }
}

/// Ordered layers, top first.
#[derive(Default)]
pub struct Stack {
    layers: Vec<Arc<dyn Layer>>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer below the ones already pushed.
    pub fn push(mut self, layer: impl Layer + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wire the layers on top of `bottom` into a single lower layer.
    pub fn bind(self, bottom: Arc<dyn LowerLayer>) -> Arc<dyn LowerLayer> {
        self.layers
            .into_iter()
            .rev()
            .fold(bottom, |below, layer| -> Arc<dyn LowerLayer> {
                Arc::new(Bound { layer, below })
            })
    }
}

/// Logs every message passing down.
pub struct TraceLayer {
    name: String,
}

impl TraceLayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Layer for TraceLayer {
    fn request(&self, apdu: Apdu, below: &dyn LowerLayer) {
        tracing::debug!(
            layer = %self.name,
            kind = %apdu.kind(),
            destination = %apdu.destination,
            invoke_id = ?apdu.invoke_id,
            "apdu down"
        );
        below.request(apdu);
    }
}

/// Routes inbound messages to an application and answers failed confirmed
/// requests on its behalf.
#[derive(Clone)]
pub struct AccessPoint {
    lower: Arc<dyn LowerLayer>,
}

impl AccessPoint {
    pub fn new(lower: Arc<dyn LowerLayer>) -> Self {
        Self { lower }
    }

    pub fn deliver<U: UpperLayer + ?Sized>(&self, upper: &mut U, apdu: Apdu) {
        let kind = apdu.kind();
        if !kind.is_request() {
            let source = apdu.source.clone();
            if let Err(e) = upper.confirmation(apdu) {
                tracing::warn!(%source, %kind, error = %e, "confirmation failed");
            }
            return;
        }

        let request = (kind == ApduKind::ConfirmedRequest).then(|| apdu.clone());
        let source = apdu.source.clone();
        let Err(e) = upper.indication(apdu) else {
            return;
        };

        let reply = match (&request, &e) {
            (Some(request), AppError::UnrecognizedService(_)) => {
                Some(Apdu::reject(request, RejectReason::UnrecognizedService))
            }
            (Some(request), AppError::Reject(reason)) => Some(Apdu::reject(request, *reason)),
            (Some(request), AppError::Abort(reason)) => Some(Apdu::abort(request, *reason)),
            _ => None,
        };
        match reply {
            Some(reply) => {
                tracing::debug!(%source, error = %e, reply = %reply.kind(), "request refused");
                self.lower.request(reply);
            }
            None => tracing::warn!(%source, %kind, error = %e, "indication failed"),
        }
    }
}
