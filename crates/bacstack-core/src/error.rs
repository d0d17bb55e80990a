//! Failure taxonomy of the application layer.
//!
//! `AppError` is what the application core returns to its callers.
//! `ServiceFailure` is what a service handler returns to the core; the core
//! maps it onto a response, a propagated `AppError`, or nothing.

use crate::address::Address;
use crate::apdu::{AbortReason, ApduKind, ErrorClass, ErrorCode, RejectReason};
use crate::object::ObjectIdentifier;
use crate::services::ServiceChoice;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ── Usage errors ──
    #[error("device info key must be a device instance or a station address, got {0}")]
    InvalidKey(Address),
    #[error("object name required")]
    MissingObjectName,
    #[error("already an object with name {0:?}")]
    DuplicateObjectName(String),
    #[error("already an object with identifier {0}")]
    DuplicateObjectIdentifier(ObjectIdentifier),
    #[error("invalid object identifier {0}")]
    InvalidObjectIdentifier(ObjectIdentifier),
    #[error("no object with identifier {0}")]
    UnknownObject(ObjectIdentifier),
    #[error("application has no local device")]
    NoLocalDevice,
    #[error("{0} cannot be sent as a request")]
    NotARequest(ApduKind),

    // ── Peer-visible outcomes of an indication ──
    #[error("no handler for {0}")]
    UnrecognizedService(ServiceChoice),
    #[error("request rejected: {0:?}")]
    Reject(RejectReason),
    #[error("transaction aborted: {0:?}")]
    Abort(AbortReason),

    // ── Protocol violation ──
    #[error("unrecognized confirmation {0}")]
    UnexpectedConfirmation(ApduKind),
}

impl AppError {
    /// Caller mistakes that are never recovered or sent to a peer.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            AppError::InvalidKey(_)
                | AppError::MissingObjectName
                | AppError::DuplicateObjectName(_)
                | AppError::DuplicateObjectIdentifier(_)
                | AppError::InvalidObjectIdentifier(_)
                | AppError::UnknownObject(_)
                | AppError::NoLocalDevice
                | AppError::NotARequest(_)
        )
    }
}

/// Failure raised by a service handler.
#[derive(Debug, thiserror::Error)]
pub enum ServiceFailure {
    /// Malformed or logically invalid request; the stack answers with Reject.
    #[error("reject: {0:?}")]
    Reject(RejectReason),
    /// Severe condition for this transaction; the stack answers with Abort.
    #[error("abort: {0:?}")]
    Abort(AbortReason),
    /// Business-rule failure, answered with an Error carrying class and code.
    #[error("execution error: {class:?}/{code:?}")]
    Execution { class: ErrorClass, code: ErrorCode },
    /// Anything else. Logged; the peer only sees device/operational-problem.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ServiceFailure {
    pub fn execution(class: ErrorClass, code: ErrorCode) -> Self {
        ServiceFailure::Execution { class, code }
    }
}

impl From<AppError> for ServiceFailure {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Reject(reason) => ServiceFailure::Reject(reason),
            AppError::Abort(reason) => ServiceFailure::Abort(reason),
            other => ServiceFailure::Other(other.into()),
        }
    }
}
