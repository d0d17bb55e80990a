//! Application-layer PDUs in decoded form.
//!
//! Encoding is handled below the application layer; these types carry only
//! what the application needs to route, answer, and interpret traffic.
//! Services the bundled capabilities implement have typed payloads, the rest
//! travel as opaque encoded parameters.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::object::ObjectIdentifier;
use crate::services::{ConfirmedServiceChoice, ServiceChoice, UnconfirmedServiceChoice};

/// Segmentation capability a device advertises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segmentation {
    SegmentedBoth,
    SegmentedTransmit,
    SegmentedReceive,
    #[default]
    NoSegmentation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    Device,
    Object,
    Property,
    Resources,
    Security,
    Services,
    Vt,
    Communication,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    Other,
    ConfigurationInProgress,
    DeviceBusy,
    InvalidDataType,
    NoSpaceForObject,
    OperationalProblem,
    PasswordFailure,
    ServiceRequestDenied,
    Timeout,
    UnknownObject,
    UnknownProperty,
    UnsupportedObjectType,
    ValueOutOfRange,
    WriteAccessDenied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    Other,
    BufferOverflow,
    InconsistentParameters,
    InvalidParameterDataType,
    InvalidTag,
    MissingRequiredParameter,
    ParameterOutOfRange,
    TooManyArguments,
    UndefinedEnumeration,
    UnrecognizedService,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbortReason {
    Other,
    BufferOverflow,
    InvalidApduInThisState,
    PreemptedByHigherPriorityTask,
    SegmentationNotSupported,
    SecurityError,
    InsufficientSecurity,
    WindowSizeOutOfRange,
    ApplicationExceededReplyTime,
    OutOfResources,
    TsmTimeout,
    ApduTooLong,
}

// ── Service payloads ─────────────────────────────────────────────────────────

/// Who-Is. Limits are both present or both absent in a well-formed request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoIsRequest {
    pub low_limit: Option<u32>,
    pub high_limit: Option<u32>,
}

/// I-Am: a device announcing itself and its capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IAmRequest {
    pub device_identifier: ObjectIdentifier,
    pub max_apdu_length_accepted: u16,
    pub segmentation_supported: Segmentation,
    pub vendor_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhoHasObject {
    Name(String),
    Identifier(ObjectIdentifier),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoHasRequest {
    pub low_limit: Option<u32>,
    pub high_limit: Option<u32>,
    pub object: WhoHasObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IHaveRequest {
    pub device_identifier: ObjectIdentifier,
    pub object_identifier: ObjectIdentifier,
    pub object_name: String,
}

/// Confirmed request: service choice plus encoded parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedRequest {
    pub service: ConfirmedServiceChoice,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnconfirmedRequest {
    WhoIs(WhoIsRequest),
    IAm(IAmRequest),
    WhoHas(WhoHasRequest),
    IHave(IHaveRequest),
    /// Any service without a typed payload.
    Other {
        service: UnconfirmedServiceChoice,
        data: Bytes,
    },
}

impl UnconfirmedRequest {
    pub fn service(&self) -> UnconfirmedServiceChoice {
        match self {
            UnconfirmedRequest::WhoIs(_) => UnconfirmedServiceChoice::WhoIs,
            UnconfirmedRequest::IAm(_) => UnconfirmedServiceChoice::IAm,
            UnconfirmedRequest::WhoHas(_) => UnconfirmedServiceChoice::WhoHas,
            UnconfirmedRequest::IHave(_) => UnconfirmedServiceChoice::IHave,
            UnconfirmedRequest::Other { service, .. } => *service,
        }
    }
}

// ── APDU ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApduBody {
    ConfirmedRequest(ConfirmedRequest),
    UnconfirmedRequest(UnconfirmedRequest),
    SimpleAck {
        service: ConfirmedServiceChoice,
    },
    ComplexAck {
        service: ConfirmedServiceChoice,
        data: Bytes,
    },
    Error {
        service: ConfirmedServiceChoice,
        class: ErrorClass,
        code: ErrorCode,
    },
    Reject {
        reason: RejectReason,
    },
    Abort {
        server: bool,
        reason: AbortReason,
    },
    SegmentAck {
        negative: bool,
        server: bool,
        sequence_number: u8,
        window_size: u8,
    },
}

/// Shape of an APDU without its contents, for logging and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApduKind {
    ConfirmedRequest,
    UnconfirmedRequest,
    SimpleAck,
    ComplexAck,
    Error,
    Reject,
    Abort,
    SegmentAck,
}

impl ApduKind {
    /// Requests travel up as indications, everything else as confirmations.
    pub fn is_request(self) -> bool {
        matches!(self, ApduKind::ConfirmedRequest | ApduKind::UnconfirmedRequest)
    }
}

impl fmt::Display for ApduKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApduKind::ConfirmedRequest => "confirmed-request",
            ApduKind::UnconfirmedRequest => "unconfirmed-request",
            ApduKind::SimpleAck => "simple-ack",
            ApduKind::ComplexAck => "complex-ack",
            ApduKind::Error => "error",
            ApduKind::Reject => "reject",
            ApduKind::Abort => "abort",
            ApduKind::SegmentAck => "segment-ack",
        };
        f.write_str(name)
    }
}

/// One application-layer message with its addressing.
///
/// `invoke_id` is assigned and correlated by the transaction layer below;
/// the application only copies it from a request into the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    pub source: Address,
    pub destination: Address,
    pub invoke_id: Option<u8>,
    pub body: ApduBody,
}

impl Apdu {
    pub fn confirmed(destination: Address, service: ConfirmedServiceChoice, data: Bytes) -> Self {
        Self {
            source: Address::Null,
            destination,
            invoke_id: None,
            body: ApduBody::ConfirmedRequest(ConfirmedRequest { service, data }),
        }
    }

    pub fn unconfirmed(destination: Address, request: UnconfirmedRequest) -> Self {
        Self {
            source: Address::Null,
            destination,
            invoke_id: None,
            body: ApduBody::UnconfirmedRequest(request),
        }
    }

    /// Response addressed back to whoever sent `request`.
    fn reply(request: &Apdu, body: ApduBody) -> Self {
        Self {
            source: request.destination.clone(),
            destination: request.source.clone(),
            invoke_id: request.invoke_id,
            body,
        }
    }

    pub fn simple_ack(request: &Apdu, service: ConfirmedServiceChoice) -> Self {
        Self::reply(request, ApduBody::SimpleAck { service })
    }

    pub fn complex_ack(request: &Apdu, service: ConfirmedServiceChoice, data: Bytes) -> Self {
        Self::reply(request, ApduBody::ComplexAck { service, data })
    }

    pub fn error_response(
        request: &Apdu,
        service: ConfirmedServiceChoice,
        class: ErrorClass,
        code: ErrorCode,
    ) -> Self {
        Self::reply(
            request,
            ApduBody::Error {
                service,
                class,
                code,
            },
        )
    }

    pub fn reject(request: &Apdu, reason: RejectReason) -> Self {
        Self::reply(request, ApduBody::Reject { reason })
    }

    pub fn abort(request: &Apdu, reason: AbortReason) -> Self {
        Self::reply(
            request,
            ApduBody::Abort {
                server: true,
                reason,
            },
        )
    }

    pub fn kind(&self) -> ApduKind {
        match &self.body {
            ApduBody::ConfirmedRequest(_) => ApduKind::ConfirmedRequest,
            ApduBody::UnconfirmedRequest(_) => ApduKind::UnconfirmedRequest,
            ApduBody::SimpleAck { .. } => ApduKind::SimpleAck,
            ApduBody::ComplexAck { .. } => ApduKind::ComplexAck,
            ApduBody::Error { .. } => ApduKind::Error,
            ApduBody::Reject { .. } => ApduKind::Reject,
            ApduBody::Abort { .. } => ApduKind::Abort,
            ApduBody::SegmentAck { .. } => ApduKind::SegmentAck,
        }
    }

    /// The confirmed service this request asks for, if it is a confirmed request.
    pub fn confirmed_service(&self) -> Option<ConfirmedServiceChoice> {
        match &self.body {
            ApduBody::ConfirmedRequest(request) => Some(request.service),
            _ => None,
        }
    }

    /// Handler table key for requests; `None` for responses.
    pub fn service_choice(&self) -> Option<ServiceChoice> {
        match &self.body {
            ApduBody::ConfirmedRequest(request) => Some(ServiceChoice::Confirmed(request.service)),
            ApduBody::UnconfirmedRequest(request) => {
                Some(ServiceChoice::Unconfirmed(request.service()))
            }
            _ => None,
        }
    }
}
