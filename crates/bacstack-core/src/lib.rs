//! bacstack-core: shared protocol vocabulary for the application layer.
//! Addresses, object identifiers, service choices, abstract APDU shapes,
//! the failure taxonomy, and configuration. All other bacstack crates
//! depend on this one.

pub mod address;
pub mod apdu;
pub mod config;
pub mod error;
pub mod object;
pub mod services;

pub use address::{Address, AddressParseError};
pub use apdu::{
    AbortReason, Apdu, ApduBody, ApduKind, ConfirmedRequest, ErrorClass, ErrorCode, IAmRequest,
    IHaveRequest, RejectReason, Segmentation, UnconfirmedRequest, WhoHasObject, WhoHasRequest,
    WhoIsRequest,
};
pub use error::{AppError, ServiceFailure};
pub use object::{LocalDevice, LocalObject, ObjectIdentifier, ObjectType};
pub use services::{
    ConfirmedServiceChoice, ServiceChoice, ServicesSupported, UnconfirmedServiceChoice,
};
