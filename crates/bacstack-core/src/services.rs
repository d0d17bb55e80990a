//! Service choices and the ServicesSupported bit string.
//!
//! The choice number is what travels in a request header. The bit position
//! in ServicesSupported is a separate numbering: the two agree for the
//! original confirmed services and diverge for everything added later.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Confirmed services. Discriminant = protocol choice number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum ConfirmedServiceChoice {
    AcknowledgeAlarm = 0,
    ConfirmedCovNotification = 1,
    ConfirmedEventNotification = 2,
    GetAlarmSummary = 3,
    GetEnrollmentSummary = 4,
    SubscribeCov = 5,
    AtomicReadFile = 6,
    AtomicWriteFile = 7,
    AddListElement = 8,
    RemoveListElement = 9,
    CreateObject = 10,
    DeleteObject = 11,
    ReadProperty = 12,
    ReadPropertyMultiple = 14,
    WriteProperty = 15,
    WritePropertyMultiple = 16,
    DeviceCommunicationControl = 17,
    ConfirmedPrivateTransfer = 18,
    ConfirmedTextMessage = 19,
    ReinitializeDevice = 20,
    VtOpen = 21,
    VtClose = 22,
    VtData = 23,
    ReadRange = 26,
    LifeSafetyOperation = 27,
    SubscribeCovProperty = 28,
    GetEventInformation = 29,
    SubscribeCovPropertyMultiple = 30,
    ConfirmedCovNotificationMultiple = 31,
}

impl ConfirmedServiceChoice {
    pub const ALL: [Self; 29] = [
        Self::AcknowledgeAlarm,
        Self::ConfirmedCovNotification,
        Self::ConfirmedEventNotification,
        Self::GetAlarmSummary,
        Self::GetEnrollmentSummary,
        Self::SubscribeCov,
        Self::AtomicReadFile,
        Self::AtomicWriteFile,
        Self::AddListElement,
        Self::RemoveListElement,
        Self::CreateObject,
        Self::DeleteObject,
        Self::ReadProperty,
        Self::ReadPropertyMultiple,
        Self::WriteProperty,
        Self::WritePropertyMultiple,
        Self::DeviceCommunicationControl,
        Self::ConfirmedPrivateTransfer,
        Self::ConfirmedTextMessage,
        Self::ReinitializeDevice,
        Self::VtOpen,
        Self::VtClose,
        Self::VtData,
        Self::ReadRange,
        Self::LifeSafetyOperation,
        Self::SubscribeCovProperty,
        Self::GetEventInformation,
        Self::SubscribeCovPropertyMultiple,
        Self::ConfirmedCovNotificationMultiple,
    ];

    pub fn choice(self) -> u8 {
        self as u8
    }

    /// Bit position in ServicesSupported.
    pub fn services_supported_bit(self) -> usize {
        match self {
            Self::ReadRange => 35,
            Self::LifeSafetyOperation => 37,
            Self::SubscribeCovProperty => 38,
            Self::GetEventInformation => 39,
            Self::SubscribeCovPropertyMultiple => 41,
            Self::ConfirmedCovNotificationMultiple => 42,
            other => other as usize,
        }
    }
}

impl TryFrom<u8> for ConfirmedServiceChoice {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        Self::ALL
            .iter()
            .copied()
            .find(|choice| choice.choice() == value)
            .ok_or(value)
    }
}

/// Unconfirmed services. Discriminant = protocol choice number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum UnconfirmedServiceChoice {
    IAm = 0,
    IHave = 1,
    UnconfirmedCovNotification = 2,
    UnconfirmedEventNotification = 3,
    UnconfirmedPrivateTransfer = 4,
    UnconfirmedTextMessage = 5,
    TimeSynchronization = 6,
    WhoHas = 7,
    WhoIs = 8,
    UtcTimeSynchronization = 9,
    WriteGroup = 10,
    UnconfirmedCovNotificationMultiple = 11,
}

impl UnconfirmedServiceChoice {
    pub const ALL: [Self; 12] = [
        Self::IAm,
        Self::IHave,
        Self::UnconfirmedCovNotification,
        Self::UnconfirmedEventNotification,
        Self::UnconfirmedPrivateTransfer,
        Self::UnconfirmedTextMessage,
        Self::TimeSynchronization,
        Self::WhoHas,
        Self::WhoIs,
        Self::UtcTimeSynchronization,
        Self::WriteGroup,
        Self::UnconfirmedCovNotificationMultiple,
    ];

    pub fn choice(self) -> u8 {
        self as u8
    }

    /// Bit position in ServicesSupported.
    pub fn services_supported_bit(self) -> usize {
        match self {
            Self::IAm => 26,
            Self::IHave => 27,
            Self::UnconfirmedCovNotification => 28,
            Self::UnconfirmedEventNotification => 29,
            Self::UnconfirmedPrivateTransfer => 30,
            Self::UnconfirmedTextMessage => 31,
            Self::TimeSynchronization => 32,
            Self::WhoHas => 33,
            Self::WhoIs => 34,
            Self::UtcTimeSynchronization => 36,
            Self::WriteGroup => 40,
            Self::UnconfirmedCovNotificationMultiple => 43,
        }
    }
}

impl TryFrom<u8> for UnconfirmedServiceChoice {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        Self::ALL
            .iter()
            .copied()
            .find(|choice| choice.choice() == value)
            .ok_or(value)
    }
}

/// Key for the service handler table: one entry per request shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "service", rename_all = "lowercase")]
pub enum ServiceChoice {
    Confirmed(ConfirmedServiceChoice),
    Unconfirmed(UnconfirmedServiceChoice),
}

impl ServiceChoice {
    pub fn is_confirmed(self) -> bool {
        matches!(self, ServiceChoice::Confirmed(_))
    }

    pub fn services_supported_bit(self) -> usize {
        match self {
            ServiceChoice::Confirmed(choice) => choice.services_supported_bit(),
            ServiceChoice::Unconfirmed(choice) => choice.services_supported_bit(),
        }
    }
}

impl From<ConfirmedServiceChoice> for ServiceChoice {
    fn from(choice: ConfirmedServiceChoice) -> Self {
        ServiceChoice::Confirmed(choice)
    }
}

impl From<UnconfirmedServiceChoice> for ServiceChoice {
    fn from(choice: UnconfirmedServiceChoice) -> Self {
        ServiceChoice::Unconfirmed(choice)
    }
}

impl fmt::Display for ServiceChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceChoice::Confirmed(choice) => write!(f, "confirmed {choice:?}"),
            ServiceChoice::Unconfirmed(choice) => write!(f, "unconfirmed {choice:?}"),
        }
    }
}

/// Fixed-length bit string advertising which services a device executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesSupported {
    bits: u64,
}

impl ServicesSupported {
    pub const LEN: usize = 44;

    pub fn new() -> Self {
        Self::default()
    }

    /// Out-of-range positions are ignored.
    pub fn set(&mut self, bit: usize) {
        if bit < Self::LEN {
            self.bits |= 1u64 << bit;
        }
    }

    pub fn is_set(&self, bit: usize) -> bool {
        bit < Self::LEN && self.bits & (1u64 << bit) != 0
    }

    pub fn supports(&self, service: impl Into<ServiceChoice>) -> bool {
        self.is_set(service.into().services_supported_bit())
    }

    /// Positions of all set bits, ascending.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        (0..Self::LEN).filter(move |bit| self.is_set(*bit))
    }

    pub fn count(&self) -> usize {
        self.bits.count_ones() as usize
    }
}

impl fmt::Display for ServicesSupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in 0..Self::LEN {
            f.write_str(if self.is_set(bit) { "1" } else { "0" })?;
        }
        Ok(())
    }
}
