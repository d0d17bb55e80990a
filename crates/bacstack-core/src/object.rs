//! Object identifiers and the locally hosted object contract.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::apdu::Segmentation;

/// Largest encodable instance number. Used as the wildcard instance, so a
/// registered object must stay strictly below it.
pub const MAX_INSTANCE: u32 = 0x3F_FFFF;

/// Standard object types. Anything else travels as `Proprietary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectType {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    Device,
    File,
    MultiStateInput,
    MultiStateOutput,
    Schedule,
    MultiStateValue,
    TrendLog,
    NetworkPort,
    Proprietary(u16),
}

impl ObjectType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::AnalogInput,
            1 => Self::AnalogOutput,
            2 => Self::AnalogValue,
            3 => Self::BinaryInput,
            4 => Self::BinaryOutput,
            5 => Self::BinaryValue,
            8 => Self::Device,
            10 => Self::File,
            13 => Self::MultiStateInput,
            14 => Self::MultiStateOutput,
            17 => Self::Schedule,
            19 => Self::MultiStateValue,
            20 => Self::TrendLog,
            56 => Self::NetworkPort,
            other => Self::Proprietary(other),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            Self::AnalogInput => 0,
            Self::AnalogOutput => 1,
            Self::AnalogValue => 2,
            Self::BinaryInput => 3,
            Self::BinaryOutput => 4,
            Self::BinaryValue => 5,
            Self::Device => 8,
            Self::File => 10,
            Self::MultiStateInput => 13,
            Self::MultiStateOutput => 14,
            Self::Schedule => 17,
            Self::MultiStateValue => 19,
            Self::TrendLog => 20,
            Self::NetworkPort => 56,
            Self::Proprietary(value) => value,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AnalogInput => "analog-input",
            Self::AnalogOutput => "analog-output",
            Self::AnalogValue => "analog-value",
            Self::BinaryInput => "binary-input",
            Self::BinaryOutput => "binary-output",
            Self::BinaryValue => "binary-value",
            Self::Device => "device",
            Self::File => "file",
            Self::MultiStateInput => "multi-state-input",
            Self::MultiStateOutput => "multi-state-output",
            Self::Schedule => "schedule",
            Self::MultiStateValue => "multi-state-value",
            Self::TrendLog => "trend-log",
            Self::NetworkPort => "network-port",
            Self::Proprietary(value) => return write!(f, "proprietary-{value}"),
        };
        f.write_str(name)
    }
}

/// Object type plus instance number. Unique within one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectIdentifier {
    pub object_type: ObjectType,
    pub instance: u32,
}

impl ObjectIdentifier {
    pub fn new(object_type: ObjectType, instance: u32) -> Self {
        Self {
            object_type,
            instance,
        }
    }

    pub fn device(instance: u32) -> Self {
        Self::new(ObjectType::Device, instance)
    }

    /// Instance numbers at or above the wildcard cannot name a real object.
    pub fn has_valid_instance(&self) -> bool {
        self.instance < MAX_INSTANCE
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.instance)
    }
}

/// An application object hosted by this device.
///
/// Property access belongs to the object model; the application layer only
/// needs the two identity attributes to index objects.
pub trait LocalObject: fmt::Debug + Send + Sync {
    fn object_name(&self) -> &str;

    fn object_identifier(&self) -> ObjectIdentifier;
}

/// Identity and capabilities of the device this application runs as.
///
/// Announced to peers in I-Am and used to answer Who-Is/Who-Has. The
/// object list attribute is owned by the object registry, which keeps it
/// in step with registry membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDevice {
    pub object_name: String,
    pub object_identifier: ObjectIdentifier,
    pub vendor_id: u16,
    pub max_apdu_length_accepted: u16,
    pub segmentation_supported: Segmentation,
}

impl LocalDevice {
    pub fn new(object_name: impl Into<String>, instance: u32, vendor_id: u16) -> Self {
        Self {
            object_name: object_name.into(),
            object_identifier: ObjectIdentifier::device(instance),
            vendor_id,
            max_apdu_length_accepted: 1024,
            segmentation_supported: Segmentation::NoSegmentation,
        }
    }

    pub fn instance(&self) -> u32 {
        self.object_identifier.instance
    }
}

impl LocalObject for LocalDevice {
    fn object_name(&self) -> &str {
        &self.object_name
    }

    fn object_identifier(&self) -> ObjectIdentifier {
        self.object_identifier
    }
}
