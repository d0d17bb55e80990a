//! Network addresses as seen by the application layer.
//!
//! Textual forms (parsed and rendered symmetrically):
//!   "12"          local station, one-byte MAC
//!   "0x0a0b0c"    local station, hex MAC
//!   "0x"          local station, empty MAC (not a usable station)
//!   "2:12"        remote station on network 2
//!   "*"           local broadcast
//!   "2:*"         remote broadcast on network 2
//!   "*:*"         global broadcast
//!   "null"        no address

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A source or destination address carried by every APDU.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Address {
    #[default]
    Null,
    LocalStation(Bytes),
    RemoteStation { net: u16, mac: Bytes },
    LocalBroadcast,
    RemoteBroadcast(u16),
    GlobalBroadcast,
}

impl Address {
    /// Local station from raw MAC bytes.
    pub fn local(mac: &[u8]) -> Self {
        Address::LocalStation(Bytes::copy_from_slice(mac))
    }

    /// Remote station on another network.
    pub fn remote(net: u16, mac: &[u8]) -> Self {
        Address::RemoteStation {
            net,
            mac: Bytes::copy_from_slice(mac),
        }
    }

    /// True for the two addressable station forms with a non-empty MAC.
    /// Only these identify a single peer device.
    pub fn is_station(&self) -> bool {
        match self {
            Address::LocalStation(mac) | Address::RemoteStation { mac, .. } => !mac.is_empty(),
            _ => false,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            Address::LocalBroadcast | Address::RemoteBroadcast(_) | Address::GlobalBroadcast
        )
    }
}

fn fmt_mac(mac: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if mac.len() == 1 {
        write!(f, "{}", mac[0])
    } else {
        write!(f, "0x{}", hex::encode(mac))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Null => f.write_str("null"),
            Address::LocalStation(mac) => fmt_mac(mac, f),
            Address::RemoteStation { net, mac } => {
                write!(f, "{net}:")?;
                fmt_mac(mac, f)
            }
            Address::LocalBroadcast => f.write_str("*"),
            Address::RemoteBroadcast(net) => write!(f, "{net}:*"),
            Address::GlobalBroadcast => f.write_str("*:*"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("empty address")]
    Empty,
    #[error("invalid network number {0:?}")]
    InvalidNetwork(String),
    #[error("invalid station address {0:?}")]
    InvalidMac(String),
}

fn parse_mac(text: &str) -> Result<Bytes, AddressParseError> {
    if let Some(digits) = text.strip_prefix("0x") {
        let bytes =
            hex::decode(digits).map_err(|_| AddressParseError::InvalidMac(text.to_string()))?;
        Ok(Bytes::from(bytes))
    } else {
        let octet: u8 = text
            .parse()
            .map_err(|_| AddressParseError::InvalidMac(text.to_string()))?;
        Ok(Bytes::copy_from_slice(&[octet]))
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "" => Err(AddressParseError::Empty),
            "null" => Ok(Address::Null),
            "*" => Ok(Address::LocalBroadcast),
            "*:*" => Ok(Address::GlobalBroadcast),
            _ => match s.split_once(':') {
                Some((net, station)) => {
                    let net: u16 = net
                        .parse()
                        .map_err(|_| AddressParseError::InvalidNetwork(net.to_string()))?;
                    if station == "*" {
                        Ok(Address::RemoteBroadcast(net))
                    } else {
                        Ok(Address::RemoteStation {
                            net,
                            mac: parse_mac(station)?,
                        })
                    }
                }
                None => Ok(Address::LocalStation(parse_mac(s)?)),
            },
        }
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_textual_form() {
        assert_eq!("12".parse::<Address>().unwrap(), Address::local(&[12]));
        assert_eq!(
            "0x0a0b0c".parse::<Address>().unwrap(),
            Address::local(&[0x0a, 0x0b, 0x0c])
        );
        assert_eq!("2:12".parse::<Address>().unwrap(), Address::remote(2, &[12]));
        assert_eq!(
            "2:0x0a0b".parse::<Address>().unwrap(),
            Address::remote(2, &[0x0a, 0x0b])
        );
        assert_eq!("*".parse::<Address>().unwrap(), Address::LocalBroadcast);
        assert_eq!("2:*".parse::<Address>().unwrap(), Address::RemoteBroadcast(2));
        assert_eq!("*:*".parse::<Address>().unwrap(), Address::GlobalBroadcast);
        assert_eq!("null".parse::<Address>().unwrap(), Address::Null);
    }

    #[test]
    fn display_matches_parse_input() {
        for text in ["12", "0x0a0b0c", "2:12", "2:0x0a0b", "*", "2:*", "*:*"] {
            assert_eq!(text.parse::<Address>().unwrap().to_string(), text);
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert_eq!("".parse::<Address>(), Err(AddressParseError::Empty));
        assert!(matches!(
            "256".parse::<Address>(),
            Err(AddressParseError::InvalidMac(_))
        ));
        assert!(matches!(
            "0xabc".parse::<Address>(),
            Err(AddressParseError::InvalidMac(_))
        ));
        assert!(matches!(
            "net:12".parse::<Address>(),
            Err(AddressParseError::InvalidNetwork(_))
        ));
    }

    #[test]
    fn only_station_forms_are_stations() {
        assert!(Address::local(&[1]).is_station());
        assert!(Address::remote(5, &[1]).is_station());
        assert!(!Address::LocalBroadcast.is_station());
        assert!(!Address::GlobalBroadcast.is_station());
        assert!(!Address::RemoteBroadcast(5).is_station());
        assert!(!Address::Null.is_station());
        assert!(!Address::local(&[]).is_station());
        assert!(!Address::remote(5, &[]).is_station());
    }

    #[test]
    fn empty_mac_survives_serde() {
        for address in [Address::local(&[]), Address::remote(7, &[])] {
            let json = serde_json::to_string(&address).unwrap();
            let back: Address = serde_json::from_str(&json).unwrap();
            assert_eq!(back, address);
        }
        assert_eq!(Address::local(&[]).to_string(), "0x");
        assert_eq!(Address::remote(7, &[]).to_string(), "7:0x");
    }

    #[test]
    fn serializes_as_text() {
        let json = serde_json::to_string(&Address::remote(7, &[3])).unwrap();
        assert_eq!(json, "\"7:3\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Address::remote(7, &[3]));
        assert!(serde_json::from_str::<Address>("\"7:\"").is_err());
    }
}
