//! Bluetooth device address type.
//!
//! Addresses are kept as six raw bytes so that comparisons never depend on how
//! a backend or a user happened to spell them. Parsing accepts either case and
//! display is always canonical uppercase.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Address prefix assigned to CHIPSEA Technologies, the MCU vendor of the Yoda1.
pub const YODA_ADDRESS_PREFIX: [u8; 3] = [0x50, 0xFB, 0x19];

/// A Bluetooth MAC address stored as a compact 6-byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Returns `true` if the leading octets of the address equal `prefix`.
    pub fn has_prefix(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Errors returned when parsing a MAC address string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseMacError {
    #[error("invalid MAC address: expected 6 parts, got {0}")]
    InvalidLength(usize),
    #[error("invalid MAC address: part {0} has wrong length")]
    InvalidPartLength(usize),
    #[error("invalid MAC address: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 6 {
            return Err(ParseMacError::InvalidLength(parts.len()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParseMacError::InvalidPartLength(i));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseMacError::InvalidHex(part.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(feature = "bluer")]
impl From<MacAddress> for bluer::Address {
    fn from(addr: MacAddress) -> Self {
        bluer::Address(addr.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let addr = MacAddress([0x50, 0xFB, 0x19, 0x0A, 0xBC, 0xDE]);
        assert_eq!(format!("{}", addr), "50:FB:19:0A:BC:DE");
    }

    #[test]
    fn test_display_pads_single_digit_bytes() {
        let addr = MacAddress([0x50, 0xFB, 0x19, 0x00, 0x0F, 0x01]);
        assert_eq!(addr.to_string(), "50:FB:19:00:0F:01");
    }

    #[test]
    fn test_from_str_is_case_insensitive() {
        let upper: MacAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        let lower: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let mixed: MacAddress = "aA:Bb:cC:dD:Ee:fF".parse().unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper, mixed);
        assert_eq!(upper.0, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn test_from_str_trims_whitespace() {
        let addr: MacAddress = " 50:fb:19:00:00:01\n".parse().unwrap();
        assert_eq!(addr.to_string(), "50:FB:19:00:00:01");
    }

    #[test]
    fn test_from_str_rejects_malformed_addresses() {
        assert!(matches!(
            "yoda1".parse::<MacAddress>(),
            Err(ParseMacError::InvalidLength(1))
        ));
        assert!(matches!(
            "50:FB:19".parse::<MacAddress>(),
            Err(ParseMacError::InvalidLength(3))
        ));
        assert!(matches!(
            "50:FB:19:00:00:ZZ".parse::<MacAddress>(),
            Err(ParseMacError::InvalidHex(_))
        ));
        assert!(matches!(
            "AA:BB:CC:DD:EE:F".parse::<MacAddress>(),
            Err(ParseMacError::InvalidPartLength(5))
        ));
    }

    #[test]
    fn test_has_prefix() {
        let yoda: MacAddress = "50:fb:19:12:34:56".parse().unwrap();
        let other: MacAddress = "50:FB:18:12:34:56".parse().unwrap();
        assert!(yoda.has_prefix(&YODA_ADDRESS_PREFIX));
        assert!(!other.has_prefix(&YODA_ADDRESS_PREFIX));
        assert!(yoda.has_prefix(&[]));
    }

    #[test]
    fn test_hash_equality() {
        use std::collections::HashSet;

        let addr1: MacAddress = "50:FB:19:00:00:01".parse().unwrap();
        let addr2: MacAddress = "50:fb:19:00:00:01".parse().unwrap();

        let mut seen = HashSet::new();
        seen.insert(addr1);

        assert!(seen.contains(&addr2));
    }
}
