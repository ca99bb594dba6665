//! TON account addresses.
//!
//! Two textual forms are accepted everywhere an address is parsed:
//!
//! - **raw**: `<workchain>:<64 hex chars>`, e.g. `0:83df...`
//! - **user-friendly**: 48 characters of base64 or base64url over 36 bytes
//!   (`tag | workchain | hash[32] | crc16[2]`). The tag carries the
//!   bounceable and testnet-only flags.
//!
//! Inside a cell only the workchain and hash matter, so [`TonAddress`]
//! itself carries no flags; [`FriendlyFlags`] is returned alongside it when
//! parsing the user-friendly form.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use crc::{Crc, CRC_16_XMODEM};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Checksum of the 34-byte friendly body.
const XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const FLAG_TESTNET: u8 = 0x80;
const FRIENDLY_LEN: usize = 48;

/// Address parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Neither the raw nor the user-friendly shape.
    #[error("unrecognized address format: {0}")]
    Format(String),

    /// Raw form workchain is not an 8-bit signed integer.
    #[error("invalid workchain: {0}")]
    Workchain(String),

    /// Raw form hash is not 64 hex characters.
    #[error("invalid account hash: {0}")]
    Hash(String),

    /// User-friendly form failed base64 decoding.
    #[error("invalid base64 in address")]
    Base64,

    /// User-friendly tag byte is not a known combination of flags.
    #[error("unknown address tag 0x{0:02x}")]
    Tag(u8),

    /// User-friendly checksum mismatch.
    #[error("address checksum mismatch")]
    Checksum,
}

/// Flags encoded in the user-friendly form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FriendlyFlags {
    /// Messages bounce back if the destination fails.
    pub bounceable: bool,
    /// Address is marked as testnet-only.
    pub testnet: bool,
}

impl Default for FriendlyFlags {
    fn default() -> Self {
        Self {
            bounceable: true,
            testnet: false,
        }
    }
}

/// A standard internal address: signed 8-bit workchain and 256-bit account
/// hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TonAddress {
    /// Workchain id (`0` basechain, `-1` masterchain).
    pub workchain: i8,
    /// Account id.
    pub hash: [u8; 32],
}

impl TonAddress {
    /// Builds an address from its parts.
    pub fn new(workchain: i8, hash: [u8; 32]) -> Self {
        Self { workchain, hash }
    }

    /// Parses either textual form, discarding friendly flags.
    pub fn parse(text: &str) -> Result<Self, AddressError> {
        Self::parse_with_flags(text).map(|(addr, _)| addr)
    }

    /// Parses either textual form. Raw addresses report default flags
    /// (bounceable, mainnet).
    pub fn parse_with_flags(text: &str) -> Result<(Self, FriendlyFlags), AddressError> {
        let text = text.trim();
        if text.contains(':') {
            return Self::from_raw(text).map(|a| (a, FriendlyFlags::default()));
        }
        if text.len() == FRIENDLY_LEN {
            return Self::from_friendly(text);
        }
        Err(AddressError::Format(text.to_string()))
    }

    /// Parses `<workchain>:<hex hash>`.
    pub fn from_raw(text: &str) -> Result<Self, AddressError> {
        let (wc, hash_hex) = text
            .split_once(':')
            .ok_or_else(|| AddressError::Format(text.to_string()))?;
        let workchain: i8 = wc
            .parse()
            .map_err(|_| AddressError::Workchain(wc.to_string()))?;
        let bytes = hex::decode(hash_hex).map_err(|_| AddressError::Hash(hash_hex.to_string()))?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AddressError::Hash(hash_hex.to_string()))?;
        Ok(Self { workchain, hash })
    }

    /// Parses the 48-character user-friendly form (either base64 alphabet).
    pub fn from_friendly(text: &str) -> Result<(Self, FriendlyFlags), AddressError> {
        let bytes = if text.contains('-') || text.contains('_') {
            URL_SAFE.decode(text)
        } else {
            STANDARD.decode(text)
        }
        .map_err(|_| AddressError::Base64)?;
        if bytes.len() != 36 {
            return Err(AddressError::Format(text.to_string()));
        }

        let expected = u16::from_be_bytes([bytes[34], bytes[35]]);
        if XMODEM.checksum(&bytes[..34]) != expected {
            return Err(AddressError::Checksum);
        }

        let tag = bytes[0];
        let testnet = tag & FLAG_TESTNET != 0;
        let bounceable = match tag & !FLAG_TESTNET {
            TAG_BOUNCEABLE => true,
            TAG_NON_BOUNCEABLE => false,
            _ => return Err(AddressError::Tag(tag)),
        };

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[2..34]);
        Ok((
            Self {
                workchain: bytes[1] as i8,
                hash,
            },
            FriendlyFlags {
                bounceable,
                testnet,
            },
        ))
    }

    /// `<workchain>:<hex hash>`.
    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash))
    }

    /// User-friendly form. `url_safe` selects the base64url alphabet.
    pub fn to_friendly(&self, flags: FriendlyFlags, url_safe: bool) -> String {
        let mut tag = if flags.bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        if flags.testnet {
            tag |= FLAG_TESTNET;
        }
        let mut bytes = Vec::with_capacity(36);
        bytes.push(tag);
        bytes.push(self.workchain as u8);
        bytes.extend_from_slice(&self.hash);
        let crc = XMODEM.checksum(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());
        if url_safe {
            URL_SAFE.encode(bytes)
        } else {
            STANDARD.encode(bytes)
        }
    }
}

impl fmt::Display for TonAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_raw())
    }
}

impl fmt::Debug for TonAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TonAddress({})", self.to_raw())
    }
}

impl FromStr for TonAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TonAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_raw())
    }
}

impl<'de> Deserialize<'de> for TonAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO_BOUNCEABLE: &str = "EQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAM9c";
    const ZERO_NON_BOUNCEABLE: &str = "UQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAJKZ";

    #[test]
    fn zero_address_friendly_forms() {
        let zero = TonAddress::new(0, [0u8; 32]);
        assert_eq!(zero.to_friendly(FriendlyFlags::default(), true), ZERO_BOUNCEABLE);
        let nb = FriendlyFlags {
            bounceable: false,
            testnet: false,
        };
        assert_eq!(zero.to_friendly(nb, true), ZERO_NON_BOUNCEABLE);

        let (parsed, flags) = TonAddress::from_friendly(ZERO_NON_BOUNCEABLE).unwrap();
        assert_eq!(parsed, zero);
        assert!(!flags.bounceable);
    }

    #[test]
    fn masterchain_uses_url_safe_alphabet() {
        let addr = TonAddress::new(-1, [0xAB; 32]);
        let url = addr.to_friendly(FriendlyFlags::default(), true);
        let std = addr.to_friendly(FriendlyFlags::default(), false);
        assert_eq!(url, "Ef-rq6urq6urq6urq6urq6urq6urq6urq6urq6urq6urqzps");
        assert_eq!(std, "Ef+rq6urq6urq6urq6urq6urq6urq6urq6urq6urq6urqzps");
        assert_eq!(TonAddress::parse(&url).unwrap(), addr);
        assert_eq!(TonAddress::parse(&std).unwrap(), addr);
    }

    #[test]
    fn testnet_flag_is_reported() {
        let (_, flags) =
            TonAddress::from_friendly("kQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAHTW").unwrap();
        assert!(flags.testnet);
        assert!(flags.bounceable);
    }

    #[test]
    fn raw_form_parses_and_prints() {
        let raw = format!("-1:{}", "ab".repeat(32));
        let addr: TonAddress = raw.parse().unwrap();
        assert_eq!(addr.workchain, -1);
        assert_eq!(addr.to_string(), raw);
    }

    #[test]
    fn xmodem_check_value() {
        assert_eq!(XMODEM.checksum(b"123456789"), 0x31C3);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut bad = ZERO_BOUNCEABLE.to_string();
        bad.replace_range(46..47, "A");
        assert_eq!(TonAddress::parse(&bad), Err(AddressError::Checksum));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            TonAddress::parse("not-an-address"),
            Err(AddressError::Format(_))
        ));
        assert!(matches!(
            TonAddress::parse("0:abcd"),
            Err(AddressError::Hash(_))
        ));
        assert!(matches!(
            TonAddress::parse("300:00"),
            Err(AddressError::Workchain(_))
        ));
    }
}
