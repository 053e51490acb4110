//! # Account Addresses
//!
//! Every account on both chains is a 20-byte identifier. Chains render the
//! same bytes with different bech32 prefixes (`noble1…`, `cosmos1…`), and
//! compliance state is keyed by the bytes, not the rendering: an account
//! blacklisted on one chain is still recognised when a packet names it with
//! the counterparty's prefix.
//!
//! Module accounts (the transfer module, the fee collector, channel escrow
//! accounts) are derived deterministically with SHA-256 so every node agrees
//! on them without configuration.

use std::fmt;
use std::str::FromStr;

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of an account address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while parsing or rendering addresses.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The string is not valid bech32.
    #[error("invalid bech32 address '{input}': {reason}")]
    InvalidBech32 {
        /// The rejected input.
        input: String,
        /// Decoder message.
        reason: String,
    },

    /// The human-readable prefix is not usable.
    #[error("invalid bech32 prefix '{0}'")]
    InvalidPrefix(String),

    /// The decoded payload is not 20 bytes.
    #[error("invalid address length: expected {ADDRESS_LENGTH} bytes, got {0}")]
    InvalidLength(usize),

    /// Hex input could not be decoded.
    #[error("invalid hex address '{0}'")]
    InvalidHex(String),
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte account identifier, independent of any chain prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// Wraps raw address bytes.
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Builds an address from a byte slice of exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        let arr: [u8; ADDRESS_LENGTH] = bytes
            .try_into()
            .map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Derives a stable address from a human label (`sha256(label)[..20]`).
    ///
    /// Used for named accounts in genesis files and tests, where no key
    /// material exists.
    pub fn from_label(label: &str) -> Self {
        Self::truncated_hash(label.as_bytes())
    }

    /// Address of a named module account (`sha256(name)[..20]`).
    pub fn module(name: &str) -> Self {
        Self::truncated_hash(name.as_bytes())
    }

    /// Escrow account holding native tokens sent out over `port/channel`.
    ///
    /// `sha256(version || 0x00 || "port/channel")[..20]`, the derivation the
    /// ICS-20 transfer application uses, so escrow accounts line up with
    /// what a counterparty explorer would show.
    pub fn channel_escrow(version: &str, port_id: &str, channel_id: &str) -> Self {
        let mut preimage =
            Vec::with_capacity(version.len() + 1 + port_id.len() + channel_id.len() + 1);
        preimage.extend_from_slice(version.as_bytes());
        preimage.push(0);
        preimage.extend_from_slice(format!("{port_id}/{channel_id}").as_bytes());
        Self::truncated_hash(&preimage)
    }

    /// Decodes a bech32 address with any prefix.
    pub fn from_bech32(s: &str) -> Result<Self, AddressError> {
        let (_hrp, data) = bech32::decode(s).map_err(|e| AddressError::InvalidBech32 {
            input: s.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_slice(&data)
    }

    /// Renders the address with the given bech32 prefix.
    pub fn to_bech32(&self, prefix: &str) -> Result<String, AddressError> {
        let hrp = Hrp::parse(prefix).map_err(|_| AddressError::InvalidPrefix(prefix.to_string()))?;
        bech32::encode::<Bech32>(hrp, &self.0)
            .map_err(|_| AddressError::InvalidPrefix(prefix.to_string()))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Lower-case hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn truncated_hash(preimage: &[u8]) -> Self {
        let digest = Sha256::digest(preimage);
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest[..ADDRESS_LENGTH]);
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

/// Accepts either 40 hex characters or a bech32 string with any prefix.
impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == ADDRESS_LENGTH * 2 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            let bytes = hex::decode(s).map_err(|_| AddressError::InvalidHex(s.to_string()))?;
            return Self::from_slice(&bytes);
        }
        Self::from_bech32(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_under_different_prefixes_are_equal() {
        let user = Address::from_label("user");
        let noble = user.to_bech32("noble").unwrap();
        let cosmos = user.to_bech32("cosmos").unwrap();

        assert!(noble.starts_with("noble1"));
        assert!(cosmos.starts_with("cosmos1"));
        assert_eq!(Address::from_bech32(&noble).unwrap(), user);
        assert_eq!(Address::from_bech32(&cosmos).unwrap(), user);
    }

    #[test]
    fn parse_accepts_hex_and_bech32() {
        let addr = Address::from_label("alice");
        assert_eq!(addr.to_hex().parse::<Address>().unwrap(), addr);
        assert_eq!(addr.to_bech32("noble").unwrap().parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn wrong_length_payload_rejected() {
        let hrp = Hrp::parse("noble").unwrap();
        let short = bech32::encode::<Bech32>(hrp, &[1u8; 8]).unwrap();
        assert_eq!(
            Address::from_bech32(&short),
            Err(AddressError::InvalidLength(8))
        );
    }

    #[test]
    fn garbage_rejected() {
        assert!(matches!(
            "not-an-address".parse::<Address>(),
            Err(AddressError::InvalidBech32 { .. })
        ));
    }

    #[test]
    fn escrow_accounts_differ_per_channel() {
        let a = Address::channel_escrow("ics20-1", "transfer", "channel-0");
        let b = Address::channel_escrow("ics20-1", "transfer", "channel-1");
        assert_ne!(a, b);
        assert_ne!(a, Address::module("transfer"));
    }

    #[test]
    fn serde_uses_hex() {
        let addr = Address::from_label("bob");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr.to_hex()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
