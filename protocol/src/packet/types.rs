//! Packet, acknowledgement and timeout types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::compliance::Denial;

/// Per-channel packet sequence number, starting at 1.
pub type Sequence = u64;

/// Fungible token transfer payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketData {
    /// Full trace path of the token as seen by the sender.
    pub denom: String,
    pub amount: u64,
    /// Fee the receiving chain deducts from the credit.
    pub fee: u64,
    /// Sender address in the sending chain's bech32 form.
    pub sender: String,
    /// Receiver address as given by the sender.
    pub receiver: String,
    #[serde(default)]
    pub memo: String,
}

impl PacketData {
    /// Hex SHA-256 of the JSON form. A local audit handle, not wire bytes.
    pub fn commitment(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// When a packet stops being receivable on the destination chain.
///
/// A bound that is `None` never expires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeout {
    pub height: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Timeout {
    pub fn at_time(timestamp: DateTime<Utc>) -> Self {
        Self {
            height: None,
            timestamp: Some(timestamp),
        }
    }

    pub fn at_height(height: u64) -> Self {
        Self {
            height: Some(height),
            timestamp: None,
        }
    }

    /// Whether a destination at `height` / `time` must refuse the packet.
    pub fn has_expired(&self, height: u64, time: DateTime<Utc>) -> bool {
        self.height.is_some_and(|h| height >= h) || self.timestamp.is_some_and(|t| time >= t)
    }
}

/// A packet handed to the transport. The transport assigns the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPacket {
    pub source_port: String,
    pub source_channel: String,
    pub destination_port: String,
    pub destination_channel: String,
    pub data: PacketData,
    pub timeout: Timeout,
}

/// A committed packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub sequence: Sequence,
    pub source_port: String,
    pub source_channel: String,
    pub destination_port: String,
    pub destination_channel: String,
    pub data: PacketData,
    pub timeout: Timeout,
}

impl Packet {
    pub fn from_outbound(sequence: Sequence, packet: OutboundPacket) -> Self {
        Self {
            sequence,
            source_port: packet.source_port,
            source_channel: packet.source_channel,
            destination_port: packet.destination_port,
            destination_channel: packet.destination_channel,
            data: packet.data,
            timeout: packet.timeout,
        }
    }
}

/// Why the receiving chain refused a packet.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AckError {
    #[error("denied: {0}")]
    Denied(Denial),

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("ledger: {0}")]
    Ledger(String),
}

/// Result of receiving a packet, returned to the sending chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Acknowledgement {
    Success,
    Error(AckError),
}

impl Acknowledgement {
    pub fn is_success(&self) -> bool {
        matches!(self, Acknowledgement::Success)
    }

    /// The counterparty's denial, if that is why the packet failed.
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Acknowledgement::Error(AckError::Denied(denial)) => Some(denial),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn data() -> PacketData {
        PacketData {
            denom: "uusdc".into(),
            amount: 100,
            fee: 0,
            sender: "noble1sender".into(),
            receiver: "cosmos1receiver".into(),
            memo: String::new(),
        }
    }

    #[test]
    fn commitment_changes_with_payload() {
        let a = data().commitment().unwrap();
        let mut other = data();
        other.amount = 101;
        assert_ne!(a, other.commitment().unwrap());
        assert_eq!(a.len(), 64);
        assert_eq!(a, data().commitment().unwrap());
    }

    #[test]
    fn timeout_bounds() {
        let now = Utc::now();
        assert!(!Timeout::default().has_expired(u64::MAX, now));

        let by_height = Timeout::at_height(10);
        assert!(!by_height.has_expired(9, now));
        assert!(by_height.has_expired(10, now));

        let by_time = Timeout::at_time(now + Duration::seconds(5));
        assert!(!by_time.has_expired(0, now));
        assert!(by_time.has_expired(0, now + Duration::seconds(5)));
    }

    #[test]
    fn ack_exposes_denial() {
        let ack = Acknowledgement::Error(AckError::Denied(Denial::ReceiverBlacklisted));
        assert!(!ack.is_success());
        assert_eq!(ack.denial(), Some(&Denial::ReceiverBlacklisted));

        let json = serde_json::to_string(&ack).unwrap();
        let back: Acknowledgement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ack);
    }
}
