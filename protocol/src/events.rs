//! Events a chain records for every state-changing operation.
//!
//! The log is append-only and serializable, so the simulator can print it
//! and tests can assert on what happened without reaching into state.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::compliance::{AdminOp, Denial, GrantAction, GrantLimit};
use crate::packet::{Acknowledgement, Resolution, Sequence};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainEvent {
    AdminApplied {
        height: u64,
        caller: Address,
        op: AdminOp,
        changed: bool,
    },
    Minted {
        height: u64,
        minter: Address,
        to: Address,
        denom: String,
        amount: u64,
    },
    Burned {
        height: u64,
        minter: Address,
        denom: String,
        amount: u64,
    },
    Sent {
        height: u64,
        from: Address,
        to: Address,
        denom: String,
        amount: u64,
    },
    GrantCreated {
        height: u64,
        granter: Address,
        grantee: Address,
        action: GrantAction,
        limit: GrantLimit,
    },
    GrantRevoked {
        height: u64,
        granter: Address,
        grantee: Address,
        action: GrantAction,
    },
    TransferDenied {
        height: u64,
        acting: Address,
        sender: Address,
        amount: u64,
        reason: Denial,
    },
    PacketSent {
        height: u64,
        sequence: Sequence,
        sender: Address,
        receiver: String,
        denom: String,
        amount: u64,
        fee: u64,
    },
    PacketReceived {
        height: u64,
        sequence: Sequence,
        ack: Acknowledgement,
    },
    PacketResolved {
        height: u64,
        resolution: Resolution,
    },
}

impl ChainEvent {
    /// Short name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ChainEvent::AdminApplied { .. } => "admin_applied",
            ChainEvent::Minted { .. } => "minted",
            ChainEvent::Burned { .. } => "burned",
            ChainEvent::Sent { .. } => "sent",
            ChainEvent::GrantCreated { .. } => "grant_created",
            ChainEvent::GrantRevoked { .. } => "grant_revoked",
            ChainEvent::TransferDenied { .. } => "transfer_denied",
            ChainEvent::PacketSent { .. } => "packet_sent",
            ChainEvent::PacketReceived { .. } => "packet_received",
            ChainEvent::PacketResolved { .. } => "packet_resolved",
        }
    }
}
