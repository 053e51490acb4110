// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # tokengate: Compliance-Gated Cross-Chain Transfers
//!
//! The core of a regulated token that moves between two chains over a
//! packet-relayed channel. Every stage of a transfer (local send, packet
//! commit, counterparty receive, acknowledgement, timeout) is checked
//! against the same compliance policy, and the ledger never diverges from
//! that policy however packets are delivered.
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! - **address**: 20-byte accounts, rendered in bech32 under any prefix.
//! - **config**: protocol constants and the serde types a chain is built from.
//! - **compliance**: roles, blacklist, pause switch, delegation grants and
//!   the transfer gate that composes them.
//! - **ledger**: balances over a bank keeper, escrow records and
//!   conservation accounting.
//! - **packet**: packet types, denomination traces, the transport seam and
//!   the per-transfer lifecycle coordinator.
//! - **chain**: one chain process owning one of each of the above.
//! - **relayer**: moves packets between two in-process chains.
//!
//! ## Ground Rules
//!
//! 1. No global state. A chain owns its state and every operation borrows it.
//! 2. Every denial names its reason, on this chain or the counterparty.
//! 3. Amount arithmetic is checked; library code does not panic on input.

pub mod address;
pub mod chain;
pub mod compliance;
pub mod config;
pub mod events;
pub mod ledger;
pub mod packet;
pub mod relayer;

pub use address::Address;
pub use chain::{BlockInfo, Chain, ChainError};
pub use compliance::{AdminOp, Denial, GrantAction, GrantLimit, Role};
pub use packet::{Acknowledgement, Resolution, TransferRequest};
