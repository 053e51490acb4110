//! Error types for the compliance layer.
//!
//! [`Denial`] is the closed set of reasons the transfer gate can refuse a
//! transfer. It is serializable because a receive-side denial travels back
//! to the origin chain inside an error acknowledgement.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::delegation::DelegationError;
use super::roles::Role;
use crate::address::Address;

/// Why the transfer gate refused a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Denial {
    /// The asset is paused.
    #[error("asset is paused")]
    AssetPaused,

    /// The sending address is blacklisted.
    #[error("sender is blacklisted")]
    SenderBlacklisted,

    /// The receiving address is blacklisted.
    #[error("receiver is blacklisted")]
    ReceiverBlacklisted,

    /// A delegate acting for the sender is blacklisted.
    #[error("acting party is blacklisted")]
    ActingPartyBlacklisted,

    /// The acting party holds no usable grant from the sender.
    #[error("no delegation grant authorizes the acting party")]
    NoSuchGrant,

    /// The grant's remaining spend limit is smaller than the amount.
    #[error("delegation limit exceeded: requested {requested}, remaining {remaining}")]
    LimitExceeded {
        /// Amount of the transfer.
        requested: u64,
        /// Amount the grant still allows.
        remaining: u64,
    },

    /// The sender's spendable balance is too small.
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Spendable (non-escrowed) balance.
        available: u64,
        /// Amount of the transfer.
        requested: u64,
    },
}

impl Denial {
    /// Stable snake_case name, for log fields and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Denial::AssetPaused => "asset_paused",
            Denial::SenderBlacklisted => "sender_blacklisted",
            Denial::ReceiverBlacklisted => "receiver_blacklisted",
            Denial::ActingPartyBlacklisted => "acting_party_blacklisted",
            Denial::NoSuchGrant => "no_such_grant",
            Denial::LimitExceeded { .. } => "limit_exceeded",
            Denial::InsufficientFunds { .. } => "insufficient_funds",
        }
    }
}

impl From<DelegationError> for Denial {
    fn from(err: DelegationError) -> Self {
        match err {
            DelegationError::NoSuchGrant { .. } => Denial::NoSuchGrant,
            DelegationError::LimitExceeded {
                requested,
                remaining,
            } => Denial::LimitExceeded {
                requested,
                remaining,
            },
        }
    }
}

/// Failures of privileged compliance operations and of the mint path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComplianceError {
    /// The caller does not hold the role the operation requires.
    #[error("unauthorized: {caller} does not hold role {role}")]
    Unauthorized {
        /// Role the operation requires.
        role: Role,
        /// Asserted caller.
        caller: Address,
    },

    /// The minter's remaining allowance is too small.
    #[error("mint allowance exceeded: requested {requested}, remaining {remaining}")]
    AllowanceExceeded {
        /// The minter.
        minter: Address,
        /// Amount requested.
        requested: u64,
        /// Allowance left.
        remaining: u64,
    },

    /// The transfer gate refused the mint or burn.
    #[error("denied: {0}")]
    Denied(#[from] Denial),
}
