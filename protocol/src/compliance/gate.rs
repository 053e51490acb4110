//! # Transfer Gate
//!
//! The policy engine. Given a proposed transfer it answers admit or deny,
//! reading the pause switch, the blacklist and the delegation grants, and
//! (for outbound transfers) the sender's spendable balance.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. pause switch → [`Denial::AssetPaused`]
//! 2. sender blacklisted → [`Denial::SenderBlacklisted`]
//! 3. receiver blacklisted → [`Denial::ReceiverBlacklisted`]
//! 4. acting party ≠ sender: acting party blacklisted →
//!    [`Denial::ActingPartyBlacklisted`], then the delegation grant →
//!    [`Denial::NoSuchGrant`] / [`Denial::LimitExceeded`]
//! 5. outbound only: spendable balance → [`Denial::InsufficientFunds`]
//!
//! Evaluation changes nothing. An [`Admission`] carries the grant charge
//! the caller must apply in the same step as its ledger mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::blacklist::BlacklistStore;
use super::delegation::{Authorization, DelegationResolver, GrantAction};
use super::error::Denial;
use super::pause::PauseSwitch;
use crate::address::Address;

/// Which leg of a transfer is being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferDirection {
    /// Funds leave the sender on this chain (local send, packet send, burn).
    Outbound,
    /// Funds arrive on this chain (packet receive, mint).
    Inbound,
}

/// A proposed movement of funds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferIntent {
    /// Who submitted the operation.
    pub acting: Address,
    /// Whose funds move.
    pub sender: Address,
    /// Who receives them.
    pub receiver: Address,
    /// Local denomination of the funds.
    pub denom: String,
    pub amount: u64,
    pub direction: TransferDirection,
    /// Grant action a delegate would need.
    pub action: GrantAction,
}

/// Source of spendable balances for the funds check.
pub trait BalanceView {
    /// Balance of `address` that is not locked in escrow.
    fn spendable(&self, address: &Address, denom: &str) -> u64;
}

/// A positive decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// How the acting party was authorized; consume it when committing.
    pub authorization: Authorization,
}

/// Read-only view over one chain's compliance state.
#[derive(Debug, Clone, Copy)]
pub struct TransferGate<'a> {
    pause: &'a PauseSwitch,
    blacklist: &'a BlacklistStore,
    delegations: &'a DelegationResolver,
    now: DateTime<Utc>,
}

impl<'a> TransferGate<'a> {
    pub fn new(
        pause: &'a PauseSwitch,
        blacklist: &'a BlacklistStore,
        delegations: &'a DelegationResolver,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            pause,
            blacklist,
            delegations,
            now,
        }
    }

    /// Evaluates `intent` against the compliance policy.
    pub fn evaluate(
        &self,
        intent: &TransferIntent,
        balances: &impl BalanceView,
    ) -> Result<Admission, Denial> {
        let decision = self.decide(intent, balances);
        match &decision {
            Ok(_) => tracing::debug!(
                sender = %intent.sender,
                receiver = %intent.receiver,
                amount = intent.amount,
                direction = ?intent.direction,
                "transfer admitted"
            ),
            Err(reason) => tracing::debug!(
                sender = %intent.sender,
                receiver = %intent.receiver,
                amount = intent.amount,
                direction = ?intent.direction,
                %reason,
                "transfer denied"
            ),
        }
        decision
    }

    fn decide(
        &self,
        intent: &TransferIntent,
        balances: &impl BalanceView,
    ) -> Result<Admission, Denial> {
        if self.pause.is_paused() {
            return Err(Denial::AssetPaused);
        }
        if self.blacklist.is_blacklisted(&intent.sender) {
            return Err(Denial::SenderBlacklisted);
        }
        if self.blacklist.is_blacklisted(&intent.receiver) {
            return Err(Denial::ReceiverBlacklisted);
        }

        let authorization = if intent.acting != intent.sender {
            if self.blacklist.is_blacklisted(&intent.acting) {
                return Err(Denial::ActingPartyBlacklisted);
            }
            self.delegations.check(
                &intent.acting,
                &intent.sender,
                intent.action,
                intent.amount,
                self.now,
            )?
        } else {
            Authorization::Owner
        };

        if intent.direction == TransferDirection::Outbound {
            let available = balances.spendable(&intent.sender, &intent.denom);
            if available < intent.amount {
                return Err(Denial::InsufficientFunds {
                    available,
                    requested: intent.amount,
                });
            }
        }

        Ok(Admission { authorization })
    }
}
