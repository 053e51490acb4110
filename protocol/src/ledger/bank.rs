//! # Bank Keeper
//!
//! The account/bank collaborator the ledger is built on: balances per
//! (address, denomination), total supply per denomination, and the four
//! primitive moves (send, mint, burn, query). Every primitive is atomic. It
//! either applies completely or returns an error and leaves state untouched,
//! rejecting underflow and overflow instead of wrapping.
//!
//! [`InMemoryBank`] is the implementation used by tests and the simulator.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::address::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    #[error("insufficient balance of {denom} at {address}: available {available}, requested {requested}")]
    InsufficientBalance {
        address: Address,
        denom: String,
        available: u64,
        requested: u64,
    },

    #[error("balance or supply overflow for {denom}")]
    Overflow { denom: String },
}

// ---------------------------------------------------------------------------
// Keeper Trait
// ---------------------------------------------------------------------------

/// Balance store with atomic credit and debit.
pub trait BankKeeper {
    fn balance(&self, address: &Address, denom: &str) -> u64;

    fn supply(&self, denom: &str) -> u64;

    /// Moves `amount` from `from` to `to`.
    fn send(
        &mut self,
        from: &Address,
        to: &Address,
        denom: &str,
        amount: u64,
    ) -> Result<(), BankError>;

    /// Creates `amount` at `to`, increasing supply.
    fn mint(&mut self, to: &Address, denom: &str, amount: u64) -> Result<(), BankError>;

    /// Destroys `amount` held by `from`, decreasing supply.
    fn burn(&mut self, from: &Address, denom: &str, amount: u64) -> Result<(), BankError>;

    /// Every non-zero holder of `denom`, in address order.
    fn holders(&self, denom: &str) -> Vec<(Address, u64)>;

    /// Sum of all balances of `denom`. Widened so the sum itself cannot
    /// overflow.
    fn total_held(&self, denom: &str) -> u128 {
        self.holders(denom)
            .iter()
            .map(|(_, amount)| *amount as u128)
            .sum()
    }
}

// ---------------------------------------------------------------------------
// In-Memory Implementation
// ---------------------------------------------------------------------------

/// A [`BankKeeper`] over ordered maps, so iteration is deterministic.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBank {
    balances: BTreeMap<String, BTreeMap<Address, u64>>,
    supply: BTreeMap<String, u64>,
}

impl InMemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Denominations with a non-zero supply.
    pub fn denoms(&self) -> Vec<String> {
        self.supply.keys().cloned().collect()
    }

    fn debit_target(&self, address: &Address, denom: &str, amount: u64) -> Result<u64, BankError> {
        let available = self.balance(address, denom);
        available
            .checked_sub(amount)
            .ok_or_else(|| BankError::InsufficientBalance {
                address: *address,
                denom: denom.to_string(),
                available,
                requested: amount,
            })
    }

    fn credit_target(&self, address: &Address, denom: &str, amount: u64) -> Result<u64, BankError> {
        self.balance(address, denom)
            .checked_add(amount)
            .ok_or_else(|| BankError::Overflow {
                denom: denom.to_string(),
            })
    }

    fn set_balance(&mut self, address: Address, denom: &str, amount: u64) {
        if amount == 0 {
            if let Some(accounts) = self.balances.get_mut(denom) {
                accounts.remove(&address);
                if accounts.is_empty() {
                    self.balances.remove(denom);
                }
            }
        } else {
            self.balances
                .entry(denom.to_string())
                .or_default()
                .insert(address, amount);
        }
    }

    fn set_supply(&mut self, denom: &str, amount: u64) {
        if amount == 0 {
            self.supply.remove(denom);
        } else {
            self.supply.insert(denom.to_string(), amount);
        }
    }
}

impl BankKeeper for InMemoryBank {
    fn balance(&self, address: &Address, denom: &str) -> u64 {
        self.balances
            .get(denom)
            .and_then(|accounts| accounts.get(address))
            .copied()
            .unwrap_or(0)
    }

    fn supply(&self, denom: &str) -> u64 {
        self.supply.get(denom).copied().unwrap_or(0)
    }

    fn send(
        &mut self,
        from: &Address,
        to: &Address,
        denom: &str,
        amount: u64,
    ) -> Result<(), BankError> {
        let from_after = self.debit_target(from, denom, amount)?;
        if from == to {
            return Ok(());
        }
        let to_after = self.credit_target(to, denom, amount)?;
        self.set_balance(*from, denom, from_after);
        self.set_balance(*to, denom, to_after);
        Ok(())
    }

    fn mint(&mut self, to: &Address, denom: &str, amount: u64) -> Result<(), BankError> {
        let supply_after = self
            .supply(denom)
            .checked_add(amount)
            .ok_or_else(|| BankError::Overflow {
                denom: denom.to_string(),
            })?;
        let to_after = self.credit_target(to, denom, amount)?;
        self.set_supply(denom, supply_after);
        self.set_balance(*to, denom, to_after);
        Ok(())
    }

    fn burn(&mut self, from: &Address, denom: &str, amount: u64) -> Result<(), BankError> {
        let from_after = self.debit_target(from, denom, amount)?;
        // Supply covers every single balance.
        let supply_after = self.supply(denom).saturating_sub(amount);
        self.set_balance(*from, denom, from_after);
        self.set_supply(denom, supply_after);
        Ok(())
    }

    fn holders(&self, denom: &str) -> Vec<(Address, u64)> {
        self.balances
            .get(denom)
            .map(|accounts| accounts.iter().map(|(a, v)| (*a, *v)).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
