//! # Compliance Module
//!
//! One instance per chain owns the role bindings, the blacklist, the pause
//! switch and the delegation grants for the chain's asset. Nothing here is
//! global: the chain passes the module by reference into every operation.
//!
//! Privileged operations are expressed as [`AdminOp`] variants. Each variant
//! knows the role it requires, and [`ComplianceModule::execute`] runs the
//! one authorization check for all of them before dispatching.

pub mod blacklist;
pub mod delegation;
pub mod gate;
pub mod pause;
pub mod roles;

mod error;

pub use blacklist::BlacklistStore;
pub use delegation::{
    Authorization, DelegationError, DelegationGrant, DelegationResolver, GrantAction, GrantLimit,
    GrantUse,
};
pub use error::{ComplianceError, Denial};
pub use gate::{Admission, BalanceView, TransferDirection, TransferGate, TransferIntent};
pub use pause::PauseSwitch;
pub use roles::{Role, RoleRegistry};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::config::ComplianceGenesis;

/// A privileged operation, tagged with the role it requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminOp {
    /// Rebind `role` to `address`. Requires `role.administered_by()`.
    AssignRole { role: Role, address: Address },
    /// Appoint the Minter and set its allowance.
    ConfigureMinter { minter: Address, allowance: u64 },
    /// Unset the Minter and zero its allowance.
    RemoveMinter,
    Blacklist(Address),
    Unblacklist(Address),
    Pause,
    Unpause,
}

impl AdminOp {
    /// The role the caller must hold.
    pub fn required_role(&self) -> Role {
        match self {
            AdminOp::AssignRole { role, .. } => role.administered_by(),
            AdminOp::ConfigureMinter { .. } | AdminOp::RemoveMinter => Role::MinterController,
            AdminOp::Blacklist(_) | AdminOp::Unblacklist(_) => Role::Blacklister,
            AdminOp::Pause | AdminOp::Unpause => Role::Pauser,
        }
    }
}

/// Compliance state of one chain.
#[derive(Debug, Clone, Default)]
pub struct ComplianceModule {
    roles: RoleRegistry,
    blacklist: BlacklistStore,
    pause: PauseSwitch,
    delegations: DelegationResolver,
}

impl ComplianceModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the module from genesis, binding every configured role.
    pub fn from_genesis(genesis: &ComplianceGenesis) -> Self {
        let mut module = Self::new();
        let bindings = [
            (Role::Owner, genesis.owner),
            (Role::MasterMinter, genesis.master_minter),
            (Role::MinterController, genesis.minter_controller),
            (Role::Minter, genesis.minter),
            (Role::Blacklister, genesis.blacklister),
            (Role::Pauser, genesis.pauser),
        ];
        for (role, holder) in bindings {
            if let Some(address) = holder {
                module.roles.bind(role, address);
            }
        }
        if let Some(minter) = genesis.minter {
            module.roles.set_allowance(minter, genesis.minter_allowance);
        }
        for address in &genesis.blacklisted {
            module.blacklist.blacklist(*address);
        }
        if genesis.paused {
            module.pause.pause();
        }
        module
    }

    /// Zeroes the allowance of a minter that was just replaced by `next`.
    fn retire_minter(&mut self, previous: Option<Address>, next: &Address) {
        if let Some(old) = previous.filter(|old| old != next) {
            self.roles.set_allowance(old, 0);
        }
    }

    /// Runs a privileged operation on behalf of `caller`.
    ///
    /// Returns whether state changed; repeating an idempotent operation
    /// succeeds with `false`.
    pub fn execute(&mut self, caller: &Address, op: &AdminOp) -> Result<bool, ComplianceError> {
        self.roles.require(op.required_role(), caller)?;

        let changed = match op {
            AdminOp::AssignRole { role, address } => {
                let previous = self.roles.bind(*role, *address);
                if *role == Role::Minter {
                    self.retire_minter(previous, address);
                }
                previous != Some(*address)
            }
            AdminOp::ConfigureMinter { minter, allowance } => {
                let previous = self.roles.bind(Role::Minter, *minter);
                self.retire_minter(previous, minter);
                let changed =
                    previous != Some(*minter) || self.roles.allowance(minter) != *allowance;
                self.roles.set_allowance(*minter, *allowance);
                changed
            }
            AdminOp::RemoveMinter => match self.roles.unbind(Role::Minter) {
                Some(old) => {
                    self.roles.set_allowance(old, 0);
                    true
                }
                None => false,
            },
            AdminOp::Blacklist(address) => self.blacklist.blacklist(*address),
            AdminOp::Unblacklist(address) => self.blacklist.unblacklist(address),
            AdminOp::Pause => self.pause.pause(),
            AdminOp::Unpause => self.pause.unpause(),
        };

        tracing::info!(caller = %caller, ?op, changed, "admin operation applied");
        Ok(changed)
    }

    /// Gate over the current state, evaluated at block time `now`.
    pub fn gate(&self, now: DateTime<Utc>) -> TransferGate<'_> {
        TransferGate::new(&self.pause, &self.blacklist, &self.delegations, now)
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    pub(crate) fn roles_mut(&mut self) -> &mut RoleRegistry {
        &mut self.roles
    }

    pub fn blacklist(&self) -> &BlacklistStore {
        &self.blacklist
    }

    pub fn pause_switch(&self) -> &PauseSwitch {
        &self.pause
    }

    pub fn delegations(&self) -> &DelegationResolver {
        &self.delegations
    }

    /// Grants are managed by their granter, not by a compliance role.
    pub fn delegations_mut(&mut self) -> &mut DelegationResolver {
        &mut self.delegations
    }

    pub fn holder_of(&self, role: Role) -> Option<Address> {
        self.roles.holder_of(role)
    }

    pub fn is_blacklisted(&self, address: &Address) -> bool {
        self.blacklist.is_blacklisted(address)
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }
}
