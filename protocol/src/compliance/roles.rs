//! Role bindings and mint allowances.
//!
//! Every role resolves to at most one address. Reassigning a role is a
//! single map write, so the new holder is visible to the very next check and
//! the previous holder loses the role in the same step.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::ComplianceError;
use crate::address::Address;

/// Compliance roles of the token-issuance module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Administers MasterMinter, Blacklister, Pauser and itself.
    Owner,
    /// Appoints the MinterController.
    MasterMinter,
    /// Appoints the Minter and sets its allowance.
    MinterController,
    /// The only address allowed to mint (and burn).
    Minter,
    /// The only address allowed to mutate the blacklist.
    Blacklister,
    /// The only address allowed to flip the pause switch.
    Pauser,
}

impl Role {
    /// Every role, in administrative order.
    pub const ALL: [Role; 6] = [
        Role::Owner,
        Role::MasterMinter,
        Role::MinterController,
        Role::Minter,
        Role::Blacklister,
        Role::Pauser,
    ];

    /// The role whose holder may reassign this one.
    pub fn administered_by(self) -> Role {
        match self {
            Role::Owner | Role::MasterMinter | Role::Blacklister | Role::Pauser => Role::Owner,
            Role::MinterController => Role::MasterMinter,
            Role::Minter => Role::MinterController,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Owner => write!(f, "Owner"),
            Role::MasterMinter => write!(f, "MasterMinter"),
            Role::MinterController => write!(f, "MinterController"),
            Role::Minter => write!(f, "Minter"),
            Role::Blacklister => write!(f, "Blacklister"),
            Role::Pauser => write!(f, "Pauser"),
        }
    }
}

/// Current role holders plus the Minter's remaining allowance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleRegistry {
    bindings: HashMap<Role, Address>,
    allowances: HashMap<Address, u64>,
}

impl RoleRegistry {
    /// An empty registry: every role unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder of `role`, if bound.
    pub fn holder_of(&self, role: Role) -> Option<Address> {
        self.bindings.get(&role).copied()
    }

    /// Whether `address` currently holds `role`.
    pub fn holds(&self, role: Role, address: &Address) -> bool {
        self.bindings.get(&role) == Some(address)
    }

    /// The single authorization check used by every privileged operation.
    ///
    /// An unset role fails closed.
    pub fn require(&self, role: Role, caller: &Address) -> Result<(), ComplianceError> {
        if self.holds(role, caller) {
            Ok(())
        } else {
            Err(ComplianceError::Unauthorized {
                role,
                caller: *caller,
            })
        }
    }

    /// Reassigns `role` to `address` on behalf of `caller`.
    ///
    /// `caller` must hold [`Role::administered_by`]. Returns the previous
    /// holder.
    pub fn assign_role(
        &mut self,
        caller: &Address,
        role: Role,
        address: Address,
    ) -> Result<Option<Address>, ComplianceError> {
        self.require(role.administered_by(), caller)?;
        Ok(self.bind(role, address))
    }

    /// Unchecked binding, for genesis and for callers that already ran
    /// [`require`](Self::require).
    pub(crate) fn bind(&mut self, role: Role, address: Address) -> Option<Address> {
        self.bindings.insert(role, address)
    }

    /// Unbinds `role`. Returns the previous holder.
    pub(crate) fn unbind(&mut self, role: Role) -> Option<Address> {
        self.bindings.remove(&role)
    }

    /// Remaining mint allowance of `minter`.
    pub fn allowance(&self, minter: &Address) -> u64 {
        self.allowances.get(minter).copied().unwrap_or(0)
    }

    pub(crate) fn set_allowance(&mut self, minter: Address, amount: u64) {
        if amount == 0 {
            self.allowances.remove(&minter);
        } else {
            self.allowances.insert(minter, amount);
        }
    }

    /// Checks that `minter` may mint `amount` without touching state.
    pub fn check_allowance(&self, minter: &Address, amount: u64) -> Result<(), ComplianceError> {
        let remaining = self.allowance(minter);
        if amount > remaining {
            return Err(ComplianceError::AllowanceExceeded {
                minter: *minter,
                requested: amount,
                remaining,
            });
        }
        Ok(())
    }

    /// Decrements the allowance of `minter` by `amount`.
    pub(crate) fn consume_allowance(
        &mut self,
        minter: &Address,
        amount: u64,
    ) -> Result<u64, ComplianceError> {
        self.check_allowance(minter, amount)?;
        let remaining = self.allowance(minter) - amount;
        self.set_allowance(*minter, remaining);
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    fn registry_with_owner() -> RoleRegistry {
        let mut registry = RoleRegistry::new();
        registry.bind(Role::Owner, addr("owner"));
        registry
    }

    #[test]
    fn unset_role_fails_closed() {
        let registry = RoleRegistry::new();
        assert_eq!(registry.holder_of(Role::Pauser), None);
        assert!(matches!(
            registry.require(Role::Pauser, &addr("anyone")),
            Err(ComplianceError::Unauthorized { role: Role::Pauser, .. })
        ));
    }

    #[test]
    fn owner_appoints_master_minter() {
        let mut registry = registry_with_owner();
        let prev = registry
            .assign_role(&addr("owner"), Role::MasterMinter, addr("mm"))
            .unwrap();
        assert_eq!(prev, None);
        assert_eq!(registry.holder_of(Role::MasterMinter), Some(addr("mm")));
    }

    #[test]
    fn master_minter_cannot_appoint_pauser() {
        let mut registry = registry_with_owner();
        registry.bind(Role::MasterMinter, addr("mm"));
        let result = registry.assign_role(&addr("mm"), Role::Pauser, addr("p"));
        assert!(matches!(
            result,
            Err(ComplianceError::Unauthorized { role: Role::Owner, .. })
        ));
        assert_eq!(registry.holder_of(Role::Pauser), None);
    }

    #[test]
    fn reassignment_is_immediately_visible() {
        let mut registry = registry_with_owner();
        registry.bind(Role::MasterMinter, addr("mm"));
        registry
            .assign_role(&addr("mm"), Role::MinterController, addr("c1"))
            .unwrap();
        let prev = registry
            .assign_role(&addr("mm"), Role::MinterController, addr("c2"))
            .unwrap();
        assert_eq!(prev, Some(addr("c1")));
        assert!(registry.require(Role::MinterController, &addr("c1")).is_err());
        assert!(registry.require(Role::MinterController, &addr("c2")).is_ok());
    }

    #[test]
    fn administration_chain() {
        assert_eq!(Role::Minter.administered_by(), Role::MinterController);
        assert_eq!(Role::MinterController.administered_by(), Role::MasterMinter);
        for role in [Role::Owner, Role::MasterMinter, Role::Blacklister, Role::Pauser] {
            assert_eq!(role.administered_by(), Role::Owner);
        }
    }

    #[test]
    fn allowance_is_consumed_and_never_negative() {
        let mut registry = RoleRegistry::new();
        let minter = addr("minter");
        registry.set_allowance(minter, 100);

        assert_eq!(registry.consume_allowance(&minter, 60).unwrap(), 40);
        assert!(matches!(
            registry.consume_allowance(&minter, 41),
            Err(ComplianceError::AllowanceExceeded { requested: 41, remaining: 40, .. })
        ));
        assert_eq!(registry.allowance(&minter), 40);
        assert_eq!(registry.consume_allowance(&minter, 40).unwrap(), 0);
        assert_eq!(registry.allowance(&minter), 0);
    }
}
