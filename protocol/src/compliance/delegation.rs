//! # Delegated Transfer Authority
//!
//! An address may let another address move its funds through an explicit
//! grant. A grant names one action, carries a limit (unlimited, a spend
//! limit that decrements per use, or a one-shot authorization consumed by
//! its first use) and may expire at a block time.
//!
//! Authorization is split in two halves so the transfer gate can stay free
//! of side effects:
//!
//! - [`DelegationResolver::check`] decides, reading only;
//! - [`DelegationResolver::consume`] applies the decrement.
//!
//! The chain runs both inside the same `&mut` step as the ledger mutation,
//! which is what keeps one grant from being spent twice.
//! [`DelegationResolver::authorize`] is the two halves back to back.
//!
//! Grants are independent of the blacklist: blacklisting a grantee does not
//! revoke its grants, the gate refuses it at use time instead.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a delegated action was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DelegationError {
    /// No live grant for this (granter, grantee, action).
    #[error("no {action} grant from {granter} to {grantee}")]
    NoSuchGrant {
        granter: Address,
        grantee: Address,
        action: GrantAction,
    },

    /// The grant's remaining spend limit is too small.
    #[error("grant limit exceeded: requested {requested}, remaining {remaining}")]
    LimitExceeded { requested: u64, remaining: u64 },
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The action a grant permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantAction {
    /// Same-chain bank send.
    Send,
    /// Cross-chain transfer.
    Transfer,
}

impl fmt::Display for GrantAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantAction::Send => write!(f, "send"),
            GrantAction::Transfer => write!(f, "transfer"),
        }
    }
}

/// How much a grant permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantLimit {
    Unlimited,
    /// Remaining amount; decremented on each use. Stays at zero once
    /// exhausted so further use reports `LimitExceeded`.
    SpendLimit(u64),
    /// Any single amount, once.
    OneShot,
}

/// A delegation from `granter` to `grantee`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationGrant {
    pub granter: Address,
    pub grantee: Address,
    pub action: GrantAction,
    pub limit: GrantLimit,
    /// Block time at and after which the grant no longer exists.
    pub expiration: Option<DateTime<Utc>>,
}

impl DelegationGrant {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|exp| now >= exp)
    }
}

/// How an acting address was found to be authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// The acting address is the owner of the funds.
    Owner,
    /// Authorized through a grant; consuming it charges `amount`.
    Grant(GrantUse),
}

/// A pending charge against a grant, produced by `check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantUse {
    pub granter: Address,
    pub grantee: Address,
    pub action: GrantAction,
    pub amount: u64,
}

type GrantKey = (Address, Address, GrantAction);

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Live grants of one chain.
#[derive(Debug, Clone, Default)]
pub struct DelegationResolver {
    grants: HashMap<GrantKey, DelegationGrant>,
}

impl DelegationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces the grant for (granter, grantee, action).
    ///
    /// Returns the grant it replaced, if any.
    pub fn grant(
        &mut self,
        granter: Address,
        grantee: Address,
        action: GrantAction,
        limit: GrantLimit,
        expiration: Option<DateTime<Utc>>,
    ) -> Option<DelegationGrant> {
        let grant = DelegationGrant {
            granter,
            grantee,
            action,
            limit,
            expiration,
        };
        self.grants.insert((granter, grantee, action), grant)
    }

    /// Removes a grant by explicit action of the granter.
    pub fn revoke(
        &mut self,
        granter: &Address,
        grantee: &Address,
        action: GrantAction,
    ) -> Result<DelegationGrant, DelegationError> {
        self.grants
            .remove(&(*granter, *grantee, action))
            .ok_or(DelegationError::NoSuchGrant {
                granter: *granter,
                grantee: *grantee,
                action,
            })
    }

    /// Looks up a grant, expired or not.
    pub fn get(
        &self,
        granter: &Address,
        grantee: &Address,
        action: GrantAction,
    ) -> Option<&DelegationGrant> {
        self.grants.get(&(*granter, *grantee, action))
    }

    /// Decides whether `acting` may perform `action` for `amount` on behalf
    /// of `on_behalf_of`, without changing anything.
    pub fn check(
        &self,
        acting: &Address,
        on_behalf_of: &Address,
        action: GrantAction,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<Authorization, DelegationError> {
        if acting == on_behalf_of {
            return Ok(Authorization::Owner);
        }

        let no_grant = || DelegationError::NoSuchGrant {
            granter: *on_behalf_of,
            grantee: *acting,
            action,
        };

        let grant = self
            .grants
            .get(&(*on_behalf_of, *acting, action))
            .filter(|g| !g.is_expired(now))
            .ok_or_else(no_grant)?;

        if let GrantLimit::SpendLimit(remaining) = grant.limit {
            if amount > remaining {
                return Err(DelegationError::LimitExceeded {
                    requested: amount,
                    remaining,
                });
            }
        }

        Ok(Authorization::Grant(GrantUse {
            granter: *on_behalf_of,
            grantee: *acting,
            action,
            amount,
        }))
    }

    /// Applies an authorization produced by [`check`](Self::check).
    ///
    /// Spend limits are re-validated so a stale `GrantUse` cannot drive a
    /// limit below zero. Returns the grant as it was before the charge, for
    /// [`reinstate`](Self::reinstate) if the caller's step fails later.
    pub fn consume(
        &mut self,
        authorization: &Authorization,
    ) -> Result<Option<DelegationGrant>, DelegationError> {
        let usage = match authorization {
            Authorization::Owner => return Ok(None),
            Authorization::Grant(usage) => usage,
        };
        let key = (usage.granter, usage.grantee, usage.action);

        let grant = self
            .grants
            .get_mut(&key)
            .ok_or(DelegationError::NoSuchGrant {
                granter: usage.granter,
                grantee: usage.grantee,
                action: usage.action,
            })?;
        let before = grant.clone();

        let spent = match grant.limit {
            GrantLimit::Unlimited => false,
            GrantLimit::SpendLimit(remaining) => {
                let left = remaining
                    .checked_sub(usage.amount)
                    .ok_or(DelegationError::LimitExceeded {
                        requested: usage.amount,
                        remaining,
                    })?;
                grant.limit = GrantLimit::SpendLimit(left);
                false
            }
            GrantLimit::OneShot => true,
        };
        if spent {
            self.grants.remove(&key);
        }
        Ok(Some(before))
    }

    /// Puts back a grant snapshot returned by [`consume`](Self::consume).
    pub(crate) fn reinstate(&mut self, grant: DelegationGrant) {
        self.grants
            .insert((grant.granter, grant.grantee, grant.action), grant);
    }

    /// [`check`](Self::check) and [`consume`](Self::consume) as one step.
    pub fn authorize(
        &mut self,
        acting: &Address,
        on_behalf_of: &Address,
        action: GrantAction,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<Authorization, DelegationError> {
        let authorization = self.check(acting, on_behalf_of, action, amount, now)?;
        self.consume(&authorization)?;
        Ok(authorization)
    }

    /// Drops grants whose expiration has passed. Returns how many.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.grants.len();
        self.grants.retain(|_, g| !g.is_expired(now));
        before - self.grants.len()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn parties() -> (Address, Address) {
        (Address::from_label("granter"), Address::from_label("grantee"))
    }

    #[test]
    fn owner_needs_no_grant() {
        let resolver = DelegationResolver::new();
        let (granter, _) = parties();
        let auth = resolver
            .check(&granter, &granter, GrantAction::Transfer, 10, Utc::now())
            .unwrap();
        assert_eq!(auth, Authorization::Owner);
    }

    #[test]
    fn missing_grant_denied() {
        let resolver = DelegationResolver::new();
        let (granter, grantee) = parties();
        let result = resolver.check(&grantee, &granter, GrantAction::Transfer, 1, Utc::now());
        assert!(matches!(result, Err(DelegationError::NoSuchGrant { .. })));
    }

    #[test]
    fn grant_is_action_specific() {
        let mut resolver = DelegationResolver::new();
        let (granter, grantee) = parties();
        resolver.grant(granter, grantee, GrantAction::Send, GrantLimit::Unlimited, None);
        assert!(resolver
            .check(&grantee, &granter, GrantAction::Transfer, 1, Utc::now())
            .is_err());
        assert!(resolver
            .check(&grantee, &granter, GrantAction::Send, 1, Utc::now())
            .is_ok());
    }

    #[test]
    fn spend_limit_decrements_and_exhausts() {
        let mut resolver = DelegationResolver::new();
        let (granter, grantee) = parties();
        let now = Utc::now();
        resolver.grant(granter, grantee, GrantAction::Transfer, GrantLimit::SpendLimit(100), None);

        resolver.authorize(&grantee, &granter, GrantAction::Transfer, 60, now).unwrap();
        resolver.authorize(&grantee, &granter, GrantAction::Transfer, 40, now).unwrap();

        let err = resolver
            .authorize(&grantee, &granter, GrantAction::Transfer, 1, now)
            .unwrap_err();
        assert_eq!(err, DelegationError::LimitExceeded { requested: 1, remaining: 0 });
    }

    #[test]
    fn check_alone_does_not_spend() {
        let mut resolver = DelegationResolver::new();
        let (granter, grantee) = parties();
        resolver.grant(granter, grantee, GrantAction::Transfer, GrantLimit::SpendLimit(10), None);
        for _ in 0..5 {
            resolver.check(&grantee, &granter, GrantAction::Transfer, 10, Utc::now()).unwrap();
        }
        assert_eq!(
            resolver.get(&granter, &grantee, GrantAction::Transfer).unwrap().limit,
            GrantLimit::SpendLimit(10)
        );
    }

    #[test]
    fn stale_use_cannot_overdraw() {
        let mut resolver = DelegationResolver::new();
        let (granter, grantee) = parties();
        resolver.grant(granter, grantee, GrantAction::Transfer, GrantLimit::SpendLimit(10), None);
        let first = resolver
            .check(&grantee, &granter, GrantAction::Transfer, 10, Utc::now())
            .unwrap();
        let second = first.clone();
        resolver.consume(&first).unwrap();
        assert!(matches!(
            resolver.consume(&second),
            Err(DelegationError::LimitExceeded { remaining: 0, .. })
        ));
    }

    #[test]
    fn one_shot_consumed_on_first_use() {
        let mut resolver = DelegationResolver::new();
        let (granter, grantee) = parties();
        resolver.grant(granter, grantee, GrantAction::Send, GrantLimit::OneShot, None);

        resolver.authorize(&grantee, &granter, GrantAction::Send, 1_000, Utc::now()).unwrap();
        assert!(resolver.is_empty());
        assert!(matches!(
            resolver.authorize(&grantee, &granter, GrantAction::Send, 1, Utc::now()),
            Err(DelegationError::NoSuchGrant { .. })
        ));
    }

    #[test]
    fn expired_grant_behaves_as_missing() {
        let mut resolver = DelegationResolver::new();
        let (granter, grantee) = parties();
        let now = Utc::now();
        resolver.grant(
            granter,
            grantee,
            GrantAction::Transfer,
            GrantLimit::Unlimited,
            Some(now + Duration::seconds(10)),
        );

        assert!(resolver.check(&grantee, &granter, GrantAction::Transfer, 1, now).is_ok());
        let later = now + Duration::seconds(10);
        assert!(matches!(
            resolver.check(&grantee, &granter, GrantAction::Transfer, 1, later),
            Err(DelegationError::NoSuchGrant { .. })
        ));
        assert_eq!(resolver.prune_expired(later), 1);
    }

    #[test]
    fn regrant_replaces_and_revoke_removes() {
        let mut resolver = DelegationResolver::new();
        let (granter, grantee) = parties();
        resolver.grant(granter, grantee, GrantAction::Transfer, GrantLimit::SpendLimit(5), None);
        let replaced = resolver.grant(
            granter,
            grantee,
            GrantAction::Transfer,
            GrantLimit::SpendLimit(50),
            None,
        );
        assert_eq!(replaced.unwrap().limit, GrantLimit::SpendLimit(5));

        resolver.revoke(&granter, &grantee, GrantAction::Transfer).unwrap();
        assert!(resolver.revoke(&granter, &grantee, GrantAction::Transfer).is_err());
    }
}
