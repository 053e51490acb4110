//! # Chain
//!
//! One chain process: the compliance module, the ledger, the packet
//! coordinator and outbox, a block clock and an event log, all owned by a
//! single [`Chain`] value. There is no shared or global state; two chains
//! in the same process are two values.
//!
//! Every mutating operation takes `&mut self` and runs to completion, so the
//! gate reads, the ledger mutation and any grant charge of one operation
//! form a single atomic step.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::{Address, AddressError};
use crate::compliance::{
    Admission, AdminOp, ComplianceError, ComplianceModule, DelegationError, DelegationGrant, Denial,
    GrantAction, GrantLimit, Role, TransferDirection, TransferIntent,
};
use crate::config::{ChainConfig, ComplianceGenesis};
use crate::events::ChainEvent;
use crate::ledger::{BankKeeper, ConservationReport, InMemoryBank, Ledger, LedgerError};
use crate::packet::{
    Acknowledgement, DenomTrace, LifecycleEvent, Packet, PacketError, PacketLifecycleCoordinator,
    PacketOutbox, PendingPacket, Resolution, Sequence, TransferContext, TransferError,
    TransferRequest,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error(transparent)]
    Compliance(#[from] ComplianceError),

    #[error("denied: {0}")]
    Denied(#[from] Denial),

    #[error(transparent)]
    Delegation(#[from] DelegationError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("amount must be positive")]
    ZeroAmount,

    #[error("invalid block interval: {0:?}")]
    InvalidInterval(Duration),
}

impl ChainError {
    /// The compliance denial behind this error, wherever it was raised.
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            ChainError::Denied(d) | ChainError::Transfer(TransferError::Denied(d)) => Some(d),
            ChainError::Compliance(ComplianceError::Denied(d)) => Some(d),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Block Clock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    pub time: DateTime<Utc>,
}

impl BlockInfo {
    pub fn genesis(time: DateTime<Utc>) -> Self {
        Self { height: 1, time }
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Chain<B: BankKeeper = InMemoryBank> {
    config: ChainConfig,
    block: BlockInfo,
    compliance: ComplianceModule,
    ledger: Ledger<B>,
    coordinator: PacketLifecycleCoordinator,
    outbox: PacketOutbox,
    events: Vec<ChainEvent>,
}

impl Chain<InMemoryBank> {
    pub fn new(config: ChainConfig, genesis: &ComplianceGenesis, block: BlockInfo) -> Self {
        Self::with_bank(config, genesis, block, InMemoryBank::new())
    }
}

impl<B: BankKeeper> Chain<B> {
    pub fn with_bank(
        config: ChainConfig,
        genesis: &ComplianceGenesis,
        block: BlockInfo,
        bank: B,
    ) -> Self {
        tracing::info!(
            chain_id = %config.chain_id,
            denom = %config.denom,
            channel = %config.channel.channel_id,
            "chain started"
        );
        Self {
            config,
            block,
            compliance: ComplianceModule::from_genesis(genesis),
            ledger: Ledger::new(bank),
            coordinator: PacketLifecycleCoordinator::new(),
            outbox: PacketOutbox::new(),
            events: Vec::new(),
        }
    }

    /// Replaces the outbox, e.g. with a bounded one.
    pub fn with_outbox(mut self, outbox: PacketOutbox) -> Self {
        self.outbox = outbox;
        self
    }

    // -- Administration -----------------------------------------------------

    /// Runs a privileged compliance operation.
    pub fn admin(&mut self, caller: &Address, op: AdminOp) -> Result<bool, ChainError> {
        let changed = self.compliance.execute(caller, &op)?;
        self.events.push(ChainEvent::AdminApplied {
            height: self.block.height,
            caller: *caller,
            op,
            changed,
        });
        Ok(changed)
    }

    /// Mints the chain's asset. Gated like an inbound transfer to `to`.
    pub fn mint(&mut self, minter: &Address, to: &Address, amount: u64) -> Result<(), ChainError> {
        if amount == 0 {
            return Err(ChainError::ZeroAmount);
        }
        self.compliance.roles().require(Role::Minter, minter)?;
        let denom = self.config.denom.clone();
        let intent = TransferIntent {
            acting: *minter,
            sender: *minter,
            receiver: *to,
            denom: denom.clone(),
            amount,
            direction: TransferDirection::Inbound,
            action: GrantAction::Send,
        };
        self.admit(&intent)?;
        self.ledger
            .mint(self.compliance.roles_mut(), minter, to, &denom, amount)?;
        self.events.push(ChainEvent::Minted {
            height: self.block.height,
            minter: *minter,
            to: *to,
            denom,
            amount,
        });
        Ok(())
    }

    /// Burns the chain's asset from the minter's own balance.
    pub fn burn(&mut self, minter: &Address, amount: u64) -> Result<(), ChainError> {
        if amount == 0 {
            return Err(ChainError::ZeroAmount);
        }
        self.compliance.roles().require(Role::Minter, minter)?;
        let denom = self.config.denom.clone();
        let intent = TransferIntent {
            acting: *minter,
            sender: *minter,
            receiver: *minter,
            denom: denom.clone(),
            amount,
            direction: TransferDirection::Outbound,
            action: GrantAction::Send,
        };
        self.admit(&intent)?;
        self.ledger
            .burn(self.compliance.roles(), minter, &denom, amount)?;
        self.events.push(ChainEvent::Burned {
            height: self.block.height,
            minter: *minter,
            denom,
            amount,
        });
        Ok(())
    }

    // -- Delegation ---------------------------------------------------------

    pub fn grant(
        &mut self,
        granter: &Address,
        grantee: &Address,
        action: GrantAction,
        limit: GrantLimit,
        expiration: Option<DateTime<Utc>>,
    ) -> Option<DelegationGrant> {
        let replaced = self
            .compliance
            .delegations_mut()
            .grant(*granter, *grantee, action, limit, expiration);
        self.events.push(ChainEvent::GrantCreated {
            height: self.block.height,
            granter: *granter,
            grantee: *grantee,
            action,
            limit,
        });
        replaced
    }

    pub fn revoke(
        &mut self,
        granter: &Address,
        grantee: &Address,
        action: GrantAction,
    ) -> Result<DelegationGrant, ChainError> {
        let revoked = self
            .compliance
            .delegations_mut()
            .revoke(granter, grantee, action)?;
        self.events.push(ChainEvent::GrantRevoked {
            height: self.block.height,
            granter: *granter,
            grantee: *grantee,
            action,
        });
        Ok(revoked)
    }

    // -- Transfers ----------------------------------------------------------

    /// Same-chain send of `amount` from `from` to `to`, submitted by
    /// `acting` (the owner or a `Send` grantee).
    pub fn send(
        &mut self,
        acting: &Address,
        from: &Address,
        to: &Address,
        denom: &str,
        amount: u64,
    ) -> Result<(), ChainError> {
        if amount == 0 {
            return Err(ChainError::ZeroAmount);
        }
        let intent = TransferIntent {
            acting: *acting,
            sender: *from,
            receiver: *to,
            denom: denom.to_string(),
            amount,
            direction: TransferDirection::Outbound,
            action: GrantAction::Send,
        };
        let admission = self.admit(&intent)?;

        let charged = self
            .compliance
            .delegations_mut()
            .consume(&admission.authorization)?;
        if let Err(err) = self.ledger.send(from, to, denom, amount) {
            if let Some(grant) = charged {
                self.compliance.delegations_mut().reinstate(grant);
            }
            return Err(err.into());
        }

        self.events.push(ChainEvent::Sent {
            height: self.block.height,
            from: *from,
            to: *to,
            denom: denom.to_string(),
            amount,
        });
        Ok(())
    }

    /// Starts a cross-chain transfer. Returns the packet sequence.
    pub fn transfer(&mut self, request: TransferRequest) -> Result<Sequence, ChainError> {
        let (acting, sender, amount) = (request.acting, request.sender, request.amount);
        let ctx = TransferContext {
            config: &self.config,
            compliance: &mut self.compliance,
            ledger: &mut self.ledger,
            height: self.block.height,
            time: self.block.time,
        };

        match self.coordinator.send_transfer(ctx, &mut self.outbox, request) {
            Ok(sequence) => {
                if let Some(pending) = self.coordinator.pending(sequence) {
                    self.events.push(ChainEvent::PacketSent {
                        height: self.block.height,
                        sequence,
                        sender: pending.sender,
                        receiver: pending.receiver.clone(),
                        denom: pending.denom.clone(),
                        amount: pending.amount,
                        fee: pending.fee,
                    });
                }
                Ok(sequence)
            }
            Err(TransferError::Denied(reason)) => {
                self.events.push(ChainEvent::TransferDenied {
                    height: self.block.height,
                    acting,
                    sender,
                    amount,
                    reason: reason.clone(),
                });
                Err(TransferError::Denied(reason).into())
            }
            Err(err) => Err(err.into()),
        }
    }

    // -- Packet Handling ----------------------------------------------------

    /// Receives a packet relayed from the counterparty.
    pub fn recv_packet(&mut self, packet: &Packet) -> Result<Acknowledgement, ChainError> {
        let ctx = TransferContext {
            config: &self.config,
            compliance: &mut self.compliance,
            ledger: &mut self.ledger,
            height: self.block.height,
            time: self.block.time,
        };
        let ack = self.coordinator.receive(ctx, packet)?;
        self.events.push(ChainEvent::PacketReceived {
            height: self.block.height,
            sequence: packet.sequence,
            ack: ack.clone(),
        });
        Ok(ack)
    }

    /// Applies the counterparty's acknowledgement of a sent packet.
    pub fn acknowledge_packet(
        &mut self,
        sequence: Sequence,
        ack: Acknowledgement,
    ) -> Result<Resolution, ChainError> {
        self.resolve(LifecycleEvent::Acknowledged { sequence, ack })
    }

    /// Times out a sent packet the counterparty refused as expired.
    pub fn timeout_packet(&mut self, sequence: Sequence) -> Result<Resolution, ChainError> {
        self.resolve(LifecycleEvent::TimedOut { sequence })
    }

    fn resolve(&mut self, event: LifecycleEvent) -> Result<Resolution, ChainError> {
        let sequence = event.sequence();
        let resolution = self.coordinator.handle(&mut self.ledger, event)?;
        if !matches!(resolution, Resolution::Duplicate { .. }) {
            let channel = &self.config.channel;
            self.outbox
                .delete_commitment(&channel.port_id, &channel.channel_id, sequence);
            self.events.push(ChainEvent::PacketResolved {
                height: self.block.height,
                resolution: resolution.clone(),
            });
        }
        Ok(resolution)
    }

    /// Drains packets committed since the last call, for a relayer.
    pub fn take_outbound_packets(&mut self) -> Vec<Packet> {
        self.outbox.take_unrelayed()
    }

    /// Returns packets a relayer took but did not get resolved, so the next
    /// pass retries them.
    pub fn requeue_outbound_packets(&mut self, packets: Vec<Packet>) {
        self.outbox.requeue(packets);
    }

    /// Produces the next block `interval` later and prunes expired grants.
    pub fn advance_block(&mut self, interval: Duration) -> Result<BlockInfo, ChainError> {
        let step = chrono::Duration::from_std(interval)
            .map_err(|_| ChainError::InvalidInterval(interval))?;
        let time = self
            .block
            .time
            .checked_add_signed(step)
            .ok_or(ChainError::InvalidInterval(interval))?;
        self.block = BlockInfo {
            height: self.block.height.saturating_add(1),
            time,
        };
        let pruned = self.compliance.delegations_mut().prune_expired(time);
        tracing::debug!(
            chain_id = %self.config.chain_id,
            height = self.block.height,
            pruned,
            "block advanced"
        );
        Ok(self.block)
    }

    // -- Queries ------------------------------------------------------------

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn chain_id(&self) -> &str {
        &self.config.chain_id
    }

    pub fn block(&self) -> BlockInfo {
        self.block
    }

    pub fn compliance(&self) -> &ComplianceModule {
        &self.compliance
    }

    pub fn ledger(&self) -> &Ledger<B> {
        &self.ledger
    }

    pub fn coordinator(&self) -> &PacketLifecycleCoordinator {
        &self.coordinator
    }

    pub fn outbox(&self) -> &PacketOutbox {
        &self.outbox
    }

    /// Mutable outbox access, for closing the channel in tests.
    pub fn outbox_mut(&mut self) -> &mut PacketOutbox {
        &mut self.outbox
    }

    /// Events recorded since the last [`drain_events`](Self::drain_events).
    pub fn events(&self) -> &[ChainEvent] {
        &self.events
    }

    /// Hands the recorded events to the caller and clears the log.
    pub fn drain_events(&mut self) -> Vec<ChainEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn balance(&self, address: &Address, denom: &str) -> u64 {
        self.ledger.balance(address, denom)
    }

    pub fn supply(&self, denom: &str) -> u64 {
        self.ledger.supply(denom)
    }

    pub fn pending_transfers(&self) -> impl Iterator<Item = (Sequence, &PendingPacket)> {
        self.coordinator.pending_packets()
    }

    /// Local name of `base_denom` after one hop from the counterparty.
    pub fn voucher_denom(&self, base_denom: &str) -> String {
        let channel = &self.config.channel;
        DenomTrace::parse(&format!(
            "{}/{}/{}",
            channel.port_id, channel.channel_id, base_denom
        ))
        .ibc_denom()
    }

    /// `address` rendered with this chain's bech32 prefix.
    pub fn bech32(&self, address: &Address) -> Result<String, ChainError> {
        Ok(address.to_bech32(&self.config.bech32_prefix)?)
    }

    pub fn conservation(&self, denom: &str) -> Result<ConservationReport, ChainError> {
        Ok(self.ledger.conservation(denom)?)
    }

    fn admit(&self, intent: &TransferIntent) -> Result<Admission, ChainError> {
        match self.compliance.gate(self.block.time).evaluate(intent, &self.ledger) {
            Ok(admission) => Ok(admission),
            Err(reason) => {
                tracing::warn!(
                    chain_id = %self.config.chain_id,
                    sender = %intent.sender,
                    amount = intent.amount,
                    %reason,
                    "transfer denied"
                );
                Err(reason.into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, FeePolicy};

    const DENOM: &str = "uusdc";

    fn addr(label: &str) -> Address {
        Address::from_label(label)
    }

    fn chain() -> Chain {
        let config = ChainConfig {
            chain_id: "noble-1".into(),
            bech32_prefix: "noble".into(),
            denom: DENOM.into(),
            channel: ChannelConfig::transfer("channel-0", "channel-0"),
            fee: FeePolicy::none(DENOM),
        };
        let genesis = ComplianceGenesis {
            owner: Some(addr("owner")),
            minter: Some(addr("minter")),
            minter_allowance: 1_000,
            blacklister: Some(addr("blacklister")),
            pauser: Some(addr("pauser")),
            ..Default::default()
        };
        Chain::new(config, &genesis, BlockInfo::genesis(Utc::now()))
    }

    #[test]
    fn mint_to_blacklisted_receiver_denied() {
        let mut chain = chain();
        chain
            .admin(&addr("blacklister"), AdminOp::Blacklist(addr("user")))
            .unwrap();
        let err = chain.mint(&addr("minter"), &addr("user"), 10).unwrap_err();
        assert_eq!(err.denial(), Some(&Denial::ReceiverBlacklisted));
        assert_eq!(chain.compliance().roles().allowance(&addr("minter")), 1_000);
    }

    #[test]
    fn mint_while_paused_denied() {
        let mut chain = chain();
        chain.admin(&addr("pauser"), AdminOp::Pause).unwrap();
        let err = chain.mint(&addr("minter"), &addr("user"), 10).unwrap_err();
        assert_eq!(err, ChainError::Denied(Denial::AssetPaused));
    }

    #[test]
    fn non_minter_cannot_mint_or_burn() {
        let mut chain = chain();
        assert!(matches!(
            chain.mint(&addr("user"), &addr("user"), 1),
            Err(ChainError::Compliance(ComplianceError::Unauthorized { role: Role::Minter, .. }))
        ));
        assert!(matches!(
            chain.burn(&addr("user"), 1),
            Err(ChainError::Compliance(ComplianceError::Unauthorized { .. }))
        ));
    }

    #[test]
    fn burn_reduces_supply() {
        let mut chain = chain();
        chain.mint(&addr("minter"), &addr("minter"), 100).unwrap();
        chain.burn(&addr("minter"), 40).unwrap();
        assert_eq!(chain.supply(DENOM), 60);
        chain.conservation(DENOM).unwrap();
    }

    #[test]
    fn send_by_grantee_charges_grant() {
        let mut chain = chain();
        chain.mint(&addr("minter"), &addr("user"), 100).unwrap();
        chain.grant(
            &addr("user"),
            &addr("grantee"),
            GrantAction::Send,
            GrantLimit::SpendLimit(50),
            None,
        );
        chain
            .send(&addr("grantee"), &addr("user"), &addr("shop"), DENOM, 30)
            .unwrap();
        let err = chain
            .send(&addr("grantee"), &addr("user"), &addr("shop"), DENOM, 21)
            .unwrap_err();
        assert_eq!(
            err.denial(),
            Some(&Denial::LimitExceeded { requested: 21, remaining: 20 })
        );
        assert_eq!(chain.balance(&addr("shop"), DENOM), 30);
    }

    #[test]
    fn failed_send_keeps_grant() {
        let mut chain = chain();
        chain.mint(&addr("minter"), &addr("shop"), 1_000).unwrap();
        chain.grant(
            &addr("user"),
            &addr("grantee"),
            GrantAction::Send,
            GrantLimit::OneShot,
            None,
        );
        // Grantee may act, but the user has nothing to send.
        let err = chain
            .send(&addr("grantee"), &addr("user"), &addr("shop"), DENOM, 1)
            .unwrap_err();
        assert!(matches!(err.denial(), Some(Denial::InsufficientFunds { .. })));
        assert!(chain
            .compliance()
            .delegations()
            .get(&addr("user"), &addr("grantee"), GrantAction::Send)
            .is_some());
    }

    #[test]
    fn advance_block_prunes_expired_grants() {
        let mut chain = chain();
        let expiry = chain.block().time + chrono::Duration::seconds(5);
        chain.grant(
            &addr("user"),
            &addr("grantee"),
            GrantAction::Transfer,
            GrantLimit::Unlimited,
            Some(expiry),
        );
        let block = chain.advance_block(Duration::from_secs(5)).unwrap();
        assert_eq!(block.height, 2);
        assert!(chain.compliance().delegations().is_empty());
    }

    #[test]
    fn zero_amounts_rejected() {
        let mut chain = chain();
        assert_eq!(chain.mint(&addr("minter"), &addr("user"), 0), Err(ChainError::ZeroAmount));
        assert_eq!(
            chain.send(&addr("user"), &addr("user"), &addr("shop"), DENOM, 0),
            Err(ChainError::ZeroAmount)
        );
        assert!(matches!(
            chain.transfer(TransferRequest::new(addr("user"), addr("x").to_hex(), DENOM, 0)),
            Err(ChainError::Transfer(TransferError::ZeroAmount))
        ));
    }

    #[test]
    fn events_are_recorded() {
        let mut chain = chain();
        chain.mint(&addr("minter"), &addr("user"), 5).unwrap();
        chain.admin(&addr("pauser"), AdminOp::Pause).unwrap();
        let kinds: Vec<_> = chain.events().iter().map(ChainEvent::kind).collect();
        assert_eq!(kinds, vec!["minted", "admin_applied"]);
    }

    #[test]
    fn draining_clears_the_event_log() {
        let mut chain = chain();
        chain.mint(&addr("minter"), &addr("user"), 5).unwrap();
        let drained = chain.drain_events();
        assert_eq!(drained.len(), 1);
        assert!(chain.events().is_empty());

        chain.admin(&addr("pauser"), AdminOp::Pause).unwrap();
        assert_eq!(chain.drain_events().len(), 1);
    }
}
