//! # Reference Scenario
//!
//! Walks the two-chain network through the interchain compliance test:
//! set up the minter chain of command, mint, transfer, then exercise every
//! denial the gate can raise on the way out (blacklisted sender, receiver
//! and grantee, paused asset), a timeout refund and a voucher round trip.
//!
//! The scenario only drives the chains and records what happened. Every
//! decision is made by the protocol crate.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use tokengate_protocol::chain::{BlockInfo, Chain};
use tokengate_protocol::compliance::{AdminOp, Denial, GrantAction, GrantLimit, Role};
use tokengate_protocol::config::DEFAULT_BLOCK_TIME;
use tokengate_protocol::ledger::ConservationReport;
use tokengate_protocol::packet::{Sequence, Timeout, TransferRequest};
use tokengate_protocol::relayer::RelayStats;
use tokengate_protocol::Address;

use crate::config::NetworkConfig;
use crate::metrics::NodeMetrics;
use crate::relayer::{AsyncRelayer, SharedChain};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    Sent { sequence: Sequence },
    Denied { reason: Denial },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: &'static str,
    pub chain_id: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceReport {
    pub chain_id: String,
    pub account: String,
    pub denom: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub steps: Vec<StepReport>,
    pub balances: Vec<BalanceReport>,
    pub conservation: Vec<ConservationReport>,
    pub relay: RelayStats,
    /// Event count per chain.
    pub events: BTreeMap<String, usize>,
}

impl ScenarioReport {
    pub fn outcome(&self, step: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step == step).map(|s| &s.outcome)
    }

    pub fn balance(&self, chain_id: &str, account: &str) -> Option<u64> {
        self.balances
            .iter()
            .find(|b| b.chain_id == chain_id && b.account == account)
            .map(|b| b.amount)
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

struct Driver<'a> {
    config: &'a NetworkConfig,
    issuer: SharedChain,
    counterparty: SharedChain,
    metrics: NodeMetrics,
    relayer: AsyncRelayer,
    poll: Duration,
    steps: Vec<StepReport>,
}

impl Driver<'_> {
    fn record(&mut self, step: &'static str, chain: &SharedChain, outcome: StepOutcome) {
        let chain_id = chain.lock().chain_id().to_string();
        tracing::info!(step, %chain_id, ?outcome, "scenario step");
        self.steps.push(StepReport {
            step,
            chain_id,
            outcome,
        });
    }

    fn admin(&mut self, step: &'static str, caller: &Address, op: AdminOp) -> Result<()> {
        self.issuer
            .lock()
            .admin(caller, op)
            .with_context(|| format!("step {step} failed"))?;
        let issuer = Arc::clone(&self.issuer);
        self.record(step, &issuer, StepOutcome::Applied);
        Ok(())
    }

    /// Submits a transfer. Gate denials are recorded, anything else aborts.
    fn transfer(
        &mut self,
        step: &'static str,
        chain: &SharedChain,
        request: TransferRequest,
    ) -> Result<StepOutcome> {
        self.metrics.transfers_submitted_total.inc();
        let result = chain.lock().transfer(request);
        let outcome = match result {
            Ok(sequence) => StepOutcome::Sent { sequence },
            Err(err) => match err.denial() {
                Some(reason) => {
                    self.metrics.record_denial(reason);
                    StepOutcome::Denied {
                        reason: reason.clone(),
                    }
                }
                None => return Err(err).with_context(|| format!("step {step} failed")),
            },
        };
        self.record(step, chain, outcome.clone());
        Ok(outcome)
    }

    /// Advances both chains by one block and waits for the relayer.
    async fn next_block(&self) -> Result<()> {
        self.settle().await?;
        self.issuer.lock().advance_block(DEFAULT_BLOCK_TIME)?;
        self.counterparty.lock().advance_block(DEFAULT_BLOCK_TIME)?;
        Ok(())
    }

    async fn settle(&self) -> Result<()> {
        self.relayer
            .settle(self.poll)
            .await
            .context("relayer stopped before the network settled")
    }

    fn on_counterparty(&self, address: &Address) -> Result<String> {
        Ok(self.counterparty.lock().bech32(address)?)
    }

    fn on_issuer(&self, address: &Address) -> Result<String> {
        Ok(self.issuer.lock().bech32(address)?)
    }

    fn voucher(&self) -> String {
        self.counterparty
            .lock()
            .voucher_denom(&self.config.issuer.denom)
    }

    async fn run(&mut self) -> Result<()> {
        let config = self.config;
        let scenario = &config.scenario;
        let accounts = scenario.accounts.clone();
        let genesis = &config.issuer_genesis;
        let master_minter = genesis
            .master_minter
            .context("issuer genesis has no master minter")?;
        let blacklister = genesis
            .blacklister
            .context("issuer genesis has no blacklister")?;
        let pauser = genesis.pauser.context("issuer genesis has no pauser")?;
        let denom = config.issuer.denom.clone();
        let amount = scenario.transfer_amount;
        let issuer = Arc::clone(&self.issuer);
        let counterparty = Arc::clone(&self.counterparty);

        // Minter chain of command.
        self.admin(
            "assign_minter_controller",
            &master_minter,
            AdminOp::AssignRole {
                role: Role::MinterController,
                address: accounts.minter_controller,
            },
        )?;
        self.admin(
            "configure_minter",
            &accounts.minter_controller,
            AdminOp::ConfigureMinter {
                minter: accounts.minter,
                allowance: scenario.minter_allowance,
            },
        )?;
        issuer
            .lock()
            .mint(&accounts.minter, &accounts.user, scenario.mint_amount)
            .context("mint failed")?;
        self.record("mint", &issuer, StepOutcome::Applied);
        self.next_block().await?;

        let to_user2 = self.on_counterparty(&accounts.user2)?;
        let plain = TransferRequest::new(accounts.user, to_user2, denom.clone(), amount);

        self.transfer("transfer", &issuer, plain.clone())?;
        self.next_block().await?;

        // Blacklisted sender, then the same bytes as receiver under the
        // counterparty's prefix.
        self.admin("blacklist_user", &blacklister, AdminOp::Blacklist(accounts.user))?;
        self.transfer("blacklisted_sender", &issuer, plain.clone())?;
        let to_user = self.on_counterparty(&accounts.user)?;
        self.transfer(
            "blacklisted_receiver",
            &issuer,
            TransferRequest::new(accounts.user2, to_user, denom.clone(), amount),
        )?;
        self.admin("unblacklist_user", &blacklister, AdminOp::Unblacklist(accounts.user))?;

        // Delegated transfer by a blacklisted, then cleared, grantee.
        issuer.lock().grant(
            &accounts.user,
            &accounts.grantee,
            GrantAction::Transfer,
            GrantLimit::SpendLimit(amount),
            None,
        );
        self.admin(
            "blacklist_grantee",
            &blacklister,
            AdminOp::Blacklist(accounts.grantee),
        )?;
        let delegated = plain.clone().acting_as(accounts.grantee);
        self.transfer("blacklisted_grantee", &issuer, delegated.clone())?;
        self.admin(
            "unblacklist_grantee",
            &blacklister,
            AdminOp::Unblacklist(accounts.grantee),
        )?;
        self.transfer("delegated_transfer", &issuer, delegated)?;
        self.next_block().await?;

        // Pause and unpause.
        self.admin("pause", &pauser, AdminOp::Pause)?;
        self.transfer("paused", &issuer, plain.clone())?;
        self.admin("unpause", &pauser, AdminOp::Unpause)?;
        self.transfer("unpaused", &issuer, plain.clone())?;
        self.next_block().await?;

        // Timeout: the counterparty's clock runs past the deadline before
        // the packet arrives.
        let skew = Duration::from_secs(scenario.short_timeout_secs.saturating_mul(2));
        let deadline = issuer.lock().block().time
            + chrono::Duration::seconds(scenario.short_timeout_secs as i64);
        counterparty.lock().advance_block(skew)?;
        self.transfer(
            "timeout",
            &issuer,
            plain.clone().with_timeout(Timeout::at_time(deadline)),
        )?;
        self.settle().await?;
        issuer.lock().advance_block(skew)?;

        // Half of user2's vouchers go home.
        let voucher = self.voucher();
        let held = counterparty.lock().balance(&accounts.user2, &voucher);
        let to_home = self.on_issuer(&accounts.user)?;
        self.transfer(
            "round_trip",
            &counterparty,
            TransferRequest::new(accounts.user2, to_home, voucher, held / 2),
        )?;
        self.next_block().await?;
        Ok(())
    }

    fn report(self) -> Result<ScenarioReport> {
        let accounts = &self.config.scenario.accounts;
        let mut issuer = self.issuer.lock();
        let mut counterparty = self.counterparty.lock();
        let denom = &self.config.issuer.denom;
        let voucher = counterparty.voucher_denom(denom);

        let mut balances = Vec::new();
        let entries: [(&Chain, Address, &str); 5] = [
            (&*issuer, accounts.user, denom.as_str()),
            (&*issuer, issuer.config().channel.escrow_address(), denom.as_str()),
            (&*counterparty, accounts.user2, voucher.as_str()),
            (&*counterparty, counterparty.ledger().fee_collector(), voucher.as_str()),
            (&*issuer, issuer.ledger().fee_collector(), denom.as_str()),
        ];
        for (chain, address, denom) in entries {
            balances.push(BalanceReport {
                chain_id: chain.chain_id().to_string(),
                account: chain.bech32(&address)?,
                denom: denom.to_string(),
                amount: chain.balance(&address, denom),
            });
        }

        let conservation = vec![issuer.conservation(denom)?, counterparty.conservation(&voucher)?];
        let mut events = BTreeMap::new();
        for chain in [&mut *issuer, &mut *counterparty] {
            let drained = chain.drain_events();
            events.insert(chain.chain_id().to_string(), drained.len());
        }

        Ok(ScenarioReport {
            steps: self.steps,
            balances,
            conservation,
            relay: self.relayer.stats(),
            events,
        })
    }
}

/// Brings up both chains from `config`.
pub fn build_network(config: &NetworkConfig) -> (SharedChain, SharedChain) {
    let start = BlockInfo::genesis(chrono::Utc::now());
    let issuer = Chain::new(config.issuer.clone(), &config.issuer_genesis, start);
    let counterparty = Chain::new(
        config.counterparty.clone(),
        &config.counterparty_genesis,
        start,
    );
    (
        Arc::new(Mutex::new(issuer)),
        Arc::new(Mutex::new(counterparty)),
    )
}

/// Runs the reference scenario with a background relayer and reports the
/// final state of both chains.
pub async fn run(config: &NetworkConfig, metrics: &NodeMetrics) -> Result<ScenarioReport> {
    config.validate()?;
    let (issuer, counterparty) = build_network(config);
    let relayer = AsyncRelayer::new(
        Arc::clone(&issuer),
        Arc::clone(&counterparty),
        metrics.clone(),
    );
    let poll = Duration::from_millis(config.scenario.relay_interval_ms.max(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay_task = relayer.clone().spawn(poll, shutdown_rx);

    let mut driver = Driver {
        config,
        issuer,
        counterparty,
        metrics: metrics.clone(),
        relayer,
        poll,
        steps: Vec::new(),
    };
    let outcome = driver.run().await;

    // The relayer may already have exited on error; its result says why.
    let _ = shutdown_tx.send(true);
    relay_task.await.context("relayer task panicked")??;
    outcome?;
    driver.report()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn denied(reason: Denial) -> Option<StepOutcome> {
        Some(StepOutcome::Denied { reason })
    }

    #[tokio::test(start_paused = true)]
    async fn reference_scenario_end_to_end() {
        let config = NetworkConfig::default();
        let metrics = NodeMetrics::new().unwrap();
        let report = run(&config, &metrics).await.unwrap();

        assert!(matches!(
            report.outcome("transfer"),
            Some(StepOutcome::Sent { sequence: 1 })
        ));
        assert_eq!(
            report.outcome("blacklisted_sender").cloned(),
            denied(Denial::SenderBlacklisted)
        );
        assert_eq!(
            report.outcome("blacklisted_receiver").cloned(),
            denied(Denial::ReceiverBlacklisted)
        );
        assert_eq!(
            report.outcome("blacklisted_grantee").cloned(),
            denied(Denial::ActingPartyBlacklisted)
        );
        assert_eq!(report.outcome("paused").cloned(), denied(Denial::AssetPaused));
        assert!(matches!(report.outcome("unpaused"), Some(StepOutcome::Sent { .. })));
        assert!(matches!(report.outcome("timeout"), Some(StepOutcome::Sent { .. })));

        // Three transfers arrived (plain, delegated, unpaused) and one
        // timed out; each arrival credits 99,990,000 and 10,000 of fee.
        let stats = report.relay;
        assert_eq!(stats.acks_success, 4);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(metrics.refunds_total.get(), 1);
        assert_eq!(metrics.timeouts_total.get(), 1);

        let user = Address::from_label("user").to_bech32("noble").unwrap();
        let user2 = Address::from_label("user2").to_bech32("cosmos").unwrap();
        let received = 3 * 99_990_000;
        assert_eq!(report.balance("gaia-1", &user2), Some(received - received / 2));
        assert_eq!(
            report.balance("noble-1", &user),
            Some(1_000_000_000_000 - 3 * 100_000_000 + received / 2)
        );
        assert!(report.conservation.iter().all(|c| c.supply as u128 == c.held));
    }
}
