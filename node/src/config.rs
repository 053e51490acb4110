//! # Network Configuration
//!
//! The two-chain network the node brings up: each chain's static
//! configuration and compliance genesis, the accounts the scenario acts
//! with, and the scenario amounts. Stored as pretty-printed JSON; `init`
//! writes [`NetworkConfig::default`] so operators have something to edit.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use tokengate_protocol::address::Address;
use tokengate_protocol::config::{
    ChainConfig, ChannelConfig, ComplianceGenesis, FeePolicy, DEFAULT_TRANSFER_FEE_BPS,
};

/// Default file name written by `init`.
pub const DEFAULT_CONFIG_FILE: &str = "tokengate.json";

/// Accounts the reference scenario acts with on the issuing chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioAccounts {
    pub minter_controller: Address,
    pub minter: Address,
    /// Receives the initial mint and sends the first transfer.
    pub user: Address,
    /// Receives on the counterparty.
    pub user2: Address,
    /// Acts for `user` through a delegation grant.
    pub grantee: Address,
}

/// Amounts and timings of the reference scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub accounts: ScenarioAccounts,
    /// Allowance the minter controller gives the minter.
    pub minter_allowance: u64,
    /// Minted to `user` before the first transfer.
    pub mint_amount: u64,
    /// Amount of each cross-chain transfer.
    pub transfer_amount: u64,
    /// Relative timeout of the transfer the scenario lets expire, seconds.
    pub short_timeout_secs: u64,
    /// Relayer polling interval, milliseconds.
    pub relay_interval_ms: u64,
}

/// A two-chain network joined by one transfer channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Chain issuing the compliance-controlled asset.
    pub issuer: ChainConfig,
    pub issuer_genesis: ComplianceGenesis,
    /// Counterparty chain receiving vouchers.
    pub counterparty: ChainConfig,
    pub counterparty_genesis: ComplianceGenesis,
    pub scenario: ScenarioConfig,
}

impl NetworkConfig {
    /// Reads and parses a JSON network configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self).context("failed to encode config")?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write config file {}", path.display()))
    }

    /// Checks that the two channel ends point at each other.
    pub fn validate(&self) -> Result<()> {
        let (a, b) = (&self.issuer.channel, &self.counterparty.channel);
        anyhow::ensure!(
            a.counterparty_channel_id == b.channel_id && b.counterparty_channel_id == a.channel_id,
            "channel ends do not match: {}/{} <-> {}/{}",
            a.port_id,
            a.channel_id,
            b.port_id,
            b.channel_id
        );
        anyhow::ensure!(
            self.issuer.chain_id != self.counterparty.chain_id,
            "both chains are named {}",
            self.issuer.chain_id
        );
        let scenario = &self.scenario;
        anyhow::ensure!(
            scenario.transfer_amount > 0
                && scenario
                    .transfer_amount
                    .checked_mul(3)
                    .is_some_and(|needed| scenario.mint_amount >= needed),
            "mint_amount must cover three transfers of transfer_amount"
        );
        Ok(())
    }
}

impl Default for NetworkConfig {
    /// The local interchain test network: `noble-1` issuing `uusdc` with a
    /// 1 bps fee, `gaia-1` on the other end of channel-0 <-> channel-1.
    fn default() -> Self {
        let label = Address::from_label;
        Self {
            issuer: ChainConfig {
                chain_id: "noble-1".into(),
                bech32_prefix: "noble".into(),
                denom: "uusdc".into(),
                channel: ChannelConfig::transfer("channel-0", "channel-1"),
                fee: FeePolicy {
                    bps: DEFAULT_TRANSFER_FEE_BPS,
                    max_fee: None,
                    denom: "uusdc".into(),
                },
            },
            issuer_genesis: ComplianceGenesis {
                owner: Some(label("owner")),
                master_minter: Some(label("master-minter")),
                blacklister: Some(label("blacklister")),
                pauser: Some(label("pauser")),
                ..Default::default()
            },
            counterparty: ChainConfig {
                chain_id: "gaia-1".into(),
                bech32_prefix: "cosmos".into(),
                denom: "uatom".into(),
                channel: ChannelConfig::transfer("channel-1", "channel-0"),
                fee: FeePolicy::none("uatom"),
            },
            counterparty_genesis: ComplianceGenesis {
                owner: Some(label("gaia-owner")),
                blacklister: Some(label("gaia-blacklister")),
                pauser: Some(label("gaia-pauser")),
                ..Default::default()
            },
            scenario: ScenarioConfig {
                accounts: ScenarioAccounts {
                    minter_controller: label("minter-controller"),
                    minter: label("minter"),
                    user: label("user"),
                    user2: label("user2"),
                    grantee: label("grantee"),
                },
                minter_allowance: 1_000_000_000_000_000,
                mint_amount: 1_000_000_000_000,
                transfer_amount: 100_000_000,
                short_timeout_secs: 10,
                relay_interval_ms: 200,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
