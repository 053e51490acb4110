//! # Protocol Configuration & Constants
//!
//! Every constant the transfer core depends on lives here, next to the
//! serde types a chain is configured with. Two chains that disagree on any
//! of the constants in the first half of this file will not interoperate,
//! so treat them as part of the wire contract even though the core does not
//! own the wire.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::Address;

// ---------------------------------------------------------------------------
// Transfer Application
// ---------------------------------------------------------------------------

/// Port the fungible-token transfer application binds to.
pub const TRANSFER_PORT: &str = "transfer";

/// Application version string. Also the salt for channel escrow addresses.
pub const ICS20_VERSION: &str = "ics20-1";

/// Prefix of voucher denominations minted for foreign assets.
pub const VOUCHER_DENOM_PREFIX: &str = "ibc/";

/// Name of the module account holding amounts of in-flight packets.
pub const TRANSFER_MODULE_ACCOUNT: &str = "transfer";

/// Name of the module account that receives transfer fees.
pub const FEE_COLLECTOR_ACCOUNT: &str = "fee_collector";

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

/// Basis points in one whole. 1 bps = 0.01%.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Default transfer fee: one basis point of the transferred amount.
pub const DEFAULT_TRANSFER_FEE_BPS: u64 = 1;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Simulated block interval used when a caller advances the chain clock
/// without specifying a duration.
pub const DEFAULT_BLOCK_TIME: Duration = Duration::from_secs(5);

/// Relative timeout applied to transfers that don't specify one.
/// Ten minutes, matching what the transfer CLI uses by default.
pub const DEFAULT_PACKET_TIMEOUT: Duration = Duration::from_secs(600);

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum packet memo length in bytes.
pub const MAX_MEMO_LENGTH: usize = 256;

// ---------------------------------------------------------------------------
// Chain Configuration
// ---------------------------------------------------------------------------

/// Proportional fee charged on outbound cross-chain transfers.
///
/// The sending chain computes the fee and carries it in the packet; the
/// receiving chain deducts it from the receiver's credit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    /// Fee rate in basis points.
    pub bps: u64,
    /// Absolute cap on the fee, if any.
    #[serde(default)]
    pub max_fee: Option<u64>,
    /// Only transfers of this base denomination pay the fee.
    pub denom: String,
}

impl FeePolicy {
    /// A policy that never charges.
    pub fn none(denom: impl Into<String>) -> Self {
        Self {
            bps: 0,
            max_fee: None,
            denom: denom.into(),
        }
    }

    /// Fee for transferring `amount` of `base_denom`, rounded toward zero.
    pub fn fee_for(&self, base_denom: &str, amount: u64) -> u64 {
        if self.bps == 0 || base_denom != self.denom {
            return 0;
        }
        // u128 so that amount * bps cannot overflow for any u64 amount.
        let fee = (amount as u128 * self.bps as u128) / BPS_DENOMINATOR as u128;
        let fee = fee.min(amount as u128) as u64;
        match self.max_fee {
            Some(cap) => fee.min(cap),
            None => fee,
        }
    }
}

/// One end of the transfer channel between the two chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Local port, normally [`TRANSFER_PORT`].
    pub port_id: String,
    /// Local channel identifier, e.g. `channel-0`.
    pub channel_id: String,
    /// Counterparty port.
    pub counterparty_port_id: String,
    /// Counterparty channel identifier.
    pub counterparty_channel_id: String,
}

impl ChannelConfig {
    /// A transfer channel with the same port on both ends.
    pub fn transfer(channel_id: &str, counterparty_channel_id: &str) -> Self {
        Self {
            port_id: TRANSFER_PORT.to_string(),
            channel_id: channel_id.to_string(),
            counterparty_port_id: TRANSFER_PORT.to_string(),
            counterparty_channel_id: counterparty_channel_id.to_string(),
        }
    }

    /// Escrow account for native tokens sent out over this channel.
    pub fn escrow_address(&self) -> Address {
        Address::channel_escrow(ICS20_VERSION, &self.port_id, &self.channel_id)
    }
}

/// Static configuration of one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain identifier, e.g. `noble-1`.
    pub chain_id: String,
    /// Bech32 prefix used when rendering local addresses.
    pub bech32_prefix: String,
    /// The single asset whose compliance scope this chain enforces.
    pub denom: String,
    /// Transfer channel to the counterparty.
    pub channel: ChannelConfig,
    /// Fee charged on outbound transfers.
    pub fee: FeePolicy,
}

/// Initial compliance state of a chain.
///
/// Roles left as `None` are unset; operations that need them fail closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceGenesis {
    #[serde(default)]
    pub owner: Option<Address>,
    #[serde(default)]
    pub master_minter: Option<Address>,
    #[serde(default)]
    pub minter_controller: Option<Address>,
    #[serde(default)]
    pub minter: Option<Address>,
    /// Initial allowance of `minter`.
    #[serde(default)]
    pub minter_allowance: u64,
    #[serde(default)]
    pub blacklister: Option<Address>,
    #[serde(default)]
    pub pauser: Option<Address>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub blacklisted: Vec<Address>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_bps_of_hundred_million() {
        let policy = FeePolicy {
            bps: DEFAULT_TRANSFER_FEE_BPS,
            max_fee: None,
            denom: "uusdc".into(),
        };
        assert_eq!(policy.fee_for("uusdc", 100_000_000), 10_000);
    }

    #[test]
    fn fee_rounds_toward_zero() {
        let policy = FeePolicy {
            bps: 1,
            max_fee: None,
            denom: "uusdc".into(),
        };
        assert_eq!(policy.fee_for("uusdc", 9_999), 0);
        assert_eq!(policy.fee_for("uusdc", 19_999), 1);
    }

    #[test]
    fn fee_respects_cap_and_denom() {
        let policy = FeePolicy {
            bps: 100,
            max_fee: Some(5),
            denom: "uusdc".into(),
        };
        assert_eq!(policy.fee_for("uusdc", 1_000_000), 5);
        assert_eq!(policy.fee_for("uatom", 1_000_000), 0);
        assert_eq!(FeePolicy::none("uusdc").fee_for("uusdc", u64::MAX), 0);
    }

    #[test]
    fn fee_never_overflows() {
        let policy = FeePolicy {
            bps: BPS_DENOMINATOR,
            max_fee: None,
            denom: "uusdc".into(),
        };
        assert_eq!(policy.fee_for("uusdc", u64::MAX), u64::MAX);
    }

    #[test]
    fn timing_constants_sanity() {
        assert!(DEFAULT_BLOCK_TIME < DEFAULT_PACKET_TIMEOUT);
    }

    #[test]
    fn escrow_address_is_channel_specific() {
        let a = ChannelConfig::transfer("channel-0", "channel-4");
        let b = ChannelConfig::transfer("channel-1", "channel-4");
        assert_ne!(a.escrow_address(), b.escrow_address());
    }
}
