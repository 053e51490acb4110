//! # Denomination Traces
//!
//! A token that crosses a channel is renamed on the receiving side. The
//! trace records the path it took (`port/channel` hops, newest first) and
//! its base denomination; the local name of a traced token is
//! `ibc/` followed by the upper-case hex SHA-256 of `path/base`.
//!
//! Whether a chain is the *source* of a token decides what a transfer does:
//!
//! | Side      | Token came from here?                    | Action                     |
//! |-----------|-----------------------------------------|----------------------------|
//! | sending   | full path lacks `srcPort/srcChannel/`   | escrow (source) or burn    |
//! | receiving | full path starts with `srcPort/srcChannel/` | unescrow (home) or mint voucher |

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::VOUCHER_DENOM_PREFIX;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DenomTrace {
    /// Channel hops, e.g. `transfer/channel-0`. Empty for a native token.
    pub path: String,
    pub base_denom: String,
}

impl DenomTrace {
    /// Trace of a token that never left this chain.
    pub fn native(base_denom: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            base_denom: base_denom.into(),
        }
    }

    /// Splits a full path: everything up to the last `/` is the path, the
    /// last segment is the base denomination.
    pub fn parse(full_path: &str) -> Self {
        match full_path.rsplit_once('/') {
            Some((path, base)) => Self {
                path: path.to_string(),
                base_denom: base.to_string(),
            },
            None => Self::native(full_path),
        }
    }

    pub fn is_native(&self) -> bool {
        self.path.is_empty()
    }

    /// `path/base`, or just `base` for a native token.
    pub fn full_path(&self) -> String {
        if self.is_native() {
            self.base_denom.clone()
        } else {
            format!("{}/{}", self.path, self.base_denom)
        }
    }

    /// Local denomination: the base for native tokens, `ibc/HASH` otherwise.
    pub fn ibc_denom(&self) -> String {
        if self.is_native() {
            return self.base_denom.clone();
        }
        let hash = Sha256::digest(self.full_path().as_bytes());
        format!("{}{}", VOUCHER_DENOM_PREFIX, hex::encode_upper(hash))
    }
}

/// `port/channel/`, the prefix a hop adds to a full path.
pub fn hop_prefix(port_id: &str, channel_id: &str) -> String {
    format!("{port_id}/{channel_id}/")
}

/// Whether a token with `full_path`, sent over `port/channel`, is native to
/// the sending chain (and therefore escrowed rather than burned).
pub fn sender_is_source(port_id: &str, channel_id: &str, full_path: &str) -> bool {
    !full_path.starts_with(&hop_prefix(port_id, channel_id))
}

/// Whether a packet arriving from `source_port/source_channel` carries a
/// token returning to the receiving chain.
pub fn receiver_is_source(source_port: &str, source_channel: &str, full_path: &str) -> bool {
    full_path.starts_with(&hop_prefix(source_port, source_channel))
}
