//! Set of addresses denied all transfer participation.
//!
//! Membership only, no metadata. Every transfer consults this on its hot
//! path, so lookups are a single hash probe and the result does not depend
//! on the order entries were added in.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::address::Address;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlacklistStore {
    entries: HashSet<Address>,
}

impl BlacklistStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `address`. Returns `false` if it was already listed.
    pub fn blacklist(&mut self, address: Address) -> bool {
        self.entries.insert(address)
    }

    /// Removes `address`. Returns `false` if it was not listed.
    pub fn unblacklist(&mut self, address: &Address) -> bool {
        self.entries.remove(address)
    }

    pub fn is_blacklisted(&self, address: &Address) -> bool {
        self.entries.contains(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Listed addresses in byte order.
    pub fn addresses(&self) -> Vec<Address> {
        let mut out: Vec<Address> = self.entries.iter().copied().collect();
        out.sort();
        out
    }
}
