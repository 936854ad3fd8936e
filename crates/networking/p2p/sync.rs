//! Sync module - the snap-sync account-trie healing engine.
//!
//! Healing runs after the range-fetch path has downloaded the bulk of the
//! account state. Because that download spans multiple sync cycles, each with
//! a different pivot, the rebuilt trie is made of fragments of different
//! state tries and is consistent with no single block. Healing fixes this by
//! walking the pivot's trie top-down, fetching every node that is missing
//! locally, until no dangling reference is left.
//!
//! The engine is a fleet of per-peer workers ("buddies") over shared
//! per-pivot work queues, driven by a coordinator that also owns the global
//! coverage tracker and the progress ticker.

pub mod constants;
pub mod coordinator;
pub mod fetcher;
pub mod healing;
pub mod pivot;
pub mod ranges;
pub mod ticker;

#[cfg(test)]
mod healing_tests;

use std::time::Duration;

use stray_trie::TrieError;
use thiserror::Error;

use crate::chain::ChainError;
use constants::{
    HEAL_ACCOUNTS_TRIGGER, INSPECT_FRONTIER_LIMIT, MAX_BUDDIES, MAX_TRIE_NODE_FETCH,
    PEER_REPLY_TIMEOUT, TICKER_INTERVAL,
};

pub use coordinator::Coordinator;
pub use healing::{heal_accounts_db, HealOutcome};
pub use ranges::{CoverageTracker, TagRangeSet};

/// Knobs of the healing engine. The defaults match the module constants;
/// tests and embedders override individual fields.
#[derive(Debug, Clone)]
pub struct HealerConfig {
    /// Coverage fraction of the account key space required before healing
    /// starts; below it the cheaper range-fetch path is left to do the work.
    pub heal_accounts_trigger: f64,
    /// Cap on trie nodes requested from a peer in one `GetTrieNodes` call.
    pub max_trie_node_fetch: usize,
    /// Upper bound on nodes visited per trie inspection call.
    pub inspect_frontier_limit: usize,
    /// Per-request reply deadline.
    pub reply_timeout: Duration,
    /// Most buddies the coordinator will run at once.
    pub max_buddies: usize,
    /// Cadence of the stats ticker.
    pub ticker_interval: Duration,
}

impl Default for HealerConfig {
    fn default() -> Self {
        Self {
            heal_accounts_trigger: HEAL_ACCOUNTS_TRIGGER,
            max_trie_node_fetch: MAX_TRIE_NODE_FETCH,
            inspect_frontier_limit: INSPECT_FRONTIER_LIMIT,
            reply_timeout: PEER_REPLY_TIMEOUT,
            max_buddies: MAX_BUDDIES,
            ticker_interval: TICKER_INTERVAL,
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Trie(#[from] TrieError),
}

impl SyncError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::Chain(_) => false,
            SyncError::Trie(_) => true,
        }
    }
}
