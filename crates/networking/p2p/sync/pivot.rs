//! Per-pivot mutable work state.
//!
//! A [`PivotEnv`] is created when a new pivot block is adopted and dropped
//! when sync advances past it. Buddies share it behind a mutex; every
//! read-modify-write sequence happens inside one lock scope, and the lock is
//! never held across a suspension point, so between awaits other buddies may
//! observe and reshuffle the queues.

use std::{
    collections::HashSet,
    sync::Arc,
};

use ethereum_types::H256;
use parking_lot::Mutex;
use stray_common::types::BlockHeader;
use stray_trie::{Nibbles, NodeRequest};

use super::ranges::TagRangeSet;

pub type SharedPivot = Arc<Mutex<PivotEnv>>;

/// Mutable work-state for healing one pivot's account trie.
#[derive(Debug)]
pub struct PivotEnv {
    /// The pivot block header; its state root is the trie healed toward.
    pub state_header: BlockHeader,
    /// Nodes believed absent locally, with the keys their parents expect.
    pub missing_nodes: Vec<NodeRequest>,
    /// Positions of nodes present locally whose children still need inspection.
    pub check_nodes: Vec<Nibbles>,
    /// Account key ranges not yet covered by range-fetch or healing.
    pub unprocessed: Vec<TagRangeSet>,
    /// Storage tries left to heal later: (account hash, storage root).
    pub fetch_storage: HashSet<(H256, H256)>,
    /// Accounts registered on this pivot.
    pub n_accounts: u64,
}

impl PivotEnv {
    pub fn new(state_header: BlockHeader) -> Self {
        let state_root = state_header.state_root;
        Self {
            state_header,
            missing_nodes: vec![NodeRequest::root(state_root)],
            check_nodes: Vec::new(),
            unprocessed: vec![TagRangeSet::full()],
            fetch_storage: HashSet::new(),
            n_accounts: 0,
        }
    }

    pub fn state_root(&self) -> H256 {
        self.state_header.state_root
    }

    /// The account trie is healed once nothing is known to be missing.
    pub fn is_healed(&self) -> bool {
        self.missing_nodes.is_empty()
    }

    /// Takes a suffix of the missing list for one fetch, truncating the list
    /// so concurrent buddies do not dispatch the same nodes twice.
    pub fn take_fetch_slice(&mut self, max: usize) -> Vec<NodeRequest> {
        let keep = self.missing_nodes.len().saturating_sub(max);
        self.missing_nodes.split_off(keep)
    }

    /// Returns an in-flight slice after a failed fetch. The slice may land
    /// after entries other buddies queued meanwhile; order carries no meaning.
    pub fn restore_fetch_slice(&mut self, slice: Vec<NodeRequest>) {
        self.missing_nodes.extend(slice);
    }

    /// Drains the check list for one inspection pass, removing duplicates
    /// while preserving first-seen order.
    pub fn take_check_nodes(&mut self) -> Vec<Nibbles> {
        let mut seen = HashSet::new();
        std::mem::take(&mut self.check_nodes)
            .into_iter()
            .filter(|path| seen.insert(path.clone()))
            .collect()
    }

    /// Records a storage trie for the later storage-heal phase.
    pub fn push_storage_root(&mut self, account_hash: H256, storage_root: H256) {
        self.fetch_storage.insert((account_hash, storage_root));
    }

    /// Hands the pending work positions over for a pivot switch. Expected
    /// hashes are dropped: they were only valid under the old root.
    pub fn drain_heal_checkpoint(&mut self) -> Vec<Nibbles> {
        let mut paths: Vec<Nibbles> = std::mem::take(&mut self.missing_nodes)
            .into_iter()
            .map(|request| request.path)
            .collect();
        paths.append(&mut self.check_nodes);
        paths
    }

    /// Seeds a fresh pivot with positions carried over from the previous one.
    /// They enter through the check list: the inspector re-resolves them under
    /// the new root and drops the ones that no longer exist.
    pub fn adopt_checkpoint(&mut self, paths: Vec<Nibbles>) {
        self.check_nodes.extend(
            paths
                .into_iter()
                .filter(|path| !path.is_empty()),
        );
    }
}
