use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use ethereum_types::H256;
use thiserror::Error;

use crate::{
    snap::{GetTrieNodes, TrieNodes},
    sync::constants::PEER_ERROR_THRESHOLD,
};

/// Errors surfaced by the wire collaborator itself.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer connection closed")]
    Closed,
    #[error("peer protocol violation: {0}")]
    Protocol(String),
}

/// A snap-capable remote peer. The RLPx transport and message codec live
/// outside the sync engine; this is the request surface it consumes.
#[async_trait]
pub trait SnapPeer: Send + Sync {
    fn id(&self) -> H256;
    async fn get_trie_nodes(&self, request: GetTrieNodes) -> Result<TrieNodes, PeerError>;
}

/// Per-buddy control block: the zombie flag and the weighted error
/// accumulator feeding it. A zombie buddy exits at its next scheduling point.
#[derive(Debug, Default, Clone)]
pub struct BuddyCtrl {
    zombie: bool,
    errors: u8,
}

impl BuddyCtrl {
    pub fn is_zombie(&self) -> bool {
        self.zombie
    }

    pub fn mark_zombie(&mut self) {
        self.zombie = true;
    }

    /// A useful reply clears the accumulated strikes.
    pub fn register_success(&mut self) {
        self.errors = 0;
    }

    /// Accumulates a weighted error; crossing the threshold zombifies.
    /// Weight zero records a transient hiccup that never strikes out.
    pub fn register_error(&mut self, weight: u8) {
        self.errors = self.errors.saturating_add(weight);
        if self.errors >= PEER_ERROR_THRESHOLD {
            self.zombie = true;
        }
    }
}

/// A per-peer worker handle: the peer it talks to plus its control block.
pub struct Buddy {
    pub peer: Arc<dyn SnapPeer>,
    pub ctrl: BuddyCtrl,
}

impl Buddy {
    pub fn new(peer: Arc<dyn SnapPeer>) -> Self {
        Self {
            peer,
            ctrl: BuddyCtrl::default(),
        }
    }

    pub fn id(&self) -> H256 {
        self.peer.id()
    }
}

/// Long-lived reputation bookkeeping across buddy sessions.
#[derive(Debug, Clone, Default)]
pub struct PeerScores {
    scores: HashMap<H256, i64>,
}

impl PeerScores {
    pub fn get_score(&self, peer_id: &H256) -> i64 {
        *self.scores.get(peer_id).unwrap_or(&0)
    }

    pub fn record_success(&mut self, peer_id: H256) {
        let score = self.scores.entry(peer_id).or_insert(0);
        *score = score.saturating_add(1).min(50);
    }

    pub fn record_failure(&mut self, peer_id: H256) {
        let score = self.scores.entry(peer_id).or_insert(0);
        *score = score.saturating_sub(1).max(-50);
    }

    pub fn record_critical_failure(&mut self, peer_id: H256) {
        self.scores.insert(peer_id, i64::MIN);
    }
}
