//! Buddy lifecycle, pivot adoption, and the shared coverage tracker.

use std::{
    collections::HashSet,
    sync::{Arc, Weak},
};

use ethereum_types::H256;
use parking_lot::Mutex;
use stray_common::types::{BlockBody, BlockHeader};
use stray_trie::TrieDB;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    chain::ChainStore,
    peer::{Buddy, PeerScores, SnapPeer},
};

use super::{
    constants::POSTPONE_BACKOFF,
    healing::{heal_accounts_db, HealOutcome},
    pivot::{PivotEnv, SharedPivot},
    ranges::CoverageTracker,
    ticker::{spawn_ticker, RunningStats, StatsUpdater, TickerStats},
    HealerConfig, SyncError,
};

#[derive(Default)]
struct StatsAggregate {
    n_accounts: RunningStats,
    n_storage: RunningStats,
    accounts_fill: RunningStats,
}

struct TickerHandle {
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

/// Owner of the healing fleet: hands out buddy slots bounded by
/// `max_buddies`, drives each buddy's tick loop, adopts pivots from the
/// chain's canonical head, and runs the stats ticker while any buddy lives.
/// The coordinator itself never mutates healing state.
pub struct Coordinator {
    /// Handle back to the owning `Arc`, for the ticker's stats closure.
    weak_self: Weak<Coordinator>,
    chain: Arc<dyn ChainStore>,
    db: Arc<dyn TrieDB>,
    config: HealerConfig,
    coverage: CoverageTracker,
    pivot: Mutex<Option<SharedPivot>>,
    buddies: Mutex<HashSet<H256>>,
    scores: Mutex<PeerScores>,
    stats: Mutex<StatsAggregate>,
    ticker: Mutex<Option<TickerHandle>>,
    cancel_token: CancellationToken,
}

impl Coordinator {
    pub fn new(chain: Arc<dyn ChainStore>, db: Arc<dyn TrieDB>, config: HealerConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            chain,
            db,
            config,
            coverage: CoverageTracker::new(),
            pivot: Mutex::new(None),
            buddies: Mutex::new(HashSet::new()),
            scores: Mutex::new(PeerScores::default()),
            stats: Mutex::new(StatsAggregate::default()),
            ticker: Mutex::new(None),
            cancel_token: CancellationToken::new(),
        })
    }

    pub fn coverage(&self) -> &CoverageTracker {
        &self.coverage
    }

    pub fn peer_score(&self, peer_id: &H256) -> i64 {
        self.scores.lock().get_score(peer_id)
    }

    pub fn current_pivot(&self) -> Option<SharedPivot> {
        self.pivot.lock().clone()
    }

    /// Adopts a new pivot, dropping the previous environment. Pending work
    /// positions carry over as inspection hints; buddies attached to the old
    /// pivot observe the switch at their next tick and wind down.
    pub fn adopt_pivot(&self, header: BlockHeader) {
        let mut slot = self.pivot.lock();
        let carried = slot.take().map(|old| old.lock().drain_heal_checkpoint());
        let mut env = PivotEnv::new(header);
        if let Some(paths) = carried {
            env.adopt_checkpoint(paths);
        }
        info!(
            pivot = env.state_header.number,
            state_root = %env.state_root(),
            "adopted sync pivot"
        );
        *slot = Some(Arc::new(Mutex::new(env)));
    }

    /// Adopts the chain's canonical head as the pivot.
    pub fn adopt_canonical_pivot(&self) -> Result<(), SyncError> {
        let header = self.chain.get_canonical_head()?;
        self.adopt_pivot(header);
        Ok(())
    }

    /// Stops all buddies at their next tick and the ticker with them.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
        self.stop_ticker();
    }

    /// Claims a buddy slot for a peer, or `None` when slots are exhausted or
    /// the peer already has one. The ticker runs while any slot is claimed.
    pub fn register_buddy(&self, peer: Arc<dyn SnapPeer>) -> Option<Buddy> {
        let first = {
            let mut buddies = self.buddies.lock();
            if buddies.len() >= self.config.max_buddies {
                debug!(peer = %peer.id(), "buddy slots exhausted");
                return None;
            }
            if !buddies.insert(peer.id()) {
                debug!(peer = %peer.id(), "peer already has a buddy");
                return None;
            }
            buddies.len() == 1
        };
        if first {
            self.start_ticker();
        }
        Some(Buddy::new(peer))
    }

    /// Drives a buddy until its pivot heals, the pivot is switched away, the
    /// peer zombifies, or shutdown. Releases the buddy slot on the way out.
    pub async fn run_buddy(self: Arc<Self>, mut buddy: Buddy) -> Result<(), SyncError> {
        let result = self.drive_buddy(&mut buddy).await;
        self.deregister_buddy(&buddy);
        result
    }

    async fn drive_buddy(&self, buddy: &mut Buddy) -> Result<(), SyncError> {
        let Some(pivot) = self.current_pivot() else {
            return Ok(());
        };
        loop {
            if self.cancel_token.is_cancelled() || buddy.ctrl.is_zombie() {
                return Ok(());
            }
            // A pivot switch drops the env; this buddy winds down with its pivot
            match self.current_pivot() {
                Some(current) if Arc::ptr_eq(&current, &pivot) => {}
                _ => return Ok(()),
            }
            let outcome =
                heal_accounts_db(buddy, &pivot, &self.coverage, self.db.as_ref(), &self.config)
                    .await;
            match outcome {
                HealOutcome::Postponed => tokio::time::sleep(POSTPONE_BACKOFF).await,
                HealOutcome::Advanced => tokio::task::yield_now().await,
                HealOutcome::Aborted => return Ok(()),
                HealOutcome::Complete => {
                    let header = pivot.lock().state_header.clone();
                    // The pivot's state is consistent now; hand its header
                    // back to the chain owner as persisted sync progress.
                    self.chain
                        .persist_blocks(vec![header], vec![BlockBody::default()])?;
                    return Ok(());
                }
            }
        }
    }

    fn deregister_buddy(&self, buddy: &Buddy) {
        {
            let mut scores = self.scores.lock();
            if buddy.ctrl.is_zombie() {
                scores.record_critical_failure(buddy.id());
            } else {
                scores.record_success(buddy.id());
            }
        }
        let empty = {
            let mut buddies = self.buddies.lock();
            buddies.remove(&buddy.id());
            buddies.is_empty()
        };
        if empty {
            self.stop_ticker();
        }
    }

    fn ticker_stats(&self) -> TickerStats {
        let pivot = self.current_pivot();
        let mut stats = self.stats.lock();
        let mut fill_sample = 0.0;
        let (pivot_block, n_queues) = match &pivot {
            Some(pivot) => {
                let env = pivot.lock();
                let pending: f64 = env.unprocessed.iter().map(|r| r.full_factor()).sum();
                fill_sample = (1.0 - pending).clamp(0.0, 1.0);
                stats.n_accounts.push(env.n_accounts as f64);
                stats.n_storage.push(env.fetch_storage.len() as f64);
                stats.accounts_fill.push(fill_sample);
                (Some(env.state_header.number), env.fetch_storage.len())
            }
            None => (None, 0),
        };
        TickerStats {
            pivot_block,
            n_accounts: stats.n_accounts.snapshot(),
            n_storage: stats.n_storage.snapshot(),
            accounts_fill: stats.accounts_fill.snapshot(),
            accounts_fill_merged: fill_sample,
            acc_coverage: self.coverage.full_factor(),
            n_queues,
        }
    }

    fn start_ticker(&self) {
        let mut slot = self.ticker.lock();
        if slot.is_some() {
            return;
        }
        let Some(this) = self.weak_self.upgrade() else {
            return;
        };
        let cancel = self.cancel_token.child_token();
        let updater: StatsUpdater = Arc::new(move || this.ticker_stats());
        let task = spawn_ticker(self.config.ticker_interval, updater, cancel.clone());
        *slot = Some(TickerHandle {
            cancel,
            _task: task,
        });
        debug!("stats ticker started");
    }

    fn stop_ticker(&self) {
        if let Some(handle) = self.ticker.lock().take() {
            handle.cancel.cancel();
            debug!("stats ticker stopped");
        }
    }
}
