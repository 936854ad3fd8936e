//! Account-trie healing, one buddy tick at a time.
//!
//! A tick moves the pivot's work queues forward:
//!
//! 1. reclassify missing nodes that showed up locally meanwhile,
//! 2. inspect checked nodes for dangling children,
//! 3. fetch a bounded slice of the missing list from the peer,
//! 4. import the blobs and classify each one.
//!
//! Recoverable trouble never escapes: failed work returns to the queues and
//! misbehaving peers are flagged zombie through the buddy control block.

use ethereum_types::{H256, U256};
use stray_common::types::AccountState;
use stray_rlp::decode::RLPDecode;
use stray_trie::{
    import_node_blobs, inspect_trie, lookup_node, Nibbles, Node, NodeKind, TrieDB, TrieInspection,
    EMPTY_TRIE_HASH,
};
use tracing::{debug, info, trace, warn};

use crate::peer::Buddy;

use super::{
    fetcher::{fetch_trie_nodes, TrieNodeReply},
    pivot::{PivotEnv, SharedPivot},
    ranges::{node_tag, CoverageTracker},
    HealerConfig,
};

/// What a single healing tick amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealOutcome {
    /// The gate held the tick back; nothing was done.
    Postponed,
    /// Some work moved; call again.
    Advanced,
    /// The pivot's account trie is fully healed.
    Complete,
    /// The peer is unusable; the buddy should exit.
    Aborted,
}

/// Runs one healing tick for `buddy` against the shared pivot state.
/// Idempotent once the trie is healed. Suspends only while fetching.
pub async fn heal_accounts_db(
    buddy: &mut Buddy,
    pivot: &SharedPivot,
    coverage: &CoverageTracker,
    db: &dyn TrieDB,
    config: &HealerConfig,
) -> HealOutcome {
    // Healing is kept "late": below the coverage trigger the range-fetch
    // path is still the cheaper way to make progress.
    if coverage.full_factor() < config.heal_accounts_trigger {
        trace!(peer = %buddy.id(), "healing gated on account coverage");
        return HealOutcome::Postponed;
    }

    let state_root = {
        let mut env = pivot.lock();
        update_missing_nodes(&mut env, db);
        env.state_root()
    };

    // Inspect when there are checked nodes to follow up on, or at the very
    // start when only the root request exists.
    let seeds = {
        let mut env = pivot.lock();
        if !env.check_nodes.is_empty() || env.missing_nodes.is_empty() {
            Some(env.take_check_nodes())
        } else {
            None
        }
    };
    if let Some(seeds) = seeds {
        match inspect_trie(db, state_root, &seeds, config.inspect_frontier_limit) {
            Ok(inspection) => append_dangling_nodes(pivot, coverage, db, state_root, inspection),
            Err(err) => {
                // Treat every seed as still uninspected, then drop the peer:
                // a node that fails to decode mid-descent will fail for any
                // buddy, but no work may be lost over it.
                pivot.lock().check_nodes.extend(seeds);
                buddy.ctrl.mark_zombie();
                warn!(peer = %buddy.id(), %err, "trie inspection failed");
                return HealOutcome::Aborted;
            }
        }
    }

    let slice = {
        let mut env = pivot.lock();
        if env.is_healed() {
            info!(
                peer = %buddy.id(),
                pivot = env.state_header.number,
                accounts = env.n_accounts,
                "account trie healed"
            );
            return HealOutcome::Complete;
        }
        env.take_fetch_slice(config.max_trie_node_fetch)
    };
    if slice.is_empty() {
        // Another buddy grabbed the remaining work between our lock scopes
        return HealOutcome::Advanced;
    }

    let peer = buddy.peer.clone();
    let fetched = fetch_trie_nodes(peer.as_ref(), state_root, slice.clone(), config).await;
    let TrieNodeReply {
        answered,
        nodes,
        left_over,
    } = match fetched {
        Ok(reply) => {
            buddy.ctrl.register_success();
            reply
        }
        Err(err) => {
            // The in-flight slice goes back before anything else happens
            pivot.lock().restore_fetch_slice(slice);
            buddy.ctrl.register_error(err.weight());
            if buddy.ctrl.is_zombie() {
                warn!(peer = %buddy.id(), %err, "peer struck out, zombifying");
                return HealOutcome::Aborted;
            }
            debug!(peer = %buddy.id(), %err, "trie node fetch failed");
            return HealOutcome::Advanced;
        }
    };

    pivot.lock().missing_nodes.extend(left_over);

    let reports = import_node_blobs(db, &nodes);
    if reports.iter().any(|report| report.slot.is_none()) {
        // Node store write failure: requeue the whole answered batch and let
        // a later tick retry it.
        warn!(peer = %buddy.id(), "node import hit a storage error, requeueing batch");
        pivot.lock().restore_fetch_slice(answered);
        return HealOutcome::Advanced;
    }

    let mut env = pivot.lock();
    for report in &reports {
        let Some(slot) = report.slot else { continue };
        let request = &answered[slot];
        if report.error.is_some() {
            env.missing_nodes.push(request.clone());
            continue;
        }
        match report.kind {
            Some(NodeKind::Branch) | Some(NodeKind::Extension) => {
                env.check_nodes.push(request.path.clone());
            }
            Some(NodeKind::Leaf) => {
                classify_leaf(&mut env, coverage, request.path.clone(), &nodes[slot]);
            }
            // A kind-less success is the empty-trie marker: it references
            // nothing, so there is nothing left to heal beneath it.
            None => {}
        }
    }
    drop(env);
    HealOutcome::Advanced
}

/// Moves missing nodes that are now present locally (filled in by another
/// buddy or by the range-fetch path) over to the check list, deduplicating
/// along the way. Only the node itself is probed, not its subtree; the
/// inspector rediscovers deeper gaps from the check list.
fn update_missing_nodes(env: &mut PivotEnv, db: &dyn TrieDB) {
    let candidates = std::mem::take(&mut env.missing_nodes);
    let mut seen = std::collections::HashSet::with_capacity(candidates.len());
    for request in candidates {
        if !seen.insert(request.path.clone()) {
            continue;
        }
        match db.contains(request.hash.into()) {
            Ok(true) => env.check_nodes.push(request.path),
            Ok(false) => env.missing_nodes.push(request),
            Err(err) => {
                debug!(%err, "node store read failed, keeping node queued");
                env.missing_nodes.push(request);
            }
        }
    }
}

/// Feeds an inspection result back into the pivot: dangling references
/// extend the missing list, and leaves that were already present locally are
/// registered the same way freshly imported ones are.
fn append_dangling_nodes(
    pivot: &SharedPivot,
    coverage: &CoverageTracker,
    db: &dyn TrieDB,
    state_root: H256,
    inspection: TrieInspection,
) {
    let TrieInspection { dangling, leaves } = inspection;
    // Resolve leaf contents outside the pivot lock
    let mut found_leaves = Vec::new();
    for position in leaves {
        match lookup_node(db, state_root, &position) {
            Ok(Some(Node::Leaf(leaf))) => found_leaves.push((position, leaf)),
            Ok(_) => {}
            Err(err) => debug!(%err, "failed to reload inspected leaf"),
        }
    }

    let mut env = pivot.lock();
    env.missing_nodes.extend(dangling);
    for (position, leaf) in found_leaves {
        let full_path = position.concat(&leaf.partial);
        if full_path.len() == 64 {
            register_account_leaf(&mut env, coverage, &full_path, &leaf.value);
        } else {
            // A positional artifact above account depth goes back for
            // inspection, same as in import classification
            env.check_nodes.push(position);
        }
    }
}

fn classify_leaf(env: &mut PivotEnv, coverage: &CoverageTracker, position: Nibbles, blob: &[u8]) {
    // The blob imported cleanly as a leaf, so this decode cannot fail
    let Ok(Node::Leaf(leaf)) = Node::decode_raw(blob) else {
        return;
    };
    let full_path = position.concat(&leaf.partial);
    if full_path.len() == 64 {
        register_account_leaf(env, coverage, &full_path, &leaf.value);
    } else {
        // A positional artifact above account depth: its children still
        // need inspection, like any internal node
        env.check_nodes.push(position);
    }
}

/// Books one account leaf: drop it if its key range was already processed,
/// otherwise mark the key covered, count it, and queue its storage trie.
fn register_account_leaf(
    env: &mut PivotEnv,
    coverage: &CoverageTracker,
    full_path: &Nibbles,
    value: &[u8],
) {
    let account = match AccountState::decode(value) {
        Ok(account) => account,
        Err(err) => {
            debug!(%err, "dropping account leaf with undecodable value");
            return;
        }
    };
    let key_bytes = full_path.to_bytes();
    debug_assert_eq!(key_bytes.len(), 32);
    let account_hash = H256::from_slice(&key_bytes);
    let tag: U256 = node_tag(account_hash);

    let Some(unprocessed) = env
        .unprocessed
        .iter_mut()
        .find(|ranges| ranges.contains(tag))
    else {
        // Outside every pending range: the account was already processed
        trace!(account = %account_hash, "skipping already-covered account leaf");
        return;
    };
    unprocessed.reduce(tag, tag);
    coverage.merge(tag, tag);
    env.n_accounts += 1;
    if account.storage_root != *EMPTY_TRIE_HASH {
        env.push_storage_root(account_hash, account.storage_root);
    }
}
