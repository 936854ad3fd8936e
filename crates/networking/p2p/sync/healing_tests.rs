//! Scenario tests for the account-trie healing engine.
//!
//! Each test drives `heal_accounts_db` tick by tick against an in-memory
//! node store and a scripted peer, covering the empty trie, single-account
//! healing, dangling-child discovery, partial replies, zombification and the
//! coverage gate.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use ethereum_types::{H256, U256};
use parking_lot::Mutex;

use stray_common::types::{AccountState, BlockHeader};
use stray_common::utils::keccak;
use stray_rlp::encode::RLPEncode;
use stray_trie::{
    InMemoryTrieDB, LeafNode, Nibbles, Node, NodeHash, NodeRequest, TrieDB, EMPTY_TRIE_HASH,
};

use crate::peer::{Buddy, PeerError, SnapPeer};
use crate::snap::{GetTrieNodes, TrieNodes};
use crate::sync::{
    healing::{heal_accounts_db, HealOutcome},
    pivot::{PivotEnv, SharedPivot},
    ranges::{node_tag, CoverageTracker},
    HealerConfig,
};

enum PeerScript {
    Nodes(Vec<Bytes>),
    Error(PeerError),
    Hang,
}

struct ScriptedPeer {
    id: H256,
    script: Mutex<VecDeque<PeerScript>>,
    requests: Mutex<Vec<GetTrieNodes>>,
}

impl ScriptedPeer {
    fn new(script: Vec<PeerScript>) -> Arc<Self> {
        Arc::new(Self {
            id: H256::repeat_byte(0x77),
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl SnapPeer for ScriptedPeer {
    fn id(&self) -> H256 {
        self.id
    }

    async fn get_trie_nodes(&self, request: GetTrieNodes) -> Result<TrieNodes, PeerError> {
        let id = request.id;
        let step = self.script.lock().pop_front();
        self.requests.lock().push(request);
        match step {
            Some(PeerScript::Nodes(nodes)) => Ok(TrieNodes { id, nodes }),
            Some(PeerScript::Error(err)) => Err(err),
            Some(PeerScript::Hang) | None => std::future::pending().await,
        }
    }
}

struct Harness {
    db: InMemoryTrieDB,
    pivot: SharedPivot,
    coverage: CoverageTracker,
    config: HealerConfig,
    buddy: Buddy,
}

impl Harness {
    fn new(state_root: H256, peer: Arc<ScriptedPeer>) -> Self {
        let header = BlockHeader {
            number: 1,
            state_root,
            ..Default::default()
        };
        Self {
            db: InMemoryTrieDB::new_empty(),
            pivot: Arc::new(Mutex::new(PivotEnv::new(header))),
            coverage: CoverageTracker::new(),
            // The scenarios exercise the machinery past the gate by default
            config: HealerConfig {
                heal_accounts_trigger: 0.0,
                reply_timeout: Duration::from_millis(100),
                ..Default::default()
            },
            buddy: Buddy::new(peer),
        }
    }

    async fn tick(&mut self) -> HealOutcome {
        let outcome = heal_accounts_db(
            &mut self.buddy,
            &self.pivot,
            &self.coverage,
            &self.db,
            &self.config,
        )
        .await;
        self.assert_queues_disjoint();
        outcome
    }

    /// No node path sits in both work queues after a tick.
    fn assert_queues_disjoint(&self) {
        let env = self.pivot.lock();
        for request in &env.missing_nodes {
            assert!(
                !env.check_nodes.contains(&request.path),
                "path {:?} queued as both missing and checked",
                request.path
            );
        }
    }
}

/// A leaf node holding `account` whose full key is `key`, positioned
/// `position_len` nibbles below the root.
fn account_leaf(key: H256, position_len: usize, account: &AccountState) -> (Node, Bytes) {
    let mut nibbles = Nibbles::from_bytes(key.as_bytes()).into_vec();
    nibbles.drain(..position_len);
    let node: Node = LeafNode {
        partial: Nibbles::from_hex(nibbles),
        value: account.encode_to_vec(),
    }
    .into();
    let blob = Bytes::from(node.encode_raw());
    (node, blob)
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn s1_empty_trie_heals_with_no_accounts() {
        let empty_node = Bytes::from_static(&[0x80]);
        let peer = ScriptedPeer::new(vec![PeerScript::Nodes(vec![empty_node])]);
        let mut harness = Harness::new(*EMPTY_TRIE_HASH, peer.clone());

        assert_eq!(harness.tick().await, HealOutcome::Advanced);
        assert_eq!(harness.tick().await, HealOutcome::Complete);

        let env = harness.pivot.lock();
        assert_eq!(env.n_accounts, 0);
        assert!(env.fetch_storage.is_empty());
        assert!(env.is_healed());
        assert_eq!(peer.request_count(), 1);
    }

    #[tokio::test]
    async fn s2_single_account_trie() {
        let mut key_bytes = [0xab; 32];
        key_bytes[31] = 0xcd;
        let key = H256(key_bytes);
        let account = AccountState {
            nonce: 1,
            balance: U256::from(1000),
            ..Default::default()
        };
        let (_, blob) = account_leaf(key, 0, &account);
        let state_root = keccak(&blob);

        let peer = ScriptedPeer::new(vec![PeerScript::Nodes(vec![blob])]);
        let mut harness = Harness::new(state_root, peer);

        assert_eq!(harness.tick().await, HealOutcome::Advanced);
        assert_eq!(harness.tick().await, HealOutcome::Complete);

        let env = harness.pivot.lock();
        assert_eq!(env.n_accounts, 1);
        assert!(env.fetch_storage.is_empty());
        let tag = node_tag(key);
        assert_eq!(harness.coverage.covered(tag, tag), U256::one());
        assert!(!env.unprocessed[0].contains(tag));
    }

    #[tokio::test]
    async fn s3_dangling_child_is_discovered_and_fetched() {
        // Branch with children at nibbles 3 and 5; only the one at 5 is local
        let key3 = H256([0x33; 32]);
        let key5 = H256([0x55; 32]);
        let account = AccountState::default();
        let (_, blob3) = account_leaf(key3, 1, &account);
        let (node5, blob5) = account_leaf(key5, 1, &account);

        let mut choices = [NodeHash::default(); 16];
        choices[3] = NodeHash::from_encoded_raw(&blob3);
        choices[5] = node5.compute_hash();
        let branch: Node = stray_trie::BranchNode {
            choices,
            value: vec![],
        }
        .into();
        let branch_blob = branch.encode_raw();
        let state_root = keccak(&branch_blob);

        let peer = ScriptedPeer::new(vec![PeerScript::Nodes(vec![blob3])]);
        let mut harness = Harness::new(state_root, peer.clone());
        harness
            .db
            .put(branch.compute_hash(), branch_blob.clone())
            .unwrap();
        harness.db.put(node5.compute_hash(), blob5.to_vec()).unwrap();

        // Tick 1: the root moves to the check list, inspection finds exactly
        // the child behind nibble 3 dangling, and the fetch brings it in.
        assert_eq!(harness.tick().await, HealOutcome::Advanced);
        {
            let requested = peer.requests.lock();
            assert_eq!(requested.len(), 1);
            assert_eq!(
                requested[0].paths,
                vec![vec![Bytes::from(Nibbles::from_hex(vec![3]).encode_compact())]]
            );
        }
        assert_eq!(harness.tick().await, HealOutcome::Complete);

        let env = harness.pivot.lock();
        // Both the fetched leaf and the one found during inspection count
        assert_eq!(env.n_accounts, 2);
    }

    #[tokio::test]
    async fn s4_partial_reply_requeues_the_left_over() {
        let account = AccountState::default();
        let mut requests = Vec::new();
        let mut blobs = Vec::new();
        for nibble in 0..8u8 {
            let key = H256([nibble << 4 | nibble; 32]);
            let (_, blob) = account_leaf(key, 1, &account);
            requests.push(NodeRequest {
                path: Nibbles::from_hex(vec![nibble]),
                hash: keccak(&blob),
            });
            blobs.push(blob);
        }

        let peer = ScriptedPeer::new(vec![
            PeerScript::Nodes(blobs[..5].to_vec()),
            PeerScript::Nodes(blobs[5..].to_vec()),
        ]);
        let mut harness = Harness::new(H256::repeat_byte(0xee), peer);
        harness.pivot.lock().missing_nodes = requests.clone();

        assert_eq!(harness.tick().await, HealOutcome::Advanced);
        {
            let env = harness.pivot.lock();
            assert_eq!(env.n_accounts, 5);
            assert_eq!(env.missing_nodes, requests[5..].to_vec());
        }
        let coverage_after_first = harness.coverage.full_factor();

        // Next tick classification proceeds normally over the requeued tail
        assert_eq!(harness.tick().await, HealOutcome::Advanced);
        assert_eq!(harness.pivot.lock().n_accounts, 8);
        assert!(harness.coverage.full_factor() >= coverage_after_first);
        assert_eq!(harness.tick().await, HealOutcome::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn s5_repeated_timeouts_zombify_the_buddy() {
        let account = AccountState::default();
        let (_, blob) = account_leaf(H256([0x11; 32]), 1, &account);
        let preset = vec![NodeRequest {
            path: Nibbles::from_hex(vec![1]),
            hash: keccak(&blob),
        }];

        let peer = ScriptedPeer::new(vec![PeerScript::Hang, PeerScript::Hang, PeerScript::Hang]);
        let mut harness = Harness::new(H256::repeat_byte(0xee), peer);
        harness.pivot.lock().missing_nodes = preset.clone();

        assert_eq!(harness.tick().await, HealOutcome::Advanced);
        assert_eq!(harness.tick().await, HealOutcome::Advanced);
        assert!(!harness.buddy.ctrl.is_zombie());
        assert_eq!(harness.tick().await, HealOutcome::Aborted);
        assert!(harness.buddy.ctrl.is_zombie());

        // The in-flight slice was restored every time
        assert_eq!(harness.pivot.lock().missing_nodes, preset);
    }

    #[tokio::test]
    async fn s6_gate_blocks_below_the_coverage_trigger() {
        let empty_node = Bytes::from_static(&[0x80]);
        let peer = ScriptedPeer::new(vec![PeerScript::Nodes(vec![empty_node])]);
        let mut harness = Harness::new(*EMPTY_TRIE_HASH, peer.clone());
        harness.config.heal_accounts_trigger = 0.5;

        // A quarter of the key space covered: below the trigger, no-op
        harness.coverage.merge(U256::zero(), U256::MAX / U256::from(4));
        assert_eq!(harness.tick().await, HealOutcome::Postponed);
        assert_eq!(peer.request_count(), 0);
        assert_eq!(harness.pivot.lock().missing_nodes.len(), 1);

        // Raise coverage to the trigger and the tick proceeds
        harness.coverage.merge(U256::zero(), U256::MAX / U256::from(2));
        assert_eq!(harness.tick().await, HealOutcome::Advanced);
        assert_eq!(peer.request_count(), 1);
    }
}

mod classification {
    use super::*;

    #[tokio::test]
    async fn accounts_with_storage_are_queued_for_storage_healing() {
        let key = H256([0x42; 32]);
        let storage_root = H256::repeat_byte(0xbe);
        let account = AccountState {
            storage_root,
            ..Default::default()
        };
        let (_, blob) = account_leaf(key, 0, &account);
        let state_root = keccak(&blob);

        let peer = ScriptedPeer::new(vec![PeerScript::Nodes(vec![blob])]);
        let mut harness = Harness::new(state_root, peer);
        assert_eq!(harness.tick().await, HealOutcome::Advanced);

        let env = harness.pivot.lock();
        assert_eq!(env.n_accounts, 1);
        assert_eq!(
            env.fetch_storage,
            [(key, storage_root)].into_iter().collect()
        );
    }

    #[tokio::test]
    async fn already_covered_leaves_are_dropped() {
        let key = H256([0x42; 32]);
        let account = AccountState::default();
        let (_, blob) = account_leaf(key, 0, &account);
        let state_root = keccak(&blob);

        let peer = ScriptedPeer::new(vec![PeerScript::Nodes(vec![blob])]);
        let mut harness = Harness::new(state_root, peer);
        // The range-fetch path already processed this key
        let tag = node_tag(key);
        harness.pivot.lock().unprocessed[0].reduce(tag, tag);

        assert_eq!(harness.tick().await, HealOutcome::Advanced);
        assert_eq!(harness.tick().await, HealOutcome::Complete);

        let env = harness.pivot.lock();
        // Dropped, not double-counted
        assert_eq!(env.n_accounts, 0);
        assert!(env.fetch_storage.is_empty());
    }

    #[tokio::test]
    async fn short_leaves_found_by_inspection_requeue_for_checking() {
        // A leaf terminating above account depth: position plus partial
        // comes to fewer than 64 nibbles
        let node: Node = LeafNode {
            partial: Nibbles::from_hex(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 0xa, 16]),
            value: vec![0x5a; 40],
        }
        .into();
        let blob = node.encode_raw();
        let state_root = keccak(&blob);

        let peer = ScriptedPeer::new(vec![]);
        let mut harness = Harness::new(state_root, peer.clone());
        harness.db.put(node.compute_hash(), blob).unwrap();

        assert_eq!(harness.tick().await, HealOutcome::Complete);

        let env = harness.pivot.lock();
        assert_eq!(env.n_accounts, 0);
        // The position returns to the check list, same as an imported short
        // leaf would through classification
        assert_eq!(env.check_nodes, vec![Nibbles::default()]);
        assert_eq!(peer.request_count(), 0);
    }

    #[tokio::test]
    async fn undecodable_blobs_are_requeued() {
        // Hash matches, so the fetcher accepts it; the import drops it
        let garbage = Bytes::from_static(&[0xc1, 0x01]);
        let request = NodeRequest {
            path: Nibbles::from_hex(vec![1]),
            hash: keccak(&garbage),
        };
        let peer = ScriptedPeer::new(vec![PeerScript::Nodes(vec![garbage])]);
        let mut harness = Harness::new(H256::repeat_byte(0xee), peer);
        harness.pivot.lock().missing_nodes = vec![request.clone()];

        assert_eq!(harness.tick().await, HealOutcome::Advanced);
        assert_eq!(harness.pivot.lock().missing_nodes, vec![request]);
        assert!(!harness.buddy.ctrl.is_zombie());
    }

    #[tokio::test]
    async fn wrong_hash_replies_strike_out_immediately() {
        let account = AccountState::default();
        let (_, blob) = account_leaf(H256([0x11; 32]), 1, &account);
        let request = NodeRequest {
            path: Nibbles::from_hex(vec![1]),
            hash: H256::repeat_byte(0xdd),
        };
        let peer = ScriptedPeer::new(vec![PeerScript::Nodes(vec![blob])]);
        let mut harness = Harness::new(H256::repeat_byte(0xee), peer);
        harness.pivot.lock().missing_nodes = vec![request.clone()];

        assert_eq!(harness.tick().await, HealOutcome::Aborted);
        assert!(harness.buddy.ctrl.is_zombie());
        assert_eq!(harness.pivot.lock().missing_nodes, vec![request]);
    }

    #[tokio::test]
    async fn peer_errors_propagate_their_weight() {
        let account = AccountState::default();
        let (_, blob) = account_leaf(H256([0x11; 32]), 1, &account);
        let request = NodeRequest {
            path: Nibbles::from_hex(vec![1]),
            hash: keccak(&blob),
        };
        let peer = ScriptedPeer::new(vec![PeerScript::Error(PeerError::Closed)]);
        let mut harness = Harness::new(H256::repeat_byte(0xee), peer);
        harness.pivot.lock().missing_nodes = vec![request];

        assert_eq!(harness.tick().await, HealOutcome::Aborted);
        assert!(harness.buddy.ctrl.is_zombie());
    }
}
