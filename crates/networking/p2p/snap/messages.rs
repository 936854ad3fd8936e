//! Snap protocol message definitions.
//!
//! Shapes of the snap messages the sync engine exchanges with its peers.
//! The wire codec lives with the transport; these are the decoded forms.

use bytes::Bytes;
use ethereum_types::H256;

/// Request trie nodes from state or storage tries.
#[derive(Debug, Clone)]
pub struct GetTrieNodes {
    /// Request ID - the responding peer must mirror this value
    pub id: u64,
    /// State root hash to query against
    pub root_hash: H256,
    /// Paths to trie nodes: [[acc_path, slot_path_1, slot_path_2,...]...]
    /// Paths can be full paths (hash) or partial paths (compact-encoded nibbles)
    pub paths: Vec<Vec<Bytes>>,
    /// Maximum response size in bytes
    pub bytes: u64,
}

/// Response containing trie nodes.
#[derive(Debug, Clone)]
pub struct TrieNodes {
    /// Request ID - mirrors the value from the request
    pub id: u64,
    /// Trie nodes
    pub nodes: Vec<Bytes>,
}
