pub mod db;
pub mod error;
pub mod import;
pub mod inspect;
mod nibbles;
pub mod node;
mod node_hash;
pub mod witness;

use ethereum_types::H256;
use lazy_static::lazy_static;
use stray_crypto::keccak::keccak_hash;
use stray_rlp::constants::RLP_NULL;

pub use self::db::{InMemoryTrieDB, TrieDB};
pub use self::error::TrieError;
pub use self::import::{import_node_blobs, NodeImportError, NodeImportReport};
pub use self::inspect::{inspect_trie, lookup_node, lookup_path, NodeRequest, TrieInspection};
pub use self::nibbles::Nibbles;
pub use self::node::{BranchNode, ExtensionNode, LeafNode, Node, NodeKind};
pub use self::node_hash::NodeHash;

lazy_static! {
    /// Hash of the empty trie, keccak of the null RLP string.
    pub static ref EMPTY_TRIE_HASH: H256 = H256(keccak_hash([RLP_NULL]));
}

/// RLP-encoded trie node
pub type NodeRLP = Vec<u8>;
