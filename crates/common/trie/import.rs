use bytes::Bytes;
use stray_rlp::constants::RLP_NULL;
use thiserror::Error;

use crate::{db::TrieDB, node::Node, node::NodeKind, node_hash::NodeHash};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeImportError {
    #[error("malformed node rlp: {0}")]
    MalformedNode(String),
    #[error("node storage failure: {0}")]
    Storage(String),
}

/// Outcome of importing one blob (or, for trailing storage-error entries,
/// of the batch cutting short). `slot` indexes the blob the entry refers to;
/// a `slot`-less entry signals a storage-layer failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeImportReport {
    pub slot: Option<usize>,
    pub kind: Option<NodeKind>,
    pub error: Option<NodeImportError>,
}

/// Batched insert of opaque RLP-encoded nodes into the store.
///
/// Each blob is stored atomically under its content hash or not at all.
/// Malformed blobs are dropped individually and reported; a storage failure
/// stops the batch, appending a trailing entry with no `slot` so callers can
/// requeue everything still unaccounted for.
///
/// The RLP null string is accepted as the canonical empty-trie node: it is
/// stored but reported without a kind, since it references nothing.
pub fn import_node_blobs(db: &dyn TrieDB, blobs: &[Bytes]) -> Vec<NodeImportReport> {
    let mut reports = Vec::with_capacity(blobs.len());
    for (slot, blob) in blobs.iter().enumerate() {
        let kind = if blob.as_ref() == [RLP_NULL].as_slice() {
            None
        } else {
            match Node::decode_raw(blob) {
                Ok(node) => Some(node.kind()),
                Err(err) => {
                    reports.push(NodeImportReport {
                        slot: Some(slot),
                        kind: None,
                        error: Some(NodeImportError::MalformedNode(err.to_string())),
                    });
                    continue;
                }
            }
        };
        let key = NodeHash::from_encoded_raw(blob);
        match db.put(key, blob.to_vec()) {
            Ok(()) => reports.push(NodeImportReport {
                slot: Some(slot),
                kind,
                error: None,
            }),
            Err(err) => {
                reports.push(NodeImportReport {
                    slot: None,
                    kind: None,
                    error: Some(NodeImportError::Storage(err.to_string())),
                });
                break;
            }
        }
    }
    reports
}
