//! Request/response plumbing for `GetTrieNodes` against a single peer.

use bytes::Bytes;
use ethereum_types::H256;
use stray_common::utils::keccak;
use stray_trie::NodeRequest;
use thiserror::Error;
use tracing::debug;

use crate::{
    peer::{PeerError, SnapPeer},
    snap::GetTrieNodes,
};

use super::{
    constants::{MAX_RESPONSE_BYTES, PEER_ERROR_THRESHOLD},
    HealerConfig,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("peer request timed out")]
    Timeout,
    #[error("peer returned a node with an unexpected hash")]
    WrongHash,
    #[error("peer connection closed")]
    PeerClosed,
    #[error("peer protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("peer returned an empty reply")]
    Empty,
}

impl FetchError {
    /// Weight fed into the per-peer error accumulator. Serious kinds strike
    /// out in one hit; timeouts only when repeated; empty replies never.
    pub fn weight(&self) -> u8 {
        match self {
            FetchError::Timeout => 1,
            FetchError::Empty => 0,
            FetchError::WrongHash
            | FetchError::PeerClosed
            | FetchError::ProtocolViolation(_) => PEER_ERROR_THRESHOLD,
        }
    }
}

/// A validated `GetTrieNodes` exchange: the requests the peer answered, the
/// matching blobs, and the requests it left unanswered.
#[derive(Debug)]
pub struct TrieNodeReply {
    pub answered: Vec<NodeRequest>,
    pub nodes: Vec<Bytes>,
    pub left_over: Vec<NodeRequest>,
}

/// Requests the given nodes from a peer, validating the reply.
///
/// The batch is capped at `max_trie_node_fetch`; overflow goes straight to
/// `left_over`, as do the requests an honest-but-short reply leaves
/// unanswered (peers answer a prefix of the request, in order). Every
/// returned blob must hash to the key its request expects.
pub async fn fetch_trie_nodes(
    peer: &dyn SnapPeer,
    state_root: H256,
    mut requests: Vec<NodeRequest>,
    config: &HealerConfig,
) -> Result<TrieNodeReply, FetchError> {
    let excess = if requests.len() > config.max_trie_node_fetch {
        requests.split_off(config.max_trie_node_fetch)
    } else {
        Vec::new()
    };
    let request_id: u64 = rand::random();
    let message = GetTrieNodes {
        id: request_id,
        root_hash: state_root,
        paths: requests
            .iter()
            .map(|request| vec![Bytes::from(request.path.encode_compact())])
            .collect(),
        bytes: MAX_RESPONSE_BYTES,
    };

    let reply = match tokio::time::timeout(config.reply_timeout, peer.get_trie_nodes(message)).await
    {
        Err(_elapsed) => return Err(FetchError::Timeout),
        Ok(Err(PeerError::Closed)) => return Err(FetchError::PeerClosed),
        Ok(Err(PeerError::Protocol(reason))) => return Err(FetchError::ProtocolViolation(reason)),
        Ok(Ok(reply)) => reply,
    };

    if reply.id != request_id {
        return Err(FetchError::ProtocolViolation(format!(
            "reply id {} for request {request_id}",
            reply.id
        )));
    }
    if reply.nodes.is_empty() {
        return Err(FetchError::Empty);
    }
    if reply.nodes.len() > requests.len() {
        return Err(FetchError::ProtocolViolation(format!(
            "{} nodes for {} requested paths",
            reply.nodes.len(),
            requests.len()
        )));
    }
    for (request, blob) in requests.iter().zip(&reply.nodes) {
        if keccak(blob) != request.hash {
            return Err(FetchError::WrongHash);
        }
    }

    let mut left_over = requests.split_off(reply.nodes.len());
    left_over.extend(excess);
    debug!(
        peer = %peer.id(),
        answered = requests.len(),
        left_over = left_over.len(),
        "fetched trie nodes"
    );
    Ok(TrieNodeReply {
        answered: requests,
        nodes: reply.nodes,
        left_over,
    })
}
