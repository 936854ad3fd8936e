use std::collections::{HashSet, VecDeque};

use ethereum_types::H256;

use crate::{db::TrieDB, error::TrieError, nibbles::Nibbles, node::Node, node_hash::NodeHash};

/// A trie node scheduled for retrieval: its position path and the key its
/// parent links it under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRequest {
    pub path: Nibbles,
    pub hash: H256,
}

impl NodeRequest {
    /// The request that seeds healing of a whole trie.
    pub fn root(state_root: H256) -> Self {
        Self {
            path: Nibbles::default(),
            hash: state_root,
        }
    }
}

/// Outcome of [`inspect_trie`]: child references absent from the local store,
/// and the paths of nodes that already terminate at a leaf.
#[derive(Debug, Default, PartialEq)]
pub struct TrieInspection {
    pub dangling: Vec<NodeRequest>,
    pub leaves: Vec<Nibbles>,
}

enum Walk {
    /// Node present at the requested position.
    Found(NodeHash, Node),
    /// First absent link encountered along the way (possibly the target itself).
    Absent(NodeRequest),
    /// The position does not exist under this root.
    Diverged,
}

fn walk_to(db: &dyn TrieDB, root: H256, path: &Nibbles) -> Result<Walk, TrieError> {
    let mut cursor = NodeHash::from(root);
    let mut offset = 0usize;
    loop {
        let raw = match cursor.inline_encoding() {
            Some(inline) => inline.to_vec(),
            None => match db.get(cursor)? {
                Some(raw) => raw,
                None => {
                    return Ok(Walk::Absent(NodeRequest {
                        path: path.slice_to(offset),
                        hash: cursor.finalize(),
                    }));
                }
            },
        };
        // The empty-trie marker has no children and no position below it
        if raw.as_slice() == [stray_rlp::constants::RLP_NULL].as_slice() {
            return Ok(Walk::Diverged);
        }
        let node = Node::decode_raw(&raw)?;
        if offset == path.len() {
            return Ok(Walk::Found(cursor, node));
        }
        match node {
            Node::Branch(branch) => {
                let choice = branch.choices[path.at(offset) as usize];
                if !choice.is_valid() {
                    return Ok(Walk::Diverged);
                }
                cursor = choice;
                offset += 1;
            }
            Node::Extension(ext) => {
                let prefix = ext.prefix.as_slice();
                let remaining = &path.as_slice()[offset..];
                if remaining.len() < prefix.len() || &remaining[..prefix.len()] != prefix {
                    return Ok(Walk::Diverged);
                }
                cursor = ext.child;
                offset += prefix.len();
            }
            Node::Leaf(_) => return Ok(Walk::Diverged),
        }
    }
}

/// Walks from `root` towards `path`, returning the key of the node stored at
/// that position if every node along the way exists locally.
pub fn lookup_path(db: &dyn TrieDB, root: H256, path: &Nibbles) -> Result<Option<H256>, TrieError> {
    match walk_to(db, root, path)? {
        Walk::Found(hash, _) => Ok(Some(hash.finalize())),
        _ => Ok(None),
    }
}

/// Like [`lookup_path`] but returns the decoded node.
pub fn lookup_node(db: &dyn TrieDB, root: H256, path: &Nibbles) -> Result<Option<Node>, TrieError> {
    match walk_to(db, root, path)? {
        Walk::Found(_, node) => Ok(Some(node)),
        _ => Ok(None),
    }
}

/// Breadth-first sweep over the locally stored subtrees rooted at `seeds`.
///
/// Children of a branch are visited in nibble order 0..15; the value slot
/// holds data, not a reference, so there is nothing to test for it. An
/// extension contributes exactly one child path. Seeds whose position no
/// longer exists under `root` are dropped as stale hints; a seed whose path
/// runs into an absent link reports that link as dangling.
///
/// At most `frontier_limit` nodes are loaded per call so a single inspection
/// cannot monopolize its caller. Paths left unvisited when the budget runs out
/// are reported as dangling: present ones come straight back to the check
/// list through the missing-list reclassification of the next pass.
pub fn inspect_trie(
    db: &dyn TrieDB,
    root: H256,
    seeds: &[Nibbles],
    frontier_limit: usize,
) -> Result<TrieInspection, TrieError> {
    let mut inspection = TrieInspection::default();
    let mut frontier: VecDeque<(Nibbles, NodeHash)> = VecDeque::new();
    let mut seen: HashSet<&Nibbles> = HashSet::new();
    for seed in seeds {
        if !seen.insert(seed) {
            continue;
        }
        match walk_to(db, root, seed)? {
            Walk::Found(hash, _) => frontier.push_back((seed.clone(), hash)),
            Walk::Absent(request) => inspection.dangling.push(request),
            Walk::Diverged => {}
        }
    }

    let mut visited = 0usize;
    while let Some((path, cursor)) = frontier.pop_front() {
        if visited >= frontier_limit {
            inspection.dangling.push(NodeRequest {
                path,
                hash: cursor.finalize(),
            });
            continue;
        }
        visited += 1;
        let raw = match cursor.inline_encoding() {
            Some(inline) => inline.to_vec(),
            None => match db.get(cursor)? {
                Some(raw) => raw,
                None => {
                    // Present when enqueued; the store only grows, so this
                    // spells a racing backend. Requeue rather than lose it.
                    inspection.dangling.push(NodeRequest {
                        path,
                        hash: cursor.finalize(),
                    });
                    continue;
                }
            },
        };
        match Node::decode_raw(&raw)? {
            Node::Leaf(_) => inspection.leaves.push(path),
            Node::Extension(ext) => {
                let child_path = path.concat(&ext.prefix);
                enqueue_child(db, ext.child, child_path, &mut frontier, &mut inspection)?;
            }
            Node::Branch(branch) => {
                // Decoding already rejects underfilled branches; reaching one
                // here means the backing store handed back corrupt state.
                assert!(
                    branch.mask().count_ones() >= 2,
                    "corrupt branch node at {path:?}"
                );
                for (nibble, choice) in branch.choices.iter().enumerate() {
                    if choice.is_valid() {
                        enqueue_child(
                            db,
                            *choice,
                            path.append_new(nibble as u8),
                            &mut frontier,
                            &mut inspection,
                        )?;
                    }
                }
            }
        }
    }
    Ok(inspection)
}

fn enqueue_child(
    db: &dyn TrieDB,
    child: NodeHash,
    child_path: Nibbles,
    frontier: &mut VecDeque<(Nibbles, NodeHash)>,
    inspection: &mut TrieInspection,
) -> Result<(), TrieError> {
    match child {
        // Embedded nodes travel inside their parent, they are always present
        NodeHash::Inline(_) => frontier.push_back((child_path, child)),
        NodeHash::Hashed(hash) => {
            if db.contains(child)? {
                frontier.push_back((child_path, child));
            } else {
                inspection.dangling.push(NodeRequest {
                    path: child_path,
                    hash,
                });
            }
        }
    }
    Ok(())
}
