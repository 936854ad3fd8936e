use bytes::BufMut;
use stray_rlp::{
    constants::RLP_NULL,
    decode::decode_bytes,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::{nibbles::Nibbles, node_hash::NodeHash};

/// Discriminates the three node shapes, e.g. for import reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Branch,
    Extension,
    Leaf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchNode {
    pub choices: [NodeHash; 16],
    pub value: Vec<u8>,
}

impl BranchNode {
    /// 17-bit presence mask: bit `i` for child `i`, bit 16 for the value slot.
    /// Any committed branch node has at least two bits set.
    pub fn mask(&self) -> u32 {
        let mut mask = 0u32;
        for (i, choice) in self.choices.iter().enumerate() {
            if choice.is_valid() {
                mask |= 1 << i;
            }
        }
        if !self.value.is_empty() {
            mask |= 1 << 16;
        }
        mask
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionNode {
    pub prefix: Nibbles,
    pub child: NodeHash,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeafNode {
    pub partial: Nibbles,
    pub value: Vec<u8>,
}

/// A node in an Ethereum-compatible Merkle Patricia Trie.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Branch(Box<BranchNode>),
    Extension(ExtensionNode),
    Leaf(LeafNode),
}

impl From<BranchNode> for Node {
    fn from(value: BranchNode) -> Self {
        Node::Branch(Box::new(value))
    }
}

impl From<ExtensionNode> for Node {
    fn from(value: ExtensionNode) -> Self {
        Node::Extension(value)
    }
}

impl From<LeafNode> for Node {
    fn from(value: LeafNode) -> Self {
        Node::Leaf(value)
    }
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Branch(_) => NodeKind::Branch,
            Node::Extension(_) => NodeKind::Extension,
            Node::Leaf(_) => NodeKind::Leaf,
        }
    }

    /// Decodes a raw RLP-encoded node.
    pub fn decode_raw(rlp: &[u8]) -> Result<Self, RLPDecodeError> {
        let mut items = Vec::new();
        let mut decoder = Decoder::new(rlp)?;
        loop {
            let (item, rest) = decoder.get_encoded_item()?;
            items.push(item);
            decoder = rest;
            // Stop at the end, or once we hold more items than any node has
            if decoder.is_done() || items.len() > 17 {
                break;
            }
        }
        match items.len() {
            // Leaf or Extension
            2 => {
                let (compact, _) = decode_bytes(&items[0])?;
                let path = Nibbles::decode_compact(compact);
                if path.is_leaf() {
                    let (value, _) = decode_bytes(&items[1])?;
                    Ok(LeafNode {
                        partial: path,
                        value: value.to_vec(),
                    }
                    .into())
                } else {
                    Ok(ExtensionNode {
                        prefix: path,
                        child: decode_child(&items[1]),
                    }
                    .into())
                }
            }
            // Branch
            17 => {
                let mut choices = [NodeHash::default(); 16];
                for (choice, item) in choices.iter_mut().zip(&items[..16]) {
                    *choice = decode_child(item);
                }
                let (value, _) = decode_bytes(&items[16])?;
                let node = BranchNode {
                    choices,
                    value: value.to_vec(),
                };
                let mask = node.mask();
                if mask.count_ones() < 2 {
                    return Err(RLPDecodeError::Custom(format!(
                        "invalid branch node mask {mask:#x}"
                    )));
                }
                Ok(node.into())
            }
            n => Err(RLPDecodeError::Custom(format!(
                "invalid field count for node, expected 2 or 17, got {n}"
            ))),
        }
    }

    /// Encodes the node.
    pub fn encode_raw(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Node::Branch(node) => {
                let mut encoder = Encoder::new(&mut buf);
                for choice in &node.choices {
                    encoder = encode_child(encoder, choice);
                }
                encoder.encode_field(node.value.as_slice()).finish();
            }
            Node::Extension(node) => {
                let encoder = Encoder::new(&mut buf)
                    .encode_field(node.prefix.encode_compact().as_slice());
                encode_child(encoder, &node.child).finish();
            }
            Node::Leaf(node) => {
                Encoder::new(&mut buf)
                    .encode_field(node.partial.encode_compact().as_slice())
                    .encode_field(node.value.as_slice())
                    .finish();
            }
        }
        buf
    }

    /// Computes the node's hash (or inline reference, under 32 encoded bytes).
    pub fn compute_hash(&self) -> NodeHash {
        NodeHash::from_encoded_raw(&self.encode_raw())
    }
}

fn decode_child(rlp: &[u8]) -> NodeHash {
    match decode_bytes(rlp) {
        Ok((hash, rest)) if rest.is_empty() && hash.len() == 32 => {
            NodeHash::from(ethereum_types::H256::from_slice(hash))
        }
        Ok((&[], rest)) if rest.is_empty() => NodeHash::default(),
        // An embedded node: the reference is the raw encoding itself
        _ => NodeHash::from_encoded_raw(rlp),
    }
}

fn encode_child<'a>(encoder: Encoder<'a>, child: &NodeHash) -> Encoder<'a> {
    match child {
        NodeHash::Inline((data, len)) => encoder.encode_raw(&data[..*len as usize]),
        NodeHash::Hashed(hash) if child.is_valid() => encoder.encode_field(hash),
        // Empty slot
        NodeHash::Hashed(_) => encoder.encode_raw(&[RLP_NULL]),
    }
}

impl RLPEncode for Node {
    fn encode(&self, buf: &mut dyn BufMut) {
        buf.put_slice(&self.encode_raw());
    }
}
