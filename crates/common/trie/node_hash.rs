use ethereum_types::H256;
use stray_crypto::keccak::keccak_hash;

/// Reference to a trie node: the keccak of its RLP encoding, or the encoding
/// itself inlined for nodes that encode to fewer than 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeHash {
    Hashed(H256),
    Inline(([u8; 31], u8)),
}

impl NodeHash {
    /// Computes the reference for a raw RLP-encoded node.
    pub fn from_encoded_raw(encoded: &[u8]) -> NodeHash {
        if encoded.len() >= 32 {
            NodeHash::Hashed(H256(keccak_hash(encoded)))
        } else {
            let mut data = [0u8; 31];
            data[..encoded.len()].copy_from_slice(encoded);
            NodeHash::Inline((data, encoded.len() as u8))
        }
    }

    /// Converts the reference into a storable 32-byte key, hashing inlined nodes.
    pub fn finalize(&self) -> H256 {
        match self {
            NodeHash::Hashed(hash) => *hash,
            NodeHash::Inline((data, len)) => H256(keccak_hash(&data[..*len as usize])),
        }
    }

    /// The raw RLP of an inlined node, if this reference is inline.
    pub fn inline_encoding(&self) -> Option<&[u8]> {
        match self {
            NodeHash::Hashed(_) => None,
            NodeHash::Inline((data, len)) => Some(&data[..*len as usize]),
        }
    }

    /// An unset reference (empty branch slot) is not valid.
    pub fn is_valid(&self) -> bool {
        *self != NodeHash::default()
    }
}

impl Default for NodeHash {
    fn default() -> Self {
        NodeHash::Hashed(H256::zero())
    }
}

impl From<H256> for NodeHash {
    fn from(value: H256) -> Self {
        NodeHash::Hashed(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn long_encodings_are_hashed() {
        let encoded = [0xaau8; 32];
        match NodeHash::from_encoded_raw(&encoded) {
            NodeHash::Hashed(hash) => assert_eq!(hash.0, keccak_hash(encoded)),
            NodeHash::Inline(_) => panic!("expected hashed reference"),
        }
    }

    #[test]
    fn short_encodings_are_inlined() {
        let encoded = [0xc2u8, 0x01, 0x02];
        let hash = NodeHash::from_encoded_raw(&encoded);
        assert_eq!(hash.inline_encoding(), Some(encoded.as_slice()));
        assert_eq!(hash.finalize().0, keccak_hash(encoded));
    }

    #[test]
    fn default_is_invalid() {
        assert!(!NodeHash::default().is_valid());
        assert!(NodeHash::from(H256::repeat_byte(1)).is_valid());
    }
}
