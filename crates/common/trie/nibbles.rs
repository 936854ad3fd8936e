use serde::{Deserialize, Serialize};

/// Struct representing a list of nibbles (half-bytes), with an optional
/// terminator marking the path as belonging to a leaf node.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Nibbles {
    /// One nibble per element, each in the 0..=15 range
    data: Vec<u8>,
    /// Whether this path terminates at a leaf (replaces the magic value 16)
    is_leaf: bool,
}

impl Nibbles {
    /// Create `Nibbles` from hex-encoded nibbles.
    /// If the last nibble is 16, it's treated as the leaf flag.
    pub fn from_hex(hex: Vec<u8>) -> Self {
        let is_leaf = hex.last().is_some_and(|nibble| *nibble == 16);
        let mut data = hex;
        if is_leaf {
            data.pop();
        }
        Self { data, is_leaf }
    }

    /// Create `Nibbles` from raw bytes. Each byte becomes two nibbles.
    pub fn from_raw(bytes: &[u8], is_leaf: bool) -> Self {
        let mut data = Vec::with_capacity(bytes.len() * 2);
        for byte in bytes {
            data.push(byte >> 4);
            data.push(byte & 0x0F);
        }
        Self { data, is_leaf }
    }

    /// Splits incoming bytes into nibbles and marks the path as a leaf path.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_raw(bytes, true)
    }

    /// Convert to an unpacked nibble vector, with a trailing 16 for leaf paths.
    pub fn into_vec(self) -> Vec<u8> {
        let mut nibbles = self.data;
        if self.is_leaf {
            nibbles.push(16);
        }
        nibbles
    }

    /// Number of nibbles in the path, terminator excluded.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && !self.is_leaf
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    /// The nibble at the given index; panics if out of range.
    #[inline]
    pub fn at(&self, i: usize) -> u8 {
        self.data[i]
    }

    /// Unpacked view of the nibbles, terminator excluded.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The first `end` nibbles as a new non-leaf path.
    pub fn slice_to(&self, end: usize) -> Nibbles {
        Nibbles {
            data: self.data[..end].to_vec(),
            is_leaf: false,
        }
    }

    /// Appends a nibble at the end.
    pub fn append(&mut self, nibble: u8) {
        self.data.push(nibble & 0x0F);
    }

    /// Returns a copy of self with the nibble added at the end.
    pub fn append_new(&self, nibble: u8) -> Nibbles {
        let mut result = self.clone();
        result.append(nibble);
        result
    }

    /// Extends the nibbles with another list of nibbles, inheriting its leaf flag.
    pub fn extend(&mut self, other: &Nibbles) {
        self.data.extend_from_slice(&other.data);
        if other.is_leaf {
            self.is_leaf = true;
        }
    }

    /// Concatenates self and another `Nibbles`, returning a new `Nibbles`.
    pub fn concat(&self, other: &Nibbles) -> Nibbles {
        let mut result = self.clone();
        result.extend(other);
        result
    }

    /// Amount of shared nibbles from the start.
    pub fn count_prefix(&self, other: &Nibbles) -> usize {
        self.data
            .iter()
            .zip(other.data.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Encodes the nibbles in compact form (Ethereum hex-prefix encoding).
    ///
    /// node type    path length    |    prefix    hexchar
    /// --------------------------------------------------
    /// extension    even           |    0000      0x0
    /// extension    odd            |    0001      0x1
    /// leaf         even           |    0010      0x2
    /// leaf         odd            |    0011      0x3
    pub fn encode_compact(&self) -> Vec<u8> {
        let flag = if self.is_leaf { 0x20 } else { 0x00 };
        let mut compact = Vec::with_capacity(self.data.len() / 2 + 1);
        let rest = if self.data.len() % 2 == 1 {
            compact.push(flag | 0x10 | self.data[0]);
            &self.data[1..]
        } else {
            compact.push(flag);
            &self.data[..]
        };
        for pair in rest.chunks_exact(2) {
            compact.push(pair[0] << 4 | pair[1]);
        }
        compact
    }

    /// Decodes a compact-form (hex-prefix encoded) path.
    pub fn decode_compact(compact: &[u8]) -> Self {
        let Some(first) = compact.first() else {
            return Self::default();
        };
        let is_leaf = first & 0x20 != 0;
        let is_odd = first & 0x10 != 0;
        let mut data = Vec::with_capacity(compact.len() * 2);
        if is_odd {
            data.push(first & 0x0F);
        }
        for byte in &compact[1..] {
            data.push(byte >> 4);
            data.push(byte & 0x0F);
        }
        Self { data, is_leaf }
    }

    /// Combines the nibbles into bytes, terminator excluded.
    /// An odd trailing nibble occupies the high half of the last byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = self
            .data
            .chunks_exact(2)
            .map(|pair| pair[0] << 4 | pair[1])
            .collect();
        if self.data.len() % 2 == 1 {
            bytes.push(self.data[self.data.len() - 1] << 4);
        }
        bytes
    }
}
