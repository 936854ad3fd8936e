use bytes::{BufMut, Bytes};
use ethereum_types::{H256, U256};

use super::constants::RLP_NULL;

pub trait RLPEncode {
    fn encode(&self, buf: &mut dyn BufMut);

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// Writes the RLP prefix for a list payload of `payload_len` bytes.
pub fn encode_length(payload_len: usize, buf: &mut dyn BufMut) {
    if payload_len < 56 {
        buf.put_u8(0xc0 + payload_len as u8);
    } else {
        let len_be = payload_len.to_be_bytes();
        let len_be = trim_leading_zeros(&len_be);
        buf.put_u8(0xf7 + len_be.len() as u8);
        buf.put_slice(len_be);
    }
}

/// Encodes a byte string with the appropriate RLP prefix.
pub fn encode_bytes(bytes: &[u8], buf: &mut dyn BufMut) {
    // A single byte in the [0x00, 0x7f] range is its own encoding
    if bytes.len() == 1 && bytes[0] < RLP_NULL {
        buf.put_u8(bytes[0]);
    } else if bytes.len() < 56 {
        buf.put_u8(RLP_NULL + bytes.len() as u8);
        buf.put_slice(bytes);
    } else {
        let len_be = bytes.len().to_be_bytes();
        let len_be = trim_leading_zeros(&len_be);
        buf.put_u8(0xb7 + len_be.len() as u8);
        buf.put_slice(len_be);
        buf.put_slice(bytes);
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first_nonzero = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first_nonzero..]
}

fn encode_integer_be(value_be: &[u8], buf: &mut dyn BufMut) {
    encode_bytes(trim_leading_zeros(value_be), buf);
}

impl RLPEncode for bool {
    #[inline(always)]
    fn encode(&self, buf: &mut dyn BufMut) {
        if *self {
            buf.put_u8(0x01);
        } else {
            buf.put_u8(RLP_NULL);
        }
    }
}

impl RLPEncode for u8 {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_integer_be(&self.to_be_bytes(), buf);
    }
}

impl RLPEncode for u16 {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_integer_be(&self.to_be_bytes(), buf);
    }
}

impl RLPEncode for u32 {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_integer_be(&self.to_be_bytes(), buf);
    }
}

impl RLPEncode for u64 {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_integer_be(&self.to_be_bytes(), buf);
    }
}

impl RLPEncode for usize {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_integer_be(&self.to_be_bytes(), buf);
    }
}

impl RLPEncode for U256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_integer_be(&self.to_big_endian(), buf);
    }
}

impl RLPEncode for H256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_bytes(self.as_bytes(), buf);
    }
}

impl RLPEncode for [u8] {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_bytes(self, buf);
    }
}

impl<const N: usize> RLPEncode for [u8; N] {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_bytes(self, buf);
    }
}

impl RLPEncode for Bytes {
    fn encode(&self, buf: &mut dyn BufMut) {
        encode_bytes(self.as_ref(), buf);
    }
}

impl<T: RLPEncode> RLPEncode for Vec<T> {
    fn encode(&self, buf: &mut dyn BufMut) {
        let mut payload = Vec::new();
        for item in self {
            item.encode(&mut payload);
        }
        encode_length(payload.len(), buf);
        buf.put_slice(&payload);
    }
}
