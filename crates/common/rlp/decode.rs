use bytes::Bytes;
use ethereum_types::{H256, U256};

use super::{constants::RLP_NULL, error::RLPDecodeError};

/// Trait for decoding RLP encoded slices of data.
/// Implementors provide [`decode_unfinished`](RLPDecode::decode_unfinished),
/// which returns the decoded value along with the bytes remaining after it;
/// consumers usually call [`decode`](RLPDecode::decode), which requires the
/// whole input to be consumed.
pub trait RLPDecode: Sized {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError>;

    fn decode(rlp: &[u8]) -> Result<Self, RLPDecodeError> {
        let (decoded, remaining) = Self::decode_unfinished(rlp)?;
        if !remaining.is_empty() {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok(decoded)
    }
}

/// Splits the next RLP item off `buf`.
/// Returns `(is_list, payload, rest)` where `payload` excludes the prefix.
pub fn decode_rlp_item(buf: &[u8]) -> Result<(bool, &[u8], &[u8]), RLPDecodeError> {
    let first = *buf.first().ok_or(RLPDecodeError::InvalidLength)?;
    match first {
        // Single byte, its own encoding
        0x00..=0x7f => Ok((false, &buf[..1], &buf[1..])),
        // Short string
        0x80..=0xb7 => {
            let len = (first - 0x80) as usize;
            let payload = buf.get(1..1 + len).ok_or(RLPDecodeError::InvalidLength)?;
            Ok((false, payload, &buf[1 + len..]))
        }
        // Long string
        0xb8..=0xbf => {
            let len_len = (first - 0xb7) as usize;
            let len = decode_length_field(buf.get(1..1 + len_len).ok_or(RLPDecodeError::InvalidLength)?)?;
            let payload = buf
                .get(1 + len_len..1 + len_len + len)
                .ok_or(RLPDecodeError::InvalidLength)?;
            Ok((false, payload, &buf[1 + len_len + len..]))
        }
        // Short list
        0xc0..=0xf7 => {
            let len = (first - 0xc0) as usize;
            let payload = buf.get(1..1 + len).ok_or(RLPDecodeError::InvalidLength)?;
            Ok((true, payload, &buf[1 + len..]))
        }
        // Long list
        0xf8..=0xff => {
            let len_len = (first - 0xf7) as usize;
            let len = decode_length_field(buf.get(1..1 + len_len).ok_or(RLPDecodeError::InvalidLength)?)?;
            let payload = buf
                .get(1 + len_len..1 + len_len + len)
                .ok_or(RLPDecodeError::InvalidLength)?;
            Ok((true, payload, &buf[1 + len_len + len..]))
        }
    }
}

fn decode_length_field(bytes: &[u8]) -> Result<usize, RLPDecodeError> {
    if bytes.is_empty() || bytes.len() > core::mem::size_of::<usize>() || bytes[0] == 0 {
        return Err(RLPDecodeError::MalformedData);
    }
    let mut len = 0usize;
    for byte in bytes {
        len = (len << 8) | *byte as usize;
    }
    Ok(len)
}

/// Decodes the next item as a byte string, returning its payload and the rest.
pub fn decode_bytes(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let (is_list, payload, rest) = decode_rlp_item(data)?;
    if is_list {
        return Err(RLPDecodeError::UnexpectedList);
    }
    Ok((payload, rest))
}

/// Returns the next item including its prefix, along with the rest.
pub fn get_item_with_prefix(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let (_, _, rest) = decode_rlp_item(data)?;
    let item_len = data.len() - rest.len();
    Ok((&data[..item_len], rest))
}

fn static_left_pad<const N: usize>(bytes: &[u8]) -> Result<[u8; N], RLPDecodeError> {
    if bytes.len() > N {
        return Err(RLPDecodeError::InvalidLength);
    }
    // Integers must not carry leading zeros
    if !bytes.is_empty() && bytes[0] == 0 {
        return Err(RLPDecodeError::MalformedData);
    }
    let mut padded = [0u8; N];
    padded[N - bytes.len()..].copy_from_slice(bytes);
    Ok(padded)
}

impl RLPDecode for bool {
    #[inline(always)]
    fn decode_unfinished(buf: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let first = *buf.first().ok_or(RLPDecodeError::InvalidLength)?;
        let value = match first {
            RLP_NULL => false,
            0x01 => true,
            b => return Err(RLPDecodeError::MalformedBoolean(b)),
        };
        Ok((value, &buf[1..]))
    }
}

impl RLPDecode for u8 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        let padded = static_left_pad::<1>(bytes)?;
        Ok((padded[0], rest))
    }
}

impl RLPDecode for u16 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((u16::from_be_bytes(static_left_pad(bytes)?), rest))
    }
}

impl RLPDecode for u32 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((u32::from_be_bytes(static_left_pad(bytes)?), rest))
    }
}

impl RLPDecode for u64 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((u64::from_be_bytes(static_left_pad(bytes)?), rest))
    }
}

impl RLPDecode for usize {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((usize::from_be_bytes(static_left_pad(bytes)?), rest))
    }
}

impl RLPDecode for U256 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        if bytes.len() > 32 || (!bytes.is_empty() && bytes[0] == 0) {
            return Err(RLPDecodeError::MalformedData);
        }
        Ok((U256::from_big_endian(bytes), rest))
    }
}

impl RLPDecode for H256 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        if bytes.len() != 32 {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok((H256::from_slice(bytes), rest))
    }
}

impl RLPDecode for Bytes {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        Ok((Bytes::copy_from_slice(bytes), rest))
    }
}

impl<T: RLPDecode> RLPDecode for Vec<T> {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (is_list, mut payload, rest) = decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        let mut items = Vec::new();
        while !payload.is_empty() {
            let (item, remaining) = T::decode_unfinished(payload)?;
            items.push(item);
            payload = remaining;
        }
        Ok((items, rest))
    }
}
