use bytes::{BufMut, Bytes};
use ethereum_types::H256;
use stray_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::utils::keccak;

/// The subset of a block header the sync engine reads: enough to identify a
/// pivot and the state root it heals toward.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockHeader {
    pub parent_hash: H256,
    pub number: u64,
    pub state_root: H256,
    pub timestamp: u64,
}

impl BlockHeader {
    pub fn hash(&self) -> H256 {
        keccak(self.encode_to_vec())
    }
}

impl RLPEncode for BlockHeader {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.parent_hash)
            .encode_field(&self.number)
            .encode_field(&self.state_root)
            .encode_field(&self.timestamp)
            .finish();
    }
}

impl RLPDecode for BlockHeader {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (parent_hash, decoder) = decoder.decode_field("parent_hash")?;
        let (number, decoder) = decoder.decode_field("number")?;
        let (state_root, decoder) = decoder.decode_field("state_root")?;
        let (timestamp, decoder) = decoder.decode_field("timestamp")?;
        Ok((
            Self {
                parent_hash,
                number,
                state_root,
                timestamp,
            },
            decoder.finish()?,
        ))
    }
}

/// Block body as far as this engine is concerned: opaque transaction payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockBody {
    pub transactions: Vec<Bytes>,
}

impl RLPEncode for BlockBody {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.transactions)
            .finish();
    }
}

impl RLPDecode for BlockBody {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (transactions, decoder) = decoder.decode_field("transactions")?;
        Ok((Self { transactions }, decoder.finish()?))
    }
}
