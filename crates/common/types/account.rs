use bytes::BufMut;
use ethereum_types::{H256, U256};
use stray_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::constants::{EMPTY_KECCACK_HASH, EMPTY_TRIE_HASH};

/// The state of an account as stored in the account trie: the value of an
/// account leaf is the RLP encoding of this struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: H256,
    pub code_hash: H256,
}

impl Default for AccountState {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::zero(),
            storage_root: EMPTY_TRIE_HASH,
            code_hash: EMPTY_KECCACK_HASH,
        }
    }
}

impl AccountState {
    pub fn has_storage(&self) -> bool {
        self.storage_root != EMPTY_TRIE_HASH
    }
}

impl RLPEncode for AccountState {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.nonce)
            .encode_field(&self.balance)
            .encode_field(&self.storage_root)
            .encode_field(&self.code_hash)
            .finish();
    }
}

impl RLPDecode for AccountState {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (balance, decoder) = decoder.decode_field("balance")?;
        let (storage_root, decoder) = decoder.decode_field("storage_root")?;
        let (code_hash, decoder) = decoder.decode_field("code_hash")?;
        Ok((
            Self {
                nonce,
                balance,
                storage_root,
                code_hash,
            },
            decoder.finish()?,
        ))
    }
}
