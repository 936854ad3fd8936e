use std::time::{SystemTime, UNIX_EPOCH};

use ethereum_types::H256;
use stray_crypto::keccak::keccak_hash;

pub fn keccak(data: impl AsRef<[u8]>) -> H256 {
    H256(keccak_hash(data))
}

pub fn current_unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::{EMPTY_KECCACK_HASH, EMPTY_TRIE_HASH};

    #[test]
    fn keccak_constants_match() {
        assert_eq!(keccak([]), EMPTY_KECCACK_HASH);
        assert_eq!(keccak([0x80]), EMPTY_TRIE_HASH);
    }
}
