use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use ethereum_types::H256;

use crate::{error::TrieError, node_hash::NodeHash};

/// Flat content-addressed node store. Keys are node hashes, values raw node
/// RLP, so entries are write-once: rewriting a key stores the same bytes.
pub trait TrieDB: Send + Sync {
    fn get(&self, key: NodeHash) -> Result<Option<Vec<u8>>, TrieError>;
    fn put(&self, key: NodeHash, value: Vec<u8>) -> Result<(), TrieError>;

    fn put_batch(&self, key_values: Vec<(NodeHash, Vec<u8>)>) -> Result<(), TrieError> {
        for (key, value) in key_values {
            self.put(key, value)?;
        }
        Ok(())
    }

    fn contains(&self, key: NodeHash) -> Result<bool, TrieError> {
        Ok(self.get(key)?.is_some())
    }
}

/// In-memory implementation of the [`TrieDB`] trait.
pub struct InMemoryTrieDB {
    inner: Arc<Mutex<HashMap<H256, Vec<u8>>>>,
}

impl InMemoryTrieDB {
    pub fn new(map: Arc<Mutex<HashMap<H256, Vec<u8>>>>) -> Self {
        Self { inner: map }
    }

    pub fn new_empty() -> Self {
        Self {
            inner: Default::default(),
        }
    }
}

impl TrieDB for InMemoryTrieDB {
    fn get(&self, key: NodeHash) -> Result<Option<Vec<u8>>, TrieError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| TrieError::LockError)?
            .get(&key.finalize())
            .cloned())
    }

    fn put(&self, key: NodeHash, value: Vec<u8>) -> Result<(), TrieError> {
        self.inner
            .lock()
            .map_err(|_| TrieError::LockError)?
            .insert(key.finalize(), value);
        Ok(())
    }

    fn put_batch(&self, key_values: Vec<(NodeHash, Vec<u8>)>) -> Result<(), TrieError> {
        let mut db = self.inner.lock().map_err(|_| TrieError::LockError)?;
        for (key, value) in key_values {
            db.insert(key.finalize(), value);
        }
        Ok(())
    }
}
