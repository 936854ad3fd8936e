use stray_common::types::{BlockBody, BlockHeader};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain database failure: {0}")]
    Db(String),
    #[error("no canonical head available")]
    NoCanonicalHead,
}

/// Chain database collaborator. Block import and canonical-chain bookkeeping
/// live outside the sync engine; this is the slice of them it consumes.
pub trait ChainStore: Send + Sync {
    fn get_canonical_head(&self) -> Result<BlockHeader, ChainError>;
    fn persist_blocks(
        &self,
        headers: Vec<BlockHeader>,
        bodies: Vec<BlockBody>,
    ) -> Result<(), ChainError>;
}
