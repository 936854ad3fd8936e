pub mod constants;
pub mod types;
pub mod utils;

pub use ethereum_types::{H256, U256};
