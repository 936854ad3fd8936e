mod account;
mod block;

pub use account::AccountState;
pub use block::{BlockBody, BlockHeader};
