mod messages;

pub use messages::{GetTrieNodes, TrieNodes};
