use std::time::Duration;

/// Cap on trie nodes requested from a peer in one `GetTrieNodes` call.
pub const MAX_TRIE_NODE_FETCH: usize = 1024;

/// Soft response-size cap advertised in snap requests.
pub const MAX_RESPONSE_BYTES: u64 = 512 * 1024;

/// Coverage fraction of the account key space required before healing starts.
pub const HEAL_ACCOUNTS_TRIGGER: f64 = 0.95;

/// Upper bound on nodes visited per trie inspection call.
pub const INSPECT_FRONTIER_LIMIT: usize = 10_000;

/// Per-request reply deadline.
pub const PEER_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Weighted peer errors tolerated before a buddy is zombified.
pub const PEER_ERROR_THRESHOLD: u8 = 3;

/// Cadence of the stats ticker.
pub const TICKER_INTERVAL: Duration = Duration::from_secs(1);

/// Identical ticker readouts suppressed before the line is repeated anyway.
pub const TICKER_SUPPRESS_MAX: u32 = 100;

/// Most buddies a coordinator will run at once.
pub const MAX_BUDDIES: usize = 10;

/// Backoff for a buddy whose tick had nothing to do.
pub const POSTPONE_BACKOFF: Duration = Duration::from_millis(100);
