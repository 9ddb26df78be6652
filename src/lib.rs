pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod gas;
pub mod logger;
pub mod retryable;
pub mod storage;
pub mod ticket;
pub mod types;

use sha2::{Digest, Sha256};

/// Get current Unix timestamp
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Calculate SHA256 digest
pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
