//! Error taxonomy for the sync client.
//!
//! Three classes of failure cross this layer:
//! - transient network/decode failures: logged, the poll continues next tick;
//! - backend-reported application errors (non-2xx with a structured detail):
//!   surfaced to the caller, local state not mutated;
//! - safe-key collisions: a programming/configuration error guarded at the
//!   registry boundary rather than assumed away.
//!
//! A missing view target is deliberately NOT an error: views mount
//! asynchronously relative to data fetches, so a render into an unmounted
//! view is a silent no-op. No error here is fatal to the poll loop.

use thiserror::Error;

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors produced by the polling/reconciliation layer
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network-level failure (connect, timeout, TLS). Transient.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned a non-2xx status with a structured error body.
    #[error("backend error (status {status}): {detail}")]
    Backend { status: u16, detail: String },

    /// Response body did not match the expected shape. Transient; the
    /// backend may be mid-restart or mid-upgrade.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Two distinct symbols normalized to the same safe key.
    #[error("safe-key collision: {a:?} and {b:?} both map to {key:?}")]
    KeyCollision { a: String, b: String, key: String },
}

impl SyncError {
    /// True for failures where skipping one render pass and retrying on the
    /// next tick is the correct response.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Http(_) | SyncError::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_are_not_transient() {
        let err = SyncError::Backend {
            status: 503,
            detail: "Bot no conectado".to_string(),
        };
        assert!(!err.is_transient());
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_decode_errors_are_transient() {
        let err: SyncError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(err.is_transient());
    }
}
