// 🚨 Error taxonomy for a sync run
//
// Errors are classified by what the caller should do with them:
// - Retryable: throttling, 408/5xx, transport timeouts
// - Unit-permanent: parse failures, other HTTP statuses, unreadable files
// - Run-level: batch write failures during reconciliation

use crate::reconciliation::{ReconcileStep, ReconciliationReport};
use thiserror::Error;

// ============================================================================
// FETCH ERRORS (one unit of work: an endpoint or a file)
// ============================================================================

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("throttled by provider (HTTP {status})")]
    Throttled { status: u16 },

    #[error("transient provider failure (HTTP {status})")]
    Transient { status: u16 },

    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("transport error: {message}")]
    Transport { message: String, retryable: bool },

    #[error("malformed payload: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Classify an HTTP status. `None` means the status is a success.
    pub fn from_status(status: u16) -> Option<FetchError> {
        match status {
            200..=299 => None,
            403 | 429 => Some(FetchError::Throttled { status }),
            408 | 500..=599 => Some(FetchError::Transient { status }),
            _ => Some(FetchError::Status { status }),
        }
    }

    /// Returns true if the operation may succeed when attempted again
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Throttled { .. } | FetchError::Transient { .. } => true,
            FetchError::Transport { retryable, .. } => *retryable,
            FetchError::Status { .. } | FetchError::Parse(_) | FetchError::Io(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return FetchError::Parse(err.to_string());
        }
        FetchError::Transport {
            retryable: err.is_timeout() || err.is_connect() || err.is_request(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Parse(err.to_string())
    }
}

// ============================================================================
// RETRY ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: FetchError },

    #[error("permanent failure on attempt {attempts}: {error}")]
    Permanent { attempts: u32, error: FetchError },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Permanent { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

// ============================================================================
// RECONCILIATION ERRORS
// ============================================================================

/// A batch write failed. Earlier batches stay committed.
#[derive(Debug, Error)]
#[error("{step} batch {batch_index} failed after {batches_committed} committed batches: {cause}")]
pub struct ReconcileError {
    pub step: ReconcileStep,
    pub batch_index: usize,
    pub batches_committed: usize,
    pub cause: anyhow::Error,
    /// Counters for everything written before the failure
    pub partial: ReconciliationReport,
}
