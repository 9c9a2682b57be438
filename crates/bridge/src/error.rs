//! Error types for the execution bridge.

use thiserror::Error;

/// Failures surfaced to submitters and to whoever starts the host thread.
///
/// Operation failures are not represented here; they become `failed` results.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The request did not name an operation.
    #[error("missing 'operation' in request")]
    EmptyOperation,

    #[error("failed to start host thread: {0}")]
    HostThread(#[from] std::io::Error),

    #[error("host thread panicked")]
    HostThreadPanicked,
}
