//! Error types for the runtime bridge.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the bridge [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by bridge construction and disposal.
#[derive(Debug, Error)]
pub enum Error {
    /// The OS could not start the runtime executable. The bridge is not
    /// constructed and the caller has nothing to clean up.
    #[error("failed to launch runtime at {path}: {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A redirected stdio handle was not available after spawn.
    #[error("failed to capture runtime {0}")]
    StreamCapture(&'static str),

    /// Input was written after the channel was closed or the bridge disposed.
    #[error("input channel closed or bridge disposed")]
    Disposed,

    /// I/O failure on a child stream or during teardown.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
