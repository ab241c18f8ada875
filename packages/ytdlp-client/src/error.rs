//! Typed errors for the yt-dlp client.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match
//! on the failure shape and classify raw tool output themselves.

use thiserror::Error;

/// Errors that can occur while invoking the extraction tool.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The tool could not be spawned, or a local file operation failed.
    #[error("I/O error invoking extraction tool: {0}")]
    Io(#[from] std::io::Error),

    /// The tool ran past its deadline and was killed.
    #[error("extraction tool timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The tool exited non-zero. `output` is the combined stdout/stderr,
    /// preserved verbatim for upstream classification.
    #[error("extraction tool failed: {output}")]
    Tool { output: String },

    /// The tool reported success but its output could not be parsed.
    #[error("unparsable tool output: {reason}")]
    OutputParse { reason: String },

    /// The configured cookie jar could not be decoded.
    #[error("invalid cookie data: {0}")]
    Cookies(String),
}

/// Result type alias for client operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;
