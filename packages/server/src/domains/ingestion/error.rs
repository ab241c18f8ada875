//! Failure taxonomy for the ingestion pipeline.

use thiserror::Error;
use ytdlp_client::FetchError;

use super::classify::{classify, UpstreamErrorClass};
use crate::kernel::jobs::ErrorKind;
use crate::stores::StoreError;

/// Errors a pipeline operation can surface to the job runner.
///
/// Per-item and per-subscription failures are isolated by the callers; one
/// failing item never aborts a batch. Nothing waits synchronously on the
/// pipeline, so failures only show up as episode state and logs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The job payload referenced state that does not exist. Logged and
    /// dropped, never retried.
    #[error("invalid job payload: {0}")]
    Validation(String),

    /// A concurrent writer already created the row. Callers treat this as
    /// success; the row exists.
    #[error("record already exists")]
    Duplicate,

    /// Transient upstream failure; the queue retries with backoff.
    #[error("temporary upstream error: {output}")]
    TemporaryUpstream { output: String },

    /// The item is gone for good. Never retried.
    #[error("permanent upstream error: {output}")]
    PermanentUpstream { output: String },

    /// Unclassified upstream failure. Terminal for this run, but the
    /// reclaim sweep may try again later.
    #[error("unclassified upstream error: {output}")]
    UnknownUpstream { output: String },

    /// The tool reported success but the local outcome is unusable
    /// (missing output file, unparsable metadata). Handled like an
    /// unknown upstream failure.
    #[error("local I/O error: {0}")]
    LocalIo(String),

    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Classify a failed tool invocation into the taxonomy.
    pub fn from_fetch(err: FetchError) -> Self {
        match err {
            // A killed run is safe to retry.
            FetchError::Timeout { seconds } => PipelineError::TemporaryUpstream {
                output: format!("extraction tool timed out after {seconds}s"),
            },
            FetchError::Tool { output } => match classify(&output) {
                UpstreamErrorClass::Temporary => PipelineError::TemporaryUpstream { output },
                UpstreamErrorClass::Permanent => PipelineError::PermanentUpstream { output },
                UpstreamErrorClass::Unknown => PipelineError::UnknownUpstream { output },
            },
            FetchError::OutputParse { reason } => PipelineError::LocalIo(reason),
            FetchError::Io(e) => PipelineError::UnknownUpstream {
                output: e.to_string(),
            },
            FetchError::Cookies(reason) => PipelineError::UnknownUpstream { output: reason },
        }
    }

    /// How the queue should treat a job that failed with this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::TemporaryUpstream { .. } => ErrorKind::Retryable,
            // Database hiccups are transient; missing/duplicate rows are not.
            PipelineError::Store(StoreError::Database(_)) => ErrorKind::Retryable,
            _ => ErrorKind::NonRetryable,
        }
    }

    /// Whether the episode row should be marked Failed before returning.
    /// Temporary failures leave the row in flight for the queue's retry.
    pub fn is_terminal_for_item(&self) -> bool {
        matches!(
            self,
            PipelineError::PermanentUpstream { .. }
                | PipelineError::UnknownUpstream { .. }
                | PipelineError::LocalIo(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_is_retryable_everything_else_is_not() {
        let temporary = PipelineError::TemporaryUpstream {
            output: "HTTP Error 429".into(),
        };
        assert_eq!(temporary.kind(), ErrorKind::Retryable);

        let permanent = PipelineError::PermanentUpstream {
            output: "Private video".into(),
        };
        assert_eq!(permanent.kind(), ErrorKind::NonRetryable);

        let unknown = PipelineError::UnknownUpstream {
            output: "mystery".into(),
        };
        assert_eq!(unknown.kind(), ErrorKind::NonRetryable);

        let validation = PipelineError::Validation("bad payload".into());
        assert_eq!(validation.kind(), ErrorKind::NonRetryable);
    }

    #[test]
    fn tool_failures_classify_by_output() {
        let temporary = PipelineError::from_fetch(FetchError::Tool {
            output: "HTTP Error 429: Too Many Requests".into(),
        });
        assert!(matches!(
            temporary,
            PipelineError::TemporaryUpstream { .. }
        ));

        let permanent = PipelineError::from_fetch(FetchError::Tool {
            output: "ERROR: Private video".into(),
        });
        assert!(matches!(
            permanent,
            PipelineError::PermanentUpstream { .. }
        ));

        let unknown = PipelineError::from_fetch(FetchError::Tool {
            output: "unheard-of breakage".into(),
        });
        assert!(matches!(unknown, PipelineError::UnknownUpstream { .. }));
    }

    #[test]
    fn timeouts_are_temporary() {
        let err = PipelineError::from_fetch(FetchError::Timeout { seconds: 900 });
        assert!(matches!(err, PipelineError::TemporaryUpstream { .. }));
        assert!(!err.is_terminal_for_item());
    }

    #[test]
    fn parse_failures_are_terminal_local_errors() {
        let err = PipelineError::from_fetch(FetchError::OutputParse {
            reason: "no JSON document in tool output".into(),
        });
        assert!(matches!(err, PipelineError::LocalIo(_)));
        assert!(err.is_terminal_for_item());
        assert_eq!(err.kind(), ErrorKind::NonRetryable);
    }
}
