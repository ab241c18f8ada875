//! Classification of raw extraction-tool output.

/// Outcome classes for a failed tool invocation.
///
/// Temporary failures are retried with backoff. Permanent ones never are.
/// Unknown ones are terminal for the current run but stay eligible for the
/// periodic reclaim sweep, since the cause may later be fixed externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorClass {
    Temporary,
    Permanent,
    Unknown,
}

use UpstreamErrorClass::{Permanent, Temporary};

/// Ordered signature table, most specific first: exact HTTP statuses and
/// known phrases before the generic infrastructure words, so a generic
/// substring can never pre-empt a precise signature. The temporary and
/// permanent sets are disjoint.
const SIGNATURES: &[(&str, UpstreamErrorClass)] = &[
    // Rate limiting and upstream 5xx
    ("sign in to confirm you're not a bot", Temporary),
    ("http error 429", Temporary),
    ("http error 503", Temporary),
    ("http error 502", Temporary),
    ("http error 500", Temporary),
    // Gone forever
    ("http error 404", Permanent),
    ("http error 403", Permanent),
    ("video unavailable", Permanent),
    ("private video", Permanent),
    ("this video is not available", Permanent),
    ("this video has been removed", Permanent),
    ("video was deleted", Permanent),
    ("copyright", Permanent),
    // Generic transient infrastructure
    ("timed out", Temporary),
    ("timeout", Temporary),
    ("connection refused", Temporary),
    ("connection reset", Temporary),
    ("network is unreachable", Temporary),
    ("temporary failure in name resolution", Temporary),
];

/// Classify raw tool output. Case-insensitive substring match, first match
/// wins; anything unmatched is Unknown.
pub fn classify(raw_output: &str) -> UpstreamErrorClass {
    let lowered = raw_output.to_lowercase();
    for (pattern, class) in SIGNATURES {
        if lowered.contains(pattern) {
            return *class;
        }
    }
    UpstreamErrorClass::Unknown
}
