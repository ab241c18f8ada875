//! Value types exchanged with the extraction tool.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One entry from a channel's recent-uploads listing, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelItem {
    /// Source-assigned item identifier.
    pub external_id: String,
    pub title: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ChannelItem {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            title: None,
            published_at: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }
}

/// Metadata for a successfully extracted item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedMedia {
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub duration_seconds: i32,
    /// Path the tool reports it wrote the audio file to.
    pub output_path: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Raw JSON document printed by the tool (`-j` / `--print-json`).
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ToolOutput {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(rename = "_filename", default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub upload_date: Option<String>,
}

/// Parse the tool's `YYYYMMDD` upload date into a UTC midnight timestamp.
pub fn parse_upload_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn parses_compact_upload_date() {
        let parsed = parse_upload_date("20240215").unwrap();
        assert_eq!(parsed.year(), 2024);
        assert_eq!(parsed.month(), 2);
        assert_eq!(parsed.day(), 15);
    }

    #[test]
    fn rejects_malformed_upload_date() {
        assert!(parse_upload_date("2024-02-15").is_none());
        assert!(parse_upload_date("").is_none());
        assert!(parse_upload_date("not a date").is_none());
    }

    #[test]
    fn tool_output_tolerates_missing_fields() {
        let parsed: ToolOutput = serde_json::from_str(r#"{"id": "abc123"}"#).unwrap();
        assert_eq!(parsed.id, "abc123");
        assert!(parsed.title.is_none());
        assert!(parsed.filename.is_none());
    }

    #[test]
    fn tool_output_reads_renamed_filename() {
        let parsed: ToolOutput = serde_json::from_str(
            r#"{"id": "abc123", "title": "Demo", "duration": 61.4, "_filename": "audio/x.m4a", "upload_date": "20240101"}"#,
        )
        .unwrap();
        assert_eq!(parsed.filename.as_deref(), Some("audio/x.m4a"));
        assert_eq!(parsed.duration, Some(61.4));
    }
}
