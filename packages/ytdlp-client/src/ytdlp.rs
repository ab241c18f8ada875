//! Subprocess-backed [`SourceClient`] built on the `yt-dlp` binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::client::SourceClient;
use crate::error::{FetchError, FetchResult};
use crate::types::{parse_upload_date, ChannelItem, ExtractedMedia, ToolOutput};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Configuration for [`YtDlpClient`].
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// Binary to invoke.
    pub binary: String,
    /// Deadline for one channel listing run.
    pub list_timeout: Duration,
    /// Deadline for one extraction run.
    pub extract_timeout: Duration,
    /// Base64-encoded Netscape cookie jar, written to a temp file when set.
    pub cookies_base64: Option<String>,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            list_timeout: Duration::from_secs(2 * 60),
            extract_timeout: Duration::from_secs(15 * 60),
            cookies_base64: None,
        }
    }
}

/// Cookie jar written to disk for the tool; removed again on drop.
struct CookieFile(PathBuf);

impl Drop for CookieFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn write_cookie_file(encoded: &str) -> FetchResult<CookieFile> {
    let data = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| FetchError::Cookies(e.to_string()))?;
    let path = std::env::temp_dir().join(format!("ytdlp_cookies_{}.txt", std::process::id()));
    std::fs::write(&path, data)?;
    Ok(CookieFile(path))
}

/// Runs `yt-dlp` as a subprocess with a hardened header set and bounded
/// runtimes. The raw combined output of failed runs is preserved in
/// [`FetchError::Tool`] so callers can classify it.
pub struct YtDlpClient {
    config: YtDlpConfig,
    cookie_file: Option<CookieFile>,
}

impl YtDlpClient {
    pub fn new(config: YtDlpConfig) -> FetchResult<Self> {
        let cookie_file = match &config.cookies_base64 {
            Some(encoded) => Some(write_cookie_file(encoded)?),
            None => None,
        };
        Ok(Self {
            config,
            cookie_file,
        })
    }

    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "--user-agent".to_string(),
            USER_AGENT.to_string(),
            "--add-header".to_string(),
            "Accept-Language:en-US,en;q=0.9".to_string(),
            "--extractor-args".to_string(),
            "youtube:player_client=android".to_string(),
        ];
        if let Some(cookies) = &self.cookie_file {
            args.push("--cookies".to_string());
            args.push(cookies.0.display().to_string());
        }
        args
    }

    /// Run the tool and return its combined output, or the combined output
    /// wrapped in an error when the exit status is non-zero.
    async fn run(&self, args: &[String], deadline: Duration) -> FetchResult<String> {
        debug!(binary = %self.config.binary, "invoking extraction tool");

        let mut command = Command::new(&self.config.binary);
        command.args(args).kill_on_drop(true);

        let output = match tokio::time::timeout(deadline, command.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(FetchError::Timeout {
                    seconds: deadline.as_secs(),
                })
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(FetchError::Tool { output: combined });
        }

        Ok(combined)
    }
}

#[async_trait]
impl SourceClient for YtDlpClient {
    async fn list_recent(&self, channel_id: &str, limit: usize) -> FetchResult<Vec<ChannelItem>> {
        let mut args = vec![
            "--flat-playlist".to_string(),
            "-j".to_string(),
            "--playlist-end".to_string(),
            limit.to_string(),
        ];
        args.extend(self.common_args());
        args.push(format!(
            "https://www.youtube.com/channel/{channel_id}/videos"
        ));

        let output = self.run(&args, self.config.list_timeout).await?;
        Ok(parse_listing(&output))
    }

    async fn extract(&self, external_id: &str, output_path: &Path) -> FetchResult<ExtractedMedia> {
        let mut args = vec![
            "-x".to_string(),
            "--audio-format".to_string(),
            "m4a".to_string(),
            "-o".to_string(),
            output_path.display().to_string(),
            "--print-json".to_string(),
        ];
        args.extend(self.common_args());
        args.push(format!("https://www.youtube.com/watch?v={external_id}"));

        let output = self.run(&args, self.config.extract_timeout).await?;
        let parsed = parse_tool_json(&output)?;

        Ok(ExtractedMedia {
            external_id: parsed.id,
            title: parsed.title.unwrap_or_default(),
            description: parsed.description.unwrap_or_default(),
            duration_seconds: parsed.duration.unwrap_or(0.0) as i32,
            output_path: parsed
                .filename
                .unwrap_or_else(|| output_path.display().to_string()),
            published_at: parsed.upload_date.as_deref().and_then(parse_upload_date),
        })
    }

    fn name(&self) -> &str {
        "yt-dlp"
    }
}

/// Listing output is one JSON object per line; lines the tool interleaves
/// that are not entries are skipped.
fn parse_listing(output: &str) -> Vec<ChannelItem> {
    let mut items = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if !line.starts_with('{') {
            continue;
        }
        match serde_json::from_str::<ToolOutput>(line) {
            Ok(entry) => items.push(ChannelItem {
                external_id: entry.id,
                title: entry.title,
                published_at: entry.upload_date.as_deref().and_then(parse_upload_date),
            }),
            Err(e) => warn!(error = %e, "skipping unparsable listing line"),
        }
    }
    items
}

/// The tool sometimes prints other things before the JSON document; scan
/// forward to the first `{` and ignore anything after the document.
fn parse_tool_json(output: &str) -> FetchResult<ToolOutput> {
    let start = output.find('{').ok_or_else(|| FetchError::OutputParse {
        reason: "no JSON document in tool output".to_string(),
    })?;

    let mut stream = serde_json::Deserializer::from_str(&output[start..]).into_iter::<ToolOutput>();
    match stream.next() {
        Some(Ok(parsed)) => Ok(parsed),
        Some(Err(e)) => Err(FetchError::OutputParse {
            reason: e.to_string(),
        }),
        None => Err(FetchError::OutputParse {
            reason: "empty JSON document".to_string(),
        }),
    }
}
