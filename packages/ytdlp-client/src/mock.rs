//! Mock [`SourceClient`] for tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::SourceClient;
use crate::error::{FetchError, FetchResult};
use crate::types::{ChannelItem, ExtractedMedia};

/// Arguments captured from an extract call.
#[derive(Debug, Clone)]
pub struct ExtractCallArgs {
    pub external_id: String,
    pub output_path: String,
}

/// Source client returning queued responses, recording every call.
///
/// Responses are consumed in order. When the listing queue is empty an
/// empty listing is returned; when the extraction queue is empty the call
/// fails with a tool error, so a forgotten queue shows up in assertions.
#[derive(Default)]
pub struct MockSourceClient {
    list_responses: Arc<Mutex<VecDeque<FetchResult<Vec<ChannelItem>>>>>,
    extract_responses: Arc<Mutex<VecDeque<FetchResult<ExtractedMedia>>>>,
    list_calls: Arc<Mutex<Vec<String>>>,
    extract_calls: Arc<Mutex<Vec<ExtractCallArgs>>>,
}

impl MockSourceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful listing response.
    pub fn with_listing(self, items: Vec<ChannelItem>) -> Self {
        self.list_responses.lock().unwrap().push_back(Ok(items));
        self
    }

    /// Queue a failed listing response.
    pub fn with_list_error(self, error: FetchError) -> Self {
        self.list_responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Queue a successful extraction response.
    pub fn with_extraction(self, media: ExtractedMedia) -> Self {
        self.extract_responses.lock().unwrap().push_back(Ok(media));
        self
    }

    /// Queue a failed extraction response.
    pub fn with_extract_error(self, error: FetchError) -> Self {
        self.extract_responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Channel ids passed to `list_recent`, in call order.
    pub fn list_calls(&self) -> Vec<String> {
        self.list_calls.lock().unwrap().clone()
    }

    /// Arguments passed to `extract`, in call order.
    pub fn extract_calls(&self) -> Vec<ExtractCallArgs> {
        self.extract_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceClient for MockSourceClient {
    async fn list_recent(&self, channel_id: &str, _limit: usize) -> FetchResult<Vec<ChannelItem>> {
        self.list_calls.lock().unwrap().push(channel_id.to_string());
        self.list_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn extract(&self, external_id: &str, output_path: &Path) -> FetchResult<ExtractedMedia> {
        self.extract_calls.lock().unwrap().push(ExtractCallArgs {
            external_id: external_id.to_string(),
            output_path: output_path.display().to_string(),
        });
        self.extract_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(FetchError::Tool {
                    output: "mock: no extraction response queued".to_string(),
                })
            })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responses_are_consumed_in_order() {
        let client = MockSourceClient::new()
            .with_listing(vec![ChannelItem::new("vid1")])
            .with_listing(vec![]);

        let first = client.list_recent("chan", 20).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = client.list_recent("chan", 20).await.unwrap();
        assert!(second.is_empty());

        assert_eq!(client.list_calls(), vec!["chan", "chan"]);
    }

    #[tokio::test]
    async fn empty_extraction_queue_fails() {
        let client = MockSourceClient::new();
        let err = client
            .extract("vid1", Path::new("/tmp/out.m4a"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Tool { .. }));
        assert_eq!(client.extract_calls().len(), 1);
    }
}
