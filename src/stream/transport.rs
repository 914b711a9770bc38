//! Push-Connection Transport
//!
//! Trait seam between the multiplexer and the wire. The production
//! implementation speaks HTTP server-sent events via `reqwest`; tests drive
//! the multiplexer with an in-memory transport instead.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};

use super::error::TransportError;
use super::sse::SseDecoder;

/// One frame body pulled off the push connection.
pub type FrameResult = Result<String, TransportError>;

/// Stream of frame bodies from a single push connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = FrameResult> + Send>>;

/// Opens push connections for the multiplexer.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open a push connection for `path` (e.g. `/values/a/b/`) and return
    /// the stream of frame bodies it delivers.
    async fn open(&self, path: &str) -> Result<FrameStream, TransportError>;
}

/// Server-sent-events transport over HTTP.
pub struct SseTransport {
    client: reqwest::Client,
    base_url: String,
}

impl SseTransport {
    /// Create a transport rooted at `base_url`.
    ///
    /// `connect_timeout` bounds each connection attempt; the established
    /// stream itself is long-lived and carries no overall deadline.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StreamTransport for SseTransport {
    async fn open(&self, path: &str) -> Result<FrameStream, TransportError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        tracing::debug!(url = %url, "push connection established");

        let mut decoder = SseDecoder::new();
        let frames = response.bytes_stream().flat_map(move |chunk| {
            let items: Vec<FrameResult> = match chunk {
                Ok(bytes) => decoder.feed(&bytes).into_iter().map(Ok).collect(),
                Err(e) => vec![Err(TransportError::Interrupted(e.to_string()))],
            };
            futures_util::stream::iter(items)
        });

        Ok(Box::pin(frames))
    }
}
