//! Request/reply client.
//!
//! [`RpcClient::call`] is one round trip: encode, publish, wait for the
//! first reply, decode. Non-200 statuses come back as values.
//! [`RpcClient::fetch`] additionally follows chunk signals and returns the
//! reassembled response.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use natsrpc_protocol::{Reassembler, RequestEnvelope, ResponseEnvelope, decode, encode};
use natsrpc_transport::Transport;

use crate::error::ClientResult;

/// Default per-request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Client for one transport connection.
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    subject: String,
    timeout: Duration,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("subject", &self.subject)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RpcClient {
    /// Creates a client publishing on the default subject.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            subject: natsrpc_server::DEFAULT_SUBJECT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Builder: set the default subject.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Builder: set the default deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Default subject.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Default deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends `request` on `subject` and returns the single reply.
    #[tracing::instrument(
        skip(self, request),
        fields(mode = %request.header.mode, path = %request.header.path)
    )]
    pub async fn call(
        &self,
        subject: &str,
        request: &RequestEnvelope,
        timeout: Duration,
    ) -> ClientResult<ResponseEnvelope> {
        let start = Instant::now();
        let payload = encode(request)?;
        let reply = self.transport.request(subject, payload, timeout).await?;
        let response: ResponseEnvelope = decode(&reply)?;

        debug!(
            subject,
            status = response.status(),
            chunks = response.header.chunks,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Received reply"
        );
        Ok(response)
    }

    /// Like [`RpcClient::call`], but fetches every chunk of an oversized
    /// response and returns the reassembled envelope.
    ///
    /// A follow-up that fails with a non-200 status is returned as-is.
    pub async fn fetch(
        &self,
        subject: &str,
        request: &RequestEnvelope,
        timeout: Duration,
    ) -> ClientResult<ResponseEnvelope> {
        let response = self.call(subject, request, timeout).await?;
        if !response.is_chunked() {
            return Ok(response);
        }

        let start = Instant::now();
        let mut reassembler = Reassembler::from_signal(&response)?;
        info!(
            path = %request.header.path,
            chunks = reassembler.chunks(),
            total_size = ?response.header.total_size,
            "Fetching chunked response"
        );

        while let Some(index) = reassembler.next_index() {
            let mut follow_up = request.clone();
            let flags = std::mem::take(&mut follow_up.header.flags);
            follow_up.header.flags = flags.with_chunk_index(index);

            let part = self.call(subject, &follow_up, timeout).await?;
            if !part.is_success() {
                debug!(index, status = part.status(), "Chunk request failed");
                return Ok(part);
            }
            reassembler.push(&part)?;
        }

        let response = reassembler.finish()?;
        debug!(
            size = response.response.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Reassembled chunked response"
        );
        Ok(response)
    }

    /// [`RpcClient::fetch`] on the default subject with the default deadline.
    pub async fn send(&self, request: &RequestEnvelope) -> ClientResult<ResponseEnvelope> {
        self.fetch(&self.subject, request, self.timeout).await
    }
}
