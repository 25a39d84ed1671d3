//! Responder loop.
//!
//! One worker handles one request at a time:
//!
//! ```text
//! Idle -> Receiving -> Decoding -> Dispatching -> Encoding -> Replying -> Idle
//! ```
//!
//! An expired receive wait goes straight back to Idle. Undecodable input is
//! logged and dropped without a reply. Responses that do not fit in one
//! transport message are replaced by a chunk signal; see
//! [`natsrpc_protocol::chunk`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use natsrpc_protocol::{ChunkPlan, RequestEnvelope, ResponseEnvelope, decode, encode, status};
use natsrpc_transport::{Message, Subscription, Transport, TransportError};

use crate::error::ServerResult;
use crate::router::Router;
use crate::shutdown::ShutdownHandle;

/// Pause after a failed receive before trying again.
pub const RECEIVE_BACKOFF: Duration = Duration::from_millis(100);

/// An encoded reply ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Status of the reply.
    pub status: u16,
    /// Chunk count in the reply header.
    pub chunks: u32,
    /// Encoded response envelope.
    pub bytes: Vec<u8>,
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A reply was sent.
    Replied { status: u16, chunks: u32 },
    /// The message did not decode and was dropped.
    Dropped,
    /// A reply was produced but could not be sent.
    SendFailed,
}

impl Outcome {
    /// Returns true when the message was a request the worker handled.
    pub fn is_processed(&self) -> bool {
        !matches!(self, Self::Dropped)
    }
}

/// Turns inbound messages into replies.
#[derive(Clone)]
pub struct Responder {
    router: Arc<Router>,
    transport: Arc<dyn Transport>,
    server_id: String,
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("router", &self.router)
            .field("server_id", &self.server_id)
            .finish()
    }
}

impl Responder {
    /// Creates a responder stamping `server_id` on its replies.
    pub fn new(
        router: Arc<Router>,
        transport: Arc<dyn Transport>,
        server_id: impl Into<String>,
    ) -> Self {
        Self {
            router,
            transport,
            server_id: server_id.into(),
        }
    }

    /// Id stamped on replies.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Receives and handles messages until shutdown or until the transport
    /// closes. Returns the number of requests handled.
    pub async fn serve(
        &self,
        mut subscription: Box<dyn Subscription>,
        max_wait: Duration,
        shutdown: ShutdownHandle,
    ) -> ServerResult<u64> {
        let mut processed = 0u64;
        info!(
            subject = subscription.subject(),
            server_id = %self.server_id,
            "Responder listening"
        );

        loop {
            if shutdown.is_shutdown() {
                break;
            }
            let next = tokio::select! {
                _ = shutdown.wait().wait() => break,
                next = subscription.next_message(max_wait) => next,
            };

            match next {
                Ok(Some(message)) => {
                    if self.process(&message).await.is_processed() {
                        processed += 1;
                    }
                }
                Ok(None) => trace!("Receive wait expired, back to idle"),
                Err(TransportError::Closed) => {
                    info!("Transport closed, responder stopping");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Receive failed");
                    tokio::select! {
                        _ = shutdown.wait().wait() => break,
                        _ = tokio::time::sleep(RECEIVE_BACKOFF) => {}
                    }
                }
            }
        }

        debug!(server_id = %self.server_id, processed, "Responder stopped");
        Ok(processed)
    }

    /// Handles one message and sends the reply.
    #[tracing::instrument(skip(self, message), fields(subject = %message.subject, size = message.data.len()))]
    pub async fn process(&self, message: &Message) -> Outcome {
        let Some(reply) = self.handle_bytes(&message.data).await else {
            return Outcome::Dropped;
        };

        match message.respond(reply.bytes) {
            Ok(()) => Outcome::Replied {
                status: reply.status,
                chunks: reply.chunks,
            },
            Err(e) => {
                warn!(error = %e, status = reply.status, "Failed to send reply");
                Outcome::SendFailed
            }
        }
    }

    /// Produces the encoded reply for a raw request.
    ///
    /// Returns `None` when the request does not decode.
    pub async fn handle_bytes(&self, data: &[u8]) -> Option<Reply> {
        let request: RequestEnvelope = match decode(data) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, size = data.len(), "Dropping undecodable request");
                return None;
            }
        };

        let response = self.handle(request).await;
        match encode(&response) {
            Ok(bytes) => Some(Reply {
                status: response.status(),
                chunks: response.header.chunks,
                bytes,
            }),
            Err(e) => {
                error!(error = %e, "Failed to encode response");
                let fallback = self.stamp(ResponseEnvelope::internal("failed to encode response"));
                let bytes = encode(&fallback).ok()?;
                Some(Reply {
                    status: fallback.status(),
                    chunks: 0,
                    bytes,
                })
            }
        }
    }

    /// Dispatches a decoded request and applies the chunk policy.
    pub async fn handle(&self, mut request: RequestEnvelope) -> ResponseEnvelope {
        let start = Instant::now();
        let max_payload = self.transport.max_payload();
        let (chunk_index, flags) = std::mem::take(&mut request.header.flags).split_chunk();
        request.header.flags = flags;
        let mode = request.header.mode.clone();
        let path = request.header.path.clone();

        let response = self.stamp(self.router.dispatch(request).await);
        let reply = match chunk_index {
            None => self.fit(response, max_payload),
            Some(index) => self.chunk(response, index, max_payload),
        };

        debug!(
            mode = %mode,
            path = %path,
            chunk = ?chunk_index,
            status = reply.status(),
            chunks = reply.header.chunks,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Handled request"
        );
        reply
    }

    /// Replaces a response that is too large for one message with the chunk signal.
    fn fit(&self, response: ResponseEnvelope, max_payload: usize) -> ResponseEnvelope {
        let size = match natsrpc_protocol::encoded_len(&response) {
            Ok(size) => size,
            Err(e) => {
                error!(error = %e, "Failed to measure response");
                return self.stamp(ResponseEnvelope::internal("failed to encode response"));
            }
        };
        if size <= max_payload {
            return response;
        }

        let plan = match ChunkPlan::for_response(&response, max_payload) {
            Ok(plan) => plan,
            Err(e) => {
                error!(error = %e, size, max_payload, "Response cannot be chunked");
                return self.stamp(ResponseEnvelope::internal(e.to_string()));
            }
        };
        info!(
            size,
            max_payload,
            chunks = plan.chunks(),
            "Response exceeds max payload, signalling chunked transfer"
        );
        self.stamp(plan.signal())
    }

    /// Serves chunk `index` of a re-run response.
    fn chunk(&self, response: ResponseEnvelope, index: u32, max_payload: usize) -> ResponseEnvelope {
        if !response.is_success() {
            return response;
        }
        let plan = match ChunkPlan::for_response(&response, max_payload) {
            Ok(plan) => plan,
            Err(e) => {
                error!(error = %e, index, "Response cannot be chunked");
                return self.stamp(ResponseEnvelope::internal(e.to_string()));
            }
        };
        let reply = match plan.chunk_reply(&response, index) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(error = %e, index, "Rejecting chunk request");
                return self.stamp(ResponseEnvelope::bad_request(e.to_string()));
            }
        };
        match natsrpc_protocol::encoded_len(&reply) {
            Ok(size) if size <= max_payload => reply,
            Ok(size) => {
                error!(size, max_payload, index, "Chunk reply exceeds max payload");
                self.stamp(ResponseEnvelope::internal(format!(
                    "chunk {} needs {} bytes, max payload is {}",
                    index, size, max_payload
                )))
            }
            Err(e) => {
                error!(error = %e, index, "Failed to measure chunk reply");
                self.stamp(ResponseEnvelope::internal("failed to encode response"))
            }
        }
    }

    /// Fills in the responder id and keeps `error_str` set exactly on
    /// non-200 replies.
    fn stamp(&self, mut response: ResponseEnvelope) -> ResponseEnvelope {
        if response.header.server_id.as_deref().is_none_or(str::is_empty) {
            response.header.server_id = Some(self.server_id.clone());
        }
        let code = response.header.status;
        if code == status::OK {
            response.header.error_str = None;
        } else if response.header.error_str.as_deref().is_none_or(str::is_empty) {
            response.header.error_str = Some(format!("status {}", code));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use natsrpc_protocol::{
        CHUNKED_SENTINEL, Flags, MAX_PAYLOAD_EXCEEDED, Reassembler, ResponseHeader, status,
    };
    use natsrpc_transport::{MemoryBus, ReplyHandle, TransportResult};
    use tokio::sync::mpsc;

    const BIG: usize = 5000;

    fn router() -> Router {
        Router::new()
            .route_fn("POST", "/echo", |_, req: RequestEnvelope| async move {
                ResponseEnvelope::ok(String::from_utf8_lossy(&req.body).into_owned())
            })
            .unwrap()
            .route_fn("GET", "/big", |_, req: RequestEnvelope| async move {
                let fill = req
                    .header
                    .flags
                    .get("fill")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| "x".to_string());
                ResponseEnvelope::ok(fill.repeat(BIG)).with_path("/big")
            })
            .unwrap()
            .route_fn("GET", "/stamped", |_, _| async {
                ResponseEnvelope::ok("mine").with_server_id("handler")
            })
            .unwrap()
            .route_fn("GET", "/sealed/{size}", |ctx, _| async move {
                let size = ctx
                    .param("size")
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(0);
                let mut response = ResponseEnvelope::ok("y".repeat(3000));
                response.header.encrypted_hdr = Some(vec![7u8; size]);
                response
            })
            .unwrap()
            .route_fn("GET", "/unavailable", |_, _| async {
                ResponseEnvelope {
                    header: ResponseHeader {
                        status: 503,
                        ..Default::default()
                    },
                    response: String::new(),
                }
            })
            .unwrap()
            .route_fn("GET", "/stale", |_, _| async {
                let mut response = ResponseEnvelope::ok("fine");
                response.header.error_str = Some("stale".into());
                response
            })
            .unwrap()
    }

    struct FailingSubscription {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Subscription for FailingSubscription {
        fn subject(&self) -> &str {
            "micro-master"
        }

        async fn next_message(&mut self, _timeout: Duration) -> TransportResult<Option<Message>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::InvalidSubject("micro master".into()))
        }
    }

    fn responder(max_payload: usize) -> Responder {
        let transport: Arc<dyn Transport> = Arc::new(MemoryBus::with_max_payload(max_payload));
        Responder::new(Arc::new(router()), transport, "srv-1")
    }

    #[tokio::test]
    async fn small_response_is_inline() {
        let responder = responder(1024);
        let request = RequestEnvelope::post("/echo").with_body(b"hello".to_vec());
        let response = responder.handle(request).await;
        assert!(response.is_success());
        assert_eq!(response.response, "hello");
        assert_eq!(response.header.server_id.as_deref(), Some("srv-1"));
    }

    #[tokio::test]
    async fn handler_server_id_is_kept() {
        let response = responder(1024).handle(RequestEnvelope::get("/stamped")).await;
        assert_eq!(response.header.server_id.as_deref(), Some("handler"));
    }

    #[tokio::test]
    async fn unknown_route_gets_404() {
        let response = responder(1024).handle(RequestEnvelope::get("/missing")).await;
        assert_eq!(response.status(), status::NOT_FOUND);
        assert!(response.header.error_str.is_some());
        assert_eq!(response.header.server_id.as_deref(), Some("srv-1"));
    }

    #[tokio::test]
    async fn oversized_response_becomes_chunk_signal() {
        let response = responder(1024).handle(RequestEnvelope::get("/big")).await;
        assert_eq!(response.status(), status::PAYLOAD_TOO_LARGE);
        assert_eq!(response.error_message(), Some(MAX_PAYLOAD_EXCEEDED));
        assert_eq!(response.response, CHUNKED_SENTINEL);
        assert_eq!(response.header.total_size, Some(BIG as u64));
        assert!(response.header.chunks >= 2);
        assert_eq!(
            response.header.chunks,
            ChunkPlan::new(BIG, 1024).chunks()
        );
    }

    #[tokio::test]
    async fn chunk_requests_rebuild_the_response() {
        let responder = responder(1024);
        let original = RequestEnvelope::get("/big")
            .with_flags(Flags::generic([("fill", serde_json::json!("y"))]));
        let signal = responder.handle(original.clone()).await;

        let mut reassembler = Reassembler::from_signal(&signal).unwrap();
        while let Some(index) = reassembler.next_index() {
            let follow_up = original
                .clone()
                .with_flags(original.header.flags.clone().with_chunk_index(index));
            let reply = responder.handle(follow_up).await;
            assert_eq!(reply.status(), status::OK);
            assert!(encode(&reply).unwrap().len() <= 1024);
            reassembler.push(&reply).unwrap();
        }

        let rebuilt = reassembler.finish().unwrap();
        assert_eq!(rebuilt.response, "y".repeat(BIG));
        assert_eq!(rebuilt.header.path.as_deref(), Some("/big"));
        assert_eq!(rebuilt.header.chunks, 0);
    }

    #[tokio::test]
    async fn large_header_metadata_still_fits_each_chunk() {
        let responder = responder(2048);
        let original = RequestEnvelope::get("/sealed/1200");
        let signal = responder.handle(original.clone()).await;
        assert_eq!(signal.status(), status::PAYLOAD_TOO_LARGE);

        let mut reassembler = Reassembler::from_signal(&signal).unwrap();
        while let Some(index) = reassembler.next_index() {
            let follow_up = original
                .clone()
                .with_flags(Flags::default().with_chunk_index(index));
            let reply = responder.handle(follow_up).await;
            assert_eq!(reply.status(), status::OK);
            assert!(encode(&reply).unwrap().len() <= 2048);
            reassembler.push(&reply).unwrap();
        }

        let rebuilt = reassembler.finish().unwrap();
        assert_eq!(rebuilt.response, "y".repeat(3000));
        assert_eq!(rebuilt.header.encrypted_hdr, Some(vec![7u8; 1200]));
    }

    #[tokio::test]
    async fn header_too_large_to_chunk_is_500() {
        let responder = responder(2048);
        let response = responder.handle(RequestEnvelope::get("/sealed/4000")).await;
        assert_eq!(response.status(), status::INTERNAL_ERROR);
        assert!(response.error_message().unwrap().contains("max payload"));

        let follow_up =
            RequestEnvelope::get("/sealed/4000").with_flags(Flags::default().with_chunk_index(0));
        let response = responder.handle(follow_up).await;
        assert_eq!(response.status(), status::INTERNAL_ERROR);
        assert!(encode(&response).unwrap().len() <= 2048);
    }

    #[tokio::test]
    async fn error_str_is_set_exactly_on_failures() {
        let responder = responder(1024);

        let unavailable = responder.handle(RequestEnvelope::get("/unavailable")).await;
        assert_eq!(unavailable.status(), 503);
        assert_eq!(unavailable.header.error_str.as_deref(), Some("status 503"));

        let stale = responder.handle(RequestEnvelope::get("/stale")).await;
        assert!(stale.is_success());
        assert_eq!(stale.header.error_str, None);

        let missing = responder.handle(RequestEnvelope::get("/missing")).await;
        assert_eq!(missing.error_message(), Some("no route for GET /missing"));
    }

    #[tokio::test]
    async fn out_of_range_chunk_is_400() {
        let responder = responder(1024);
        let chunks = ChunkPlan::new(BIG, 1024).chunks();
        let request =
            RequestEnvelope::get("/big").with_flags(Flags::default().with_chunk_index(chunks));
        let response = responder.handle(request).await;
        assert_eq!(response.status(), status::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chunk_request_for_failing_route_returns_handler_error() {
        let request =
            RequestEnvelope::get("/missing").with_flags(Flags::default().with_chunk_index(0));
        let response = responder(1024).handle(request).await;
        assert_eq!(response.status(), status::NOT_FOUND);
    }

    #[tokio::test]
    async fn undecodable_input_is_dropped() {
        let responder = responder(1024);
        assert!(responder.handle_bytes(b"not json").await.is_none());
        assert!(responder.handle_bytes(b"").await.is_none());
        assert!(
            responder
                .handle_bytes(br#"{"header":{"mode":"","path":"/echo"}}"#)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn process_sends_reply() {
        let responder = responder(1024);
        let (inbox, mut replies) = mpsc::unbounded_channel();
        let request = encode(&RequestEnvelope::post("/echo").with_body(b"hi".to_vec())).unwrap();
        let message = Message::new("micro-master", request, Some(ReplyHandle::new(inbox, 1024)));

        let outcome = responder.process(&message).await;
        assert_eq!(
            outcome,
            Outcome::Replied {
                status: status::OK,
                chunks: 0
            }
        );
        let reply: ResponseEnvelope = decode(&replies.recv().await.unwrap()).unwrap();
        assert_eq!(reply.response, "hi");
    }

    #[tokio::test]
    async fn process_without_reply_subject_fails_to_send() {
        let responder = responder(1024);
        let request = encode(&RequestEnvelope::post("/echo")).unwrap();
        let message = Message::new("micro-master", request, None);
        assert_eq!(responder.process(&message).await, Outcome::SendFailed);
        assert!(Outcome::SendFailed.is_processed());
        assert!(!Outcome::Dropped.is_processed());
    }

    #[tokio::test(start_paused = true)]
    async fn serve_stops_on_shutdown() {
        let bus = MemoryBus::default();
        let transport: Arc<dyn Transport> = Arc::new(bus.clone());
        let responder = Responder::new(Arc::new(router()), transport.clone(), "srv-1");
        let subscription = transport
            .queue_subscribe("micro-master", "disp-micro")
            .await
            .unwrap();
        let shutdown = ShutdownHandle::new();

        let worker = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                responder
                    .serve(subscription, Duration::from_secs(60), shutdown)
                    .await
            })
        };

        let request = encode(&RequestEnvelope::post("/echo").with_body(b"a".to_vec())).unwrap();
        let reply = transport
            .request("micro-master", request, Duration::from_secs(1))
            .await
            .unwrap();
        let reply: ResponseEnvelope = decode(&reply).unwrap();
        assert_eq!(reply.response, "a");

        shutdown.trigger();
        assert_eq!(worker.await.unwrap().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn serve_backs_off_after_receive_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let subscription = Box::new(FailingSubscription {
            calls: calls.clone(),
        });
        let responder = responder(1024);
        let shutdown = ShutdownHandle::new();

        let worker = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                responder
                    .serve(subscription, Duration::from_secs(60), shutdown)
                    .await
            })
        };

        tokio::time::sleep(RECEIVE_BACKOFF * 10 + RECEIVE_BACKOFF / 2).await;
        shutdown.trigger();
        assert_eq!(worker.await.unwrap().unwrap(), 0);

        let calls = calls.load(Ordering::SeqCst);
        assert!((2..=12).contains(&calls), "{} receive attempts", calls);
    }

    #[tokio::test]
    async fn serve_stops_when_transport_closes() {
        let bus = MemoryBus::default();
        let transport: Arc<dyn Transport> = Arc::new(bus.clone());
        let responder = Responder::new(Arc::new(router()), transport.clone(), "srv-1");
        let subscription = transport
            .queue_subscribe("micro-master", "disp-micro")
            .await
            .unwrap();

        let worker = tokio::spawn(async move {
            responder
                .serve(subscription, Duration::from_secs(60), ShutdownHandle::new())
                .await
        });
        tokio::task::yield_now().await;
        bus.close().await;
        assert_eq!(worker.await.unwrap().unwrap(), 0);
    }
}
