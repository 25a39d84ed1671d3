//! Publish/subscribe transport seam.
//!
//! The RPC layer needs four things from its messaging system:
//! - request/reply: publish a payload and wait for a single correlated reply,
//! - queue subscriptions: competing consumers sharing one subject, each
//!   message delivered to one member of the group,
//! - the maximum payload the connection accepts,
//! - a connection lifecycle it does not manage itself.
//!
//! [`Transport`] and [`Subscription`] describe exactly that. [`MemoryBus`]
//! implements them in-process; a broker-backed connection implements the
//! same traits.

mod error;
mod memory;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

pub use error::{TransportError, TransportResult};
pub use memory::{BusConfig, MemoryBus};

/// Default maximum payload (1 MiB), the usual broker default.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// A connection to the messaging system.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publishes `payload` on `subject` and waits for the first reply.
    ///
    /// Fails with [`TransportError::Timeout`] when nothing arrives within
    /// `timeout`. Later replies to the same request are discarded.
    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> TransportResult<Vec<u8>>;

    /// Joins the queue group `queue` on `subject`.
    async fn queue_subscribe(
        &self,
        subject: &str,
        queue: &str,
    ) -> TransportResult<Box<dyn Subscription>>;

    /// Largest payload the connection accepts, in bytes.
    fn max_payload(&self) -> usize;

    /// Closes the connection. Pending subscriptions wake with
    /// [`TransportError::Closed`].
    async fn close(&self);

    /// Returns true once [`Transport::close`] was called.
    fn is_closed(&self) -> bool;
}

/// A queue subscription.
#[async_trait]
pub trait Subscription: Send {
    /// Subject this subscription listens on.
    fn subject(&self) -> &str;

    /// Waits up to `timeout` for the next message.
    ///
    /// Returns `Ok(None)` when the wait expired without a message.
    async fn next_message(&mut self, timeout: Duration) -> TransportResult<Option<Message>>;
}

/// An inbound message.
#[derive(Debug)]
pub struct Message {
    /// Subject the message was published on.
    pub subject: String,
    /// Raw payload.
    pub data: Vec<u8>,
    reply: Option<ReplyHandle>,
}

impl Message {
    /// Creates a message.
    pub fn new(subject: impl Into<String>, data: Vec<u8>, reply: Option<ReplyHandle>) -> Self {
        Self {
            subject: subject.into(),
            data,
            reply,
        }
    }

    /// Returns true if the publisher waits for a reply.
    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Sends `data` back to the publisher.
    pub fn respond(&self, data: Vec<u8>) -> TransportResult<()> {
        match self.reply {
            Some(ref reply) => reply.send(data),
            None => Err(TransportError::NoReplySubject {
                subject: self.subject.clone(),
            }),
        }
    }
}

/// Where a reply goes.
#[derive(Debug, Clone)]
pub struct ReplyHandle {
    inbox: mpsc::UnboundedSender<Vec<u8>>,
    max_payload: usize,
}

impl ReplyHandle {
    /// Creates a handle that delivers into `inbox`.
    pub fn new(inbox: mpsc::UnboundedSender<Vec<u8>>, max_payload: usize) -> Self {
        Self { inbox, max_payload }
    }

    /// Delivers a reply.
    ///
    /// A requester that already gave up is not an error; the reply is dropped.
    pub fn send(&self, data: Vec<u8>) -> TransportResult<()> {
        if data.len() > self.max_payload {
            return Err(TransportError::MaxPayloadExceeded {
                size: data.len(),
                max: self.max_payload,
            });
        }
        if self.inbox.send(data).is_err() {
            debug!("Requester no longer waiting, reply dropped");
        }
        Ok(())
    }
}
