//! In-process bus with queue-group delivery.
//!
//! Every queue group owns one channel; its members take turns receiving
//! from it, so each published message reaches exactly one member of each
//! group on the subject.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::error::{TransportError, TransportResult, check_subject};
use crate::{DEFAULT_MAX_PAYLOAD, Message, ReplyHandle, Subscription, Transport};

/// Bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Connection name used in logs.
    pub name: String,
    /// Largest accepted payload in bytes.
    pub max_payload: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            name: "natsrpc".to_string(),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl BusConfig {
    /// Builder: set the connection name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder: set the maximum payload.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }
}

type GroupKey = (String, String);

struct QueueGroup {
    tx: mpsc::UnboundedSender<Message>,
    rx: Mutex<mpsc::UnboundedReceiver<Message>>,
    members: AtomicUsize,
}

impl QueueGroup {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            members: AtomicUsize::new(0),
        }
    }
}

struct BusInner {
    config: BusConfig,
    groups: DashMap<GroupKey, Arc<QueueGroup>>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

/// In-process [`Transport`].
///
/// Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<BusInner>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl std::fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBus")
            .field("name", &self.inner.config.name)
            .field("max_payload", &self.inner.config.max_payload)
            .field("groups", &self.inner.groups.len())
            .finish()
    }
}

impl MemoryBus {
    /// Opens a bus.
    pub fn new(config: BusConfig) -> Self {
        info!(
            name = %config.name,
            max_payload = config.max_payload,
            "Memory bus opened"
        );
        let (closed_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(BusInner {
                config,
                groups: DashMap::new(),
                closed: AtomicBool::new(false),
                closed_tx,
            }),
        }
    }

    /// Opens a bus with the given maximum payload.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self::new(BusConfig::default().with_max_payload(max_payload))
    }

    /// Number of live members in `queue` on `subject`.
    pub fn members(&self, subject: &str, queue: &str) -> usize {
        self.inner
            .groups
            .get(&(subject.to_string(), queue.to_string()))
            .map(|group| group.members.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn groups_for(&self, subject: &str) -> Vec<Arc<QueueGroup>> {
        self.inner
            .groups
            .iter()
            .filter(|entry| entry.key().0 == subject)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl Transport for MemoryBus {
    async fn request(
        &self,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> TransportResult<Vec<u8>> {
        check_subject(subject)?;
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let max = self.inner.config.max_payload;
        if payload.len() > max {
            return Err(TransportError::MaxPayloadExceeded {
                size: payload.len(),
                max,
            });
        }

        let deadline = Instant::now() + timeout;
        let (inbox, mut replies) = mpsc::unbounded_channel();
        let groups = self.groups_for(subject);
        trace!(subject, groups = groups.len(), size = payload.len(), "Publishing request");
        for group in groups {
            let reply = ReplyHandle::new(inbox.clone(), max);
            let _ = group
                .tx
                .send(Message::new(subject, payload.clone(), Some(reply)));
        }
        drop(inbox);

        match tokio::time::timeout_at(deadline, replies.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => {
                // Every receiver dropped the message without answering.
                tokio::time::sleep_until(deadline).await;
                Err(TransportError::timeout(subject, timeout))
            }
            Err(_) => Err(TransportError::timeout(subject, timeout)),
        }
    }

    async fn queue_subscribe(
        &self,
        subject: &str,
        queue: &str,
    ) -> TransportResult<Box<dyn Subscription>> {
        check_subject(subject)?;
        check_subject(queue)?;
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let key = (subject.to_string(), queue.to_string());
        // Count the member while the entry is locked so a leaving member
        // cannot remove the group in between.
        let (group, members) = {
            let entry = self
                .inner
                .groups
                .entry(key.clone())
                .or_insert_with(|| Arc::new(QueueGroup::new()));
            let members = entry.members.fetch_add(1, Ordering::SeqCst) + 1;
            (entry.value().clone(), members)
        };
        debug!(subject, queue, members, "Joined queue group");

        Ok(Box::new(MemorySubscription {
            key,
            group,
            bus: self.inner.clone(),
            closed: self.inner.closed_tx.subscribe(),
        }))
    }

    fn max_payload(&self) -> usize {
        self.inner.config.max_payload
    }

    async fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            let _ = self.inner.closed_tx.send(true);
            info!(name = %self.inner.config.name, "Memory bus closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Member of a queue group on a [`MemoryBus`].
struct MemorySubscription {
    key: GroupKey,
    group: Arc<QueueGroup>,
    bus: Arc<BusInner>,
    closed: watch::Receiver<bool>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn subject(&self) -> &str {
        &self.key.0
    }

    async fn next_message(&mut self, timeout: Duration) -> TransportResult<Option<Message>> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }

        let group = self.group.clone();
        let receive = async move {
            let mut rx = group.rx.lock().await;
            rx.recv().await
        };

        tokio::select! {
            _ = self.closed.wait_for(|closed| *closed) => Err(TransportError::Closed),
            received = tokio::time::timeout(timeout, receive) => match received {
                Ok(Some(message)) => Ok(Some(message)),
                Ok(None) => Err(TransportError::Closed),
                Err(_) => Ok(None),
            },
        }
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        let remaining = self.group.members.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            self.bus
                .groups
                .remove_if(&self.key, |_, group| group.members.load(Ordering::SeqCst) == 0);
        }
        debug!(
            subject = %self.key.0,
            queue = %self.key.1,
            remaining,
            "Left queue group"
        );
    }
}
