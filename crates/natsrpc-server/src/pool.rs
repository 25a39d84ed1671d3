//! Worker pool.
//!
//! Every worker owns its own subscription in the same queue group, so the
//! transport hands each request to exactly one of them.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use natsrpc_transport::Transport;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::responder::Responder;
use crate::router::Router;
use crate::shutdown::ShutdownHandle;

/// How much one worker did before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    /// Worker index within the pool.
    pub worker: usize,
    /// Requests handled.
    pub processed: u64,
}

/// A running set of responders.
pub struct ResponderPool {
    workers: Vec<JoinHandle<ServerResult<WorkerReport>>>,
    shutdown: ShutdownHandle,
    server_id: String,
}

impl std::fmt::Debug for ResponderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderPool")
            .field("workers", &self.workers.len())
            .field("server_id", &self.server_id)
            .finish()
    }
}

impl ResponderPool {
    /// Subscribes `config.workers` workers and starts them.
    ///
    /// Fails without starting anything if the configuration is invalid or
    /// a subscription cannot be created.
    pub async fn start(
        config: ServerConfig,
        transport: Arc<dyn Transport>,
        router: Router,
    ) -> ServerResult<Self> {
        config.validate()?;

        let mut subscriptions = Vec::with_capacity(config.workers);
        for _ in 0..config.workers {
            subscriptions.push(
                transport
                    .queue_subscribe(&config.subject, &config.queue_group)
                    .await?,
            );
        }

        let shutdown = ShutdownHandle::new();
        let responder = Responder::new(Arc::new(router), transport, config.server_id.clone());
        let workers = subscriptions
            .into_iter()
            .enumerate()
            .map(|(worker, subscription)| {
                let responder = responder.clone();
                let shutdown = shutdown.clone();
                let max_wait = config.max_wait;
                tokio::spawn(async move {
                    let processed = responder.serve(subscription, max_wait, shutdown).await?;
                    Ok::<_, ServerError>(WorkerReport { worker, processed })
                })
            })
            .collect();

        info!(
            name = %config.name,
            subject = %config.subject,
            queue = %config.queue_group,
            workers = config.workers,
            server_id = %config.server_id,
            "Responder pool started"
        );

        Ok(Self {
            workers,
            shutdown,
            server_id: config.server_id,
        })
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Returns true if the pool has no workers.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Id stamped on replies.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Handle that stops every worker when triggered.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Stops the workers and collects their reports.
    pub async fn shutdown(self) -> Vec<WorkerReport> {
        self.shutdown.trigger();
        self.join().await
    }

    /// Waits for every worker to stop on its own and collects their reports.
    pub async fn join(self) -> Vec<WorkerReport> {
        let results = join_all(self.workers).await;
        let mut reports = Vec::with_capacity(results.len());
        for (worker, result) in results.into_iter().enumerate() {
            match result {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => warn!(worker, error = %e, "Worker failed"),
                Err(e) => warn!(worker, error = %e, "Worker task panicked or was cancelled"),
            }
        }
        let processed: u64 = reports.iter().map(|r| r.processed).sum();
        info!(workers = reports.len(), processed, "Responder pool stopped");
        reports
    }
}
