//! Responder configuration.

use std::time::Duration;

use crate::error::{ServerError, ServerResult};

/// Subject requests are published on.
pub const DEFAULT_SUBJECT: &str = "micro-master";

/// Queue group shared by competing responders.
pub const DEFAULT_QUEUE_GROUP: &str = "disp-micro";

/// How long a worker waits for a message before looping back to idle.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(2 * 60 * 60);

/// Responder configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Subject to listen on.
    pub subject: String,

    /// Queue group joined by every worker.
    pub queue_group: String,

    /// Receive wait per iteration.
    pub max_wait: Duration,

    /// Number of workers in the pool.
    pub workers: usize,

    /// Id stamped on replies.
    pub server_id: String,

    /// Display name used in logs.
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            subject: DEFAULT_SUBJECT.to_string(),
            queue_group: DEFAULT_QUEUE_GROUP.to_string(),
            max_wait: DEFAULT_MAX_WAIT,
            workers: 1,
            server_id: uuid::Uuid::new_v4().to_string(),
            name: "D_ISP Responder".to_string(),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration listening on `subject`.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Builder: set the queue group.
    pub fn with_queue_group(mut self, queue_group: impl Into<String>) -> Self {
        self.queue_group = queue_group.into();
        self
    }

    /// Builder: set the receive wait.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Builder: set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Builder: set the server id.
    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = server_id.into();
        self
    }

    /// Builder: set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Checks the configuration before any worker starts.
    pub fn validate(&self) -> ServerResult<()> {
        if self.subject.trim().is_empty() {
            return Err(ServerError::config("subject must not be empty"));
        }
        if self.queue_group.trim().is_empty() {
            return Err(ServerError::config("queue group must not be empty"));
        }
        if self.workers == 0 {
            return Err(ServerError::config("workers must be at least 1"));
        }
        if self.max_wait.is_zero() {
            return Err(ServerError::config("max wait must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.subject, "micro-master");
        assert_eq!(config.queue_group, "disp-micro");
        assert_eq!(config.max_wait, Duration::from_secs(7200));
        assert_eq!(config.workers, 1);
        assert_eq!(config.name, "D_ISP Responder");
        assert!(uuid::Uuid::parse_str(&config.server_id).is_ok());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn server_ids_are_unique() {
        assert_ne!(
            ServerConfig::default().server_id,
            ServerConfig::default().server_id
        );
    }

    #[test]
    fn custom_config() {
        let config = ServerConfig::new("orders")
            .with_queue_group("order-workers")
            .with_max_wait(Duration::from_secs(5))
            .with_workers(4)
            .with_server_id("w-1")
            .with_name("orders");

        assert_eq!(config.subject, "orders");
        assert_eq!(config.queue_group, "order-workers");
        assert_eq!(config.max_wait, Duration::from_secs(5));
        assert_eq!(config.workers, 4);
        assert_eq!(config.server_id, "w-1");
        assert_eq!(config.name, "orders");
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(ServerConfig::new("").validate().is_err());
        assert!(ServerConfig::default().with_queue_group(" ").validate().is_err());
        assert!(ServerConfig::default().with_workers(0).validate().is_err());
        assert!(
            ServerConfig::default()
                .with_max_wait(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
