//! Responder side of the RPC protocol.
//!
//! This crate provides:
//! - a route table dispatching `(mode, path)` to handlers,
//! - the responder loop that decodes, dispatches and replies,
//! - a pool of competing workers sharing one queue group.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use natsrpc_protocol::ResponseEnvelope;
//! use natsrpc_server::{ResponderPool, Router, ServerConfig};
//! use natsrpc_transport::{MemoryBus, Transport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Router::new().route_fn("GET", "/ping", |_, _| async {
//!         ResponseEnvelope::ok("pong")
//!     })?;
//!     let transport: Arc<dyn Transport> = Arc::new(MemoryBus::default());
//!     let pool = ResponderPool::start(ServerConfig::default(), transport, router).await?;
//!
//!     pool.shutdown_handle().trigger_on_signal();
//!     pool.join().await;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod pool;
mod responder;
mod router;
mod shutdown;

pub use config::{DEFAULT_MAX_WAIT, DEFAULT_QUEUE_GROUP, DEFAULT_SUBJECT, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use pool::{ResponderPool, WorkerReport};
pub use responder::{Outcome, Reply, Responder};
pub use router::{FnHandler, Handler, RouteContext, Router, handler_fn};
pub use shutdown::{ShutdownHandle, ShutdownSignal};
