//! Shared plumbing for the natsrpc crates: tracing setup and epoch time helpers.

pub mod time;
pub mod tracing;

pub use time::{epoch_millis, from_epoch_millis, millis_from_now};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
