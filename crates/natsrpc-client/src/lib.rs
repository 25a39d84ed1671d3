//! natsrpc client library.
//!
//! Sends request envelopes over a [`natsrpc_transport::Transport`] and
//! waits for the reply, following chunk signals for oversized responses.
//! [`AuthBroker`] performs the login and relation registration steps and
//! keeps their results in a caller-owned [`Session`].
//!
//! ```no_run
//! # async fn example(transport: std::sync::Arc<dyn natsrpc_transport::Transport>) -> natsrpc_client::ClientResult<()> {
//! use natsrpc_client::{AuthBroker, Credentials, ResourceQuery, RpcClient, Session};
//!
//! let rpc = RpcClient::new(transport);
//! let broker = AuthBroker::new(rpc.clone());
//! let mut session = Session::new();
//!
//! broker.login(&mut session, &Credentials::new("alice", "pw"), None).await?;
//! let rdid = broker.register_relation(&mut session, "device-7", Vec::new()).await?;
//!
//! let request = ResourceQuery::claims("tester18", "clients", rdid).request("GET", &session, Vec::new());
//! let response = rpc.send(&request).await?;
//! println!("{}", response.response);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod query;
pub mod rpc;
pub mod secret;
pub mod session;

pub use auth::{AuthBroker, Credentials};
pub use cli::Cli;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use query::ResourceQuery;
pub use rpc::RpcClient;
pub use session::{Session, Token};
