//! `demo`: responders and runner on one in-memory bus.
//!
//! The responders serve a login route, a relation route and a resource
//! route; the runner logs in, registers its identity and reads the claims
//! of the relation it got back.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::debug;

use natsrpc_protocol::{LOGIN_PATH, RELATION_REGISTER_PATH, RequestEnvelope, ResponseEnvelope};
use natsrpc_server::{ResponderPool, RouteContext, Router};
use natsrpc_transport::{MemoryBus, Transport};

use crate::auth::{AuthBroker, Credentials, LoginRequest};
use crate::cli::DemoArgs;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::query::ResourceQuery;
use crate::rpc::RpcClient;
use crate::secret;
use crate::session::Session;

/// Domain queried by the runner.
pub const DEMO_DOMAIN: &str = "tester18";

/// Entity queried by the runner.
pub const DEMO_ENTITY: &str = "clients";

/// Resource route served by the demo responders.
pub const RESOURCE_ROUTE: &str = "/{domain}/{entity}/{token}/{aspect}";

const PREVIEW_CHARS: usize = 256;

/// Routes of the demo responders.
///
/// With `large_resource` the resource route answers with more than
/// `max_payload` bytes, so callers go through the chunked path.
pub fn demo_router(large_resource: bool, max_payload: usize) -> ClientResult<Router> {
    let annotations = if large_resource {
        max_payload / 16 + 1
    } else {
        3
    };

    let mut router = Router::new()
        .route_fn("POST", LOGIN_PATH, |_, req| async move { login(req) })?
        .route_fn("POST", RELATION_REGISTER_PATH, |_, req| async move {
            register(req)
        })?;

    for mode in ["GET", "POST"] {
        router = router.route_fn(mode, RESOURCE_ROUTE, move |ctx, req| async move {
            resource(ctx, req, annotations)
        })?;
    }
    Ok(router)
}

fn login(req: RequestEnvelope) -> ResponseEnvelope {
    let login: LoginRequest = match req.body_json() {
        Ok(login) => login,
        Err(e) => return ResponseEnvelope::bad_request(e.to_string()),
    };
    if login.username.is_empty() || login.password.is_empty() {
        return ResponseEnvelope::unauthorized("requestor and passcode required");
    }
    let token = format!("tk-{}-{}", login.username, login.expires);
    ResponseEnvelope::json(&json!({ "token": token }))
        .unwrap_or_else(|e| ResponseEnvelope::internal(e.to_string()))
}

fn register(req: RequestEnvelope) -> ResponseEnvelope {
    if req.header.authorization.is_empty() {
        return ResponseEnvelope::unauthorized("missing token");
    }
    match req.header.flags.identity() {
        Some(identity) if !identity.is_empty() => {
            ResponseEnvelope::ok(format!("rd-{}", identity)).created()
        }
        _ => ResponseEnvelope::bad_request("missing identity"),
    }
}

fn resource(ctx: RouteContext, req: RequestEnvelope, annotations: usize) -> ResponseEnvelope {
    if req.header.authorization.is_empty() {
        return ResponseEnvelope::unauthorized("missing token");
    }
    let rdid = ctx.param("token").unwrap_or_default();
    let value = json!({
        "domain": ctx.param("domain"),
        "entity": ctx.param("entity"),
        "rdid": rdid,
        "aspect": ctx.param("aspect"),
        "key": req.header.flags.get("k"),
        "body_size": req.body.len(),
        "annotations": (0..annotations).map(|i| format!("annotation-{:06}", i)).collect::<Vec<_>>(),
    });
    match ResponseEnvelope::json(&value) {
        Ok(response) => response.with_path(req.header.path.clone()).with_doc(rdid, "1"),
        Err(e) => ResponseEnvelope::internal(e.to_string()),
    }
}

/// Runs the demo.
pub async fn run(config: &ClientConfig, args: DemoArgs) -> ClientResult<()> {
    let mut server_config = config.server_config();
    if let Some(workers) = args.workers {
        server_config = server_config.with_workers(workers);
    }

    let bus = MemoryBus::new(config.bus_config());
    let transport: Arc<dyn Transport> = Arc::new(bus);
    let router = demo_router(args.large, transport.max_payload())?;
    let pool = ResponderPool::start(server_config, transport.clone(), router).await?;

    let result = run_flow(config, &args, transport.clone()).await;

    for report in pool.shutdown().await {
        println!(
            "worker {} handled {} requests",
            report.worker, report.processed
        );
    }
    transport.close().await;
    result
}

async fn run_flow(
    config: &ClientConfig,
    args: &DemoArgs,
    transport: Arc<dyn Transport>,
) -> ClientResult<()> {
    let credentials = match (&args.requestor, &args.passcode) {
        (Some(requestor), Some(passcode)) => {
            Credentials::new(secret::resolve(requestor)?, secret::resolve(passcode)?)
        }
        _ => config
            .credentials()?
            .unwrap_or_else(|| Credentials::new("demo", "demo")),
    };
    let identity = args
        .identity
        .clone()
        .or_else(|| config.auth.identity.clone())
        .unwrap_or_else(|| "demo-service".to_string());
    let body = match &args.data_file {
        Some(path) => std::fs::read(path)?,
        None => b"{}".to_vec(),
    };
    debug!(username = %credentials.username, identity = %identity, body = body.len(), "Starting runner");

    let rpc = RpcClient::new(transport)
        .with_subject(config.client.subject.clone())
        .with_timeout(config.request_timeout());
    let broker = AuthBroker::new(rpc.clone()).with_token_ttl(config.token_ttl());
    let mut session = Session::new();

    let start = Instant::now();
    let token = broker
        .login(&mut session, &credentials, config.auth.expires)
        .await?;
    println!("token '{}' ({:?})", token.value(), start.elapsed());

    let start = Instant::now();
    match broker
        .register_relation(&mut session, &identity, body.clone())
        .await
    {
        Ok(rdid) => println!("RDID status 200 RDID {} ({:?})", rdid, start.elapsed()),
        Err(ClientError::Application { status, message }) => {
            println!("RDID status {} error \"{}\"", status, message)
        }
        Err(e) => return Err(e),
    }

    let rdid = session.rdid().unwrap_or_default().to_string();
    let request = ResourceQuery::claims(DEMO_DOMAIN, DEMO_ENTITY, rdid)
        .with_entity_access("public")
        .with_header(true)
        .with_key("annotations")
        .with_timestamp("latest")
        .request(&args.mode, &session, body);

    let start = Instant::now();
    let response = rpc.send(&request).await?;
    if response.is_success() {
        println!(
            "Received  [{}] : {}",
            request.header.path,
            preview(&response.response)
        );
    } else {
        println!(
            "Received  [{}] : error_str '{}' {}",
            request.header.path,
            response.error_message().unwrap_or_default(),
            response.response
        );
    }
    println!("Received response, elapsed {:?}", start.elapsed());
    Ok(())
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{}... ({} bytes)", head, text.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use natsrpc_protocol::{Flags, status};

    #[tokio::test]
    async fn login_route_issues_token() {
        let router = demo_router(false, 4096).unwrap();
        let request = RequestEnvelope::post(LOGIN_PATH)
            .with_json_body(&LoginRequest {
                username: "alice".into(),
                password: "pw".into(),
                expires: 999_999_999_999,
            })
            .unwrap();
        let response = router.dispatch(request).await;
        assert!(response.is_success());
        assert_eq!(response.response, r#"{"token":"tk-alice-999999999999"}"#);
    }

    #[tokio::test]
    async fn register_route_requires_token() {
        let router = demo_router(false, 4096).unwrap();
        let request =
            RequestEnvelope::post(RELATION_REGISTER_PATH).with_flags(Flags::relation("svc"));
        let response = router.dispatch(request.clone()).await;
        assert_eq!(response.status(), status::UNAUTHORIZED);

        let response = router.dispatch(request.with_authorization("tk")).await;
        assert_eq!(response.response, "rd-svc");
        assert!(response.header.created);
    }

    #[tokio::test]
    async fn resource_route_size() {
        let request = ResourceQuery::claims(DEMO_DOMAIN, DEMO_ENTITY, "rd-svc")
            .request("GET", &Session::new(), Vec::new())
            .with_authorization("tk");

        let small = demo_router(false, 4096).unwrap().dispatch(request.clone()).await;
        assert!(small.is_success());
        let value: serde_json::Value = small.response_json().unwrap();
        assert_eq!(value["rdid"], "rd-svc");
        assert_eq!(value["aspect"], "claims");
        assert_eq!(value["key"], serde_json::Value::Null);

        let large = demo_router(true, 4096).unwrap().dispatch(request).await;
        assert!(large.response.len() > 4096);
    }

    #[test]
    fn preview_truncates_long_text() {
        assert_eq!(preview("short"), "short");
        let long = "\u{e9}".repeat(300);
        let shown = preview(&long);
        assert!(shown.ends_with("... (600 bytes)"));
    }

    #[tokio::test]
    async fn demo_runs_end_to_end() {
        let mut config = ClientConfig::default();
        config.transport.max_payload = 4096;
        let args = DemoArgs {
            requestor: Some("alice".into()),
            passcode: Some("pw".into()),
            identity: Some("svc".into()),
            data_file: None,
            mode: "GET".into(),
            workers: Some(3),
            large: true,
        };
        run(&config, args).await.unwrap();
    }
}
