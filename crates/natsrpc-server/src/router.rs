//! Route table mapping `(mode, path)` to handlers.
//!
//! Exact routes are looked up first. Routes containing `{name}` placeholders
//! are then tried in registration order; each placeholder matches one path
//! segment and is handed to the handler through [`RouteContext`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, trace};

use natsrpc_protocol::{RequestEnvelope, ResponseEnvelope};

use crate::error::{ServerError, ServerResult};

/// Placeholder syntax in route paths.
static PARAM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid placeholder regex")
});

/// What the router knows about a matched request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteContext {
    /// Route the request matched, as registered.
    pub route: String,
    /// Placeholder values captured from the path.
    pub params: HashMap<String, String>,
}

impl RouteContext {
    /// Returns the captured value of placeholder `name`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Application logic behind a route.
///
/// Handlers must be deterministic for identical requests: chunked
/// responses are served by running the handler again for every chunk.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Produces the response for `request`.
    async fn handle(&self, ctx: RouteContext, request: RequestEnvelope) -> ResponseEnvelope;
}

/// [`Handler`] backed by an async closure.
pub struct FnHandler<F>(F);

/// Wraps an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(RouteContext, RequestEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = ResponseEnvelope> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(RouteContext, RequestEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = ResponseEnvelope> + Send,
{
    async fn handle(&self, ctx: RouteContext, request: RequestEnvelope) -> ResponseEnvelope {
        (self.0)(ctx, request).await
    }
}

struct PatternRoute {
    mode: String,
    route: String,
    regex: Regex,
    names: Vec<String>,
    handler: Arc<dyn Handler>,
}

/// Dispatch table.
#[derive(Default)]
pub struct Router {
    exact: HashMap<(String, String), Arc<dyn Handler>>,
    patterns: Vec<PatternRoute>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let patterns: Vec<_> = self
            .patterns
            .iter()
            .map(|p| format!("{} {}", p.mode, p.route))
            .collect();
        f.debug_struct("Router")
            .field("exact", &self.exact.keys().collect::<Vec<_>>())
            .field("patterns", &patterns)
            .finish()
    }
}

impl Router {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `mode` and `path`.
    ///
    /// `mode` is matched case-insensitively. Registering the same exact
    /// route twice replaces the first handler.
    pub fn route(
        mut self,
        mode: &str,
        path: &str,
        handler: impl Handler + 'static,
    ) -> ServerResult<Self> {
        let mode = normalize_mode(mode);
        if mode.is_empty() {
            return Err(ServerError::route(path, "mode must not be empty"));
        }
        if path.is_empty() {
            return Err(ServerError::route(path, "path must not be empty"));
        }

        let handler: Arc<dyn Handler> = Arc::new(handler);
        if !PARAM_REGEX.is_match(path) {
            debug!(mode = %mode, path, "Registered route");
            self.exact.insert((mode, path.to_string()), handler);
            return Ok(self);
        }

        let (regex, names) = compile_pattern(path)?;
        debug!(mode = %mode, path, params = ?names, "Registered pattern route");
        self.patterns.push(PatternRoute {
            mode,
            route: path.to_string(),
            regex,
            names,
            handler,
        });
        Ok(self)
    }

    /// Registers an async closure for `mode` and `path`.
    pub fn route_fn<F, Fut>(self, mode: &str, path: &str, f: F) -> ServerResult<Self>
    where
        F: Fn(RouteContext, RequestEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResponseEnvelope> + Send + 'static,
    {
        self.route(mode, path, handler_fn(f))
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.exact.len() + self.patterns.len()
    }

    /// Returns true if no route is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds the handler for `(mode, path)`.
    pub fn resolve(&self, mode: &str, path: &str) -> Option<(RouteContext, Arc<dyn Handler>)> {
        let mode = normalize_mode(mode);
        if let Some(handler) = self.exact.get(&(mode.clone(), path.to_string())) {
            let ctx = RouteContext {
                route: path.to_string(),
                params: HashMap::new(),
            };
            return Some((ctx, handler.clone()));
        }

        self.patterns
            .iter()
            .filter(|p| p.mode == mode)
            .find_map(|p| {
                let captures = p.regex.captures(path)?;
                let params = p
                    .names
                    .iter()
                    .filter_map(|name| {
                        captures
                            .name(name)
                            .map(|m| (name.clone(), m.as_str().to_string()))
                    })
                    .collect();
                let ctx = RouteContext {
                    route: p.route.clone(),
                    params,
                };
                Some((ctx, p.handler.clone()))
            })
    }

    /// Runs the handler for `request`, or returns a 404 when nothing matches.
    pub async fn dispatch(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let (mode, path) = request.route();
        match self.resolve(mode, path) {
            Some((ctx, handler)) => {
                trace!(mode, path, route = %ctx.route, "Dispatching");
                handler.handle(ctx, request).await
            }
            None => {
                debug!(mode, path, "No route");
                ResponseEnvelope::not_found(mode, path)
            }
        }
    }
}

fn normalize_mode(mode: &str) -> String {
    mode.trim().to_ascii_uppercase()
}

/// Turns `/a/{id}/b` into an anchored regex with one named group per
/// placeholder.
fn compile_pattern(path: &str) -> ServerResult<(Regex, Vec<String>)> {
    let mut source = String::from("^");
    let mut names = Vec::new();
    let mut last = 0;

    for captures in PARAM_REGEX.captures_iter(path) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let name = name.as_str().to_string();
        if names.contains(&name) {
            return Err(ServerError::route(
                path,
                format!("placeholder `{}` appears twice", name),
            ));
        }
        source.push_str(&regex::escape(&path[last..whole.start()]));
        source.push_str(&format!("(?P<{}>[^/]+)", name));
        names.push(name);
        last = whole.end();
    }
    source.push_str(&regex::escape(&path[last..]));
    source.push('$');

    let regex = Regex::new(&source).map_err(|e| ServerError::route(path, e.to_string()))?;
    Ok((regex, names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use natsrpc_protocol::status;

    fn echo_route() -> impl Handler {
        handler_fn(|ctx: RouteContext, req: RequestEnvelope| async move {
            let id = ctx.param("id").unwrap_or("-").to_string();
            ResponseEnvelope::ok(format!("{} {} {}", req.header.mode, ctx.route, id))
        })
    }

    #[tokio::test]
    async fn exact_route_dispatch() {
        let router = Router::new()
            .route_fn("POST", "/api/login", |_, _| async {
                ResponseEnvelope::ok(r#"{"token":"abc123"}"#)
            })
            .unwrap();

        let response = router.dispatch(RequestEnvelope::post("/api/login")).await;
        assert!(response.is_success());
        assert_eq!(response.response, r#"{"token":"abc123"}"#);
    }

    #[tokio::test]
    async fn mode_is_case_insensitive() {
        let router = Router::new().route("post", "/x", echo_route()).unwrap();
        let response = router.dispatch(RequestEnvelope::new("Post", "/x")).await;
        assert_eq!(response.response, "Post /x -");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let router = Router::new().route("GET", "/x", echo_route()).unwrap();

        let response = router.dispatch(RequestEnvelope::post("/x")).await;
        assert_eq!(response.status(), status::NOT_FOUND);
        assert_eq!(response.error_message(), Some("no route for POST /x"));

        let response = router.dispatch(RequestEnvelope::get("/y")).await;
        assert_eq!(response.status(), status::NOT_FOUND);
    }

    #[tokio::test]
    async fn pattern_route_captures_params() {
        let router = Router::new()
            .route("GET", "/domain/entity/{id}/claims", echo_route())
            .unwrap();

        let response = router
            .dispatch(RequestEnvelope::get("/domain/entity/abc123/claims"))
            .await;
        assert_eq!(response.response, "GET /domain/entity/{id}/claims abc123");

        let response = router
            .dispatch(RequestEnvelope::get("/domain/entity/a/b/claims"))
            .await;
        assert_eq!(response.status(), status::NOT_FOUND);
    }

    #[tokio::test]
    async fn exact_route_wins_over_pattern() {
        let router = Router::new()
            .route("GET", "/items/{id}", echo_route())
            .unwrap()
            .route_fn("GET", "/items/latest", |_, _| async {
                ResponseEnvelope::ok("latest")
            })
            .unwrap();

        let latest = router.dispatch(RequestEnvelope::get("/items/latest")).await;
        assert_eq!(latest.response, "latest");
        let other = router.dispatch(RequestEnvelope::get("/items/7")).await;
        assert_eq!(other.response, "GET /items/{id} 7");
    }

    #[tokio::test]
    async fn patterns_match_in_registration_order() {
        let router = Router::new()
            .route_fn("GET", "/a/{x}", |_, _| async { ResponseEnvelope::ok("first") })
            .unwrap()
            .route_fn("GET", "/a/{y}", |_, _| async { ResponseEnvelope::ok("second") })
            .unwrap();
        let response = router.dispatch(RequestEnvelope::get("/a/1")).await;
        assert_eq!(response.response, "first");
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn literal_parts_are_escaped() {
        let router = Router::new().route("GET", "/v1.0/{id}", echo_route()).unwrap();
        assert!(router.resolve("GET", "/v1.0/7").is_some());
        assert!(router.resolve("GET", "/v1x0/7").is_none());
    }

    #[test]
    fn invalid_routes_are_rejected() {
        assert!(matches!(
            Router::new().route("GET", "/a/{id}/{id}", echo_route()),
            Err(ServerError::Route { .. })
        ));
        assert!(Router::new().route("", "/a", echo_route()).is_err());
        assert!(Router::new().route("GET", "", echo_route()).is_err());
    }
}
