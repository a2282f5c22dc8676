use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::Full;
use tonic::transport::Channel;

use crate::codec::PassthroughCodec;
use crate::connection::Dialer;
use crate::error::{GatewayError, Result};
use crate::handlers::CallHandler;
use crate::model::Route;

use super::context::{Context, ContextPool};
use super::middleware::Middleware;
use super::router::{GrpcRoute, Lookup, Trie};

/// Engine-wide policy, independent of any one backend connection.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Bound on an inbound request body, in bytes. Negative means unbounded.
    pub max_body_size: i64,
    /// Fallback per-call deadline when a route's `Call::timeout_ms` is zero.
    pub default_timeout_ms: u64,
    /// When a rebuild encounters a bad route (unresolvable handler, dial
    /// failure, trie conflict), skip it instead of failing the whole rebuild.
    pub ignore_errors: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            max_body_size: 4 * 1024 * 1024,
            default_timeout_ms: 0,
            ignore_errors: false,
        }
    }
}

/// Process-wide gateway state: frozen registries, a hot-swappable router,
/// and the backend connection cache. See `crate::engine` module docs for the
/// concurrency discipline each field follows.
pub struct Engine {
    handlers: HashMap<String, Arc<dyn CallHandler>>,
    middlewares: HashMap<String, Arc<dyn Middleware>>,
    global: Vec<Arc<dyn Middleware>>,
    dialer: Arc<dyn Dialer>,
    pool: ContextPool,
    router: ArcSwap<Trie>,
    clients: Mutex<HashMap<String, Channel>>,
    rebuild_lock: tokio::sync::Mutex<()>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(dialer: Arc<dyn Dialer>, options: EngineOptions) -> Self {
        Engine {
            handlers: HashMap::new(),
            middlewares: HashMap::new(),
            global: Vec::new(),
            dialer,
            pool: ContextPool::new(),
            router: ArcSwap::new(Arc::new(Trie::new())),
            clients: Mutex::new(HashMap::new()),
            rebuild_lock: tokio::sync::Mutex::new(()),
            options,
        }
    }

    /// Registries are frozen once serving starts; call these during startup
    /// only.
    pub fn register_handler(&mut self, name: impl Into<String>, handler: Arc<dyn CallHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn register_middleware(&mut self, name: impl Into<String>, middleware: Arc<dyn Middleware>) {
        self.middlewares.insert(name.into(), middleware);
    }

    pub fn add_global_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.global.push(middleware);
    }

    /// Atomically replace the route table. Safe to call concurrently with
    /// live traffic: readers only ever observe the pre- or post-rebuild
    /// trie, never a torn state.
    pub async fn rebuild(&self, routes: Vec<Route>, ignore_errors: bool) -> Result<()> {
        let _guard = self.rebuild_lock.lock().await;

        let old = self.clients.lock().unwrap().clone();
        let mut new_clients: HashMap<String, Channel> = HashMap::new();
        let mut chain_cache: HashMap<String, Arc<[Arc<dyn Middleware>]>> = HashMap::new();
        let mut trie = Trie::new();

        for route in routes {
            match self.register_one(&route, &old, &mut new_clients, &mut chain_cache, &mut trie).await {
                Ok(()) => {}
                Err(err) if ignore_errors => {
                    crate::log::warnf(&format!("skipping route {} {}: {err}", route.http_method, route.path));
                }
                Err(err) => {
                    // Drop channels dialed fresh for this attempt; anything
                    // reused from `old` stays there untouched.
                    return Err(err);
                }
            }
        }

        self.router.store(Arc::new(trie));
        *self.clients.lock().unwrap() = new_clients;
        // `old` drops here; any channel not carried into `new_clients` has
        // no more referents and is closed when its last handle is dropped.
        Ok(())
    }

    async fn register_one(
        &self,
        route: &Route,
        old: &HashMap<String, Channel>,
        new_clients: &mut HashMap<String, Channel>,
        chain_cache: &mut HashMap<String, Arc<[Arc<dyn Middleware>]>>,
        trie: &mut Trie,
    ) -> Result<()> {
        let handler = self
            .handlers
            .get(&route.call.handler)
            .cloned()
            .ok_or_else(|| GatewayError::RouteConflict(format!("unknown handler {:?}", route.call.handler)))?;

        let server = &route.call.server;
        let channel = if let Some(chan) = new_clients.get(server) {
            chan.clone()
        } else if let Some(chan) = old.get(server) {
            new_clients.insert(server.clone(), chan.clone());
            chan.clone()
        } else {
            let dialed = self.dialer.dial(server).await?;
            new_clients.insert(server.clone(), dialed.clone());
            dialed
        };

        let chain_key = route.middleware.join(";");
        let chain = if let Some(chain) = chain_cache.get(&chain_key) {
            chain.clone()
        } else {
            let mut chain = self.global.clone();
            for name in &route.middleware {
                let mw = self
                    .middlewares
                    .get(name)
                    .cloned()
                    .ok_or_else(|| GatewayError::RouteConflict(format!("unknown middleware {name:?}")))?;
                chain.push(mw);
            }
            let chain: Arc<[Arc<dyn Middleware>]> = Arc::from(chain.into_boxed_slice());
            chain_cache.insert(chain_key, chain.clone());
            chain
        };

        let grpc_route = Arc::new(GrpcRoute {
            call: route.call.clone(),
            channel,
            handler,
            chain,
        });

        std::panic::catch_unwind(AssertUnwindSafe(|| trie.insert(&route.http_method, &route.path, grpc_route)))
            .map_err(|_| GatewayError::RouteConflict(format!("conflicting route: {} {}", route.http_method, route.path)))
    }

    /// Remove all routes and drop every backend connection.
    pub async fn clear_router(&self) {
        let _guard = self.rebuild_lock.lock().await;
        self.router.store(Arc::new(Trie::new()));
        self.clients.lock().unwrap().clear();
    }

    /// Drive one HTTP request through the router, middleware chain, and
    /// terminal handler. This is the whole ingress-independent surface: a
    /// test can call it directly without opening a socket.
    pub async fn serve_http<B>(&self, req: http::Request<B>) -> Result<Response<Full<Bytes>>>
    where
        B: http_body_util::BodyExt<Data = Bytes> + Unpin,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_string();
        let query_raw = parts.uri.query().unwrap_or("").to_string();
        let method_str = parts.method.as_str().to_string();

        let (route, params) = match self.router.load().lookup(&method_str, &path) {
            Lookup::Matched { route, params } => (route, params),
            Lookup::TrailingSlashRedirect => {
                return Ok(plain_response(StatusCode::MOVED_PERMANENTLY, format!("{path}/")));
            }
            Lookup::NotFound => {
                return Ok(plain_response(StatusCode::NOT_FOUND, String::new()));
            }
        };

        let body_bytes = crate::ioutil::read_body_bounded(body, self.options.max_body_size).await?;

        let mut ctx = self.pool.checkout();
        let chain = route.chain.clone();
        ctx.populate(parts.method, path, query_raw, params, parts.headers, body_bytes, route, chain);

        let outcome = ctx.next().await;

        let response = match outcome {
            Ok(()) => {
                let status = StatusCode::from_u16(ctx.status).unwrap_or(StatusCode::OK);
                let mut resp = Response::new(Full::new(Bytes::from(std::mem::take(&mut ctx.response_body))));
                *resp.status_mut() = status;
                *resp.headers_mut() = std::mem::take(&mut ctx.response_headers);
                resp
            }
            Err(err) => {
                crate::log::errorf(&format!("request failed: {err}"));
                plain_response(StatusCode::INTERNAL_SERVER_ERROR, String::new())
            }
        };

        self.pool.release(ctx);
        Ok(response)
    }
}

fn plain_response(status: StatusCode, location: String) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    if !location.is_empty() {
        builder = builder.header(http::header::LOCATION, location);
    }
    builder.body(Full::new(Bytes::new())).expect("status and header are always valid")
}

/// Invoked once a request's middleware chain has fully unwound to the
/// terminal position: read the request into proto bytes, call the backend,
/// write the reply back through the handler. Lives here (not on `Context`)
/// because it needs the codec and `tonic` client plumbing this module
/// already imports.
pub(super) async fn invoke_terminal(ctx: &mut Context) -> Result<()> {
    let route = ctx.route().clone();
    let req_bytes = route.handler.read_request(&route.call, ctx).await?;
    let resp_bytes = invoke_grpc(&route, req_bytes).await?;
    route.handler.write_response(&route.call, ctx, resp_bytes).await
}

async fn invoke_grpc(route: &GrpcRoute, req_bytes: Vec<u8>) -> Result<Vec<u8>> {
    let mut client = tonic::client::Grpc::new(route.channel.clone());
    client
        .ready()
        .await
        .map_err(|e| GatewayError::Dial(format!("backend not ready: {e}")))?;

    let path = http::uri::PathAndQuery::try_from(route.call.method.as_str())
        .map_err(|e| GatewayError::Dial(format!("invalid method path {:?}: {e}", route.call.method)))?;

    let request = tonic::Request::new(req_bytes);
    let call = client.unary(request, path, PassthroughCodec);

    let response = if route.call.timeout_ms > 0 {
        tokio::time::timeout(Duration::from_millis(route.call.timeout_ms), call)
            .await
            .map_err(|_| GatewayError::GrpcStatus(tonic::Status::deadline_exceeded("call timed out")))??
    } else {
        call.await?
    };

    Ok(response.into_inner())
}
