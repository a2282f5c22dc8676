use std::collections::HashMap;
use std::sync::Arc;

use http::{HeaderMap, Method};

use crate::error::Result;

use super::middleware::Middleware;
use super::router::GrpcRoute;

/// Per-request state, checked out of a [`super::ContextPool`] at request
/// arrival and returned once the middleware chain (and terminal handler)
/// have run. Nothing here is `Clone` — a `Context` must not be retained
/// past the request it serves.
pub struct Context {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    query_raw: String,
    query_cache: Option<HashMap<String, String>>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// User-settable string scratch map, readable by `BindSource::Context`
    /// field bindings and writable by middleware (e.g. an auth middleware
    /// stashing the caller's identity for a binding to pick up).
    pub scratch: HashMap<String, String>,
    pub status: u16,
    pub response_headers: HeaderMap,
    pub response_body: Vec<u8>,

    route: Option<Arc<GrpcRoute>>,
    chain: Arc<[Arc<dyn Middleware>]>,
    cursor: usize,
}

impl Context {
    pub(crate) fn empty() -> Self {
        Context {
            method: Method::GET,
            path: String::new(),
            params: Vec::new(),
            query_raw: String::new(),
            query_cache: None,
            headers: HeaderMap::new(),
            body: Vec::new(),
            scratch: HashMap::new(),
            status: 200,
            response_headers: HeaderMap::new(),
            response_body: Vec::new(),
            route: None,
            chain: Arc::from(Vec::new().into_boxed_slice()),
            cursor: 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn populate(
        &mut self,
        method: Method,
        path: String,
        query_raw: String,
        params: Vec<(String, String)>,
        headers: HeaderMap,
        body: Vec<u8>,
        route: Arc<GrpcRoute>,
        chain: Arc<[Arc<dyn Middleware>]>,
    ) {
        self.method = method;
        self.path = path;
        self.query_raw = query_raw;
        self.query_cache = None;
        self.params = params;
        self.headers = headers;
        self.body = body;
        self.scratch = HashMap::new();
        self.status = 200;
        self.response_headers = HeaderMap::new();
        self.response_body = Vec::new();
        self.route = Some(route);
        self.chain = chain;
        self.cursor = 0;
    }

    pub(crate) fn reset(&mut self) {
        self.path.clear();
        self.params.clear();
        self.query_raw.clear();
        self.query_cache = None;
        self.headers.clear();
        self.body.clear();
        self.scratch.clear();
        self.status = 200;
        self.response_headers.clear();
        self.response_body.clear();
        self.route = None;
        self.chain = Arc::from(Vec::new().into_boxed_slice());
        self.cursor = 0;
    }

    pub(crate) fn route(&self) -> &Arc<GrpcRoute> {
        self.route.as_ref().expect("Context::route read outside an active request")
    }

    /// The request's query string parameters, parsed (and percent-decoded)
    /// on first access and cached for the rest of the request.
    pub fn query(&mut self) -> &HashMap<String, String> {
        if self.query_cache.is_none() {
            self.query_cache = Some(parse_query(&self.query_raw));
        }
        self.query_cache.as_ref().unwrap()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Advance the middleware cursor. Called by a middleware to continue the
    /// chain, and once internally to dispatch into the terminal handler once
    /// every middleware has run. A middleware that never calls this
    /// short-circuits everything after it.
    pub async fn next(&mut self) -> Result<()> {
        let idx = self.cursor;
        self.cursor += 1;
        if idx < self.chain.len() {
            let mw = self.chain[idx].clone();
            mw.handle(self).await
        } else if idx == self.chain.len() && self.route.is_some() {
            super::engine::invoke_terminal(self).await
        } else {
            Ok(())
        }
    }
}

fn parse_query(raw: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if raw.is_empty() {
        return out;
    }
    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        out.insert(percent_decode(key), percent_decode(value));
    }
    out
}

/// A minimal `application/x-www-form-urlencoded` decoder: `+` becomes a
/// space, `%XX` becomes the decoded byte. Malformed escapes pass through
/// unchanged rather than erroring — query strings are advisory input.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Thread-safe free list of `Context`s: checkout pops-or-allocates, release
/// resets then pushes. Contexts are never shared across tasks while checked
/// out.
pub struct ContextPool {
    free: std::sync::Mutex<Vec<Box<Context>>>,
}

impl ContextPool {
    pub fn new() -> Self {
        ContextPool {
            free: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn checkout(&self) -> Box<Context> {
        self.free
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Box::new(Context::empty()))
    }

    pub fn release(&self, mut ctx: Box<Context>) {
        ctx.reset();
        self.free.lock().unwrap().push(ctx);
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new()
    }
}
