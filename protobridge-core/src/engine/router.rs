use std::sync::Arc;

use tonic::transport::Channel;

use crate::handlers::CallHandler;
use crate::model::Call;

use super::middleware::Middleware;

/// Everything a matched request needs to run: the resolved `Call`, the
/// backend connection captured at rebuild time (never looked up again at
/// request time), the handler adapter, and this route's middleware chain.
pub struct GrpcRoute {
    pub call: Arc<Call>,
    pub channel: Channel,
    pub handler: Arc<dyn CallHandler>,
    pub chain: Arc<[Arc<dyn Middleware>]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').collect()
}

/// Route table: exact-path routes resolve through a hash lookup; routes
/// with a `:param` segment fall back to a linear scan, since there are
/// typically only a handful of them per service.
#[derive(Default)]
pub struct Trie {
    exact: std::collections::HashMap<(String, String), Arc<GrpcRoute>>,
    patterns: Vec<(String, Vec<Segment>, Arc<GrpcRoute>)>,
}

pub enum Lookup {
    Matched { route: Arc<GrpcRoute>, params: Vec<(String, String)> },
    TrailingSlashRedirect,
    NotFound,
}

impl Trie {
    pub fn new() -> Self {
        Trie::default()
    }

    /// Register `route` at `method`/`path`. Panics on a conflicting
    /// registration (same method and path, or same method and parameter
    /// shape) — callers resolving a whole descriptor set in one pass should
    /// build into a fresh `Trie` and convert a caught panic into an error.
    pub fn insert(&mut self, method: &str, path: &str, route: Arc<GrpcRoute>) {
        let segs = split(path);
        let has_param = segs.iter().any(|s| s.starts_with(':'));
        if !has_param {
            let key = (method.to_string(), path.to_string());
            if self.exact.contains_key(&key) {
                panic!("duplicate route registered: {method} {path}");
            }
            self.exact.insert(key, route);
            return;
        }

        let pattern: Vec<Segment> = segs
            .iter()
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();

        let conflict = self.patterns.iter().any(|(m, existing, _)| m == method && *existing == pattern);
        if conflict {
            panic!("duplicate route registered: {method} {path}");
        }
        self.patterns.push((method.to_string(), pattern, route));
    }

    fn find(&self, method: &str, path: &str) -> Option<(Arc<GrpcRoute>, Vec<(String, String)>)> {
        let key = (method.to_string(), path.to_string());
        if let Some(route) = self.exact.get(&key) {
            return Some((route.clone(), Vec::new()));
        }

        let segs = split(path);
        for (m, pattern, route) in &self.patterns {
            if m != method || pattern.len() != segs.len() {
                continue;
            }
            let mut params = Vec::new();
            let matched = pattern.iter().zip(segs.iter()).all(|(seg, part)| match seg {
                Segment::Literal(lit) => lit == part,
                Segment::Param(name) => {
                    params.push((name.clone(), part.to_string()));
                    true
                }
            });
            if matched {
                return Some((route.clone(), params));
            }
        }
        None
    }

    /// Resolve a request. A miss that would have matched with a trailing
    /// slash appended reports `TrailingSlashRedirect` instead of `NotFound`
    /// so the caller can reply 301 rather than 404.
    pub fn lookup(&self, method: &str, path: &str) -> Lookup {
        if let Some((route, params)) = self.find(method, path) {
            return Lookup::Matched { route, params };
        }
        if path != "/" && self.find(method, &format!("{path}/")).is_some() {
            return Lookup::TrailingSlashRedirect;
        }
        Lookup::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::PassthroughHandler;
    use crate::model::Message;
    use tonic::transport::Endpoint;

    fn dummy_route() -> Arc<GrpcRoute> {
        Arc::new(GrpcRoute {
            call: Arc::new(Call {
                server: "localhost:9090".into(),
                handler: "passthrough".into(),
                method: "/test.Svc/Method".into(),
                input: Arc::new(Message::new("In", vec![])),
                output: Arc::new(Message::new("Out", vec![])),
                bindings: vec![],
                timeout_ms: 0,
            }),
            channel: Endpoint::from_static("http://localhost:9090").connect_lazy(),
            handler: Arc::new(PassthroughHandler),
            chain: Arc::from(Vec::new().into_boxed_slice()),
        })
    }

    #[tokio::test]
    async fn exact_match_resolves_with_no_params() {
        let mut trie = Trie::new();
        trie.insert("GET", "/hello", dummy_route());
        match trie.lookup("GET", "/hello") {
            Lookup::Matched { params, .. } => assert!(params.is_empty()),
            _ => panic!("expected a match"),
        }
    }

    #[tokio::test]
    async fn param_segment_is_captured() {
        let mut trie = Trie::new();
        trie.insert("GET", "/users/:id", dummy_route());
        match trie.lookup("GET", "/users/42") {
            Lookup::Matched { params, .. } => assert_eq!(params, vec![("id".to_string(), "42".to_string())]),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn missing_route_reports_not_found() {
        let trie = Trie::new();
        assert!(matches!(trie.lookup("GET", "/nope"), Lookup::NotFound));
    }

    #[tokio::test]
    async fn trailing_slash_form_is_detected() {
        let mut trie = Trie::new();
        trie.insert("GET", "/hello/", dummy_route());
        assert!(matches!(trie.lookup("GET", "/hello"), Lookup::TrailingSlashRedirect));
    }

    #[tokio::test]
    #[should_panic(expected = "duplicate route")]
    async fn duplicate_exact_route_panics() {
        let mut trie = Trie::new();
        trie.insert("GET", "/hello", dummy_route());
        trie.insert("GET", "/hello", dummy_route());
    }

    #[tokio::test]
    #[should_panic(expected = "duplicate route")]
    async fn duplicate_pattern_route_panics() {
        let mut trie = Trie::new();
        trie.insert("GET", "/users/:id", dummy_route());
        trie.insert("GET", "/users/:name", dummy_route());
    }

    #[tokio::test]
    async fn different_methods_on_the_same_path_do_not_conflict() {
        let mut trie = Trie::new();
        trie.insert("GET", "/hello", dummy_route());
        trie.insert("POST", "/hello", dummy_route());
        assert!(matches!(trie.lookup("POST", "/hello"), Lookup::Matched { .. }));
    }
}
