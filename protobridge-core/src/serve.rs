//! The concrete HTTP ingress loop: a small hyper/tokio accept loop that
//! adapts inbound connections into calls to `Engine::serve_http`.
//!
//! Nothing about routing, transcoding, or the backend connection cache
//! lives here — this module only exists because something has to own a
//! `TcpListener`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::engine::Engine;
use crate::error::{GatewayError, Result};

/// Accept connections on `addr` until the process is killed, dispatching
/// each request through `engine`. One task per connection; tonic-style
/// keep-alive is handled by hyper's HTTP/1.1 connection loop.
pub async fn serve(engine: Arc<Engine>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(GatewayError::Io)?;
    crate::log::debugf(&format!("listening on {addr}"));

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                crate::log::warnf(&format!("accept failed: {err}"));
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let engine = engine.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let engine = engine.clone();
                async move { Ok::<_, Infallible>(dispatch(&engine, req).await) }
            });
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                crate::log::warnf(&format!("connection from {peer} failed: {err}"));
            }
        });
    }
}

async fn dispatch(
    engine: &Engine,
    req: http::Request<hyper::body::Incoming>,
) -> http::Response<http_body_util::Full<bytes::Bytes>> {
    match engine.serve_http(req).await {
        Ok(resp) => resp,
        Err(err) => {
            crate::log::errorf(&format!("unhandled request error: {err}"));
            http::Response::builder()
                .status(http::StatusCode::INTERNAL_SERVER_ERROR)
                .body(http_body_util::Full::new(bytes::Bytes::new()))
                .expect("status is always valid")
        }
    }
}
