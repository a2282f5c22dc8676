//! Adapters between the HTTP-facing `Context` and the proto bytes a backend
//! call actually needs.
//!
//! A route names its handler by a short string (`"json"`, `"passthrough"`,
//! `"httpview"`) resolved against the engine's handler registry at rebuild
//! time; nothing in the routing path switches on handler identity at
//! request time.

mod bindings;
mod httpview;
mod jsonapi;
mod passthrough;

pub use httpview::HttpViewHandler;
pub use jsonapi::JsonApiHandler;
pub use passthrough::PassthroughHandler;

use async_trait::async_trait;

use crate::engine::Context;
use crate::error::Result;
use crate::model::Call;

/// Turns the inbound HTTP request into proto request bytes, and the proto
/// response bytes back into whatever the route promised its caller.
#[async_trait]
pub trait CallHandler: Send + Sync {
    async fn read_request(&self, call: &Call, ctx: &mut Context) -> Result<Vec<u8>>;
    async fn write_response(&self, call: &Call, ctx: &mut Context, resp: Vec<u8>) -> Result<()>;
}
