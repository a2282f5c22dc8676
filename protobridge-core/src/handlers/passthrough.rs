use async_trait::async_trait;

use crate::engine::Context;
use crate::error::Result;
use crate::model::Call;

use super::CallHandler;

/// Forwards the request body to the backend and the backend's reply back to
/// the caller, both verbatim. Useful for a route whose caller already
/// speaks protobuf, or for smoke-testing a route without touching JSON.
pub struct PassthroughHandler;

#[async_trait]
impl CallHandler for PassthroughHandler {
    async fn read_request(&self, _call: &Call, ctx: &mut Context) -> Result<Vec<u8>> {
        Ok(ctx.body.clone())
    }

    async fn write_response(&self, _call: &Call, ctx: &mut Context, resp: Vec<u8>) -> Result<()> {
        ctx.status = 200;
        ctx.response_body = resp;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Message;
    use std::sync::Arc;

    fn call() -> Call {
        Call {
            server: "localhost:9090".into(),
            handler: "passthrough".into(),
            method: "/test.Svc/Method".into(),
            input: Arc::new(Message::new("In", vec![])),
            output: Arc::new(Message::new("Out", vec![])),
            bindings: vec![],
            timeout_ms: 0,
        }
    }

    #[tokio::test]
    async fn round_trips_bytes_unmodified() {
        let handler = PassthroughHandler;
        let call = call();
        let mut ctx = Context::empty();
        ctx.body = vec![1, 2, 3, 4];

        let req = handler.read_request(&call, &mut ctx).await.unwrap();
        assert_eq!(req, vec![1, 2, 3, 4]);

        handler.write_response(&call, &mut ctx, vec![9, 9]).await.unwrap();
        assert_eq!(ctx.response_body, vec![9, 9]);
        assert_eq!(ctx.status, 200);
    }
}
