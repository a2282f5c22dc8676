use async_trait::async_trait;

use crate::engine::Context;
use crate::error::Result;
use crate::json::{JsonBuilder, Tokenizer};
use crate::model::Call;
use crate::transcode::{transcode_json_to_proto, transcode_proto_to_json};
use crate::wire::{Decoder, Encoder};

use super::bindings::materialize_bindings;
use super::CallHandler;

/// Transcodes a JSON request body into the call's input message, appends
/// any field bindings, and transcodes the reply back into JSON.
///
/// `prefix`/`suffix` let a route wrap the transcoded object in a fixed
/// envelope (e.g. `{"data": ... }`) without the transcoder itself knowing
/// about it.
pub struct JsonApiHandler {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

impl JsonApiHandler {
    pub fn new() -> Self {
        JsonApiHandler { prefix: None, suffix: None }
    }

    pub fn wrapped(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        JsonApiHandler {
            prefix: Some(prefix.into()),
            suffix: Some(suffix.into()),
        }
    }
}

impl Default for JsonApiHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallHandler for JsonApiHandler {
    async fn read_request(&self, call: &Call, ctx: &mut Context) -> Result<Vec<u8>> {
        let mut tokenizer = Tokenizer::new(&ctx.body);
        let mut enc = Encoder::new();
        transcode_json_to_proto(&call.input, &mut tokenizer, &mut enc)?;
        materialize_bindings(call, ctx, &mut enc)?;
        Ok(enc.into_vec())
    }

    async fn write_response(&self, call: &Call, ctx: &mut Context, resp: Vec<u8>) -> Result<()> {
        let mut dec = Decoder::new(&resp);
        let mut out = JsonBuilder::new();
        if let Some(prefix) = &self.prefix {
            out.append_str(prefix);
        }
        transcode_proto_to_json(&call.output, &mut dec, &mut out)?;
        if let Some(suffix) = &self.suffix {
            out.append_str(suffix);
        }
        ctx.status = 200;
        ctx.response_headers
            .insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
        ctx.response_body = out.into_string().into_bytes();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Field, Kind, Message, Omit};
    use std::sync::Arc;

    fn scalar(name: &str, tag: u32, kind: Kind) -> Field {
        Field {
            name: name.into(),
            alias: None,
            tag,
            kind,
            repeated: false,
            omit: Omit::OmitProtoEmpty,
            message: None,
        }
    }

    fn call() -> Call {
        Call {
            server: "localhost:9090".into(),
            handler: "json".into(),
            method: "/test.Svc/Echo".into(),
            input: Arc::new(Message::new("In", vec![scalar("name", 1, Kind::String)])),
            output: Arc::new(Message::new("Out", vec![scalar("name", 1, Kind::String)])),
            bindings: vec![],
            timeout_ms: 0,
        }
    }

    #[tokio::test]
    async fn request_json_transcodes_to_proto_bytes() {
        let handler = JsonApiHandler::new();
        let call = call();
        let mut ctx = Context::empty();
        ctx.body = br#"{"name":"ada"}"#.to_vec();

        let bytes = handler.read_request(&call, &mut ctx).await.unwrap();
        let mut dec = Decoder::new(&bytes);
        let (tag, _) = dec.read_tag().unwrap().unwrap();
        assert_eq!(tag, 1);
        assert_eq!(dec.read_bytes().unwrap(), b"ada");
    }

    #[tokio::test]
    async fn response_proto_transcodes_to_json_body() {
        let handler = JsonApiHandler::new();
        let call = call();
        let mut ctx = Context::empty();

        let mut enc = Encoder::new();
        enc.emit_string(1, "ada");
        handler.write_response(&call, &mut ctx, enc.into_vec()).await.unwrap();

        assert_eq!(ctx.status, 200);
        assert_eq!(String::from_utf8(ctx.response_body).unwrap(), r#"{"name":"ada"}"#);
        assert_eq!(ctx.response_headers.get(http::header::CONTENT_TYPE).unwrap(), "application/json");
    }

    #[tokio::test]
    async fn wrapped_response_applies_prefix_and_suffix() {
        let handler = JsonApiHandler::wrapped(r#"{"result":"#, "}");
        let call = call();
        let mut ctx = Context::empty();

        let mut enc = Encoder::new();
        enc.emit_string(1, "ada");
        handler.write_response(&call, &mut ctx, enc.into_vec()).await.unwrap();

        assert_eq!(String::from_utf8(ctx.response_body).unwrap(), r#"{"result":{"name":"ada"}}"#);
    }
}
