use async_trait::async_trait;

use crate::engine::Context;
use crate::error::{GatewayError, Result};
use crate::model::Call;
use crate::wire::{Decoder, Encoder};

use super::CallHandler;

const TAG_PATH: u32 = 1;
const TAG_QUERY: u32 = 2;
const TAG_HEADER: u32 = 3;
const TAG_PARAM: u32 = 4;
const TAG_BODY: u32 = 5;

const TAG_STATUS: u32 = 1;
const TAG_RESP_HEADER: u32 = 2;
const TAG_RESP_BODY: u32 = 3;

/// A handler for backends that want the whole HTTP request, not just a
/// JSON body: it serializes the method's path, raw query string, selected
/// headers, route params, and body into a fixed envelope message, and
/// expects a fixed response message back (`status`, repeated `"k: v"`
/// headers, `body`).
///
/// Unlike `JsonApiHandler`, the wire shape here is private to this adapter
/// — there is no user-supplied schema on either side.
pub struct HttpViewHandler {
    /// Request header names to copy into the envelope; empty means "copy
    /// none" rather than "copy all", keeping the envelope small by default.
    pub forward_headers: Vec<String>,
}

impl HttpViewHandler {
    pub fn new(forward_headers: Vec<String>) -> Self {
        HttpViewHandler { forward_headers }
    }
}

#[async_trait]
impl CallHandler for HttpViewHandler {
    async fn read_request(&self, _call: &Call, ctx: &mut Context) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        enc.emit_string(TAG_PATH, &ctx.path);

        for (k, v) in ctx.query().clone() {
            enc.emit_string(TAG_QUERY, &format!("{k}={v}"));
        }
        for name in &self.forward_headers {
            if let Some(value) = ctx.headers.get(name.as_str()).and_then(|v| v.to_str().ok()) {
                enc.emit_string(TAG_HEADER, &format!("{name}: {value}"));
            }
        }
        for (k, v) in &ctx.params {
            enc.emit_string(TAG_PARAM, &format!("{k}={v}"));
        }
        enc.emit_bytes(TAG_BODY, &ctx.body);

        Ok(enc.into_vec())
    }

    async fn write_response(&self, _call: &Call, ctx: &mut Context, resp: Vec<u8>) -> Result<()> {
        let mut dec = Decoder::new(&resp);
        let mut status = 200u16;
        let mut body = Vec::new();
        let mut headers = Vec::new();

        while let Some((tag, wire)) = dec.read_tag()? {
            match tag {
                TAG_STATUS => {
                    status = dec.read_varint()? as u16;
                }
                TAG_RESP_HEADER => {
                    let raw = dec.read_bytes()?;
                    headers.push(String::from_utf8_lossy(raw).into_owned());
                }
                TAG_RESP_BODY => {
                    body = dec.read_bytes()?.to_vec();
                }
                _ => dec.skip_field(wire)?,
            }
        }

        ctx.status = status;
        for entry in headers {
            let Some((name, value)) = entry.split_once(": ") else {
                continue;
            };
            let header_name = http::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| GatewayError::Other(Box::new(e)))?;
            let header_value = http::HeaderValue::from_str(value).map_err(|e| GatewayError::Other(Box::new(e)))?;
            ctx.response_headers.insert(header_name, header_value);
        }
        ctx.response_body = body;
        Ok(())
    }
}
