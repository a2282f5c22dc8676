use base64::Engine;

use crate::engine::Context;
use crate::error::{GatewayError, Result};
use crate::model::{BindSource, Call, Kind};
use crate::wire::Encoder;

/// Append every field binding on `call` to `enc`, after the schema-driven
/// body bytes have already been written.
///
/// A `Params`/`Context` miss is silently skipped (the field is simply
/// absent from the message); a `Query`/`Header` miss binds an empty string,
/// which may or may not parse into the field's kind — an empty numeric
/// binding elides the field the same way a JSON zero would.
pub fn materialize_bindings(call: &Call, ctx: &mut Context, enc: &mut Encoder) -> Result<()> {
    for binding in &call.bindings {
        let raw = match binding.source {
            BindSource::Params => match ctx.param(&binding.name) {
                Some(v) => v.to_string(),
                None => continue,
            },
            BindSource::Context => match ctx.scratch.get(&binding.name) {
                Some(v) => v.clone(),
                None => continue,
            },
            BindSource::Query => ctx.query().get(&binding.name).cloned().unwrap_or_default(),
            BindSource::Header => ctx
                .headers
                .get(binding.name.as_str())
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string(),
        };
        emit_binding_value(enc, binding.tag, binding.kind, &raw)?;
    }
    Ok(())
}

fn bind_err(kind: Kind, raw: &str, e: impl std::fmt::Display) -> GatewayError {
    GatewayError::BindingTypeMismatch(format!("cannot parse {raw:?} as {kind:?}: {e}"))
}

fn emit_binding_value(enc: &mut Encoder, tag: u32, kind: Kind, raw: &str) -> Result<()> {
    if raw.is_empty() && kind != Kind::String && kind != Kind::Bytes {
        // An empty binding never produces a wire value for a scalar kind;
        // this mirrors proto3's "default value is absent" rule.
        return Ok(());
    }
    match kind {
        Kind::String => {
            if !raw.is_empty() {
                enc.emit_string(tag, raw);
            }
        }
        Kind::Bytes => {
            if !raw.is_empty() {
                let data = base64::engine::general_purpose::STANDARD
                    .decode(raw)
                    .map_err(|e| bind_err(kind, raw, e))?;
                enc.emit_bytes(tag, &data);
            }
        }
        Kind::Bool => {
            let v = match raw {
                "true" | "1" => true,
                "false" | "0" => false,
                other => return Err(bind_err(kind, other, "expected true/false")),
            };
            if v {
                enc.emit_varint(tag, 1);
            }
        }
        Kind::Double => {
            let v: f64 = raw.parse().map_err(|e| bind_err(kind, raw, e))?;
            if v != 0.0 {
                enc.emit_fixed64(tag, v.to_bits());
            }
        }
        Kind::Float => {
            let v: f32 = raw.parse().map_err(|e| bind_err(kind, raw, e))?;
            if v != 0.0 {
                enc.emit_fixed32(tag, v.to_bits());
            }
        }
        Kind::Int32 => {
            let v: i32 = raw.parse().map_err(|e| bind_err(kind, raw, e))?;
            if v != 0 {
                enc.emit_varint(tag, (v as i64) as u64);
            }
        }
        Kind::Int64 => {
            let v: i64 = raw.parse().map_err(|e| bind_err(kind, raw, e))?;
            if v != 0 {
                enc.emit_varint(tag, v as u64);
            }
        }
        Kind::Uint32 => {
            let v: u32 = raw.parse().map_err(|e| bind_err(kind, raw, e))?;
            if v != 0 {
                enc.emit_varint(tag, v as u64);
            }
        }
        Kind::Uint64 => {
            let v: u64 = raw.parse().map_err(|e| bind_err(kind, raw, e))?;
            if v != 0 {
                enc.emit_varint(tag, v);
            }
        }
        Kind::Sint32 => {
            let v: i32 = raw.parse().map_err(|e| bind_err(kind, raw, e))?;
            if v != 0 {
                enc.emit_zigzag32(tag, v);
            }
        }
        Kind::Sint64 => {
            let v: i64 = raw.parse().map_err(|e| bind_err(kind, raw, e))?;
            if v != 0 {
                enc.emit_zigzag64(tag, v);
            }
        }
        Kind::Fixed32 => {
            let v: u32 = raw.parse().map_err(|e| bind_err(kind, raw, e))?;
            if v != 0 {
                enc.emit_fixed32(tag, v);
            }
        }
        Kind::Fixed64 => {
            let v: u64 = raw.parse().map_err(|e| bind_err(kind, raw, e))?;
            if v != 0 {
                enc.emit_fixed64(tag, v);
            }
        }
        Kind::Sfixed32 => {
            let v: i32 = raw.parse().map_err(|e| bind_err(kind, raw, e))?;
            if v != 0 {
                enc.emit_fixed32(tag, v as u32);
            }
        }
        Kind::Sfixed64 => {
            let v: i64 = raw.parse().map_err(|e| bind_err(kind, raw, e))?;
            if v != 0 {
                enc.emit_fixed64(tag, v as u64);
            }
        }
        Kind::Message | Kind::Map => {
            return Err(GatewayError::Resolve(format!(
                "field binding targets a non-scalar kind: {kind:?}"
            )));
        }
    }
    Ok(())
}
