use super::is_packable;
use crate::error::{GatewayError, Result};
use crate::json::{unescape, Token, TokenKind, Tokenizer};
use crate::model::{Field, Kind, Message};
use crate::wire::Encoder;
use base64::Engine;

/// Transcode one JSON object, conforming to `schema`, into protobuf wire
/// bytes written onto `enc`. `tokenizer` must be positioned before the
/// opening `{`.
pub fn transcode_json_to_proto(
    schema: &Message,
    tokenizer: &mut Tokenizer,
    enc: &mut Encoder,
) -> Result<()> {
    let open = tokenizer.next_significant()?;
    if open.kind != TokenKind::Object {
        return Err(GatewayError::UnexpectedToken(
            "expected '{' to start a message value".into(),
        ));
    }
    transcode_object_body(schema, tokenizer, enc)
}

fn transcode_object_body(schema: &Message, tokenizer: &mut Tokenizer, enc: &mut Encoder) -> Result<()> {
    loop {
        let key_tok = tokenizer.next_significant()?;
        if key_tok.kind == TokenKind::ObjectClose {
            return Ok(());
        }
        if key_tok.kind != TokenKind::String {
            return Err(GatewayError::UnexpectedToken(format!(
                "expected a string key, got {:?}",
                key_tok.kind
            )));
        }
        let key = unescape(key_tok.slice)?;
        let lead = tokenizer.next_significant()?;

        match schema.field_by_name(&key) {
            None => tokenizer.skip_value(lead)?,
            Some(field) => transcode_field(field, lead, tokenizer, enc)?,
        }
    }
}

fn transcode_field(field: &Field, lead: Token, tokenizer: &mut Tokenizer, enc: &mut Encoder) -> Result<()> {
    if field.repeated {
        return transcode_repeated_field(field, lead, tokenizer, enc);
    }
    match (lead.kind, field.kind) {
        (TokenKind::Null, _) => Ok(()),
        (TokenKind::String, Kind::String) => {
            let s = unescape(lead.slice)?;
            emit_string_scalar(enc, field.tag, &s);
            Ok(())
        }
        (TokenKind::String, Kind::Bytes) => {
            let s = unescape(lead.slice)?;
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(s.as_bytes())
                .map_err(|e| GatewayError::TypeMismatch(format!("invalid base64: {e}")))?;
            if !decoded.is_empty() {
                enc.emit_bytes(field.tag, &decoded);
            }
            Ok(())
        }
        (TokenKind::Number, kind) if kind.is_numeric() => {
            emit_numeric_scalar(enc, field.tag, kind, lead.slice)
        }
        (TokenKind::Bool, Kind::Bool) => {
            if lead.slice == b"true" {
                enc.emit_varint(field.tag, 1);
            }
            Ok(())
        }
        (TokenKind::Object, Kind::Message) => {
            let msg = field
                .message
                .as_ref()
                .ok_or_else(|| GatewayError::Resolve(format!("field {} missing message ref", field.name)))?;
            let mut scratch = Encoder::new();
            transcode_object_body(msg, tokenizer, &mut scratch)?;
            if !scratch.is_empty() {
                enc.emit_bytes(field.tag, scratch.bytes());
            }
            Ok(())
        }
        (TokenKind::Object, Kind::Map) => transcode_map_field(field, tokenizer, enc),
        _ => Err(GatewayError::TypeMismatch(format!(
            "field {} (kind {:?}) cannot accept a {:?} value",
            field.name, field.kind, lead.kind
        ))),
    }
}

fn transcode_repeated_field(field: &Field, lead: Token, tokenizer: &mut Tokenizer, enc: &mut Encoder) -> Result<()> {
    if lead.kind != TokenKind::Array {
        return Err(GatewayError::TypeMismatch(format!(
            "field {} is repeated, expected an array",
            field.name
        )));
    }

    if is_packable(field.kind) {
        let mut packed = Encoder::new();
        loop {
            let tok = tokenizer.next_significant()?;
            if tok.kind == TokenKind::ArrayClose {
                break;
            }
            write_packed_element(&mut packed, field.kind, tok)?;
        }
        if !packed.is_empty() {
            enc.emit_bytes(field.tag, packed.bytes());
        }
        return Ok(());
    }

    // Unpacked: String, Bytes, Message each get their own tagged record.
    loop {
        let tok = tokenizer.next_significant()?;
        if tok.kind == TokenKind::ArrayClose {
            break;
        }
        match (tok.kind, field.kind) {
            (TokenKind::Null, Kind::Message) => {
                // null elements in a repeated Message array emit an empty message.
                enc.emit_bytes(field.tag, &[]);
            }
            (TokenKind::Null, _) => {
                // No specified meaning for null String/Bytes elements; skip.
            }
            (TokenKind::String, Kind::String) => {
                let s = unescape(tok.slice)?;
                if !s.is_empty() {
                    enc.emit_string(field.tag, &s);
                }
            }
            (TokenKind::String, Kind::Bytes) => {
                let s = unescape(tok.slice)?;
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(s.as_bytes())
                    .map_err(|e| GatewayError::TypeMismatch(format!("invalid base64: {e}")))?;
                if !decoded.is_empty() {
                    enc.emit_bytes(field.tag, &decoded);
                }
            }
            (TokenKind::Object, Kind::Message) => {
                let msg = field.message.as_ref().ok_or_else(|| {
                    GatewayError::Resolve(format!("field {} missing message ref", field.name))
                })?;
                let mut scratch = Encoder::new();
                transcode_object_body(msg, tokenizer, &mut scratch)?;
                enc.emit_bytes(field.tag, scratch.bytes());
            }
            _ => {
                return Err(GatewayError::TypeMismatch(format!(
                    "repeated field {} element kind mismatch",
                    field.name
                )))
            }
        }
    }
    Ok(())
}

fn write_packed_element(buf: &mut Encoder, kind: Kind, tok: Token) -> Result<()> {
    match kind {
        Kind::Bool => {
            if tok.kind != TokenKind::Bool {
                return Err(GatewayError::TypeMismatch("expected bool array element".into()));
            }
            buf.write_varint(if tok.slice == b"true" { 1 } else { 0 });
            Ok(())
        }
        kind if kind.is_numeric() => {
            if tok.kind != TokenKind::Number {
                return Err(GatewayError::TypeMismatch("expected numeric array element".into()));
            }
            write_packed_numeric(buf, kind, tok.slice)
        }
        _ => unreachable!("write_packed_element called with non-packable kind"),
    }
}

fn parse_str(slice: &[u8]) -> Result<&str> {
    std::str::from_utf8(slice).map_err(|e| GatewayError::TypeMismatch(e.to_string()))
}

fn num_err(kind: Kind, e: impl std::fmt::Display) -> GatewayError {
    GatewayError::TypeMismatch(format!("invalid {kind:?} literal: {e}"))
}

/// Parse `raw` per `kind` and emit it at `tag`, eliding the zero value
/// regardless of kind (§4.3).
fn emit_numeric_scalar(enc: &mut Encoder, tag: u32, kind: Kind, raw: &[u8]) -> Result<()> {
    let s = parse_str(raw)?;
    match kind {
        Kind::Double => {
            let v: f64 = s.parse().map_err(|e| num_err(kind, e))?;
            if v != 0.0 {
                enc.emit_fixed64(tag, v.to_bits());
            }
        }
        Kind::Float => {
            let v: f32 = s.parse().map_err(|e| num_err(kind, e))?;
            if v != 0.0 {
                enc.emit_fixed32(tag, v.to_bits());
            }
        }
        Kind::Int32 => {
            let v: i32 = s.parse().map_err(|e| num_err(kind, e))?;
            if v != 0 {
                enc.emit_varint(tag, (v as i64) as u64);
            }
        }
        Kind::Int64 => {
            let v: i64 = s.parse().map_err(|e| num_err(kind, e))?;
            if v != 0 {
                enc.emit_varint(tag, v as u64);
            }
        }
        Kind::Uint32 => {
            let v: u32 = s.parse().map_err(|e| num_err(kind, e))?;
            if v != 0 {
                enc.emit_varint(tag, v as u64);
            }
        }
        Kind::Uint64 => {
            let v: u64 = s.parse().map_err(|e| num_err(kind, e))?;
            if v != 0 {
                enc.emit_varint(tag, v);
            }
        }
        Kind::Sint32 => {
            let v: i32 = s.parse().map_err(|e| num_err(kind, e))?;
            if v != 0 {
                enc.emit_zigzag32(tag, v);
            }
        }
        Kind::Sint64 => {
            let v: i64 = s.parse().map_err(|e| num_err(kind, e))?;
            if v != 0 {
                enc.emit_zigzag64(tag, v);
            }
        }
        Kind::Fixed32 => {
            let v: u32 = s.parse().map_err(|e| num_err(kind, e))?;
            if v != 0 {
                enc.emit_fixed32(tag, v);
            }
        }
        Kind::Fixed64 => {
            let v: u64 = s.parse().map_err(|e| num_err(kind, e))?;
            if v != 0 {
                enc.emit_fixed64(tag, v);
            }
        }
        Kind::Sfixed32 => {
            let v: i32 = s.parse().map_err(|e| num_err(kind, e))?;
            if v != 0 {
                enc.emit_fixed32(tag, v as u32);
            }
        }
        Kind::Sfixed64 => {
            let v: i64 = s.parse().map_err(|e| num_err(kind, e))?;
            if v != 0 {
                enc.emit_fixed64(tag, v as u64);
            }
        }
        _ => unreachable!("emit_numeric_scalar called with non-numeric kind"),
    }
    Ok(())
}

/// Write one packed array element. Unlike the scalar path, every value is
/// written — zero elision only applies to "the whole payload is empty".
fn write_packed_numeric(buf: &mut Encoder, kind: Kind, raw: &[u8]) -> Result<()> {
    let s = parse_str(raw)?;
    match kind {
        Kind::Double => buf.write_fixed64(s.parse::<f64>().map_err(|e| num_err(kind, e))?.to_bits()),
        Kind::Float => buf.write_fixed32(s.parse::<f32>().map_err(|e| num_err(kind, e))?.to_bits()),
        Kind::Int32 => buf.write_varint((s.parse::<i32>().map_err(|e| num_err(kind, e))? as i64) as u64),
        Kind::Int64 => buf.write_varint(s.parse::<i64>().map_err(|e| num_err(kind, e))? as u64),
        Kind::Uint32 => buf.write_varint(s.parse::<u32>().map_err(|e| num_err(kind, e))? as u64),
        Kind::Uint64 => buf.write_varint(s.parse::<u64>().map_err(|e| num_err(kind, e))?),
        Kind::Sint32 => buf.write_zigzag32(s.parse::<i32>().map_err(|e| num_err(kind, e))?),
        Kind::Sint64 => buf.write_zigzag64(s.parse::<i64>().map_err(|e| num_err(kind, e))?),
        Kind::Fixed32 => buf.write_fixed32(s.parse::<u32>().map_err(|e| num_err(kind, e))?),
        Kind::Fixed64 => buf.write_fixed64(s.parse::<u64>().map_err(|e| num_err(kind, e))?),
        Kind::Sfixed32 => buf.write_fixed32(s.parse::<i32>().map_err(|e| num_err(kind, e))? as u32),
        Kind::Sfixed64 => buf.write_fixed64(s.parse::<i64>().map_err(|e| num_err(kind, e))? as u64),
        _ => unreachable!("write_packed_numeric called with non-numeric kind"),
    }
    Ok(())
}

fn emit_string_scalar(enc: &mut Encoder, tag: u32, s: &str) {
    if !s.is_empty() {
        enc.emit_string(tag, s);
    }
}

/// Transcode a JSON object as a proto map field: each `"k": v` pair becomes
/// one length-delimited entry at `field.tag`, encoded as the map entry's own
/// two-field schema (tag 1 = key, tag 2 = value).
fn transcode_map_field(field: &Field, tokenizer: &mut Tokenizer, enc: &mut Encoder) -> Result<()> {
    let entry_msg = field
        .message
        .as_ref()
        .ok_or_else(|| GatewayError::Resolve(format!("map field {} missing entry schema", field.name)))?;
    let key_field = entry_msg
        .field_by_tag(1)
        .ok_or_else(|| GatewayError::Resolve("map entry missing key field".into()))?;
    let value_field = entry_msg
        .field_by_tag(2)
        .ok_or_else(|| GatewayError::Resolve("map entry missing value field".into()))?;

    loop {
        let key_tok = tokenizer.next_significant()?;
        if key_tok.kind == TokenKind::ObjectClose {
            return Ok(());
        }
        if key_tok.kind != TokenKind::String {
            return Err(GatewayError::UnexpectedToken("expected a map key string".into()));
        }
        let key_str = unescape(key_tok.slice)?;
        let value_lead = tokenizer.next_significant()?;

        let mut entry = Encoder::new();
        if key_field.kind == Kind::String {
            emit_string_scalar(&mut entry, 1, &key_str);
        } else {
            emit_numeric_scalar(&mut entry, 1, key_field.kind, key_str.as_bytes())?;
        }
        transcode_field(value_field, value_lead, tokenizer, &mut entry)?;

        if !entry.is_empty() {
            enc.emit_bytes(field.tag, entry.bytes());
        }
    }
}
