use super::is_packable;
use crate::error::{GatewayError, Result};
use crate::json::JsonBuilder;
use crate::model::{Field, Kind, Message, Omit};
use crate::wire::{zigzag_decode32, zigzag_decode64, Decoder, WIRE_LENGTH_DELIMITED, WIRE_VARINT};

/// Transcode one protobuf message, conforming to `schema`, out of `dec` and
/// into a JSON object appended to `out`.
pub fn transcode_proto_to_json(schema: &Message, dec: &mut Decoder, out: &mut JsonBuilder) -> Result<()> {
    out.append_byte(b'{');
    let mut emitted = vec![false; schema.fields().len()];
    let mut first = true;

    while let Some((tag, wire)) = dec.read_tag()? {
        let Some(idx) = schema.field_index_by_tag(tag) else {
            dec.skip_field(wire)?;
            continue;
        };
        let field = &schema.fields()[idx];

        // First occurrence wins for scalars. A repeated field's whole run is
        // consumed by write_repeated_value on its first tag, so a second,
        // non-contiguous run of the same tag is consumed and dropped here
        // rather than emitting the key twice.
        if emitted[idx] {
            dec.skip_field(wire)?;
            continue;
        }

        if !first {
            out.append_byte(b',');
        }
        out.append_escaped_str(field.json_name());
        out.append_byte(b':');

        if field.repeated {
            write_repeated_value(field, tag, wire, dec, out, &mut emitted[idx])?;
        } else {
            write_scalar_value(field, wire, dec, out)?;
            emitted[idx] = true;
        }
        first = false;
    }

    for (idx, field) in schema.fields().iter().enumerate() {
        if emitted[idx] || !field.should_emit_default() {
            continue;
        }
        if !first {
            out.append_byte(b',');
        }
        out.append_escaped_str(field.json_name());
        out.append_byte(b':');
        write_default_value(field, out);
        first = false;
    }

    out.append_byte(b'}');
    Ok(())
}

fn check_wire(field: &Field, expected: u8, got: u8) -> Result<()> {
    if expected != got {
        return Err(GatewayError::InvalidWireType {
            field: field.name.clone(),
            expected,
            got,
        });
    }
    Ok(())
}

/// Write one non-repeated field's value. The caller has already consumed the
/// tag; `wire` is its wire type.
fn write_scalar_value(field: &Field, wire: u8, dec: &mut Decoder, out: &mut JsonBuilder) -> Result<()> {
    match field.kind {
        Kind::String => {
            check_wire(field, WIRE_LENGTH_DELIMITED, wire)?;
            let bytes = dec.read_bytes()?;
            let s = std::str::from_utf8(bytes).map_err(|e| GatewayError::Unescape(e.to_string()))?;
            out.append_escaped_str(s);
        }
        Kind::Bytes => {
            check_wire(field, WIRE_LENGTH_DELIMITED, wire)?;
            let bytes = dec.read_bytes()?;
            out.append_escaped_str(&base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                bytes,
            ));
        }
        Kind::Bool => {
            check_wire(field, WIRE_VARINT, wire)?;
            let v = dec.read_varint()?;
            out.append_str(if v != 0 { "true" } else { "false" });
        }
        Kind::Message => {
            check_wire(field, WIRE_LENGTH_DELIMITED, wire)?;
            let bytes = dec.read_bytes()?;
            let inner_schema = field
                .message
                .as_ref()
                .ok_or_else(|| GatewayError::Resolve(format!("field {} missing message ref", field.name)))?;
            let mut inner = Decoder::new(bytes);
            transcode_proto_to_json(inner_schema, &mut inner, out)?;
        }
        Kind::Map => {
            return Err(GatewayError::Resolve(format!(
                "field {} is a map but was not dispatched as repeated",
                field.name
            )))
        }
        kind if kind.is_numeric() => write_numeric_value(kind, wire, dec, out, field)?,
        _ => unreachable!(),
    }
    Ok(())
}

fn write_numeric_value(kind: Kind, wire: u8, dec: &mut Decoder, out: &mut JsonBuilder, field: &Field) -> Result<()> {
    match kind {
        Kind::Double => {
            check_wire(field, crate::wire::WIRE_FIXED64, wire)?;
            let v = f64::from_bits(dec.read_fixed64()?);
            out.append_str(&format_f64(v));
        }
        Kind::Float => {
            check_wire(field, crate::wire::WIRE_FIXED32, wire)?;
            let v = f32::from_bits(dec.read_fixed32()?);
            out.append_str(&format_f32(v));
        }
        Kind::Int32 => {
            check_wire(field, WIRE_VARINT, wire)?;
            out.append_str(&((dec.read_varint()? as i64) as i32).to_string());
        }
        Kind::Int64 => {
            check_wire(field, WIRE_VARINT, wire)?;
            out.append_str(&(dec.read_varint()? as i64).to_string());
        }
        Kind::Uint32 => {
            check_wire(field, WIRE_VARINT, wire)?;
            out.append_str(&(dec.read_varint()? as u32).to_string());
        }
        Kind::Uint64 => {
            check_wire(field, WIRE_VARINT, wire)?;
            out.append_str(&dec.read_varint()?.to_string());
        }
        Kind::Sint32 => {
            check_wire(field, WIRE_VARINT, wire)?;
            out.append_str(&zigzag_decode32(dec.read_varint()? as u32).to_string());
        }
        Kind::Sint64 => {
            check_wire(field, WIRE_VARINT, wire)?;
            out.append_str(&zigzag_decode64(dec.read_varint()?).to_string());
        }
        Kind::Fixed32 => {
            check_wire(field, crate::wire::WIRE_FIXED32, wire)?;
            out.append_str(&dec.read_fixed32()?.to_string());
        }
        Kind::Fixed64 => {
            check_wire(field, crate::wire::WIRE_FIXED64, wire)?;
            out.append_str(&dec.read_fixed64()?.to_string());
        }
        Kind::Sfixed32 => {
            check_wire(field, crate::wire::WIRE_FIXED32, wire)?;
            out.append_str(&(dec.read_fixed32()? as i32).to_string());
        }
        Kind::Sfixed64 => {
            check_wire(field, crate::wire::WIRE_FIXED64, wire)?;
            out.append_str(&(dec.read_fixed64()? as i64).to_string());
        }
        _ => unreachable!("write_numeric_value called with non-numeric kind"),
    }
    Ok(())
}

/// Shortest round-trip rendering, same strategy Rust's own `{}` formatter
/// already provides.
fn format_f64(v: f64) -> String {
    format!("{v}")
}

fn format_f32(v: f32) -> String {
    format!("{v}")
}

fn write_repeated_value(
    field: &Field,
    first_tag: u32,
    first_wire: u8,
    dec: &mut Decoder,
    out: &mut JsonBuilder,
    emitted: &mut bool,
) -> Result<()> {
    if field.kind == Kind::Map {
        write_map_object(field, first_tag, first_wire, dec, out)?;
        *emitted = true;
        return Ok(());
    }

    out.append_byte(b'[');
    let mut first_elem = true;

    if is_packable(field.kind) && first_wire == WIRE_LENGTH_DELIMITED {
        let packed = dec.read_bytes()?;
        let mut inner = Decoder::new(packed);
        while !inner.eof() {
            if !first_elem {
                out.append_byte(b',');
            }
            write_packed_element(field.kind, &mut inner, out)?;
            first_elem = false;
        }
    } else {
        write_unpacked_element(field, first_wire, dec, out)?;
        first_elem = false;
        loop {
            match dec.peek_tag()? {
                Some((tag, wire)) if tag == first_tag => {
                    dec.read_tag()?;
                    out.append_byte(b',');
                    write_unpacked_element(field, wire, dec, out)?;
                }
                _ => break,
            }
        }
    }

    out.append_byte(b']');
    *emitted = true;
    Ok(())
}

fn write_unpacked_element(field: &Field, wire: u8, dec: &mut Decoder, out: &mut JsonBuilder) -> Result<()> {
    write_scalar_value(field, wire, dec, out)
}

fn write_packed_element(kind: Kind, dec: &mut Decoder, out: &mut JsonBuilder) -> Result<()> {
    match kind {
        Kind::Bool => {
            let v = dec.read_varint()?;
            out.append_str(if v != 0 { "true" } else { "false" });
        }
        Kind::Double => out.append_str(&format_f64(f64::from_bits(dec.read_fixed64()?))),
        Kind::Float => out.append_str(&format_f32(f32::from_bits(dec.read_fixed32()?))),
        Kind::Int32 => out.append_str(&((dec.read_varint()? as i64) as i32).to_string()),
        Kind::Int64 => out.append_str(&(dec.read_varint()? as i64).to_string()),
        Kind::Uint32 => out.append_str(&(dec.read_varint()? as u32).to_string()),
        Kind::Uint64 => out.append_str(&dec.read_varint()?.to_string()),
        Kind::Sint32 => out.append_str(&zigzag_decode32(dec.read_varint()? as u32).to_string()),
        Kind::Sint64 => out.append_str(&zigzag_decode64(dec.read_varint()?).to_string()),
        Kind::Fixed32 => out.append_str(&dec.read_fixed32()?.to_string()),
        Kind::Fixed64 => out.append_str(&dec.read_fixed64()?.to_string()),
        Kind::Sfixed32 => out.append_str(&(dec.read_fixed32()? as i32).to_string()),
        Kind::Sfixed64 => out.append_str(&(dec.read_fixed64()? as i64).to_string()),
        _ => unreachable!("write_packed_element called with non-packable kind"),
    }
    Ok(())
}

/// A repeated Map field renders as a JSON object, not an array: each wire
/// entry at `first_tag` becomes one `"key":value` pair.
fn write_map_object(
    field: &Field,
    first_tag: u32,
    first_wire: u8,
    dec: &mut Decoder,
    out: &mut JsonBuilder,
) -> Result<()> {
    out.append_byte(b'{');
    write_map_entry(field, first_wire, dec, out)?;
    loop {
        match dec.peek_tag()? {
            Some((tag, wire)) if tag == first_tag => {
                dec.read_tag()?;
                out.append_byte(b',');
                write_map_entry(field, wire, dec, out)?;
            }
            _ => break,
        }
    }
    out.append_byte(b'}');
    Ok(())
}

fn write_map_entry(field: &Field, wire: u8, dec: &mut Decoder, out: &mut JsonBuilder) -> Result<()> {
    check_wire(field, WIRE_LENGTH_DELIMITED, wire)?;
    let entry_schema = field
        .message
        .as_ref()
        .ok_or_else(|| GatewayError::Resolve(format!("map field {} missing entry schema", field.name)))?;
    let key_field = entry_schema
        .field_by_tag(1)
        .ok_or_else(|| GatewayError::Resolve("map entry missing key field".into()))?;
    let value_field = entry_schema
        .field_by_tag(2)
        .ok_or_else(|| GatewayError::Resolve("map entry missing value field".into()))?;

    let bytes = dec.read_bytes()?;
    let mut entry_dec = Decoder::new(bytes);
    let mut key = String::new();
    let mut value_buf = JsonBuilder::new();
    let mut have_value = false;

    while let Some((tag, w)) = entry_dec.read_tag()? {
        match tag {
            1 => key = render_map_key(key_field.kind, w, &mut entry_dec)?,
            2 => {
                write_scalar_value(value_field, w, &mut entry_dec, &mut value_buf)?;
                have_value = true;
            }
            _ => entry_dec.skip_field(w)?,
        }
    }
    if !have_value {
        write_default_value(value_field, &mut value_buf);
    }

    out.append_escaped_str(&key);
    out.append_byte(b':');
    out.append_str(value_buf.as_str());
    Ok(())
}

/// Map keys always render as JSON strings regardless of the proto key kind
/// (JSON object keys are strings; a non-string key is just rendered as its
/// decimal/literal text).
fn render_map_key(kind: Kind, wire: u8, dec: &mut Decoder) -> Result<String> {
    match kind {
        Kind::String => Ok(std::str::from_utf8(dec.read_bytes()?)
            .map_err(|e| GatewayError::Unescape(e.to_string()))?
            .to_string()),
        Kind::Bool => Ok(if dec.read_varint()? != 0 { "true" } else { "false" }.to_string()),
        _ => {
            let mut tmp = JsonBuilder::new();
            write_numeric_value(
                kind,
                wire,
                dec,
                &mut tmp,
                &Field {
                    name: "key".into(),
                    alias: None,
                    tag: 1,
                    kind,
                    repeated: false,
                    omit: Omit::OmitProtoEmpty,
                    message: None,
                },
            )?;
            Ok(tmp.into_string())
        }
    }
}

fn write_default_value(field: &Field, out: &mut JsonBuilder) {
    if field.repeated {
        out.append_str(if field.kind == Kind::Map { "{}" } else { "[]" });
        return;
    }
    match field.kind {
        Kind::String => out.append_str("\"\""),
        Kind::Bytes => out.append_str("\"\""),
        Kind::Bool => out.append_str("false"),
        Kind::Message => out.append_str("null"),
        Kind::Map => out.append_str("{}"),
        _ => out.append_str("0"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Omit;
    use crate::wire::Encoder;
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

    fn render(schema: &Message, bytes: &[u8]) -> String {
        let mut dec = Decoder::new(bytes);
        let mut out = JsonBuilder::new();
        transcode_proto_to_json(schema, &mut dec, &mut out).unwrap();
        out.into_string()
    }

    #[test]
    fn scalar_round_trip_matches_spec_scenario_1() {
        let schema = Message::new(
            "Simple",
            vec![
                scalar("name", 1, Kind::String),
                scalar("age", 2, Kind::Int32),
                scalar("male", 3, Kind::Bool),
            ],
        );
        let mut enc = Encoder::new();
        enc.emit_string(1, "a");
        enc.emit_varint(3, 1);
        let json = render(&schema, &enc.into_vec());
        assert_eq!(json, r#"{"name":"a","male":true}"#);
    }

    #[test]
    fn omit_proto_empty_skips_unset_fields() {
        let schema = Message::new("S", vec![scalar("v", 1, Kind::Int32)]);
        let json = render(&schema, &[]);
        assert_eq!(json, "{}");
    }

    #[test]
    fn omit_empty_fills_defaults() {
        let schema = Message::new(
            "S",
            vec![Field {
                omit: Omit::OmitEmpty,
                ..scalar("v", 1, Kind::Int32)
            }],
        );
        let json = render(&schema, &[]);
        assert_eq!(json, r#"{"v":0}"#);
    }

    #[test]
    fn bytes_render_as_base64() {
        let schema = Message::new("B", vec![scalar("data", 1, Kind::Bytes)]);
        let mut enc = Encoder::new();
        enc.emit_bytes(1, b"hello world");
        let json = render(&schema, &enc.into_vec());
        assert_eq!(json, r#"{"data":"aGVsbG8gd29ybGQ="}"#);
    }

    #[test]
    fn sint32_decodes_zigzag() {
        let schema = Message::new("N", vec![scalar("v", 7, Kind::Sint32)]);
        let mut enc = Encoder::new();
        enc.emit_zigzag32(7, 7);
        let json = render(&schema, &enc.into_vec());
        assert_eq!(json, r#"{"v":7}"#);
    }

    #[test]
    fn first_occurrence_wins_on_duplicate_tags() {
        let schema = Message::new("S", vec![scalar("v", 1, Kind::Int32)]);
        let mut enc = Encoder::new();
        enc.emit_varint(1, 1);
        enc.emit_varint(1, 2);
        let json = render(&schema, &enc.into_vec());
        assert_eq!(json, r#"{"v":1}"#);
    }

    #[test]
    fn unknown_tag_is_skipped() {
        let schema = Message::new("S", vec![scalar("v", 1, Kind::Int32)]);
        let mut enc = Encoder::new();
        enc.emit_string(99, "ignored");
        enc.emit_varint(1, 5);
        let json = render(&schema, &enc.into_vec());
        assert_eq!(json, r#"{"v":5}"#);
    }

    #[test]
    fn nested_message_round_trips() {
        let inner = Arc::new(Message::new("Inner", vec![scalar("x", 1, Kind::Int32)]));
        let outer = Message::new(
            "Outer",
            vec![Field {
                message: Some(inner),
                ..scalar("inner", 1, Kind::Message)
            }],
        );
        let mut enc = Encoder::new();
        let mut inner_enc = Encoder::new();
        inner_enc.emit_varint(1, 5);
        enc.emit_bytes(1, inner_enc.bytes());
        let json = render(&outer, &enc.into_vec());
        assert_eq!(json, r#"{"inner":{"x":5}}"#);
    }

    #[test]
    fn packed_repeated_scalars_render_as_array() {
        let schema = Message::new(
            "R",
            vec![Field {
                repeated: true,
                ..scalar("items", 1, Kind::Int32)
            }],
        );
        let mut enc = Encoder::new();
        let mut packed = Encoder::new();
        packed.write_varint(1);
        packed.write_varint(2);
        packed.write_varint(3);
        enc.emit_bytes(1, packed.bytes());
        let json = render(&schema, &enc.into_vec());
        assert_eq!(json, r#"{"items":[1,2,3]}"#);
    }

    #[test]
    fn unpacked_repeated_strings_render_as_array() {
        let schema = Message::new(
            "R",
            vec![Field {
                repeated: true,
                ..scalar("items", 1, Kind::String)
            }],
        );
        let mut enc = Encoder::new();
        enc.emit_string(1, "a");
        enc.emit_string(1, "b");
        let json = render(&schema, &enc.into_vec());
        assert_eq!(json, r#"{"items":["a","b"]}"#);
    }

    #[test]
    fn map_field_renders_as_object() {
        let entry = Arc::new(Message::new(
            "Entry",
            vec![scalar("key", 1, Kind::String), scalar("value", 2, Kind::Int32)],
        ));
        let schema = Message::new(
            "M",
            vec![Field {
                repeated: true,
                message: Some(entry),
                ..scalar("m", 1, Kind::Map)
            }],
        );
        let mut enc = Encoder::new();
        let mut e1 = Encoder::new();
        e1.emit_string(1, "a");
        e1.emit_varint(2, 1);
        enc.emit_bytes(1, e1.bytes());
        let mut e2 = Encoder::new();
        e2.emit_string(1, "b");
        e2.emit_varint(2, 2);
        enc.emit_bytes(1, e2.bytes());
        let json = render(&schema, &enc.into_vec());
        assert_eq!(json, r#"{"m":{"a":1,"b":2}}"#);
    }

    #[test]
    fn alias_controls_json_key() {
        let schema = Message::new(
            "A",
            vec![Field {
                alias: Some("display_name".into()),
                ..scalar("name", 1, Kind::String)
            }],
        );
        let mut enc = Encoder::new();
        enc.emit_string(1, "hi");
        let json = render(&schema, &enc.into_vec());
        assert_eq!(json, r#"{"display_name":"hi"}"#);
    }

    #[test]
    fn wire_type_mismatch_is_reported() {
        let schema = Message::new("S", vec![scalar("v", 1, Kind::Int32)]);
        let mut enc = Encoder::new();
        enc.emit_string(1, "not a varint");
        let bytes = enc.into_vec();
        let mut dec = Decoder::new(&bytes);
        let mut out = JsonBuilder::new();
        let err = transcode_proto_to_json(&schema, &mut dec, &mut out).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidWireType { .. }));
    }

    #[test]
    fn whole_number_floats_render_without_a_decimal_point() {
        let schema = Message::new("F", vec![scalar("v", 1, Kind::Double)]);
        let mut enc = Encoder::new();
        enc.emit_fixed64(1, 5.0f64.to_bits());
        let json = render(&schema, &enc.into_vec());
        assert_eq!(json, r#"{"v":5}"#);
    }
}
