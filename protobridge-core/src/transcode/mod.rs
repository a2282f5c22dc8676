//! Schema-directed JSON↔protobuf translation (the "jsonpb" layer).
//!
//! Both directions share one property: they never materialize a generic
//! value tree. `json_to_proto` walks a token stream and an `Encoder` in
//! lockstep; `proto_to_json` walks a `Decoder` and a `JsonBuilder` in
//! lockstep. The `Message`/`Field` schema is the only thing that tells
//! either side what a tag or a key *means*.

mod json_to_proto;
mod proto_to_json;

pub use json_to_proto::transcode_json_to_proto;
pub use proto_to_json::transcode_proto_to_json;

use crate::model::Kind;
use crate::wire::{WIRE_FIXED32, WIRE_FIXED64, WIRE_LENGTH_DELIMITED, WIRE_VARINT};

/// The wire type a schema `Kind` is expected to arrive as.
pub fn wire_type_for_kind(kind: Kind) -> u8 {
    match kind {
        Kind::Double | Kind::Fixed64 | Kind::Sfixed64 => WIRE_FIXED64,
        Kind::Float | Kind::Fixed32 | Kind::Sfixed32 => WIRE_FIXED32,
        Kind::Int32
        | Kind::Int64
        | Kind::Uint32
        | Kind::Uint64
        | Kind::Sint32
        | Kind::Sint64
        | Kind::Bool => WIRE_VARINT,
        Kind::String | Kind::Bytes | Kind::Message | Kind::Map => WIRE_LENGTH_DELIMITED,
    }
}

/// Whether a scalar of this kind packs into a single length-delimited
/// payload when repeated (everything except String/Bytes/Message/Map).
pub fn is_packable(kind: Kind) -> bool {
    !matches!(kind, Kind::String | Kind::Bytes | Kind::Message | Kind::Map)
}
