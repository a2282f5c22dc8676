//! The schema graph consumed by the transcoder and the routing engine.
//!
//! Nothing here knows about `.proto` files or descriptors — that's
//! `crate::descriptor`'s job. This module only describes the shape the
//! resolved graph takes.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Message,
    Map,
}

impl Kind {
    pub fn is_numeric(self) -> bool {
        !matches!(
            self,
            Kind::Bool | Kind::String | Kind::Bytes | Kind::Message | Kind::Map
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Omit {
    /// Default proto3 behavior: a missing field stays missing in JSON.
    OmitProtoEmpty,
    /// Always emit the field's JSON default when it wasn't present on the wire.
    OmitEmpty,
    /// Never omit — same emission behavior as `OmitEmpty` (kept distinct to
    /// mirror the spec's three-way enumeration so a resolver can pick between
    /// "programmer asked for this" and "defaulted").
    Never,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub alias: Option<String>,
    pub tag: u32,
    pub kind: Kind,
    pub repeated: bool,
    pub omit: Omit,
    /// Present iff `kind` is `Message` or `Map`. For `Map`, points at a
    /// synthetic two-field entry message: tag 1 is the key, tag 2 the value.
    pub message: Option<Arc<Message>>,
}

impl Field {
    /// The name this field is addressed by in JSON: its alias if set, else
    /// its declared name.
    pub fn json_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn should_emit_default(&self) -> bool {
        !matches!(self.omit, Omit::OmitProtoEmpty)
    }
}

#[derive(Debug)]
struct FieldTable {
    fields: Vec<Field>,
    tag_index: Vec<(u32, usize)>,
    name_index: HashMap<String, usize>,
}

impl FieldTable {
    fn build(fields: Vec<Field>) -> Self {
        let mut tag_index: Vec<(u32, usize)> =
            fields.iter().enumerate().map(|(i, f)| (f.tag, i)).collect();
        tag_index.sort_unstable_by_key(|(tag, _)| *tag);
        let mut name_index: HashMap<String, usize> = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.json_name().to_string(), i))
            .collect();
        // Also index the declared name, so a document that uses the
        // original field name still resolves even when an alias is set.
        for (i, f) in fields.iter().enumerate() {
            name_index.entry(f.name.clone()).or_insert(i);
        }
        FieldTable {
            fields,
            tag_index,
            name_index,
        }
    }
}

/// A message schema: a flat field list plus two index tables, resolved once
/// and read many times.
///
/// Fields live behind a `OnceLock` rather than directly on the struct so the
/// resolver can insert an empty placeholder into its message cache, hand out
/// `Arc<Message>` clones to fields still being resolved (including a field
/// that points straight back at this message), and only then call `fill` —
/// `OnceLock::set` takes `&self`, so this works through a shared `Arc`
/// without any unsafe code. This is what makes cyclic message graphs
/// (a tree node whose child field is the same message type) constructible.
#[derive(Debug)]
pub struct Message {
    pub name: String,
    cell: OnceLock<FieldTable>,
}

impl Message {
    /// Build an empty, unresolved message — used by the resolver to insert a
    /// cache placeholder before recursing into a cyclic reference.
    pub fn empty(name: impl Into<String>) -> Self {
        Message {
            name: name.into(),
            cell: OnceLock::new(),
        }
    }

    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        let msg = Self::empty(name);
        msg.fill(fields);
        msg
    }

    /// Populate this message's field list and build its lookup tables.
    /// Only the first call has any effect — a message is resolved exactly
    /// once.
    pub fn fill(&self, fields: Vec<Field>) {
        let _ = self.cell.set(FieldTable::build(fields));
    }

    fn table(&self) -> &FieldTable {
        self.cell
            .get()
            .expect("Message field list accessed before resolution completed")
    }

    pub fn fields(&self) -> &[Field] {
        &self.table().fields
    }

    pub fn field_by_tag(&self, tag: u32) -> Option<&Field> {
        let t = self.table();
        t.tag_index
            .binary_search_by_key(&tag, |(tag, _)| *tag)
            .ok()
            .map(|idx| &t.fields[t.tag_index[idx].1])
    }

    pub fn field_index_by_tag(&self, tag: u32) -> Option<usize> {
        let t = self.table();
        t.tag_index
            .binary_search_by_key(&tag, |(tag, _)| *tag)
            .ok()
            .map(|idx| t.tag_index[idx].1)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        let t = self.table();
        t.name_index.get(name).map(|&i| &t.fields[i])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindSource {
    Query,
    Params,
    Header,
    Context,
}

#[derive(Debug, Clone)]
pub struct FieldBinding {
    pub name: String,
    pub kind: Kind,
    pub tag: u32,
    pub source: BindSource,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub server: String,
    pub handler: String,
    /// gRPC full method path, e.g. "/pkg.Service/Method".
    pub method: String,
    pub input: Arc<Message>,
    pub output: Arc<Message>,
    pub bindings: Vec<FieldBinding>,
    /// Milliseconds; `0` means no per-call deadline beyond the inbound one.
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub http_method: String,
    pub path: String,
    pub middleware: Vec<String>,
    pub call: Arc<Call>,
}
