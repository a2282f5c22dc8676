//! The gateway's own protobuf extension fields, declared as `prost_types`
//! struct literals rather than compiled from a `.proto` file — there is no
//! `protoc` invocation in this crate, so the wire shape of `proto/annotations.proto`
//! (shipped alongside this crate as the source of truth operators compile
//! against) is mirrored here by hand, exactly the way the nearest production
//! sibling's descriptor tests hand-build `FileDescriptorProto` literals to
//! exercise `prost_reflect` without a build step.

use prost::Message as _;
use prost_reflect::{DescriptorPool, DynamicMessage, ExtensionDescriptor, Value};
use prost_types::{
    field_descriptor_proto::{Label, Type},
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet,
};

use crate::error::{GatewayError, Result};

pub const PACKAGE: &str = "protobridge.annotations";

const SERVICE_OPTIONS: &str = ".google.protobuf.ServiceOptions";
const METHOD_OPTIONS: &str = ".google.protobuf.MethodOptions";
const FIELD_OPTIONS: &str = ".google.protobuf.FieldOptions";

fn ext_field(
    name: &str,
    number: i32,
    extendee: &str,
    r#type: Type,
    type_name: Option<&str>,
    repeated: bool,
) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(if repeated { Label::Repeated } else { Label::Optional } as i32),
        r#type: Some(r#type as i32),
        type_name: type_name.map(str::to_string),
        extendee: Some(extendee.to_string()),
        json_name: Some(name.to_string()),
        ..Default::default()
    }
}

/// Build the hand-authored `FileDescriptorProto` describing the gateway's
/// annotation extensions, mirroring `proto/annotations.proto`.
fn annotations_file() -> FileDescriptorProto {
    let bind_source_enum = EnumDescriptorProto {
        name: Some("BindSource".into()),
        value: vec![
            EnumValueDescriptorProto {
                name: Some("DEFAULT".into()),
                number: Some(0),
                ..Default::default()
            },
            EnumValueDescriptorProto {
                name: Some("QUERY".into()),
                number: Some(1),
                ..Default::default()
            },
            EnumValueDescriptorProto {
                name: Some("PARAMS".into()),
                number: Some(2),
                ..Default::default()
            },
            EnumValueDescriptorProto {
                name: Some("HEADER".into()),
                number: Some(3),
                ..Default::default()
            },
            EnumValueDescriptorProto {
                name: Some("CONTEXT".into()),
                number: Some(4),
                ..Default::default()
            },
        ],
        ..Default::default()
    };

    let bind_source_type_name = format!(".{PACKAGE}.BindSource");

    FileDescriptorProto {
        name: Some("protobridge/annotations.proto".into()),
        package: Some(PACKAGE.into()),
        dependency: vec!["google/protobuf/descriptor.proto".into()],
        enum_type: vec![bind_source_enum],
        extension: vec![
            // ServiceOptions (51001-51005)
            ext_field("server", 51001, SERVICE_OPTIONS, Type::String, None, false),
            ext_field("default_handler", 51002, SERVICE_OPTIONS, Type::String, None, false),
            ext_field("default_timeout", 51003, SERVICE_OPTIONS, Type::Int32, None, false),
            ext_field("path_prefix", 51004, SERVICE_OPTIONS, Type::String, None, false),
            ext_field("service_use", 51005, SERVICE_OPTIONS, Type::String, None, true),
            // MethodOptions (51011-51015)
            ext_field("method", 51011, METHOD_OPTIONS, Type::String, None, false),
            ext_field("path", 51012, METHOD_OPTIONS, Type::String, None, false),
            ext_field("handler", 51013, METHOD_OPTIONS, Type::String, None, false),
            ext_field("timeout", 51014, METHOD_OPTIONS, Type::Int32, None, false),
            ext_field("method_use", 51015, METHOD_OPTIONS, Type::String, None, true),
            // FieldOptions (51021-51023)
            ext_field(
                "bind",
                51021,
                FIELD_OPTIONS,
                Type::Enum,
                Some(&bind_source_type_name),
                false,
            ),
            ext_field("alias", 51022, FIELD_OPTIONS, Type::String, None, false),
            ext_field("omit_empty", 51023, FIELD_OPTIONS, Type::Bool, None, false),
        ],
        syntax: Some("proto3".into()),
        ..Default::default()
    }
}

/// Merge the caller-supplied descriptor set with the gateway's own
/// annotation extensions into one pool. The caller's set must already carry
/// `google/protobuf/descriptor.proto` — any file that actually uses these
/// annotations was compiled against `protobridge/annotations.proto`, which
/// depends on it, so `protoc` will have pulled it in transitively.
pub fn build_pool(caller: FileDescriptorSet) -> Result<DescriptorPool> {
    let mut pool = DescriptorPool::from_file_descriptor_set(caller)
        .map_err(|e| GatewayError::Resolve(format!("invalid descriptor set: {e}")))?;
    pool.add_file_descriptor_set(FileDescriptorSet {
        file: vec![annotations_file()],
    })
    .map_err(|e| GatewayError::Resolve(format!("failed to register gateway annotations: {e}")))?;
    Ok(pool)
}

fn extension(pool: &DescriptorPool, name: &str) -> Result<ExtensionDescriptor> {
    pool.get_extension_by_name(&format!("{PACKAGE}.{name}"))
        .ok_or_else(|| GatewayError::Resolve(format!("gateway annotation {name} not registered")))
}

/// Reinterpret a prost-generated `*Options` message through `DynamicMessage`
/// so extension values can be read generically. `options` is the raw
/// prost-encoded bytes of e.g. `ServiceDescriptor::options()`.
fn reinterpret(pool: &DescriptorPool, options_type: &str, raw: &[u8]) -> Result<DynamicMessage> {
    let desc = pool
        .get_message_by_name(options_type)
        .ok_or_else(|| GatewayError::Resolve(format!("{options_type} missing from pool")))?;
    DynamicMessage::decode(desc, raw).map_err(|e| GatewayError::Resolve(format!("failed to reinterpret {options_type}: {e}")))
}

fn get_string(msg: &DynamicMessage, ext: &ExtensionDescriptor) -> Option<String> {
    match msg.get_extension(ext).as_ref() {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn get_i32(msg: &DynamicMessage, ext: &ExtensionDescriptor) -> Option<i32> {
    match msg.get_extension(ext).as_ref() {
        Value::I32(v) => Some(*v),
        _ => None,
    }
}

fn get_bool(msg: &DynamicMessage, ext: &ExtensionDescriptor) -> bool {
    matches!(msg.get_extension(ext).as_ref(), Value::Bool(true))
}

fn get_enum(msg: &DynamicMessage, ext: &ExtensionDescriptor) -> i32 {
    match msg.get_extension(ext).as_ref() {
        Value::EnumNumber(n) => *n,
        _ => 0,
    }
}

fn get_string_list(msg: &DynamicMessage, ext: &ExtensionDescriptor) -> Vec<String> {
    match msg.get_extension(ext).as_ref() {
        Value::List(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceAnnotations {
    pub server: Option<String>,
    pub default_handler: Option<String>,
    pub default_timeout_ms: Option<i32>,
    pub path_prefix: String,
    pub use_: Vec<String>,
}

pub fn service_annotations(pool: &DescriptorPool, svc: &prost_reflect::ServiceDescriptor) -> Result<ServiceAnnotations> {
    let raw = svc.options().encode_to_vec();
    let dyn_opts = reinterpret(pool, "google.protobuf.ServiceOptions", &raw)?;
    Ok(ServiceAnnotations {
        server: get_string(&dyn_opts, &extension(pool, "server")?),
        default_handler: get_string(&dyn_opts, &extension(pool, "default_handler")?),
        default_timeout_ms: get_i32(&dyn_opts, &extension(pool, "default_timeout")?),
        path_prefix: get_string(&dyn_opts, &extension(pool, "path_prefix")?).unwrap_or_default(),
        use_: get_string_list(&dyn_opts, &extension(pool, "service_use")?),
    })
}

#[derive(Debug, Clone, Default)]
pub struct MethodAnnotations {
    pub http_method: Option<String>,
    pub path: Option<String>,
    pub handler: Option<String>,
    pub timeout_ms: Option<i32>,
    pub use_: Vec<String>,
}

pub fn method_annotations(pool: &DescriptorPool, method: &prost_reflect::MethodDescriptor) -> Result<MethodAnnotations> {
    let raw = method.options().encode_to_vec();
    let dyn_opts = reinterpret(pool, "google.protobuf.MethodOptions", &raw)?;
    Ok(MethodAnnotations {
        http_method: get_string(&dyn_opts, &extension(pool, "method")?),
        path: get_string(&dyn_opts, &extension(pool, "path")?),
        handler: get_string(&dyn_opts, &extension(pool, "handler")?),
        timeout_ms: get_i32(&dyn_opts, &extension(pool, "timeout")?),
        use_: get_string_list(&dyn_opts, &extension(pool, "method_use")?),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindSource {
    #[default]
    Default,
    Query,
    Params,
    Header,
    Context,
}

impl From<i32> for BindSource {
    fn from(v: i32) -> Self {
        match v {
            1 => BindSource::Query,
            2 => BindSource::Params,
            3 => BindSource::Header,
            4 => BindSource::Context,
            _ => BindSource::Default,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldAnnotations {
    pub bind: BindSource,
    pub alias: Option<String>,
    pub omit_empty: bool,
}

pub fn field_annotations(pool: &DescriptorPool, field: &prost_reflect::FieldDescriptor) -> Result<FieldAnnotations> {
    let raw = field.options().encode_to_vec();
    let dyn_opts = reinterpret(pool, "google.protobuf.FieldOptions", &raw)?;
    Ok(FieldAnnotations {
        bind: BindSource::from(get_enum(&dyn_opts, &extension(pool, "bind")?)),
        alias: get_string(&dyn_opts, &extension(pool, "alias")?),
        omit_empty: get_bool(&dyn_opts, &extension(pool, "omit_empty")?),
    })
}
