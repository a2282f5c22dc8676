use std::collections::HashMap;
use std::sync::Arc;

use prost_reflect::{DescriptorPool, FieldDescriptor, Kind as ProstKind, MessageDescriptor, MethodDescriptor};

use super::annotations::{self, BindSource as AnnBindSource};
use crate::error::{GatewayError, Result};
use crate::model::{BindSource, Call, Field, FieldBinding, Kind, Message, Omit, Route};

const MIDDLEWARE_NAME_RE: &str = "^[A-Za-z0-9_-]+$";

/// Caches resolved `Message` schemas by fully-qualified proto name. A cache
/// entry is inserted (as an empty, unfilled `Message`) before its fields are
/// resolved, so a message that (directly or transitively) refers back to
/// itself resolves to the same shared `Arc` instead of looping forever.
#[derive(Default)]
struct MessageCache {
    entries: HashMap<String, Arc<Message>>,
}

impl MessageCache {
    fn resolve(&mut self, desc: &MessageDescriptor) -> Result<Arc<Message>> {
        let full_name = desc.full_name().to_string();
        if let Some(existing) = self.entries.get(&full_name) {
            return Ok(existing.clone());
        }

        let placeholder = Arc::new(Message::empty(full_name.clone()));
        self.entries.insert(full_name.clone(), placeholder.clone());

        let mut fields = Vec::with_capacity(desc.fields().len());
        for fd in desc.fields() {
            fields.push(self.resolve_field(&fd)?);
        }
        placeholder.fill(fields);
        Ok(placeholder)
    }

    fn resolve_field(&mut self, fd: &FieldDescriptor) -> Result<Field> {
        let mut repeated = fd.cardinality() == prost_reflect::Cardinality::Repeated;
        let (kind, message) = match fd.kind() {
            ProstKind::Double => (Kind::Double, None),
            ProstKind::Float => (Kind::Float, None),
            ProstKind::Int32 => (Kind::Int32, None),
            ProstKind::Int64 => (Kind::Int64, None),
            ProstKind::Uint32 => (Kind::Uint32, None),
            ProstKind::Uint64 => (Kind::Uint64, None),
            ProstKind::Sint32 => (Kind::Sint32, None),
            ProstKind::Sint64 => (Kind::Sint64, None),
            ProstKind::Fixed32 => (Kind::Fixed32, None),
            ProstKind::Fixed64 => (Kind::Fixed64, None),
            ProstKind::Sfixed32 => (Kind::Sfixed32, None),
            ProstKind::Sfixed64 => (Kind::Sfixed64, None),
            ProstKind::Bool => (Kind::Bool, None),
            ProstKind::String => (Kind::String, None),
            ProstKind::Bytes => (Kind::Bytes, None),
            ProstKind::Enum(_) => (Kind::Int32, None),
            ProstKind::Message(m) => {
                let resolved = self.resolve(&m)?;
                if m.is_map_entry() {
                    // A map field is a repeated synthetic entry message;
                    // promote to Map and clear repeated on the container.
                    repeated = false;
                    (Kind::Map, Some(resolved))
                } else {
                    (Kind::Message, Some(resolved))
                }
            }
        };

        let pool = fd.parent_pool();
        let ann = annotations::field_annotations(&pool, fd)?;
        let omit = if ann.omit_empty { Omit::OmitEmpty } else { Omit::OmitProtoEmpty };

        Ok(Field {
            name: fd.name().to_string(),
            alias: ann.alias,
            tag: fd.number(),
            kind,
            repeated,
            omit,
            message,
        })
    }
}

/// A fully resolved gateway configuration: every route the descriptor set
/// describes, with bindings and the resolver's own message graph backing
/// each route's `Call`.
pub struct ResolvedGateway {
    pub routes: Vec<Route>,
}

/// Resolve every service in `pool` into routes. Methods that fail validation
/// are skipped (logged) when `ignore_errors` is true, otherwise the first
/// failure aborts the whole resolve.
pub fn resolve(pool: &DescriptorPool, ignore_errors: bool) -> Result<ResolvedGateway> {
    let mut cache = MessageCache::default();
    let mut routes = Vec::new();

    for service in pool.services() {
        let svc_ann = annotations::service_annotations(pool, &service)?;
        for method in service.methods() {
            match resolve_method(&mut cache, pool, &svc_ann, &method) {
                Ok(route) => routes.push(route),
                Err(err) if ignore_errors => {
                    crate::log::warnf(&format!(
                        "skipping method {}: {err}",
                        method.full_name()
                    ));
                }
                Err(err) => return Err(err),
            }
        }
    }

    Ok(ResolvedGateway { routes })
}

fn resolve_method(
    cache: &mut MessageCache,
    pool: &DescriptorPool,
    svc_ann: &annotations::ServiceAnnotations,
    method: &MethodDescriptor,
) -> Result<Route> {
    let method_ann = annotations::method_annotations(pool, method)?;

    let server = svc_ann
        .server
        .clone()
        .ok_or_else(|| GatewayError::Resolve(format!("service {} missing server annotation", method.parent_service().full_name())))?;

    let handler = method_ann
        .handler
        .clone()
        .or_else(|| svc_ann.default_handler.clone())
        .ok_or_else(|| GatewayError::Resolve(format!("method {} has no handler (no override, no service default)", method.full_name())))?;

    let http_method = method_ann
        .http_method
        .clone()
        .ok_or_else(|| GatewayError::Resolve(format!("method {} missing HTTP method annotation", method.full_name())))?;

    let method_path = method_ann
        .path
        .clone()
        .ok_or_else(|| GatewayError::Resolve(format!("method {} missing HTTP path annotation", method.full_name())))?;

    let timeout_ms = method_ann
        .timeout_ms
        .or(svc_ann.default_timeout_ms)
        .unwrap_or(0)
        .max(0) as u64;

    let input = cache.resolve(&method.input())?;
    let output = cache.resolve(&method.output())?;

    let mut middleware = svc_ann.use_.clone();
    middleware.extend(method_ann.use_.iter().cloned());
    validate_middleware_names(&middleware)?;

    let bindings = collect_bindings(pool, &method.input())?;

    let call = Arc::new(Call {
        server,
        handler,
        method: format!("/{}/{}", method.parent_service().full_name(), method.name()),
        input,
        output,
        bindings,
        timeout_ms,
    });

    Ok(Route {
        http_method,
        path: format!("{}{}", svc_ann.path_prefix, method_path),
        middleware,
        call,
    })
}

/// Only the top-level message's fields are ever read from an HTTP binding
/// source rather than the wire — this is a flat scan, not a recursive one.
fn collect_bindings(pool: &DescriptorPool, input: &MessageDescriptor) -> Result<Vec<FieldBinding>> {
    let mut bindings = Vec::new();
    for fd in input.fields() {
        let ann = annotations::field_annotations(pool, &fd)?;
        if ann.bind == AnnBindSource::Default {
            continue;
        }
        let kind = match fd.kind() {
            ProstKind::Enum(_) => Kind::Int32,
            ProstKind::Message(_) => {
                return Err(GatewayError::Resolve(format!(
                    "field {} cannot be bound from HTTP: message-typed fields are not bindable",
                    fd.full_name()
                )))
            }
            other_kind => prost_kind_to_scalar(other_kind),
        };
        bindings.push(FieldBinding {
            name: fd.name().to_string(),
            kind,
            tag: fd.number(),
            source: match ann.bind {
                AnnBindSource::Query => BindSource::Query,
                AnnBindSource::Params => BindSource::Params,
                AnnBindSource::Header => BindSource::Header,
                AnnBindSource::Context => BindSource::Context,
                AnnBindSource::Default => unreachable!(),
            },
        });
    }
    Ok(bindings)
}

fn prost_kind_to_scalar(kind: ProstKind) -> Kind {
    match kind {
        ProstKind::Double => Kind::Double,
        ProstKind::Float => Kind::Float,
        ProstKind::Int32 => Kind::Int32,
        ProstKind::Int64 => Kind::Int64,
        ProstKind::Uint32 => Kind::Uint32,
        ProstKind::Uint64 => Kind::Uint64,
        ProstKind::Sint32 => Kind::Sint32,
        ProstKind::Sint64 => Kind::Sint64,
        ProstKind::Fixed32 => Kind::Fixed32,
        ProstKind::Fixed64 => Kind::Fixed64,
        ProstKind::Sfixed32 => Kind::Sfixed32,
        ProstKind::Sfixed64 => Kind::Sfixed64,
        ProstKind::Bool => Kind::Bool,
        ProstKind::String => Kind::String,
        ProstKind::Bytes => Kind::Bytes,
        ProstKind::Enum(_) | ProstKind::Message(_) => Kind::String,
    }
}

fn validate_middleware_names(names: &[String]) -> Result<()> {
    let re = regex::Regex::new(MIDDLEWARE_NAME_RE).expect("static regex is valid");
    for name in names {
        if !re.is_match(name) {
            return Err(GatewayError::Resolve(format!("invalid middleware name {name:?}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Encoder;
    use prost::Message as _;
    use prost_types::field_descriptor_proto::{Label, Type};
    use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet};

    fn svc_options_with_server(server: &str) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.emit_string(51001, server); // server
        enc.emit_string(51004, ""); // path_prefix omitted for brevity
        enc.into_vec()
    }

    fn method_options(http_method: &str, path: &str) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.emit_string(51011, http_method);
        enc.emit_string(51012, path);
        enc.emit_string(51013, "json"); // handler
        enc.into_vec()
    }

    fn test_fds() -> FileDescriptorSet {
        FileDescriptorSet {
            file: vec![FileDescriptorProto {
                name: Some("svc.proto".into()),
                package: Some("test.v1".into()),
                message_type: vec![
                    DescriptorProto {
                        name: Some("Req".into()),
                        field: vec![FieldDescriptorProto {
                            name: Some("name".into()),
                            number: Some(1),
                            r#type: Some(Type::String as i32),
                            label: Some(Label::Optional as i32),
                            ..Default::default()
                        }],
                        ..Default::default()
                    },
                    DescriptorProto {
                        name: Some("Resp".into()),
                        field: vec![FieldDescriptorProto {
                            name: Some("greeting".into()),
                            number: Some(1),
                            r#type: Some(Type::String as i32),
                            label: Some(Label::Optional as i32),
                            ..Default::default()
                        }],
                        ..Default::default()
                    },
                ],
                service: vec![prost_types::ServiceDescriptorProto {
                    name: Some("Greeter".into()),
                    method: vec![prost_types::MethodDescriptorProto {
                        name: Some("SayHello".into()),
                        input_type: Some(".test.v1.Req".into()),
                        output_type: Some(".test.v1.Resp".into()),
                        options: Some(
                            prost_types::MethodOptions::decode(method_options("POST", "/hello").as_slice()).unwrap(),
                        ),
                        ..Default::default()
                    }],
                    options: Some(
                        prost_types::ServiceOptions::decode(svc_options_with_server("localhost:9090").as_slice())
                            .unwrap(),
                    ),
                    ..Default::default()
                }],
                syntax: Some("proto3".into()),
                ..Default::default()
            }],
        }
    }

    #[test]
    fn resolves_one_route_end_to_end() {
        let pool = super::super::annotations::build_pool(test_fds()).unwrap();
        let resolved = resolve(&pool, false).unwrap();
        assert_eq!(resolved.routes.len(), 1);
        let route = &resolved.routes[0];
        assert_eq!(route.http_method, "POST");
        assert_eq!(route.path, "/hello");
        assert_eq!(route.call.server, "localhost:9090");
        assert_eq!(route.call.method, "/test.v1.Greeter/SayHello");
        assert_eq!(route.call.handler, "json");
        assert_eq!(route.call.input.field_by_name("name").unwrap().tag, 1);
        assert_eq!(route.call.output.field_by_name("greeting").unwrap().tag, 1);
    }

    #[test]
    fn missing_handler_fails_when_not_ignoring_errors() {
        let mut fds = test_fds();
        // Strip the handler override and leave no service default.
        let mut enc = Encoder::new();
        enc.emit_string(51011, "POST");
        enc.emit_string(51012, "/hello");
        fds.file[0].service[0].method[0].options =
            Some(prost_types::MethodOptions::decode(enc.into_vec().as_slice()).unwrap());
        let pool = super::super::annotations::build_pool(fds).unwrap();
        assert!(resolve(&pool, false).is_err());
    }

    #[test]
    fn missing_handler_is_skipped_when_ignoring_errors() {
        let mut fds = test_fds();
        let mut enc = Encoder::new();
        enc.emit_string(51011, "POST");
        enc.emit_string(51012, "/hello");
        fds.file[0].service[0].method[0].options =
            Some(prost_types::MethodOptions::decode(enc.into_vec().as_slice()).unwrap());
        let pool = super::super::annotations::build_pool(fds).unwrap();
        let resolved = resolve(&pool, true).unwrap();
        assert!(resolved.routes.is_empty());
    }

    #[test]
    fn middleware_concatenates_service_then_method() {
        let mut fds = test_fds();
        let mut svc_enc = Encoder::new();
        svc_enc.emit_string(51001, "localhost:9090");
        svc_enc.emit_string(51005, "auth");
        fds.file[0].service[0].options =
            Some(prost_types::ServiceOptions::decode(svc_enc.into_vec().as_slice()).unwrap());

        let mut method_enc = Encoder::new();
        method_enc.emit_string(51011, "POST");
        method_enc.emit_string(51012, "/hello");
        method_enc.emit_string(51013, "json");
        method_enc.emit_string(51015, "ratelimit");
        fds.file[0].service[0].method[0].options =
            Some(prost_types::MethodOptions::decode(method_enc.into_vec().as_slice()).unwrap());

        let pool = super::super::annotations::build_pool(fds).unwrap();
        let resolved = resolve(&pool, false).unwrap();
        assert_eq!(resolved.routes[0].middleware, vec!["auth", "ratelimit"]);
    }

    #[test]
    fn invalid_middleware_name_fails() {
        let mut fds = test_fds();
        let mut svc_enc = Encoder::new();
        svc_enc.emit_string(51001, "localhost:9090");
        svc_enc.emit_string(51005, "not a valid name!");
        fds.file[0].service[0].options =
            Some(prost_types::ServiceOptions::decode(svc_enc.into_vec().as_slice()).unwrap());
        let pool = super::super::annotations::build_pool(fds).unwrap();
        assert!(resolve(&pool, false).is_err());
    }
}
