//! Turns a `FileDescriptorSet` plus the gateway's own annotation extensions
//! into the routing table the engine serves from.

pub mod annotations;
mod resolver;

pub use resolver::{resolve, ResolvedGateway};
