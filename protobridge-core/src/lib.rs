//! Core library for a dynamically-routable HTTP↔gRPC gateway: load a
//! `FileDescriptorSet` carrying gateway annotations, resolve it into a route
//! table, and serve HTTP requests by transcoding them into gRPC calls
//! against backends named in the descriptor.
//!
//! Nothing in this crate binds to a particular process entry point or
//! transport listener — see `protobridge` (the CLI crate) for that.

pub mod codec;
pub mod connection;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod ioutil;
pub mod json;
pub mod log;
pub mod model;
pub mod serve;
pub mod transcode;
pub mod wire;

pub use connection::{ConnectionConfig, Dialer, GrpcDialer};
pub use descriptor::{resolve, ResolvedGateway};
pub use engine::{Context, Engine, EngineOptions};
pub use error::{GatewayError, Result};
pub use model::Route;
pub use serve::serve;
