use clap::Parser;

/// Serve a dynamically-routable HTTP-to-gRPC gateway from a descriptor set.
///
/// The descriptor set is a compiled `FileDescriptorSet` blob (as produced by
/// `protoc --descriptor_set_out`) carrying the gateway's own annotation
/// extensions on services, methods, and fields — see the project README for
/// the extension numbers. Every unary RPC the descriptor set names becomes
/// one or more HTTP routes; the gateway transcodes JSON request/response
/// bodies to and from the protobuf wire format on the fly.
#[derive(Parser, Debug)]
#[command(
    name = "protobridge",
    version,
    about = "Dynamically-routable HTTP to gRPC gateway",
    after_help = "Example usage:\n  \
        protobridge --descriptor-set gateway.pb --listen 0.0.0.0:8080\n  \
        protobridge --descriptor-set gateway.pb --listen 127.0.0.1:8080 --plaintext=false"
)]
pub struct Cli {
    /// Path to a compiled FileDescriptorSet blob with gateway annotations.
    #[arg(long, value_name = "FILE")]
    pub descriptor_set: String,

    /// Address to listen for HTTP requests on.
    #[arg(long, value_name = "ADDRESS", default_value = "127.0.0.1:8080")]
    pub listen: String,

    /// Dial backends with plaintext HTTP/2 (no TLS).
    #[arg(long, default_value_t = true)]
    pub plaintext: bool,

    /// Maximum time, in seconds, to wait for a backend connection.
    #[arg(long, value_name = "SECONDS", default_value_t = 10.0)]
    pub connect_timeout: f64,

    /// Maximum size of a request body, in bytes. Negative means unbounded.
    #[arg(long, value_name = "BYTES", default_value_t = 4 * 1024 * 1024)]
    pub max_body_size: i64,

    /// Skip routes that fail to resolve (bad handler, dial failure, route
    /// conflict) instead of aborting the whole gateway.
    #[arg(long)]
    pub ignore_errors: bool,

    /// Enable verbose (debug-level) logging.
    #[arg(short = 'v', long)]
    pub verbose: bool,
}
