mod cli;
mod log;
mod validate;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cli::Cli;

use protobridge_core::descriptor::annotations;
use protobridge_core::handlers::{HttpViewHandler, JsonApiHandler, PassthroughHandler};
use protobridge_core::{serve, ConnectionConfig, Engine, EngineOptions, GrpcDialer};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(msg) = validate::validate(&cli) {
        eprintln!("{msg}");
        eprintln!("Try 'protobridge --help' for more details.");
        process::exit(2);
    }

    let log_level = if cli.verbose { "debug" } else { "info" };
    protobridge_core::log::set_logger(Box::new(log::StderrLogger::new(log_level)));

    if let Err(err) = run(&cli).await {
        eprintln!("{err}");
        process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let fds = protobridge_core::ioutil::load_descriptor_set(std::path::Path::new(&cli.descriptor_set))?;
    let pool = annotations::build_pool(fds)?;
    let resolved = protobridge_core::resolve(&pool, cli.ignore_errors)?;

    println!("resolved {} route(s) from {}", resolved.routes.len(), cli.descriptor_set);

    let dialer = GrpcDialer::new(ConnectionConfig {
        plaintext: cli.plaintext,
        connect_timeout: Duration::from_secs_f64(cli.connect_timeout),
        keepalive: None,
        user_agent: Some(format!("protobridge/{}", env!("CARGO_PKG_VERSION"))),
        max_msg_size: None,
    });

    let options = EngineOptions {
        max_body_size: cli.max_body_size,
        default_timeout_ms: 0,
        ignore_errors: cli.ignore_errors,
    };

    let mut engine = Engine::new(Arc::new(dialer), options);
    engine.register_handler("json", Arc::new(JsonApiHandler::new()));
    engine.register_handler("passthrough", Arc::new(PassthroughHandler));
    engine.register_handler("httpview", Arc::new(HttpViewHandler::new(Vec::new())));

    let engine = Arc::new(engine);
    engine.rebuild(resolved.routes, cli.ignore_errors).await?;

    let addr = cli.listen.parse()?;
    serve(engine, addr).await?;
    Ok(())
}
