//! greeterd: greeter daemon.
//!
//! Serves `greeter.v1.Greeter` over gRPC until interrupted, then drains
//! in-flight calls before exiting.

use clap::Parser;
use tracing::info;

use greeter::CancelToken;
use greeter::interceptor::{LoggingInterceptor, MetricsInterceptor};
use greeter::server::{self, Config, Greeter, GreeterServer};

/// Greeter daemon: gRPC greeting service.
#[derive(Parser)]
#[command(name = "greeterd")]
#[command(version = greeter::PKG_VERSION)]
#[command(about = "Greeter gRPC service daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Port to listen on (overrides the configuration file).
    #[arg(short, long, env = "GREETER_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: info for the daemon; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    let addr = config.server.address()?;

    info!(version = greeter::version_string(), %addr, "greeterd starting");

    let service = GreeterServer::builder()
        .registry(Greeter::new(&config.greeting).into_registry())
        .interceptor(LoggingInterceptor::new("logging"))
        .interceptor(MetricsInterceptor::new())
        .limits(config.server.limits.clone())
        .build();

    let listener = server::bind(addr).await?;
    let shutdown = CancelToken::new();
    server::cancel_on_ctrl_c(shutdown.clone());
    server::serve(listener, service, shutdown).await?;

    Ok(())
}
