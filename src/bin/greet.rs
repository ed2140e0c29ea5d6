//! greet: interactive greeter client
//!
//! Menu-driven demo of the four greeter calls against a running greeterd.

use std::io;
use std::time::Duration;

use clap::Parser;
use tokio::io::BufReader;

use greeter::client::session::DEFAULT_SEND_COUNT;
use greeter::client::{ClientConfig, GreeterClient, Session};
use greeter::interceptor::LoggingInterceptor;

/// Greeter CLI client
#[derive(Parser)]
#[command(name = "greet")]
#[command(version = greeter::PKG_VERSION)]
#[command(about = "Interactive greeter client")]
struct Args {
    /// Server address
    #[arg(
        short,
        long,
        env = "GREETER_ADDRESS",
        default_value = "http://localhost:8080"
    )]
    address: String,

    /// Names sent by the client-streaming and bidirectional options
    #[arg(short, long, env = "GREETER_SEND_COUNT", default_value_t = DEFAULT_SEND_COUNT)]
    count: usize,

    /// Seconds to wait for the connection
    #[arg(long, default_value_t = 5)]
    connect_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let config = ClientConfig {
        address: args.address,
        connect_timeout: Duration::from_secs(args.connect_timeout_secs),
    };
    let client = GreeterClient::connect(&config)
        .await?
        .with_interceptor(LoggingInterceptor::new("client-1"))
        .with_interceptor(LoggingInterceptor::new("client-2"));

    let stdin = BufReader::new(tokio::io::stdin());
    let mut session = Session::new(stdin, io::stdout(), client).send_count(args.count);
    session.run().await?;

    Ok(())
}
