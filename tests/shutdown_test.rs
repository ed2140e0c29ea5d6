//! Graceful shutdown tests.
//!
//! In-flight calls finish after shutdown begins; new connections are
//! refused.

#![cfg(all(feature = "server", feature = "client"))]

use std::time::Duration;

use greeter::client::{CallOptions, ClientConfig, GreeterClient};
use greeter::proto::GreetRequest;
use greeter::server::config::GreetingConfig;
use greeter::server::{self, Greeter, GreeterServer};
use greeter::stream::CallState;
use greeter::CancelToken;

fn client_config(addr: std::net::SocketAddr) -> ClientConfig {
    ClientConfig {
        address: format!("http://{addr}"),
        connect_timeout: Duration::from_secs(1),
    }
}

#[tokio::test]
async fn in_flight_stream_completes_after_shutdown() {
    let greeter = Greeter::new(&GreetingConfig {
        stream_count: 3,
        stream_interval_ms: 200,
    });
    let server = GreeterServer::new(greeter.into_registry());
    let active = server.active_calls().clone();

    let listener = server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancelToken::new();
    let serving = tokio::spawn(server::serve(listener, server, shutdown.clone()));

    let client = GreeterClient::connect(&client_config(addr)).await.unwrap();
    let call = client
        .greet_stream(CallOptions::new(), GreetRequest::new("late"))
        .await
        .unwrap();
    let first = call.message().await.unwrap().unwrap();
    assert_eq!(first.message, "[0] Hello, late!");
    assert_eq!(active.count(), 1);

    shutdown.cancel();

    let mut rest = Vec::new();
    while let Some(response) = call.message().await.unwrap() {
        rest.push(response.message);
    }
    assert_eq!(rest, ["[1] Hello, late!", "[2] Hello, late!"]);
    assert_eq!(call.state(), CallState::Completed);

    tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("server should stop once idle")
        .unwrap()
        .unwrap();
    assert_eq!(active.count(), 0);

    assert!(GreeterClient::connect(&client_config(addr)).await.is_err());
}

#[tokio::test]
async fn idle_server_stops_promptly() {
    let server = GreeterServer::new(Greeter::default().into_registry());
    let listener = server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let shutdown = CancelToken::new();
    let serving = tokio::spawn(server::serve(listener, server, shutdown.clone()));

    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("idle server should stop")
        .unwrap()
        .unwrap();
}
