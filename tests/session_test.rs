//! Scripted menu sessions against an in-process server.

#![cfg(all(feature = "server", feature = "client"))]

use std::time::Duration;

use greeter::CancelToken;
use greeter::client::{ClientConfig, GreeterClient, Session};
use greeter::server::config::GreetingConfig;
use greeter::server::{self, Greeter, GreeterServer};

async fn run_script(script: &'static str, send_count: usize) -> String {
    let greeter = Greeter::new(&GreetingConfig {
        stream_count: 2,
        stream_interval_ms: 10,
    });
    let listener = server::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancelToken::new();
    tokio::spawn(server::serve(
        listener,
        GreeterServer::new(greeter.into_registry()),
        shutdown.clone(),
    ));

    let client = GreeterClient::connect(&ClientConfig {
        address: format!("http://{addr}"),
        connect_timeout: Duration::from_secs(5),
    })
    .await
    .unwrap();

    let mut session = Session::new(script.as_bytes(), Vec::new(), client).send_count(send_count);
    session.run().await.unwrap();
    shutdown.cancel();

    String::from_utf8(session.into_output()).unwrap()
}

#[tokio::test]
async fn every_menu_option_runs_in_one_session() {
    let output = run_script("1\nalice\n2\nbob\n3\na\nb\n4\nx\ny\n5\n", 2).await;

    assert!(output.starts_with("start gRPC client.\n"));
    assert!(output.contains("Hello, alice!"));
    assert!(output.contains("[0] Hello, bob!\n[1] Hello, bob!\n"));
    assert!(output.contains("all the responses have already received"));
    assert!(output.contains("Please enter 2 names."));
    assert!(output.contains("Hello, [a b]!"));
    assert!(output.contains("Hello, x!\nHello, y!\n"));
    assert!(output.ends_with("bye.\n"));
}

#[tokio::test]
async fn greet_prints_header_and_trailer_metadata() {
    let output = run_script("1\nalice\n5\n", 5).await;

    assert!(output.contains("in: [header]"));
    assert!(output.contains("in: [trailer]"));
    assert!(output.contains("type: [unary]"));
}

#[tokio::test]
async fn server_error_is_printed_and_the_menu_continues() {
    let output = run_script("1\n\n1\ncarol\n5\n", 5).await;

    assert!(output.contains("InvalidArgument"));
    assert!(output.contains("GreetRequest.name is empty"));
    assert!(output.contains("Hello, carol!"));
    assert!(output.ends_with("bye.\n"));
}

#[tokio::test]
async fn input_ending_mid_collect_ends_the_session() {
    let output = run_script("3\nonly-one\n", 3).await;

    assert!(output.contains("Please enter 3 names."));
    assert!(!output.contains("Hello, ["));
    assert!(output.ends_with("bye.\n"));
}
