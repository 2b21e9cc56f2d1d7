// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sloth_rpc::CommandClient;
use std::collections::HashMap;
use tempfile::tempdir;

async fn start_server(draining: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let flag = Arc::new(AtomicBool::new(draining));
    let server = Arc::new(CommandServer::new(flag));
    tokio::spawn(server.serve(listener));
    addr
}

fn request(command: &str) -> RunCommandRequest {
    RunCommandRequest {
        command: command.to_string(),
        env: HashMap::new(),
        working_dir: None,
        timeout_ms: None,
        run_id: "run-1".to_string(),
        task_id: "t".to_string(),
    }
}

#[tokio::test]
async fn test_command_streams_output_and_exit_code() {
    let addr = start_server(false).await;
    let outcome = CommandClient::new(addr)
        .run(&request("echo out; echo err >&2; exit 4"))
        .await
        .unwrap();

    assert_eq!(outcome.stdout, "out\n");
    assert_eq!(outcome.stderr, "err\n");
    assert_eq!(outcome.exit_code, 4);
}

#[tokio::test]
async fn test_env_and_working_dir_apply() {
    let dir = tempdir().unwrap();
    let addr = start_server(false).await;

    let mut req = request("echo \"$TOKEN in $(pwd)\"");
    req.env.insert("TOKEN".to_string(), "xyz".to_string());
    req.working_dir = Some(dir.path().display().to_string());

    let outcome = CommandClient::new(addr).run(&req).await.unwrap();
    assert!(outcome.stdout.starts_with("xyz in "));
}

#[tokio::test]
async fn test_missing_working_dir_is_invocation_error() {
    let addr = start_server(false).await;
    let mut req = request("true");
    req.working_dir = Some("/definitely/not/a/dir".to_string());

    let outcome = CommandClient::new(addr).run(&req).await.unwrap();
    assert!(outcome
        .error
        .as_deref()
        .unwrap_or("")
        .contains("working directory not found"));
}

#[tokio::test]
async fn test_draining_agent_refuses_commands() {
    let addr = start_server(true).await;
    let outcome = CommandClient::new(addr).run(&request("true")).await.unwrap();
    assert_eq!(outcome.error.as_deref(), Some("agent is draining"));
}

#[tokio::test]
async fn test_agent_side_timeout() {
    let addr = start_server(false).await;
    let mut req = request("sleep 30");
    req.timeout_ms = Some(100);

    let started = std::time::Instant::now();
    let outcome = CommandClient::new(addr).run(&req).await.unwrap();
    assert!(outcome
        .error
        .as_deref()
        .unwrap_or("")
        .contains("timed out"));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_client_disconnect_kills_child() {
    let dir = tempdir().unwrap();
    let marker = dir.path().join("marker");
    let addr = start_server(false).await;

    // The command would create the marker after one second; dropping
    // the connection first must terminate the child before that
    let command = format!("sleep 1 && touch {}", marker.display());
    let mut stream = TcpStream::connect(&addr).await.unwrap();
    wire::write_message(&mut stream, &request(&command), wire::DEFAULT_FRAME_TIMEOUT)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(stream);

    // Give the TERM time to land, then check the child never finished
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(!marker.exists(), "child survived client disconnect");
}

#[tokio::test]
async fn test_chunk_order_preserved_within_channel() {
    let addr = start_server(false).await;
    let outcome = CommandClient::new(addr)
        .run(&request("for i in 1 2 3 4 5; do echo line$i; done"))
        .await
        .unwrap();
    assert_eq!(outcome.stdout, "line1\nline2\nline3\nline4\nline5\n");
}
