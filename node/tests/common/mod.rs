//! Shared helpers for node tests.

#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use serde_json::Value;
use hearth_node::{config::Config, runtime::NodeHandle, AppState};
use tempfile::TempDir;

/// A node whose sync loop is running, backed by a temp directory.
pub struct TestNode {
    pub dir: TempDir,
    pub state: AppState,
}

impl TestNode {
    pub fn handle(&self) -> &NodeHandle {
        &self.state.handle
    }

    pub fn router(&self) -> Router {
        hearth_node::app(self.state.clone())
    }
}

pub fn test_config(dir: &TempDir) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        data_dir: dir.path().to_path_buf(),
        retry_base_ms: 50,
        tick_ms: 10,
        ..Config::default()
    }
}

pub fn start_in(dir: TempDir) -> TestNode {
    start_configured(dir, |_| {})
}

/// Start a node after adjusting its config.
pub fn start_configured(dir: TempDir, adjust: impl FnOnce(&mut Config)) -> TestNode {
    let mut config = test_config(&dir);
    adjust(&mut config);
    let (state, runtime) = hearth_node::build(config).unwrap();
    tokio::spawn(runtime.run());
    TestNode { dir, state }
}

pub fn start() -> TestNode {
    start_in(TempDir::new().unwrap())
}

/// Start a node and serve it on an ephemeral port. Returns the node and its
/// peer id (base WebSocket URL).
pub async fn serve() -> (TestNode, String) {
    let node = start();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = node.router();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (node, format!("ws://{addr}"))
}

/// Poll until `check` passes or the timeout elapses.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met within 5s");
}

/// Wait until `key` on `node` reads as `expected`.
pub async fn wait_for_record(node: &TestNode, key: &str, expected: Value) {
    let expected = &expected;
    eventually(move || async move {
        node.handle().get(key).await.unwrap().as_ref() == Some(expected)
    })
    .await;
}
