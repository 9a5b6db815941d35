//! Integration tests for the MCP server tools via duplex transport.
//!
//! Uses `tokio::io::duplex` to create an in-process transport, connects a
//! test client to the go-term server, and exercises the tool surface through
//! the MCP protocol -- mirroring the concrete end-to-end scenarios S1-S6.

use go_term::config::Config;
use go_term::history::HistoryStore;
use go_term::registry::SessionRegistry;
use go_term::server::GoTermServer;
use rmcp::model::*;
use rmcp::{ClientHandler, ServiceExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default, Clone)]
struct TestClient;

impl ClientHandler for TestClient {}

async fn server_with_config(
    mut config: Config,
) -> rmcp::service::RunningService<
    rmcp::service::RoleClient,
    impl rmcp::service::Service<rmcp::service::RoleClient>,
> {
    let dir = tempfile::tempdir().unwrap();
    config.data_dir = dir.path().to_path_buf();
    std::mem::forget(dir);

    let history = HistoryStore::open(&config.db_path(), config.enable_wal)
        .await
        .unwrap();
    let registry = Arc::new(SessionRegistry::new(
        config.max_sessions,
        Duration::from_secs(config.session_timeout_secs),
        config.default_working_dir.clone(),
    ));

    let (server_transport, client_transport) = tokio::io::duplex(65536);
    let server = GoTermServer::new(registry, history, config);
    tokio::spawn(async move {
        let service = server.serve(server_transport).await.unwrap();
        let _ = service.waiting().await;
    });

    let client = TestClient::default();
    client.serve(client_transport).await.unwrap()
}

async fn setup() -> rmcp::service::RunningService<
    rmcp::service::RoleClient,
    impl rmcp::service::Service<rmcp::service::RoleClient>,
> {
    server_with_config(Config::default()).await
}

async fn call_tool(
    client: &rmcp::service::RunningService<
        rmcp::service::RoleClient,
        impl rmcp::service::Service<rmcp::service::RoleClient>,
    >,
    name: &str,
    args: Value,
) -> Value {
    let params = CallToolRequestParams {
        meta: None,
        name: name.to_string().into(),
        arguments: Some(serde_json::from_value(args).unwrap()),
        task: None,
    };
    let request = ClientRequest::CallToolRequest(Request::new(params));
    let response = client.send_request(request).await.unwrap();

    let ServerResult::CallToolResult(result) = response else {
        panic!("expected CallToolResult, got {response:?}");
    };

    let text = result
        .content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("");

    serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text))
}

async fn create_session(
    client: &rmcp::service::RunningService<
        rmcp::service::RoleClient,
        impl rmcp::service::Service<rmcp::service::RoleClient>,
    >,
    working_dir: &str,
) -> String {
    let result = call_tool(
        client,
        "create_session",
        serde_json::json!({"name": "test session", "working_dir": working_dir}),
    )
    .await;
    result["session_id"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// S1: working directory persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s1_working_directory_persists_across_commands() {
    let client = setup().await;
    let session_id = create_session(&client, "/tmp").await;

    let compound = call_tool(
        &client,
        "run_command",
        serde_json::json!({
            "session_id": session_id,
            "command": "mkdir -p /tmp/goterm-test-1/sub && cd /tmp/goterm-test-1/sub"
        }),
    )
    .await;
    assert_eq!(compound["exit_code"], 0);

    let pwd = call_tool(
        &client,
        "run_command",
        serde_json::json!({"session_id": session_id, "command": "pwd"}),
    )
    .await;
    assert_eq!(pwd["exit_code"], 0);
    assert_eq!(pwd["output"], "/tmp/goterm-test-1/sub");
}

// ---------------------------------------------------------------------------
// S2: foreground timeout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s2_foreground_timeout() {
    let client = setup().await;
    let session_id = create_session(&client, "/tmp").await;

    let start = std::time::Instant::now();
    let result = call_tool(
        &client,
        "run_command",
        serde_json::json!({"session_id": session_id, "command": "sleep 10", "timeout": 2}),
    )
    .await;
    let elapsed = start.elapsed();

    assert_eq!(result["timed_out"], true);
    assert_eq!(result["exit_code"], 124);
    assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(5));
}

// ---------------------------------------------------------------------------
// S3: policy block
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s3_policy_block() {
    let mut config = Config::default();
    config.blocked_commands = vec!["rm".to_string(), "sudo".to_string()];
    config.enable_sandbox = true;
    let client = server_with_config(config).await;
    let session_id = create_session(&client, "/tmp").await;

    let blocked = call_tool(
        &client,
        "run_command",
        serde_json::json!({"session_id": session_id, "command": "rm file.txt"}),
    )
    .await;
    assert!(blocked.as_str().unwrap_or_default().contains("blocked"));

    let allowed = call_tool(
        &client,
        "run_command",
        serde_json::json!({"session_id": session_id, "command": "echo hello"}),
    )
    .await;
    assert_eq!(allowed["exit_code"], 0);
}

// ---------------------------------------------------------------------------
// S4: background capacity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s4_background_capacity() {
    let mut config = Config::default();
    config.max_background_processes = 3;
    let client = server_with_config(config).await;
    let session_id = create_session(&client, "/tmp").await;

    for _ in 0..3 {
        let result = call_tool(
            &client,
            "run_background_process",
            serde_json::json!({"session_id": session_id, "command": "sleep 30"}),
        )
        .await;
        assert!(result["process_id"].is_string());
    }

    let fourth = call_tool(
        &client,
        "run_background_process",
        serde_json::json!({"session_id": session_id, "command": "sleep 30"}),
    )
    .await;
    assert!(fourth.as_str().unwrap_or_default().contains("capacity"));

    let listing = call_tool(
        &client,
        "list_background_processes",
        serde_json::json!({"session_id": session_id}),
    )
    .await;
    assert_eq!(listing["running"], 3);
}

// ---------------------------------------------------------------------------
// S5: background termination
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s5_background_termination() {
    let client = setup().await;
    let session_id = create_session(&client, "/tmp").await;

    let started = call_tool(
        &client,
        "run_background_process",
        serde_json::json!({"session_id": session_id, "command": "sleep 30"}),
    )
    .await;
    let process_id = started["process_id"].as_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let terminated = call_tool(
        &client,
        "terminate_background_process",
        serde_json::json!({"session_id": session_id, "process_id": process_id, "force": false}),
    )
    .await;
    assert_eq!(terminated["was_running"], true);

    tokio::time::sleep(Duration::from_secs(1)).await;

    let checked = call_tool(
        &client,
        "check_background_process",
        serde_json::json!({"session_id": session_id, "process_id": process_id}),
    )
    .await;
    assert_eq!(checked["is_running"], false);
    assert_ne!(checked["exit_code"], 0);
}

// ---------------------------------------------------------------------------
// S6: history search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn s6_history_search() {
    let client = setup().await;
    let session_id = create_session(&client, "/tmp").await;

    call_tool(
        &client,
        "run_command",
        serde_json::json!({"session_id": session_id, "command": "echo alpha"}),
    )
    .await;
    call_tool(
        &client,
        "run_command",
        serde_json::json!({"session_id": session_id, "command": "echo beta"}),
    )
    .await;
    call_tool(
        &client,
        "run_command",
        serde_json::json!({"session_id": session_id, "command": "false"}),
    )
    .await;

    let search = call_tool(
        &client,
        "search_history",
        serde_json::json!({"command": "echo", "success": true}),
    )
    .await;

    assert_eq!(search["total_found"], 2);
    let results = search["results"].as_array().unwrap();
    assert_eq!(results[0]["command"], "echo beta");
    assert_eq!(results[1]["command"], "echo alpha");
}

// ---------------------------------------------------------------------------
// Session environment and lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_environment_round_trips() {
    let client = setup().await;
    let session_id = create_session(&client, "/tmp").await;

    call_tool(
        &client,
        "set_session_environment",
        serde_json::json!({"session_id": session_id, "variables": {"FOO": "bar"}}),
    )
    .await;

    let result = call_tool(
        &client,
        "run_command",
        serde_json::json!({"session_id": session_id, "command": "echo $FOO"}),
    )
    .await;
    assert_eq!(result["output"], "bar");

    call_tool(
        &client,
        "unset_session_environment",
        serde_json::json!({"session_id": session_id, "keys": ["FOO"]}),
    )
    .await;

    let after = call_tool(
        &client,
        "get_session_environment",
        serde_json::json!({"session_id": session_id, "key": "FOO"}),
    )
    .await;
    assert_eq!(after["count"], 0);
}

#[tokio::test]
async fn delete_session_requires_confirm() {
    let client = setup().await;
    let session_id = create_session(&client, "/tmp").await;

    let refused = call_tool(
        &client,
        "delete_session",
        serde_json::json!({"confirm": false, "session_id": session_id}),
    )
    .await;
    assert!(refused.as_str().unwrap_or_default().contains("confirm"));

    let deleted = call_tool(
        &client,
        "delete_session",
        serde_json::json!({"confirm": true, "session_id": session_id}),
    )
    .await;
    assert_eq!(deleted["sessions_deleted"], 1);

    let listing = call_tool(&client, "list_sessions", serde_json::json!({})).await;
    assert_eq!(listing["total"], 0);
}
