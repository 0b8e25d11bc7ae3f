mod test_helpers;

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use synaptic_hub::{server, Gateway, HubConfig, Role};
use test_helpers::gateway;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start() -> (Arc<Gateway>, String) {
    let gateway = gateway(HubConfig::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(
        gateway.clone(),
        listener,
        std::future::pending::<()>(),
    ));
    (gateway, format!("ws://{}", addr))
}

async fn connect(gateway: &Gateway, url: String, client_type: Option<&'static str>, role: Role) -> Client {
    let mut request = url.into_client_request().unwrap();
    if let Some(client_type) = client_type {
        request
            .headers_mut()
            .insert("x-client-type", HeaderValue::from_static(client_type));
    }
    let (socket, _) = connect_async(request).await.unwrap();
    for _ in 0..200 {
        if gateway.connections().is_connected(role) {
            return socket;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} connection was never registered", role);
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection ended")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

#[tokio::test]
async fn tool_call_round_trips_through_the_engine() {
    let (gateway, url) = start().await;
    let mut engine = connect(&gateway, format!("{}/unity", url), None, Role::Engine).await;
    let mut tools = connect(&gateway, format!("{}/", url), Some("tools"), Role::ToolInvocation).await;

    send_json(&mut tools, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}})).await;
    let reply = next_json(&mut tools).await;
    assert_eq!(reply["id"], json!(1));
    assert_eq!(reply["result"]["serverInfo"]["name"], json!("synaptic-hub"));

    send_json(
        &mut tools,
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "unity_get_gameobjects_list", "arguments": {"tagFilter": "Player"}}
        }),
    )
    .await;

    let command = next_json(&mut engine).await;
    assert_eq!(command["type"], json!("tool_call"));
    assert_eq!(command["command"], json!("get_gameobjects_list"));
    assert_eq!(command["parameters"], json!({"tagFilter": "Player"}));
    send_json(
        &mut engine,
        json!({
            "id": command["id"].to_string(),
            "type": "operation_result",
            "data": {"success": true},
            "content": "Player (id: 1042)"
        }),
    )
    .await;

    let reply = next_json(&mut tools).await;
    assert_eq!(reply["id"], json!(2));
    assert_eq!(reply["result"]["content"][0]["text"], json!("Player (id: 1042)"));
    assert!(reply["result"].get("isError").is_none());
}

#[tokio::test]
async fn selection_notifies_the_tool_session() {
    let (gateway, url) = start().await;
    let mut tools = connect(&gateway, format!("{}/tools", url), None, Role::ToolInvocation).await;

    send_json(
        &mut tools,
        json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {"name": "select_tools", "arguments": {"categories": ["VFX"]}}
        }),
    )
    .await;

    let first = next_json(&mut tools).await;
    let second = next_json(&mut tools).await;
    let (notification, reply) = if first.get("method").is_some() {
        (first, second)
    } else {
        (second, first)
    };
    assert_eq!(notification["method"], json!("notifications/tools/list_changed"));
    assert_eq!(reply["id"], json!(7));

    send_json(&mut tools, json!({"jsonrpc": "2.0", "id": 8, "method": "tools/list"})).await;
    let listed = next_json(&mut tools).await;
    let names: Vec<&str> = listed["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(names.contains(&"unity_create_bloom"));
    assert!(names.contains(&"select_tools"));
}

#[tokio::test]
async fn engine_chat_reaches_the_side_channel() {
    let (gateway, url) = start().await;
    let mut engine = connect(&gateway, url.clone(), Some("unity"), Role::Engine).await;
    let mut desktop = connect(&gateway, format!("{}/mcp", url), None, Role::SideChannel).await;

    send_json(
        &mut engine,
        json!({"type": "chat_message", "message": "make it rain", "projectName": "Demo"}),
    )
    .await;
    assert_eq!(
        next_json(&mut desktop).await,
        json!({
            "type": "user_message",
            "content": "make it rain",
            "context": {"source": "unity", "project": "Demo"}
        })
    );

    send_json(&mut desktop, json!({"type": "chat_response", "content": "Adding weather"})).await;
    assert_eq!(
        next_json(&mut engine).await,
        json!({"type": "assistant_message", "content": "Adding weather"})
    );
}

#[tokio::test]
async fn second_engine_replaces_the_first() {
    let (gateway, url) = start().await;
    let mut first = connect(&gateway, format!("{}/unity", url), None, Role::Engine).await;
    let first_id = gateway.connections().current(Role::Engine).unwrap().id();

    let mut second = connect(&gateway, format!("{}/unity", url), None, Role::Engine).await;
    for _ in 0..200 {
        if gateway.connections().current(Role::Engine).map(|h| h.id()) != Some(first_id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // the first socket is closed by the hub
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match first.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    let caller = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.invoke("unity_undo", json!({})).await })
    };
    let command = next_json(&mut second).await;
    send_json(
        &mut second,
        json!({"id": command["id"], "type": "operation_result", "success": true, "content": "undone"}),
    )
    .await;
    assert!(caller.await.unwrap().is_ok());
    assert!(gateway.connections().is_connected(Role::Engine));
}

#[tokio::test]
async fn stdio_session_answers_every_request_before_ending() {
    let gateway = gateway(HubConfig::default());
    let (client, server_side) = tokio::io::duplex(1 << 20);
    let (server_read, server_write) = tokio::io::split(server_side);
    let session = tokio::spawn(server::serve_lines(gateway.clone(), server_read, server_write));

    let (mut client_read, mut client_write) = tokio::io::split(client);
    let requests = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
    ];
    for request in requests {
        client_write
            .write_all(format!("{}\n", request).as_bytes())
            .await
            .unwrap();
    }
    // EOF immediately after the last request
    client_write.shutdown().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), session)
        .await
        .expect("session did not end")
        .unwrap()
        .unwrap();
    assert!(!gateway.connections().is_connected(Role::ToolInvocation));

    drop(client_write);
    let mut written = String::new();
    client_read.read_to_string(&mut written).await.unwrap();
    let mut ids: Vec<Value> = written
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).unwrap()["id"].clone())
        .collect();
    ids.sort_by_key(|id| id.as_u64());
    assert_eq!(ids, vec![json!(1), json!(2)]);
}
