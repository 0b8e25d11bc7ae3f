//! Transports: the WebSocket listener shared by every role, and the stdio
//! JSON-RPC session.

use std::future::Future;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionHandle, ConnectionMetadata, OutboundFrame, Role, CLIENT_TYPE_HEADER};
use crate::error::HubResult;
use crate::gateway::Gateway;
use crate::mcp;

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/unity", get(ws_handler))
        .route("/mcp", get(ws_handler))
        .route("/tools", get(ws_handler))
        .with_state(gateway)
}

/// Serve WebSocket connections until `shutdown` resolves. Also runs the
/// `tools/list_changed` notifier for the lifetime of the listener.
pub async fn serve<F>(gateway: Arc<Gateway>, listener: TcpListener, shutdown: F) -> HubResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let notifier = gateway.spawn_notifier();
    info!("[Hub] WebSocket server listening on {}", listener.local_addr()?);
    info!(
        "[Hub] Essential tools loaded: {}",
        gateway.catalog().baseline().len()
    );
    let result = axum::serve(listener, router(gateway))
        .with_graceful_shutdown(shutdown)
        .await;
    notifier.abort();
    result?;
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    uri: Uri,
    State(gateway): State<Arc<Gateway>>,
) -> impl IntoResponse {
    let client_type = headers
        .get(CLIENT_TYPE_HEADER)
        .and_then(|v| v.to_str().ok());
    let metadata = ConnectionMetadata::new(client_type, uri.path());
    ws.on_upgrade(move |socket| handle_socket(socket, metadata, gateway))
}

async fn handle_socket(socket: WebSocket, metadata: ConnectionMetadata, gateway: Arc<Gateway>) {
    let (handle, mut outbound) = ConnectionHandle::channel();
    let connection_id = handle.id();
    let role = gateway.connections().accept(&metadata, handle.clone());
    let (mut sink, mut stream) = socket.split();

    // single writer per connection keeps outbound order
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            match frame {
                OutboundFrame::Text(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                OutboundFrame::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        let message = tokio::select! {
            message = stream.next() => message,
            _ = &mut writer => break,
        };
        let text = match message {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("[Hub] Ignoring non-UTF-8 binary frame from {}", role);
                    continue;
                }
            },
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!("[Hub] {} connection error: {}", role, e);
                break;
            }
        };

        match role {
            Role::Engine => gateway.handle_engine_frame(&text),
            Role::SideChannel => gateway.handle_side_channel_frame(&text),
            Role::ToolInvocation => {
                let gateway = gateway.clone();
                let reply_to = handle.clone();
                tokio::spawn(async move {
                    if let Some(reply) = mcp::handle_message(&gateway, &text).await {
                        if reply_to.send_text(reply).is_err() {
                            debug!("[Hub] Caller went away before its reply was ready");
                        }
                    }
                });
            }
        }
    }

    gateway.connections().release(role, connection_id);
    writer.abort();
}

/// Run a JSON-RPC session over stdin/stdout as the tool-invocation role.
/// Returns when stdin reaches EOF and every reply has been written.
pub async fn serve_stdio(gateway: Arc<Gateway>) -> HubResult<()> {
    serve_lines(gateway, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Line-delimited JSON-RPC session over any byte stream pair.
///
/// Requests are handled concurrently; at EOF the session waits for the
/// outstanding ones and flushes their replies before returning.
pub async fn serve_lines<R, W>(gateway: Arc<Gateway>, input: R, mut output: W) -> HubResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (handle, mut outbound) = ConnectionHandle::channel();
    let session_id = handle.id();
    gateway
        .connections()
        .install(Role::ToolInvocation, handle.clone());

    let writer = tokio::spawn(async move {
        while let Some(OutboundFrame::Text(text)) = outbound.recv().await {
            let written = async {
                output.write_all(text.as_bytes()).await?;
                output.write_all(b"\n").await?;
                output.flush().await
            };
            if let Err(e) = written.await {
                warn!("[Hub] stdout write failed: {}", e);
                break;
            }
        }
    });

    let mut requests = JoinSet::new();
    let mut reader = BufReader::new(input);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("[Hub] stdin read failed: {}", e);
                break;
            }
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let gateway = gateway.clone();
        let reply_to = handle.clone();
        let text = trimmed.to_string();
        requests.spawn(async move {
            if let Some(reply) = mcp::handle_message(&gateway, &text).await {
                let _ = reply_to.send_text(reply);
            }
        });
    }

    while let Some(joined) = requests.join_next().await {
        if let Err(e) = joined {
            warn!("[Hub] stdio request task failed: {}", e);
        }
    }
    info!("[Hub] stdio session ended");
    gateway
        .connections()
        .release(Role::ToolInvocation, session_id);
    // the writer drains the queue and stops once the last sender is gone
    drop(handle);
    if let Err(e) = writer.await {
        warn!("[Hub] stdio writer failed: {}", e);
    }
    Ok(())
}
