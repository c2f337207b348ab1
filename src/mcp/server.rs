//! MCP stdio server implementation
//!
//! One JSON-RPC message per line on stdin. Each request runs on its own task
//! and responses are funnelled through a single writer, so a slow tool call
//! never blocks `ping` or a `notifications/cancelled` for it.

use super::tools::{get_tool_definitions, handle_tool_call, ToolContext};
use super::types::{
    CallToolParams, CancelledParams, McpError, McpMessage, McpNotification, McpRequest,
    McpResponse,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::StepGuard;
use crate::store::VectorStore;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Tokens of running requests by JSON-RPC id; a client may reuse an id, so
/// each dispatch is tagged with its own sequence number
type InFlight = HashMap<String, Vec<(u64, CancellationToken)>>;

/// MCP Server implementation
pub struct McpServer {
    config: Arc<Config>,
    store: Arc<dyn VectorStore>,
    shutdown: CancellationToken,
    in_flight: Arc<Mutex<InFlight>>,
    next_dispatch: AtomicU64,
}

impl McpServer {
    /// Create a new MCP server; cancelling `shutdown` stops it and every call in flight
    pub fn new(config: Config, store: Arc<dyn VectorStore>, shutdown: CancellationToken) -> Self {
        Self {
            config: Arc::new(config),
            store,
            shutdown,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_dispatch: AtomicU64::new(0),
        }
    }

    /// Run the MCP server loop over stdio
    pub async fn run(&self) -> Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.serve(stdin, tokio::io::stdout()).await?;
        Ok(())
    }

    /// Serve messages from `reader` until EOF or shutdown, returning the writer
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<W>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        info!("MCP server starting on stdio");

        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(write_lines(rx, writer));
        let mut tasks = JoinSet::new();
        let mut lines = reader.lines();

        loop {
            let line = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(l)) => l,
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read line: {}", e);
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            debug!("Received: {}", line);

            let message: McpMessage = match serde_json::from_str(&line) {
                Ok(m) => m,
                Err(e) => {
                    error!("Failed to parse message: {}", e);
                    let response =
                        McpResponse::error(None, McpError::parse_error(format!("Parse error: {}", e)));
                    send(&tx, &response);
                    continue;
                }
            };

            match message {
                McpMessage::Request(request) => self.dispatch(request, &tx, &mut tasks),
                McpMessage::Notification(notification) => {
                    self.handle_notification(notification)
                }
                McpMessage::Response(_) => {
                    warn!("Unexpected response message received");
                }
            }

            // Reap finished calls so the set does not grow for the whole session
            while tasks.try_join_next().is_some() {}
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Request task failed: {}", e);
            }
        }

        drop(tx);
        let writer = writer_task
            .await
            .map_err(|e| Error::McpProtocol(format!("Writer task failed: {}", e)))??;

        info!("MCP server shutting down");
        Ok(writer)
    }

    /// Spawn a task for one request, tracking its token for cancellation
    fn dispatch(
        &self,
        request: McpRequest,
        tx: &mpsc::UnboundedSender<String>,
        tasks: &mut JoinSet<()>,
    ) {
        let token = self.shutdown.child_token();
        let tracked = request
            .id
            .as_ref()
            .map(request_key)
            .map(|key| {
                let seq = self.track(key.clone(), token.clone());
                (key, seq)
            });

        let config = Arc::clone(&self.config);
        let store = Arc::clone(&self.store);
        let in_flight = Arc::clone(&self.in_flight);
        let tx = tx.clone();

        tasks.spawn(async move {
            let response = handle_request(request, &config, store.as_ref(), token.clone()).await;

            if let Some((key, seq)) = &tracked {
                untrack(&in_flight, key, *seq);
            }

            // A cancelled request gets no response
            if token.is_cancelled() {
                debug!("Dropping response for cancelled request");
                return;
            }
            send(&tx, &response);
        });
    }

    fn track(&self, key: String, token: CancellationToken) -> u64 {
        let seq = self.next_dispatch.fetch_add(1, Ordering::Relaxed);
        match self.in_flight.lock() {
            Ok(mut map) => map.entry(key).or_default().push((seq, token)),
            Err(e) => error!("In-flight table poisoned: {}", e),
        }
        seq
    }

    /// Handle notifications (fire-and-forget)
    fn handle_notification(&self, notification: McpNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                info!("Client initialized");
            }
            "notifications/cancelled" => {
                let params: Option<CancelledParams> = notification
                    .params
                    .and_then(|p| serde_json::from_value(p).ok());
                let Some(params) = params else {
                    warn!("Cancellation without a requestId");
                    return;
                };

                let key = request_key(&params.request_id);
                let tokens: Vec<CancellationToken> = self
                    .in_flight
                    .lock()
                    .ok()
                    .and_then(|map| map.get(&key).cloned())
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(_, token)| token)
                    .collect();
                if tokens.is_empty() {
                    debug!(request_id = %key, "Cancellation for unknown request");
                    return;
                }

                info!(
                    request_id = %key,
                    reason = params.reason.as_deref().unwrap_or(""),
                    "Request cancelled"
                );
                for token in tokens {
                    token.cancel();
                }
            }
            _ => {
                debug!("Unknown notification: {}", notification.method);
            }
        }
    }
}

/// Stable map key for a JSON-RPC id (number or string)
fn request_key(id: &Value) -> String {
    id.to_string()
}

/// Drop one finished dispatch, leaving other requests that share its id
fn untrack(in_flight: &Mutex<InFlight>, key: &str, seq: u64) {
    let Ok(mut map) = in_flight.lock() else {
        return;
    };
    if let Some(entries) = map.get_mut(key) {
        entries.retain(|(s, _)| *s != seq);
        if entries.is_empty() {
            map.remove(key);
        }
    }
}

fn send(tx: &mpsc::UnboundedSender<String>, response: &McpResponse) {
    match serde_json::to_string(response) {
        Ok(line) => {
            debug!("Sending: {}", line);
            if tx.send(line).is_err() {
                warn!("Writer closed; response dropped");
            }
        }
        Err(e) => error!("Failed to serialize response: {}", e),
    }
}

async fn write_lines<W>(mut rx: mpsc::UnboundedReceiver<String>, mut writer: W) -> Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(writer)
}

/// Handle an MCP request
async fn handle_request(
    request: McpRequest,
    config: &Config,
    store: &dyn VectorStore,
    token: CancellationToken,
) -> McpResponse {
    let id = request.id.clone();

    if request.jsonrpc != "2.0" {
        return McpResponse::error(
            id,
            McpError::invalid_request(format!("Unsupported jsonrpc version: {}", request.jsonrpc)),
        );
    }

    match request.method.as_str() {
        "initialize" => handle_initialize(id),
        "ping" => McpResponse::success(id, json!({})),
        "tools/list" => McpResponse::success(id, json!({ "tools": get_tool_definitions() })),
        "tools/call" => handle_tools_call(id, request.params, config, store, token).await,
        "resources/list" => McpResponse::success(id, json!({ "resources": [] })),
        "prompts/list" => McpResponse::success(id, json!({ "prompts": [] })),
        _ => McpResponse::error(id, McpError::method_not_found(&request.method)),
    }
}

/// Handle initialize request
fn handle_initialize(id: Option<Value>) -> McpResponse {
    McpResponse::success(
        id,
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {
                    "listChanged": false
                },
                "resources": {
                    "subscribe": false,
                    "listChanged": false
                },
                "prompts": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": "docvec",
                "version": env!("CARGO_PKG_VERSION")
            }
        }),
    )
}

/// Handle tools/call request
async fn handle_tools_call(
    id: Option<Value>,
    params: Option<Value>,
    config: &Config,
    store: &dyn VectorStore,
    token: CancellationToken,
) -> McpResponse {
    let params: CallToolParams = match params.map(serde_json::from_value) {
        Some(Ok(p)) => p,
        Some(Err(_)) => {
            return McpResponse::error(id, McpError::invalid_params("Missing tool name"))
        }
        None => return McpResponse::error(id, McpError::invalid_params("Missing params")),
    };

    debug!("Calling tool: {} with args: {:?}", params.name, params.arguments);

    let ctx = ToolContext {
        config,
        store,
        guard: StepGuard::from_config(config, token),
    };

    match handle_tool_call(&params.name, params.arguments, &ctx).await {
        Ok(result) => match serde_json::to_value(&result) {
            Ok(value) => McpResponse::success(id, value),
            Err(e) => McpResponse::error(id, McpError::internal_error(e.to_string())),
        },
        Err(e) => McpResponse::error(id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Point, SearchResult};
    use async_trait::async_trait;
    use std::time::Duration;

    fn server(store: Arc<dyn VectorStore>) -> McpServer {
        McpServer::new(Config::default(), store, CancellationToken::new())
    }

    async fn exchange(server: &McpServer, input: &str) -> Vec<Value> {
        let output = server.serve(input.as_bytes(), Vec::new()).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn by_id(responses: &[Value], id: i64) -> &Value {
        responses
            .iter()
            .find(|r| r["id"] == id)
            .unwrap_or_else(|| panic!("no response for id {}", id))
    }

    /// Store whose listing never finishes on its own
    struct StalledStore;

    #[async_trait]
    impl VectorStore for StalledStore {
        async fn list_collections(&self) -> Result<Vec<String>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }

        async fn create_collection(&self, _name: &str, _vector_size: usize) -> Result<()> {
            Ok(())
        }

        async fn upsert(&self, _collection: &str, _points: Vec<Point>) -> Result<()> {
            Ok(())
        }

        async fn search(
            &self,
            _collection: &str,
            _vector: &[f32],
            _limit: usize,
        ) -> Result<Vec<SearchResult>> {
            Ok(Vec::new())
        }

        async fn delete_collection(&self, _name: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let server = server(Arc::new(MemoryStore::new()));
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"test","version":"0"}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );

        let responses = exchange(&server, input).await;

        assert_eq!(responses.len(), 2);
        let init = by_id(&responses, 1);
        assert_eq!(init["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(init["result"]["serverInfo"]["name"], "docvec");
        let tools = by_id(&responses, 2)["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 4);
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let server = server(Arc::new(MemoryStore::new()));
        let input = concat!(
            "this is not json\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"sampling/createMessage"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"search","arguments":{"query":"q"}}}"#,
            "\n",
        );

        let responses = exchange(&server, input).await;

        let parse = responses.iter().find(|r| r["id"].is_null()).unwrap();
        assert_eq!(parse["error"]["code"], -32700);
        assert_eq!(by_id(&responses, 2)["error"]["code"], -32601);
        assert_eq!(by_id(&responses, 3)["error"]["code"], -32601);
        let invalid = by_id(&responses, 4);
        assert_eq!(invalid["error"]["code"], -32602);
        assert_eq!(invalid["error"]["message"], "Invalid arguments for search");
    }

    #[tokio::test]
    async fn test_tool_call_round_trip() {
        let store = Arc::new(MemoryStore::new());
        store.create_collection("docs", 3).await.unwrap();
        let server = server(store);
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"name":"list_collections"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#,
            "\n",
        );

        let responses = exchange(&server, input).await;

        let list = responses.iter().find(|r| r["id"] == "a").unwrap();
        assert_eq!(list["result"]["content"][0]["type"], "text");
        assert_eq!(list["result"]["content"][0]["text"], "[\n  \"docs\"\n]");
        assert!(list["result"].get("isError").is_none());
        assert_eq!(by_id(&responses, 7)["result"], json!({}));
    }

    #[tokio::test]
    async fn test_cancelled_request_gets_no_response() {
        let server = server(Arc::new(StalledStore));
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"list_collections"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":1,"reason":"user"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        );

        let responses = tokio::time::timeout(Duration::from_secs(5), exchange(&server, input))
            .await
            .expect("cancelled call must not hold the server open");

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 2);
    }

    #[tokio::test]
    async fn test_cancellation_reaches_every_request_sharing_an_id() {
        let server = server(Arc::new(StalledStore));
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"list_collections"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"list_collections"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":1}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        );

        let responses = tokio::time::timeout(Duration::from_secs(5), exchange(&server, input))
            .await
            .expect("both calls must be cancelled");

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 2);
    }

    #[test]
    fn test_finished_dispatch_keeps_duplicate_id_cancellable() {
        let server = server(Arc::new(MemoryStore::new()));
        let first = CancellationToken::new();
        let second = CancellationToken::new();
        let key = request_key(&json!(1));

        let first_seq = server.track(key.clone(), first.clone());
        server.track(key.clone(), second.clone());
        untrack(&server.in_flight, &key, first_seq);

        server.handle_notification(McpNotification {
            jsonrpc: "2.0".to_string(),
            method: "notifications/cancelled".to_string(),
            params: Some(json!({ "requestId": 1 })),
        });

        assert!(second.is_cancelled());
        assert!(!first.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_calls() {
        let shutdown = CancellationToken::new();
        let server = McpServer::new(Config::default(), Arc::new(StalledStore), shutdown.clone());
        let (mut client, server_io) = tokio::io::duplex(4096);

        client
            .write_all(
                concat!(
                    r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"list_collections"}}"#,
                    "\n"
                )
                .as_bytes(),
            )
            .await
            .unwrap();

        let canceller = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.cancel();
        };
        let serving = server.serve(tokio::io::BufReader::new(server_io), Vec::new());

        let (output, _) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(serving, canceller)
        })
        .await
        .expect("server must stop on shutdown");

        assert!(output.unwrap().is_empty());
    }
}
