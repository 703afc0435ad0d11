//! Duplex channel to a capability provider.
//!
//! Messages are newline-delimited JSON-RPC. Every outbound request carries
//! its own id; a background reader task matches responses against a map of
//! pending requests, so responses are never paired by arrival order.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use super::protocol::{
    error_codes, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId,
};
use crate::core::ProviderConfig;

/// Error type for channel traffic.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel closed")]
    Closed,

    #[error("Timed out after {0:?} waiting for a response")]
    Timeout(Duration),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("JSON-RPC error: {0}")]
    Rpc(#[from] JsonRpcError),
}

type Reply = Result<JsonRpcResponse, TransportError>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// State shared between callers and the reader task.
struct Shared {
    name: String,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<Reply>>>,
    closed: AtomicBool,
    writer: AsyncMutex<BoxedWriter>,
}

impl Shared {
    async fn write_message<T: Serialize>(&self, message: &T) -> Result<(), TransportError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn handle_line(&self, line: &str) {
        match serde_json::from_str::<JsonRpcMessage>(line) {
            Ok(JsonRpcMessage::Response(response)) => {
                let waiter = self.pending.lock().remove(&response.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(Ok(response));
                    }
                    None => {
                        tracing::debug!(
                            provider = %self.name,
                            id = %response.id,
                            "Discarding response with no pending request"
                        );
                    }
                }
            }
            Ok(JsonRpcMessage::Request(request)) => self.answer_peer_request(request).await,
            Ok(JsonRpcMessage::Notification(notification)) => {
                tracing::debug!(
                    provider = %self.name,
                    method = %notification.method,
                    "Provider notification"
                );
            }
            Err(e) => self.fail_sole_pending(line, &e),
        }
    }

    /// A line we cannot read is charged to the one request that could own it.
    fn fail_sole_pending(&self, line: &str, error: &serde_json::Error) {
        let mut pending = self.pending.lock();
        if pending.len() == 1 {
            let id = pending.keys().next().cloned();
            if let Some(tx) = id.and_then(|id| pending.remove(&id)) {
                let _ = tx.send(Err(TransportError::Malformed(error.to_string())));
                return;
            }
        }

        let preview: String = line.chars().take(120).collect();
        tracing::warn!(
            provider = %self.name,
            error = %error,
            line = %preview,
            "Skipping unreadable message"
        );
    }

    async fn answer_peer_request(&self, request: JsonRpcRequest) {
        let response = if request.method == "ping" {
            JsonRpcResponse::success(request.id, Value::Object(serde_json::Map::new()))
        } else {
            tracing::debug!(provider = %self.name, method = %request.method, "Unsupported provider request");
            JsonRpcResponse::failure(
                request.id,
                JsonRpcError::new(
                    error_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {}", request.method),
                ),
            )
        };

        if let Err(e) = self.write_message(&response).await {
            tracing::warn!(provider = %self.name, error = %e, "Failed to answer provider request");
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self.pending.lock().drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(TransportError::Closed));
        }
    }
}

/// Removes a pending entry when its waiter goes away, whatever the reason.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.id);
    }
}

/// One duplex channel to one provider.
pub struct Transport {
    shared: Arc<Shared>,
    next_id: AtomicI64,
    reader: JoinHandle<()>,
    child: Option<Child>,
}

impl Transport {
    /// Wrap an externally supplied channel.
    ///
    /// Must be called inside a Tokio runtime: the reader task is spawned here.
    pub fn from_streams<R, W>(name: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared {
            name: name.into(),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            writer: AsyncMutex::new(Box::new(writer)),
        });

        let reader = tokio::spawn(read_loop(Arc::clone(&shared), BufReader::new(reader)));

        Self { shared, next_id: AtomicI64::new(1), reader, child: None }
    }

    /// Start a provider process and talk to it over its stdin/stdout.
    pub fn spawn(config: &ProviderConfig) -> Result<Self, TransportError> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);

        for (key, value) in &config.env {
            // Expand environment variables in the value
            let expanded = shellexpand::env(value).unwrap_or_else(|_| value.clone().into());
            cmd.env(key, expanded.as_ref());
        }

        if let Some(ref cwd) = config.cwd {
            cmd.current_dir(cwd);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("failed to capture provider stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("failed to capture provider stdout"))?;

        tracing::debug!(provider = %config.name, command = %config.command, "Spawned provider process");

        let mut transport = Self::from_streams(config.name.clone(), stdout, stdin);
        transport.child = Some(child);
        Ok(transport)
    }

    /// Provider name used in logs.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Whether this transport started (and therefore owns) the provider process.
    pub fn owns_process(&self) -> bool {
        self.child.is_some()
    }

    /// Number of requests waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Send a request and wait for its response.
    ///
    /// A JSON-RPC error response comes back as [`TransportError::Rpc`].
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id.clone(), tx);
        let _guard = PendingGuard { shared: &self.shared, id: id.clone() };

        // The reader may have drained the map between the check and the insert.
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        tracing::debug!(provider = %self.shared.name, id = %id, method, "MCP request");
        self.shared.write_message(&JsonRpcRequest::new(id, method, params)).await?;

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply?,
            Ok(Err(_)) => return Err(TransportError::Closed),
            Err(_) => return Err(TransportError::Timeout(timeout)),
        };

        match response.error {
            Some(error) => Err(TransportError::Rpc(error)),
            None => Ok(response.result.unwrap_or(Value::Null)),
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.shared.write_message(&JsonRpcNotification::new(method, params)).await
    }

    /// Close the channel.
    ///
    /// A provider process started by [`Transport::spawn`] is killed; an
    /// externally supplied channel is only shut down on our side.
    pub async fn close(mut self) {
        self.shared.close();
        self.reader.abort();

        {
            let mut writer = self.shared.writer.lock().await;
            let _ = writer.shutdown().await;
        }

        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
            tracing::debug!(provider = %self.shared.name, "Provider process stopped");
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shared.close();
        self.reader.abort();
    }
}

async fn read_loop<R: AsyncRead + Unpin>(shared: Arc<Shared>, mut reader: BufReader<R>) {
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                tracing::debug!(provider = %shared.name, "Provider closed the channel");
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim();
                if !line.is_empty() {
                    shared.handle_line(line).await;
                }
            }
            Err(e) => {
                tracing::warn!(provider = %shared.name, error = %e, "Error reading from provider");
                break;
            }
        }
    }

    shared.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{duplex, split, AsyncBufReadExt};

    /// Transport plus the provider's side of the channel.
    fn pair() -> (
        Transport,
        tokio::io::Lines<BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>>,
        tokio::io::WriteHalf<tokio::io::DuplexStream>,
    ) {
        let (client, provider) = duplex(16 * 1024);
        let (client_read, client_write) = split(client);
        let (provider_read, provider_write) = split(provider);
        let transport = Transport::from_streams("test", client_read, client_write);
        (transport, BufReader::new(provider_read).lines(), provider_write)
    }

    async fn reply(writer: &mut tokio::io::WriteHalf<tokio::io::DuplexStream>, value: Value) {
        let mut line = value.to_string();
        line.push('\n');
        writer.write_all(line.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn test_request_matches_response_by_id() {
        let (transport, mut lines, mut writer) = pair();

        let provider = async {
            let line = lines.next_line().await.unwrap().unwrap();
            let request: JsonRpcRequest = serde_json::from_str(&line).unwrap();
            assert_eq!(request.method, "tools/list");
            // An unrelated response first; it must not be taken for ours.
            reply(&mut writer, json!({"jsonrpc": "2.0", "id": 999, "result": {"stray": true}}))
                .await;
            reply(&mut writer, json!({"jsonrpc": "2.0", "id": request.id, "result": {"ok": 1}}))
                .await;
        };

        let (result, ()) =
            tokio::join!(transport.request("tools/list", None, Duration::from_secs(5)), provider);
        assert_eq!(result.unwrap(), json!({"ok": 1}));
        assert_eq!(transport.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_rpc_error_is_reported() {
        let (transport, mut lines, mut writer) = pair();

        let provider = async {
            let line = lines.next_line().await.unwrap().unwrap();
            let request: JsonRpcRequest = serde_json::from_str(&line).unwrap();
            reply(
                &mut writer,
                json!({"jsonrpc": "2.0", "id": request.id, "error": {"code": -32601, "message": "no"}}),
            )
            .await;
        };

        let (result, ()) =
            tokio::join!(transport.request("bogus", None, Duration::from_secs(5)), provider);
        assert!(matches!(result.unwrap_err(), TransportError::Rpc(e) if e.code == -32601));
    }

    #[tokio::test]
    async fn test_malformed_reply_fails_the_pending_request() {
        let (transport, mut lines, mut writer) = pair();

        let provider = async {
            let _ = lines.next_line().await.unwrap().unwrap();
            writer.write_all(b"{\"jsonrpc\": \"2.0\", \"id\": 1, \"res\n").await.unwrap();
        };

        let (result, ()) =
            tokio::join!(transport.request("tools/list", None, Duration::from_secs(5)), provider);
        assert!(matches!(result.unwrap_err(), TransportError::Malformed(_)));
        assert!(!transport.is_closed());
    }

    #[tokio::test]
    async fn test_timeout_clears_pending_entry() {
        let (transport, _lines, _writer) = pair();

        let err =
            transport.request("tools/list", None, Duration::from_millis(30)).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
        assert_eq!(transport.pending_count(), 0);
        assert!(!transport.is_closed());
    }

    #[tokio::test]
    async fn test_eof_fails_pending_and_later_requests() {
        let (transport, mut lines, writer) = pair();

        let provider = async move {
            let _ = lines.next_line().await;
            drop(writer);
            drop(lines);
        };

        let (result, ()) =
            tokio::join!(transport.request("tools/list", None, Duration::from_secs(5)), provider);
        assert!(matches!(result.unwrap_err(), TransportError::Closed));
        assert!(transport.is_closed());

        let err = transport.request("tools/list", None, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn test_provider_ping_is_answered() {
        let (transport, mut lines, mut writer) = pair();

        reply(&mut writer, json!({"jsonrpc": "2.0", "id": "p1", "method": "ping"})).await;
        let line = lines.next_line().await.unwrap().unwrap();
        let response: JsonRpcResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(response.id, RequestId::from("p1"));
        assert!(response.is_success());
        assert!(!transport.owns_process());
    }
}
