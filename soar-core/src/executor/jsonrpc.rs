//! Executor backed by a persistent JSON-RPC daemon over a WebSocket.
//!
//! File transfer and command execution are native RPC methods on the remote
//! side, so no wrapper or `cat`/`base64` round trips are involved.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dashmap::DashMap;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::{ExecOptions, ExecOutput, Executor, cancellable};
use crate::error::{Result, SoarError};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = std::result::Result<Value, SoarError>;
type Pending = Arc<DashMap<u64, oneshot::Sender<Reply>>>;

/// Path appended to the daemon URL.
pub const JSONRPC_PATH: &str = "jsonrpc";
const MAX_REQUEST_ID: u64 = 1_000_000_000;

#[derive(Clone, PartialEq, Eq)]
pub struct JsonRpcSettings {
    /// `ws://` or `wss://` base URL of the daemon.
    pub url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for JsonRpcSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRpcSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl JsonRpcSettings {
    fn endpoint(&self) -> Result<Url> {
        let mut endpoint = Url::parse(&self.url)
            .map_err(|e| SoarError::provisioning(format!("invalid daemon url {}: {e}", self.url)))?;
        {
            let mut segments = endpoint.path_segments_mut().map_err(|_| {
                SoarError::provisioning(format!("daemon url {} cannot carry a path", self.url))
            })?;
            segments.pop_if_empty().push(JSONRPC_PATH);
        }
        Ok(endpoint)
    }

    fn authorization(&self) -> String {
        let credentials = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(credentials.as_bytes()))
    }
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl From<RpcError> for SoarError {
    fn from(err: RpcError) -> Self {
        let data = err.data.map(|d| d.to_string()).unwrap_or_default();
        SoarError::execution(format!("{}: {} {}", err.code, err.message, data).trim_end())
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    id: u64,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

pub struct JsonRpcExecutor {
    sink: Mutex<SplitSink<Socket, Message>>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    call_lock: Mutex<()>,
    endpoint: Url,
}

impl fmt::Debug for JsonRpcExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRpcExecutor")
            .field("endpoint", &self.endpoint.as_str())
            .field("pending", &self.pending.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Drop for JsonRpcExecutor {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl JsonRpcExecutor {
    /// Opens the socket and authenticates in the handshake.
    pub async fn connect(settings: JsonRpcSettings, cancel: &CancellationToken) -> Result<Self> {
        let endpoint = settings.endpoint()?;
        let mut request = endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| SoarError::provisioning(format!("invalid websocket request: {e}")))?;
        let auth = HeaderValue::from_str(&settings.authorization())
            .map_err(|e| SoarError::provisioning(format!("invalid credentials: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let (socket, _) = cancellable(cancel, "jsonrpc connect", async {
            connect_async(request).await.map_err(|e| {
                SoarError::provisioning(format!("failed to connect to {endpoint}: {e}"))
            })
        })
        .await?;
        info!(target: "soar::executor", %endpoint, "connected to jsonrpc daemon");

        let (sink, stream) = socket.split();
        let pending: Pending = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_replies(stream, pending.clone(), closed.clone()));

        Ok(Self {
            sink: Mutex::new(sink),
            pending,
            closed,
            reader,
            call_lock: Mutex::new(()),
            endpoint,
        })
    }

    fn register(&self, tx: oneshot::Sender<Reply>) -> u64 {
        let mut rng = rand::rng();
        loop {
            let id = rng.random_range(0..MAX_REQUEST_ID);
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.pending.entry(id) {
                slot.insert(tx);
                return id;
            }
        }
    }

    async fn invoke(&self, method: &str, params: Value, cancel: &CancellationToken) -> Result<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SoarError::execution("jsonrpc connection is closed"));
        }
        let (tx, rx) = oneshot::channel();
        let id = self.register(tx);
        // the reader may have drained the table between the check and the insert
        if self.closed.load(Ordering::Acquire) {
            self.pending.remove(&id);
            return Err(SoarError::execution("jsonrpc connection is closed"));
        }
        let request = json!({ "id": id, "method": method, "params": params });
        debug!(target: "soar::executor", id, method, "jsonrpc call");

        let call = async {
            self.sink
                .lock()
                .await
                .send(Message::Text(request.to_string()))
                .await
                .map_err(|e| SoarError::execution(format!("jsonrpc send failed: {e}")))?;
            rx.await
                .map_err(|_| SoarError::execution("jsonrpc connection closed before reply"))?
        };
        let result = cancellable(cancel, method, call).await;
        if result.is_err() {
            self.pending.remove(&id);
        }
        result
    }

    /// Methods exposed by the daemon.
    pub async fn list_methods(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        let value = self.invoke("system.ListMethods", json!([]), cancel).await?;
        Ok(serde_json::from_value(value)?)
    }
}

async fn read_replies(mut stream: SplitStream<Socket>, pending: Pending, closed: Arc<AtomicBool>) {
    let reason = loop {
        let text = match stream.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(Ok(Message::Close(frame))) => {
                break format!("closed by daemon: {frame:?}");
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => break format!("connection error: {e}"),
            None => break "connection ended".to_string(),
        };

        let response: RpcResponse = match serde_json::from_str(&text) {
            Ok(response) => response,
            Err(e) => {
                warn!(target: "soar::executor", error = %e, "discarding malformed jsonrpc reply");
                continue;
            }
        };
        let Some((_, tx)) = pending.remove(&response.id) else {
            debug!(target: "soar::executor", id = response.id, "reply for unknown call");
            continue;
        };
        let reply = match response.error {
            Some(error) => Err(SoarError::from(error)),
            None => Ok(response.result),
        };
        let _ = tx.send(reply);
    };

    closed.store(true, Ordering::Release);
    warn!(target: "soar::executor", %reason, in_flight = pending.len(), "jsonrpc connection lost");
    let ids: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, tx)) = pending.remove(&id) {
            let _ = tx.send(Err(SoarError::execution(format!("jsonrpc {reason}"))));
        }
    }
}

#[async_trait]
impl Executor for JsonRpcExecutor {
    fn name(&self) -> &str {
        "jsonrpc"
    }

    async fn run(
        &self,
        cmd: &[String],
        options: &ExecOptions,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput> {
        let _guard = self.call_lock.lock().await;
        let params = json!([
            cmd,
            {
                "env": options.env_pairs(),
                "ignoreStdout": options.ignore_stdout,
                "ignoreStderr": options.ignore_stderr,
            }
        ]);
        let value = self.invoke("Run", params, cancel).await?;
        let output: ExecOutput = serde_json::from_value(value)?;
        output.check(options)
    }

    async fn read_file(&self, path: &str, cancel: &CancellationToken) -> Result<String> {
        let _guard = self.call_lock.lock().await;
        let value = self.invoke("ReadFile", json!([path]), cancel).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn write_file(&self, path: &str, content: &str, cancel: &CancellationToken) -> Result<()> {
        let _guard = self.call_lock.lock().await;
        self.invoke("WriteFile", json!([path, content]), cancel).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    /// Serves one connection, answering each call with `respond`.
    async fn daemon(
        respond: fn(&str, &Value) -> Value,
    ) -> (String, Arc<StdMutex<Option<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen_auth = Arc::new(StdMutex::new(None));
        let seen = seen_auth.clone();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = move |req: &Request, resp: Response| {
                *seen.lock().unwrap() = req
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                Ok::<_, ErrorResponse>(resp)
            };
            let mut ws = accept_hdr_async(tcp, callback).await.unwrap();
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let call: Value = serde_json::from_str(&text).unwrap();
                let method = call["method"].as_str().unwrap().to_string();
                let mut reply = respond(&method, &call["params"]);
                reply["id"] = call["id"].clone();
                ws.send(Message::Text(reply.to_string())).await.unwrap();
            }
        });
        (format!("ws://{addr}"), seen_auth)
    }

    fn settings(url: String) -> JsonRpcSettings {
        JsonRpcSettings {
            url,
            username: "soar".into(),
            password: "secret".into(),
        }
    }

    #[test]
    fn endpoint_appends_jsonrpc_path() {
        let s = settings("ws://10.0.0.5:8080/".into());
        assert_eq!(s.endpoint().unwrap().as_str(), "ws://10.0.0.5:8080/jsonrpc");
        assert_eq!(s.authorization(), "Basic c29hcjpzZWNyZXQ=");
    }

    #[tokio::test]
    async fn calls_are_correlated_and_errors_surface() {
        let (url, seen_auth) = daemon(|method, params| match method {
            "Run" => json!({ "result": { "stdout": params[0].to_string(), "stderr": "" } }),
            "ReadFile" => json!({ "error": { "code": 404, "message": "no such file" } }),
            "system.ListMethods" => json!({ "result": ["Run", "ReadFile", "WriteFile"] }),
            _ => json!({ "result": null }),
        })
        .await;
        let cancel = CancellationToken::new();
        let exec = JsonRpcExecutor::connect(settings(url), &cancel).await.unwrap();

        let out = exec
            .run(&["id".to_string()], &ExecOptions::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(out.stdout, r#"["id"]"#);

        let err = exec.read_file("/missing", &cancel).await.unwrap_err();
        assert!(err.is_execution());
        assert!(err.to_string().contains("404: no such file"));

        exec.write_file("/tmp/in", "x", &cancel).await.unwrap();
        assert_eq!(exec.list_methods(&cancel).await.unwrap().len(), 3);
        assert_eq!(
            seen_auth.lock().unwrap().as_deref(),
            Some("Basic c29hcjpzZWNyZXQ=")
        );
    }

    #[tokio::test]
    async fn remote_stderr_fails_run() {
        let (url, _) = daemon(|_, _| json!({ "result": { "stdout": "", "stderr": "denied" } })).await;
        let cancel = CancellationToken::new();
        let exec = JsonRpcExecutor::connect(settings(url), &cancel).await.unwrap();
        let err = exec
            .run(&["naabu".to_string()], &ExecOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_execution());
    }
}
