//! In-process fake DevTools endpoint.
//!
//! Serves the HTTP tab API (`/json/new`, `/json/close/{id}`,
//! `/json/version`) and WebSocket sessions on the same port. Replies to
//! calls come from a [`Script`].

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// Script
// ============================================================================

/// What the fake does in answer to one call.
pub enum Reply {
    /// Send these messages, in order.
    Send(Vec<Value>),
    /// Send nothing.
    Silent,
    /// Send a close frame and stop serving the connection.
    Close,
}

/// Maps an inbound call to a reply.
pub type Script = Arc<dyn Fn(&Value) -> Reply + Send + Sync>;

/// Bytes returned by the fake `Page.printToPDF`.
pub const FAKE_PDF: &[u8] = b"%PDF-1.4\n%fake\n1 0 obj\n<<>>\nendobj\ntrailer\n<<>>\n%%EOF\n";

/// Replies the way a headless browser does for the calls a render makes.
pub fn chrome_like() -> Script {
    Arc::new(respond_like_chrome)
}

pub fn respond_like_chrome(call: &Value) -> Reply {
    let id = call["id"].clone();

    match call["method"].as_str().unwrap_or_default() {
        "Page.enable" => Reply::Send(vec![json!({ "id": id, "result": {} })]),
        "Page.navigate" => Reply::Send(vec![
            json!({ "method": "Page.frameStartedLoading", "params": { "frameId": "F1" } }),
            json!({ "id": id, "result": { "frameId": "F1", "loaderId": "L1" } }),
            json!({ "method": "Page.domContentEventFired", "params": { "timestamp": 1.0 } }),
            json!({ "method": "Page.loadEventFired", "params": { "timestamp": 1.5 } }),
            json!({ "method": "Page.frameStoppedLoading", "params": { "frameId": "F1" } }),
        ]),
        "Page.printToPDF" => Reply::Send(vec![
            json!({ "method": "Page.lifecycleEvent", "params": { "name": "networkIdle" } }),
            json!({ "id": id, "result": { "data": Base64Standard.encode(FAKE_PDF) } }),
        ]),
        "Browser.getVersion" => Reply::Send(vec![json!({
            "id": id,
            "result": { "product": "HeadlessChrome/131.0.6778.85", "protocolVersion": "1.3" }
        })]),
        other => Reply::Send(vec![json!({
            "id": id,
            "error": { "code": -32601, "message": format!("'{other}' wasn't found") }
        })]),
    }
}

/// Echoes every call back as a successful result.
pub fn echo() -> Script {
    Arc::new(|call: &Value| {
        Reply::Send(vec![json!({
            "id": call["id"].clone(),
            "result": { "method": call["method"].clone() }
        })])
    })
}

// ============================================================================
// FakeBrowser
// ============================================================================

#[derive(Default)]
struct FakeState {
    targets_created: AtomicUsize,
    closed_targets: Mutex<Vec<String>>,
    connections: Mutex<Vec<Arc<Mutex<Vec<Value>>>>>,
    ws_closed: AtomicUsize,
}

/// A fake DevTools endpoint bound to localhost.
pub struct FakeBrowser {
    port: u16,
    state: Arc<FakeState>,
    task: JoinHandle<()>,
}

impl FakeBrowser {
    /// Starts on a random port.
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake");
        Self::serve(listener, script)
    }

    /// Starts on `port`, retrying while the port is briefly taken.
    pub async fn start_on(port: u16, script: Script) -> Self {
        for _ in 0..200 {
            if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
                return Self::serve(listener, script);
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("could not bind fake browser on port {port}");
    }

    fn serve(listener: TcpListener, script: Script) -> Self {
        let port = listener.local_addr().expect("addr").port();
        let state = Arc::new(FakeState::default());

        let task = {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let state = Arc::clone(&state);
                    let script = Arc::clone(&script);
                    tokio::spawn(handle(stream, port, state, script));
                }
            })
        };

        Self { port, state, task }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn http_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self, id: &str) -> String {
        format!("ws://127.0.0.1:{}/devtools/page/{id}", self.port)
    }

    /// Number of tabs opened through `/json/new`.
    pub fn targets_created(&self) -> usize {
        self.state.targets_created.load(Ordering::SeqCst)
    }

    /// Ids passed to `/json/close/{id}`.
    pub fn closed_targets(&self) -> Vec<String> {
        self.state.closed_targets.lock().clone()
    }

    /// Number of WebSocket connections accepted.
    pub fn connection_count(&self) -> usize {
        self.state.connections.lock().len()
    }

    /// Number of WebSocket connections that ended.
    pub fn ws_closed(&self) -> usize {
        self.state.ws_closed.load(Ordering::SeqCst)
    }

    /// Calls received on the `index`-th WebSocket connection.
    pub fn calls(&self, index: usize) -> Vec<Value> {
        let connections = self.state.connections.lock();
        connections
            .get(index)
            .map(|calls| calls.lock().clone())
            .unwrap_or_default()
    }

    /// Call ids received on the `index`-th WebSocket connection.
    pub fn call_ids(&self, index: usize) -> Vec<u64> {
        self.calls(index)
            .iter()
            .filter_map(|call| call["id"].as_u64())
            .collect()
    }

    /// Methods received on the `index`-th WebSocket connection.
    pub fn call_methods(&self, index: usize) -> Vec<String> {
        self.calls(index)
            .iter()
            .filter_map(|call| call["method"].as_str().map(str::to_string))
            .collect()
    }
}

impl Drop for FakeBrowser {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// Connection Handling
// ============================================================================

async fn handle(stream: TcpStream, port: u16, state: Arc<FakeState>, script: Script) {
    let Some(head) = peek_head(&stream).await else {
        return;
    };

    if head.to_ascii_lowercase().contains("upgrade: websocket") {
        serve_websocket(stream, state, script).await;
    } else {
        serve_http(stream, port, state).await;
    }
}

/// Waits until the request head is buffered and returns it without consuming it.
async fn peek_head(stream: &TcpStream) -> Option<String> {
    let mut buf = vec![0u8; 8192];
    for _ in 0..500 {
        let n = stream.peek(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        let text = String::from_utf8_lossy(&buf[..n]).to_string();
        if text.contains("\r\n\r\n") || n == buf.len() {
            return Some(text);
        }
        sleep(Duration::from_millis(2)).await;
    }
    None
}

async fn serve_websocket(stream: TcpStream, state: Arc<FakeState>, script: Script) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };

    let calls = Arc::new(Mutex::new(Vec::new()));
    state.connections.lock().push(Arc::clone(&calls));

    while let Some(Ok(message)) = ws.next().await {
        match message {
            Message::Text(text) => {
                let call: Value = serde_json::from_str(text.as_str()).expect("call is JSON");
                calls.lock().push(call.clone());

                match script(&call) {
                    Reply::Send(messages) => {
                        for reply in messages {
                            if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Reply::Silent => {}
                    Reply::Close => {
                        let _ = ws.close(None).await;
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.ws_closed.fetch_add(1, Ordering::SeqCst);
}

async fn serve_http(mut stream: TcpStream, port: u16, state: Arc<FakeState>) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let request = String::from_utf8_lossy(&request).to_string();
    let mut parts = request.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();

    let (status, body) = match (method, path) {
        ("PUT", "/json/new") => {
            let n = state.targets_created.fetch_add(1, Ordering::SeqCst) + 1;
            let id = format!("T{n}");
            let body = json!({
                "id": id,
                "type": "page",
                "title": "about:blank",
                "url": "about:blank",
                "webSocketDebuggerUrl": format!("ws://127.0.0.1:{port}/devtools/page/{id}"),
            });
            ("200 OK", body.to_string())
        }
        ("GET", "/json/version") => {
            let body = json!({
                "Browser": "HeadlessChrome/131.0.6778.85",
                "Protocol-Version": "1.3",
                "User-Agent": "Mozilla/5.0 HeadlessChrome",
                "webSocketDebuggerUrl": format!("ws://127.0.0.1:{port}/devtools/browser/B1"),
            });
            ("200 OK", body.to_string())
        }
        ("GET", path) if path.starts_with("/json/close/") => {
            let id = path.trim_start_matches("/json/close/").to_string();
            state.closed_targets.lock().push(id);
            ("200 OK", "\"Target is closing\"".to_string())
        }
        _ => ("404 Not Found", "\"unknown\"".to_string()),
    };

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

// ============================================================================
// Helpers
// ============================================================================

/// Installs a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Returns a port nothing is listening on.
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("addr").port()
}

/// Polls `condition` until it holds or `limit` passes.
pub async fn eventually<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}
