//! Minimal HTTP/1.1 backend exposing the result slot.
//!
//! One request per connection. Routes:
//! - `GET|POST|DELETE /api/data` read, overwrite (verbatim) or clear the slot
//! - `GET|POST /api/status` operator status line (memory only)
//! - `GET /health`

use crate::publisher::{PublisherStatus, StatusBoard};
use crate::store::ResultStore;
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const MAX_HEAD_BYTES: usize = 8192;
const MAX_BODY_BYTES: usize = 1024 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:3000".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            join.await
                .map_err(|e| anyhow!("api server task failed: {e}"))?;
        }
        Ok(())
    }
}

pub struct ApiServer<S> {
    cfg: ApiConfig,
    store: Arc<S>,
    status: StatusBoard,
}

impl<S: ResultStore + 'static> ApiServer<S> {
    pub fn new(cfg: ApiConfig, store: Arc<S>, status: StatusBoard) -> Self {
        Self { cfg, store, status }
    }

    pub async fn spawn(self) -> Result<ApiHandle> {
        let listener = TcpListener::bind(&self.cfg.addr)
            .await
            .with_context(|| format!("bind {}", self.cfg.addr))?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel();
        let join = tokio::spawn(run_api(listener, self.store, self.status, rx));
        Ok(ApiHandle {
            addr,
            shutdown: Some(tx),
            join: Some(join),
        })
    }
}

async fn run_api<S: ResultStore + 'static>(
    listener: TcpListener,
    store: Arc<S>,
    status: StatusBoard,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let store = store.clone();
                    let status = status.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, store.as_ref(), &status).await {
                            log::warn!("request from {peer} rejected: {err:#}");
                        }
                    });
                }
                Err(err) => {
                    log::error!("accept failed: {err}");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }
    log::info!("api server stopped");
}

#[derive(Debug, thiserror::Error)]
enum RequestError {
    #[error("request too large")]
    TooLarge,
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

/// Response: status code plus optional JSON body.
#[derive(Debug)]
struct Reply {
    status: u16,
    body: Option<Value>,
}

impl Reply {
    fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self::json(status, json!({ "error": message }))
    }

    fn success() -> Self {
        Self::json(200, json!({ "success": true }))
    }
}

async fn handle_connection<S: ResultStore + ?Sized>(
    mut stream: TcpStream,
    store: &S,
    status: &StatusBoard,
) -> Result<()> {
    let request = match read_request(&mut stream).await {
        Ok(r) => r,
        Err(RequestError::TooLarge) => {
            write_reply(&mut stream, &Reply::error(413, "request too large")).await?;
            return Err(RequestError::TooLarge.into());
        }
        Err(RequestError::Malformed(msg)) => {
            write_reply(&mut stream, &Reply::error(400, "malformed request")).await?;
            return Err(anyhow!(msg));
        }
        Err(RequestError::Io(e)) => return Err(e.into()),
    };
    log::debug!("{} {}", request.method, request.path);
    let reply = route(&request, store, status).await;
    write_reply(&mut stream, &reply).await
}

async fn route<S: ResultStore + ?Sized>(
    request: &HttpRequest,
    store: &S,
    status: &StatusBoard,
) -> Reply {
    if request.method == "OPTIONS" {
        return Reply {
            status: 204,
            body: None,
        };
    }
    match (request.path.as_str(), request.method.as_str()) {
        ("/health", "GET") => Reply::json(200, json!({ "status": "ok" })),
        ("/api/data", "GET") => match store.get().await {
            Ok(value) => Reply::json(200, value.unwrap_or(Value::Null)),
            Err(e) => {
                log::error!("failed to read result slot: {e}");
                Reply::error(500, "Failed to read data")
            }
        },
        ("/api/data", "POST") => {
            let value: Value = match serde_json::from_slice(&request.body) {
                Ok(v) => v,
                Err(_) => return Reply::error(400, "invalid JSON body"),
            };
            match store.put(&value).await {
                Ok(()) => Reply::success(),
                Err(e) => {
                    log::error!("failed to write result slot: {e}");
                    Reply::error(500, "Failed to write data")
                }
            }
        }
        ("/api/data", "DELETE") => match store.clear().await {
            Ok(()) => Reply::success(),
            Err(e) => {
                log::error!("failed to clear result slot: {e}");
                Reply::error(500, "Failed to clear data")
            }
        },
        ("/api/status", "GET") => match serde_json::to_value(status.current()) {
            Ok(v) => Reply::json(200, v),
            Err(_) => Reply::error(500, "Failed to read status"),
        },
        ("/api/status", "POST") => {
            match serde_json::from_slice::<PublisherStatus>(&request.body) {
                Ok(s) => {
                    status.set(s);
                    Reply::success()
                }
                Err(_) => Reply::error(400, "invalid status body"),
            }
        }
        ("/health" | "/api/data" | "/api/status", _) => Reply::error(405, "method not allowed"),
        _ => Reply::error(404, "not found"),
    }
}

fn find_head_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn read_some(stream: &mut TcpStream, buf: &mut [u8]) -> Result<usize, RequestError> {
    match tokio::time::timeout(READ_TIMEOUT, stream.read(buf)).await {
        Ok(n) => Ok(n?),
        Err(_) => Err(RequestError::Malformed("read timed out".into())),
    }
}

async fn read_request(stream: &mut TcpStream) -> Result<HttpRequest, RequestError> {
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let head_end = loop {
        if let Some(pos) = find_head_end(&data) {
            break pos;
        }
        if data.len() > MAX_HEAD_BYTES {
            return Err(RequestError::TooLarge);
        }
        let n = read_some(stream, &mut buf).await?;
        if n == 0 {
            return Err(RequestError::Malformed("connection closed mid-request".into()));
        }
        data.extend_from_slice(&buf[..n]);
    };
    if head_end > MAX_HEAD_BYTES {
        return Err(RequestError::TooLarge);
    }

    let head = String::from_utf8_lossy(&data[..head_end]);
    let mut lines = head.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| RequestError::Malformed("empty request".into()))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RequestError::Malformed("missing method".into()))?;
    let raw_path = parts
        .next()
        .ok_or_else(|| RequestError::Malformed("missing path".into()))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(v) => v
            .parse::<usize>()
            .map_err(|_| RequestError::Malformed(format!("bad content-length {v:?}")))?,
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(RequestError::TooLarge);
    }

    let mut body = data[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = read_some(stream, &mut buf).await?;
        if n == 0 {
            return Err(RequestError::Malformed("body shorter than content-length".into()));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_ascii_uppercase(),
        path,
        body,
    })
}

async fn write_reply(stream: &mut TcpStream, reply: &Reply) -> Result<()> {
    let body = match &reply.body {
        Some(v) => serde_json::to_vec(v)?,
        None => Vec::new(),
    };
    let status_line = match reply.status {
        200 => "HTTP/1.1 200 OK",
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST, DELETE, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\nConnection: close\r\n\r\n",
        len = body.len()
    );
    stream.write_all(header.as_bytes()).await?;
    stream.write_all(&body).await?;
    let _ = stream.shutdown().await;
    Ok(())
}
