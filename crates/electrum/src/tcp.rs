//! Plaintext ElectrumX transport over TCP.
//!
//! Requests are newline-framed JSON-RPC 2.0. A reader task routes
//! responses back to callers through per-request oneshot channels
//! keyed by id, so concurrent queries can share one connection.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::{Connection, ElectrumError, Endpoint, HistoryItem, Transport, Utxo};

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

const CLIENT_NAME: &str = concat!("addrd ", env!("CARGO_PKG_VERSION"));
const PROTOCOL_VERSION: &str = "1.4";

#[derive(Clone, Debug)]
pub struct TcpTransport {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl Transport for TcpTransport {
    type Conn = TcpConnection;

    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<TcpConnection, ElectrumError>> + Send {
        let endpoint = endpoint.clone();
        let connect_timeout = self.connect_timeout;
        let request_timeout = self.request_timeout;
        async move {
            let target = endpoint.to_string();
            let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&target))
                .await
                .map_err(|_| ElectrumError::Connect(format!("connect to {target} timed out")))?
                .map_err(|err| {
                    ElectrumError::Connect(format!("connect to {target} failed: {err}"))
                })?;
            let (read_half, write_half) = stream.into_split();

            let shared = Arc::new(Shared {
                pending: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            });
            let reader = tokio::spawn(read_loop(read_half, Arc::clone(&shared)));
            let conn = TcpConnection {
                inner: Arc::new(ConnInner {
                    request_timeout,
                    next_id: AtomicU64::new(0),
                    writer: tokio::sync::Mutex::new(write_half),
                    shared,
                    reader: Mutex::new(Some(reader)),
                }),
            };

            // Version negotiation doubles as a liveness probe; some
            // servers refuse queries before it.
            if let Err(err) = conn
                .call(
                    "server.version",
                    json!([CLIENT_NAME, PROTOCOL_VERSION]),
                )
                .await
            {
                conn.close().await;
                return Err(ElectrumError::Connect(format!(
                    "handshake with {target} failed: {err}"
                )));
            }
            Ok(conn)
        }
    }
}

struct Shared {
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value, ElectrumError>>>>,
    closed: AtomicBool,
}

impl Shared {
    fn fail_pending(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            for (_, sender) in pending.drain() {
                let _ = sender.send(Err(ElectrumError::ConnectionClosed));
            }
        }
    }
}

struct ConnInner {
    request_timeout: Duration,
    next_id: AtomicU64,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ConnInner {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                handle.abort();
            }
        }
    }
}

#[derive(Clone)]
pub struct TcpConnection {
    inner: Arc<ConnInner>,
}

impl TcpConnection {
    async fn call(&self, method: &str, params: Value) -> Result<Value, ElectrumError> {
        let shared = &self.inner.shared;
        if shared.closed.load(Ordering::SeqCst) {
            return Err(ElectrumError::ConnectionClosed);
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = oneshot::channel();
        {
            let Ok(mut pending) = shared.pending.lock() else {
                return Err(ElectrumError::ConnectionClosed);
            };
            pending.insert(id, sender);
        }

        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut line = request.to_string();
        line.push('\n');
        {
            let mut writer = self.inner.writer.lock().await;
            if let Err(err) = writer.write_all(line.as_bytes()).await {
                self.forget(id);
                return Err(ElectrumError::Io(format!("{method} send failed: {err}")));
            }
        }

        match tokio::time::timeout(self.inner.request_timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ElectrumError::ConnectionClosed),
            Err(_) => {
                self.forget(id);
                Err(ElectrumError::Io(format!("{method} timed out")))
            }
        }
    }

    fn forget(&self, id: u64) {
        if let Ok(mut pending) = self.inner.shared.pending.lock() {
            pending.remove(&id);
        }
    }
}

impl Connection for TcpConnection {
    fn list_unspent(
        &self,
        script_hash: &str,
    ) -> impl Future<Output = Result<Vec<Utxo>, ElectrumError>> + Send {
        let conn = self.clone();
        let script_hash = script_hash.to_string();
        async move {
            let value = conn
                .call("blockchain.scripthash.listunspent", json!([script_hash]))
                .await?;
            let rows = value
                .as_array()
                .ok_or_else(|| malformed("listunspent result is not an array"))?;
            let mut utxos = Vec::with_capacity(rows.len());
            for row in rows {
                utxos.push(Utxo {
                    tx_hash: row
                        .get("tx_hash")
                        .and_then(Value::as_str)
                        .ok_or_else(|| malformed("listunspent row missing tx_hash"))?
                        .to_string(),
                    tx_pos: row
                        .get("tx_pos")
                        .and_then(Value::as_u64)
                        .ok_or_else(|| malformed("listunspent row missing tx_pos"))?
                        as u32,
                    height: row
                        .get("height")
                        .and_then(Value::as_i64)
                        .ok_or_else(|| malformed("listunspent row missing height"))?,
                    value: row
                        .get("value")
                        .and_then(Value::as_u64)
                        .ok_or_else(|| malformed("listunspent row missing value"))?,
                });
            }
            Ok(utxos)
        }
    }

    fn get_history(
        &self,
        script_hash: &str,
    ) -> impl Future<Output = Result<Vec<HistoryItem>, ElectrumError>> + Send {
        let conn = self.clone();
        let script_hash = script_hash.to_string();
        async move {
            let value = conn
                .call("blockchain.scripthash.get_history", json!([script_hash]))
                .await?;
            let rows = value
                .as_array()
                .ok_or_else(|| malformed("get_history result is not an array"))?;
            let mut history = Vec::with_capacity(rows.len());
            for row in rows {
                history.push(HistoryItem {
                    tx_hash: row
                        .get("tx_hash")
                        .and_then(Value::as_str)
                        .ok_or_else(|| malformed("get_history row missing tx_hash"))?
                        .to_string(),
                    height: row
                        .get("height")
                        .and_then(Value::as_i64)
                        .ok_or_else(|| malformed("get_history row missing height"))?,
                });
            }
            Ok(history)
        }
    }

    fn close(&self) -> impl Future<Output = ()> + Send {
        let inner = Arc::clone(&self.inner);
        async move {
            if inner.shared.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            if let Ok(mut reader) = inner.reader.lock() {
                if let Some(handle) = reader.take() {
                    handle.abort();
                }
            }
            let mut writer = inner.writer.lock().await;
            let _ = writer.shutdown().await;
            drop(writer);
            inner.shared.fail_pending();
        }
    }
}

fn malformed(message: &str) -> ElectrumError {
    ElectrumError::Protocol(message.to_string())
}

async fn read_loop(read_half: OwnedReadHalf, shared: Arc<Shared>) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let Ok(value) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };
                // Responses carry our numeric id; subscription
                // notifications do not and are ignored.
                let Some(id) = value.get("id").and_then(Value::as_u64) else {
                    continue;
                };
                let sender = match shared.pending.lock() {
                    Ok(mut pending) => pending.remove(&id),
                    Err(_) => None,
                };
                let Some(sender) = sender else {
                    continue;
                };
                let result = match value.get("error") {
                    Some(error) if !error.is_null() => Err(ElectrumError::Rpc {
                        code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                        message: error
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unspecified server error")
                            .to_string(),
                    }),
                    _ => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
                };
                let _ = sender.send(result);
            }
            Ok(None) | Err(_) => break,
        }
    }
    shared.closed.store(true, Ordering::SeqCst);
    shared.fail_pending();
}
