//! Scripted in-process transport for tests.
//!
//! Endpoints default to healthy; tests can mark one as refusing
//! connections or failing every query, seed unspent/history rows per
//! script hash, and assert the open/close bookkeeping afterwards.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::{Connection, ElectrumError, Endpoint, HistoryItem, Transport, Utxo};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MockBehavior {
    Healthy,
    RefuseConnect,
    FailQueries,
}

#[derive(Default)]
struct MockState {
    utxos: Mutex<HashMap<String, Vec<Utxo>>>,
    history: Mutex<HashMap<String, Vec<HistoryItem>>>,
    failing_scripts: Mutex<HashSet<String>>,
    behaviors: Mutex<HashMap<String, MockBehavior>>,
    attempts: Mutex<Vec<String>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_connect(&self, endpoint: &Endpoint) {
        self.set_behavior(endpoint, MockBehavior::RefuseConnect);
    }

    pub fn fail_queries(&self, endpoint: &Endpoint) {
        self.set_behavior(endpoint, MockBehavior::FailQueries);
    }

    pub fn set_behavior(&self, endpoint: &Endpoint, behavior: MockBehavior) {
        self.state
            .behaviors
            .lock()
            .expect("behaviors lock")
            .insert(endpoint.to_string(), behavior);
    }

    pub fn add_utxo(&self, script_hash: &str, value: u64) {
        let mut utxos = self.state.utxos.lock().expect("utxos lock");
        let rows = utxos.entry(script_hash.to_string()).or_default();
        let index = rows.len() as u32;
        rows.push(Utxo {
            tx_hash: format!("{:064x}", index + 1),
            tx_pos: index,
            height: 100,
            value,
        });
    }

    pub fn add_history(&self, script_hash: &str, height: i64) {
        let mut history = self.state.history.lock().expect("history lock");
        let rows = history.entry(script_hash.to_string()).or_default();
        let index = rows.len() as u32;
        rows.push(HistoryItem {
            tx_hash: format!("{:064x}", index + 1),
            height,
        });
    }

    pub fn fail_script(&self, script_hash: &str) {
        self.state
            .failing_scripts
            .lock()
            .expect("failing scripts lock")
            .insert(script_hash.to_string());
    }

    /// Endpoints in connect order, one entry per attempt.
    pub fn attempts(&self) -> Vec<String> {
        self.state.attempts.lock().expect("attempts lock").clone()
    }

    pub fn open_count(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    type Conn = MockConnection;

    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<MockConnection, ElectrumError>> + Send {
        let state = Arc::clone(&self.state);
        let endpoint = endpoint.to_string();
        async move {
            state
                .attempts
                .lock()
                .expect("attempts lock")
                .push(endpoint.clone());
            let behavior = state
                .behaviors
                .lock()
                .expect("behaviors lock")
                .get(&endpoint)
                .copied()
                .unwrap_or(MockBehavior::Healthy);
            if behavior == MockBehavior::RefuseConnect {
                return Err(ElectrumError::Connect(format!(
                    "connect to {endpoint} refused"
                )));
            }
            state.opened.fetch_add(1, Ordering::SeqCst);
            Ok(MockConnection {
                state,
                fail_queries: behavior == MockBehavior::FailQueries,
                closed: Arc::new(AtomicBool::new(false)),
            })
        }
    }
}

#[derive(Clone)]
pub struct MockConnection {
    state: Arc<MockState>,
    fail_queries: bool,
    closed: Arc<AtomicBool>,
}

impl MockConnection {
    fn check_usable(&self, script_hash: &str) -> Result<(), ElectrumError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ElectrumError::ConnectionClosed);
        }
        if self.fail_queries {
            return Err(ElectrumError::Rpc {
                code: 1,
                message: "scripted query failure".to_string(),
            });
        }
        let failing = self.state.failing_scripts.lock().expect("failing scripts lock");
        if failing.contains(script_hash) {
            return Err(ElectrumError::Rpc {
                code: 1,
                message: format!("scripted failure for {script_hash}"),
            });
        }
        Ok(())
    }
}

impl Connection for MockConnection {
    fn list_unspent(
        &self,
        script_hash: &str,
    ) -> impl Future<Output = Result<Vec<Utxo>, ElectrumError>> + Send {
        let conn = self.clone();
        let script_hash = script_hash.to_string();
        async move {
            conn.check_usable(&script_hash)?;
            let utxos = conn.state.utxos.lock().expect("utxos lock");
            Ok(utxos.get(&script_hash).cloned().unwrap_or_default())
        }
    }

    fn get_history(
        &self,
        script_hash: &str,
    ) -> impl Future<Output = Result<Vec<HistoryItem>, ElectrumError>> + Send {
        let conn = self.clone();
        let script_hash = script_hash.to_string();
        async move {
            conn.check_usable(&script_hash)?;
            let history = conn.state.history.lock().expect("history lock");
            Ok(history.get(&script_hash).cloned().unwrap_or_default())
        }
    }

    fn close(&self) -> impl Future<Output = ()> + Send {
        let conn = self.clone();
        async move {
            if !conn.closed.swap(true, Ordering::SeqCst) {
                conn.state.closed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn close_is_idempotent() {
        let transport = MockTransport::new();
        let endpoint = Endpoint::new("mock", 50001);
        let conn = transport.connect(&endpoint).await.expect("connect");
        conn.close().await;
        conn.close().await;
        assert_eq!(transport.open_count(), 1);
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn queries_fail_after_close() {
        let transport = MockTransport::new();
        let endpoint = Endpoint::new("mock", 50001);
        let conn = transport.connect(&endpoint).await.expect("connect");
        conn.close().await;
        let err = conn.list_unspent("00").await.unwrap_err();
        assert!(matches!(err, ElectrumError::ConnectionClosed));
    }

    #[tokio::test]
    async fn seeded_rows_come_back() {
        let transport = MockTransport::new();
        transport.add_utxo("aa", 1500);
        transport.add_history("aa", 12);
        transport.add_history("aa", 0);
        let endpoint = Endpoint::new("mock", 50001);
        let conn = transport.connect(&endpoint).await.expect("connect");
        let utxos = conn.list_unspent("aa").await.expect("listunspent");
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].value, 1500);
        let history = conn.get_history("aa").await.expect("history");
        assert_eq!(history.len(), 2);
        conn.close().await;
    }
}
