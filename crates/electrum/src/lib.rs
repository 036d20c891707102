//! Transport boundary for ElectrumX-style indexing servers.
//!
//! The `Transport`/`Connection` trait pair is the seam the lookup
//! engine works against: `tcp` speaks the real newline-framed JSON-RPC
//! dialect, `mock` is the scripted in-process backend used by tests.

use std::fmt;
use std::future::Future;

pub mod mock;
pub mod tcp;

#[derive(Debug)]
pub enum ElectrumError {
    Connect(String),
    Io(String),
    Rpc { code: i64, message: String },
    Protocol(String),
    ConnectionClosed,
}

impl fmt::Display for ElectrumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElectrumError::Connect(message) => write!(f, "{message}"),
            ElectrumError::Io(message) => write!(f, "{message}"),
            ElectrumError::Rpc { code, message } => {
                write!(f, "server error {code}: {message}")
            }
            ElectrumError::Protocol(message) => write!(f, "{message}"),
            ElectrumError::ConnectionClosed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for ElectrumError {}

/// A remote indexing server instance.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let (host, port) = text.rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        let port = port.parse::<u16>().ok()?;
        Some(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One unspent output row, value in satoshis.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Utxo {
    pub tx_hash: String,
    pub tx_pos: u32,
    pub height: i64,
    pub value: u64,
}

/// One history row; height <= 0 means unconfirmed/mempool.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HistoryItem {
    pub tx_hash: String,
    pub height: i64,
}

pub trait Transport: Send + Sync {
    type Conn: Connection;

    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Self::Conn, ElectrumError>> + Send;
}

/// A live session with one endpoint. Handles are cheap clones of the
/// same underlying session and may issue queries concurrently; the
/// transport multiplexes them by request id. `close` is idempotent.
pub trait Connection: Clone + Send + Sync + 'static {
    fn list_unspent(
        &self,
        script_hash: &str,
    ) -> impl Future<Output = Result<Vec<Utxo>, ElectrumError>> + Send;

    fn get_history(
        &self,
        script_hash: &str,
    ) -> impl Future<Output = Result<Vec<HistoryItem>, ElectrumError>> + Send;

    fn close(&self) -> impl Future<Output = ()> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_parse_roundtrip() {
        let endpoint = Endpoint::parse("electrum.example.org:50001").expect("parse");
        assert_eq!(endpoint.host, "electrum.example.org");
        assert_eq!(endpoint.port, 50001);
        assert_eq!(endpoint.to_string(), "electrum.example.org:50001");
    }

    #[test]
    fn endpoint_parse_rejects_garbage() {
        assert!(Endpoint::parse("").is_none());
        assert!(Endpoint::parse("no-port").is_none());
        assert!(Endpoint::parse(":50001").is_none());
        assert!(Endpoint::parse("host:notaport").is_none());
        assert!(Endpoint::parse("host:70000").is_none());
    }
}
