//! Lookup engine: endpoint selection, per-key queries, batch
//! aggregation and endpoint failover.

use std::fmt;

pub mod endpoints;
pub mod failover;
pub mod query;
pub mod service;

pub use endpoints::{default_fallback_servers, select_endpoints, EndpointPolicy};
pub use failover::run_with_failover;
pub use query::{aggregate, fetch_summary, AddressSummary, BatchSummary};
pub use service::LookupService;

#[derive(Debug)]
pub enum LookupError {
    /// The input failed classification; no network traffic happened.
    InvalidAddress(String),
    /// Nothing left to look up after de-duplication and filtering.
    NoAddresses,
    /// The policy requires an endpoint and none was supplied/configured.
    MissingEndpoint,
    /// Every candidate endpoint was tried once and failed.
    AllEndpointsFailed { attempts: usize },
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::InvalidAddress(message) => write!(f, "invalid address: {message}"),
            LookupError::NoAddresses => write!(f, "no valid addresses provided"),
            LookupError::MissingEndpoint => write!(f, "no endpoint available"),
            LookupError::AllEndpointsFailed { attempts } => {
                write!(f, "all {attempts} endpoint(s) failed")
            }
        }
    }
}

impl std::error::Error for LookupError {}
