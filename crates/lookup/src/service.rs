//! Request-scoped facade: classify, derive, select, then fail over.

use std::collections::HashSet;
use std::sync::Arc;

use addrd_electrum::{Endpoint, Transport};
use addrd_primitives::{lookup_key, Network};

use crate::endpoints::{select_endpoints, EndpointPolicy};
use crate::failover::run_with_failover;
use crate::query::{aggregate, fetch_summary, AddressSummary, BatchSummary};
use crate::LookupError;

/// Stateless per-request lookups against a configured transport and
/// fallback roster. Nothing is cached between calls.
pub struct LookupService<T> {
    transport: T,
    fallback: Vec<Endpoint>,
    network: Network,
}

impl<T: Transport> LookupService<T> {
    pub fn new(transport: T, fallback: Vec<Endpoint>, network: Network) -> Self {
        Self {
            transport,
            fallback,
            network,
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn fallback(&self) -> &[Endpoint] {
        &self.fallback
    }

    pub async fn address_details(
        &self,
        address: &str,
        requested: Option<&Endpoint>,
        policy: &EndpointPolicy,
    ) -> Result<AddressSummary, LookupError> {
        let key = lookup_key(address, self.network)
            .map_err(|err| LookupError::InvalidAddress(format!("{address}: {err}")))?;
        let candidates = select_endpoints(requested, policy, &self.fallback)?;
        let owned = (address.to_string(), key);
        run_with_failover(&self.transport, &candidates, move |conn| {
            let (address, key) = owned.clone();
            async move { fetch_summary(&conn, &address, &key).await }
        })
        .await
    }

    /// Batch lookup. Duplicates are dropped keeping first-occurrence
    /// order; addresses that fail classification are skipped rather
    /// than failing the batch. An empty working set never touches the
    /// network.
    pub async fn batch_details(
        &self,
        addresses: &[String],
        requested: Option<&Endpoint>,
        policy: &EndpointPolicy,
    ) -> Result<BatchSummary, LookupError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for address in addresses {
            if !seen.insert(address.as_str()) {
                continue;
            }
            match lookup_key(address, self.network) {
                Ok(key) => entries.push((address.clone(), key)),
                Err(err) => eprintln!("skipping address {address}: {err}"),
            }
        }
        if entries.is_empty() {
            return Err(LookupError::NoAddresses);
        }
        let candidates = select_endpoints(requested, policy, &self.fallback)?;
        let entries = Arc::new(entries);
        run_with_failover(&self.transport, &candidates, move |conn| {
            let entries = Arc::clone(&entries);
            async move { aggregate(&conn, &entries).await }
        })
        .await
    }
}
