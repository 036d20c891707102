//! Per-key query execution and batch aggregation.

use addrd_electrum::{Connection, ElectrumError};
use tokio::task::JoinSet;

/// Balance and history counts for one address, satoshis throughout.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressSummary {
    pub address: String,
    pub balance: u64,
    pub confirmed: usize,
    pub unconfirmed: usize,
    pub total: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatchSummary {
    pub addresses: Vec<AddressSummary>,
    pub total_balance: u64,
    pub total_confirmed: usize,
    pub total_unconfirmed: usize,
    pub fetched: usize,
}

/// Exactly two remote calls per key: unspent outputs, then history.
/// Any failure aborts the summary; no partial result is produced.
pub async fn fetch_summary<C: Connection>(
    conn: &C,
    address: &str,
    script_hash: &str,
) -> Result<AddressSummary, ElectrumError> {
    let unspent = conn.list_unspent(script_hash).await?;
    let history = conn.get_history(script_hash).await?;

    let mut balance: u64 = 0;
    for utxo in &unspent {
        balance = balance.checked_add(utxo.value).ok_or_else(|| {
            ElectrumError::Protocol("address balance overflow".to_string())
        })?;
    }
    let confirmed = history.iter().filter(|entry| entry.height > 0).count();
    let total = history.len();
    Ok(AddressSummary {
        address: address.to_string(),
        balance,
        confirmed,
        unconfirmed: total - confirmed,
        total,
    })
}

/// Queries every `(address, script_hash)` pair concurrently over the
/// one shared connection and folds the results. All-or-nothing: the
/// first failure shuts the remaining tasks down, waits for them to
/// settle, and fails the whole batch so the coordinator can retry it
/// as a unit elsewhere.
pub async fn aggregate<C: Connection>(
    conn: &C,
    entries: &[(String, String)],
) -> Result<BatchSummary, ElectrumError> {
    let mut set = JoinSet::new();
    for (index, (address, script_hash)) in entries.iter().enumerate() {
        let conn = conn.clone();
        let address = address.clone();
        let script_hash = script_hash.clone();
        set.spawn(async move { (index, fetch_summary(&conn, &address, &script_hash).await) });
    }

    // Completion order is arbitrary; slots keep results aligned with
    // the input order.
    let mut slots: Vec<Option<AddressSummary>> = vec![None; entries.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, Ok(summary))) => slots[index] = Some(summary),
            Ok((_, Err(err))) => {
                set.shutdown().await;
                return Err(err);
            }
            Err(err) => {
                set.shutdown().await;
                return Err(ElectrumError::Protocol(format!("query task failed: {err}")));
            }
        }
    }

    let mut addresses = Vec::with_capacity(entries.len());
    let mut total_balance: u64 = 0;
    let mut total_confirmed = 0usize;
    let mut total_unconfirmed = 0usize;
    for slot in slots {
        let summary = slot.ok_or_else(|| {
            ElectrumError::Protocol("query result went missing".to_string())
        })?;
        total_balance = total_balance.checked_add(summary.balance).ok_or_else(|| {
            ElectrumError::Protocol("batch balance overflow".to_string())
        })?;
        total_confirmed += summary.confirmed;
        total_unconfirmed += summary.unconfirmed;
        addresses.push(summary);
    }
    Ok(BatchSummary {
        fetched: addresses.len(),
        addresses,
        total_balance,
        total_confirmed,
        total_unconfirmed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use addrd_electrum::mock::MockTransport;
    use addrd_electrum::{Endpoint, Transport};

    #[tokio::test]
    async fn summary_splits_confirmed_and_unconfirmed() {
        let transport = MockTransport::new();
        transport.add_utxo("aa", 100_000_000);
        transport.add_utxo("aa", 50_000_000);
        transport.add_history("aa", 500);
        transport.add_history("aa", 0);
        transport.add_history("aa", -1);
        let conn = transport
            .connect(&Endpoint::new("mock", 50001))
            .await
            .expect("connect");

        let summary = fetch_summary(&conn, "addr", "aa").await.expect("summary");
        assert_eq!(summary.balance, 150_000_000);
        assert_eq!(summary.confirmed, 1);
        assert_eq!(summary.unconfirmed, 2);
        assert_eq!(summary.total, 3);
        conn.close().await;
    }

    #[tokio::test]
    async fn empty_history_single_utxo_scenario() {
        let transport = MockTransport::new();
        transport.add_utxo("aa", 150_000_000);
        let conn = transport
            .connect(&Endpoint::new("mock", 50001))
            .await
            .expect("connect");

        let summary = fetch_summary(&conn, "addr", "aa").await.expect("summary");
        assert_eq!(summary.balance, 150_000_000);
        assert_eq!(summary.confirmed, 0);
        assert_eq!(summary.unconfirmed, 0);
        assert_eq!(summary.total, 0);
        conn.close().await;
    }

    #[tokio::test]
    async fn aggregate_preserves_input_order_and_sums() {
        let transport = MockTransport::new();
        transport.add_utxo("aa", 10);
        transport.add_utxo("bb", 20);
        transport.add_history("bb", 7);
        let conn = transport
            .connect(&Endpoint::new("mock", 50001))
            .await
            .expect("connect");

        let entries = vec![
            ("first".to_string(), "aa".to_string()),
            ("second".to_string(), "bb".to_string()),
        ];
        let batch = aggregate(&conn, &entries).await.expect("aggregate");
        assert_eq!(batch.fetched, 2);
        assert_eq!(batch.addresses[0].address, "first");
        assert_eq!(batch.addresses[1].address, "second");
        assert_eq!(batch.total_balance, 30);
        assert_eq!(batch.total_confirmed, 1);
        assert_eq!(batch.total_unconfirmed, 0);
        conn.close().await;
    }

    #[tokio::test]
    async fn aggregate_is_all_or_nothing() {
        let transport = MockTransport::new();
        transport.add_utxo("aa", 10);
        transport.add_utxo("cc", 30);
        transport.fail_script("bb");
        let conn = transport
            .connect(&Endpoint::new("mock", 50001))
            .await
            .expect("connect");

        let entries = vec![
            ("first".to_string(), "aa".to_string()),
            ("second".to_string(), "bb".to_string()),
            ("third".to_string(), "cc".to_string()),
        ];
        let err = aggregate(&conn, &entries).await.unwrap_err();
        assert!(matches!(err, ElectrumError::Rpc { .. }));
        conn.close().await;
    }
}
