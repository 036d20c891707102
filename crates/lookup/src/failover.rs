//! Endpoint failover: one attempt per candidate, teardown on every
//! path, first success wins.

use std::future::Future;

use addrd_electrum::{Connection, ElectrumError, Endpoint, Transport};

use crate::LookupError;

/// Drives the candidate list. The unit of work is injected as an
/// async strategy taking a clone of the connection handle; connect
/// failures and work failures both disqualify the current endpoint
/// and advance to the next. The connection is closed after the work's
/// result is captured, never before, and exactly once per attempt.
pub async fn run_with_failover<T, W, Fut, V>(
    transport: &T,
    endpoints: &[Endpoint],
    mut work: W,
) -> Result<V, LookupError>
where
    T: Transport,
    W: FnMut(T::Conn) -> Fut,
    Fut: Future<Output = Result<V, ElectrumError>>,
{
    if endpoints.is_empty() {
        return Err(LookupError::MissingEndpoint);
    }
    for endpoint in endpoints {
        let conn = match transport.connect(endpoint).await {
            Ok(conn) => conn,
            Err(err) => {
                eprintln!("endpoint {endpoint} unreachable: {err}");
                continue;
            }
        };
        let result = work(conn.clone()).await;
        conn.close().await;
        match result {
            Ok(value) => return Ok(value),
            Err(err) => eprintln!("endpoint {endpoint} failed: {err}"),
        }
    }
    Err(LookupError::AllEndpointsFailed {
        attempts: endpoints.len(),
    })
}
