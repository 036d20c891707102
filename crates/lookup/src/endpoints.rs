//! Candidate endpoint selection.

use addrd_electrum::Endpoint;

use crate::LookupError;

/// How a request's own endpoint interacts with the configured
/// fallback roster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EndpointPolicy {
    /// The caller must name an endpoint; the roster is never used.
    ExplicitRequired,
    /// Caller's endpoint first (when present), then the roster.
    ExplicitThenFallback,
    /// `exclusive: true` pins the caller's endpoint; `false` uses the
    /// roster alone.
    ExclusiveIfFlagged { exclusive: bool },
}

impl Default for EndpointPolicy {
    fn default() -> Self {
        EndpointPolicy::ExplicitThenFallback
    }
}

/// Well-known public servers, used when no roster is configured.
pub fn default_fallback_servers() -> Vec<Endpoint> {
    [
        ("electrum.blockstream.info", 50001),
        ("electrum.emzy.de", 50001),
        ("fulcrum.sethforprivacy.com", 50001),
    ]
    .into_iter()
    .map(|(host, port)| Endpoint::new(host, port))
    .collect()
}

/// Builds the ordered, de-duplicated candidate list for one request.
pub fn select_endpoints(
    requested: Option<&Endpoint>,
    policy: &EndpointPolicy,
    fallback: &[Endpoint],
) -> Result<Vec<Endpoint>, LookupError> {
    let mut selected: Vec<Endpoint> = Vec::new();
    match policy {
        EndpointPolicy::ExplicitRequired => {
            let endpoint = requested.ok_or(LookupError::MissingEndpoint)?;
            selected.push(endpoint.clone());
        }
        EndpointPolicy::ExplicitThenFallback => {
            if let Some(endpoint) = requested {
                selected.push(endpoint.clone());
            }
            for endpoint in fallback {
                if !selected.contains(endpoint) {
                    selected.push(endpoint.clone());
                }
            }
        }
        EndpointPolicy::ExclusiveIfFlagged { exclusive: true } => {
            let endpoint = requested.ok_or(LookupError::MissingEndpoint)?;
            selected.push(endpoint.clone());
        }
        EndpointPolicy::ExclusiveIfFlagged { exclusive: false } => {
            selected.extend(fallback.iter().cloned());
        }
    }
    if selected.is_empty() {
        return Err(LookupError::MissingEndpoint);
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<Endpoint> {
        vec![Endpoint::new("fallback-a", 50001), Endpoint::new("fallback-b", 50001)]
    }

    #[test]
    fn explicit_required_needs_an_endpoint() {
        let err = select_endpoints(None, &EndpointPolicy::ExplicitRequired, &roster()).unwrap_err();
        assert!(matches!(err, LookupError::MissingEndpoint));

        let requested = Endpoint::new("caller", 50001);
        let selected =
            select_endpoints(Some(&requested), &EndpointPolicy::ExplicitRequired, &roster())
                .expect("select");
        assert_eq!(selected, vec![requested]);
    }

    #[test]
    fn explicit_then_fallback_orders_caller_first() {
        let requested = Endpoint::new("caller", 50001);
        let selected = select_endpoints(
            Some(&requested),
            &EndpointPolicy::ExplicitThenFallback,
            &roster(),
        )
        .expect("select");
        assert_eq!(selected.len(), 3);
        assert_eq!(selected[0], requested);
        assert_eq!(selected[1].host, "fallback-a");
        assert_eq!(selected[2].host, "fallback-b");
    }

    #[test]
    fn explicit_then_fallback_dedups_caller_endpoint() {
        let requested = Endpoint::new("fallback-a", 50001);
        let selected = select_endpoints(
            Some(&requested),
            &EndpointPolicy::ExplicitThenFallback,
            &roster(),
        )
        .expect("select");
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0], requested);
    }

    #[test]
    fn exclusive_flag_pins_or_ignores_caller() {
        let requested = Endpoint::new("caller", 50001);
        let pinned = select_endpoints(
            Some(&requested),
            &EndpointPolicy::ExclusiveIfFlagged { exclusive: true },
            &roster(),
        )
        .expect("select");
        assert_eq!(pinned, vec![requested.clone()]);

        let roster_only = select_endpoints(
            Some(&requested),
            &EndpointPolicy::ExclusiveIfFlagged { exclusive: false },
            &roster(),
        )
        .expect("select");
        assert_eq!(roster_only, roster());
    }

    #[test]
    fn empty_everything_is_an_error() {
        let err =
            select_endpoints(None, &EndpointPolicy::ExplicitThenFallback, &[]).unwrap_err();
        assert!(matches!(err, LookupError::MissingEndpoint));
    }
}
