//! End-to-end lookups through the service facade over the mock
//! transport.

use addrd_electrum::mock::MockTransport;
use addrd_electrum::Endpoint;
use addrd_lookup::{EndpointPolicy, LookupError, LookupService};
use addrd_primitives::{lookup_key, Network};

const P2PKH: &str = "1BoatSLRHtKNngkdXEeobR76b53LETtpyT";
const P2WPKH: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";

fn service(transport: MockTransport, hosts: &[&str]) -> LookupService<MockTransport> {
    let fallback = hosts
        .iter()
        .map(|host| Endpoint::new(*host, 50001))
        .collect();
    LookupService::new(transport, fallback, Network::Mainnet)
}

#[tokio::test]
async fn single_address_balance_and_history() {
    let transport = MockTransport::new();
    let key = lookup_key(P2PKH, Network::Mainnet).expect("key");
    transport.add_utxo(&key, 150_000_000);
    transport.add_history(&key, 812_000);
    transport.add_history(&key, 0);
    let service = service(transport.clone(), &["a"]);

    let summary = service
        .address_details(P2PKH, None, &EndpointPolicy::default())
        .await
        .expect("details");
    assert_eq!(summary.address, P2PKH);
    assert_eq!(summary.balance, 150_000_000);
    assert_eq!(summary.confirmed, 1);
    assert_eq!(summary.unconfirmed, 1);
    assert_eq!(summary.total, 2);
    assert_eq!(transport.open_count(), transport.close_count());
}

#[tokio::test]
async fn invalid_address_never_touches_the_network() {
    let transport = MockTransport::new();
    let service = service(transport.clone(), &["a"]);

    let err = service
        .address_details("not-an-address", None, &EndpointPolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LookupError::InvalidAddress(_)));
    assert!(transport.attempts().is_empty());
}

#[tokio::test]
async fn requested_endpoint_is_tried_before_fallback() {
    let transport = MockTransport::new();
    let key = lookup_key(P2PKH, Network::Mainnet).expect("key");
    transport.add_utxo(&key, 1);
    let requested = Endpoint::new("caller", 50001);
    transport.refuse_connect(&requested);
    let service = service(transport.clone(), &["a"]);

    let summary = service
        .address_details(P2PKH, Some(&requested), &EndpointPolicy::default())
        .await
        .expect("details");
    assert_eq!(summary.balance, 1);
    assert_eq!(transport.attempts(), vec!["caller:50001", "a:50001"]);
}

#[tokio::test]
async fn exclusive_endpoint_is_not_retried_elsewhere() {
    let transport = MockTransport::new();
    let requested = Endpoint::new("caller", 50001);
    transport.refuse_connect(&requested);
    let service = service(transport.clone(), &["a", "b"]);

    let err = service
        .address_details(
            P2PKH,
            Some(&requested),
            &EndpointPolicy::ExclusiveIfFlagged { exclusive: true },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LookupError::AllEndpointsFailed { attempts: 1 }));
    assert_eq!(transport.attempts(), vec!["caller:50001"]);
}

#[tokio::test]
async fn batch_dedups_and_skips_invalid_entries() {
    let transport = MockTransport::new();
    let key_a = lookup_key(P2PKH, Network::Mainnet).expect("key");
    let key_b = lookup_key(P2WPKH, Network::Mainnet).expect("key");
    transport.add_utxo(&key_a, 40);
    transport.add_utxo(&key_b, 2);
    transport.add_history(&key_b, 900_000);
    let service = service(transport.clone(), &["a"]);

    let addresses = vec![
        P2PKH.to_string(),
        P2PKH.to_string(),
        "garbage".to_string(),
        P2WPKH.to_string(),
    ];
    let batch = service
        .batch_details(&addresses, None, &EndpointPolicy::default())
        .await
        .expect("batch");
    assert_eq!(batch.fetched, 2);
    assert_eq!(batch.addresses[0].address, P2PKH);
    assert_eq!(batch.addresses[1].address, P2WPKH);
    assert_eq!(batch.total_balance, 42);
    assert_eq!(batch.total_confirmed, 1);
    assert_eq!(transport.open_count(), 1);
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn batch_of_only_invalid_addresses_is_rejected() {
    let transport = MockTransport::new();
    let service = service(transport.clone(), &["a"]);

    let addresses = vec!["garbage".to_string(), "more garbage".to_string()];
    let err = service
        .batch_details(&addresses, None, &EndpointPolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LookupError::NoAddresses));
    assert!(transport.attempts().is_empty());
}

#[tokio::test]
async fn batch_fails_whole_and_retries_on_next_endpoint() {
    let transport = MockTransport::new();
    let key_a = lookup_key(P2PKH, Network::Mainnet).expect("key");
    let key_b = lookup_key(P2WPKH, Network::Mainnet).expect("key");
    transport.add_utxo(&key_a, 10);
    transport.add_utxo(&key_b, 20);
    transport.fail_queries(&Endpoint::new("a", 50001));
    let service = service(transport.clone(), &["a", "b"]);

    let addresses = vec![P2PKH.to_string(), P2WPKH.to_string()];
    let batch = service
        .batch_details(&addresses, None, &EndpointPolicy::default())
        .await
        .expect("batch");
    assert_eq!(batch.total_balance, 30);
    assert_eq!(transport.attempts(), vec!["a:50001", "b:50001"]);
    assert_eq!(transport.open_count(), 2);
    assert_eq!(transport.close_count(), 2);
}
