//! Fixed classification and lookup-key vectors across both networks.

use addrd_primitives::{decode_address, lookup_key, AddressKind, Network};

#[test]
fn classification_vectors() {
    let cases = [
        (
            "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2",
            Network::Mainnet,
            AddressKind::P2pkh,
        ),
        (
            "3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy",
            Network::Mainnet,
            AddressKind::P2sh,
        ),
        (
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
            Network::Mainnet,
            AddressKind::P2wpkh,
        ),
        (
            "bc1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qccfmv3",
            Network::Mainnet,
            AddressKind::P2wsh,
        ),
        (
            "mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn",
            Network::Testnet,
            AddressKind::P2pkh,
        ),
        (
            "2MzQwSSnBHWHqSAqtTVQ6v47XtaisrJa1Vc",
            Network::Testnet,
            AddressKind::P2sh,
        ),
        (
            "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx",
            Network::Testnet,
            AddressKind::P2wpkh,
        ),
    ];
    for (text, network, kind) in cases {
        let address = decode_address(text, network)
            .unwrap_or_else(|err| panic!("decode {text}: {err}"));
        assert_eq!(address.kind, kind, "{text}");
    }
}

// Vector from the Electrum protocol documentation.
#[test]
fn documented_lookup_key_vector() {
    let key = lookup_key("1HZwkjkeaoZfTSaJxDw6aKkxp45agDiEzN", Network::Mainnet).expect("derive");
    assert_eq!(
        key,
        "8b01df4e368ea28f8dc0423bcf7a4923e3a12d307c875e47a0cfbf90b5c39161"
    );
}
