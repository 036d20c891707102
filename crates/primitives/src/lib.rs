//! Address decoding and lookup-key derivation.

pub mod address;
pub mod hash;

pub use address::{
    address_to_script_pubkey, decode_address, lookup_key, script_hash, script_hash_hex, Address,
    AddressError, AddressKind, Network,
};
pub use hash::{hash256_to_hex, sha256, sha256d, Hash256};
