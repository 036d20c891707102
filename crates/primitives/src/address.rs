//! Address classification and locking-script reconstruction.
//!
//! Four spendable templates are recognized: legacy P2PKH (`1…`),
//! P2SH (`3…`), and the two witness-v0 programs (`bc1…`, 20 or 32
//! byte program). The lookup key for the remote index is the SHA-256
//! of the reconstructed script pubkey, hex-encoded in reversed byte
//! order.

use bech32::primitives::hrp::{self, Hrp};
use bech32::segwit;

use crate::hash::{hash256_to_hex, sha256, sha256d, Hash256};

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_EQUAL: u8 = 0x87;
const OP_0: u8 = 0x00;

const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AddressError {
    InvalidLength,
    InvalidCharacter,
    InvalidChecksum,
    UnknownPrefix,
}

impl std::fmt::Display for AddressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressError::InvalidLength => write!(f, "invalid address length"),
            AddressError::InvalidCharacter => write!(f, "invalid address character"),
            AddressError::InvalidChecksum => write!(f, "invalid address checksum"),
            AddressError::UnknownPrefix => write!(f, "unknown address prefix"),
        }
    }
}

impl std::error::Error for AddressError {}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn p2pkh_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x6f,
        }
    }

    pub fn p2sh_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            Network::Testnet => 0xc4,
        }
    }

    pub fn bech32_hrp(self) -> Hrp {
        match self {
            Network::Mainnet => hrp::BC,
            Network::Testnet => hrp::TB,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AddressKind {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
}

impl AddressKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AddressKind::P2pkh => "p2pkh",
            AddressKind::P2sh => "p2sh",
            AddressKind::P2wpkh => "p2wpkh",
            AddressKind::P2wsh => "p2wsh",
        }
    }
}

/// A classified address: its template kind plus the decoded payload
/// (a 20-byte hash for P2PKH/P2SH/P2WPKH, 32 bytes for P2WSH).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Address {
    pub kind: AddressKind,
    pub payload: Vec<u8>,
}

impl Address {
    /// Reconstructs the locking script the chain would place on an
    /// output paying this address.
    pub fn script_pubkey(&self) -> Vec<u8> {
        match self.kind {
            AddressKind::P2pkh => {
                let mut script = Vec::with_capacity(25);
                script.push(OP_DUP);
                script.push(OP_HASH160);
                script.push(self.payload.len() as u8);
                script.extend_from_slice(&self.payload);
                script.push(OP_EQUALVERIFY);
                script.push(OP_CHECKSIG);
                script
            }
            AddressKind::P2sh => {
                let mut script = Vec::with_capacity(23);
                script.push(OP_HASH160);
                script.push(self.payload.len() as u8);
                script.extend_from_slice(&self.payload);
                script.push(OP_EQUAL);
                script
            }
            AddressKind::P2wpkh | AddressKind::P2wsh => {
                let mut script = Vec::with_capacity(2 + self.payload.len());
                script.push(OP_0);
                script.push(self.payload.len() as u8);
                script.extend_from_slice(&self.payload);
                script
            }
        }
    }
}

pub fn decode_address(address: &str, network: Network) -> Result<Address, AddressError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(AddressError::InvalidLength);
    }
    let lowered = trimmed.to_ascii_lowercase();
    if lowered.starts_with("bc1") || lowered.starts_with("tb1") {
        decode_segwit(trimmed, network)
    } else {
        decode_base58check(trimmed, network)
    }
}

fn decode_segwit(address: &str, network: Network) -> Result<Address, AddressError> {
    let (hrp, version, program) =
        segwit::decode(address).map_err(|_| AddressError::InvalidChecksum)?;
    if hrp != network.bech32_hrp() {
        return Err(AddressError::UnknownPrefix);
    }
    if version.to_u8() != 0 {
        return Err(AddressError::UnknownPrefix);
    }
    let kind = match program.len() {
        20 => AddressKind::P2wpkh,
        32 => AddressKind::P2wsh,
        _ => return Err(AddressError::InvalidLength),
    };
    Ok(Address {
        kind,
        payload: program,
    })
}

fn decode_base58check(address: &str, network: Network) -> Result<Address, AddressError> {
    let decoded = base58_decode(address)?;
    if decoded.len() < 5 {
        return Err(AddressError::InvalidLength);
    }
    let (payload, checksum) = decoded.split_at(decoded.len() - 4);
    if sha256d(payload)[..4] != *checksum {
        return Err(AddressError::InvalidChecksum);
    }
    let version = payload[0];
    let hash = &payload[1..];
    let kind = if version == network.p2pkh_version() {
        AddressKind::P2pkh
    } else if version == network.p2sh_version() {
        AddressKind::P2sh
    } else {
        return Err(AddressError::UnknownPrefix);
    };
    if hash.len() != 20 {
        return Err(AddressError::InvalidLength);
    }
    Ok(Address {
        kind,
        payload: hash.to_vec(),
    })
}

fn base58_decode(input: &str) -> Result<Vec<u8>, AddressError> {
    let bytes = input.as_bytes();
    let leading_ones = bytes.iter().take_while(|&&b| b == b'1').count();

    let mut result: Vec<u8> = Vec::new();
    for &byte in bytes {
        let value = BASE58_ALPHABET
            .iter()
            .position(|&c| c == byte)
            .ok_or(AddressError::InvalidCharacter)? as u32;
        let mut carry = value;
        for out in result.iter_mut().rev() {
            let temp = (*out as u32) * 58 + carry;
            *out = (temp & 0xff) as u8;
            carry = temp >> 8;
        }
        while carry > 0 {
            result.insert(0, (carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let mut out = vec![0u8; leading_ones];
    out.extend(result);
    Ok(out)
}

pub fn address_to_script_pubkey(address: &str, network: Network) -> Result<Vec<u8>, AddressError> {
    Ok(decode_address(address, network)?.script_pubkey())
}

pub fn script_hash(script_pubkey: &[u8]) -> Hash256 {
    sha256(script_pubkey)
}

/// The remote index keys scripts by reversed-hex SHA-256.
pub fn script_hash_hex(script_pubkey: &[u8]) -> String {
    hash256_to_hex(&script_hash(script_pubkey))
}

/// Derives the remote lookup key for an address string.
pub fn lookup_key(address: &str, network: Network) -> Result<String, AddressError> {
    Ok(script_hash_hex(&address_to_script_pubkey(
        address, network,
    )?))
}
