//! BOLT12 TLV records and their wire, string, and merkle codecs.
//!
//! Decoding skips unknown odd TLV types, rejects unknown even types, rejects
//! unknown even feature bits, and rejects records declared for a different
//! chain. The merkle root of a record's field set is its stable identity.

use std::{fmt, str::FromStr};

use bitcoin::{constants::ChainHash, Network};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::features::Features;

pub mod invoice;
pub mod invoice_error;
pub mod invreq;
pub mod merkle;
pub mod offer;
pub mod string;
pub mod tlv;

pub use invoice::Invoice;
pub use invoice_error::InvoiceError;
pub use invreq::InvoiceRequest;
pub use offer::Offer;

use tlv::{TlvError, ValueReader};

/// Why a bolt12 record failed to decode. The `Display` impl is the short
/// textual reason surfaced to callers.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum Bolt12Error {
    #[error("invalid bolt12 string: {0}")]
    BadString(&'static str),

    #[error("invalid prefix, expected {0}")]
    WrongPrefix(&'static str),

    #[error("invalid tlv: {0}")]
    Tlv(#[from] TlvError),

    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("invalid {0}")]
    InvalidField(&'static str),

    #[error("unknown even tlv type {0}")]
    UnknownEvenType(u64),

    #[error("unknown even feature bit {0}")]
    UnknownEvenFeature(u16),

    #[error("wrong chain")]
    WrongChain,

    #[error("invalid signature")]
    BadSignature,
}

/// The stable identity of an offer: the merkle root of its TLV field set.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct OfferId(pub [u8; 32]);

impl OfferId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", offerd_common::hex::display(&self.0))
    }
}

impl fmt::Debug for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OfferId({self})")
    }
}

impl FromStr for OfferId {
    type Err = offerd_common::hex::DecodeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        offerd_common::hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for OfferId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OfferId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// The chain this node operates on, as seen by the bolt12 codec: records
/// which declare a `chains` list must include our genesis hash; records
/// which don't imply the bitcoin mainnet chain.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChainParams {
    pub genesis: [u8; 32],
    pub is_bitcoin: bool,
}

impl ChainParams {
    pub fn from_network(network: Network) -> Self {
        Self {
            genesis: ChainHash::using_genesis_block(network).to_bytes(),
            is_bitcoin: network == Network::Bitcoin,
        }
    }

    pub fn matches(&self, chains: Option<&Vec<[u8; 32]>>) -> bool {
        match chains {
            Some(chains) => chains.contains(&self.genesis),
            None => self.is_bitcoin,
        }
    }
}

// --- field value helpers --- //

fn read_chains(
    field: &'static str,
    value: &[u8],
) -> Result<Vec<[u8; 32]>, Bolt12Error> {
    if value.is_empty() || value.len() % 32 != 0 {
        return Err(Bolt12Error::InvalidField(field));
    }
    Ok(value
        .chunks_exact(32)
        .map(|chunk| {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect())
}

fn read_utf8(
    field: &'static str,
    value: &[u8],
) -> Result<String, Bolt12Error> {
    String::from_utf8(value.to_vec())
        .map_err(|_| Bolt12Error::InvalidField(field))
}

fn read_array<const N: usize>(
    field: &'static str,
    value: &[u8],
) -> Result<[u8; N], Bolt12Error> {
    let mut reader = ValueReader::new(value);
    let out = reader
        .read_array::<N>()
        .map_err(|_| Bolt12Error::InvalidField(field))?;
    reader
        .finish()
        .map_err(|_| Bolt12Error::InvalidField(field))?;
    Ok(out)
}

fn read_xonly_pubkey(
    field: &'static str,
    value: &[u8],
) -> Result<secp256k1::XOnlyPublicKey, Bolt12Error> {
    let bytes = read_array::<32>(field, value)?;
    secp256k1::XOnlyPublicKey::from_slice(&bytes)
        .map_err(|_| Bolt12Error::InvalidField(field))
}

fn read_signature(
    field: &'static str,
    value: &[u8],
) -> Result<secp256k1::schnorr::Signature, Bolt12Error> {
    let bytes = read_array::<64>(field, value)?;
    secp256k1::schnorr::Signature::from_slice(&bytes)
        .map_err(|_| Bolt12Error::InvalidField(field))
}

fn read_tu64(field: &'static str, value: &[u8]) -> Result<u64, Bolt12Error> {
    ValueReader::new(value)
        .read_tu64()
        .map_err(|_| Bolt12Error::InvalidField(field))
}

fn read_tu32(field: &'static str, value: &[u8]) -> Result<u32, Bolt12Error> {
    ValueReader::new(value)
        .read_tu32()
        .map_err(|_| Bolt12Error::InvalidField(field))
}

fn check_features(
    features: Option<&Features>,
    ours: &Features,
) -> Result<(), Bolt12Error> {
    if let Some(features) = features {
        if let Some(bit) = features.unknown_even_bit(ours) {
            return Err(Bolt12Error::UnknownEvenFeature(bit));
        }
    }
    Ok(())
}

fn write_chains(out: &mut Vec<u8>, chains: &[[u8; 32]]) {
    for chain in chains {
        out.extend_from_slice(chain);
    }
}
