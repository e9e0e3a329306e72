//! The `invoice` TLV record: the recipient's signed reply, payable per the
//! offer's terms.

use secp256k1::{schnorr, Message, Secp256k1, Verification, XOnlyPublicKey};

use super::{
    check_features, merkle, read_array, read_chains, read_signature,
    read_tu32, read_tu64, read_utf8, read_xonly_pubkey, string,
    tlv::{self, TlvRecord, TlvStream},
    write_chains, Bolt12Error, ChainParams, OfferId,
};
use crate::features::Features;

/// Invoice TLV type numbers.
mod typ {
    pub const CHAINS: u64 = 2;
    pub const OFFER_ID: u64 = 4;
    pub const AMOUNT: u64 = 8;
    pub const DESCRIPTION: u64 = 10;
    pub const FEATURES: u64 = 12;
    pub const VENDOR: u64 = 20;
    pub const NODE_ID: u64 = 30;
    pub const QUANTITY: u64 = 32;
    pub const RECURRENCE_COUNTER: u64 = 36;
    pub const PAYER_KEY: u64 = 38;
    pub const TIMESTAMP: u64 = 40;
    pub const PAYMENT_HASH: u64 = 42;
    pub const RELATIVE_EXPIRY: u64 = 44;
    pub const PAYER_INFO: u64 = 50;
    pub const RECURRENCE_BASETIME: u64 = 64;
    pub const RECURRENCE_START: u64 = 68;
    pub const SIGNATURE: u64 = 240;
}

/// A decoded invoice. Which fields must be present, and which must equal
/// their invoice-request counterparts, is enforced by the reply validator
/// rather than the codec.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Invoice {
    pub chains: Option<Vec<[u8; 32]>>,
    pub offer_id: Option<OfferId>,
    pub amount: Option<u64>,
    pub description: Option<String>,
    pub features: Option<Features>,
    pub vendor: Option<String>,
    pub node_id: Option<XOnlyPublicKey>,
    pub quantity: Option<u64>,
    pub recurrence_counter: Option<u32>,
    pub payer_key: Option<XOnlyPublicKey>,
    /// Unix-seconds issuance time.
    pub timestamp: Option<u64>,
    pub payment_hash: Option<[u8; 32]>,
    /// Seconds after `timestamp` at which the invoice expires.
    pub relative_expiry: Option<u32>,
    pub payer_info: Option<Vec<u8>>,
    /// Anchors the recurrence schedule; required for recurring replies.
    pub recurrence_basetime: Option<u64>,
    pub recurrence_start: Option<u32>,
    pub signature: Option<schnorr::Signature>,
    pub unknown_odd: Vec<TlvRecord>,
}

impl Invoice {
    pub fn decode(
        bytes: &[u8],
        our_features: &Features,
        chain: &ChainParams,
    ) -> Result<Self, Bolt12Error> {
        let stream = TlvStream::from_bytes(bytes)?;
        let invoice = Self::from_tlv_stream(&stream)?;

        check_features(invoice.features.as_ref(), our_features)?;
        if !chain.matches(invoice.chains.as_ref()) {
            return Err(Bolt12Error::WrongChain);
        }

        Ok(invoice)
    }

    /// Decodes an `lni1…` string.
    pub fn parse(
        s: &str,
        our_features: &Features,
        chain: &ChainParams,
    ) -> Result<Self, Bolt12Error> {
        let bytes = string::decode(string::INVOICE_HRP, s)?;
        Self::decode(&bytes, our_features, chain)
    }

    /// Verifies the invoice signature over the merkle root under `node_id`.
    /// Fails if either is missing.
    pub fn check_signature<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
    ) -> Result<(), Bolt12Error> {
        let signature = self
            .signature
            .as_ref()
            .ok_or(Bolt12Error::MissingField("signature"))?;
        let node_id =
            self.node_id.ok_or(Bolt12Error::MissingField("node_id"))?;
        let sighash = merkle::sighash_from_merkle(
            "invoice",
            "signature",
            &self.merkle(),
        );
        secp.verify_schnorr(
            signature,
            &Message::from_digest(sighash),
            &node_id,
        )
        .map_err(|_| Bolt12Error::BadSignature)
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_tlv_stream().to_bytes()
    }

    /// The `lni1…` string encoding.
    pub fn to_bech32(&self) -> String {
        string::encode(string::INVOICE_HRP, &self.encode())
    }

    /// The merkle root of the (non-signature) field set.
    pub fn merkle(&self) -> [u8; 32] {
        merkle::merkle_tlv(&self.to_tlv_stream())
    }

    fn from_tlv_stream(stream: &TlvStream) -> Result<Self, Bolt12Error> {
        let mut invoice = Invoice::default();

        for record in stream.records() {
            let value = record.value.as_slice();
            match record.typ {
                typ::CHAINS => {
                    invoice.chains = Some(read_chains("chains", value)?);
                }
                typ::OFFER_ID => {
                    invoice.offer_id =
                        Some(OfferId(read_array::<32>("offer_id", value)?));
                }
                typ::AMOUNT => {
                    invoice.amount = Some(read_tu64("amount", value)?);
                }
                typ::DESCRIPTION => {
                    invoice.description =
                        Some(read_utf8("description", value)?);
                }
                typ::FEATURES => {
                    invoice.features =
                        Some(Features::from_bytes(value.to_vec()));
                }
                typ::VENDOR => {
                    invoice.vendor = Some(read_utf8("vendor", value)?);
                }
                typ::NODE_ID => {
                    invoice.node_id =
                        Some(read_xonly_pubkey("node_id", value)?);
                }
                typ::QUANTITY => {
                    invoice.quantity = Some(read_tu64("quantity", value)?);
                }
                typ::RECURRENCE_COUNTER => {
                    invoice.recurrence_counter =
                        Some(read_tu32("recurrence_counter", value)?);
                }
                typ::PAYER_KEY => {
                    invoice.payer_key =
                        Some(read_xonly_pubkey("payer_key", value)?);
                }
                typ::TIMESTAMP => {
                    invoice.timestamp = Some(read_tu64("timestamp", value)?);
                }
                typ::PAYMENT_HASH => {
                    invoice.payment_hash =
                        Some(read_array::<32>("payment_hash", value)?);
                }
                typ::RELATIVE_EXPIRY => {
                    invoice.relative_expiry =
                        Some(read_tu32("relative_expiry", value)?);
                }
                typ::PAYER_INFO => {
                    invoice.payer_info = Some(value.to_vec());
                }
                typ::RECURRENCE_BASETIME => {
                    invoice.recurrence_basetime =
                        Some(read_tu64("recurrence_basetime", value)?);
                }
                typ::RECURRENCE_START => {
                    invoice.recurrence_start =
                        Some(read_tu32("recurrence_start", value)?);
                }
                typ::SIGNATURE => {
                    invoice.signature =
                        Some(read_signature("signature", value)?);
                }
                unknown if unknown % 2 == 0 => {
                    return Err(Bolt12Error::UnknownEvenType(unknown));
                }
                _ => invoice.unknown_odd.push(record.clone()),
            }
        }

        Ok(invoice)
    }

    fn to_tlv_stream(&self) -> TlvStream {
        let mut records = Vec::new();

        if let Some(chains) = &self.chains {
            let mut value = Vec::with_capacity(chains.len() * 32);
            write_chains(&mut value, chains);
            records.push(TlvRecord {
                typ: typ::CHAINS,
                value,
            });
        }
        if let Some(offer_id) = &self.offer_id {
            records.push(TlvRecord {
                typ: typ::OFFER_ID,
                value: offer_id.as_bytes().to_vec(),
            });
        }
        if let Some(amount) = self.amount {
            let mut value = Vec::new();
            tlv::write_tu64(&mut value, amount);
            records.push(TlvRecord {
                typ: typ::AMOUNT,
                value,
            });
        }
        if let Some(description) = &self.description {
            records.push(TlvRecord {
                typ: typ::DESCRIPTION,
                value: description.as_bytes().to_vec(),
            });
        }
        if let Some(features) = &self.features {
            records.push(TlvRecord {
                typ: typ::FEATURES,
                value: features.as_bytes().to_vec(),
            });
        }
        if let Some(vendor) = &self.vendor {
            records.push(TlvRecord {
                typ: typ::VENDOR,
                value: vendor.as_bytes().to_vec(),
            });
        }
        if let Some(node_id) = &self.node_id {
            records.push(TlvRecord {
                typ: typ::NODE_ID,
                value: node_id.serialize().to_vec(),
            });
        }
        if let Some(quantity) = self.quantity {
            let mut value = Vec::new();
            tlv::write_tu64(&mut value, quantity);
            records.push(TlvRecord {
                typ: typ::QUANTITY,
                value,
            });
        }
        if let Some(counter) = self.recurrence_counter {
            let mut value = Vec::new();
            tlv::write_tu32(&mut value, counter);
            records.push(TlvRecord {
                typ: typ::RECURRENCE_COUNTER,
                value,
            });
        }
        if let Some(payer_key) = &self.payer_key {
            records.push(TlvRecord {
                typ: typ::PAYER_KEY,
                value: payer_key.serialize().to_vec(),
            });
        }
        if let Some(timestamp) = self.timestamp {
            let mut value = Vec::new();
            tlv::write_tu64(&mut value, timestamp);
            records.push(TlvRecord {
                typ: typ::TIMESTAMP,
                value,
            });
        }
        if let Some(payment_hash) = &self.payment_hash {
            records.push(TlvRecord {
                typ: typ::PAYMENT_HASH,
                value: payment_hash.to_vec(),
            });
        }
        if let Some(relative_expiry) = self.relative_expiry {
            let mut value = Vec::new();
            tlv::write_tu32(&mut value, relative_expiry);
            records.push(TlvRecord {
                typ: typ::RELATIVE_EXPIRY,
                value,
            });
        }
        if let Some(payer_info) = &self.payer_info {
            records.push(TlvRecord {
                typ: typ::PAYER_INFO,
                value: payer_info.clone(),
            });
        }
        if let Some(basetime) = self.recurrence_basetime {
            let mut value = Vec::new();
            tlv::write_tu64(&mut value, basetime);
            records.push(TlvRecord {
                typ: typ::RECURRENCE_BASETIME,
                value,
            });
        }
        if let Some(start) = self.recurrence_start {
            let mut value = Vec::new();
            tlv::write_tu32(&mut value, start);
            records.push(TlvRecord {
                typ: typ::RECURRENCE_START,
                value,
            });
        }
        if let Some(signature) = &self.signature {
            records.push(TlvRecord {
                typ: typ::SIGNATURE,
                value: signature.as_ref().to_vec(),
            });
        }

        records.extend(self.unknown_odd.iter().cloned());
        records.sort_by_key(|record| record.typ);
        TlvStream::from_sorted_records(records)
    }
}
