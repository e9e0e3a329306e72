//! The `invoice_request` TLV record: a sender-built request asking an
//! offer's recipient to issue a corresponding invoice.

use secp256k1::{schnorr, Message, Secp256k1, Verification, XOnlyPublicKey};

use super::{
    check_features, merkle, read_chains, read_signature, read_tu32,
    read_tu64, read_xonly_pubkey, string,
    tlv::{self, TlvRecord, TlvStream},
    write_chains, Bolt12Error, ChainParams, OfferId,
};
use crate::features::Features;

/// Invoice-request TLV type numbers.
mod typ {
    pub const CHAINS: u64 = 2;
    pub const OFFER_ID: u64 = 4;
    pub const AMOUNT: u64 = 8;
    pub const FEATURES: u64 = 12;
    pub const QUANTITY: u64 = 32;
    pub const RECURRENCE_COUNTER: u64 = 36;
    pub const PAYER_KEY: u64 = 38;
    pub const PAYER_INFO: u64 = 50;
    pub const RECURRENCE_START: u64 = 68;
    pub const RECURRENCE_SIGNATURE: u64 = 242;
}

/// A decoded (or under-construction) invoice request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvoiceRequest {
    pub chains: Option<Vec<[u8; 32]>>,
    /// The merkle root of the referenced offer.
    pub offer_id: Option<OfferId>,
    pub amount: Option<u64>,
    pub features: Option<Features>,
    pub quantity: Option<u64>,
    pub recurrence_counter: Option<u32>,
    /// Derived from the payer's base key and `payer_info`; unlinkable
    /// across offers.
    pub payer_key: Option<XOnlyPublicKey>,
    /// Opaque payer-chosen bytes; the tweak behind `payer_key`.
    pub payer_info: Option<Vec<u8>>,
    pub recurrence_start: Option<u32>,
    pub recurrence_signature: Option<schnorr::Signature>,
    pub unknown_odd: Vec<TlvRecord>,
}

impl InvoiceRequest {
    pub fn decode(
        bytes: &[u8],
        our_features: &Features,
        chain: &ChainParams,
    ) -> Result<Self, Bolt12Error> {
        let stream = TlvStream::from_bytes(bytes)?;
        let invreq = Self::from_tlv_stream(&stream)?;

        check_features(invreq.features.as_ref(), our_features)?;
        if !chain.matches(invreq.chains.as_ref()) {
            return Err(Bolt12Error::WrongChain);
        }

        Ok(invreq)
    }

    /// Decodes an `lnr1…` string.
    pub fn parse(
        s: &str,
        our_features: &Features,
        chain: &ChainParams,
    ) -> Result<Self, Bolt12Error> {
        let bytes = string::decode(string::INVREQ_HRP, s)?;
        Self::decode(&bytes, our_features, chain)
    }

    /// Verifies the recurrence signature over the merkle root under
    /// `payer_key`. Fails if either is missing.
    pub fn check_recurrence_signature<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
    ) -> Result<(), Bolt12Error> {
        let signature = self
            .recurrence_signature
            .as_ref()
            .ok_or(Bolt12Error::MissingField("recurrence_signature"))?;
        let payer_key =
            self.payer_key.ok_or(Bolt12Error::MissingField("payer_key"))?;
        let sighash = merkle::sighash_from_merkle(
            "invoice_request",
            "recurrence_signature",
            &self.merkle(),
        );
        secp.verify_schnorr(
            signature,
            &Message::from_digest(sighash),
            &payer_key,
        )
        .map_err(|_| Bolt12Error::BadSignature)
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_tlv_stream().to_bytes()
    }

    /// The `lnr1…` string encoding.
    pub fn to_bech32(&self) -> String {
        string::encode(string::INVREQ_HRP, &self.encode())
    }

    /// The merkle root of the (non-signature) field set.
    pub fn merkle(&self) -> [u8; 32] {
        merkle::merkle_tlv(&self.to_tlv_stream())
    }

    fn from_tlv_stream(stream: &TlvStream) -> Result<Self, Bolt12Error> {
        let mut invreq = InvoiceRequest::default();

        for record in stream.records() {
            let value = record.value.as_slice();
            match record.typ {
                typ::CHAINS => {
                    invreq.chains = Some(read_chains("chains", value)?);
                }
                typ::OFFER_ID => {
                    invreq.offer_id = Some(OfferId(super::read_array::<32>(
                        "offer_id", value,
                    )?));
                }
                typ::AMOUNT => {
                    invreq.amount = Some(read_tu64("amount", value)?);
                }
                typ::FEATURES => {
                    invreq.features =
                        Some(Features::from_bytes(value.to_vec()));
                }
                typ::QUANTITY => {
                    invreq.quantity = Some(read_tu64("quantity", value)?);
                }
                typ::RECURRENCE_COUNTER => {
                    invreq.recurrence_counter =
                        Some(read_tu32("recurrence_counter", value)?);
                }
                typ::PAYER_KEY => {
                    invreq.payer_key =
                        Some(read_xonly_pubkey("payer_key", value)?);
                }
                typ::PAYER_INFO => {
                    invreq.payer_info = Some(value.to_vec());
                }
                typ::RECURRENCE_START => {
                    invreq.recurrence_start =
                        Some(read_tu32("recurrence_start", value)?);
                }
                typ::RECURRENCE_SIGNATURE => {
                    invreq.recurrence_signature = Some(read_signature(
                        "recurrence_signature",
                        value,
                    )?);
                }
                unknown if unknown % 2 == 0 => {
                    return Err(Bolt12Error::UnknownEvenType(unknown));
                }
                _ => invreq.unknown_odd.push(record.clone()),
            }
        }

        Ok(invreq)
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
        if let Some(features) = &self.features {
            records.push(TlvRecord {
                typ: typ::FEATURES,
                value: features.as_bytes().to_vec(),
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
        if let Some(payer_info) = &self.payer_info {
            records.push(TlvRecord {
                typ: typ::PAYER_INFO,
                value: payer_info.clone(),
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
        if let Some(signature) = &self.recurrence_signature {
            records.push(TlvRecord {
                typ: typ::RECURRENCE_SIGNATURE,
                value: signature.as_ref().to_vec(),
            });
        }

        records.extend(self.unknown_odd.iter().cloned());
        records.sort_by_key(|record| record.typ);
        TlvStream::from_sorted_records(records)
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::Network;
    use secp256k1::{Keypair, Secp256k1};

    use super::*;

    fn mainnet() -> ChainParams {
        ChainParams::from_network(Network::Bitcoin)
    }

    fn dummy_invreq() -> InvoiceRequest {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_seckey_slice(&secp, &[0x07; 32]).unwrap();
        InvoiceRequest {
            offer_id: Some(OfferId([0x33; 32])),
            quantity: Some(3),
            payer_key: Some(keypair.x_only_public_key().0),
            payer_info: Some(vec![0xaa; 16]),
            ..InvoiceRequest::default()
        }
    }

    #[test]
    fn roundtrip() {
        let invreq = InvoiceRequest {
            recurrence_counter: Some(4),
            recurrence_start: Some(1),
            ..dummy_invreq()
        };
        let bytes = invreq.encode();
        let decoded =
            InvoiceRequest::decode(&bytes, &Features::empty(), &mainnet())
                .unwrap();
        assert_eq!(decoded, invreq);
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn bech32_roundtrip() {
        let invreq = dummy_invreq();
        let s = invreq.to_bech32();
        assert!(s.starts_with("lnr1"));
        let decoded =
            InvoiceRequest::parse(&s, &Features::empty(), &mainnet()).unwrap();
        assert_eq!(decoded, invreq);
    }

    #[test]
    fn recurrence_signature_verifies_under_payer_key() {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_seckey_slice(&secp, &[0x07; 32]).unwrap();
        let mut invreq = InvoiceRequest {
            recurrence_counter: Some(1),
            ..dummy_invreq()
        };

        let sighash = merkle::sighash_from_merkle(
            "invoice_request",
            "recurrence_signature",
            &invreq.merkle(),
        );
        invreq.recurrence_signature = Some(secp.sign_schnorr_no_aux_rand(
            &Message::from_digest(sighash),
            &keypair,
        ));
        invreq.check_recurrence_signature(&secp).unwrap();

        // the signature does not change the merkle root
        let mut unsigned = invreq.clone();
        unsigned.recurrence_signature = None;
        assert_eq!(unsigned.merkle(), invreq.merkle());

        let mut tampered = invreq.clone();
        tampered.recurrence_counter = Some(2);
        assert_eq!(
            tampered.check_recurrence_signature(&secp),
            Err(Bolt12Error::BadSignature),
        );
    }

    #[test]
    fn non_bitcoin_chain() {
        let regtest = ChainParams::from_network(Network::Regtest);
        let invreq = InvoiceRequest {
            chains: Some(vec![regtest.genesis]),
            ..dummy_invreq()
        };
        let bytes = invreq.encode();
        InvoiceRequest::decode(&bytes, &Features::empty(), &regtest).unwrap();
        assert!(
            InvoiceRequest::decode(&bytes, &Features::empty(), &mainnet())
                .is_err()
        );
    }
}
