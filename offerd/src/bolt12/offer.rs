//! The `offer` TLV record: a recipient's advertised willingness to issue
//! invoices under stated terms.

use secp256k1::{schnorr, Message, Secp256k1, Verification, XOnlyPublicKey};

use super::{
    check_features, merkle, read_array, read_chains, read_signature,
    read_tu32, read_tu64, read_utf8, read_xonly_pubkey, string,
    tlv::{self, TlvRecord, TlvStream, ValueReader},
    write_chains, Bolt12Error, ChainParams, OfferId,
};
use crate::{
    features::Features,
    recurrence::{Recurrence, RecurrenceBase, RecurrencePaywindow},
};

/// Offer TLV type numbers.
mod typ {
    pub const CHAINS: u64 = 2;
    pub const CURRENCY: u64 = 6;
    pub const AMOUNT: u64 = 8;
    pub const DESCRIPTION: u64 = 10;
    pub const FEATURES: u64 = 12;
    pub const ABSOLUTE_EXPIRY: u64 = 14;
    pub const VENDOR: u64 = 20;
    pub const QUANTITY_MIN: u64 = 22;
    pub const QUANTITY_MAX: u64 = 24;
    pub const RECURRENCE: u64 = 26;
    pub const RECURRENCE_BASE: u64 = 28;
    pub const NODE_ID: u64 = 30;
    pub const SEND_INVOICE: u64 = 54;
    pub const RECURRENCE_PAYWINDOW: u64 = 64;
    pub const RECURRENCE_LIMIT: u64 = 66;
    pub const SIGNATURE: u64 = 240;
}

/// A decoded offer. `node_id` and `description` are optional at the codec
/// level; callers which respond to an offer must require both.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Offer {
    pub chains: Option<Vec<[u8; 32]>>,
    /// ISO 4217 currency code; when set, `amount` is denominated in it.
    pub currency: Option<String>,
    /// Amount per item, in minimum-payable units unless `currency` is set.
    pub amount: Option<u64>,
    pub description: Option<String>,
    pub features: Option<Features>,
    /// Unix-seconds time after which the offer must not be responded to.
    pub absolute_expiry: Option<u64>,
    pub vendor: Option<String>,
    pub quantity_min: Option<u64>,
    pub quantity_max: Option<u64>,
    pub recurrence: Option<Recurrence>,
    pub recurrence_base: Option<RecurrenceBase>,
    /// The recipient's x-only node key; invoices must be signed under it.
    pub node_id: Option<XOnlyPublicKey>,
    /// Inverts the direction: the recipient wants an invoice from us.
    pub send_invoice: bool,
    pub recurrence_paywindow: Option<RecurrencePaywindow>,
    pub recurrence_limit: Option<u32>,
    pub signature: Option<schnorr::Signature>,
    /// Unknown odd records, preserved for re-encoding and merkle hashing.
    pub unknown_odd: Vec<TlvRecord>,
}

impl Offer {
    /// Decodes raw TLV bytes, enforcing the structural and semantic rules.
    /// The signature, if any, is *not* verified here; see
    /// [`Offer::check_signature`].
    pub fn decode(
        bytes: &[u8],
        our_features: &Features,
        chain: &ChainParams,
    ) -> Result<Self, Bolt12Error> {
        let stream = TlvStream::from_bytes(bytes)?;
        let offer = Self::from_tlv_stream(&stream)?;

        check_features(offer.features.as_ref(), our_features)?;
        if !chain.matches(offer.chains.as_ref()) {
            return Err(Bolt12Error::WrongChain);
        }

        if let Some(currency) = &offer.currency {
            // ISO 4217 codes are exactly three characters.
            if currency.len() != 3 {
                return Err(Bolt12Error::InvalidField("currency"));
            }
        }

        match &offer.recurrence {
            None => {
                if offer.recurrence_base.is_some() {
                    return Err(Bolt12Error::InvalidField(
                        "recurrence_base",
                    ));
                }
                if offer.recurrence_paywindow.is_some() {
                    return Err(Bolt12Error::InvalidField(
                        "recurrence_paywindow",
                    ));
                }
                if offer.recurrence_limit.is_some() {
                    return Err(Bolt12Error::InvalidField(
                        "recurrence_limit",
                    ));
                }
            }
            Some(recurrence) if !recurrence.valid_time_unit() => {
                return Err(Bolt12Error::InvalidField("recurrence"));
            }
            Some(_) => {}
        }

        if let (Some(min), Some(max)) =
            (offer.quantity_min, offer.quantity_max)
        {
            if min > max {
                return Err(Bolt12Error::InvalidField("quantity_min"));
            }
        }

        Ok(offer)
    }

    /// Decodes an `lno1…` string and verifies the signature if present.
    pub fn parse<C: Verification>(
        secp: &Secp256k1<C>,
        s: &str,
        our_features: &Features,
        chain: &ChainParams,
    ) -> Result<Self, Bolt12Error> {
        let offer = Self::parse_unsigned(s, our_features, chain)?;
        offer.check_signature(secp)?;
        Ok(offer)
    }

    /// Decodes an `lno1…` string without verifying any signature.
    pub fn parse_unsigned(
        s: &str,
        our_features: &Features,
        chain: &ChainParams,
    ) -> Result<Self, Bolt12Error> {
        let bytes = string::decode(string::OFFER_HRP, s)?;
        Self::decode(&bytes, our_features, chain)
    }

    /// Verifies the offer signature over the merkle root under `node_id`.
    /// An unsigned offer passes; a signed offer without a `node_id` fails.
    pub fn check_signature<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
    ) -> Result<(), Bolt12Error> {
        let signature = match &self.signature {
            Some(signature) => signature,
            None => return Ok(()),
        };
        let node_id = self.node_id.ok_or(Bolt12Error::BadSignature)?;
        let sighash = merkle::sighash_from_merkle(
            "offer",
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

    /// The canonical TLV serialization.
    pub fn encode(&self) -> Vec<u8> {
        self.to_tlv_stream().to_bytes()
    }

    /// The `lno1…` string encoding.
    pub fn to_bech32(&self) -> String {
        string::encode(string::OFFER_HRP, &self.encode())
    }

    /// The merkle root of the (non-signature) field set.
    pub fn merkle(&self) -> [u8; 32] {
        merkle::merkle_tlv(&self.to_tlv_stream())
    }

    /// The offer id: the merkle root of the field set.
    pub fn id(&self) -> OfferId {
        OfferId(self.merkle())
    }

    fn from_tlv_stream(stream: &TlvStream) -> Result<Self, Bolt12Error> {
        let mut offer = Offer::default();

        for record in stream.records() {
            let value = record.value.as_slice();
            match record.typ {
                typ::CHAINS => {
                    offer.chains = Some(read_chains("chains", value)?);
                }
                typ::CURRENCY => {
                    offer.currency = Some(read_utf8("currency", value)?);
                }
                typ::AMOUNT => {
                    offer.amount = Some(read_tu64("amount", value)?);
                }
                typ::DESCRIPTION => {
                    offer.description =
                        Some(read_utf8("description", value)?);
                }
                typ::FEATURES => {
                    offer.features =
                        Some(Features::from_bytes(value.to_vec()));
                }
                typ::ABSOLUTE_EXPIRY => {
                    offer.absolute_expiry =
                        Some(read_tu64("absolute_expiry", value)?);
                }
                typ::VENDOR => {
                    offer.vendor = Some(read_utf8("vendor", value)?);
                }
                typ::QUANTITY_MIN => {
                    offer.quantity_min =
                        Some(read_tu64("quantity_min", value)?);
                }
                typ::QUANTITY_MAX => {
                    offer.quantity_max =
                        Some(read_tu64("quantity_max", value)?);
                }
                typ::RECURRENCE => {
                    let mut reader = ValueReader::new(value);
                    let time_unit = reader
                        .read_u8()
                        .map_err(|_| Bolt12Error::InvalidField("recurrence"))?;
                    let period = reader
                        .read_tu32()
                        .map_err(|_| Bolt12Error::InvalidField("recurrence"))?;
                    offer.recurrence = Some(Recurrence { time_unit, period });
                }
                typ::RECURRENCE_BASE => {
                    let mut reader = ValueReader::new(value);
                    let start_any_period = reader.read_u8().map_err(|_| {
                        Bolt12Error::InvalidField("recurrence_base")
                    })? != 0;
                    let basetime = reader.read_tu64().map_err(|_| {
                        Bolt12Error::InvalidField("recurrence_base")
                    })?;
                    offer.recurrence_base = Some(RecurrenceBase {
                        start_any_period,
                        basetime,
                    });
                }
                typ::NODE_ID => {
                    offer.node_id =
                        Some(read_xonly_pubkey("node_id", value)?);
                }
                typ::SEND_INVOICE => {
                    if !value.is_empty() {
                        return Err(Bolt12Error::InvalidField(
                            "send_invoice",
                        ));
                    }
                    offer.send_invoice = true;
                }
                typ::RECURRENCE_PAYWINDOW => {
                    let pw =
                        read_array::<9>("recurrence_paywindow", value)?;
                    offer.recurrence_paywindow =
                        Some(RecurrencePaywindow {
                            seconds_before: u32::from_be_bytes([
                                pw[0], pw[1], pw[2], pw[3],
                            ]),
                            proportional_amount: pw[4] != 0,
                            seconds_after: u32::from_be_bytes([
                                pw[5], pw[6], pw[7], pw[8],
                            ]),
                        });
                }
                typ::RECURRENCE_LIMIT => {
                    offer.recurrence_limit =
                        Some(read_tu32("recurrence_limit", value)?);
                }
                typ::SIGNATURE => {
                    offer.signature =
                        Some(read_signature("signature", value)?);
                }
                unknown if unknown % 2 == 0 => {
                    return Err(Bolt12Error::UnknownEvenType(unknown));
                }
                _ => offer.unknown_odd.push(record.clone()),
            }
        }

        Ok(offer)
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
        if let Some(currency) = &self.currency {
            records.push(TlvRecord {
                typ: typ::CURRENCY,
                value: currency.as_bytes().to_vec(),
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
        if let Some(absolute_expiry) = self.absolute_expiry {
            let mut value = Vec::new();
            tlv::write_tu64(&mut value, absolute_expiry);
            records.push(TlvRecord {
                typ: typ::ABSOLUTE_EXPIRY,
                value,
            });
        }
        if let Some(vendor) = &self.vendor {
            records.push(TlvRecord {
                typ: typ::VENDOR,
                value: vendor.as_bytes().to_vec(),
            });
        }
        if let Some(quantity_min) = self.quantity_min {
            let mut value = Vec::new();
            tlv::write_tu64(&mut value, quantity_min);
            records.push(TlvRecord {
                typ: typ::QUANTITY_MIN,
                value,
            });
        }
        if let Some(quantity_max) = self.quantity_max {
            let mut value = Vec::new();
            tlv::write_tu64(&mut value, quantity_max);
            records.push(TlvRecord {
                typ: typ::QUANTITY_MAX,
                value,
            });
        }
        if let Some(recurrence) = &self.recurrence {
            let mut value = vec![recurrence.time_unit];
            tlv::write_tu32(&mut value, recurrence.period);
            records.push(TlvRecord {
                typ: typ::RECURRENCE,
                value,
            });
        }
        if let Some(base) = &self.recurrence_base {
            let mut value = vec![u8::from(base.start_any_period)];
            tlv::write_tu64(&mut value, base.basetime);
            records.push(TlvRecord {
                typ: typ::RECURRENCE_BASE,
                value,
            });
        }
        if let Some(node_id) = &self.node_id {
            records.push(TlvRecord {
                typ: typ::NODE_ID,
                value: node_id.serialize().to_vec(),
            });
        }
        if self.send_invoice {
            records.push(TlvRecord {
                typ: typ::SEND_INVOICE,
                value: Vec::new(),
            });
        }
        if let Some(paywindow) = &self.recurrence_paywindow {
            let mut value = Vec::with_capacity(9);
            value.extend_from_slice(
                &paywindow.seconds_before.to_be_bytes(),
            );
            value.push(u8::from(paywindow.proportional_amount));
            value.extend_from_slice(&paywindow.seconds_after.to_be_bytes());
            records.push(TlvRecord {
                typ: typ::RECURRENCE_PAYWINDOW,
                value,
            });
        }
        if let Some(limit) = self.recurrence_limit {
            let mut value = Vec::new();
            tlv::write_tu32(&mut value, limit);
            records.push(TlvRecord {
                typ: typ::RECURRENCE_LIMIT,
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

#[cfg(test)]
mod tests {
    use bitcoin::Network;
    use secp256k1::{Keypair, Secp256k1};

    use super::*;
    use crate::bolt12::tlv::write_bigsize;

    fn mainnet() -> ChainParams {
        ChainParams::from_network(Network::Bitcoin)
    }

    fn dummy_node_id() -> XOnlyPublicKey {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_seckey_slice(&secp, &[0x42; 32]).unwrap();
        keypair.x_only_public_key().0
    }

    fn dummy_offer() -> Offer {
        Offer {
            amount: Some(1000),
            description: Some("a cup of coffee".to_owned()),
            node_id: Some(dummy_node_id()),
            ..Offer::default()
        }
    }

    #[test]
    fn roundtrip() {
        let offer = Offer {
            chains: Some(vec![[0x11; 32]]),
            currency: None,
            amount: Some(12_345),
            description: Some("twelve chairs".to_owned()),
            features: None,
            absolute_expiry: Some(1_700_000_000),
            vendor: Some("ilf & petrov".to_owned()),
            quantity_min: Some(2),
            quantity_max: Some(12),
            recurrence: None,
            recurrence_base: None,
            node_id: Some(dummy_node_id()),
            send_invoice: false,
            recurrence_paywindow: None,
            recurrence_limit: None,
            signature: None,
            unknown_odd: Vec::new(),
        };
        let chain = ChainParams {
            genesis: [0x11; 32],
            is_bitcoin: false,
        };
        let bytes = offer.encode();
        let decoded =
            Offer::decode(&bytes, &Features::empty(), &chain).unwrap();
        assert_eq!(decoded, offer);
        // re-encoding is byte identical
        assert_eq!(decoded.encode(), bytes);
        // merkle (and thus the id) only depends on the field set
        assert_eq!(decoded.merkle(), offer.merkle());
    }

    #[test]
    fn bech32_roundtrip() {
        let offer = dummy_offer();
        let s = offer.to_bech32();
        assert!(s.starts_with("lno1"));
        let decoded =
            Offer::parse_unsigned(&s, &Features::empty(), &mainnet()).unwrap();
        assert_eq!(decoded, offer);
    }

    #[test]
    fn recurrence_roundtrip() {
        let offer = Offer {
            recurrence: Some(Recurrence {
                time_unit: crate::recurrence::time_unit::MONTHS,
                period: 1,
            }),
            recurrence_base: Some(RecurrenceBase {
                start_any_period: true,
                basetime: 1_609_459_200,
            }),
            recurrence_paywindow: Some(RecurrencePaywindow {
                seconds_before: 60,
                proportional_amount: false,
                seconds_after: 60,
            }),
            recurrence_limit: Some(12),
            ..dummy_offer()
        };
        let bytes = offer.encode();
        let decoded =
            Offer::decode(&bytes, &Features::empty(), &mainnet()).unwrap();
        assert_eq!(decoded, offer);
    }

    #[test]
    fn signature_signs_the_merkle_root() {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_seckey_slice(&secp, &[0x42; 32]).unwrap();
        let mut offer = dummy_offer();
        offer.node_id = Some(keypair.x_only_public_key().0);

        let sighash = merkle::sighash_from_merkle(
            "offer",
            "signature",
            &offer.merkle(),
        );
        offer.signature = Some(secp.sign_schnorr_no_aux_rand(
            &Message::from_digest(sighash),
            &keypair,
        ));
        offer.check_signature(&secp).unwrap();

        // the unsigned and signed offers share an id
        let mut unsigned = offer.clone();
        unsigned.signature = None;
        assert_eq!(unsigned.id(), offer.id());

        // tampering with a field invalidates the signature
        let mut tampered = offer.clone();
        tampered.amount = Some(999);
        assert_eq!(
            tampered.check_signature(&secp),
            Err(Bolt12Error::BadSignature),
        );
    }

    #[test]
    fn unknown_odd_skipped_even_rejected() {
        let mut offer = dummy_offer();
        offer.unknown_odd.push(TlvRecord {
            typ: 101,
            value: vec![0xde, 0xad],
        });
        let bytes = offer.encode();
        let decoded =
            Offer::decode(&bytes, &Features::empty(), &mainnet()).unwrap();
        assert_eq!(decoded.unknown_odd, offer.unknown_odd);
        // unknown odd records contribute to the id
        assert_ne!(decoded.id(), dummy_offer().id());

        // splice in an unknown even record (type 100)
        let mut bytes = dummy_offer().encode();
        write_bigsize(&mut bytes, 100);
        write_bigsize(&mut bytes, 0);
        assert_eq!(
            Offer::decode(&bytes, &Features::empty(), &mainnet()),
            Err(Bolt12Error::UnknownEvenType(100)),
        );
    }

    #[test]
    fn unknown_even_feature_bit_rejected() {
        let mut features = Features::empty();
        features.set(12);
        let offer = Offer {
            features: Some(features),
            ..dummy_offer()
        };
        let bytes = offer.encode();
        assert_eq!(
            Offer::decode(&bytes, &Features::empty(), &mainnet()),
            Err(Bolt12Error::UnknownEvenFeature(12)),
        );

        // the same bit is fine when we support it
        let mut ours = Features::empty();
        ours.set(12);
        Offer::decode(&bytes, &ours, &mainnet()).unwrap();
    }

    #[test]
    fn wrong_chain_rejected() {
        let offer = dummy_offer(); // no chains => bitcoin
        let bytes = offer.encode();
        let regtest = ChainParams::from_network(Network::Regtest);
        assert_eq!(
            Offer::decode(&bytes, &Features::empty(), &regtest),
            Err(Bolt12Error::WrongChain),
        );
    }

    #[test]
    fn recurrence_fields_require_recurrence() {
        let offer = Offer {
            recurrence_limit: Some(3),
            ..dummy_offer()
        };
        assert_eq!(
            Offer::decode(&offer.encode(), &Features::empty(), &mainnet()),
            Err(Bolt12Error::InvalidField("recurrence_limit")),
        );
    }

    #[test]
    fn bad_currency_rejected() {
        let offer = Offer {
            currency: Some("EURO".to_owned()),
            ..dummy_offer()
        };
        assert_eq!(
            Offer::decode(&offer.encode(), &Features::empty(), &mainnet()),
            Err(Bolt12Error::InvalidField("currency")),
        );
    }
}
