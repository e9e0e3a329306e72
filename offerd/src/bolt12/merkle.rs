//! Merkle hashing of TLV field sets, as defined by the offers signature
//! calculation.
//!
//! Every non-signature record contributes one tree node:
//! `H("LnBranch", H("LnLeaf", tlv) . H("LnAll" || all-tlvs, tlv))`, where the
//! pair is sorted lexicographically before hashing and `all-tlvs` is the
//! concatenation of every included record's wire form. Nodes are then merged
//! pairwise with `H("LnBranch", sorted-pair)`, promoting an odd node, until a
//! single 32-byte root remains. Implementations must produce byte-identical
//! roots across hosts.

use offerd_common::sha256;

use super::tlv::TlvStream;

/// TLV types at or above this value hold signatures and are excluded from
/// the merkle computation.
const SIGNATURE_TYPE_RANGE_START: u64 = 240;

/// The BIP340-style tagged hash: `SHA256(SHA256(tag) || SHA256(tag) || msg)`.
pub fn tagged_hash(tag: &[u8], msg: &[u8]) -> [u8; 32] {
    let tag_hash = sha256::digest(tag);
    sha256::digest_many(&[&tag_hash, &tag_hash, msg])
}

/// Computes the canonical merkle root of a TLV record set. The root depends
/// only on the non-signature fields, so it is stable across signing.
pub fn merkle_tlv(stream: &TlvStream) -> [u8; 32] {
    let wires = stream
        .records()
        .iter()
        .filter(|record| record.typ < SIGNATURE_TYPE_RANGE_START)
        .map(|record| record.to_wire())
        .collect::<Vec<Vec<u8>>>();

    if wires.is_empty() {
        return [0u8; 32];
    }

    // The nonce tag commits to the entire record set.
    let mut nonce_tag = b"LnAll".to_vec();
    for wire in &wires {
        nonce_tag.extend_from_slice(wire);
    }

    let mut nodes = wires
        .iter()
        .map(|wire| {
            let leaf = tagged_hash(b"LnLeaf", wire);
            let nonce = tagged_hash(&nonce_tag, wire);
            branch_hash(&leaf, &nonce)
        })
        .collect::<Vec<[u8; 32]>>();

    while nodes.len() > 1 {
        let mut next = Vec::with_capacity(nodes.len().div_ceil(2));
        for pair in nodes.chunks(2) {
            match pair {
                [a, b] => next.push(branch_hash(a, b)),
                [odd] => next.push(*odd),
                _ => unreachable!(),
            }
        }
        nodes = next;
    }

    nodes[0]
}

/// The domain-separated signature hash over a merkle root. The tag is the
/// concatenation `"lightning" || tag_a || tag_b`, e.g.
/// `"lightning" "invoice" "signature"`.
pub fn sighash_from_merkle(
    tag_a: &str,
    tag_b: &str,
    merkle: &[u8; 32],
) -> [u8; 32] {
    let mut tag = Vec::with_capacity(9 + tag_a.len() + tag_b.len());
    tag.extend_from_slice(b"lightning");
    tag.extend_from_slice(tag_a.as_bytes());
    tag.extend_from_slice(tag_b.as_bytes());
    tagged_hash(&tag, merkle)
}

fn branch_hash(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let (lesser, greater) = if a <= b { (a, b) } else { (b, a) };
    let mut msg = [0u8; 64];
    msg[..32].copy_from_slice(lesser);
    msg[32..].copy_from_slice(greater);
    tagged_hash(b"LnBranch", &msg)
}

#[cfg(test)]
mod tests {
    use super::{
        super::tlv::{TlvRecord, TlvStream},
        *,
    };

    fn record(typ: u64, value: &[u8]) -> TlvRecord {
        TlvRecord {
            typ,
            value: value.to_vec(),
        }
    }

    #[test]
    fn tagged_hash_matches_bip340_shape() {
        let th = offerd_common::sha256::digest(b"LnLeaf");
        let manual = offerd_common::sha256::digest_many(&[&th, &th, b"msg"]);
        assert_eq!(tagged_hash(b"LnLeaf", b"msg"), manual);
    }

    #[test]
    fn merkle_ignores_signature_fields() {
        let unsigned = TlvStream::from_sorted_records(vec![
            record(10, b"description"),
            record(30, &[0x02; 32]),
        ]);
        let signed = TlvStream::from_sorted_records(vec![
            record(10, b"description"),
            record(30, &[0x02; 32]),
            record(240, &[0x55; 64]),
        ]);
        assert_eq!(merkle_tlv(&unsigned), merkle_tlv(&signed));
    }

    #[test]
    fn merkle_commits_to_every_field() {
        let base = TlvStream::from_sorted_records(vec![
            record(8, &[0x03, 0xe8]),
            record(10, b"description"),
            record(30, &[0x02; 32]),
        ]);
        let tweaked_value = TlvStream::from_sorted_records(vec![
            record(8, &[0x03, 0xe9]),
            record(10, b"description"),
            record(30, &[0x02; 32]),
        ]);
        let extra_field = TlvStream::from_sorted_records(vec![
            record(8, &[0x03, 0xe8]),
            record(10, b"description"),
            record(22, &[0x01]),
            record(30, &[0x02; 32]),
        ]);
        let root = merkle_tlv(&base);
        assert_ne!(root, merkle_tlv(&tweaked_value));
        assert_ne!(root, merkle_tlv(&extra_field));
    }

    #[test]
    fn merkle_handles_odd_and_single_field_sets() {
        for n in 1..=5u64 {
            let records = (0..n)
                .map(|i| record(2 * i + 2, &[i as u8; 4]))
                .collect::<Vec<_>>();
            let stream = TlvStream::from_sorted_records(records);
            // deterministic
            assert_eq!(merkle_tlv(&stream), merkle_tlv(&stream));
        }
    }

    #[test]
    fn sighash_is_domain_separated() {
        let merkle = [0x42; 32];
        let a = sighash_from_merkle("offer", "signature", &merkle);
        let b = sighash_from_merkle("invoice", "signature", &merkle);
        let c = sighash_from_merkle("invoice_request", "recurrence_signature", &merkle);
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }
}
