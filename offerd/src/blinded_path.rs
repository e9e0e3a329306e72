//! Blinded reply paths.
//!
//! A reply path lets the offer's recipient answer our onion message without
//! learning who we are: each hop sees only a blinded node id and an
//! encrypted payload naming the next hop. The final hop is us; the
//! ephemeral blinding that arrives there (the "reply blinding") is what we
//! later use to pair the incoming reply with its pending request.
//!
//! Per-hop keys follow the route-blinding construction: with ephemeral key
//! `e_i` and hop pubkey `P_i`,
//!
//! - `ss_i   = ECDH(e_i, P_i)`
//! - `B_i    = P_i * HMAC256(ss_i, "blinded_node_id")`
//! - `rho_i  = HMAC256(ss_i, "rho")` keys the ChaCha20-Poly1305 enctlv
//! - `e_i+1  = e_i * SHA256(E_i || ss_i)`

use anyhow::{ensure, Context};
use offerd_common::{rng::Crng, sha256};
use ring::{aead, hmac};
use secp256k1::{
    ecdh::SharedSecret, PublicKey, Scalar, Secp256k1, SecretKey, Signing,
    Verification,
};

use crate::bolt12::tlv::TlvRecord;

/// TLV type carrying the next hop's unblinded node id inside an enctlv.
const ENCTLV_NEXT_NODE_ID: u64 = 4;

/// One entry of a reply path. The first entry keeps its real node id (the
/// recipient must be able to address it); later entries are blinded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlindedPathHop {
    pub node_id: PublicKey,
    /// Encrypted routing payload; absent on the final hop.
    pub enctlv: Option<Vec<u8>>,
}

/// A reply path plus its top-level blinding basepoint, ready to attach to
/// an outgoing onion message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlindedPath {
    pub blinding: PublicKey,
    pub hops: Vec<BlindedPathHop>,
}

/// Builds a reply path over `nodes` (the backwards route: first reply hop
/// first, ourselves last). Returns the path and the reply blinding we will
/// observe on the incoming reply.
pub fn build_reply_path<C: Signing + Verification>(
    secp: &Secp256k1<C>,
    rng: &mut impl Crng,
    nodes: &[PublicKey],
) -> anyhow::Result<(BlindedPath, PublicKey)> {
    ensure!(!nodes.is_empty(), "reply path needs at least ourselves");

    let mut ephemeral = random_secret_key(rng);
    let blinding = PublicKey::from_secret_key(secp, &ephemeral);

    let mut hops = Vec::with_capacity(nodes.len());
    let mut reply_blinding = blinding;

    for (i, node_id) in nodes.iter().enumerate() {
        let ephemeral_pk = PublicKey::from_secret_key(secp, &ephemeral);
        let ss = SharedSecret::new(node_id, &ephemeral).secret_bytes();

        let blinded_id = node_id
            .mul_tweak(secp, &scalar_hmac(&ss, b"blinded_node_id")?)
            .context("blinded node id off-curve")?;

        let enctlv = match nodes.get(i + 1) {
            Some(next_node_id) => {
                let plaintext = TlvRecord {
                    typ: ENCTLV_NEXT_NODE_ID,
                    value: next_node_id.serialize().to_vec(),
                }
                .to_wire();
                Some(encrypt_enctlv(&ss, plaintext)?)
            }
            None => {
                reply_blinding = ephemeral_pk;
                None
            }
        };

        hops.push(BlindedPathHop {
            node_id: if i == 0 { *node_id } else { blinded_id },
            enctlv,
        });

        // rotate the ephemeral key for the next hop
        let rotation =
            sha256::digest_many(&[&ephemeral_pk.serialize(), &ss]);
        ephemeral = ephemeral
            .mul_tweak(
                &Scalar::from_be_bytes(rotation)
                    .context("ephemeral rotation out of range")?,
            )
            .context("ephemeral rotation produced zero key")?;
    }

    Ok((BlindedPath { blinding, hops }, reply_blinding))
}

fn random_secret_key(rng: &mut impl Crng) -> SecretKey {
    loop {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        if let Ok(secret) = SecretKey::from_slice(&bytes) {
            return secret;
        }
    }
}

fn scalar_hmac(ss: &[u8; 32], tag: &[u8]) -> anyhow::Result<Scalar> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, ss);
    let mac = hmac::sign(&key, tag);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(mac.as_ref());
    Scalar::from_be_bytes(bytes).context("hmac subkey out of range")
}

fn encrypt_enctlv(
    ss: &[u8; 32],
    mut plaintext: Vec<u8>,
) -> anyhow::Result<Vec<u8>> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, ss);
    let rho = hmac::sign(&key, b"rho");
    let unbound = aead::UnboundKey::new(&aead::CHACHA20_POLY1305, rho.as_ref())
        .map_err(|_| anyhow::anyhow!("bad enctlv key length"))?;
    let sealing = aead::LessSafeKey::new(unbound);
    // rho is unique per hop, so the zero nonce is used exactly once
    sealing
        .seal_in_place_append_tag(
            aead::Nonce::assume_unique_for_key([0u8; 12]),
            aead::Aad::empty(),
            &mut plaintext,
        )
        .map_err(|_| anyhow::anyhow!("enctlv seal failed"))?;
    Ok(plaintext)
}
