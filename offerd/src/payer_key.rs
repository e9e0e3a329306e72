//! Payer key derivation.
//!
//! Every invoice request carries a `payer_key` derived from the node's base
//! bolt12 key and the request's opaque `payer_info` tweak, so distinct
//! offers see unlinkable payer identities:
//!
//! `payer_key = xonly(base + SHA256(base || payer_info) * G)`

use offerd_common::sha256;
use secp256k1::{Scalar, Secp256k1, Verification, XOnlyPublicKey};
use thiserror::Error;

/// The tweak hash or the tweaked point was out of range. Probability is
/// negligible for honestly random tweaks, but it must be surfaced.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
#[error("invalid payer key tweak")]
pub struct InvalidTweak;

/// `SHA256(base_xonly_serialized || tweak)`.
pub fn payer_key_tweak(base: &XOnlyPublicKey, tweak: &[u8]) -> [u8; 32] {
    sha256::digest_many(&[&base.serialize(), tweak])
}

/// Derives the x-only payer key for the given tweak bytes. The parity of
/// the tweaked point is discarded.
pub fn derive_payer_key<C: Verification>(
    secp: &Secp256k1<C>,
    base: XOnlyPublicKey,
    tweak: &[u8],
) -> Result<XOnlyPublicKey, InvalidTweak> {
    let hash = payer_key_tweak(&base, tweak);
    let scalar = Scalar::from_be_bytes(hash).map_err(|_| InvalidTweak)?;
    let (tweaked, _parity) =
        base.add_tweak(secp, &scalar).map_err(|_| InvalidTweak)?;
    Ok(tweaked)
}
