//! The signing authority seam.
//!
//! BOLT12 signatures (offer signatures, recurrence signatures) are produced
//! by an external signer which holds the node's keys. The signer is a
//! required trust root: any transport failure or malformed reply terminates
//! the process, since continuing with partial state would be unsafe.

use async_trait::async_trait;
use secp256k1::schnorr;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};
use tracing::error;

/// Signs a 32-byte merkle root under a domain-separating tag pair.
///
/// When `payer_info` is given, the signer tweaks its base bolt12 key with
/// `SHA256(base || payer_info)` before signing, so the signature verifies
/// under the derived payer key.
#[async_trait]
pub trait Bolt12Signer: Send + Sync {
    async fn sign_bolt12(
        &self,
        tag_a: &str,
        tag_b: &str,
        merkle: &[u8; 32],
        payer_info: Option<&[u8]>,
    ) -> schnorr::Signature;
}

const SIGN_BOLT12_REQ: u16 = 25;
const SIGN_BOLT12_REPLY: u16 = 125;

/// A [`Bolt12Signer`] speaking a length-prefixed request/reply codec over an
/// opaque byte channel. Requests are serialized: one outstanding at a time.
pub struct SignerChannel<S> {
    io: Mutex<S>,
}

impl<S> SignerChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(io: S) -> Self {
        Self { io: Mutex::new(io) }
    }

    fn encode_request(
        tag_a: &str,
        tag_b: &str,
        merkle: &[u8; 32],
        payer_info: Option<&[u8]>,
    ) -> Vec<u8> {
        let info = payer_info.unwrap_or(&[]);
        let mut msg = Vec::with_capacity(
            2 + 2 + tag_a.len() + 2 + tag_b.len() + 32 + 2 + info.len(),
        );
        msg.extend_from_slice(&SIGN_BOLT12_REQ.to_be_bytes());
        msg.extend_from_slice(&(tag_a.len() as u16).to_be_bytes());
        msg.extend_from_slice(tag_a.as_bytes());
        msg.extend_from_slice(&(tag_b.len() as u16).to_be_bytes());
        msg.extend_from_slice(tag_b.as_bytes());
        msg.extend_from_slice(merkle);
        msg.extend_from_slice(&(info.len() as u16).to_be_bytes());
        msg.extend_from_slice(info);
        msg
    }
}

#[async_trait]
impl<S> Bolt12Signer for SignerChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn sign_bolt12(
        &self,
        tag_a: &str,
        tag_b: &str,
        merkle: &[u8; 32],
        payer_info: Option<&[u8]>,
    ) -> schnorr::Signature {
        let msg = Self::encode_request(tag_a, tag_b, merkle, payer_info);
        let mut io = self.io.lock().await;

        let write_result = async {
            io.write_all(&(msg.len() as u16).to_be_bytes()).await?;
            io.write_all(&msg).await?;
            io.flush().await
        }
        .await;
        if let Err(err) = write_result {
            signer_fatal(&format!("could not write to signer: {err}"));
        }

        let reply = async {
            let mut len = [0u8; 2];
            io.read_exact(&mut len).await?;
            let mut reply = vec![0u8; usize::from(u16::from_be_bytes(len))];
            io.read_exact(&mut reply).await?;
            Ok::<Vec<u8>, std::io::Error>(reply)
        }
        .await;
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) =>
                signer_fatal(&format!("could not read from signer: {err}")),
        };

        parse_sign_reply(&reply).unwrap_or_else(|| {
            signer_fatal(&format!(
                "signer gave bad sign_bolt12 reply: {}",
                offerd_common::hex::display(&reply),
            ))
        })
    }
}

fn parse_sign_reply(reply: &[u8]) -> Option<schnorr::Signature> {
    if reply.len() != 2 + 64 {
        return None;
    }
    let (typ, sig) = reply.split_at(2);
    if u16::from_be_bytes([typ[0], typ[1]]) != SIGN_BOLT12_REPLY {
        return None;
    }
    schnorr::Signature::from_slice(sig).ok()
}

/// The signer is the trust root; losing it is not recoverable.
fn signer_fatal(msg: &str) -> ! {
    error!("fatal: {msg}");
    std::process::exit(1);
}

#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    //! An in-process signer for tests, holding the bolt12 base keypair.

    use async_trait::async_trait;
    use offerd_common::rng::{Crng, RngExt};
    use secp256k1::{
        schnorr, All, Keypair, Message, Scalar, Secp256k1, XOnlyPublicKey,
    };

    use super::Bolt12Signer;
    use crate::{bolt12::merkle, payer_key};

    pub struct MemorySigner {
        secp: Secp256k1<All>,
        keypair: Keypair,
    }

    impl MemorySigner {
        pub fn from_seed(seed: &[u8; 32]) -> Self {
            let secp = Secp256k1::new();
            let keypair = Keypair::from_seckey_slice(&secp, seed)
                .expect("bad test seed");
            Self { secp, keypair }
        }

        pub fn from_rng(rng: &mut impl Crng) -> Self {
            loop {
                let seed = rng.gen_bytes::<32>();
                let secp = Secp256k1::new();
                if let Ok(keypair) =
                    Keypair::from_seckey_slice(&secp, &seed)
                {
                    return Self { secp, keypair };
                }
            }
        }

        /// The x-only base key; payer keys are tweaks of it.
        pub fn base_key(&self) -> XOnlyPublicKey {
            self.keypair.x_only_public_key().0
        }
    }

    #[async_trait]
    impl Bolt12Signer for MemorySigner {
        async fn sign_bolt12(
            &self,
            tag_a: &str,
            tag_b: &str,
            merkle: &[u8; 32],
            payer_info: Option<&[u8]>,
        ) -> schnorr::Signature {
            let keypair = match payer_info {
                Some(info) => {
                    let hash = payer_key::payer_key_tweak(
                        &self.base_key(),
                        info,
                    );
                    let scalar = Scalar::from_be_bytes(hash)
                        .expect("negligible: tweak out of range");
                    self.keypair
                        .add_xonly_tweak(&self.secp, &scalar)
                        .expect("negligible: tweaked key invalid")
                }
                None => self.keypair,
            };
            let sighash =
                merkle::sighash_from_merkle(tag_a, tag_b, merkle);
            self.secp.sign_schnorr_no_aux_rand(
                &Message::from_digest(sighash),
                &keypair,
            )
        }
    }
}
