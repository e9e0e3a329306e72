//! The onion-message overlay seam.
//!
//! The overlay transport itself lives outside this crate. We hand it a
//! resolved hop list, the raw invoice request, and a reply path; it hands
//! us inbound messages annotated with the blinding they arrived under.

use async_trait::async_trait;
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use crate::blinded_path::BlindedPath;

/// Sends an onion message along `hops` (source first, recipient last),
/// delivering `invoice_request` to the final hop with `reply_path`
/// attached.
#[async_trait]
pub trait OnionMessenger: Send + Sync {
    async fn send_onion_message(
        &self,
        hops: &[PublicKey],
        invoice_request: &[u8],
        reply_path: &BlindedPath,
    ) -> anyhow::Result<()>;
}

/// An inbound overlay message, as delivered by the transport's hook. The
/// hook must always be acknowledged, matched or not.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InboundOnionMessage {
    /// The blinding the message arrived under; our pending-request key.
    #[serde(default)]
    pub blinding_in: Option<PublicKey>,
    #[serde(default, with = "offerd_common::hexstr_or_bytes_opt")]
    pub invoice: Option<Vec<u8>>,
    #[serde(default, with = "offerd_common::hexstr_or_bytes_opt")]
    pub invoice_error: Option<Vec<u8>>,
}
