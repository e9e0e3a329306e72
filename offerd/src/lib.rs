//! The `offerd` crate implements the offers subsystem of a Lightning-style
//! node: decoding recipient-published BOLT12 offers, constructing and signing
//! invoice requests with unlinkable payer identities, fetching the resulting
//! invoice over the onion-message overlay through a blinded reply path, and
//! validating the reply against the original offer.

/// Typed control-surface parameters and results.
pub mod api;
/// Blinded reply path construction.
pub mod blinded_path;
/// BOLT12 TLV records: offer, invoice_request, invoice, invoice_error.
pub mod bolt12;
/// Offer-store and invoice-request commands.
pub mod commands;
/// Stable numeric error taxonomy.
pub mod error;
/// Invoice fetch orchestration.
pub mod fetch;
/// Feature bitmaps.
pub mod features;
/// Read-only overlay gossip graph.
pub mod gossmap;
/// Logger initialization.
pub mod logger;
/// Offer persistence seam.
pub mod offer_store;
/// Onion-message overlay seam.
pub mod overlay;
/// Payer key derivation.
pub mod payer_key;
/// Payment history seam, used by the recurring-payment checks.
pub mod payments;
/// Outstanding fetch requests, keyed by reply blinding.
pub mod pending;
/// Recurrence period arithmetic.
pub mod recurrence;
/// Reply validation.
pub mod reply;
/// Dijkstra over the onion-message-capable overlay.
pub mod route;
/// Signing authority seam.
pub mod signer;

pub use crate::{
    commands::{OffersConfig, OffersService},
    error::{ErrorCode, OffersError},
    fetch::{FetchConfig, FetchService},
};
