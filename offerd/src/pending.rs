//! The table of outstanding invoice fetches, keyed by the reply blinding
//! each request expects to see on its incoming reply.
//!
//! This is a scoped registry owned by the fetch subsystem (one per
//! [`FetchService`](crate::fetch::FetchService) instance), not a process
//! global. Entries are created at send time and removed on reply, timeout,
//! or cancellation; whichever happens first takes the completion handle.

use std::{collections::HashMap, sync::Mutex};

use secp256k1::PublicKey;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::{
    api::FetchInvoiceResponse,
    bolt12::{InvoiceRequest, Offer},
    error::OffersError,
};

/// How a fetch completes: a validated invoice (with its changes report), or
/// a protocol error.
pub type FetchOutcome = Result<FetchInvoiceResponse, OffersError>;

/// One outstanding fetch. The record copies are what the reply validator
/// checks the incoming invoice against.
pub struct PendingRequest {
    pub offer: Offer,
    pub invreq: InvoiceRequest,
    pub completion: oneshot::Sender<FetchOutcome>,
}

/// Two in-flight requests landed on the same reply blinding. The
/// probability is cryptographically negligible; hitting this in practice
/// means a broken rng.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
#[error("duplicate reply blinding")]
pub struct DuplicateBlinding;

#[derive(Default)]
pub struct PendingRequests {
    inner: Mutex<HashMap<PublicKey, PendingRequest>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an outstanding request under its reply blinding. At most
    /// one entry per blinding may exist.
    pub fn insert(
        &self,
        reply_blinding: PublicKey,
        request: PendingRequest,
    ) -> Result<(), DuplicateBlinding> {
        let mut inner = self.inner.lock().unwrap();
        if inner.contains_key(&reply_blinding) {
            return Err(DuplicateBlinding);
        }
        inner.insert(reply_blinding, request);
        Ok(())
    }

    /// Takes the entry for `reply_blinding`, if any. The caller owns the
    /// completion handle afterwards; later replies for the same blinding
    /// find nothing.
    pub fn remove(
        &self,
        reply_blinding: &PublicKey,
    ) -> Option<PendingRequest> {
        self.inner.lock().unwrap().remove(reply_blinding)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use secp256k1::{Secp256k1, SecretKey};

    use super::*;

    fn blinding(n: u8) -> PublicKey {
        let secp = Secp256k1::new();
        PublicKey::from_secret_key(
            &secp,
            &SecretKey::from_slice(&[n; 32]).unwrap(),
        )
    }

    fn dummy_request() -> (PendingRequest, oneshot::Receiver<FetchOutcome>) {
        let (tx, rx) = oneshot::channel();
        let request = PendingRequest {
            offer: Offer::default(),
            invreq: InvoiceRequest::default(),
            completion: tx,
        };
        (request, rx)
    }

    #[test]
    fn insert_remove_lifecycle() {
        let pending = PendingRequests::new();
        assert!(pending.is_empty());

        let (request, _rx) = dummy_request();
        pending.insert(blinding(1), request).unwrap();
        assert_eq!(pending.len(), 1);

        // unrelated blinding finds nothing and mutates nothing
        assert!(pending.remove(&blinding(2)).is_none());
        assert_eq!(pending.len(), 1);

        assert!(pending.remove(&blinding(1)).is_some());
        assert!(pending.is_empty());
        // second removal is a no-op
        assert!(pending.remove(&blinding(1)).is_none());
    }

    #[test]
    fn duplicate_blinding_rejected() {
        let pending = PendingRequests::new();
        let (first, _rx1) = dummy_request();
        let (second, _rx2) = dummy_request();

        pending.insert(blinding(1), first).unwrap();
        assert_eq!(
            pending.insert(blinding(1), second).unwrap_err(),
            DuplicateBlinding,
        );
        assert_eq!(pending.len(), 1);
    }
}
