//! Fetching an invoice for an offer: build the invoice request, route to
//! the recipient over onion-message-capable channels, attach a blinded
//! reply path, send, and wait for the validated reply.

use std::{sync::Arc, time::Duration};

use offerd_common::{rng::Crng, time::TimestampSecs};
use secp256k1::PublicKey;
use tokio::{sync::oneshot, time::timeout};
use tracing::{debug, warn};

use crate::{
    api::{FetchInvoiceRequest, FetchInvoiceResponse},
    blinded_path,
    bolt12::{InvoiceRequest, Offer},
    commands::OffersService,
    error::{ErrorCode, OffersError},
    gossmap::GossipSource,
    overlay::{InboundOnionMessage, OnionMessenger},
    pending::{PendingRequest, PendingRequests},
    reply,
    route::{self, RouteError},
};

/// How long a fetch waits for its reply before giving up. Bounded; the
/// entry is removed on expiry.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct FetchConfig {
    /// Our own node id, the route source and final reply-path hop.
    pub local_node_id: PublicKey,
    pub reply_timeout: Duration,
}

impl FetchConfig {
    pub fn new(local_node_id: PublicKey) -> Self {
        Self {
            local_node_id,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

/// The fetch orchestrator. Owns the pending-request registry; one instance
/// per subsystem.
pub struct FetchService {
    config: FetchConfig,
    offers: Arc<OffersService>,
    gossip: Arc<dyn GossipSource>,
    overlay: Arc<dyn OnionMessenger>,
    pending: PendingRequests,
}

impl FetchService {
    pub fn new(
        config: FetchConfig,
        offers: Arc<OffersService>,
        gossip: Arc<dyn GossipSource>,
        overlay: Arc<dyn OnionMessenger>,
    ) -> Self {
        Self {
            config,
            offers,
            gossip,
            overlay,
            pending: PendingRequests::new(),
        }
    }

    /// Fetches an invoice for `request.offer`, validating the reply against
    /// the offer's terms. Completion is driven by
    /// [`handle_onion_message`](Self::handle_onion_message); cancellation
    /// (dropping the returned future) or timeout retires the pending entry.
    pub async fn fetch_invoice(
        &self,
        rng: &mut impl Crng,
        request: FetchInvoiceRequest,
    ) -> Result<FetchInvoiceResponse, OffersError> {
        let offer = Offer::parse(
            self.offers.secp(),
            &request.offer,
            self.offers.features(),
            self.offers.chain(),
        )
        .map_err(|err| {
            OffersError::invalid_params(format!("Unparsable offer: {err}"))
        })?;
        let node_id = offer.node_id.ok_or_else(|| {
            OffersError::invalid_params("Offer does not contain a node_id")
        })?;
        if offer.description.is_none() {
            return Err(OffersError::invalid_params(
                "Offer does not contain a description",
            ));
        }

        let mut invreq = build_invreq(
            &offer,
            &request,
            self.offers.chain().is_bitcoin,
            self.offers.chain().genesis,
        )?;
        if !self.offers.features().is_empty() {
            invreq.features = Some(self.offers.features().clone());
        }
        self.offers
            .complete_invoice_request(
                rng,
                &mut invreq,
                request.recurrence_label.as_deref(),
            )
            .await?;
        let invreq_bytes = invreq.encode();

        // Route over the freshest graph snapshot.
        let gossmap = self.gossip.get_gossmap().map_err(|err| {
            OffersError::internal(format!("gossmap: {err:#}"))
        })?;
        let hops = route::find_onionmsg_route(
            &gossmap,
            &self.config.local_node_id,
            &node_id,
        )
        .map_err(|err| match err {
            RouteError::UnknownDestination => OffersError::internal(
                format!("Unknown destination {node_id}"),
            ),
            RouteError::NoChannels => OffersError::new(
                ErrorCode::RouteNotFound,
                "We don't have any channels",
            ),
            RouteError::NoRoute => OffersError::new(
                ErrorCode::OfferRouteNotFound,
                "Can't find route",
            ),
        })?;

        // The reply path visits each hop's source in reverse: from the
        // recipient's peer back to us.
        let mut backwards = Vec::with_capacity(hops.len());
        backwards.push(self.config.local_node_id);
        for hop in hops.iter().take(hops.len().saturating_sub(1)) {
            backwards.push(hop.node_id);
        }
        backwards.reverse();

        let (reply_path, reply_blinding) = blinded_path::build_reply_path(
            self.offers.secp(),
            rng,
            &backwards,
        )
        .map_err(|err| {
            OffersError::internal(format!("reply path: {err:#}"))
        })?;

        let hop_ids =
            hops.iter().map(|hop| hop.node_id).collect::<Vec<_>>();
        self.overlay
            .send_onion_message(&hop_ids, &invreq_bytes, &reply_path)
            .await
            .map_err(|err| {
                OffersError::internal(format!("onion message send: {err:#}"))
            })?;

        let (completion, rx) = oneshot::channel();
        self.pending
            .insert(
                reply_blinding,
                PendingRequest {
                    offer,
                    invreq,
                    completion,
                },
            )
            .map_err(|err| OffersError::internal(err.to_string()))?;
        // Retires the entry on timeout or caller cancellation; a no-op if
        // the reply handler got there first.
        let _guard = PendingGuard {
            pending: &self.pending,
            reply_blinding,
        };

        debug!(
            "invoice_request sent, awaiting reply under blinding \
             {reply_blinding}",
        );
        match timeout(self.config.reply_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_closed)) => {
                Err(OffersError::internal("reply dispatch dropped"))
            }
            Err(_elapsed) => Err(OffersError::new(
                ErrorCode::OfferTimeout,
                "Timed out waiting for response",
            )),
        }
    }

    /// The overlay's inbound hook. Always acknowledges: unmatched or
    /// malformed messages are logged and dropped, never errors.
    pub async fn handle_onion_message(&self, message: InboundOnionMessage) {
        debug!(
            "Received onion message: blinding_in={:?} invoice={} \
             invoice_error={}",
            message.blinding_in,
            message.invoice.is_some(),
            message.invoice_error.is_some(),
        );
        let blinding_in = match message.blinding_in {
            Some(blinding_in) => blinding_in,
            None => return,
        };
        let entry = match self.pending.remove(&blinding_in) {
            Some(entry) => entry,
            None => {
                debug!("No match for onion message under {blinding_in}");
                return;
            }
        };

        // From here on we know the reply is genuine, so a bad payload
        // fails the fetch rather than being ignored.
        let outcome = if let Some(error_bytes) = &message.invoice_error {
            Err(reply::invoice_error_reply(error_bytes))
        } else if let Some(invoice_bytes) = &message.invoice {
            reply::validate_reply(
                self.offers.secp(),
                &entry.offer,
                &entry.invreq,
                invoice_bytes,
                self.offers.features(),
                self.offers.chain(),
            )
        } else {
            warn!("Neither invoice nor invoice_error in reply");
            Err(OffersError::new(
                ErrorCode::OfferBadInvreqReply,
                "Neither invoice nor invoice_error in reply",
            ))
        };

        if entry.completion.send(outcome).is_err() {
            debug!("Fetch caller went away before its reply arrived");
        }
    }

    /// Outstanding request count, for introspection.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }
}

/// Removes the pending entry when the fetch future completes or is
/// dropped. Removal is idempotent, so racing the reply handler is fine.
struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    reply_blinding: PublicKey,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.reply_blinding);
    }
}

/// The parameter pre-checks of a fetch, and the resulting unsigned invoice
/// request. Each failure carries a specific, stable error.
fn build_invreq(
    offer: &Offer,
    request: &FetchInvoiceRequest,
    chain_is_bitcoin: bool,
    genesis: [u8; 32],
) -> Result<InvoiceRequest, OffersError> {
    let mut invreq = InvoiceRequest {
        offer_id: Some(offer.id()),
        quantity: request.quantity,
        recurrence_counter: request.recurrence_counter,
        recurrence_start: request.recurrence_start,
        ..InvoiceRequest::default()
    };

    // They want to send us money; that's the inverse flow.
    if offer.send_invoice {
        return Err(OffersError::invalid_params(
            "Offer wants an invoice, not invoice_request",
        ));
    }

    if let Some(absolute_expiry) = offer.absolute_expiry {
        if TimestampSecs::now().as_secs() > absolute_expiry {
            return Err(OffersError::new(
                ErrorCode::OfferExpired,
                "Offer expired",
            ));
        }
    }

    // An amount is required exactly when the offer leaves it open.
    if offer.amount.is_some() {
        if request.amount_msat.is_some() {
            return Err(OffersError::invalid_params(
                "amount_msat parameter unnecessary",
            ));
        }
    } else {
        match request.amount_msat {
            Some(amount_msat) => invreq.amount = Some(amount_msat),
            None => {
                return Err(OffersError::invalid_params(
                    "amount_msat parameter required",
                ));
            }
        }
    }

    // Quantity is required exactly when the offer bounds it, and must lie
    // within the (inclusive) bounds.
    if offer.quantity_min.is_some() || offer.quantity_max.is_some() {
        let quantity = invreq.quantity.ok_or_else(|| {
            OffersError::invalid_params("quantity parameter required")
        })?;
        if let Some(min) = offer.quantity_min {
            if quantity < min {
                return Err(OffersError::invalid_params(format!(
                    "quantity must be >= {min}",
                )));
            }
        }
        if let Some(max) = offer.quantity_max {
            if quantity > max {
                return Err(OffersError::invalid_params(format!(
                    "quantity must be <= {max}",
                )));
            }
        }
    } else if invreq.quantity.is_some() {
        return Err(OffersError::invalid_params(
            "quantity parameter unnecessary",
        ));
    }

    if offer.recurrence.is_some() {
        if invreq.recurrence_counter.is_none() {
            return Err(OffersError::invalid_params(
                "needs recurrence_counter",
            ));
        }

        let start_any_period = offer
            .recurrence_base
            .map(|base| base.start_any_period)
            .unwrap_or(false);
        if start_any_period {
            if invreq.recurrence_start.is_none() {
                return Err(OffersError::invalid_params(
                    "needs recurrence_start",
                ));
            }
        } else if invreq.recurrence_start.is_some() {
            return Err(OffersError::invalid_params(
                "unnecessary recurrence_start",
            ));
        }

        // recurrence_label uniquely identifies this series of payments
        if request.recurrence_label.is_none() {
            return Err(OffersError::invalid_params(
                "needs recurrence_label",
            ));
        }
    } else {
        if invreq.recurrence_counter.is_some() {
            return Err(OffersError::invalid_params(
                "unnecessary recurrence_counter",
            ));
        }
        if invreq.recurrence_start.is_some() {
            return Err(OffersError::invalid_params(
                "unnecessary recurrence_start",
            ));
        }
    }

    // Only a non-bitcoin chain is disclosed; bitcoin is implied.
    if !chain_is_bitcoin {
        invreq.chains = Some(vec![genesis]);
    }

    Ok(invreq)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bitcoin::Network;
    use offerd_common::rng::WeakRng;
    use secp256k1::{Keypair, Message, Secp256k1, SecretKey};

    use super::*;
    use crate::{
        blinded_path::BlindedPath,
        bolt12::{merkle, Invoice},
        commands::OffersConfig,
        features::{Features, ONION_MESSAGES_OPT},
        gossmap::{Gossmap, ShortChannelId, SwappableGossmap},
        offer_store::MemoryOfferStore,
        payments::MemoryPaymentStore,
        signer::testing::MemorySigner,
    };

    struct SentMessage {
        hops: Vec<PublicKey>,
        invoice_request: Vec<u8>,
        reply_path: BlindedPath,
    }

    #[derive(Default)]
    struct MockOverlay {
        sent: Mutex<Vec<SentMessage>>,
    }

    #[async_trait]
    impl OnionMessenger for MockOverlay {
        async fn send_onion_message(
            &self,
            hops: &[PublicKey],
            invoice_request: &[u8],
            reply_path: &BlindedPath,
        ) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(SentMessage {
                hops: hops.to_vec(),
                invoice_request: invoice_request.to_vec(),
                reply_path: reply_path.clone(),
            });
            Ok(())
        }
    }

    struct Harness {
        service: Arc<FetchService>,
        overlay: Arc<MockOverlay>,
        node: Keypair,
        local_id: PublicKey,
        dest_id: PublicKey,
    }

    fn local_secret() -> SecretKey {
        SecretKey::from_slice(&[0x01; 32]).unwrap()
    }

    /// A two-node graph: us and the offer's node, one enabled channel,
    /// onion messages supported on both ends.
    fn harness_with_timeout(reply_timeout: Duration) -> Harness {
        let secp = Secp256k1::new();
        let node = Keypair::from_seckey_slice(&secp, &[0x42; 32]).unwrap();
        let local_id = PublicKey::from_secret_key(&secp, &local_secret());
        let dest_id = node.public_key();

        let mut features = Features::empty();
        features.set(ONION_MESSAGES_OPT);
        let gossmap = Gossmap::builder()
            .node(local_id, features.clone())
            .node(dest_id, features)
            .channel(ShortChannelId(42), local_id, dest_id, [true, true])
            .build();

        let signer = Arc::new(MemorySigner::from_seed(&[0x51; 32]));
        let base_key = signer.base_key();
        let offers = Arc::new(OffersService::new(
            OffersConfig {
                network: Network::Bitcoin,
                base_payer_key: base_key,
                features: Features::empty(),
            },
            signer,
            Arc::new(MemoryOfferStore::new()),
            Arc::new(MemoryPaymentStore::new()),
        ));
        let overlay = Arc::new(MockOverlay::default());
        let service = Arc::new(FetchService::new(
            FetchConfig {
                local_node_id: local_id,
                reply_timeout,
            },
            offers,
            Arc::new(SwappableGossmap::new(gossmap)),
            overlay.clone(),
        ));

        Harness {
            service,
            overlay,
            node,
            local_id,
            dest_id,
        }
    }

    fn harness() -> Harness {
        harness_with_timeout(Duration::from_secs(5))
    }

    /// The recipient's x-only node id is the destination's.
    fn dummy_offer(h: &Harness) -> Offer {
        Offer {
            amount: Some(1000),
            description: Some("a cup of coffee".to_owned()),
            node_id: Some(h.dest_id.x_only_public_key().0),
            ..Offer::default()
        }
    }

    fn fetch_request(offer: &Offer) -> FetchInvoiceRequest {
        FetchInvoiceRequest {
            offer: offer.to_bech32(),
            amount_msat: None,
            quantity: None,
            recurrence_counter: None,
            recurrence_start: None,
            recurrence_label: None,
        }
    }

    async fn wait_for_send(overlay: &MockOverlay) -> SentMessage {
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let mut sent = overlay.sent.lock().unwrap();
            if let Some(message) = sent.pop() {
                return message;
            }
        }
        panic!("overlay never saw the onion message");
    }

    /// Answer a captured invoice request the way an honest recipient
    /// would: all carry-over fields copied, amount as asked, signed.
    fn answer(h: &Harness, sent: &SentMessage) -> Vec<u8> {
        let chain = crate::bolt12::ChainParams::from_network(Network::Bitcoin);
        let invreq = InvoiceRequest::decode(
            &sent.invoice_request,
            &Features::empty(),
            &chain,
        )
        .unwrap();

        let mut invoice = Invoice {
            offer_id: invreq.offer_id,
            amount: Some(1000),
            description: Some("a cup of coffee".to_owned()),
            node_id: Some(h.dest_id.x_only_public_key().0),
            quantity: invreq.quantity,
            recurrence_counter: invreq.recurrence_counter,
            recurrence_start: invreq.recurrence_start,
            payer_key: invreq.payer_key,
            payer_info: invreq.payer_info.clone(),
            timestamp: Some(1_650_000_000),
            payment_hash: Some([0x55; 32]),
            ..Invoice::default()
        };
        let sighash = merkle::sighash_from_merkle(
            "invoice",
            "signature",
            &invoice.merkle(),
        );
        invoice.signature = Some(
            Secp256k1::new().sign_schnorr_no_aux_rand(
                &Message::from_digest(sighash),
                &h.node,
            ),
        );
        invoice.encode()
    }

    #[tokio::test]
    async fn fetch_invoice_end_to_end() {
        let h = harness();
        let offer = dummy_offer(&h);
        let request = fetch_request(&offer);

        let service = h.service.clone();
        let fetch = tokio::spawn(async move {
            let mut rng = WeakRng::from_u64(20230215);
            service.fetch_invoice(&mut rng, request).await
        });

        let sent = wait_for_send(&h.overlay).await;
        // direct route: one hop, the destination, carrying the invreq
        assert_eq!(sent.hops, vec![h.dest_id]);
        // the reply path points back at us
        assert_eq!(sent.reply_path.hops.len(), 1);
        assert_eq!(sent.reply_path.hops[0].node_id, h.local_id);
        assert_eq!(h.service.pending_requests(), 1);

        // the invreq we sent is well-formed
        let chain = crate::bolt12::ChainParams::from_network(Network::Bitcoin);
        let invreq = InvoiceRequest::decode(
            &sent.invoice_request,
            &Features::empty(),
            &chain,
        )
        .unwrap();
        assert_eq!(invreq.offer_id, Some(offer.id()));
        assert_eq!(invreq.amount, None); // offer stated the amount
        assert_eq!(invreq.payer_info.as_ref().unwrap().len(), 16);
        assert!(invreq.chains.is_none()); // bitcoin implied

        // a single-hop reply path's blinding is the reply blinding
        let invoice_bytes = answer(&h, &sent);
        h.service
            .handle_onion_message(InboundOnionMessage {
                blinding_in: Some(sent.reply_path.blinding),
                invoice: Some(invoice_bytes),
                invoice_error: None,
            })
            .await;

        let response = fetch.await.unwrap().unwrap();
        assert!(response.invoice.starts_with("lni1"));
        assert!(response.changes.is_empty());
        assert_eq!(h.service.pending_requests(), 0);
    }

    #[tokio::test]
    async fn fetch_invoice_error_reply() {
        let h = harness();
        let offer = dummy_offer(&h);
        let request = fetch_request(&offer);

        let service = h.service.clone();
        let fetch = tokio::spawn(async move {
            let mut rng = WeakRng::from_u64(20230216);
            service.fetch_invoice(&mut rng, request).await
        });

        let sent = wait_for_send(&h.overlay).await;
        let error_bytes = crate::bolt12::InvoiceError {
            erroneous_field: Some(42),
            suggested_value: None,
            error: Some("try again later".to_owned()),
        }
        .encode();
        h.service
            .handle_onion_message(InboundOnionMessage {
                blinding_in: Some(sent.reply_path.blinding),
                invoice: None,
                invoice_error: Some(error_bytes),
            })
            .await;

        let err = fetch.await.unwrap().unwrap_err();
        assert_eq!(err.code, ErrorCode::OfferBadInvreqReply);
        let details = err.details.unwrap();
        assert_eq!(details["erroneous_field"], 42);
        assert_eq!(details["error"], "try again later");
    }

    #[tokio::test]
    async fn unmatched_blinding_is_ignored() {
        let h = harness();
        let offer = dummy_offer(&h);
        let request = fetch_request(&offer);

        let service = h.service.clone();
        let fetch = tokio::spawn(async move {
            let mut rng = WeakRng::from_u64(20230217);
            service.fetch_invoice(&mut rng, request).await
        });

        let sent = wait_for_send(&h.overlay).await;
        assert_eq!(h.service.pending_requests(), 1);

        // a reply under an unrelated blinding: acknowledged, nothing
        // mutated, no caller notified
        let secp = Secp256k1::new();
        let unrelated = PublicKey::from_secret_key(
            &secp,
            &SecretKey::from_slice(&[0x33; 32]).unwrap(),
        );
        h.service
            .handle_onion_message(InboundOnionMessage {
                blinding_in: Some(unrelated),
                invoice: Some(vec![0x00]),
                invoice_error: None,
            })
            .await;
        assert_eq!(h.service.pending_requests(), 1);

        // the real reply still completes the fetch
        let invoice_bytes = answer(&h, &sent);
        h.service
            .handle_onion_message(InboundOnionMessage {
                blinding_in: Some(sent.reply_path.blinding),
                invoice: Some(invoice_bytes),
                invoice_error: None,
            })
            .await;
        fetch.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn fetch_times_out() {
        let h = harness_with_timeout(Duration::from_millis(50));
        let offer = dummy_offer(&h);

        let mut rng = WeakRng::from_u64(20230218);
        let err = h
            .service
            .fetch_invoice(&mut rng, fetch_request(&offer))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OfferTimeout);
        // the entry is retired; a late reply finds nothing
        assert_eq!(h.service.pending_requests(), 0);
    }

    #[tokio::test]
    async fn rejects_send_invoice_offers() {
        let h = harness();
        let offer = Offer {
            send_invoice: true,
            ..dummy_offer(&h)
        };
        let mut rng = WeakRng::from_u64(1);
        let err = h
            .service
            .fetch_invoice(&mut rng, fetch_request(&offer))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
        assert!(err.message.contains("wants an invoice"));
    }

    #[tokio::test]
    async fn rejects_expired_offer() {
        let h = harness();
        let offer = Offer {
            absolute_expiry: Some(1), // 1970
            ..dummy_offer(&h)
        };
        let mut rng = WeakRng::from_u64(1);
        let err = h
            .service
            .fetch_invoice(&mut rng, fetch_request(&offer))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OfferExpired);
    }

    #[tokio::test]
    async fn amount_parameter_rules() {
        let h = harness();
        let mut rng = WeakRng::from_u64(1);

        // offer has amount, caller provides one: unnecessary
        let offer = dummy_offer(&h);
        let err = h
            .service
            .fetch_invoice(
                &mut rng,
                FetchInvoiceRequest {
                    amount_msat: Some(1234),
                    ..fetch_request(&offer)
                },
            )
            .await
            .unwrap_err();
        assert!(err.message.contains("unnecessary"));

        // offer has no amount, caller provides none: required
        let offer = Offer {
            amount: None,
            ..dummy_offer(&h)
        };
        let err = h
            .service
            .fetch_invoice(&mut rng, fetch_request(&offer))
            .await
            .unwrap_err();
        assert!(err.message.contains("required"));
    }

    #[tokio::test]
    async fn quantity_boundaries() {
        let h = harness();
        let offer = Offer {
            quantity_min: Some(2),
            quantity_max: Some(5),
            ..dummy_offer(&h)
        };

        // helper runs the fetch with a given quantity and an immediate
        // honest reply
        async fn try_quantity(
            h: &Harness,
            offer: &Offer,
            quantity: Option<u64>,
        ) -> Result<FetchInvoiceResponse, OffersError> {
            let request = FetchInvoiceRequest {
                quantity,
                ..fetch_request(offer)
            };
            let service = h.service.clone();
            let fetch = tokio::spawn(async move {
                let mut rng = WeakRng::from_u64(99);
                service.fetch_invoice(&mut rng, request).await
            });
            // feed a reply only if the pre-checks passed and a message
            // went out
            for _ in 0..100 {
                tokio::time::sleep(Duration::from_millis(2)).await;
                if fetch.is_finished() {
                    return fetch.await.unwrap();
                }
                let sent = h.overlay.sent.lock().unwrap().pop();
                if let Some(sent) = sent {
                    let invoice_bytes = answer(h, &sent);
                    h.service
                        .handle_onion_message(InboundOnionMessage {
                            blinding_in: Some(sent.reply_path.blinding),
                            invoice: Some(invoice_bytes),
                            invoice_error: None,
                        })
                        .await;
                    return fetch.await.unwrap();
                }
            }
            panic!("fetch neither failed nor sent");
        }

        // at min-1, min, max, max+1 the builder accepts exactly the
        // middle two
        let err = try_quantity(&h, &offer, Some(1)).await.unwrap_err();
        assert!(err.message.contains(">= 2"));
        try_quantity(&h, &offer, Some(2)).await.unwrap();
        try_quantity(&h, &offer, Some(5)).await.unwrap();
        let err = try_quantity(&h, &offer, Some(6)).await.unwrap_err();
        assert!(err.message.contains("<= 5"));

        // required when bounded, unnecessary when not
        let err = try_quantity(&h, &offer, None).await.unwrap_err();
        assert!(err.message.contains("required"));
        let err = try_quantity(&h, &dummy_offer(&h), Some(2))
            .await
            .unwrap_err();
        assert!(err.message.contains("unnecessary"));
    }

    #[tokio::test]
    async fn recurrence_parameter_rules() {
        let h = harness();
        let mut rng = WeakRng::from_u64(1);
        let recurring = Offer {
            recurrence: Some(crate::recurrence::Recurrence {
                time_unit: crate::recurrence::time_unit::MONTHS,
                period: 1,
            }),
            recurrence_base: Some(crate::recurrence::RecurrenceBase {
                start_any_period: true,
                basetime: 1_609_459_200,
            }),
            ..dummy_offer(&h)
        };

        // counter required
        let err = h
            .service
            .fetch_invoice(&mut rng, fetch_request(&recurring))
            .await
            .unwrap_err();
        assert!(err.message.contains("needs recurrence_counter"));

        // start required when start_any_period
        let err = h
            .service
            .fetch_invoice(
                &mut rng,
                FetchInvoiceRequest {
                    recurrence_counter: Some(0),
                    recurrence_label: Some("rent".to_owned()),
                    ..fetch_request(&recurring)
                },
            )
            .await
            .unwrap_err();
        assert!(err.message.contains("needs recurrence_start"));

        // label required
        let err = h
            .service
            .fetch_invoice(
                &mut rng,
                FetchInvoiceRequest {
                    recurrence_counter: Some(0),
                    recurrence_start: Some(0),
                    ..fetch_request(&recurring)
                },
            )
            .await
            .unwrap_err();
        assert!(err.message.contains("needs recurrence_label"));

        // counter/start forbidden without recurrence
        let err = h
            .service
            .fetch_invoice(
                &mut rng,
                FetchInvoiceRequest {
                    recurrence_counter: Some(0),
                    ..fetch_request(&dummy_offer(&h))
                },
            )
            .await
            .unwrap_err();
        assert!(err.message.contains("unnecessary recurrence_counter"));
    }

    #[tokio::test]
    async fn surfaces_route_errors() {
        // destination absent from the graph entirely
        let secp = Secp256k1::new();
        let h = harness();
        let stranger = Keypair::from_seckey_slice(&secp, &[0x77; 32]).unwrap();
        let offer = Offer {
            node_id: Some(stranger.x_only_public_key().0),
            ..dummy_offer(&h)
        };
        let mut rng = WeakRng::from_u64(1);
        let err = h
            .service
            .fetch_invoice(&mut rng, fetch_request(&offer))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Internal);
        assert!(err.message.contains("Unknown destination"));

        // reachable node whose channel is disabled: no admissible path
        let secp2 = Secp256k1::new();
        let node = Keypair::from_seckey_slice(&secp2, &[0x42; 32]).unwrap();
        let local_id =
            PublicKey::from_secret_key(&secp2, &local_secret());
        let mut features = Features::empty();
        features.set(ONION_MESSAGES_OPT);
        let gossmap = Gossmap::builder()
            .node(local_id, features.clone())
            .node(node.public_key(), features)
            .channel(
                ShortChannelId(42),
                local_id,
                node.public_key(),
                [true, false],
            )
            .build();
        let signer = Arc::new(MemorySigner::from_seed(&[0x51; 32]));
        let offers = Arc::new(OffersService::new(
            OffersConfig {
                network: Network::Bitcoin,
                base_payer_key: signer.base_key(),
                features: Features::empty(),
            },
            signer,
            Arc::new(MemoryOfferStore::new()),
            Arc::new(MemoryPaymentStore::new()),
        ));
        let service = FetchService::new(
            FetchConfig::new(local_id),
            offers,
            Arc::new(SwappableGossmap::new(gossmap)),
            Arc::new(MockOverlay::default()),
        );
        let offer = Offer {
            node_id: Some(node.x_only_public_key().0),
            ..dummy_offer(&h)
        };
        let err = service
            .fetch_invoice(&mut rng, fetch_request(&offer))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OfferRouteNotFound);
    }
}
