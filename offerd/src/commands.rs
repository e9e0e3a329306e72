//! The offer commands: creating and signing offers, listing and disabling
//! them, and completing invoice requests with a payer identity.

use std::sync::Arc;

use bitcoin::Network;
use offerd_common::rng::{Crng, RngExt};
use secp256k1::{All, Secp256k1, XOnlyPublicKey};

use crate::{
    api::{
        CreateInvoiceRequestRequest, CreateInvoiceRequestResponse,
        CreateOfferRequest, ListOffersRequest, OfferRecord,
    },
    bolt12::{ChainParams, Invoice, InvoiceRequest, Offer},
    error::{ErrorCode, OffersError},
    features::Features,
    offer_store::{OfferStatus, OfferStore, StoreError, StoredOffer},
    payer_key,
    payments::{PaymentStatus, PaymentStore},
    signer::Bolt12Signer,
};

/// Static node-level configuration for the offer commands.
#[derive(Clone, Debug)]
pub struct OffersConfig {
    pub network: Network,
    /// The x-only base key all payer keys are tweaks of.
    pub base_payer_key: XOnlyPublicKey,
    /// Our feature bitmap (the BOLT11 feature view), copied into invoice
    /// requests and used for unknown-even-bit checks.
    pub features: Features,
}

pub struct OffersService {
    secp: Secp256k1<All>,
    config: OffersConfig,
    chain: ChainParams,
    signer: Arc<dyn Bolt12Signer>,
    offer_store: Arc<dyn OfferStore>,
    payment_store: Arc<dyn PaymentStore>,
}

impl OffersService {
    pub fn new(
        config: OffersConfig,
        signer: Arc<dyn Bolt12Signer>,
        offer_store: Arc<dyn OfferStore>,
        payment_store: Arc<dyn PaymentStore>,
    ) -> Self {
        let chain = ChainParams::from_network(config.network);
        Self {
            secp: Secp256k1::new(),
            config,
            chain,
            signer,
            offer_store,
            payment_store,
        }
    }

    pub(crate) fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }

    pub(crate) fn chain(&self) -> &ChainParams {
        &self.chain
    }

    pub(crate) fn features(&self) -> &Features {
        &self.config.features
    }

    /// Signs an unsigned offer and persists it under its merkle root.
    pub async fn create_offer(
        &self,
        request: CreateOfferRequest,
    ) -> Result<OfferRecord, OffersError> {
        let mut offer = Offer::parse_unsigned(
            &request.bolt12,
            &self.config.features,
            &self.chain,
        )
        .map_err(|err| {
            OffersError::invalid_params(format!("Unparsable offer: {err}"))
        })?;
        if offer.signature.is_some() {
            return Err(OffersError::invalid_params(
                "must be unsigned offer",
            ));
        }

        let merkle = offer.merkle();
        offer.signature = Some(
            self.signer
                .sign_bolt12("offer", "signature", &merkle, None)
                .await,
        );

        let status = if request.single_use {
            OfferStatus::SingleUse
        } else {
            OfferStatus::MultipleUse
        };
        let stored = StoredOffer {
            offer_id: offer.id(),
            bolt12: offer.to_bech32(),
            label: request.label,
            status,
        };
        match self.offer_store.create(stored.clone()).await {
            Ok(()) => Ok(OfferRecord::from(stored)),
            Err(StoreError::AlreadyExists) => Err(OffersError::new(
                ErrorCode::OfferAlreadyExists,
                "Duplicate offer",
            )),
            Err(err) => Err(OffersError::internal(format!(
                "offer store: {err}"
            ))),
        }
    }

    /// Lists one offer by id, or all of them. `active_only` drops offers
    /// which can no longer be responded to.
    pub async fn list_offers(
        &self,
        request: ListOffersRequest,
    ) -> Result<Vec<OfferRecord>, OffersError> {
        let mut records = Vec::new();

        let ids = match request.offer_id {
            Some(offer_id) => vec![offer_id],
            None => self
                .offer_store
                .ids()
                .await
                .map_err(|err| {
                    OffersError::internal(format!("offer store: {err}"))
                })?,
        };
        for offer_id in ids {
            let found =
                self.offer_store.find(&offer_id).await.map_err(|err| {
                    OffersError::internal(format!("offer store: {err}"))
                })?;
            if let Some(stored) = found {
                if !request.active_only || stored.status.is_active() {
                    records.push(OfferRecord::from(stored));
                }
            }
        }
        Ok(records)
    }

    /// Disables an active offer.
    pub async fn disable_offer(
        &self,
        offer_id: crate::bolt12::OfferId,
    ) -> Result<OfferRecord, OffersError> {
        let stored = self
            .offer_store
            .find(&offer_id)
            .await
            .map_err(|err| {
                OffersError::internal(format!("offer store: {err}"))
            })?
            .ok_or_else(|| OffersError::internal("Unknown offer"))?;

        if !stored.status.is_active() {
            return Err(OffersError::new(
                ErrorCode::OfferAlreadyDisabled,
                "offer is not active",
            ));
        }

        let new_status = self
            .offer_store
            .disable(&offer_id, stored.status)
            .await
            .map_err(|err| {
                OffersError::internal(format!("offer store: {err}"))
            })?;
        Ok(OfferRecord::from(StoredOffer {
            status: new_status,
            ..stored
        }))
    }

    /// Fills in `payer_info` and `payer_key` (and the recurrence signature,
    /// for recurring requests) of a caller-built invoice request.
    pub async fn create_invoice_request(
        &self,
        rng: &mut impl Crng,
        request: CreateInvoiceRequestRequest,
    ) -> Result<CreateInvoiceRequestResponse, OffersError> {
        let mut invreq = InvoiceRequest::parse(
            &request.bolt12,
            &self.config.features,
            &self.chain,
        )
        .map_err(|err| {
            OffersError::invalid_params(format!(
                "Unparsable invoice_request: {err}"
            ))
        })?;
        if invreq.payer_info.is_some() {
            return Err(OffersError::invalid_params(
                "must not have payer_info",
            ));
        }
        if invreq.payer_key.is_some() {
            return Err(OffersError::invalid_params(
                "must not have payer_key",
            ));
        }

        self.complete_invoice_request(
            rng,
            &mut invreq,
            request.recurrence_label.as_deref(),
        )
        .await?;

        Ok(CreateInvoiceRequestResponse {
            bolt12: invreq.to_bech32(),
            recurrence_label: request.recurrence_label,
        })
    }

    /// The payer-identity half of building an invoice request, shared with
    /// the fetch path: recurring-payment history checks, `payer_info`
    /// generation (or carry-over), key derivation, recurrence signature.
    pub(crate) async fn complete_invoice_request(
        &self,
        rng: &mut impl Crng,
        invreq: &mut InvoiceRequest,
        recurrence_label: Option<&str>,
    ) -> Result<(), OffersError> {
        if let Some(counter) = invreq.recurrence_counter {
            let label = recurrence_label.ok_or_else(|| {
                OffersError::invalid_params(
                    "Need payment label for recurring payments",
                )
            })?;
            if counter != 0 {
                self.prev_payment(label, counter, invreq).await?;
            }
        }

        let payer_info = match &invreq.payer_info {
            Some(payer_info) => payer_info.clone(),
            None => {
                // A fresh random tweak gives this request an identity
                // unlinkable to any other offer's.
                let payer_info = rng.gen_bytes::<16>().to_vec();
                invreq.payer_info = Some(payer_info.clone());
                payer_info
            }
        };

        invreq.payer_key = Some(
            payer_key::derive_payer_key(
                &self.secp,
                self.config.base_payer_key,
                &payer_info,
            )
            .map_err(|_| OffersError::invalid_params("Invalid tweak"))?,
        );

        if invreq.recurrence_counter.is_some() {
            let merkle = invreq.merkle();
            invreq.recurrence_signature = Some(
                self.signer
                    .sign_bolt12(
                        "invoice_request",
                        "recurrence_signature",
                        &merkle,
                        Some(&payer_info),
                    )
                    .await,
            );
        }

        Ok(())
    }

    /// Scans payment history for the series named by `label`: requires a
    /// completed payment for the previous counter, and carries that
    /// invoice's `payer_info` into `invreq`. Also enforces
    /// `recurrence_start` consistency across the series.
    async fn prev_payment(
        &self,
        label: &str,
        counter: u32,
        invreq: &mut InvoiceRequest,
    ) -> Result<(), OffersError> {
        debug_assert!(invreq.payer_info.is_none());
        let payments =
            self.payment_store.list_payments().await.map_err(|err| {
                OffersError::internal(format!("payment store: {err}"))
            })?;

        let mut prev_paid = false;
        for payment in &payments {
            if payment.label.as_deref() != Some(label) {
                continue;
            }
            let bolt12 = match &payment.bolt12 {
                Some(bolt12) => bolt12,
                None => continue,
            };
            let inv = match Invoice::parse(
                bolt12,
                &self.config.features,
                &self.chain,
            ) {
                Ok(inv) => inv,
                Err(_) => continue,
            };

            // Labels can be reused across different offers.
            if inv.offer_id != invreq.offer_id || inv.offer_id.is_none() {
                continue;
            }

            // In case someone inserted their own clashing label.
            let inv_counter = match inv.recurrence_counter {
                Some(inv_counter) => inv_counter,
                None => continue,
            };

            match (invreq.recurrence_start, inv.recurrence_start) {
                (Some(_), None) => {
                    return Err(OffersError::invalid_params(
                        "unexpected recurrence_start",
                    ));
                }
                (Some(start), Some(prev)) if start != prev => {
                    return Err(OffersError::invalid_params(format!(
                        "recurrence_start was previously {prev}",
                    )));
                }
                (None, Some(_)) => {
                    return Err(OffersError::invalid_params(
                        "missing recurrence_start",
                    ));
                }
                _ => {}
            }

            if u64::from(inv_counter) + 1 == u64::from(counter)
                && payment.status == PaymentStatus::Complete
            {
                prev_paid = true;
            }

            if let Some(payer_info) = &inv.payer_info {
                invreq.payer_info = Some(payer_info.clone());
            }
        }

        if invreq.payer_info.is_none() {
            return Err(OffersError::invalid_params(
                "No previous payment attempted for this label and offer",
            ));
        }
        if !prev_paid {
            return Err(OffersError::invalid_params(
                "previous invoice has not been paid",
            ));
        }
        Ok(())
    }
}
