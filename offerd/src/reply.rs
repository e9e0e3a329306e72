//! Validation of overlay replies against the originating offer and invoice
//! request, and the advisory report of what the recipient changed.

use secp256k1::{All, Secp256k1};
use tracing::{debug, warn};

use crate::{
    api::{
        FetchInvoiceResponse, InvoiceChanges, InvoiceErrorDetails,
        NextPeriod,
    },
    bolt12::{
        ChainParams, Invoice, InvoiceError, InvoiceRequest, Offer,
    },
    error::{ErrorCode, OffersError},
    features::Features,
};

/// Builds the `OFFER_BAD_INVREQ_REPLY` error for an `invoice_error` reply,
/// with structured details when it decodes and the raw hex when it doesn't.
pub(crate) fn invoice_error_reply(bytes: &[u8]) -> OffersError {
    let details = match InvoiceError::decode(bytes) {
        Ok(err) => InvoiceErrorDetails {
            erroneous_field: err.erroneous_field,
            suggested_value: err.suggested_value,
            // absent error text is reported as empty, not omitted
            error: Some(err.error.unwrap_or_default()),
            invoice_error_hex: None,
        },
        Err(err) => {
            debug!("Invalid invoice_error {}: {err}", offerd_common::hex::display(bytes));
            InvoiceErrorDetails {
                invoice_error_hex: Some(bytes.to_vec()),
                ..InvoiceErrorDetails::default()
            }
        }
    };
    OffersError::new(
        ErrorCode::OfferBadInvreqReply,
        "Remote node sent failure message",
    )
    .with_details(serde_json::to_value(&details).unwrap_or_default())
}

/// Validates an `invoice` reply: decode, field-equivalence against the
/// original request, signature, expected amount. On success returns the
/// caller-facing response with the changes report and next period.
pub(crate) fn validate_reply(
    secp: &Secp256k1<All>,
    offer: &Offer,
    invreq: &InvoiceRequest,
    invoice_bytes: &[u8],
    our_features: &Features,
    chain: &ChainParams,
) -> Result<FetchInvoiceResponse, OffersError> {
    let invoice =
        match Invoice::decode(invoice_bytes, our_features, chain) {
            Ok(invoice) => invoice,
            Err(err) => {
                debug!("Failed to decode invoice reply: {err}");
                return Err(badinv("invoice", invoice_bytes));
            }
        };

    // The invoice must come from the offer's node...
    if invoice.node_id != offer.node_id {
        return Err(badinv("node_id", invoice_bytes));
    }

    // ...and must carry a valid signature under that node over its own
    // merkle root.
    if invoice.check_signature(secp).is_err() {
        return Err(badinv("signature", invoice_bytes));
    }

    if invoice.amount.is_none() {
        return Err(badinv("amount", invoice_bytes));
    }

    // The fields the recipient must carry over from our request, exactly:
    // either both absent, or both present and equal.
    if invoice.offer_id != invreq.offer_id {
        return Err(badinv("offer_id", invoice_bytes));
    }
    if invoice.quantity != invreq.quantity {
        return Err(badinv("quantity", invoice_bytes));
    }
    if invoice.recurrence_counter != invreq.recurrence_counter {
        return Err(badinv("recurrence_counter", invoice_bytes));
    }
    if invoice.recurrence_start != invreq.recurrence_start {
        return Err(badinv("recurrence_start", invoice_bytes));
    }
    if invoice.payer_key != invreq.payer_key {
        return Err(badinv("payer_key", invoice_bytes));
    }
    if invoice.payer_info != invreq.payer_info {
        return Err(badinv("payer_info", invoice_bytes));
    }

    // The amount we committed to pay, when it is trivially computable.
    let expected_amount = match (offer.amount, &offer.currency) {
        (Some(amount), None) => match invreq.quantity {
            Some(quantity) => Some(
                amount
                    .checked_mul(quantity)
                    .ok_or_else(|| {
                        badinv("quantity overflow", invoice_bytes)
                    })?,
            ),
            None => Some(amount),
        },
        _ => None,
    };

    // Recurring replies must anchor the schedule.
    if invreq.recurrence_counter.is_some()
        && invoice.recurrence_basetime.is_none()
    {
        return Err(badinv("recurrence_basetime", invoice_bytes));
    }

    let changes = changes_report(offer, &invoice, expected_amount);
    let next_period = next_period_report(offer, invreq, &invoice);

    Ok(FetchInvoiceResponse {
        invoice: invoice.to_bech32(),
        changes,
        next_period,
    })
}

fn badinv(badfield: &str, invoice_bytes: &[u8]) -> OffersError {
    debug!("Failed invoice due to {badfield}");
    OffersError::new(
        ErrorCode::OfferBadInvreqReply,
        format!(
            "Incorrect {badfield} field in {}",
            offerd_common::hex::display(invoice_bytes),
        ),
    )
}

/// Returns true if `b` is `a` with something appended.
fn description_is_appended(a: &str, b: &str) -> bool {
    b.len() >= a.len() && b.as_bytes()[..a.len()] == *a.as_bytes()
}

/// What changed relative to the offer. The caller decides whether the
/// changes need user confirmation before paying.
fn changes_report(
    offer: &Offer,
    invoice: &Invoice,
    expected_amount: Option<u64>,
) -> InvoiceChanges {
    let mut changes = InvoiceChanges::default();

    if invoice.description != offer.description {
        match (&offer.description, &invoice.description) {
            (Some(old), Some(new)) if description_is_appended(old, new) => {
                changes.description_appended =
                    Some(new[old.len()..].to_owned());
            }
            (Some(old), None) => {
                changes.description_removed = Some(old.clone());
            }
            (_, new) => {
                changes.description.clone_from(new);
            }
        }
    }

    if invoice.vendor != offer.vendor {
        match (&offer.vendor, &invoice.vendor) {
            (Some(old), None) => {
                changes.vendor_removed = Some(old.clone());
            }
            (_, new) => {
                changes.vendor.clone_from(new);
            }
        }
    }

    // Tell the caller the amount unless it is trivially exactly what we
    // expected.
    if expected_amount.is_none() || invoice.amount != expected_amount {
        changes.msat = invoice.amount;
    }

    changes
}

/// The next period of a recurring offer, unless past the recurrence limit.
fn next_period_report(
    offer: &Offer,
    invreq: &InvoiceRequest,
    invoice: &Invoice,
) -> Option<NextPeriod> {
    let recurrence = offer.recurrence.as_ref()?;
    let counter = invreq.recurrence_counter?;
    let basetime = invoice.recurrence_basetime?;

    let next_counter = u64::from(counter) + 1;
    let next_period_idx = match invreq.recurrence_start {
        Some(start) => u64::from(start) + next_counter,
        None => next_counter,
    };

    // If this was the last period, don't tell them about a next one.
    if let Some(limit) = offer.recurrence_limit {
        if next_period_idx > u64::from(limit) {
            return None;
        }
    }

    let report = (|| {
        let starttime = recurrence.period_start(basetime, next_period_idx)?;
        let endtime = recurrence
            .period_start(basetime, next_period_idx + 1)?
            .checked_sub(1)?;
        let (paywindow_start, paywindow_end) = recurrence.paywindow(
            offer.recurrence_paywindow.as_ref(),
            basetime,
            next_period_idx,
        )?;
        Some(NextPeriod {
            counter: next_counter,
            starttime,
            endtime,
            paywindow_start,
            paywindow_end,
        })
    })();
    if report.is_none() {
        warn!(
            "next period {next_period_idx} of recurrence overflows; \
             omitting next_period",
        );
    }
    report
}
