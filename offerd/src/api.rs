//! Typed parameters and results for the offers control surface. The
//! transport layer (JSON-RPC or otherwise) lives outside this crate; these
//! are the shapes it marshals.

use serde::{Deserialize, Serialize};

use crate::{bolt12::OfferId, offer_store::StoredOffer};

/// A persisted offer, as reported to callers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OfferRecord {
    pub offer_id: OfferId,
    pub active: bool,
    pub single_use: bool,
    /// The signed `lno1…` encoding.
    pub bolt12: String,
    pub used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl From<StoredOffer> for OfferRecord {
    fn from(offer: StoredOffer) -> Self {
        Self {
            offer_id: offer.offer_id,
            active: offer.status.is_active(),
            single_use: offer.status.is_single(),
            bolt12: offer.bolt12,
            used: offer.status.is_used(),
            label: offer.label,
        }
    }
}

/// `create_offer`: sign and persist an unsigned offer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateOfferRequest {
    /// An unsigned `lno1…` offer.
    pub bolt12: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub single_use: bool,
}

/// `list_offers`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListOffersRequest {
    #[serde(default)]
    pub offer_id: Option<OfferId>,
    #[serde(default)]
    pub active_only: bool,
}

/// `create_invoice_request`: populate payer identity in (and sign, if
/// recurring) an invoice request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateInvoiceRequestRequest {
    /// An `lnr1…` invoice request without payer_info or payer_key.
    pub bolt12: String,
    #[serde(default)]
    pub recurrence_label: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CreateInvoiceRequestResponse {
    /// The completed `lnr1…` encoding.
    pub bolt12: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence_label: Option<String>,
}

/// `fetch_invoice`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchInvoiceRequest {
    /// The `lno1…` offer to fetch an invoice for.
    pub offer: String,
    /// Required iff the offer does not state an amount.
    #[serde(default)]
    pub amount_msat: Option<u64>,
    /// Required iff the offer states quantity bounds.
    #[serde(default)]
    pub quantity: Option<u64>,
    /// Required iff the offer has a recurrence.
    #[serde(default)]
    pub recurrence_counter: Option<u32>,
    /// Required iff the offer's recurrence base allows starting at any
    /// period.
    #[serde(default)]
    pub recurrence_start: Option<u32>,
    /// Names the payment series; required for recurring fetches.
    #[serde(default)]
    pub recurrence_label: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FetchInvoiceResponse {
    /// The validated `lni1…` invoice.
    pub invoice: String,
    pub changes: InvoiceChanges,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_period: Option<NextPeriod>,
}

/// What the recipient changed relative to the offer. Advisory: the caller
/// decides whether to confirm with the user before paying.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct InvoiceChanges {
    /// The description, with the offer's description as a prefix; only the
    /// appended suffix is reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_appended: Option<String>,
    /// A wholesale replacement description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The offer's description, which the invoice dropped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_removed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_removed: Option<String>,
    /// The invoice amount, whenever it isn't trivially the expected one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msat: Option<u64>,
}

impl InvoiceChanges {
    pub fn is_empty(&self) -> bool {
        self == &InvoiceChanges::default()
    }
}

/// The next period of a recurring offer, so the caller knows when (and
/// within which window) to fetch again.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NextPeriod {
    pub counter: u64,
    pub starttime: u64,
    pub endtime: u64,
    pub paywindow_start: u64,
    pub paywindow_end: u64,
}

/// Structured details attached to an `OFFER_BAD_INVREQ_REPLY` caused by an
/// `invoice_error` reply.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct InvoiceErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub erroneous_field: Option<u64>,
    #[serde(
        default,
        with = "offerd_common::hexstr_or_bytes_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub suggested_value: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set instead of the fields above when the invoice_error itself could
    /// not be decoded.
    #[serde(
        default,
        with = "offerd_common::hexstr_or_bytes_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub invoice_error_hex: Option<Vec<u8>>,
}
