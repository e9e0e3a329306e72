//! The stable numeric error taxonomy shared by the offer commands, the fetch
//! orchestrator, and the reply validator.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable protocol-level error codes. The numeric values are part of the
/// control surface and must not change.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Generic internal failure.
    Internal,
    /// A parameter failed validation. Never retried internally.
    InvalidParams,
    /// We have no usable channels to route through.
    RouteNotFound,
    /// Duplicate offer insert.
    OfferAlreadyExists,
    /// Disabling an offer which is not active.
    OfferAlreadyDisabled,
    /// The offer's absolute expiry has passed.
    OfferExpired,
    /// No admissible onion-message path to the recipient.
    OfferRouteNotFound,
    /// The reply to our invoice request was invalid or an error.
    OfferBadInvreqReply,
    /// No reply arrived within the configured window.
    OfferTimeout,
}

impl ErrorCode {
    /// The wire-stable numeric code.
    pub const fn code(self) -> i32 {
        match self {
            Self::Internal => -1,
            Self::InvalidParams => -32602,
            Self::RouteNotFound => 205,
            Self::OfferAlreadyExists => 1000,
            Self::OfferAlreadyDisabled => 1001,
            Self::OfferExpired => 1002,
            Self::OfferRouteNotFound => 1003,
            Self::OfferBadInvreqReply => 1004,
            Self::OfferTimeout => 1005,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// An error surfaced to the originating caller, with its stable code and an
/// optional structured details object (e.g. a decoded `invoice_error`).
#[derive(Clone, Debug, Error, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct OffersError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl OffersError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<anyhow::Error> for OffersError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{err:#}"))
    }
}
