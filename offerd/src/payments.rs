//! Payment history seam.
//!
//! Recurring invoice requests with a non-zero counter must prove the
//! previous period was paid, and must reuse the original `payer_info`
//! tweak. Both checks scan the node's payment history through this seam.

use std::{fmt, str::FromStr, sync::Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The status of a historical payment.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Complete,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for PaymentStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            _ => Err(anyhow!("unknown payment status '{s}'")),
        }
    }
}

/// A historical payment, as much of it as the recurring-payment checks
/// need: the caller-chosen label, the `lni1…` invoice it paid, its status.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub label: Option<String>,
    pub bolt12: Option<String>,
    pub status: PaymentStatus,
}

/// Read access to the node's payment history.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn list_payments(&self) -> anyhow::Result<Vec<PaymentRecord>>;
}

/// An in-memory [`PaymentStore`].
#[derive(Default)]
pub struct MemoryPaymentStore {
    payments: Mutex<Vec<PaymentRecord>>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, payment: PaymentRecord) {
        self.payments.lock().unwrap().push(payment);
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn list_payments(&self) -> anyhow::Result<Vec<PaymentRecord>> {
        Ok(self.payments.lock().unwrap().clone())
    }
}
