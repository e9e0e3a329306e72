//! Offer persistence: insert, lookup, disable, and iterate persisted offers
//! keyed by offer id.

use std::{
    collections::BTreeMap,
    fmt,
    str::FromStr,
    sync::Mutex,
};

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bolt12::OfferId;

/// The lifecycle state of a persisted offer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    SingleUse,
    MultipleUse,
    Used,
    Disabled,
}

impl OfferStatus {
    /// An active offer can still be responded to.
    pub fn is_active(self) -> bool {
        matches!(self, Self::SingleUse | Self::MultipleUse)
    }

    pub fn is_single(self) -> bool {
        matches!(self, Self::SingleUse | Self::Used)
    }

    pub fn is_used(self) -> bool {
        self == Self::Used
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SingleUse => "single_use",
            Self::MultipleUse => "multiple_use",
            Self::Used => "used",
            Self::Disabled => "disabled",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OfferStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_use" => Ok(Self::SingleUse),
            "multiple_use" => Ok(Self::MultipleUse),
            "used" => Ok(Self::Used),
            "disabled" => Ok(Self::Disabled),
            _ => Err(anyhow!("unknown offer status '{s}'")),
        }
    }
}

/// A persisted offer row.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StoredOffer {
    pub offer_id: OfferId,
    /// The signed `lno1…` encoding.
    pub bolt12: String,
    pub label: Option<String>,
    pub status: OfferStatus,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("offer already exists")]
    AlreadyExists,

    #[error("unknown offer")]
    Unknown,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// The offer persistence seam. Implementations must provide their own
/// transactional discipline: a duplicate insert is a data-level error, not
/// a race.
#[async_trait]
pub trait OfferStore: Send + Sync {
    /// Inserts a new offer. Fails with [`StoreError::AlreadyExists`] if an
    /// offer with the same id is already present.
    async fn create(&self, offer: StoredOffer) -> Result<(), StoreError>;

    async fn find(
        &self,
        offer_id: &OfferId,
    ) -> Result<Option<StoredOffer>, StoreError>;

    /// Marks an active offer disabled and returns the new status. The
    /// caller checks `prior_status` is active first.
    async fn disable(
        &self,
        offer_id: &OfferId,
        prior_status: OfferStatus,
    ) -> Result<OfferStatus, StoreError>;

    /// All persisted offer ids, in id order.
    async fn ids(&self) -> Result<Vec<OfferId>, StoreError>;
}

/// An in-memory [`OfferStore`].
#[derive(Default)]
pub struct MemoryOfferStore {
    offers: Mutex<BTreeMap<OfferId, StoredOffer>>,
}

impl MemoryOfferStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfferStore for MemoryOfferStore {
    async fn create(&self, offer: StoredOffer) -> Result<(), StoreError> {
        let mut offers = self.offers.lock().unwrap();
        if offers.contains_key(&offer.offer_id) {
            return Err(StoreError::AlreadyExists);
        }
        offers.insert(offer.offer_id, offer);
        Ok(())
    }

    async fn find(
        &self,
        offer_id: &OfferId,
    ) -> Result<Option<StoredOffer>, StoreError> {
        Ok(self.offers.lock().unwrap().get(offer_id).cloned())
    }

    async fn disable(
        &self,
        offer_id: &OfferId,
        prior_status: OfferStatus,
    ) -> Result<OfferStatus, StoreError> {
        debug_assert!(prior_status.is_active());
        let mut offers = self.offers.lock().unwrap();
        let offer =
            offers.get_mut(offer_id).ok_or(StoreError::Unknown)?;
        offer.status = OfferStatus::Disabled;
        Ok(offer.status)
    }

    async fn ids(&self) -> Result<Vec<OfferId>, StoreError> {
        Ok(self.offers.lock().unwrap().keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(id: u8, status: OfferStatus) -> StoredOffer {
        StoredOffer {
            offer_id: OfferId([id; 32]),
            bolt12: "lno1stub".to_owned(),
            label: None,
            status,
        }
    }

    #[tokio::test]
    async fn create_find_duplicate() {
        let store = MemoryOfferStore::new();
        let offer = stored(1, OfferStatus::MultipleUse);
        store.create(offer.clone()).await.unwrap();
        assert_eq!(
            store.find(&offer.offer_id).await.unwrap(),
            Some(offer.clone()),
        );
        assert!(matches!(
            store.create(offer.clone()).await,
            Err(StoreError::AlreadyExists),
        ));
        assert_eq!(store.find(&OfferId([9; 32])).await.unwrap(), None);
    }

    #[tokio::test]
    async fn disable_and_iterate() {
        let store = MemoryOfferStore::new();
        store.create(stored(2, OfferStatus::SingleUse)).await.unwrap();
        store.create(stored(1, OfferStatus::MultipleUse)).await.unwrap();

        let ids = store.ids().await.unwrap();
        assert_eq!(ids, vec![OfferId([1; 32]), OfferId([2; 32])]);

        let new_status = store
            .disable(&OfferId([2; 32]), OfferStatus::SingleUse)
            .await
            .unwrap();
        assert_eq!(new_status, OfferStatus::Disabled);
        assert!(!new_status.is_active());
    }

    #[test]
    fn status_predicates() {
        assert!(OfferStatus::SingleUse.is_active());
        assert!(OfferStatus::MultipleUse.is_active());
        assert!(!OfferStatus::Used.is_active());
        assert!(!OfferStatus::Disabled.is_active());
        assert!(OfferStatus::SingleUse.is_single());
        assert!(OfferStatus::Used.is_single());
        assert!(!OfferStatus::MultipleUse.is_single());
    }

    #[test]
    fn status_fromstr_display_roundtrip() {
        for status in [
            OfferStatus::SingleUse,
            OfferStatus::MultipleUse,
            OfferStatus::Used,
            OfferStatus::Disabled,
        ] {
            let s = status.to_string();
            assert_eq!(OfferStatus::from_str(&s).unwrap(), status);
        }
    }
}
