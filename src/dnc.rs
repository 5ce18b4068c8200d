use crate::error::StoreError;
use crate::store::{self, DocumentStore, DNC};
use crate::types::DoNotCallEntry;
use crate::utils::to_e164;

use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

/// Numbers that asked not to be called again, keyed by their E.164 form.
#[derive(Clone)]
pub struct DoNotCallRegistry {
    store: Arc<dyn DocumentStore>,
}

impl DoNotCallRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn contains(&self, phone: &str) -> Result<bool, StoreError> {
        let Some(key) = to_e164(phone) else {
            return Ok(false);
        };
        Ok(self.store.get(DNC, &key).await?.is_some())
    }

    pub async fn add(&self, phone: &str, restaurant_name: &str) -> Result<(), StoreError> {
        let Some(key) = to_e164(phone) else {
            warn!(
                phone=%phone,
                restaurant=%restaurant_name,
                "cannot record opt-out for a number without a country code"
            );
            return Ok(());
        };
        let entry = DoNotCallEntry {
            phone: phone.to_string(),
            restaurant_name: restaurant_name.to_string(),
            added_at: OffsetDateTime::now_utc(),
        };
        store::save(self.store.as_ref(), DNC, &key, &entry).await?;
        info!(phone=%key, restaurant=%restaurant_name, "added to do-not-call list");
        Ok(())
    }
}
