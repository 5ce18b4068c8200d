use base64::{engine, Engine};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

/// Our call record id, in the base64 form the telephony provider echoes back on every webhook.
pub fn encode_client_state(record_id: Uuid) -> String {
    engine::general_purpose::STANDARD.encode(record_id.to_string())
}

pub fn decode_client_state(client_state: &str) -> Option<Uuid> {
    let bytes = engine::general_purpose::STANDARD
        .decode(client_state.trim())
        .ok()?;
    let text = String::from_utf8(bytes).ok()?;
    Uuid::parse_str(&text).ok()
}

/// E.164 form of an international number: "+1 (512) 555-0100" becomes "+15125550100".
///
/// National numbers ("(512) 555-0100") carry no country code and yield `None`.
pub fn to_e164(phone: &str) -> Option<String> {
    let phone = phone.trim();
    let rest = phone.strip_prefix('+')?;
    if rest
        .chars()
        .any(|c| !(c.is_ascii_digit() || " -.()".contains(c)))
    {
        return None;
    }
    let digits: String = rest.chars().filter(char::is_ascii_digit).collect();
    if !(8..=15).contains(&digits.len()) || digits.starts_with('0') {
        return None;
    }
    Some(format!("+{digits}"))
}

/// One async mutex per key, created on demand.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

const PRUNE_THRESHOLD: usize = 1_024;

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = match self.inner.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            if locks.len() > PRUNE_THRESHOLD {
                // only the map holds these, so nobody is waiting on them
                locks.retain(|_, m| Arc::strong_count(m) > 1);
            }
            locks.entry(key.to_string()).or_default().clone()
        };
        mutex.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn client_state_survives_the_round_trip() {
        let id = Uuid::new_v4();
        assert_eq!(decode_client_state(&encode_client_state(id)), Some(id));
        assert_eq!(decode_client_state("not base64!"), None);
    }

    #[test]
    fn international_numbers_become_e164() {
        assert_eq!(to_e164("+1 512-555-0100").as_deref(), Some("+15125550100"));
        assert_eq!(to_e164(" +44 20 7946 0958").as_deref(), Some("+442079460958"));
        assert_eq!(to_e164("+15125550100").as_deref(), Some("+15125550100"));
    }

    #[test]
    fn national_and_garbled_numbers_have_no_e164_form() {
        assert_eq!(to_e164("(512) 555-0100"), None);
        assert_eq!(to_e164("15125550100"), None);
        assert_eq!(to_e164("+1 512 CALL NOW"), None);
        assert_eq!(to_e164("+12"), None);
        assert_eq!(to_e164(""), None);
    }

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = KeyedLocks::new();
        let guard = locks.lock("batch-1").await;
        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.lock("batch-1").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        let _unrelated = locks.lock("batch-2").await;
        drop(guard);
        waiter.await.unwrap();
    }
}
