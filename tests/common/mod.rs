#![allow(dead_code)]

use async_trait::async_trait;
use reservation_dialer::call_state::CallDriver;
use reservation_dialer::classifier::{Classification, Classifier};
use reservation_dialer::config::CallPolicy;
use reservation_dialer::coordinator::BatchCoordinator;
use reservation_dialer::dnc::DoNotCallRegistry;
use reservation_dialer::error::{CollaboratorError, StoreError};
use reservation_dialer::places::PlaceSearch;
use reservation_dialer::scheduler::ManualScheduler;
use reservation_dialer::store::{self, DocumentStore, MemoryStore, CALLS};
use reservation_dialer::tasks::process_call_webhook;
use reservation_dialer::telephony::{CallControl, RecordingParams};
use reservation_dialer::telephony_types::TelephonyWebhook;
use reservation_dialer::transcription::Transcriber;
use reservation_dialer::types::{CallRecord, Candidate, SearchQuery};
use reservation_dialer::utils::{encode_client_state, KeyedLocks};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const CALLBACK: &str = "+15125550199";

/// One call-control request as the fake provider saw it.
#[derive(Clone, PartialEq, Debug)]
pub enum Sent {
    Dial { to: String },
    Answer(String),
    MachineDetection(String),
    Speak(String, String),
    StartRecording(String, RecordingParams),
    StopRecording(String),
    Digits(String, String),
    Hangup(String),
}

#[derive(Default)]
pub struct FakeTelephony {
    sent: Mutex<Vec<Sent>>,
    failing_numbers: Mutex<HashSet<String>>,
    /// Dialed number to the call control id handed out for it.
    dialed: Mutex<HashMap<String, String>>,
}

impl FakeTelephony {
    pub fn fail_dials_to(&self, number: &str) {
        self.failing_numbers.lock().unwrap().insert(number.to_string());
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, call_control_id: &str) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| match s {
                Sent::Dial { .. } => false,
                Sent::Answer(id)
                | Sent::MachineDetection(id)
                | Sent::Speak(id, _)
                | Sent::StartRecording(id, _)
                | Sent::StopRecording(id)
                | Sent::Digits(id, _)
                | Sent::Hangup(id) => id == call_control_id,
            })
            .collect()
    }

    pub fn dial_count(&self) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Dial { .. }))
            .count()
    }

    pub fn call_control_id(&self, number: &str) -> Option<String> {
        self.dialed.lock().unwrap().get(number).cloned()
    }

    fn push(&self, sent: Sent) -> Result<(), CollaboratorError> {
        self.sent.lock().unwrap().push(sent);
        Ok(())
    }
}

#[async_trait]
impl CallControl for FakeTelephony {
    async fn dial(&self, to: &str, _client_state: &str) -> Result<String, CollaboratorError> {
        self.push(Sent::Dial { to: to.to_string() })?;
        if self.failing_numbers.lock().unwrap().contains(to) {
            return Err(CollaboratorError::malformed("telephony", "dial rejected"));
        }
        let id = format!("v3:{}", Uuid::new_v4());
        self.dialed
            .lock()
            .unwrap()
            .insert(to.to_string(), id.clone());
        Ok(id)
    }

    async fn answer(&self, id: &str) -> Result<(), CollaboratorError> {
        self.push(Sent::Answer(id.to_string()))
    }

    async fn start_machine_detection(&self, id: &str) -> Result<(), CollaboratorError> {
        self.push(Sent::MachineDetection(id.to_string()))
    }

    async fn speak(&self, id: &str, text: &str) -> Result<(), CollaboratorError> {
        self.push(Sent::Speak(id.to_string(), text.to_string()))
    }

    async fn start_recording(
        &self,
        id: &str,
        params: RecordingParams,
    ) -> Result<(), CollaboratorError> {
        self.push(Sent::StartRecording(id.to_string(), params))
    }

    async fn stop_recording(&self, id: &str) -> Result<(), CollaboratorError> {
        self.push(Sent::StopRecording(id.to_string()))
    }

    async fn send_digits(&self, id: &str, digits: &str) -> Result<(), CollaboratorError> {
        self.push(Sent::Digits(id.to_string(), digits.to_string()))
    }

    async fn hangup(&self, id: &str) -> Result<(), CollaboratorError> {
        self.push(Sent::Hangup(id.to_string()))
    }
}

/// Transcripts keyed by recording url. Unknown urls fail.
#[derive(Default)]
pub struct ScriptedTranscriber {
    transcripts: Mutex<HashMap<String, String>>,
}

impl ScriptedTranscriber {
    pub fn script(&self, url: &str, transcript: &str) {
        self.transcripts
            .lock()
            .unwrap()
            .insert(url.to_string(), transcript.to_string());
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, recording_url: &str) -> Result<String, CollaboratorError> {
        self.transcripts
            .lock()
            .unwrap()
            .get(recording_url)
            .cloned()
            .ok_or_else(|| CollaboratorError::malformed("transcription", "no such recording"))
    }
}

/// Classifies by keyword so scenarios read naturally.
pub struct KeywordClassifier;

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn menu_digit(&self, menu_transcript: &str) -> Result<u8, CollaboratorError> {
        Ok(if menu_transcript.contains("press 2 for reservations") {
            2
        } else {
            0
        })
    }

    async fn classify(
        &self,
        transcript: &str,
        _query: &SearchQuery,
    ) -> Result<Classification, CollaboratorError> {
        let outcome = if transcript.contains("stop calling") {
            "opt_out"
        } else if transcript.contains("we have a table") {
            "available"
        } else {
            "something_else"
        };
        Ok(Classification {
            outcome: Some(outcome.to_string()),
            summary: Some(format!("They said: {transcript}")),
            credit_card_required: Some(true),
        })
    }
}

/// Memory store whose next `n` writes of a closed call fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing_closes: AtomicUsize,
}

impl FlakyStore {
    pub fn fail_next_closes(&self, n: usize) {
        self.failing_closes.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        let closing = collection == CALLS && doc["phase"] == "closed";
        if closing
            && self
                .failing_closes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(StoreError::Serde(<serde_json::Error as serde::de::Error>::custom(
                "write refused",
            )));
        }
        self.inner.put(collection, id, doc).await
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        self.inner.query(collection, field, value).await
    }
}

pub struct FixedPlaces {
    pub candidates: Vec<Candidate>,
}

#[async_trait]
impl PlaceSearch for FixedPlaces {
    async fn search(&self, _query: &SearchQuery) -> Result<Vec<Candidate>, CollaboratorError> {
        Ok(self.candidates.clone())
    }
}

pub fn restaurant(place_id: &str, name: &str, phone: &str, rating: f32) -> Candidate {
    Candidate {
        place_id: place_id.to_string(),
        name: name.to_string(),
        phone: Some(phone.to_string()),
        rating: Some(rating),
        review_count: 200,
        types: vec!["restaurant".to_string(), "food".to_string()],
        business_status: Some("OPERATIONAL".to_string()),
        ..Default::default()
    }
}

pub fn query() -> SearchQuery {
    serde_json::from_value(json!({
        "location": "Austin, TX",
        "party_size": 4,
        "date": "2026-10-19",
        "intent": "next_available",
        "cuisines": ["italian"]
    }))
    .unwrap()
}

pub struct Harness {
    pub store: Arc<dyn DocumentStore>,
    pub telephony: Arc<FakeTelephony>,
    pub transcriber: Arc<ScriptedTranscriber>,
    pub scheduler: Arc<ManualScheduler>,
    pub dnc: DoNotCallRegistry,
    pub coordinator: Arc<BatchCoordinator>,
    pub driver: Arc<CallDriver>,
}

impl Harness {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), candidates)
    }

    /// Share a store between harnesses to see state carried across searches.
    pub fn with_store(store: Arc<dyn DocumentStore>, candidates: Vec<Candidate>) -> Self {
        let policy = CallPolicy {
            callback_number: Some(CALLBACK.to_string()),
            ..CallPolicy::default()
        };
        let telephony = Arc::new(FakeTelephony::default());
        let transcriber = Arc::new(ScriptedTranscriber::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let shared = store.clone();
        let dnc = DoNotCallRegistry::new(shared.clone());
        let locks = KeyedLocks::new();
        let coordinator = Arc::new(BatchCoordinator::new(
            shared.clone(),
            Arc::new(FixedPlaces { candidates }),
            telephony.clone(),
            dnc.clone(),
            policy.clone(),
            locks.clone(),
        ));
        let driver = Arc::new(CallDriver::new(
            shared,
            telephony.clone(),
            transcriber.clone(),
            Arc::new(KeywordClassifier),
            dnc.clone(),
            scheduler.clone(),
            policy,
            locks,
        ));
        Self {
            store,
            telephony,
            transcriber,
            scheduler,
            dnc,
            coordinator,
            driver,
        }
    }

    pub async fn calls(&self, batch_id: Uuid) -> Vec<CallRecord> {
        store::find(self.store.as_ref(), CALLS, "batch_id", batch_id)
            .await
            .unwrap()
    }

    pub async fn call_to(&self, batch_id: Uuid, phone: &str) -> CallRecord {
        self.calls(batch_id)
            .await
            .into_iter()
            .find(|c| c.restaurant.phone == phone)
            .unwrap()
    }

    /// Deliver a webhook the way the HTTP handler would, minus the spawn.
    pub async fn webhook(&self, record: &CallRecord, event_type: &str, extra: serde_json::Value) {
        let mut payload = json!({
            "call_control_id": record.call_control_id.clone().unwrap(),
            "client_state": encode_client_state(record.id),
        });
        if let (Some(payload), Some(extra)) = (payload.as_object_mut(), extra.as_object()) {
            payload.extend(extra.clone());
        }
        let webhook: TelephonyWebhook = serde_json::from_value(json!({
            "data": {
                "event_type": event_type,
                "id": Uuid::new_v4().to_string(),
                "payload": payload
            }
        }))
        .unwrap();
        process_call_webhook(self.driver.clone(), webhook).await;
    }

    pub async fn pick_up(&self, record: &CallRecord, detection: &str) {
        self.webhook(record, "call.initiated", json!({})).await;
        self.webhook(record, "call.answered", json!({})).await;
        self.webhook(
            record,
            "call.machine.detection.ended",
            json!({ "result": detection }),
        )
        .await;
    }

    pub async fn recording(&self, record: &CallRecord, url: &str) {
        self.webhook(
            record,
            "call.recording.saved",
            json!({ "recording_urls": { "mp3": url } }),
        )
        .await;
    }
}
