use crate::call_state::CallDriver;
use crate::coordinator::BatchCoordinator;
use crate::error::AppError;
use crate::opening_hours::OpeningHours;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Date, OffsetDateTime, Time};
use uuid::Uuid;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");
time::serde::format_description!(hh_mm, Time, "[hour]:[minute]");

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum SearchIntent {
    SpecificTime,
    NextAvailable,
}

/// What the diner asked for. Immutable once a batch has been created from it.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct SearchQuery {
    pub location: String,
    pub party_size: u32,
    #[serde(with = "iso_date")]
    pub date: Date,
    #[serde(default, with = "hh_mm::option")]
    pub time: Option<Time>,
    pub intent: SearchIntent,
    /// Free-text notes, e.g. "quiet table, good natural wine list".
    #[serde(default)]
    pub preferences: Option<String>,
    /// Cuisine chips picked in the search form.
    #[serde(default)]
    pub cuisines: Vec<String>,
    /// Offset of the search location from UTC, once resolved.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

impl SearchQuery {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.location.trim().is_empty() {
            return Err(AppError::Validation("location is required".to_string()));
        }
        if self.party_size == 0 {
            return Err(AppError::Validation(
                "party size must be at least 1".to_string(),
            ));
        }
        if self.intent == SearchIntent::SpecificTime && self.time.is_none() {
            return Err(AppError::Validation(
                "a time is required when searching for a specific time".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

/// A restaurant found by place search. Sourced once per search and reused across pages.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
pub struct Candidate {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub business_status: Option<String>,
    #[serde(default)]
    pub opening_hours: Option<OpeningHours>,
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    #[serde(default)]
    pub reviews: Vec<String>,
    #[serde(default)]
    pub reservable: Option<bool>,
    #[serde(default)]
    pub location: Option<LatLng>,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Calling,
    Completed,
}

/// All calls launched for one search, including later pages.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Batch {
    pub id: Uuid,
    pub query: SearchQuery,
    pub status: BatchStatus,
    /// Every eligible candidate, ranked. Append-only.
    pub candidates: Vec<Candidate>,
    /// Candidates examined by pagination so far.
    pub cursor: usize,
    pub called_count: usize,
    pub page_size: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Initiated,
    InProgress,
    Completed,
    Failed,
}

impl CallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallStatus::Completed | CallStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            CallStatus::Initiated => 0,
            CallStatus::InProgress => 1,
            CallStatus::Completed | CallStatus::Failed => 2,
        }
    }

    /// Statuses only ever move forward, and nothing leaves a terminal status.
    pub fn can_become(self, next: CallStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

/// Where a call is within its script, finer grained than [`CallStatus`].
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    Dialing,
    Ringing,
    Answered,
    /// Recording whatever greets us, in case it is a phone menu.
    ScreeningMenu,
    ReadingMenu,
    AwaitingAnswer,
    Classifying,
    Closed,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Available,
    AlternativeOffered,
    CreditCardRequired,
    LeftMessage,
    OptOut,
    NoReservationLine,
    MachineDetected,
    Other,
    Pending,
}

impl Outcome {
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase())).ok()
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct CallResult {
    pub outcome: Outcome,
    pub summary: String,
    pub credit_card_required: bool,
}

impl CallResult {
    pub fn new(outcome: Outcome, summary: impl Into<String>) -> Self {
        Self {
            outcome,
            summary: summary.into(),
            credit_card_required: outcome == Outcome::CreditCardRequired,
        }
    }

    pub fn pending() -> Self {
        Self::new(Outcome::Pending, "Waiting for the restaurant to respond.")
    }
}

/// The restaurant a call is placed to.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct RestaurantRef {
    pub place_id: String,
    pub name: String,
    pub phone: String,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct CallRecord {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub restaurant: RestaurantRef,
    /// Place in the batch's dialing order, counting across pages.
    #[serde(default)]
    pub position: usize,
    /// Provider id of the live call; unknown until the dial request returns.
    pub call_control_id: Option<String>,
    pub status: CallStatus,
    pub phase: CallPhase,
    pub transcript: Option<String>,
    pub result: CallResult,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl CallRecord {
    pub fn new(
        batch_id: Uuid,
        position: usize,
        restaurant: RestaurantRef,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            restaurant,
            position,
            call_control_id: None,
            status: CallStatus::Initiated,
            phase: CallPhase::Dialing,
            transcript: None,
            result: CallResult::pending(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct DoNotCallEntry {
    pub phone: String,
    pub restaurant_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SearchRequest {
    #[serde(flatten)]
    pub query: SearchQuery,
    #[serde(default)]
    pub max_calls: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub batch_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub batch_id: Uuid,
    /// The restaurants dialed for this page.
    pub restaurants: Vec<Candidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_url: Option<String>,
    pub query: SearchQuery,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StatusResponse {
    pub status: BatchStatus,
    pub items: Vec<CallRecord>,
}

pub struct AppState {
    pub coordinator: Arc<BatchCoordinator>,
    pub driver: Arc<CallDriver>,
}
