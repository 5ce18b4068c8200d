use crate::error::CollaboratorError;
use crate::openai_types::{OpenAICompletion, OpenAIPayload};
use crate::types::{CallResult, Outcome, SearchQuery};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};

const SERVICE: &str = "openai";
const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_TOKENS: u32 = 300;

/// Classifier output before it is trusted. Every field may be missing or nonsense.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Classification {
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub credit_card_required: Option<bool>,
}

/// Understands what the person on the other end of the line said.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// The touch-tone digit that reaches reservations in a phone menu; 0 when there is none.
    async fn menu_digit(&self, menu_transcript: &str) -> Result<u8, CollaboratorError>;

    async fn classify(
        &self,
        transcript: &str,
        query: &SearchQuery,
    ) -> Result<Classification, CollaboratorError>;
}

/// Turn classifier output into a result the rest of the system can rely on.
pub fn normalize(raw: Classification) -> CallResult {
    let outcome = raw
        .outcome
        .as_deref()
        .and_then(Outcome::parse)
        .filter(|o| *o != Outcome::Pending)
        .unwrap_or(Outcome::Other);
    let summary = raw
        .summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "The restaurant's answer could not be summarized.".to_string());
    CallResult {
        outcome,
        summary,
        credit_card_required: outcome == Outcome::CreditCardRequired,
    }
}

/// What a call resolves to when its answer could not be understood at all.
pub fn fallback_result() -> CallResult {
    CallResult::new(
        Outcome::Other,
        "We spoke to the restaurant but could not make out their answer.",
    )
}

#[derive(Deserialize)]
struct MenuChoice {
    #[serde(default)]
    digit: Option<serde_json::Value>,
}

fn parse_digit(value: Option<serde_json::Value>) -> u8 {
    let digit = match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    match digit {
        Some(d @ 1..=9) => d as u8,
        _ => 0,
    }
}

pub struct OpenAIClassifier {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAIClassifier {
    pub fn new(http_client: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            http_client,
            api_key,
            model,
        }
    }

    async fn complete_json(
        &self,
        instruction: &str,
        input: String,
    ) -> Result<String, CollaboratorError> {
        let payload = OpenAIPayload::json_mode(&self.model, instruction, input, MAX_TOKENS);
        let key = self.api_key.as_str();
        let resp = self
            .http_client
            .post(COMPLETIONS_URL)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {key}"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, "failed to send request to OpenAI");
                CollaboratorError::Http {
                    service: SERVICE,
                    source: e,
                }
            })?;
        if !resp.status().is_success() {
            return Err(CollaboratorError::Status {
                service: SERVICE,
                status: resp.status(),
            });
        }
        let completion = resp.json::<OpenAICompletion>().await.map_err(|e| {
            error!(error=%e, "failed to deserialize openai response");
            CollaboratorError::malformed(SERVICE, e.to_string())
        })?;
        debug!(id=%completion.id, usage=?completion.usage, "openai completion");
        completion
            .into_content()
            .ok_or_else(|| CollaboratorError::malformed(SERVICE, "no choices"))
    }
}

#[async_trait]
impl Classifier for OpenAIClassifier {
    async fn menu_digit(&self, menu_transcript: &str) -> Result<u8, CollaboratorError> {
        let content = self
            .complete_json(
                "You read transcripts of automated phone menus at restaurants. \
                 Reply with JSON {\"digit\": n} where n is the key to press to reach \
                 reservations or a host, or 0 if the menu offers no such option or \
                 the transcript is not a menu.",
                menu_transcript.to_string(),
            )
            .await?;
        let choice: MenuChoice = serde_json::from_str(&content)
            .map_err(|e| CollaboratorError::malformed(SERVICE, e.to_string()))?;
        Ok(parse_digit(choice.digit))
    }

    async fn classify(
        &self,
        transcript: &str,
        query: &SearchQuery,
    ) -> Result<Classification, CollaboratorError> {
        let requested_time = query
            .time
            .map(|t| format!("{:02}:{:02}", t.hour(), t.minute()))
            .unwrap_or_else(|| "the earliest available time".to_string());
        let content = self
            .complete_json(
                "You classify a restaurant's spoken reply to a reservation request. Reply \
                 with JSON {\"outcome\", \"summary\", \"credit_card_required\"}. outcome is \
                 one of available, alternative_offered, credit_card_required, opt_out, \
                 no_reservation_line, other. opt_out means they asked not to be called \
                 again. summary is one short sentence for the diner.",
                format!(
                    "Request: party of {} on {} at {}.\nRestaurant said: {}",
                    query.party_size, query.date, requested_time, transcript
                ),
            )
            .await?;
        serde_json::from_str(&content)
            .map_err(|e| CollaboratorError::malformed(SERVICE, e.to_string()))
    }
}
