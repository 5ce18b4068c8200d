use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

impl OpenAIMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// `{"type": "json_object"}` forces the model to answer with a JSON object.
#[derive(Serialize, Debug)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Serialize, Default, Debug)]
pub struct OpenAIPayload {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl OpenAIPayload {
    /// Deterministic, JSON-only completion for a system instruction and one user turn.
    pub fn json_mode(model: &str, instruction: &str, input: String, max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![OpenAIMessage::system(instruction), OpenAIMessage::user(input)],
            max_tokens: Some(max_tokens),
            temperature: Some(0.0),
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct OpenAICompletion {
    pub id: String,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
}

impl OpenAICompletion {
    pub fn into_content(self) -> Option<String> {
        self.choices.into_iter().next().map(|c| c.message.content)
    }
}

#[derive(Deserialize, Debug)]
pub struct OpenAIChoice {
    pub message: OpenAIMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct OpenAIUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}
