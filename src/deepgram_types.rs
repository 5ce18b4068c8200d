use serde::{Deserialize, Serialize};

/// Response of the pre-recorded `/v1/listen` endpoint.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PrerecordedResponse {
    pub results: Results,
}

#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Debug)]
pub struct Results {
    #[serde(default)]
    pub channels: Vec<Channel>,
}

#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Debug)]
pub struct Channel {
    pub alternatives: Vec<Alternative>,
}

#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Debug)]
pub struct Alternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: f32,
}

impl PrerecordedResponse {
    /// Best transcript of the first channel.
    pub fn transcript(&self) -> Option<&str> {
        self.results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.as_str())
    }
}
