mod webhook {
    use serde::Deserialize;

    /// Envelope of every call-control webhook delivery.
    #[derive(Deserialize, Debug)]
    pub struct TelephonyWebhook {
        pub data: WebhookData,
    }

    #[derive(Deserialize, Debug)]
    pub struct WebhookData {
        pub event_type: String,
        #[serde(default)]
        pub id: Option<String>,
        #[serde(default)]
        pub payload: WebhookPayload,
    }

    #[derive(Deserialize, Debug, Default)]
    pub struct WebhookPayload {
        #[serde(default)]
        pub call_control_id: Option<String>,
        #[serde(default)]
        pub client_state: Option<String>,
        /// Machine detection verdict, e.g. `human`, `machine`, `not_sure`.
        #[serde(default)]
        pub result: Option<String>,
        #[serde(default)]
        pub recording_urls: Option<RecordingUrls>,
        #[serde(default)]
        pub public_recording_urls: Option<RecordingUrls>,
        #[serde(default)]
        pub hangup_cause: Option<String>,
    }

    #[derive(Deserialize, Debug, Default)]
    pub struct RecordingUrls {
        #[serde(default)]
        pub mp3: Option<String>,
        #[serde(default)]
        pub wav: Option<String>,
    }

    impl RecordingUrls {
        pub fn best(&self) -> Option<&str> {
            self.mp3.as_deref().or(self.wav.as_deref())
        }
    }

    #[derive(Deserialize, Debug)]
    pub struct DialResponse {
        pub data: DialedCall,
    }

    #[derive(Deserialize, Debug)]
    pub struct DialedCall {
        pub call_control_id: String,
    }
}
pub use webhook::*;

mod commands {
    use serde::Serialize;

    #[derive(Serialize, Debug)]
    pub struct DialRequest<'a> {
        pub connection_id: &'a str,
        pub to: &'a str,
        pub from: &'a str,
        pub client_state: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub webhook_url: Option<&'a str>,
    }

    #[derive(Serialize, Debug)]
    pub struct SpeakRequest<'a> {
        pub payload: &'a str,
        pub voice: &'a str,
        pub language: &'a str,
    }

    #[derive(Serialize, Debug)]
    pub struct MachineDetectionRequest {
        pub answering_machine_detection: &'static str,
    }

    #[derive(Serialize, Debug)]
    pub struct RecordStartRequest {
        pub format: &'static str,
        pub channels: &'static str,
        pub play_beep: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub max_length: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub timeout_secs: Option<u64>,
    }

    #[derive(Serialize, Debug)]
    pub struct SendDtmfRequest<'a> {
        pub digits: &'a str,
    }

    #[derive(Serialize, Debug, Default)]
    pub struct EmptyRequest {}
}
pub use commands::*;
