use crate::config::TelephonyConfig;
use crate::error::CollaboratorError;
use crate::telephony_types::{
    DialRequest, DialResponse, EmptyRequest, MachineDetectionRequest, RecordStartRequest,
    SendDtmfRequest, SpeakRequest,
};
use crate::utils::to_e164;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::trace;

const SERVICE: &str = "telephony";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RecordingParams {
    /// Hard stop for the recording, if any.
    pub max_length: Option<Duration>,
    /// Trailing silence that ends the recording, if any.
    pub silence_timeout: Option<Duration>,
}

/// The call-control commands the engine issues against a live call.
#[async_trait]
pub trait CallControl: Send + Sync {
    /// Place an outbound call; returns the provider's call-control id.
    async fn dial(&self, to: &str, client_state: &str) -> Result<String, CollaboratorError>;
    async fn answer(&self, call_control_id: &str) -> Result<(), CollaboratorError>;
    async fn start_machine_detection(&self, call_control_id: &str)
        -> Result<(), CollaboratorError>;
    async fn speak(&self, call_control_id: &str, text: &str) -> Result<(), CollaboratorError>;
    async fn start_recording(
        &self,
        call_control_id: &str,
        params: RecordingParams,
    ) -> Result<(), CollaboratorError>;
    async fn stop_recording(&self, call_control_id: &str) -> Result<(), CollaboratorError>;
    async fn send_digits(&self, call_control_id: &str, digits: &str)
        -> Result<(), CollaboratorError>;
    async fn hangup(&self, call_control_id: &str) -> Result<(), CollaboratorError>;
}

/// Call-control REST client: `POST /calls` to dial, `POST /calls/{id}/actions/{action}` for the
/// rest.
pub struct HttpCallControl {
    http_client: reqwest::Client,
    config: TelephonyConfig,
}

impl HttpCallControl {
    pub fn new(http_client: reqwest::Client, config: TelephonyConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, CollaboratorError> {
        let url = format!("{}/{}", self.config.api_base.trim_end_matches('/'), path);
        trace!(url=%url, "call control request");
        let resp = self
            .http_client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(CollaboratorError::http(SERVICE))?;
        if !resp.status().is_success() {
            return Err(CollaboratorError::Status {
                service: SERVICE,
                status: resp.status(),
            });
        }
        Ok(resp)
    }

    async fn action<T: Serialize + ?Sized>(
        &self,
        call_control_id: &str,
        action: &str,
        body: &T,
    ) -> Result<(), CollaboratorError> {
        self.post(&format!("calls/{call_control_id}/actions/{action}"), body)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl CallControl for HttpCallControl {
    async fn dial(&self, to: &str, client_state: &str) -> Result<String, CollaboratorError> {
        let to = to_e164(to).ok_or_else(|| {
            CollaboratorError::malformed(SERVICE, format!("{to} is not an international number"))
        })?;
        let request = DialRequest {
            connection_id: &self.config.connection_id,
            to: &to,
            from: &self.config.from_number,
            client_state,
            webhook_url: self.config.webhook_url.as_deref(),
        };
        let resp = self.post("calls", &request).await?;
        let dialed = resp
            .json::<DialResponse>()
            .await
            .map_err(|e| CollaboratorError::malformed(SERVICE, e.to_string()))?;
        Ok(dialed.data.call_control_id)
    }

    async fn answer(&self, call_control_id: &str) -> Result<(), CollaboratorError> {
        self.action(call_control_id, "answer", &EmptyRequest::default())
            .await
    }

    async fn start_machine_detection(
        &self,
        call_control_id: &str,
    ) -> Result<(), CollaboratorError> {
        let request = MachineDetectionRequest {
            answering_machine_detection: "premium",
        };
        self.action(call_control_id, "answering_machine_detection", &request)
            .await
    }

    async fn speak(&self, call_control_id: &str, text: &str) -> Result<(), CollaboratorError> {
        let request = SpeakRequest {
            payload: text,
            voice: "female",
            language: "en-US",
        };
        self.action(call_control_id, "speak", &request).await
    }

    async fn start_recording(
        &self,
        call_control_id: &str,
        params: RecordingParams,
    ) -> Result<(), CollaboratorError> {
        let request = RecordStartRequest {
            format: "mp3",
            channels: "single",
            play_beep: false,
            max_length: params.max_length.map(|d| d.as_secs()),
            timeout_secs: params.silence_timeout.map(|d| d.as_secs()),
        };
        self.action(call_control_id, "record_start", &request).await
    }

    async fn stop_recording(&self, call_control_id: &str) -> Result<(), CollaboratorError> {
        self.action(call_control_id, "record_stop", &EmptyRequest::default())
            .await
    }

    async fn send_digits(
        &self,
        call_control_id: &str,
        digits: &str,
    ) -> Result<(), CollaboratorError> {
        self.action(call_control_id, "send_dtmf", &SendDtmfRequest { digits })
            .await
    }

    async fn hangup(&self, call_control_id: &str) -> Result<(), CollaboratorError> {
        self.action(call_control_id, "hangup", &EmptyRequest::default())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<Value>>>;

    async fn capture(State(captured): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
        captured.lock().unwrap().push(body);
        Json(json!({ "data": { "call_control_id": "v3:dialed" } }))
    }

    async fn provider() -> (HttpCallControl, Captured) {
        let captured = Captured::default();
        let app = Router::new()
            .route("/calls", post(capture))
            .with_state(captured.clone());
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = axum::Server::bind(&addr).serve(app.into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);
        let control = HttpCallControl::new(
            reqwest::Client::new(),
            TelephonyConfig {
                api_base: format!("http://{addr}"),
                api_key: "KEY".to_string(),
                connection_id: "conn-1".to_string(),
                from_number: "+15125550199".to_string(),
                webhook_url: None,
            },
        );
        (control, captured)
    }

    #[tokio::test]
    async fn dials_in_e164() {
        let (control, captured) = provider().await;
        let id = control.dial("+1 512-555-0100", "c3RhdGU=").await.unwrap();
        assert_eq!(id, "v3:dialed");
        let body = captured.lock().unwrap()[0].clone();
        assert_eq!(body["to"], "+15125550100");
        assert_eq!(body["from"], "+15125550199");
        assert_eq!(body["client_state"], "c3RhdGU=");
    }

    #[tokio::test]
    async fn national_numbers_are_not_dialed() {
        let (control, captured) = provider().await;
        let err = control.dial("(512) 555-0100", "c3RhdGU=").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Malformed { .. }));
        assert!(captured.lock().unwrap().is_empty());
    }
}
