use crate::call_state::{CallDriver, CallEvent, CallKey, Detection};
use crate::error::handle_error;
use crate::telephony_types::TelephonyWebhook;
use crate::utils::decode_client_state;

use std::sync::Arc;
use tracing::{debug, warn};

/// Map a provider webhook onto a call and an event, if it is one we act on.
pub fn call_event(webhook: &TelephonyWebhook) -> Option<(CallKey, CallEvent)> {
    let payload = &webhook.data.payload;
    let event = match webhook.data.event_type.as_str() {
        "call.initiated" => CallEvent::Initiated,
        "call.answered" => CallEvent::Answered,
        "call.machine.detection.ended" => CallEvent::MachineDetection(
            payload
                .result
                .as_deref()
                .map(Detection::parse)
                .unwrap_or(Detection::Unknown),
        ),
        "call.recording.saved" => CallEvent::RecordingSaved {
            recording_url: payload
                .recording_urls
                .as_ref()
                .and_then(|u| u.best())
                .or_else(|| payload.public_recording_urls.as_ref().and_then(|u| u.best()))
                .map(str::to_string),
        },
        "call.hangup" => CallEvent::Hangup {
            cause: payload.hangup_cause.clone(),
        },
        other => {
            debug!(event_type=%other, "ignoring webhook event type");
            return None;
        }
    };
    let Some(call_control_id) = payload.call_control_id.clone() else {
        warn!(event_type=%webhook.data.event_type, "webhook without call control id");
        return None;
    };
    let key = CallKey {
        call_control_id,
        record_id: payload.client_state.as_deref().and_then(decode_client_state),
    };
    Some((key, event))
}

/// Task that applies one telephony webhook to its call. Runs detached from the HTTP request.
pub async fn process_call_webhook(driver: Arc<CallDriver>, webhook: TelephonyWebhook) {
    let Some((key, event)) = call_event(&webhook) else {
        return;
    };
    debug!(call_control_id=%key.call_control_id, ?event, "processing webhook");
    if let Err(e) = driver.handle(key, event).await {
        handle_error("failed to process telephony webhook", e);
    }
}
