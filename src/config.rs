use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// No batch may ever dial more calls per page than this, whatever the caller asks for.
pub const HARD_MAX_CALLS_PER_BATCH: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Everything the service reads from its environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub telephony: TelephonyConfig,
    pub deepgram_api_key: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub google_places_api_key: String,
    pub policy: CallPolicy,
}

#[derive(Debug, Clone)]
pub struct TelephonyConfig {
    pub api_base: String,
    pub api_key: String,
    pub connection_id: String,
    /// Number the outbound calls are placed from.
    pub from_number: String,
    pub webhook_url: Option<String>,
}

/// Tunables shared by the batch coordinator and the call state machine.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    pub default_calls_per_batch: usize,
    /// Name the caller introduces themselves with.
    pub caller_name: String,
    /// Number left on voicemails; without it no message is left.
    pub callback_number: Option<String>,
    /// Wait between speaking a final remark and hanging up.
    pub hangup_grace: Duration,
    /// How long to listen for a phone menu after a human pickup.
    pub menu_listen: Duration,
    pub answer_max_length: Duration,
    /// Trailing silence that ends the answer recording.
    pub answer_silence_timeout: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            default_calls_per_batch: 5,
            caller_name: "Alex".to_string(),
            callback_number: None,
            hangup_grace: Duration::from_secs(8),
            menu_listen: Duration::from_secs(6),
            answer_max_length: Duration::from_secs(60),
            answer_silence_timeout: Duration::from_secs(4),
        }
    }
}

impl CallPolicy {
    /// Page size for a batch: the requested cap (or the default), never above the hard maximum.
    pub fn calls_per_page(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_calls_per_batch)
            .clamp(1, HARD_MAX_CALLS_PER_BATCH)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = CallPolicy::default();
        let policy = CallPolicy {
            default_calls_per_batch: parse_or("CALLS_PER_BATCH", defaults.default_calls_per_batch)?,
            caller_name: env::var("CALLER_NAME").unwrap_or(defaults.caller_name),
            callback_number: env::var("CALLBACK_NUMBER").ok(),
            hangup_grace: secs_or("HANGUP_GRACE_SECS", defaults.hangup_grace)?,
            menu_listen: secs_or("MENU_LISTEN_SECS", defaults.menu_listen)?,
            answer_max_length: secs_or("ANSWER_MAX_SECS", defaults.answer_max_length)?,
            answer_silence_timeout: secs_or(
                "ANSWER_SILENCE_SECS",
                defaults.answer_silence_timeout,
            )?,
        };

        Ok(Self {
            bind_addr: parse_or("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            database_url: env::var("DATABASE_URL").ok(),
            telephony: TelephonyConfig {
                api_base: env::var("TELEPHONY_API_BASE")
                    .unwrap_or_else(|_| "https://api.telnyx.com/v2".to_string()),
                api_key: required("TELEPHONY_API_KEY")?,
                connection_id: required("TELEPHONY_CONNECTION_ID")?,
                from_number: required("TELEPHONY_FROM_NUMBER")?,
                webhook_url: env::var("TELEPHONY_WEBHOOK_URL").ok(),
            },
            deepgram_api_key: required("DEEPGRAM_API_KEY")?,
            openai_api_key: required("OPENAI_API_KEY")?,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            google_places_api_key: required("GOOGLE_PLACES_API_KEY")?,
            policy,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn secs_or(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parse_or(name, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_bounded_by_hard_maximum() {
        let policy = CallPolicy::default();
        assert_eq!(policy.calls_per_page(None), 5);
        assert_eq!(policy.calls_per_page(Some(3)), 3);
        assert_eq!(policy.calls_per_page(Some(50)), HARD_MAX_CALLS_PER_BATCH);
        assert_eq!(policy.calls_per_page(Some(0)), 1);
    }
}
