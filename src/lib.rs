pub mod call_state;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod deepgram_types;
pub mod dnc;
pub mod eligibility;
pub mod error;
pub mod handlers;
pub mod openai_types;
pub mod opening_hours;
pub mod places;
pub mod ranking;
pub mod scheduler;
pub mod store;
pub mod tasks;
pub mod telephony;
pub mod telephony_types;
pub mod transcription;
pub mod types;
pub mod utils;
