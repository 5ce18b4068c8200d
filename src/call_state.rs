//! Lifecycle of a single outbound call.
//!
//! [`transition`] is pure: given a record and an event it returns the updated record and the
//! commands to carry out. [`CallDriver`] feeds it provider webhooks, persists the result, and
//! executes the commands. Commands that need slow collaborator work (transcription,
//! classification) report back as follow-up events instead of mutating the record themselves.

use crate::classifier::{fallback_result, normalize, Classifier};
use crate::config::CallPolicy;
use crate::dnc::DoNotCallRegistry;
use crate::error::{handle_error, AppError};
use crate::scheduler::Scheduler;
use crate::store::{self, DocumentStore, BATCHES, CALLS};
use crate::telephony::{CallControl, RecordingParams};
use crate::transcription::Transcriber;
use crate::types::{
    Batch, CallPhase, CallRecord, CallResult, CallStatus, Outcome, SearchIntent, SearchQuery,
};
use crate::utils::KeyedLocks;

use futures_util::FutureExt;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Provider verdict on who picked up.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Detection {
    Human,
    Machine,
    Silence,
    Beep,
    Fax,
    Unknown,
}

impl Detection {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "human" | "human_residence" | "human_business" => Detection::Human,
            "machine" | "machine_start" | "machine_end_beep" | "machine_end_other" => {
                Detection::Machine
            }
            "silence" => Detection::Silence,
            "beep" => Detection::Beep,
            "fax_detected" | "fax" => Detection::Fax,
            _ => Detection::Unknown,
        }
    }

    /// Anything that is not a person. Unknown verdicts count as a person so the call is not
    /// abandoned.
    pub fn is_machine(self) -> bool {
        matches!(
            self,
            Detection::Machine | Detection::Silence | Detection::Beep | Detection::Fax
        )
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum CallEvent {
    Initiated,
    Answered,
    MachineDetection(Detection),
    RecordingSaved { recording_url: Option<String> },
    Hangup { cause: Option<String> },
    /// The phone menu has been read; `digit` 0 means no key to press.
    MenuScreened { digit: u8 },
    AnswerClassified {
        transcript: Option<String>,
        result: CallResult,
    },
}

#[derive(Clone, PartialEq, Debug)]
pub enum Command {
    Answer,
    StartMachineDetection,
    Speak(String),
    StartRecording(RecordingParams),
    StopRecordingAfter(Duration),
    SendDigit(u8),
    HangupAfter(Duration),
    Hangup,
    ScreenMenu { recording_url: String },
    ClassifyAnswer { recording_url: String },
    AddToDoNotCall { phone: String, name: String },
}

/// What a call needs to know about its search to speak and listen.
pub struct CallContext<'a> {
    pub query: &'a SearchQuery,
    pub policy: &'a CallPolicy,
    /// The recorded answer is being transcribed and classified right now.
    pub answer_in_flight: bool,
}

#[derive(Debug)]
pub struct Transition {
    pub record: CallRecord,
    pub commands: Vec<Command>,
}

impl Transition {
    pub fn changed(&self, from: &CallRecord) -> bool {
        self.record != *from
    }
}

const HUNG_UP_EARLY: &str = "The call ended before the restaurant gave an answer.";

fn finish(record: &mut CallRecord, result: CallResult) {
    record.status = CallStatus::Completed;
    record.phase = CallPhase::Closed;
    record.result = result;
}

/// Advance one call by one event.
pub fn transition(record: &CallRecord, event: &CallEvent, ctx: &CallContext<'_>) -> Transition {
    let mut next = record.clone();
    let mut commands = Vec::new();

    if record.status.is_terminal() {
        return Transition {
            record: next,
            commands,
        };
    }

    match (record.phase, event) {
        (CallPhase::Dialing, CallEvent::Initiated) => {
            next.phase = CallPhase::Ringing;
            commands.push(Command::Answer);
        }
        (CallPhase::Dialing | CallPhase::Ringing, CallEvent::Answered) => {
            next.status = CallStatus::InProgress;
            next.phase = CallPhase::Answered;
            commands.push(Command::StartMachineDetection);
        }
        (CallPhase::Answered, CallEvent::MachineDetection(detection)) if detection.is_machine() => {
            match ctx.policy.callback_number.as_deref() {
                Some(callback) => {
                    commands.push(Command::Speak(voicemail_message(ctx, callback)));
                    finish(
                        &mut next,
                        CallResult::new(
                            Outcome::LeftMessage,
                            "Reached voicemail and left a message with our callback number.",
                        ),
                    );
                    commands.push(Command::HangupAfter(ctx.policy.hangup_grace));
                }
                None => {
                    finish(
                        &mut next,
                        CallResult::new(Outcome::MachineDetected, "Reached an answering machine."),
                    );
                    commands.push(Command::Hangup);
                }
            }
        }
        (CallPhase::Answered, CallEvent::MachineDetection(_)) => {
            next.phase = CallPhase::ScreeningMenu;
            commands.push(Command::StartRecording(RecordingParams {
                max_length: None,
                silence_timeout: None,
            }));
            commands.push(Command::StopRecordingAfter(ctx.policy.menu_listen));
        }
        (CallPhase::ScreeningMenu, CallEvent::RecordingSaved { recording_url }) => {
            match recording_url {
                Some(url) => {
                    next.phase = CallPhase::ReadingMenu;
                    commands.push(Command::ScreenMenu {
                        recording_url: url.clone(),
                    });
                }
                None => ask_question(&mut next, &mut commands, 0, ctx),
            }
        }
        (CallPhase::ReadingMenu, CallEvent::MenuScreened { digit }) => {
            ask_question(&mut next, &mut commands, *digit, ctx);
        }
        (CallPhase::AwaitingAnswer, CallEvent::RecordingSaved { recording_url }) => {
            match recording_url {
                Some(url) => {
                    next.phase = CallPhase::Classifying;
                    commands.push(Command::ClassifyAnswer {
                        recording_url: url.clone(),
                    });
                }
                None => {
                    finish(&mut next, fallback_result());
                    commands.push(Command::Speak(closing_remark(Outcome::Other)));
                    commands.push(Command::HangupAfter(ctx.policy.hangup_grace));
                }
            }
        }
        (CallPhase::Classifying, CallEvent::AnswerClassified { transcript, result }) => {
            next.transcript = transcript.clone();
            finish(&mut next, result.clone());
            if result.outcome == Outcome::OptOut {
                commands.push(Command::AddToDoNotCall {
                    phone: record.restaurant.phone.clone(),
                    name: record.restaurant.name.clone(),
                });
            }
            commands.push(Command::Speak(closing_remark(result.outcome)));
            commands.push(Command::HangupAfter(ctx.policy.hangup_grace));
        }
        // the answer being classified will close the call itself
        (CallPhase::Classifying, CallEvent::Hangup { .. }) if ctx.answer_in_flight => {}
        (CallPhase::Classifying, CallEvent::Hangup { .. }) => {
            finish(&mut next, fallback_result());
        }
        (_, CallEvent::Hangup { .. }) => {
            finish(
                &mut next,
                CallResult::new(Outcome::NoReservationLine, HUNG_UP_EARLY),
            );
        }
        _ => {}
    }

    debug_assert!(record.status == next.status || record.status.can_become(next.status));
    Transition {
        record: next,
        commands,
    }
}

fn ask_question(next: &mut CallRecord, commands: &mut Vec<Command>, digit: u8, ctx: &CallContext) {
    next.phase = CallPhase::AwaitingAnswer;
    if (1..=9).contains(&digit) {
        commands.push(Command::SendDigit(digit));
    }
    commands.push(Command::Speak(reservation_question(ctx)));
    commands.push(Command::StartRecording(RecordingParams {
        max_length: Some(ctx.policy.answer_max_length),
        silence_timeout: Some(ctx.policy.answer_silence_timeout),
    }));
}

fn spoken_when(query: &SearchQuery) -> String {
    let day = query
        .date
        .format(format_description!(
            "[weekday], [month repr:long] [day padding:none]"
        ))
        .unwrap_or_else(|_| query.date.to_string());
    match (query.intent, query.time) {
        (SearchIntent::SpecificTime, Some(time)) => {
            let at = time
                .format(format_description!(
                    "[hour repr:12 padding:none]:[minute] [period]"
                ))
                .unwrap_or_else(|_| time.to_string());
            format!("{day} at {at}")
        }
        _ => format!("{day}, at the earliest time you have"),
    }
}

pub fn voicemail_message(ctx: &CallContext, callback: &str) -> String {
    format!(
        "Hi, this is {} calling about a reservation for {} on {}. \
         If you can fit us in, please call us back at {}. Thank you!",
        ctx.policy.caller_name,
        ctx.query.party_size,
        spoken_when(ctx.query),
        callback
    )
}

pub fn reservation_question(ctx: &CallContext) -> String {
    format!(
        "Hi, this is {}. I'm calling to ask whether you have a table for {} on {}?",
        ctx.policy.caller_name,
        ctx.query.party_size,
        spoken_when(ctx.query)
    )
}

pub fn closing_remark(outcome: Outcome) -> String {
    match outcome {
        Outcome::OptOut => "Understood, we won't call again. Sorry to bother you.",
        Outcome::Available | Outcome::AlternativeOffered | Outcome::CreditCardRequired => {
            "Thank you so much, we'll be in touch shortly to confirm."
        }
        _ => "Thank you for your time. Goodbye!",
    }
    .to_string()
}

/// Where a webhook says it belongs.
#[derive(Clone, Debug)]
pub struct CallKey {
    pub call_control_id: String,
    pub record_id: Option<Uuid>,
}

/// A transition that has been persisted, with the commands it asks for.
struct Applied {
    record: CallRecord,
    query: SearchQuery,
    commands: Vec<Command>,
}

/// Runs call state machines against the store and the telephony collaborators.
pub struct CallDriver {
    store: Arc<dyn DocumentStore>,
    control: Arc<dyn CallControl>,
    transcriber: Arc<dyn Transcriber>,
    classifier: Arc<dyn Classifier>,
    dnc: DoNotCallRegistry,
    scheduler: Arc<dyn Scheduler>,
    policy: CallPolicy,
    locks: KeyedLocks,
    answers_in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl CallDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        control: Arc<dyn CallControl>,
        transcriber: Arc<dyn Transcriber>,
        classifier: Arc<dyn Classifier>,
        dnc: DoNotCallRegistry,
        scheduler: Arc<dyn Scheduler>,
        policy: CallPolicy,
        locks: KeyedLocks,
    ) -> Self {
        Self {
            store,
            control,
            transcriber,
            classifier,
            dnc,
            scheduler,
            policy,
            locks,
            answers_in_flight: Arc::default(),
        }
    }

    fn answers_in_flight(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        match self.answers_in_flight.lock() {
            Ok(calls) => calls,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn record_id(&self, key: &CallKey) -> Result<Option<Uuid>, AppError> {
        if let Some(id) = key.record_id {
            return Ok(Some(id));
        }
        let found: Vec<CallRecord> = store::find(
            self.store.as_ref(),
            CALLS,
            "call_control_id",
            &key.call_control_id,
        )
        .await?;
        Ok(found.first().map(|r| r.id))
    }

    /// Apply one event and everything it leads to.
    pub async fn handle(&self, key: CallKey, event: CallEvent) -> Result<(), AppError> {
        let Some(record_id) = self.record_id(&key).await? else {
            warn!(call_control_id=%key.call_control_id, ?event, "no call record for webhook");
            return Ok(());
        };

        let mut pending = Some(event);
        while let Some(event) = pending.take() {
            let answer = matches!(event, CallEvent::AnswerClassified { .. });
            let mut applied = self.apply(record_id, &event).await;
            if answer {
                if let Err(e) = &applied {
                    warn!(call=%record_id, error=%e, "failed to record classified answer, retrying");
                    applied = self.apply(record_id, &event).await;
                }
                // from here on a hangup closes the call
                self.answers_in_flight().remove(&record_id);
            }
            let Some(Applied {
                record,
                query,
                commands,
            }) = applied?
            else {
                return Ok(());
            };

            for command in commands {
                if let Some(follow_up) = self
                    .execute(&key.call_control_id, &record, &query, command)
                    .await
                {
                    pending = Some(follow_up);
                }
            }
        }
        Ok(())
    }

    /// Run one event through the state machine under the call's lock and persist the result.
    async fn apply(&self, record_id: Uuid, event: &CallEvent) -> Result<Option<Applied>, AppError> {
        let _guard = self.locks.lock(&record_id.to_string()).await;
        let Some(record) =
            store::load::<CallRecord>(self.store.as_ref(), CALLS, &record_id.to_string()).await?
        else {
            warn!(record_id=%record_id, "call record vanished");
            return Ok(None);
        };
        let Some(batch) =
            store::load::<Batch>(self.store.as_ref(), BATCHES, &record.batch_id.to_string())
                .await?
        else {
            warn!(batch_id=%record.batch_id, "call belongs to unknown batch");
            return Ok(None);
        };
        let answer_in_flight = self.answers_in_flight().contains(&record_id);
        let ctx = CallContext {
            query: &batch.query,
            policy: &self.policy,
            answer_in_flight,
        };
        let transition = transition(&record, event, &ctx);
        if transition.changed(&record) {
            let mut updated = transition.record.clone();
            updated.updated_at = OffsetDateTime::now_utc();
            store::save(self.store.as_ref(), CALLS, &record_id.to_string(), &updated).await?;
            info!(
                call=%record_id,
                restaurant=%updated.restaurant.name,
                status=?updated.status,
                phase=?updated.phase,
                "call advanced"
            );
        } else {
            debug!(call=%record_id, ?event, "event changed nothing");
        }
        if transition
            .commands
            .iter()
            .any(|c| matches!(c, Command::ClassifyAnswer { .. }))
        {
            self.answers_in_flight().insert(record_id);
        }
        Ok(Some(Applied {
            record: transition.record,
            query: batch.query,
            commands: transition.commands,
        }))
    }

    /// Carry out a command. Telephony failures are logged and never re-enter the machine.
    async fn execute(
        &self,
        call_control_id: &str,
        record: &CallRecord,
        query: &SearchQuery,
        command: Command,
    ) -> Option<CallEvent> {
        debug!(call_control_id, ?command, "executing");
        let outcome = match command {
            Command::Answer => self.control.answer(call_control_id).await,
            Command::StartMachineDetection => {
                self.control.start_machine_detection(call_control_id).await
            }
            Command::Speak(text) => self.control.speak(call_control_id, &text).await,
            Command::StartRecording(params) => {
                self.control.start_recording(call_control_id, params).await
            }
            Command::SendDigit(digit) => {
                self.control
                    .send_digits(call_control_id, &digit.to_string())
                    .await
            }
            Command::Hangup => self.control.hangup(call_control_id).await,
            Command::StopRecordingAfter(delay) => {
                let control = self.control.clone();
                let id = call_control_id.to_string();
                self.scheduler.schedule(
                    delay,
                    async move {
                        if let Err(e) = control.stop_recording(&id).await {
                            handle_error("failed to stop menu recording", e);
                        }
                    }
                    .boxed(),
                );
                Ok(())
            }
            Command::HangupAfter(delay) => {
                let control = self.control.clone();
                let id = call_control_id.to_string();
                self.scheduler.schedule(
                    delay,
                    async move {
                        if let Err(e) = control.hangup(&id).await {
                            handle_error("failed to hang up", e);
                        }
                    }
                    .boxed(),
                );
                Ok(())
            }
            Command::AddToDoNotCall { phone, name } => {
                if let Err(e) = self.dnc.add(&phone, &name).await {
                    handle_error("failed to record opt-out", e);
                }
                Ok(())
            }
            Command::ScreenMenu { recording_url } => {
                return Some(self.screen_menu(record, &recording_url).await);
            }
            Command::ClassifyAnswer { recording_url } => {
                return Some(self.classify_answer(record, query, &recording_url).await);
            }
        };
        if let Err(e) = outcome {
            handle_error("call control command failed", e);
        }
        None
    }

    async fn screen_menu(&self, record: &CallRecord, recording_url: &str) -> CallEvent {
        let digit = match self.transcriber.transcribe(recording_url).await {
            Ok(menu) if menu.trim().is_empty() => 0,
            Ok(menu) => {
                debug!(call=%record.id, menu=%menu, "menu transcript");
                self.classifier.menu_digit(&menu).await.unwrap_or_else(|e| {
                    handle_error("failed to pick menu digit", e);
                    0
                })
            }
            Err(e) => {
                handle_error("failed to transcribe menu", e);
                0
            }
        };
        CallEvent::MenuScreened { digit }
    }

    async fn classify_answer(
        &self,
        record: &CallRecord,
        query: &SearchQuery,
        recording_url: &str,
    ) -> CallEvent {
        let transcript = match self.transcriber.transcribe(recording_url).await {
            Ok(transcript) => transcript,
            Err(e) => {
                handle_error("failed to transcribe answer", e);
                return CallEvent::AnswerClassified {
                    transcript: None,
                    result: fallback_result(),
                };
            }
        };
        debug!(call=%record.id, transcript=%transcript, "answer transcript");
        let result = match self.classifier.classify(&transcript, query).await {
            Ok(raw) => normalize(raw),
            Err(e) => {
                handle_error("failed to classify answer", e);
                fallback_result()
            }
        };
        CallEvent::AnswerClassified {
            transcript: Some(transcript),
            result,
        }
    }
}
