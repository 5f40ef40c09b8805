//! Turn-Taking Dialogue Controller
//!
//! This module implements the interviewer's state machine. A session speaks a
//! question, waits for the synthesized audio to settle, listens for the answer,
//! records it, and moves on until the question list is exhausted.
//!
//! The controller is synchronous and callback driven. It calls the speech ports
//! to start work and learns about results only through [`DialogueEvent`]s fed
//! to [`DialogueController::handle`]. Every `speak` and `start` call gets a fresh
//! turn number that the engine echoes back. A callback is acted on only when its
//! turn is the one in flight and the current [`DialoguePhase`] expects it;
//! anything else is logged and dropped, which makes duplicate or late engine
//! callbacks harmless.

use crate::{
    DialogueEvent,
    ports::{CueState, PresentationCue, RecognitionErrorCode, SpeechInput, SpeechOutput},
    questions::{self, ParseError, QuestionList},
    settings::DialogueSettings,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// The controller's current discrete state. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DialoguePhase {
    Idle,
    Speaking,
    Listening,
    Advancing,
    Completed,
    Failed,
}

impl DialoguePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, DialoguePhase::Completed | DialoguePhase::Failed)
    }
}

/// One answered question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub question: String,
    pub answer: String,
}

/// Reasons a session cannot start or has to stop early.
///
/// The `Display` output is meant to be shown to the candidate as is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DialogueError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("No interview questions were provided.")]
    NoQuestions,
    #[error("Speech recognition is not supported in this browser. Please use Chrome or Edge.")]
    CapabilityUnavailable,
    #[error("Could not speak the question: {0}")]
    OutputFailure(String),
    #[error("Speech recognition error: {0}")]
    InputFailure(String),
    #[error("An interview is already running with a different set of questions.")]
    AlreadyStarted,
}

/// Display-level summary of the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Speaking,
    Listening,
    Waiting,
    Ended,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Speaking => "Speaking...",
            Status::Listening => "Listening...",
            Status::Waiting => "Waiting for response",
            Status::Ended => "Call ended",
        }
    }
}

impl From<DialoguePhase> for Status {
    fn from(phase: DialoguePhase) -> Self {
        match phase {
            DialoguePhase::Speaking => Status::Speaking,
            DialoguePhase::Listening => Status::Listening,
            DialoguePhase::Idle | DialoguePhase::Advancing => Status::Waiting,
            DialoguePhase::Completed | DialoguePhase::Failed => Status::Ended,
        }
    }
}

/// Mutable per-session data, owned by the controller.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub current_question_index: usize,
    pub conversation: Vec<ConversationEntry>,
    /// Live transcript of the answer in progress; cleared between turns.
    pub current_transcript: String,
    pub last_error: Option<DialogueError>,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Completed,
    Cancelled,
    Failed(DialogueError),
}

/// What the caller gets back, however the session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub conversation: Vec<ConversationEntry>,
    pub end: SessionEnd,
}

/// Notifications for a presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Status(Status),
    Transcript(String),
    EntryRecorded(ConversationEntry),
    Error(String),
    Ended(SessionOutcome),
}

/// A request for the runtime to deliver [`DialogueEvent::SettleElapsed`]
/// carrying `generation` once `delay` has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleRequest {
    pub generation: u64,
    pub delay: Duration,
}

pub struct DialogueController {
    settings: DialogueSettings,
    output: Box<dyn SpeechOutput>,
    input: Box<dyn SpeechInput>,
    cue: Box<dyn PresentationCue>,
    updates: Option<mpsc::UnboundedSender<SessionUpdate>>,
    questions: Option<QuestionList>,
    phase: DialoguePhase,
    state: SessionState,
    end: Option<SessionEnd>,
    /// Generation of the settle timer the controller is waiting on, if any.
    settling: Option<u64>,
    pending_settle: Option<SettleRequest>,
    /// Turn of the most recent `speak` or `start` request.
    turn: u64,
    /// Shared counter for settle generations and turns.
    next_id: u64,
    no_speech_retries: u32,
}

impl DialogueController {
    pub fn new(
        settings: DialogueSettings,
        output: Box<dyn SpeechOutput>,
        input: Box<dyn SpeechInput>,
        cue: Box<dyn PresentationCue>,
    ) -> Self {
        Self {
            settings,
            output,
            input,
            cue,
            updates: None,
            questions: None,
            phase: DialoguePhase::Idle,
            state: SessionState::default(),
            end: None,
            settling: None,
            pending_settle: None,
            turn: 0,
            next_id: 1,
            no_speech_retries: 0,
        }
    }

    /// Attaches an observer that receives a [`SessionUpdate`] for every
    /// visible change.
    pub fn with_updates(mut self, updates: mpsc::UnboundedSender<SessionUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn phase(&self) -> DialoguePhase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn conversation(&self) -> &[ConversationEntry] {
        &self.state.conversation
    }

    pub fn transcript(&self) -> &str {
        &self.state.current_transcript
    }

    pub fn last_error(&self) -> Option<&DialogueError> {
        self.state.last_error.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    /// The session result, once the session has reached a terminal phase.
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.end.clone().map(|end| SessionOutcome {
            conversation: self.state.conversation.clone(),
            end,
        })
    }

    /// Hands the runtime the settle timer armed by the last transition.
    pub fn take_settle_request(&mut self) -> Option<SettleRequest> {
        self.pending_settle.take()
    }

    /// Starts the interview with an already-parsed list.
    ///
    /// Calling this again once a session exists is idempotent for the same
    /// list and rejected for a different one; the speech engines are never
    /// initialized twice.
    pub fn start(&mut self, questions: QuestionList) -> Result<(), DialogueError> {
        if self.phase != DialoguePhase::Idle {
            return self.reconcile(&questions);
        }
        if questions.is_empty() {
            return Err(self.fail(DialogueError::NoQuestions));
        }
        if !self.input.is_supported() {
            return Err(self.fail(DialogueError::CapabilityUnavailable));
        }

        info!(questions = questions.len(), "Starting interview session");
        self.questions = Some(questions);
        self.state = SessionState::default();
        self.speak_current();

        match &self.state.last_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Parses a raw question payload and starts the interview with it.
    pub fn start_from_payload(&mut self, raw: &str) -> Result<(), DialogueError> {
        match questions::parse(raw) {
            Ok(list) => self.start(list),
            Err(e) if self.phase == DialoguePhase::Idle => Err(self.fail(e.into())),
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable question payload for a running session");
                Err(e.into())
            }
        }
    }

    fn reconcile(&mut self, questions: &QuestionList) -> Result<(), DialogueError> {
        if self.questions.as_ref() == Some(questions) {
            debug!(phase = ?self.phase, "Question payload unchanged; keeping current session");
            Ok(())
        } else {
            warn!(phase = ?self.phase, "Rejecting a different question payload for a running session");
            Err(DialogueError::AlreadyStarted)
        }
    }

    /// Feeds one engine callback or timer into the state machine.
    pub fn handle(&mut self, event: DialogueEvent) {
        match event {
            DialogueEvent::QuestionsDelivered(raw) => {
                // Failures are recorded on the session or logged by the call itself.
                let _ = self.start_from_payload(&raw);
            }
            DialogueEvent::SpeechFinished { turn } => self.on_speech_finished(turn),
            DialogueEvent::SpeechFailed { turn, message } => self.on_speech_failed(turn, message),
            DialogueEvent::PartialTranscript { turn, text } => self.on_partial(turn, text),
            DialogueEvent::FinalTranscript { turn, text } => self.on_final(turn, text),
            DialogueEvent::RecognitionFailed { turn, code } => {
                self.on_recognition_failed(turn, code)
            }
            DialogueEvent::SettleElapsed { generation } => self.on_settled(generation),
        }
    }

    /// Ends the session at the caller's request.
    ///
    /// Any utterance or recognition in flight is stopped before returning, and
    /// every later callback is ignored.
    pub fn cancel(&mut self) {
        if self.phase.is_terminal() {
            debug!(phase = ?self.phase, "Cancel ignored: session already over");
            return;
        }
        info!(phase = ?self.phase, "Interview cancelled by caller");
        self.settling = None;
        self.pending_settle = None;
        self.output.cancel();
        self.input.stop();
        self.finish(DialoguePhase::Completed, SessionEnd::Cancelled);
    }

    fn on_speech_finished(&mut self, turn: u64) {
        if !self.expects(DialoguePhase::Speaking, turn) || self.settling.is_some() {
            debug!(phase = ?self.phase, turn, current = self.turn, "Ignoring speech completion");
            return;
        }
        self.arm_settle();
    }

    fn on_speech_failed(&mut self, turn: u64, message: String) {
        if !self.expects(DialoguePhase::Speaking, turn) || self.settling.is_some() {
            debug!(phase = ?self.phase, turn, %message, "Ignoring speech failure");
            return;
        }
        self.fail(DialogueError::OutputFailure(message));
    }

    fn on_partial(&mut self, turn: u64, text: String) {
        if !self.expects(DialoguePhase::Listening, turn) {
            debug!(phase = ?self.phase, turn, "Ignoring partial transcript");
            return;
        }
        self.state.current_transcript = text.clone();
        self.emit(SessionUpdate::Transcript(text));
    }

    fn on_final(&mut self, turn: u64, text: String) {
        if !self.expects(DialoguePhase::Listening, turn) {
            debug!(phase = ?self.phase, turn, current = self.turn, "Ignoring final transcript");
            return;
        }
        let Some(question) = self.current_question().map(str::to_string) else {
            self.fail(DialogueError::NoQuestions);
            return;
        };

        let entry = ConversationEntry {
            question,
            answer: text.trim().to_string(),
        };
        info!(
            index = self.state.current_question_index,
            answer_len = entry.answer.len(),
            "Answer recorded"
        );
        self.state.conversation.push(entry.clone());
        self.emit(SessionUpdate::EntryRecorded(entry));

        // The recognizer may keep streaming in continuous mode.
        self.input.stop();
        self.clear_transcript();
        self.enter(DialoguePhase::Advancing);
        self.set_cue(CueState::Speaking);
        self.arm_settle();
    }

    fn on_recognition_failed(&mut self, turn: u64, code: RecognitionErrorCode) {
        if !self.expects(DialoguePhase::Listening, turn) {
            debug!(phase = ?self.phase, turn, %code, "Ignoring recognition error");
            return;
        }
        if code.is_transient() && self.no_speech_retries < self.settings.max_no_speech_retries {
            self.no_speech_retries += 1;
            warn!(%code, attempt = self.no_speech_retries, "Transient recognition error; listening again");
            let turn = self.next_turn();
            if let Err(e) = self.input.start(turn) {
                self.fail(DialogueError::InputFailure(format!(
                    "could not start listening: {e}"
                )));
            }
            return;
        }
        self.fail(DialogueError::InputFailure(code.to_string()));
    }

    fn on_settled(&mut self, generation: u64) {
        if self.settling != Some(generation) {
            debug!(generation, expected = ?self.settling, "Ignoring stale settle timer");
            return;
        }
        self.settling = None;
        match self.phase {
            DialoguePhase::Speaking => self.begin_listening(),
            DialoguePhase::Advancing => self.advance(),
            phase => debug!(?phase, "Settle timer fired with nothing to do"),
        }
    }

    fn current_question(&self) -> Option<&str> {
        self.questions
            .as_ref()
            .and_then(|q| q.get(self.state.current_question_index))
    }

    fn speak_current(&mut self) {
        let Some(question) = self.current_question().map(str::to_string) else {
            self.fail(DialogueError::NoQuestions);
            return;
        };
        self.enter(DialoguePhase::Speaking);
        self.clear_transcript();
        self.set_cue(CueState::Speaking);
        let turn = self.next_turn();
        info!(index = self.state.current_question_index, turn, "Asking question");
        if let Err(e) = self.output.speak(turn, &question) {
            self.fail(DialogueError::OutputFailure(e.to_string()));
        }
    }

    fn begin_listening(&mut self) {
        self.enter(DialoguePhase::Listening);
        self.no_speech_retries = 0;
        self.clear_transcript();
        self.set_cue(CueState::Listening);
        let turn = self.next_turn();
        if let Err(e) = self.input.start(turn) {
            self.fail(DialogueError::InputFailure(format!(
                "could not start listening: {e}"
            )));
        }
    }

    fn advance(&mut self) {
        let total = self.questions.as_ref().map_or(0, QuestionList::len);
        let next = self.state.current_question_index + 1;
        if next < total {
            self.state.current_question_index = next;
            self.speak_current();
        } else {
            self.finish(DialoguePhase::Completed, SessionEnd::Completed);
            let remark = self.settings.closing_remark.clone();
            let turn = self.next_turn();
            if let Err(e) = self.output.speak(turn, &remark) {
                warn!(error = %e, "Could not speak the closing remark");
            }
        }
    }

    /// Moves to `Failed`, stopping whichever engine the current phase owns.
    fn fail(&mut self, error: DialogueError) -> DialogueError {
        error!(error = %error, phase = ?self.phase, "Interview session failed");
        match self.phase {
            DialoguePhase::Speaking => self.output.cancel(),
            DialoguePhase::Listening => self.input.stop(),
            _ => {}
        }
        self.settling = None;
        self.pending_settle = None;
        self.state.last_error = Some(error.clone());
        self.emit(SessionUpdate::Error(error.to_string()));
        self.finish(DialoguePhase::Failed, SessionEnd::Failed(error.clone()));
        error
    }

    fn finish(&mut self, phase: DialoguePhase, end: SessionEnd) {
        self.enter(phase);
        self.end = Some(end);
        self.set_cue(CueState::Ended);
        if let Some(outcome) = self.outcome() {
            self.emit(SessionUpdate::Ended(outcome));
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn next_turn(&mut self) -> u64 {
        self.turn = self.next_id();
        self.turn
    }

    /// Whether a callback for `turn` belongs to the request in flight in `phase`.
    fn expects(&self, phase: DialoguePhase, turn: u64) -> bool {
        self.phase == phase && self.turn == turn
    }

    fn arm_settle(&mut self) {
        let generation = self.next_id();
        self.settling = Some(generation);
        self.pending_settle = Some(SettleRequest {
            generation,
            delay: self.settings.settle_delay,
        });
    }

    fn enter(&mut self, phase: DialoguePhase) {
        let previous = self.phase;
        if previous == phase {
            return;
        }
        info!(from = ?previous, to = ?phase, "Dialogue phase change");
        self.phase = phase;
        let status = Status::from(phase);
        if status != Status::from(previous) {
            self.emit(SessionUpdate::Status(status));
        }
    }

    fn clear_transcript(&mut self) {
        if !self.state.current_transcript.is_empty() {
            self.state.current_transcript.clear();
            self.emit(SessionUpdate::Transcript(String::new()));
        }
    }

    fn set_cue(&mut self, state: CueState) {
        if let Err(e) = self.cue.set_state(state) {
            warn!(?state, error = %e, "Presentation cue failed");
        }
    }

    fn emit(&self, update: SessionUpdate) {
        if let Some(tx) = &self.updates {
            if tx.send(update).is_err() {
                debug!("Session update dropped: observer has gone away");
            }
        }
    }
}
