//! Defines the WebSocket message protocol between the browser client and the API server.
//!
//! The browser owns the actual speech engines and the avatar video. The server
//! tells it what to do with [`ServerMessage`]s and learns about engine callbacks
//! through [`ClientMessage`]s. Each `speak` and `start_listening` carries a
//! `turn` that the client echoes in every callback for that request.

use interview_core::{
    DialogueEvent,
    dialogue::{ConversationEntry, SessionEnd, SessionOutcome, SessionUpdate, Status},
    ports::{CueState, RecognitionErrorCode},
    voice::Voice,
};
use serde::{Deserialize, Serialize};

/// The question list as sent by the client: either the generator's raw text
/// output, or a list the client has already split.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum QuestionsPayload {
    Raw(String),
    List(Vec<String>),
}

impl QuestionsPayload {
    /// Normalizes both forms into the raw text the question parser expects.
    pub fn into_raw(self) -> String {
        match self {
            QuestionsPayload::Raw(raw) => raw,
            QuestionsPayload::List(list) => {
                serde_json::to_string(&list).unwrap_or_else(|_| String::from("[]"))
            }
        }
    }
}

fn default_supported() -> bool {
    true
}

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts the interview. This must be the first message.
    Start {
        questions: QuestionsPayload,
        /// Whether the browser exposes a speech recognition engine at all.
        #[serde(default = "default_supported")]
        speech_recognition_supported: bool,
        /// Voices offered by the browser's synthesis engine.
        #[serde(default)]
        voices: Vec<Voice>,
    },
    /// The `speak` command for `turn` finished playing.
    SpeechEnded { turn: u64 },
    /// The synthesis engine rejected the `speak` command for `turn`.
    SpeechFailed { turn: u64, message: String },
    /// A recognition result. `is_final` marks the end of the answer.
    Transcript {
        turn: u64,
        text: String,
        is_final: bool,
    },
    /// The recognizer stopped with a browser error code such as `no-speech`.
    RecognitionError { turn: u64, error: String },
    /// The candidate hung up.
    EndCall,
}

impl ClientMessage {
    /// Translates an engine callback into a controller event.
    ///
    /// `start` and `end_call` are session-level messages and yield `None`.
    pub fn into_event(self) -> Option<DialogueEvent> {
        match self {
            ClientMessage::SpeechEnded { turn } => Some(DialogueEvent::SpeechFinished { turn }),
            ClientMessage::SpeechFailed { turn, message } => {
                Some(DialogueEvent::SpeechFailed { turn, message })
            }
            ClientMessage::Transcript {
                turn,
                text,
                is_final: true,
            } => Some(DialogueEvent::FinalTranscript { turn, text }),
            ClientMessage::Transcript {
                turn,
                text,
                is_final: false,
            } => Some(DialogueEvent::PartialTranscript { turn, text }),
            ClientMessage::RecognitionError { turn, error } => {
                Some(DialogueEvent::RecognitionFailed {
                    turn,
                    code: RecognitionErrorCode::from_code(&error),
                })
            }
            ClientMessage::Start { .. } | ClientMessage::EndCall => None,
        }
    }
}

/// How the session ended, as reported to the client.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Completed,
    Cancelled,
    Failed,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Speak `text` aloud and reply with `speech_ended` or `speech_failed`.
    Speak {
        turn: u64,
        text: String,
        rate: f32,
        /// Preferred voice name; `None` means the engine default.
        voice: Option<String>,
        lang: String,
    },
    /// Stop any utterance in progress.
    CancelSpeech,
    /// Start the recognizer and stream `transcript` messages back.
    StartListening { turn: u64, lang: String },
    StopListening,
    /// Play or pause the avatar.
    Cue { state: CueState },
    /// A human-readable status for the call screen.
    Status { status: Status, label: String },
    /// The live transcript of the answer in progress.
    Transcript { text: String },
    /// An answer was recorded.
    EntryRecorded { entry: ConversationEntry },
    /// An error message for direct display.
    Error { message: String },
    /// The session is over; carries everything captured.
    SessionEnded {
        reason: EndReason,
        error: Option<String>,
        conversation: Vec<ConversationEntry>,
    },
}

impl ServerMessage {
    /// Maps a controller notification onto the wire.
    ///
    /// The end of the session is reported separately, once the runtime has
    /// shut down, so `Ended` yields `None`.
    pub fn from_update(update: SessionUpdate) -> Option<Self> {
        match update {
            SessionUpdate::Status(status) => Some(ServerMessage::Status {
                status,
                label: status.label().to_string(),
            }),
            SessionUpdate::Transcript(text) => Some(ServerMessage::Transcript { text }),
            SessionUpdate::EntryRecorded(entry) => Some(ServerMessage::EntryRecorded { entry }),
            SessionUpdate::Error(message) => Some(ServerMessage::Error { message }),
            SessionUpdate::Ended(_) => None,
        }
    }
}

impl From<SessionOutcome> for ServerMessage {
    fn from(outcome: SessionOutcome) -> Self {
        let (reason, error) = match outcome.end {
            SessionEnd::Completed => (EndReason::Completed, None),
            SessionEnd::Cancelled => (EndReason::Cancelled, None),
            SessionEnd::Failed(e) => (EndReason::Failed, Some(e.to_string())),
        };
        ServerMessage::SessionEnded {
            reason,
            error,
            conversation: outcome.conversation,
        }
    }
}
