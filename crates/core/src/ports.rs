//! Speech and presentation ports.
//!
//! The dialogue controller never talks to a speech engine directly. It calls
//! these traits to *start* work, and the engines report back asynchronously by
//! pushing [`DialogueEvent`]s through an [`EventSink`]. Port methods must not
//! block and must never call back into the controller synchronously.

use crate::DialogueEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// A port refused or failed to carry out a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PortError(pub String);

impl PortError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Text-to-speech engine.
///
/// Every successful `speak` must eventually produce exactly one
/// [`DialogueEvent::SpeechFinished`] or [`DialogueEvent::SpeechFailed`]
/// carrying the same `turn`.
#[cfg_attr(test, mockall::automock)]
pub trait SpeechOutput: Send {
    fn speak(&mut self, turn: u64, text: &str) -> Result<(), PortError>;
    /// Drops any utterance in flight. Completion events for it may still arrive.
    fn cancel(&mut self);
}

/// Speech-recognition engine.
///
/// A `start` is followed by zero or more [`DialogueEvent::PartialTranscript`]s
/// and then exactly one [`DialogueEvent::FinalTranscript`] or
/// [`DialogueEvent::RecognitionFailed`], all carrying the `turn` given to `start`.
#[cfg_attr(test, mockall::automock)]
pub trait SpeechInput: Send {
    /// Whether recognition exists at all. Checked once, before the first question.
    fn is_supported(&self) -> bool;
    fn start(&mut self, turn: u64) -> Result<(), PortError>;
    fn stop(&mut self);
}

/// Visual state shown alongside the conversation, e.g. an avatar video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueState {
    Speaking,
    Listening,
    Ended,
}

#[cfg_attr(test, mockall::automock)]
pub trait PresentationCue: Send {
    fn set_state(&mut self, state: CueState) -> Result<(), PortError>;
}

/// A cue for sessions without any presentation surface.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCue;

impl PresentationCue for NoopCue {
    fn set_state(&mut self, _state: CueState) -> Result<(), PortError> {
        Ok(())
    }
}

/// Error codes reported by a speech-recognition engine.
///
/// The serialized names match the codes browsers emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecognitionErrorCode {
    NoSpeech,
    Aborted,
    AudioCapture,
    Network,
    NotAllowed,
    ServiceNotAllowed,
    BadGrammar,
    LanguageNotSupported,
    #[serde(other)]
    Unknown,
}

impl RecognitionErrorCode {
    /// Parses a browser error code, mapping anything unrecognized to `Unknown`.
    pub fn from_code(code: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(code.to_string()))
            .unwrap_or(RecognitionErrorCode::Unknown)
    }

    /// Transient errors end the current listen without a transcript and are
    /// worth retrying; everything else fails the session.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            RecognitionErrorCode::NoSpeech | RecognitionErrorCode::Aborted
        )
    }
}

impl fmt::Display for RecognitionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            RecognitionErrorCode::NoSpeech => "no-speech",
            RecognitionErrorCode::Aborted => "aborted",
            RecognitionErrorCode::AudioCapture => "audio-capture",
            RecognitionErrorCode::Network => "network",
            RecognitionErrorCode::NotAllowed => "not-allowed",
            RecognitionErrorCode::ServiceNotAllowed => "service-not-allowed",
            RecognitionErrorCode::BadGrammar => "bad-grammar",
            RecognitionErrorCode::LanguageNotSupported => "language-not-supported",
            RecognitionErrorCode::Unknown => "unknown",
        };
        f.write_str(code)
    }
}

/// The channel through which port implementations report engine callbacks.
///
/// Cloned freely into every adapter. Sends after the session has finished are
/// silently dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<DialogueEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<DialogueEvent>) -> Self {
        Self { tx }
    }

    pub fn send(&self, event: DialogueEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Dropping engine event: dialogue runtime has finished.");
        }
    }
}
