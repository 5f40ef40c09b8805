use crate::voice::VoicePreference;
use std::time::Duration;

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_SPEECH_RATE: f32 = 0.9;
pub const DEFAULT_MAX_NO_SPEECH_RETRIES: u32 = 3;
pub const DEFAULT_CLOSING_REMARK: &str = "Thank you for your time. The interview is now complete.";

/// Tunables for a single interview session.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueSettings {
    /// Pause between the end of synthesized speech and the start of
    /// recognition, and between a recorded answer and the next question.
    pub settle_delay: Duration,
    /// Multiplier applied to the engine's default speaking rate.
    pub speech_rate: f32,
    pub voice: VoicePreference,
    /// Consecutive transient recognition errors tolerated within one turn.
    pub max_no_speech_retries: u32,
    pub closing_remark: String,
}

impl Default for DialogueSettings {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            speech_rate: DEFAULT_SPEECH_RATE,
            voice: VoicePreference::default(),
            max_no_speech_retries: DEFAULT_MAX_NO_SPEECH_RETRIES,
            closing_remark: DEFAULT_CLOSING_REMARK.to_string(),
        }
    }
}

impl DialogueSettings {
    /// Default settings without settle delays, for tests and simulations.
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// The recognition language, shared with the voice preference.
    pub fn language(&self) -> &str {
        &self.voice.language
    }
}
