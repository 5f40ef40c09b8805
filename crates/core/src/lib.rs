pub mod dialogue;
pub mod ports;
pub mod questions;
pub mod runtime;
pub mod settings;
pub mod voice;

use ports::RecognitionErrorCode;

/// Represents everything that can happen *to* a dialogue session.
///
/// Speech engines, timers and the question pipeline all report into the
/// controller through this enum. Engine callbacks echo the `turn` of the
/// `speak` or `start` call they answer; the controller drops any callback whose
/// turn or phase is no longer current.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogueEvent {
    /// A raw question payload from the question generator.
    QuestionsDelivered(String),
    /// The utterance started under `turn` has finished playing.
    SpeechFinished { turn: u64 },
    /// The synthesis engine could not produce the utterance started under `turn`.
    SpeechFailed { turn: u64, message: String },
    /// Best-effort transcript of the answer so far.
    PartialTranscript { turn: u64, text: String },
    /// The recognizer detected the end of the answer.
    FinalTranscript { turn: u64, text: String },
    /// The recognizer stopped with an error instead of a transcript.
    RecognitionFailed {
        turn: u64,
        code: RecognitionErrorCode,
    },
    /// A settle delay armed by the controller has elapsed.
    SettleElapsed { generation: u64 },
}
