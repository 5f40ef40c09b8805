//! Speech ports backed by the browser on the other end of the WebSocket.
//!
//! Each adapter turns a port call into a [`ServerMessage`] on the session's
//! outbound queue. The browser's replies come back through the session loop
//! as [`ClientMessage`](super::protocol::ClientMessage)s, never through these types.

use super::protocol::ServerMessage;
use interview_core::{
    ports::{CueState, PortError, PresentationCue, SpeechInput, SpeechOutput},
    settings::DialogueSettings,
};
use tokio::sync::mpsc;

/// Queue drained by the session's socket writer task.
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

fn push(outbound: &Outbound, msg: ServerMessage) -> Result<(), PortError> {
    outbound
        .send(msg)
        .map_err(|_| PortError::new("the client connection is closed"))
}

/// Speech synthesis in the browser.
pub struct BrowserSpeechOutput {
    outbound: Outbound,
    rate: f32,
    voice: Option<String>,
    lang: String,
}

impl BrowserSpeechOutput {
    pub fn new(outbound: Outbound, settings: &DialogueSettings, voice: Option<String>) -> Self {
        Self {
            outbound,
            rate: settings.speech_rate,
            voice,
            lang: settings.language().to_string(),
        }
    }
}

impl SpeechOutput for BrowserSpeechOutput {
    fn speak(&mut self, turn: u64, text: &str) -> Result<(), PortError> {
        push(
            &self.outbound,
            ServerMessage::Speak {
                turn,
                text: text.to_string(),
                rate: self.rate,
                voice: self.voice.clone(),
                lang: self.lang.clone(),
            },
        )
    }

    fn cancel(&mut self) {
        let _ = push(&self.outbound, ServerMessage::CancelSpeech);
    }
}

/// Speech recognition in the browser.
pub struct BrowserSpeechInput {
    outbound: Outbound,
    supported: bool,
    lang: String,
}

impl BrowserSpeechInput {
    pub fn new(outbound: Outbound, supported: bool, settings: &DialogueSettings) -> Self {
        Self {
            outbound,
            supported,
            lang: settings.language().to_string(),
        }
    }
}

impl SpeechInput for BrowserSpeechInput {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn start(&mut self, turn: u64) -> Result<(), PortError> {
        push(
            &self.outbound,
            ServerMessage::StartListening {
                turn,
                lang: self.lang.clone(),
            },
        )
    }

    fn stop(&mut self) {
        let _ = push(&self.outbound, ServerMessage::StopListening);
    }
}

/// The avatar video on the call screen.
pub struct BrowserCue {
    outbound: Outbound,
}

impl BrowserCue {
    pub fn new(outbound: Outbound) -> Self {
        Self { outbound }
    }
}

impl PresentationCue for BrowserCue {
    fn set_state(&mut self, state: CueState) -> Result<(), PortError> {
        push(&self.outbound, ServerMessage::Cue { state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_output_sends_configured_voice_and_rate() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let settings = DialogueSettings::default();
        let mut output = BrowserSpeechOutput::new(tx, &settings, Some("Zira Female".into()));

        output.speak(7, "Why this role?").unwrap();
        output.cancel();

        assert_eq!(
            rx.try_recv().unwrap(),
            ServerMessage::Speak {
                turn: 7,
                text: "Why this role?".into(),
                rate: 0.9,
                voice: Some("Zira Female".into()),
                lang: "en-US".into(),
            }
        );
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::CancelSpeech);
    }

    #[test]
    fn test_ports_report_closed_connection() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let settings = DialogueSettings::default();

        let mut output = BrowserSpeechOutput::new(tx.clone(), &settings, None);
        assert!(output.speak(1, "Hello").is_err());

        let mut input = BrowserSpeechInput::new(tx.clone(), true, &settings);
        assert!(input.is_supported());
        assert!(input.start(2).is_err());
        input.stop();

        let mut cue = BrowserCue::new(tx);
        assert!(cue.set_state(CueState::Ended).is_err());
    }
}
