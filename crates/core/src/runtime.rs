//! Async driver for a [`DialogueController`].
//!
//! The runtime is the session's single thread of control: it owns the
//! controller, feeds it engine events in arrival order, turns settle requests
//! into tokio timers, and gives a caller's cancel signal priority over
//! everything else.

use crate::{
    DialogueEvent,
    dialogue::{DialogueController, SessionEnd, SessionOutcome},
    ports::EventSink,
};
use std::sync::Arc;
use tokio::{
    sync::{Notify, mpsc},
    time::{Instant, sleep_until},
};
use tracing::{info, instrument, warn};

/// Creates the channel that connects port adapters to a runtime.
pub fn event_channel() -> (EventSink, mpsc::UnboundedReceiver<DialogueEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink::new(tx), rx)
}

/// Ends a running session from outside, e.g. when the candidate hangs up.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.notify.notify_one();
    }
}

pub struct DialogueRuntime {
    controller: DialogueController,
    events: mpsc::UnboundedReceiver<DialogueEvent>,
    cancel: Arc<Notify>,
}

impl DialogueRuntime {
    pub fn new(
        controller: DialogueController,
        events: mpsc::UnboundedReceiver<DialogueEvent>,
    ) -> (Self, CancelHandle) {
        let notify = Arc::new(Notify::new());
        let handle = CancelHandle {
            notify: notify.clone(),
        };
        (
            Self {
                controller,
                events,
                cancel: notify,
            },
            handle,
        )
    }

    /// Runs the session to completion and returns what was captured.
    #[instrument(name = "dialogue_runtime", skip_all)]
    pub async fn run(mut self) -> SessionOutcome {
        // Generation and deadline of the one settle timer that can be pending.
        let mut settle: Option<(u64, Instant)> = None;

        loop {
            if let Some(request) = self.controller.take_settle_request() {
                settle = Some((request.generation, Instant::now() + request.delay));
            }
            if self.controller.is_finished() {
                break;
            }
            let deadline = settle.map(|(_, at)| at);

            tokio::select! {
                biased;

                _ = self.cancel.notified() => self.controller.cancel(),

                event = self.events.recv() => match event {
                    Some(event) => self.controller.handle(event),
                    None => {
                        warn!("All event sources are gone; ending the session.");
                        self.controller.cancel();
                    }
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some((generation, _)) = settle.take() {
                        self.controller.handle(DialogueEvent::SettleElapsed { generation });
                    }
                }
            }
        }

        let outcome = self.controller.outcome().unwrap_or_else(|| SessionOutcome {
            conversation: self.controller.conversation().to_vec(),
            end: SessionEnd::Cancelled,
        });
        info!(
            answers = outcome.conversation.len(),
            end = ?outcome.end,
            "Dialogue runtime finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dialogue::{DialogueError, SessionUpdate, Status},
        ports::{NoopCue, PortError, SpeechInput, SpeechOutput},
        questions::QuestionList,
        settings::DialogueSettings,
    };
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Finishes every utterance as soon as it is requested.
    struct InstantVoice {
        sink: EventSink,
        spoken: Arc<Mutex<Vec<String>>>,
    }

    impl SpeechOutput for InstantVoice {
        fn speak(&mut self, turn: u64, text: &str) -> Result<(), PortError> {
            self.spoken.lock().unwrap().push(text.to_string());
            self.sink.send(DialogueEvent::SpeechFinished { turn });
            Ok(())
        }

        fn cancel(&mut self) {}
    }

    /// Answers each listen with the next scripted reply, or stays silent.
    struct ScriptedEar {
        sink: EventSink,
        answers: VecDeque<String>,
        supported: bool,
        stops: Arc<Mutex<usize>>,
    }

    impl SpeechInput for ScriptedEar {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn start(&mut self, turn: u64) -> Result<(), PortError> {
            if let Some(answer) = self.answers.pop_front() {
                let first_word = answer.split_whitespace().next().unwrap_or_default();
                self.sink.send(DialogueEvent::PartialTranscript {
                    turn,
                    text: first_word.to_string(),
                });
                self.sink.send(DialogueEvent::FinalTranscript { turn, text: answer });
            }
            Ok(())
        }

        fn stop(&mut self) {
            *self.stops.lock().unwrap() += 1;
        }
    }

    struct Fixture {
        runtime: DialogueRuntime,
        cancel: CancelHandle,
        spoken: Arc<Mutex<Vec<String>>>,
        stops: Arc<Mutex<usize>>,
        updates: mpsc::UnboundedReceiver<SessionUpdate>,
    }

    fn fixture(settings: DialogueSettings, answers: &[&str], supported: bool) -> Fixture {
        let (sink, events) = event_channel();
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let stops = Arc::new(Mutex::new(0));
        let (updates_tx, updates) = mpsc::unbounded_channel();
        let mut controller = DialogueController::new(
            settings,
            Box::new(InstantVoice {
                sink: sink.clone(),
                spoken: spoken.clone(),
            }),
            Box::new(ScriptedEar {
                sink: sink.clone(),
                answers: answers.iter().map(|a| a.to_string()).collect(),
                supported,
                stops: stops.clone(),
            }),
            Box::new(NoopCue),
        )
        .with_updates(updates_tx);
        let _ = controller.start(QuestionList::new(["Tell me about yourself.", "Why this role?"]));
        let (runtime, cancel) = DialogueRuntime::new(controller, events);
        Fixture {
            runtime,
            cancel,
            spoken,
            stops,
            updates,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_completes_scripted_interview_with_settle_delays() {
        let f = fixture(
            DialogueSettings::default(),
            &["I have five years experience", "I value growth"],
            true,
        );
        let started = Instant::now();

        let outcome = f.runtime.run().await;

        assert_eq!(outcome.end, SessionEnd::Completed);
        assert_eq!(outcome.conversation.len(), 2);
        assert_eq!(outcome.conversation[0].answer, "I have five years experience");
        assert_eq!(outcome.conversation[1].question, "Why this role?");
        assert_eq!(outcome.conversation[1].answer, "I value growth");
        // Two settles after speech plus two after answers.
        assert!(started.elapsed() >= Duration::from_secs(8));
        assert_eq!(f.spoken.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_runtime_fails_immediately_without_recognition() {
        let f = fixture(DialogueSettings::immediate(), &[], false);
        let outcome = f.runtime.run().await;
        assert_eq!(
            outcome.end,
            SessionEnd::Failed(DialogueError::CapabilityUnavailable)
        );
        assert!(outcome.conversation.is_empty());
        assert!(f.spoken.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_while_listening_stops_recognition() {
        // One scripted answer: the second question is left hanging in Listening.
        let mut f = fixture(DialogueSettings::immediate(), &["A1"], true);
        let task = tokio::spawn(f.runtime.run());

        let mut listening_seen = 0;
        while let Some(update) = f.updates.recv().await {
            if update == SessionUpdate::Status(Status::Listening) {
                listening_seen += 1;
                if listening_seen == 2 {
                    break;
                }
            }
        }
        let stops_before = *f.stops.lock().unwrap();
        f.cancel.cancel();

        let outcome = task.await.expect("runtime task panicked");
        assert_eq!(outcome.end, SessionEnd::Cancelled);
        assert_eq!(outcome.conversation.len(), 1);
        assert!(*f.stops.lock().unwrap() > stops_before);
    }

    #[tokio::test]
    async fn test_cancel_before_any_event_wins() {
        let f = fixture(DialogueSettings::immediate(), &["A1", "A2"], true);
        f.cancel.cancel();
        let outcome = f.runtime.run().await;
        assert_eq!(outcome.end, SessionEnd::Cancelled);
        assert!(outcome.conversation.is_empty());
    }

    /// Accepts every request and never reports back.
    struct DeadEngine;

    impl SpeechOutput for DeadEngine {
        fn speak(&mut self, _turn: u64, _text: &str) -> Result<(), PortError> {
            Ok(())
        }

        fn cancel(&mut self) {}
    }

    impl SpeechInput for DeadEngine {
        fn is_supported(&self) -> bool {
            true
        }

        fn start(&mut self, _turn: u64) -> Result<(), PortError> {
            Ok(())
        }

        fn stop(&mut self) {}
    }

    #[tokio::test]
    async fn test_runtime_ends_when_event_sources_disappear() {
        let (sink, events) = event_channel();
        let mut controller = DialogueController::new(
            DialogueSettings::immediate(),
            Box::new(DeadEngine),
            Box::new(DeadEngine),
            Box::new(NoopCue),
        );
        controller.start(QuestionList::new(["Q1"])).unwrap();
        let (runtime, _cancel) = DialogueRuntime::new(controller, events);
        drop(sink);

        let outcome = runtime.run().await;
        assert_eq!(outcome.end, SessionEnd::Cancelled);
    }

    #[tokio::test]
    async fn test_runtime_waits_for_questions_event() {
        let (sink, events) = event_channel();
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let controller = DialogueController::new(
            DialogueSettings::immediate(),
            Box::new(InstantVoice {
                sink: sink.clone(),
                spoken: spoken.clone(),
            }),
            Box::new(ScriptedEar {
                sink: sink.clone(),
                answers: ["only answer".to_string()].into(),
                supported: true,
                stops: Arc::new(Mutex::new(0)),
            }),
            Box::new(NoopCue),
        );
        let (runtime, _cancel) = DialogueRuntime::new(controller, events);
        sink.send(DialogueEvent::QuestionsDelivered(
            "```json\n[\"Only question?\"]\n```".to_string(),
        ));

        let outcome = runtime.run().await;
        assert_eq!(outcome.end, SessionEnd::Completed);
        assert_eq!(outcome.conversation[0].question, "Only question?");
        assert_eq!(outcome.conversation[0].answer, "only answer");
        assert_eq!(spoken.lock().unwrap()[0], "Only question?");
    }
}
