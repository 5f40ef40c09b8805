//! Manages the WebSocket connection lifecycle for one interview session.

use super::{
    ports::{BrowserCue, BrowserSpeechInput, BrowserSpeechOutput, Outbound},
    protocol::{ClientMessage, ServerMessage},
};
use crate::state::AppState;
use anyhow::{Result, anyhow};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use interview_core::{
    DialogueEvent,
    dialogue::{DialogueController, SessionEnd, SessionOutcome, SessionUpdate},
    ports::EventSink,
    runtime::{CancelHandle, DialogueRuntime, event_channel},
    voice::Voice,
};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, instrument, warn};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// What the client sent in its opening `start` message.
struct StartRequest {
    questions: String,
    speech_recognition_supported: bool,
    voices: Vec<Voice>,
}

fn parse_start(text: &str) -> Result<StartRequest> {
    match serde_json::from_str::<ClientMessage>(text)? {
        ClientMessage::Start {
            questions,
            speech_recognition_supported,
            voices,
        } => Ok(StartRequest {
            questions: questions.into_raw(),
            speech_recognition_supported,
            voices,
        }),
        _ => Err(anyhow!("First message must be `start`")),
    }
}

/// Main handler for an individual WebSocket connection.
///
/// The first message must be `start`. After that the connection carries engine
/// callbacks from the browser into the session's [`DialogueRuntime`] and port
/// commands back out, until the interview ends or the candidate hangs up.
#[instrument(name = "ws_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id: u32 = rand::random();
    tracing::Span::current().record("session_id", session_id);
    info!("New WebSocket connection. Awaiting `start`...");

    let (mut socket_tx, mut socket_rx) = socket.split();

    let start = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => parse_start(&text),
        Some(Ok(_)) => Err(anyhow!("First message was not a text `start` message.")),
        _ => {
            info!("Client disconnected before sending `start`.");
            return;
        }
    };
    let start = match start {
        Ok(start) => start,
        Err(e) => {
            error!("Session initialization failed: {:?}", e);
            let _ = send_msg(
                &mut socket_tx,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };

    // Ports and the update forwarder push here; one task owns the socket sink.
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_outbound(socket_tx, outbound_rx));

    let settings = state.config.dialogue_settings();
    let voice = settings
        .voice
        .select(&start.voices)
        .map(|voice| voice.name.clone());
    info!(
        voices = start.voices.len(),
        voice = ?voice,
        recognition = start.speech_recognition_supported,
        "Starting interview dialogue"
    );

    let (sink, events) = event_channel();
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let controller = DialogueController::new(
        settings.clone(),
        Box::new(BrowserSpeechOutput::new(outbound.clone(), &settings, voice)),
        Box::new(BrowserSpeechInput::new(
            outbound.clone(),
            start.speech_recognition_supported,
            &settings,
        )),
        Box::new(BrowserCue::new(outbound.clone())),
    )
    .with_updates(updates_tx);
    let forwarder = tokio::spawn(forward_updates(updates_rx, outbound.clone()));

    let (runtime, cancel) = DialogueRuntime::new(controller, events);
    let runtime_task = tokio::spawn(runtime.run());
    sink.send(DialogueEvent::QuestionsDelivered(start.questions));

    let outcome = drive_session(socket_rx, runtime_task, &sink, &cancel).await;
    info!(
        answers = outcome.conversation.len(),
        end = ?outcome.end,
        "Interview session finished"
    );

    // The controller is gone, so the forwarder drains and stops on its own.
    drop(sink);
    let _ = forwarder.await;
    let _ = outbound.send(ServerMessage::from(outcome));
    drop(outbound);
    if let Err(e) = writer.await {
        error!("Socket writer task failed: {:?}", e);
    }
    info!("WebSocket connection closed.");
}

/// Feeds client messages to the runtime until it returns the session outcome.
async fn drive_session(
    mut socket_rx: SplitStream<WebSocket>,
    mut runtime_task: JoinHandle<SessionOutcome>,
    sink: &EventSink,
    cancel: &CancelHandle,
) -> SessionOutcome {
    let mut client_gone = false;

    loop {
        tokio::select! {
            result = &mut runtime_task => {
                return result.unwrap_or_else(|e| {
                    error!("Dialogue runtime task failed: {:?}", e);
                    SessionOutcome {
                        conversation: Vec::new(),
                        end: SessionEnd::Cancelled,
                    }
                });
            }
            msg = socket_rx.next(), if !client_gone => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::EndCall) => {
                        info!("Candidate ended the call.");
                        cancel.cancel();
                    }
                    Ok(ClientMessage::Start { questions, .. }) => {
                        sink.send(DialogueEvent::QuestionsDelivered(questions.into_raw()));
                    }
                    Ok(msg) => {
                        debug!(?msg, "Client engine callback");
                        if let Some(event) = msg.into_event() {
                            sink.send(event);
                        }
                    }
                    Err(e) => warn!(error = %e, "Ignoring malformed client message."),
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client disconnected. Ending the session.");
                    client_gone = true;
                    cancel.cancel();
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Error receiving from client WebSocket: {:?}", e);
                    client_gone = true;
                    cancel.cancel();
                }
            },
        }
    }
}

/// Relays controller notifications to the client.
async fn forward_updates(
    mut updates: mpsc::UnboundedReceiver<SessionUpdate>,
    outbound: Outbound,
) {
    while let Some(update) = updates.recv().await {
        if let Some(msg) = ServerMessage::from_update(update) {
            if outbound.send(msg).is_err() {
                break;
            }
        }
    }
}

/// Owns the socket sink and writes queued messages in order.
async fn write_outbound(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
) {
    while let Some(msg) = outbound.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, msg).await {
            warn!("Failed to write to client WebSocket: {:?}", e);
            return;
        }
    }
    let _ = socket_tx.close().await;
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
