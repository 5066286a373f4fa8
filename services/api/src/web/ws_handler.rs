//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! One loop owns the connection's correction session: it applies client
//! commands and forwards detection updates as they happen.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::{AppState, Identity, StorageScope},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use lingo_core::domain::DetectionState;
use lingo_core::{CorrectionSession, OrchestratorError};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

const SAVE_NOTICE: &str =
    "Your progress is shown but could not be saved. It may be lost when you reload.";

type WsSender = SplitSink<WebSocket, Message>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, identity))
}

/// Serializes and sends one message. Returns `false` once the client is gone.
async fn send_message(sender: &mut WsSender, message: &ServerMessage) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(json.into())).await.is_ok()
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, identity: Identity) {
    info!(?identity, "New WebSocket connection established.");
    let (mut sender, mut receiver) = socket.split();

    // --- 1. Initialization Phase ---
    let device_id = match receiver.next().await {
        Some(Ok(Message::Text(init_json))) => match serde_json::from_str::<ClientMessage>(&init_json) {
            Ok(ClientMessage::Init { device_id }) => device_id,
            _ => {
                error!("First message was not a valid Init message.");
                let message = ServerMessage::Error {
                    message: "The first message must be init.".to_string(),
                };
                send_message(&mut sender, &message).await;
                return;
            }
        },
        _ => {
            error!("Client disconnected before sending Init message.");
            return;
        }
    };

    let scope = StorageScope::resolve(&identity, device_id);
    let storage = match app_state.storage_for(&scope) {
        Ok(storage) => storage,
        Err(e) => {
            error!("Failed to open storage: {:?}", e);
            let message = ServerMessage::Error {
                message: "Failed to load your saved data.".to_string(),
            };
            send_message(&mut sender, &message).await;
            return;
        }
    };

    let mut session = CorrectionSession::start(
        app_state.session_services(storage),
        app_state.config.orchestrator(),
        app_state.config.correction_model.clone(),
    )
    .await;

    let init_msg = ServerMessage::SessionInitialized {
        backend: session.storage_kind(),
        device_id: scope.device_id().map(str::to_string),
        progress: session.progress().await,
        auto_detect: session.auto_detect(),
        language: session.resolved_language(),
        model: session.model().to_string(),
    };
    if !send_message(&mut sender, &init_msg).await {
        error!("Failed to send session initialized message.");
        session.close();
        return;
    }

    // --- 2. Main Message Loop ---
    let mut detection_rx = session.subscribe_detection();
    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let replies = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => handle_client_message(&mut session, client_msg).await,
                        Err(e) => {
                            warn!("Failed to deserialize client message: {}", e);
                            vec![ServerMessage::Error {
                                message: "Unrecognised message.".to_string(),
                            }]
                        }
                    };
                    let mut delivered = true;
                    for reply in &replies {
                        if !send_message(&mut sender, reply).await {
                            delivered = false;
                            break;
                        }
                    }
                    if !delivered {
                        info!("Client went away while replies were pending.");
                        break;
                    }
                    if let Some(current) = settle_reported(&mut detection_rx, &replies) {
                        if !send_message(&mut sender, &detection_message(&session, &current)).await {
                            info!("Client disconnected.");
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    info!("Client sent close message.");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket receive failed: {}", e);
                    break;
                }
                None => {
                    info!("Client disconnected.");
                    break;
                }
            },
            changed = detection_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *detection_rx.borrow_and_update();
                if !send_message(&mut sender, &detection_message(&session, &state)).await {
                    info!("Client disconnected.");
                    break;
                }
            }
        }
    }

    // --- 3. Cleanup ---
    session.close();
    info!("WebSocket connection closed.");
}

fn detection_message(session: &CorrectionSession, state: &DetectionState) -> ServerMessage {
    ServerMessage::DetectionChanged {
        detection: state.detection,
        in_flight: state.in_flight,
        generation: state.generation,
        resolved_language: session.resolve_with(state),
    }
}

/// Marks the watched detection as seen when `replies` already reported it, so
/// the client is not sent the same state twice. Returns the current state if
/// it moved on after the reply was built.
fn settle_reported(
    detection_rx: &mut watch::Receiver<DetectionState>,
    replies: &[ServerMessage],
) -> Option<DetectionState> {
    let reported = replies.iter().rev().find_map(|reply| match reply {
        ServerMessage::DetectionChanged {
            detection,
            in_flight,
            generation,
            ..
        } => Some(DetectionState {
            detection: *detection,
            in_flight: *in_flight,
            generation: *generation,
        }),
        _ => None,
    })?;
    let current = *detection_rx.borrow_and_update();
    (current != reported).then_some(current)
}

fn error_message(e: &OrchestratorError) -> ServerMessage {
    let message = match e {
        OrchestratorError::Validation(reason) => reason.clone(),
        OrchestratorError::Upstream(_) => {
            "The AI service did not answer. Please try again.".to_string()
        }
        OrchestratorError::Persistence(_) => {
            "Your saved data could not be reached. Please try again.".to_string()
        }
    };
    ServerMessage::Error { message }
}

fn with_save_notice(mut replies: Vec<ServerMessage>, persisted: bool) -> Vec<ServerMessage> {
    if !persisted {
        replies.push(ServerMessage::Notice {
            message: SAVE_NOTICE.to_string(),
        });
    }
    replies
}

/// Applies one client command and returns the replies to send, in order.
async fn handle_client_message(
    session: &mut CorrectionSession,
    client_msg: ClientMessage,
) -> Vec<ServerMessage> {
    match client_msg {
        ClientMessage::Init { .. } => {
            warn!("Received subsequent Init message, which is ignored.");
            Vec::new()
        }
        ClientMessage::TextChanged { text } => {
            session.on_text_changed(text);
            Vec::new()
        }
        ClientMessage::SetAutoDetect { enabled } => {
            session.set_auto_detect(enabled);
            vec![detection_message(session, &session.detection())]
        }
        ClientMessage::SelectLanguage { language } => {
            session.choose_language(language);
            vec![detection_message(session, &session.detection())]
        }
        ClientMessage::SelectModel { model } => {
            if model.trim().is_empty() {
                return vec![ServerMessage::Error {
                    message: "Choose a model.".to_string(),
                }];
            }
            session.select_model(model.trim());
            Vec::new()
        }
        ClientMessage::Correct => match session.correct().await {
            Ok(outcome) => with_save_notice(
                vec![ServerMessage::CorrectionReady {
                    session_id: outcome.session.as_ref().map(|s| s.id),
                    result: outcome.result,
                    reward: outcome.reward,
                    progress: outcome.progress,
                }],
                outcome.persisted,
            ),
            Err(e) => vec![error_message(&e)],
        },
        ClientMessage::OpenExplanation { corrected_text } => {
            match session.open_explanation(corrected_text.as_deref()).await {
                Ok(opened) => with_save_notice(
                    vec![ServerMessage::ExplanationOpened {
                        session: opened.value,
                    }],
                    opened.persisted,
                ),
                Err(e) => vec![error_message(&e)],
            }
        }
        ClientMessage::SendChatMessage { text } => match session.send_chat_message(&text).await {
            Ok(reply) => with_save_notice(
                vec![ServerMessage::TutorReply {
                    message: reply.value,
                }],
                reply.persisted,
            ),
            Err(e) => vec![error_message(&e)],
        },
        ClientMessage::CreateLesson => match session.create_lesson().await {
            Ok(outcome) => with_save_notice(
                vec![ServerMessage::LessonCreated {
                    lesson: outcome.lesson,
                    progress: outcome.progress,
                }],
                outcome.persisted,
            ),
            Err(e) => vec![error_message(&e)],
        },
        ClientMessage::ListLessons => match session.list_lessons().await {
            Ok(lessons) => vec![ServerMessage::Lessons { lessons }],
            Err(e) => vec![error_message(&e)],
        },
        ClientMessage::DeleteLesson { lesson_id } => match session.delete_lesson(lesson_id).await {
            Ok(()) => vec![ServerMessage::LessonDeleted { lesson_id }],
            Err(e) => vec![error_message(&e)],
        },
        ClientMessage::ListSessions => match session.list_sessions().await {
            Ok(sessions) => vec![ServerMessage::Sessions { sessions }],
            Err(e) => vec![error_message(&e)],
        },
    }
}
