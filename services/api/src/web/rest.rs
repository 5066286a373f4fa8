//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use lingo_core::domain::{InputDraft, Language};
use lingo_core::error::bounded;
use lingo_core::ports::{ChatRole, ChatTurn};
use lingo_core::DEFAULT_MODEL;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        detect_language_handler,
        correct_handler,
        chat_handler,
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
    ),
    components(
        schemas(
            DetectLanguageRequest, DetectLanguageResponse,
            CorrectRequest, CorrectResponse,
            ChatRequest, ChatMessageBody, ChatResponse,
            ErrorResponse,
            crate::web::auth::SignupRequest, crate::web::auth::LoginRequest,
            crate::web::auth::AuthResponse,
        )
    ),
    tags(
        (name = "Lingo Tutor API", description = "Language detection, correction and tutor chat endpoints.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The body of every error response.
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

type HandlerResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

#[derive(Deserialize, ToSchema)]
pub struct DetectLanguageRequest {
    pub text: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct DetectLanguageResponse {
    /// One of english, spanish, french, german, italian, portuguese, or unknown.
    pub language: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CorrectRequest {
    pub text: String,
    /// Defaults to gpt-3.5-turbo.
    #[serde(default)]
    pub model: Option<String>,
    /// Defaults to english.
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct CorrectResponse {
    pub corrected: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ChatMessageBody {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessageBody>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ChatResponse {
    pub reply: String,
}

const UNKNOWN: &str = "unknown";

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Detect the language of a text.
///
/// Texts too short to classify answer "unknown" without calling the classifier.
#[utoipa::path(
    post,
    path = "/api/detect-language",
    request_body = DetectLanguageRequest,
    responses(
        (status = 200, description = "Detected language", body = DetectLanguageResponse),
        (status = 400, description = "No text provided", body = ErrorResponse),
        (status = 502, description = "Classifier unavailable", body = ErrorResponse)
    )
)]
pub async fn detect_language_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<DetectLanguageRequest>,
) -> HandlerResult<DetectLanguageResponse> {
    let draft = InputDraft::new(req.text);
    if draft.is_blank() {
        return Err(error_response(StatusCode::BAD_REQUEST, "No text provided"));
    }
    if !draft.has_signal() {
        return Ok(Json(DetectLanguageResponse {
            language: UNKNOWN.to_string(),
        }));
    }

    let detected = bounded(
        app_state.config.upstream_timeout,
        app_state.detector.detect(&draft.text),
    )
    .await
    .map_err(|e| {
        warn!("Language detection failed: {}", e);
        error_response(StatusCode::BAD_GATEWAY, e.to_string())
    })?;

    Ok(Json(DetectLanguageResponse {
        language: detected
            .map(|l| l.as_str().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string()),
    }))
}

/// Correct a text.
#[utoipa::path(
    post,
    path = "/api/correct",
    request_body = CorrectRequest,
    responses(
        (status = 200, description = "Corrected text", body = CorrectResponse),
        (status = 400, description = "No text provided or unknown language", body = ErrorResponse),
        (status = 502, description = "Corrector unavailable", body = ErrorResponse)
    )
)]
pub async fn correct_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<CorrectRequest>,
) -> HandlerResult<CorrectResponse> {
    if req.text.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "No text provided"));
    }
    let language = match req.language.as_deref() {
        Some(raw) => raw
            .parse::<Language>()
            .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?,
        None => Language::English,
    };
    let model = req
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let corrected = bounded(
        app_state.config.upstream_timeout,
        app_state.corrector.correct(&req.text, &model, language),
    )
    .await
    .map_err(|e| {
        warn!(%language, %model, "Correction failed: {}", e);
        error_response(StatusCode::BAD_GATEWAY, e.to_string())
    })?;
    info!(%language, %model, "Correction served.");

    Ok(Json(CorrectResponse {
        corrected: corrected.trim().to_string(),
    }))
}

/// Continue a tutor conversation.
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Tutor reply", body = ChatResponse),
        (status = 400, description = "No messages provided or unknown role", body = ErrorResponse),
        (status = 502, description = "Tutor unavailable", body = ErrorResponse)
    )
)]
pub async fn chat_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> HandlerResult<ChatResponse> {
    if req.messages.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "No messages provided"));
    }
    let turns = req
        .messages
        .into_iter()
        .map(|m| {
            let role = match m.role.as_str() {
                "user" => ChatRole::User,
                "assistant" => ChatRole::Assistant,
                other => {
                    return Err(error_response(
                        StatusCode::BAD_REQUEST,
                        format!("Unsupported role '{}'", other),
                    ))
                }
            };
            Ok(ChatTurn {
                role,
                content: m.content,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let reply = bounded(
        app_state.config.upstream_timeout,
        app_state.tutor.reply(
            &turns,
            req.system_prompt.as_deref(),
            req.model.as_deref().filter(|m| !m.trim().is_empty()),
        ),
    )
    .await
    .map_err(|e| {
        warn!("Tutor reply failed: {}", e);
        error_response(StatusCode::BAD_GATEWAY, e.to_string())
    })?;

    Ok(Json(ChatResponse { reply }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::test_support::{test_state, Fakes};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn detect_rejects_empty_text() {
        let (state, _) = test_state();
        let (status, body) = detect_language_handler(
            State(state),
            Json(DetectLanguageRequest { text: "   ".into() }),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "No text provided");
    }

    #[tokio::test]
    async fn detect_short_text_is_unknown_without_a_call() {
        let (state, fakes) = test_state();
        let Json(response) = detect_language_handler(
            State(state),
            Json(DetectLanguageRequest { text: "Hola amigo".into() }),
        )
        .await
        .unwrap();
        assert_eq!(response.language, "unknown");
        assert_eq!(fakes.detector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn detect_reports_the_classified_language() {
        let (state, fakes) = test_state();
        let Json(response) = detect_language_handler(
            State(state),
            Json(DetectLanguageRequest {
                text: "Me gusta mucho el cine y la pizza".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.language, "spanish");
        assert_eq!(fakes.detector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn correct_defaults_model_and_language() {
        let (state, fakes) = test_state();
        let Json(response) = correct_handler(
            State(state),
            Json(CorrectRequest {
                text: "I has a dog".into(),
                model: None,
                language: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.corrected, Fakes::CORRECTED);
        let calls = fakes.corrector.calls.lock().unwrap();
        assert_eq!(calls[0].1, "gpt-3.5-turbo");
        assert_eq!(calls[0].2, Language::English);
    }

    #[tokio::test]
    async fn correct_maps_failures_to_status_codes() {
        let (state, fakes) = test_state();
        let empty = correct_handler(
            State(state.clone()),
            Json(CorrectRequest { text: "".into(), model: None, language: None }),
        )
        .await
        .unwrap_err();
        assert_eq!(empty.0, StatusCode::BAD_REQUEST);

        let bad_language = correct_handler(
            State(state.clone()),
            Json(CorrectRequest {
                text: "Hallo".into(),
                model: None,
                language: Some("klingon".into()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(bad_language.0, StatusCode::BAD_REQUEST);

        fakes.corrector.failing.store(true, Ordering::SeqCst);
        let upstream = correct_handler(
            State(state),
            Json(CorrectRequest {
                text: "Hallo Welt".into(),
                model: Some("gpt-4o".into()),
                language: Some("german".into()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(upstream.0, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn chat_requires_messages_and_known_roles() {
        let (state, _) = test_state();
        let empty = chat_handler(
            State(state.clone()),
            Json(ChatRequest { messages: vec![], system_prompt: None, model: None }),
        )
        .await
        .unwrap_err();
        assert_eq!(empty.0, StatusCode::BAD_REQUEST);

        let bad_role = chat_handler(
            State(state),
            Json(ChatRequest {
                messages: vec![ChatMessageBody { role: "system".into(), content: "x".into() }],
                system_prompt: None,
                model: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(bad_role.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_forwards_prompt_and_model() {
        let (state, fakes) = test_state();
        let request: ChatRequest = serde_json::from_value(serde_json::json!({
            "messages": [
                {"role": "assistant", "content": "Here is why."},
                {"role": "user", "content": "And 'favorita'?"}
            ],
            "systemPrompt": "Be brief.",
            "model": "gpt-4o"
        }))
        .unwrap();

        let Json(response) = chat_handler(State(state), Json(request)).await.unwrap();

        assert_eq!(response.reply, "reply #1");
        let requests = fakes.tutor.requests.lock().unwrap();
        let (turns, prompt, model) = &requests[0];
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, ChatRole::Assistant);
        assert_eq!(prompt.as_deref(), Some("Be brief."));
        assert_eq!(model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn openapi_lists_every_endpoint() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/detect-language",
            "/api/correct",
            "/api/chat",
            "/auth/signup",
            "/auth/login",
            "/auth/logout",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }
}
