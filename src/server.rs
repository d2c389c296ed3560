//! HTTP surface
//!
//! Serves two kinds of clients. Thin clients use the stateless routes
//! (`POST /proofread`, `POST /chat`) and get the whole answer in the
//! response body. Session clients drive the shared session through
//! `/session` and watch it over server-sent events, the same way the
//! terminal viewer does in-process.

use crate::config::Config;
use crate::error::{ErrorKind, Result, SuikouError};
use crate::history::proofreading_messages;
use crate::orchestrator::Orchestrator;
use crate::prompts::{original_text_context, CHAT_SYSTEM_PROMPT};
use crate::providers::{ChatRequest, ChatResponse, Message};
use crate::reset::{ResetEvent, ResetTrigger};
use crate::session::Turn;
use crate::store::SessionStore;
use crate::view::SessionView;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    orchestrator: Orchestrator,
    trigger: ResetTrigger,
}

impl AppState {
    /// State serving `orchestrator`'s store and provider
    pub fn new(orchestrator: Orchestrator) -> Self {
        let trigger = ResetTrigger::new(orchestrator.store().clone());
        Self {
            orchestrator,
            trigger,
        }
    }

    fn store(&self) -> Arc<dyn SessionStore> {
        self.orchestrator.store().clone()
    }
}

/// Body of `POST /proofread` and `POST /session`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofreadRequest {
    /// Text to proofread
    pub text: String,
}

/// Body of `POST /session/follow-up`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpRequest {
    /// Question about the rewrite
    pub message: String,
    /// Text the client believes is being proofread
    pub original_text: String,
    /// History the client last rendered
    #[serde(default)]
    pub history: Vec<Turn>,
}

/// Response to `POST /session/page`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageEventResponse {
    /// Whether the session was cleared
    pub cleared: bool,
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/proofread", post(proofread))
        .route("/chat", post(chat))
        .route(
            "/session",
            get(get_session).post(start_session).delete(delete_session),
        )
        .route("/session/follow-up", post(follow_up))
        .route("/session/page", post(page_event))
        .route("/session/events", get(session_events))
        .with_state(state)
}

/// Run the server until Ctrl-C
///
/// # Errors
///
/// Returns error if `bind` is not a socket address or cannot be bound
pub async fn serve(config: &Config, orchestrator: Orchestrator, bind: &str) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| SuikouError::Config(format!("Invalid bind address {}: {}", bind, e)))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        "Listening on http://{} (provider: {}, store: {:?})",
        listener.local_addr()?,
        config.provider.provider_type,
        config.store.backend
    );

    axum::serve(listener, router(AppState::new(orchestrator)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

fn status_for(err: &anyhow::Error) -> StatusCode {
    match SuikouError::kind_of(err) {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::ConcurrentRequest => StatusCode::CONFLICT,
        ErrorKind::Superseded => StatusCode::NOT_FOUND,
        ErrorKind::Generation | ErrorKind::Other => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: anyhow::Error) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    } else {
        tracing::debug!("Request rejected ({}): {}", status, err);
    }
    (status, Json(ChatResponse::failed(err.to_string()))).into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn generate_text(state: &AppState, messages: Vec<Message>) -> Response {
    let orchestrator = &state.orchestrator;
    let result = async {
        let generation = orchestrator
            .provider()
            .generate(&messages, orchestrator.options())
            .await?;
        generation.collect_text().await
    };
    match tokio::time::timeout(orchestrator.timeout(), result).await {
        Ok(Ok(text)) => Json(ChatResponse::ok(text.trim())).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(_) => error_response(
            SuikouError::Timeout {
                seconds: orchestrator.timeout().as_secs(),
            }
            .into(),
        ),
    }
}

async fn proofread(State(state): State<AppState>, Json(body): Json<ProofreadRequest>) -> Response {
    if body.text.trim().is_empty() {
        return error_response(SuikouError::Validation("text is required".to_string()).into());
    }
    generate_text(&state, proofreading_messages(&body.text)).await
}

async fn chat(State(state): State<AppState>, Json(body): Json<ChatRequest>) -> Response {
    if body.messages.is_empty() {
        return error_response(SuikouError::Validation("messages are required".to_string()).into());
    }
    let messages = match body.original_text {
        Some(original) => {
            let mut messages = vec![
                Message::system(CHAT_SYSTEM_PROMPT),
                Message::user(original_text_context(&original)),
            ];
            messages.extend(body.messages.into_iter().filter(|m| !m.is_system()));
            messages
        }
        None => body.messages,
    };
    generate_text(&state, messages).await
}

async fn get_session(State(state): State<AppState>) -> Response {
    match state.store().read().await {
        Ok(record) => Json(SessionView::from_record(record.as_ref())).into_response(),
        Err(e) => error_response(e),
    }
}

async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<ProofreadRequest>,
) -> Response {
    let request = match state.orchestrator.begin_proofreading(&body.text).await {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };
    let view = SessionView::from_record(Some(&request.record));
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator.complete(request).await;
    });
    (StatusCode::ACCEPTED, Json(view)).into_response()
}

async fn follow_up(State(state): State<AppState>, Json(body): Json<FollowUpRequest>) -> Response {
    let request = match state
        .orchestrator
        .begin_follow_up(&body.message, &body.history, &body.original_text)
        .await
    {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };
    let view = SessionView::from_record(Some(&request.record));
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator.complete(request).await;
    });
    (StatusCode::ACCEPTED, Json(view)).into_response()
}

async fn delete_session(State(state): State<AppState>) -> Response {
    match state.trigger.reset().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

async fn page_event(State(state): State<AppState>, Json(event): Json<ResetEvent>) -> Response {
    match state.trigger.on_event(event).await {
        Ok(cleared) => Json(PageEventResponse { cleared }).into_response(),
        Err(e) => error_response(e),
    }
}

async fn snapshot_event(store: Arc<dyn SessionStore>) -> std::result::Result<Event, axum::Error> {
    match store.read().await {
        Ok(record) => Event::default()
            .event("session")
            .json_data(SessionView::from_record(record.as_ref())),
        Err(e) => Ok(Event::default().event("error").data(e.to_string())),
    }
}

async fn session_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let store = state.store();
    // Subscribe before the first read so no write falls in between.
    let changes = store.subscribe().into_stream();
    let initial = stream::once(snapshot_event(store.clone()));
    let updates = changes.then(move |_| snapshot_event(store.clone()));

    Sse::new(initial.chain(updates)).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;
    use crate::store::MemoryStore;
    use crate::test_utils::{Script, ScriptedProvider};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(scripts: Vec<Script>) -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new(scripts));
        let orchestrator = Orchestrator::new(store.clone(), provider);
        (router(AppState::new(orchestrator)), store)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(vec![]);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_proofread_is_stateless() {
        let (app, store) = app(vec![Script::deltas(&["Fixed ", "text. "])]);
        let response = app
            .oneshot(json_request(
                "POST",
                "/proofread",
                serde_json::json!({"text": "teh text"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"success": true, "result": "Fixed text."})
        );
        assert!(store.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_proofread_empty_text_is_400() {
        let (app, _) = app(vec![]);
        let response = app
            .oneshot(json_request("POST", "/proofread", serde_json::json!({"text": " "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_chat_failure_is_500() {
        let (app, _) = app(vec![Script::Reject("model unavailable".to_string())]);
        let response = app
            .oneshot(json_request(
                "POST",
                "/chat",
                serde_json::json!({
                    "messages": [{"role": "user", "content": "why?"}],
                    "originalText": "orig"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_start_session_runs_in_background() {
        let (app, store) = app(vec![Script::deltas(&["Done"])]);
        let mut sub = store.subscribe();
        let response = app
            .oneshot(json_request("POST", "/session", serde_json::json!({"text": "orig"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["status"], "loading");

        loop {
            sub.changed().await.unwrap();
            let record = store.read().await.unwrap().unwrap();
            if record.status == SessionStatus::Complete {
                assert_eq!(record.result.as_deref(), Some("Done"));
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_follow_up_without_session_is_404() {
        let (app, _) = app(vec![]);
        let response = app
            .oneshot(json_request(
                "POST",
                "/session/follow-up",
                serde_json::json!({"message": "why?", "originalText": "orig"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_follow_up_while_streaming_is_409() {
        let (app, store) = app(vec![]);
        store
            .write(crate::session::SessionPatch::replace(
                crate::session::SessionRecord::new("orig"),
            ))
            .await
            .unwrap();
        let response = app
            .oneshot(json_request(
                "POST",
                "/session/follow-up",
                serde_json::json!({"message": "why?", "originalText": "orig"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_page_event_and_delete_clear_session() {
        let (app, store) = app(vec![]);
        store
            .write(crate::session::SessionPatch::replace(
                crate::session::SessionRecord::new("orig"),
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/session/page",
                serde_json::json!({"type": "pageUpdated", "status": "complete"}),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["cleared"], false);
        assert!(store.read().await.unwrap().is_some());

        let response = app
            .oneshot(
                Request::delete("/session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(store.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_session_idle() {
        let (app, _) = app(vec![]);
        let response = app
            .oneshot(Request::get("/session").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await["status"], "idle");
    }
}
