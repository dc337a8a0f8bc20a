//! REST API server for the conversational agent
//!
//! Two caller shapes reach the same orchestrator: the chat UI posts a
//! question (optionally with its message history) and gets the answer
//! envelope back; voice platforms post a tool-call list and get a
//! `results` array keyed by their call ids. The answer text is produced
//! identically either way.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::models::{AgentRequest, AnswerMode};
use crate::workflow::Orchestrator;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentApiRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub agent_persona_id: Option<String>,
    #[serde(default)]
    pub current_page: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct VoiceApiRequest {
    #[serde(default)]
    pub message: Option<VoiceMessage>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VoiceMessage {
    #[serde(default, rename = "toolCallList")]
    pub tool_call_list: Vec<VoiceToolCall>,
}

#[derive(Debug, Deserialize)]
pub struct VoiceToolCall {
    pub id: String,
    #[serde(default)]
    pub function: Option<VoiceFunction>,
}

#[derive(Debug, Deserialize)]
pub struct VoiceFunction {
    #[serde(default)]
    pub arguments: Value,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// =============================
/// Helpers
/// =============================

fn parse_mode(mode: Option<&str>) -> AnswerMode {
    match mode.map(|m| m.to_lowercase()).as_deref() {
        Some("voice") => AnswerMode::Voice,
        Some("hybrid") => AnswerMode::Hybrid,
        _ => AnswerMode::Text,
    }
}

/// Reduce a chat transcript to the current question plus prior turns.
fn question_and_history(req: &AgentApiRequest) -> Option<(String, Vec<String>)> {
    if let Some(question) = req.question.as_ref().filter(|q| !q.trim().is_empty()) {
        let history = req.messages.iter().map(|m| m.content.clone()).collect();
        return Some((question.clone(), history));
    }

    let last_user = req.messages.iter().rposition(|m| m.role == "user")?;
    let question = req.messages[last_user].content.clone();
    let history = req.messages[..last_user]
        .iter()
        .map(|m| m.content.clone())
        .collect();
    Some((question, history))
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

async fn agent_handler(
    State(state): State<ApiState>,
    Json(req): Json<AgentApiRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let Some((question, history)) = question_and_history(&req) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("No question or user message found".into())),
        );
    };

    let request = AgentRequest {
        question,
        user_id: req.user_id.unwrap_or_else(|| "anonymous".to_string()),
        persona_id: req.agent_persona_id.unwrap_or_else(|| "default".to_string()),
        current_page: req.current_page.unwrap_or_default(),
        mode: parse_mode(req.mode.as_deref()),
        history,
    };

    info!(user_id = %request.user_id, mode = %request.mode, "Received agent request");

    let answer = state.orchestrator.handle(request).await;

    let mut data = json!({ "answer": answer.answer });
    if let Some(short) = answer.short_answer {
        data["shortAnswer"] = json!(short);
    }

    (StatusCode::OK, Json(ApiResponse::success(data)))
}

/// =============================
/// Voice Endpoint
/// =============================

async fn voice_handler(
    State(state): State<ApiState>,
    Json(req): Json<VoiceApiRequest>,
) -> (StatusCode, Json<Value>) {
    let calls = req
        .message
        .as_ref()
        .map(|m| m.tool_call_list.as_slice())
        .unwrap_or_default();

    // Tool-call envelope: one result per call id.
    if !calls.is_empty() {
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            let args = call
                .function
                .as_ref()
                .map(|f| f.arguments.clone())
                .unwrap_or(Value::Null);

            let question = args
                .get("question")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let user_id = args
                .get("userId")
                .and_then(Value::as_str)
                .unwrap_or("anonymous")
                .to_string();

            let answer = state
                .orchestrator
                .handle(AgentRequest::new(question, user_id, AnswerMode::Voice))
                .await;

            results.push(json!({
                "toolCallId": call.id,
                "result": answer.answer,
            }));
        }

        return (StatusCode::OK, Json(json!({ "results": results })));
    }

    // Bare form: single question, single result.
    let question = req.question.unwrap_or_default();
    let user_id = req.user_id.unwrap_or_else(|| "anonymous".to_string());

    let answer = state
        .orchestrator
        .handle(AgentRequest::new(question, user_id, AnswerMode::Voice))
        .await;

    (StatusCode::OK, Json(json!({ "result": answer.answer })))
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", axum::routing::get(health))
        .route("/api/agent", post(agent_handler))
        .route("/api/voice", post(voice_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use crate::store::InMemoryRecordStore;

    fn test_state() -> ApiState {
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(ScriptedLlm::canned("Here you go.")),
        ));
        ApiState { orchestrator }
    }

    #[test]
    fn test_question_and_history_from_messages() {
        let req: AgentApiRequest = serde_json::from_value(json!({
            "userId": "u-1",
            "messages": [
                {"role": "user", "content": "first"},
                {"role": "assistant", "content": "reply"},
                {"role": "user", "content": "second"}
            ]
        }))
        .unwrap();

        let (question, history) = question_and_history(&req).unwrap();
        assert_eq!(question, "second");
        assert_eq!(history, vec!["first".to_string(), "reply".to_string()]);
    }

    #[test]
    fn test_explicit_question_wins_over_messages() {
        let req: AgentApiRequest = serde_json::from_value(json!({
            "question": "What's my balance?",
            "userId": "u-1",
            "messages": [{"role": "user", "content": "older turn"}]
        }))
        .unwrap();

        let (question, history) = question_and_history(&req).unwrap();
        assert_eq!(question, "What's my balance?");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(parse_mode(Some("voice")), AnswerMode::Voice);
        assert_eq!(parse_mode(Some("HYBRID")), AnswerMode::Hybrid);
        assert_eq!(parse_mode(Some("text")), AnswerMode::Text);
        assert_eq!(parse_mode(None), AnswerMode::Text);
    }

    #[tokio::test]
    async fn test_voice_tool_call_envelope() {
        let req: VoiceApiRequest = serde_json::from_value(json!({
            "message": {
                "toolCallList": [
                    {
                        "id": "call-1",
                        "function": {
                            "arguments": {"question": "What's my balance?", "userId": "u-1"}
                        }
                    }
                ]
            }
        }))
        .unwrap();

        let (status, Json(body)) = voice_handler(State(test_state()), Json(req)).await;
        assert_eq!(status, StatusCode::OK);

        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["toolCallId"], "call-1");
        assert_eq!(results[0]["result"], "Here you go.");
    }

    #[tokio::test]
    async fn test_voice_bare_envelope() {
        let req: VoiceApiRequest = serde_json::from_value(json!({
            "question": "What's my balance?",
            "userId": "u-1"
        }))
        .unwrap();

        let (status, Json(body)) = voice_handler(State(test_state()), Json(req)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], "Here you go.");
        assert!(body.get("results").is_none());
    }

    #[tokio::test]
    async fn test_agent_handler_rejects_empty_request() {
        let req: AgentApiRequest = serde_json::from_value(json!({"userId": "u-1"})).unwrap();

        let (status, Json(body)) = agent_handler(State(test_state()), Json(req)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
    }

    #[tokio::test]
    async fn test_agent_handler_hybrid_includes_short_answer() {
        let req: AgentApiRequest = serde_json::from_value(json!({
            "question": "What's my balance?",
            "userId": "u-1",
            "mode": "hybrid"
        }))
        .unwrap();

        let (status, Json(body)) = agent_handler(State(test_state()), Json(req)).await;
        assert_eq!(status, StatusCode::OK);
        let data = body.data.unwrap();
        assert_eq!(data["answer"], "Here you go.");
        assert_eq!(data["shortAnswer"], "Here you go.");
    }
}
