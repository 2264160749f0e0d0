//! Router assembly: study pages, JSON API, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - study pages (consent → tutorial → evaluation → survey → prize → complete)
/// - JSON API under `/api/...`, admin calls under `/api/admin/...`
/// - static assets from `static_dir`
/// - CORS (allow any origin/method/headers) and per-request trace spans
pub fn build_router(state: Arc<AppState>) -> Router {
    let pages = &state.cfg.pages_dir;
    let page = |name: &str| ServeFile::new(pages.join(name));
    let static_service = ServeDir::new(&state.cfg.static_dir);

    Router::new()
        // Pages
        .route_service("/", page("consent.html"))
        .route_service("/consent", page("consent.html"))
        .route_service("/tutorial", page("tutorial.html"))
        .route_service("/evaluation", page("evaluation.html"))
        .route_service("/survey", page("survey.html"))
        .route_service("/prize", page("prize.html"))
        .route_service("/complete", page("complete.html"))
        // Participant API
        .route("/api/health", get(http::http_health))
        .route("/api/consent", get(http::http_get_consent))
        .route("/api/get_or_create_uuid", get(http::http_get_or_create_uuid).post(http::http_get_or_create_uuid))
        .route("/api/assign_batches", post(http::http_post_assign_batches))
        .route("/api/get_requirements", get(http::http_get_requirements))
        .route("/api/submit_nfr_feedback", post(http::http_post_nfr_feedback))
        .route("/api/submit_batch_feedback", post(http::http_post_batch_feedback))
        .route("/api/submit_gate", post(http::http_post_gate))
        .route("/api/ask_chatbot", post(http::http_post_ask_chatbot))
        .route("/api/load_chat_history", post(http::http_post_load_chat_history))
        .route("/api/submit_survey", post(http::http_post_survey))
        .route("/api/submit_demographics", post(http::http_post_demographics))
        .route("/api/submit_prize", post(http::http_post_prize))
        // Admin API (password in body)
        .route("/api/admin/data", post(http::http_post_admin_data))
        .route("/api/admin/clear", post(http::http_post_admin_clear))
        .route("/api/admin/forced_nfrs", post(http::http_post_admin_forced))
        .route("/api/admin/chat_timing", post(http::http_post_admin_chat_timing))
        // State + CORS + HTTP tracing
        .with_state(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::agent::{AgentBackend, AgentError};
    use crate::config::{AllocationMode, StudyConfig};
    use crate::domain::Requirement;

    const PASSWORD: &str = "s3cret";

    #[derive(Default)]
    struct StubAgent {
        created: AtomicUsize,
        fail_send: bool,
    }

    #[async_trait]
    impl AgentBackend for StubAgent {
        async fn create_session(&self, _initial_prompt: Option<&str>) -> Result<String, AgentError> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            Ok(format!("agent-session-{n}"))
        }

        async fn send(&self, session_id: &str, message: &str) -> Result<String, AgentError> {
            if self.fail_send {
                return Err(AgentError::Failed { op: "ask agent", stderr: "quota exceeded".into() });
            }
            Ok(format!("[{session_id}] echo: {message}"))
        }
    }

    fn write_requirements(dir: &Path, n: u32) {
        let reqs: Vec<Requirement> = (1..=n)
            .map(|id| Requirement { id, title: format!("§ {id}"), description: format!("The system shall {id}.") })
            .collect();
        let paged: Vec<Vec<Requirement>> = reqs.chunks(10).map(<[Requirement]>::to_vec).collect();
        std::fs::write(dir.join("NFR.json"), serde_json::to_string(&paged).unwrap()).unwrap();
    }

    fn config(dir: &Path) -> StudyConfig {
        let mut cfg = StudyConfig::default();
        cfg.data_dir = dir.join("responses");
        cfg.requirements_path = dir.join("NFR.json");
        cfg.pages_dir = dir.join("pages");
        cfg.consent_dir = dir.join("consent_forms");
        cfg.static_dir = dir.join("static");
        cfg.agent.instruction_prompt_path = dir.join("instruction_prompt.txt");
        cfg.admin_password = Some(PASSWORD.into());
        cfg
    }

    fn app_with(cfg: StudyConfig, agent: Arc<StubAgent>) -> (Router, Arc<AppState>) {
        let state = Arc::new(AppState::with_agent(cfg, agent).unwrap());
        (build_router(state.clone()), state)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn end_to_end_assign_fetch_submit_export() {
        let dir = tempfile::tempdir().unwrap();
        write_requirements(dir.path(), 35);
        let (app, _) = app_with(config(dir.path()), Arc::new(StubAgent::default()));

        let (_, created) = call(&app, "GET", "/api/get_or_create_uuid", None).await;
        let uuid = created["uuid"].as_str().unwrap().to_string();
        assert_eq!(uuid.len(), 36);

        let (status, assigned) = call(&app, "POST", "/api/assign_batches", Some(json!({"uuid": uuid}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(assigned["batches"], json!([1, 2, 3]));

        let (status, batch) = call(&app, "GET", &format!("/api/get_requirements?batch=1&uuid={uuid}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(batch["nfrs"].as_array().unwrap().len(), 10);
        assert_eq!(batch["total_batches"], 4);
        assert_eq!(batch["total_nfrs"], 35);
        assert_eq!(batch["participant_index"], 0);
        assert_eq!(batch["forced_nfrs"].as_array().unwrap().len(), 2);
        assert!(batch["peer_required"]["q1"].as_array().unwrap().is_empty());
        assert!(batch["gate_nfr"].is_u64());

        let fb = json!({"uuid": uuid, "nfr_id": 4, "batch": 1, "q1_agreement": "agree"});
        let (status, out) = call(&app, "POST", "/api/submit_nfr_feedback", Some(fb)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(out, json!({"status": "success", "nfr_id": 4}));

        let (status, dump) = call(&app, "POST", "/api/admin/data", Some(json!({"password": PASSWORD}))).await;
        assert_eq!(status, StatusCode::OK);
        let entries = dump["data"]["nfr_responses"][&uuid].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["nfr_id"], 4);
        assert_eq!(dump["data"]["batch_assignments"][&uuid]["batches"], json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn resubmitting_feedback_replaces_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        write_requirements(dir.path(), 10);
        let (app, _) = app_with(config(dir.path()), Arc::new(StubAgent::default()));

        for verdict in ["agree", "disagree"] {
            let fb = json!({"uuid": "p1", "nfr_id": 2, "batch": 1, "q1_agreement": verdict});
            call(&app, "POST", "/api/submit_nfr_feedback", Some(fb)).await;
        }
        let other = json!({"uuid": "p1", "nfr_id": 3, "batch": 1});
        call(&app, "POST", "/api/submit_nfr_feedback", Some(other)).await;

        let (_, dump) = call(&app, "POST", "/api/admin/data", Some(json!({"password": PASSWORD}))).await;
        let entries = dump["data"]["nfr_responses"]["p1"].as_array().unwrap();
        let for_two: Vec<&Value> = entries.iter().filter(|e| e["nfr_id"] == 2).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(for_two.len(), 1);
        assert_eq!(for_two[0]["q1_agreement"], "disagree");
    }

    #[tokio::test]
    async fn batch_submission_replaces_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        write_requirements(dir.path(), 20);
        let (app, _) = app_with(config(dir.path()), Arc::new(StubAgent::default()));

        let first = json!([
            {"uuid": "p1", "nfr_id": 1, "batch": 1},
            {"uuid": "p1", "nfr_id": 2, "batch": 1},
        ]);
        call(&app, "POST", "/api/submit_batch_feedback", Some(first)).await;
        call(&app, "POST", "/api/submit_nfr_feedback", Some(json!({"uuid": "p1", "nfr_id": 11, "batch": 2}))).await;
        let second = json!([{"uuid": "p1", "nfr_id": 3, "batch": 1}]);
        let (status, out) = call(&app, "POST", "/api/submit_nfr_feedback", Some(second)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(out["count"], 1);

        let (_, dump) = call(&app, "POST", "/api/admin/data", Some(json!({"password": PASSWORD}))).await;
        let ids: Vec<u64> =
            dump["data"]["nfr_responses"]["p1"].as_array().unwrap().iter().map(|e| e["nfr_id"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![11, 3]);

        let (status, _) = call(&app, "POST", "/api/submit_batch_feedback", Some(json!({"uuid": "p1"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, "POST", "/api/submit_batch_feedback", Some(json!([]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn feedback_without_uuid_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_requirements(dir.path(), 10);
        let (app, _) = app_with(config(dir.path()), Arc::new(StubAgent::default()));
        let (status, out) = call(&app, "POST", "/api/submit_nfr_feedback", Some(json!({"nfr_id": 1, "batch": 1}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(out, json!({"status": "error", "message": "UUID is required"}));
    }

    #[tokio::test]
    async fn second_participant_gets_peer_required_items() {
        let dir = tempfile::tempdir().unwrap();
        write_requirements(dir.path(), 30);
        let mut cfg = config(dir.path());
        cfg.study.allocation = AllocationMode::Greedy;
        let (app, _) = app_with(cfg, Arc::new(StubAgent::default()));

        call(&app, "POST", "/api/assign_batches", Some(json!({"uuid": "first"}))).await;
        let (_, second) = call(&app, "POST", "/api/assign_batches", Some(json!({"uuid": "second"}))).await;
        assert_eq!(second["batches"], json!([1, 2, 3]));
        let (_, third) = call(&app, "POST", "/api/assign_batches", Some(json!({"uuid": "third"}))).await;
        assert_eq!(third["batches"], json!([1, 2, 3]), "only three batches exist, so slots refill from the start");

        let fb = json!([
            {"uuid": "first", "nfr_id": 5, "batch": 1, "q2_agreement": "disagree", "q2_own_assessment": "  "},
            {"uuid": "first", "nfr_id": 6, "batch": 1, "q2_agreement": "disagree", "q2_own_assessment": "covered by TLS"},
        ]);
        call(&app, "POST", "/api/submit_batch_feedback", Some(fb)).await;

        let (_, plan) = call(&app, "GET", "/api/get_requirements?batch=1&uuid=second", None).await;
        assert_eq!(plan["participant_index"], 1);
        assert_eq!(plan["peer_required"]["q2"], json!([5]));
        assert_eq!(plan["peer_required"]["q1"], json!([]));

        let (_, first_plan) = call(&app, "GET", "/api/get_requirements?batch=1&uuid=first", None).await;
        assert_eq!(first_plan["participant_index"], 0);
        assert_eq!(first_plan["peer_required"]["q2"], json!([]));
    }

    #[tokio::test]
    async fn forced_override_replaces_sample() {
        let dir = tempfile::tempdir().unwrap();
        write_requirements(dir.path(), 10);
        let (app, _) = app_with(config(dir.path()), Arc::new(StubAgent::default()));
        call(&app, "POST", "/api/assign_batches", Some(json!({"uuid": "p"}))).await;

        let body = json!({"password": PASSWORD, "uuid": "p", "batch": 1, "nfr_ids": [7, 9, 1]});
        let (status, _) = call(&app, "POST", "/api/admin/forced_nfrs", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        let (_, plan) = call(&app, "GET", "/api/get_requirements?batch=1&uuid=p", None).await;
        assert_eq!(plan["forced_nfrs"], json!([7, 9, 1]));

        let bad = json!({"password": PASSWORD, "uuid": "p", "batch": 1, "nfr_ids": [42]});
        let (status, _) = call(&app, "POST", "/api/admin/forced_nfrs", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let clear = json!({"password": PASSWORD, "uuid": "p", "batch": 1, "nfr_ids": []});
        call(&app, "POST", "/api/admin/forced_nfrs", Some(clear)).await;
        let (_, plan) = call(&app, "GET", "/api/get_requirements?batch=1&uuid=p", None).await;
        assert_eq!(plan["forced_nfrs"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn gate_answers_are_validated_and_stored() {
        let dir = tempfile::tempdir().unwrap();
        write_requirements(dir.path(), 10);
        let (app, _) = app_with(config(dir.path()), Arc::new(StubAgent::default()));

        let (_, plan) = call(&app, "GET", "/api/get_requirements?batch=1&uuid=p", None).await;
        let gate = plan["gate_nfr"].as_u64().unwrap() as u32;
        let other = if gate == 1 { 2 } else { 1 };

        let (status, _) =
            call(&app, "POST", "/api/submit_gate", Some(json!({"uuid": "p", "batch": 1, "nfr_id": gate, "answer": " "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) =
            call(&app, "POST", "/api/submit_gate", Some(json!({"uuid": "p", "batch": 1, "nfr_id": 99, "answer": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, err) =
            call(&app, "POST", "/api/submit_gate", Some(json!({"uuid": "p", "batch": 1, "nfr_id": other, "answer": "x"})))
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["status"], "error");

        let body = json!({"uuid": "p", "batch": 1, "nfr_id": gate, "answer": "Audit logs exist in AuditDAO."});
        let (status, _) = call(&app, "POST", "/api/submit_gate", Some(body)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, dump) = call(&app, "POST", "/api/admin/data", Some(json!({"password": PASSWORD}))).await;
        assert_eq!(dump["data"]["gate_answers"]["p"]["1"]["answer"], "Audit logs exist in AuditDAO.");
        assert_eq!(dump["data"]["gate_answers"]["p"]["1"]["nfr_id"], gate);
    }

    #[tokio::test]
    async fn malformed_bodies_get_json_400() {
        let dir = tempfile::tempdir().unwrap();
        write_requirements(dir.path(), 10);
        let (app, _) = app_with(config(dir.path()), Arc::new(StubAgent::default()));

        let cases = [
            ("/api/submit_nfr_feedback", json!({"uuid": "p", "batch": 1, "q1_agreement": "agree"})),
            ("/api/submit_nfr_feedback", json!({"uuid": "p", "nfr_id": "3", "batch": 1})),
            ("/api/submit_gate", json!({"uuid": "p", "nfr_id": 3, "answer": "x"})),
            ("/api/ask_chatbot", json!({"uuid": "p", "message": 42})),
            ("/api/admin/forced_nfrs", json!({"password": PASSWORD, "batch": 1})),
        ];
        for (uri, body) in cases {
            let (status, err) = call(&app, "POST", uri, Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(err["status"], "error", "{uri}");
            assert!(err["message"].as_str().is_some_and(|m| !m.is_empty()), "{uri}");
        }

        // Not JSON at all.
        let req = Request::builder()
            .method("POST")
            .uri("/api/submit_gate")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let err: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(err["status"], "error");
    }

    #[tokio::test]
    async fn chatbot_creates_one_session_and_persists_transcript() {
        let dir = tempfile::tempdir().unwrap();
        write_requirements(dir.path(), 10);
        let agent = Arc::new(StubAgent::default());
        let (app, state) = app_with(config(dir.path()), agent.clone());

        let (status, first) = call(&app, "POST", "/api/ask_chatbot", Some(json!({"uuid": "p", "message": "where is auth?"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["response"], "[agent-session-0] echo: where is auth?");
        assert_eq!(first["uuid"], "p");
        call(&app, "POST", "/api/ask_chatbot", Some(json!({"uuid": "p", "message": "and logging?"}))).await;
        assert_eq!(agent.created.load(Ordering::SeqCst), 1);

        // Drop the cached session: the persisted link is resumed, not recreated.
        state.sessions.evict("p").await;
        let (_, third) = call(&app, "POST", "/api/ask_chatbot", Some(json!({"uuid": "p", "message": "ok"}))).await;
        assert_eq!(third["response"], "[agent-session-0] echo: ok");
        assert_eq!(agent.created.load(Ordering::SeqCst), 1);

        let (_, history) = call(&app, "POST", "/api/load_chat_history", Some(json!({"uuid": "p"}))).await;
        let history = history["history"].as_array().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1]["user_message"], "and logging?");

        let (_, none) = call(&app, "POST", "/api/load_chat_history", Some(json!({}))).await;
        assert_eq!(none, json!({"history": []}));
    }

    #[tokio::test]
    async fn admin_chat_timing_summarizes_transcripts() {
        let dir = tempfile::tempdir().unwrap();
        write_requirements(dir.path(), 10);
        let (app, _) = app_with(config(dir.path()), Arc::new(StubAgent::default()));

        call(&app, "POST", "/api/ask_chatbot", Some(json!({"uuid": "p", "message": "one"}))).await;
        call(&app, "POST", "/api/ask_chatbot", Some(json!({"uuid": "p", "message": "two"}))).await;
        call(&app, "POST", "/api/ask_chatbot", Some(json!({"uuid": "q", "message": "hi"}))).await;

        let (status, _) = call(&app, "POST", "/api/admin/chat_timing", Some(json!({"password": "nope"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, all) = call(&app, "POST", "/api/admin/chat_timing", Some(json!({"password": PASSWORD}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all["sessions"]["p"]["message_count"], 2);
        assert_eq!(all["sessions"]["p"]["gaps_secs"].as_array().unwrap().len(), 1);
        assert_eq!(all["sessions"]["p"]["reply_secs"].as_array().unwrap().len(), 2);
        assert_eq!(all["sessions"]["q"]["message_count"], 1);

        let (_, one) =
            call(&app, "POST", "/api/admin/chat_timing", Some(json!({"password": PASSWORD, "uuid": "q"}))).await;
        assert_eq!(one["sessions"].as_object().unwrap().len(), 1);

        let (status, err) =
            call(&app, "POST", "/api/admin/chat_timing", Some(json!({"password": PASSWORD, "uuid": "nobody"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["status"], "error");
    }

    #[tokio::test]
    async fn agent_send_failure_becomes_reply_text() {
        let dir = tempfile::tempdir().unwrap();
        write_requirements(dir.path(), 10);
        let agent = Arc::new(StubAgent { fail_send: true, ..Default::default() });
        let (app, _) = app_with(config(dir.path()), agent);

        let (status, out) = call(&app, "POST", "/api/ask_chatbot", Some(json!({"uuid": "p", "message": "hi"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(out["response"], "Error: Failed to ask agent: quota exceeded");
    }

    #[tokio::test]
    async fn documents_and_admin_clear() {
        let dir = tempfile::tempdir().unwrap();
        write_requirements(dir.path(), 10);
        let (app, _) = app_with(config(dir.path()), Arc::new(StubAgent::default()));

        call(&app, "POST", "/api/submit_survey", Some(json!({"uuid": "p", "sus": [5, 4, 5]}))).await;
        call(&app, "POST", "/api/submit_prize", Some(json!({"uuid": "p", "email": "p@example.org"}))).await;
        call(&app, "POST", "/api/submit_demographics", Some(json!({"uuid": "p", "years_experience": 4}))).await;
        let (status, _) = call(&app, "POST", "/api/submit_survey", Some(json!({"sus": [1]}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "POST", "/api/admin/data", Some(json!({"password": "wrong"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&app, "POST", "/api/admin/clear", Some(json!({}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, dump) = call(&app, "POST", "/api/admin/data", Some(json!({"password": PASSWORD}))).await;
        assert_eq!(dump["data"]["satisfaction_surveys"]["p"]["sus"], json!([5, 4, 5]));
        assert_eq!(dump["data"]["prizes"]["p"]["email"], "p@example.org");
        assert!(dump["data"]["demographics"]["p"]["timestamp"].is_string());

        let (status, _) = call(&app, "POST", "/api/admin/clear", Some(json!({"password": PASSWORD}))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, dump) = call(&app, "POST", "/api/admin/data", Some(json!({"password": PASSWORD}))).await;
        assert_eq!(dump["data"]["satisfaction_surveys"], json!({}));
        assert_eq!(dump["data"]["prizes"], json!({}));
    }

    #[tokio::test]
    async fn admin_disabled_without_password() {
        let dir = tempfile::tempdir().unwrap();
        write_requirements(dir.path(), 10);
        let mut cfg = config(dir.path());
        cfg.admin_password = None;
        let (app, _) = app_with(cfg, Arc::new(StubAgent::default()));
        let (status, out) = call(&app, "POST", "/api/admin/data", Some(json!({"password": ""}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(out["message"], "Admin access is disabled");
    }

    #[tokio::test]
    async fn out_of_range_batch_is_empty_and_pages_are_served() {
        let dir = tempfile::tempdir().unwrap();
        write_requirements(dir.path(), 10);
        std::fs::create_dir_all(dir.path().join("pages")).unwrap();
        std::fs::write(dir.path().join("pages/consent.html"), "<h1>Consent</h1>").unwrap();
        std::fs::create_dir_all(dir.path().join("consent_forms")).unwrap();
        std::fs::write(dir.path().join("consent_forms/consent_prolific.md"), "# Prolific consent").unwrap();
        let (app, _) = app_with(config(dir.path()), Arc::new(StubAgent::default()));

        let (status, out) = call(&app, "GET", "/api/get_requirements?batch=9", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(out["nfrs"], json!([]));
        assert!(out.get("forced_nfrs").is_none());

        let res = app.clone().oneshot(Request::get("/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let html = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&html[..], b"<h1>Consent</h1>");

        let (status, consent) = call(&app, "GET", "/api/consent?id=prolific", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(consent["markdown"], "# Prolific consent");
        let (status, _) = call(&app, "GET", "/api/consent", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn restoring_a_uuid_echoes_it() {
        let dir = tempfile::tempdir().unwrap();
        write_requirements(dir.path(), 10);
        let (app, _) = app_with(config(dir.path()), Arc::new(StubAgent::default()));
        let (_, out) = call(&app, "POST", "/api/get_or_create_uuid", Some(json!({"uuid": "abc"}))).await;
        assert_eq!(out["uuid"], "abc");
        let (_, fresh) = call(&app, "POST", "/api/get_or_create_uuid", Some(json!({}))).await;
        assert_ne!(fresh["uuid"], "abc");
    }
}
