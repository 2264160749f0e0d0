//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs ids and sizes, not participant text.

use std::sync::Arc;

use axum::{
  extract::{Query, State},
  Json,
};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, AppJsonIn};
use crate::logic::*;
use crate::protocol::*;
use crate::state::AppState;
use crate::store::Doc;
use crate::util::now_iso;

type AppJson<T> = ApiResult<Json<T>>;

#[instrument(level = "info")]
pub async fn http_health() -> Json<HealthOut> {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip_all, fields(id = ?q.id))]
pub async fn http_get_consent(State(state): State<Arc<AppState>>, Query(q): Query<ConsentQuery>) -> AppJson<ConsentOut> {
  let prolific = q.id.as_deref() == Some("prolific");
  let file = if prolific { "consent_prolific.md" } else { "consent_um.md" };
  let path = state.cfg.consent_dir.join(file);
  let markdown = tokio::fs::read_to_string(&path)
    .await
    .map_err(|e| ApiError::NotFound(format!("Consent form unavailable ({}): {e}", path.display())))?;
  Ok(Json(ConsentOut { prolific, markdown }))
}

/// GET mints a fresh participant id; POST with a `uuid` restores it.
#[instrument(level = "info", skip_all)]
pub async fn http_get_or_create_uuid(body: Option<AppJsonIn<UuidIn>>) -> Json<UuidOut> {
  if let Some(uuid) = body.and_then(|AppJsonIn(b)| b.uuid).filter(|u| !u.trim().is_empty()) {
    info!(target: "nfr_study", %uuid, "Participant restored");
    return Json(UuidOut { uuid });
  }
  let uuid = Uuid::new_v4().to_string();
  info!(target: "nfr_study", %uuid, "Participant created");
  Json(UuidOut { uuid })
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_assign_batches(State(state): State<Arc<AppState>>, AppJsonIn(body): AppJsonIn<UuidIn>) -> AppJson<AssignOut> {
  let uuid = require_uuid(body.uuid.as_deref())?;
  let batches = ensure_assignment(&state, &uuid).await?;
  Ok(Json(AssignOut { uuid, batches }))
}

#[instrument(level = "info", skip_all, fields(batch = ?q.batch, has_uuid = q.uuid.is_some()))]
pub async fn http_get_requirements(
  State(state): State<Arc<AppState>>,
  Query(q): Query<RequirementsQuery>,
) -> AppJson<RequirementsOut> {
  let batch = q.batch.unwrap_or(1);
  let plan = match q.uuid.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
    Some(uuid) => Some(batch_plan(&state, uuid, batch).await?),
    None => None,
  };
  Ok(Json(RequirementsOut {
    nfrs: state.catalog.batch(batch).to_vec(),
    batch,
    total_batches: state.catalog.total_batches(),
    total_nfrs: state.catalog.total_nfrs(),
    plan,
  }))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_nfr_feedback(
  State(state): State<Arc<AppState>>,
  AppJsonIn(body): AppJsonIn<FeedbackSubmission>,
) -> AppJson<StatusOut> {
  let single_id = match &body {
    FeedbackSubmission::Single(e) => Some(e.nfr_id),
    FeedbackSubmission::Batch(_) => None,
  };
  let (_, count) = submit_feedback(&state, body).await?;
  Ok(Json(match single_id {
    Some(nfr_id) => StatusOut { nfr_id: Some(nfr_id), ..StatusOut::success() },
    None => StatusOut { count: Some(count), ..StatusOut::success() },
  }))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_batch_feedback(State(state): State<Arc<AppState>>, AppJsonIn(body): AppJsonIn<Value>) -> AppJson<StatusOut> {
  if !body.is_array() {
    return Err(ApiError::BadRequest("Array of feedback data required".into()));
  }
  let entries =
    serde_json::from_value(body).map_err(|e| ApiError::BadRequest(format!("Invalid feedback entry: {e}")))?;
  let (_, count) = submit_feedback(&state, FeedbackSubmission::Batch(entries)).await?;
  Ok(Json(StatusOut { count: Some(count), ..StatusOut::success() }))
}

#[instrument(level = "info", skip_all, fields(batch = body.batch, nfr_id = body.nfr_id))]
pub async fn http_post_gate(State(state): State<Arc<AppState>>, AppJsonIn(body): AppJsonIn<GateIn>) -> AppJson<StatusOut> {
  let uuid = require_uuid(body.uuid.as_deref())?;
  submit_gate(&state, &uuid, body.batch, body.nfr_id, &body.answer).await?;
  Ok(Json(StatusOut { nfr_id: Some(body.nfr_id), ..StatusOut::success() }))
}

/// Without a `uuid` a new participant id is minted, as the consent page does.
#[instrument(level = "info", skip_all, fields(message_len = body.message.len()))]
pub async fn http_post_ask_chatbot(State(state): State<Arc<AppState>>, AppJsonIn(body): AppJsonIn<AskIn>) -> AppJson<AskOut> {
  let uuid = match body.uuid.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
    Some(u) => u.to_string(),
    None => Uuid::new_v4().to_string(),
  };
  let entry = ask_chatbot(&state, &uuid, &body.message).await?;
  Ok(Json(AskOut { response: entry.bot_reply, timestamp: entry.bot_time, uuid }))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_load_chat_history(
  State(state): State<Arc<AppState>>,
  body: Option<AppJsonIn<UuidIn>>,
) -> AppJson<HistoryOut> {
  let uuid = body.and_then(|AppJsonIn(b)| b.uuid).filter(|u| !u.trim().is_empty());
  let history = match uuid {
    Some(uuid) => chat_history(&state, &uuid).await?,
    None => Vec::new(),
  };
  Ok(Json(HistoryOut { history }))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_survey(State(state): State<Arc<AppState>>, AppJsonIn(body): AppJsonIn<Value>) -> AppJson<StatusOut> {
  store_object(&state, Doc::Survey, body, false).await?;
  Ok(Json(StatusOut::success()))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_demographics(State(state): State<Arc<AppState>>, AppJsonIn(body): AppJsonIn<Value>) -> AppJson<StatusOut> {
  store_object(&state, Doc::Demographics, body, true).await?;
  Ok(Json(StatusOut::success()))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_prize(State(state): State<Arc<AppState>>, AppJsonIn(body): AppJsonIn<Value>) -> AppJson<StatusOut> {
  store_object(&state, Doc::Prize, body, false).await?;
  Ok(Json(StatusOut::success()))
}

// -------- Admin --------

#[instrument(level = "info", skip_all)]
pub async fn http_post_admin_data(State(state): State<Arc<AppState>>, AppJsonIn(body): AppJsonIn<AdminIn>) -> AppJson<AdminDataOut> {
  check_admin(&state, body.password.as_deref())?;
  let mut data = state.store.dump_all().await?;
  data.insert("exported_at".into(), Value::String(now_iso()));
  info!(target: "nfr_study", documents = data.len(), "Admin data exported");
  Ok(Json(AdminDataOut { status: "success", data }))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_admin_clear(State(state): State<Arc<AppState>>, AppJsonIn(body): AppJsonIn<AdminIn>) -> AppJson<StatusOut> {
  check_admin(&state, body.password.as_deref())?;
  admin_clear(&state).await?;
  Ok(Json(StatusOut::success()))
}

#[instrument(level = "info", skip_all)]
pub async fn http_post_admin_chat_timing(
  State(state): State<Arc<AppState>>,
  AppJsonIn(body): AppJsonIn<ChatTimingIn>,
) -> AppJson<ChatTimingOut> {
  check_admin(&state, body.password.as_deref())?;
  let uuid = body.uuid.as_deref().map(str::trim).filter(|u| !u.is_empty());
  let sessions = chat_timing(&state, uuid).await?;
  Ok(Json(ChatTimingOut { status: "success", sessions }))
}

#[instrument(level = "info", skip_all, fields(batch = body.batch, count = body.nfr_ids.len()))]
pub async fn http_post_admin_forced(
  State(state): State<Arc<AppState>>,
  AppJsonIn(body): AppJsonIn<ForcedOverrideIn>,
) -> AppJson<StatusOut> {
  check_admin(&state, body.password.as_deref())?;
  let uuid = require_uuid(Some(body.uuid.as_str()))?;
  let count = body.nfr_ids.len();
  set_forced_override(&state, &uuid, body.batch, body.nfr_ids).await?;
  Ok(Json(StatusOut { count: Some(count), ..StatusOut::success() }))
}
