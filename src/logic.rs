//! Core behaviors behind the HTTP handlers.
//!
//! This includes:
//!   - batch assignment and per-batch plans (forced / peer-required / gate)
//!   - feedback, gate, and free-form document submissions
//!   - the chatbot flow over the agent backend
//!   - admin dump / wipe / forced-NFR overrides

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::allocator::{
  assign_batches, forced_assessment_nfrs, gate_nfr, next_order, participant_at, participant_index,
  peer_required_nfrs,
};
use crate::domain::{
  AgentSessionDoc, Assignment, Assignments, ConversationDoc, ConversationEntry, FeedbackDoc, FeedbackEntry,
  ForcedOverrideDoc, GateAnswer, GateDoc, ObjectDoc,
};
use crate::error::{ApiError, ApiResult};
use crate::protocol::{BatchPlan, FeedbackSubmission};
use crate::sessions::ChatSession;
use crate::state::AppState;
use crate::store::Doc;
use crate::timing::{summarize, ChatTiming};
use crate::util::{now_iso, trunc_for_log};

/// A non-blank participant id, or 400.
pub fn require_uuid(uuid: Option<&str>) -> ApiResult<String> {
  match uuid.map(str::trim) {
    Some(u) if !u.is_empty() => Ok(u.to_string()),
    _ => Err(ApiError::BadRequest("UUID is required".into())),
  }
}

// -------- Assignment & batch plans --------

#[instrument(level = "info", skip(state))]
pub async fn ensure_assignment(state: &AppState, uuid: &str) -> ApiResult<Vec<u32>> {
  let total = state.catalog.total_batches();
  let policy = &state.policy;
  let batches = state
    .store
    .update(Doc::Assignments, |doc: &mut Assignments| {
      if let Some(a) = doc.get(uuid) {
        return a.batches.clone();
      }
      let batches = assign_batches(doc, uuid, total, policy);
      let order = next_order(doc);
      doc.insert(uuid.to_string(), Assignment { batches: batches.clone(), order, assigned_at: now_iso() });
      info!(target: "allocator", %uuid, ?batches, order, "Batches assigned");
      batches
    })
    .await?;
  Ok(batches)
}

/// Forced, peer-required and gate picks for `uuid` on `batch`.
#[instrument(level = "info", skip(state))]
pub async fn batch_plan(state: &AppState, uuid: &str, batch: u32) -> ApiResult<BatchPlan> {
  let nfr_ids = state.catalog.batch_ids(batch);
  let assignments: Assignments = state.store.load(Doc::Assignments).await?;
  let index = participant_index(&assignments, batch, uuid);

  let overrides: ForcedOverrideDoc = state.store.load(Doc::ForcedNfrs).await?;
  let forced = match overrides.get(uuid).and_then(|m| m.get(&batch)).filter(|ids| !ids.is_empty()) {
    Some(ids) => {
      debug!(target: "allocator", %uuid, batch, "Using forced-NFR override");
      ids.clone()
    }
    None => forced_assessment_nfrs(&nfr_ids, batch, index.unwrap_or(0), uuid, state.cfg.study.forced_ratio)
      .into_iter()
      .collect(),
  };

  let first_feedback = match (index, participant_at(&assignments, batch, 0)) {
    (Some(1), Some(first)) => {
      let feedback: FeedbackDoc = state.store.load(Doc::Feedback).await?;
      feedback.get(&first).cloned().unwrap_or_default()
    }
    _ => Vec::new(),
  };
  let peer_required = peer_required_nfrs(batch, index.unwrap_or(0), &first_feedback);

  Ok(BatchPlan { participant_index: index, forced_nfrs: forced, peer_required, gate_nfr: gate_nfr(&nfr_ids, batch, uuid) })
}

// -------- Submissions --------

fn entry_uuid(entry: &FeedbackEntry) -> Option<&str> {
  entry.fields.get("uuid").and_then(Value::as_str)
}

/// Single entries replace the same `(nfr_id, batch)`; a batch replaces every
/// entry of its batch number. Returns the number of entries written.
#[instrument(level = "info", skip(state, submission))]
pub async fn submit_feedback(state: &AppState, submission: FeedbackSubmission) -> ApiResult<(String, usize)> {
  match submission {
    FeedbackSubmission::Batch(entries) => {
      let first = entries.first().ok_or_else(|| ApiError::BadRequest("Empty array".into()))?;
      let uuid = require_uuid(entry_uuid(first))?;
      let batch = first.batch;
      let count = entries.len();
      state
        .store
        .update(Doc::Feedback, |doc: &mut FeedbackDoc| {
          let list = doc.entry(uuid.clone()).or_default();
          list.retain(|e| e.batch != batch);
          list.extend(entries);
        })
        .await?;
      info!(target: "nfr_study", %uuid, batch, count, "Batch feedback stored");
      Ok((uuid, count))
    }
    FeedbackSubmission::Single(entry) => {
      let uuid = require_uuid(entry_uuid(&entry))?;
      let (nfr_id, batch) = (entry.nfr_id, entry.batch);
      state
        .store
        .update(Doc::Feedback, |doc: &mut FeedbackDoc| {
          let list = doc.entry(uuid.clone()).or_default();
          list.retain(|e| !(e.nfr_id == nfr_id && e.batch == batch));
          list.push(entry);
        })
        .await?;
      info!(target: "nfr_study", %uuid, nfr_id, batch, "Feedback stored");
      Ok((uuid, 1))
    }
  }
}

/// Only the participant's own gate pick for the batch is accepted.
#[instrument(level = "info", skip(state, answer), fields(answer_len = answer.len()))]
pub async fn submit_gate(state: &AppState, uuid: &str, batch: u32, nfr_id: u32, answer: &str) -> ApiResult<()> {
  let answer = answer.trim();
  if answer.is_empty() {
    return Err(ApiError::BadRequest("Gate answer must not be empty".into()));
  }
  let nfr_ids = state.catalog.batch_ids(batch);
  if !nfr_ids.contains(&nfr_id) {
    return Err(ApiError::BadRequest(format!("NFR {nfr_id} is not part of batch {batch}")));
  }
  if gate_nfr(&nfr_ids, batch, uuid) != Some(nfr_id) {
    return Err(ApiError::BadRequest(format!("NFR {nfr_id} is not the gate item of batch {batch}")));
  }
  let record = GateAnswer { nfr_id, answer: answer.to_string(), timestamp: now_iso() };
  state
    .store
    .update(Doc::Gates, |doc: &mut GateDoc| {
      doc.entry(uuid.to_string()).or_default().insert(batch, record);
    })
    .await?;
  Ok(())
}

/// Store a free-form object under the participant id (surveys, prizes, demographics).
#[instrument(level = "info", skip(state, body), fields(file = doc.file_name()))]
pub async fn store_object(state: &AppState, doc: Doc, body: Value, stamp: bool) -> ApiResult<String> {
  let Value::Object(mut obj) = body else {
    return Err(ApiError::BadRequest("JSON object required".into()));
  };
  let uuid = require_uuid(obj.get("uuid").and_then(Value::as_str))?;
  if stamp {
    obj.insert("timestamp".into(), Value::String(now_iso()));
  }
  state
    .store
    .update(doc, |d: &mut ObjectDoc| {
      d.insert(uuid.clone(), Value::Object(obj));
    })
    .await?;
  Ok(uuid)
}

// -------- Chatbot --------

/// Live chat session for `uuid`: cached, rebuilt from disk, or newly created
/// at the agent (creation happens at most once per participant at a time).
#[instrument(level = "info", skip(state))]
async fn chat_session(state: &AppState, uuid: &str) -> ApiResult<ChatSession> {
  if let Some(s) = state.sessions.get(uuid).await {
    return Ok(s);
  }
  let _setup = state.sessions.lock_participant(uuid).await;
  // Another request may have finished setup while we waited.
  if let Some(s) = state.sessions.get(uuid).await {
    return Ok(s);
  }

  let links: AgentSessionDoc = state.store.load(Doc::AgentSessions).await?;
  let agent_session_id = match links.get(uuid) {
    Some(id) => {
      debug!(target: "agent", %uuid, session_id = %id, "Resuming persisted agent session");
      id.clone()
    }
    None => {
      let id = state.agent.create_session(state.initial_prompt.as_deref()).await?;
      state
        .store
        .update(Doc::AgentSessions, |doc: &mut AgentSessionDoc| {
          doc.insert(uuid.to_string(), id.clone());
        })
        .await?;
      id
    }
  };

  let conversations: ConversationDoc = state.store.load(Doc::Conversations).await?;
  let history = conversations.get(uuid).cloned().unwrap_or_default();
  let session = ChatSession::new(agent_session_id, history);
  state.sessions.create(uuid, session.clone()).await;
  Ok(session)
}

/// Ask the agent on behalf of `uuid`. Agent failures while sending become the
/// reply text; failure to set up a session is an error.
#[instrument(level = "info", skip(state, message), fields(message_len = message.len()))]
pub async fn ask_chatbot(state: &AppState, uuid: &str, message: &str) -> ApiResult<ConversationEntry> {
  let session = chat_session(state, uuid).await?;
  let user_time = now_iso();

  let bot_reply = match state.agent.send(&session.agent_session_id, message).await {
    Ok(reply) => reply,
    Err(e) => {
      warn!(target: "agent", %uuid, error = %e, "Agent send failed; returning error as reply");
      // Rebuild from disk next time rather than trusting the cached session.
      state.sessions.evict(uuid).await;
      format!("Error: {e}")
    }
  };
  debug!(target: "agent", %uuid, reply = %trunc_for_log(&bot_reply, 120), "Chat reply");

  let entry = ConversationEntry { user_message: message.to_string(), bot_reply, user_time, bot_time: now_iso() };
  state.sessions.append(uuid, entry.clone()).await;
  state
    .store
    .update(Doc::Conversations, |doc: &mut ConversationDoc| {
      doc.entry(uuid.to_string()).or_default().push(entry.clone());
    })
    .await?;
  Ok(entry)
}

pub async fn chat_history(state: &AppState, uuid: &str) -> ApiResult<Vec<ConversationEntry>> {
  if let Some(s) = state.sessions.get(uuid).await {
    return Ok(s.history);
  }
  let conversations: ConversationDoc = state.store.load(Doc::Conversations).await?;
  Ok(conversations.get(uuid).cloned().unwrap_or_default())
}

// -------- Admin --------

pub fn check_admin(state: &AppState, password: Option<&str>) -> ApiResult<()> {
  let Some(expected) = state.cfg.admin_password.as_deref() else {
    return Err(ApiError::Forbidden("Admin access is disabled"));
  };
  match password {
    Some(p) if p == expected => Ok(()),
    _ => Err(ApiError::Forbidden("Invalid admin password")),
  }
}

#[instrument(level = "info", skip(state))]
pub async fn admin_clear(state: &AppState) -> ApiResult<()> {
  state.store.clear_all().await?;
  state.sessions.clear().await;
  Ok(())
}

/// Timing summary of one participant's transcript, or of all of them.
#[instrument(level = "info", skip(state))]
pub async fn chat_timing(state: &AppState, uuid: Option<&str>) -> ApiResult<BTreeMap<String, ChatTiming>> {
  let conversations: ConversationDoc = state.store.load(Doc::Conversations).await?;
  match uuid {
    Some(uuid) => {
      let entries =
        conversations.get(uuid).ok_or_else(|| ApiError::NotFound(format!("No conversation for participant {uuid}")))?;
      Ok(BTreeMap::from([(uuid.to_string(), summarize(entries))]))
    }
    None => Ok(conversations.iter().map(|(id, entries)| (id.clone(), summarize(entries))).collect()),
  }
}

/// Set (or, with an empty list, remove) the forced NFRs for one participant and batch.
#[instrument(level = "info", skip(state))]
pub async fn set_forced_override(state: &AppState, uuid: &str, batch: u32, nfr_ids: Vec<u32>) -> ApiResult<()> {
  let known = state.catalog.batch_ids(batch);
  if let Some(bad) = nfr_ids.iter().find(|id| !known.contains(id)) {
    return Err(ApiError::BadRequest(format!("NFR {bad} is not part of batch {batch}")));
  }
  state
    .store
    .update(Doc::ForcedNfrs, |doc: &mut ForcedOverrideDoc| {
      if nfr_ids.is_empty() {
        if let Some(m) = doc.get_mut(uuid) {
          m.remove(&batch);
          if m.is_empty() {
            doc.remove(uuid);
          }
        }
      } else {
        doc.entry(uuid.to_string()).or_default().insert(batch, nfr_ids);
      }
    })
    .await?;
  Ok(())
}
