//! HTTP request/response DTOs (serde ready).
//! Field names match what the study front end already sends and reads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::allocator::PeerRequired;
use crate::domain::{ConversationEntry, FeedbackEntry, Requirement};
use crate::timing::ChatTiming;

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConsentQuery {
    pub id: Option<String>,
}
#[derive(Serialize)]
pub struct ConsentOut {
    pub prolific: bool,
    pub markdown: String,
}

/// Body of calls that only identify the participant.
#[derive(Debug, Default, Deserialize)]
pub struct UuidIn {
    #[serde(default)]
    pub uuid: Option<String>,
}
#[derive(Serialize)]
pub struct UuidOut {
    pub uuid: String,
}

#[derive(Serialize)]
pub struct AssignOut {
    pub uuid: String,
    pub batches: Vec<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RequirementsQuery {
    pub batch: Option<u32>,
    pub uuid: Option<String>,
}
#[derive(Serialize)]
pub struct RequirementsOut {
    pub nfrs: Vec<Requirement>,
    pub batch: u32,
    pub total_batches: usize,
    pub total_nfrs: usize,
    #[serde(flatten)]
    pub plan: Option<BatchPlan>,
}

/// What one participant has to do on one batch.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct BatchPlan {
    /// 0 = first participant on the batch, 1 = second; None if not assigned to it.
    pub participant_index: Option<usize>,
    pub forced_nfrs: Vec<u32>,
    pub peer_required: PeerRequired,
    pub gate_nfr: Option<u32>,
}

/// Either one feedback entry or a whole batch of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FeedbackSubmission {
    Batch(Vec<FeedbackEntry>),
    Single(FeedbackEntry),
}

#[derive(Debug, Deserialize)]
pub struct GateIn {
    #[serde(default)]
    pub uuid: Option<String>,
    pub batch: u32,
    pub nfr_id: u32,
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct AskIn {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub message: String,
}
#[derive(Serialize)]
pub struct AskOut {
    pub response: String,
    pub timestamp: String,
    pub uuid: String,
}

#[derive(Serialize)]
pub struct HistoryOut {
    pub history: Vec<ConversationEntry>,
}

#[derive(Serialize)]
pub struct StatusOut {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nfr_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl StatusOut {
    pub fn success() -> Self {
        Self { status: "success", nfr_id: None, count: None }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminIn {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatTimingIn {
    #[serde(default)]
    pub password: Option<String>,
    /// One participant, or every participant when absent.
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Serialize)]
pub struct ChatTimingOut {
    pub status: &'static str,
    pub sessions: BTreeMap<String, ChatTiming>,
}

#[derive(Debug, Deserialize)]
pub struct ForcedOverrideIn {
    #[serde(default)]
    pub password: Option<String>,
    pub uuid: String,
    pub batch: u32,
    #[serde(default)]
    pub nfr_ids: Vec<u32>,
}

#[derive(Serialize)]
pub struct AdminDataOut {
    pub status: &'static str,
    pub data: serde_json::Map<String, Value>,
}
