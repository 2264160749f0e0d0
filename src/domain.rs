//! Domain models: requirements, feedback entries, conversations, batch assignments.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One non-functional requirement as shown to participants.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Requirement {
  pub id: u32,
  pub title: String,
  pub description: String,
}

/// The three feedback questions asked per requirement.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Question {
  Q1,
  Q2,
  Q3,
}

impl Question {
  pub const ALL: [Question; 3] = [Question::Q1, Question::Q2, Question::Q3];

  pub fn key(self) -> &'static str {
    match self {
      Question::Q1 => "q1",
      Question::Q2 => "q2",
      Question::Q3 => "q3",
    }
  }
}

/// A single feedback submission. `nfr_id` and `batch` identify the entry;
/// everything else the front end sends is kept verbatim in `fields`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FeedbackEntry {
  pub nfr_id: u32,
  pub batch: u32,
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

impl FeedbackEntry {
  fn text_field(&self, name: &str) -> Option<&str> {
    self.fields.get(name).and_then(Value::as_str)
  }

  /// `qN_agreement`, e.g. "agree", "disagree", "strongly_disagree".
  pub fn agreement(&self, q: Question) -> Option<&str> {
    self.text_field(&format!("{}_agreement", q.key()))
  }

  /// `qN_own_assessment`: the participant's own justification.
  pub fn own_assessment(&self, q: Question) -> Option<&str> {
    self.text_field(&format!("{}_own_assessment", q.key()))
  }

  pub fn disagrees(&self, q: Question) -> bool {
    self.agreement(q).map(is_disagreement).unwrap_or(false)
  }
}

/// Any agreement value mentioning "disagree" counts, plus plain negatives.
pub fn is_disagreement(value: &str) -> bool {
  let v = value.trim().to_lowercase();
  v.contains("disagree") || v == "no" || v == "false"
}

/// One chatbot exchange, persisted in full per participant.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationEntry {
  pub user_message: String,
  pub bot_reply: String,
  pub user_time: String,
  pub bot_time: String,
}

/// Batches handed to one participant. `order` is the arrival sequence
/// number used to tell the first and second participant on a batch apart.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
  pub batches: Vec<u32>,
  pub order: u64,
  #[serde(default)]
  pub assigned_at: String,
}

/// A free-text gate explanation for one NFR in a batch.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateAnswer {
  pub nfr_id: u32,
  pub answer: String,
  pub timestamp: String,
}

// Persisted document shapes, all keyed by participant id.
pub type Assignments = BTreeMap<String, Assignment>;
pub type FeedbackDoc = BTreeMap<String, Vec<FeedbackEntry>>;
pub type ConversationDoc = BTreeMap<String, Vec<ConversationEntry>>;
pub type GateDoc = BTreeMap<String, BTreeMap<u32, GateAnswer>>;
pub type ForcedOverrideDoc = BTreeMap<String, BTreeMap<u32, Vec<u32>>>;
pub type AgentSessionDoc = BTreeMap<String, String>;
pub type ObjectDoc = BTreeMap<String, Value>;
