//! Timing summaries over stored chat transcripts.
//!
//! Each exchange contributes its question and reply instants. Durations are
//! reported in seconds; timestamps that fail to parse are skipped.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::debug;

use crate::domain::ConversationEntry;

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct ChatTiming {
  pub message_count: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub first_message: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_reply: Option<String>,
  /// From the earliest to the latest parsed instant.
  pub total_secs: f64,
  /// Between consecutive questions.
  pub gaps_secs: Vec<f64>,
  /// Question to reply, per exchange.
  pub reply_secs: Vec<f64>,
}

fn parse(ts: &str) -> Option<DateTime<FixedOffset>> {
  match DateTime::parse_from_rfc3339(ts) {
    Ok(t) => Some(t),
    Err(e) => {
      debug!(target: "nfr_study", %ts, error = %e, "Skipping malformed chat timestamp");
      None
    }
  }
}

fn secs(from: DateTime<FixedOffset>, to: DateTime<FixedOffset>) -> f64 {
  (to - from).num_milliseconds() as f64 / 1000.0
}

pub fn summarize(entries: &[ConversationEntry]) -> ChatTiming {
  let mut asked: Vec<DateTime<FixedOffset>> = entries.iter().filter_map(|e| parse(&e.user_time)).collect();
  asked.sort();

  let reply_secs = entries
    .iter()
    .filter_map(|e| Some(secs(parse(&e.user_time)?, parse(&e.bot_time)?)))
    .collect();

  let mut all: Vec<DateTime<FixedOffset>> = asked.clone();
  all.extend(entries.iter().filter_map(|e| parse(&e.bot_time)));
  all.sort();

  ChatTiming {
    message_count: entries.len(),
    first_message: all.first().map(|t| t.to_rfc3339()),
    last_reply: all.last().map(|t| t.to_rfc3339()),
    total_secs: match (all.first(), all.last()) {
      (Some(a), Some(b)) => secs(*a, *b),
      _ => 0.0,
    },
    gaps_secs: asked.windows(2).map(|w| secs(w[0], w[1])).collect(),
    reply_secs,
  }
}
