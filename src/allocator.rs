//! Batch allocation and per-participant assessment sets.
//!
//! Participants are paired per batch: the first to be assigned is index 0, the
//! second index 1. Forced-assessment and gate picks are seeded from the
//! participant and batch so they never need to be persisted.

use std::collections::{BTreeMap, BTreeSet};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::{debug, instrument};

use crate::config::{AllocationMode, StudySettings};
use crate::domain::{Assignments, FeedbackEntry, Question};
use crate::util::is_blank;

/// Per-question NFR ids the second participant must review.
pub type PeerRequired = BTreeMap<Question, BTreeSet<u32>>;

#[derive(Clone, Debug)]
pub struct AllocationPolicy {
  pub mode: AllocationMode,
  pub fixed_batches: Vec<u32>,
  pub per_participant: usize,
  pub capacity: usize,
}

impl From<&StudySettings> for AllocationPolicy {
  fn from(s: &StudySettings) -> Self {
    Self {
      mode: s.allocation,
      fixed_batches: s.fixed_batches.clone(),
      per_participant: s.batches_per_participant,
      capacity: s.batch_capacity,
    }
  }
}

/// Batches for `participant_id`. An existing assignment is returned unchanged.
#[instrument(level = "debug", target = "allocator", skip(assignments, policy), fields(existing = assignments.len()))]
pub fn assign_batches(
  assignments: &Assignments,
  participant_id: &str,
  total_batches: usize,
  policy: &AllocationPolicy,
) -> Vec<u32> {
  if let Some(a) = assignments.get(participant_id) {
    return a.batches.clone();
  }

  match policy.mode {
    AllocationMode::Fixed => policy.fixed_batches.clone(),
    AllocationMode::Greedy => greedy(assignments, total_batches, policy.per_participant, policy.capacity),
  }
}

fn greedy(assignments: &Assignments, total_batches: usize, wanted: usize, capacity: usize) -> Vec<u32> {
  let mut load: BTreeMap<u32, usize> = (1..=total_batches as u32).map(|b| (b, 0)).collect();
  for a in assignments.values() {
    for b in &a.batches {
      if let Some(n) = load.get_mut(b) {
        *n += 1;
      }
    }
  }

  let mut chosen: Vec<u32> =
    load.iter().filter(|(_, n)| **n < capacity).map(|(b, _)| *b).take(wanted).collect();

  // Not enough spare capacity: top up from batch 1 upward.
  for b in 1..=total_batches as u32 {
    if chosen.len() >= wanted {
      break;
    }
    if !chosen.contains(&b) {
      chosen.push(b);
    }
  }

  debug!(target: "allocator", ?chosen, total_batches, "Greedy allocation");
  chosen
}

/// Next arrival sequence number.
pub fn next_order(assignments: &Assignments) -> u64 {
  assignments.values().map(|a| a.order + 1).max().unwrap_or(0)
}

/// 0-based position of `participant_id` among everyone assigned `batch`,
/// by arrival order. `None` if they are not on that batch.
pub fn participant_index(assignments: &Assignments, batch: u32, participant_id: &str) -> Option<usize> {
  let mut on_batch: Vec<(u64, &str)> = assignments
    .iter()
    .filter(|(_, a)| a.batches.contains(&batch))
    .map(|(id, a)| (a.order, id.as_str()))
    .collect();
  on_batch.sort();
  on_batch.iter().position(|(_, id)| *id == participant_id)
}

/// Participant id at `index` on `batch`.
pub fn participant_at(assignments: &Assignments, batch: u32, index: usize) -> Option<String> {
  let mut on_batch: Vec<(u64, &String)> = assignments
    .iter()
    .filter(|(_, a)| a.batches.contains(&batch))
    .map(|(id, a)| (a.order, id))
    .collect();
  on_batch.sort();
  on_batch.get(index).map(|(_, id)| (*id).clone())
}

fn seeded_rng(seed: &str) -> StdRng {
  StdRng::from_seed(*blake3::hash(seed.as_bytes()).as_bytes())
}

/// Deterministic sample of `max(1, ceil(n * ratio))` ids (capped at `n`),
/// seeded from batch, participant index and participant id concatenated.
pub fn forced_assessment_nfrs(
  nfr_ids: &[u32],
  batch: u32,
  participant_index: usize,
  participant_id: &str,
  ratio: f64,
) -> BTreeSet<u32> {
  if nfr_ids.is_empty() {
    return BTreeSet::new();
  }
  let wanted = ((nfr_ids.len() as f64 * ratio).ceil() as usize).max(1).min(nfr_ids.len());
  let mut rng = seeded_rng(&format!("{batch}{participant_index}{participant_id}"));
  nfr_ids.choose_multiple(&mut rng, wanted).copied().collect()
}

/// For the second participant on a batch: every NFR the first participant
/// disagreed with on a question without writing their own assessment.
pub fn peer_required_nfrs(batch: u32, participant_index: usize, first_feedback: &[FeedbackEntry]) -> PeerRequired {
  let mut out: PeerRequired = Question::ALL.iter().map(|q| (*q, BTreeSet::new())).collect();
  if participant_index != 1 {
    return out;
  }
  for entry in first_feedback.iter().filter(|e| e.batch == batch) {
    for q in Question::ALL {
      if entry.disagrees(q) && is_blank(entry.own_assessment(q)) {
        out.entry(q).or_default().insert(entry.nfr_id);
      }
    }
  }
  out
}

/// The NFR whose gate question this participant answers for `batch`.
pub fn gate_nfr(nfr_ids: &[u32], batch: u32, participant_id: &str) -> Option<u32> {
  let mut rng = seeded_rng(&format!("gate{batch}{participant_id}"));
  nfr_ids.choose(&mut rng).copied()
}
