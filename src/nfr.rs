//! Requirement catalog: the NFR list, paged into batches.
//!
//! The requirements file is a JSON array of batches (arrays of requirements).
//! It can be produced from the plain-text corpus, where `§` lines open a
//! section and lines starting with "The system" (optionally prefixed by `*`)
//! are requirements inheriting the current section as title.

use std::path::Path;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::domain::Requirement;

#[derive(Debug, Error)]
pub enum CatalogError {
  #[error("failed to read {path}: {source}")]
  Read { path: String, source: std::io::Error },
  #[error("failed to write {path}: {source}")]
  Write { path: String, source: std::io::Error },
  #[error("invalid requirements JSON in {path}: {source}")]
  Json { path: String, source: serde_json::Error },
}

#[derive(Clone, Debug, Default)]
pub struct Catalog {
  batches: Vec<Vec<Requirement>>,
}

impl Catalog {
  /// Re-page a flat requirement list into batches of `page_size`.
  pub fn from_requirements(reqs: Vec<Requirement>, page_size: usize) -> Self {
    let page_size = page_size.max(1);
    let batches = reqs.chunks(page_size).map(<[Requirement]>::to_vec).collect();
    Self { batches }
  }

  /// Load the requirements file; when it is missing and a corpus is given,
  /// build it from the corpus and write it out for next time.
  #[instrument(level = "info", skip_all, fields(path = %path.display()))]
  pub fn load_or_build(path: &Path, corpus: Option<&Path>, page_size: usize) -> Result<Self, CatalogError> {
    if path.exists() {
      let raw = std::fs::read_to_string(path)
        .map_err(|source| CatalogError::Read { path: path.display().to_string(), source })?;
      let paged: Vec<Vec<Requirement>> = serde_json::from_str(&raw)
        .map_err(|source| CatalogError::Json { path: path.display().to_string(), source })?;
      let catalog = Self::from_requirements(paged.into_iter().flatten().collect(), page_size);
      info!(target: "nfr_study", batches = catalog.total_batches(), nfrs = catalog.total_nfrs(), "Requirements loaded");
      return Ok(catalog);
    }

    let Some(corpus) = corpus else {
      warn!(target: "nfr_study", "Requirements file missing and no corpus configured; serving an empty catalog");
      return Ok(Self::default());
    };

    let text = std::fs::read_to_string(corpus)
      .map_err(|source| CatalogError::Read { path: corpus.display().to_string(), source })?;
    let catalog = Self::from_requirements(parse_corpus(&text), page_size);
    let json = serde_json::to_string_pretty(&catalog.batches)
      .map_err(|source| CatalogError::Json { path: path.display().to_string(), source })?;
    std::fs::write(path, json).map_err(|source| CatalogError::Write { path: path.display().to_string(), source })?;
    info!(target: "nfr_study", corpus = %corpus.display(), batches = catalog.total_batches(), nfrs = catalog.total_nfrs(), "Requirements generated from corpus");
    Ok(catalog)
  }

  /// 1-based batch lookup; out-of-range yields an empty slice.
  pub fn batch(&self, batch: u32) -> &[Requirement] {
    batch
      .checked_sub(1)
      .and_then(|i| self.batches.get(i as usize))
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  pub fn batch_ids(&self, batch: u32) -> Vec<u32> {
    self.batch(batch).iter().map(|r| r.id).collect()
  }

  pub fn total_batches(&self) -> usize {
    self.batches.len()
  }

  pub fn total_nfrs(&self) -> usize {
    self.batches.iter().map(Vec::len).sum()
  }
}

/// Parse the plain-text corpus into sequentially numbered requirements.
pub fn parse_corpus(text: &str) -> Vec<Requirement> {
  let mut out = Vec::new();
  let mut section: Option<String> = None;

  for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
    if line.starts_with('§') {
      section = Some(line.trim_end_matches('.').to_string());
    } else if line.starts_with("The system") || line.starts_with("*The system") {
      out.push(Requirement {
        id: out.len() as u32 + 1,
        title: section.clone().unwrap_or_else(|| "Unknown Section".into()),
        description: line.trim_start_matches('*').to_string(),
      });
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  fn corpus(n: usize) -> String {
    let mut s = String::from("Preamble that is ignored.\n\n§ 164.312(a) Access control.\n");
    for i in 0..n {
      if i == 3 {
        s.push_str("§ 164.312(b) Audit controls.\n");
      }
      let star = if i % 2 == 0 { "*" } else { "" };
      s.push_str(&format!("  {star}The system shall do thing {i}.\n"));
    }
    s
  }

  #[test]
  fn parses_sections_and_numbers() {
    let reqs = parse_corpus(&corpus(5));
    assert_eq!(reqs.len(), 5);
    assert_eq!(reqs[0].id, 1);
    assert_eq!(reqs[0].title, "§ 164.312(a) Access control");
    assert_eq!(reqs[0].description, "The system shall do thing 0.");
    assert_eq!(reqs[3].title, "§ 164.312(b) Audit controls");
    assert_eq!(reqs[4].id, 5);
  }

  #[test]
  fn requirement_before_any_section_gets_placeholder_title() {
    let reqs = parse_corpus("The system shall log.\n");
    assert_eq!(reqs[0].title, "Unknown Section");
  }

  #[test]
  fn pages_by_ten() {
    let catalog = Catalog::from_requirements(parse_corpus(&corpus(23)), 10);
    assert_eq!(catalog.total_batches(), 3);
    assert_eq!(catalog.total_nfrs(), 23);
    assert_eq!(catalog.batch(1).len(), 10);
    assert_eq!(catalog.batch(3).len(), 3);
    assert!(catalog.batch(0).is_empty());
    assert!(catalog.batch(4).is_empty());
    assert_eq!(catalog.batch_ids(2).first(), Some(&11));
  }

  #[test]
  fn builds_file_from_corpus_then_reloads_it() {
    let dir = tempfile::tempdir().unwrap();
    let corpus_path = dir.path().join("All_NFRs.txt");
    let req_path = dir.path().join("NFR.json");
    std::fs::write(&corpus_path, corpus(12)).unwrap();

    let built = Catalog::load_or_build(&req_path, Some(&corpus_path), 10).unwrap();
    assert_eq!(built.total_batches(), 2);
    assert!(req_path.exists());

    // Re-paging on load follows the configured size, not the file's layout.
    let reloaded = Catalog::load_or_build(&req_path, None, 5).unwrap();
    assert_eq!(reloaded.total_batches(), 3);
    assert_eq!(reloaded.total_nfrs(), 12);
  }

  #[test]
  fn missing_everything_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::load_or_build(&dir.path().join("none.json"), None, 10).unwrap();
    assert_eq!(catalog.total_nfrs(), 0);
  }
}
