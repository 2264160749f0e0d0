//! Whole-document JSON persistence under `data_dir`.
//!
//! One file per concern, keyed by participant id inside. Each document has its
//! own async mutex; `update` holds it across read-modify-write so concurrent
//! handlers in this process cannot lose each other's writes. Writes go to a
//! temp file in the same directory and are renamed over the target.

use std::{collections::HashMap, path::PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Doc {
  Conversations,
  Feedback,
  Survey,
  Demographics,
  Prize,
  Assignments,
  Gates,
  ForcedNfrs,
  AgentSessions,
}

impl Doc {
  pub const ALL: [Doc; 9] = [
    Doc::Conversations,
    Doc::Feedback,
    Doc::Survey,
    Doc::Demographics,
    Doc::Prize,
    Doc::Assignments,
    Doc::Gates,
    Doc::ForcedNfrs,
    Doc::AgentSessions,
  ];

  pub fn file_name(self) -> &'static str {
    match self {
      Doc::Conversations => "conversation.json",
      Doc::Feedback => "nfr_responses.json",
      Doc::Survey => "satisfaction_survey.json",
      Doc::Demographics => "demographics.json",
      Doc::Prize => "prize.json",
      Doc::Assignments => "batch_assignments.json",
      Doc::Gates => "gate_answers.json",
      Doc::ForcedNfrs => "forced_nfrs.json",
      Doc::AgentSessions => "agent_sessions.json",
    }
  }

  /// Key used for this document in the admin dump.
  pub fn key(self) -> &'static str {
    match self {
      Doc::Conversations => "conversations",
      Doc::Feedback => "nfr_responses",
      Doc::Survey => "satisfaction_surveys",
      Doc::Demographics => "demographics",
      Doc::Prize => "prizes",
      Doc::Assignments => "batch_assignments",
      Doc::Gates => "gate_answers",
      Doc::ForcedNfrs => "forced_nfrs",
      Doc::AgentSessions => "agent_sessions",
    }
  }
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("io error on {path}: {source}")]
  Io { path: PathBuf, source: std::io::Error },
  #[error("invalid JSON in {path}: {source}")]
  Json { path: PathBuf, source: serde_json::Error },
}

pub struct JsonStore {
  root: PathBuf,
  locks: HashMap<Doc, Mutex<()>>,
}

impl JsonStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    let locks = Doc::ALL.iter().map(|d| (*d, Mutex::new(()))).collect();
    Self { root: root.into(), locks }
  }

  pub fn path(&self, doc: Doc) -> PathBuf {
    self.root.join(doc.file_name())
  }

  fn lock(&self, doc: Doc) -> &Mutex<()> {
    // Every Doc variant gets a mutex in `new`.
    &self.locks[&doc]
  }

  /// Load a document. A missing or empty file yields `T::default()`.
  #[instrument(level = "debug", skip(self), fields(file = doc.file_name()))]
  pub async fn load<T: DeserializeOwned + Default>(&self, doc: Doc) -> Result<T, StoreError> {
    let _guard = self.lock(doc).lock().await;
    self.read(doc).await
  }

  /// Replace a document wholesale.
  #[instrument(level = "debug", skip(self, value), fields(file = doc.file_name()))]
  pub async fn save<T: Serialize>(&self, doc: Doc, value: &T) -> Result<(), StoreError> {
    let _guard = self.lock(doc).lock().await;
    self.write(doc, value).await
  }

  /// Read-modify-write under the document lock. The closure's result is returned
  /// after the new document has been persisted.
  #[instrument(level = "debug", skip(self, f), fields(file = doc.file_name()))]
  pub async fn update<T, R, F>(&self, doc: Doc, f: F) -> Result<R, StoreError>
  where
    T: DeserializeOwned + Serialize + Default,
    F: FnOnce(&mut T) -> R,
  {
    let _guard = self.lock(doc).lock().await;
    let mut value: T = self.read(doc).await?;
    let out = f(&mut value);
    self.write(doc, &value).await?;
    Ok(out)
  }

  /// Every document as raw JSON, keyed by `Doc::key`.
  pub async fn dump_all(&self) -> Result<serde_json::Map<String, Value>, StoreError> {
    let mut out = serde_json::Map::new();
    for doc in Doc::ALL {
      let value: Value = self.load::<Option<Value>>(doc).await?.unwrap_or_else(|| Value::Object(Default::default()));
      out.insert(doc.key().to_string(), value);
    }
    Ok(out)
  }

  /// Reset every document to an empty object.
  #[instrument(level = "info", skip(self))]
  pub async fn clear_all(&self) -> Result<(), StoreError> {
    let empty = Value::Object(Default::default());
    for doc in Doc::ALL {
      self.save(doc, &empty).await?;
    }
    warn!(target: "store", root = %self.root.display(), "All response documents cleared");
    Ok(())
  }

  async fn read<T: DeserializeOwned + Default>(&self, doc: Doc) -> Result<T, StoreError> {
    let path = self.path(doc);
    let bytes = match tokio::fs::read(&path).await {
      Ok(b) => b,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(target: "store", path = %path.display(), "Document missing; using empty");
        return Ok(T::default());
      }
      Err(source) => return Err(StoreError::Io { path, source }),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
      return Ok(T::default());
    }
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Json { path, source })
  }

  async fn write<T: Serialize>(&self, doc: Doc, value: &T) -> Result<(), StoreError> {
    let path = self.path(doc);
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json { path: path.clone(), source })?;

    tokio::fs::create_dir_all(&self.root)
      .await
      .map_err(|source| StoreError::Io { path: self.root.clone(), source })?;

    let tmp = self.root.join(format!(".{}.{}.tmp", doc.file_name(), Uuid::new_v4().simple()));
    if let Err(source) = tokio::fs::write(&tmp, &bytes).await {
      return Err(StoreError::Io { path: tmp, source });
    }
    if let Err(source) = tokio::fs::rename(&tmp, &path).await {
      let _ = tokio::fs::remove_file(&tmp).await;
      return Err(StoreError::Io { path, source });
    }
    debug!(target: "store", path = %path.display(), bytes = bytes.len(), "Document written");
    Ok(())
  }
}
