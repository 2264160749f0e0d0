//! Bridge to the external coding-agent CLI.
//!
//! The agent is driven purely through its process interface: argv in,
//! exit status + stdout/stderr out. No shell is involved, so prompts and
//! session ids are passed as opaque arguments.
//!
//! New session ids are discovered by picking the most recently modified file
//! in the agent's log directory right after the create call returns. Two
//! sessions created at the same moment can therefore swap ids; the CLI offers
//! no other way to learn the id.

use std::{
  ffi::OsString,
  path::{Path, PathBuf},
  process::Stdio,
  time::{Duration, SystemTime},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info, instrument};

use crate::config::{home_dir, AgentSettings};

#[derive(Debug, Error)]
pub enum AgentError {
  #[error("Timeout: agent {op} took longer than {secs} seconds")]
  Timeout { op: &'static str, secs: u64 },
  #[error("Failed to {op}: {stderr}")]
  Failed { op: &'static str, stderr: String },
  #[error("Failed to retrieve session ID from agent logs in {0}")]
  NoSessionId(String),
  #[error("Failed to run agent binary `{bin}`: {source}")]
  Spawn { bin: String, source: std::io::Error },
}

/// Anything that can hold a conversation with the code under study.
#[async_trait]
pub trait AgentBackend: Send + Sync {
  /// Start a session primed with `initial_prompt`; returns its id.
  async fn create_session(&self, initial_prompt: Option<&str>) -> Result<String, AgentError>;

  /// Send `message` within an existing session and return the reply text.
  async fn send(&self, session_id: &str, message: &str) -> Result<String, AgentError>;
}

#[derive(Clone, Debug)]
pub struct CliAgent {
  pub binary: String,
  pub model: String,
  pub project_path: PathBuf,
  pub logs_dir: PathBuf,
  pub create_timeout: Duration,
  pub send_timeout: Duration,
}

impl CliAgent {
  pub fn from_settings(s: &AgentSettings) -> Self {
    Self {
      binary: s.binary.clone(),
      model: s.model.clone(),
      project_path: s.project_path.clone(),
      logs_dir: s.resolved_logs_dir(),
      create_timeout: s.create_timeout(),
      send_timeout: s.send_timeout(),
    }
  }

  fn create_args(&self, prompt: &str) -> Vec<String> {
    vec![
      "-p".into(),
      prompt.into(),
      "--model".into(),
      self.model.clone(),
      "-s".into(),
      "--allow-all-tools".into(),
    ]
  }

  fn send_args(&self, session_id: &str, message: &str) -> Vec<String> {
    vec![
      "--model".into(),
      self.model.clone(),
      "--resume".into(),
      session_id.into(),
      "-p".into(),
      message.into(),
      "-s".into(),
      "--allow-all-tools".into(),
    ]
  }

  /// `~/.local/bin` first, so user-installed agent CLIs resolve.
  fn search_path() -> OsString {
    let mut dirs = vec![home_dir().join(".local").join("bin")];
    if let Some(existing) = std::env::var_os("PATH") {
      dirs.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(dirs).unwrap_or_default()
  }

  /// Run the binary with `args`; Ok(stdout) on exit status 0.
  async fn run(&self, op: &'static str, args: Vec<String>, limit: Duration) -> Result<String, AgentError> {
    let mut cmd = Command::new(&self.binary);
    cmd
      .args(&args)
      .current_dir(&self.project_path)
      .env("PATH", Self::search_path())
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let child = cmd.spawn().map_err(|source| AgentError::Spawn { bin: self.binary.clone(), source })?;

    // Dropping the wait future on timeout kills the child (kill_on_drop).
    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
      Ok(Ok(out)) => out,
      Ok(Err(source)) => return Err(AgentError::Spawn { bin: self.binary.clone(), source }),
      Err(_) => {
        error!(target: "agent", op, secs = limit.as_secs(), "Agent call timed out");
        return Err(AgentError::Timeout { op, secs: limit.as_secs() });
      }
    };

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      let stderr = if stderr.is_empty() { "Unknown error".to_string() } else { stderr };
      error!(target: "agent", op, code = ?output.status.code(), "Agent exited unsuccessfully");
      return Err(AgentError::Failed { op, stderr });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }
}

#[async_trait]
impl AgentBackend for CliAgent {
  #[instrument(level = "info", skip(self, initial_prompt), fields(bin = %self.binary, model = %self.model, has_prompt = initial_prompt.is_some()))]
  async fn create_session(&self, initial_prompt: Option<&str>) -> Result<String, AgentError> {
    let prompt = initial_prompt.filter(|p| !p.trim().is_empty()).unwrap_or(".");
    self.run("create chat", self.create_args(prompt), self.create_timeout).await?;

    let id = newest_session_id(&self.logs_dir)
      .await
      .ok_or_else(|| AgentError::NoSessionId(self.logs_dir.display().to_string()))?;
    info!(target: "agent", session_id = %id, "Agent session created");
    Ok(id)
  }

  #[instrument(level = "info", skip(self, message), fields(%session_id, message_len = message.len()))]
  async fn send(&self, session_id: &str, message: &str) -> Result<String, AgentError> {
    let started = std::time::Instant::now();
    let reply = self.run("ask agent", self.send_args(session_id, message), self.send_timeout).await?;
    info!(target: "agent", elapsed = ?started.elapsed(), reply_len = reply.len(), "Agent replied");
    Ok(reply.trim().to_string())
  }
}

/// Stem of the most recently modified entry in `logs_dir`, minus any
/// `session-` prefix.
pub async fn newest_session_id(logs_dir: &Path) -> Option<String> {
  let mut entries = tokio::fs::read_dir(logs_dir).await.ok()?;
  let mut newest: Option<(SystemTime, PathBuf)> = None;
  while let Ok(Some(entry)) = entries.next_entry().await {
    let Ok(meta) = entry.metadata().await else { continue };
    let Ok(modified) = meta.modified() else { continue };
    if newest.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
      newest = Some((modified, entry.path()));
    }
  }

  let (_, path) = newest?;
  let name = path.file_name()?.to_string_lossy().into_owned();
  let stem = name.strip_suffix(".log").unwrap_or(&name);
  let id = stem.strip_prefix("session-").unwrap_or(stem);
  if id.is_empty() {
    None
  } else {
    Some(id.to_string())
  }
}
