//! Study configuration: TOML file (STUDY_CONFIG_PATH) plus environment overrides.
//!
//! Every section is optional; missing keys fall back to the defaults below.
//!
//! ```toml
//! data_dir = "responses"
//! requirements_path = "NFR.json"
//! corpus_path = "All_NFRs.txt"
//! admin_password = "change-me"
//!
//! [study]
//! page_size = 10
//! forced_ratio = 0.2
//! allocation = "fixed"        # or "greedy"
//! fixed_batches = [1, 2, 3]
//!
//! [agent]
//! binary = "copilot"
//! model = "gpt-5.1-codex-max"
//! project_path = "/srv/iTrust"
//!
//! [sessions]
//! max_sessions = 256
//! idle_ttl_secs = 7200
//! ```

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
  pub port: u16,
  pub data_dir: PathBuf,
  pub requirements_path: PathBuf,
  /// Plain-text NFR corpus; used to build `requirements_path` when it is missing.
  pub corpus_path: Option<PathBuf>,
  pub pages_dir: PathBuf,
  pub consent_dir: PathBuf,
  pub static_dir: PathBuf,
  /// Admin endpoints answer 403 while this is unset.
  pub admin_password: Option<String>,
  pub study: StudySettings,
  pub agent: AgentSettings,
  pub sessions: SessionSettings,
}

impl Default for StudyConfig {
  fn default() -> Self {
    Self {
      port: 5000,
      data_dir: PathBuf::from("responses"),
      requirements_path: PathBuf::from("NFR.json"),
      corpus_path: None,
      pages_dir: PathBuf::from("pages"),
      consent_dir: PathBuf::from("consent_forms"),
      static_dir: PathBuf::from("static"),
      admin_password: None,
      study: StudySettings::default(),
      agent: AgentSettings::default(),
      sessions: SessionSettings::default(),
    }
  }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
  /// Every participant gets `fixed_batches`.
  #[default]
  Fixed,
  /// First batches with spare capacity, in index order.
  Greedy,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StudySettings {
  pub page_size: usize,
  pub forced_ratio: f64,
  pub allocation: AllocationMode,
  pub fixed_batches: Vec<u32>,
  pub batches_per_participant: usize,
  pub batch_capacity: usize,
}

impl Default for StudySettings {
  fn default() -> Self {
    Self {
      page_size: 10,
      forced_ratio: 0.2,
      allocation: AllocationMode::Fixed,
      fixed_batches: vec![1, 2, 3],
      batches_per_participant: 3,
      batch_capacity: 2,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
  pub binary: String,
  pub model: String,
  pub project_path: PathBuf,
  /// Where the agent CLI drops one log file per session. Defaults to `~/.copilot/logs`.
  pub logs_dir: Option<PathBuf>,
  pub instruction_prompt_path: PathBuf,
  pub create_timeout_secs: u64,
  pub send_timeout_secs: u64,
}

impl Default for AgentSettings {
  fn default() -> Self {
    Self {
      binary: "copilot".into(),
      model: "gpt-5.1-codex-max".into(),
      project_path: PathBuf::from("."),
      logs_dir: None,
      instruction_prompt_path: PathBuf::from("instruction_prompt.txt"),
      create_timeout_secs: 180,
      send_timeout_secs: 600,
    }
  }
}

impl AgentSettings {
  pub fn create_timeout(&self) -> Duration {
    Duration::from_secs(self.create_timeout_secs)
  }

  pub fn send_timeout(&self) -> Duration {
    Duration::from_secs(self.send_timeout_secs)
  }

  pub fn resolved_logs_dir(&self) -> PathBuf {
    self.logs_dir.clone().unwrap_or_else(|| home_dir().join(".copilot").join("logs"))
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
  pub max_sessions: usize,
  pub idle_ttl_secs: u64,
}

impl Default for SessionSettings {
  fn default() -> Self {
    Self { max_sessions: 256, idle_ttl_secs: 2 * 60 * 60 }
  }
}

pub fn home_dir() -> PathBuf {
  std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

impl StudyConfig {
  /// Load from STUDY_CONFIG_PATH (if set), then apply environment overrides.
  /// A broken config file is logged and ignored rather than aborting startup.
  pub fn from_env() -> Self {
    let mut cfg = match std::env::var("STUDY_CONFIG_PATH") {
      Ok(path) => match std::fs::read_to_string(&path) {
        Ok(s) => match toml::from_str::<StudyConfig>(&s) {
          Ok(cfg) => {
            info!(target: "nfr_study", %path, "Loaded study config (TOML)");
            cfg
          }
          Err(e) => {
            error!(target: "nfr_study", %path, error = %e, "Failed to parse TOML config; using defaults");
            StudyConfig::default()
          }
        },
        Err(e) => {
          error!(target: "nfr_study", %path, error = %e, "Failed to read TOML config file; using defaults");
          StudyConfig::default()
        }
      },
      Err(_) => StudyConfig::default(),
    };
    cfg.apply_env(|key| std::env::var(key).ok());
    cfg
  }

  /// Overlay individual settings from the environment (looked up through `get`).
  pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
    if let Some(port) = get("PORT").and_then(|p| p.parse::<u16>().ok()) {
      self.port = port;
    }
    if let Some(dir) = get("DATA_DIR") {
      self.data_dir = PathBuf::from(dir);
    }
    if let Some(pw) = get("ADMIN_PASSWORD").filter(|p| !p.is_empty()) {
      self.admin_password = Some(pw);
    }
    if let Some(bin) = get("AGENT_BIN") {
      self.agent.binary = bin;
    }
    if let Some(model) = get("AGENT_MODEL") {
      self.agent.model = model;
    }
    if let Some(path) = get("AGENT_PROJECT_PATH") {
      self.agent.project_path = PathBuf::from(path);
    }
    if let Some(dir) = get("AGENT_LOGS_DIR") {
      self.agent.logs_dir = Some(PathBuf::from(dir));
    }
  }
}
