//! Small utility helpers used across modules.

use chrono::{Local, SecondsFormat};

/// Local wall-clock time as RFC3339, the format every persisted timestamp uses.
pub fn now_iso() -> String {
  Local::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with whole agent replies or participant free text.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// Treat `None`, empty and whitespace-only strings alike.
pub fn is_blank(s: Option<&str>) -> bool {
  s.map(|v| v.trim().is_empty()).unwrap_or(true)
}
