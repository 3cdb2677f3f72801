use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Flow-wide execution knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Extra attempts after the first one, for errors the retry policy accepts.
  pub max_retries: u32,
  /// Per-node timeout. Nodes without a value fall back to their executor's default.
  pub timeout_seconds: Option<f64>,
  /// Bound on the whole run.
  pub sandbox_timeout_seconds: Option<f64>,
  /// Pause between retry attempts.
  pub retry_delay_ms: u64,
  /// Log resolved parameters at debug level.
  pub debug: bool,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      max_retries: 0,
      timeout_seconds: None,
      sandbox_timeout_seconds: None,
      retry_delay_ms: 0,
      debug: false,
    }
  }
}

impl Settings {
  pub fn node_timeout(&self) -> Option<Duration> {
    self.timeout_seconds.and_then(seconds_to_duration)
  }

  pub fn sandbox_timeout(&self) -> Option<Duration> {
    self.sandbox_timeout_seconds.and_then(seconds_to_duration)
  }

  pub fn retry_delay(&self) -> Duration {
    Duration::from_millis(self.retry_delay_ms)
  }
}

/// Convert a seconds value from a definition into a duration.
///
/// Non-positive and non-finite values mean "no timeout".
pub(crate) fn seconds_to_duration(seconds: f64) -> Option<Duration> {
  if seconds.is_finite() && seconds > 0.0 {
    Some(Duration::from_secs_f64(seconds))
  } else {
    None
  }
}
