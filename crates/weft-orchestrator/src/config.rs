use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use weft_resolver::{EnvironmentValues, FilterRegistry};
use weft_task_runtime::{DeclaredRetryPolicy, RetryPolicy};

/// Engine-wide configuration.
///
/// Flow settings take precedence where both specify a value.
#[derive(Clone)]
pub struct EngineConfig {
  /// Node timeout when neither the node, the flow nor the executor sets one.
  pub default_node_timeout: Option<Duration>,
  /// Whole-run bound when the flow does not set `sandbox_timeout_seconds`.
  pub sandbox_timeout: Option<Duration>,
  /// Values for `{{ env.NAME }}`, consulted before the process environment.
  pub environment: HashMap<String, String>,
  /// Whether `{{ env.NAME }}` may read the process environment.
  pub inherit_process_env: bool,
  pub retry_policy: Arc<dyn RetryPolicy>,
  pub filters: FilterRegistry,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      default_node_timeout: Some(Duration::from_secs(300)),
      sandbox_timeout: None,
      environment: HashMap::new(),
      inherit_process_env: true,
      retry_policy: Arc::new(DeclaredRetryPolicy),
      filters: FilterRegistry::with_builtins(),
    }
  }
}

impl std::fmt::Debug for EngineConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut env_names: Vec<&str> = self.environment.keys().map(|k| k.as_str()).collect();
    env_names.sort_unstable();
    f.debug_struct("EngineConfig")
      .field("default_node_timeout", &self.default_node_timeout)
      .field("sandbox_timeout", &self.sandbox_timeout)
      .field("environment", &env_names)
      .field("inherit_process_env", &self.inherit_process_env)
      .field("filters", &self.filters)
      .finish_non_exhaustive()
  }
}

impl EngineConfig {
  pub fn with_default_node_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.default_node_timeout = timeout;
    self
  }

  pub fn with_sandbox_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.sandbox_timeout = timeout;
    self
  }

  pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.environment.insert(name.into(), value.into());
    self
  }

  pub fn with_inherit_process_env(mut self, inherit: bool) -> Self {
    self.inherit_process_env = inherit;
    self
  }

  pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
    self.retry_policy = Arc::new(policy);
    self
  }

  pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
    self.filters = filters;
    self
  }

  pub(crate) fn environment_values(&self) -> EnvironmentValues {
    let mut values = if self.inherit_process_env {
      EnvironmentValues::from_process()
    } else {
      EnvironmentValues::isolated()
    };
    for (name, value) in &self.environment {
      values.insert(name.clone(), value.clone());
    }
    values
  }
}
