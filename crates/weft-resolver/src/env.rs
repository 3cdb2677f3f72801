use std::collections::HashMap;

/// Source for `{{ env.NAME }}` references.
///
/// Explicit values win over the process environment. Whether a name may be
/// referenced at all is decided by the workflow's declared environment.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentValues {
  values: HashMap<String, String>,
  inherit_process: bool,
}

impl EnvironmentValues {
  /// Explicit values only.
  pub fn isolated() -> Self {
    Self::default()
  }

  /// Explicit values, falling back to the process environment.
  pub fn from_process() -> Self {
    Self {
      values: HashMap::new(),
      inherit_process: true,
    }
  }

  pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.values.insert(name.into(), value.into());
    self
  }

  pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.values.insert(name.into(), value.into());
  }

  pub fn get(&self, name: &str) -> Option<String> {
    self
      .values
      .get(name)
      .cloned()
      .or_else(|| self.inherit_process.then(|| std::env::var(name).ok()).flatten())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_explicit_values() {
    let env = EnvironmentValues::isolated().with("API_KEY", "k-1");
    assert_eq!(env.get("API_KEY").as_deref(), Some("k-1"));
    assert_eq!(env.get("PATH"), None);
  }
}
