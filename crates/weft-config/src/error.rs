use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning definition text into a [`crate::FlowDef`].
#[derive(Debug, Error)]
pub enum ParseError {
  /// The document is not a well-formed flow definition.
  #[error("malformed flow definition: {0}")]
  Json(#[from] serde_json::Error),

  /// The definition file could not be read.
  #[error("failed to read flow definition '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}
