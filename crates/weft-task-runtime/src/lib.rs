//! Weft Task Runtime
//!
//! The seam between the engine and the units of work it runs. Every node type
//! is backed by a [`NodeExecutor`] registered under an explicit identifier in
//! an [`ExecutorRegistry`]. Executors receive their resolved parameters as a
//! [`NodeInput`] and return a raw JSON value that the engine normalizes into a
//! [`NodeResult`].

mod error;
mod executor;
mod registry;
mod result;
mod retry;

pub use error::ExecutorError;
pub use executor::{FnExecutor, NodeExecutor, NodeInput, NodeKind};
pub use registry::{ExecutorRegistry, derive_identifier};
pub use result::{NodeResult, NodeStatus};
pub use retry::{DeclaredRetryPolicy, NeverRetry, RetryPolicy};
