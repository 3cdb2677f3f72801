//! Template resolution for weft.
//!
//! Node parameters may embed `{{ expression }}` markers referencing node
//! results, workflow parameters, the run input, the key store and declared
//! environment variables, with filters, fallbacks and `{#if}`/`{#each}`
//! blocks. Resolution is synchronous. A reference to a node without a result
//! yields [`ResolutionError::DependencyPending`] so the orchestrator can run
//! the dependency first.

mod cache;
mod coerce;
mod context;
mod env;
mod error;
mod expr;
pub mod expression;
mod filters;
mod path;
mod resolver;
mod template;
mod value;

pub use cache::{CacheStats, ResolutionCache};
pub use coerce::{coerce_param, coerce_str};
pub use context::{ContextSummary, ExecutionContext};
pub use env::EnvironmentValues;
pub use error::ResolutionError;
pub use filters::{FilterFn, FilterRegistry};
pub use path::{PATH_STRATEGIES, Segment, parse_path, resolve_in_result};
pub use resolver::Resolver;
pub use value::{as_number, is_empty, is_truthy, number_value, to_display};
