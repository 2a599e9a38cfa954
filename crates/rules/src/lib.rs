//! Selection-based detection rule engine.
//!
//! This crate provides:
//! - YAML rule loading into a normalized, immutable rule model
//! - Dotted-path field resolution over arbitrary JSON records
//! - Selection matching with literal, glob, list and modifier semantics
//! - Single-pass rule evaluation over line-delimited event exports

pub mod evaluator;
pub mod loader;
pub mod schema;
pub mod stream;

pub use evaluator::RuleEvaluator;
pub use loader::{LoadResult, LoadStatus, RuleError, RuleLoader};
pub use schema::{Condition, MatchResult, Rule};
pub use stream::{evaluate_export, StreamStats};
