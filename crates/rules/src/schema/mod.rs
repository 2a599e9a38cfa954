//! Normalized in-memory rule model.
//!
//! - `Rule`: title, source path, typed condition and ordered selections
//! - `Selection` / `FieldConstraint`: named conjunctive constraint groups
//! - `Pattern` / `ExpectedValue`: literal, glob and list expectations
//! - `MatchResult`: one rule firing on one event record

mod condition;
mod constraint;
mod rule;

pub use condition::*;
pub use constraint::*;
pub use rule::*;
