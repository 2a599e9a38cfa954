//! Filesystem rule loader.
//!
//! Walks the rules directory, parses every YAML rule file and normalizes it
//! into a [`Rule`](crate::schema::Rule). Malformed files are skipped with a
//! warning and reported per file.

mod core;
mod error;
mod parse;


pub use self::core::RuleLoader;
pub use self::error::{LoadResult, LoadStatus, Result, RuleError};
pub use self::parse::rule_from_yaml;
