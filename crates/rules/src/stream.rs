//! Single-pass evaluation over a line-delimited JSON event export.
//!
//! One record is held in memory at a time and tested against every loaded
//! rule, so memory grows with the rule count, not the export size.

use std::io::BufRead;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::evaluator::RuleEvaluator;
use crate::schema::{MatchResult, Rule};

/// Counters for one pass over an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Well-formed records evaluated.
    pub records: u64,
    /// Non-blank lines skipped because they were not a JSON object.
    pub malformed: u64,
    pub matches: u64,
}

/// Evaluate every record of `reader` against `rules`, handing each match to
/// `sink` in record order.
///
/// Malformed lines (invalid UTF-8, invalid JSON, non-object values) are
/// counted and skipped. Only a read failure on the underlying reader is
/// returned as an error.
pub fn evaluate_export<R, F>(rules: &[Rule], mut reader: R, mut sink: F) -> std::io::Result<StreamStats>
where
    R: BufRead,
    F: FnMut(MatchResult),
{
    let mut stats = StreamStats::default();
    let mut line = Vec::new();
    let mut line_no = 0u64;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        line_no += 1;

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let record: Value = match serde_json::from_slice(&line) {
            Ok(v @ Value::Object(_)) => v,
            Ok(_) => {
                debug!(line = line_no, "skipping non-object record");
                stats.malformed += 1;
                continue;
            }
            Err(e) => {
                debug!(line = line_no, error = %e, "skipping malformed record");
                stats.malformed += 1;
                continue;
            }
        };

        stats.records += 1;
        for result in RuleEvaluator::evaluate(rules, &record) {
            stats.matches += 1;
            sink(result);
        }
    }

    Ok(stats)
}
