//! Concrete pipeline stages, one per external analysis tool.

pub mod hayabusa;
pub mod memory;
pub mod sigma;
pub mod timeline;
pub mod yara;

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::stage::{Stage, StageError, StageContext};
use crate::tool::Invocation;

pub use hayabusa::HayabusaStage;
pub use memory::MemoryStage;
pub use sigma::SigmaStage;
pub use timeline::TimelineStage;
pub use yara::YaraStage;

/// The default stage list, in execution order.
pub fn default_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(TimelineStage),
        Box::new(SigmaStage),
        Box::new(YaraStage),
        Box::new(MemoryStage),
        Box::new(HayabusaStage),
    ]
}

/// Lines of tool output kept in error messages.
const OUTPUT_TAIL_LINES: usize = 20;

/// Run a tool whose job is to produce `primary`.
///
/// A file already at `primary` is removed first, so it can only exist
/// afterwards if this invocation wrote it. A non-zero exit is tolerated when
/// `primary` exists afterwards; the returned note records the exit status in
/// that case.
pub(crate) fn run_producing(
    ctx: &StageContext<'_>,
    invocation: &Invocation,
    primary: &Path,
) -> Result<Option<String>, StageError> {
    if primary.is_file() {
        debug!(path = %primary.display(), "removing stale tool output");
        fs::remove_file(primary)?;
    }
    let output = ctx.runner.run(invocation)?;
    debug!(command = %invocation, status = %output.status_text(), "tool finished");

    if output.success() {
        return Ok(None);
    }
    if primary.exists() {
        warn!(
            command = %invocation,
            status = %output.status_text(),
            "tool exited abnormally but produced its output"
        );
        return Ok(Some(format!(
            "{} {} tolerated",
            invocation.program,
            output.status_text()
        )));
    }
    Err(StageError::tool_failure(format!(
        "{} failed with {}: {}",
        invocation.program,
        output.status_text(),
        output.tail(OUTPUT_TAIL_LINES)
    )))
}

/// Write `value` as pretty-printed JSON, creating parent directories.
pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Join optional detail notes with `"; "`.
pub(crate) fn join_notes<I: IntoIterator<Item = Option<String>>>(notes: I) -> Option<String> {
    let notes: Vec<String> = notes.into_iter().flatten().collect();
    (!notes.is_empty()).then(|| notes.join("; "))
}
