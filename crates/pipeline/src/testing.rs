//! Test doubles for the tool seam.

use std::sync::Mutex;

use crate::tool::{Invocation, ToolError, ToolOutput, ToolRunner};

type Responder = Box<dyn Fn(&Invocation) -> Result<ToolOutput, ToolError>>;

/// [`ToolRunner`] that records every invocation and answers through a
/// closure. The closure may also write files to simulate a tool's side
/// effects.
pub struct RecordingRunner {
    respond: Responder,
    calls: Mutex<Vec<Invocation>>,
}

impl RecordingRunner {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&Invocation) -> Result<ToolOutput, ToolError> + 'static,
    {
        Self {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every tool exits 0 with no output.
    pub fn succeeding() -> Self {
        Self::new(|_| Ok(ToolOutput::ok("")))
    }

    /// No tool is installed.
    pub fn missing() -> Self {
        Self::new(|inv| {
            Err(ToolError::NotFound {
                program: inv.program.clone(),
            })
        })
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Programs invoked, in call order.
    pub fn programs(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.program).collect()
    }
}

impl ToolRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, ToolError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(invocation.clone());
        (self.respond)(invocation)
    }
}
