//! Scripted elicitation for `replay` and for tests.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::driver::ResponseRequest;
use crate::io::elicit::Elicitor;

/// Returns pre-written responses in order, one per prompt.
#[derive(Debug, Clone, Default)]
pub struct ScriptElicitor {
    lines: VecDeque<String>,
}

impl ScriptElicitor {
    pub fn new<I, S>(lines: I) -> ScriptElicitor
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptElicitor {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a transcript: one response per line, blank lines and `//`
    /// comments skipped. (`#` is a pointer sigil, so it can't mark
    /// comments here.)
    pub fn from_transcript(contents: &str) -> ScriptElicitor {
        ScriptElicitor::new(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with("//")),
        )
    }

    pub fn from_path(path: &Path) -> Result<ScriptElicitor> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Ok(ScriptElicitor::from_transcript(&contents))
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl Elicitor for ScriptElicitor {
    fn elicit(&mut self, request: &ResponseRequest) -> Result<String> {
        match self.lines.pop_front() {
            Some(line) => Ok(line),
            None => bail!(
                "script exhausted while waiting at a {} prompt",
                request.kind.label()
            ),
        }
    }
}
