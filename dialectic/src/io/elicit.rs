//! Elicitation backends.
//!
//! The [`Elicitor`] trait decouples the session loop from wherever
//! responses actually come from (a terminal, a scripted transcript, a
//! remote queue). Tests use scripted elicitors that return predetermined
//! lines without touching stdin.

use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};

use crate::driver::ResponseRequest;

pub trait Elicitor {
    /// Obtain one line of operator input for `request`.
    fn elicit(&mut self, request: &ResponseRequest) -> Result<String>;
}

/// Plain stdin/stdout elicitor: print the observation and error context,
/// show the prompt, read one line.
#[derive(Debug, Default)]
pub struct StdioElicitor;

impl Elicitor for StdioElicitor {
    fn elicit(&mut self, request: &ResponseRequest) -> Result<String> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        writeln!(out).context("write observation")?;
        writeln!(out, "{}", request.observation).context("write observation")?;
        if let Some(error) = &request.error {
            writeln!(out, "{error}").context("write error context")?;
            writeln!(out).context("write error context")?;
        }
        write!(out, "{}", request.prompt).context("write prompt")?;
        out.flush().context("flush prompt")?;

        let mut line = String::new();
        let read = std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read response")?;
        if read == 0 {
            bail!("input closed before the session finished");
        }
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }
}
