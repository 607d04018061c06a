//! The command sum type.
//!
//! A [`Command`] couples the parsed operation with the raw line it came
//! from and the generation of the machine snapshot taken just before it
//! executed. Registers keep the command that last wrote them as
//! provenance, which is what `raise`, `fix`, `resume`, and `more` navigate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::arena::StateId;
use crate::core::budget::Budget;
use crate::core::message::Message;

/// User-recoverable command failure. The session re-prompts with the
/// explanation; machine state is unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadCommand(pub String);

impl BadCommand {
    pub fn new(explanation: impl Into<String>) -> BadCommand {
        BadCommand(explanation.into())
    }
}

impl fmt::Display for BadCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadCommand {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Pose a sub-question, spawning an opposite-kind child machine unless
    /// the builtin oracle answers it outright.
    Ask {
        budget: Option<Budget>,
        message: Message,
    },
    /// Produce this machine's terminal value.
    Reply { message: Message },
    /// Record a statement in a fresh register (`say` / `note`).
    Say { message: Message },
    /// Delete register `n` (never register 0).
    Clear { n: usize },
    /// `say` the message, then clear each listed register in order.
    Replace { ns: Vec<usize>, message: Message },
    /// Expand argument `n` in place everywhere it is referenced.
    View { n: usize },
    /// Report a problem to the context that produced register `n`.
    Raise { n: usize, message: Message },
    /// Re-enter the state just before the command that wrote register `n`.
    Fix { n: usize },
    /// Re-enter the interrupted computation behind register `n` with a
    /// follow-up message and one more budget window.
    Resume { n: usize, message: Message },
    /// Re-enter the interrupted computation behind register `n` with a
    /// tenfold budget.
    More { n: usize },
    /// Check a pending raise by posing a yes/no sub-question. `failed`
    /// records an assertion whose answer was not "yes".
    Assert { message: Message, failed: bool },
    /// Unparseable input; surfaced as a syntax error, never executed.
    Malformed,
    /// Pseudo-command synthesized when the budget runs out before a
    /// terminal value is produced. `exhausted` distinguishes "used its own
    /// nominal budget" from "capped by the parent's window"; `previous` is
    /// the command that was active at interruption.
    Interrupted {
        exhausted: bool,
        previous: Option<Box<Command>>,
        budget_consumed: u64,
    },
    /// Provenance marker for a register answered by the builtin oracle.
    Builtin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    /// The raw line as typed; empty for synthesized commands.
    pub source: String,
    /// Snapshot taken just before this command executed.
    pub state: Option<StateId>,
}

impl Command {
    pub fn new(kind: CommandKind, source: impl Into<String>) -> Command {
        Command {
            kind,
            source: source.into(),
            state: None,
        }
    }

    pub fn with_state(mut self, state: StateId) -> Command {
        self.state = Some(state);
        self
    }

    /// The command a `fix` should re-enter: the one whose elicited response
    /// produced this register's content. Interruptions defer to the command
    /// that was active when the budget ran out; oracle answers have no
    /// response to re-elicit.
    pub fn command_for_fix(&self) -> Option<&Command> {
        match &self.kind {
            CommandKind::Interrupted { previous, .. } => {
                previous.as_deref().and_then(Command::command_for_fix)
            }
            CommandKind::Builtin | CommandKind::Malformed => None,
            _ => Some(self),
        }
    }

    /// The command whose context a `raise` should jump into.
    pub fn command_for_raise(&self) -> Option<&Command> {
        match &self.kind {
            CommandKind::Builtin | CommandKind::Malformed => None,
            _ => Some(self),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.kind, CommandKind::Interrupted { .. })
    }

    /// True if an `assert` may follow a register written by this command:
    /// a pending raise, or an assert whose check failed.
    pub fn allows_assert(&self) -> bool {
        matches!(
            self.kind,
            CommandKind::Raise { .. } | CommandKind::Assert { failed: true, .. }
        )
    }
}
