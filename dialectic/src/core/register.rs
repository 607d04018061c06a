//! A register: one memory cell of the machine.

use serde::{Deserialize, Serialize};

use crate::core::command::Command;
use crate::core::message::Message;

/// An ordered tuple of messages (typically a rendered question and its
/// answer, or a single statement) plus the command that last wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    pub contents: Vec<Message>,
    pub cmd: Option<Command>,
}

impl Register {
    pub fn new(contents: Vec<Message>, cmd: Option<Command>) -> Register {
        Register { contents, cmd }
    }
}
