//! Test-only helpers for driving scripted sessions.

use crate::core::message::{Message, Referent};
use crate::core::oracle::Oracle;
use crate::core::parse::parse_message;
use crate::io::cache::MemoryCache;
use crate::io::script::ScriptElicitor;
use crate::session::Caches;

/// Parse a message literal, panicking on syntax errors (test input is
/// author-controlled).
pub fn msg(text: &str) -> Message {
    parse_message(text).expect("well-formed test message")
}

pub fn ptr(n: usize) -> Referent {
    Referent::Pointer(n)
}

pub fn sub(text: &str) -> Referent {
    Referent::Msg(msg(text))
}

/// An elicitor that replays the given responses in order.
pub fn scripted(lines: &[&str]) -> ScriptElicitor {
    ScriptElicitor::new(lines.iter().copied())
}

/// Fresh in-memory caches for both machine kinds.
pub fn memory_caches() -> Caches<MemoryCache> {
    Caches {
        implement: MemoryCache::new(),
        translate: MemoryCache::new(),
    }
}

/// Table-driven oracle: answers any question whose text matches one of
/// the registered templates (`[]` per argument slot).
#[derive(Debug, Clone, Default)]
pub struct TableOracle {
    entries: Vec<(String, Message)>,
}

impl TableOracle {
    pub fn new() -> TableOracle {
        TableOracle::default()
    }

    pub fn with(mut self, template: &str, answer: Message) -> TableOracle {
        self.entries.push((template.to_string(), answer));
        self
    }
}

impl Oracle for TableOracle {
    fn answer(&self, question: &Message) -> Option<Message> {
        self.entries
            .iter()
            .find(|(template, _)| question.matches(template))
            .map(|(_, answer)| answer.clone())
    }
}
