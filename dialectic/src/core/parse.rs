//! The text command surface.
//!
//! A line of input decodes into exactly one [`Command`]; anything that does
//! not fit the grammar becomes [`CommandKind::Malformed`], which the loop
//! surfaces as a syntax error without touching machine state. Messages are
//! free text with `#n` pointers, `&n` register references, and
//! parenthesized sub-messages.

use std::sync::OnceLock;

use regex::Regex;

use crate::core::budget::Budget;
use crate::core::command::{Command, CommandKind};
use crate::core::message::{Message, Referent};

fn head_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-z]+)(\d+)?(?:\s+(.*))?$").expect("static regex"))
}

fn index_then_rest_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\s+(.*)$").expect("static regex"))
}

fn and_index_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^and\s+(\d+)\s+(.*)$").expect("static regex"))
}

fn with_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^with\s+(.*)$").expect("static regex"))
}

/// Decode one line of input. Never fails: unrecognized text yields a
/// `Malformed` command carrying the original line.
pub fn parse_command(line: &str) -> Command {
    let source = line.trim();
    let kind = parse_kind(source).unwrap_or(CommandKind::Malformed);
    Command::new(kind, source)
}

fn parse_kind(line: &str) -> Option<CommandKind> {
    let captures = head_re().captures(line)?;
    let verb = captures.get(1).map(|m| m.as_str())?;
    let attached = captures.get(2).map(|m| m.as_str());
    let rest = captures.get(3).map(|m| m.as_str()).unwrap_or("");

    // Only `ask` takes an attached budget literal (`ask100 ...`).
    if attached.is_some() && verb != "ask" {
        return None;
    }

    match verb {
        "ask" => {
            let budget = match attached {
                Some(digits) => {
                    let budget = Budget::Finite(digits.parse().ok()?);
                    if !budget.is_power_of_ten() {
                        return None;
                    }
                    Some(budget)
                }
                None => None,
            };
            Some(CommandKind::Ask {
                budget,
                message: parse_message(rest)?,
            })
        }
        "reply" => Some(CommandKind::Reply {
            message: parse_message(rest)?,
        }),
        "say" | "note" => Some(CommandKind::Say {
            message: parse_message(rest)?,
        }),
        "assert" => Some(CommandKind::Assert {
            message: parse_message(rest)?,
            failed: false,
        }),
        "view" => Some(CommandKind::View { n: parse_index(rest)? }),
        "clear" => Some(CommandKind::Clear { n: parse_index(rest)? }),
        "more" => Some(CommandKind::More { n: parse_index(rest)? }),
        "fix" => Some(CommandKind::Fix { n: parse_index(rest)? }),
        "raise" => {
            let (n, rest) = split_index(rest)?;
            Some(CommandKind::Raise {
                n,
                message: parse_message(rest)?,
            })
        }
        "resume" => {
            let (n, rest) = split_index(rest)?;
            Some(CommandKind::Resume {
                n,
                message: parse_message(rest)?,
            })
        }
        "replace" => {
            let (first, mut rest) = split_index(rest)?;
            let mut ns = vec![first];
            while let Some(captures) = and_index_re().captures(rest) {
                ns.push(captures.get(1)?.as_str().parse().ok()?);
                rest = captures.get(2)?.as_str();
            }
            if let Some(captures) = with_re().captures(rest) {
                rest = captures.get(1)?.as_str();
            }
            Some(CommandKind::Replace {
                ns,
                message: parse_message(rest)?,
            })
        }
        _ => None,
    }
}

fn parse_index(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn split_index(s: &str) -> Option<(usize, &str)> {
    let captures = index_then_rest_re().captures(s)?;
    let n = captures.get(1)?.as_str().parse().ok()?;
    Some((n, captures.get(2)?.as_str()))
}

/// Parse free text with embedded `#n` pointers, `&n` register references,
/// and `(...)` sub-messages. Returns `None` on unbalanced parentheses or a
/// dangling `#`/`&`.
pub fn parse_message(s: &str) -> Option<Message> {
    let mut parser = MessageParser { input: s, pos: 0 };
    let message = parser.message()?;
    if parser.pos != s.len() {
        return None;
    }
    Some(message)
}

struct MessageParser<'a> {
    input: &'a str,
    pos: usize,
}

impl MessageParser<'_> {
    fn message(&mut self) -> Option<Message> {
        let mut text = vec![self.prose()];
        let mut args = Vec::new();
        loop {
            match self.peek() {
                Some(b'#') => {
                    self.pos += 1;
                    args.push(Referent::Pointer(self.number()?));
                }
                Some(b'&') => {
                    self.pos += 1;
                    args.push(Referent::Register(self.number()?));
                }
                Some(b'(') => {
                    self.pos += 1;
                    let inner = self.message()?;
                    if self.peek() != Some(b')') {
                        return None;
                    }
                    self.pos += 1;
                    args.push(Referent::Msg(inner));
                }
                _ => break,
            }
            text.push(self.prose());
        }
        Some(Message::new(text, args))
    }

    fn prose(&mut self) -> String {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if matches!(byte, b'#' | b'&' | b'(' | b')') {
                break;
            }
            self.pos += 1;
        }
        self.input[start..self.pos].to_string()
    }

    fn number(&mut self) -> Option<usize> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        self.input[start..self.pos].parse().ok()
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }
}
