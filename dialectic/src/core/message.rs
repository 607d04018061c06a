//! The message and referent model.
//!
//! A [`Message`] is an immutable alternation of literal text fragments and
//! [`Referent`]s, with `text.len() == args.len() + 1`. Messages are plain
//! value types with structural equality, so they can key caches and be
//! shared freely between machine snapshots.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Anything a message can embed as an argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Referent {
    /// A nested literal sub-message.
    Msg(Message),
    /// An index into the owning machine's argument list.
    ///
    /// Meaningful only relative to that list; resolved via
    /// [`Message::instantiate`] and never carried across machines.
    Pointer(usize),
    /// An index into the owning machine's register list, renumbered on
    /// every register insertion or removal.
    Register(usize),
}

impl fmt::Display for Referent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Referent::Msg(m) => write!(f, "({m})"),
            Referent::Pointer(n) => write!(f, "#{n}"),
            Referent::Register(n) => write!(f, "&{n}"),
        }
    }
}

/// Raised when a pointer cannot be resolved against an argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadInstantiation {
    /// The pointer index is not a valid argument position.
    OutOfRange(usize),
    /// Register references are machine-local and never instantiate.
    RegisterReference(usize),
}

impl fmt::Display for BadInstantiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BadInstantiation::OutOfRange(n) => write!(f, "no argument #{n}"),
            BadInstantiation::RegisterReference(n) => {
                write!(f, "register reference &{n} cannot be instantiated")
            }
        }
    }
}

impl std::error::Error for BadInstantiation {}

/// Text interspersed with referents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    text: Vec<String>,
    args: Vec<Referent>,
}

impl Message {
    /// Build a message from alternating parts. `text` must have exactly one
    /// more fragment than `args`; violating that is a caller bug.
    pub fn new(text: Vec<String>, args: Vec<Referent>) -> Message {
        assert_eq!(text.len(), args.len() + 1, "malformed message parts");
        Message { text, args }
    }

    /// A message with no arguments.
    pub fn plain(text: impl Into<String>) -> Message {
        Message {
            text: vec![text.into()],
            args: Vec::new(),
        }
    }

    /// Build from a template where each `[]` marks an argument slot, e.g.
    /// `Message::template("is [] true?", vec![arg])`.
    pub fn template(template: &str, args: Vec<Referent>) -> Message {
        let text: Vec<String> = template.split("[]").map(str::to_string).collect();
        Message::new(text, args)
    }

    pub fn text(&self) -> &[String] {
        &self.text
    }

    pub fn args(&self) -> &[Referent] {
        &self.args
    }

    /// Number of argument slots.
    pub fn size(&self) -> usize {
        self.args.len()
    }

    /// True if the text fragments match `template` exactly (`[]` per slot),
    /// regardless of what the arguments are.
    pub fn matches(&self, template: &str) -> bool {
        let target: Vec<&str> = template.split("[]").collect();
        self.text.len() == target.len() && self.text.iter().zip(target).all(|(a, b)| a == b)
    }

    /// Interleave the text fragments with one rendering per argument.
    pub fn format_with(&self, reprs: &[String]) -> String {
        debug_assert_eq!(reprs.len(), self.args.len());
        let mut out = String::new();
        for (i, fragment) in self.text.iter().enumerate() {
            out.push_str(fragment);
            if let Some(repr) = reprs.get(i) {
                out.push_str(repr);
            }
        }
        out
    }

    /// Resolve every pointer against `args`, recursively, producing a
    /// concrete message that is meaningful outside the owning machine.
    ///
    /// The argument graph is acyclic by construction (an argument can only
    /// reference arguments that existed before it), so recursion terminates;
    /// memoization keeps shared substructure shared.
    pub fn instantiate(&self, args: &[Message]) -> Result<Message, BadInstantiation> {
        self.instantiate_memo(args, &mut HashMap::new())
    }

    fn instantiate_memo(
        &self,
        args: &[Message],
        memo: &mut HashMap<Message, Message>,
    ) -> Result<Message, BadInstantiation> {
        if let Some(hit) = memo.get(self) {
            return Ok(hit.clone());
        }
        let mut new_args = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            let resolved = match arg {
                Referent::Msg(m) => m.instantiate_memo(args, memo)?,
                Referent::Pointer(n) => {
                    let target = args.get(*n).ok_or(BadInstantiation::OutOfRange(*n))?;
                    target.instantiate_memo(args, memo)?
                }
                Referent::Register(n) => return Err(BadInstantiation::RegisterReference(*n)),
            };
            new_args.push(Referent::Msg(resolved));
        }
        let result = Message::new(self.text.clone(), new_args);
        memo.insert(self.clone(), result.clone());
        Ok(result)
    }

    /// Apply `f` to every leaf referent (pointers and register references),
    /// recursing through nested sub-messages. Memoized on structural
    /// equality so DAG-shaped messages are transformed once per distinct
    /// sub-message.
    pub fn transform_leaves(&self, f: &mut impl FnMut(&Referent) -> Referent) -> Message {
        self.transform_leaves_memo(f, &mut HashMap::new())
    }

    fn transform_leaves_memo(
        &self,
        f: &mut impl FnMut(&Referent) -> Referent,
        memo: &mut HashMap<Message, Message>,
    ) -> Message {
        if let Some(hit) = memo.get(self) {
            return hit.clone();
        }
        let new_args = self
            .args
            .iter()
            .map(|arg| match arg {
                Referent::Msg(m) => Referent::Msg(m.transform_leaves_memo(f, memo)),
                leaf => f(leaf),
            })
            .collect();
        let result = Message::new(self.text.clone(), new_args);
        memo.insert(self.clone(), result.clone());
        result
    }

    /// Visit every leaf referent in pre-order, skipping sub-messages that
    /// were already seen (DAG sharing).
    pub fn visit_leaves(&self, f: &mut impl FnMut(&Referent)) {
        let mut seen = HashSet::new();
        self.visit_leaves_inner(&mut seen, f);
    }

    fn visit_leaves_inner(&self, seen: &mut HashSet<Message>, f: &mut impl FnMut(&Referent)) {
        if !seen.insert(self.clone()) {
            return;
        }
        for arg in &self.args {
            match arg {
                Referent::Msg(m) => m.visit_leaves_inner(seen, f),
                leaf => f(leaf),
            }
        }
    }

    /// Drop everything up to and including the first occurrence of `sep`
    /// in the text, along with the arguments before it. Used to turn
    /// `"Q[100]: what is #0?"` back into `"what is #0?"`.
    pub fn strip_prefix(&self, sep: &str) -> Message {
        for (i, fragment) in self.text.iter().enumerate() {
            if let Some(pos) = fragment.find(sep) {
                let mut text = vec![fragment[pos + sep.len()..].to_string()];
                text.extend(self.text[i + 1..].iter().cloned());
                let args = self.args[i..].to_vec();
                return Message::new(text, args);
            }
        }
        self.clone()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reprs: Vec<String> = self.args.iter().map(|arg| arg.to_string()).collect();
        write!(f, "{}", self.format_with(&reprs))
    }
}

/// Concatenation merges the touching text fragments.
impl Add for Message {
    type Output = Message;

    fn add(self, other: Message) -> Message {
        let mut text = self.text;
        let joined = format!("{}{}", text.pop().unwrap_or_default(), &other.text[0]);
        text.push(joined);
        text.extend(other.text[1..].iter().cloned());
        let mut args = self.args;
        args.extend(other.args);
        Message::new(text, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ptr(n: usize) -> Referent {
        Referent::Pointer(n)
    }

    #[test]
    fn template_and_display_round_trip() {
        let m = Message::template("what is [] plus []?", vec![ptr(0), ptr(1)]);
        assert_eq!(m.to_string(), "what is #0 plus #1?");
        assert!(m.matches("what is [] plus []?"));
        assert!(!m.matches("what is []?"));
    }

    #[test]
    fn add_merges_touching_fragments() {
        let head = Message::plain("Q: ");
        let body = Message::template("[] is south", vec![ptr(2)]);
        let joined = head + body;
        assert_eq!(joined.to_string(), "Q: #2 is south");
        assert_eq!(joined.size(), 1);
    }

    #[test]
    fn instantiate_resolves_pointers_recursively() {
        let args = vec![
            Message::plain("one"),
            Message::template("one more than []", vec![ptr(0)]),
        ];
        let m = Message::template("the answer is []", vec![ptr(1)]);
        let concrete = m.instantiate(&args).expect("instantiate");
        assert_eq!(concrete.to_string(), "the answer is (one more than (one))");
    }

    #[test]
    fn instantiate_rejects_out_of_range_pointers() {
        let m = Message::template("see []", vec![ptr(3)]);
        assert_eq!(
            m.instantiate(&[Message::plain("x")]),
            Err(BadInstantiation::OutOfRange(3))
        );
    }

    #[test]
    fn instantiate_rejects_register_references() {
        let m = Message::template("see []", vec![Referent::Register(1)]);
        assert_eq!(
            m.instantiate(&[]),
            Err(BadInstantiation::RegisterReference(1))
        );
    }

    #[test]
    fn transform_leaves_renumbers_through_nesting() {
        let inner = Message::template("deep []", vec![ptr(4)]);
        let m = Message::template("[] and []", vec![Referent::Msg(inner), ptr(4)]);
        let shifted = m.transform_leaves(&mut |leaf| match leaf {
            Referent::Pointer(n) => Referent::Pointer(n - 1),
            other => other.clone(),
        });
        assert_eq!(shifted.to_string(), "(deep #3) and #3");
    }

    #[test]
    fn visit_leaves_skips_shared_substructure() {
        let shared = Message::template("shared []", vec![ptr(0)]);
        let m = Message::template(
            "[] then []",
            vec![Referent::Msg(shared.clone()), Referent::Msg(shared)],
        );
        let mut count = 0;
        m.visit_leaves(&mut |_| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn strip_prefix_drops_leading_label() {
        let m = Message::plain("A: ") + Message::template("it is []", vec![ptr(0)]);
        assert_eq!(m.strip_prefix(": ").to_string(), "it is #0");
    }
}
