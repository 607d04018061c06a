//! Machine state and its transitions.
//!
//! A [`Machine`] is a bounded list of registers plus the argument list that
//! pointers in register contents index into. Machines are value types:
//! every mutation happens on an owned copy, and snapshots are cloned into
//! the arena before each command executes, which is what makes the
//! raise/fix/resume rewind protocol safe.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::arena::StateId;
use crate::core::budget::Budget;
use crate::core::command::{BadCommand, Command};
use crate::core::message::{Message, Referent};
use crate::core::register::Register;

/// The two machine kinds. They are mutually recursive: an implement
/// machine's sub-questions go to translators, and a translator's go to
/// implement machines, so every ask round-trips through one translation
/// hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineKind {
    Implement,
    Translate,
}

impl MachineKind {
    pub fn max_registers(self) -> usize {
        match self {
            MachineKind::Implement => 7,
            // Translators only relay questions and answers; five registers
            // leave room for errors passing through.
            MachineKind::Translate => 5,
        }
    }

    /// Charged on top of a child's consumption when it completes. Asking
    /// is free for implement machines; you pay when it is translated.
    pub fn ask_cost(self) -> u64 {
        match self {
            MachineKind::Implement => 0,
            MachineKind::Translate => 1,
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            MachineKind::Implement => ">> ",
            MachineKind::Translate => "-> ",
        }
    }

    /// Label used to select the response cache for this kind.
    pub fn label(self) -> &'static str {
        match self {
            MachineKind::Implement => "implement",
            MachineKind::Translate => "translate",
        }
    }

    pub fn child(self) -> MachineKind {
        match self {
            MachineKind::Implement => MachineKind::Translate,
            MachineKind::Translate => MachineKind::Implement,
        }
    }

    /// The head register's rendering of the question a machine answers.
    pub fn head(self, question: &Message, budget: Budget) -> Message {
        match self {
            MachineKind::Implement => Message::plain(format!("Q[{budget}]: ")) + question.clone(),
            MachineKind::Translate => Message::plain("Q[concrete]: ") + question.clone(),
        }
    }

    /// How a sub-question is rendered in the register that records it.
    pub fn render_question(self, question: &Message, budget: Budget) -> Message {
        match self {
            MachineKind::Implement => Message::plain(format!("Q[{budget}]: ")) + question.clone(),
            MachineKind::Translate => Message::plain("Q[abstract]: ") + question.clone(),
        }
    }

    /// Budget for sub-questions that don't specify one. Implement machines
    /// grant one order of magnitude less than they started with (never
    /// below 10); translators pass their whole allowance through.
    pub fn default_child_budget(self, initial: Budget) -> Budget {
        match self {
            MachineKind::Implement => initial.tenth(),
            MachineKind::Translate => initial,
        }
    }
}

/// How a machine returns its terminal value: which parent snapshot to
/// re-enter and what to do with the answer there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Continuation {
    /// Append a rendered Q/A register to the parent.
    Ask {
        parent: StateId,
        question: Message,
        nominal: Budget,
    },
    /// Replace the parent's interrupted register `register`; the parent
    /// already paid `already_charged` units for the first window.
    Resume {
        parent: StateId,
        register: usize,
        already_charged: u64,
    },
    /// Route a yes/no answer back into the assert protocol at the
    /// parent's register `register`.
    Assert {
        parent: StateId,
        assertion: Message,
        register: usize,
    },
}

impl Continuation {
    pub fn parent_state(&self) -> StateId {
        match self {
            Continuation::Ask { parent, .. }
            | Continuation::Resume { parent, .. }
            | Continuation::Assert { parent, .. } => *parent,
        }
    }
}

/// Where [`Machine::add_register`] puts the new register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Append,
    Insert(usize),
    Replace(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub kind: MachineKind,
    pub registers: Vec<Register>,
    pub args: Vec<Message>,
    /// The user-visible budget this machine was asked with.
    pub nominal_budget: Budget,
    /// The nominal budget at creation; defaults for child budgets derive
    /// from this even after `more` rescales the current window.
    pub initial_nominal_budget: Budget,
    /// Effective cap: nominal bounded by what the parent could grant.
    pub budget: Budget,
    pub budget_consumed: u64,
    pub parent: Option<Continuation>,
    /// Nesting depth, for the recursion guard.
    pub depth: u32,
}

impl Machine {
    /// The top-level machine for a session.
    pub fn root(question: &Message, budget: Budget) -> Machine {
        Machine::with_head(MachineKind::Implement, question, budget, budget, None, 0)
    }

    /// A machine answering one of this machine's sub-questions. The child
    /// is of the opposite kind and its window is capped by what remains of
    /// this machine's budget.
    pub fn child(&self, question: &Message, nominal: Budget, parent: Continuation) -> Machine {
        let cap = nominal.min(self.remaining());
        Machine::with_head(
            self.kind.child(),
            question,
            nominal,
            cap,
            Some(parent),
            self.depth + 1,
        )
    }

    fn with_head(
        kind: MachineKind,
        question: &Message,
        nominal: Budget,
        cap: Budget,
        parent: Option<Continuation>,
        depth: u32,
    ) -> Machine {
        let mut machine = Machine {
            kind,
            registers: Vec::new(),
            args: Vec::new(),
            nominal_budget: nominal,
            initial_nominal_budget: nominal,
            budget: cap,
            budget_consumed: 0,
            parent,
            depth,
        };
        let head = machine.contextualize(&kind.head(question, nominal));
        machine.registers.push(Register::new(vec![head], None));
        machine
    }

    pub fn consume(&mut self, units: u64) {
        self.budget_consumed = self.budget_consumed.saturating_add(units);
    }

    pub fn exhausted(&self) -> bool {
        self.budget.exceeded_by(self.budget_consumed)
    }

    pub fn remaining(&self) -> Budget {
        self.budget.remaining_after(self.budget_consumed)
    }

    pub fn free_register(&self) -> bool {
        self.registers.len() < self.kind.max_registers()
    }

    /// Move each of `m`'s literal sub-messages into the argument list and
    /// replace it with a fresh pointer. This is how observation text is
    /// built while keeping the stored representation indirection-based.
    pub fn contextualize(&mut self, m: &Message) -> Message {
        let mut new_args = Vec::with_capacity(m.args().len());
        for arg in m.args() {
            new_args.push(match arg {
                Referent::Msg(sub) => {
                    self.args.push(sub.clone());
                    Referent::Pointer(self.args.len() - 1)
                }
                other => other.clone(),
            });
        }
        Message::new(m.text().to_vec(), new_args)
    }

    /// Check that every pointer and register reference in `m` (at any
    /// nesting depth) is in range for this machine.
    pub fn validate_refs(&self, m: &Message) -> Result<(), BadCommand> {
        let mut ok = true;
        m.visit_leaves(&mut |leaf| match leaf {
            Referent::Pointer(n) if *n >= self.args.len() => ok = false,
            Referent::Register(k) if *k >= self.registers.len() => ok = false,
            _ => {}
        });
        if ok {
            Ok(())
        } else {
            Err(BadCommand::new("invalid reference"))
        }
    }

    /// Insert or replace a register. Contents are contextualized; register
    /// references elsewhere are renumbered to keep pointing at the same
    /// cells; replacing repacks the argument list.
    pub fn add_register(
        &mut self,
        contents: Vec<Message>,
        cmd: Option<Command>,
        place: Placement,
    ) -> Result<(), BadCommand> {
        let (n, replace) = match place {
            Placement::Append => (self.registers.len(), false),
            Placement::Insert(n) => (n, false),
            Placement::Replace(n) => (n, true),
        };
        if replace {
            if n >= self.registers.len() {
                return Err(BadCommand::new("invalid index"));
            }
        } else {
            if n > self.registers.len() {
                return Err(BadCommand::new("invalid index"));
            }
            if self.registers.len() >= self.kind.max_registers() {
                return Err(BadCommand::new("no free register (clear one first)"));
            }
        }

        let mut stored = Vec::with_capacity(contents.len());
        for m in &contents {
            stored.push(self.contextualize(m));
        }
        let register = Register::new(stored, cmd);

        if replace {
            self.registers[n] = register;
            self.pack_args();
        } else {
            self.registers.insert(n, register);
            if n < self.registers.len() - 1 {
                self.transform_register_leaves(&mut |leaf| match leaf {
                    Referent::Register(k) if *k >= n => Referent::Register(k + 1),
                    other => other.clone(),
                });
            }
        }
        Ok(())
    }

    /// Remove register `n` and garbage-collect unused arguments. References
    /// to the deleted register collapse to a literal marker; later
    /// references shift down.
    pub fn delete_register(&mut self, n: usize) -> Result<(), BadCommand> {
        if n >= self.registers.len() {
            return Err(BadCommand::new("invalid index"));
        }
        self.registers.remove(n);
        self.transform_register_leaves(&mut |leaf| match leaf {
            Referent::Register(k) if *k == n => {
                Referent::Msg(Message::plain("<<cleared register>>"))
            }
            Referent::Register(k) if *k > n => Referent::Register(k - 1),
            other => other.clone(),
        });
        self.pack_args();
        Ok(())
    }

    /// Drop arguments nothing references and renumber the rest densely in
    /// first-appearance order. Idempotent.
    ///
    /// Reachability is transitive: a pocketed sub-message may itself
    /// contain pointers, and those arguments must survive (and be
    /// renumbered) even when no register references them directly.
    pub fn pack_args(&mut self) {
        let mut order: HashMap<usize, usize> = HashMap::new();
        let mut queue: Vec<usize> = Vec::new();
        for register in &self.registers {
            for m in &register.contents {
                m.visit_leaves(&mut |leaf| {
                    if let Referent::Pointer(n) = leaf {
                        if !order.contains_key(n) {
                            order.insert(*n, order.len());
                            queue.push(*n);
                        }
                    }
                });
            }
        }
        let mut i = 0;
        while i < queue.len() {
            let n = queue[i];
            i += 1;
            self.args[n].visit_leaves(&mut |leaf| {
                if let Referent::Pointer(k) = leaf {
                    if !order.contains_key(k) {
                        order.insert(*k, order.len());
                        queue.push(*k);
                    }
                }
            });
        }

        let mut new_args = vec![Message::plain(""); order.len()];
        for (&old, &new) in &order {
            new_args[new] = self.args[old].transform_leaves(&mut |leaf| match leaf {
                Referent::Pointer(k) => Referent::Pointer(order[k]),
                other => other.clone(),
            });
        }
        self.args = new_args;
        self.transform_register_leaves(&mut |leaf| match leaf {
            Referent::Pointer(n) => Referent::Pointer(order[n]),
            other => other.clone(),
        });
    }

    /// Expand argument `n` in place: every pointer to it becomes the full
    /// message, the argument is dropped, and remaining pointers are
    /// renumbered. The expanded message's own sub-messages become fresh
    /// arguments, so its structure stays readable one level at a time.
    pub fn view(&mut self, n: usize) -> Result<(), BadCommand> {
        if n >= self.args.len() {
            return Err(BadCommand::new("invalid index"));
        }
        let target = self.args[n].clone();
        let expanded = self.contextualize(&target);
        self.transform_register_leaves(&mut |leaf| match leaf {
            Referent::Pointer(k) if *k == n => Referent::Msg(expanded.clone()),
            other => other.clone(),
        });
        self.pack_args();
        Ok(())
    }

    fn transform_register_leaves(&mut self, f: &mut impl FnMut(&Referent) -> Referent) {
        for register in &mut self.registers {
            let contents: Vec<Message> =
                register.contents.iter().map(|m| m.transform_leaves(f)).collect();
            register.contents = contents;
        }
    }

    /// The observation shown to the operator: numbered registers, one line
    /// per message, a blank line after each register.
    pub fn render_lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (i, register) in self.registers.iter().enumerate() {
            let mut prefix = format!("{i}. ");
            for m in &register.contents {
                out.push(format!("{prefix}{m}"));
                prefix = " ".repeat(prefix.len());
            }
            out.push(String::new());
        }
        out
    }

    pub fn render(&self) -> String {
        self.render_lines().join("\n")
    }

    /// Q/A lines the operator can recall at the prompt, stripped of their
    /// budget labels.
    pub fn pre_suggestions(&self) -> Vec<String> {
        let mut out = Vec::new();
        for register in &self.registers {
            for m in &register.contents {
                let Some(first) = m.text().first() else {
                    continue;
                };
                if first.starts_with('A') {
                    out.push(format!("A: {}", m.strip_prefix(": ")));
                } else if first.starts_with('Q') {
                    out.push(format!("Q: {}", m.strip_prefix(": ")));
                }
            }
        }
        out
    }
}
