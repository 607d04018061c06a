//! Generation-indexed arena of immutable machine snapshots.
//!
//! Every command records the generation of the snapshot taken just before
//! it executed, and continuations refer to parent machines by generation.
//! This replaces a cyclic object graph of live machine references with
//! explicit handles, and makes "rewind to an older state" an index lookup.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::machine::Machine;

/// Handle to one machine snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateId(usize);

impl StateId {
    pub fn generation(self) -> usize {
        self.0
    }
}

/// Control-integrity violation: a continuation or resume target referred to
/// a snapshot that a committed `fix` has superseded. Fatal to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedContinuation {
    pub generation: usize,
}

impl fmt::Display for ChangedContinuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "computation at generation {} was superseded by a fix",
            self.generation
        )
    }
}

impl std::error::Error for ChangedContinuation {}

/// Append-only store of machine snapshots.
///
/// Execution is strictly sequential, so generation order is execution
/// order: committing a fix retires every generation recorded after the
/// rewind target, which is exactly the abandoned future.
#[derive(Debug, Default)]
pub struct Arena {
    states: Vec<Machine>,
    retired: Vec<bool>,
}

impl Arena {
    pub fn new() -> Arena {
        Arena::default()
    }

    pub fn push(&mut self, state: Machine) -> StateId {
        self.states.push(state);
        self.retired.push(false);
        StateId(self.states.len() - 1)
    }

    pub fn get(&self, id: StateId) -> Result<&Machine, ChangedContinuation> {
        if self.retired[id.0] {
            return Err(ChangedContinuation { generation: id.0 });
        }
        Ok(&self.states[id.0])
    }

    /// Retire every snapshot recorded after `id`. Snapshots pushed later
    /// start fresh (not retired).
    pub fn retire_after(&mut self, id: StateId) {
        for flag in self.retired.iter_mut().skip(id.0 + 1) {
            *flag = true;
        }
    }

    pub fn is_retired(&self, id: StateId) -> bool {
        self.retired[id.0]
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
