//! Interactive register machine for recursive question decomposition.
//!
//! An operator answers a question by replying directly or by issuing
//! sub-questions; each sub-question spawns a nested machine of the
//! opposite kind (implement ↔ translate) under a finite work budget, so
//! the otherwise unbounded recursion is guaranteed to halt. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (messages, registers,
//!   budgets, commands, parsing). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (terminal, files, response
//!   sources). Isolated behind traits to enable scripted doubles.
//!
//! Orchestration modules ([`driver`], [`session`]) coordinate core logic
//! with I/O: the driver is the flat command loop with the interrupt and
//! raise/fix/resume rewind protocol, and the session wires it to an
//! elicitation backend and the response caches.

pub mod core;
pub mod driver;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
