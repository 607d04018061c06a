//! Pure, deterministic machine logic.
//!
//! Nothing in this module performs I/O; everything is a function of its
//! inputs, which keeps the whole command set testable without a terminal.

pub mod arena;
pub mod budget;
pub mod command;
pub mod machine;
pub mod message;
pub mod oracle;
pub mod parse;
pub mod register;
