//! Side-effecting operations: terminals, files, response sources.
//!
//! Everything here is behind a trait so the session loop can be driven by
//! scripted doubles in tests.

pub mod cache;
pub mod config;
pub mod elicit;
pub mod multiplex;
pub mod script;
