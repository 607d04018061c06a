//! Blocking session orchestration.
//!
//! Wires a [`Driver`] to an elicitation backend and the per-kind response
//! caches: cache hits answer a prompt without reaching the elicitor,
//! error re-prompts bypass the cache (the cached response is exactly what
//! went wrong), and every elicited response is written through.

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::core::budget::Budget;
use crate::core::machine::MachineKind;
use crate::core::oracle::Oracle;
use crate::core::parse::parse_message;
use crate::driver::{Driver, DriverConfig, DriverStep, ResponseRequest, RunOutcome};
use crate::io::cache::ResponseCache;
use crate::io::elicit::Elicitor;

/// One response cache per machine kind, so implement and translate
/// prompts don't shadow each other's memoized responses.
pub struct Caches<C> {
    pub implement: C,
    pub translate: C,
}

impl<C: ResponseCache> Caches<C> {
    pub fn for_kind(&mut self, kind: MachineKind) -> &mut C {
        match kind {
            MachineKind::Implement => &mut self.implement,
            MachineKind::Translate => &mut self.translate,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Budget for the root machine.
    pub budget: Budget,
    /// Whether to consult and fill the response caches.
    pub use_cache: bool,
    pub driver: DriverConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            budget: Budget::Unlimited,
            use_cache: true,
            driver: DriverConfig::default(),
        }
    }
}

/// Run one question to completion.
///
/// Returns the terminal outcome, which may be an interruption if the root
/// budget ran out. The only hard failures are a malformed question, an
/// elicitation failure, and a stale continuation after a committed fix.
pub fn run_session<E: Elicitor, O: Oracle, C: ResponseCache>(
    question: &str,
    options: &SessionOptions,
    elicitor: &mut E,
    oracle: &O,
    caches: &mut Caches<C>,
) -> Result<RunOutcome> {
    let Some(question) = parse_message(question) else {
        bail!("malformed question: {question}");
    };
    let mut driver = Driver::new(&question, options.budget, options.driver.clone());
    info!(budget = %options.budget, "session started");

    loop {
        let step = driver
            .step(oracle)
            .context("a fixed computation was re-entered through a stale continuation")?;
        match step {
            DriverStep::Done(outcome) => {
                info!(
                    budget_consumed = outcome.budget_consumed,
                    interrupted = outcome.interrupted,
                    "session finished"
                );
                return Ok(outcome);
            }
            DriverStep::NeedInput(request) => {
                let line = resolve_response(&request, options.use_cache, elicitor, caches)?;
                driver.provide(line);
            }
        }
    }
}

fn resolve_response<E: Elicitor, C: ResponseCache>(
    request: &ResponseRequest,
    use_cache: bool,
    elicitor: &mut E,
    caches: &mut Caches<C>,
) -> Result<String> {
    if use_cache && request.cacheable {
        if let Some(hit) = caches.for_kind(request.kind).get(&request.observation) {
            debug!(kind = request.kind.label(), "response cache hit");
            return Ok(hit);
        }
    }
    let line = elicitor.elicit(request)?;
    if use_cache {
        caches
            .for_kind(request.kind)
            .put(&request.observation, &line);
    }
    Ok(line)
}
