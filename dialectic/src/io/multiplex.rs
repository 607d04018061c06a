//! Multiplex several independent sessions over a polled response source.
//!
//! This is an orchestration-level batching loop, not concurrency: each
//! driver is advanced only when the response for its current prompt is
//! available, so a single pass visits every job, drains whatever progress
//! is possible, and leaves the rest parked at their prompts.

use anyhow::Result;
use tracing::debug;

use crate::core::budget::Budget;
use crate::core::message::Message;
use crate::core::oracle::Oracle;
use crate::driver::{Driver, DriverConfig, DriverStep, ResponseRequest, RunOutcome};

/// Supplies responses as they become available (a remote queue, a table of
/// prepared answers). Returning `None` parks the job until a later pass.
pub trait ResponseSource {
    fn poll(&mut self, job: &str, request: &ResponseRequest) -> Result<Option<String>>;
}

/// One independent top-level machine being multiplexed.
pub struct Job {
    pub id: String,
    driver: Driver,
    outcome: Option<RunOutcome>,
}

impl Job {
    pub fn new(id: impl Into<String>, question: &Message, budget: Budget) -> Job {
        Job {
            id: id.into(),
            driver: Driver::new(question, budget, DriverConfig::default()),
            outcome: None,
        }
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }
}

/// Result of one pump pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpOutcome {
    /// Jobs that reached a terminal value this pass, in job order.
    pub finished: Vec<(String, RunOutcome)>,
    /// Jobs still parked at a prompt with no response available.
    pub waiting: usize,
}

/// Advance every job as far as available responses allow.
///
/// Each job is stepped until it finishes or its current prompt has no
/// response yet. Jobs that finished earlier are skipped.
pub fn pump<S: ResponseSource, O: Oracle>(
    jobs: &mut [Job],
    source: &mut S,
    oracle: &O,
) -> Result<PumpOutcome> {
    let mut finished = Vec::new();
    let mut waiting = 0;

    for job in jobs.iter_mut() {
        if job.outcome.is_some() {
            continue;
        }
        loop {
            match job.driver.step(oracle)? {
                DriverStep::Done(outcome) => {
                    debug!(job = %job.id, "job finished");
                    job.outcome = Some(outcome.clone());
                    finished.push((job.id.clone(), outcome));
                    break;
                }
                DriverStep::NeedInput(request) => match source.poll(&job.id, &request)? {
                    Some(line) => job.driver.provide(line),
                    None => {
                        waiting += 1;
                        break;
                    }
                },
            }
        }
    }

    Ok(PumpOutcome { finished, waiting })
}

/// A response source backed by a map from observation text to response,
/// shared by every job. Useful for batch replays and tests.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    entries: std::collections::HashMap<String, String>,
}

impl MapSource {
    pub fn new() -> MapSource {
        MapSource::default()
    }

    pub fn insert(&mut self, observation: impl Into<String>, response: impl Into<String>) {
        self.entries.insert(observation.into(), response.into());
    }

    pub fn from_entries(entries: std::collections::HashMap<String, String>) -> MapSource {
        MapSource { entries }
    }
}

impl ResponseSource for MapSource {
    fn poll(&mut self, _job: &str, request: &ResponseRequest) -> Result<Option<String>> {
        Ok(self.entries.get(&request.observation).cloned())
    }
}
