//! Scenario tests for the rewind protocol: `raise` jumping back into the
//! context that produced an answer, and `fix` re-answering an earlier
//! prompt with everything downstream discarded.
//!
//! These drive the [`Driver`] directly so intermediate observations can
//! be inspected between responses.

use dialectic::core::budget::Budget;
use dialectic::core::oracle::NoBuiltins;
use dialectic::driver::{Driver, DriverConfig, DriverStep, ResponseRequest};
use dialectic::test_support::msg;

fn need_input(driver: &mut Driver) -> ResponseRequest {
    match driver.step(&NoBuiltins).expect("step") {
        DriverStep::NeedInput(request) => request,
        DriverStep::Done(done) => panic!("unexpected completion: {done:?}"),
    }
}

fn type_line(driver: &mut Driver, line: &str) {
    let _ = need_input(driver);
    driver.provide(line);
}

/// Set up a root machine that asked one question and received an answer
/// through the usual translator relay.
fn answered_driver() -> Driver {
    let mut driver = Driver::new(
        &msg("is the door locked?"),
        Budget::Unlimited,
        DriverConfig::default(),
    );
    type_line(&mut driver, "ask is the door locked?");
    type_line(&mut driver, "ask is the door locked, in the abstract?");
    type_line(&mut driver, "reply it is locked"); // implement child
    type_line(&mut driver, "reply it is locked"); // translator relays
    driver
}

/// Raising on an answer register reaches back into the machine that
/// produced the answer; re-replying there routes a corrected answer into
/// the parent, discarding the stale register.
#[test]
fn raise_reaches_back_into_the_answering_machine() {
    let mut driver = answered_driver();
    let request = need_input(&mut driver);
    assert!(request.observation.contains("A: it is locked"));

    driver.provide("raise 1 the door was actually open");
    let request = need_input(&mut driver);
    // Control is back in the translator, just before its reply, with the
    // error on record.
    assert_eq!(request.prompt, "-> ");
    assert!(request.observation.contains("Error: the door was actually open"));

    driver.provide("reply apologies, it is open");
    let request = need_input(&mut driver);
    assert_eq!(request.prompt, ">> ");
    assert!(request.observation.contains("A: apologies, it is open"));
    assert!(!request.observation.contains("A: it is locked"));
}

/// Fixing an answer register re-enters the prompt that produced the
/// answer; a different response commits the rewind and the corrected
/// answer lands in the parent.
#[test]
fn fix_re_answers_the_child_reply() {
    let mut driver = answered_driver();
    type_line(&mut driver, "fix 1");

    let request = need_input(&mut driver);
    assert_eq!(request.error.as_deref(), Some("previously: reply it is locked"));
    assert_eq!(request.prompt, "-> ");

    driver.provide("reply it is unlocked");
    let request = need_input(&mut driver);
    assert_eq!(request.prompt, ">> ");
    assert!(request.observation.contains("A: it is unlocked"));
    assert!(!request.observation.contains("A: it is locked"));
}

/// A fix that changes nothing restores the machine where `fix` was typed,
/// stale answer intact.
#[test]
fn fix_with_identical_answer_changes_nothing() {
    let mut driver = answered_driver();
    type_line(&mut driver, "fix 1");
    let _ = need_input(&mut driver);

    driver.provide("reply it is locked");
    let request = need_input(&mut driver);
    assert_eq!(request.error.as_deref(), Some("nothing was fixed: fix 1"));
    assert_eq!(request.prompt, ">> ");
    assert!(request.observation.contains("A: it is locked"));
}

/// After a raise, `assert` routes a yes/no check through a sub-question;
/// the pending error register is replaced by the verdict.
#[test]
fn assert_checks_a_raised_error_end_to_end() {
    let mut driver = answered_driver();
    type_line(&mut driver, "raise 1 the door was actually open");

    // In the translator with the pending error.
    type_line(&mut driver, "assert the hinge was inspected");
    let request = need_input(&mut driver);
    // Translator's assert spawns an implement child for the yes/no check.
    assert_eq!(request.prompt, ">> ");
    assert!(request.observation.contains("is it the case that the hinge was inspected?"));

    driver.provide("reply yes");
    let request = need_input(&mut driver);
    assert_eq!(request.prompt, "-> ");
    assert!(request.observation.contains("Checked: the hinge was inspected"));
    assert!(!request.observation.contains("Error:"));
}
