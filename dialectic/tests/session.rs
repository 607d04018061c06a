//! End-to-end scripted sessions covering the full ask/reply lifecycle:
//! translator hops, oracle short-circuits, pointer plumbing, budget
//! exhaustion, and resumption.

use dialectic::core::budget::Budget;
use dialectic::core::oracle::NoBuiltins;
use dialectic::driver::DriverConfig;
use dialectic::io::script::ScriptElicitor;
use dialectic::session::{SessionOptions, run_session};
use dialectic::test_support::{TableOracle, memory_caches, msg, scripted};

/// Full lifecycle: an ask round-trips through a translator, the oracle
/// answers the abstract question, and the answer's substructure flows
/// back as a pointer the operator can reference and expand.
///
/// Session shape:
/// 1. root asks; a translator child renders the concrete question
/// 2. the translator's abstract phrasing hits the oracle (cost 1)
/// 3. the translator relays the answer by pointer
/// 4. the root says a note referencing the answer's argument, views it,
///    and replies
#[test]
fn lifecycle_with_oracle_answer_and_pointer_plumbing() {
    let oracle = TableOracle::new().with(
        "what cell contains the agent, abstractly?",
        msg("cell (2, 3)"),
    );
    let mut elicitor = scripted(&[
        "ask what cell contains the agent?",
        "ask what cell contains the agent, abstractly?",
        "reply cell #0",
        "say the agent sits at #0",
        "view 0",
        "reply the agent is at cell (2, 3)",
    ]);

    let outcome = run_session(
        "what cell contains the agent?",
        &SessionOptions::default(),
        &mut elicitor,
        &oracle,
        &mut memory_caches(),
    )
    .expect("session");

    assert_eq!(outcome.value.to_string(), "the agent is at cell (2, 3)");
    assert!(!outcome.interrupted);
    // Oracle answer (1) relayed through the translator (ask cost 1) plus
    // the root's say.
    assert!(outcome.budget_consumed >= 2);
    assert_eq!(elicitor.remaining(), 0);
}

/// A full register file rejects new content until something is cleared;
/// the error re-prompt costs nothing and loses nothing.
#[test]
fn register_capacity_errors_are_recoverable() {
    let mut elicitor = scripted(&[
        "say note one",
        "say note two",
        "say note three",
        "say note four",
        "say note five",
        "say note six",
        // Register file is full (head + six notes): rejected, re-prompted.
        "say note seven",
        "clear 1",
        "say note seven",
        "reply all noted",
    ]);

    let outcome = run_session(
        "how many notes fit?",
        &SessionOptions::default(),
        &mut elicitor,
        &NoBuiltins,
        &mut memory_caches(),
    )
    .expect("session");

    assert_eq!(outcome.value.to_string(), "all noted");
    // Six says before the full-register error, then one more after the
    // clear; the rejected attempt was not charged.
    assert_eq!(outcome.budget_consumed, 7);
    assert_eq!(elicitor.remaining(), 0);
}

/// A sub-question that exhausts its window is interrupted; `resume` and
/// `more` re-enter the suspended computation instead of restarting it,
/// and the resumed answer replaces the interrupted register.
#[test]
fn exhausted_ask_resumes_where_it_left_off() {
    let mut lines = vec![
        "ask10 list the tasks".to_string(),
        "ask list the tasks, abstractly".to_string(),
    ];
    // Burn the implement child's window of 10, clearing as we go so the
    // register file never fills.
    for i in 0..9 {
        lines.push(format!("say item {i}"));
        lines.push("clear 1".to_string());
    }
    lines.push("say item 9".to_string());
    // The interruption cascades to the root (relaying it charges the
    // translator past its own window).
    lines.push("resume 1 only need a rough count".to_string()); // root
    lines.push("more 1".to_string()); // resumed translator
    lines.push("reply about fifty".to_string()); // implement child, suspended mid-count
    lines.push("reply about fifty".to_string()); // translator relays
    lines.push("reply about fifty, all told".to_string()); // root

    let mut elicitor = ScriptElicitor::new(lines);
    let outcome = run_session(
        "what is on the list?",
        &SessionOptions {
            budget: Budget::Unlimited,
            use_cache: false,
            driver: DriverConfig::default(),
        },
        &mut elicitor,
        &NoBuiltins,
        &mut memory_caches(),
    )
    .expect("session");

    assert_eq!(outcome.value.to_string(), "about fifty, all told");
    assert!(!outcome.interrupted);
    // First window: the child's 10 units plus the translator's ask cost.
    // Resumption charges only the deltas.
    assert_eq!(outcome.budget_consumed, 12);
    assert_eq!(elicitor.remaining(), 0);
}

/// A root machine with a finite budget is interrupted rather than blocked
/// once its own window closes.
#[test]
fn root_budget_exhaustion_interrupts_the_session() {
    let mut elicitor = scripted(&[
        "say thinking",
        "clear 1",
        "say still thinking",
        "clear 1",
        "say one more thought",
        "clear 1",
        "say nearly there",
        "clear 1",
        "say five",
        "clear 1",
        "say six",
        "clear 1",
        "say seven",
        "clear 1",
        "say eight",
        "clear 1",
        "say nine",
        "clear 1",
        "say ten",
    ]);

    let outcome = run_session(
        "how long can this go on?",
        &SessionOptions {
            budget: Budget::Finite(10),
            use_cache: false,
            driver: DriverConfig::default(),
        },
        &mut elicitor,
        &NoBuiltins,
        &mut memory_caches(),
    )
    .expect("session");

    assert!(outcome.interrupted);
    assert_eq!(outcome.value.to_string(), "<<out of budget>>");
    assert_eq!(outcome.budget_consumed, 10);
}
