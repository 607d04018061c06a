//! The command loop as an explicit state machine.
//!
//! The original design for this kind of system runs one blocking loop per
//! machine and recurses for sub-questions. Here the whole nested
//! computation is a single flat loop over (current machine, pending
//! terminal value): entering a child machine replaces the current state,
//! and a terminal value returns through the recorded [`Continuation`].
//! That makes every suspension point explicit — the driver either needs a
//! line of input or is done — and makes rewinding (`raise`/`fix`) a plain
//! state assignment instead of stack unwinding.

use crate::core::arena::{Arena, ChangedContinuation, StateId};
use crate::core::budget::Budget;
use crate::core::command::{BadCommand, Command, CommandKind};
use crate::core::machine::{Continuation, Machine, MachineKind, Placement};
use crate::core::message::Message;
use crate::core::oracle::Oracle;
use crate::core::parse::parse_command;

pub const HELP: &str = r##"Valid commands:

"ask <question>", e.g. "ask what is one plus one?"
    optionally ask10, ask100, ask1000... to specify a budget
"reply <answer>", e.g. "reply it is two"
    end the current computation and return an answer
"say <message>" (or "note"), e.g. "say #1 is south of #2"
    add a message to a new register
"view n", e.g. "view 0"
    expand the pointer #n
"clear n", e.g. "clear 3"
    remove the contents of register n
"replace n [and m ...] [with] <message>"
    say <message>, then clear each listed register
"raise n <message>"
    report a problem to the context that produced register n
"fix n"
    re-answer the prompt that produced register n
"more n", e.g. "more 2"
    give an interrupted computation ten times the budget
"resume n <followup>", e.g. "resume 2 don't include zero"
    resume an interrupted computation with a follow-up message
"assert <message>"
    check a raised error by asking a yes/no question

Valid messages: text interspersed with pointers such as "#1",
register references such as "&2", or sub-messages enclosed in
parentheses such as "(one more than #2)"."##;

/// Limits for the recursion guard.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Deepest machine nesting an `ask` may create.
    pub max_depth: u32,
    /// How many ancestor frames to abandon before reporting a recursion
    /// error, so the operator lands with room to breathe.
    pub unwind_frames: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            unwind_frames: 8,
        }
    }
}

/// Everything an elicitation backend needs to obtain one line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRequest {
    /// The rendered register view; also the memoization key.
    pub observation: String,
    pub kind: MachineKind,
    pub prompt: &'static str,
    /// Error text to show above the prompt, if the last command failed.
    pub error: Option<String>,
    /// Lines the operator may want to recall verbatim.
    pub pre_suggestions: Vec<String>,
    /// False when re-prompting after an error: the cached response for
    /// this observation is exactly what went wrong.
    pub cacheable: bool,
}

/// The terminal result of a whole session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub value: Message,
    pub budget_consumed: u64,
    /// True when the root machine ran out of budget instead of replying.
    pub interrupted: bool,
}

/// What the driver needs next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverStep {
    NeedInput(ResponseRequest),
    Done(RunOutcome),
}

enum Step {
    /// The current machine advanced.
    Continue(Machine),
    /// Control entered a (possibly different) machine.
    Enter(Machine),
    /// The current machine produced its terminal value.
    Terminal(Message),
    /// An `ask` hit the depth limit; abandon ancestors instead.
    Unwind,
}

enum StepError {
    Bad(BadCommand),
    Control(ChangedContinuation),
}

impl From<BadCommand> for StepError {
    fn from(err: BadCommand) -> StepError {
        StepError::Bad(err)
    }
}

impl From<ChangedContinuation> for StepError {
    fn from(err: ChangedContinuation) -> StepError {
        StepError::Control(err)
    }
}

struct FixFrame {
    /// Where `fix` was typed; restored when nothing was fixed.
    fix_site: StateId,
    /// The rewind target; committing retires everything after it.
    target: StateId,
    /// The response originally given at the target prompt.
    previous_source: String,
    /// The `fix` line itself, for the "nothing was fixed" report.
    fix_source: String,
}

pub struct Driver {
    arena: Arena,
    state: Machine,
    pending: Option<(Message, Command)>,
    last_command: Option<Command>,
    input: Option<String>,
    error: Option<String>,
    error_source: Option<String>,
    fixing: Option<FixFrame>,
    done: Option<RunOutcome>,
    config: DriverConfig,
}

impl Driver {
    pub fn new(question: &Message, budget: Budget, config: DriverConfig) -> Driver {
        Driver {
            arena: Arena::new(),
            state: Machine::root(question, budget),
            pending: None,
            last_command: None,
            input: None,
            error: None,
            error_source: None,
            fixing: None,
            done: None,
            config,
        }
    }

    /// The machine currently holding control.
    pub fn state(&self) -> &Machine {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        self.done.is_some()
    }

    /// Feed the line of input a previous [`DriverStep::NeedInput`] asked for.
    pub fn provide(&mut self, line: impl Into<String>) {
        self.input = Some(line.into());
    }

    /// Advance until input is needed or the session is over. Only a
    /// control-integrity violation (a stale continuation after a committed
    /// fix) escapes as an error.
    pub fn step(&mut self, oracle: &dyn Oracle) -> Result<DriverStep, ChangedContinuation> {
        loop {
            if let Some(done) = &self.done {
                return Ok(DriverStep::Done(done.clone()));
            }

            // Out of budget: synthesize an interruption instead of blocking.
            if self.pending.is_none() && self.state.exhausted() {
                let snapshot = self.arena.push(self.state.clone());
                let exhausted = self
                    .state
                    .nominal_budget
                    .exceeded_by(self.state.budget_consumed);
                let cmd = Command::new(
                    CommandKind::Interrupted {
                        exhausted,
                        previous: self.last_command.take().map(Box::new),
                        budget_consumed: self.state.budget_consumed,
                    },
                    "",
                )
                .with_state(snapshot);
                let value = if exhausted {
                    Message::plain("<<out of budget>>")
                } else {
                    Message::plain("<<interrupted>>")
                };
                self.pending = Some((value, cmd));
            }

            // A terminal value bubbles through the continuation chain; a
            // parent whose own budget is spent re-interrupts on the next
            // pass around this loop.
            if let Some((value, final_cmd)) = self.pending.take() {
                match self.state.parent.clone() {
                    None => {
                        let outcome = RunOutcome {
                            value,
                            budget_consumed: self.state.budget_consumed,
                            interrupted: final_cmd.is_interrupted(),
                        };
                        self.done = Some(outcome.clone());
                        return Ok(DriverStep::Done(outcome));
                    }
                    Some(cont) => {
                        let consumed = self.state.budget_consumed;
                        self.state = self.finish(cont, value, final_cmd.clone(), consumed)?;
                        self.last_command = Some(final_cmd);
                        continue;
                    }
                }
            }

            let Some(line) = self.input.take() else {
                return Ok(DriverStep::NeedInput(self.request()));
            };
            self.handle_line(line.trim(), oracle)?;
        }
    }

    fn request(&self) -> ResponseRequest {
        let error = match (&self.error, &self.error_source) {
            (Some(error), Some(source)) => Some(format!("{error}: {source}")),
            (Some(error), None) => Some(error.clone()),
            _ => None,
        };
        let mut pre_suggestions = self.state.pre_suggestions();
        if let Some(source) = &self.error_source {
            pre_suggestions.push(source.clone());
        }
        ResponseRequest {
            observation: self.state.render(),
            kind: self.state.kind,
            prompt: self.state.kind.prompt(),
            cacheable: self.error.is_none(),
            error,
            pre_suggestions,
        }
    }

    fn handle_line(&mut self, line: &str, oracle: &dyn Oracle) -> Result<(), ChangedContinuation> {
        if line == "help" {
            self.error = Some(HELP.to_string());
            self.error_source = None;
            return Ok(());
        }

        // Re-entering the same response at a rewound prompt fixes nothing;
        // return to where `fix` was typed.
        if let Some(frame) = &self.fixing {
            if line == frame.previous_source {
                self.state = self.arena.get(frame.fix_site)?.clone();
                self.error = Some("nothing was fixed".to_string());
                self.error_source = Some(frame.fix_source.clone());
                self.fixing = None;
                return Ok(());
            }
        }

        let parsed = parse_command(line);
        if parsed.kind == CommandKind::Malformed {
            self.error = Some("syntax error (type 'help' for help)".to_string());
            self.error_source = Some(line.to_string());
            return Ok(());
        }

        // Any other well-formed response commits the rewind: everything
        // computed after the target is discarded for good.
        if let Some(frame) = self.fixing.take() {
            self.arena.retire_after(frame.target);
        }

        let snapshot = self.arena.push(self.state.clone());
        let cmd = parsed.with_state(snapshot);

        if let CommandKind::Fix { n } = cmd.kind {
            return match self.begin_fix(n, snapshot, line) {
                Ok(()) => Ok(()),
                Err(StepError::Bad(bad)) => {
                    self.set_error(bad, line);
                    Ok(())
                }
                Err(StepError::Control(control)) => Err(control),
            };
        }

        match self.execute(cmd.clone(), snapshot, oracle) {
            Ok(Step::Continue(machine)) => {
                self.state = machine;
                self.clear_error();
                self.last_command = Some(cmd);
            }
            Ok(Step::Enter(machine)) => {
                self.state = machine;
                self.clear_error();
                self.last_command = Some(cmd);
            }
            Ok(Step::Terminal(value)) => {
                self.pending = Some((value, cmd));
                self.clear_error();
            }
            Ok(Step::Unwind) => self.unwind()?,
            Err(StepError::Bad(bad)) => self.set_error(bad, line),
            Err(StepError::Control(control)) => return Err(control),
        }
        Ok(())
    }

    fn set_error(&mut self, bad: BadCommand, line: &str) {
        self.error = Some(bad.0);
        self.error_source = Some(line.to_string());
    }

    fn clear_error(&mut self) {
        self.error = None;
        self.error_source = None;
    }

    fn execute(
        &mut self,
        cmd: Command,
        snapshot: StateId,
        oracle: &dyn Oracle,
    ) -> Result<Step, StepError> {
        let mut work = self.state.clone();
        match cmd.kind.clone() {
            CommandKind::Ask { budget, message } => {
                self.exec_ask(work, cmd, snapshot, budget, message, oracle)
            }
            CommandKind::Reply { message } => {
                let value = message
                    .instantiate(&work.args)
                    .map_err(|_| BadCommand::new("invalid reference"))?;
                Ok(Step::Terminal(value))
            }
            CommandKind::Say { message } => {
                work.validate_refs(&message)?;
                work.add_register(vec![message], Some(cmd.clone()), Placement::Append)?;
                work.consume(1);
                Ok(Step::Continue(work))
            }
            CommandKind::Clear { n } => {
                if n == 0 {
                    return Err(BadCommand::new("can't clear register 0").into());
                }
                work.delete_register(n)?;
                Ok(Step::Continue(work))
            }
            CommandKind::Replace { ns, message } => {
                work.validate_refs(&message)?;
                work.add_register(vec![message], Some(cmd.clone()), Placement::Append)?;
                work.consume(1);
                // Indices are interpreted sequentially: each clear shifts
                // the numbering the next one sees.
                for n in ns {
                    if n == 0 {
                        return Err(BadCommand::new("can't clear register 0").into());
                    }
                    work.delete_register(n)?;
                }
                Ok(Step::Continue(work))
            }
            CommandKind::View { n } => {
                work.view(n)?;
                Ok(Step::Continue(work))
            }
            CommandKind::Raise { n, message } => self.exec_raise(&work, cmd, n, message),
            CommandKind::Resume { n, message } => {
                self.exec_resume(&work, cmd, snapshot, n, Some(message))
            }
            CommandKind::More { n } => self.exec_resume(&work, cmd, snapshot, n, None),
            CommandKind::Assert { message, .. } => self.exec_assert(&work, snapshot, message),
            CommandKind::Fix { .. }
            | CommandKind::Malformed
            | CommandKind::Interrupted { .. }
            | CommandKind::Builtin => Err(BadCommand::new("unexpected command").into()),
        }
    }

    fn exec_ask(
        &mut self,
        mut work: Machine,
        cmd: Command,
        snapshot: StateId,
        budget: Option<Budget>,
        message: Message,
        oracle: &dyn Oracle,
    ) -> Result<Step, StepError> {
        if !work.free_register() {
            return Err(BadCommand::new("no free register (clear one first)").into());
        }
        let question = message
            .instantiate(&work.args)
            .map_err(|_| BadCommand::new("invalid reference"))?;
        let nominal = budget
            .unwrap_or_else(|| work.kind.default_child_budget(work.initial_nominal_budget));

        if let Some(answer) = oracle.answer(&question) {
            work.consume(1);
            let q_line = work.kind.render_question(&question, nominal);
            let a_line = Message::plain("A: ") + answer;
            let provenance = Command {
                kind: CommandKind::Builtin,
                source: cmd.source.clone(),
                state: cmd.state,
            };
            work.add_register(vec![q_line, a_line], Some(provenance), Placement::Append)?;
            return Ok(Step::Continue(work));
        }

        if work.depth + 1 > self.config.max_depth {
            return Ok(Step::Unwind);
        }
        let cont = Continuation::Ask {
            parent: snapshot,
            question: question.clone(),
            nominal,
        };
        Ok(Step::Enter(work.child(&question, nominal, cont)))
    }

    fn exec_raise(
        &mut self,
        work: &Machine,
        cmd: Command,
        n: usize,
        message: Message,
    ) -> Result<Step, StepError> {
        let register = work
            .registers
            .get(n)
            .ok_or_else(|| BadCommand::new("invalid index"))?;
        let target_cmd = register
            .cmd
            .as_ref()
            .and_then(Command::command_for_raise)
            .ok_or_else(|| BadCommand::new("register has no context to raise into"))?;
        let target_state = target_cmd
            .state
            .ok_or_else(|| BadCommand::new("register has no context to raise into"))?;
        let error_message = message
            .instantiate(&work.args)
            .map_err(|_| BadCommand::new("invalid reference"))?;

        let mut target = self.arena.get(target_state)?.clone();
        let line = Message::plain("Error: ") + error_message;
        target.add_register(vec![line], Some(cmd), Placement::Append)?;
        Ok(Step::Continue(target))
    }

    fn exec_resume(
        &mut self,
        work: &Machine,
        cmd: Command,
        snapshot: StateId,
        n: usize,
        followup: Option<Message>,
    ) -> Result<Step, StepError> {
        let register = work
            .registers
            .get(n)
            .ok_or_else(|| BadCommand::new("invalid index"))?;
        let provenance = register
            .cmd
            .as_ref()
            .ok_or_else(|| BadCommand::new("can only resume a question register"))?;
        let CommandKind::Interrupted {
            budget_consumed: already_charged,
            ..
        } = provenance.kind
        else {
            return Err(BadCommand::new("can only resume an interrupted computation").into());
        };
        let child_state = provenance
            .state
            .ok_or_else(|| BadCommand::new("can only resume an interrupted computation"))?;

        let mut child = self.arena.get(child_state)?.clone();
        match followup {
            // `more`: the same computation, one order of magnitude more room.
            None => {
                child.nominal_budget = child.nominal_budget.times_ten();
                child.initial_nominal_budget = child.initial_nominal_budget.times_ten();
            }
            // `resume`: another window at the original scale, plus the
            // follow-up message as a fresh register in the child.
            Some(message) => {
                let followup = message
                    .instantiate(&work.args)
                    .map_err(|_| BadCommand::new("invalid reference"))?;
                child.nominal_budget = child
                    .initial_nominal_budget
                    .extended_past(child.budget_consumed);
                child.add_register(
                    vec![Message::plain("Q: ") + followup],
                    Some(cmd.clone()),
                    Placement::Append,
                )?;
            }
        }
        let by_parent = work.remaining().extended_past(child.budget_consumed);
        child.budget = child.nominal_budget.min(by_parent);
        child.parent = Some(Continuation::Resume {
            parent: snapshot,
            register: n,
            already_charged,
        });
        Ok(Step::Enter(child))
    }

    fn exec_assert(
        &mut self,
        work: &Machine,
        snapshot: StateId,
        message: Message,
    ) -> Result<Step, StepError> {
        let newest = work.registers.len() - 1;
        let pending_raise = work.registers[newest]
            .cmd
            .as_ref()
            .is_some_and(Command::allows_assert);
        if !pending_raise {
            return Err(BadCommand::new("assert must follow a raised error").into());
        }
        let assertion = message
            .instantiate(&work.args)
            .map_err(|_| BadCommand::new("invalid reference"))?;
        if work.depth + 1 > self.config.max_depth {
            return Ok(Step::Unwind);
        }

        let question = Message::plain("is it the case that ")
            + assertion.clone()
            + Message::plain("? please answer yes or no.");
        let nominal = work.kind.default_child_budget(work.initial_nominal_budget);
        let cont = Continuation::Assert {
            parent: snapshot,
            assertion,
            register: newest,
        };
        Ok(Step::Enter(work.child(&question, nominal, cont)))
    }

    fn begin_fix(&mut self, n: usize, fix_site: StateId, line: &str) -> Result<(), StepError> {
        let register = self
            .state
            .registers
            .get(n)
            .ok_or_else(|| BadCommand::new("invalid index"))?;
        let target_cmd = register
            .cmd
            .as_ref()
            .and_then(Command::command_for_fix)
            .ok_or_else(|| BadCommand::new("nothing there to fix"))?;
        let target = target_cmd
            .state
            .ok_or_else(|| BadCommand::new("nothing there to fix"))?;
        let previous_source = target_cmd.source.clone();

        self.state = self.arena.get(target)?.clone();
        self.fixing = Some(FixFrame {
            fix_site,
            target,
            previous_source: previous_source.clone(),
            fix_source: line.to_string(),
        });
        self.error = Some("previously".to_string());
        self.error_source = Some(previous_source);
        Ok(())
    }

    /// A terminal value lands in the parent recorded by the continuation.
    fn finish(
        &mut self,
        cont: Continuation,
        value: Message,
        final_cmd: Command,
        child_consumed: u64,
    ) -> Result<Machine, ChangedContinuation> {
        match cont {
            Continuation::Ask {
                parent,
                question,
                nominal,
            } => {
                let mut machine = self.arena.get(parent)?.clone();
                machine.consume(child_consumed.max(1) + machine.kind.ask_cost());
                let q_line = machine.kind.render_question(&question, nominal);
                let a_line = Message::plain("A: ") + value;
                // The asking machine verified a free register before the
                // child was spawned, so this cannot fail.
                let _ = machine.add_register(vec![q_line, a_line], Some(final_cmd), Placement::Append);
                Ok(machine)
            }
            Continuation::Resume {
                parent,
                register,
                already_charged,
            } => {
                let mut machine = self.arena.get(parent)?.clone();
                let delta = child_consumed.saturating_sub(already_charged);
                machine.consume(delta.max(1));
                let q_line = machine.registers[register].contents[0].clone();
                let a_line = Message::plain("A: ") + value;
                let _ = machine.add_register(
                    vec![q_line, a_line],
                    Some(final_cmd),
                    Placement::Replace(register),
                );
                Ok(machine)
            }
            Continuation::Assert {
                parent,
                assertion,
                register,
            } => {
                let mut machine = self.arena.get(parent)?.clone();
                machine.consume(child_consumed.max(1) + machine.kind.ask_cost());
                let checked = value.to_string().trim().eq_ignore_ascii_case("yes");
                let (contents, provenance) = if checked {
                    (
                        vec![Message::plain("Checked: ") + assertion.clone()],
                        Command::new(
                            CommandKind::Assert {
                                message: assertion,
                                failed: false,
                            },
                            "",
                        ),
                    )
                } else {
                    (
                        vec![
                            Message::plain("Assert: ") + assertion.clone(),
                            Message::plain("A: ") + value,
                        ],
                        Command::new(
                            CommandKind::Assert {
                                message: assertion,
                                failed: true,
                            },
                            "",
                        ),
                    )
                };
                let _ = machine.add_register(contents, Some(provenance), Placement::Replace(register));
                Ok(machine)
            }
        }
    }

    /// Abandon ancestors to put distance between the operator and the
    /// depth limit, then report where control landed.
    fn unwind(&mut self) -> Result<(), ChangedContinuation> {
        let mut state = self.state.clone();
        for _ in 0..self.config.unwind_frames {
            match &state.parent {
                Some(cont) => state = self.arena.get(cont.parent_state())?.clone(),
                None => break,
            }
        }
        self.state = state;
        self.error = Some("recursion error".to_string());
        self.error_source = None;
        self.last_command = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::oracle::NoBuiltins;

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

    fn root_driver(budget: Budget) -> Driver {
        Driver::new(
            &Message::plain("what is one plus one?"),
            budget,
            DriverConfig::default(),
        )
    }

    #[test]
    fn ask_enters_translator_then_implement_child() {
        let mut driver = root_driver(Budget::Finite(100));
        type_line(&mut driver, "ask what is two plus two?");
        let request = need_input(&mut driver);
        assert_eq!(request.kind, MachineKind::Translate);
        assert_eq!(request.prompt, "-> ");
        assert!(request.observation.contains("Q[concrete]: what is two plus two?"));

        driver.provide("ask what is two plus two, in the abstract?");
        let request = need_input(&mut driver);
        assert_eq!(request.kind, MachineKind::Implement);
        assert!(request.observation.contains("Q[10]: "));
    }

    #[test]
    fn reply_through_translator_lands_in_parent_register() {
        let mut driver = root_driver(Budget::Finite(100));
        type_line(&mut driver, "ask what is two plus two?");
        // Translator relays straight back.
        type_line(&mut driver, "reply it is four");
        let request = need_input(&mut driver);
        assert_eq!(request.kind, MachineKind::Implement);
        assert!(request.observation.contains("Q[10]: what is two plus two?"));
        assert!(request.observation.contains("A: it is four"));
        assert!(driver.state().budget_consumed >= 1);
    }

    #[test]
    fn root_reply_finishes_the_session() {
        let mut driver = root_driver(Budget::Finite(100));
        type_line(&mut driver, "reply it is two");
        match driver.step(&NoBuiltins).expect("step") {
            DriverStep::Done(outcome) => {
                assert_eq!(outcome.value.to_string(), "it is two");
                assert!(!outcome.interrupted);
            }
            DriverStep::NeedInput(request) => panic!("still waiting: {request:?}"),
        }
        assert!(driver.is_done());
    }

    #[test]
    fn builtin_answer_short_circuits_and_charges_one() {
        struct TwoPlusTwo;
        impl Oracle for TwoPlusTwo {
            fn answer(&self, question: &Message) -> Option<Message> {
                question
                    .matches("what is two plus two?")
                    .then(|| Message::plain("four"))
            }
        }

        let mut driver = root_driver(Budget::Finite(100));
        match driver.step(&TwoPlusTwo).expect("step") {
            DriverStep::NeedInput(_) => driver.provide("ask what is two plus two?"),
            DriverStep::Done(done) => panic!("unexpected completion: {done:?}"),
        }
        let request = match driver.step(&TwoPlusTwo).expect("step") {
            DriverStep::NeedInput(request) => request,
            DriverStep::Done(done) => panic!("unexpected completion: {done:?}"),
        };
        assert_eq!(request.kind, MachineKind::Implement);
        assert!(request.observation.contains("A: four"));
        assert_eq!(driver.state().budget_consumed, 1);
    }

    #[test]
    fn say_records_a_register_and_charges_one() {
        let mut driver = root_driver(Budget::Finite(100));
        // The sub-message is contextualized into argument #0.
        type_line(&mut driver, "say (one plus one) deserves a careful answer");
        let request = need_input(&mut driver);
        assert!(request.observation.contains("1. #0 deserves a careful answer"));
        assert_eq!(driver.state().budget_consumed, 1);
        assert_eq!(driver.state().args.len(), 1);
    }

    #[test]
    fn say_with_out_of_range_pointer_reprompts_without_mutation() {
        let mut driver = root_driver(Budget::Finite(100));
        type_line(&mut driver, "say #7 is nonsense");
        let request = need_input(&mut driver);
        assert_eq!(request.error.as_deref(), Some("invalid reference: say #7 is nonsense"));
        assert!(!request.cacheable);
        assert_eq!(driver.state().registers.len(), 1);
        assert_eq!(driver.state().budget_consumed, 0);
    }

    #[test]
    fn clear_register_zero_is_always_rejected() {
        let mut driver = root_driver(Budget::Finite(100));
        type_line(&mut driver, "clear 0");
        let request = need_input(&mut driver);
        assert_eq!(request.error.as_deref(), Some("can't clear register 0: clear 0"));
    }

    #[test]
    fn replace_clears_with_sequential_index_shifting() {
        let mut driver = root_driver(Budget::Finite(100));
        type_line(&mut driver, "say alpha");
        type_line(&mut driver, "say beta");
        type_line(&mut driver, "say gamma");
        // After "clear 1" (alpha), the old gamma register shifts to 2, so
        // the second index removes it.
        type_line(&mut driver, "replace 1 and 2 with delta");
        let request = need_input(&mut driver);
        assert!(request.observation.contains("beta"));
        assert!(request.observation.contains("delta"));
        assert!(!request.observation.contains("alpha"));
        assert!(!request.observation.contains("gamma"));
    }

    #[test]
    fn budget_exhaustion_interrupts_and_more_resumes_with_tenfold_budget() {
        let mut driver = root_driver(Budget::Unlimited);
        type_line(&mut driver, "ask10 count the grains of sand");
        // Translator relays with the whole allowance.
        type_line(&mut driver, "ask count the grains of sand, abstractly");

        // Burn the implement child's window of 10, clearing as we go so
        // the register file never fills up.
        for i in 0..9 {
            type_line(&mut driver, &format!("say grain {i}"));
            type_line(&mut driver, "clear 1");
        }
        type_line(&mut driver, "say grain 9");

        // The interruption cascades: relaying the exhausted answer charges
        // the translator past its own window, so the root sees it.
        let request = need_input(&mut driver);
        assert_eq!(request.kind, MachineKind::Implement);
        assert!(request.observation.contains("A: <<out of budget>>"));
        assert!(request.observation.contains("Q[10]: count the grains of sand"));

        // Resuming peels the cascade one hop at a time: first the
        // translator...
        driver.provide("more 1");
        let request = need_input(&mut driver);
        assert_eq!(request.kind, MachineKind::Translate);
        assert_eq!(driver.state().nominal_budget, Budget::Finite(100));

        // ...then the implement child, suspended mid-count.
        driver.provide("more 1");
        let request = need_input(&mut driver);
        assert_eq!(request.kind, MachineKind::Implement);
        assert_eq!(request.prompt, ">> ");
        assert_eq!(driver.state().nominal_budget, Budget::Finite(100));
        assert!(driver.state().budget_consumed >= 10);
        assert!(request.observation.contains("grain 9"));
    }

    #[test]
    fn fix_with_identical_response_restores_the_fix_site() {
        let mut driver = root_driver(Budget::Finite(100));
        type_line(&mut driver, "say the first note");
        type_line(&mut driver, "fix 1");
        let request = need_input(&mut driver);
        assert_eq!(request.error.as_deref(), Some("previously: say the first note"));
        assert_eq!(driver.state().registers.len(), 1);

        driver.provide("say the first note");
        let request = need_input(&mut driver);
        assert_eq!(request.error.as_deref(), Some("nothing was fixed: fix 1"));
        assert_eq!(driver.state().registers.len(), 2);
    }

    #[test]
    fn fix_with_different_response_commits_the_rewind() {
        let mut driver = root_driver(Budget::Finite(100));
        type_line(&mut driver, "say the first note");
        type_line(&mut driver, "say the second note");
        type_line(&mut driver, "fix 1");
        let _ = need_input(&mut driver);
        driver.provide("say a better note");
        let request = need_input(&mut driver);
        // The rewind discarded the second note along with the first.
        assert!(request.observation.contains("a better note"));
        assert!(!request.observation.contains("the first note"));
        assert!(!request.observation.contains("the second note"));
    }

    #[test]
    fn raise_appends_an_error_register_in_the_producing_context() {
        let mut driver = root_driver(Budget::Finite(100));
        type_line(&mut driver, "say the premise");
        type_line(&mut driver, "raise 1 the premise is wrong");
        let request = need_input(&mut driver);
        assert!(request.observation.contains("Error: the premise is wrong"));
        // Raising into a `say` register re-enters this same machine, just
        // before the say happened.
        assert!(!request.observation.contains("1. the premise"));
    }

    #[test]
    fn assert_requires_a_pending_raise() {
        let mut driver = root_driver(Budget::Finite(100));
        type_line(&mut driver, "assert everything is fine");
        let request = need_input(&mut driver);
        assert_eq!(
            request.error.as_deref(),
            Some("assert must follow a raised error: assert everything is fine")
        );
    }

    #[test]
    fn assert_yes_replaces_the_raise_with_a_check_mark() {
        let mut driver = root_driver(Budget::Finite(100));
        type_line(&mut driver, "say the premise");
        type_line(&mut driver, "raise 1 the premise is wrong");
        type_line(&mut driver, "assert the premise was checked twice");
        // The assert spawns a yes/no question to a translator child.
        let request = need_input(&mut driver);
        assert_eq!(request.kind, MachineKind::Translate);
        assert!(request.observation.contains("is it the case that"));
        driver.provide("reply yes");

        let request = need_input(&mut driver);
        assert_eq!(request.kind, MachineKind::Implement);
        assert!(request.observation.contains("Checked: the premise was checked twice"));
        assert!(!request.observation.contains("Error:"));
    }

    #[test]
    fn assert_non_yes_marks_the_assert_failed_and_allows_retry() {
        let mut driver = root_driver(Budget::Finite(100));
        type_line(&mut driver, "say the premise");
        type_line(&mut driver, "raise 1 the premise is wrong");
        type_line(&mut driver, "assert the premise was checked twice");
        type_line(&mut driver, "reply no, it was checked once");

        let request = need_input(&mut driver);
        assert!(request.observation.contains("Assert: the premise was checked twice"));
        assert!(request.observation.contains("A: no, it was checked once"));

        // A failed assert may be retried.
        driver.provide("assert the premise was checked at least once");
        let request = need_input(&mut driver);
        assert_eq!(request.kind, MachineKind::Translate);
        assert!(request.observation.contains("is it the case that"));
    }

    #[test]
    fn ask_past_the_depth_limit_unwinds_to_an_ancestor() {
        let mut driver = Driver::new(
            &Message::plain("how deep does it go?"),
            Budget::Unlimited,
            DriverConfig {
                max_depth: 3,
                unwind_frames: 2,
            },
        );
        type_line(&mut driver, "ask level one");
        type_line(&mut driver, "ask level two");
        type_line(&mut driver, "ask level three");
        assert_eq!(driver.state().depth, 3);

        type_line(&mut driver, "ask level four");
        let request = need_input(&mut driver);
        assert_eq!(request.error.as_deref(), Some("recursion error"));
        assert_eq!(driver.state().depth, 1);
    }

    #[test]
    fn help_reprompts_without_touching_state() {
        let mut driver = root_driver(Budget::Finite(100));
        type_line(&mut driver, "help");
        let request = need_input(&mut driver);
        assert!(request.error.as_deref().is_some_and(|e| e.contains("Valid commands")));
        assert_eq!(driver.state().registers.len(), 1);
    }
}
