//! Breakpoint-stepped execution.
//!
//! A [DebugSession] owns one run and doles it out pause by pause. Between
//! pauses nothing is recomputed: the tape, the buffers, and the call stack
//! stay live inside the runner, and each pause clones out an immutable
//! result. Misusing the session (resuming one that is not paused, stepping
//! one that already halted) is a caller bug and panics; nothing about the
//! *interpreted* program can make these methods panic.

use tracing::{debug, trace};

use crate::compile::compile_unfolded;
use crate::config::{CancelToken, DebugConfig};
use crate::errors::Result;
use crate::exec::{AnyRunner, DebugControls};
use crate::result::InterpreterResult;

/// Where a session stands after an advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Stopped at a breakpoint; the session can go on.
    Paused,
    /// Reached a terminal exit; the session is done.
    Halted,
}

/// One debuggable run.
pub struct DebugSession {
    runner: AnyRunner,
    debug_token: CancelToken,
    latest: Option<InterpreterResult>,
}

impl DebugSession {
    /// Compile `source` and set up a run that honors the config's
    /// breakpoints. Compilation is unfolded so that every operator keeps
    /// its own opcode; a breakpoint in the middle of a `+++` run could
    /// never match a folded one.
    pub fn new(source: &str, config: DebugConfig) -> Result<Self> {
        let exe = compile_unfolded(source)?;
        debug!(
            opcodes = exe.ops().len(),
            breakpoints = config.breakpoints.len(),
            "session compiled"
        );
        let debug_token = config.debug_token.clone();
        let controls = DebugControls {
            breakpoints: config.breakpoints,
            token: config.debug_token,
        };
        Ok(DebugSession {
            runner: AnyRunner::new(exe, config.run, Some(controls)),
            debug_token,
            latest: None,
        })
    }

    /// Advance to the next breakpoint or to a terminal exit.
    ///
    /// Panics when the session already halted.
    pub fn step(&mut self) -> RunState {
        assert!(
            self.state() != Some(RunState::Halted),
            "cannot step a session that already halted"
        );
        let result = self.runner.advance();
        trace!(exit = %result.exit(), ops = result.ops_executed(), "session advanced");
        self.latest = Some(result);
        self.state().expect("a step always leaves a result")
    }

    /// [DebugSession::step], but only from a breakpoint pause.
    ///
    /// Panics when the session is not currently paused.
    pub fn resume(&mut self) -> RunState {
        assert!(
            self.state() == Some(RunState::Paused),
            "can only resume a session paused at a breakpoint"
        );
        self.step()
    }

    /// Stop honoring breakpoints and advance to a terminal exit.
    pub fn run_to_completion(&mut self) -> RunState {
        self.debug_token.cancel();
        self.step()
    }

    /// `Paused`, `Halted`, or `None` before the first step.
    pub fn state(&self) -> Option<RunState> {
        self.latest.as_ref().map(|result| {
            if result.exit().is_terminal() {
                RunState::Halted
            } else {
                RunState::Paused
            }
        })
    }

    /// The result of the most recent advance. Each pause's result is a
    /// snapshot; it does not change when the session moves on.
    ///
    /// Panics before the first step.
    pub fn result(&self) -> &InterpreterResult {
        self.latest
            .as_ref()
            .expect("no result before the first step")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::result::ExitKind;

    fn session(source: &str, breakpoints: impl IntoIterator<Item = usize>) -> DebugSession {
        let config = DebugConfig::new().with_breakpoints(breakpoints);
        DebugSession::new(source, config).unwrap()
    }

    #[test]
    fn pauses_at_a_breakpoint_then_finishes() {
        let mut session = session("+++", [1]);
        assert_eq!(session.state(), None);

        assert_eq!(session.step(), RunState::Paused);
        let paused = session.result();
        assert_eq!(paused.exit(), ExitKind::BreakpointReached);
        assert_eq!(paused.state().values()[0], 1);
        let info = paused.halting().unwrap();
        assert_eq!(info.operator(), '+');
        assert_eq!(info.offset(), 1);

        assert_eq!(session.resume(), RunState::Halted);
        let done = session.result();
        assert_eq!(done.exit(), ExitKind::Success);
        assert_eq!(done.state().values()[0], 3);
        assert!(done.halting().is_none());
    }

    #[test]
    fn a_breakpoint_in_a_loop_pauses_every_pass() {
        let mut session = session("++[-]", [3]);

        assert_eq!(session.step(), RunState::Paused);
        assert_eq!(session.result().state().values()[0], 2);

        assert_eq!(session.resume(), RunState::Paused);
        assert_eq!(session.result().state().values()[0], 1);

        assert_eq!(session.resume(), RunState::Halted);
        assert_eq!(session.result().exit(), ExitKind::Success);
        assert_eq!(session.result().state().values()[0], 0);
    }

    #[test]
    fn pause_results_survive_later_steps() {
        let mut session = session("+>++", [2]);
        session.step();
        let at_pause = session.result().clone();
        session.run_to_completion();

        assert_eq!(&at_pause.state().values()[..2], &[1, 0]);
        assert_eq!(session.result().state().values()[1], 2);
        assert_ne!(at_pause.state(), session.result().state());
    }

    #[test]
    fn run_to_completion_ignores_breakpoints() {
        let mut session = session("+++", [0, 1, 2]);
        assert_eq!(session.run_to_completion(), RunState::Halted);
        assert_eq!(session.result().exit(), ExitKind::Success);
        assert_eq!(session.result().state().values()[0], 3);
    }

    #[test]
    fn a_session_can_halt_on_a_runtime_failure() {
        let mut session = session("+<", [1]);
        assert_eq!(session.step(), RunState::Paused);
        assert_eq!(session.resume(), RunState::Halted);
        assert_eq!(session.result().exit(), ExitKind::LowerBoundExceeded);
    }

    #[test]
    fn sessions_report_syntax_errors_up_front() {
        let config = DebugConfig::new();
        assert!(DebugSession::new("][", config).is_err());
    }

    #[test]
    fn a_session_honors_the_run_config() {
        let config = DebugConfig::new().with_run(RunConfig::new().with_stdin("A"));
        let mut session = DebugSession::new(",.", config).unwrap();
        assert_eq!(session.step(), RunState::Halted);
        assert_eq!(session.result().stdout(), "A");
    }

    #[test]
    #[should_panic(expected = "resume")]
    fn resuming_a_fresh_session_panics() {
        let mut session = session("+", []);
        session.resume();
    }

    #[test]
    #[should_panic(expected = "already halted")]
    fn stepping_a_halted_session_panics() {
        let mut session = session("+", []);
        session.step();
        session.step();
    }

    #[test]
    #[should_panic(expected = "no result")]
    fn asking_for_a_result_too_early_panics() {
        let session = session("+", []);
        let _ = session.result();
    }
}
