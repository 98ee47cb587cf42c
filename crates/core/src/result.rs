//! What a run hands back to its caller.
//!
//! Runtime misbehavior of the *interpreted* program (falling off the tape,
//! running out of stdin) is not a Rust error. It is a normal outcome,
//! described by [ExitKind] and [HaltingInfo] inside an [InterpreterResult].

use std::fmt;
use std::time::Duration;

use crate::compile::FunctionTable;
use crate::tape::MachineState;

/// Why execution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Ran off the end of the program with nothing wrong.
    Success,
    /// The pointer moved left of cell 0.
    LowerBoundExceeded,
    /// The pointer moved past the last cell.
    UpperBoundExceeded,
    /// A cell would have gone below zero under the erroring policy.
    NegativeValue,
    /// A cell would have passed its maximum under the erroring policy.
    MaxValueExceeded,
    /// `,` executed with no stdin left.
    StdinBufferExhausted,
    /// `.` executed with the stdout buffer already full.
    StdoutBufferLimitExceeded,
    /// The execution token was cancelled mid-run.
    ThresholdExceeded,
    /// A `:` would have pushed past the call depth limit.
    StackLimitExceeded,
    /// Paused at a breakpoint. The only non-terminal exit: the session it
    /// belongs to can keep going.
    BreakpointReached,
}

impl ExitKind {
    pub fn is_success(self) -> bool {
        matches!(self, ExitKind::Success)
    }

    /// True for every exit that ends a run for good. A breakpoint pause is
    /// the one exit that does not.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExitKind::BreakpointReached)
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ExitKind::*;
        let text = match self {
            Success => "success",
            LowerBoundExceeded => "pointer moved below cell 0",
            UpperBoundExceeded => "pointer moved past the last cell",
            NegativeValue => "cell value went below zero",
            MaxValueExceeded => "cell value went past its maximum",
            StdinBufferExhausted => "read past the end of stdin",
            StdoutBufferLimitExceeded => "stdout buffer limit exceeded",
            ThresholdExceeded => "execution threshold exceeded",
            StackLimitExceeded => "call stack limit exceeded",
            BreakpointReached => "paused at a breakpoint",
        };
        f.write_str(text)
    }
}

/// Where execution stopped early and what it was doing there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaltingInfo {
    stack_trace: Vec<String>,
    operator: char,
    offset: usize,
}

impl HaltingInfo {
    pub(crate) fn new(stack_trace: Vec<String>, operator: char, offset: usize) -> Self {
        HaltingInfo {
            stack_trace,
            operator,
            offset,
        }
    }

    /// One entry per active frame, innermost first. Each entry quotes its
    /// frame's region (a function body, or the whole program for the last
    /// entry) from the region's start through the operator that frame was
    /// executing.
    pub fn stack_trace(&self) -> &[String] {
        &self.stack_trace
    }

    /// The operator being executed when the run stopped.
    pub fn operator(&self) -> char {
        self.operator
    }

    /// Zero-based source offset of that operator.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl fmt::Display for HaltingInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "'{}' at offset {}", self.operator, self.offset)?;
        for frame in &self.stack_trace {
            writeln!(f, "  in {}", frame)?;
        }
        Ok(())
    }
}

/// Everything one run (or one pause of a debug session) produced. Immutable
/// once built; the state inside is a deep copy, so it stays valid while a
/// session keeps executing.
#[derive(Debug, Clone)]
pub struct InterpreterResult {
    exit: ExitKind,
    stdout: String,
    state: MachineState,
    functions: FunctionTable,
    halting: Option<HaltingInfo>,
    elapsed: Duration,
    ops_executed: u64,
}

impl InterpreterResult {
    pub(crate) fn new(
        exit: ExitKind,
        stdout: String,
        state: MachineState,
        functions: FunctionTable,
        halting: Option<HaltingInfo>,
        elapsed: Duration,
        ops_executed: u64,
    ) -> Self {
        debug_assert_eq!(halting.is_some(), !exit.is_success());
        InterpreterResult {
            exit,
            stdout,
            state,
            functions,
            halting,
            elapsed,
            ops_executed,
        }
    }

    pub fn exit(&self) -> ExitKind {
        self.exit
    }

    /// Everything the program wrote, capped at the stdout buffer limit.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// `Some` exactly when the exit is anything but [ExitKind::Success],
    /// breakpoint pauses included.
    pub fn halting(&self) -> Option<&HaltingInfo> {
        self.halting.as_ref()
    }

    /// Wall-clock time spent executing. For a session this accumulates
    /// across pauses.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Operator sub-steps that completed, counting each step of a folded
    /// run separately.
    pub fn ops_executed(&self) -> u64 {
        self.ops_executed
    }
}
