//! The dispatch loop. Both execution modes run through here: a release run
//! is one call to [Runner::advance] that goes all the way to a terminal
//! exit, and a debug session is repeated calls that come back early at
//! breakpoints.
//!
//! The runner is monomorphic over the cell width; [AnyRunner] picks the
//! width once, when the run starts, from the initial state or the config.

use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;
use tape_pool::PooledBuffer;

use crate::compile::{Executable, Op};
use crate::config::{
    CancelToken, CellWidth, RunConfig, CALL_DEPTH_LIMIT, CANCEL_POLL_INTERVAL, STDOUT_CAPACITY,
};
use crate::result::{ExitKind, HaltingInfo, InterpreterResult};
use crate::tape::{Cell, Tape, TapeFault};

/// What only debug runs carry.
pub(crate) struct DebugControls {
    pub breakpoints: FxHashSet<usize>,
    /// Once cancelled, breakpoints stop matching for the rest of the run.
    pub token: CancelToken,
}

/// One entry of the call stack. The bottom frame is the root program; every
/// frame above it runs a function body.
struct Frame {
    /// Table index of the function this frame runs; `None` for the root.
    function: Option<usize>,
    /// Opcode index execution continues at once this frame returns.
    return_pc: usize,
    /// Offset of the `:` this frame is suspended in while a callee runs.
    suspended_at: Option<usize>,
}

impl Frame {
    fn root() -> Self {
        Frame {
            function: None,
            return_pc: 0,
            suspended_at: None,
        }
    }
}

/// How one call to the dispatch loop ended.
enum Stop {
    /// Ran off the end of the program.
    Done,
    /// Stopped at the operator with this source offset.
    At(ExitKind, usize),
}

pub(crate) struct Runner<C: Cell> {
    exe: Executable,
    tape: Tape<C>,
    frames: Vec<Frame>,
    pc: usize,
    stdin: Vec<char>,
    stdin_cursor: usize,
    stdout: PooledBuffer<char>,
    stdout_len: usize,
    ops_executed: u64,
    since_poll: usize,
    elapsed: Duration,
    execution_token: Option<CancelToken>,
    debug: Option<DebugControls>,
    /// Opcode index of the breakpoint we paused at, so resuming does not
    /// trip over the same breakpoint without moving.
    resumed_from: Option<usize>,
}

impl<C: Cell> Runner<C> {
    pub fn new(exe: Executable, config: RunConfig, debug: Option<DebugControls>) -> Self {
        let tape = match config.initial_state.as_ref() {
            Some(state) => Tape::restore(state, config.overflow, C::pool(&config.pool)),
            None => Tape::new(config.memory_size, config.overflow, C::pool(&config.pool)),
        };
        let stdout = config.pool.stdout.rent(STDOUT_CAPACITY);

        Runner {
            exe,
            tape,
            frames: vec![Frame::root()],
            pc: 0,
            stdin: config.stdin.chars().collect(),
            stdin_cursor: 0,
            stdout,
            stdout_len: 0,
            ops_executed: 0,
            since_poll: 0,
            elapsed: Duration::ZERO,
            execution_token: config.execution_token,
            debug,
            resumed_from: None,
        }
    }

    /// Run until a terminal exit or, in debug mode, a breakpoint. Time
    /// spent here accumulates into the result's `elapsed`.
    pub fn advance(&mut self) -> InterpreterResult {
        let started = Instant::now();
        let stop = self.dispatch_loop();
        self.elapsed += started.elapsed();
        self.build_result(stop)
    }

    fn dispatch_loop(&mut self) -> Stop {
        use Op::*;

        loop {
            if self.pc >= self.exe.ops().len() {
                return Stop::Done;
            }

            if self.since_poll >= CANCEL_POLL_INTERVAL {
                self.since_poll = 0;
                if let Some(token) = &self.execution_token {
                    if token.is_cancelled() {
                        let offset = self.exe.ops()[self.pc].offset;
                        return Stop::At(ExitKind::ThresholdExceeded, offset);
                    }
                }
            }

            let opcode = self.exe.ops()[self.pc];

            if let Some(debug) = &self.debug {
                if !debug.token.is_cancelled()
                    && self.resumed_from != Some(self.pc)
                    && debug.breakpoints.contains(&opcode.offset)
                {
                    self.resumed_from = Some(self.pc);
                    return Stop::At(ExitKind::BreakpointReached, opcode.offset);
                }
            }
            self.resumed_from = None;
            self.since_poll += 1;

            match opcode.op {
                Right(n) => {
                    let moved = self.tape.move_right(n);
                    if let Some(stop) = self.counted(moved, n, opcode.offset) {
                        return stop;
                    }
                }
                Left(n) => {
                    let moved = self.tape.move_left(n);
                    if let Some(stop) = self.counted(moved, n, opcode.offset) {
                        return stop;
                    }
                }
                Add(n) => {
                    let added = self.tape.add(n);
                    if let Some(stop) = self.counted(added, n, opcode.offset) {
                        return stop;
                    }
                }
                Sub(n) => {
                    let subtracted = self.tape.sub(n);
                    if let Some(stop) = self.counted(subtracted, n, opcode.offset) {
                        return stop;
                    }
                }
                Out => {
                    if self.stdout_len == STDOUT_CAPACITY {
                        return Stop::At(ExitKind::StdoutBufferLimitExceeded, opcode.offset);
                    }
                    let c = char::from_u32(self.tape.current())
                        .unwrap_or(char::REPLACEMENT_CHARACTER);
                    self.stdout[self.stdout_len] = c;
                    self.stdout_len += 1;
                    self.ops_executed += 1;
                }
                In => {
                    let Some(&c) = self.stdin.get(self.stdin_cursor) else {
                        return Stop::At(ExitKind::StdinBufferExhausted, opcode.offset);
                    };
                    let read = self.tape.input(c);
                    if let Some(stop) = self.counted(read, 1, opcode.offset) {
                        return stop;
                    }
                    self.stdin_cursor += 1;
                }
                LoopStart(target) => {
                    self.ops_executed += 1;
                    if self.tape.current() == 0 {
                        self.pc = target;
                        continue;
                    }
                }
                LoopEnd(target) => {
                    self.ops_executed += 1;
                    self.pc = target;
                    continue;
                }
                FnStart(target) => {
                    // Declaring a function skips its body.
                    self.ops_executed += 1;
                    self.pc = target;
                    continue;
                }
                FnEnd => {
                    self.ops_executed += 1;
                    let frame = self
                        .frames
                        .pop()
                        .expect("a function frame is active when ret executes");
                    self.top_frame().suspended_at = None;
                    self.pc = frame.return_pc;
                    continue;
                }
                Call => {
                    let index = self.tape.current() as usize;
                    let entry = self.exe.functions().get(index).map(|fun| fun.entry());
                    if let Some(entry) = entry {
                        if self.frames.len() >= CALL_DEPTH_LIMIT {
                            return Stop::At(ExitKind::StackLimitExceeded, opcode.offset);
                        }
                        self.ops_executed += 1;
                        self.top_frame().suspended_at = Some(opcode.offset);
                        self.frames.push(Frame {
                            function: Some(index),
                            return_pc: self.pc + 1,
                            suspended_at: None,
                        });
                        self.pc = entry;
                        continue;
                    }
                    // No function at that index: `:` is a no-op.
                    self.ops_executed += 1;
                }
                Reset => {
                    self.tape.reset_cell();
                    self.ops_executed += 1;
                }
            }

            self.pc += 1;
        }
    }

    fn top_frame(&mut self) -> &mut Frame {
        self.frames
            .last_mut()
            .expect("the frame stack always holds the root")
    }

    /// Book a counted tape operation: credit the sub-steps that ran, and on
    /// a fault turn it into a halt at the exact failing operator.
    fn counted(
        &mut self,
        outcome: Result<(), TapeFault>,
        count: usize,
        offset: usize,
    ) -> Option<Stop> {
        match outcome {
            Ok(()) => {
                self.ops_executed += count as u64;
                None
            }
            Err(fault) => {
                self.ops_executed += fault.succeeded as u64;
                Some(Stop::At(fault.kind, offset + fault.succeeded))
            }
        }
    }

    fn build_result(&self, stop: Stop) -> InterpreterResult {
        let (exit, halting) = match stop {
            Stop::Done => (ExitKind::Success, None),
            Stop::At(kind, offset) => (kind, Some(self.halting_info(offset))),
        };
        InterpreterResult::new(
            exit,
            self.stdout[..self.stdout_len].iter().collect(),
            self.tape.snapshot(),
            self.exe.functions().clone(),
            halting,
            self.elapsed,
            self.ops_executed,
        )
    }

    /// Quote what every active frame was doing, innermost first. Each frame
    /// contributes a prefix of its own region: the faulted (or paused)
    /// operator for the top frame, the suspended `:` for the ones below.
    fn halting_info(&self, offset: usize) -> HaltingInfo {
        let operator = self
            .exe
            .source()
            .chars()
            .nth(offset)
            .expect("halting offsets point at an operator in the source");

        let innermost = self.frames.len() - 1;
        let mut trace = Vec::with_capacity(self.frames.len());
        for (depth, frame) in self.frames.iter().enumerate().rev() {
            let at = if depth == innermost {
                offset
            } else {
                frame
                    .suspended_at
                    .expect("every outer frame is suspended in a call")
            };
            trace.push(self.fragment(frame, at));
        }

        HaltingInfo::new(trace, operator, offset)
    }

    /// The text of `frame`'s region from its start through the operator at
    /// source offset `at`.
    fn fragment(&self, frame: &Frame, at: usize) -> String {
        let (region, start) = match frame.function {
            Some(index) => {
                let fun = self
                    .exe
                    .functions()
                    .get(index)
                    .expect("frames only reference functions in the table");
                (fun.body(), fun.offset() + 1)
            }
            None => (self.exe.source(), 0),
        };
        region.chars().take(at - start + 1).collect()
    }
}

/// A runner with the width picked at runtime. The pick happens exactly
/// once; everything after dispatches straight into monomorphic code.
pub(crate) enum AnyRunner {
    Bytes(Runner<u8>),
    Words(Runner<u16>),
}

impl AnyRunner {
    pub fn new(exe: Executable, config: RunConfig, debug: Option<DebugControls>) -> Self {
        let width = config
            .initial_state
            .as_ref()
            .map(|state| state.width())
            .unwrap_or(config.cell_width);
        match width {
            CellWidth::Byte => AnyRunner::Bytes(Runner::new(exe, config, debug)),
            CellWidth::Word => AnyRunner::Words(Runner::new(exe, config, debug)),
        }
    }

    pub fn advance(&mut self) -> InterpreterResult {
        match self {
            AnyRunner::Bytes(runner) => runner.advance(),
            AnyRunner::Words(runner) => runner.advance(),
        }
    }
}

/// Run a compiled program to its terminal exit.
pub(crate) fn execute(exe: Executable, config: RunConfig) -> InterpreterResult {
    AnyRunner::new(exe, config, None).advance()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::config::OverflowPolicy;

    fn run_release(source: &str, config: RunConfig) -> InterpreterResult {
        execute(compile(source).unwrap(), config)
    }

    #[test]
    fn a_folded_fault_lands_on_the_exact_operator() {
        let result = run_release(">>>", RunConfig::new().with_memory_size(2));
        assert_eq!(result.exit(), ExitKind::UpperBoundExceeded);
        let info = result.halting().unwrap();
        assert_eq!(info.operator(), '>');
        assert_eq!(info.offset(), 1);
        assert_eq!(info.stack_trace(), [">>".to_string()]);
        assert_eq!(result.ops_executed(), 1);
        assert_eq!(result.state().pointer(), 1);
    }

    #[test]
    fn the_trace_quotes_the_program_up_to_the_fault() {
        let result = run_release("+++>>-++", RunConfig::new());
        assert_eq!(result.exit(), ExitKind::NegativeValue);
        let info = result.halting().unwrap();
        assert_eq!(info.stack_trace(), ["+++>>-".to_string()]);
        assert_eq!(info.operator(), '-');
        assert_eq!(info.offset(), 5);
    }

    #[test]
    fn calling_a_missing_function_is_a_no_op() {
        let result = run_release("+:", RunConfig::new().with_overflow(OverflowPolicy::Wrap));
        assert_eq!(result.exit(), ExitKind::Success);
        assert_eq!(result.state().values()[0], 1);
    }

    #[test]
    fn stdout_stops_dead_at_its_capacity() {
        let result = run_release("+[.]", RunConfig::new());
        assert_eq!(result.exit(), ExitKind::StdoutBufferLimitExceeded);
        assert_eq!(result.stdout().chars().count(), STDOUT_CAPACITY);
        assert_eq!(result.halting().unwrap().operator(), '.');
    }

    #[test]
    fn a_cancelled_token_halts_at_the_next_poll() {
        let token = CancelToken::new();
        token.cancel();
        let result = run_release(
            "+[]",
            RunConfig::new().with_execution_token(token),
        );
        assert_eq!(result.exit(), ExitKind::ThresholdExceeded);
        assert_eq!(result.ops_executed(), CANCEL_POLL_INTERVAL as u64);
        // The loop never touched the cell after the first increment.
        assert_eq!(result.state().values()[0], 1);
    }

    #[test]
    fn reading_past_stdin_halts() {
        let result = run_release(",,", RunConfig::new().with_stdin("a"));
        assert_eq!(result.exit(), ExitKind::StdinBufferExhausted);
        assert_eq!(result.halting().unwrap().offset(), 1);
        assert_eq!(result.state().values()[0], 97);
    }

    #[test]
    fn function_frames_produce_nested_traces() {
        // fn 0 moves left off the tape as soon as it is called.
        let result = run_release("(<):", RunConfig::new());
        assert_eq!(result.exit(), ExitKind::LowerBoundExceeded);
        let info = result.halting().unwrap();
        assert_eq!(
            info.stack_trace(),
            ["<".to_string(), "(<):".to_string()]
        );
        assert_eq!(info.operator(), '<');
        assert_eq!(info.offset(), 1);
    }
}
