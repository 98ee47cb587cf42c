//! PBrain (brainfuck plus procedures) as a reusable engine.
//!
//! The language needs all of eleven operators, which makes it the perfect
//! excuse to build a complete little runtime without a complicated frontend
//! in the way: a validator with positioned diagnostics, an opcode compiler
//! with run folding, a pooled tape, and an execution engine that can run to
//! completion or crawl breakpoint to breakpoint.
//!
//! The split:
//!
//!  - [validate] scans the source once and pins every syntax error to a
//!    character offset
//!  - [compile] turns valid source into flat opcodes with resolved jump
//!    targets, plus the function table that `:` dispatches into
//!  - [run] executes a release run; a [DebugSession] is the same dispatch
//!    loop paying attention to breakpoints
//!
//! The interpreted program misbehaving at runtime is not an `Err`. The only
//! `Err` anywhere in the API is [SyntaxError]; everything a run does or
//! fails to do comes back inside an [InterpreterResult].

pub mod compile;
pub mod config;
pub mod errors;
pub mod operators;
pub mod result;
pub mod session;
pub mod tape;

mod exec;
mod validate;

pub use crate::compile::{
    compile, compile_unfolded, Executable, Function, FunctionTable, Op, Opcode,
};
pub use crate::config::{
    CancelToken, CellWidth, DebugConfig, OverflowPolicy, PoolSet, RunConfig, CALL_DEPTH_LIMIT,
    CANCEL_POLL_INTERVAL, MEMORY_SIZE_DEFAULT, STDOUT_CAPACITY,
};
pub use crate::errors::{Result, SyntaxError};
pub use crate::operators::{is_operator, Operator};
pub use crate::result::{ExitKind, HaltingInfo, InterpreterResult};
pub use crate::session::{DebugSession, RunState};
pub use crate::tape::{CellView, MachineState};
pub use crate::validate::{is_syntax_valid, validate};

use tracing::debug;

/// Compile `source` and run it to its terminal exit.
pub fn run(source: &str, config: RunConfig) -> Result<InterpreterResult> {
    let exe = compile(source)?;
    debug!(
        opcodes = exe.ops().len(),
        functions = exe.functions().len(),
        "compiled"
    );
    let result = exec::execute(exe, config);
    debug!(exit = %result.exit(), ops = result.ops_executed(), "run finished");
    Ok(result)
}

/// Run an already-compiled program to its terminal exit. [run] is this plus
/// [compile].
pub fn run_compiled(exe: Executable, config: RunConfig) -> InterpreterResult {
    exec::execute(exe, config)
}
