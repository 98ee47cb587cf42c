//! The pbrain command line.
//!
//! Runs a program file to completion and writes its output to stdout.
//! Everything else (diagnostics, breakpoint pauses, the rendered tape) goes
//! to stderr, so piping program output stays clean.
//!
//! Exit codes: 0 for a successful run, 1 when the program halts abnormally,
//! 2 for a syntax error or an unreadable file.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use structopt::StructOpt;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use pbrain_core::{
    compile, run, CancelToken, CellWidth, DebugConfig, DebugSession, InterpreterResult,
    MachineState, OverflowPolicy, RunConfig, RunState, SyntaxError,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "pbrain", about = "A PBrain (brainfuck with procedures) interpreter")]
struct Opt {
    /// The program file to run.
    #[structopt(parse(from_os_str))]
    program: PathBuf,

    /// Tape size, in cells.
    #[structopt(long = "memory-size", default_value = "64")]
    memory_size: usize,

    /// Cell width in bits: 8 or 16.
    #[structopt(long = "cell-bits", default_value = "8", parse(try_from_str = parse_cell_bits))]
    cell_width: CellWidth,

    /// What cell overflow does: "wrap" or "error".
    #[structopt(long, default_value = "error", parse(try_from_str = parse_overflow))]
    overflow: OverflowPolicy,

    /// Buffered input handed to the program's `,` operator.
    #[structopt(long, default_value = "")]
    stdin: String,

    /// Cancel the run after this many seconds.
    #[structopt(long)]
    timeout: Option<f64>,

    /// Print the compiled opcodes instead of running.
    #[structopt(long = "dump-opcodes")]
    dump_opcodes: bool,

    /// Pause at these source offsets, printing the tape at each stop and
    /// waiting for Enter.
    #[structopt(long = "debug")]
    breakpoints: Vec<usize>,

    /// Print the final tape after the run.
    #[structopt(long = "show-state")]
    show_state: bool,
}

fn main() {
    init_logging();
    let opt = Opt::from_args();

    let source = match fs::read_to_string(&opt.program) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("pbrain: cannot read {}: {}", opt.program.display(), err);
            process::exit(2);
        }
    };

    let code = interpret(&source, &opt);
    io::stdout().flush().ok();
    process::exit(code);
}

fn interpret(source: &str, opt: &Opt) -> i32 {
    if opt.dump_opcodes {
        return match compile(source) {
            Ok(exe) => {
                print!("{}", exe);
                0
            }
            Err(err) => report_syntax_error(err),
        };
    }

    let mut config = RunConfig::new()
        .with_memory_size(opt.memory_size)
        .with_cell_width(opt.cell_width)
        .with_overflow(opt.overflow)
        .with_stdin(opt.stdin.clone());

    if let Some(seconds) = opt.timeout {
        let token = CancelToken::new();
        let watcher = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs_f64(seconds));
            watcher.cancel();
        });
        config = config.with_execution_token(token);
    }

    if opt.breakpoints.is_empty() {
        match run(source, config) {
            Ok(result) => finish(&result, opt),
            Err(err) => report_syntax_error(err),
        }
    } else {
        step_through(source, config, opt)
    }
}

/// Run under breakpoints, narrating every pause on stderr.
fn step_through(source: &str, config: RunConfig, opt: &Opt) -> i32 {
    let config = DebugConfig::new()
        .with_run(config)
        .with_breakpoints(opt.breakpoints.iter().copied());
    let mut session = match DebugSession::new(source, config) {
        Ok(session) => session,
        Err(err) => return report_syntax_error(err),
    };

    loop {
        match session.step() {
            RunState::Paused => {
                let result = session.result();
                let info = result
                    .halting()
                    .expect("a paused session always carries halting info");
                eprintln!("pbrain: paused at '{}' (offset {})", info.operator(), info.offset());
                eprintln!("{}", render_state(result.state()));
                wait_for_enter();
            }
            RunState::Halted => return finish(session.result(), opt),
        }
    }
}

/// Block until the user hits Enter. At end of input (stdin is a pipe, say)
/// this returns immediately, which turns the pauses into plain narration.
fn wait_for_enter() {
    eprint!("pbrain: Enter to continue ");
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin().read_line(&mut line).ok();
}

fn finish(result: &InterpreterResult, opt: &Opt) -> i32 {
    print!("{}", result.stdout());
    debug!(
        exit = %result.exit(),
        ops = result.ops_executed(),
        elapsed = ?result.elapsed(),
        "run complete"
    );

    if opt.show_state {
        eprintln!("{}", render_state(result.state()));
    }

    if result.exit().is_success() {
        0
    } else {
        eprintln!("pbrain: {}", result.exit());
        if let Some(info) = result.halting() {
            eprint!("{}", info);
        }
        1
    }
}

fn report_syntax_error(err: SyntaxError) -> i32 {
    eprintln!("pbrain: syntax error: {}", err);
    2
}

/// One-line tape rendering, the pointer's cell starred.
fn render_state(state: &MachineState) -> String {
    let mut out = String::from("[");
    for cell in state.cells() {
        if cell.selected {
            out.push_str(&format!(" *{}", cell.value));
        } else {
            out.push_str(&format!(" {}", cell.value));
        }
    }
    out.push_str(" ]");
    out
}

fn parse_cell_bits(s: &str) -> Result<CellWidth, String> {
    match s {
        "8" => Ok(CellWidth::Byte),
        "16" => Ok(CellWidth::Word),
        _ => Err(format!("cell width must be 8 or 16, not {}", s)),
    }
}

fn parse_overflow(s: &str) -> Result<OverflowPolicy, String> {
    match s {
        "wrap" => Ok(OverflowPolicy::Wrap),
        "error" => Ok(OverflowPolicy::Error),
        _ => Err(format!("overflow policy must be wrap or error, not {}", s)),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
