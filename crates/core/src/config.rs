//! Knobs for a run: tape shape, overflow policy, buffered stdin, chaining,
//! cancellation, and the buffer pools everything rents from.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashSet;
use tape_pool::BufferPool;

use crate::tape::MachineState;

/// Cells per tape unless the config or an initial state says otherwise.
pub const MEMORY_SIZE_DEFAULT: usize = 64;

/// Characters of stdout a single run may produce. One more is a halt, not a
/// silent truncation.
pub const STDOUT_CAPACITY: usize = 4096;

/// Deepest allowed call stack, with the root program counting as depth 1.
pub const CALL_DEPTH_LIMIT: usize = 512;

/// Dispatched opcodes between polls of the execution token.
pub const CANCEL_POLL_INTERVAL: usize = 1024;

/// How wide one cell is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellWidth {
    /// 8-bit unsigned cells.
    #[default]
    Byte,
    /// 16-bit unsigned cells.
    Word,
}

/// What happens when a cell leaves its value range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Modular arithmetic: past the maximum wraps to 0, below 0 wraps to
    /// the maximum.
    Wrap,
    /// Either direction halts the run.
    #[default]
    Error,
}

/// A cancellation flag shared between a run and whoever may want to stop
/// it. Clones observe the same flag; cancelling is idempotent and cannot be
/// undone.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// The buffer pools one engine shares across its runs: byte tapes, word
/// tapes, and stdout buffers. Clones share the same pools; `Default` makes
/// a fresh, empty set.
#[derive(Clone, Default)]
pub struct PoolSet {
    pub(crate) bytes: BufferPool<u8>,
    pub(crate) words: BufferPool<u16>,
    pub(crate) stdout: BufferPool<char>,
}

impl PoolSet {
    pub fn new() -> Self {
        PoolSet::default()
    }

    /// Buffers currently rented out across all three pools.
    pub fn rented(&self) -> usize {
        self.bytes.rented() + self.words.rented() + self.stdout.rented()
    }

    /// Buffers idle in the free lists, ready for reuse.
    pub fn pooled(&self) -> usize {
        self.bytes.pooled() + self.words.pooled() + self.stdout.pooled()
    }
}

impl fmt::Debug for PoolSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PoolSet")
            .field("rented", &self.rented())
            .field("pooled", &self.pooled())
            .finish()
    }
}

/// Everything a release run needs besides the source.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub memory_size: usize,
    pub cell_width: CellWidth,
    pub overflow: OverflowPolicy,
    /// The whole of stdin, up front. Reading past its end is a halt.
    pub stdin: String,
    /// Start from this state instead of a blank tape. Its size and width
    /// override `memory_size` and `cell_width`.
    pub initial_state: Option<MachineState>,
    /// Polled during the run; cancelling halts with a threshold exit.
    pub execution_token: Option<CancelToken>,
    pub pool: PoolSet,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            memory_size: MEMORY_SIZE_DEFAULT,
            cell_width: CellWidth::default(),
            overflow: OverflowPolicy::default(),
            stdin: String::new(),
            initial_state: None,
            execution_token: None,
            pool: PoolSet::new(),
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        RunConfig::default()
    }

    pub fn with_memory_size(mut self, size: usize) -> Self {
        self.memory_size = size;
        self
    }

    pub fn with_cell_width(mut self, width: CellWidth) -> Self {
        self.cell_width = width;
        self
    }

    pub fn with_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = stdin.into();
        self
    }

    pub fn with_initial_state(mut self, state: MachineState) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn with_execution_token(mut self, token: CancelToken) -> Self {
        self.execution_token = Some(token);
        self
    }

    pub fn with_pool(mut self, pool: PoolSet) -> Self {
        self.pool = pool;
        self
    }
}

/// A [RunConfig] plus what only debug sessions use.
#[derive(Debug, Clone, Default)]
pub struct DebugConfig {
    pub run: RunConfig,
    /// Source offsets to pause at.
    pub breakpoints: FxHashSet<usize>,
    /// Cancelling this makes every breakpoint invisible from then on.
    pub debug_token: CancelToken,
}

impl DebugConfig {
    pub fn new() -> Self {
        DebugConfig::default()
    }

    pub fn with_run(mut self, run: RunConfig) -> Self {
        self.run = run;
        self
    }

    pub fn with_breakpoint(mut self, offset: usize) -> Self {
        self.breakpoints.insert(offset);
        self
    }

    pub fn with_breakpoints(mut self, offsets: impl IntoIterator<Item = usize>) -> Self {
        self.breakpoints.extend(offsets);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_a_small_strict_byte_machine() {
        let config = RunConfig::default();
        assert_eq!(config.memory_size, MEMORY_SIZE_DEFAULT);
        assert_eq!(config.cell_width, CellWidth::Byte);
        assert_eq!(config.overflow, OverflowPolicy::Error);
        assert!(config.stdin.is_empty());
        assert!(config.initial_state.is_none());
        assert!(config.execution_token.is_none());
    }

    #[test]
    fn builder_setters_chain() {
        let config = RunConfig::new()
            .with_memory_size(8)
            .with_cell_width(CellWidth::Word)
            .with_overflow(OverflowPolicy::Wrap)
            .with_stdin("ab");
        assert_eq!(config.memory_size, 8);
        assert_eq!(config.cell_width, CellWidth::Word);
        assert_eq!(config.overflow, OverflowPolicy::Wrap);
        assert_eq!(config.stdin, "ab");
    }

    #[test]
    fn cancel_tokens_share_their_flag_across_clones() {
        let token = CancelToken::new();
        let watcher = token.clone();
        assert!(!watcher.is_cancelled());
        token.cancel();
        assert!(watcher.is_cancelled());
        token.cancel();
        assert!(watcher.is_cancelled());
    }

    #[test]
    fn fresh_pools_hold_nothing() {
        let pools = PoolSet::new();
        assert_eq!(pools.rented(), 0);
        assert_eq!(pools.pooled(), 0);
    }

    #[test]
    fn breakpoints_collect_into_the_set() {
        let config = DebugConfig::new()
            .with_breakpoint(3)
            .with_breakpoints([5, 7, 5]);
        assert_eq!(config.breakpoints.len(), 3);
        assert!(config.breakpoints.contains(&7));
    }
}
