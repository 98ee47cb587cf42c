//! The tape: a fixed-size strip of unsigned cells and a pointer.
//!
//! Two representations live here. [Tape] is the live, monomorphic one the
//! dispatch loop mutates; its storage is rented from a [BufferPool] and goes
//! back to the pool on drop. [MachineState] is the width-erased snapshot a
//! caller gets to keep: plain `Vec` storage, cheap to clone, and safe to
//! hold long after the run (and its pool) are gone.
//!
//! Every tape operation takes the whole repeat count of a folded opcode and,
//! on failure, reports how many single-operator sub-steps made it. The
//! pointer and cell are left exactly where the last successful sub-step put
//! them, so a snapshot taken after a fault shows the true final state.

use tape_pool::{BufferPool, PooledBuffer};

use crate::config::{CellWidth, OverflowPolicy, PoolSet};
use crate::result::ExitKind;

/// A cell width the dispatch loop can be monomorphized over. Implemented by
/// `u8` and `u16`; nothing else is meant to implement it.
pub(crate) trait Cell: tape_pool::Blank + Copy + Eq {
    /// Largest representable value.
    const MAX: u32;
    const WIDTH: CellWidth;

    fn value(self) -> u32;

    /// `v` must be at most [Cell::MAX].
    fn from_value(v: u32) -> Self;

    /// The pool tapes of this width rent from.
    fn pool(pools: &PoolSet) -> &BufferPool<Self>;
}

impl Cell for u8 {
    const MAX: u32 = u8::MAX as u32;
    const WIDTH: CellWidth = CellWidth::Byte;

    fn value(self) -> u32 {
        self.into()
    }

    fn from_value(v: u32) -> Self {
        v as u8
    }

    fn pool(pools: &PoolSet) -> &BufferPool<Self> {
        &pools.bytes
    }
}

impl Cell for u16 {
    const MAX: u32 = u16::MAX as u32;
    const WIDTH: CellWidth = CellWidth::Word;

    fn value(self) -> u32 {
        self.into()
    }

    fn from_value(v: u32) -> Self {
        v as u16
    }

    fn pool(pools: &PoolSet) -> &BufferPool<Self> {
        &pools.words
    }
}

/// How a tape operation failed, and how far it got first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TapeFault {
    pub kind: ExitKind,
    /// Sub-steps that completed before the failing one.
    pub succeeded: usize,
}

impl TapeFault {
    fn new(kind: ExitKind, succeeded: usize) -> Self {
        TapeFault { kind, succeeded }
    }
}

/// The live tape of one run.
pub(crate) struct Tape<C: Cell> {
    cells: PooledBuffer<C>,
    pointer: usize,
    policy: OverflowPolicy,
}

impl<C: Cell> Tape<C> {
    pub fn new(size: usize, policy: OverflowPolicy, pool: &BufferPool<C>) -> Self {
        assert!(size > 0, "a tape needs at least one cell");
        Tape {
            cells: pool.rent(size),
            pointer: 0,
            policy,
        }
    }

    /// Rebuild a live tape from a snapshot, e.g. to chain REPL runs. The
    /// snapshot dictates size and pointer; the policy is the new run's own
    /// choice. The caller picks `C` to match the snapshot's width, so every
    /// stored value fits.
    pub fn restore(state: &MachineState, policy: OverflowPolicy, pool: &BufferPool<C>) -> Self {
        let mut cells = pool.rent(state.size());
        for (slot, &v) in cells.as_mut_slice().iter_mut().zip(state.cells.iter()) {
            *slot = C::from_value(v);
        }
        Tape {
            cells,
            pointer: state.pointer,
            policy,
        }
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// Numeric value of the cell under the pointer.
    pub fn current(&self) -> u32 {
        self.cells[self.pointer].value()
    }

    fn set_current(&mut self, v: u32) {
        self.cells[self.pointer] = C::from_value(v);
    }

    pub fn move_right(&mut self, n: usize) -> Result<(), TapeFault> {
        let last = self.cells.len() - 1;
        if self.pointer + n <= last {
            self.pointer += n;
            Ok(())
        } else {
            let succeeded = last - self.pointer;
            self.pointer = last;
            Err(TapeFault::new(ExitKind::UpperBoundExceeded, succeeded))
        }
    }

    pub fn move_left(&mut self, n: usize) -> Result<(), TapeFault> {
        if n <= self.pointer {
            self.pointer -= n;
            Ok(())
        } else {
            let succeeded = self.pointer;
            self.pointer = 0;
            Err(TapeFault::new(ExitKind::LowerBoundExceeded, succeeded))
        }
    }

    pub fn add(&mut self, n: usize) -> Result<(), TapeFault> {
        let v = self.current();
        match self.policy {
            OverflowPolicy::Wrap => {
                let modulus = C::MAX as u64 + 1;
                self.set_current(((v as u64 + n as u64) % modulus) as u32);
                Ok(())
            }
            OverflowPolicy::Error => {
                let headroom = (C::MAX - v) as usize;
                if n <= headroom {
                    self.set_current(v + n as u32);
                    Ok(())
                } else {
                    self.set_current(C::MAX);
                    Err(TapeFault::new(ExitKind::MaxValueExceeded, headroom))
                }
            }
        }
    }

    pub fn sub(&mut self, n: usize) -> Result<(), TapeFault> {
        let v = self.current();
        match self.policy {
            OverflowPolicy::Wrap => {
                let modulus = C::MAX as u64 + 1;
                let back = n as u64 % modulus;
                self.set_current(((v as u64 + modulus - back) % modulus) as u32);
                Ok(())
            }
            OverflowPolicy::Error => {
                if n <= v as usize {
                    self.set_current(v - n as u32);
                    Ok(())
                } else {
                    let succeeded = v as usize;
                    self.set_current(0);
                    Err(TapeFault::new(ExitKind::NegativeValue, succeeded))
                }
            }
        }
    }

    /// Store a character's code point in the current cell. Under the
    /// wrapping policy the code point is truncated to the cell width; under
    /// the erroring policy an unrepresentable character is a fault.
    pub fn input(&mut self, c: char) -> Result<(), TapeFault> {
        let code = c as u32;
        match self.policy {
            OverflowPolicy::Wrap => {
                // MAX + 1 is a power of two for both widths.
                self.set_current(code & C::MAX);
                Ok(())
            }
            OverflowPolicy::Error => {
                if code > C::MAX {
                    Err(TapeFault::new(ExitKind::MaxValueExceeded, 0))
                } else {
                    self.set_current(code);
                    Ok(())
                }
            }
        }
    }

    pub fn reset_cell(&mut self) {
        self.cells[self.pointer] = C::BLANK;
    }

    pub fn snapshot(&self) -> MachineState {
        MachineState {
            width: C::WIDTH,
            policy: self.policy,
            pointer: self.pointer,
            cells: self.cells.as_slice().iter().map(|c| c.value()).collect(),
        }
    }
}

/// A deep copy of a tape at one instant: every cell, the pointer, and the
/// configuration it ran with. This is what results carry and what a new run
/// can start from.
#[derive(Debug, Clone)]
pub struct MachineState {
    width: CellWidth,
    policy: OverflowPolicy,
    pointer: usize,
    cells: Vec<u32>,
}

impl MachineState {
    /// An all-zero tape, pointer at cell 0.
    pub fn blank(size: usize, width: CellWidth, policy: OverflowPolicy) -> Self {
        assert!(size > 0, "a tape needs at least one cell");
        MachineState {
            width,
            policy,
            pointer: 0,
            cells: vec![0; size],
        }
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn width(&self) -> CellWidth {
        self.width
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Numeric cell values, left to right.
    pub fn values(&self) -> &[u32] {
        &self.cells
    }

    /// Per-cell view for hosts that render the tape.
    pub fn cells(&self) -> impl Iterator<Item = CellView> + '_ {
        self.cells.iter().enumerate().map(move |(index, &value)| CellView {
            index,
            value,
            character: char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER),
            selected: index == self.pointer,
        })
    }
}

/// States are equal when size, pointer, and numeric values match. Width and
/// policy are not compared: a byte tape holding `[5, 0]` and a word tape
/// holding the same values are the same state.
impl PartialEq for MachineState {
    fn eq(&self, other: &Self) -> bool {
        self.pointer == other.pointer && self.cells == other.cells
    }
}

impl Eq for MachineState {}

/// One cell as a host would draw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellView {
    pub index: usize,
    /// Numeric value.
    pub value: u32,
    /// The value read as a character, `U+FFFD` when it is no valid one.
    pub character: char,
    /// True for exactly the cell under the pointer.
    pub selected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_tape(size: usize, policy: OverflowPolicy) -> Tape<u8> {
        Tape::new(size, policy, &BufferPool::new())
    }

    #[test]
    fn fresh_tape_is_blank() {
        let tape = byte_tape(4, OverflowPolicy::Error);
        assert_eq!(tape.pointer(), 0);
        assert_eq!(tape.snapshot().values(), &[0, 0, 0, 0]);
    }

    #[test]
    fn moves_count_their_successful_substeps() {
        let mut tape = byte_tape(4, OverflowPolicy::Error);
        assert!(tape.move_right(3).is_ok());
        assert_eq!(tape.pointer(), 3);

        let fault = tape.move_right(2).unwrap_err();
        assert_eq!(fault.kind, ExitKind::UpperBoundExceeded);
        assert_eq!(fault.succeeded, 0);
        assert_eq!(tape.pointer(), 3);

        let fault = tape.move_left(5).unwrap_err();
        assert_eq!(fault.kind, ExitKind::LowerBoundExceeded);
        assert_eq!(fault.succeeded, 3);
        assert_eq!(tape.pointer(), 0);
    }

    #[test]
    fn bounds_fail_under_both_policies() {
        for policy in [OverflowPolicy::Wrap, OverflowPolicy::Error] {
            let mut tape = byte_tape(2, policy);
            assert_eq!(
                tape.move_left(1).unwrap_err().kind,
                ExitKind::LowerBoundExceeded
            );
        }
    }

    #[test]
    fn erroring_add_stops_at_the_ceiling() {
        let mut tape = byte_tape(1, OverflowPolicy::Error);
        assert!(tape.add(254).is_ok());

        let fault = tape.add(5).unwrap_err();
        assert_eq!(fault.kind, ExitKind::MaxValueExceeded);
        assert_eq!(fault.succeeded, 1);
        assert_eq!(tape.current(), 255);
    }

    #[test]
    fn erroring_sub_stops_at_zero() {
        let mut tape = byte_tape(1, OverflowPolicy::Error);
        tape.add(2).unwrap();

        let fault = tape.sub(5).unwrap_err();
        assert_eq!(fault.kind, ExitKind::NegativeValue);
        assert_eq!(fault.succeeded, 2);
        assert_eq!(tape.current(), 0);
    }

    #[test]
    fn wrapping_arithmetic_is_modular() {
        let mut tape = byte_tape(1, OverflowPolicy::Wrap);
        tape.add(300).unwrap();
        assert_eq!(tape.current(), 44);
        tape.sub(45).unwrap();
        assert_eq!(tape.current(), 255);

        let mut wide: Tape<u16> = Tape::new(1, OverflowPolicy::Wrap, &BufferPool::new());
        wide.add(65536 + 7).unwrap();
        assert_eq!(wide.current(), 7);
    }

    #[test]
    fn input_truncates_or_faults_by_policy() {
        let mut tape = byte_tape(1, OverflowPolicy::Wrap);
        tape.input('é').unwrap();
        assert_eq!(tape.current(), 0xE9);
        tape.input('ā').unwrap();
        assert_eq!(tape.current(), 0x101 & 0xFF);

        let mut strict = byte_tape(1, OverflowPolicy::Error);
        strict.input('A').unwrap();
        assert_eq!(strict.current(), 65);
        let fault = strict.input('ā').unwrap_err();
        assert_eq!(fault.kind, ExitKind::MaxValueExceeded);
        assert_eq!(fault.succeeded, 0);
        assert_eq!(strict.current(), 65);
    }

    #[test]
    fn reset_clears_only_the_current_cell() {
        let mut tape = byte_tape(2, OverflowPolicy::Error);
        tape.add(9).unwrap();
        tape.move_right(1).unwrap();
        tape.add(3).unwrap();
        tape.reset_cell();
        assert_eq!(tape.snapshot().values(), &[9, 0]);
    }

    #[test]
    fn snapshot_and_restore_round_trip() {
        let pool = BufferPool::new();
        let mut tape: Tape<u8> = Tape::new(3, OverflowPolicy::Error, &pool);
        tape.add(7).unwrap();
        tape.move_right(2).unwrap();
        tape.add(1).unwrap();

        let state = tape.snapshot();
        assert_eq!(state.values(), &[7, 0, 1]);
        assert_eq!(state.pointer(), 2);
        assert_eq!(state.width(), CellWidth::Byte);

        let revived: Tape<u8> = Tape::restore(&state, OverflowPolicy::Wrap, &pool);
        assert_eq!(revived.snapshot().values(), state.values());
        assert_eq!(revived.pointer(), 2);
    }

    #[test]
    fn state_equality_ignores_width_and_policy() {
        let pool_bytes: BufferPool<u8> = BufferPool::new();
        let pool_words: BufferPool<u16> = BufferPool::new();

        let mut narrow: Tape<u8> = Tape::new(2, OverflowPolicy::Error, &pool_bytes);
        let mut wide: Tape<u16> = Tape::new(2, OverflowPolicy::Wrap, &pool_words);
        narrow.add(5).unwrap();
        wide.add(5).unwrap();

        assert_eq!(narrow.snapshot(), wide.snapshot());

        wide.move_right(1).unwrap();
        assert_ne!(narrow.snapshot(), wide.snapshot());
    }

    #[test]
    fn cell_views_mark_the_pointer() {
        let mut tape = byte_tape(3, OverflowPolicy::Error);
        tape.add(72).unwrap();
        tape.move_right(1).unwrap();

        let state = tape.snapshot();
        let views: Vec<CellView> = state.cells().collect();
        assert_eq!(views[0].value, 72);
        assert_eq!(views[0].character, 'H');
        assert!(!views[0].selected);
        assert!(views[1].selected);
        assert_eq!(views.len(), 3);
    }
}
