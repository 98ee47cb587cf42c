//! Compiles validated source into a flat opcode sequence.
//!
//! There is no AST here. One pass walks the source, folding runs of the
//! pointer/value operators into counted opcodes and emitting loop and
//! function opcodes with placeholder targets. A target is patched in the
//! moment its matching `]` or `)` arrives, so by the end of the pass every
//! jump is an absolute, in-bounds opcode index.
//!
//! Folding is an optimization, not a behavior change: a folded program must
//! be externally indistinguishable from its unfolded twin. That is why only
//! `[-]` collapses to [Op::Reset]: a `[+]` loop overflows the cell on its
//! way to zero, which is a visible halt under the erroring overflow policy.

use std::fmt;

use crate::errors::Result;
use crate::operators::Operator;
use crate::validate::validate;

/// A single executable operation. Pointer and value ops carry the repeat
/// count of the source run they were folded from; control ops carry the
/// absolute index of their jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Move the pointer right `n` cells.
    Right(usize),
    /// Move the pointer left `n` cells.
    Left(usize),
    /// Add `n` to the current cell.
    Add(usize),
    /// Subtract `n` from the current cell.
    Sub(usize),
    /// Write the current cell to stdout.
    Out,
    /// Read one character of stdin into the current cell.
    In,
    /// If the current cell is zero, jump one past the matching [Op::LoopEnd].
    LoopStart(usize),
    /// Jump back to the matching [Op::LoopStart], which re-checks the cell.
    LoopEnd(usize),
    /// Skip over the function body; the target is one past the matching
    /// [Op::FnEnd]. Declaring a function does not run it.
    FnStart(usize),
    /// Return from a function body to the caller.
    FnEnd,
    /// Call the function whose table index is the current cell's value.
    Call,
    /// Set the current cell to zero. Compiled from the `[-]` idiom.
    Reset,
}

/// An [Op] plus the source offset of the operator it came from. For a
/// folded run this is the offset of the run's *first* operator; the k-th
/// sub-step of the run then lives at `offset + k`, which is what makes
/// partial-failure positions exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub op: Op,
    pub offset: usize,
}

/// One `(`...`)` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    offset: usize,
    body: String,
    entry: usize,
}

impl Function {
    /// Source offset of the declaration's `(`.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The raw text between the parentheses, comments included.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Opcode index of the first instruction of the body.
    pub fn entry(&self) -> usize {
        self.entry
    }
}

/// Functions in declaration order. The dispatch index used by `:` is the
/// position in this table, so the first `(`...`)` in the source is callable
/// with the current cell at 0, the second at 1, and so on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionTable {
    entries: Vec<Function>,
}

impl FunctionTable {
    pub fn get(&self, index: usize) -> Option<&Function> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Function> {
        self.entries.iter()
    }
}

/// A compiled program: opcodes with resolved jumps, the function table, and
/// the source it came from. The source sticks around so a halting stack
/// trace can quote the exact text each frame was executing.
#[derive(Debug, Clone)]
pub struct Executable {
    ops: Vec<Opcode>,
    functions: FunctionTable,
    source: String,
}

impl Executable {
    pub fn ops(&self) -> &[Opcode] {
        &self.ops
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Compile with run folding. The result runs faster and is what release
/// execution uses.
pub fn compile(source: &str) -> Result<Executable> {
    assemble(source, true)
}

/// Compile one opcode per operator, no folding. Debug sessions use this so
/// that every source offset a breakpoint could name is the offset of some
/// opcode; it also pins down folding transparency in tests.
pub fn compile_unfolded(source: &str) -> Result<Executable> {
    assemble(source, false)
}

fn assemble(source: &str, fold: bool) -> Result<Executable> {
    validate(source)?;

    // Offsets are character offsets, so work over chars rather than bytes.
    let chars: Vec<char> = source.chars().collect();

    let mut ops: Vec<Opcode> = Vec::new();
    let mut open_loops: Vec<usize> = Vec::new();
    // (opcode index of the FnStart, source offset of the `(`)
    let mut open_function: Option<(usize, usize)> = None;
    let mut functions: Vec<Function> = Vec::new();

    let mut i = 0;
    while i < chars.len() {
        let at = i;
        let Some(operator) = Operator::from_char(chars[i]) else {
            i += 1;
            continue;
        };
        i += 1;

        use Operator::*;
        match operator {
            MoveRight | MoveLeft | Increment | Decrement => {
                let count = if fold { run_length(&chars, at) } else { 1 };
                i = at + count;
                let op = match operator {
                    MoveRight => Op::Right(count),
                    MoveLeft => Op::Left(count),
                    Increment => Op::Add(count),
                    Decrement => Op::Sub(count),
                    _ => panic!("folding not supported for {:?}", operator),
                };
                ops.push(Opcode { op, offset: at });
            }
            Output => ops.push(Opcode {
                op: Op::Out,
                offset: at,
            }),
            Input => ops.push(Opcode {
                op: Op::In,
                offset: at,
            }),
            LoopStart => {
                open_loops.push(ops.len());
                ops.push(Opcode {
                    op: Op::LoopStart(0),
                    offset: at,
                });
            }
            LoopEnd => {
                let start = open_loops
                    .pop()
                    .expect("square brackets are balanced after validation");
                let body_is_single_decrement =
                    ops.len() == start + 2 && ops[start + 1].op == Op::Sub(1);
                if fold && body_is_single_decrement {
                    let offset = ops[start].offset;
                    ops.truncate(start);
                    ops.push(Opcode {
                        op: Op::Reset,
                        offset,
                    });
                } else {
                    let end = ops.len();
                    ops.push(Opcode {
                        op: Op::LoopEnd(start),
                        offset: at,
                    });
                    ops[start].op = Op::LoopStart(end + 1);
                }
            }
            FunctionStart => {
                open_function = Some((ops.len(), at));
                ops.push(Opcode {
                    op: Op::FnStart(0),
                    offset: at,
                });
            }
            FunctionEnd => {
                let (start, open_at) = open_function
                    .take()
                    .expect("parentheses are balanced after validation");
                let end = ops.len();
                ops.push(Opcode {
                    op: Op::FnEnd,
                    offset: at,
                });
                ops[start].op = Op::FnStart(end + 1);
                functions.push(Function {
                    offset: open_at,
                    body: chars[open_at + 1..at].iter().collect(),
                    entry: start + 1,
                });
            }
            Call => ops.push(Opcode {
                op: Op::Call,
                offset: at,
            }),
        }
    }

    Ok(Executable {
        ops,
        functions: FunctionTable { entries: functions },
        source: source.to_string(),
    })
}

/// Length of the run of characters identical to `chars[at]` starting there.
fn run_length(chars: &[char], at: usize) -> usize {
    let c = chars[at];
    let mut len = 1;
    while at + len < chars.len() && chars[at + len] == c {
        len += 1;
    }
    len
}

/// Prints in a pseudo-assembly format, one opcode per line, then the
/// function table.
impl fmt::Display for Executable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, opcode) in self.ops.iter().enumerate() {
            writeln!(f, "{:4}: {}", i, opcode)?;
        }
        for (index, fun) in self.functions.iter().enumerate() {
            writeln!(
                f,
                ";; fn #{} at offset {}, entry {}",
                index,
                fun.offset(),
                fun.entry()
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.op.fmt(f)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Op::*;
        match self {
            Right(n) => write!(f, "bp <- bp + #{}", n),
            Left(n) => write!(f, "bp <- bp - #{}", n),
            Add(n) => write!(f, "[bp] <- [bp] + #{}", n),
            Sub(n) => write!(f, "[bp] <- [bp] - #{}", n),
            Out => write!(f, "putchar [bp]"),
            In => write!(f, "getchar [bp]"),
            LoopStart(target) => write!(f, "beq {}", target),
            LoopEnd(target) => write!(f, "b {}", target),
            FnStart(target) => write!(f, "def {}", target),
            FnEnd => write!(f, "ret"),
            Call => write!(f, "call [bp]"),
            Reset => write!(f, "zro"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SyntaxError;

    fn ops_of(exe: &Executable) -> Vec<Op> {
        exe.ops().iter().map(|opcode| opcode.op).collect()
    }

    #[test]
    fn runs_fold_with_first_operator_offsets() {
        let exe = compile("+++>>-++").unwrap();
        let expected = [
            (Op::Add(3), 0),
            (Op::Right(2), 3),
            (Op::Sub(1), 5),
            (Op::Add(2), 6),
        ];
        let got: Vec<(Op, usize)> = exe.ops().iter().map(|o| (o.op, o.offset)).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn comments_break_runs() {
        let exe = compile("++ +").unwrap();
        assert_eq!(ops_of(&exe), vec![Op::Add(2), Op::Add(1)]);
        assert_eq!(exe.ops()[1].offset, 3);
    }

    #[test]
    fn unfolded_is_one_opcode_per_operator() {
        let exe = compile_unfolded("+++>>-++").unwrap();
        assert_eq!(exe.ops().len(), 8);
        for (i, opcode) in exe.ops().iter().enumerate() {
            assert_eq!(opcode.offset, i);
        }
    }

    #[test]
    fn loop_targets_jump_past_and_back() {
        let exe = compile_unfolded("+[-]").unwrap();
        assert_eq!(
            ops_of(&exe),
            vec![Op::Add(1), Op::LoopStart(4), Op::Sub(1), Op::LoopEnd(1)]
        );
    }

    #[test]
    fn nested_loop_targets_resolve_inside_out() {
        let exe = compile_unfolded("[[]]").unwrap();
        assert_eq!(
            ops_of(&exe),
            vec![
                Op::LoopStart(4),
                Op::LoopStart(3),
                Op::LoopEnd(1),
                Op::LoopEnd(0),
            ]
        );
    }

    #[test]
    fn clear_loop_folds_to_reset() {
        let exe = compile("+[-]").unwrap();
        assert_eq!(ops_of(&exe), vec![Op::Add(1), Op::Reset]);
        // The reset inherits the `[`'s offset.
        assert_eq!(exe.ops()[1].offset, 1);
    }

    #[test]
    fn only_single_step_clear_loops_fold() {
        // `[--]` can diverge or fault depending on cell parity and policy.
        let exe = compile("[--]").unwrap();
        assert_eq!(
            ops_of(&exe),
            vec![Op::LoopStart(3), Op::Sub(2), Op::LoopEnd(0)]
        );
        // `[+]` faults under the erroring policy instead of clearing.
        let exe = compile("[+]").unwrap();
        assert_eq!(
            ops_of(&exe),
            vec![Op::LoopStart(3), Op::Add(1), Op::LoopEnd(0)]
        );
    }

    #[test]
    fn unfolded_never_resets() {
        let exe = compile_unfolded("+[-]").unwrap();
        assert!(!ops_of(&exe).contains(&Op::Reset));
    }

    #[test]
    fn function_declarations_build_the_table() {
        let exe = compile("(+++):").unwrap();
        assert_eq!(
            ops_of(&exe),
            vec![Op::FnStart(3), Op::Add(3), Op::FnEnd, Op::Call]
        );

        let fun = exe.functions().get(0).unwrap();
        assert_eq!(fun.offset(), 0);
        assert_eq!(fun.body(), "+++");
        assert_eq!(fun.entry(), 1);
        assert!(exe.functions().get(1).is_none());
    }

    #[test]
    fn function_bodies_keep_their_comments() {
        let exe = compile("(say hi: +)").unwrap();
        assert_eq!(exe.functions().get(0).unwrap().body(), "say hi: +");
    }

    #[test]
    fn functions_are_indexed_in_declaration_order() {
        let exe = compile("(+)(-)(>)").unwrap();
        let bodies: Vec<&str> = exe.functions().iter().map(|f| f.body()).collect();
        assert_eq!(bodies, vec!["+", "-", ">"]);
    }

    #[test]
    fn invalid_source_does_not_compile() {
        assert_eq!(
            compile("]").unwrap_err(),
            SyntaxError::MismatchedSquareBracket(0)
        );
        assert_eq!(compile("no operators").unwrap_err(), SyntaxError::MissingOperators);
    }

    #[test]
    fn disassembly_lists_every_opcode() {
        let exe = compile("+[-].").unwrap();
        let listing = exe.to_string();
        assert!(listing.contains("zro"), "{}", listing);
        assert!(listing.contains("putchar [bp]"), "{}", listing);
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let exe = compile("né+").unwrap();
        assert_eq!(exe.ops()[0].offset, 2);
    }
}
