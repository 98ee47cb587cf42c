//! The operator alphabet.
//!
//! Eleven characters mean something: the eight classic Brainfuck operators
//! plus the PBrain extensions `(`, `)` and `:`. Every other character is a
//! comment: skipped by the compiler, but still counted when we report
//! positions, so offsets always refer to the text the user actually typed.

/// One executable operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `<`: move the pointer one cell left.
    MoveLeft,
    /// `>`: move the pointer one cell right.
    MoveRight,
    /// `+`: increment the current cell.
    Increment,
    /// `-`: decrement the current cell.
    Decrement,
    /// `.`: append the current cell's character to stdout.
    Output,
    /// `,`: read one character of stdin into the current cell.
    Input,
    /// `[`: enter the loop if the current cell is non-zero, else skip it.
    LoopStart,
    /// `]`: jump back to the matching `[` if the current cell is non-zero.
    LoopEnd,
    /// `(`: begin a function definition.
    FunctionStart,
    /// `)`: end a function definition.
    FunctionEnd,
    /// `:`: call the function whose index is the current cell's value.
    Call,
}

impl Operator {
    /// Classifies a character, or `None` if it is a comment.
    pub fn from_char(c: char) -> Option<Operator> {
        use Operator::*;

        match c {
            '<' => Some(MoveLeft),
            '>' => Some(MoveRight),
            '+' => Some(Increment),
            '-' => Some(Decrement),
            '.' => Some(Output),
            ',' => Some(Input),
            '[' => Some(LoopStart),
            ']' => Some(LoopEnd),
            '(' => Some(FunctionStart),
            ')' => Some(FunctionEnd),
            ':' => Some(Call),
            _ => None,
        }
    }

    /// The character this operator is written as.
    pub fn as_char(self) -> char {
        use Operator::*;

        match self {
            MoveLeft => '<',
            MoveRight => '>',
            Increment => '+',
            Decrement => '-',
            Output => '.',
            Input => ',',
            LoopStart => '[',
            LoopEnd => ']',
            FunctionStart => '(',
            FunctionEnd => ')',
            Call => ':',
        }
    }
}

/// Whether `c` is one of the eleven operator characters.
///
/// Pure and total; syntax highlighting and snippet extraction lean on this
/// agreeing exactly with [Operator::from_char].
pub fn is_operator(c: char) -> bool {
    Operator::from_char(c).is_some()
}
