//! Everything that can be wrong with a program before it runs.
//!
//! Runtime misbehavior is *not* an error in this crate. A run that walks off
//! the tape still produces an [InterpreterResult](crate::InterpreterResult),
//! just not a successful one. The only `Err` the public API ever returns is a
//! [SyntaxError] from the pre-execution scan.

use thiserror::Error;

/// Result alias used by every fallible entry point of the crate.
pub type Result<T> = std::result::Result<T, SyntaxError>;

/// A positioned syntax diagnostic.
///
/// Offsets are zero-based character positions into the *raw* source text,
/// comments included. All offsets are deterministic: validating the same
/// string twice reports the same variant at the same position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyntaxError {
    /// A `]` with no `[` open to close.
    #[error("']' at offset {0} has no matching '['")]
    MismatchedSquareBracket(usize),

    /// A `[` that is still open when the program ends. Points at the
    /// innermost one.
    #[error("'[' at offset {0} is never closed")]
    IncompleteLoop(usize),

    /// A `)` with no `(` open to close.
    #[error("')' at offset {0} has no matching '('")]
    MismatchedParenthesis(usize),

    /// A `(` inside another function's body. Points at the inner `(`.
    #[error("'(' at offset {0} opens a function inside another function")]
    NestedFunctionDeclaration(usize),

    /// A function whose body contains no operators at all. Points at the `(`.
    #[error("function at offset {0} has an empty body")]
    EmptyFunctionDeclaration(usize),

    /// A `(` that is still open when the program ends.
    #[error("'(' at offset {0} is never closed")]
    IncompleteFunctionDeclaration(usize),

    /// A function whose body opens or closes loops it does not balance.
    /// Points at the `(`.
    #[error("function at offset {0} contains an unbalanced loop")]
    InvalidFunctionDeclaration(usize),

    /// The source contains no operator characters whatsoever.
    #[error("source contains no operators")]
    MissingOperators,
}

impl SyntaxError {
    /// Where the problem is, as a zero-based character offset.
    ///
    /// `None` only for [MissingOperators][SyntaxError::MissingOperators],
    /// which has nowhere in particular to point.
    pub fn offset(&self) -> Option<usize> {
        use SyntaxError::*;

        match *self {
            MismatchedSquareBracket(at)
            | IncompleteLoop(at)
            | MismatchedParenthesis(at)
            | NestedFunctionDeclaration(at)
            | EmptyFunctionDeclaration(at)
            | IncompleteFunctionDeclaration(at)
            | InvalidFunctionDeclaration(at) => Some(at),
            MissingOperators => None,
        }
    }
}
