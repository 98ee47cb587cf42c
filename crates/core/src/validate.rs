//! Syntax validation: one forward scan, no backtracking.
//!
//! The scan keeps a stack of open `[` positions and (since functions cannot
//! nest) at most one open `(`. Each diagnostic is pinned to a single
//! deterministic character offset, so hosts can underline exactly one spot;
//! a test locks down every category's position rule.

use crate::errors::{Result, SyntaxError};
use crate::operators::Operator;

/// A `(` we have seen and not yet closed.
struct OpenFunction {
    /// Offset of the `(` itself.
    at: usize,
    /// How many `[` were open outside the function when it started.
    loops_below: usize,
    /// Operator count the moment the `(` was counted.
    operators_at_open: usize,
    /// Set when the body closes a loop it did not open.
    dirty: bool,
}

/// Checks a program without compiling or running it.
///
/// Returns the first problem found by a left-to-right scan. Validating the
/// same text always yields the same answer; there is no state here.
pub fn validate(source: &str) -> Result<()> {
    let mut loops: Vec<usize> = Vec::new();
    let mut function: Option<OpenFunction> = None;
    let mut operators = 0usize;

    for (at, c) in source.chars().enumerate() {
        let Some(op) = Operator::from_char(c) else {
            continue;
        };
        operators += 1;

        match op {
            Operator::LoopStart => loops.push(at),
            Operator::LoopEnd => {
                if loops.pop().is_none() {
                    return Err(SyntaxError::MismatchedSquareBracket(at));
                }
                if let Some(f) = function.as_mut() {
                    if loops.len() < f.loops_below {
                        f.dirty = true;
                    }
                }
            }
            Operator::FunctionStart => {
                if function.is_some() {
                    return Err(SyntaxError::NestedFunctionDeclaration(at));
                }
                function = Some(OpenFunction {
                    at,
                    loops_below: loops.len(),
                    operators_at_open: operators,
                    dirty: false,
                });
            }
            Operator::FunctionEnd => {
                let Some(f) = function.take() else {
                    return Err(SyntaxError::MismatchedParenthesis(at));
                };
                if f.dirty || loops.len() != f.loops_below {
                    return Err(SyntaxError::InvalidFunctionDeclaration(f.at));
                }
                // Exactly one operator counted since the `(`: this `)` itself.
                if operators == f.operators_at_open + 1 {
                    return Err(SyntaxError::EmptyFunctionDeclaration(f.at));
                }
            }
            _ => {}
        }
    }

    if operators == 0 {
        return Err(SyntaxError::MissingOperators);
    }
    if let Some(f) = function {
        return Err(SyntaxError::IncompleteFunctionDeclaration(f.at));
    }
    if let Some(&at) = loops.last() {
        return Err(SyntaxError::IncompleteLoop(at));
    }

    Ok(())
}

/// `true` when [validate] would succeed. Convenience for hosts that only
/// gate a Run button.
pub fn is_syntax_valid(source: &str) -> bool {
    validate(source).is_ok()
}
