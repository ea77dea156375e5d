//! Runtime interpreter error implementation
//!
//! Heap exhaustion has no variant here: allocation failure aborts the
//! process, which is the standard collection growth behavior.

use thiserror::Error;

/// Typed errors raised while executing instructions or built-ins.
///
/// Ordinary unification failure is *not* an error; it is a backtracking
/// signal handled inside the instruction loop. A `RuntimeError` aborts
/// the current query, unwinds every choice point and surfaces from
/// [`crate::interpreter::Interpreter::execute`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// A built-in expected a bound term and got an unbound variable.
    #[error("instantiation error: {culprit} requires a bound argument")]
    Instantiation {
        /// The built-in that rejected the argument, as `name/arity`.
        culprit: String,
    },
    /// A built-in argument carried the wrong tag.
    #[error("type error: expected {expected}, found {found}")]
    Type {
        /// The tag family the built-in wanted.
        expected: &'static str,
        /// Rendering of the offending term.
        found: String,
    },
    /// A built-in argument was outside its allowed range.
    #[error("domain error: expected {expected}, found {found}")]
    Domain {
        /// Description of the allowed range.
        expected: String,
        /// Rendering of the offending term.
        found: String,
    },
    /// A goal referred to a predicate that has no clauses and no
    /// registered built-in.
    #[error("existence error: undefined predicate {name}/{arity}")]
    UndefinedPredicate {
        /// Predicate name.
        name: String,
        /// Predicate arity.
        arity: usize,
    },
}

/// Errors reported by `load_clause`, before any execution takes place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The clause head is not an atom or compound term.
    #[error("clause head is not callable: {0}")]
    NonCallableHead(String),
    /// A body goal is not an atom or compound term.
    #[error("clause body goal is not callable: {0}")]
    NonCallableGoal(String),
}

/// Interpreter error variants surfaced by the embedded API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpreterError {
    /// A typed error escaped the query.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    /// The program or query was malformed.
    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl InterpreterError {
    /// Return the runtime error that caused this failure, if applicable.
    pub const fn runtime(&self) -> Option<&RuntimeError> {
        match self {
            Self::Runtime(e) => Some(e),
            _ => None,
        }
    }
}
