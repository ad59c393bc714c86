use thiserror::Error;

use crate::server::context::ContextError;

/// Failure while tokenizing a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexerError {
    #[error("invalid escape sequence at byte {offset}")]
    InvalidEscape { offset: usize },
    #[error("unexpected character {character:?} at byte {offset}")]
    UnexpectedCharacter { character: char, offset: usize },
    #[error("malformed number at byte {offset}")]
    MalformedNumber { offset: usize },
    #[error("unterminated string literal starting at byte {offset}")]
    UnterminatedString { offset: usize },
    #[error("function name must start with a letter (byte {offset})")]
    InvalidFunctionName { offset: usize },
    #[error("no tokens remain after end of input")]
    Exhausted,
}

/// Failure while building the document tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lexical(#[from] LexerError),
    #[error("tag must start with FOR, END or =, found {found}")]
    MissingKeyword { found: String },
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },
    #[error("FOR loop variable must be an identifier, found {found}")]
    InvalidLoopVariable { found: String },
    #[error("FOR loop bound must be a variable, number or string, found {found}")]
    InvalidLoopBound { found: String },
    #[error("FOR loop over `{variable}` needs a start and an end")]
    TooFewLoopArguments { variable: String },
    #[error("FOR loop over `{variable}` takes at most start, end and step")]
    TooManyLoopArguments { variable: String },
    #[error("unknown function @{name}")]
    UnknownFunction { name: String },
    #[error("END without an open FOR")]
    UnmatchedEnd,
    #[error("FOR loop over `{variable}` is never closed")]
    UnclosedLoop { variable: String },
}

/// Failure while executing a parsed document.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{operation} needs {required} stack values but only {available} are present")]
    StackUnderflow {
        operation: String,
        required: usize,
        available: usize,
    },
    #[error("variable `{name}` is not defined")]
    UndefinedVariable { name: String },
    #[error("value {value:?} is not a number")]
    NotANumber { value: String },
    #[error("integer division by zero")]
    DivisionByZero,
    #[error("integer overflow in `{operator}`")]
    Overflow { operator: char },
    #[error("invalid decimal format pattern {pattern:?}")]
    InvalidFormat { pattern: String },
    #[error(transparent)]
    Context(#[from] ContextError),
}
