//! Error handling for qcc

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Compiler error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ==================== Lexical Errors ====================
    #[error("line {line}: unexpected character '{ch}'")]
    UnexpectedChar { ch: char, line: u32 },

    #[error("line {line}: integer constant out of range")]
    IntConstOutOfRange { line: u32 },

    // ==================== Syntax Errors ====================
    #[error("line {line}: expected {expected}, got {got}")]
    UnexpectedToken {
        expected: String,
        got: String,
        line: u32,
    },

    #[error("line {line}: '{stmt}' statement not within {required}")]
    MisplacedStatement {
        stmt: &'static str,
        required: &'static str,
        line: u32,
    },

    // ==================== Semantic Errors ====================
    #[error("not in any scope")]
    NotInScope,

    #[error("redeclaration of '{id}'")]
    DuplicateDeclaration { id: String },

    #[error("'{id}' undeclared")]
    UndeclaredIdentifier { id: String },

    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },
}
