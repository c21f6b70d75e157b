//! Diagnostic and error taxonomy.
//!
//! Every fallible operation in the compiler returns `Result<T, CompileError>`.
//! `CompileError` carries the site (line/column) and maps to one of the
//! process exit codes in the external interface.

use std::fmt;

/// A single compile-time error, tagged with the taxonomy row it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Lexical scanner reported an `INVALID` token.
    Lex { line: u32, column: u32, message: String },
    /// Syntax error from the statement parser or expression analyzer.
    Syn { line: u32, column: u32, message: String },
    /// Use of an undefined or not-yet-initialized identifier.
    Undef { line: u32, column: u32, message: String },
    /// Redefinition of a name already bound in the innermost scope, or a
    /// forward-referenced function that was never defined.
    Redef { line: u32, column: u32, message: String },
    /// Function signature/arity mismatch (forward-reference reconciliation,
    /// wrong argument count, wrong parameter names).
    Func { line: u32, column: u32, message: String },
    /// `return` used incorrectly: at global scope, with a value in a `Void`
    /// function, or missing in a value-returning function.
    Return { line: u32, column: u32, message: String },
    /// Type incompatibility (assignment, operator operands, call arguments).
    Type { line: u32, column: u32, message: String },
    /// A declaration's type could not be inferred (e.g. `let x = nil`).
    UnknownType { line: u32, column: u32, message: String },
    /// Any other semantic error not covered by a more specific variant.
    Other { line: u32, column: u32, message: String },
    /// Internal compiler error (should never be reachable from valid input).
    Internal { message: String },
}

impl CompileError {
    /// The process exit code this error maps to (see external interface, §6).
    pub fn code(&self) -> i32 {
        match self {
            CompileError::Lex { .. } => 1,
            CompileError::Syn { .. } => 2,
            CompileError::Undef { .. } => 3,
            CompileError::Redef { .. } => 3, // SEM_ERR_REDEF shares the name-resolution exit code with SEM_ERR_UNDEF
            CompileError::Func { .. } => 4,
            CompileError::Return { .. } => 5,
            CompileError::Type { .. } => 6,
            CompileError::UnknownType { .. } => 7,
            CompileError::Other { .. } => 8,
            CompileError::Internal { .. } => 99,
        }
    }

    pub fn lex(line: u32, column: u32, message: impl Into<String>) -> Self {
        CompileError::Lex { line, column, message: message.into() }
    }
    pub fn syn(line: u32, column: u32, message: impl Into<String>) -> Self {
        CompileError::Syn { line, column, message: message.into() }
    }
    pub fn undef(line: u32, column: u32, message: impl Into<String>) -> Self {
        CompileError::Undef { line, column, message: message.into() }
    }
    pub fn redef(line: u32, column: u32, message: impl Into<String>) -> Self {
        CompileError::Redef { line, column, message: message.into() }
    }
    pub fn func(line: u32, column: u32, message: impl Into<String>) -> Self {
        CompileError::Func { line, column, message: message.into() }
    }
    pub fn ret(line: u32, column: u32, message: impl Into<String>) -> Self {
        CompileError::Return { line, column, message: message.into() }
    }
    pub fn ty(line: u32, column: u32, message: impl Into<String>) -> Self {
        CompileError::Type { line, column, message: message.into() }
    }
    pub fn unknown_type(line: u32, column: u32, message: impl Into<String>) -> Self {
        CompileError::UnknownType { line, column, message: message.into() }
    }
    pub fn other(line: u32, column: u32, message: impl Into<String>) -> Self {
        CompileError::Other { line, column, message: message.into() }
    }
    pub fn internal(message: impl Into<String>) -> Self {
        CompileError::Internal { message: message.into() }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Internal { message } => {
                write!(f, "error {} internal: {}", self.code(), message)
            }
            CompileError::Lex { line, column, message }
            | CompileError::Syn { line, column, message }
            | CompileError::Undef { line, column, message }
            | CompileError::Redef { line, column, message }
            | CompileError::Func { line, column, message }
            | CompileError::Return { line, column, message }
            | CompileError::Type { line, column, message }
            | CompileError::UnknownType { line, column, message }
            | CompileError::Other { line, column, message } => write!(
                f,
                "error {} at line {}, col {}: {}",
                self.code(),
                line,
                column,
                message
            ),
        }
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_one_line_format() {
        let e = CompileError::undef(3, 7, "identifier 'x' is not defined");
        assert_eq!(
            e.to_string(),
            "error 3 at line 3, col 7: identifier 'x' is not defined"
        );
    }

    #[test]
    fn exit_codes_match_taxonomy() {
        assert_eq!(CompileError::lex(1, 1, "x").code(), 1);
        assert_eq!(CompileError::syn(1, 1, "x").code(), 2);
        assert_eq!(CompileError::undef(1, 1, "x").code(), 3);
        assert_eq!(CompileError::redef(1, 1, "x").code(), 3);
        assert_eq!(CompileError::func(1, 1, "x").code(), 4);
        assert_eq!(CompileError::ret(1, 1, "x").code(), 5);
        assert_eq!(CompileError::ty(1, 1, "x").code(), 6);
        assert_eq!(CompileError::unknown_type(1, 1, "x").code(), 7);
        assert_eq!(CompileError::other(1, 1, "x").code(), 8);
        assert_eq!(CompileError::internal("x").code(), 99);
    }
}
