//! Single-pass compiler front end for a small Swift-like language,
//! emitting IFJcode23 three-address stack-VM code.

pub mod builtins;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod emitter;
pub mod expr;
pub mod parser;
pub mod symtab;
pub mod token;
pub mod types;

pub use compiler::Compiler;
pub use config::CompilerConfig;
pub use diagnostics::CompileError;
pub use token::Lexer;

/// Compile `source` to an IFJcode23 program using the given configuration.
pub fn compile(source: &str, config: &CompilerConfig) -> Result<String, CompileError> {
    let lexer = Lexer::new(source);
    Compiler::new(lexer, config.clone()).compile()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_trivial_program() {
        let out = compile("write(\"hello\")", &CompilerConfig::default()).unwrap();
        assert!(out.starts_with(".IFJcode23"));
        assert!(out.contains("WRITE"));
    }

    #[test]
    fn reports_a_lexical_error_as_its_own_taxonomy_row() {
        let err = compile("let x = @", &CompilerConfig::default()).unwrap_err();
        assert_eq!(err.code(), 1);
    }
}
