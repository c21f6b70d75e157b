//! The compiler context (§9 design note): a single value threading the
//! token source, symbol table, emitter, and configuration through the
//! recursive-descent driver, replacing the original's global mutable state.

use crate::builtins;
use crate::config::CompilerConfig;
use crate::diagnostics::CompileError;
use crate::emitter::Emitter;
use crate::symtab::SymbolTable;
use crate::token::{Token, TokenKind, TokenSource};
use crate::types::Type;

/// Tracks the function currently being parsed, so `return` can validate
/// against its declared return type (§4.5).
pub(crate) struct CurrentFn {
    pub return_type: Type,
}

pub struct Compiler<T: TokenSource> {
    pub(crate) lexer: T,
    pub(crate) symtab: SymbolTable,
    pub(crate) emitter: Emitter,
    #[allow(dead_code)]
    pub(crate) config: CompilerConfig,
    pub(crate) current_fn: Option<CurrentFn>,
}

impl<T: TokenSource> Compiler<T> {
    pub fn new(lexer: T, config: CompilerConfig) -> Self {
        let mut symtab = SymbolTable::new();
        builtins::seed_builtins(&mut symtab);
        let mut emitter = Emitter::new();
        if config.always_inline_substring {
            emitter.mark_substring_used();
        }
        Compiler { lexer, symtab, emitter, config, current_fn: None }
    }

    /// Run the full pipeline and return the assembled IFJcode program.
    pub fn compile(mut self) -> Result<String, CompileError> {
        self.parse_program()?;
        self.symtab.check_all_defined()?;
        Ok(self.emitter.finish())
    }

    pub(crate) fn bump(&mut self) -> Token {
        self.lexer.next_token()
    }

    pub(crate) fn peek(&mut self) -> Token {
        let tok = self.lexer.next_token();
        self.lexer.push_back(tok.clone());
        tok
    }

    pub(crate) fn peek_kind(&mut self) -> TokenKind {
        self.peek().kind
    }

    pub(crate) fn peek_pos(&mut self) -> (u32, u32) {
        let tok = self.peek();
        (tok.line, tok.column)
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, CompileError> {
        let tok = self.bump();
        if tok.kind == TokenKind::Invalid {
            return Err(CompileError::lex(tok.line, tok.column, format!("invalid character '{}'", tok.lexeme)));
        }
        if tok.kind == kind {
            Ok(tok)
        } else {
            Err(CompileError::syn(
                tok.line,
                tok.column,
                format!("expected {what}, found '{}'", tok.lexeme),
            ))
        }
    }

    pub(crate) fn expect_ident(&mut self) -> Result<Token, CompileError> {
        self.expect(TokenKind::Ident, "an identifier")
    }

    /// `"LF"` inside a function body, `"GF"` at global scope — including
    /// inside a top-level `if`/`while` block, which opens a lexical scope
    /// without pushing a VM frame.
    pub(crate) fn frame_prefix(&self) -> &'static str {
        if self.current_fn.is_some() {
            "LF"
        } else {
            "GF"
        }
    }
}
