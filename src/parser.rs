//! Statement parser (§4.5): LL recursive descent over declarations,
//! assignment, calls, `if`/`while`/`return`, and function definitions.
//! Also hosts forward-reference signature reconciliation (§4.6) and the
//! shared call-compilation path used by both statements and expressions.

use crate::builtins;
use crate::compiler::{Compiler, CurrentFn};
use crate::diagnostics::CompileError;
use crate::emitter::{TMP1, TMP3};
use crate::symtab::{Signature, SymbolEntry};
use crate::token::{Token, TokenKind, TokenSource};
use crate::types::{self, Type};

/// One materialized call argument: its (optional) external label, its
/// type, whether it is a literal integer (for promotion), and the
/// codename of the temporary variable holding its value.
pub(crate) struct CallArg {
    label: Option<String>,
    ty: Type,
    is_int_literal: bool,
    codename: String,
    line: u32,
    column: u32,
}

impl<T: TokenSource> Compiler<T> {
    pub(crate) fn parse_program(&mut self) -> Result<(), CompileError> {
        loop {
            if self.peek_kind() == TokenKind::Eof {
                break;
            }
            self.parse_top_level_item()?;
        }
        Ok(())
    }

    fn parse_top_level_item(&mut self) -> Result<(), CompileError> {
        if self.peek_kind() == TokenKind::KwFunc {
            self.parse_function_def()
        } else {
            self.parse_statement()
        }
    }

    fn parse_statement(&mut self) -> Result<(), CompileError> {
        let tok = self.peek();
        match tok.kind {
            TokenKind::KwLet | TokenKind::KwVar => self.parse_var_decl(),
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwWhile => self.parse_while(),
            TokenKind::KwReturn => self.parse_return(),
            TokenKind::KwFunc => {
                Err(CompileError::syn(tok.line, tok.column, "nested function definitions are not allowed"))
            }
            TokenKind::Ident => self.parse_assignment_or_call(),
            TokenKind::Invalid => {
                Err(CompileError::lex(tok.line, tok.column, format!("invalid character '{}'", tok.lexeme)))
            }
            _ => Err(CompileError::syn(tok.line, tok.column, format!("unexpected token '{}'", tok.lexeme))),
        }
    }

    fn parse_block(&mut self) -> Result<bool, CompileError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        self.symtab.push_block();
        loop {
            let kind = self.peek_kind();
            if kind == TokenKind::RBrace {
                break;
            }
            if kind == TokenKind::Eof {
                let tok = self.peek();
                return Err(CompileError::syn(tok.line, tok.column, "unterminated block"));
            }
            self.parse_statement()?;
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(self.symtab.pop_block())
    }

    fn parse_type(&mut self) -> Result<Type, CompileError> {
        let tok = self.bump();
        let base = match tok.kind {
            TokenKind::KwInt => Type::Int,
            TokenKind::KwDouble => Type::Double,
            TokenKind::KwString => Type::Str,
            TokenKind::KwBool => Type::Bool,
            TokenKind::KwVoid => Type::Void,
            _ => return Err(CompileError::syn(tok.line, tok.column, format!("expected a type, found '{}'", tok.lexeme))),
        };
        if self.peek_kind() == TokenKind::Question {
            if !matches!(base, Type::Int | Type::Double | Type::Str) {
                let q = self.bump();
                return Err(CompileError::syn(q.line, q.column, "only Int, Double, and String may be optional"));
            }
            self.bump();
            return Ok(base.to_optional());
        }
        Ok(base)
    }

    fn parse_var_decl(&mut self) -> Result<(), CompileError> {
        let kw = self.bump();
        let immutable = kw.kind == TokenKind::KwLet;
        let name_tok = self.expect_ident()?;
        let name = name_tok.lexeme.clone();

        let declared_type = if self.peek_kind() == TokenKind::Colon {
            self.bump();
            Some(self.parse_type()?)
        } else {
            None
        };

        if declared_type.is_none() && self.peek_kind() != TokenKind::Assign {
            return Err(CompileError::syn(name_tok.line, name_tok.column, "expected ':' or '=' after variable name"));
        }

        let frame = self.frame_prefix();
        let codename = self.emitter.new_var_codename(frame, &name);
        self.emitter.declare_var(&codename);

        let (final_type, initialized) = if self.peek_kind() == TokenKind::Assign {
            self.bump();
            let (rl, rc) = self.peek_pos();
            let result = self.parse_expression()?;
            if result.ty == Type::Void {
                return Err(CompileError::ty(rl, rc, "cannot initialize a variable with a Void value"));
            }
            if declared_type.is_none() && matches!(result.ty, Type::Nil | Type::Unknown) {
                return Err(CompileError::unknown_type(rl, rc, "cannot infer a type for this declaration"));
            }
            let target = declared_type.unwrap_or(result.ty);
            let promote = types::double_target(target) && result.ty == Type::Int && result.possibly_implicit;
            if promote {
                let tmp = self.emitter.new_var_codename(self.frame_prefix(), "prom");
                self.emitter.declare_var(&tmp);
                self.emitter.emit(&["POPS", tmp.as_str()]);
                self.emitter.emit(&["INT2FLOAT", codename.as_str(), tmp.as_str()]);
            } else {
                if !types::compatible(target, result.ty) {
                    return Err(CompileError::ty(rl, rc, format!("cannot assign {} to {}", result.ty, target)));
                }
                self.emitter.emit(&["POPS", codename.as_str()]);
            }
            (target, true)
        } else {
            let declared = declared_type.expect("checked above");
            if declared.is_optional() {
                self.emitter.emit(&["MOVE", codename.as_str(), "nil@nil"]);
                (declared, true)
            } else {
                (declared, false)
            }
        };

        let entry = SymbolEntry::variable(final_type, codename, immutable, initialized);
        if self.symtab.in_local_scope() {
            self.symtab.insert_local(&name, entry, name_tok.line, name_tok.column)?;
        } else {
            self.symtab.insert_global(&name, entry, name_tok.line, name_tok.column)?;
        }
        Ok(())
    }

    fn parse_assignment_or_call(&mut self) -> Result<(), CompileError> {
        let name_tok = self.bump();
        let name = name_tok.lexeme.clone();

        if self.peek_kind() == TokenKind::LParen {
            self.compile_call(&name, name_tok.line, name_tok.column)?;
            self.emitter.emit(&["CLEARS"]);
            return Ok(());
        }

        let entry = self
            .symtab
            .lookup(&name)
            .cloned()
            .ok_or_else(|| CompileError::undef(name_tok.line, name_tok.column, format!("'{name}' is not defined")))?;
        if entry.ty == Type::Func {
            return Err(CompileError::other(
                name_tok.line,
                name_tok.column,
                format!("'{name}' is a function, not a variable"),
            ));
        }
        if entry.immutable && entry.initialized {
            return Err(CompileError::other(
                name_tok.line,
                name_tok.column,
                format!("cannot assign to '{name}': it was declared with 'let'"),
            ));
        }
        self.expect(TokenKind::Assign, "'='")?;
        let (rl, rc) = self.peek_pos();
        let result = self.parse_expression()?;
        if result.ty == Type::Void {
            return Err(CompileError::ty(rl, rc, "cannot assign a Void value"));
        }
        let promote = types::double_target(entry.ty) && result.ty == Type::Int && result.possibly_implicit;
        if promote {
            let tmp = self.emitter.new_var_codename(self.frame_prefix(), "prom");
            self.emitter.declare_var(&tmp);
            self.emitter.emit(&["POPS", tmp.as_str()]);
            self.emitter.emit(&["INT2FLOAT", entry.codename.as_str(), tmp.as_str()]);
        } else {
            if !types::compatible(entry.ty, result.ty) {
                return Err(CompileError::ty(rl, rc, format!("cannot assign {} to {}", result.ty, entry.ty)));
            }
            self.emitter.emit(&["POPS", entry.codename.as_str()]);
        }
        if !entry.initialized {
            if let Some(e) = self.symtab.lookup_mut(&name) {
                e.initialized = true;
            }
        }
        Ok(())
    }

    fn parse_if(&mut self) -> Result<(), CompileError> {
        self.bump(); // 'if'
        if self.peek_kind() == TokenKind::KwLet {
            return self.parse_if_let();
        }

        let (el, ec) = self.peek_pos();
        let cond = self.parse_expression()?;
        if cond.ty != Type::Bool {
            return Err(CompileError::ty(el, ec, "'if' condition must be Bool"));
        }
        let else_label = self.emitter.new_label("if", "else");
        let end_label = self.emitter.new_label("if", "end");
        let tmp1 = format!("GF@{TMP1}");
        self.emitter.emit(&["POPS", tmp1.as_str()]);
        self.emitter.emit(&["JUMPIFEQ", else_label.as_str(), tmp1.as_str(), "bool@false"]);
        let then_return = self.parse_block()?;
        self.emitter.emit(&["JUMP", end_label.as_str()]);
        self.emitter.emit(&["LABEL", else_label.as_str()]);
        self.expect(TokenKind::KwElse, "'else'")?;
        let else_return = self.parse_block()?;
        self.emitter.emit(&["LABEL", end_label.as_str()]);
        if then_return && else_return {
            self.symtab.block_set_return(true);
        }
        Ok(())
    }

    fn parse_if_let(&mut self) -> Result<(), CompileError> {
        self.bump(); // 'let'
        let name_tok = self.expect_ident()?;
        let name = name_tok.lexeme.clone();
        let entry = self
            .symtab
            .lookup(&name)
            .cloned()
            .ok_or_else(|| CompileError::undef(name_tok.line, name_tok.column, format!("'{name}' is not defined")))?;
        if !entry.immutable || !entry.initialized {
            return Err(CompileError::other(
                name_tok.line,
                name_tok.column,
                format!("'if let {name}' requires an initialized 'let' variable"),
            ));
        }
        if !entry.ty.is_optional() {
            return Err(CompileError::ty(
                name_tok.line,
                name_tok.column,
                format!("'if let {name}' requires an optional variable"),
            ));
        }

        let guard_label = self.emitter.new_label("iflet", "else");
        let end_label = self.emitter.new_label("iflet", "end");
        self.emitter.emit(&["JUMPIFEQ", guard_label.as_str(), entry.codename.as_str(), "nil@nil"]);

        self.expect(TokenKind::LBrace, "'{'")?;
        self.symtab.push_block();
        self.symtab.insert_local(
            &name,
            SymbolEntry::variable(entry.ty.base(), entry.codename.clone(), true, true),
            name_tok.line,
            name_tok.column,
        )?;
        loop {
            let kind = self.peek_kind();
            if kind == TokenKind::RBrace {
                break;
            }
            if kind == TokenKind::Eof {
                let tok = self.peek();
                return Err(CompileError::syn(tok.line, tok.column, "unterminated block"));
            }
            self.parse_statement()?;
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        let then_return = self.symtab.pop_block();
        self.emitter.emit(&["JUMP", end_label.as_str()]);
        self.emitter.emit(&["LABEL", guard_label.as_str()]);

        self.expect(TokenKind::KwElse, "'else'")?;
        let else_return = self.parse_block()?;
        self.emitter.emit(&["LABEL", end_label.as_str()]);

        if then_return && else_return {
            self.symtab.block_set_return(true);
        }
        Ok(())
    }

    fn parse_while(&mut self) -> Result<(), CompileError> {
        self.bump(); // 'while'
        let start_label = self.emitter.new_label("while", "start");
        let end_label = self.emitter.new_label("while", "end");
        self.emitter.enter_loop(&start_label);
        self.emitter.emit(&["LABEL", start_label.as_str()]);

        let (el, ec) = self.peek_pos();
        let cond = self.parse_expression()?;
        if cond.ty != Type::Bool {
            self.emitter.exit_loop();
            return Err(CompileError::ty(el, ec, "'while' condition must be Bool"));
        }
        let tmp1 = format!("GF@{TMP1}");
        self.emitter.emit(&["POPS", tmp1.as_str()]);
        self.emitter.emit(&["JUMPIFEQ", end_label.as_str(), tmp1.as_str(), "bool@false"]);
        self.parse_block()?;
        self.emitter.emit(&["JUMP", start_label.as_str()]);
        self.emitter.emit(&["LABEL", end_label.as_str()]);
        self.emitter.exit_loop();
        Ok(())
    }

    fn parse_return(&mut self) -> Result<(), CompileError> {
        let ret_tok = self.bump();
        let return_type = match &self.current_fn {
            Some(f) => f.return_type,
            None => {
                return Err(CompileError::other(
                    ret_tok.line,
                    ret_tok.column,
                    "'return' is not allowed at global scope",
                ))
            }
        };
        let has_value = !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof);

        if return_type == Type::Void {
            if has_value {
                let (l, c) = self.peek_pos();
                return Err(CompileError::ret(l, c, "a Void function cannot return a value"));
            }
        } else {
            if !has_value {
                return Err(CompileError::ret(ret_tok.line, ret_tok.column, "missing return value"));
            }
            let (rl, rc) = self.peek_pos();
            let result = self.parse_expression()?;
            if result.ty == Type::Void {
                return Err(CompileError::ty(rl, rc, "cannot return a Void value"));
            }
            let promote = types::double_target(return_type) && result.ty == Type::Int && result.possibly_implicit;
            if promote {
                let tmp = self.emitter.new_var_codename(self.frame_prefix(), "prom");
                self.emitter.declare_var(&tmp);
                self.emitter.emit(&["POPS", tmp.as_str()]);
                let tmp3 = format!("GF@{TMP3}");
                self.emitter.emit(&["INT2FLOAT", tmp3.as_str(), tmp.as_str()]);
                self.emitter.emit(&["PUSHS", tmp3.as_str()]);
            } else if !types::compatible(return_type, result.ty) {
                return Err(CompileError::ty(
                    rl,
                    rc,
                    format!("cannot return {} from a function returning {}", result.ty, return_type),
                ));
            }
        }
        self.emitter.emit(&["POPFRAME"]);
        self.emitter.emit(&["RETURN"]);
        self.symtab.block_set_return(true);
        Ok(())
    }

    fn expect_ident_or_underscore(&mut self) -> Result<Token, CompileError> {
        let tok = self.bump();
        if tok.kind == TokenKind::Ident {
            Ok(tok)
        } else {
            Err(CompileError::syn(tok.line, tok.column, "expected a parameter name or '_'"))
        }
    }

    fn parse_function_def(&mut self) -> Result<(), CompileError> {
        let func_tok = self.bump(); // 'func'
        if self.symtab.in_local_scope() {
            return Err(CompileError::syn(
                func_tok.line,
                func_tok.column,
                "nested function definitions are not allowed",
            ));
        }
        let name_tok = self.expect_ident()?;
        let name = name_tok.lexeme.clone();
        if builtins::is_builtin(&name) {
            return Err(CompileError::redef(
                name_tok.line,
                name_tok.column,
                format!("'{name}' shadows a built-in function"),
            ));
        }

        self.expect(TokenKind::LParen, "'('")?;
        let mut param_names: Vec<String> = Vec::new();
        let mut param_ids: Vec<String> = Vec::new();
        let mut param_types: Vec<Type> = Vec::new();
        if self.peek_kind() != TokenKind::RParen {
            loop {
                let first = self.expect_ident_or_underscore()?;
                let (label, id_tok) = if self.peek_kind() == TokenKind::Ident {
                    (first, self.bump())
                } else {
                    (first.clone(), first)
                };
                self.expect(TokenKind::Colon, "':'")?;
                let ty = self.parse_type()?;
                param_names.push(label.lexeme);
                param_ids.push(id_tok.lexeme);
                param_types.push(ty);
                if self.peek_kind() == TokenKind::Comma {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        let return_type = if self.peek_kind() == TokenKind::Arrow {
            self.bump();
            self.parse_type()?
        } else {
            Type::Void
        };

        for i in 0..param_names.len() {
            for j in (i + 1)..param_names.len() {
                if param_names[i] != "_" && param_names[i] == param_names[j] {
                    return Err(CompileError::func(
                        name_tok.line,
                        name_tok.column,
                        format!("duplicate parameter label '{}'", param_names[i]),
                    ));
                }
                if param_ids[i] == param_ids[j] {
                    return Err(CompileError::func(
                        name_tok.line,
                        name_tok.column,
                        format!("duplicate parameter name '{}'", param_ids[i]),
                    ));
                }
            }
        }

        let codename = format!("!{name}");
        if let Some(existing) = self.symtab.lookup_global(&name).cloned() {
            if existing.ty != Type::Func {
                return Err(CompileError::redef(name_tok.line, name_tok.column, format!("'{name}' is already declared")));
            }
            if existing.initialized {
                return Err(CompileError::redef(
                    name_tok.line,
                    name_tok.column,
                    format!("function '{name}' is already defined"),
                ));
            }
            let recorded = existing.signature.expect("func entry carries a signature");
            if recorded.arity() != param_names.len() {
                return Err(CompileError::func(
                    name_tok.line,
                    name_tok.column,
                    format!(
                        "'{name}' was called with {} argument(s) but is declared with {}",
                        recorded.arity(),
                        param_names.len()
                    ),
                ));
            }
            for i in 0..param_names.len() {
                if recorded.param_names[i] != param_names[i] {
                    return Err(CompileError::func(
                        name_tok.line,
                        name_tok.column,
                        format!("parameter {} of '{name}' must be labeled '{}'", i + 1, recorded.param_names[i]),
                    ));
                }
                if recorded.param_types[i] != Type::Unknown && recorded.param_types[i].base() != param_types[i].base() {
                    return Err(CompileError::func(
                        name_tok.line,
                        name_tok.column,
                        format!("parameter {} of '{name}' has an incompatible type", i + 1),
                    ));
                }
            }
            self.symtab.clear_pending_call(&name);
        }

        let sig = Signature {
            return_type,
            param_names: param_names.clone(),
            param_ids: param_ids.clone(),
            param_types: param_types.clone(),
        };
        self.symtab.set_global(&name, SymbolEntry::function(codename.clone(), sig, true));

        self.emitter.emit_fn_prologue(&codename, &param_ids);
        self.emitter.enter_function();
        self.symtab.push_block();
        for (id, ty) in param_ids.iter().zip(param_types.iter()) {
            if id == "_" {
                continue;
            }
            self.symtab.insert_local(
                id,
                SymbolEntry::variable(*ty, format!("LF@{id}%"), false, true),
                name_tok.line,
                name_tok.column,
            )?;
        }
        let prev_fn = self.current_fn.replace(CurrentFn { return_type });

        self.expect(TokenKind::LBrace, "'{'")?;
        loop {
            let kind = self.peek_kind();
            if kind == TokenKind::RBrace {
                break;
            }
            if kind == TokenKind::Eof {
                let tok = self.peek();
                return Err(CompileError::syn(tok.line, tok.column, "unterminated function body"));
            }
            self.parse_statement()?;
        }
        self.expect(TokenKind::RBrace, "'}'")?;

        let body_has_return = self.symtab.block_has_return();
        self.symtab.pop_block();
        self.current_fn = prev_fn;

        if return_type == Type::Void && !body_has_return {
            self.emitter.emit(&["POPFRAME"]);
            self.emitter.emit(&["RETURN"]);
        }
        self.emitter.exit_function();

        if return_type != Type::Void && !body_has_return {
            return Err(CompileError::ret(
                name_tok.line,
                name_tok.column,
                format!("function '{name}' must return a value on every path"),
            ));
        }

        Ok(())
    }

    /// Parse `(args...)` and compile a call to `name`, already positioned
    /// right after the callee identifier. Leaves the return value (if any)
    /// on top of the VM operand stack; returns its type.
    pub(crate) fn compile_call(&mut self, name: &str, line: u32, column: u32) -> Result<Type, CompileError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args: Vec<CallArg> = Vec::new();
        if self.peek_kind() != TokenKind::RParen {
            loop {
                let label = self.maybe_parse_label()?;
                let (arg_line, arg_column) = self.peek_pos();
                let result = self.parse_expression()?;
                if result.ty == Type::Void {
                    return Err(CompileError::ty(arg_line, arg_column, "cannot pass a Void value as an argument"));
                }
                let frame = self.frame_prefix();
                let codename = self.emitter.new_var_codename(frame, "arg");
                self.emitter.declare_var(&codename);
                self.emitter.emit(&["POPS", codename.as_str()]);

                if name == "write" {
                    if label.is_some() {
                        return Err(CompileError::other(
                            arg_line,
                            arg_column,
                            "function 'write' does not use parameter names",
                        ));
                    }
                    builtins::emit_write_arg(&mut self.emitter, &codename);
                }

                args.push(CallArg {
                    label,
                    ty: result.ty,
                    is_int_literal: result.possibly_implicit,
                    codename,
                    line: arg_line,
                    column: arg_column,
                });
                if self.peek_kind() == TokenKind::Comma {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        if name == "write" {
            return Ok(Type::Void);
        }
        if builtins::is_builtin(name) {
            return self.compile_builtin_call(name, args, line, column);
        }
        self.compile_user_call(name, args, line, column)
    }

    /// An argument label is an identifier immediately followed by ':';
    /// anything else means that token starts the argument's own expression.
    fn maybe_parse_label(&mut self) -> Result<Option<String>, CompileError> {
        if self.peek_kind() == TokenKind::Ident {
            let ident = self.bump();
            if self.peek_kind() == TokenKind::Colon {
                self.bump();
                return Ok(Some(ident.lexeme));
            }
            self.lexer.push_back(ident);
        }
        Ok(None)
    }

    fn compile_builtin_call(&mut self, name: &str, args: Vec<CallArg>, line: u32, column: u32) -> Result<Type, CompileError> {
        let entry = self.symtab.lookup_global(name).cloned().expect("builtin is seeded");
        let sig = entry.signature.expect("builtin carries a signature");
        if args.len() != sig.arity() {
            return Err(CompileError::func(
                line,
                column,
                format!("'{name}' expects {} argument(s), got {}", sig.arity(), args.len()),
            ));
        }
        for (i, a) in args.iter().enumerate() {
            if name == "substring" {
                if a.label.as_deref() != Some(sig.param_names[i].as_str()) {
                    return Err(CompileError::func(
                        a.line,
                        a.column,
                        format!("argument {} of 'substring' must be labeled '{}'", i + 1, sig.param_names[i]),
                    ));
                }
            } else if a.label.is_some() {
                return Err(CompileError::other(a.line, a.column, format!("'{name}' does not use parameter names")));
            }
            if !types::compatible(sig.param_types[i], a.ty) {
                return Err(CompileError::ty(
                    a.line,
                    a.column,
                    format!("argument {} to '{name}' expects {}, found {}", i + 1, sig.param_types[i], a.ty),
                ));
            }
        }

        let codenames: Vec<String> = args.into_iter().map(|a| a.codename).collect();
        if builtins::creates_own_frame(name) {
            self.emitter.mark_substring_used();
            self.emitter.emit_fn_call("!substring", &codenames);
            self.emitter.emit(&["POPFRAME"]);
            Ok(Type::StrOpt)
        } else {
            builtins::emit_inline_call(&mut self.emitter, name, &codenames);
            Ok(sig.return_type)
        }
    }

    fn compile_user_call(&mut self, name: &str, args: Vec<CallArg>, line: u32, column: u32) -> Result<Type, CompileError> {
        let existing = self.symtab.lookup_global(name).cloned();
        match existing {
            None => {
                let param_names: Vec<String> =
                    args.iter().map(|a| a.label.clone().unwrap_or_else(|| "_".to_string())).collect();
                let param_types: Vec<Type> = args
                    .iter()
                    .map(|a| match a.ty {
                        Type::Int => Type::IntOpt,
                        Type::Double => Type::DoubleOpt,
                        Type::Str => Type::StrOpt,
                        Type::Nil => Type::Unknown,
                        other => other,
                    })
                    .collect();
                let sig = Signature {
                    return_type: Type::Unknown,
                    param_names: param_names.clone(),
                    param_ids: param_names,
                    param_types,
                };
                let codename = format!("!{name}");
                self.symtab.set_global(name, SymbolEntry::function(codename.clone(), sig, false));
                self.symtab.record_pending_call(name, line, column);
                let codenames: Vec<String> = args.into_iter().map(|a| a.codename).collect();
                self.emitter.emit_fn_call(&codename, &codenames);
                self.emitter.emit(&["POPFRAME"]);
                Ok(Type::Unknown)
            }
            Some(entry) if entry.ty == Type::Func => {
                let sig = entry.signature.clone().expect("func entry carries a signature");
                if args.len() != sig.arity() {
                    return Err(CompileError::func(
                        line,
                        column,
                        format!("'{name}' expects {} argument(s), got {}", sig.arity(), args.len()),
                    ));
                }
                for (i, a) in args.iter().enumerate() {
                    let expected_label = &sig.param_names[i];
                    let label_ok = if expected_label == "_" {
                        a.label.is_none()
                    } else {
                        a.label.as_deref() == Some(expected_label.as_str())
                    };
                    if !label_ok {
                        return Err(CompileError::func(
                            a.line,
                            a.column,
                            format!("argument {} to '{name}' has the wrong label", i + 1),
                        ));
                    }
                    if !types::compatible(sig.param_types[i], a.ty) {
                        return Err(CompileError::ty(
                            a.line,
                            a.column,
                            format!("argument {} to '{name}' expects {}, found {}", i + 1, sig.param_types[i], a.ty),
                        ));
                    }
                }
                let codenames: Vec<String> = args
                    .iter()
                    .enumerate()
                    .map(|(i, a)| {
                        if types::double_target(sig.param_types[i]) && a.ty == Type::Int && a.is_int_literal {
                            let promoted = self.emitter.new_var_codename(self.frame_prefix(), "prom");
                            self.emitter.declare_var(&promoted);
                            self.emitter.emit(&["INT2FLOAT", promoted.as_str(), a.codename.as_str()]);
                            promoted
                        } else {
                            a.codename.clone()
                        }
                    })
                    .collect();
                self.emitter.emit_fn_call(&entry.codename, &codenames);
                self.emitter.emit(&["POPFRAME"]);
                Ok(sig.return_type)
            }
            Some(_) => Err(CompileError::other(line, column, format!("'{name}' is not callable"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::token::Lexer;

    fn compile(src: &str) -> Result<String, CompileError> {
        let lexer = Lexer::new(src);
        Compiler::new(lexer, CompilerConfig::default()).compile()
    }

    #[test]
    fn simple_declaration_and_arithmetic() {
        let out = compile("let x = 5 + 2 * 3").unwrap();
        assert!(out.contains("PUSHS int@5"));
        assert!(out.contains("MULS"));
        assert!(out.contains("ADDS"));
        assert!(out.contains("POPS GF@x$1"));
    }

    #[test]
    fn int_literal_promotes_to_double_declaration() {
        let out = compile("let y : Double = 5 + 1").unwrap();
        assert!(out.contains("INT2FLOAT"));
    }

    #[test]
    fn while_loop_hoists_declaration_before_entry_label() {
        let out = compile("var x = 0\nwhile x < 10 {\nvar t = x\nx = x + 1\n}").unwrap();
        let defvar_pos = out.find("DEFVAR GF@t$1").unwrap();
        let label_pos = out.find("LABEL while&start1").unwrap();
        assert!(defvar_pos < label_pos);
    }

    #[test]
    fn forward_call_reconciles_with_later_definition() {
        let out = compile("foo(5)\nfunc foo(_ n: Int) -> Int {\nreturn n\n}").unwrap();
        assert!(out.contains("CALL !foo"));
    }

    #[test]
    fn forward_call_with_mismatched_param_name_is_a_func_error() {
        let err = compile("foo(5)\nfunc foo(wrong n: Int) -> Int {\nreturn n\n}").unwrap_err();
        assert_eq!(err.code(), 4);
    }

    #[test]
    fn if_let_unwraps_optional_in_true_branch() {
        let out = compile("let a : Int? = nil\nif let a {\nwrite(a)\n} else {\nwrite(0)\n}").unwrap();
        assert!(out.contains("JUMPIFEQ iflet&else1"));
    }

    #[test]
    fn void_function_used_as_value_is_a_type_error() {
        let err = compile("func f() {\nreturn\n}\nlet x = f()").unwrap_err();
        assert_eq!(err.code(), 6);
    }

    #[test]
    fn return_missing_on_some_path_is_rejected() {
        let err = compile("func f() -> Int {\nif true { return 1 } else {\n}\n}").unwrap_err();
        assert_eq!(err.code(), 5);
    }

    #[test]
    fn string_concatenation_end_to_end() {
        let out = compile("let s = \"a\" + \" b\"").unwrap();
        assert!(out.contains("CONCAT GF@tmp3 GF@tmp1 GF@tmp2"));
    }

    #[test]
    fn assigning_to_an_already_initialized_let_is_rejected() {
        let err = compile("let x = 1\nx = 2").unwrap_err();
        assert_eq!(err.code(), 8);
    }
}
