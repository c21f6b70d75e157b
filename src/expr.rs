//! Expression analyzer (§4.4): a shunting-yard over five precedence
//! classes (Stage 1) followed by a typed reduction over the resulting
//! postfix sequence (Stage 2).

use crate::compiler::Compiler;
use crate::diagnostics::CompileError;
use crate::emitter::{self, TMP1, TMP2, TMP3};
use crate::token::{Token, TokenKind, TokenSource};
use crate::types::{self, Type};

/// Result of analyzing one expression: its type and whether the final
/// value is a single integer literal (used by callers for promotion).
pub struct ExprResult {
    pub ty: Type,
    pub possibly_implicit: bool,
}

/// One resolved leaf value: already looked up / emitted by the time it
/// lands in the postfix sequence, carrying just enough to type-check and
/// to re-reference on the VM stack.
#[derive(Clone)]
struct Operand {
    ty: Type,
    codename: String,
    is_int_literal: bool,
    line: u32,
    column: u32,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Coalesce,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl OpKind {
    fn from_token(kind: TokenKind) -> Option<OpKind> {
        Some(match kind {
            TokenKind::QuestionQuestion => OpKind::Coalesce,
            TokenKind::EqEq => OpKind::EqEq,
            TokenKind::NotEq => OpKind::NotEq,
            TokenKind::Lt => OpKind::Lt,
            TokenKind::Gt => OpKind::Gt,
            TokenKind::Le => OpKind::Le,
            TokenKind::Ge => OpKind::Ge,
            TokenKind::Plus => OpKind::Add,
            TokenKind::Minus => OpKind::Sub,
            TokenKind::Star => OpKind::Mul,
            TokenKind::Slash => OpKind::Div,
            _ => return None,
        })
    }

    fn precedence(self) -> u8 {
        match self {
            OpKind::Coalesce => 1,
            OpKind::EqEq | OpKind::NotEq | OpKind::Lt | OpKind::Gt | OpKind::Le | OpKind::Ge => 2,
            OpKind::Add | OpKind::Sub => 3,
            OpKind::Mul | OpKind::Div => 4,
        }
    }

    fn is_right_assoc(self) -> bool {
        matches!(self, OpKind::Coalesce)
    }
}

enum StackItem {
    Op(OpKind, u32, u32),
    LParen,
}

enum PItem {
    Operand(Operand),
    Op(OpKind, u32, u32),
    Unwrap(u32, u32),
}

fn starts_operand(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::IntLit
            | TokenKind::DoubleLit
            | TokenKind::StringLit
            | TokenKind::KwNil
            | TokenKind::KwTrue
            | TokenKind::KwFalse
            | TokenKind::Ident
            | TokenKind::LParen
    )
}

impl<T: TokenSource> Compiler<T> {
    /// Parse and emit one expression, terminating on (and pushing back)
    /// the first token that cannot continue it.
    pub fn parse_expression(&mut self) -> Result<ExprResult, CompileError> {
        let postfix = self.shunt_to_postfix()?;
        self.reduce_postfix(postfix)
    }

    fn shunt_to_postfix(&mut self) -> Result<Vec<PItem>, CompileError> {
        let mut output: Vec<PItem> = Vec::new();
        let mut ops: Vec<StackItem> = Vec::new();
        let mut paren_depth: u32 = 0;
        let mut expect_operand = true;
        let mut consumed_any = false;

        loop {
            let tok = self.bump();

            if expect_operand {
                if tok.kind == TokenKind::Bang {
                    return Err(CompileError::syn(tok.line, tok.column, "'!' without a preceding value"));
                }
                if !starts_operand(tok.kind) {
                    if tok.kind == TokenKind::Invalid {
                        return Err(CompileError::lex(tok.line, tok.column, format!("invalid character '{}'", tok.lexeme)));
                    }
                    if !consumed_any {
                        self.lexer.push_back(tok.clone());
                        return Err(CompileError::syn(tok.line, tok.column, "expected an expression"));
                    }
                    return Err(CompileError::syn(
                        tok.line,
                        tok.column,
                        "expected an operand after operator",
                    ));
                }
                consumed_any = true;
                if tok.kind == TokenKind::LParen {
                    ops.push(StackItem::LParen);
                    paren_depth += 1;
                    continue; // still expecting an operand
                }
                let operand = self.resolve_operand_token(tok)?;
                output.push(PItem::Operand(operand));
                expect_operand = false;
                continue;
            }

            // expect_operand == false: we just produced an operand-like value.
            if tok.kind == TokenKind::Bang {
                output.push(PItem::Unwrap(tok.line, tok.column));
                continue;
            }
            if tok.kind == TokenKind::RParen {
                if paren_depth == 0 {
                    self.lexer.push_back(tok);
                    break;
                }
                loop {
                    match ops.pop() {
                        Some(StackItem::LParen) => break,
                        Some(StackItem::Op(op, l, c)) => output.push(PItem::Op(op, l, c)),
                        None => {
                            return Err(CompileError::syn(tok.line, tok.column, "mismatched ')'"));
                        }
                    }
                }
                paren_depth -= 1;
                continue;
            }
            if let Some(op) = OpKind::from_token(tok.kind) {
                while let Some(StackItem::Op(top, ..)) = ops.last() {
                    let pop = if op.is_right_assoc() {
                        top.precedence() > op.precedence()
                    } else {
                        top.precedence() >= op.precedence()
                    };
                    if !pop {
                        break;
                    }
                    if let Some(StackItem::Op(top, l, c)) = ops.pop() {
                        output.push(PItem::Op(top, l, c));
                    }
                }
                ops.push(StackItem::Op(op, tok.line, tok.column));
                expect_operand = true;
                continue;
            }
            if starts_operand(tok.kind) {
                return Err(CompileError::syn(tok.line, tok.column, "two adjacent operands"));
            }
            // Any other token ends the expression.
            self.lexer.push_back(tok);
            break;
        }

        while let Some(item) = ops.pop() {
            match item {
                StackItem::LParen => {
                    return Err(CompileError::syn(0, 0, "mismatched '('"));
                }
                StackItem::Op(op, l, c) => output.push(PItem::Op(op, l, c)),
            }
        }
        Ok(output)
    }

    fn resolve_operand_token(&mut self, tok: Token) -> Result<Operand, CompileError> {
        match tok.kind {
            TokenKind::IntLit => {
                let value: i64 = tok.lexeme.parse().map_err(|_| {
                    CompileError::syn(tok.line, tok.column, format!("invalid integer literal '{}'", tok.lexeme))
                })?;
                Ok(Operand {
                    ty: Type::Int,
                    codename: emitter::const_int(value),
                    is_int_literal: true,
                    line: tok.line,
                    column: tok.column,
                })
            }
            TokenKind::DoubleLit => {
                let value: f64 = tok.lexeme.parse().map_err(|_| {
                    CompileError::syn(tok.line, tok.column, format!("invalid double literal '{}'", tok.lexeme))
                })?;
                Ok(Operand {
                    ty: Type::Double,
                    codename: emitter::const_double(value),
                    is_int_literal: false,
                    line: tok.line,
                    column: tok.column,
                })
            }
            TokenKind::StringLit => Ok(Operand {
                ty: Type::Str,
                codename: emitter::const_string(&tok.lexeme),
                is_int_literal: false,
                line: tok.line,
                column: tok.column,
            }),
            TokenKind::KwTrue => Ok(Operand {
                ty: Type::Bool,
                codename: emitter::const_bool(true),
                is_int_literal: false,
                line: tok.line,
                column: tok.column,
            }),
            TokenKind::KwFalse => Ok(Operand {
                ty: Type::Bool,
                codename: emitter::const_bool(false),
                is_int_literal: false,
                line: tok.line,
                column: tok.column,
            }),
            TokenKind::KwNil => Ok(Operand {
                ty: Type::Nil,
                codename: emitter::const_nil(),
                is_int_literal: false,
                line: tok.line,
                column: tok.column,
            }),
            TokenKind::Ident => {
                if self.peek_kind() == TokenKind::LParen {
                    let name = tok.lexeme.clone();
                    let ret_ty = self.compile_call(&name, tok.line, tok.column)?;
                    if ret_ty == Type::Void {
                        return Err(CompileError::ty(
                            tok.line,
                            tok.column,
                            format!("'{name}' returns Void and cannot be used as a value"),
                        ));
                    }
                    let frame = self.frame_prefix();
                    let codename = self.emitter.new_var_codename(frame, "call");
                    self.emitter.declare_var(&codename);
                    self.emitter.emit(&["POPS", codename.as_str()]);
                    Ok(Operand { ty: ret_ty, codename, is_int_literal: false, line: tok.line, column: tok.column })
                } else {
                    let entry = self.symtab.lookup(&tok.lexeme).cloned().ok_or_else(|| {
                        CompileError::undef(tok.line, tok.column, format!("'{}' is not defined", tok.lexeme))
                    })?;
                    if !entry.initialized {
                        return Err(CompileError::undef(
                            tok.line,
                            tok.column,
                            format!("'{}' is used before being initialized", tok.lexeme),
                        ));
                    }
                    Ok(Operand {
                        ty: entry.ty,
                        codename: entry.codename,
                        is_int_literal: false,
                        line: tok.line,
                        column: tok.column,
                    })
                }
            }
            other => Err(CompileError::internal(format!("unexpected operand token {other:?}"))),
        }
    }

    fn reduce_postfix(&mut self, postfix: Vec<PItem>) -> Result<ExprResult, CompileError> {
        let mut stack: Vec<Operand> = Vec::new();
        for item in postfix {
            match item {
                PItem::Operand(operand) => {
                    self.emitter.emit(&["PUSHS", operand.codename.as_str()]);
                    stack.push(operand);
                }
                PItem::Unwrap(line, column) => {
                    let top = stack.pop().ok_or_else(|| {
                        CompileError::internal("force-unwrap with empty semantic stack")
                    })?;
                    if top.ty == Type::Nil {
                        return Err(CompileError::other(line, column, "cannot force-unwrap 'nil'"));
                    }
                    if !top.ty.is_optional() {
                        return Err(CompileError::ty(
                            line,
                            column,
                            format!("cannot force-unwrap non-optional {}", top.ty),
                        ));
                    }
                    stack.push(Operand { ty: top.ty.base(), ..top });
                }
                PItem::Op(op, line, column) => {
                    let b = stack.pop().ok_or_else(|| CompileError::internal("binary op missing rhs"))?;
                    let a = stack.pop().ok_or_else(|| CompileError::internal("binary op missing lhs"))?;
                    let result = self.reduce_binary(op, a, b, line, column)?;
                    stack.push(result);
                }
            }
        }
        let result = stack.pop().ok_or_else(|| CompileError::internal("expression left no value"))?;
        if !stack.is_empty() {
            return Err(CompileError::internal("expression left extra values on semantic stack"));
        }
        Ok(ExprResult { ty: result.ty, possibly_implicit: result.is_int_literal })
    }

    /// Pop the top two VM-stack values into `tmp1`/`tmp2`, promote whichever
    /// is the `Int` literal to `Double` via `tmp3`, and push both back in
    /// their original order (§4.4).
    fn promote_if_needed(&mut self, a: &Operand, b: &Operand) -> (bool, bool) {
        let tmp1 = format!("GF@{TMP1}");
        let tmp2 = format!("GF@{TMP2}");
        let tmp3 = format!("GF@{TMP3}");
        if a.is_int_literal && a.ty == Type::Int && types::double_target(b.ty) {
            self.emitter.emit(&["POPS", tmp2.as_str()]);
            self.emitter.emit(&["POPS", tmp1.as_str()]);
            self.emitter.emit(&["INT2FLOAT", tmp3.as_str(), tmp1.as_str()]);
            self.emitter.emit(&["PUSHS", tmp3.as_str()]);
            self.emitter.emit(&["PUSHS", tmp2.as_str()]);
            return (true, true);
        }
        if b.is_int_literal && b.ty == Type::Int && types::double_target(a.ty) {
            self.emitter.emit(&["POPS", tmp2.as_str()]);
            self.emitter.emit(&["POPS", tmp1.as_str()]);
            self.emitter.emit(&["INT2FLOAT", tmp3.as_str(), tmp2.as_str()]);
            self.emitter.emit(&["PUSHS", tmp1.as_str()]);
            self.emitter.emit(&["PUSHS", tmp3.as_str()]);
            return (true, true);
        }
        (false, a.ty == Type::Double && b.ty == Type::Double)
    }

    fn reduce_binary(
        &mut self,
        op: OpKind,
        a: Operand,
        b: Operand,
        line: u32,
        column: u32,
    ) -> Result<Operand, CompileError> {
        if op == OpKind::Coalesce {
            return self.reduce_coalesce(a, b, line, column);
        }

        let nil_like =
            |t: Type| t.is_optional() || t == Type::Nil;
        if matches!(op, OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::Div | OpKind::Lt | OpKind::Gt | OpKind::Le | OpKind::Ge)
            && (nil_like(a.ty) || nil_like(b.ty))
        {
            return Err(CompileError::ty(line, column, "operator does not accept an optional or nil operand"));
        }

        match op {
            OpKind::Add if a.ty == Type::Str && b.ty == Type::Str => {
                let tmp1 = format!("GF@{TMP1}");
                let tmp2 = format!("GF@{TMP2}");
                let tmp3 = format!("GF@{TMP3}");
                self.emitter.emit(&["POPS", tmp2.as_str()]);
                self.emitter.emit(&["POPS", tmp1.as_str()]);
                self.emitter.emit(&["CONCAT", tmp3.as_str(), tmp1.as_str(), tmp2.as_str()]);
                self.emitter.emit(&["PUSHS", tmp3.as_str()]);
                Ok(Operand { ty: Type::Str, codename: tmp3, is_int_literal: false, line, column })
            }
            OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::Div => {
                let (_, result_is_double) = self.promote_if_needed(&a, &b);
                if !result_is_double && !(a.ty == Type::Int && b.ty == Type::Int) {
                    return Err(CompileError::ty(
                        line,
                        column,
                        format!("incompatible operand types {} and {}", a.ty, b.ty),
                    ));
                }
                let mnemonic = match op {
                    OpKind::Add => "ADDS",
                    OpKind::Sub => "SUBS",
                    OpKind::Mul => "MULS",
                    OpKind::Div => {
                        if result_is_double {
                            "DIVS"
                        } else {
                            "IDIVS"
                        }
                    }
                    _ => unreachable!(),
                };
                self.emitter.emit(&[mnemonic]);
                Ok(Operand {
                    ty: if result_is_double { Type::Double } else { Type::Int },
                    codename: String::new(),
                    is_int_literal: a.is_int_literal && b.is_int_literal,
                    line,
                    column,
                })
            }
            OpKind::Lt | OpKind::Gt | OpKind::Le | OpKind::Ge => {
                let numeric = a.ty.is_numeric() && b.ty.is_numeric();
                let stringy = a.ty == Type::Str && b.ty == Type::Str;
                if !numeric && !stringy {
                    return Err(CompileError::ty(
                        line,
                        column,
                        format!("cannot compare {} and {}", a.ty, b.ty),
                    ));
                }
                let result_is_double = if numeric { self.promote_if_needed(&a, &b).1 } else { false };
                if numeric && !result_is_double && !(a.ty == Type::Int && b.ty == Type::Int) {
                    return Err(CompileError::ty(
                        line,
                        column,
                        format!("incompatible operand types {} and {}", a.ty, b.ty),
                    ));
                }
                match op {
                    OpKind::Lt => self.emitter.emit(&["LTS"]),
                    OpKind::Gt => self.emitter.emit(&["GTS"]),
                    OpKind::Le => {
                        self.emitter.emit(&["GTS"]);
                        self.emitter.emit(&["NOTS"]);
                    }
                    OpKind::Ge => {
                        self.emitter.emit(&["LTS"]);
                        self.emitter.emit(&["NOTS"]);
                    }
                    _ => unreachable!(),
                }
                Ok(Operand { ty: Type::Bool, codename: String::new(), is_int_literal: false, line, column })
            }
            OpKind::EqEq | OpKind::NotEq => {
                let numeric = a.ty.is_numeric() && b.ty.is_numeric();
                let promoted = if numeric { self.promote_if_needed(&a, &b).0 } else { false };
                let same_base = a.ty.base() == b.ty.base();
                if !same_base && !promoted {
                    return Err(CompileError::ty(
                        line,
                        column,
                        format!("cannot compare {} and {}", a.ty, b.ty),
                    ));
                }
                self.emitter.emit(&["EQS"]);
                if op == OpKind::NotEq {
                    self.emitter.emit(&["NOTS"]);
                }
                Ok(Operand { ty: Type::Bool, codename: String::new(), is_int_literal: false, line, column })
            }
            OpKind::Coalesce => unreachable!("handled above"),
        }
    }

    fn reduce_coalesce(&mut self, a: Operand, b: Operand, line: u32, column: u32) -> Result<Operand, CompileError> {
        if !a.ty.is_optional() && a.ty != Type::Nil {
            return Err(CompileError::ty(line, column, "left side of '??' must be optional"));
        }
        if b.ty.is_optional() || b.ty == Type::Nil {
            return Err(CompileError::ty(line, column, "right side of '??' must not be optional or nil"));
        }
        let base = a.ty.base();
        if base != Type::Unknown && b.ty != base && !(b.is_int_literal && b.ty == Type::Int && types::double_target(base))
        {
            return Err(CompileError::ty(
                line,
                column,
                format!("'??' operand types {} and {} do not match", a.ty, b.ty),
            ));
        }

        let tmp1 = format!("GF@{TMP1}");
        let tmp2 = format!("GF@{TMP2}");
        self.emitter.emit(&["POPS", tmp2.as_str()]);
        self.emitter.emit(&["POPS", tmp1.as_str()]);
        if b.is_int_literal && b.ty == Type::Int && base == Type::Double {
            self.emitter.emit(&["INT2FLOAT", tmp2.as_str(), tmp2.as_str()]);
        }
        let nil_label = self.emitter.new_label("coalesce", "nil");
        let end_label = self.emitter.new_label("coalesce", "end");
        self.emitter.emit(&["JUMPIFEQ", nil_label.as_str(), tmp1.as_str(), "nil@nil"]);
        self.emitter.emit(&["PUSHS", tmp1.as_str()]);
        self.emitter.emit(&["JUMP", end_label.as_str()]);
        self.emitter.emit(&["LABEL", nil_label.as_str()]);
        self.emitter.emit(&["PUSHS", tmp2.as_str()]);
        self.emitter.emit(&["LABEL", end_label.as_str()]);
        Ok(Operand { ty: base, codename: String::new(), is_int_literal: false, line, column })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::token::Lexer;

    fn analyze(src: &str) -> (String, ExprResult, Token) {
        let lexer = Lexer::new(src);
        let mut c = Compiler::new(lexer, CompilerConfig::default());
        let result = c.parse_expression().expect("expression should analyze");
        let trailing = c.bump();
        (c.emitter.finish(), result, trailing)
    }

    #[test]
    fn additive_and_multiplicative_precedence() {
        let (program, result, _) = analyze("5 + 2 * 3");
        assert_eq!(result.ty, Type::Int);
        assert!(program.contains("PUSHS int@5"));
        assert!(program.contains("PUSHS int@2"));
        assert!(program.contains("PUSHS int@3"));
        assert!(program.contains("MULS"));
        assert!(program.contains("ADDS"));
    }

    #[test]
    fn string_concat_uses_concat_with_temps() {
        let (program, result, _) = analyze("\"a\" + \" b\"");
        assert_eq!(result.ty, Type::Str);
        assert!(program.contains("POPS GF@tmp2"));
        assert!(program.contains("POPS GF@tmp1"));
        assert!(program.contains("CONCAT GF@tmp3 GF@tmp1 GF@tmp2"));
        assert!(program.contains("PUSHS GF@tmp3"));
    }

    #[test]
    fn trailing_token_is_pushed_back() {
        let (_, _, trailing) = analyze("1 + 2 {");
        assert_eq!(trailing.kind, TokenKind::LBrace);
    }

    #[test]
    fn coalesce_is_right_associative_and_lowers_to_jumpifeq() {
        let (program, _, _) = analyze("nil ?? nil ?? 3");
        assert!(program.contains("JUMPIFEQ coalesce&nil1"));
        assert!(program.contains("JUMPIFEQ coalesce&nil2"));
    }

    #[test]
    fn two_adjacent_operands_is_a_syntax_error() {
        let lexer = Lexer::new("1 2");
        let mut c = Compiler::new(lexer, CompilerConfig::default());
        let err = c.parse_expression().unwrap_err();
        assert_eq!(err.code(), 2);
    }

    #[test]
    fn empty_expression_is_a_syntax_error() {
        let lexer = Lexer::new("}");
        let mut c = Compiler::new(lexer, CompilerConfig::default());
        let err = c.parse_expression().unwrap_err();
        assert_eq!(err.code(), 2);
    }
}
