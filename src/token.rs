//! Lexical scanner.
//!
//! The scanner is an external collaborator (§6 of the design): the core
//! cares only that it can pull one [`Token`] at a time and push exactly one
//! back. This module is kept small and undocumented beyond what the parser
//! and expression analyzer need from it.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    IntLit,
    DoubleLit,
    StringLit,
    KwNil,
    KwTrue,
    KwFalse,
    KwLet,
    KwVar,
    KwFunc,
    KwIf,
    KwElse,
    KwWhile,
    KwReturn,
    KwInt,
    KwDouble,
    KwString,
    KwBool,
    KwVoid,
    Arrow,   // ->
    Colon,
    Comma,
    Question,      // ?
    QuestionQuestion, // ??
    Bang,          // !
    Assign,        // =
    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Eof,
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: u32,
    pub column: u32,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: u32, column: u32) -> Self {
        Token { kind, lexeme: lexeme.into(), line, column }
    }
}

/// Pull-based token source: exactly one token of lookahead via pushback.
pub trait TokenSource {
    fn next_token(&mut self) -> Token;
    fn push_back(&mut self, token: Token);
}

/// Hand-rolled scanner over the whole source text.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    pushback: Option<Token>,
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("nil", TokenKind::KwNil),
    ("true", TokenKind::KwTrue),
    ("false", TokenKind::KwFalse),
    ("let", TokenKind::KwLet),
    ("var", TokenKind::KwVar),
    ("func", TokenKind::KwFunc),
    ("if", TokenKind::KwIf),
    ("else", TokenKind::KwElse),
    ("while", TokenKind::KwWhile),
    ("return", TokenKind::KwReturn),
    ("Int", TokenKind::KwInt),
    ("Double", TokenKind::KwDouble),
    ("String", TokenKind::KwString),
    ("Bool", TokenKind::KwBool),
    ("Void", TokenKind::KwVoid),
];

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer { chars: source.chars().collect(), pos: 0, line: 1, column: 1, pushback: None }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek() {
                            None => break,
                            Some('*') if self.peek_at(1) == Some('/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some(_) => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_string(&mut self, line: u32, column: u32) -> Token {
        // Opening quote already consumed by caller.
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return Token::new(TokenKind::Invalid, value, line, column),
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some('0') => value.push('\0'),
                    Some(other) => value.push(other),
                    None => return Token::new(TokenKind::Invalid, value, line, column),
                },
                Some(c) => value.push(c),
            }
        }
        Token::new(TokenKind::StringLit, value, line, column)
    }

    fn scan_number(&mut self, line: u32, column: u32) -> Token {
        let mut lexeme = String::new();
        let mut is_double = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                lexeme.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_double = true;
            lexeme.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    lexeme.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut lookahead = 1;
            if matches!(self.peek_at(lookahead), Some('+') | Some('-')) {
                lookahead += 1;
            }
            if self.peek_at(lookahead).is_some_and(|c| c.is_ascii_digit()) {
                is_double = true;
                lexeme.push(self.advance().unwrap());
                if matches!(self.peek(), Some('+') | Some('-')) {
                    lexeme.push(self.advance().unwrap());
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        lexeme.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
            }
        }
        let kind = if is_double { TokenKind::DoubleLit } else { TokenKind::IntLit };
        Token::new(kind, lexeme, line, column)
    }

    fn scan_ident(&mut self, line: u32, column: u32) -> Token {
        let mut lexeme = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                lexeme.push(c);
                self.advance();
            } else {
                break;
            }
        }
        for (kw, kind) in KEYWORDS {
            if *kw == lexeme {
                return Token::new(*kind, lexeme, line, column);
            }
        }
        Token::new(TokenKind::Ident, lexeme, line, column)
    }

    fn scan_one(&mut self) -> Token {
        self.skip_trivia();
        let (line, column) = (self.line, self.column);
        let c = match self.peek() {
            None => return Token::new(TokenKind::Eof, "", line, column),
            Some(c) => c,
        };

        if c == '"' {
            self.advance();
            return self.scan_string(line, column);
        }
        if c.is_ascii_digit() {
            return self.scan_number(line, column);
        }
        if c.is_alphabetic() || c == '_' {
            return self.scan_ident(line, column);
        }

        self.advance();
        match c {
            '(' => Token::new(TokenKind::LParen, "(", line, column),
            ')' => Token::new(TokenKind::RParen, ")", line, column),
            '{' => Token::new(TokenKind::LBrace, "{", line, column),
            '}' => Token::new(TokenKind::RBrace, "}", line, column),
            ':' => Token::new(TokenKind::Colon, ":", line, column),
            ',' => Token::new(TokenKind::Comma, ",", line, column),
            '+' => Token::new(TokenKind::Plus, "+", line, column),
            '-' => {
                if self.peek() == Some('>') {
                    self.advance();
                    Token::new(TokenKind::Arrow, "->", line, column)
                } else {
                    Token::new(TokenKind::Minus, "-", line, column)
                }
            }
            '*' => Token::new(TokenKind::Star, "*", line, column),
            '/' => Token::new(TokenKind::Slash, "/", line, column),
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::new(TokenKind::NotEq, "!=", line, column)
                } else {
                    Token::new(TokenKind::Bang, "!", line, column)
                }
            }
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::new(TokenKind::EqEq, "==", line, column)
                } else {
                    Token::new(TokenKind::Assign, "=", line, column)
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::new(TokenKind::Le, "<=", line, column)
                } else {
                    Token::new(TokenKind::Lt, "<", line, column)
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::new(TokenKind::Ge, ">=", line, column)
                } else {
                    Token::new(TokenKind::Gt, ">", line, column)
                }
            }
            '?' => {
                if self.peek() == Some('?') {
                    self.advance();
                    Token::new(TokenKind::QuestionQuestion, "??", line, column)
                } else {
                    Token::new(TokenKind::Question, "?", line, column)
                }
            }
            other => Token::new(TokenKind::Invalid, other.to_string(), line, column),
        }
    }
}

impl TokenSource for Lexer {
    fn next_token(&mut self) -> Token {
        if let Some(tok) = self.pushback.take() {
            return tok;
        }
        self.scan_one()
    }

    fn push_back(&mut self, token: Token) {
        debug_assert!(self.pushback.is_none(), "lexer pushback only holds one token");
        self.pushback = Some(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lx = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let t = lx.next_token();
            if t.kind == TokenKind::Eof {
                break;
            }
            out.push(t.kind);
        }
        out
    }

    #[test]
    fn scans_keywords_and_punctuation() {
        assert_eq!(
            kinds("let x : Int? = nil"),
            vec![
                TokenKind::KwLet,
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::KwInt,
                TokenKind::Question,
                TokenKind::Assign,
                TokenKind::KwNil,
            ]
        );
    }

    #[test]
    fn scans_double_and_coalesce() {
        assert_eq!(
            kinds("1.5 ?? 2"),
            vec![TokenKind::DoubleLit, TokenKind::QuestionQuestion, TokenKind::IntLit]
        );
    }

    #[test]
    fn pushback_returns_same_token() {
        let mut lx = Lexer::new("a b");
        let a = lx.next_token();
        let b = lx.next_token();
        lx.push_back(b.clone());
        let b_again = lx.next_token();
        assert_eq!(b, b_again);
        assert_eq!(a.lexeme, "a");
    }

    #[test]
    fn invalid_character_is_flagged() {
        let mut lx = Lexer::new("@");
        assert_eq!(lx.next_token().kind, TokenKind::Invalid);
    }

    #[test]
    fn string_literal_handles_escapes() {
        let mut lx = Lexer::new("\"a\\nb\"");
        let t = lx.next_token();
        assert_eq!(t.kind, TokenKind::StringLit);
        assert_eq!(t.lexeme, "a\nb");
    }
}
