//! Tokenizer and recursive-descent parser for path expressions

use super::ast::{BinaryOp, Expr};
use crate::error::{Error, Result};
use serde_json::Value;

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Str(String),
    Num(f64),
    /// `$`, `$$` or `$name`
    Dollar(String),
    Dot,
    Comma,
    Colon,
    Question,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Amp,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '@'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '@'
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let err = |msg: String| Error::expression(source, msg);

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '.' => tokens.push(Token::Dot),
            ',' => tokens.push(Token::Comma),
            ':' => tokens.push(Token::Colon),
            '?' => tokens.push(Token::Question),
            '[' => tokens.push(Token::LBracket),
            ']' => tokens.push(Token::RBracket),
            '{' => tokens.push(Token::LBrace),
            '}' => tokens.push(Token::RBrace),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '&' => tokens.push(Token::Amp),
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            '%' => tokens.push(Token::Percent),
            '=' => {
                // Accept `==` as a synonym for `=`
                if chars.get(i + 1) == Some(&'=') {
                    i += 1;
                }
                tokens.push(Token::Eq);
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 1;
                    tokens.push(Token::Ne);
                } else {
                    return Err(err(format!("unexpected '!' at position {i}")));
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 1;
                    tokens.push(Token::Lte);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 1;
                    tokens.push(Token::Gte);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    let Some(&ch) = chars.get(i) else {
                        return Err(err("unterminated string literal".to_string()));
                    };
                    if ch == quote {
                        break;
                    }
                    if ch == '\\' {
                        i += 1;
                        match chars.get(i) {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(&other) => s.push(other),
                            None => return Err(err("unterminated escape".to_string())),
                        }
                    } else {
                        s.push(ch);
                    }
                    i += 1;
                }
                tokens.push(Token::Str(s));
            }
            '`' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == '`')
                    .ok_or_else(|| err("unterminated quoted name".to_string()))?;
                tokens.push(Token::Name(chars[start..start + end].iter().collect()));
                i = start + end;
            }
            '$' => {
                if chars.get(i + 1) == Some(&'$') {
                    i += 1;
                    tokens.push(Token::Dollar("$".to_string()));
                } else {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && is_name_char(chars[end]) {
                        end += 1;
                    }
                    tokens.push(Token::Dollar(chars[start..end].iter().collect()));
                    i = end - 1;
                }
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i + 1 < chars.len()
                    && (chars[i + 1].is_ascii_digit()
                        || (chars[i + 1] == '.'
                            && chars.get(i + 2).is_some_and(char::is_ascii_digit)))
                {
                    i += 1;
                }
                let text: String = chars[start..=i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|e| err(format!("invalid number '{text}': {e}")))?;
                tokens.push(Token::Num(n));
            }
            c if is_name_start(c) => {
                let start = i;
                while i + 1 < chars.len() && is_name_char(chars[i + 1]) {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..=i].iter().collect()));
            }
            other => {
                return Err(err(format!("unexpected character '{other}' at position {i}")));
            }
        }
        i += 1;
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

/// Parse an expression string into an AST
pub fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(Error::expression(source, "empty expression"));
    }

    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let expr = parser.expression()?;
    if let Some(tok) = parser.peek() {
        return Err(parser.error(format!("unexpected trailing token {tok:?}")));
    }
    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {expected:?}, found {:?}", self.peek())))
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n == keyword)
    }

    fn error(&self, message: String) -> Error {
        Error::expression(self.source, message)
    }

    fn expression(&mut self) -> Result<Expr> {
        let cond = self.or()?;
        if self.eat(&Token::Question) {
            let then = self.expression()?;
            let otherwise = if self.eat(&Token::Colon) {
                Some(Box::new(self.expression()?))
            } else {
                None
            };
            return Ok(Expr::Condition(Box::new(cond), Box::new(then), otherwise));
        }
        Ok(cond)
    }

    fn or(&mut self) -> Result<Expr> {
        let mut lhs = self.and()?;
        while self.is_keyword("or") {
            self.pos += 1;
            let rhs = self.and()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut lhs = self.comparison()?;
        while self.is_keyword("and") {
            self.pos += 1;
            let rhs = self.comparison()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Lte) => BinaryOp::Lte,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Gte) => BinaryOp::Gte,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                Some(Token::Amp) => BinaryOp::Concat,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            let operand = self.unary()?;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        self.path()
    }

    /// A primary followed by any number of `.step` and `[expr]` suffixes
    fn path(&mut self) -> Result<Expr> {
        let mut lhs = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let step = self.primary()?;
                lhs = Expr::Child(Box::new(lhs), Box::new(step));
            } else if self.eat(&Token::LBracket) {
                let index = self.expression()?;
                self.expect(&Token::RBracket)?;
                lhs = Expr::Subscript(Box::new(lhs), Box::new(index));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expr::Literal(number_literal(n))),
            Some(Token::Star) => Ok(Expr::Wildcard),
            Some(Token::Dollar(name)) => match name.as_str() {
                "" => Ok(Expr::Context),
                "$" => Ok(Expr::Root),
                _ => {
                    if self.peek() == Some(&Token::LParen) {
                        self.call(name)
                    } else {
                        Err(self.error(format!("unknown variable '${name}'")))
                    }
                }
            },
            Some(Token::Name(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    return self.call(name);
                }
                match name.as_str() {
                    "true" => Ok(Expr::Literal(Value::Bool(true))),
                    "false" => Ok(Expr::Literal(Value::Bool(false))),
                    "null" => Ok(Expr::Literal(Value::Null)),
                    _ => Ok(Expr::Name(name)),
                }
            }
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBrace) => self.object(),
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.expression()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                Ok(Expr::Array(items))
            }
            other => Err(self.error(format!("unexpected token {other:?}"))),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.expression()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma)?;
            }
        }
        Ok(Expr::Call(name, args))
    }

    fn object(&mut self) -> Result<Expr> {
        let mut fields = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(Expr::Object(fields));
        }
        loop {
            let key = match self.next() {
                Some(Token::Str(s) | Token::Name(s)) => s,
                other => {
                    return Err(self.error(format!("expected object key, found {other:?}")));
                }
            };
            self.expect(&Token::Colon)?;
            let value = self.expression()?;
            fields.push((key, value));
            if self.eat(&Token::RBrace) {
                return Ok(Expr::Object(fields));
            }
            self.expect(&Token::Comma)?;
        }
    }
}

/// Integral literals stay integers so they compare equal to integer JSON
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn number_literal(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
}
