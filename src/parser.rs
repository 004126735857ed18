use std::collections::HashMap;

use tracing::debug;

use crate::ast::{Expression, Function, Prototype};
use crate::lexer::{Lexer, Token};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error("unknown token when expecting an expression, found {}", describe_token(.0))]
    UnknownToken(Token),
    #[error("expected ')'")]
    ExpectedCloseParen,
    #[error("expected ')' or ',' in argument list")]
    ExpectedArgumentDelimiter,
    #[error("expected function name in prototype")]
    ExpectedFunctionName,
    #[error("expected '(' in prototype")]
    ExpectedPrototypeOpenParen,
    #[error("expected ')' in prototype")]
    ExpectedPrototypeCloseParen,
}

fn describe_token(token: &Token) -> String {
    match token {
        Token::Eof => "end of input".to_string(),
        other => format!("'{}'", other),
    }
}

pub type PartialParseResult = Result<Expression, ParserError>;

/// Binding strength of each binary operator. Higher binds tighter.
#[derive(Debug, Clone, PartialEq)]
pub struct BinopPrecedence(HashMap<char, i32>);

impl std::default::Default for BinopPrecedence {
    fn default() -> Self {
        let mut operator_precedence = HashMap::new();
        operator_precedence.insert('<', 10);
        operator_precedence.insert('+', 20);
        operator_precedence.insert('-', 20);
        operator_precedence.insert('*', 40);
        Self(operator_precedence)
    }
}

impl BinopPrecedence {
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, op: char, precedence: i32) {
        self.0.insert(op, precedence);
    }

    /// `None` unless `op` is a binary operator with positive precedence.
    pub fn get(&self, op: char) -> Option<i32> {
        self.0.get(&op).copied().filter(|&prec| prec > 0)
    }
}

/// A parsing session: the lexer, its current token and the operator table.
pub struct Parser<I> {
    lexer: Lexer<I>,
    current: Token,
    operator_precedence: BinopPrecedence,
}

impl<I: Iterator<Item = char>> Parser<I> {
    /// Creates a session and reads the first token.
    pub fn new(chars: I, operator_precedence: BinopPrecedence) -> Self {
        let mut lexer = Lexer::new(chars);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            operator_precedence,
        }
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    /// Advances to the next token and returns the one that was current.
    pub fn next_token(&mut self) -> Token {
        let next = self.lexer.next_token();
        std::mem::replace(&mut self.current, next)
    }

    fn token_precedence(&self) -> i32 {
        match self.current {
            Token::Char(op) => self.operator_precedence.get(op).unwrap_or(-1),
            _ => -1,
        }
    }

    fn parse_number(&mut self, value: f64) -> PartialParseResult {
        self.next_token();
        Ok(Expression::Number(value))
    }

    fn parse_nested(&mut self) -> PartialParseResult {
        self.next_token();
        let res = self.parse_expression()?;
        if !self.current.is_char(')') {
            return Err(ParserError::ExpectedCloseParen);
        }
        self.next_token();
        Ok(res)
    }

    fn parse_identifier(&mut self, ident: String) -> PartialParseResult {
        self.next_token();
        if !self.current.is_char('(') {
            return Ok(Expression::Variable(ident));
        }

        self.next_token();
        let mut args = Vec::new();
        if !self.current.is_char(')') {
            loop {
                args.push(self.parse_expression()?);

                if self.current.is_char(')') {
                    break;
                }
                if !self.current.is_char(',') {
                    return Err(ParserError::ExpectedArgumentDelimiter);
                }
                self.next_token();
            }
        }
        self.next_token();

        Ok(Expression::Call(ident, args))
    }

    pub fn parse_primary(&mut self) -> PartialParseResult {
        match self.current.clone() {
            Token::Number(value) => self.parse_number(value),
            Token::Ident(ident) => self.parse_identifier(ident),
            Token::Char('(') => self.parse_nested(),
            other => Err(ParserError::UnknownToken(other)),
        }
    }

    fn parse_bin_rhs(&mut self, expr_precedence: i32, lhs: Expression) -> PartialParseResult {
        let mut result = lhs;

        loop {
            let (operator, precedence) = match self.current {
                Token::Char(op) => match self.operator_precedence.get(op) {
                    Some(pr) if pr >= expr_precedence => (op, pr),
                    _ => return Ok(result),
                },
                _ => return Ok(result),
            };
            self.next_token();

            let mut rhs = self.parse_primary()?;

            if precedence < self.token_precedence() {
                rhs = self.parse_bin_rhs(precedence + 1, rhs)?;
            }

            result = Expression::binary(operator, result, rhs);
        }
    }

    pub fn parse_expression(&mut self) -> PartialParseResult {
        let lhs = self.parse_primary()?;
        self.parse_bin_rhs(0, lhs)
    }

    /// `name '(' arg* ')'`, arguments separated by whitespace only.
    pub fn parse_prototype(&mut self) -> Result<Prototype, ParserError> {
        let name = match &self.current {
            Token::Ident(name) => name.clone(),
            _ => return Err(ParserError::ExpectedFunctionName),
        };
        self.next_token();

        if !self.current.is_char('(') {
            return Err(ParserError::ExpectedPrototypeOpenParen);
        }

        let mut args = Vec::new();
        self.next_token();
        while let Token::Ident(arg) = &self.current {
            args.push(arg.clone());
            self.next_token();
        }

        if !self.current.is_char(')') {
            return Err(ParserError::ExpectedPrototypeCloseParen);
        }
        self.next_token();

        Ok(Prototype { name, args })
    }

    pub fn parse_definition(&mut self) -> Result<Function, ParserError> {
        self.next_token();
        let prototype = self.parse_prototype()?;
        let body = self.parse_expression()?;
        debug!(name = %prototype.name, "parsed definition");
        Ok(Function { prototype, body })
    }

    pub fn parse_extern(&mut self) -> Result<Prototype, ParserError> {
        self.next_token();
        let prototype = self.parse_prototype()?;
        debug!(name = %prototype.name, "parsed extern");
        Ok(prototype)
    }

    pub fn parse_top_level_expr(&mut self) -> Result<Function, ParserError> {
        let body = self.parse_expression()?;
        debug!(%body, "parsed top-level expression");
        Ok(Function {
            prototype: Prototype::anonymous(),
            body,
        })
    }
}
