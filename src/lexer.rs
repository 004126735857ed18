use std::fmt;

use tracing::{trace, warn};

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Eof,
    Def,
    Extern,
    Ident(String),
    Number(f64),
    Char(char),
}

impl Token {
    pub fn is_char(&self, c: char) -> bool {
        *self == Token::Char(c)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => Ok(()),
            Token::Def => write!(f, "def"),
            Token::Extern => write!(f, "extern"),
            Token::Ident(name) => write!(f, "{}", name),
            Token::Number(value) => write!(f, "{}", value),
            Token::Char(c) => write!(f, "{}", c),
        }
    }
}

/// Streaming tokenizer over a character source.
///
/// Holds exactly one character of lookahead between calls; `None` means the
/// source is exhausted.
pub struct Lexer<I> {
    chars: I,
    last_char: Option<char>,
}

impl<I: Iterator<Item = char>> Lexer<I> {
    pub fn new(chars: I) -> Self {
        Self {
            chars,
            last_char: Some(' '),
        }
    }

    fn advance(&mut self) {
        self.last_char = self.chars.next();
    }

    fn take_while(&mut self, first: char, pred: impl Fn(char) -> bool) -> String {
        let mut text = first.to_string();
        self.advance();
        while let Some(c) = self.last_char.filter(|&c| pred(c)) {
            text.push(c);
            self.advance();
        }
        text
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            while self.last_char.map_or(false, char::is_whitespace) {
                self.advance();
            }

            let c = match self.last_char {
                Some(c) => c,
                None => return Token::Eof,
            };

            let token = if c.is_ascii_alphabetic() {
                let ident = self.take_while(c, |c| c.is_ascii_alphanumeric());
                match ident.as_str() {
                    "def" => Token::Def,
                    "extern" => Token::Extern,
                    _ => Token::Ident(ident),
                }
            } else if c.is_ascii_digit() || c == '.' {
                let text = self.take_while(c, |c| c.is_ascii_digit() || c == '.');
                Token::Number(parse_number(&text))
            } else if c == '#' {
                while !matches!(self.last_char, None | Some('\n') | Some('\r')) {
                    self.advance();
                }
                continue;
            } else {
                self.advance();
                Token::Char(c)
            };

            trace!(%token, "lexed token");
            return token;
        }
    }
}

/// Reads a `[0-9.]+` run as `f64`.
///
/// Everything from the second `.` on is ignored, and a prefix that still does
/// not parse (a lone `.`) reads as zero.
pub fn parse_number(text: &str) -> f64 {
    let end = text
        .char_indices()
        .filter(|&(_, c)| c == '.')
        .nth(1)
        .map_or(text.len(), |(i, _)| i);
    let value = text[..end].parse().unwrap_or(0.0);
    if end != text.len() {
        warn!(literal = text, value, "malformed number literal truncated");
    }
    value
}

/// lex a whole string, up to and including the end of input token
pub fn lex(input: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(input.chars());
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token == Token::Eof;
        tokens.push(token);
        if done {
            return tokens;
        }
    }
}
