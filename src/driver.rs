//! Read-eval-print loop over top-level items.
//!
//! The driver is the only place errors are recovered from: a parse error
//! skips one token, a code generation error drops the item, and the loop
//! carries on until end of input.

use std::io::{self, BufRead, Write};

use tracing::{debug, warn};

use crate::ast::ASTNode;
use crate::codegen::Codegen;
use crate::ir::IrBuilder;
use crate::lexer::Token;
use crate::parser::{Parser, ParserError};

/// Adapts a buffered reader into the character stream the lexer consumes,
/// pulling one line at a time so interactive input is handled as it arrives.
pub struct ReaderChars<R> {
    reader: R,
    pending: Vec<char>,
}

impl<R: BufRead> ReaderChars<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for ReaderChars<R> {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        if self.pending.is_empty() {
            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => self.pending = line.chars().rev().collect(),
                Err(err) => {
                    warn!(%err, "failed to read input");
                    return None;
                }
            }
        }
        self.pending.pop()
    }
}

pub struct Driver<I, B: IrBuilder, W> {
    parser: Parser<I>,
    codegen: Codegen<B>,
    diagnostics: W,
    pub emit_ir: bool,
    pub interactive: bool,
}

impl<I, B, W> Driver<I, B, W>
where
    I: Iterator<Item = char>,
    B: IrBuilder,
    W: Write,
{
    pub fn new(parser: Parser<I>, codegen: Codegen<B>, diagnostics: W) -> Self {
        Self {
            parser,
            codegen,
            diagnostics,
            emit_ir: true,
            interactive: false,
        }
    }

    pub fn into_parts(self) -> (Codegen<B>, W) {
        (self.codegen, self.diagnostics)
    }

    fn report_parse_error(&mut self, err: ParserError) -> io::Result<()> {
        writeln!(self.diagnostics, "Error: {}", err)?;
        // skip token for error recovery
        let skipped = self.parser.next_token();
        debug!(%skipped, "skipped token after parse error");
        Ok(())
    }

    fn generate(&mut self, node: &ASTNode) -> io::Result<Option<B::Function>> {
        match self.codegen.codegen(node) {
            Ok(func) => {
                if self.emit_ir {
                    writeln!(self.diagnostics, "{}", self.codegen.builder.print_function(&func))?;
                }
                Ok(Some(func))
            }
            Err(err) => {
                writeln!(self.diagnostics, "Error: {}", err)?;
                Ok(None)
            }
        }
    }

    pub fn handle_definition(&mut self) -> io::Result<()> {
        match self.parser.parse_definition() {
            Ok(func) => {
                writeln!(self.diagnostics, "Parsed a function definition.")?;
                self.generate(&ASTNode::Function(func))?;
                Ok(())
            }
            Err(err) => self.report_parse_error(err),
        }
    }

    pub fn handle_extern(&mut self) -> io::Result<()> {
        match self.parser.parse_extern() {
            Ok(proto) => {
                writeln!(self.diagnostics, "Parsed an extern.")?;
                self.generate(&ASTNode::Extern(proto))?;
                Ok(())
            }
            Err(err) => self.report_parse_error(err),
        }
    }

    pub fn handle_top_level_expression(&mut self) -> io::Result<()> {
        match self.parser.parse_top_level_expr() {
            Ok(func) => {
                writeln!(self.diagnostics, "Parsed a top-level expression.")?;
                if let Some(anon) = self.generate(&ASTNode::Function(func))? {
                    self.codegen.builder.remove_function(anon);
                }
                Ok(())
            }
            Err(err) => self.report_parse_error(err),
        }
    }

    /// Handles top-level items until end of input.
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            if self.interactive {
                write!(self.diagnostics, "ready> ")?;
                self.diagnostics.flush()?;
            }
            match self.parser.current() {
                Token::Eof => break,
                Token::Char(';') => {
                    self.parser.next_token();
                }
                Token::Def => self.handle_definition()?,
                Token::Extern => self.handle_extern()?,
                _ => self.handle_top_level_expression()?,
            }
        }

        if self.interactive {
            writeln!(self.diagnostics)?;
        }
        if self.emit_ir {
            write!(self.diagnostics, "{}", self.codegen.builder.print_module())?;
        }
        Ok(())
    }
}
