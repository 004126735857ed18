pub mod ast;
pub mod codegen;
pub mod config;
pub mod driver;
pub mod ir;
pub mod lexer;
pub mod parser;
