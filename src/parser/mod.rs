//! Parser module for bash scripts
//!
//! This module contains the lexer and the recursive descent parser that turn
//! bash source into the node tree defined in `crate::ast`.

pub mod types;
pub mod lexer;
pub mod scan;
pub mod arithmetic_primaries;
pub mod arithmetic_parser;
pub mod word_parser;
pub mod expansion_parser;
pub mod parser_substitution;
pub mod conditional_parser;
pub mod compound_parser;
pub mod command_parser;
pub mod parser;

// Re-exports
pub use lexer::{Lexer, Token, TokenType};
pub use parser::{parse, parse_with_options, ParseOptions, Parser};
pub(crate) use parser::parse_fragment;
pub use types::{ParseError, ParseErrorKind, ParseResult};
