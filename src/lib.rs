//! parable - A bash parser producing canonical s-expressions
//!
//! This library parses bash source into a `Node` tree and renders every
//! node as an s-expression via `Node::to_sexp`. The `runner` module checks
//! `.tests` golden files against the parser.

pub mod ast;
pub mod parser;
pub mod runner;

pub use ast::types::*;
pub use parser::{parse, parse_with_options, ParseError, ParseErrorKind, ParseOptions, Parser};
