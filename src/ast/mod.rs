//! Abstract Syntax Tree (AST) for Bash
//!
//! - `types`: the `Node` tree produced by the parser
//! - `sexp`: canonical s-expression rendering
//! - `word_format`: normalization applied to word text before rendering
//! - `cmdsub_format`: re-rendering of parsed command substitutions as shell text

pub mod types;
mod sexp;
mod word_format;
mod cmdsub_format;

pub use cmdsub_format::format_cmdsub_node;
pub use types::*;
