//! Parser Types and Constants
//!
//! Shared types, flag sets, and lookup tables used across parser modules:
//! - `ParseError` and its matched-pair flavour
//! - Parser-state, `${...}` and matched-pair flag sets
//! - `QuoteState` (push/pop stack of quoting booleans)
//! - `SavedParserState` snapshots for speculative productions

use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

// Parser limits to prevent hangs and resource exhaustion
pub const MAX_INPUT_SIZE: usize = 10_000_000; // 10MB max input
pub const MAX_PARSER_DEPTH: usize = 200; // Max recursion depth for nested constructs

// =============================================================================
// ERRORS
// =============================================================================

/// Distinguishes a plain syntax violation from an unterminated delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    Syntax,
    /// Unterminated quote, expansion or bracket; `pos` is the opener.
    MatchedPair,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ParseError {
    pub message: String,
    pub pos: usize,
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line != 0 && self.pos != 0 {
            write!(
                f,
                "Parse error at line {}, position {}: {}",
                self.line, self.pos, self.message
            )
        } else if self.pos != 0 {
            write!(f, "Parse error at position {}: {}", self.pos, self.message)
        } else {
            write!(f, "Parse error: {}", self.message)
        }
    }
}

impl ParseError {
    pub fn new(message: impl Into<String>, pos: usize) -> Self {
        Self {
            message: message.into(),
            pos,
            line: 0,
            kind: ParseErrorKind::Syntax,
        }
    }

    pub fn matched_pair(message: impl Into<String>, pos: usize) -> Self {
        Self {
            message: message.into(),
            pos,
            line: 0,
            kind: ParseErrorKind::MatchedPair,
        }
    }

    pub fn is_matched_pair(&self) -> bool {
        self.kind == ParseErrorKind::MatchedPair
    }

    /// Fill in the 1-based line of `pos` unless a line is already set.
    pub fn locate(mut self, source: &[char]) -> Self {
        if self.line == 0 {
            let end = self.pos.min(source.len());
            self.line = 1 + source[..end].iter().filter(|&&c| c == '\n').count();
        }
        self
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

// =============================================================================
// FLAG SETS
// =============================================================================

// Parser state bits
pub const PST_CASEPAT: u32 = 0x1;
pub const PST_CMDSUBST: u32 = 0x2;
pub const PST_CASESTMT: u32 = 0x4;
pub const PST_CONDEXPR: u32 = 0x8;
pub const PST_COMPASSIGN: u32 = 0x10;
pub const PST_ARITH: u32 = 0x20;
pub const PST_HEREDOC: u32 = 0x40;
pub const PST_REGEXP: u32 = 0x80;
pub const PST_SUBSHELL: u32 = 0x200;
pub const PST_EOFTOKEN: u32 = 0x1000;

// Matched-pair scanner flags
pub const MP_NONE: u32 = 0;
pub const MP_DQUOTE: u32 = 0x1;
pub const MP_DOLBRACE: u32 = 0x2;
pub const MP_ARITH: u32 = 0x8;
pub const MP_ALLOWESC: u32 = 0x10;
pub const MP_EXTGLOB: u32 = 0x20;
pub const MP_ARRAYSUB: u32 = 0x80;

// Flags for skipping a matched pair over plain text
pub const SMP_LITERAL: u32 = 1;
pub const SMP_PAST_OPEN: u32 = 2;

/// Where inside `${...}` the scanner currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DolbraceState {
    #[default]
    None,
    Param,
    Op,
    Word,
    Quote,
    Quote2,
}

/// Word-reading mode for the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordContext {
    #[default]
    Normal,
    /// Operand of a `[[ ... ]]` test
    Cond,
    /// Right-hand side of `=~`
    Regex,
}

// =============================================================================
// QUOTE STATE
// =============================================================================

/// Single/double quoting booleans with a save stack for nested contexts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteState {
    pub single: bool,
    pub double: bool,
    stack: Vec<(bool, bool)>,
}

impl QuoteState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.stack.push((self.single, self.double));
        self.single = false;
        self.double = false;
    }

    pub fn pop(&mut self) {
        if let Some((single, double)) = self.stack.pop() {
            self.single = single;
            self.double = double;
        }
    }

    pub fn in_quotes(&self) -> bool {
        self.single || self.double
    }

    /// Whether the enclosing (saved) context was double-quoted.
    pub fn outer_double(&self) -> bool {
        self.stack.last().map(|&(_, double)| double).unwrap_or(false)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

// =============================================================================
// SAVED STATE
// =============================================================================

/// A here-document whose body has not been read yet
#[derive(Debug, Clone)]
pub struct PendingHeredoc {
    pub id: usize,
    pub delimiter: String,
    pub strip_tabs: bool,
    pub quoted: bool,
    pub start_pos: usize,
}

/// Snapshot taken before a nested or speculative production. The word flags
/// come back on every restore; the here-document fields are only rolled back
/// when the attempt is abandoned.
#[derive(Debug, Clone)]
pub struct SavedParserState {
    pub parser_state: u32,
    pub eof_token: Option<char>,
    pub depth: usize,
    pub word_context: WordContext,
    pub at_command_start: bool,
    pub in_array_literal: bool,
    pub in_assign_builtin: bool,
    pub pending_heredocs: Vec<PendingHeredoc>,
    /// Number of here-document slots allocated when the snapshot was taken
    pub heredoc_count: usize,
}

// =============================================================================
// CONSTANT TABLES
// =============================================================================

lazy_static::lazy_static! {
    /// Reserved words in bash
    pub static ref RESERVED_WORDS: HashSet<&'static str> = [
        "if", "then", "elif", "else", "fi", "while", "until", "for", "select",
        "do", "done", "case", "esac", "in", "function", "coproc",
    ].into_iter().collect();

    /// Unary test operators inside [[ ]]
    pub static ref COND_UNARY_OPS: HashSet<&'static str> = [
        "-a", "-b", "-c", "-d", "-e", "-f", "-g", "-h", "-k", "-p", "-r", "-s",
        "-t", "-u", "-w", "-x", "-G", "-L", "-N", "-O", "-S", "-z", "-n", "-o",
        "-v", "-R",
    ].into_iter().collect();

    /// Binary test operators inside [[ ]]
    pub static ref COND_BINARY_OPS: HashSet<&'static str> = [
        "==", "!=", "=~", "=", "<", ">", "-eq", "-ne", "-lt", "-le", "-gt",
        "-ge", "-nt", "-ot", "-ef",
    ].into_iter().collect();

    /// Keywords that start a compound command
    pub static ref COMPOUND_KEYWORDS: HashSet<&'static str> = [
        "while", "until", "for", "if", "case", "select",
    ].into_iter().collect();

    /// Builtins whose later words may be array assignments
    pub static ref ASSIGNMENT_BUILTINS: HashSet<&'static str> = [
        "alias", "declare", "typeset", "local", "export", "readonly", "eval", "let",
    ].into_iter().collect();

    /// Single-character ANSI-C escapes and the byte they produce
    pub static ref ANSI_C_ESCAPES: HashMap<char, u8> = [
        ('a', 0x07), ('b', 0x08), ('e', 0x1B), ('E', 0x1B), ('f', 0x0C),
        ('n', 0x0A), ('r', 0x0D), ('t', 0x09), ('v', 0x0B), ('\\', 0x5C),
        ('"', 0x22), ('?', 0x3F),
    ].into_iter().collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_variants() {
        let e = ParseError::new("boom", 0);
        assert_eq!(e.to_string(), "Parse error: boom");
        let e = ParseError::new("boom", 4);
        assert_eq!(e.to_string(), "Parse error at position 4: boom");
        let chars: Vec<char> = "a\nb\ncd".chars().collect();
        let e = ParseError::new("boom", 5).locate(&chars);
        assert_eq!(e.line, 3);
        assert_eq!(e.to_string(), "Parse error at line 3, position 5: boom");
    }

    #[test]
    fn test_matched_pair_kind() {
        let e = ParseError::matched_pair("unexpected EOF", 2);
        assert!(e.is_matched_pair());
        assert!(!ParseError::new("x", 2).is_matched_pair());
    }

    #[test]
    fn test_quote_state_push_pop() {
        let mut q = QuoteState::new();
        q.double = true;
        q.push();
        assert!(!q.in_quotes());
        assert!(q.outer_double());
        q.single = true;
        q.pop();
        assert!(q.double);
        assert!(!q.single);
        assert_eq!(q.depth(), 0);
        q.pop();
        assert_eq!(q.depth(), 0);
    }

    #[test]
    fn test_tables() {
        assert!(RESERVED_WORDS.contains("esac"));
        assert!(!RESERVED_WORDS.contains("time"));
        assert!(COND_BINARY_OPS.contains("=~"));
        assert_eq!(ANSI_C_ESCAPES.get(&'e'), Some(&0x1B));
    }
}
