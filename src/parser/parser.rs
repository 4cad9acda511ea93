//! Recursive Descent Parser for Bash Scripts
//!
//! The parser walks the source with its own cursor and pulls tokens from the
//! lexer on demand. Grammar (simplified):
//!   script       ::= list (newline list)*
//!   list         ::= pipeline ((&&|'||'|;|&|newline) pipeline)*
//!   pipeline     ::= [time [-p]] [!] command ((| | |&) command)*
//!   command      ::= compound_command | function_def | simple_command
//!   compound_cmd ::= ( list ) | { list; } | (( expr )) | [[ expr ]]
//!                  | if | while | until | for | select | case | coproc
//!
//! Speculative productions save the parser state, try, and restore on
//! failure; the lexer's token cache is keyed by position and word flags so a
//! rewind never serves a stale token.

use std::collections::HashMap;

use crate::ast::{ListNode, Node, NegationNode, OperatorNode, PipelineNode, TimeNode, WordNode};
use tracing::debug;

use super::lexer::{Lexer, Token, TokenType};
use super::parser_substitution::{SubstitutionKey, SubstitutionMemo};
use super::scan::{is_metachar, is_negation_boundary, is_whitespace, is_word_end_context};
use super::types::{
    ParseError, ParseResult, PendingHeredoc, SavedParserState, WordContext, MAX_INPUT_SIZE,
    MAX_PARSER_DEPTH, PST_EOFTOKEN, RESERVED_WORDS,
};

/// Options accepted by [`parse_with_options`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Recognise `?(...)`, `*(...)`, `+(...)`, `@(...)` and `!(...)` patterns
    pub extglob: bool,
    /// Limit on nested lists, substitutions and bracketed groups
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            extglob: false,
            max_depth: MAX_PARSER_DEPTH,
        }
    }
}

pub struct Parser {
    pub(super) chars: Vec<char>,
    pub(super) pos: usize,
    pub(super) lexer: Lexer,
    pub(super) extglob: bool,
    pub(super) in_process_sub: bool,
    pub(super) parser_state: u32,
    pub(super) eof_token: Option<char>,
    pub(super) word_context: WordContext,
    pub(super) at_command_start: bool,
    pub(super) in_array_literal: bool,
    pub(super) in_assign_builtin: bool,
    pub(super) pending_heredocs: Vec<PendingHeredoc>,
    /// Here-document bodies indexed by `HereDocNode::id`
    pub(super) heredoc_bodies: Vec<Option<String>>,
    /// End of here-document text consumed on behalf of a backtick command
    pub(super) cmdsub_heredoc_end: Option<usize>,
    pub(super) saw_newline_in_single_quote: bool,
    pub(super) depth: usize,
    pub(super) max_depth: usize,
    /// Substitutions already parsed, so re-reading a word does not parse
    /// its `$(...)` bodies again
    pub(super) substitutions: HashMap<SubstitutionKey, SubstitutionMemo>,
}

impl Parser {
    pub fn new(source: &str, in_process_sub: bool, extglob: bool) -> Self {
        let chars: Vec<char> = source.chars().collect();
        Self {
            lexer: Lexer::new(chars.clone(), extglob),
            chars,
            pos: 0,
            extglob,
            in_process_sub,
            parser_state: 0,
            eof_token: None,
            word_context: WordContext::Normal,
            at_command_start: false,
            in_array_literal: false,
            in_assign_builtin: false,
            pending_heredocs: Vec::new(),
            heredoc_bodies: Vec::new(),
            cmdsub_heredoc_end: None,
            saw_newline_in_single_quote: false,
            depth: 0,
            max_depth: MAX_PARSER_DEPTH,
            substitutions: HashMap::new(),
        }
    }

    /// Parser for text extracted from this one (backticks, `$(( $(..) ))`,
    /// process substitutions in `${...}`); shares the nesting budget.
    pub(super) fn nested_parser(&self, source: &str, in_process_sub: bool) -> Parser {
        let mut sub = Parser::new(source, in_process_sub, self.extglob);
        sub.depth = self.depth;
        sub.max_depth = self.max_depth;
        sub
    }

    /// Parse a list from a nested parser and fill in its here-documents
    pub(super) fn parse_nested_list(&mut self) -> ParseResult<Option<Node>> {
        let mut node = self.parse_list(true)?;
        if self.at_end() && !self.pending_heredocs.is_empty() {
            self.gather_heredoc_bodies();
        }
        if let Some(n) = node.as_mut() {
            n.resolve_heredocs(&self.heredoc_bodies);
        }
        Ok(node)
    }

    // =========================================================================
    // CURSOR
    // =========================================================================

    pub(super) fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub(super) fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub(super) fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    pub(super) fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    pub(super) fn advance_into(&mut self, out: &mut String) {
        if let Some(c) = self.advance() {
            out.push(c);
        }
    }

    pub(super) fn slice(&self, start: usize, end: usize) -> String {
        let end = end.min(self.chars.len());
        if start >= end {
            return String::new();
        }
        self.chars[start..end].iter().collect()
    }

    pub(super) fn starts_with(&self, prefix: &str) -> bool {
        super::scan::starts_with_at(&self.chars, self.pos, prefix)
    }

    // =========================================================================
    // STATE
    // =========================================================================

    pub(super) fn set_state(&mut self, flag: u32) {
        self.parser_state |= flag;
    }

    pub(super) fn clear_state(&mut self, flag: u32) {
        self.parser_state &= !flag;
    }

    pub(super) fn in_state(&self, flag: u32) -> bool {
        self.parser_state & flag != 0
    }

    pub(super) fn save_state(&self) -> SavedParserState {
        SavedParserState {
            parser_state: self.parser_state,
            eof_token: self.eof_token,
            depth: self.depth,
            word_context: self.word_context,
            at_command_start: self.at_command_start,
            in_array_literal: self.in_array_literal,
            in_assign_builtin: self.in_assign_builtin,
            pending_heredocs: self.pending_heredocs.clone(),
            heredoc_count: self.heredoc_bodies.len(),
        }
    }

    pub(super) fn restore_state(&mut self, saved: &SavedParserState) {
        self.parser_state = saved.parser_state;
        self.eof_token = saved.eof_token;
        self.depth = saved.depth;
        self.word_context = saved.word_context;
        self.at_command_start = saved.at_command_start;
        self.in_array_literal = saved.in_array_literal;
        self.in_assign_builtin = saved.in_assign_builtin;
    }

    /// Undo the side effects of an abandoned attempt that began at `start`:
    /// here-documents it registered or gathered, and substitutions it cached
    pub(super) fn abandon_attempt(&mut self, saved: &SavedParserState, start: usize) {
        self.restore_state(saved);
        self.pending_heredocs = saved.pending_heredocs.clone();
        self.heredoc_bodies.truncate(saved.heredoc_count);
        for heredoc in &self.pending_heredocs {
            if let Some(slot) = self.heredoc_bodies.get_mut(heredoc.id) {
                *slot = None;
            }
        }
        self.substitutions.retain(|key, _| key.start < start);
        self.lexer.token_cache = None;
    }

    pub(super) fn enter_nesting(&mut self) -> ParseResult<()> {
        if self.depth >= self.max_depth {
            return Err(ParseError::new("Maximum nesting depth exceeded", self.pos));
        }
        self.depth += 1;
        Ok(())
    }

    pub(super) fn leave_nesting(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // =========================================================================
    // TOKENS
    // =========================================================================

    fn cache_matches(&self) -> bool {
        match &self.lexer.token_cache {
            Some(tok) => {
                tok.pos == self.pos
                    && self.lexer.cached_word_context == self.word_context
                    && self.lexer.cached_at_command_start == self.at_command_start
                    && self.lexer.cached_in_array_literal == self.in_array_literal
                    && self.lexer.cached_in_assign_builtin == self.in_assign_builtin
            }
            None => false,
        }
    }

    fn remember_cache_flags(&mut self) {
        self.lexer.cached_word_context = self.word_context;
        self.lexer.cached_at_command_start = self.at_command_start;
        self.lexer.cached_in_array_literal = self.in_array_literal;
        self.lexer.cached_in_assign_builtin = self.in_assign_builtin;
    }

    /// Push the parser cursor and word flags into the lexer, dropping a
    /// cached token that was read under different conditions
    pub(super) fn sync_lexer(&mut self) {
        if self.lexer.token_cache.is_some() && !self.cache_matches() {
            self.lexer.token_cache = None;
        }
        self.lexer.pos = self.pos;
        self.lexer.eof_token = self.eof_token;
        self.lexer.parser_state = self.parser_state;
        self.lexer.word_context = self.word_context;
        self.lexer.at_command_start = self.at_command_start;
        self.lexer.in_array_literal = self.in_array_literal;
        self.lexer.in_assign_builtin = self.in_assign_builtin;
    }

    pub(super) fn lex_peek_token(&mut self) -> ParseResult<Token> {
        if self.cache_matches() {
            if let Some(tok) = &self.lexer.token_cache {
                return Ok(tok.clone());
            }
        }
        let saved_pos = self.pos;
        self.sync_lexer();
        let tok = self.peek_token()?;
        self.remember_cache_flags();
        self.lexer.post_read_pos = self.lexer.pos;
        self.pos = saved_pos;
        Ok(tok)
    }

    pub(super) fn lex_next_token(&mut self) -> ParseResult<Token> {
        if self.cache_matches() {
            let tok = self.next_token()?;
            self.pos = self.lexer.post_read_pos;
            self.lexer.pos = self.lexer.post_read_pos;
            return Ok(tok);
        }
        self.sync_lexer();
        let tok = self.next_token()?;
        self.remember_cache_flags();
        self.pos = self.lexer.pos;
        Ok(tok)
    }

    fn peek_token(&mut self) -> ParseResult<Token> {
        if let Some(tok) = &self.lexer.token_cache {
            return Ok(tok.clone());
        }
        let tok = self.next_token()?;
        self.lexer.token_cache = Some(tok.clone());
        Ok(tok)
    }

    /// Next token at the lexer cursor, or the cached one
    fn next_token(&mut self) -> ParseResult<Token> {
        if let Some(tok) = self.lexer.token_cache.take() {
            return Ok(tok);
        }
        self.lexer.skip_blanks();
        if self.lexer.at_end() || self.lexer.at_eof_token() {
            return Ok(Token::eof(self.lexer.pos));
        }
        while self.lexer.skip_comment() {
            self.lexer.skip_blanks();
            if self.lexer.at_end() || self.lexer.at_eof_token() {
                return Ok(Token::eof(self.lexer.pos));
            }
        }
        if let Some(tok) = self.lexer.read_operator() {
            return Ok(tok);
        }
        if let Some(tok) = self.read_word()? {
            return Ok(tok);
        }
        Ok(Token::eof(self.lexer.pos))
    }

    fn lex_skip_blanks(&mut self) {
        self.sync_lexer();
        self.lexer.skip_blanks();
        self.pos = self.lexer.pos;
    }

    fn lex_skip_comment(&mut self) -> bool {
        self.sync_lexer();
        let skipped = self.lexer.skip_comment();
        self.pos = self.lexer.pos;
        skipped
    }

    pub(super) fn lex_is_command_terminator(&mut self) -> ParseResult<bool> {
        let tok = self.lex_peek_token()?;
        Ok(matches!(
            tok.token_type,
            TokenType::Eof
                | TokenType::Newline
                | TokenType::Pipe
                | TokenType::Semicolon
                | TokenType::LParen
                | TokenType::RParen
                | TokenType::Amp
        ))
    }

    pub(super) fn lex_peek_operator(&mut self) -> ParseResult<Option<TokenType>> {
        let tok = self.lex_peek_token()?;
        Ok(tok.token_type.is_operator().then_some(tok.token_type))
    }

    /// Reserved word (or `{ } [[ ]] ! time`) at the cursor, if any
    pub(super) fn lex_peek_reserved_word(&mut self) -> ParseResult<Option<String>> {
        let tok = self.lex_peek_token()?;
        if tok.token_type != TokenType::Word {
            return Ok(None);
        }
        let word = strip_escaped_newline(&tok.value);
        Ok(is_reserved(word).then(|| word.to_string()))
    }

    pub(super) fn lex_is_at_reserved_word(&mut self, word: &str) -> ParseResult<bool> {
        Ok(self.lex_peek_reserved_word()?.as_deref() == Some(word))
    }

    pub(super) fn lex_consume_word(&mut self, expected: &str) -> ParseResult<bool> {
        let tok = self.lex_peek_token()?;
        if tok.token_type != TokenType::Word || strip_escaped_newline(&tok.value) != expected {
            return Ok(false);
        }
        self.lex_next_token()?;
        Ok(true)
    }

    pub(super) fn lex_peek_case_terminator(&mut self) -> ParseResult<Option<&'static str>> {
        let tok = self.lex_peek_token()?;
        Ok(match tok.token_type {
            TokenType::DSemi => Some(";;"),
            TokenType::SemiAnd => Some(";&"),
            TokenType::SemiSemiAnd => Some(";;&"),
            _ => None,
        })
    }

    /// Syntax error positioned at the next token
    pub(super) fn error_at_token(&mut self, message: impl Into<String>) -> ParseError {
        match self.lex_peek_token() {
            Ok(tok) => ParseError::new(message, tok.pos),
            Err(e) => e,
        }
    }

    // =========================================================================
    // WHITESPACE
    // =========================================================================

    pub(super) fn skip_whitespace(&mut self) {
        while !self.at_end() {
            self.lex_skip_blanks();
            match self.peek() {
                None => break,
                Some('#') => {
                    if !self.lex_skip_comment() {
                        break;
                    }
                }
                Some('\\') if self.peek_at(1) == Some('\n') => self.pos += 2,
                Some(_) => break,
            }
        }
    }

    pub(super) fn skip_whitespace_and_newlines(&mut self) {
        while let Some(ch) = self.peek() {
            if is_whitespace(ch) {
                self.pos += 1;
                if ch == '\n' {
                    self.after_newline();
                }
            } else if ch == '#' {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.pos += 1;
                }
            } else if ch == '\\' && self.peek_at(1) == Some('\n') {
                self.pos += 2;
            } else {
                break;
            }
        }
    }

    /// Read pending here-document bodies after a newline and skip text a
    /// backtick command already claimed
    pub(super) fn after_newline(&mut self) {
        self.gather_heredoc_bodies();
        if let Some(end) = self.cmdsub_heredoc_end {
            if end > self.pos {
                self.pos = end;
                self.cmdsub_heredoc_end = None;
            }
        }
    }

    pub(super) fn is_bang_followed_by_procsub(&self) -> bool {
        matches!(self.peek_at(1), Some('<' | '>')) && self.peek_at(2) == Some('(')
    }

    fn at_list_terminating_bracket(&self) -> bool {
        let Some(ch) = self.peek() else {
            return false;
        };
        if self.eof_token == Some(ch) || ch == ')' {
            return true;
        }
        if ch == '}' {
            return self.peek_at(1).map_or(true, is_word_end_context);
        }
        false
    }

    fn at_eof_token(&mut self) -> ParseResult<bool> {
        let Some(eof) = self.eof_token else {
            return Ok(false);
        };
        let tok = self.lex_peek_token()?;
        Ok(match eof {
            ')' => tok.token_type == TokenType::RParen,
            '}' => tok.is_word("}"),
            _ => false,
        })
    }

    // =========================================================================
    // PIPELINES
    // =========================================================================

    pub(super) fn parse_pipeline(&mut self) -> ParseResult<Option<Node>> {
        self.enter_nesting()?;
        let result = self.parse_pipeline_inner();
        self.leave_nesting();
        result
    }

    fn parse_pipeline_inner(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        let mut timed = false;
        let mut posix = false;
        let mut negated = false;

        if self.lex_is_at_reserved_word("time")? {
            self.lex_consume_word("time")?;
            timed = true;
            self.skip_whitespace();
            posix |= self.consume_time_posix_flag();
            self.skip_whitespace();
            if self.starts_with("--") && self.peek_at(2).map_or(true, is_whitespace) {
                self.pos += 2;
                posix = true;
                self.skip_whitespace();
            }
            while self.lex_is_at_reserved_word("time")? {
                self.lex_consume_word("time")?;
                self.skip_whitespace();
                posix |= self.consume_time_posix_flag();
            }
            self.skip_whitespace();
            if self.at_negation_bang() {
                self.pos += 1;
                negated = true;
                self.skip_whitespace();
            }
        } else if self.at_negation_bang() {
            self.pos += 1;
            self.skip_whitespace();
            let inner = self.parse_pipeline()?;
            return Ok(Some(match inner {
                Some(Node::Negation(n)) => match n.pipeline {
                    Some(p) => *p,
                    None => Node::Command(Default::default()),
                },
                other => Node::Negation(NegationNode {
                    pipeline: other.map(Box::new),
                }),
            }));
        }

        let result = self.parse_simple_pipeline()?;
        if !timed {
            return Ok(result);
        }
        let time = Node::Time(TimeNode {
            pipeline: result.map(Box::new),
            posix,
        });
        Ok(Some(if negated {
            Node::Negation(NegationNode {
                pipeline: Some(Box::new(time)),
            })
        } else {
            time
        }))
    }

    /// `-p` after `time`, only when it stands alone
    fn consume_time_posix_flag(&mut self) -> bool {
        if self.peek() == Some('-')
            && self.peek_at(1) == Some('p')
            && self.peek_at(2).map_or(true, is_metachar)
        {
            self.pos += 2;
            return true;
        }
        false
    }

    fn at_negation_bang(&self) -> bool {
        self.peek() == Some('!')
            && self.peek_at(1).map_or(true, is_negation_boundary)
            && !self.is_bang_followed_by_procsub()
    }

    fn parse_simple_pipeline(&mut self) -> ParseResult<Option<Node>> {
        let Some(first) = self.parse_compound_command()? else {
            return Ok(None);
        };
        let mut commands = vec![first];
        loop {
            self.skip_whitespace();
            let op = self.lex_peek_operator()?;
            if !matches!(op, Some(TokenType::Pipe | TokenType::PipeAmp)) {
                break;
            }
            self.lex_next_token()?;
            self.skip_whitespace_and_newlines();
            if op == Some(TokenType::PipeAmp) {
                commands.push(Node::PipeBoth);
            }
            match self.parse_compound_command()? {
                Some(cmd) => commands.push(cmd),
                None => return Err(ParseError::new("Expected command after |", self.pos)),
            }
        }
        if commands.len() == 1 {
            return Ok(commands.pop());
        }
        Ok(Some(Node::Pipeline(PipelineNode { commands })))
    }

    // =========================================================================
    // LISTS
    // =========================================================================

    fn parse_list_operator(&mut self) -> ParseResult<Option<&'static str>> {
        self.skip_whitespace();
        let op = match self.lex_peek_operator()? {
            Some(TokenType::AndAnd) => "&&",
            Some(TokenType::OrOr) => "||",
            Some(TokenType::Semicolon) => ";",
            Some(TokenType::Amp) => "&",
            _ => return Ok(None),
        };
        self.lex_next_token()?;
        Ok(Some(op))
    }

    fn peek_list_operator(&mut self) -> ParseResult<Option<&'static str>> {
        let saved = self.pos;
        let op = self.parse_list_operator()?;
        self.pos = saved;
        Ok(op)
    }

    /// Pipelines joined by list operators. Newlines separate commands only
    /// when `newline_as_separator` is set.
    pub(super) fn parse_list(&mut self, newline_as_separator: bool) -> ParseResult<Option<Node>> {
        self.enter_nesting()?;
        let result = self.parse_list_inner(newline_as_separator);
        self.leave_nesting();
        result
    }

    fn parse_list_inner(&mut self, newline_as_separator: bool) -> ParseResult<Option<Node>> {
        if newline_as_separator {
            self.skip_whitespace_and_newlines();
        } else {
            self.skip_whitespace();
        }
        let Some(first) = self.parse_pipeline()? else {
            return Ok(None);
        };
        let mut parts = vec![first];
        if self.in_state(PST_EOFTOKEN) && self.at_eof_token()? {
            return Ok(Some(list_or_single(parts)));
        }
        loop {
            self.skip_whitespace();
            let op = match self.parse_list_operator()? {
                Some(op) => op,
                None => {
                    if self.peek() != Some('\n') || !newline_as_separator {
                        break;
                    }
                    self.pos += 1;
                    self.after_newline();
                    self.skip_whitespace_and_newlines();
                    if self.at_end() || self.at_list_terminating_bracket() {
                        break;
                    }
                    if matches!(self.peek_list_operator()?, Some("&" | ";")) {
                        break;
                    }
                    "\n"
                }
            };
            parts.push(operator(op));
            match op {
                "&&" | "||" => self.skip_whitespace_and_newlines(),
                "&" | ";" => {
                    self.skip_whitespace();
                    if self.at_end() || self.at_list_terminating_bracket() {
                        break;
                    }
                    if self.peek() == Some('\n') {
                        if !newline_as_separator {
                            break;
                        }
                        self.skip_whitespace_and_newlines();
                        if self.at_end() || self.at_list_terminating_bracket() {
                            break;
                        }
                    }
                }
                _ => {}
            }
            match self.parse_pipeline()? {
                Some(p) => parts.push(p),
                None => {
                    return Err(ParseError::new(
                        format!("Expected command after {}", op),
                        self.pos,
                    ))
                }
            }
            if self.in_state(PST_EOFTOKEN) && self.at_eof_token()? {
                break;
            }
        }
        Ok(Some(list_or_single(parts)))
    }

    fn at_list_until_terminator(&mut self, stop_words: &[&str]) -> ParseResult<bool> {
        match self.peek() {
            None | Some(')') => return Ok(true),
            Some('}') if self.peek_at(1).map_or(true, is_word_end_context) => return Ok(true),
            _ => {}
        }
        if let Some(word) = self.lex_peek_reserved_word()? {
            if stop_words.contains(&word.as_str()) {
                return Ok(true);
            }
        }
        Ok(self.lex_peek_case_terminator()?.is_some())
    }

    /// List that ends before one of `stop_words` (`then`, `do`, `fi`, ...)
    pub(super) fn parse_list_until(&mut self, stop_words: &[&str]) -> ParseResult<Option<Node>> {
        self.enter_nesting()?;
        let result = self.parse_list_until_inner(stop_words);
        self.leave_nesting();
        result
    }

    fn parse_list_until_inner(&mut self, stop_words: &[&str]) -> ParseResult<Option<Node>> {
        self.skip_whitespace_and_newlines();
        if let Some(word) = self.lex_peek_reserved_word()? {
            if stop_words.contains(&word.as_str()) {
                return Ok(None);
            }
        }
        let Some(first) = self.parse_pipeline()? else {
            return Ok(None);
        };
        let mut parts = vec![first];
        loop {
            self.skip_whitespace();
            let op = match self.parse_list_operator()? {
                Some(op) => op,
                None => {
                    if self.peek() != Some('\n') {
                        break;
                    }
                    self.pos += 1;
                    self.after_newline();
                    self.skip_whitespace_and_newlines();
                    if self.at_list_until_terminator(stop_words)? {
                        break;
                    }
                    if matches!(self.peek_list_operator()?, Some("&" | ";")) {
                        break;
                    }
                    "\n"
                }
            };
            match op {
                ";" => {
                    self.skip_whitespace_and_newlines();
                    if self.at_list_until_terminator(stop_words)? {
                        break;
                    }
                    parts.push(operator(op));
                }
                "&" => {
                    parts.push(operator(op));
                    self.skip_whitespace_and_newlines();
                    if self.at_list_until_terminator(stop_words)? {
                        break;
                    }
                }
                "&&" | "||" => {
                    parts.push(operator(op));
                    self.skip_whitespace_and_newlines();
                }
                _ => parts.push(operator(op)),
            }
            if self.at_list_until_terminator(stop_words)? {
                break;
            }
            match self.parse_pipeline()? {
                Some(p) => parts.push(p),
                None => {
                    return Err(ParseError::new(
                        format!("Expected command after {}", op),
                        self.pos,
                    ))
                }
            }
        }
        Ok(Some(list_or_single(parts)))
    }

    // =========================================================================
    // SCRIPT
    // =========================================================================

    fn parse_comment(&mut self) -> Option<Node> {
        if self.peek() != Some('#') {
            return None;
        }
        let start = self.pos;
        while self.peek().is_some_and(|c| c != '\n') {
            self.pos += 1;
        }
        Some(Node::Comment(crate::ast::CommentNode {
            text: self.slice(start, self.pos),
        }))
    }

    /// Parse the whole source into top-level nodes. Blank input yields a
    /// single `Empty` node.
    pub fn parse(&mut self) -> ParseResult<Vec<Node>> {
        if self.chars.iter().all(|c| c.is_whitespace()) {
            return Ok(vec![Node::Empty]);
        }
        loop {
            self.skip_whitespace();
            while self.peek() == Some('\n') {
                self.pos += 1;
            }
            if self.at_end() || self.parse_comment().is_none() {
                break;
            }
        }
        let mut results = Vec::new();
        while !self.at_end() {
            if let Some(node) = self.parse_list(false)? {
                results.push(node);
            }
            self.skip_whitespace();
            let mut found_newline = false;
            while self.peek() == Some('\n') {
                found_newline = true;
                self.pos += 1;
                self.after_newline();
                self.skip_whitespace();
            }
            if !found_newline && !self.at_end() {
                return Err(ParseError::new("Syntax error", self.pos));
            }
        }
        if results.is_empty() {
            return Ok(vec![Node::Empty]);
        }
        if self.saw_newline_in_single_quote && self.ends_with_lone_backslash() && results.len() < 2 {
            strip_trailing_backslash(&mut results);
        }
        // An operator on the last line has an empty body
        if !self.pending_heredocs.is_empty() {
            self.gather_heredoc_bodies();
        }
        for node in &mut results {
            node.resolve_heredocs(&self.heredoc_bodies);
        }
        Ok(results)
    }

    fn ends_with_lone_backslash(&self) -> bool {
        let n = self.chars.len();
        self.chars.last() == Some(&'\\')
            && !(n >= 3 && self.chars[n - 3] == '\\' && self.chars[n - 2] == '\n')
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn operator(op: &str) -> Node {
    Node::Operator(OperatorNode { op: op.to_string() })
}

fn list_or_single(mut parts: Vec<Node>) -> Node {
    if parts.len() == 1 {
        if let Some(only) = parts.pop() {
            return only;
        }
    }
    Node::List(ListNode { parts })
}

fn strip_escaped_newline(word: &str) -> &str {
    word.strip_suffix("\\\n").unwrap_or(word)
}

pub(super) fn is_reserved(word: &str) -> bool {
    RESERVED_WORDS.contains(word) || matches!(word, "{" | "}" | "[[" | "]]" | "!" | "time")
}

/// Drop a trailing backslash from the last word of the last node; a simple
/// command loses that word entirely when nothing else is left of it
fn strip_trailing_backslash(nodes: &mut [Node]) {
    let Some(last) = nodes.last_mut() else {
        return;
    };
    let emptied = match find_last_word(last) {
        Some(word) if word.value.ends_with('\\') => {
            word.value.pop();
            word.value.is_empty()
        }
        _ => false,
    };
    if emptied {
        if let Node::Command(cmd) = last {
            cmd.words.pop();
        }
    }
}

fn find_last_word(node: &mut Node) -> Option<&mut WordNode> {
    match node {
        Node::Word(w) => Some(w),
        Node::Command(cmd) => {
            let last_has_backslash = cmd.words.last().is_some_and(|w| w.value.ends_with('\\'));
            if last_has_backslash {
                return cmd.words.last_mut();
            }
            if matches!(cmd.redirects.last(), Some(Node::Redirect(_))) {
                return match cmd.redirects.last_mut() {
                    Some(Node::Redirect(r)) => Some(&mut r.target),
                    _ => None,
                };
            }
            cmd.words.last_mut()
        }
        Node::Pipeline(p) => p.commands.last_mut().and_then(find_last_word),
        Node::List(l) => l.parts.last_mut().and_then(find_last_word),
        _ => None,
    }
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// Parse bash source into top-level nodes
pub fn parse(source: &str, extglob: bool) -> Result<Vec<Node>, ParseError> {
    parse_with_options(
        source,
        &ParseOptions {
            extglob,
            ..ParseOptions::default()
        },
    )
}

/// Parse a fragment of already-parsed text, such as the body of a command
/// substitution being re-rendered. The flag reports whether the whole
/// fragment was consumed.
pub(crate) fn parse_fragment(source: &str) -> ParseResult<Option<(Node, bool)>> {
    let mut parser = Parser::new(source, false, false);
    let node = parser.parse_nested_list()?;
    Ok(node.map(|n| (n, parser.at_end())))
}

pub fn parse_with_options(source: &str, options: &ParseOptions) -> Result<Vec<Node>, ParseError> {
    if source.len() > MAX_INPUT_SIZE {
        return Err(ParseError::new(
            format!(
                "Input too large: {} bytes exceeds limit of {} bytes",
                source.len(),
                MAX_INPUT_SIZE
            ),
            0,
        ));
    }
    let mut parser = Parser::new(source, false, options.extglob);
    parser.max_depth = options.max_depth;
    match parser.parse() {
        Ok(nodes) => {
            debug!(nodes = nodes.len(), "parsed source");
            Ok(nodes)
        }
        Err(err) => {
            let err = err.locate(&parser.chars);
            debug!(pos = err.pos, line = err.line, message = %err.message, "parse failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CommandNode, HereDocNode};
    use std::time::{Duration, Instant};

    fn words(node: &Node) -> Vec<String> {
        match node {
            Node::Command(CommandNode { words, .. }) => {
                words.iter().map(|w| w.value.clone()).collect()
            }
            other => panic!("expected command, got {}", other.kind()),
        }
    }

    #[test]
    fn test_parse_empty_and_blank() {
        assert_eq!(parse("", false).unwrap(), vec![Node::Empty]);
        assert_eq!(parse("  \n\t ", false).unwrap(), vec![Node::Empty]);
        assert_eq!(parse("# only a comment\n", false).unwrap(), vec![Node::Empty]);
    }

    #[test]
    fn test_parse_simple_command() {
        let nodes = parse("echo hello world", false).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(words(&nodes[0]), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn test_parse_pipeline_with_pipe_both() {
        let nodes = parse("a |& b | c", false).unwrap();
        let Node::Pipeline(p) = &nodes[0] else {
            panic!("expected pipeline");
        };
        let kinds: Vec<&str> = p.commands.iter().map(Node::kind).collect();
        assert_eq!(kinds, vec!["command", "pipe-both", "command", "command"]);
    }

    #[test]
    fn test_parse_list_operators() {
        let nodes = parse("a && b || c; d &", false).unwrap();
        let Node::List(l) = &nodes[0] else {
            panic!("expected list");
        };
        let ops: Vec<&str> = l
            .parts
            .iter()
            .filter_map(|n| match n {
                Node::Operator(o) => Some(o.op.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ops, vec!["&&", "||", ";", "&"]);
    }

    #[test]
    fn test_newlines_split_top_level_nodes() {
        let nodes = parse("a\nb\n\nc", false).unwrap();
        assert_eq!(nodes.len(), 3);
    }

    #[test]
    fn test_double_negation_cancels() {
        let nodes = parse("! ! true", false).unwrap();
        assert_eq!(words(&nodes[0]), vec!["true"]);
        let nodes = parse("! true", false).unwrap();
        assert_eq!(nodes[0].kind(), "negation");
    }

    #[test]
    fn test_time_posix_and_negation() {
        let nodes = parse("time -p ! cmd", false).unwrap();
        let Node::Negation(n) = &nodes[0] else {
            panic!("expected negation");
        };
        match n.pipeline.as_deref() {
            Some(Node::Time(t)) => assert!(t.posix),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_command_after_operator() {
        let err = parse("a &&", false).unwrap_err();
        assert!(err.message.contains("Expected command after &&"));
        let err = parse("a | ", false).unwrap_err();
        assert_eq!(err.message, "Expected command after |");
    }

    #[test]
    fn test_nesting_limit() {
        let options = ParseOptions {
            extglob: false,
            max_depth: 8,
        };
        let deep = format!("{}x{}", "$(".repeat(20), ")".repeat(20));
        let err = parse_with_options(&deep, &options).unwrap_err();
        assert_eq!(err.message, "Maximum nesting depth exceeded");
        assert!(parse_with_options("$(echo $(ls))", &options).is_ok());
    }

    #[test]
    fn test_error_is_located() {
        let err = parse("echo ok\nif true; then", false).unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_deep_command_substitution_is_linear() {
        let inner = format!("{}x{}", "$(".repeat(25), ")".repeat(25));
        let started = Instant::now();
        let nodes = parse(&format!("echo {}", inner), false).unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(words(&nodes[0]), vec!["echo".to_string(), inner]);

        let arith = format!("echo {}1{}", "$(( 1 + $(echo ".repeat(15), ") ))".repeat(15));
        let started = Instant::now();
        assert!(parse(&arith, false).is_ok());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let src = "for f in *.txt; do cat <<-EOF | grep -v \"$f\" > >(sort)\n\tbody $(date)\n\tEOF\ndone\n\
                   case $x in a|b) echo $(( y * 2 ));; esac && [[ $z =~ ^a ]]";
        let render = |nodes: Vec<Node>| nodes.iter().map(Node::to_sexp).collect::<Vec<_>>();
        let first = render(parse(src, false).unwrap());
        let second = render(parse(src, false).unwrap());
        assert_eq!(first, second);
    }

    fn heredocs(node: &Node, out: &mut Vec<HereDocNode>) {
        match node {
            Node::HereDoc(h) => out.push(h.clone()),
            Node::Command(c) => c.redirects.iter().for_each(|r| heredocs(r, out)),
            Node::Pipeline(p) => p.commands.iter().for_each(|c| heredocs(c, out)),
            Node::List(l) => l.parts.iter().for_each(|c| heredocs(c, out)),
            _ => {}
        }
    }

    #[test]
    fn test_every_heredoc_is_paired_with_its_body() {
        let src = "cat <<A; cat <<-B | wc\nfirst\nA\n\tsecond\nB\necho mid\ncat <<C";
        let nodes = parse(src, false).unwrap();
        let mut found = Vec::new();
        for node in &nodes {
            heredocs(node, &mut found);
        }
        let bodies: Vec<(&str, &str)> = found
            .iter()
            .map(|h| (h.delimiter.as_str(), h.content.as_str()))
            .collect();
        assert_eq!(bodies, vec![("A", "first\n"), ("B", "second\n"), ("C", "")]);
        assert!(found.iter().all(|h| h.complete));
        assert_eq!(words(&nodes[1]), vec!["echo", "mid"]);
    }

    #[test]
    fn test_trailing_heredoc_operator_is_complete() {
        let nodes = parse("cat <<EOF", false).unwrap();
        let mut found = Vec::new();
        heredocs(&nodes[0], &mut found);
        assert_eq!(found.len(), 1);
        assert!(found[0].complete);
        assert_eq!(found[0].content, "");
    }

    #[test]
    fn test_abandoned_process_substitution_keeps_following_lines() {
        let nodes = parse("echo <(cat <<E; fi)\nE\necho after", false).unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(words(&nodes[0]), vec!["echo", "<(cat <<E; fi)"]);
        assert_eq!(words(&nodes[1]), vec!["E"]);
        assert_eq!(words(&nodes[2]), vec!["echo", "after"]);
    }

    #[test]
    fn test_unterminated_openers_are_matched_pair_errors() {
        for (src, pos) in [
            ("echo \"abc", 5),
            ("echo 'abc", 5),
            ("echo `abc", 5),
            ("echo $\"abc", 5),
            ("echo $(abc", 5),
            ("echo $[1", 5),
            ("echo ${x", 5),
        ] {
            let err = parse(src, false).unwrap_err();
            assert!(err.is_matched_pair(), "{src}: {err}");
            assert_eq!(err.pos, pos, "{src}");
        }
    }

    #[test]
    fn test_last_word_skips_heredoc_redirect() {
        let mut node = Node::Command(CommandNode {
            words: vec![WordNode::new("cat", vec![]), WordNode::new("x\\", vec![])],
            redirects: vec![Node::HereDoc(HereDocNode {
                id: 0,
                delimiter: "EOF".to_string(),
                content: String::new(),
                strip_tabs: false,
                quoted: false,
                fd: None,
                complete: false,
                start_pos: 4,
            })],
        });
        let last = find_last_word(&mut node).map(|w| w.value.clone());
        assert_eq!(last.as_deref(), Some("x\\"));

        if let Node::Command(cmd) = &mut node {
            cmd.words[1].value = "x".to_string();
        }
        let last = find_last_word(&mut node).map(|w| w.value.clone());
        assert_eq!(last.as_deref(), Some("x"));
    }

    #[test]
    fn test_input_size_limit() {
        let big = "a".repeat(MAX_INPUT_SIZE + 1);
        let err = parse(&big, false).unwrap_err();
        assert!(err.message.starts_with("Input too large"));
    }
}
