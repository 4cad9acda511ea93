//! Command, Process and Arithmetic Substitution Parsing
//!
//! All entry points work on the parser cursor and return the node together
//! with the exact source text it spans:
//! - `$( ... )` and the `${ ...; }` / `${| ...; }` funsub forms
//! - `` `...` ``, including here-documents opened inside the backticks
//! - `<( ... )` / `>( ... )`, falling back to plain text when the body does
//!   not parse
//! - `name=( ... )` array literals
//! - `$(( ... ))` and the deprecated `$[ ... ]`

use std::collections::VecDeque;

use crate::ast::{
    ArithDeprecatedNode, ArithExpr, ArithmeticExpansionNode, ArrayNode, CommandSubstitutionNode,
    Node, ProcessSubstitutionNode, WordNode,
};

use tracing::trace;

use super::arithmetic_parser::ArithParser;
use super::parser::Parser;
use super::scan::{
    find_heredoc_content_end, is_escape_char_in_backtick, is_metachar, is_redirect_char,
    is_whitespace, is_whitespace_no_newline, strip_line_continuations_comment_aware,
};
use super::types::{
    ParseError, ParseResult, MP_ARITH, MP_NONE, PST_CMDSUBST, PST_COMPASSIGN, PST_EOFTOKEN,
};

fn command_substitution(cmd: Node, brace: bool) -> Node {
    Node::CommandSubstitution(CommandSubstitutionNode {
        command: Box::new(cmd),
        brace,
    })
}

/// Backtick body as seen by the nested parser (`content`) and as written
/// (`text`, escapes intact)
#[derive(Default)]
struct BacktickText {
    content: String,
    text: String,
}

impl BacktickText {
    fn push(&mut self, c: char) {
        self.content.push(c);
        self.text.push(c);
    }

    fn push_str(&mut self, s: &str) {
        self.content.push_str(s);
        self.text.push_str(s);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum SubstitutionKind {
    Command,
    Process,
    Arithmetic,
}

/// Where and under which parser conditions a substitution was read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) struct SubstitutionKey {
    pub start: usize,
    pub kind: SubstitutionKind,
    pub parser_state: u32,
    pub depth: usize,
}

/// A finished substitution read: its node (None when the text did not form
/// one), its source text, and the cursor after it
#[derive(Debug, Clone)]
pub(super) struct SubstitutionMemo {
    pub node: Option<Node>,
    pub text: String,
    pub end: usize,
}

impl SubstitutionMemo {
    fn into_found(self) -> Option<(Node, String)> {
        self.node.map(|node| (node, self.text))
    }
}

impl Parser {
    /// Run `read` at the cursor once per position; later reads of the same
    /// word replay the stored result. Errors are not stored.
    fn memoized<F>(&mut self, kind: SubstitutionKind, read: F) -> ParseResult<SubstitutionMemo>
    where
        F: FnOnce(&mut Parser) -> ParseResult<(Option<Node>, String)>,
    {
        let key = SubstitutionKey {
            start: self.pos,
            kind,
            parser_state: self.parser_state,
            depth: self.depth,
        };
        if let Some(memo) = self.substitutions.get(&key) {
            self.pos = memo.end;
            return Ok(memo.clone());
        }
        let (node, text) = read(self)?;
        let memo = SubstitutionMemo {
            node,
            text,
            end: self.pos,
        };
        self.substitutions.insert(key, memo.clone());
        Ok(memo)
    }

    // =========================================================================
    // $( ... )
    // =========================================================================

    pub(super) fn parse_command_substitution(&mut self) -> ParseResult<Option<(Node, String)>> {
        if self.peek() != Some('$') || self.peek_at(1) != Some('(') {
            return Ok(None);
        }
        self.memoized(SubstitutionKind::Command, Self::read_command_substitution)
            .map(SubstitutionMemo::into_found)
    }

    fn read_command_substitution(&mut self) -> ParseResult<(Option<Node>, String)> {
        let start = self.pos;
        self.pos += 2;

        let saved = self.save_state();
        self.set_state(PST_CMDSUBST | PST_EOFTOKEN);
        self.eof_token = Some(')');

        let cmd = match self.parse_list(true) {
            Ok(cmd) => cmd.unwrap_or(Node::Empty),
            Err(e) => {
                self.abandon_attempt(&saved, start);
                return Err(e);
            }
        };
        self.skip_whitespace_and_newlines();
        if self.peek() != Some(')') {
            let at_end = self.at_end();
            self.abandon_attempt(&saved, start);
            self.pos = start;
            if at_end {
                return Err(ParseError::matched_pair(
                    "unexpected EOF while looking for matching `)'",
                    start,
                ));
            }
            trace!(start, "command substitution body does not close");
            return Ok((None, String::new()));
        }
        self.pos += 1;
        let text = self.slice(start, self.pos);
        self.restore_state(&saved);
        Ok((Some(command_substitution(cmd, false)), text))
    }

    /// `${ cmd; }` or `${| cmd; }` with the lexer just past `${`
    pub(super) fn parse_funsub(&mut self, start: usize) -> ParseResult<(Node, String)> {
        self.pos = self.lexer.pos;
        if self.peek() == Some('|') {
            self.pos += 1;
        }
        let saved = self.save_state();
        self.set_state(PST_CMDSUBST | PST_EOFTOKEN);
        self.eof_token = Some('}');

        let cmd = match self.parse_list(true) {
            Ok(cmd) => cmd.unwrap_or(Node::Empty),
            Err(e) => {
                self.restore_state(&saved);
                return Err(e);
            }
        };
        self.skip_whitespace_and_newlines();
        if self.peek() != Some('}') {
            self.restore_state(&saved);
            return Err(ParseError::matched_pair(
                "unexpected EOF looking for `}'",
                start,
            ));
        }
        self.pos += 1;
        let text = self.slice(start, self.pos);
        self.restore_state(&saved);
        self.sync_lexer();
        Ok((command_substitution(cmd, true), text))
    }

    // =========================================================================
    // BACKTICKS
    // =========================================================================

    fn take_into(&mut self, buf: &mut BacktickText) -> Option<char> {
        let c = self.advance()?;
        buf.push(c);
        Some(c)
    }

    /// `` `...` ``. Escapes of `$`, `` ` `` and `\` are removed from the
    /// nested source; here-document bodies opened inside are included even
    /// when they continue past the closing backtick.
    pub(super) fn parse_backtick_substitution(&mut self) -> ParseResult<Option<(Node, String)>> {
        if self.peek() != Some('`') {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 1;

        let mut buf = BacktickText::default();
        buf.text.push('`');
        let mut pending: VecDeque<(String, bool)> = VecDeque::new();
        let mut body: Option<(String, bool)> = None;

        loop {
            let Some(c) = self.peek() else {
                return Err(ParseError::matched_pair("Unterminated backtick", start));
            };
            if let Some((delimiter, strip_tabs)) = body.clone() {
                if self.read_backtick_heredoc_line(&mut buf, &delimiter, strip_tabs) {
                    body = pending.pop_front();
                }
                continue;
            }
            if c == '`' {
                break;
            }
            let next = self.peek_at(1);

            if c == '\\' && next.is_some() {
                match next {
                    Some('\n') => self.pos += 2,
                    Some(escaped) if is_escape_char_in_backtick(escaped) => {
                        self.pos += 2;
                        buf.content.push(escaped);
                        buf.text.push('\\');
                        buf.text.push(escaped);
                    }
                    _ => {
                        self.take_into(&mut buf);
                    }
                }
                continue;
            }

            if c == '<' && next == Some('<') {
                if self.peek_at(2) == Some('<') {
                    self.read_backtick_herestring(&mut buf);
                } else if let Some(entry) = self.read_backtick_heredoc_op(&mut buf) {
                    pending.push_back(entry);
                }
                continue;
            }

            self.take_into(&mut buf);
            if c == '\n' && !pending.is_empty() {
                body = pending.pop_front();
            }
        }

        self.pos += 1;
        buf.text.push('`');
        let BacktickText { mut content, text } = buf;

        if !pending.is_empty() {
            let delimiters: Vec<(String, bool)> = pending.into_iter().collect();
            let (body_start, body_end) = find_heredoc_content_end(&self.chars, self.pos, &delimiters);
            if body_end > body_start {
                content.push_str(&self.slice(body_start, body_end));
                self.cmdsub_heredoc_end =
                    Some(self.cmdsub_heredoc_end.map_or(body_end, |end| end.max(body_end)));
            }
        }

        let mut sub = self.nested_parser(&content, false);
        let cmd = sub.parse_nested_list()?.unwrap_or(Node::Empty);
        Ok(Some((command_substitution(cmd, false), text)))
    }

    /// One line of a here-document body inside backticks. True when the line
    /// closed the body.
    fn read_backtick_heredoc_line(
        &mut self,
        buf: &mut BacktickText,
        delimiter: &str,
        strip_tabs: bool,
    ) -> bool {
        let line_start = self.pos;
        let mut line_end = line_start;
        while self.chars.get(line_end).is_some_and(|&c| c != '\n') {
            line_end += 1;
        }
        let line = self.slice(line_start, line_end);
        let check = if strip_tabs {
            line.trim_start_matches('\t')
        } else {
            line.as_str()
        };

        if check == delimiter {
            buf.push_str(&line);
            self.pos = line_end;
            if self.peek() == Some('\n') {
                self.take_into(buf);
            }
            return true;
        }
        if check.starts_with(delimiter) && check.len() > delimiter.len() {
            let tabs = line.chars().count() - check.chars().count();
            let end = tabs + delimiter.chars().count();
            let head: String = line.chars().take(end).collect();
            buf.push_str(&head);
            self.pos = line_start + end;
            return true;
        }
        buf.push_str(&line);
        self.pos = line_end;
        if self.peek() == Some('\n') {
            self.take_into(buf);
        }
        false
    }

    /// `<<< word` copied verbatim
    fn read_backtick_herestring(&mut self, buf: &mut BacktickText) {
        for _ in 0..3 {
            self.take_into(buf);
        }
        while self.peek().is_some_and(is_whitespace_no_newline) {
            self.take_into(buf);
        }
        while let Some(c) = self.peek() {
            if is_whitespace(c) || c == '(' || c == ')' {
                break;
            }
            if c == '\\' && self.peek_at(1).is_some() {
                self.take_into(buf);
                self.take_into(buf);
            } else if c == '"' || c == '\'' {
                self.take_into(buf);
                while self.peek().is_some_and(|ch| ch != c) {
                    if c == '"' && self.peek() == Some('\\') {
                        self.take_into(buf);
                    }
                    self.take_into(buf);
                }
                self.take_into(buf);
            } else {
                self.take_into(buf);
            }
        }
    }

    /// `<<[-] DELIM` inside backticks; returns the delimiter and tab flag
    fn read_backtick_heredoc_op(&mut self, buf: &mut BacktickText) -> Option<(String, bool)> {
        self.take_into(buf);
        self.take_into(buf);
        let strip_tabs = self.peek() == Some('-');
        if strip_tabs {
            self.take_into(buf);
        }
        while self.peek().is_some_and(is_whitespace_no_newline) {
            self.take_into(buf);
        }
        let mut delimiter = String::new();
        match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.take_into(buf);
                self.take_delimiter_quoted(buf, q, &mut delimiter);
            }
            Some('\\') => {
                self.take_into(buf);
                delimiter.extend(self.take_into(buf));
                while self.peek().is_some_and(|c| !is_metachar(c)) {
                    delimiter.extend(self.take_into(buf));
                }
            }
            Some(_) => {
                while let Some(c) = self.peek() {
                    if is_metachar(c) || c == '`' {
                        break;
                    }
                    match c {
                        '"' | '\'' => {
                            self.take_into(buf);
                            self.take_delimiter_quoted(buf, c, &mut delimiter);
                        }
                        '\\' => {
                            self.take_into(buf);
                            delimiter.extend(self.take_into(buf));
                        }
                        _ => delimiter.extend(self.take_into(buf)),
                    }
                }
            }
            None => {}
        }
        (!delimiter.is_empty()).then_some((delimiter, strip_tabs))
    }

    fn take_delimiter_quoted(&mut self, buf: &mut BacktickText, quote: char, delimiter: &mut String) {
        while self.peek().is_some_and(|c| c != quote) {
            delimiter.extend(self.take_into(buf));
        }
        self.take_into(buf);
    }

    // =========================================================================
    // <( ... ) AND >( ... )
    // =========================================================================

    /// Process substitution. When the body is not a valid command list the
    /// text is still consumed as a balanced pair and returned without a node.
    pub(super) fn parse_process_substitution(&mut self) -> ParseResult<(Option<Node>, String)> {
        let Some(direction) = self.peek().filter(|&c| is_redirect_char(c)) else {
            return Ok((None, String::new()));
        };
        if self.peek_at(1) != Some('(') {
            return Ok((None, String::new()));
        }
        self.memoized(SubstitutionKind::Process, |p| p.read_process_substitution(direction))
            .map(|memo| (memo.node, memo.text))
    }

    fn read_process_substitution(&mut self, direction: char) -> ParseResult<(Option<Node>, String)> {
        let start = self.pos;
        self.pos += 2;

        let saved = self.save_state();
        let was_in_process_sub = self.in_process_sub;
        self.in_process_sub = true;
        self.set_state(PST_EOFTOKEN);
        self.eof_token = Some(')');
        let attempt = self.parse_process_substitution_body();
        self.restore_state(&saved);
        self.in_process_sub = was_in_process_sub;

        if let Ok(Some(cmd)) = attempt {
            let text = strip_line_continuations_comment_aware(&self.chars[start..self.pos]);
            let node = Node::ProcessSubstitution(ProcessSubstitutionNode {
                direction: direction.to_string(),
                command: Box::new(cmd),
            });
            return Ok((Some(node), text));
        }

        self.abandon_attempt(&saved, start);
        if matches!(self.chars.get(start + 2), Some(' ' | '\t' | '\n')) {
            return Err(ParseError::new("Invalid process substitution", start));
        }
        match &attempt {
            Err(e) => trace!(start, error = %e, "process substitution kept as text"),
            Ok(_) => trace!(start, "process substitution kept as text"),
        }
        self.pos = start + 2;
        self.lexer.pos = self.pos;
        self.parse_matched_pair('(', ')', MP_NONE, false)?;
        self.pos = self.lexer.pos;
        let text = strip_line_continuations_comment_aware(&self.chars[start..self.pos]);
        Ok((None, text))
    }

    fn parse_process_substitution_body(&mut self) -> ParseResult<Option<Node>> {
        let cmd = self.parse_list(true)?.unwrap_or(Node::Empty);
        self.skip_whitespace_and_newlines();
        if self.peek() != Some(')') {
            return Ok(None);
        }
        self.pos += 1;
        Ok(Some(cmd))
    }

    // =========================================================================
    // ARRAY LITERALS
    // =========================================================================

    pub(super) fn parse_array_literal(&mut self) -> ParseResult<Option<(Node, String)>> {
        if self.peek() != Some('(') {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 1;
        self.set_state(PST_COMPASSIGN);
        let elements = self.parse_array_elements(start);
        self.clear_state(PST_COMPASSIGN);
        let elements = elements?;
        let text = self.slice(start, self.pos);
        Ok(Some((Node::Array(ArrayNode { elements }), text)))
    }

    fn parse_array_elements(&mut self, start: usize) -> ParseResult<Vec<WordNode>> {
        let mut elements = Vec::new();
        loop {
            self.skip_whitespace_and_newlines();
            match self.peek() {
                None => return Err(ParseError::new("Unterminated array literal", start)),
                Some(')') => break,
                Some(_) => {}
            }
            match self.parse_word(false, true, false)? {
                Some(word) => elements.push(word),
                None if self.peek() == Some(')') => break,
                None => return Err(ParseError::new("Expected word in array literal", self.pos)),
            }
        }
        self.pos += 1;
        Ok(elements)
    }

    // =========================================================================
    // ARITHMETIC
    // =========================================================================

    /// `$(( ... ))`. None (cursor restored) when the parens do not close as
    /// `))` or the expression does not parse, so the caller can retry as a
    /// command substitution.
    pub(super) fn parse_arithmetic_expansion(&mut self) -> ParseResult<Option<(Node, String)>> {
        if !self.starts_with("$((") {
            return Ok(None);
        }
        self.memoized(SubstitutionKind::Arithmetic, Self::read_arithmetic_expansion)
            .map(SubstitutionMemo::into_found)
    }

    fn read_arithmetic_expansion(&mut self) -> ParseResult<(Option<Node>, String)> {
        let start = self.pos;
        self.pos += 3;
        let content_start = self.pos;
        let mut depth = 2usize;
        let mut first_close: Option<usize> = None;

        while let Some(c) = self.peek() {
            match c {
                '\'' => {
                    self.pos += 1;
                    while self.peek().is_some_and(|ch| ch != '\'') {
                        self.pos += 1;
                    }
                    self.advance();
                }
                '"' => {
                    self.pos += 1;
                    while let Some(ch) = self.peek() {
                        if ch == '\\' && self.peek_at(1).is_some() {
                            self.pos += 2;
                        } else {
                            self.pos += 1;
                            if ch == '"' {
                                break;
                            }
                        }
                    }
                }
                '\\' if self.peek_at(1).is_some() => self.pos += 2,
                '(' => {
                    depth += 1;
                    self.pos += 1;
                }
                ')' => {
                    if depth == 2 {
                        first_close = Some(self.pos);
                    }
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    self.pos += 1;
                }
                _ => {
                    if depth == 1 {
                        first_close = None;
                    }
                    self.pos += 1;
                }
            }
        }
        if depth != 0 {
            if self.at_end() {
                return Err(ParseError::matched_pair(
                    "unexpected EOF looking for `))'",
                    start,
                ));
            }
            trace!(start, "`$((` does not close as `))`, retrying as command substitution");
            self.pos = start;
            return Ok((None, String::new()));
        }
        let content = self.slice(content_start, first_close.unwrap_or(self.pos));
        self.pos += 1;
        let text = self.slice(start, self.pos);
        match self.parse_arith_expr(&content) {
            Ok(expr) => Ok((
                Some(Node::ArithmeticExpansion(ArithmeticExpansionNode {
                    expression: expr.map(Box::new),
                })),
                text,
            )),
            Err(e) => {
                trace!(
                    start,
                    error = %e,
                    "`$((` body is not arithmetic, retrying as command substitution"
                );
                self.pos = start;
                Ok((None, String::new()))
            }
        }
    }

    /// `$[ ... ]`, kept as raw text
    pub(super) fn parse_deprecated_arithmetic(&mut self) -> ParseResult<Option<(Node, String)>> {
        if self.peek() != Some('$') || self.peek_at(1) != Some('[') {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 2;
        self.lexer.pos = self.pos;
        let expression = self
            .parse_matched_pair('[', ']', MP_ARITH, false)
            .map_err(|e| ParseError::matched_pair(e.message, start))?;
        self.pos = self.lexer.pos;
        let text = self.slice(start, self.pos);
        Ok(Some((Node::ArithDeprecated(ArithDeprecatedNode { expression }), text)))
    }

    /// Parse arithmetic source. None for an empty expression.
    pub(super) fn parse_arith_expr(&self, content: &str) -> ParseResult<Option<ArithExpr>> {
        ArithParser::new(content, self.extglob, self.depth, self.max_depth).parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(src: &str) -> Parser {
        Parser::new(src, false, false)
    }

    #[test]
    fn test_command_substitution_text() {
        let mut p = parser("$(echo hi; ls) tail");
        let (node, text) = p.parse_command_substitution().unwrap().unwrap();
        assert_eq!(text, "$(echo hi; ls)");
        assert_eq!(node.kind(), "cmdsub");
        assert_eq!(p.peek(), Some(' '));
    }

    #[test]
    fn test_command_substitution_unclosed_at_eof() {
        let mut p = parser("$(echo hi");
        let err = p.parse_command_substitution().unwrap_err();
        assert!(err.is_matched_pair());
        assert_eq!(err.pos, 0);
        assert_eq!(p.pos, 0);
        assert_eq!(p.parser_state, 0);
    }

    #[test]
    fn test_command_substitution_read_once_per_position() {
        let mut p = parser("$(echo $(date)) tail");
        let (first, text) = p.parse_command_substitution().unwrap().unwrap();
        let stored = p.substitutions.len();
        assert!(stored >= 2);

        p.pos = 0;
        let (again, again_text) = p.parse_command_substitution().unwrap().unwrap();
        assert_eq!(first, again);
        assert_eq!(text, again_text);
        assert_eq!(p.substitutions.len(), stored);
        assert_eq!(p.peek(), Some(' '));
    }

    #[test]
    fn test_backtick_strips_escapes_from_content() {
        let mut p = parser("`echo \\$HOME`");
        let (node, text) = p.parse_backtick_substitution().unwrap().unwrap();
        assert_eq!(text, "`echo \\$HOME`");
        let Node::CommandSubstitution(sub) = node else {
            panic!("expected cmdsub");
        };
        let Node::Command(cmd) = *sub.command else {
            panic!("expected command");
        };
        assert_eq!(cmd.words[1].value, "$HOME");
    }

    #[test]
    fn test_unterminated_backtick() {
        let err = parser("`echo").parse_backtick_substitution().unwrap_err();
        assert_eq!(err.message, "Unterminated backtick");
        assert!(err.is_matched_pair());
        assert_eq!(err.pos, 0);
    }

    #[test]
    fn test_backtick_heredoc_body_inside() {
        let mut p = parser("`cat <<EOF\nhello\nEOF\n`");
        let (_, text) = p.parse_backtick_substitution().unwrap().unwrap();
        assert_eq!(text, "`cat <<EOF\nhello\nEOF\n`");
        assert!(p.at_end());
    }

    #[test]
    fn test_process_substitution() {
        let mut p = parser("<(sort a) b");
        let (node, text) = p.parse_process_substitution().unwrap();
        assert_eq!(text, "<(sort a)");
        assert_eq!(node.map(|n| n.kind()), Some("procsub"));
        assert!(!p.in_process_sub);
    }

    #[test]
    fn test_failed_process_substitution_forgets_its_heredocs() {
        let mut p = parser("<(cat <<E; fi)\nE\n");
        let (node, text) = p.parse_process_substitution().unwrap();
        assert!(node.is_none());
        assert_eq!(text, "<(cat <<E; fi)");
        assert!(p.pending_heredocs.is_empty());
        assert!(p.heredoc_bodies.is_empty());
        assert_eq!(p.peek(), Some('\n'));
    }

    #[test]
    fn test_invalid_process_substitution() {
        let err = parser("<( ;; )").parse_process_substitution().unwrap_err();
        assert_eq!(err.message, "Invalid process substitution");
    }

    #[test]
    fn test_array_literal() {
        let mut p = parser("(a 'b c'\n d)");
        let (node, text) = p.parse_array_literal().unwrap().unwrap();
        assert_eq!(text, "(a 'b c'\n d)");
        let Node::Array(arr) = node else {
            panic!("expected array");
        };
        let values: Vec<&str> = arr.elements.iter().map(|w| w.value.as_str()).collect();
        assert_eq!(values, vec!["a", "'b c'", "d"]);
        assert_eq!(p.parser_state & PST_COMPASSIGN, 0);
    }

    #[test]
    fn test_unterminated_array_literal() {
        let err = parser("(a b").parse_array_literal().unwrap_err();
        assert_eq!(err.message, "Unterminated array literal");
    }

    #[test]
    fn test_arithmetic_expansion() {
        let mut p = parser("$((1 + 2))x");
        let (node, text) = p.parse_arithmetic_expansion().unwrap().unwrap();
        assert_eq!(text, "$((1 + 2))");
        assert_eq!(node.kind(), "arith");
        assert_eq!(p.peek(), Some('x'));
    }

    #[test]
    fn test_arithmetic_expansion_declines_bad_expression() {
        let mut p = parser("$((@x))");
        assert!(p.parse_arithmetic_expansion().unwrap().is_none());
        assert_eq!(p.pos, 0);
    }

    #[test]
    fn test_arithmetic_expansion_unterminated() {
        let err = parser("$((1 + 2").parse_arithmetic_expansion().unwrap_err();
        assert!(err.is_matched_pair());
    }

    #[test]
    fn test_deprecated_arithmetic() {
        let mut p = parser("$[1+2]");
        let (node, text) = p.parse_deprecated_arithmetic().unwrap().unwrap();
        assert_eq!(text, "$[1+2]");
        assert_eq!(
            node,
            Node::ArithDeprecated(ArithDeprecatedNode {
                expression: "1+2".into()
            })
        );
    }

    #[test]
    fn test_deprecated_arithmetic_unterminated_reports_opener() {
        let mut p = parser("echo $[1");
        p.pos = 5;
        let err = p.parse_deprecated_arithmetic().unwrap_err();
        assert!(err.is_matched_pair());
        assert_eq!(err.pos, 5);
    }
}
