//! Word Reading
//!
//! Reads one shell word at the lexer cursor, collecting the raw text in
//! chunks and the expansion nodes found along the way. Three contexts:
//! - `Normal`: command words, assignments, `name=(...)` arrays, extglobs
//! - `Cond`: operands inside `[[ ... ]]` (bracket expressions, `(` ends a word)
//! - `Regex`: the right side of `=~` (parens and blanks nest, no quoting of `$'`)
//!
//! Embedded substitutions are parsed by the parser proper; the cursor is
//! handed over as `self.pos = self.lexer.pos` and taken back afterwards.

use crate::ast::{Node, WordNode};

use super::lexer::{Lexer, Token};
use super::parser::Parser;
use super::scan::{
    is_array_assignment_prefix, is_extglob_prefix, is_metachar, is_redirect_char,
    is_whitespace, is_whitespace_no_newline,
};
use super::types::{ParseError, ParseResult, WordContext, MP_EXTGLOB, PST_EOFTOKEN};

fn push_next(lexer: &mut Lexer, chunks: &mut Vec<String>) {
    if let Some(c) = lexer.advance() {
        chunks.push(c.to_string());
    }
}

fn single_char(chunk: &str) -> Option<char> {
    let mut it = chunk.chars();
    let c = it.next()?;
    it.next().is_none().then_some(c)
}

fn joined(chunks: &[String]) -> Vec<char> {
    chunks.iter().flat_map(|c| c.chars()).collect()
}

/// `name=` / `name+=` / `name[i]=` right before a `(`
fn ends_with_array_assignment(chunks: &[String]) -> bool {
    let n = chunks.len();
    if n >= 3 && chunks[n - 2] == "+" && chunks[n - 1] == "=" {
        return is_array_assignment_prefix(&joined(&chunks[..n - 2]));
    }
    if n >= 2 && chunks[n - 1] == "=" {
        return is_array_assignment_prefix(&joined(&chunks[..n - 1]));
    }
    false
}

/// `$?`, `$*` or `$@` just read, so a following `(` opens an extglob
fn ends_with_special_dollar(chunks: &[String]) -> bool {
    let Some(last) = chunks.last() else {
        return false;
    };
    let mut it = last.chars();
    matches!(
        (it.next(), it.next(), it.next()),
        (Some('$'), Some('?' | '*' | '@'), None)
    )
}

impl Parser {
    // =========================================================================
    // LEXER-CURSOR WORD READING
    // =========================================================================

    /// Word token at the lexer cursor, None on a metacharacter
    pub(super) fn read_word(&mut self) -> ParseResult<Option<Token>> {
        let start = self.lexer.pos;
        let Some(c) = self.lexer.peek() else {
            return Ok(None);
        };
        let is_procsub = matches!(c, '<' | '>') && self.lexer.char_at(start + 1) == Some('(');
        let is_regex_paren =
            self.lexer.word_context == WordContext::Regex && matches!(c, '(' | ')');
        if is_metachar(c) && !is_procsub && !is_regex_paren {
            return Ok(None);
        }
        let word = self.read_word_internal(
            self.lexer.word_context,
            self.lexer.at_command_start,
            self.lexer.in_array_literal,
            self.lexer.in_assign_builtin,
        )?;
        Ok(word.map(|w| Token::word(w, start)))
    }

    fn read_word_internal(
        &mut self,
        ctx: WordContext,
        at_command_start: bool,
        in_array_literal: bool,
        in_assign_builtin: bool,
    ) -> ParseResult<Option<WordNode>> {
        let mut chunks: Vec<String> = Vec::new();
        let mut parts: Vec<Node> = Vec::new();
        let mut bracket_depth = 0usize;
        let mut bracket_start: Option<usize> = None;
        let mut seen_equals = false;
        let mut paren_depth = 0usize;

        while let Some(ch) = self.lexer.peek() {
            let next = self.lexer.char_at(self.lexer.pos + 1);
            if ctx == WordContext::Regex && ch == '\\' && next == Some('\n') {
                self.lexer.pos += 2;
                continue;
            }
            if ctx != WordContext::Normal
                && self
                    .lexer
                    .is_word_terminator(ctx, ch, bracket_depth, paren_depth)
            {
                break;
            }

            if ctx == WordContext::Normal {
                if ch == '[' {
                    if bracket_depth > 0 {
                        bracket_depth += 1;
                        push_next(&mut self.lexer, &mut chunks);
                        continue;
                    }
                    let subscript_of_name = !chunks.is_empty()
                        && at_command_start
                        && !seen_equals
                        && is_array_assignment_prefix(&joined(&chunks))
                        && chunks
                            .last()
                            .and_then(|c| c.chars().next())
                            .is_some_and(|c| c.is_alphanumeric() || c == '_');
                    let element_subscript = chunks.is_empty() && !seen_equals && in_array_literal;
                    if subscript_of_name || element_subscript {
                        bracket_start = Some(self.lexer.pos);
                        bracket_depth += 1;
                        push_next(&mut self.lexer, &mut chunks);
                        continue;
                    }
                }
                if ch == ']' && bracket_depth > 0 {
                    bracket_depth -= 1;
                    push_next(&mut self.lexer, &mut chunks);
                    continue;
                }
                if ch == '=' && bracket_depth == 0 {
                    seen_equals = true;
                }
            }

            if ctx == WordContext::Regex && ch == '(' {
                paren_depth += 1;
                push_next(&mut self.lexer, &mut chunks);
                continue;
            }
            if ctx == WordContext::Regex && ch == ')' {
                if paren_depth == 0 {
                    break;
                }
                paren_depth -= 1;
                push_next(&mut self.lexer, &mut chunks);
                continue;
            }
            if ctx != WordContext::Normal && ch == '[' {
                let for_regex = ctx == WordContext::Regex;
                if !self.read_bracket_expression(&mut chunks, &mut parts, for_regex, paren_depth)? {
                    push_next(&mut self.lexer, &mut chunks);
                }
                continue;
            }
            if ctx == WordContext::Cond && ch == '(' {
                let after_prefix = chunks
                    .last()
                    .and_then(|c| single_char(c))
                    .is_some_and(is_extglob_prefix);
                if self.extglob && after_prefix {
                    push_next(&mut self.lexer, &mut chunks);
                    self.read_extglob_body(&mut chunks)?;
                    continue;
                }
                break;
            }
            if ctx == WordContext::Regex && is_whitespace(ch) && paren_depth > 0 {
                push_next(&mut self.lexer, &mut chunks);
                continue;
            }

            if ch == '\'' {
                let quote_pos = self.lexer.pos;
                self.lexer.advance();
                let (content, saw_newline) = self.lexer.read_single_quote(quote_pos)?;
                chunks.push(content);
                if ctx == WordContext::Normal && saw_newline {
                    self.saw_newline_in_single_quote = true;
                }
                continue;
            }
            if ch == '"' {
                let quote_pos = self.lexer.pos;
                self.lexer.advance();
                if ctx == WordContext::Normal {
                    self.read_double_quoted(&mut chunks, &mut parts, quote_pos)?;
                } else {
                    self.pos = self.lexer.pos;
                    let handle_continuation = ctx == WordContext::Cond;
                    self.scan_double_quote(&mut chunks, &mut parts, quote_pos, handle_continuation)?;
                    self.lexer.pos = self.pos;
                }
                continue;
            }
            if ch == '\\' && next.is_some() {
                if ctx != WordContext::Regex && next == Some('\n') {
                    self.lexer.pos += 2;
                } else {
                    push_next(&mut self.lexer, &mut chunks);
                    push_next(&mut self.lexer, &mut chunks);
                }
                continue;
            }
            if ctx != WordContext::Regex && ch == '$' && next == Some('\'') {
                match self.lexer.read_ansi_c_quote()? {
                    Some((node, text)) => {
                        parts.push(node);
                        chunks.push(text);
                    }
                    None => push_next(&mut self.lexer, &mut chunks),
                }
                continue;
            }
            if ctx != WordContext::Regex && ch == '$' && next == Some('"') {
                match self.read_locale_string()? {
                    Some((node, text, inner)) => {
                        parts.push(node);
                        parts.extend(inner);
                        chunks.push(text);
                    }
                    None => push_next(&mut self.lexer, &mut chunks),
                }
                continue;
            }
            if ch == '$' {
                self.pos = self.lexer.pos;
                let found = self.parse_dollar_expansion(&mut chunks, &mut parts, false)?;
                self.lexer.pos = self.pos;
                if !found {
                    push_next(&mut self.lexer, &mut chunks);
                } else if self.extglob
                    && ctx == WordContext::Normal
                    && ends_with_special_dollar(&chunks)
                    && self.lexer.peek() == Some('(')
                {
                    push_next(&mut self.lexer, &mut chunks);
                    self.read_extglob_body(&mut chunks)?;
                }
                continue;
            }
            if ctx != WordContext::Regex && ch == '`' {
                self.pos = self.lexer.pos;
                let found = self.parse_backtick_substitution()?;
                self.lexer.pos = self.pos;
                match found {
                    Some((node, text)) => {
                        parts.push(node);
                        chunks.push(text);
                    }
                    None => push_next(&mut self.lexer, &mut chunks),
                }
                continue;
            }
            if ctx != WordContext::Regex && is_redirect_char(ch) && next == Some('(') {
                self.pos = self.lexer.pos;
                let (node, text) = self.parse_process_substitution()?;
                self.lexer.pos = self.pos;
                match node {
                    Some(node) => {
                        parts.push(node);
                        chunks.push(text);
                    }
                    None if !text.is_empty() => chunks.push(text),
                    None => {
                        push_next(&mut self.lexer, &mut chunks);
                        if ctx == WordContext::Normal {
                            push_next(&mut self.lexer, &mut chunks);
                        }
                    }
                }
                continue;
            }
            if ctx == WordContext::Normal
                && ch == '('
                && !chunks.is_empty()
                && bracket_depth == 0
                && ends_with_array_assignment(&chunks)
                && (at_command_start || in_assign_builtin)
            {
                self.pos = self.lexer.pos;
                let array = self.parse_array_literal()?;
                self.lexer.pos = self.pos;
                match array {
                    Some((node, text)) => {
                        parts.push(node);
                        chunks.push(text);
                        continue;
                    }
                    None => break,
                }
            }
            if self.extglob && ctx == WordContext::Normal && is_extglob_prefix(ch) && next == Some('(')
            {
                push_next(&mut self.lexer, &mut chunks);
                push_next(&mut self.lexer, &mut chunks);
                self.read_extglob_body(&mut chunks)?;
                continue;
            }
            if ctx == WordContext::Normal
                && self.lexer.parser_state & PST_EOFTOKEN != 0
                && self.lexer.eof_token == Some(ch)
                && bracket_depth == 0
            {
                if chunks.is_empty() {
                    push_next(&mut self.lexer, &mut chunks);
                }
                break;
            }
            if ctx == WordContext::Normal && is_metachar(ch) && bracket_depth == 0 {
                break;
            }
            push_next(&mut self.lexer, &mut chunks);
        }

        if bracket_depth > 0 && self.lexer.at_end() {
            if let Some(pos) = bracket_start {
                return Err(ParseError::matched_pair("unexpected EOF looking for `]'", pos));
            }
        }
        if chunks.is_empty() {
            return Ok(None);
        }
        Ok(Some(WordNode::new(chunks.concat(), parts)))
    }

    /// Pattern list of an extglob, cursor just past its `(`
    fn read_extglob_body(&mut self, chunks: &mut Vec<String>) -> ParseResult<()> {
        let content = self.parse_matched_pair('(', ')', MP_EXTGLOB, false)?;
        chunks.push(content);
        chunks.push(")".to_string());
        Ok(())
    }

    /// Body of `"..."` in a command word, opening quote already consumed
    fn read_double_quoted(
        &mut self,
        chunks: &mut Vec<String>,
        parts: &mut Vec<Node>,
        start: usize,
    ) -> ParseResult<()> {
        chunks.push("\"".to_string());
        loop {
            let Some(c) = self.lexer.peek() else {
                return Err(ParseError::matched_pair("Unterminated double quote", start));
            };
            if c == '"' {
                break;
            }
            let next = self.lexer.char_at(self.lexer.pos + 1);
            match c {
                '\\' if next == Some('\n') => self.lexer.pos += 2,
                '\\' if next.is_some() => {
                    push_next(&mut self.lexer, chunks);
                    push_next(&mut self.lexer, chunks);
                }
                '$' => {
                    self.pos = self.lexer.pos;
                    let found = self.parse_dollar_expansion(chunks, parts, true)?;
                    self.lexer.pos = self.pos;
                    if !found {
                        push_next(&mut self.lexer, chunks);
                    }
                }
                '`' => {
                    self.pos = self.lexer.pos;
                    let found = self.parse_backtick_substitution()?;
                    self.lexer.pos = self.pos;
                    match found {
                        Some((node, text)) => {
                            parts.push(node);
                            chunks.push(text);
                        }
                        None => push_next(&mut self.lexer, chunks),
                    }
                }
                _ => push_next(&mut self.lexer, chunks),
            }
        }
        push_next(&mut self.lexer, chunks);
        Ok(())
    }

    /// `[...]` bracket expression inside `[[ ]]`. False when the `[` does
    /// not open one and should be taken literally.
    fn read_bracket_expression(
        &mut self,
        chunks: &mut Vec<String>,
        parts: &mut Vec<Node>,
        for_regex: bool,
        paren_depth: usize,
    ) -> ParseResult<bool> {
        if for_regex {
            if !self.regex_bracket_will_close(paren_depth) {
                return Ok(false);
            }
        } else {
            match self.lexer.char_at(self.lexer.pos + 1) {
                None => return Ok(false),
                Some(c) if is_whitespace_no_newline(c) || c == '&' || c == '|' => {
                    return Ok(false)
                }
                Some(_) => {}
            }
        }
        push_next(&mut self.lexer, chunks);
        if self.lexer.peek() == Some('^') {
            push_next(&mut self.lexer, chunks);
        }
        if self.lexer.peek() == Some(']') {
            push_next(&mut self.lexer, chunks);
        }
        while let Some(c) = self.lexer.peek() {
            let next = self.lexer.char_at(self.lexer.pos + 1);
            if c == ']' {
                push_next(&mut self.lexer, chunks);
                break;
            }
            let class_close = match next {
                Some(':') if c == '[' => Some(':'),
                Some(d @ ('=' | '.')) if c == '[' && !for_regex => Some(d),
                _ => None,
            };
            if let Some(close) = class_close {
                push_next(&mut self.lexer, chunks);
                push_next(&mut self.lexer, chunks);
                while let Some(c) = self.lexer.peek() {
                    if c == close && self.lexer.char_at(self.lexer.pos + 1) == Some(']') {
                        break;
                    }
                    push_next(&mut self.lexer, chunks);
                }
                if !self.lexer.at_end() {
                    push_next(&mut self.lexer, chunks);
                    push_next(&mut self.lexer, chunks);
                }
            } else if for_regex && c == '$' {
                self.pos = self.lexer.pos;
                let found = self.parse_dollar_expansion(chunks, parts, false)?;
                self.lexer.pos = self.pos;
                if !found {
                    push_next(&mut self.lexer, chunks);
                }
            } else {
                push_next(&mut self.lexer, chunks);
            }
        }
        Ok(true)
    }

    fn regex_bracket_will_close(&self, paren_depth: usize) -> bool {
        let chars = &self.lexer.chars;
        let at = |i: usize| chars.get(i).copied();
        let mut scan = self.lexer.pos + 1;
        if at(scan) == Some('^') {
            scan += 1;
        }
        if at(scan) == Some(']') {
            scan += 1;
        }
        while let Some(sc) = at(scan) {
            match sc {
                ']' if at(scan + 1) == Some(']') => return false,
                ')' if paren_depth > 0 => return false,
                '&' if at(scan + 1) == Some('&') => return false,
                ']' => return true,
                '[' if at(scan + 1) == Some(':') => {
                    scan += 2;
                    while at(scan).is_some() && !(at(scan) == Some(':') && at(scan + 1) == Some(']')) {
                        scan += 1;
                    }
                    if at(scan).is_some() {
                        scan += 2;
                    }
                }
                _ => scan += 1,
            }
        }
        false
    }

    // =========================================================================
    // PARSER-CURSOR WORD HELPERS
    // =========================================================================

    /// Body of `"..."` read on the parser cursor; the opening quote has been
    /// consumed and is re-emitted into `chunks`
    pub(super) fn scan_double_quote(
        &mut self,
        chunks: &mut Vec<String>,
        parts: &mut Vec<Node>,
        start: usize,
        handle_line_continuation: bool,
    ) -> ParseResult<()> {
        chunks.push("\"".to_string());
        while let Some(c) = self.peek() {
            if c == '"' {
                break;
            }
            let next = self.peek_at(1);
            if c == '\\' && next.is_some() {
                if handle_line_continuation && next == Some('\n') {
                    self.pos += 2;
                } else {
                    self.pos += 2;
                    chunks.push(self.slice(self.pos - 2, self.pos));
                }
            } else if c == '$' {
                if !self.parse_dollar_expansion(chunks, parts, true)? {
                    self.pos += 1;
                    chunks.push("$".to_string());
                }
            } else {
                self.pos += 1;
                chunks.push(c.to_string());
            }
        }
        if self.at_end() {
            return Err(ParseError::matched_pair("Unterminated double quote", start));
        }
        self.pos += 1;
        chunks.push("\"".to_string());
        Ok(())
    }

    /// Next word token, with the flags that shape how it is read. None if the
    /// next token is an operator or the input is exhausted.
    pub(super) fn parse_word(
        &mut self,
        at_command_start: bool,
        in_array_literal: bool,
        in_assign_builtin: bool,
    ) -> ParseResult<Option<WordNode>> {
        self.skip_whitespace();
        if self.at_end() {
            return Ok(None);
        }
        self.at_command_start = at_command_start;
        self.in_array_literal = in_array_literal;
        self.in_assign_builtin = in_assign_builtin;
        let tok = self.lex_peek_token();
        let word = match tok {
            Ok(tok) if tok.word.is_some() => self.lex_next_token().map(|_| tok.word),
            Ok(_) => Ok(None),
            Err(e) => Err(e),
        };
        self.at_command_start = false;
        self.in_array_literal = false;
        self.in_assign_builtin = false;
        word
    }

    pub(super) fn parse_word_internal(
        &mut self,
        ctx: WordContext,
        at_command_start: bool,
        in_array_literal: bool,
    ) -> ParseResult<Option<WordNode>> {
        self.word_context = ctx;
        self.parse_word(at_command_start, in_array_literal, false)
    }

    /// Plain word ahead of the cursor without consuming it; stops at quotes
    /// and line continuations
    pub(super) fn peek_word(&mut self) -> String {
        let saved = self.pos;
        self.skip_whitespace();
        let mut word = String::new();
        while let Some(ch) = self.peek() {
            if is_metachar(ch) || ch == '\'' || ch == '"' {
                break;
            }
            if ch == '\\' {
                match self.peek_at(1) {
                    Some('\n') => break,
                    Some(escaped) => {
                        word.push(ch);
                        word.push(escaped);
                        self.pos += 2;
                        continue;
                    }
                    None => {}
                }
            }
            word.push(ch);
            self.pos += 1;
        }
        self.pos = saved;
        word
    }

    /// Consume `expected` as a whole word. Inside a process substitution a
    /// `}` glued to the front (`}done`) is tolerated.
    pub(super) fn consume_word(&mut self, expected: &str) -> bool {
        let saved = self.pos;
        self.skip_whitespace();
        let word = self.peek_word();
        let (keyword, leading_brace) = match word.strip_prefix('}') {
            Some(rest) if self.in_process_sub && !rest.is_empty() => (rest, true),
            _ => (word.as_str(), false),
        };
        if keyword != expected {
            self.pos = saved;
            return false;
        }
        self.skip_whitespace();
        if leading_brace {
            self.pos += 1;
        }
        self.pos += expected.chars().count();
        while self.peek() == Some('\\') && self.peek_at(1) == Some('\n') {
            self.pos += 2;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(src: &str, at_command_start: bool) -> WordNode {
        Parser::new(src, false, false)
            .parse_word(at_command_start, false, false)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_plain_and_quoted_words() {
        assert_eq!(word("hello world", true).value, "hello");
        assert_eq!(word("'a b'c\"d e\" rest", true).value, "'a b'c\"d e\"");
        assert_eq!(word("a\\ b c", true).value, "a\\ b");
    }

    #[test]
    fn test_line_continuation_removed_from_word() {
        assert_eq!(word("ab\\\ncd", true).value, "abcd");
    }

    #[test]
    fn test_expansions_are_collected_as_parts() {
        let w = word("\"$x and `y`\"", true);
        let kinds: Vec<&str> = w.parts.iter().map(Node::kind).collect();
        assert_eq!(kinds, vec!["param", "cmdsub"]);
        assert_eq!(w.value, "\"$x and `y`\"");
    }

    #[test]
    fn test_array_assignment() {
        let w = word("arr=(1 2 3) x", true);
        assert_eq!(w.value, "arr=(1 2 3)");
        assert_eq!(w.parts[0].kind(), "array");
    }

    #[test]
    fn test_subscript_assignment_keeps_spaces() {
        assert_eq!(word("a[i + 1]=x y", true).value, "a[i + 1]=x");
    }

    #[test]
    fn test_unterminated_subscript() {
        let err = Parser::new("a[1", false, false)
            .parse_word(true, false, false)
            .unwrap_err();
        assert!(err.is_matched_pair());
        assert_eq!(err.pos, 1);
    }

    #[test]
    fn test_unterminated_double_quote() {
        let err = Parser::new("\"abc", false, false)
            .parse_word(true, false, false)
            .unwrap_err();
        assert_eq!(err.message, "Unterminated double quote");
        assert!(err.is_matched_pair());
        assert_eq!(err.pos, 0);
    }

    #[test]
    fn test_unterminated_quote_reports_opener() {
        let err = Parser::new("ab'cd", false, false)
            .parse_word(true, false, false)
            .unwrap_err();
        assert!(err.is_matched_pair());
        assert_eq!(err.pos, 2);

        let err = Parser::new("x$\"abc", false, false)
            .parse_word(true, false, false)
            .unwrap_err();
        assert!(err.is_matched_pair());
        assert_eq!(err.pos, 1);
    }

    #[test]
    fn test_extglob_word() {
        let w = Parser::new("@(a|b)c d", false, true)
            .parse_word(true, false, false)
            .unwrap()
            .unwrap();
        assert_eq!(w.value, "@(a|b)c");
    }

    #[test]
    fn test_cond_bracket_expression_spans_blank() {
        let w = Parser::new("a[b c] rest", false, false)
            .parse_word_internal(WordContext::Cond, false, false)
            .unwrap()
            .unwrap();
        assert_eq!(w.value, "a[b c]");
    }

    #[test]
    fn test_operator_is_not_a_word() {
        let mut p = Parser::new("| x", false, false);
        assert!(p.parse_word(true, false, false).unwrap().is_none());
        assert_eq!(p.pos, 0);
    }

    #[test]
    fn test_peek_and_consume_word() {
        let mut p = Parser::new("  then x", false, false);
        assert_eq!(p.peek_word(), "then");
        assert_eq!(p.pos, 0);
        assert!(!p.consume_word("do"));
        assert!(p.consume_word("then"));
        assert_eq!(p.pos, 6);
    }

    #[test]
    fn test_consume_word_with_glued_brace_in_procsub() {
        let mut p = Parser::new("}done", true, false);
        assert!(p.consume_word("done"));
        assert_eq!(p.pos, 5);
    }
}
