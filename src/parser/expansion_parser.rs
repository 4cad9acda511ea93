//! Expansion Parser
//!
//! Scanners that run on the lexer cursor while a word is being read:
//! - The matched-pair scanner shared by `${...}`, `$[...]`, subscripts and
//!   extglob groups
//! - Parameter expansions (`$name`, `${...}` with operators, length,
//!   indirection and funsubs)
//! - Locale strings (`$"..."`)
//! - `$` dispatch used by words and double quotes

use crate::ast::{format_cmdsub_node, Node, ParamExpansionNode, ParamLengthNode};

use super::parser::Parser;
use super::scan::{
    count_consecutive_dollars_before, is_escape_char_in_backtick, is_expansion_start,
    is_funsub_char, is_name_char, is_name_start, is_simple_param_op, is_special_param,
    is_special_param_unbraced, is_whitespace_no_newline,
};
use super::types::{
    DolbraceState, ParseError, ParseResult, MP_ALLOWESC, MP_ARITH, MP_ARRAYSUB, MP_DOLBRACE,
    MP_DQUOTE, MP_EXTGLOB, MP_NONE,
};

/// Locale string node, its source text and the expansions inside it
pub(super) type LocaleParts = (Node, String, Vec<Node>);

impl Parser {
    // =========================================================================
    // MATCHED PAIRS
    // =========================================================================

    /// Consume up to the `close` that balances an already-consumed `open`,
    /// returning the text between them. Runs on the lexer cursor.
    pub(super) fn parse_matched_pair(
        &mut self,
        open: char,
        close: char,
        flags: u32,
        initial_was_dollar: bool,
    ) -> ParseResult<String> {
        self.enter_nesting()?;
        let result = self.parse_matched_pair_inner(open, close, flags, initial_was_dollar);
        self.leave_nesting();
        result
    }

    fn parse_matched_pair_inner(
        &mut self,
        open: char,
        close: char,
        flags: u32,
        initial_was_dollar: bool,
    ) -> ParseResult<String> {
        let start = self.lexer.pos;
        let mut count = 1usize;
        let mut out = String::new();
        let mut pass_next = false;
        let mut was_dollar = initial_was_dollar;
        let mut was_gtlt = false;

        loop {
            let Some(ch) = self.lexer.advance() else {
                return Err(ParseError::matched_pair(
                    format!("unexpected EOF while looking for matching `{}'", close),
                    start,
                ));
            };
            if flags & MP_DOLBRACE != 0
                && self.lexer.dolbrace_state == DolbraceState::Op
                && !"#%^,~:-=?+/".contains(ch)
            {
                self.lexer.dolbrace_state = DolbraceState::Word;
            }
            if pass_next {
                pass_next = false;
                out.push(ch);
                was_dollar = ch == '$';
                was_gtlt = ch == '<' || ch == '>';
                continue;
            }
            if open == '\'' {
                if ch == close {
                    count -= 1;
                    if count == 0 {
                        break;
                    }
                }
                if ch == '\\' && flags & MP_ALLOWESC != 0 {
                    pass_next = true;
                }
                out.push(ch);
                was_dollar = false;
                was_gtlt = false;
                continue;
            }
            if ch == '\\' {
                if self.lexer.peek() == Some('\n') {
                    self.lexer.advance();
                } else {
                    pass_next = true;
                    out.push(ch);
                }
                was_dollar = false;
                was_gtlt = false;
                continue;
            }
            if ch == close {
                count -= 1;
                if count == 0 {
                    break;
                }
                out.push(ch);
                was_dollar = false;
                was_gtlt = ch == '<' || ch == '>';
                continue;
            }
            if ch == open && open != close {
                if !(flags & MP_DOLBRACE != 0 && open == '{') {
                    count += 1;
                }
                out.push(ch);
                was_dollar = false;
                was_gtlt = ch == '<' || ch == '>';
                continue;
            }
            if matches!(ch, '\'' | '"' | '`') && open != close {
                let nested_flags = match ch {
                    '\'' if was_dollar => flags | MP_ALLOWESC,
                    '"' => flags | MP_DQUOTE,
                    _ => flags,
                };
                out.push(ch);
                let nested = self.parse_matched_pair(ch, ch, nested_flags, false)?;
                out.push_str(&nested);
                out.push(ch);
                was_dollar = false;
                was_gtlt = false;
                continue;
            }
            if ch == '$' && !self.lexer.at_end() && flags & MP_EXTGLOB == 0 {
                if was_dollar {
                    out.push(ch);
                    was_dollar = false;
                    was_gtlt = false;
                    continue;
                }
                match self.lexer.peek() {
                    Some('{') => {
                        if flags & MP_ARITH != 0 {
                            let after = self.lexer.char_at(self.lexer.pos + 1);
                            if !after.is_some_and(is_funsub_char) {
                                out.push(ch);
                                was_dollar = true;
                                was_gtlt = false;
                                continue;
                            }
                        }
                        self.lexer.pos -= 1;
                        self.pos = self.lexer.pos;
                        let param = self.parse_param_expansion(flags & MP_DQUOTE != 0)?;
                        self.lexer.pos = self.pos;
                        was_gtlt = false;
                        match param {
                            Some((_, text)) => {
                                out.push_str(&text);
                                was_dollar = false;
                            }
                            None => {
                                self.lexer.advance_into(&mut out);
                                was_dollar = true;
                            }
                        }
                        continue;
                    }
                    Some('(') => {
                        self.lexer.pos -= 1;
                        self.pos = self.lexer.pos;
                        let mut sub = None;
                        if self.lexer.char_at(self.lexer.pos + 2) == Some('(') {
                            sub = self.parse_arithmetic_expansion()?;
                            self.lexer.pos = self.pos;
                            if sub.is_none() {
                                self.pos = self.lexer.pos;
                            }
                        }
                        if sub.is_none() {
                            sub = self.parse_command_substitution()?;
                            self.lexer.pos = self.pos;
                        }
                        match sub {
                            Some((_, text)) => out.push_str(&text),
                            None => {
                                self.lexer.advance_into(&mut out);
                                self.lexer.advance_into(&mut out);
                            }
                        }
                        was_dollar = false;
                        was_gtlt = false;
                        continue;
                    }
                    Some('[') => {
                        self.lexer.pos -= 1;
                        self.pos = self.lexer.pos;
                        let arith = self.parse_deprecated_arithmetic()?;
                        self.lexer.pos = self.pos;
                        was_gtlt = false;
                        match arith {
                            Some((_, text)) => {
                                out.push_str(&text);
                                was_dollar = false;
                            }
                            None => {
                                self.lexer.advance_into(&mut out);
                                was_dollar = true;
                            }
                        }
                        continue;
                    }
                    _ => {}
                }
            }
            if ch == '(' && was_gtlt {
                let direction = out.pop();
                self.lexer.pos -= 1;
                self.pos = self.lexer.pos;
                let (node, text) = self.parse_process_substitution()?;
                self.lexer.pos = self.pos;
                if node.is_some() || !text.is_empty() {
                    out.push_str(&text);
                } else {
                    out.extend(direction);
                    self.lexer.advance_into(&mut out);
                }
                was_dollar = false;
                was_gtlt = false;
                continue;
            }
            out.push(ch);
            was_dollar = ch == '$';
            was_gtlt = ch == '<' || ch == '>';
        }
        Ok(out)
    }

    fn collect_param_argument(&mut self, flags: u32, was_dollar: bool) -> ParseResult<String> {
        self.parse_matched_pair('{', '}', flags | MP_DOLBRACE, was_dollar)
    }

    // =========================================================================
    // PARAMETER EXPANSION
    // =========================================================================

    /// Parameter expansion at the parser cursor
    pub(super) fn parse_param_expansion(
        &mut self,
        in_dquote: bool,
    ) -> ParseResult<Option<(Node, String)>> {
        self.sync_lexer();
        let result = self.read_param_expansion(in_dquote)?;
        self.pos = self.lexer.pos;
        Ok(result)
    }

    fn read_param_expansion(&mut self, in_dquote: bool) -> ParseResult<Option<(Node, String)>> {
        if self.lexer.peek() != Some('$') {
            return Ok(None);
        }
        let start = self.lexer.pos;
        self.lexer.advance();
        let Some(ch) = self.lexer.peek() else {
            self.lexer.pos = start;
            return Ok(None);
        };
        if ch == '{' {
            self.lexer.advance();
            return self.read_braced_param(start, in_dquote).map(Some);
        }
        if is_special_param_unbraced(ch) || ch.is_ascii_digit() || ch == '#' {
            self.lexer.advance();
            let text = self.lexer_text(start);
            return Ok(Some((param_node(ch.to_string(), "", ""), text)));
        }
        if is_name_start(ch) {
            let name_start = self.lexer.pos;
            while self.lexer.peek().is_some_and(is_name_char) {
                self.lexer.advance();
            }
            let name = self.lexer_text(name_start);
            let text = self.lexer_text(start);
            return Ok(Some((param_node(name, "", ""), text)));
        }
        self.lexer.pos = start;
        Ok(None)
    }

    fn lexer_text(&self, start: usize) -> String {
        self.chars[start..self.lexer.pos].iter().collect()
    }

    /// Name after `${`: special parameter, digits, or identifier with an
    /// optional subscript. Empty when none is present.
    fn consume_param_name(&mut self) -> ParseResult<String> {
        let Some(ch) = self.lexer.peek() else {
            return Ok(String::new());
        };
        if is_special_param(ch) {
            if ch == '$'
                && self
                    .lexer
                    .char_at(self.lexer.pos + 1)
                    .is_some_and(|c| "{'\"".contains(c))
            {
                return Ok(String::new());
            }
            self.lexer.advance();
            return Ok(ch.to_string());
        }
        if ch.is_ascii_digit() {
            let mut name = String::new();
            while self.lexer.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.lexer.advance_into(&mut name);
            }
            return Ok(name);
        }
        if !is_name_start(ch) {
            return Ok(String::new());
        }
        let mut name = String::new();
        while let Some(c) = self.lexer.peek() {
            if is_name_char(c) {
                self.lexer.advance_into(&mut name);
            } else if c == '[' {
                if !self.lexer.param_subscript_has_close(self.lexer.pos) {
                    break;
                }
                self.lexer.advance_into(&mut name);
                let subscript = self.parse_matched_pair('[', ']', MP_ARRAYSUB, false)?;
                name.push_str(&subscript);
                name.push(']');
                break;
            } else {
                break;
            }
        }
        Ok(name)
    }

    /// `${...}` with the cursor just past the brace; `start` is the `$`
    fn read_braced_param(&mut self, start: usize, in_dquote: bool) -> ParseResult<(Node, String)> {
        if self.lexer.at_end() {
            return Err(unclosed_brace(start));
        }
        let saved_dolbrace = self.lexer.dolbrace_state;
        self.lexer.dolbrace_state = DolbraceState::Param;
        let result = self.read_braced_param_body(start, in_dquote);
        self.lexer.dolbrace_state = saved_dolbrace;
        result
    }

    fn read_braced_param_body(
        &mut self,
        start: usize,
        in_dquote: bool,
    ) -> ParseResult<(Node, String)> {
        let ch = self.lexer.peek();
        if ch.is_some_and(is_funsub_char) {
            return self.parse_funsub(start);
        }
        if ch == Some('#') {
            self.lexer.advance();
            let param = self.consume_param_name()?;
            if !param.is_empty() && self.lexer.peek() == Some('}') {
                self.lexer.advance();
                let text = self.lexer_text(start);
                return Ok((Node::ParamLength(ParamLengthNode { param }), text));
            }
            self.lexer.pos = start + 2;
        }
        if ch == Some('!') {
            if let Some(found) = self.read_indirect_param(start)? {
                return Ok(found);
            }
            self.lexer.pos = start + 2;
        }

        let mut param = self.consume_param_name()?;
        if param.is_empty() {
            let next = self.lexer.peek();
            let op_follows = next.is_some_and(|c| "-=+?".contains(c))
                || (next == Some(':')
                    && self
                        .lexer
                        .char_at(self.lexer.pos + 1)
                        .is_some_and(is_simple_param_op));
            if !op_follows {
                let content = self.parse_matched_pair('{', '}', MP_DOLBRACE, false)?;
                let text = format!("${{{}}}", content);
                return Ok((param_node(content, "", ""), text));
            }
            param = String::new();
        }
        match self.lexer.peek() {
            None => return Err(unclosed_brace(start)),
            Some('}') => {
                self.lexer.advance();
                let text = self.lexer_text(start);
                return Ok((param_node(param, "", ""), text));
            }
            Some(_) => {}
        }

        let mut op = self.lexer.consume_param_operator();
        if op.is_empty() {
            op = self.read_fallback_param_operator()?;
        }
        self.lexer.update_dolbrace_for_op(&op, !param.is_empty());
        let flags = if in_dquote { MP_DQUOTE } else { MP_NONE };
        let mut arg = self.collect_param_argument(flags, param.ends_with('$'))?;

        if (op == "<" || op == ">") && arg.starts_with('(') && arg.ends_with(')') && arg.len() >= 2 {
            let inner = &arg[1..arg.len() - 1];
            let mut sub = self.nested_parser(inner, true);
            if let Ok(Some(parsed)) = sub.parse_nested_list() {
                if sub.at_end() {
                    arg = format!("({})", format_cmdsub_node(&parsed, 0, true, false, true));
                }
            }
        }
        let text = format!("${{{}{}{}}}", param, op, arg);
        Ok((param_node(param, op, arg), text))
    }

    /// `${!name}`, `${!name@}`/`${!name*}` and `${!name op arg}`; None when
    /// the text after `!` is not an indirection
    fn read_indirect_param(&mut self, start: usize) -> ParseResult<Option<(Node, String)>> {
        self.lexer.advance();
        self.skip_lexer_blanks();
        let param = self.consume_param_name()?;
        if param.is_empty() {
            return Ok(None);
        }
        self.skip_lexer_blanks();
        match self.lexer.peek() {
            Some('}') => {
                self.lexer.advance();
                let text = self.lexer_text(start);
                return Ok(Some((indirect_node(param, "", ""), text)));
            }
            Some(c @ ('@' | '*')) => {
                self.lexer.advance();
                let trailing = self.parse_matched_pair('{', '}', MP_DOLBRACE, false)?;
                let text = self.lexer_text(start);
                let name = format!("{}{}{}", param, c, trailing);
                return Ok(Some((indirect_node(name, "", ""), text)));
            }
            _ => {}
        }
        let mut op = self.lexer.consume_param_operator();
        if op.is_empty() {
            if let Some(c) = self.lexer.peek() {
                if !"}\"'`".contains(c) {
                    self.lexer.advance();
                    op = c.to_string();
                }
            }
        }
        if !op.is_empty() {
            let arg = self.parse_matched_pair('{', '}', MP_DOLBRACE, false)?;
            let text = self.lexer_text(start);
            return Ok(Some((indirect_node(param, op, arg), text)));
        }
        if self.lexer.at_end() {
            return Err(unclosed_brace(start));
        }
        Ok(None)
    }

    fn skip_lexer_blanks(&mut self) {
        while self.lexer.peek().is_some_and(is_whitespace_no_newline) {
            self.lexer.advance();
        }
    }

    /// Operator text for `${name<c>...}` when `<c>` is not a known operator
    fn read_fallback_param_operator(&mut self) -> ParseResult<String> {
        let next = self.lexer.char_at(self.lexer.pos + 1);
        match self.lexer.peek() {
            Some('$') if matches!(next, Some('"' | '\'')) => {
                let dollars = 1 + count_consecutive_dollars_before(&self.chars, self.lexer.pos);
                if dollars % 2 == 1 {
                    Ok(String::new())
                } else {
                    self.lexer.advance();
                    Ok("$".to_string())
                }
            }
            Some('`') => {
                let backtick_pos = self.lexer.pos;
                self.lexer.advance();
                while let Some(c) = self.lexer.peek() {
                    if c == '`' {
                        break;
                    }
                    if c == '\\'
                        && self
                            .lexer
                            .char_at(self.lexer.pos + 1)
                            .is_some_and(is_escape_char_in_backtick)
                    {
                        self.lexer.advance();
                    }
                    self.lexer.advance();
                }
                if self.lexer.at_end() {
                    return Err(ParseError::matched_pair("Unterminated backtick", backtick_pos));
                }
                self.lexer.advance();
                Ok("`".to_string())
            }
            Some('$') if next == Some('{') => Ok(String::new()),
            Some('\'' | '"') => Ok(String::new()),
            Some('\\') => {
                let mut op = String::new();
                self.lexer.advance_into(&mut op);
                self.lexer.advance_into(&mut op);
                Ok(op)
            }
            Some(c) => {
                self.lexer.advance();
                Ok(c.to_string())
            }
            None => Ok(String::new()),
        }
    }

    // =========================================================================
    // LOCALE STRINGS
    // =========================================================================

    /// `$"..."` on the lexer cursor. Line continuations inside are dropped.
    pub(super) fn read_locale_string(&mut self) -> ParseResult<Option<LocaleParts>> {
        if self.lexer.peek() != Some('$') || self.lexer.char_at(self.lexer.pos + 1) != Some('"') {
            return Ok(None);
        }
        let start = self.lexer.pos;
        self.lexer.pos += 2;
        let mut content = String::new();
        let mut inner_parts = Vec::new();
        let mut found_close = false;

        while let Some(ch) = self.lexer.peek() {
            let next = self.lexer.char_at(self.lexer.pos + 1);
            if ch == '"' {
                self.lexer.advance();
                found_close = true;
                break;
            }
            if ch == '\\' && next.is_some() {
                if next == Some('\n') {
                    self.lexer.pos += 2;
                } else {
                    self.lexer.advance_into(&mut content);
                    self.lexer.advance_into(&mut content);
                }
                continue;
            }
            let sub = if ch == '$' && next == Some('(') {
                self.pos = self.lexer.pos;
                let mut sub = None;
                if self.lexer.char_at(self.lexer.pos + 2) == Some('(') {
                    sub = self.parse_arithmetic_expansion()?;
                    self.lexer.pos = self.pos;
                    self.pos = self.lexer.pos;
                }
                if sub.is_none() && is_expansion_start(&self.chars, self.lexer.pos, "$(") {
                    sub = self.parse_command_substitution()?;
                }
                sub
            } else if ch == '$' {
                self.pos = self.lexer.pos;
                self.parse_param_expansion(false)?
            } else if ch == '`' {
                self.pos = self.lexer.pos;
                self.parse_backtick_substitution()?
            } else {
                self.lexer.advance_into(&mut content);
                continue;
            };
            self.lexer.pos = self.pos;
            match sub {
                Some((node, text)) => {
                    inner_parts.push(node);
                    content.push_str(&text);
                }
                None => self.lexer.advance_into(&mut content),
            }
        }
        if !found_close {
            return Err(ParseError::matched_pair(
                "unexpected EOF while looking for matching `\"'",
                start,
            ));
        }
        let text = format!("$\"{}\"", content);
        Ok(Some((
            Node::LocaleString(crate::ast::LocaleStringNode { content }),
            text,
            inner_parts,
        )))
    }

    // =========================================================================
    // $ DISPATCH
    // =========================================================================

    /// Parse the `$` expansion at the parser cursor, appending its text to
    /// `chunks` and its node to `parts`. False when nothing was recognised.
    pub(super) fn parse_dollar_expansion(
        &mut self,
        chunks: &mut Vec<String>,
        parts: &mut Vec<Node>,
        in_dquote: bool,
    ) -> ParseResult<bool> {
        let next = self.peek_at(1);
        let found = if next == Some('(') && self.peek_at(2) == Some('(') {
            match self.parse_arithmetic_expansion()? {
                Some(found) => Some(found),
                None => self.parse_command_substitution()?,
            }
        } else if next == Some('[') {
            self.parse_deprecated_arithmetic()?
        } else if next == Some('(') {
            self.parse_command_substitution()?
        } else {
            self.parse_param_expansion(in_dquote)?
        };
        Ok(match found {
            Some((node, text)) => {
                parts.push(node);
                chunks.push(text);
                true
            }
            None => false,
        })
    }
}

fn param_node(param: impl Into<String>, op: impl Into<String>, arg: impl Into<String>) -> Node {
    Node::ParamExpansion(ParamExpansionNode::new(param, op, arg))
}

fn indirect_node(param: impl Into<String>, op: impl Into<String>, arg: impl Into<String>) -> Node {
    Node::ParamIndirect(ParamExpansionNode::new(param, op, arg))
}

fn unclosed_brace(start: usize) -> ParseError {
    ParseError::matched_pair("unexpected EOF looking for `}'", start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexer_parser(src: &str, pos: usize) -> Parser {
        let mut p = Parser::new(src, false, false);
        p.lexer.pos = pos;
        p
    }

    #[test]
    fn test_matched_pair_nested_quotes_and_depth() {
        let mut p = lexer_parser("(a (b) ')' \"x)\")rest", 1);
        let inner = p.parse_matched_pair('(', ')', MP_NONE, false).unwrap();
        assert_eq!(inner, "a (b) ')' \"x)\"");
        assert_eq!(p.lexer.peek(), Some('r'));
    }

    #[test]
    fn test_matched_pair_eof_is_matched_pair_error() {
        let mut p = lexer_parser("{abc", 1);
        let err = p.parse_matched_pair('{', '}', MP_NONE, false).unwrap_err();
        assert!(err.is_matched_pair());
        assert_eq!(err.pos, 1);
        assert!(err.message.contains("`}'"));
    }

    #[test]
    fn test_matched_pair_drops_line_continuation() {
        let mut p = lexer_parser("[a\\\nb]", 1);
        assert_eq!(p.parse_matched_pair('[', ']', MP_NONE, false).unwrap(), "ab");
    }

    #[test]
    fn test_read_param_expansion_forms() {
        let mut p = lexer_parser("$HOME/x", 0);
        let (node, text) = p.read_param_expansion(false).unwrap().unwrap();
        assert_eq!(text, "$HOME");
        assert_eq!(node, param_node("HOME", "", ""));

        let mut p = lexer_parser("${#arr[@]}", 0);
        let (node, text) = p.read_param_expansion(false).unwrap().unwrap();
        assert_eq!(text, "${#arr[@]}");
        assert_eq!(
            node,
            Node::ParamLength(ParamLengthNode {
                param: "arr[@]".into()
            })
        );

        let mut p = lexer_parser("${x:-default}", 0);
        let (node, _) = p.read_param_expansion(false).unwrap().unwrap();
        assert_eq!(node, param_node("x", ":-", "default"));

        let mut p = lexer_parser("${!ref}", 0);
        let (node, _) = p.read_param_expansion(false).unwrap().unwrap();
        assert_eq!(node, indirect_node("ref", "", ""));
    }

    #[test]
    fn test_read_param_expansion_declines_plain_dollar() {
        let mut p = lexer_parser("$ x", 0);
        assert!(p.read_param_expansion(false).unwrap().is_none());
        assert_eq!(p.lexer.pos, 0);
    }

    #[test]
    fn test_unterminated_braced_param() {
        let mut p = lexer_parser("${x", 0);
        assert!(p.read_param_expansion(false).unwrap_err().is_matched_pair());
    }

    #[test]
    fn test_read_locale_string_collects_inner_parts() {
        let mut p = lexer_parser("$\"hi $USER\"", 0);
        let (node, text, parts) = p.read_locale_string().unwrap().unwrap();
        assert_eq!(text, "$\"hi $USER\"");
        assert_eq!(node.kind(), "locale");
        assert_eq!(parts, vec![param_node("USER", "", "")]);
    }
}
