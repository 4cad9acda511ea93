//! Simple Command & Redirection Parser
//!
//! Handles parsing of simple commands and their redirections:
//! - `[fd|{var}]op target` for every redirection operator
//! - `&>`/`&>>` and the `>&`/`<&` duplication forms
//! - here-documents: the delimiter is read where the operator appears, the
//!   body after the next newline (see `gather_heredoc_bodies`)

use crate::ast::{CommandNode, HereDocNode, Node, RedirectNode, WordNode};
use tracing::trace;

use super::parser::Parser;
use super::scan::{
    assignment, count_trailing_backslashes, is_expansion_start, is_metachar, is_redirect_char,
    normalize_heredoc_delimiter,
};
use super::types::{
    ParseError, ParseResult, PendingHeredoc, ANSI_C_ESCAPES, ASSIGNMENT_BUILTINS, PST_HEREDOC,
};

impl Parser {
    // =========================================================================
    // SIMPLE COMMANDS
    // =========================================================================

    /// Words and redirections up to a command terminator. None when neither
    /// was found.
    pub(super) fn parse_command(&mut self) -> ParseResult<Option<Node>> {
        let mut cmd = CommandNode::default();
        loop {
            self.skip_whitespace();
            if self.lex_is_command_terminator()? {
                break;
            }
            if cmd.words.is_empty()
                && matches!(self.lex_peek_reserved_word()?.as_deref(), Some("}" | "]]"))
            {
                break;
            }
            if let Some(redirect) = self.parse_redirect()? {
                cmd.redirects.push(redirect);
                continue;
            }
            let all_assignments = cmd.words.iter().all(is_assignment_word);
            let in_assign_builtin = cmd
                .words
                .first()
                .is_some_and(|w| ASSIGNMENT_BUILTINS.contains(w.value.as_str()));
            let at_command_start =
                cmd.words.is_empty() || (all_assignments && cmd.redirects.is_empty());
            match self.parse_word(at_command_start, false, in_assign_builtin)? {
                Some(word) => cmd.words.push(word),
                None => break,
            }
        }
        if cmd.words.is_empty() && cmd.redirects.is_empty() {
            return Ok(None);
        }
        Ok(Some(Node::Command(cmd)))
    }

    /// Redirections trailing a compound command
    pub(super) fn collect_redirects(&mut self) -> ParseResult<Vec<Node>> {
        let mut redirects = Vec::new();
        loop {
            self.skip_whitespace();
            match self.parse_redirect()? {
                Some(redirect) => redirects.push(redirect),
                None => break,
            }
        }
        Ok(redirects)
    }

    // =========================================================================
    // REDIRECTIONS
    // =========================================================================

    /// One redirection, or None with the cursor restored when the input
    /// does not start with one
    pub(super) fn parse_redirect(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if self.at_end() {
            return Ok(None);
        }
        let start = self.pos;

        let varfd = self.parse_varfd();
        let mut fd: Option<String> = None;
        if varfd.is_none() && self.peek().is_some_and(|c| c.is_ascii_digit()) {
            let mut digits = String::new();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance_into(&mut digits);
            }
            fd = Some(digits);
        }
        let has_prefix = fd.is_some() || varfd.is_some();

        if self.starts_with("&>") {
            if has_prefix {
                self.pos = start;
                return Ok(None);
            }
            self.pos += 2;
            let op = if self.peek() == Some('>') {
                self.pos += 1;
                "&>>"
            } else {
                "&>"
            };
            self.skip_whitespace();
            let target = self.expect_redirect_target(op)?;
            return Ok(Some(redirect(op.to_string(), target, None)));
        }

        let Some(first) = self.peek().filter(|&c| is_redirect_char(c)) else {
            self.pos = start;
            return Ok(None);
        };
        // <( and >( without a descriptor are process substitutions
        if fd.is_none() && self.peek_at(1) == Some('(') {
            self.pos = start;
            return Ok(None);
        }
        self.pos += 1;

        // `>&2` keeps `>` and lets the target carry `&2`
        let dup_allowed =
            !has_prefix && self.peek_at(1).map_or(true, |c| !(c.is_ascii_digit() || c == '-'));
        let mut strip_tabs = false;
        let op = match (first, self.peek()) {
            ('>', Some('>')) => {
                self.pos += 1;
                ">>"
            }
            ('<', Some('<')) => {
                self.pos += 1;
                match self.peek() {
                    Some('<') => {
                        self.pos += 1;
                        "<<<"
                    }
                    Some('-') => {
                        self.pos += 1;
                        strip_tabs = true;
                        "<<"
                    }
                    _ => "<<",
                }
            }
            ('<', Some('>')) => {
                self.pos += 1;
                "<>"
            }
            ('>', Some('|')) => {
                self.pos += 1;
                ">|"
            }
            ('>', Some('&')) if dup_allowed => {
                self.pos += 1;
                ">&"
            }
            ('<', Some('&')) if dup_allowed => {
                self.pos += 1;
                "<&"
            }
            ('>', _) => ">",
            _ => "<",
        };

        let fd_num = fd.as_deref().and_then(|d| d.parse::<i64>().ok());
        if op == "<<" {
            return self.parse_heredoc(fd_num, strip_tabs).map(Some);
        }

        let op = match (&varfd, &fd) {
            (Some(var), _) => format!("{{{}}}{}", var, op),
            (None, Some(digits)) => format!("{}{}", normalize_fd(digits), op),
            (None, None) => op.to_string(),
        };

        let target = if self.peek() == Some('&') {
            self.pos += 1;
            self.skip_whitespace();
            self.parse_dup_target(&op)?
        } else {
            self.skip_whitespace();
            if (op == ">&" || op == "<&")
                && self.peek() == Some('-')
                && self.peek_at(1).is_some_and(|c| !is_metachar(c))
            {
                self.pos += 1;
                WordNode::literal("&-")
            } else {
                self.expect_redirect_target(&op)?
            }
        };
        Ok(Some(redirect(op, target, fd_num)))
    }

    /// `{name}` or `{name[sub]}` naming a variable to receive the descriptor.
    /// The cursor is left after `}` on success and untouched otherwise.
    fn parse_varfd(&mut self) -> Option<String> {
        if self.peek() != Some('{') {
            return None;
        }
        let saved = self.pos;
        self.pos += 1;
        let mut name = String::new();
        let mut in_bracket = false;
        while let Some(ch) = self.peek().filter(|&c| !is_redirect_char(c)) {
            match ch {
                '}' if !in_bracket => break,
                '[' => in_bracket = true,
                ']' => in_bracket = false,
                c if c.is_alphanumeric() || c == '_' => {}
                c if in_bracket && !is_metachar(c) => {}
                _ => break,
            }
            name.push(ch);
            self.pos += 1;
        }
        if self.peek() == Some('}') && is_valid_varfd(&name) {
            self.pos += 1;
            Some(name)
        } else {
            self.pos = saved;
            None
        }
    }

    /// Target after `op&`: a descriptor, `-` to close, or any word, kept
    /// with its leading `&`
    fn parse_dup_target(&mut self, op: &str) -> ParseResult<WordNode> {
        if self.peek() == Some('-') && self.peek_at(1).is_some_and(|c| !is_metachar(c)) {
            self.pos += 1;
            return Ok(WordNode::literal("&-"));
        }
        if self.peek().is_some_and(|c| c.is_ascii_digit() || c == '-') {
            let word_start = self.pos;
            let mut target = String::new();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance_into(&mut target);
            }
            if self.peek() == Some('-') {
                self.advance_into(&mut target);
            }
            if target == "-" || self.peek().map_or(true, is_metachar) {
                return Ok(WordNode::literal(format!("&{}", target)));
            }
            self.pos = word_start;
        }
        let word = self.expect_redirect_target(op)?;
        Ok(WordNode::new(format!("&{}", word.value), word.parts))
    }

    fn expect_redirect_target(&mut self, op: &str) -> ParseResult<WordNode> {
        match self.parse_word(false, false, false)? {
            Some(word) => Ok(word),
            None => Err(ParseError::new(
                format!("Expected target for redirect {}", op),
                self.pos,
            )),
        }
    }

    // =========================================================================
    // HERE-DOCUMENTS
    // =========================================================================

    /// `<<[-]DELIM`: registers the here-document and returns its node. The
    /// body is read later, after the line ends.
    fn parse_heredoc(&mut self, fd: Option<i64>, strip_tabs: bool) -> ParseResult<Node> {
        let start_pos = self.pos;
        self.set_state(PST_HEREDOC);
        let (delimiter, quoted) = self.parse_heredoc_delimiter();
        self.clear_state(PST_HEREDOC);

        // A speculative re-parse meets the same operator again
        let existing = self
            .pending_heredocs
            .iter()
            .find(|h| h.start_pos == start_pos && h.delimiter == delimiter);
        let id = match existing {
            Some(h) => h.id,
            None => {
                let id = self.heredoc_bodies.len();
                self.heredoc_bodies.push(None);
                self.pending_heredocs.push(PendingHeredoc {
                    id,
                    delimiter: delimiter.clone(),
                    strip_tabs,
                    quoted,
                    start_pos,
                });
                id
            }
        };
        Ok(Node::HereDoc(HereDocNode {
            id,
            delimiter,
            content: String::new(),
            strip_tabs,
            quoted,
            fd,
            complete: false,
            start_pos,
        }))
    }

    /// Delimiter word with quotes removed, and whether any quoting appeared
    pub(super) fn parse_heredoc_delimiter(&mut self) -> (String, bool) {
        self.skip_whitespace();
        let mut quoted = false;
        let mut delim = String::new();
        loop {
            while let Some(ch) = self.peek().filter(|&c| !is_metachar(c)) {
                match ch {
                    '"' => {
                        quoted = true;
                        self.pos += 1;
                        while self.peek().is_some_and(|c| c != '"') {
                            self.advance_into(&mut delim);
                        }
                        if !self.at_end() {
                            self.pos += 1;
                        }
                    }
                    '\'' => {
                        quoted = true;
                        self.pos += 1;
                        while let Some(c) = self.peek().filter(|&c| c != '\'') {
                            if c == '\n' {
                                self.saw_newline_in_single_quote = true;
                            }
                            self.advance_into(&mut delim);
                        }
                        if !self.at_end() {
                            self.pos += 1;
                        }
                    }
                    '\\' => {
                        self.pos += 1;
                        match self.peek() {
                            Some('\n') => self.pos += 1,
                            Some(_) => {
                                quoted = true;
                                self.advance_into(&mut delim);
                            }
                            None => {}
                        }
                    }
                    '$' if self.peek_at(1) == Some('\'') => {
                        quoted = true;
                        self.pos += 2;
                        self.read_ansi_c_delimiter(&mut delim);
                    }
                    '$' if is_expansion_start(&self.chars, self.pos, "$(") => {
                        self.advance_into(&mut delim);
                        self.advance_into(&mut delim);
                        self.copy_balanced(&mut delim, '(', ')', 1);
                    }
                    '$' if self.peek_at(1) == Some('{') => {
                        if self.odd_dollar_run() {
                            self.advance_into(&mut delim);
                        } else {
                            self.advance_into(&mut delim);
                            self.advance_into(&mut delim);
                            self.copy_braced_param(&mut delim);
                        }
                    }
                    '$' if self.peek_at(1) == Some('[') => {
                        if self.odd_dollar_run() {
                            self.advance_into(&mut delim);
                        } else {
                            self.advance_into(&mut delim);
                            self.advance_into(&mut delim);
                            self.copy_balanced(&mut delim, '[', ']', 1);
                        }
                    }
                    '`' => self.copy_backtick_delimiter(&mut delim),
                    _ => self.advance_into(&mut delim),
                }
            }
            // `<(...)` and `>(...)` glue onto the delimiter word
            if self.peek().is_some_and(is_redirect_char) && self.peek_at(1) == Some('(') {
                self.advance_into(&mut delim);
                self.advance_into(&mut delim);
                self.copy_balanced(&mut delim, '(', ')', 1);
                continue;
            }
            break;
        }
        (delim, quoted)
    }

    /// Body of `$'...'` in a delimiter, with single-character escapes decoded
    fn read_ansi_c_delimiter(&mut self, delim: &mut String) {
        while let Some(c) = self.peek().filter(|&c| c != '\'') {
            if c == '\\' && self.peek_at(1).is_some() {
                self.pos += 1;
                match self.peek().and_then(|e| ANSI_C_ESCAPES.get(&e)) {
                    Some(&byte) => {
                        delim.push(char::from(byte));
                        self.pos += 1;
                    }
                    None => self.advance_into(delim),
                }
            } else {
                self.advance_into(delim);
            }
        }
        if !self.at_end() {
            self.pos += 1;
        }
    }

    /// Copy up to and including the bracket that brings `depth` to zero
    fn copy_balanced(&mut self, delim: &mut String, open: char, close: char, mut depth: usize) {
        while depth > 0 {
            let Some(c) = self.peek() else {
                break;
            };
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
            }
            self.advance_into(delim);
        }
    }

    fn copy_braced_param(&mut self, delim: &mut String) {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            if c == '{' {
                depth += 1;
            } else if c == '}' {
                self.advance_into(delim);
                if depth == 0 {
                    break;
                }
                depth -= 1;
                if depth == 0 && self.peek().is_some_and(is_metachar) {
                    break;
                }
                continue;
            }
            self.advance_into(delim);
        }
    }

    fn copy_backtick_delimiter(&mut self, delim: &mut String) {
        self.advance_into(delim);
        while let Some(c) = self.peek().filter(|&c| c != '`') {
            match c {
                '\'' => {
                    self.advance_into(delim);
                    while self.peek().is_some_and(|c| c != '\'' && c != '`') {
                        self.advance_into(delim);
                    }
                    if self.peek() == Some('\'') {
                        self.advance_into(delim);
                    }
                }
                '"' => {
                    self.advance_into(delim);
                    while self.peek().is_some_and(|c| c != '"' && c != '`') {
                        if self.peek() == Some('\\') && self.peek_at(1).is_some() {
                            self.advance_into(delim);
                        }
                        self.advance_into(delim);
                    }
                    if self.peek() == Some('"') {
                        self.advance_into(delim);
                    }
                }
                '\\' if self.peek_at(1).is_some() => {
                    self.advance_into(delim);
                    self.advance_into(delim);
                }
                _ => self.advance_into(delim),
            }
        }
        if !self.at_end() {
            self.advance_into(delim);
        }
    }

    /// Whether the `$` under the cursor is escaped by an odd run of `$`
    /// before it (`$$` is a parameter, not an opener)
    fn odd_dollar_run(&self) -> bool {
        let before = &self.chars[..self.pos];
        let run = before.iter().rev().take_while(|&&c| c == '$').count();
        let escaped = before.len() > run && before[before.len() - run - 1] == '\\';
        let count = if escaped { run as isize - 1 } else { run as isize };
        count.rem_euclid(2) == 1
    }

    /// One logical body line starting at the cursor and the index of the
    /// newline (or end) that closes it. Unquoted bodies join lines ending in
    /// an odd number of backslashes.
    fn read_heredoc_line(&self, quoted: bool) -> (String, usize) {
        let line_end_from = |from: usize| {
            self.chars[from..]
                .iter()
                .position(|&c| c == '\n')
                .map_or(self.chars.len(), |i| from + i)
        };
        let mut line_end = line_end_from(self.pos);
        let mut line = self.slice(self.pos, line_end);
        if !quoted {
            while line_end < self.chars.len() && count_trailing_backslashes(&line) % 2 == 1 {
                line.pop();
                let next_start = line_end + 1;
                line_end = line_end_from(next_start);
                line.push_str(&self.slice(next_start, line_end));
            }
        }
        (line, line_end)
    }

    /// Compare a body line against the delimiter, after `<<-` tab stripping.
    /// Returns the match and the line as compared.
    fn line_matches_delimiter<'a>(
        line: &'a str,
        delimiter: &str,
        strip_tabs: bool,
    ) -> (bool, &'a str) {
        let check = if strip_tabs {
            line.trim_start_matches('\t')
        } else {
            line
        };
        let matches = normalize_heredoc_delimiter(check) == normalize_heredoc_delimiter(delimiter);
        (matches, check)
    }

    /// Read the bodies of all pending here-documents, in order, starting at
    /// the cursor (just past a newline)
    pub(super) fn gather_heredoc_bodies(&mut self) {
        let pending = std::mem::take(&mut self.pending_heredocs);
        for heredoc in &pending {
            let body_start = self.pos;
            let body = self.read_heredoc_body(heredoc);
            trace!(
                id = heredoc.id,
                delimiter = %heredoc.delimiter,
                body_start,
                body_end = self.pos,
                "gathered here-document body"
            );
            if let Some(slot) = self.heredoc_bodies.get_mut(heredoc.id) {
                *slot = Some(body);
            }
        }
    }

    fn read_heredoc_body(&mut self, heredoc: &PendingHeredoc) -> String {
        let len = self.chars.len();
        let mut content = String::new();
        while self.pos < len {
            let line_start = self.pos;
            let (line, line_end) = self.read_heredoc_line(heredoc.quoted);
            let (matches, check) =
                Self::line_matches_delimiter(&line, &heredoc.delimiter, heredoc.strip_tabs);
            if matches {
                self.pos = if line_end < len { line_end + 1 } else { line_end };
                break;
            }

            // Delimiter glued to the `)` closing a command or process
            // substitution
            let glued = normalize_heredoc_delimiter(check)
                .starts_with(&normalize_heredoc_delimiter(&heredoc.delimiter));
            if glued && (self.eof_token == Some(')') || (line_end >= len && self.in_process_sub)) {
                let tabs = line.chars().count() - check.chars().count();
                self.pos = line_start + tabs + heredoc.delimiter.chars().count();
                break;
            }

            let body_line = if heredoc.strip_tabs { check } else { line.as_str() };
            content.push_str(body_line);
            if line_end < len {
                content.push('\n');
                self.pos = line_end + 1;
            } else {
                // A final unquoted line ending in a backslash has no newline
                if heredoc.quoted || count_trailing_backslashes(&line) % 2 == 0 {
                    content.push('\n');
                }
                self.pos = len;
            }
        }
        content
    }
}

fn redirect(op: String, target: WordNode, fd: Option<i64>) -> Node {
    Node::Redirect(RedirectNode { op, target, fd })
}

fn is_assignment_word(word: &WordNode) -> bool {
    let chars: Vec<char> = word.value.chars().collect();
    assignment(&chars, 0).is_some()
}

/// Descriptor digits as a number; out-of-range values keep their spelling
fn normalize_fd(digits: &str) -> String {
    digits
        .parse::<u64>()
        .map_or_else(|_| digits.to_string(), |n| n.to_string())
}

/// `name` or `name[subscript]` with a valid identifier as the name
fn is_valid_varfd(name: &str) -> bool {
    let base = match (name.find('['), name.rfind(']')) {
        (None, None) => name,
        (Some(left), Some(right)) if right == name.len() - 1 && right > left + 1 => &name[..left],
        _ => return false,
    };
    let mut chars = base.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(src: &str) -> CommandNode {
        let mut p = Parser::new(src, false, false);
        match p.parse_command().unwrap() {
            Some(Node::Command(cmd)) => cmd,
            other => panic!("expected command, got {:?}", other),
        }
    }

    fn redirect_ops(src: &str) -> Vec<(String, String)> {
        command(src)
            .redirects
            .into_iter()
            .map(|r| match r {
                Node::Redirect(r) => (r.op, r.target.value),
                Node::HereDoc(h) => ("<<".to_string(), h.delimiter),
                other => panic!("unexpected {:?}", other),
            })
            .collect()
    }

    fn pair(op: &str, target: &str) -> (String, String) {
        (op.to_string(), target.to_string())
    }

    #[test]
    fn test_words_and_redirects_interleave() {
        let cmd = command("echo a >out b 2>>err");
        let words: Vec<&str> = cmd.words.iter().map(|w| w.value.as_str()).collect();
        assert_eq!(words, ["echo", "a", "b"]);
        assert_eq!(cmd.redirects.len(), 2);
    }

    #[test]
    fn test_redirect_operators() {
        assert_eq!(
            redirect_ops("cmd <in >|clobber <>rw &>all &>>app"),
            [pair("<", "in"), pair(">|", "clobber"), pair("<>", "rw"), pair("&>", "all"), pair("&>>", "app")]
        );
    }

    #[test]
    fn test_descriptor_duplication() {
        assert_eq!(
            redirect_ops("cmd 2>&1 >&- 3<&0 >& file 1>&-"),
            [pair("2>", "&1"), pair(">", "&-"), pair("3<", "&0"), pair(">&", "file"), pair("1>", "&-")]
        );
    }

    #[test]
    fn test_varfd_and_fd_prefix() {
        assert_eq!(
            redirect_ops("exec {fd}>log {arr[1]}<in 007>x"),
            [pair("{fd}>", "log"), pair("{arr[1]}<", "in"), pair("7>", "x")]
        );
        // not a valid name: the brace is an ordinary word
        assert_eq!(command("echo {1}>x").words.len(), 2);
    }

    #[test]
    fn test_here_string_and_procsub_not_redirects() {
        assert_eq!(redirect_ops("cat <<<word"), [pair("<<<", "word")]);
        let cmd = command("diff <(a) >(b)");
        assert!(cmd.redirects.is_empty());
        assert_eq!(cmd.words.len(), 3);
    }

    #[test]
    fn test_missing_target() {
        let mut p = Parser::new("cat >", false, false);
        let err = p.parse_command().unwrap_err();
        assert_eq!(err.message, "Expected target for redirect >");
    }

    #[test]
    fn test_heredoc_body_gathered_after_newline() {
        let nodes = crate::parser::parse("cat <<EOF\nline 1\n  line 2\nEOF\necho done", false).unwrap();
        let Node::Command(cmd) = &nodes[0] else {
            panic!("expected command");
        };
        let Node::HereDoc(h) = &cmd.redirects[0] else {
            panic!("expected heredoc");
        };
        assert_eq!(h.content, "line 1\n  line 2\n");
        assert!(h.complete);
        assert_eq!(nodes[1].kind(), "command");
    }

    #[test]
    fn test_heredoc_strip_tabs_and_quoting() {
        let nodes = crate::parser::parse("cat <<-'E F'\n\tx $y\n\tE F\n", false).unwrap();
        let Node::Command(cmd) = &nodes[0] else {
            panic!("expected command");
        };
        let Node::HereDoc(h) = &cmd.redirects[0] else {
            panic!("expected heredoc");
        };
        assert_eq!(h.delimiter, "E F");
        assert!(h.quoted && h.strip_tabs);
        assert_eq!(h.content, "x $y\n");
    }

    #[test]
    fn test_two_heredocs_on_one_line() {
        let nodes = crate::parser::parse("cat <<A <<B\na\nA\nb\nB\n", false).unwrap();
        let Node::Command(cmd) = &nodes[0] else {
            panic!("expected command");
        };
        let bodies: Vec<&str> = cmd
            .redirects
            .iter()
            .filter_map(|r| match r {
                Node::HereDoc(h) => Some(h.content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(bodies, ["a\n", "b\n"]);
    }

    #[test]
    fn test_unterminated_heredoc_runs_to_end() {
        let nodes = crate::parser::parse("cat <<EOF\nabc\\", false).unwrap();
        let Node::Command(cmd) = &nodes[0] else {
            panic!("expected command");
        };
        let Node::HereDoc(h) = &cmd.redirects[0] else {
            panic!("expected heredoc");
        };
        assert_eq!(h.content, "abc\\");
    }

    #[test]
    fn test_heredoc_delimiter_forms() {
        let mut p = Parser::new("\"EO\"F rest", false, false);
        assert_eq!(p.parse_heredoc_delimiter(), ("EOF".to_string(), true));
        let mut p = Parser::new("\\EOF", false, false);
        assert_eq!(p.parse_heredoc_delimiter(), ("EOF".to_string(), true));
        let mut p = Parser::new("$'a\\tb'", false, false);
        assert_eq!(p.parse_heredoc_delimiter(), ("a\tb".to_string(), true));
        let mut p = Parser::new("$(x y)z", false, false);
        assert_eq!(p.parse_heredoc_delimiter(), ("$(x y)z".to_string(), false));
    }

    #[test]
    fn test_varfd_validation() {
        assert!(is_valid_varfd("fd"));
        assert!(is_valid_varfd("a[1]"));
        assert!(!is_valid_varfd("1a"));
        assert!(!is_valid_varfd("a[]"));
        assert!(!is_valid_varfd(""));
    }
}
