//! Compound Command Parser
//!
//! Handles parsing of compound commands: subshells, brace groups, `(( ))`,
//! if, while, until, for, select, case, coproc and function definitions, plus
//! the dispatcher that picks between them and a simple command.
//!
//! Keywords are recognised through the lexer (`lex_consume_word`) so that a
//! reserved word is only special in command position; bodies are read with
//! `parse_list_until` which stops in front of the closing keyword.

use crate::ast::{
    ArithmeticCommandNode, BraceGroupNode, CaseNode, CasePatternNode, CoprocNode, ForArithNode,
    ForNode, FunctionNode, IfNode, Node, SelectNode, SubshellNode, UntilNode, WhileNode,
};

use super::parser::{is_reserved, Parser};
use super::scan::{
    is_expansion_start, is_extglob_prefix, is_metachar, is_quote, is_valid_identifier,
    is_whitespace, looks_like_assignment,
};
use super::types::{
    ParseError, ParseResult, COMPOUND_KEYWORDS, PST_CASEPAT, PST_CASESTMT, PST_SUBSHELL,
};

/// Reserved words that may only follow the construct that opened them
const CLOSING_WORDS: [&str; 8] = ["fi", "then", "elif", "else", "done", "esac", "do", "in"];

impl Parser {
    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// One command of a pipeline: a compound command, a function definition
    /// or a simple command
    pub(super) fn parse_compound_command(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        let Some(ch) = self.peek() else {
            return Ok(None);
        };
        if ch == '(' && self.peek_at(1) == Some('(') {
            if let Some(node) = self.parse_arithmetic_command()? {
                return Ok(Some(node));
            }
        }
        if ch == '(' {
            return self.parse_subshell();
        }
        if ch == '{' {
            if let Some(node) = self.parse_brace_group()? {
                return Ok(Some(node));
            }
        }
        if ch == '[' && self.peek_at(1) == Some('[') {
            if let Some(node) = self.parse_conditional_expr()? {
                return Ok(Some(node));
            }
        }

        let mut reserved = self.lex_peek_reserved_word()?;
        if reserved.is_none() && self.in_process_sub {
            // `}done` inside <( ... ) where the brace closed a group
            let word = self.peek_word();
            if let Some(keyword) = word.strip_prefix('}').filter(|k| !k.is_empty()) {
                if is_reserved(keyword)
                    || matches!(keyword, "{" | "}" | "[[" | "]]" | "!" | "time")
                {
                    reserved = Some(keyword.to_string());
                }
            }
        }

        match reserved.as_deref() {
            Some(word) if CLOSING_WORDS.contains(&word) => Err(
                self.error_at_token(format!("Unexpected reserved word '{}'", word)),
            ),
            Some("if") => self.parse_if(),
            Some("while") => self.parse_while(),
            Some("until") => self.parse_until(),
            Some("for") => self.parse_for(),
            Some("select") => self.parse_select(),
            Some("case") => self.parse_case(),
            Some("function") => self.parse_function(),
            Some("coproc") => self.parse_coproc(),
            _ => match self.parse_function()? {
                Some(func) => Ok(Some(func)),
                None => self.parse_command(),
            },
        }
    }

    /// Body of a function definition: any compound command, tried in a
    /// fixed order
    fn parse_function_body(&mut self) -> ParseResult<Option<Node>> {
        if let Some(node) = self.parse_brace_group()? {
            return Ok(Some(node));
        }
        if self.starts_with("((") {
            if let Some(node) = self.parse_arithmetic_command()? {
                return Ok(Some(node));
            }
        }
        if let Some(node) = self.parse_subshell()? {
            return Ok(Some(node));
        }
        if let Some(node) = self.parse_conditional_expr()? {
            return Ok(Some(node));
        }
        if let Some(node) = self.parse_if()? {
            return Ok(Some(node));
        }
        if let Some(node) = self.parse_while()? {
            return Ok(Some(node));
        }
        if let Some(node) = self.parse_until()? {
            return Ok(Some(node));
        }
        if let Some(node) = self.parse_for()? {
            return Ok(Some(node));
        }
        if let Some(node) = self.parse_case()? {
            return Ok(Some(node));
        }
        self.parse_select()
    }

    // =========================================================================
    // GROUPING
    // =========================================================================

    pub(super) fn parse_subshell(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if self.peek() != Some('(') {
            return Ok(None);
        }
        self.pos += 1;
        self.set_state(PST_SUBSHELL);
        let body = self.parse_list(true);
        let body = match body {
            Ok(Some(body)) => body,
            Ok(None) => {
                self.clear_state(PST_SUBSHELL);
                return Err(ParseError::new("Expected command in subshell", self.pos));
            }
            Err(e) => {
                self.clear_state(PST_SUBSHELL);
                return Err(e);
            }
        };
        self.skip_whitespace();
        self.clear_state(PST_SUBSHELL);
        if self.peek() != Some(')') {
            return Err(ParseError::new("Expected ) to close subshell", self.pos));
        }
        self.pos += 1;
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::Subshell(SubshellNode {
            body: Box::new(body),
            redirects,
        })))
    }

    /// `(( expr ))`. None when the parentheses turn out to be two nested
    /// subshells, e.g. `((a) )`.
    pub(super) fn parse_arithmetic_command(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.starts_with("((") {
            return Ok(None);
        }
        let saved = self.pos;
        self.pos += 2;
        let content_start = self.pos;
        let mut depth = 1usize;
        while let Some(c) = self.peek() {
            match c {
                '\'' => {
                    self.pos += 1;
                    while self.peek().is_some_and(|c| c != '\'') {
                        self.pos += 1;
                    }
                    if !self.at_end() {
                        self.pos += 1;
                    }
                }
                '"' => {
                    self.pos += 1;
                    while let Some(c) = self.peek() {
                        if c == '\\' && self.peek_at(1).is_some() {
                            self.pos += 2;
                        } else {
                            self.pos += 1;
                            if c == '"' {
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
                    if depth == 1 && self.peek_at(1) == Some(')') {
                        break;
                    }
                    depth -= 1;
                    if depth == 0 {
                        self.pos = saved;
                        return Ok(None);
                    }
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
        if self.at_end() {
            return Err(ParseError::matched_pair(
                "unexpected EOF looking for `))'",
                saved,
            ));
        }
        let raw_content = self.slice(content_start, self.pos).replace("\\\n", "");
        self.pos += 2;
        let expression = self.parse_arith_expr(&raw_content)?;
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::ArithmeticCommand(ArithmeticCommandNode {
            expression,
            redirects,
            raw_content,
        })))
    }

    pub(super) fn parse_brace_group(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.lex_consume_word("{")? {
            return Ok(None);
        }
        self.skip_whitespace_and_newlines();
        let Some(body) = self.parse_list(true)? else {
            return Err(self.error_at_token("Expected command in brace group"));
        };
        self.skip_whitespace();
        if !self.lex_consume_word("}")? {
            return Err(self.error_at_token("Expected } to close brace group"));
        }
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::BraceGroup(BraceGroupNode {
            body: Box::new(body),
            redirects,
        })))
    }

    /// Body list after a keyword, required to be non-empty
    fn required_list(&mut self, stop_words: &[&str], missing: &str) -> ParseResult<Node> {
        match self.parse_list_until(stop_words)? {
            Some(list) => Ok(list),
            None => Err(self.error_at_token(missing)),
        }
    }

    /// Skip to and consume the closing keyword, or fail with `message`
    fn expect_keyword(&mut self, keyword: &str, message: &str) -> ParseResult<()> {
        self.skip_whitespace_and_newlines();
        if self.lex_consume_word(keyword)? {
            Ok(())
        } else {
            Err(self.error_at_token(message))
        }
    }

    // =========================================================================
    // IF
    // =========================================================================

    pub(super) fn parse_if(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.lex_consume_word("if")? {
            return Ok(None);
        }
        let (condition, then_body, else_body) = self.parse_if_clauses("if")?;
        self.expect_keyword("fi", "Expected 'fi' to close if statement")?;
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::If(IfNode {
            condition: Box::new(condition),
            then_body: Box::new(then_body),
            else_body: else_body.map(Box::new),
            redirects,
        })))
    }

    /// `cond; then body` followed by any `elif`/`else` tail, stopping in
    /// front of `fi`. `keyword` is the word that introduced the condition.
    fn parse_if_clauses(&mut self, keyword: &str) -> ParseResult<(Node, Node, Option<Node>)> {
        let condition =
            self.required_list(&["then"], &format!("Expected condition after '{}'", keyword))?;
        self.expect_keyword("then", &format!("Expected 'then' after {} condition", keyword))?;
        let then_body =
            self.required_list(&["elif", "else", "fi"], "Expected commands after 'then'")?;
        self.skip_whitespace_and_newlines();

        let else_body = if self.lex_is_at_reserved_word("elif")? {
            self.lex_consume_word("elif")?;
            let (condition, then_body, else_body) = self.parse_if_clauses("elif")?;
            Some(Node::If(IfNode {
                condition: Box::new(condition),
                then_body: Box::new(then_body),
                else_body: else_body.map(Box::new),
                redirects: Vec::new(),
            }))
        } else if self.lex_is_at_reserved_word("else")? {
            self.lex_consume_word("else")?;
            Some(self.required_list(&["fi"], "Expected commands after 'else'")?)
        } else {
            None
        };
        Ok((condition, then_body, else_body))
    }

    // =========================================================================
    // LOOPS
    // =========================================================================

    pub(super) fn parse_while(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.lex_consume_word("while")? {
            return Ok(None);
        }
        let (condition, body) = self.parse_condition_loop("while")?;
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::While(WhileNode {
            condition: Box::new(condition),
            body: Box::new(body),
            redirects,
        })))
    }

    pub(super) fn parse_until(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.lex_consume_word("until")? {
            return Ok(None);
        }
        let (condition, body) = self.parse_condition_loop("until")?;
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::Until(UntilNode {
            condition: Box::new(condition),
            body: Box::new(body),
            redirects,
        })))
    }

    /// `cond; do body; done` shared by while and until
    fn parse_condition_loop(&mut self, keyword: &str) -> ParseResult<(Node, Node)> {
        let condition =
            self.required_list(&["do"], &format!("Expected condition after '{}'", keyword))?;
        self.expect_keyword("do", &format!("Expected 'do' after {} condition", keyword))?;
        let body = self.required_list(&["done"], "Expected commands after 'do'")?;
        self.expect_keyword("done", &format!("Expected 'done' to close {} loop", keyword))?;
        Ok((condition, body))
    }

    pub(super) fn parse_for(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.lex_consume_word("for")? {
            return Ok(None);
        }
        self.skip_whitespace();
        if self.starts_with("((") {
            return self.parse_for_arith().map(Some);
        }

        let var = if self.peek() == Some('$') {
            match self.parse_word(false, false, false)? {
                Some(word) => word.value,
                None => return Err(self.error_at_token("Expected variable name after 'for'")),
            }
        } else {
            let name = self.peek_word();
            if name.is_empty() {
                return Err(self.error_at_token("Expected variable name after 'for'"));
            }
            self.consume_word(&name);
            name
        };
        self.skip_whitespace();
        if self.peek() == Some(';') {
            self.pos += 1;
        }
        self.skip_whitespace_and_newlines();

        let mut words = None;
        if self.lex_is_at_reserved_word("in")? {
            self.lex_consume_word("in")?;
            self.skip_whitespace();
            let saw_delimiter = matches!(self.peek(), Some(';' | '\n'));
            if self.peek() == Some(';') {
                self.pos += 1;
            }
            self.skip_whitespace_and_newlines();
            let mut list = Vec::new();
            loop {
                self.skip_whitespace();
                let Some(c) = self.peek() else {
                    break;
                };
                if c == ';' || c == '\n' {
                    if c == ';' {
                        self.pos += 1;
                    }
                    break;
                }
                if self.lex_is_at_reserved_word("do")? {
                    if saw_delimiter {
                        break;
                    }
                    return Err(self.error_at_token("Expected ';' or newline before 'do'"));
                }
                match self.parse_word(false, false, false)? {
                    Some(word) => list.push(word),
                    None => break,
                }
            }
            words = Some(list);
        }

        self.skip_whitespace_and_newlines();
        if self.peek() == Some('{') {
            let Some(Node::BraceGroup(group)) = self.parse_brace_group()? else {
                return Err(self.error_at_token("Expected brace group in for loop"));
            };
            let redirects = self.collect_redirects()?;
            return Ok(Some(Node::For(ForNode {
                var,
                words,
                body: group.body,
                redirects,
            })));
        }
        if !self.lex_consume_word("do")? {
            return Err(self.error_at_token("Expected 'do' in for loop"));
        }
        let body = self.required_list(&["done"], "Expected commands after 'do'")?;
        self.expect_keyword("done", "Expected 'done' to close for loop")?;
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::For(ForNode {
            var,
            words,
            body: Box::new(body),
            redirects,
        })))
    }

    /// `for (( init; cond; incr ))` with the cursor on the first `(`
    fn parse_for_arith(&mut self) -> ParseResult<Node> {
        self.pos += 2;
        let mut parts: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut paren_depth = 0usize;
        while let Some(ch) = self.peek() {
            match ch {
                '(' => {
                    paren_depth += 1;
                    self.advance_into(&mut current);
                }
                ')' if paren_depth > 0 => {
                    paren_depth -= 1;
                    self.advance_into(&mut current);
                }
                ')' if self.peek_at(1) == Some(')') => {
                    parts.push(current.trim_start_matches([' ', '\t']).to_string());
                    self.pos += 2;
                    break;
                }
                ';' if paren_depth == 0 => {
                    parts.push(current.trim_start_matches([' ', '\t']).to_string());
                    current.clear();
                    self.pos += 1;
                }
                _ => self.advance_into(&mut current),
            }
        }
        let Ok([init, cond, incr]) = <[String; 3]>::try_from(parts) else {
            return Err(ParseError::new(
                "Expected three expressions in for ((;;))",
                self.pos,
            ));
        };
        self.skip_whitespace();
        if self.peek() == Some(';') {
            self.pos += 1;
        }
        self.skip_whitespace_and_newlines();
        let body = self.parse_loop_body("for loop")?;
        let redirects = self.collect_redirects()?;
        Ok(Node::ForArith(ForArithNode {
            init,
            cond,
            incr,
            body: Box::new(body),
            redirects,
        }))
    }

    pub(super) fn parse_select(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.lex_consume_word("select")? {
            return Ok(None);
        }
        self.skip_whitespace();
        let var = self.peek_word();
        if var.is_empty() {
            return Err(self.error_at_token("Expected variable name after 'select'"));
        }
        self.consume_word(&var);
        self.skip_whitespace();
        if self.peek() == Some(';') {
            self.pos += 1;
        }
        self.skip_whitespace_and_newlines();

        let mut words = None;
        if self.lex_is_at_reserved_word("in")? {
            self.lex_consume_word("in")?;
            self.skip_whitespace_and_newlines();
            let mut list = Vec::new();
            loop {
                self.skip_whitespace();
                let Some(c) = self.peek() else {
                    break;
                };
                if matches!(c, ';' | '\n' | '{') {
                    if c == ';' {
                        self.pos += 1;
                    }
                    break;
                }
                if self.lex_is_at_reserved_word("do")? {
                    break;
                }
                match self.parse_word(false, false, false)? {
                    Some(word) => list.push(word),
                    None => break,
                }
            }
            words = Some(list);
        }

        self.skip_whitespace_and_newlines();
        let body = self.parse_loop_body("select")?;
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::Select(SelectNode {
            var,
            words,
            body: Box::new(body),
            redirects,
        })))
    }

    /// `do ... done` or `{ ... }` after a for-arith or select header
    fn parse_loop_body(&mut self, context: &str) -> ParseResult<Node> {
        if self.peek() == Some('{') {
            return match self.parse_brace_group()? {
                Some(Node::BraceGroup(group)) => Ok(*group.body),
                _ => Err(self.error_at_token(format!("Expected brace group body in {}", context))),
            };
        }
        if self.lex_consume_word("do")? {
            let body = self.required_list(&["done"], "Expected commands after 'do'")?;
            self.expect_keyword("done", &format!("Expected 'done' to close {}", context))?;
            return Ok(body);
        }
        Err(self.error_at_token(format!("Expected 'do' or '{{' in {}", context)))
    }

    // =========================================================================
    // CASE
    // =========================================================================

    pub(super) fn parse_case(&mut self) -> ParseResult<Option<Node>> {
        if !self.consume_word("case") {
            return Ok(None);
        }
        self.set_state(PST_CASESTMT);
        let result = self.parse_case_inner();
        self.clear_state(PST_CASEPAT);
        self.clear_state(PST_CASESTMT);
        result.map(Some)
    }

    fn parse_case_inner(&mut self) -> ParseResult<Node> {
        self.skip_whitespace();
        let Some(word) = self.parse_word(false, false, false)? else {
            return Err(self.error_at_token("Expected word after 'case'"));
        };
        self.expect_keyword("in", "Expected 'in' after case word")?;
        self.skip_whitespace_and_newlines();

        let mut patterns = Vec::new();
        self.set_state(PST_CASEPAT);
        loop {
            self.skip_whitespace_and_newlines();
            if self.lex_is_at_reserved_word("esac")? && !self.esac_is_pattern() {
                break;
            }
            self.skip_whitespace_and_newlines();
            if self.peek() == Some('(') {
                self.pos += 1;
                self.skip_whitespace_and_newlines();
            }
            let pattern = self.read_case_pattern();
            if pattern.is_empty() {
                return Err(self.error_at_token("Expected pattern in case statement"));
            }

            self.skip_whitespace();
            let mut body = None;
            if self.lex_peek_case_terminator()?.is_none() {
                self.skip_whitespace_and_newlines();
                if !self.at_end()
                    && !self.lex_is_at_reserved_word("esac")?
                    && self.lex_peek_case_terminator()?.is_none()
                {
                    body = self.parse_list_until(&["esac"])?;
                    self.skip_whitespace();
                }
            }
            let terminator = self.consume_case_terminator()?;
            self.skip_whitespace_and_newlines();
            patterns.push(CasePatternNode {
                pattern,
                body: body.map(Box::new),
                terminator: terminator.to_string(),
            });
        }
        self.clear_state(PST_CASEPAT);
        self.expect_keyword("esac", "Expected 'esac' to close case statement")?;
        self.clear_state(PST_CASESTMT);
        let redirects = self.collect_redirects()?;
        Ok(Node::Case(CaseNode {
            word,
            patterns,
            redirects,
        }))
    }

    /// Whether an `esac` in pattern position is really a pattern, as in
    /// `esac) cmd;;`
    fn esac_is_pattern(&mut self) -> bool {
        let saved = self.pos;
        self.skip_whitespace();
        while self.peek().is_some_and(|c| !is_metachar(c) && !is_quote(c)) {
            self.pos += 1;
        }
        self.skip_whitespace();
        let mut is_pattern = false;
        if self.peek() == Some(')') && self.eof_token != Some(')') {
            self.pos += 1;
            self.skip_whitespace();
            is_pattern = self.peek().is_some_and(|c| c == ';' || !(c == '\n' || c == ')'));
        }
        self.pos = saved;
        is_pattern
    }

    /// Raw pattern text up to the unbalanced `)`, which is consumed.
    /// Unquoted blanks outside extglob groups are dropped.
    fn read_case_pattern(&mut self) -> String {
        let mut pattern = String::new();
        let mut extglob_depth = 0usize;
        while let Some(ch) = self.peek() {
            if ch == ')' {
                if extglob_depth == 0 {
                    self.pos += 1;
                    break;
                }
                extglob_depth -= 1;
                self.advance_into(&mut pattern);
            } else if ch == '\\' {
                if self.peek_at(1) == Some('\n') {
                    self.pos += 2;
                } else {
                    self.advance_into(&mut pattern);
                    if !self.at_end() {
                        self.advance_into(&mut pattern);
                    }
                }
            } else if is_expansion_start(&self.chars, self.pos, "$(") {
                self.advance_into(&mut pattern);
                self.advance_into(&mut pattern);
                if self.peek() == Some('(') {
                    self.advance_into(&mut pattern);
                    let mut depth = 2usize;
                    while let Some(c) = self.peek() {
                        if depth == 0 {
                            break;
                        }
                        match c {
                            '(' => depth += 1,
                            ')' => depth -= 1,
                            _ => {}
                        }
                        self.advance_into(&mut pattern);
                    }
                } else {
                    extglob_depth += 1;
                }
            } else if ch == '(' && extglob_depth > 0 {
                self.advance_into(&mut pattern);
                extglob_depth += 1;
            } else if self.extglob && is_extglob_prefix(ch) && self.peek_at(1) == Some('(') {
                self.advance_into(&mut pattern);
                self.advance_into(&mut pattern);
                extglob_depth += 1;
            } else if ch == '[' {
                self.read_case_bracket(&mut pattern);
            } else if ch == '\'' {
                self.advance_into(&mut pattern);
                while self.peek().is_some_and(|c| c != '\'') {
                    self.advance_into(&mut pattern);
                }
                if !self.at_end() {
                    self.advance_into(&mut pattern);
                }
            } else if ch == '"' {
                self.advance_into(&mut pattern);
                while self.peek().is_some_and(|c| c != '"') {
                    if self.peek() == Some('\\') && self.peek_at(1).is_some() {
                        self.advance_into(&mut pattern);
                    }
                    self.advance_into(&mut pattern);
                }
                if !self.at_end() {
                    self.advance_into(&mut pattern);
                }
            } else if is_whitespace(ch) {
                if extglob_depth > 0 {
                    self.advance_into(&mut pattern);
                } else {
                    self.pos += 1;
                }
            } else {
                self.advance_into(&mut pattern);
            }
        }
        pattern
    }

    /// `[` in a pattern: copy a whole bracket class when one closes before
    /// the pattern ends, otherwise just the bracket
    fn read_case_bracket(&mut self, pattern: &mut String) {
        let negation = |c: Option<char>| matches!(c, Some('^' | '!'));
        let mut scan = self.pos + 1;
        if negation(self.chars.get(scan).copied()) {
            scan += 1;
        }
        let mut leading_bracket = false;
        if self.chars.get(scan) == Some(&']') {
            scan += 1;
            leading_bracket = true;
        }
        let mut is_class = false;
        let mut depth = 0usize;
        while let Some(&c) = self.chars.get(scan) {
            match c {
                ']' if depth == 0 => {
                    is_class = true;
                    break;
                }
                '[' => depth += 1,
                ')' | '|' if depth == 0 => break,
                _ => {}
            }
            scan += 1;
        }

        self.advance_into(pattern);
        if !is_class {
            return;
        }
        if negation(self.peek()) {
            self.advance_into(pattern);
        }
        if leading_bracket && self.peek() == Some(']') {
            self.advance_into(pattern);
        }
        while self.peek().is_some_and(|c| c != ']') {
            self.advance_into(pattern);
        }
        if !self.at_end() {
            self.advance_into(pattern);
        }
    }

    fn consume_case_terminator(&mut self) -> ParseResult<&'static str> {
        match self.lex_peek_case_terminator()? {
            Some(term) => {
                self.lex_next_token()?;
                Ok(term)
            }
            None => Ok(";;"),
        }
    }

    // =========================================================================
    // COPROC & FUNCTIONS
    // =========================================================================

    pub(super) fn parse_coproc(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.lex_consume_word("coproc")? {
            return Ok(None);
        }
        self.skip_whitespace();

        if let Some(body) = self.parse_coproc_body(self.peek())? {
            return Ok(Some(coproc(body, String::new())));
        }
        if self.at_compound_keyword()? {
            if let Some(body) = self.parse_compound_command()? {
                return Ok(Some(coproc(body, String::new())));
            }
        }

        let word_start = self.pos;
        let name = self.peek_word();
        if !name.is_empty() {
            while self.peek().is_some_and(|c| !is_metachar(c) && !is_quote(c)) {
                self.pos += 1;
            }
            self.skip_whitespace();
            if is_valid_identifier(&name) {
                let body = match self.peek() {
                    ch @ Some('{' | '(') => self.parse_coproc_body(ch)?,
                    _ if self.at_compound_keyword()? => self.parse_compound_command()?,
                    _ => None,
                };
                if let Some(body) = body {
                    return Ok(Some(coproc(body, name)));
                }
            }
            self.pos = word_start;
        }

        match self.parse_command()? {
            Some(body) => Ok(Some(coproc(body, String::new()))),
            None => Err(ParseError::new("Expected command after coproc", self.pos)),
        }
    }

    /// Brace group, `(( ))` or subshell when `ch` opens one
    fn parse_coproc_body(&mut self, ch: Option<char>) -> ParseResult<Option<Node>> {
        match ch {
            Some('{') => self.parse_brace_group(),
            Some('(') => {
                if self.peek_at(1) == Some('(') {
                    if let Some(node) = self.parse_arithmetic_command()? {
                        return Ok(Some(node));
                    }
                }
                self.parse_subshell()
            }
            _ => Ok(None),
        }
    }

    fn at_compound_keyword(&mut self) -> ParseResult<bool> {
        Ok(self
            .lex_peek_reserved_word()?
            .is_some_and(|w| COMPOUND_KEYWORDS.contains(w.as_str())))
    }

    /// `function name [()] body` or `name () body`. None, with the cursor
    /// restored, when the input is not a function definition.
    pub(super) fn parse_function(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if self.at_end() {
            return Ok(None);
        }
        let saved = self.pos;

        if self.lex_is_at_reserved_word("function")? {
            self.lex_consume_word("function")?;
            self.skip_whitespace();
            let name = self.peek_word();
            if name.is_empty() {
                self.pos = saved;
                return Ok(None);
            }
            self.consume_word(&name);
            self.skip_whitespace();
            if self.starts_with("()") {
                self.pos += 2;
            }
            return self.finish_function(name).map(Some);
        }

        let name = self.peek_word();
        if name.is_empty() || is_reserved(&name) || looks_like_assignment(&name) {
            return Ok(None);
        }
        self.skip_whitespace();
        let name_start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !is_metachar(c) && !is_quote(c) && c != '(' && c != ')')
        {
            self.pos += 1;
        }
        let name = self.slice(name_start, self.pos);
        if name.is_empty() || has_open_brace_expansion(&name) {
            self.pos = saved;
            return Ok(None);
        }

        let after_name = self.pos;
        self.skip_whitespace();
        // `foo*()`, `@()` and friends are extglob patterns, not definitions
        let glob_suffix = name.ends_with(['*', '?', '@', '+', '!', '$']);
        if (self.pos == after_name && glob_suffix) || self.peek() != Some('(') {
            self.pos = saved;
            return Ok(None);
        }
        self.pos += 1;
        self.skip_whitespace();
        if self.peek() != Some(')') {
            self.pos = saved;
            return Ok(None);
        }
        self.pos += 1;
        self.finish_function(name).map(Some)
    }

    fn finish_function(&mut self, name: String) -> ParseResult<Node> {
        self.skip_whitespace_and_newlines();
        match self.parse_function_body()? {
            Some(body) => Ok(Node::Function(FunctionNode {
                name,
                body: Box::new(body),
            })),
            None => Err(ParseError::new("Expected function body", self.pos)),
        }
    }
}

fn coproc(command: Node, name: String) -> Node {
    Node::Coproc(CoprocNode {
        command: Box::new(command),
        name,
    })
}

/// A name like `${x` whose `${` is still open belongs to a word, not a
/// function name
fn has_open_brace_expansion(name: &str) -> bool {
    let chars: Vec<char> = name.chars().collect();
    let mut depth = 0isize;
    let mut i = 0;
    while i < chars.len() {
        if is_expansion_start(&chars, i, "${") {
            depth += 1;
            i += 2;
            continue;
        }
        if chars[i] == '}' {
            depth -= 1;
        }
        i += 1;
    }
    depth > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::WordNode;

    fn word_values(words: &[WordNode]) -> Vec<&str> {
        words.iter().map(|w| w.value.as_str()).collect()
    }

    fn first(src: &str) -> Node {
        let mut p = Parser::new(src, false, false);
        p.parse_compound_command().unwrap().unwrap()
    }

    fn err(src: &str) -> String {
        crate::parser::parse(src, false).unwrap_err().message
    }

    #[test]
    fn test_subshell_and_brace_group() {
        let Node::Subshell(s) = first("(a; b) >out") else {
            panic!("expected subshell");
        };
        assert_eq!(s.body.kind(), "list");
        assert_eq!(s.redirects.len(), 1);

        let Node::BraceGroup(b) = first("{ a; }") else {
            panic!("expected brace group");
        };
        assert_eq!(b.body.kind(), "list");
    }

    #[test]
    fn test_arithmetic_command_keeps_raw_text() {
        let Node::ArithmeticCommand(a) = first("(( x = 1 + \\\n2 ))") else {
            panic!("expected arith command");
        };
        assert_eq!(a.raw_content, " x = 1 + 2 ");
        assert!(a.expression.is_some());
    }

    #[test]
    fn test_double_paren_subshell_fallback() {
        assert_eq!(first("((a) )").kind(), "subshell");
    }

    #[test]
    fn test_if_elif_else_chain() {
        let Node::If(i) = first("if a; then b; elif c; then d; elif e; then f; else g; fi") else {
            panic!("expected if");
        };
        let Some(Node::If(elif)) = i.else_body.as_deref() else {
            panic!("expected elif");
        };
        let Some(Node::If(inner)) = elif.else_body.as_deref() else {
            panic!("expected nested elif");
        };
        assert_eq!(inner.else_body.as_ref().map(|n| n.kind()), Some("command"));
    }

    #[test]
    fn test_loops() {
        assert_eq!(first("while a; do b; done").kind(), "while");
        assert_eq!(first("until a; do b; done").kind(), "until");

        let Node::For(f) = first("for x in 1 2 3; do echo $x; done") else {
            panic!("expected for");
        };
        assert_eq!(f.var, "x");
        assert_eq!(word_values(f.words.as_deref().unwrap_or_default()), ["1", "2", "3"]);

        let Node::For(f) = first("for x do echo; done") else {
            panic!("expected for");
        };
        assert!(f.words.is_none());

        let Node::For(f) = first("for x in a; { echo; }") else {
            panic!("expected for");
        };
        assert_eq!(f.body.kind(), "list");
    }

    #[test]
    fn test_for_arith_and_select() {
        let Node::ForArith(f) = first("for ((i=0; i<3; i++)); do echo; done") else {
            panic!("expected for-arith");
        };
        assert_eq!((f.init.as_str(), f.cond.as_str(), f.incr.as_str()), ("i=0", "i<3", "i++"));

        let Node::Select(s) = first("select opt in a b; do break; done") else {
            panic!("expected select");
        };
        assert_eq!(s.var, "opt");
        assert_eq!(s.words.map(|w| w.len()), Some(2));
    }

    #[test]
    fn test_case_patterns() {
        let Node::Case(c) = first("case $x in\n a|b) one;;\n (c*) two;&\n [ab]) ;;&\n *) ;;\nesac") else {
            panic!("expected case");
        };
        let pats: Vec<(&str, &str)> = c
            .patterns
            .iter()
            .map(|p| (p.pattern.as_str(), p.terminator.as_str()))
            .collect();
        assert_eq!(pats, [("a|b", ";;"), ("c*", ";&"), ("[ab]", ";;&"), ("*", ";;")]);
        assert!(c.patterns[2].body.is_none());
    }

    #[test]
    fn test_case_esac_as_pattern() {
        let Node::Case(c) = first("case x in esac) echo;; esac") else {
            panic!("expected case");
        };
        assert_eq!(c.patterns[0].pattern, "esac");
    }

    #[test]
    fn test_functions() {
        let Node::Function(f) = first("foo() { echo; }") else {
            panic!("expected function");
        };
        assert_eq!(f.name, "foo");
        let Node::Function(f) = first("function bar ( echo )") else {
            panic!("expected function");
        };
        assert_eq!(f.body.kind(), "subshell");
        assert_eq!(first("x=1 cmd").kind(), "command");
    }

    #[test]
    fn test_coproc_forms() {
        let Node::Coproc(c) = first("coproc { cat; }") else {
            panic!("expected coproc");
        };
        assert_eq!(c.name, "");
        let Node::Coproc(c) = first("coproc worker { cat; }") else {
            panic!("expected coproc");
        };
        assert_eq!(c.name, "worker");
        let Node::Coproc(c) = first("coproc cat file") else {
            panic!("expected coproc");
        };
        assert_eq!(c.command.kind(), "command");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(err("fi"), "Unexpected reserved word 'fi'");
        assert_eq!(err("if a; then b"), "Expected 'fi' to close if statement");
        assert_eq!(err("if a; then fi"), "Expected commands after 'then'");
        assert_eq!(err("while a; do b"), "Expected 'done' to close while loop");
        assert_eq!(err("( a"), "Expected ) to close subshell");
        assert_eq!(err("{ a"), "Expected } to close brace group");
        assert_eq!(err("case x in a) b;;"), "Expected pattern in case statement");
        assert_eq!(err("for ((i=0; i<3)) do a; done"), "Expected three expressions in for ((;;))");
        assert_eq!(err("select x in a; b"), "Expected 'do' or '{' in select");
        assert_eq!(err("for x in a do b; done"), "Expected ';' or newline before 'do'");
        assert_eq!(err("f() x"), "Expected function body");
    }

    #[test]
    fn test_unterminated_arith_command() {
        let e = crate::parser::parse("(( 1 + 2", false).unwrap_err();
        assert!(e.is_matched_pair());
        assert_eq!(e.pos, 0);
    }
}
