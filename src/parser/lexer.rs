//! Lexer for Bash Scripts
//!
//! The lexer turns the source into operator and word tokens on demand. It
//! handles:
//! - Longest-match operator recognition
//! - Blank and comment skipping
//! - The one-token lookahead cache and the flags it is keyed by
//! - Self-contained scans (single quotes, `$'...'`, `${` operators)
//!
//! Reading a word needs the parser (words embed command substitutions), so
//! `next_token`/`read_word` live on `Parser` and drive this struct's cursor.

use crate::ast::{AnsiCQuoteNode, Node, WordNode};

use super::scan::{is_metachar, is_redirect_char, is_simple_param_op, is_whitespace};
use super::types::{
    DolbraceState, ParseError, ParseResult, WordContext, PST_CASEPAT, PST_EOFTOKEN,
};

/// Token types for bash lexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // End of input
    Eof,

    Word,
    Newline,

    // Separators and list operators
    Semicolon,   // ;
    Amp,         // &
    Pipe,        // |
    PipeAmp,     // |&
    AndAnd,      // &&
    OrOr,        // ||
    DSemi,       // ;;
    SemiAnd,     // ;&
    SemiSemiAnd, // ;;&

    // Grouping
    LParen, // (
    RParen, // )

    // Redirections
    Less,      // <
    Great,     // >
    DLess,     // <<
    DGreat,    // >>
    LessAnd,   // <&
    GreatAnd,  // >&
    LessGreat, // <>
    DLessDash, // <<-
    Clobber,   // >|
    TLess,     // <<<
    AndGreat,  // &>
    AndDGreat, // &>>
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eof => "EOF",
            Self::Word => "WORD",
            Self::Newline => "NEWLINE",
            Self::Semicolon => ";",
            Self::Amp => "&",
            Self::Pipe => "|",
            Self::PipeAmp => "|&",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::DSemi => ";;",
            Self::SemiAnd => ";&",
            Self::SemiSemiAnd => ";;&",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::Less => "<",
            Self::Great => ">",
            Self::DLess => "<<",
            Self::DGreat => ">>",
            Self::LessAnd => "<&",
            Self::GreatAnd => ">&",
            Self::LessGreat => "<>",
            Self::DLessDash => "<<-",
            Self::Clobber => ">|",
            Self::TLess => "<<<",
            Self::AndGreat => "&>",
            Self::AndDGreat => "&>>",
        }
    }

    fn from_operator(op: &str) -> Option<Self> {
        Some(match op {
            ";;&" => Self::SemiSemiAnd,
            "<<-" => Self::DLessDash,
            "<<<" => Self::TLess,
            "&>>" => Self::AndDGreat,
            "&&" => Self::AndAnd,
            "||" => Self::OrOr,
            ";;" => Self::DSemi,
            ";&" => Self::SemiAnd,
            "<<" => Self::DLess,
            ">>" => Self::DGreat,
            "<&" => Self::LessAnd,
            ">&" => Self::GreatAnd,
            "<>" => Self::LessGreat,
            ">|" => Self::Clobber,
            "&>" => Self::AndGreat,
            "|&" => Self::PipeAmp,
            ";" => Self::Semicolon,
            "|" => Self::Pipe,
            "&" => Self::Amp,
            "(" => Self::LParen,
            ")" => Self::RParen,
            "<" => Self::Less,
            ">" => Self::Great,
            "\n" => Self::Newline,
            _ => return None,
        })
    }

    /// True for every operator token (not words, newlines or EOF)
    pub fn is_operator(&self) -> bool {
        !matches!(self, Self::Eof | Self::Word | Self::Newline)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    pub pos: usize,
    /// Present for `Word` tokens
    pub word: Option<WordNode>,
}

impl Token {
    pub fn new(token_type: TokenType, value: impl Into<String>, pos: usize) -> Self {
        Self {
            token_type,
            value: value.into(),
            pos,
            word: None,
        }
    }

    pub fn eof(pos: usize) -> Self {
        Self::new(TokenType::Eof, "", pos)
    }

    pub fn word(word: WordNode, pos: usize) -> Self {
        Self {
            token_type: TokenType::Word,
            value: word.value.clone(),
            pos,
            word: Some(word),
        }
    }

    pub fn is_word(&self, value: &str) -> bool {
        self.token_type == TokenType::Word && self.value == value
    }
}

/// Cursor and lexical state. The parser keeps its own copy of the flags and
/// pushes them here before each pull.
#[derive(Debug, Clone)]
pub struct Lexer {
    pub chars: Vec<char>,
    pub pos: usize,
    pub token_cache: Option<Token>,
    pub parser_state: u32,
    pub dolbrace_state: DolbraceState,
    pub eof_token: Option<char>,
    pub extglob: bool,
    pub word_context: WordContext,
    pub at_command_start: bool,
    pub in_array_literal: bool,
    pub in_assign_builtin: bool,
    /// Position after the cached token was read
    pub post_read_pos: usize,
    pub cached_word_context: WordContext,
    pub cached_at_command_start: bool,
    pub cached_in_array_literal: bool,
    pub cached_in_assign_builtin: bool,
}

impl Lexer {
    pub fn new(chars: Vec<char>, extglob: bool) -> Self {
        Self {
            chars,
            pos: 0,
            token_cache: None,
            parser_state: 0,
            dolbrace_state: DolbraceState::None,
            eof_token: None,
            extglob,
            word_context: WordContext::Normal,
            at_command_start: false,
            in_array_literal: false,
            in_assign_builtin: false,
            post_read_pos: 0,
            cached_word_context: WordContext::Normal,
            cached_at_command_start: false,
            cached_in_array_literal: false,
            cached_in_assign_builtin: false,
        }
    }

    // =========================================================================
    // CURSOR
    // =========================================================================

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub fn char_at(&self, pos: usize) -> Option<char> {
        self.chars.get(pos).copied()
    }

    pub fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// Advance and append the consumed char to `out`
    pub fn advance_into(&mut self, out: &mut String) {
        if let Some(c) = self.advance() {
            out.push(c);
        }
    }

    fn lookahead(&self, n: usize) -> String {
        let end = (self.pos + n).min(self.chars.len());
        self.chars[self.pos..end].iter().collect()
    }

    /// Token that ends the current input slice (EOF token, not in a case
    /// pattern, not already delimiting a word)
    pub fn at_eof_token(&self) -> bool {
        self.eof_token.is_some()
            && self.peek() == self.eof_token
            && self.parser_state & PST_CASEPAT == 0
            && self.parser_state & PST_EOFTOKEN == 0
    }

    // =========================================================================
    // OPERATORS, BLANKS, COMMENTS
    // =========================================================================

    /// Longest-match operator at the cursor
    pub fn read_operator(&mut self) -> Option<Token> {
        let start = self.pos;
        let c = self.peek()?;
        for len in [3, 2] {
            let op = self.lookahead(len);
            if op.chars().count() == len {
                if let Some(tt) = TokenType::from_operator(&op) {
                    self.pos += len;
                    return Some(Token::new(tt, op, start));
                }
            }
        }
        match c {
            '(' | ')' if self.word_context == WordContext::Regex => return None,
            '<' | '>' if self.char_at(self.pos + 1) == Some('(') => return None,
            _ => {}
        }
        let tt = TokenType::from_operator(&c.to_string())?;
        self.pos += 1;
        Some(Token::new(tt, c.to_string(), start))
    }

    pub fn skip_blanks(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.pos += 1;
        }
    }

    /// Skip a `#` comment that starts a word. Leaves the newline.
    pub fn skip_comment(&mut self) -> bool {
        if self.peek() != Some('#') {
            return false;
        }
        if self.pos > 0 {
            let prev = self.chars[self.pos - 1];
            if !" \t\n;|&(){}".contains(prev) {
                return false;
            }
        }
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
        true
    }

    // =========================================================================
    // WORD SCANNING HELPERS
    // =========================================================================

    /// Read `'...'` with the cursor just past the opening quote. Returns the
    /// quoted text and whether it spanned a newline.
    pub fn read_single_quote(&mut self, start: usize) -> ParseResult<(String, bool)> {
        let mut text = String::from("'");
        let mut saw_newline = false;
        while let Some(c) = self.advance() {
            if c == '\n' {
                saw_newline = true;
            }
            text.push(c);
            if c == '\'' {
                return Ok((text, saw_newline));
            }
        }
        Err(ParseError::matched_pair("Unterminated single quote", start))
    }

    pub fn is_word_terminator(
        &self,
        ctx: WordContext,
        ch: char,
        bracket_depth: usize,
        paren_depth: usize,
    ) -> bool {
        let next = self.char_at(self.pos + 1);
        match ctx {
            WordContext::Regex => {
                if (ch == ']' && next == Some(']')) || (ch == '&' && next == Some('&')) {
                    return true;
                }
                if ch == ')' && paren_depth == 0 {
                    return true;
                }
                is_whitespace(ch) && paren_depth == 0
            }
            WordContext::Cond => {
                if ch == ']' && next == Some(']') {
                    return true;
                }
                if matches!(ch, ')' | '&' | '|' | ';') {
                    return true;
                }
                if is_redirect_char(ch) && next != Some('(') {
                    return true;
                }
                is_whitespace(ch)
            }
            WordContext::Normal => {
                if self.parser_state & PST_EOFTOKEN != 0
                    && self.eof_token == Some(ch)
                    && bracket_depth == 0
                {
                    return true;
                }
                if is_redirect_char(ch) && next == Some('(') {
                    return false;
                }
                is_metachar(ch) && bracket_depth == 0
            }
        }
    }

    /// `$'...'` with the escapes kept raw; returns the node and source text
    pub fn read_ansi_c_quote(&mut self) -> ParseResult<Option<(Node, String)>> {
        if self.peek() != Some('$') || self.char_at(self.pos + 1) != Some('\'') {
            return Ok(None);
        }
        let start = self.pos;
        self.pos += 2;
        let mut content = String::new();
        let mut found_close = false;
        while let Some(ch) = self.peek() {
            if ch == '\'' {
                self.pos += 1;
                found_close = true;
                break;
            }
            self.advance_into(&mut content);
            if ch == '\\' {
                self.advance_into(&mut content);
            }
        }
        if !found_close {
            return Err(ParseError::matched_pair(
                "unexpected EOF while looking for matching `''",
                start,
            ));
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        Ok(Some((Node::AnsiCQuote(AnsiCQuoteNode { content }), text)))
    }

    // =========================================================================
    // ${ ... } OPERATORS
    // =========================================================================

    pub fn update_dolbrace_for_op(&mut self, op: &str, has_param: bool) {
        if self.dolbrace_state == DolbraceState::None {
            return;
        }
        let Some(first) = op.chars().next() else {
            return;
        };
        if self.dolbrace_state == DolbraceState::Param && has_param {
            if "%#^,".contains(first) {
                self.dolbrace_state = DolbraceState::Quote;
                return;
            }
            if first == '/' {
                self.dolbrace_state = DolbraceState::Quote2;
                return;
            }
        }
        if self.dolbrace_state == DolbraceState::Param && "#%^,~:-=?+/".contains(first) {
            self.dolbrace_state = DolbraceState::Op;
        }
    }

    /// Operator after the parameter name in `${name OP arg}`; empty when none
    pub fn consume_param_operator(&mut self) -> String {
        let Some(ch) = self.peek() else {
            return String::new();
        };
        // Second char that may double up the operator
        let doubled = |lexer: &mut Self, first: char, seconds: &str| -> String {
            lexer.pos += 1;
            match lexer.peek() {
                Some(next) if seconds.contains(next) => {
                    lexer.pos += 1;
                    format!("{}{}", first, next)
                }
                _ => first.to_string(),
            }
        };
        match ch {
            ':' => {
                self.pos += 1;
                match self.peek() {
                    Some(next) if is_simple_param_op(next) => {
                        self.pos += 1;
                        format!(":{}", next)
                    }
                    _ => ":".to_string(),
                }
            }
            c if is_simple_param_op(c) => {
                self.pos += 1;
                c.to_string()
            }
            '#' => doubled(self, '#', "#"),
            '%' => doubled(self, '%', "%"),
            '/' => doubled(self, '/', "/#%"),
            '^' => doubled(self, '^', "^"),
            ',' => doubled(self, ',', ","),
            '@' => {
                self.pos += 1;
                "@".to_string()
            }
            _ => String::new(),
        }
    }

    /// Whether the `[` at `start` closes before the `}` of the expansion
    pub fn param_subscript_has_close(&self, start: usize) -> bool {
        let mut depth = 1usize;
        let mut i = start + 1;
        let mut single = false;
        let mut double = false;
        while i < self.chars.len() {
            let c = self.chars[i];
            if single {
                if c == '\'' {
                    single = false;
                }
                i += 1;
                continue;
            }
            if double {
                if c == '\\' && i + 1 < self.chars.len() {
                    i += 2;
                    continue;
                }
                if c == '"' {
                    double = false;
                }
                i += 1;
                continue;
            }
            match c {
                '\'' => single = true,
                '"' => double = true,
                '\\' => {
                    i += 2;
                    continue;
                }
                '}' => return false,
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return true;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexer(src: &str) -> Lexer {
        Lexer::new(src.chars().collect(), false)
    }

    #[test]
    fn test_read_operator_longest_match() {
        let mut lx = lexer(";;& x");
        let tok = lx.read_operator().unwrap();
        assert_eq!(tok.token_type, TokenType::SemiSemiAnd);
        assert_eq!(lx.pos, 3);

        let mut lx = lexer("&>>file");
        assert_eq!(lx.read_operator().unwrap().token_type, TokenType::AndDGreat);

        let mut lx = lexer("|&");
        assert_eq!(lx.read_operator().unwrap().token_type, TokenType::PipeAmp);

        let mut lx = lexer(">|");
        assert_eq!(lx.read_operator().unwrap().value, ">|");
    }

    #[test]
    fn test_read_operator_declines_procsub_and_words() {
        assert!(lexer("<(ls)").read_operator().is_none());
        assert!(lexer("echo").read_operator().is_none());
        let mut lx = lexer("(a)");
        lx.word_context = WordContext::Regex;
        assert!(lx.read_operator().is_none());
        assert_eq!(lexer("\n").read_operator().unwrap().token_type, TokenType::Newline);
    }

    #[test]
    fn test_skip_comment_needs_word_start() {
        let mut lx = lexer("a#b");
        lx.pos = 1;
        assert!(!lx.skip_comment());
        let mut lx = lexer("a #b\nc");
        lx.pos = 2;
        assert!(lx.skip_comment());
        assert_eq!(lx.peek(), Some('\n'));
    }

    #[test]
    fn test_read_single_quote() {
        let mut lx = lexer("'a\nb' rest");
        lx.pos = 1;
        let (text, newline) = lx.read_single_quote(0).unwrap();
        assert_eq!(text, "'a\nb'");
        assert!(newline);
        let mut lx = lexer("'open");
        lx.pos = 1;
        assert!(lx.read_single_quote(0).is_err());
    }

    #[test]
    fn test_read_ansi_c_quote_keeps_escapes() {
        let mut lx = lexer(r"$'a\'b' x");
        let (node, text) = lx.read_ansi_c_quote().unwrap().unwrap();
        assert_eq!(text, r"$'a\'b'");
        assert_eq!(
            node,
            Node::AnsiCQuote(AnsiCQuoteNode {
                content: r"a\'b".to_string()
            })
        );
        let err = lexer("$'abc").read_ansi_c_quote().unwrap_err();
        assert!(err.is_matched_pair());
    }

    #[test]
    fn test_consume_param_operator() {
        for (src, op) in [
            (":-x", ":-"),
            (":x", ":"),
            ("##x", "##"),
            ("%x", "%"),
            ("/#x", "/#"),
            ("^^", "^^"),
            (",x", ","),
            ("@Q", "@"),
            ("?x", "?"),
            ("x", ""),
        ] {
            assert_eq!(lexer(src).consume_param_operator(), op, "{}", src);
        }
    }

    #[test]
    fn test_param_subscript_has_close() {
        assert!(lexer("a[1]}").param_subscript_has_close(1));
        assert!(lexer("a[']']}").param_subscript_has_close(1));
        assert!(!lexer("a[1}").param_subscript_has_close(1));
    }

    #[test]
    fn test_update_dolbrace_for_op() {
        let mut lx = lexer("");
        lx.dolbrace_state = DolbraceState::Param;
        lx.update_dolbrace_for_op("%%", true);
        assert_eq!(lx.dolbrace_state, DolbraceState::Quote);
        lx.dolbrace_state = DolbraceState::Param;
        lx.update_dolbrace_for_op(":-", true);
        assert_eq!(lx.dolbrace_state, DolbraceState::Op);
        lx.dolbrace_state = DolbraceState::None;
        lx.update_dolbrace_for_op("/", true);
        assert_eq!(lx.dolbrace_state, DolbraceState::None);
    }

    #[test]
    fn test_word_terminators_by_context() {
        let lx = lexer("]]");
        assert!(lx.is_word_terminator(WordContext::Cond, ']', 0, 0));
        assert!(!lx.is_word_terminator(WordContext::Normal, ']', 0, 0));
        let lx = lexer("<(");
        assert!(!lx.is_word_terminator(WordContext::Normal, '<', 0, 0));
        let lx = lexer(" ");
        assert!(!lx.is_word_terminator(WordContext::Regex, ' ', 0, 1));
        assert!(lx.is_word_terminator(WordContext::Normal, ' ', 0, 0));
    }
}
