//! Conditional Expression Parser
//!
//! Handles parsing of [[ ... ]] conditional commands:
//!   cond_or   ::= cond_and ('||' cond_or)?
//!   cond_and  ::= cond_term ('&&' cond_and)?
//!   cond_term ::= '!' cond_term | '(' cond_or ')' | unary-op word
//!               | word binary-op word | word
//!
//! Operands are read by the lexer in `Cond` word context; the right side of
//! `=~` switches to `Regex` context so that parentheses and `|` stay inside
//! the pattern.

use crate::ast::{CondExpr, ConditionalExprNode, Node, WordNode};

use super::parser::Parser;
use super::scan::{is_redirect_char, is_whitespace, is_whitespace_no_newline};
use super::types::{
    ParseError, ParseResult, WordContext, COND_BINARY_OPS, COND_UNARY_OPS, PST_CONDEXPR,
    PST_REGEXP,
};

impl Parser {
    /// `[[ expr ]]` followed by optional redirections. None when the cursor
    /// is not at a `[[` that stands alone as a word.
    pub(super) fn parse_conditional_expr(&mut self) -> ParseResult<Option<Node>> {
        self.skip_whitespace();
        if !self.starts_with("[[") {
            return Ok(None);
        }
        match self.peek_at(2) {
            None => {}
            Some(c) if is_whitespace(c) => {}
            Some('\\') if self.peek_at(3) == Some('\n') => {}
            Some(_) => return Ok(None),
        }
        self.pos += 2;
        self.set_state(PST_CONDEXPR);
        self.word_context = WordContext::Cond;
        let body = self.parse_cond_or();
        let body = match body {
            Ok(body) => body,
            Err(e) => {
                self.clear_state(PST_CONDEXPR);
                self.word_context = WordContext::Normal;
                return Err(e);
            }
        };
        while self.peek().is_some_and(is_whitespace_no_newline) {
            self.pos += 1;
        }
        self.clear_state(PST_CONDEXPR);
        self.word_context = WordContext::Normal;
        if !self.starts_with("]]") {
            return Err(ParseError::new(
                "Expected ]] to close conditional expression",
                self.pos,
            ));
        }
        self.pos += 2;
        let redirects = self.collect_redirects()?;
        Ok(Some(Node::ConditionalExpr(ConditionalExprNode {
            body,
            redirects,
        })))
    }

    /// Blanks, escaped newlines and plain newlines are all insignificant
    /// between `[[` and `]]`
    fn cond_skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if is_whitespace_no_newline(c) || c == '\n' {
                self.pos += 1;
            } else if c == '\\' && self.peek_at(1) == Some('\n') {
                self.pos += 2;
            } else {
                break;
            }
        }
    }

    fn cond_at_end(&self) -> bool {
        self.at_end() || self.starts_with("]]")
    }

    fn parse_cond_or(&mut self) -> ParseResult<CondExpr> {
        self.cond_skip_whitespace();
        let left = self.parse_cond_and()?;
        self.cond_skip_whitespace();
        if !self.cond_at_end() && self.starts_with("||") {
            self.pos += 2;
            let right = self.parse_cond_or()?;
            return Ok(CondExpr::Or(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_cond_and(&mut self) -> ParseResult<CondExpr> {
        self.cond_skip_whitespace();
        let left = self.parse_cond_term()?;
        self.cond_skip_whitespace();
        if !self.cond_at_end() && self.starts_with("&&") {
            self.pos += 2;
            let right = self.parse_cond_and()?;
            return Ok(CondExpr::And(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_cond_term(&mut self) -> ParseResult<CondExpr> {
        self.enter_nesting()?;
        let result = self.parse_cond_term_inner();
        self.leave_nesting();
        result
    }

    fn parse_cond_term_inner(&mut self) -> ParseResult<CondExpr> {
        self.cond_skip_whitespace();
        if self.cond_at_end() {
            return Err(ParseError::new(
                "Unexpected end of conditional expression",
                self.pos,
            ));
        }

        // `!` negates only when it stands alone; `!=` and `!foo` are words
        if self.peek() == Some('!') && self.peek_at(1).map_or(true, is_whitespace_no_newline) {
            self.pos += 1;
            let operand = self.parse_cond_term()?;
            return Ok(CondExpr::Not(Box::new(operand)));
        }

        if self.peek() == Some('(') {
            self.pos += 1;
            let inner = self.parse_cond_or()?;
            self.cond_skip_whitespace();
            if self.peek() != Some(')') {
                return Err(ParseError::new(
                    "Expected ) in conditional expression",
                    self.pos,
                ));
            }
            self.pos += 1;
            return Ok(CondExpr::Paren(Box::new(inner)));
        }

        let Some(first) = self.parse_cond_word()? else {
            return Err(ParseError::new(
                "Expected word in conditional expression",
                self.pos,
            ));
        };
        self.cond_skip_whitespace();

        if COND_UNARY_OPS.contains(first.value.as_str()) {
            let Some(operand) = self.parse_cond_word()? else {
                return Err(ParseError::new(
                    format!("Expected operand after {}", first.value),
                    self.pos,
                ));
            };
            return Ok(CondExpr::Unary {
                op: first.value,
                operand,
            });
        }

        if !self.cond_at_end() && !matches!(self.peek(), Some('&' | '|' | ')')) {
            if let Some(c) = self.peek().filter(|&c| is_redirect_char(c)) {
                if self.peek_at(1) != Some('(') {
                    self.pos += 1;
                    let op = c.to_string();
                    self.cond_skip_whitespace();
                    let Some(right) = self.parse_cond_word()? else {
                        return Err(ParseError::new(
                            format!("Expected operand after {}", op),
                            self.pos,
                        ));
                    };
                    return Ok(binary(op, first, right));
                }
            }

            let saved = self.pos;
            match self.parse_cond_word()? {
                Some(op) if COND_BINARY_OPS.contains(op.value.as_str()) => {
                    self.cond_skip_whitespace();
                    let right = if op.value == "=~" {
                        self.parse_cond_regex_word()?
                    } else {
                        self.parse_cond_word()?
                    };
                    let Some(right) = right else {
                        return Err(ParseError::new(
                            format!("Expected operand after {}", op.value),
                            self.pos,
                        ));
                    };
                    return Ok(binary(op.value, first, right));
                }
                _ => self.pos = saved,
            }
        }

        Ok(CondExpr::Unary {
            op: "-n".to_string(),
            operand: first,
        })
    }

    fn parse_cond_word(&mut self) -> ParseResult<Option<WordNode>> {
        self.cond_skip_whitespace();
        if self.cond_at_end()
            || matches!(self.peek(), Some('(' | ')'))
            || self.starts_with("&&")
            || self.starts_with("||")
        {
            return Ok(None);
        }
        self.parse_word_internal(WordContext::Cond, false, false)
    }

    fn parse_cond_regex_word(&mut self) -> ParseResult<Option<WordNode>> {
        self.cond_skip_whitespace();
        if self.cond_at_end() {
            return Ok(None);
        }
        self.set_state(PST_REGEXP);
        let word = self.parse_word_internal(WordContext::Regex, false, false);
        self.clear_state(PST_REGEXP);
        self.word_context = WordContext::Cond;
        word
    }
}

fn binary(op: String, left: WordNode, right: WordNode) -> CondExpr {
    CondExpr::Binary { op, left, right }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(src: &str) -> CondExpr {
        let mut p = Parser::new(src, false, false);
        match p.parse_conditional_expr().unwrap() {
            Some(Node::ConditionalExpr(c)) => c.body,
            other => panic!("expected conditional, got {:?}", other),
        }
    }

    fn err(src: &str) -> String {
        let mut p = Parser::new(src, false, false);
        p.parse_conditional_expr().unwrap_err().message
    }

    #[test]
    fn test_unary_and_bare_word() {
        let CondExpr::Unary { op, operand } = cond("[[ -f /etc/passwd ]]") else {
            panic!("expected unary");
        };
        assert_eq!(op, "-f");
        assert_eq!(operand.value, "/etc/passwd");

        let CondExpr::Unary { op, operand } = cond("[[ $x ]]") else {
            panic!("expected unary");
        };
        assert_eq!(op, "-n");
        assert_eq!(operand.value, "$x");
    }

    #[test]
    fn test_binary_operators() {
        let CondExpr::Binary { op, left, right } = cond("[[ $a == b* ]]") else {
            panic!("expected binary");
        };
        assert_eq!((op.as_str(), left.value.as_str(), right.value.as_str()), ("==", "$a", "b*"));

        let CondExpr::Binary { op, .. } = cond("[[ a < b ]]") else {
            panic!("expected binary");
        };
        assert_eq!(op, "<");

        let CondExpr::Binary { op, .. } = cond("[[ 1 -lt 2 ]]") else {
            panic!("expected binary");
        };
        assert_eq!(op, "-lt");
    }

    #[test]
    fn test_regex_keeps_parens_and_bars() {
        let CondExpr::Binary { op, right, .. } = cond("[[ $x =~ ^(a|b)+$ ]]") else {
            panic!("expected binary");
        };
        assert_eq!(op, "=~");
        assert_eq!(right.value, "^(a|b)+$");
    }

    #[test]
    fn test_logical_structure() {
        let expr = cond("[[ ! -z $a && ( $b || -n $c ) ]]");
        let CondExpr::And(left, right) = expr else {
            panic!("expected and");
        };
        assert!(matches!(*left, CondExpr::Not(_)));
        let CondExpr::Paren(inner) = *right else {
            panic!("expected paren");
        };
        assert!(matches!(*inner, CondExpr::Or(_, _)));
    }

    #[test]
    fn test_newlines_inside_brackets() {
        let expr = cond("[[ a\n  &&\n b ]]");
        assert!(matches!(expr, CondExpr::And(_, _)));
    }

    #[test]
    fn test_not_a_conditional() {
        let mut p = Parser::new("[[x ]]", false, false);
        assert!(p.parse_conditional_expr().unwrap().is_none());
        let mut p = Parser::new("[ x ]", false, false);
        assert!(p.parse_conditional_expr().unwrap().is_none());
    }

    #[test]
    fn test_errors() {
        assert_eq!(err("[[ ]]"), "Unexpected end of conditional expression");
        assert_eq!(err("[[ a "), "Expected ]] to close conditional expression");
        assert_eq!(err("[[ ( a ]]"), "Expected ) in conditional expression");
        assert_eq!(err("[[ -f ]]"), "Expected operand after -f");
        assert_eq!(err("[[ a == ]]"), "Expected operand after ==");
    }

    #[test]
    fn test_redirects_after_brackets() {
        let mut p = Parser::new("[[ a ]] 2>/dev/null", false, false);
        let Some(Node::ConditionalExpr(c)) = p.parse_conditional_expr().unwrap() else {
            panic!("expected conditional");
        };
        assert_eq!(c.redirects.len(), 1);
    }
}
