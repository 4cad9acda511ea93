//! Arithmetic Expression Parser
//!
//! Parses the text of `(( ... ))`, `$(( ... ))` and `for (( ... ))` clauses
//! by precedence climbing, loosest first:
//! - `,` then assignment (`=`, `+=`, `<<=`, ...; right associative)
//! - `?:`, `||`, `&&`, `|`, `^`, `&`
//! - `==` `!=`, `<` `<=` `>` `>=`, `<<` `>>`
//! - `+` `-`, `*` `/` `%`, `**` (right associative)
//! - prefix `++` `--` `!` `~` `+` `-`, postfix `++` `--` and `name[...]`
//!
//! Trailing text after a complete expression is left unread.

use crate::ast::ArithExpr;

use super::scan::is_whitespace;
use super::types::{ParseError, ParseResult};

const ASSIGN_OPS: [&str; 11] = [
    "<<=", ">>=", "+=", "-=", "*=", "/=", "%=", "&=", "^=", "|=", "=",
];

pub(super) fn binary(op: &str, left: ArithExpr, right: ArithExpr) -> ArithExpr {
    ArithExpr::Binary {
        op: op.to_string(),
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn unary(op: &str, operand: ArithExpr) -> ArithExpr {
    ArithExpr::Unary {
        op: op.to_string(),
        operand: Box::new(operand),
    }
}

/// Cursor over one arithmetic source string
pub(super) struct ArithParser {
    pub(super) chars: Vec<char>,
    pub(super) pos: usize,
    pub(super) extglob: bool,
    pub(super) depth: usize,
    pub(super) max_depth: usize,
}

impl ArithParser {
    pub(super) fn new(source: &str, extglob: bool, depth: usize, max_depth: usize) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            extglob,
            depth,
            max_depth,
        }
    }

    /// Parse the whole source; None when it is blank
    pub(super) fn parse(mut self) -> ParseResult<Option<ArithExpr>> {
        self.skip_ws();
        if self.at_end() {
            return Ok(None);
        }
        self.parse_comma().map(Some)
    }

    // =========================================================================
    // CURSOR
    // =========================================================================

    pub(super) fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub(super) fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    pub(super) fn advance(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.pos += 1;
        Some(c)
    }

    pub(super) fn skip_ws(&mut self) {
        while let Some(c) = self.peek(0) {
            if is_whitespace(c) {
                self.pos += 1;
            } else if c == '\\' && self.peek(1) == Some('\n') {
                self.pos += 2;
            } else {
                break;
            }
        }
    }

    pub(super) fn matches(&self, s: &str) -> bool {
        super::scan::starts_with_at(&self.chars, self.pos, s)
    }

    pub(super) fn consume(&mut self, s: &str) -> bool {
        if self.matches(s) {
            self.pos += s.chars().count();
            return true;
        }
        false
    }

    pub(super) fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start..end.min(self.chars.len())].iter().collect()
    }

    /// Run a recursive step inside the shared nesting budget
    pub(super) fn nested<T>(
        &mut self,
        step: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        if self.depth >= self.max_depth {
            return Err(ParseError::new("Maximum nesting depth exceeded", self.pos));
        }
        self.depth += 1;
        let result = step(self);
        self.depth -= 1;
        result
    }

    // =========================================================================
    // BINARY LEVELS
    // =========================================================================

    pub(super) fn parse_comma(&mut self) -> ParseResult<ArithExpr> {
        let mut left = self.parse_assign()?;
        loop {
            self.skip_ws();
            if !self.consume(",") {
                return Ok(left);
            }
            self.skip_ws();
            let right = self.parse_assign()?;
            left = ArithExpr::Comma {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_assign(&mut self) -> ParseResult<ArithExpr> {
        self.nested(|p| {
            let left = p.parse_ternary()?;
            p.skip_ws();
            for op in ASSIGN_OPS {
                if !p.matches(op) {
                    continue;
                }
                if op == "=" && p.peek(1) == Some('=') {
                    break;
                }
                p.consume(op);
                p.skip_ws();
                let value = p.parse_assign()?;
                return Ok(ArithExpr::Assign {
                    op: op.to_string(),
                    target: Box::new(left),
                    value: Box::new(value),
                });
            }
            Ok(left)
        })
    }

    fn parse_ternary(&mut self) -> ParseResult<ArithExpr> {
        let condition = self.parse_logical_or()?;
        self.skip_ws();
        if !self.consume("?") {
            return Ok(condition);
        }
        self.skip_ws();
        let if_true = if self.matches(":") {
            None
        } else {
            Some(Box::new(self.parse_assign()?))
        };
        self.skip_ws();
        let mut if_false = None;
        if self.consume(":") {
            self.skip_ws();
            if !self.at_end() && self.peek(0) != Some(')') {
                if_false = Some(Box::new(self.nested(Self::parse_ternary)?));
            }
        }
        Ok(ArithExpr::Ternary {
            condition: Box::new(condition),
            if_true,
            if_false,
        })
    }

    fn parse_logical_or(&mut self) -> ParseResult<ArithExpr> {
        let mut left = self.parse_logical_and()?;
        loop {
            self.skip_ws();
            if !self.consume("||") {
                return Ok(left);
            }
            self.skip_ws();
            left = binary("||", left, self.parse_logical_and()?);
        }
    }

    fn parse_logical_and(&mut self) -> ParseResult<ArithExpr> {
        let mut left = self.parse_bitwise_or()?;
        loop {
            self.skip_ws();
            if !self.consume("&&") {
                return Ok(left);
            }
            self.skip_ws();
            left = binary("&&", left, self.parse_bitwise_or()?);
        }
    }

    fn parse_bitwise_or(&mut self) -> ParseResult<ArithExpr> {
        let mut left = self.parse_bitwise_xor()?;
        loop {
            self.skip_ws();
            if self.peek(0) != Some('|') || matches!(self.peek(1), Some('|' | '=')) {
                return Ok(left);
            }
            self.advance();
            self.skip_ws();
            left = binary("|", left, self.parse_bitwise_xor()?);
        }
    }

    fn parse_bitwise_xor(&mut self) -> ParseResult<ArithExpr> {
        let mut left = self.parse_bitwise_and()?;
        loop {
            self.skip_ws();
            if self.peek(0) != Some('^') || self.peek(1) == Some('=') {
                return Ok(left);
            }
            self.advance();
            self.skip_ws();
            left = binary("^", left, self.parse_bitwise_and()?);
        }
    }

    fn parse_bitwise_and(&mut self) -> ParseResult<ArithExpr> {
        let mut left = self.parse_equality()?;
        loop {
            self.skip_ws();
            if self.peek(0) != Some('&') || matches!(self.peek(1), Some('&' | '=')) {
                return Ok(left);
            }
            self.advance();
            self.skip_ws();
            left = binary("&", left, self.parse_equality()?);
        }
    }

    fn parse_equality(&mut self) -> ParseResult<ArithExpr> {
        let mut left = self.parse_comparison()?;
        loop {
            self.skip_ws();
            let op = if self.consume("==") {
                "=="
            } else if self.consume("!=") {
                "!="
            } else {
                return Ok(left);
            };
            self.skip_ws();
            left = binary(op, left, self.parse_comparison()?);
        }
    }

    fn parse_comparison(&mut self) -> ParseResult<ArithExpr> {
        let mut left = self.parse_shift()?;
        loop {
            self.skip_ws();
            let op = if self.consume("<=") {
                "<="
            } else if self.consume(">=") {
                ">="
            } else if self.peek(0) == Some('<') && !matches!(self.peek(1), Some('<' | '=')) {
                self.advance();
                "<"
            } else if self.peek(0) == Some('>') && !matches!(self.peek(1), Some('>' | '=')) {
                self.advance();
                ">"
            } else {
                return Ok(left);
            };
            self.skip_ws();
            left = binary(op, left, self.parse_shift()?);
        }
    }

    fn parse_shift(&mut self) -> ParseResult<ArithExpr> {
        let mut left = self.parse_additive()?;
        loop {
            self.skip_ws();
            if self.matches("<<=") || self.matches(">>=") {
                return Ok(left);
            }
            let op = if self.consume("<<") {
                "<<"
            } else if self.consume(">>") {
                ">>"
            } else {
                return Ok(left);
            };
            self.skip_ws();
            left = binary(op, left, self.parse_additive()?);
        }
    }

    fn parse_additive(&mut self) -> ParseResult<ArithExpr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            self.skip_ws();
            let op = match (self.peek(0), self.peek(1)) {
                (Some('+'), next) if !matches!(next, Some('+' | '=')) => "+",
                (Some('-'), next) if !matches!(next, Some('-' | '=')) => "-",
                _ => return Ok(left),
            };
            self.advance();
            self.skip_ws();
            left = binary(op, left, self.parse_multiplicative()?);
        }
    }

    fn parse_multiplicative(&mut self) -> ParseResult<ArithExpr> {
        let mut left = self.parse_exponent()?;
        loop {
            self.skip_ws();
            let op = match (self.peek(0), self.peek(1)) {
                (Some('*'), next) if !matches!(next, Some('*' | '=')) => "*",
                (Some('/'), next) if next != Some('=') => "/",
                (Some('%'), next) if next != Some('=') => "%",
                _ => return Ok(left),
            };
            self.advance();
            self.skip_ws();
            left = binary(op, left, self.parse_exponent()?);
        }
    }

    fn parse_exponent(&mut self) -> ParseResult<ArithExpr> {
        let left = self.parse_unary()?;
        self.skip_ws();
        if !self.consume("**") {
            return Ok(left);
        }
        self.skip_ws();
        let right = self.nested(Self::parse_exponent)?;
        Ok(binary("**", left, right))
    }

    // =========================================================================
    // UNARY AND POSTFIX
    // =========================================================================

    fn parse_unary(&mut self) -> ParseResult<ArithExpr> {
        self.skip_ws();
        if self.consume("++") {
            self.skip_ws();
            return Ok(ArithExpr::PreIncr(Box::new(self.nested(Self::parse_unary)?)));
        }
        if self.consume("--") {
            self.skip_ws();
            return Ok(ArithExpr::PreDecr(Box::new(self.nested(Self::parse_unary)?)));
        }
        let op = match (self.peek(0), self.peek(1)) {
            (Some('!'), _) => "!",
            (Some('~'), _) => "~",
            (Some('+'), next) if next != Some('+') => "+",
            (Some('-'), next) if next != Some('-') => "-",
            _ => return self.parse_postfix(),
        };
        self.advance();
        self.skip_ws();
        let operand = self.nested(Self::parse_unary)?;
        Ok(unary(op, operand))
    }

    fn parse_postfix(&mut self) -> ParseResult<ArithExpr> {
        let mut left = self.parse_primary()?;
        loop {
            self.skip_ws();
            if self.consume("++") {
                left = ArithExpr::PostIncr(Box::new(left));
            } else if self.consume("--") {
                left = ArithExpr::PostDecr(Box::new(left));
            } else if self.peek(0) == Some('[') {
                let ArithExpr::Var(name) = &left else {
                    return Ok(left);
                };
                let array = name.clone();
                self.advance();
                self.skip_ws();
                let index = self.nested(Self::parse_comma)?;
                self.skip_ws();
                if !self.consume("]") {
                    return Err(ParseError::new("Expected ']' in array subscript", self.pos));
                }
                left = ArithExpr::Subscript {
                    array,
                    index: Box::new(index),
                };
            } else {
                return Ok(left);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> ArithExpr {
        ArithParser::new(src, false, 0, 200).parse().unwrap().unwrap()
    }

    fn num(s: &str) -> ArithExpr {
        ArithExpr::Number(s.to_string())
    }

    fn var(s: &str) -> ArithExpr {
        ArithExpr::Var(s.to_string())
    }

    #[test]
    fn test_blank_is_none() {
        assert!(ArithParser::new("  \\\n ", false, 0, 200).parse().unwrap().is_none());
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            parse("1 + 2 * 3"),
            binary("+", num("1"), binary("*", num("2"), num("3")))
        );
        assert_eq!(
            parse("a || b && c"),
            binary("||", var("a"), binary("&&", var("b"), var("c")))
        );
    }

    #[test]
    fn test_exponent_is_right_associative() {
        assert_eq!(
            parse("2 ** 3 ** 2"),
            binary("**", num("2"), binary("**", num("3"), num("2")))
        );
    }

    #[test]
    fn test_assignment_chain() {
        let expected = ArithExpr::Assign {
            op: "=".into(),
            target: Box::new(var("a")),
            value: Box::new(ArithExpr::Assign {
                op: "+=".into(),
                target: Box::new(var("b")),
                value: Box::new(num("1")),
            }),
        };
        assert_eq!(parse("a = b += 1"), expected);
    }

    #[test]
    fn test_equality_is_not_assignment() {
        assert_eq!(parse("a == 1"), binary("==", var("a"), num("1")));
    }

    #[test]
    fn test_shift_assign_stops_shift() {
        let ArithExpr::Assign { op, .. } = parse("x <<= 2") else {
            panic!("expected assignment");
        };
        assert_eq!(op, "<<=");
    }

    #[test]
    fn test_ternary_with_missing_branches() {
        let ArithExpr::Ternary {
            if_true, if_false, ..
        } = parse("c ? : ")
        else {
            panic!("expected ternary");
        };
        assert!(if_true.is_none());
        assert!(if_false.is_none());
    }

    #[test]
    fn test_prefix_postfix_and_subscript() {
        assert_eq!(parse("++i"), ArithExpr::PreIncr(Box::new(var("i"))));
        assert_eq!(parse("i--"), ArithExpr::PostDecr(Box::new(var("i"))));
        assert_eq!(parse("-x"), unary("-", var("x")));
        assert_eq!(
            parse("arr[i+1]"),
            ArithExpr::Subscript {
                array: "arr".into(),
                index: Box::new(binary("+", var("i"), num("1"))),
            }
        );
    }

    #[test]
    fn test_comma() {
        assert_eq!(
            parse("a=1, b"),
            ArithExpr::Comma {
                left: Box::new(ArithExpr::Assign {
                    op: "=".into(),
                    target: Box::new(var("a")),
                    value: Box::new(num("1")),
                }),
                right: Box::new(var("b")),
            }
        );
    }

    #[test]
    fn test_unclosed_subscript() {
        let err = ArithParser::new("a[1", false, 0, 200).parse().unwrap_err();
        assert_eq!(err.message, "Expected ']' in array subscript");
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1", "! ".repeat(50));
        let err = ArithParser::new(&deep, false, 0, 10).parse().unwrap_err();
        assert_eq!(err.message, "Maximum nesting depth exceeded");
    }
}
