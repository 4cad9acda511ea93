//! Primary arithmetic operands: numbers, variables, parenthesised groups,
//! quoted numerals, escapes and the `$` / backtick expansions that may appear
//! inside an arithmetic expression.

use crate::ast::{
    ArithExpr, ArithmeticExpansionNode, CommandSubstitutionNode, Node, ParamExpansionNode,
    ParamLengthNode,
};

use super::arithmetic_parser::ArithParser;
use super::parser::Parser;
use super::scan::{is_param_expansion_op, is_special_param};
use super::types::{ParseError, ParseResult};

/// Characters that cannot start an operand; a primary there is empty
const NOT_AN_OPERAND: &str = ")]:,;?|&<>=!+-*/%^~#{}";

/// Operator prefixes recognised in `${name<op>...}`, longest first
const BRACED_OPS: [&str; 11] = [":-", ":=", ":+", ":?", ":", "##", "#", "%%", "%", "//", "/"];

fn expansion(node: Node) -> ArithExpr {
    ArithExpr::Expansion(Box::new(node))
}

fn param(name: impl Into<String>, op: impl Into<String>, arg: impl Into<String>) -> Node {
    Node::ParamExpansion(ParamExpansionNode::new(name, op, arg))
}

impl ArithParser {
    pub(super) fn parse_primary(&mut self) -> ParseResult<ArithExpr> {
        self.skip_ws();
        let Some(c) = self.peek(0) else {
            return Ok(ArithExpr::Empty);
        };
        match c {
            '(' => {
                self.advance();
                self.skip_ws();
                let expr = self.nested(Self::parse_comma)?;
                self.skip_ws();
                if !self.consume(")") {
                    return Err(ParseError::new(
                        "Expected ')' in arithmetic expression",
                        self.pos,
                    ));
                }
                Ok(expr)
            }
            '#' if self.peek(1) == Some('$') => {
                self.advance();
                self.parse_expansion()
            }
            '$' => self.parse_expansion(),
            '\'' => self.parse_quoted('\'', "Unterminated single quote in arithmetic"),
            '"' => self.parse_quoted('"', "Unterminated double quote in arithmetic"),
            '`' => self.parse_backtick(),
            '\\' => {
                self.advance();
                match self.advance() {
                    Some(escaped) => Ok(ArithExpr::Escape(escaped.to_string())),
                    None => Err(ParseError::new(
                        "Unexpected end after backslash in arithmetic",
                        self.pos,
                    )),
                }
            }
            c if NOT_AN_OPERAND.contains(c) => Ok(ArithExpr::Empty),
            _ => self.parse_number_or_var(),
        }
    }

    /// `$name`, `$1`, `$?`, `${...}`, `$(cmd)` or `$((expr))`
    fn parse_expansion(&mut self) -> ParseResult<ArithExpr> {
        if !self.consume("$") {
            return Err(ParseError::new("Expected '$'", self.pos));
        }
        match self.peek(0) {
            Some('(') => return self.parse_cmdsub(),
            Some('{') => return Ok(expansion(self.parse_braced_param())),
            _ => {}
        }
        let mut name = String::new();
        while let Some(c) = self.peek(0) {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.advance();
            } else if name.is_empty() && (is_special_param(c) || c.is_ascii_digit()) {
                name.push(c);
                self.advance();
                break;
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(ParseError::new("Expected variable name after $", self.pos));
        }
        Ok(expansion(param(name, "", "")))
    }

    fn parse_cmdsub(&mut self) -> ParseResult<ArithExpr> {
        self.advance();
        if self.peek(0) == Some('(') {
            self.advance();
            let start = self.pos;
            let mut depth = 1usize;
            while let Some(c) = self.peek(0) {
                match c {
                    '(' => depth += 1,
                    ')' if depth == 1 && self.peek(1) == Some(')') => break,
                    ')' => depth -= 1,
                    _ => {}
                }
                self.advance();
                if depth == 0 {
                    break;
                }
            }
            let content = self.slice(start, self.pos);
            self.advance();
            self.advance();
            let inner = ArithParser::new(&content, self.extglob, self.depth, self.max_depth)
                .parse()?;
            return Ok(expansion(Node::ArithmeticExpansion(ArithmeticExpansionNode {
                expression: inner.map(Box::new),
            })));
        }

        let start = self.pos;
        let mut depth = 1usize;
        while let Some(c) = self.peek(0) {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            self.advance();
        }
        let content = self.slice(start, self.pos);
        self.advance();
        Ok(expansion(self.command_substitution(&content)?))
    }

    fn parse_braced_param(&mut self) -> Node {
        self.advance();
        if let Some(marker @ ('!' | '#')) = self.peek(0) {
            self.advance();
            let mut name = String::new();
            while let Some(c) = self.peek(0).filter(|&c| c != '}') {
                name.push(c);
                self.advance();
            }
            self.consume("}");
            return if marker == '!' {
                Node::ParamIndirect(ParamExpansionNode::new(name, "", ""))
            } else {
                Node::ParamLength(ParamLengthNode { param: name })
            };
        }

        let mut name = String::new();
        while let Some(c) = self.peek(0) {
            if c == '}' {
                self.advance();
                return param(name, "", "");
            }
            if is_param_expansion_op(c) {
                break;
            }
            name.push(c);
            self.advance();
        }

        let mut op_text = String::new();
        let mut depth = 1usize;
        while let Some(c) = self.peek(0) {
            if c == '{' {
                depth += 1;
            } else if c == '}' {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            op_text.push(c);
            self.advance();
        }
        self.consume("}");
        for op in BRACED_OPS {
            if let Some(arg) = op_text.strip_prefix(op) {
                return param(name, op, arg);
            }
        }
        param(name, "", op_text)
    }

    /// `'...'` or `"..."`, kept as a numeral
    fn parse_quoted(&mut self, quote: char, unterminated: &str) -> ParseResult<ArithExpr> {
        self.advance();
        let start = self.pos;
        while let Some(c) = self.peek(0) {
            if c == quote {
                break;
            }
            if quote == '"' && c == '\\' {
                self.advance();
            }
            self.advance();
        }
        let content = self.slice(start, self.pos);
        if !self.consume(&quote.to_string()) {
            return Err(ParseError::new(unterminated, self.pos));
        }
        Ok(ArithExpr::Number(content))
    }

    fn parse_backtick(&mut self) -> ParseResult<ArithExpr> {
        self.advance();
        let start = self.pos;
        while let Some(c) = self.peek(0) {
            if c == '`' {
                break;
            }
            if c == '\\' {
                self.advance();
            }
            self.advance();
        }
        let content = self.slice(start, self.pos);
        if !self.consume("`") {
            return Err(ParseError::new("Unterminated backtick in arithmetic", self.pos));
        }
        Ok(expansion(self.command_substitution(&content)?))
    }

    fn command_substitution(&self, content: &str) -> ParseResult<Node> {
        let mut sub = Parser::new(content, false, self.extglob);
        sub.depth = self.depth;
        sub.max_depth = self.max_depth;
        let cmd = sub.parse_nested_list()?.unwrap_or(Node::Empty);
        Ok(Node::CommandSubstitution(CommandSubstitutionNode {
            command: Box::new(cmd),
            brace: false,
        }))
    }

    fn parse_number_or_var(&mut self) -> ParseResult<ArithExpr> {
        self.skip_ws();
        let Some(c) = self.peek(0) else {
            return Ok(ArithExpr::Empty);
        };
        let mut text = String::new();
        if c.is_ascii_digit() {
            while let Some(ch) = self.peek(0) {
                if !(ch.is_alphanumeric() || ch == '#' || ch == '_') {
                    break;
                }
                text.push(ch);
                self.advance();
            }
            if self.peek(0) == Some('$') {
                let suffix = self.parse_expansion()?;
                return Ok(ArithExpr::Concat(vec![ArithExpr::Number(text), suffix]));
            }
            return Ok(ArithExpr::Number(text));
        }
        if c.is_alphabetic() || c == '_' {
            while let Some(ch) = self.peek(0) {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                text.push(ch);
                self.advance();
            }
            return Ok(ArithExpr::Var(text));
        }
        Err(ParseError::new(
            format!("Unexpected character '{}' in arithmetic expression", c),
            self.pos,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> ArithExpr {
        ArithParser::new(src, false, 0, 200).parse().unwrap().unwrap()
    }

    #[test]
    fn test_numbers_and_bases() {
        assert_eq!(parse("16#ff"), ArithExpr::Number("16#ff".into()));
        assert_eq!(parse("0x1F"), ArithExpr::Number("0x1F".into()));
    }

    #[test]
    fn test_dollar_forms() {
        assert_eq!(parse("$x"), expansion(param("x", "", "")));
        assert_eq!(parse("$1"), expansion(param("1", "", "")));
        assert_eq!(parse("${x:-3}"), expansion(param("x", ":-", "3")));
        assert_eq!(
            parse("${#arr}"),
            expansion(Node::ParamLength(ParamLengthNode {
                param: "arr".into()
            }))
        );
    }

    #[test]
    fn test_number_glued_to_expansion() {
        assert_eq!(
            parse("10$x"),
            ArithExpr::Concat(vec![
                ArithExpr::Number("10".into()),
                expansion(param("x", "", ""))
            ])
        );
    }

    #[test]
    fn test_nested_arith_and_cmdsub() {
        let ArithExpr::Expansion(node) = parse("$((1+2))") else {
            panic!("expected expansion");
        };
        assert_eq!(node.kind(), "arith");
        let ArithExpr::Expansion(node) = parse("$(echo 3)") else {
            panic!("expected expansion");
        };
        assert_eq!(node.kind(), "cmdsub");
        let ArithExpr::Expansion(node) = parse("`echo 3`") else {
            panic!("expected expansion");
        };
        assert_eq!(node.kind(), "cmdsub");
    }

    #[test]
    fn test_quotes_and_escapes() {
        assert_eq!(parse("'12'"), ArithExpr::Number("12".into()));
        assert_eq!(parse("\"a\\\"b\""), ArithExpr::Number("a\\\"b".into()));
        assert_eq!(parse("\\x"), ArithExpr::Escape("x".into()));
    }

    #[test]
    fn test_missing_operand_is_empty() {
        assert_eq!(
            parse("1 + )"),
            crate::parser::arithmetic_parser::binary("+", ArithExpr::Number("1".into()), ArithExpr::Empty)
        );
    }

    #[test]
    fn test_errors() {
        let err = ArithParser::new("(1", false, 0, 200).parse().unwrap_err();
        assert_eq!(err.message, "Expected ')' in arithmetic expression");
        let err = ArithParser::new("@", false, 0, 200).parse().unwrap_err();
        assert_eq!(err.message, "Unexpected character '@' in arithmetic expression");
        let err = ArithParser::new("'1", false, 0, 200).parse().unwrap_err();
        assert_eq!(err.message, "Unterminated single quote in arithmetic");
        let err = ArithParser::new("$ ", false, 0, 200).parse().unwrap_err();
        assert_eq!(err.message, "Expected variable name after $");
    }
}
