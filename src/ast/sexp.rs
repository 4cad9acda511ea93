//! S-Expression Rendering
//!
//! Every node renders to the canonical s-expression form used by the test
//! corpus, e.g. `(pipe (command (word "a")) (command (word "b")))`.
//! Strings are double-quoted with `\`, `"`, newline and tab escaped.

use super::cmdsub_format::format_command_substitutions;
use super::types::{
    ArithExpr, CasePatternNode, CondExpr, HereDocNode, Node, OperatorNode, RedirectNode, WordNode,
};
use super::word_format::{
    double_ctlesc_smart, expand_all_ansi_c_quotes, normalize_array_whitespace,
    normalize_extglob_whitespace, normalize_param_expansion_newlines,
    strip_arith_line_continuations, strip_locale_string_dollars,
};
use crate::parser::scan::{
    consume_bracket_class, consume_double_quote, consume_single_quote, is_expansion_start,
    is_extglob_prefix, to_chars,
};

/// Largest descriptor printed as a bare number
const MAX_FD: u64 = 2_147_483_647;

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn escape_nl(s: &str) -> String {
    escape(s).replace('\n', "\\n")
}

fn escape_nl_tab(s: &str) -> String {
    escape_nl(s).replace('\t', "\\t")
}

/// A descriptor number small enough to print unquoted
fn fd_number(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u64>().ok().filter(|&n| n <= MAX_FD)
}

/// A lone trailing backslash would escape the closing quote
fn fix_trailing_backslash(mut s: String) -> String {
    if s.ends_with('\\') && !s.ends_with("\\\\") {
        s.push('\\');
    }
    s
}

fn append_redirects(base: String, redirects: &[Node]) -> String {
    if redirects.is_empty() {
        return base;
    }
    let parts: Vec<String> = redirects.iter().map(Node::to_sexp).collect();
    format!("{} {}", base, parts.join(" "))
}

fn word_list(words: &[WordNode]) -> String {
    words.iter().map(WordNode::to_sexp).collect::<Vec<_>>().join(" ")
}

/// `(in ...)` clause of `for`/`select`; no clause means `"$@"`
fn in_clause(words: &Option<Vec<WordNode>>) -> String {
    match words {
        None => "(in (word \"\\\"$@\\\"\"))".to_string(),
        Some(words) if words.is_empty() => "(in)".to_string(),
        Some(words) => format!("(in {})", word_list(words)),
    }
}

/// Text of a `for ((...))` clause
fn format_arith_val(s: &str) -> String {
    let value = expand_all_ansi_c_quotes(s);
    let value = strip_locale_string_dollars(&value);
    let value = format_command_substitutions(&value, &[], false);
    escape_nl_tab(&value)
}

// =============================================================================
// NODES
// =============================================================================

impl Node {
    pub fn to_sexp(&self) -> String {
        match self {
            Node::Word(w) => w.to_sexp(),
            Node::Command(c) => {
                let parts: Vec<String> = c
                    .words
                    .iter()
                    .map(WordNode::to_sexp)
                    .chain(c.redirects.iter().map(Node::to_sexp))
                    .collect();
                if parts.is_empty() {
                    "(command)".to_string()
                } else {
                    format!("(command {})", parts.join(" "))
                }
            }
            Node::Pipeline(p) => pipeline_sexp(&p.commands),
            Node::List(l) => list_sexp(&l.parts),
            Node::Operator(o) => format!("({})", operator_name(o)),
            Node::PipeBoth => "(pipe-both)".to_string(),
            Node::Empty | Node::Comment(_) => String::new(),
            Node::Negation(n) => match &n.pipeline {
                Some(p) => format!("(negation {})", p.to_sexp()),
                None => "(negation (command))".to_string(),
            },
            Node::Time(t) => {
                let flag = if t.posix { " -p" } else { "" };
                match &t.pipeline {
                    Some(p) => format!("(time{} {})", flag, p.to_sexp()),
                    None => format!("(time{} (command))", flag),
                }
            }
            Node::Coproc(c) => {
                let name = if c.name.is_empty() { "COPROC" } else { &c.name };
                format!("(coproc \"{}\" {})", name, c.command.to_sexp())
            }
            Node::Redirect(r) => r.to_sexp(),
            Node::HereDoc(h) => h.to_sexp(),
            Node::Subshell(s) => {
                append_redirects(format!("(subshell {})", s.body.to_sexp()), &s.redirects)
            }
            Node::BraceGroup(b) => {
                append_redirects(format!("(brace-group {})", b.body.to_sexp()), &b.redirects)
            }
            Node::If(i) => {
                let mut out = format!("(if {} {}", i.condition.to_sexp(), i.then_body.to_sexp());
                if let Some(e) = &i.else_body {
                    out.push(' ');
                    out.push_str(&e.to_sexp());
                }
                out.push(')');
                append_redirects(out, &i.redirects)
            }
            Node::While(w) => append_redirects(
                format!("(while {} {})", w.condition.to_sexp(), w.body.to_sexp()),
                &w.redirects,
            ),
            Node::Until(u) => append_redirects(
                format!("(until {} {})", u.condition.to_sexp(), u.body.to_sexp()),
                &u.redirects,
            ),
            Node::For(f) => {
                let var = escape(&format_command_substitutions(&f.var, &[], false));
                append_redirects(
                    format!(
                        "(for (word \"{}\") {} {})",
                        var,
                        in_clause(&f.words),
                        f.body.to_sexp()
                    ),
                    &f.redirects,
                )
            }
            Node::ForArith(f) => {
                let clause = |s: &str| format_arith_val(if s.is_empty() { "1" } else { s });
                append_redirects(
                    format!(
                        "(arith-for (init (word \"{}\")) (test (word \"{}\")) (step (word \"{}\")) {})",
                        clause(&f.init),
                        clause(&f.cond),
                        clause(&f.incr),
                        f.body.to_sexp()
                    ),
                    &f.redirects,
                )
            }
            Node::Select(s) => append_redirects(
                format!(
                    "(select (word \"{}\") {} {})",
                    escape(&s.var),
                    in_clause(&s.words),
                    s.body.to_sexp()
                ),
                &s.redirects,
            ),
            Node::Case(c) => {
                let mut out = format!("(case {}", c.word.to_sexp());
                for p in &c.patterns {
                    out.push(' ');
                    out.push_str(&p.to_sexp());
                }
                out.push(')');
                append_redirects(out, &c.redirects)
            }
            Node::CasePattern(p) => p.to_sexp(),
            Node::Function(f) => format!("(function \"{}\" {})", f.name, f.body.to_sexp()),
            Node::ArithmeticCommand(a) => {
                let formatted = format_command_substitutions(&a.raw_content, &[], true);
                append_redirects(
                    format!("(arith (word \"{}\"))", escape_nl_tab(&formatted)),
                    &a.redirects,
                )
            }
            Node::ConditionalExpr(c) => {
                append_redirects(format!("(cond {})", c.body.to_sexp()), &c.redirects)
            }
            Node::ParamExpansion(p) => param_sexp("param", &p.param, &p.op, &p.arg),
            Node::ParamIndirect(p) => param_sexp("param-indirect", &p.param, &p.op, &p.arg),
            Node::ParamLength(p) => format!("(param-len \"{}\")", escape(&p.param)),
            Node::CommandSubstitution(c) => {
                let tag = if c.brace { "funsub" } else { "cmdsub" };
                format!("({} {})", tag, c.command.to_sexp())
            }
            Node::ArithmeticExpansion(a) => match &a.expression {
                Some(e) => format!("(arith {})", e.to_sexp()),
                None => "(arith)".to_string(),
            },
            Node::ArithDeprecated(a) => {
                format!("(arith-deprecated \"{}\")", escape_nl(&a.expression))
            }
            Node::ProcessSubstitution(p) => {
                format!("(procsub \"{}\" {})", p.direction, p.command.to_sexp())
            }
            Node::AnsiCQuote(a) => format!("(ansi-c \"{}\")", escape_nl(&a.content)),
            Node::LocaleString(l) => format!("(locale \"{}\")", escape_nl(&l.content)),
            Node::Array(a) => {
                if a.elements.is_empty() {
                    "(array)".to_string()
                } else {
                    format!("(array {})", word_list(&a.elements))
                }
            }
        }
    }
}

fn param_sexp(tag: &str, param: &str, op: &str, arg: &str) -> String {
    if op.is_empty() {
        format!("({} \"{}\")", tag, escape(param))
    } else {
        format!(
            "({} \"{}\" \"{}\" \"{}\")",
            tag,
            escape(param),
            escape(op),
            escape(arg)
        )
    }
}

fn operator_name(o: &OperatorNode) -> &str {
    match o.op.as_str() {
        "&&" => "and",
        "||" => "or",
        ";" => "semi",
        "&" => "bg",
        "|" => "pipe",
        other => other,
    }
}

// =============================================================================
// WORDS
// =============================================================================

impl WordNode {
    pub fn to_sexp(&self) -> String {
        let value = expand_all_ansi_c_quotes(&self.value);
        let value = strip_locale_string_dollars(&value);
        let value = normalize_array_whitespace(&value);
        let value = format_command_substitutions(&value, &self.parts, false);
        let value = normalize_param_expansion_newlines(&value);
        let value = strip_arith_line_continuations(&value);
        let value = double_ctlesc_smart(&value);
        let mut value = value.replace('\x7f', "\x01\x7f").replace('\\', "\\\\");
        if value.ends_with("\\\\") && !value.ends_with("\\\\\\\\") {
            value.push_str("\\\\");
        }
        let escaped = value
            .replace('"', "\\\"")
            .replace('\n', "\\n")
            .replace('\t', "\\t");
        format!("(word \"{}\")", escaped)
    }

    /// The operand text as it appears in `[[ ... ]]` output
    pub fn cond_formatted_value(&self) -> String {
        let value = expand_all_ansi_c_quotes(&self.value);
        let value = strip_locale_string_dollars(&value);
        let value = format_command_substitutions(&value, &self.parts, false);
        let value = normalize_extglob_whitespace(&value);
        value
            .replace('\x01', "\x01\x01")
            .trim_end_matches('\n')
            .to_string()
    }
}

// =============================================================================
// REDIRECTIONS
// =============================================================================

/// Strip a leading `{name}` or `{name[sub]}` from a redirect operator
fn strip_varfd_prefix(op: &str) -> &str {
    let chars = to_chars(op);
    if chars.first() != Some(&'{') {
        return op;
    }
    let mut j = 1;
    if !chars.get(j).is_some_and(|&c| c.is_alphabetic() || c == '_') {
        return op;
    }
    j += 1;
    while chars.get(j).is_some_and(|&c| c.is_alphanumeric() || c == '_') {
        j += 1;
    }
    if chars.get(j) == Some(&'[') {
        j += 1;
        while chars.get(j).is_some_and(|&c| c != ']') {
            j += 1;
        }
        if chars.get(j) == Some(&']') {
            j += 1;
        }
    }
    if chars.get(j) != Some(&'}') {
        return op;
    }
    let byte_offset: usize = chars[..=j].iter().map(|c| c.len_utf8()).sum();
    &op[byte_offset..]
}

impl RedirectNode {
    pub fn to_sexp(&self) -> String {
        let op = strip_varfd_prefix(self.op.trim_start_matches(|c: char| c.is_ascii_digit()));
        let target = expand_all_ansi_c_quotes(&self.target.value);
        let target = strip_locale_string_dollars(&target);
        let target = format_command_substitutions(&target, &self.target.parts, false);
        let target = fix_trailing_backslash(strip_arith_line_continuations(&target));

        if let Some(raw) = target.strip_prefix('&') {
            let op = match op {
                ">" => ">&",
                "<" => "<&",
                other => other,
            };
            if let Some(fd) = fd_number(raw) {
                return format!("(redirect \"{}\" {})", op, fd);
            }
            let without_dash = raw.strip_suffix('-');
            if let Some(fd) = without_dash.and_then(fd_number) {
                return format!("(redirect \"{}\" {})", op, fd);
            }
            if target == "&-" {
                return "(redirect \">&-\" 0)".to_string();
            }
            return format!("(redirect \"{}\" \"{}\")", op, without_dash.unwrap_or(raw));
        }

        if op == ">&" || op == "<&" {
            if let Some(fd) = fd_number(&target) {
                return format!("(redirect \"{}\" {})", op, fd);
            }
            if target == "-" {
                return "(redirect \">&-\" 0)".to_string();
            }
            let without_dash = target.strip_suffix('-');
            if let Some(fd) = without_dash.and_then(fd_number) {
                return format!("(redirect \"{}\" {})", op, fd);
            }
            return format!(
                "(redirect \"{}\" \"{}\")",
                op,
                without_dash.unwrap_or(&target)
            );
        }
        format!("(redirect \"{}\" \"{}\")", op, target)
    }
}

impl HereDocNode {
    pub fn to_sexp(&self) -> String {
        let op = if self.strip_tabs { "<<-" } else { "<<" };
        format!(
            "(redirect \"{}\" \"{}\")",
            op,
            fix_trailing_backslash(self.content.clone())
        )
    }
}

// =============================================================================
// PIPELINES & LISTS
// =============================================================================

/// A command followed by `|&` gets an explicit `(redirect ">&" 1)`
fn piped_command_sexp(cmd: &Node, needs_redirect: bool) -> String {
    match cmd {
        Node::Command(c) if needs_redirect => {
            let mut parts: Vec<String> = c
                .words
                .iter()
                .map(WordNode::to_sexp)
                .chain(c.redirects.iter().map(Node::to_sexp))
                .collect();
            parts.push("(redirect \">&\" 1)".to_string());
            format!("(command {})", parts.join(" "))
        }
        other => other.to_sexp(),
    }
}

fn pipeline_sexp(commands: &[Node]) -> String {
    if let [only] = commands {
        return only.to_sexp();
    }
    let mut cmds: Vec<(&Node, bool)> = Vec::new();
    for (i, cmd) in commands.iter().enumerate() {
        if matches!(cmd, Node::PipeBoth) {
            continue;
        }
        cmds.push((cmd, matches!(commands.get(i + 1), Some(Node::PipeBoth))));
    }
    let Some((&(last, last_needs), rest)) = cmds.split_last() else {
        return String::new();
    };
    let mut result = piped_command_sexp(last, last_needs);
    for &(cmd, needs) in rest.iter().rev() {
        result = if needs && !matches!(cmd, Node::Command(_)) {
            format!("(pipe {} (redirect \">&\" 1) {})", cmd.to_sexp(), result)
        } else {
            format!("(pipe {} {})", piped_command_sexp(cmd, needs), result)
        };
    }
    result
}

fn is_separator(node: &Node) -> bool {
    node.is_operator(";") || node.is_operator("\n")
}

fn list_op_name(op: &str) -> &str {
    match op {
        "&&" => "and",
        "||" => "or",
        ";" | "\n" => "semi",
        "&" => "background",
        other => other,
    }
}

fn list_or_single_sexp(parts: &[Node]) -> String {
    match parts {
        [only] => only.to_sexp(),
        _ => list_sexp(parts),
    }
}

/// Lists nest by precedence: `;`/newline loosest, then `&`, then `&&`/`||`
/// left-associatively.
fn list_sexp(parts: &[Node]) -> String {
    let mut parts = parts;
    while parts.len() > 1 && parts.last().is_some_and(is_separator) {
        parts = &parts[..parts.len() - 1];
    }
    if let [only] = parts {
        return only.to_sexp();
    }
    if parts.last().is_some_and(|p| p.is_operator("&")) {
        let mut i = parts.len().saturating_sub(3);
        while i > 0 {
            if is_separator(&parts[i]) {
                let left = list_or_single_sexp(&parts[..i]);
                let right = list_or_single_sexp(&parts[i + 1..parts.len() - 1]);
                return format!("(semi {} (background {}))", left, right);
            }
            i = i.saturating_sub(2);
        }
        return format!("(background {})", list_or_single_sexp(&parts[..parts.len() - 1]));
    }
    semi_sexp(parts)
}

fn semi_sexp(parts: &[Node]) -> String {
    let segments: Vec<&[Node]> = parts
        .split(is_separator)
        .filter(|seg| seg.first().is_some_and(|p| !matches!(p, Node::Operator(_))))
        .collect();
    if !parts.iter().any(is_separator) {
        return amp_sexp(parts);
    }
    let Some((first, rest)) = segments.split_first() else {
        return "()".to_string();
    };
    rest.iter().fold(amp_sexp(first), |acc, seg| {
        format!("(semi {} {})", acc, amp_sexp(seg))
    })
}

fn amp_sexp(parts: &[Node]) -> String {
    if let [only] = parts {
        return only.to_sexp();
    }
    let mut segments: Vec<&[Node]> = Vec::new();
    let mut start = 0;
    for i in (1..parts.len().saturating_sub(1)).step_by(2) {
        if parts[i].is_operator("&") {
            segments.push(&parts[start..i]);
            start = i + 1;
        }
    }
    segments.push(&parts[start..]);
    segments[1..].iter().fold(and_or_sexp(segments[0]), |acc, seg| {
        format!("(background {} {})", acc, and_or_sexp(seg))
    })
}

fn and_or_sexp(parts: &[Node]) -> String {
    let Some((first, rest)) = parts.split_first() else {
        return String::new();
    };
    let mut result = first.to_sexp();
    for pair in rest.chunks_exact(2) {
        let name = match &pair[0] {
            Node::Operator(o) => list_op_name(&o.op),
            other => other.kind(),
        };
        result = format!("({} {} {})", name, result, pair[1].to_sexp());
    }
    result
}

// =============================================================================
// CASE PATTERNS
// =============================================================================

impl CasePatternNode {
    /// Alternatives are split on top-level `|`; `|` inside brackets, quotes,
    /// extglob groups and `$(...)` stays part of the alternative.
    pub fn to_sexp(&self) -> String {
        let s = to_chars(&self.pattern);
        let n = s.len();
        let mut alternatives: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut depth = 0usize;
        let mut i = 0;
        while i < n {
            let ch = s[i];
            if ch == '\\' && i + 1 < n {
                current.push(ch);
                current.push(s[i + 1]);
                i += 2;
            } else if (is_extglob_prefix(ch) && i + 1 < n && s[i + 1] == '(')
                || is_expansion_start(&s, i, "$(")
            {
                current.push(ch);
                current.push('(');
                depth += 1;
                i += 2;
            } else if ch == '(' && depth > 0 {
                current.push(ch);
                depth += 1;
                i += 1;
            } else if ch == ')' && depth > 0 {
                current.push(ch);
                depth -= 1;
                i += 1;
            } else if ch == '[' {
                let (next, text) = consume_bracket_class(&s, i, depth);
                current.push_str(&text);
                i = next;
            } else if ch == '\'' && depth == 0 {
                let (next, text) = consume_single_quote(&s, i);
                current.push_str(&text);
                i = next;
            } else if ch == '"' && depth == 0 {
                let (next, text) = consume_double_quote(&s, i);
                current.push_str(&text);
                i = next;
            } else if ch == '|' && depth == 0 {
                alternatives.push(std::mem::take(&mut current));
                i += 1;
            } else {
                current.push(ch);
                i += 1;
            }
        }
        alternatives.push(current);
        let words: Vec<String> = alternatives
            .into_iter()
            .map(|alt| WordNode::literal(alt).to_sexp())
            .collect();
        let body = self
            .body
            .as_ref()
            .map(|b| b.to_sexp())
            .unwrap_or_else(|| "()".to_string());
        format!("(pattern ({}) {})", words.join(" "), body)
    }
}

// =============================================================================
// ARITHMETIC & CONDITIONALS
// =============================================================================

impl ArithExpr {
    pub fn to_sexp(&self) -> String {
        match self {
            ArithExpr::Number(v) => format!("(number \"{}\")", v),
            ArithExpr::Empty => "(empty)".to_string(),
            ArithExpr::Var(name) => format!("(var \"{}\")", name),
            ArithExpr::Binary { op, left, right } => {
                format!("(binary-op \"{}\" {} {})", op, left.to_sexp(), right.to_sexp())
            }
            ArithExpr::Unary { op, operand } => {
                format!("(unary-op \"{}\" {})", op, operand.to_sexp())
            }
            ArithExpr::PreIncr(e) => format!("(pre-incr {})", e.to_sexp()),
            ArithExpr::PostIncr(e) => format!("(post-incr {})", e.to_sexp()),
            ArithExpr::PreDecr(e) => format!("(pre-decr {})", e.to_sexp()),
            ArithExpr::PostDecr(e) => format!("(post-decr {})", e.to_sexp()),
            ArithExpr::Assign { op, target, value } => {
                format!("(assign \"{}\" {} {})", op, target.to_sexp(), value.to_sexp())
            }
            ArithExpr::Ternary {
                condition,
                if_true,
                if_false,
            } => {
                let branch = |b: &Option<Box<ArithExpr>>| {
                    b.as_ref()
                        .map(|e| e.to_sexp())
                        .unwrap_or_else(|| "(empty)".to_string())
                };
                format!(
                    "(ternary {} {} {})",
                    condition.to_sexp(),
                    branch(if_true),
                    branch(if_false)
                )
            }
            ArithExpr::Comma { left, right } => {
                format!("(comma {} {})", left.to_sexp(), right.to_sexp())
            }
            ArithExpr::Subscript { array, index } => {
                format!("(subscript \"{}\" {})", array, index.to_sexp())
            }
            ArithExpr::Escape(c) => format!("(escape \"{}\")", c),
            ArithExpr::Concat(parts) => {
                let parts: Vec<String> = parts.iter().map(ArithExpr::to_sexp).collect();
                format!("(arith-concat {})", parts.join(" "))
            }
            ArithExpr::Expansion(node) => node.to_sexp(),
        }
    }
}

impl CondExpr {
    pub fn to_sexp(&self) -> String {
        match self {
            CondExpr::Unary { op, operand } => format!(
                "(cond-unary \"{}\" (cond-term \"{}\"))",
                op,
                operand.cond_formatted_value()
            ),
            CondExpr::Binary { op, left, right } => format!(
                "(cond-binary \"{}\" (cond-term \"{}\") (cond-term \"{}\"))",
                op,
                left.cond_formatted_value(),
                right.cond_formatted_value()
            ),
            CondExpr::And(l, r) => format!("(cond-and {} {})", l.to_sexp(), r.to_sexp()),
            CondExpr::Or(l, r) => format!("(cond-or {} {})", l.to_sexp(), r.to_sexp()),
            // `!` does not appear in the rendered form
            CondExpr::Not(inner) => inner.to_sexp(),
            CondExpr::Paren(inner) => format!("(cond-expr {})", inner.to_sexp()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse;

    fn sexp(src: &str) -> String {
        parse(src, false)
            .unwrap()
            .iter()
            .map(|n| n.to_sexp())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_simple_command() {
        assert_eq!(sexp("echo hello"), "(command (word \"echo\") (word \"hello\"))");
        assert_eq!(sexp(""), "");
    }

    #[test]
    fn test_list_precedence() {
        assert_eq!(
            sexp("a && b || c"),
            "(or (and (command (word \"a\")) (command (word \"b\"))) (command (word \"c\")))"
        );
        assert_eq!(
            sexp("a; b & c"),
            "(semi (command (word \"a\")) (background (command (word \"b\")) (command (word \"c\"))))"
        );
        assert_eq!(sexp("a &"), "(background (command (word \"a\")))");
        assert_eq!(
            sexp("a; b &"),
            "(semi (command (word \"a\")) (background (command (word \"b\"))))"
        );
    }

    #[test]
    fn test_pipe_both() {
        assert_eq!(
            sexp("a |& b"),
            "(pipe (command (word \"a\") (redirect \">&\" 1)) (command (word \"b\")))"
        );
    }

    #[test]
    fn test_redirect_forms() {
        assert_eq!(
            sexp("cmd 2>&1"),
            "(command (word \"cmd\") (redirect \">&\" 1))"
        );
        assert_eq!(sexp("cmd >&-"), "(command (word \"cmd\") (redirect \">&-\" 0))");
        assert_eq!(
            sexp("cmd {fd}>out"),
            "(command (word \"cmd\") (redirect \">\" \"out\"))"
        );
        assert_eq!(
            sexp("cmd <&3-"),
            "(command (word \"cmd\") (redirect \"<&\" 3))"
        );
    }

    #[test]
    fn test_heredoc() {
        assert_eq!(
            sexp("cat <<EOF\nhello\nEOF\n"),
            "(command (word \"cat\") (redirect \"<<\" \"hello\n\"))"
        );
    }

    #[test]
    fn test_word_escaping() {
        assert_eq!(sexp("echo \"a\\\"b\""), "(command (word \"echo\") (word \"\\\"a\\\\\\\"b\\\"\"))");
        assert_eq!(sexp("echo $'a\\nb'"), "(command (word \"echo\") (word \"'a\\nb'\"))");
    }

    #[test]
    fn test_compound_commands() {
        assert_eq!(
            sexp("if a; then b; else c; fi"),
            "(if (command (word \"a\")) (command (word \"b\")) (command (word \"c\")))"
        );
        assert_eq!(
            sexp("for x; do y; done"),
            "(for (word \"x\") (in (word \"\\\"$@\\\"\")) (command (word \"y\")))"
        );
        assert_eq!(
            sexp("for ((;;)); do y; done"),
            "(arith-for (init (word \"1\")) (test (word \"1\")) (step (word \"1\")) (command (word \"y\")))"
        );
        assert_eq!(
            sexp("case x in a|b) y;; esac"),
            "(case (word \"x\") (pattern ((word \"a\") (word \"b\")) (command (word \"y\"))))"
        );
        assert_eq!(
            sexp("f() { a; }"),
            "(function \"f\" (brace-group (command (word \"a\"))))"
        );
        assert_eq!(
            sexp("coproc cat"),
            "(coproc \"COPROC\" (command (word \"cat\")))"
        );
    }

    #[test]
    fn test_arithmetic_and_conditional() {
        assert_eq!(sexp("(( x = 1 + 2 ))"), "(arith (word \" x = 1 + 2 \"))");
        assert_eq!(
            sexp("[[ ! -f x && ( a == b ) ]]"),
            "(cond (cond-and (cond-unary \"-f\" (cond-term \"x\")) (cond-expr (cond-binary \"==\" (cond-term \"a\") (cond-term \"b\")))))"
        );
    }

    #[test]
    fn test_negation_and_time() {
        assert_eq!(sexp("! a"), "(negation (command (word \"a\")))");
        assert_eq!(sexp("time -p a"), "(time -p (command (word \"a\")))");
    }

    #[test]
    fn test_cmdsub_word_is_normalized() {
        assert_eq!(
            sexp("echo $(ls   -l)"),
            "(command (word \"echo\") (word \"$(ls -l)\"))"
        );
    }
}
