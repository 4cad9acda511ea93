//! Command Substitution Formatting
//!
//! Commands nested in `$( ... )`, `${ ...; }` and `<( ... )` are rendered
//! back to normalized bash text inside the enclosing word, the way
//! `bash -n` prints them: one space between words, `; then`/`; do` on the
//! keyword line, bodies indented by four spaces, here-document bodies after
//! the line that introduced them.

use tracing::trace;

use super::types::{
    CommandNode, CommandSubstitutionNode, CondExpr, Node, ProcessSubstitutionNode, WordNode,
};
use super::word_format::{
    expand_all_ansi_c_quotes, normalize_array_whitespace, normalize_extglob_whitespace,
    strip_locale_string_dollars,
};
use crate::parser::parse_fragment;
use crate::parser::scan::{
    find_cmdsub_end, find_funsub_end, is_backslash_escaped, is_dollar_dollar_paren,
    is_expansion_start, is_extglob_prefix, is_funsub_char, is_quote, starts_with_at, substring,
    to_chars,
};
use crate::parser::types::QuoteState;

// =============================================================================
// HELPERS
// =============================================================================

/// Whether the first command of `node` is a subshell
pub(crate) fn starts_with_subshell(node: &Node) -> bool {
    match node {
        Node::Subshell(_) => true,
        Node::List(l) => l
            .parts
            .iter()
            .find(|p| !matches!(p, Node::Operator(_)))
            .is_some_and(starts_with_subshell),
        Node::Pipeline(p) => p.commands.first().is_some_and(starts_with_subshell),
        _ => false,
    }
}

fn has_heredoc(cmd: &CommandNode) -> bool {
    cmd.redirects.iter().any(|r| matches!(r, Node::HereDoc(_)))
}

/// Insert `text` before the first newline of `s`, or append it
fn insert_before_newline(s: &str, text: &str) -> String {
    match s.find('\n') {
        Some(nl) => format!("{}{}{}", &s[..nl], text, &s[nl..]),
        None => format!("{}{}", s, text),
    }
}

/// `$(` that opens a command substitution (not `$((` or `$$(`)
fn is_cmdsub_open(s: &[char], i: usize) -> bool {
    starts_with_at(s, i, "$(")
        && !starts_with_at(s, i, "$((")
        && !is_backslash_escaped(s, i)
        && !is_dollar_dollar_paren(s, i)
}

/// `<(`/`>(` at `i` is not glued to a preceding identifier or quote
fn at_procsub_boundary(s: &[char], i: usize) -> bool {
    i == 0 || !(s[i - 1].is_alphanumeric() || is_quote(s[i - 1]))
}

fn word_text(word: &WordNode) -> String {
    let value = expand_all_ansi_c_quotes(&word.value);
    let value = strip_locale_string_dollars(&value);
    let value = normalize_array_whitespace(&value);
    format_command_substitutions(&value, &word.parts, false)
}

// =============================================================================
// NODES
// =============================================================================

/// Render `node` as bash source. `in_procsub` and `compact_redirects` select
/// the tighter spacing used inside process substitutions; `procsub_first`
/// marks the leading command of one.
pub fn format_cmdsub_node(
    node: &Node,
    indent: usize,
    in_procsub: bool,
    compact_redirects: bool,
    procsub_first: bool,
) -> String {
    let sp = " ".repeat(indent);
    let inner_sp = " ".repeat(indent + 4);
    match node {
        Node::Command(cmd) => format_command(cmd, compact_redirects),
        Node::Pipeline(p) => format_pipeline(&p.commands, indent, in_procsub, procsub_first),
        Node::List(l) => format_list(&l.parts, indent, in_procsub, compact_redirects, procsub_first),
        Node::If(i) => {
            let cond = format_cmdsub_node(&i.condition, indent, false, false, false);
            let then_body = format_cmdsub_node(&i.then_body, indent + 4, false, false, false);
            let mut out = format!("if {}; then\n{}{};", cond, inner_sp, then_body);
            if let Some(else_body) = &i.else_body {
                let else_body = format_cmdsub_node(else_body, indent + 4, false, false, false);
                out.push_str(&format!("\n{}else\n{}{};", sp, inner_sp, else_body));
            }
            out.push_str(&format!("\n{}fi", sp));
            out
        }
        Node::While(w) => format_loop("while", &w.condition, &w.body, &w.redirects, indent),
        Node::Until(u) => format_loop("until", &u.condition, &u.body, &u.redirects, indent),
        Node::For(f) => {
            let body = format_cmdsub_node(&f.body, indent + 4, false, false, false);
            let words = match &f.words {
                Some(words) => words
                    .iter()
                    .map(|w| w.value.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
                None => "\"$@\"".to_string(),
            };
            let out = format!(
                "for {} in {};\n{}do\n{}{};\n{}done",
                f.var, words, sp, inner_sp, body, sp
            );
            with_redirects(out, &f.redirects)
        }
        Node::ForArith(f) => {
            let body = format_cmdsub_node(&f.body, indent + 4, false, false, false);
            let out = format!(
                "for (({}; {}; {}))\ndo\n{}{};\n{}done",
                f.init, f.cond, f.incr, inner_sp, body, sp
            );
            with_redirects(out, &f.redirects)
        }
        Node::Case(c) => {
            let pat_indent = " ".repeat(indent + 8);
            let term_indent = " ".repeat(indent + 4);
            let patterns: Vec<String> = c
                .patterns
                .iter()
                .enumerate()
                .map(|(idx, p)| {
                    let pat = p.pattern.replace('|', " | ");
                    let body = p
                        .body
                        .as_ref()
                        .map(|b| format_cmdsub_node(b, indent + 8, false, false, false))
                        .unwrap_or_default();
                    let body_part = if body.is_empty() {
                        "\n".to_string()
                    } else {
                        format!("{}{}\n", pat_indent, body)
                    };
                    let lead = if idx == 0 { " " } else { "" };
                    format!("{}{})\n{}{}{}", lead, pat, body_part, term_indent, p.terminator)
                })
                .collect();
            let out = format!(
                "case {} in{}\n{}esac",
                c.word.value,
                patterns.join(&format!("\n{}", term_indent)),
                sp
            );
            with_redirects(out, &c.redirects)
        }
        Node::Function(f) => {
            let inner = match f.body.as_ref() {
                Node::BraceGroup(b) => b.body.as_ref(),
                other => other,
            };
            let body = format_cmdsub_node(inner, indent + 4, false, false, false);
            let body = body.strip_suffix(';').unwrap_or(&body);
            format!("function {} () \n{{ \n{}{}\n}}", f.name, inner_sp, body)
        }
        Node::Subshell(s) => {
            let body = format_cmdsub_node(&s.body, indent, in_procsub, compact_redirects, false);
            let redirects = join_redirects(&s.redirects);
            let out = if procsub_first {
                format!("({})", body)
            } else {
                format!("( {} )", body)
            };
            if redirects.is_empty() {
                out
            } else {
                format!("{} {}", out, redirects)
            }
        }
        Node::BraceGroup(b) => {
            let body = format_cmdsub_node(&b.body, indent, false, false, false);
            let body = body.strip_suffix(';').unwrap_or(&body);
            let terminator = if body.ends_with(" &") { " }" } else { "; }" };
            let redirects = join_redirects(&b.redirects);
            if redirects.is_empty() {
                format!("{{ {}{}", body, terminator)
            } else {
                format!("{{ {}{} {}", body, terminator, redirects)
            }
        }
        Node::ArithmeticCommand(a) => format!("(({}))", a.raw_content),
        Node::ConditionalExpr(c) => format!("[[ {} ]]", format_cond_body(&c.body)),
        Node::Negation(n) => match &n.pipeline {
            Some(p) => format!("! {}", format_cmdsub_node(p, indent, false, false, false)),
            None => "! ".to_string(),
        },
        Node::Time(t) => {
            let prefix = if t.posix { "time -p " } else { "time " };
            match &t.pipeline {
                Some(p) => format!("{}{}", prefix, format_cmdsub_node(p, indent, false, false, false)),
                None => prefix.to_string(),
            }
        }
        _ => String::new(),
    }
}

fn format_loop(
    keyword: &str,
    condition: &Node,
    body: &Node,
    redirects: &[Node],
    indent: usize,
) -> String {
    let sp = " ".repeat(indent);
    let cond = format_cmdsub_node(condition, indent, false, false, false);
    let body = format_cmdsub_node(body, indent + 4, false, false, false);
    let out = format!(
        "{} {}; do\n{}{};\n{}done",
        keyword,
        cond,
        " ".repeat(indent + 4),
        body,
        sp
    );
    with_redirects(out, redirects)
}

fn with_redirects(mut out: String, redirects: &[Node]) -> String {
    for r in redirects {
        out.push(' ');
        out.push_str(&format_redirect(r, false, false));
    }
    out
}

fn join_redirects(redirects: &[Node]) -> String {
    redirects
        .iter()
        .map(|r| format_redirect(r, false, false))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_command(cmd: &CommandNode, compact_redirects: bool) -> String {
    let words: Vec<String> = cmd.words.iter().map(word_text).collect();
    let redirects: Vec<String> = cmd
        .redirects
        .iter()
        .map(|r| format_redirect(r, compact_redirects, true))
        .collect();
    let mut out = if compact_redirects && !words.is_empty() && !redirects.is_empty() {
        format!("{}{}", words.join(" "), redirects.concat())
    } else {
        words
            .into_iter()
            .chain(redirects)
            .collect::<Vec<_>>()
            .join(" ")
    };
    for r in &cmd.redirects {
        if let Node::HereDoc(h) = r {
            out.push('\n');
            out.push_str(&h.content);
            out.push_str(&h.delimiter);
            out.push('\n');
        }
    }
    out
}

fn format_pipeline(commands: &[Node], indent: usize, in_procsub: bool, procsub_first: bool) -> String {
    let mut cmds: Vec<(&Node, bool)> = Vec::new();
    for (i, cmd) in commands.iter().enumerate() {
        if matches!(cmd, Node::PipeBoth) {
            continue;
        }
        let needs_redirect = matches!(commands.get(i + 1), Some(Node::PipeBoth));
        cmds.push((cmd, needs_redirect));
    }

    let last = cmds.len().saturating_sub(1);
    let mut parts = Vec::with_capacity(cmds.len());
    for (idx, &(cmd, needs_redirect)) in cmds.iter().enumerate() {
        let mut formatted =
            format_cmdsub_node(cmd, indent, in_procsub, false, procsub_first && idx == 0);
        let heredoc = matches!(cmd, Node::Command(c) if has_heredoc(c));
        if needs_redirect {
            formatted = if heredoc {
                insert_before_newline(&formatted, " 2>&1")
            } else {
                formatted + " 2>&1"
            };
        }
        if idx != last && heredoc {
            if let Some(nl) = formatted.find('\n') {
                formatted = format!("{} |{}", &formatted[..nl], &formatted[nl..]);
            }
        }
        parts.push(formatted);
    }

    let compact_pipe = in_procsub && matches!(cmds.first(), Some((Node::Subshell(_), _)));
    let mut out = String::new();
    for (idx, part) in parts.iter().enumerate() {
        if idx > 0 {
            if out.ends_with('\n') {
                out.push_str("  ");
            } else if compact_pipe {
                out.push('|');
            } else {
                out.push_str(" | ");
            }
        }
        out.push_str(part);
    }
    out
}

fn format_list(
    parts: &[Node],
    indent: usize,
    in_procsub: bool,
    compact_redirects: bool,
    procsub_first: bool,
) -> String {
    let list_has_heredoc = parts.iter().any(|p| match p {
        Node::Command(c) => has_heredoc(c),
        Node::Pipeline(pl) => pl
            .commands
            .iter()
            .any(|c| matches!(c, Node::Command(c) if has_heredoc(c))),
        _ => false,
    });

    let mut out: Vec<String> = Vec::new();
    let mut skipped_semi = false;
    let mut cmd_count = 0;
    for part in parts {
        let Node::Operator(op) = part else {
            if out.last().is_some_and(|l| !l.ends_with(' ') && !l.ends_with('\n')) {
                out.push(" ".to_string());
            }
            let mut formatted = format_cmdsub_node(
                part,
                indent,
                in_procsub,
                compact_redirects,
                procsub_first && cmd_count == 0,
            );
            if out
                .last()
                .is_some_and(|l| l.contains(" || \n") || l.contains(" && \n"))
            {
                formatted.insert(0, ' ');
            }
            if skipped_semi {
                formatted.insert(0, ' ');
                skipped_semi = false;
            }
            out.push(formatted);
            cmd_count += 1;
            continue;
        };

        let last_is_heredoc = out.last().is_some_and(|l| l.contains("<<") && l.contains('\n'));
        match op.op.as_str() {
            ";" => {
                let n = out.len();
                let after_newline = out.last().is_some_and(|l| l.ends_with('\n'));
                let after_blank = n >= 3 && out[n - 2] == "\n" && out[n - 3].ends_with('\n');
                if after_newline || after_blank {
                    skipped_semi = true;
                    continue;
                }
                out.push(";".to_string());
                skipped_semi = false;
            }
            "\n" => {
                if out.last().is_some_and(|l| l == ";") {
                    skipped_semi = false;
                    continue;
                }
                if out.last().is_some_and(|l| l.ends_with('\n')) {
                    out.push(if skipped_semi { " " } else { "\n" }.to_string());
                    skipped_semi = false;
                    continue;
                }
                out.push("\n".to_string());
                skipped_semi = false;
            }
            "&" => {
                if let (true, Some(last)) = (last_is_heredoc, out.last_mut()) {
                    if last.contains(" |") || last.starts_with('|') {
                        last.push_str(" &");
                    } else {
                        *last = insert_before_newline(last, " &");
                    }
                } else {
                    out.push(" &".to_string());
                }
            }
            other => {
                if let (true, Some(last)) = (last_is_heredoc, out.last_mut()) {
                    *last = insert_before_newline(last, &format!(" {} ", other));
                } else {
                    out.push(format!(" {}", other));
                }
            }
        }
    }

    let mut s = out.concat();
    if s.contains(" &\n") && s.ends_with('\n') {
        s.push(' ');
        return s;
    }
    while s.ends_with(';') {
        s.pop();
    }
    if !list_has_heredoc {
        while s.ends_with('\n') {
            s.pop();
        }
    }
    s
}

// =============================================================================
// REDIRECTIONS
// =============================================================================

/// Redirect as bash text. With `heredoc_op_only` a here-document renders
/// just its operator and delimiter; the body is emitted by the command.
pub(crate) fn format_redirect(node: &Node, compact: bool, heredoc_op_only: bool) -> String {
    match node {
        Node::HereDoc(h) => {
            let mut op = if h.strip_tabs { "<<-" } else { "<<" }.to_string();
            if let Some(fd) = h.fd.filter(|&fd| fd > 0) {
                op = format!("{}{}", fd, op);
            }
            let delim = if h.quoted {
                format!("'{}'", h.delimiter)
            } else {
                h.delimiter.clone()
            };
            if heredoc_op_only {
                format!("{}{}", op, delim)
            } else {
                format!("{}{}\n{}{}\n", op, delim, h.content, h.delimiter)
            }
        }
        Node::Redirect(r) => {
            let mut op = match r.op.as_str() {
                "1>" => ">".to_string(),
                "0<" => "<".to_string(),
                other => other.to_string(),
            };
            let target = expand_all_ansi_c_quotes(&r.target.value);
            let target = strip_locale_string_dollars(&target);
            let target = format_command_substitutions(&target, &r.target.parts, false);
            if let Some(after_amp) = target.strip_prefix('&') {
                let mut was_input_close = false;
                if target == "&-" && op.ends_with('<') {
                    was_input_close = true;
                    op.pop();
                    op.push('>');
                }
                let literal_fd =
                    after_amp == "-" || after_amp.starts_with(|c: char| c.is_ascii_digit());
                if literal_fd {
                    if op == ">" || op == ">&" {
                        op = if was_input_close { "0>" } else { "1>" }.to_string();
                    } else if op == "<" || op == "<&" {
                        op = "0<".to_string();
                    }
                }
                return format!("{}{}", op, target);
            }
            if op.ends_with('&') || compact {
                format!("{}{}", op, target)
            } else {
                format!("{} {}", op, target)
            }
        }
        _ => String::new(),
    }
}

// =============================================================================
// CONDITIONALS
// =============================================================================

pub(crate) fn format_cond_body(expr: &CondExpr) -> String {
    match expr {
        CondExpr::Unary { op, operand } => format!("{} {}", op, operand.cond_formatted_value()),
        CondExpr::Binary { op, left, right } => format!(
            "{} {} {}",
            left.cond_formatted_value(),
            op,
            right.cond_formatted_value()
        ),
        CondExpr::And(l, r) => format!("{} && {}", format_cond_body(l), format_cond_body(r)),
        CondExpr::Or(l, r) => format!("{} || {}", format_cond_body(l), format_cond_body(r)),
        CondExpr::Not(inner) => format!("! {}", format_cond_body(inner)),
        CondExpr::Paren(inner) => format!("( {} )", format_cond_body(inner)),
    }
}

// =============================================================================
// SUBSTITUTIONS IN WORD TEXT
// =============================================================================

/// Scan for a `$(` or procsub opener that the word's parts do not account for
fn has_untracked_substitution(s: &[char]) -> bool {
    let mut in_dquote = false;
    let mut i = 0;
    while i < s.len() {
        let c = s[i];
        if c == '"' {
            in_dquote = !in_dquote;
            i += 1;
        } else if c == '\'' && !in_dquote {
            i += 1;
            while i < s.len() && s[i] != '\'' {
                i += 1;
            }
            if i < s.len() {
                i += 1;
            }
        } else if is_cmdsub_open(s, i) {
            return true;
        } else if (starts_with_at(s, i, "<(") || starts_with_at(s, i, ">(")) && !in_dquote {
            if at_procsub_boundary(s, i) {
                return true;
            }
            i += 1;
        } else {
            i += 1;
        }
    }
    false
}

/// Reparse `inner` and render it; a parse failure keeps the text as written
fn reformat_fragment(inner: &str) -> String {
    match parse_fragment(inner) {
        Ok(Some((node, _))) => format_cmdsub_node(&node, 0, false, false, false),
        Ok(None) => String::new(),
        Err(err) => {
            trace!(error = %err, "keeping unparsable command substitution text");
            inner.to_string()
        }
    }
}

/// Rewrite every command and process substitution in `value` into its
/// normalized form. Substitutions are matched in order with the
/// `CommandSubstitution`/`ProcessSubstitution` nodes in `parts`; ones the
/// parts do not cover are reparsed from the text. `in_arith` keeps the body
/// of an untracked process substitution verbatim.
pub(crate) fn format_command_substitutions(value: &str, parts: &[Node], in_arith: bool) -> String {
    let mut cmdsubs: Vec<&CommandSubstitutionNode> = Vec::new();
    let mut procsubs: Vec<&ProcessSubstitutionNode> = Vec::new();
    let mut has_arith = false;
    for part in parts {
        match part {
            Node::CommandSubstitution(c) => cmdsubs.push(c),
            Node::ProcessSubstitution(p) => procsubs.push(p),
            Node::ArithmeticExpansion(_) => has_arith = true,
            _ => {}
        }
    }

    let s = to_chars(value);
    let n = s.len();
    let has_brace_cmdsub = ["${ ", "${\t", "${\n", "${|"].iter().any(|p| value.contains(p));
    let has_param_with_procsub =
        value.contains("${") && (value.contains("<(") || value.contains(">("));
    if cmdsubs.is_empty()
        && procsubs.is_empty()
        && !has_brace_cmdsub
        && !has_param_with_procsub
        && !has_untracked_substitution(&s)
    {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut cmdsub_idx = 0;
    let mut procsub_idx = 0;
    let mut in_dquote = false;
    let mut extglob_depth = 0usize;
    let mut deprecated_arith_depth = 0usize;
    let mut arith_depth = 0usize;
    let mut arith_paren_depth: isize = 0;
    let mut i = 0;
    while i < n {
        let c = s[i];
        if i > 0 && is_extglob_prefix(s[i - 1]) && c == '(' && !is_backslash_escaped(&s, i - 1) {
            extglob_depth += 1;
            out.push(c);
            i += 1;
            continue;
        }
        if c == ')' && extglob_depth > 0 {
            extglob_depth -= 1;
            out.push(c);
            i += 1;
            continue;
        }
        if starts_with_at(&s, i, "$[") && !is_backslash_escaped(&s, i) {
            deprecated_arith_depth += 1;
            out.push(c);
            i += 1;
            continue;
        }
        if c == ']' && deprecated_arith_depth > 0 {
            deprecated_arith_depth -= 1;
            out.push(c);
            i += 1;
            continue;
        }
        if has_arith && is_expansion_start(&s, i, "$((") && !is_backslash_escaped(&s, i) {
            arith_depth += 1;
            arith_paren_depth += 2;
            out.push_str("$((");
            i += 3;
            continue;
        }
        if arith_depth > 0 && arith_paren_depth == 2 && starts_with_at(&s, i, "))") {
            arith_depth -= 1;
            arith_paren_depth -= 2;
            out.push_str("))");
            i += 2;
            continue;
        }
        if arith_depth > 0 && (c == '(' || c == ')') {
            arith_paren_depth += if c == '(' { 1 } else { -1 };
            out.push(c);
            i += 1;
            continue;
        }
        if !has_arith && is_expansion_start(&s, i, "$((") {
            let j = find_cmdsub_end(&s, i + 2);
            out.push_str(&substring(&s, i, j));
            if cmdsub_idx < cmdsubs.len() {
                cmdsub_idx += 1;
            }
            i = j;
            continue;
        }

        if is_cmdsub_open(&s, i) {
            let j = find_cmdsub_end(&s, i + 2);
            if extglob_depth > 0 {
                out.push_str(&substring(&s, i, j));
                if cmdsub_idx < cmdsubs.len() {
                    cmdsub_idx += 1;
                }
                i = j;
                continue;
            }
            let formatted = match cmdsubs.get(cmdsub_idx) {
                Some(sub) => {
                    cmdsub_idx += 1;
                    format_cmdsub_node(&sub.command, 0, false, false, false)
                }
                None => reformat_fragment(&substring(&s, i + 2, j.saturating_sub(1))),
            };
            if formatted.starts_with('(') {
                out.push_str(&format!("$( {})", formatted));
            } else {
                out.push_str(&format!("$({})", formatted));
            }
            i = j;
        } else if c == '`' && cmdsub_idx < cmdsubs.len() {
            let mut j = i + 1;
            while j < n {
                if s[j] == '\\' && j + 1 < n {
                    j += 2;
                    continue;
                }
                j += 1;
                if s[j - 1] == '`' {
                    break;
                }
            }
            out.push_str(&substring(&s, i, j));
            cmdsub_idx += 1;
            i = j;
        } else if is_expansion_start(&s, i, "${")
            && i + 2 < n
            && is_funsub_char(s[i + 2])
            && !is_backslash_escaped(&s, i)
        {
            let j = find_funsub_end(&s, i + 2);
            match cmdsubs.get(cmdsub_idx).filter(|sub| sub.brace) {
                Some(sub) => {
                    let formatted = format_cmdsub_node(&sub.command, 0, false, false, false);
                    let prefix = if s[i + 2] == '|' { "${|" } else { "${ " };
                    let ends_with_newline = j >= 2 && j - 2 > i + 1 && s[j - 2] == '\n';
                    let suffix = if formatted.trim().is_empty() {
                        "}"
                    } else if formatted.ends_with('&') {
                        " }"
                    } else if formatted.ends_with("& ") {
                        "}"
                    } else if ends_with_newline {
                        "\n }"
                    } else {
                        "; }"
                    };
                    out.push_str(prefix);
                    out.push_str(&formatted);
                    out.push_str(suffix);
                    cmdsub_idx += 1;
                }
                None => out.push_str(&substring(&s, i, j)),
            }
            i = j;
        } else if (starts_with_at(&s, i, ">(") || starts_with_at(&s, i, "<("))
            && !in_dquote
            && deprecated_arith_depth == 0
            && arith_depth == 0
        {
            let direction = c;
            let j = find_cmdsub_end(&s, i + 2);
            if extglob_depth > 0 {
                out.push_str(&substring(&s, i, j));
                if procsub_idx < procsubs.len() {
                    procsub_idx += 1;
                }
                i = j;
                continue;
            }
            let raw = substring(&s, i + 2, j.saturating_sub(1));
            if let Some(sub) = procsubs.get(procsub_idx) {
                out.push_str(&format_tracked_procsub(sub, direction, &raw));
                procsub_idx += 1;
                i = j;
                continue;
            }
            if !at_procsub_boundary(&s, i) {
                out.push(c);
                i += 1;
                continue;
            }
            if j > 0 && s[j - 1] != ')' {
                out.push(c);
                i += 1;
                continue;
            }
            let body = if !parts.is_empty() {
                match parse_fragment(&raw) {
                    Ok(Some((node, true))) if !raw.contains('\n') => {
                        let compact = starts_with_subshell(&node);
                        format_cmdsub_node(&node, 0, true, compact, true)
                    }
                    _ => raw,
                }
            } else if in_arith || raw.trim().is_empty() {
                raw
            } else {
                raw.trim_start_matches([' ', '\t']).to_string()
            };
            out.push(direction);
            out.push('(');
            out.push_str(&body);
            out.push(')');
            i = j;
        } else if is_expansion_start(&s, i, "${") && !is_backslash_escaped(&s, i) {
            let (j, closed) = find_param_close(&s, i + 2);
            let inner = if closed {
                substring(&s, i + 2, j - 1)
            } else {
                substring(&s, i + 2, j)
            };
            let inner = format_command_substitutions(&inner, parts, false);
            out.push_str("${");
            out.push_str(&normalize_extglob_whitespace(&inner));
            if closed {
                out.push('}');
            }
            i = j;
        } else if c == '"' {
            in_dquote = !in_dquote;
            out.push(c);
            i += 1;
        } else if c == '\'' && !in_dquote {
            let mut j = i + 1;
            while j < n && s[j] != '\'' {
                j += 1;
            }
            if j < n {
                j += 1;
            }
            out.push_str(&substring(&s, i, j));
            i = j;
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

/// End of a `${...}` body starting at `start`, skipping quoted text and
/// nested command substitutions; the flag is false when no `}` closed it.
fn find_param_close(s: &[char], start: usize) -> (usize, bool) {
    let n = s.len();
    let mut depth = 1;
    let mut quote = QuoteState::new();
    let mut j = start;
    while j < n && depth > 0 {
        let c = s[j];
        if c == '\\' && j + 1 < n && !quote.single {
            j += 2;
            continue;
        }
        if c == '\'' && !quote.double {
            quote.single = !quote.single;
        } else if c == '"' && !quote.single {
            quote.double = !quote.double;
        } else if !quote.in_quotes() {
            if is_expansion_start(s, j, "$(") && !starts_with_at(s, j, "$((") {
                j = find_cmdsub_end(s, j + 2);
                continue;
            }
            if c == '{' {
                depth += 1;
            } else if c == '}' {
                depth -= 1;
            }
        }
        j += 1;
    }
    (j, depth == 0)
}

/// `<( ... )` backed by a parsed node. A body that starts with a subshell
/// keeps its original text where the rendering would differ.
fn format_tracked_procsub(sub: &ProcessSubstitutionNode, direction: char, raw: &str) -> String {
    let compact = starts_with_subshell(&sub.command);
    if matches!(sub.command.as_ref(), Node::Subshell(_)) {
        let stripped = raw.trim_start_matches([' ', '\t', '\n']);
        if stripped.starts_with('(') {
            let leading = &raw[..raw.len() - stripped.len()];
            if leading.is_empty() {
                return format!("{}({})", direction, raw.replace("\\\n", ""));
            }
            let spaced = format_cmdsub_node(&sub.command, 0, false, false, false);
            return format!("{}({}{})", direction, leading.replace(['\n', '\t'], " "), spaced);
        }
    }
    let formatted = format_cmdsub_node(&sub.command, 0, true, compact, true);
    let raw_stripped = raw.replace("\\\n", "");
    if compact && formatted != raw_stripped {
        format!("{}({})", direction, raw_stripped)
    } else {
        format!("{}({})", direction, formatted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn first(src: &str) -> Node {
        parse(src, false).unwrap().remove(0)
    }

    fn fmt(src: &str) -> String {
        format_cmdsub_node(&first(src), 0, false, false, false)
    }

    #[test]
    fn test_simple_and_list() {
        assert_eq!(fmt("echo   a  b"), "echo a b");
        assert_eq!(fmt("a && b || c"), "a && b || c");
        assert_eq!(fmt("a; b;"), "a; b");
        assert_eq!(fmt("a & b"), "a & b");
    }

    #[test]
    fn test_redirect_spacing() {
        assert_eq!(fmt("cat <in >out 2>&1"), "cat < in > out 2>&1");
        assert_eq!(fmt("cat 0<in 1>out"), "cat < in > out");
        assert_eq!(fmt("exec >&-"), "exec 1>&-");
    }

    #[test]
    fn test_compound_layout() {
        assert_eq!(fmt("if a; then b; fi"), "if a; then\n    b;\nfi");
        assert_eq!(fmt("while a; do b; done"), "while a; do\n    b;\ndone");
        assert_eq!(fmt("for x in 1 2; do y; done"), "for x in 1 2;\ndo\n    y;\ndone");
        assert_eq!(fmt("( a )"), "( a )");
        assert_eq!(fmt("{ a; }"), "{ a; }");
        assert_eq!(fmt("f() { a; }"), "function f () \n{ \n    a\n}");
    }

    #[test]
    fn test_case_layout() {
        assert_eq!(
            fmt("case x in a|b) y;; esac"),
            "case x in a | b)\n        y\n    ;;\nesac"
        );
    }

    #[test]
    fn test_heredoc_body_follows_command() {
        assert_eq!(fmt("cat <<EOF\nhi\nEOF\n"), "cat <<EOF\nhi\nEOF\n");
    }

    #[test]
    fn test_pipe_both_becomes_redirect() {
        assert_eq!(fmt("a |& b"), "a 2>&1 | b");
    }

    #[test]
    fn test_conditional_body() {
        assert_eq!(fmt("[[ -f x && ! $a == b ]]"), "[[ -f x && ! $a == b ]]");
    }

    #[test]
    fn test_untracked_cmdsub_is_reparsed() {
        assert_eq!(format_command_substitutions("$(echo   hi)", &[], false), "$(echo hi)");
        assert_eq!(format_command_substitutions("'$(x  y)'", &[], false), "'$(x  y)'");
        assert_eq!(format_command_substitutions("$((1+2))", &[], false), "$((1+2))");
    }

    #[test]
    fn test_subshell_cmdsub_gets_space() {
        assert_eq!(format_command_substitutions("$((a) )", &[], false), "$((a) )");
        assert_eq!(format_command_substitutions("$( (a) )", &[], false), "$( ( a ))");
    }

    #[test]
    fn test_starts_with_subshell() {
        assert!(starts_with_subshell(&first("(a) | b")));
        assert!(!starts_with_subshell(&first("a; (b)")));
    }
}
