//! Character Scanners
//!
//! Stateless helpers that walk a `&[char]` buffer. They are shared by the
//! parser (which owns a cursor) and the serializer (which re-scans the raw
//! text of words). All positions are character indices.

use crate::parser::types::{
    DolbraceState, QuoteState, SMP_LITERAL, SMP_PAST_OPEN,
};

// =============================================================================
// CHARACTER CLASSES
// =============================================================================

pub fn is_metachar(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '|' | '&' | ';' | '(' | ')' | '<' | '>')
}

pub fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n')
}

pub fn is_whitespace_no_newline(c: char) -> bool {
    c == ' ' || c == '\t'
}

pub fn is_quote(c: char) -> bool {
    c == '\'' || c == '"'
}

/// First character after `${` that makes it a funsub
pub fn is_funsub_char(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '|')
}

pub fn is_extglob_prefix(c: char) -> bool {
    matches!(c, '@' | '?' | '*' | '+' | '!')
}

pub fn is_redirect_char(c: char) -> bool {
    c == '<' || c == '>'
}

pub fn is_special_param(c: char) -> bool {
    matches!(c, '?' | '$' | '!' | '#' | '@' | '*' | '-' | '&')
}

pub fn is_special_param_unbraced(c: char) -> bool {
    matches!(c, '?' | '$' | '!' | '#' | '@' | '*' | '-')
}

pub fn is_word_end_context(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | ';' | '|' | '&' | '<' | '>' | '(' | ')')
}

pub fn is_simple_param_op(c: char) -> bool {
    matches!(c, '-' | '=' | '?' | '+')
}

pub fn is_param_expansion_op(c: char) -> bool {
    matches!(
        c,
        ':' | '-' | '=' | '+' | '?' | '#' | '%' | '/' | '^' | ',' | '@' | '*' | '['
    )
}

pub fn is_escape_char_in_backtick(c: char) -> bool {
    matches!(c, '$' | '`' | '\\')
}

/// Characters after `!` that make it a pipeline negation
pub fn is_negation_boundary(c: char) -> bool {
    is_whitespace(c) || matches!(c, ';' | '|' | ')' | '&' | '>' | '<')
}

pub fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_name_start(c) => chars.all(is_name_char),
        _ => false,
    }
}

// =============================================================================
// SMALL HELPERS
// =============================================================================

pub fn to_chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

pub fn substring(s: &[char], start: usize, end: usize) -> String {
    let end = end.min(s.len());
    if start >= end {
        return String::new();
    }
    s[start..end].iter().collect()
}

/// Whether `prefix` occurs in `s` at character index `pos`.
pub fn starts_with_at(s: &[char], pos: usize, prefix: &str) -> bool {
    let mut i = pos;
    for p in prefix.chars() {
        if s.get(i) != Some(&p) {
            return false;
        }
        i += 1;
    }
    true
}

/// Number of unescaped `$` immediately before `pos`.
pub fn count_consecutive_dollars_before(s: &[char], pos: usize) -> usize {
    let mut count = 0;
    let mut k = pos;
    while k > 0 && s[k - 1] == '$' {
        let mut bs = 0;
        let mut j = k - 1;
        while j > 0 && s[j - 1] == '\\' {
            bs += 1;
            j -= 1;
        }
        if bs % 2 == 1 {
            break;
        }
        count += 1;
        k -= 1;
    }
    count
}

/// `delimiter` starts at `pos` and is not itself escaped by a preceding `$`.
pub fn is_expansion_start(s: &[char], pos: usize, delimiter: &str) -> bool {
    starts_with_at(s, pos, delimiter) && count_consecutive_dollars_before(s, pos) % 2 == 0
}

pub fn is_backslash_escaped(s: &[char], idx: usize) -> bool {
    let mut count = 0;
    let mut j = idx;
    while j > 0 && s[j - 1] == '\\' {
        count += 1;
        j -= 1;
    }
    count % 2 == 1
}

/// `$(` preceded by an odd run of `$` is really `$$` followed by `(`.
pub fn is_dollar_dollar_paren(s: &[char], idx: usize) -> bool {
    let mut count = 0;
    let mut j = idx;
    while j > 0 && s[j - 1] == '$' {
        count += 1;
        j -= 1;
    }
    count % 2 == 1
}

pub fn count_trailing_backslashes(s: &str) -> usize {
    s.chars().rev().take_while(|&c| c == '\\').count()
}

/// Keyword at `pos` of length `len` is not glued to identifier characters.
pub fn is_word_boundary(s: &[char], pos: usize, len: usize) -> bool {
    if pos > 0 {
        let prev = s[pos - 1];
        if is_name_char(prev) || matches!(prev, '{' | '}' | '!') {
            return false;
        }
    }
    match s.get(pos + len) {
        Some(&c) => !is_name_char(c),
        None => true,
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::new();
    let mut prev_ws = false;
    for c in s.chars() {
        if c == ' ' || c == '\t' {
            if !prev_ws {
                out.push(' ');
            }
            prev_ws = true;
        } else {
            out.push(c);
            prev_ws = false;
        }
    }
    out.trim().to_string()
}

/// Collapse whitespace inside `$(..)`, `${..}`, `<(..)` and `>(..)` so that
/// heredoc delimiters compare equal regardless of interior spacing.
pub fn normalize_heredoc_delimiter(delimiter: &str) -> String {
    let d = to_chars(delimiter);
    let mut result = String::new();
    let mut i = 0;
    while i < d.len() {
        let group = if i + 1 < d.len() && d[i] == '$' && d[i + 1] == '(' {
            Some(('(', ')'))
        } else if i + 1 < d.len() && d[i] == '$' && d[i + 1] == '{' {
            Some(('{', '}'))
        } else if i + 1 < d.len() && is_redirect_char(d[i]) && d[i + 1] == '(' {
            Some(('(', ')'))
        } else {
            None
        };
        let Some((open, close)) = group else {
            result.push(d[i]);
            i += 1;
            continue;
        };
        result.push(d[i]);
        result.push(d[i + 1]);
        i += 2;
        let mut depth = 1;
        let mut inner = String::new();
        while i < d.len() && depth > 0 {
            let c = d[i];
            if c == open {
                depth += 1;
                inner.push(c);
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    result.push_str(&collapse_whitespace(&inner));
                    result.push(close);
                } else {
                    inner.push(c);
                }
            } else {
                inner.push(c);
            }
            i += 1;
        }
    }
    result
}

/// Remove backslash-newline pairs, keeping the newline that ends a comment.
pub fn strip_line_continuations_comment_aware(text: &[char]) -> String {
    let mut result = String::new();
    let mut in_comment = false;
    let mut quote = QuoteState::new();
    let mut i = 0;
    while i < text.len() {
        let c = text[i];
        if c == '\\' && i + 1 < text.len() && text[i + 1] == '\n' {
            let mut preceding = 0;
            let mut j = i;
            while j > 0 && text[j - 1] == '\\' {
                preceding += 1;
                j -= 1;
            }
            if preceding % 2 == 0 {
                if in_comment {
                    result.push('\n');
                }
                i += 2;
                in_comment = false;
                continue;
            }
        }
        if c == '\n' {
            in_comment = false;
            result.push(c);
            i += 1;
            continue;
        }
        if c == '\'' && !quote.double && !in_comment {
            quote.single = !quote.single;
        } else if c == '"' && !quote.single && !in_comment {
            quote.double = !quote.double;
        } else if c == '#' && !quote.single && !in_comment {
            in_comment = true;
        }
        result.push(c);
        i += 1;
    }
    result
}

// =============================================================================
// QUOTE / BRACKET CONSUMERS (case patterns)
// =============================================================================

pub fn consume_single_quote(s: &[char], start: usize) -> (usize, String) {
    let mut out = String::from("'");
    let mut i = start + 1;
    while i < s.len() && s[i] != '\'' {
        out.push(s[i]);
        i += 1;
    }
    if i < s.len() {
        out.push(s[i]);
        i += 1;
    }
    (i, out)
}

pub fn consume_double_quote(s: &[char], start: usize) -> (usize, String) {
    let mut out = String::from("\"");
    let mut i = start + 1;
    while i < s.len() && s[i] != '"' {
        if s[i] == '\\' && i + 1 < s.len() {
            out.push(s[i]);
            i += 1;
        }
        out.push(s[i]);
        i += 1;
    }
    if i < s.len() {
        out.push(s[i]);
        i += 1;
    }
    (i, out)
}

fn has_bracket_close(s: &[char], start: usize, depth: usize) -> bool {
    for &c in s.iter().skip(start) {
        if c == ']' {
            return true;
        }
        if (c == '|' || c == ')') && depth == 0 {
            return false;
        }
    }
    false
}

/// Consume a `[...]` character class; a lone `[` is returned as itself.
pub fn consume_bracket_class(s: &[char], start: usize, depth: usize) -> (usize, String) {
    let mut scan = start + 1;
    if scan < s.len() && (s[scan] == '!' || s[scan] == '^') {
        scan += 1;
    }
    if scan < s.len() && s[scan] == ']' && has_bracket_close(s, scan + 1, depth) {
        scan += 1;
    }
    let mut is_bracket = false;
    while scan < s.len() {
        if s[scan] == ']' {
            is_bracket = true;
            break;
        }
        if (s[scan] == ')' || s[scan] == '|') && depth == 0 {
            break;
        }
        scan += 1;
    }
    if !is_bracket {
        return (start + 1, "[".to_string());
    }
    let mut out = String::from("[");
    let mut i = start + 1;
    if i < s.len() && (s[i] == '!' || s[i] == '^') {
        out.push(s[i]);
        i += 1;
    }
    if i < s.len() && s[i] == ']' && has_bracket_close(s, i + 1, depth) {
        out.push(s[i]);
        i += 1;
    }
    while i < s.len() && s[i] != ']' {
        out.push(s[i]);
        i += 1;
    }
    if i < s.len() {
        out.push(s[i]);
        i += 1;
    }
    (i, out)
}

// =============================================================================
// SKIPPERS
// =============================================================================

/// `start` is just past the opening quote.
pub fn skip_single_quoted(s: &[char], start: usize) -> usize {
    let mut i = start;
    while i < s.len() && s[i] != '\'' {
        i += 1;
    }
    if i < s.len() {
        i + 1
    } else {
        i
    }
}

/// `start` is just past the opening quote.
pub fn skip_double_quoted(s: &[char], start: usize) -> usize {
    let n = s.len();
    let mut i = start;
    let mut pass_next = false;
    let mut backq = false;
    while i < n {
        let c = s[i];
        if pass_next {
            pass_next = false;
            i += 1;
            continue;
        }
        if c == '\\' {
            pass_next = true;
            i += 1;
            continue;
        }
        if backq {
            if c == '`' {
                backq = false;
            }
            i += 1;
            continue;
        }
        if c == '`' {
            backq = true;
            i += 1;
            continue;
        }
        if c == '$' && i + 1 < n {
            if s[i + 1] == '(' {
                i = find_cmdsub_end(s, i + 2);
                continue;
            }
            if s[i + 1] == '{' {
                i = find_braced_param_end(s, i + 2);
                continue;
            }
        }
        if c == '"' {
            return i + 1;
        }
        i += 1;
    }
    i
}

pub fn skip_backtick(s: &[char], start: usize) -> usize {
    let mut i = start + 1;
    while i < s.len() && s[i] != '`' {
        if s[i] == '\\' && i + 1 < s.len() {
            i += 2;
        } else {
            i += 1;
        }
    }
    if i < s.len() {
        i += 1;
    }
    i
}

/// Whether a `)` inside case patterns belongs to a nested `case ... esac`.
pub fn lookahead_for_esac(s: &[char], start: usize, case_depth: usize) -> bool {
    let mut i = start;
    let mut depth = case_depth as isize;
    let mut quote = QuoteState::new();
    while i < s.len() {
        let c = s[i];
        if c == '\\' && i + 1 < s.len() && quote.double {
            i += 2;
            continue;
        }
        if c == '\'' && !quote.double {
            quote.single = !quote.single;
            i += 1;
            continue;
        }
        if c == '"' && !quote.single {
            quote.double = !quote.double;
            i += 1;
            continue;
        }
        if quote.in_quotes() {
            i += 1;
            continue;
        }
        if starts_with_at(s, i, "case") && is_word_boundary(s, i, 4) {
            depth += 1;
            i += 4;
        } else if starts_with_at(s, i, "esac") && is_word_boundary(s, i, 4) {
            depth -= 1;
            if depth == 0 {
                return true;
            }
            i += 4;
        } else if c == ')' && depth <= 0 {
            break;
        } else {
            i += 1;
        }
    }
    false
}

/// `$((` at `start` closes with `))` rather than being `$( (...) )`.
pub fn is_valid_arithmetic_start(s: &[char], start: usize) -> bool {
    let mut paren = 0usize;
    let mut i = start + 3;
    while i < s.len() {
        if is_expansion_start(s, i, "$(") {
            i = find_cmdsub_end(s, i + 2);
            continue;
        }
        match s[i] {
            '(' => paren += 1,
            ')' => {
                if paren > 0 {
                    paren -= 1;
                } else {
                    return i + 1 < s.len() && s[i + 1] == ')';
                }
            }
            _ => {}
        }
        i += 1;
    }
    false
}

/// End (exclusive) of a `${ ...; }` funsub body starting at `start`.
pub fn find_funsub_end(s: &[char], start: usize) -> usize {
    let mut depth = 1;
    let mut i = start;
    let mut quote = QuoteState::new();
    while i < s.len() && depth > 0 {
        let c = s[i];
        if c == '\\' && i + 1 < s.len() && !quote.single {
            i += 2;
            continue;
        }
        if c == '\'' && !quote.double {
            quote.single = !quote.single;
            i += 1;
            continue;
        }
        if c == '"' && !quote.single {
            quote.double = !quote.double;
            i += 1;
            continue;
        }
        if quote.in_quotes() {
            i += 1;
            continue;
        }
        if c == '{' {
            depth += 1;
        } else if c == '}' {
            depth -= 1;
            if depth == 0 {
                return i + 1;
            }
        }
        i += 1;
    }
    s.len()
}

/// End (exclusive, past the closing `)`) of a `$(...)` body starting at `start`.
pub fn find_cmdsub_end(s: &[char], start: usize) -> usize {
    let n = s.len();
    let mut depth = 1;
    let mut i = start;
    let mut case_depth = 0usize;
    let mut in_case_patterns = false;
    let mut arith_depth = 0usize;
    let mut arith_paren_depth = 0usize;
    while i < n && depth > 0 {
        let c = s[i];
        if c == '\\' && i + 1 < n {
            i += 2;
            continue;
        }
        if c == '\'' {
            i = skip_single_quoted(s, i + 1);
            continue;
        }
        if c == '"' {
            i = skip_double_quoted(s, i + 1);
            continue;
        }
        if c == '#'
            && arith_depth == 0
            && (i == start
                || matches!(s[i - 1], ' ' | '\t' | '\n' | ';' | '|' | '&' | '(' | ')'))
        {
            while i < n && s[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if starts_with_at(s, i, "<<<") {
            i += 3;
            while i < n && is_whitespace_no_newline(s[i]) {
                i += 1;
            }
            if i < n && s[i] == '"' {
                i += 1;
                while i < n && s[i] != '"' {
                    if s[i] == '\\' && i + 1 < n {
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                if i < n {
                    i += 1;
                }
            } else if i < n && s[i] == '\'' {
                i += 1;
                while i < n && s[i] != '\'' {
                    i += 1;
                }
                if i < n {
                    i += 1;
                }
            } else {
                while i < n && !" \t\n;|&<>()".contains(s[i]) {
                    i += 1;
                }
            }
            continue;
        }
        if is_expansion_start(s, i, "$((") {
            if is_valid_arithmetic_start(s, i) {
                arith_depth += 1;
                i += 3;
                continue;
            }
            i = find_cmdsub_end(s, i + 2);
            continue;
        }
        if arith_depth > 0 && arith_paren_depth == 0 && starts_with_at(s, i, "))") {
            arith_depth -= 1;
            i += 2;
            continue;
        }
        if c == '`' {
            i = skip_backtick(s, i);
            continue;
        }
        if arith_depth == 0 && starts_with_at(s, i, "<<") {
            i = skip_heredoc(s, i);
            continue;
        }
        if starts_with_at(s, i, "case") && is_word_boundary(s, i, 4) {
            case_depth += 1;
            in_case_patterns = false;
            i += 4;
            continue;
        }
        if case_depth > 0 && starts_with_at(s, i, "in") && is_word_boundary(s, i, 2) {
            in_case_patterns = true;
            i += 2;
            continue;
        }
        if starts_with_at(s, i, "esac") && is_word_boundary(s, i, 4) {
            if case_depth > 0 {
                case_depth -= 1;
                in_case_patterns = false;
            }
            i += 4;
            continue;
        }
        if starts_with_at(s, i, ";;") {
            i += 2;
            continue;
        }
        if c == '(' {
            if !(in_case_patterns && case_depth > 0) {
                if arith_depth > 0 {
                    arith_paren_depth += 1;
                } else {
                    depth += 1;
                }
            }
        } else if c == ')' {
            if in_case_patterns && case_depth > 0 {
                if !lookahead_for_esac(s, i + 1, case_depth) {
                    depth -= 1;
                }
            } else if arith_depth > 0 {
                arith_paren_depth = arith_paren_depth.saturating_sub(1);
            } else {
                depth -= 1;
            }
        }
        i += 1;
    }
    i
}

/// End (exclusive, past `}`) of a `${...}` body starting at `start`.
pub fn find_braced_param_end(s: &[char], start: usize) -> usize {
    let n = s.len();
    let mut depth = 1;
    let mut i = start;
    let mut in_double = false;
    let mut state = DolbraceState::Param;
    while i < n && depth > 0 {
        let c = s[i];
        if c == '\\' && i + 1 < n {
            i += 2;
            continue;
        }
        if c == '\'' && state == DolbraceState::Quote && !in_double {
            i = skip_single_quoted(s, i + 1);
            continue;
        }
        if c == '"' {
            in_double = !in_double;
            i += 1;
            continue;
        }
        if in_double {
            i += 1;
            continue;
        }
        if state == DolbraceState::Param && "%#^,".contains(c) {
            state = DolbraceState::Quote;
        } else if state == DolbraceState::Param && ":-=?+/".contains(c) {
            state = DolbraceState::Word;
        }
        if c == '[' && state == DolbraceState::Param {
            if let Some(end) = skip_subscript(s, i, 0) {
                i = end;
                continue;
            }
        }
        if is_redirect_char(c) && i + 1 < n && s[i + 1] == '(' {
            i = find_cmdsub_end(s, i + 2);
            continue;
        }
        if c == '{' {
            depth += 1;
        } else if c == '}' {
            depth -= 1;
            if depth == 0 {
                return i + 1;
            }
        }
        if is_expansion_start(s, i, "$(") {
            i = find_cmdsub_end(s, i + 2);
            continue;
        }
        if is_expansion_start(s, i, "${") {
            i = find_braced_param_end(s, i + 2);
            continue;
        }
        i += 1;
    }
    i
}

/// Join a heredoc line with following lines while it ends in an odd run of
/// backslashes. Returns the logical line and the index of its terminating
/// newline (or the end of input).
fn read_joined_line(s: &[char], line_start: usize) -> (Vec<char>, usize) {
    let mut line_end = line_start;
    while line_end < s.len() && s[line_end] != '\n' {
        line_end += 1;
    }
    let mut line: Vec<char> = s[line_start..line_end].to_vec();
    while line_end < s.len() {
        let trailing = line.iter().rev().take_while(|&&c| c == '\\').count();
        if trailing % 2 == 0 {
            break;
        }
        line.pop();
        line_end += 1;
        let next_start = line_end;
        while line_end < s.len() && s[line_end] != '\n' {
            line_end += 1;
        }
        line.extend_from_slice(&s[next_start..line_end]);
    }
    (line, line_end)
}

/// Outcome of matching one heredoc body line against its delimiter.
enum DelimiterMatch {
    /// Whole line is the delimiter; resume after it.
    Line(usize),
    /// Delimiter is a prefix of the line; resume right after the delimiter.
    Prefix(usize),
}

fn match_delimiter_line(
    line: &[char],
    line_start: usize,
    line_end: usize,
    total: usize,
    delimiter: &[char],
    strip_tabs: bool,
) -> Option<DelimiterMatch> {
    let tabs = if strip_tabs {
        line.iter().take_while(|&&c| c == '\t').count()
    } else {
        0
    };
    let stripped = &line[tabs..];
    if stripped == delimiter {
        let next = if line_end < total { line_end + 1 } else { line_end };
        return Some(DelimiterMatch::Line(next));
    }
    if stripped.len() > delimiter.len() && stripped.starts_with(delimiter) {
        return Some(DelimiterMatch::Prefix(line_start + tabs + delimiter.len()));
    }
    None
}

/// Skip a `<<DELIM` redirect and its body inside `$(...)` text.
pub fn skip_heredoc(s: &[char], start: usize) -> usize {
    let n = s.len();
    let strip_tabs = start + 2 < n && s[start + 2] == '-';
    let mut i = start + 2;
    if strip_tabs {
        i += 1;
    }
    while i < n && is_whitespace_no_newline(s[i]) {
        i += 1;
    }
    let delimiter: Vec<char>;
    if i < n && (s[i] == '"' || s[i] == '\'') {
        let q = s[i];
        i += 1;
        let ds = i;
        while i < n && s[i] != q {
            i += 1;
        }
        delimiter = s[ds..i].to_vec();
        if i < n {
            i += 1;
        }
    } else if i < n && s[i] == '\\' {
        i += 1;
        let ds = i;
        if i < n {
            i += 1;
        }
        while i < n && !is_metachar(s[i]) {
            i += 1;
        }
        delimiter = s[ds..i].to_vec();
    } else {
        let ds = i;
        while i < n && !is_metachar(s[i]) {
            i += 1;
        }
        delimiter = s[ds..i].to_vec();
    }
    let mut paren_depth = 0;
    let mut quote = QuoteState::new();
    let mut in_backtick = false;
    while i < n && s[i] != '\n' {
        let c = s[i];
        if c == '\\' && i + 1 < n && (quote.double || in_backtick) {
            i += 2;
            continue;
        }
        if c == '\'' && !quote.double && !in_backtick {
            quote.single = !quote.single;
            i += 1;
            continue;
        }
        if c == '"' && !quote.single && !in_backtick {
            quote.double = !quote.double;
            i += 1;
            continue;
        }
        if c == '`' && !quote.single {
            in_backtick = !in_backtick;
            i += 1;
            continue;
        }
        if quote.in_quotes() || in_backtick {
            i += 1;
            continue;
        }
        if c == '(' {
            paren_depth += 1;
        } else if c == ')' {
            if paren_depth == 0 {
                break;
            }
            paren_depth -= 1;
        }
        i += 1;
    }
    if i < n && s[i] == ')' {
        return i;
    }
    if i < n && s[i] == '\n' {
        i += 1;
    }
    while i < n {
        let line_start = i;
        let (line, line_end) = read_joined_line(s, line_start);
        match match_delimiter_line(&line, line_start, line_end, n, &delimiter, strip_tabs) {
            Some(DelimiterMatch::Line(next)) | Some(DelimiterMatch::Prefix(next)) => {
                return next
            }
            None => {}
        }
        i = if line_end < n { line_end + 1 } else { line_end };
    }
    i
}

/// Locate the bodies of heredocs declared on the line containing `start`.
/// Returns `(content_start, end)` where `content_start` is the newline that
/// ends the declaring line.
pub fn find_heredoc_content_end(
    source: &[char],
    start: usize,
    delimiters: &[(String, bool)],
) -> (usize, usize) {
    if delimiters.is_empty() {
        return (start, start);
    }
    let n = source.len();
    let mut pos = start;
    while pos < n && source[pos] != '\n' {
        pos += 1;
    }
    if pos >= n {
        return (start, start);
    }
    let content_start = pos;
    pos += 1;
    for (delimiter, strip_tabs) in delimiters {
        let delim = to_chars(delimiter);
        while pos < n {
            let line_start = pos;
            let (line, line_end) = read_joined_line(source, line_start);
            if let Some(m) = match_delimiter_line(&line, line_start, line_end, n, &delim, *strip_tabs) {
                pos = match m {
                    DelimiterMatch::Line(next) | DelimiterMatch::Prefix(next) => next,
                };
                break;
            }
            pos = if line_end < n { line_end + 1 } else { line_end };
        }
    }
    (content_start, pos)
}

/// Skip a balanced `open`/`close` pair; `None` if it never closes.
pub fn skip_matched_pair(s: &[char], start: usize, open: char, close: char, flags: u32) -> Option<usize> {
    let n = s.len();
    let literal = flags & SMP_LITERAL != 0;
    let mut i = if flags & SMP_PAST_OPEN != 0 {
        start
    } else {
        if start >= n || s[start] != open {
            return None;
        }
        start + 1
    };
    let mut depth = 1;
    let mut pass_next = false;
    let mut backq = false;
    while i < n && depth > 0 {
        let c = s[i];
        if pass_next {
            pass_next = false;
            i += 1;
            continue;
        }
        if !literal && c == '\\' {
            pass_next = true;
            i += 1;
            continue;
        }
        if backq {
            if c == '`' {
                backq = false;
            }
            i += 1;
            continue;
        }
        if !literal {
            if c == '`' {
                backq = true;
                i += 1;
                continue;
            }
            if c == '\'' {
                i = skip_single_quoted(s, i + 1);
                continue;
            }
            if c == '"' {
                i = skip_double_quoted(s, i + 1);
                continue;
            }
            if is_expansion_start(s, i, "$(") {
                i = find_cmdsub_end(s, i + 2);
                continue;
            }
            if is_expansion_start(s, i, "${") {
                i = find_braced_param_end(s, i + 2);
                continue;
            }
        }
        if !literal && c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
        }
        i += 1;
    }
    if depth == 0 {
        Some(i)
    } else {
        None
    }
}

pub fn skip_subscript(s: &[char], start: usize, flags: u32) -> Option<usize> {
    skip_matched_pair(s, start, '[', ']', flags)
}

/// Index of the `=` of a `name=`, `name+=` or `name[sub]=` prefix.
pub fn assignment(s: &[char], flags: u32) -> Option<usize> {
    if s.is_empty() || !is_name_start(s[0]) {
        return None;
    }
    let mut i = 1;
    while i < s.len() {
        let c = s[i];
        if c == '=' {
            return Some(i);
        }
        if c == '[' {
            let sub_flags = if flags & 2 != 0 { SMP_LITERAL } else { 0 };
            let end = skip_subscript(s, i, sub_flags)?;
            i = end;
            if i < s.len() && s[i] == '+' {
                i += 1;
            }
            if i < s.len() && s[i] == '=' {
                return Some(i);
            }
            return None;
        }
        if c == '+' {
            if i + 1 < s.len() && s[i + 1] == '=' {
                return Some(i + 1);
            }
            return None;
        }
        if !is_name_char(c) {
            return None;
        }
        i += 1;
    }
    None
}

pub fn looks_like_assignment(s: &str) -> bool {
    assignment(&to_chars(s), 0).is_some()
}

/// `name` or `name[sub]...` with nothing else.
pub fn is_array_assignment_prefix(s: &[char]) -> bool {
    if s.is_empty() || !is_name_start(s[0]) {
        return false;
    }
    let mut i = 1;
    while i < s.len() && is_name_char(s[i]) {
        i += 1;
    }
    while i < s.len() {
        if s[i] != '[' {
            return false;
        }
        match skip_subscript(s, i, SMP_LITERAL) {
            Some(end) => i = end,
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> Vec<char> {
        to_chars(s)
    }

    #[test]
    fn test_expansion_start_respects_dollar_runs() {
        let s = c("$$(x)");
        assert!(!is_expansion_start(&s, 1, "$("));
        let s = c("a$(x)");
        assert!(is_expansion_start(&s, 1, "$("));
        assert!(is_dollar_dollar_paren(&c("$$("), 1));
    }

    #[test]
    fn test_find_cmdsub_end_nested() {
        let s = c("echo $(date) )rest");
        assert_eq!(find_cmdsub_end(&s, 0), 14);
        let s = c("case x in a) echo;; esac)");
        assert_eq!(find_cmdsub_end(&s, 0), s.len());
    }

    #[test]
    fn test_find_braced_param_end() {
        let s = c("x:-${y}}tail");
        assert_eq!(find_braced_param_end(&s, 0), 8);
    }

    #[test]
    fn test_skip_heredoc_body() {
        let s = c("<<EOF\nline\nEOF\nafter");
        assert_eq!(skip_heredoc(&s, 0), 15);
    }

    #[test]
    fn test_heredoc_content_end() {
        let s = c("cat <<A\nx\nA\nrest");
        let (cs, end) = find_heredoc_content_end(&s, 4, &[("A".to_string(), false)]);
        assert_eq!(cs, 7);
        assert_eq!(end, 12);
    }

    #[test]
    fn test_assignment_forms() {
        assert_eq!(assignment(&c("a=1"), 0), Some(1));
        assert_eq!(assignment(&c("arr[1]=x"), 0), Some(6));
        assert_eq!(assignment(&c("a+=1"), 0), Some(2));
        assert_eq!(assignment(&c("1a=1"), 0), None);
        assert!(looks_like_assignment("FOO=bar"));
        assert!(is_array_assignment_prefix(&c("arr[0]")));
        assert!(!is_array_assignment_prefix(&c("arr-x")));
    }

    #[test]
    fn test_normalize_heredoc_delimiter() {
        assert_eq!(normalize_heredoc_delimiter("$(  a   b )"), "$(a b)");
        assert_eq!(normalize_heredoc_delimiter("EOF"), "EOF");
    }

    #[test]
    fn test_strip_line_continuations_keeps_comment_newline() {
        let s = c("a \\\nb # c\\\nd");
        assert_eq!(strip_line_continuations_comment_aware(&s), "a b # c\nd");
    }

    #[test]
    fn test_word_boundary() {
        let s = c("xcase case");
        assert!(!is_word_boundary(&s, 1, 4));
        assert!(is_word_boundary(&s, 6, 4));
    }

    #[test]
    fn test_bracket_class() {
        let s = c("[abc]x");
        assert_eq!(consume_bracket_class(&s, 0, 0), (5, "[abc]".to_string()));
        let s = c("[ab|c");
        assert_eq!(consume_bracket_class(&s, 0, 0), (1, "[".to_string()));
    }
}
