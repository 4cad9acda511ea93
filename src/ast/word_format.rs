//! Word Text Normalization
//!
//! Rewrites applied to the raw text of a word before it is rendered:
//!   - `$'...'` decoded and re-emitted as a plain single-quoted string
//!   - `$"..."` locale markers reduced to ordinary double quotes
//!   - whitespace inside `name=( ... )` array literals collapsed
//!   - `${` followed by a newline padded with spaces
//!   - line continuations inside `$(( ... ))` removed
//!   - CTLESC (`\x01`) bytes doubled
//!   - alternatives of `<( a|b )` style groups spaced as `a | b`
//!
//! All scanning is done over character indices.

use crate::parser::scan::{
    count_consecutive_dollars_before, is_backslash_escaped, is_expansion_start, starts_with_at,
    substring, to_chars,
};
use crate::parser::types::{QuoteState, ANSI_C_ESCAPES};

const CTLESC: char = '\x01';

/// Parameter operators that take a pattern operand
const PATTERN_OPS: [&str; 10] = ["//", "%%", "##", "/", "%", "#", "^", "^^", ",", ",,"];

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n')
}

// =============================================================================
// ANSI-C QUOTES
// =============================================================================

/// Digits in `radix`; anything unparsable (including overflow) is zero
fn parse_radix(digits: &[char], radix: u32) -> i64 {
    let text: String = digits.iter().collect();
    i64::from_str_radix(&text, radix).unwrap_or(0)
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

fn push_codepoint(out: &mut Vec<u8>, cp: i64) {
    let c = u32::try_from(cp)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or('\u{FFFD}');
    push_char(out, c);
}

/// Decode the escapes of a `$'...'` body. A NUL produced by any escape ends
/// the string there.
fn ansi_c_to_bytes(inner: &[char]) -> Vec<u8> {
    let n = inner.len();
    let mut out = Vec::new();
    let mut i = 0;
    while i < n {
        if inner[i] != '\\' || i + 1 >= n {
            push_char(&mut out, inner[i]);
            i += 1;
            continue;
        }
        let c = inner[i + 1];
        if let Some(&byte) = ANSI_C_ESCAPES.get(&c) {
            out.push(byte);
            i += 2;
            continue;
        }
        match c {
            '\'' => {
                out.push(b'\'');
                i += 2;
            }
            'x' if inner.get(i + 2) == Some(&'{') => {
                let mut j = i + 3;
                while j < n && inner[j].is_ascii_hexdigit() {
                    j += 1;
                }
                let hex = &inner[i + 3..j];
                if j < n && inner[j] == '}' {
                    j += 1;
                }
                if hex.is_empty() {
                    return out;
                }
                let byte = parse_radix(hex, 16) & 0xFF;
                if byte == 0 {
                    return out;
                }
                out.push(byte as u8);
                i = j;
            }
            'x' => {
                let mut j = i + 2;
                while j < n && j < i + 4 && inner[j].is_ascii_hexdigit() {
                    j += 1;
                }
                if j == i + 2 {
                    out.push(b'\\');
                    i += 1;
                    continue;
                }
                let byte = parse_radix(&inner[i + 2..j], 16);
                if byte == 0 {
                    return out;
                }
                out.push(byte as u8);
                i = j;
            }
            'u' | 'U' => {
                let width = if c == 'u' { 4 } else { 8 };
                let mut j = i + 2;
                while j < n && j < i + 2 + width && inner[j].is_ascii_hexdigit() {
                    j += 1;
                }
                if j == i + 2 {
                    out.push(b'\\');
                    i += 1;
                    continue;
                }
                let cp = parse_radix(&inner[i + 2..j], 16);
                if cp == 0 {
                    return out;
                }
                push_codepoint(&mut out, cp);
                i = j;
            }
            'c' => {
                if i + 3 > n {
                    out.push(b'\\');
                    i += 1;
                    continue;
                }
                let ctrl = inner[i + 2];
                let skip_extra = usize::from(ctrl == '\\' && i + 4 <= n && inner[i + 3] == '\\');
                let mut buf = [0u8; 4];
                let value = ctrl.encode_utf8(&mut buf).as_bytes()[0] & 0x1F;
                if value == 0 {
                    return out;
                }
                out.push(value);
                i += 3 + skip_extra;
            }
            '0' => {
                let mut j = i + 2;
                while j < n && j < i + 4 && inner[j].is_digit(8) {
                    j += 1;
                }
                if j == i + 2 {
                    return out;
                }
                let byte = parse_radix(&inner[i + 1..j], 8) & 0xFF;
                if byte == 0 {
                    return out;
                }
                out.push(byte as u8);
                i = j;
            }
            '1'..='7' => {
                let mut j = i + 1;
                while j < n && j < i + 4 && inner[j].is_digit(8) {
                    j += 1;
                }
                let byte = parse_radix(&inner[i + 1..j], 8) & 0xFF;
                if byte == 0 {
                    return out;
                }
                out.push(byte as u8);
                i = j;
            }
            other => {
                out.push(b'\\');
                push_char(&mut out, other);
                i += 2;
            }
        }
    }
    out
}

/// Quote `s` so a shell reads it back verbatim
fn sh_single_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s == "'" {
        return "\\'".to_string();
    }
    let mut out = String::from("'");
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// `'body'` (the `$` already dropped) decoded and re-quoted
fn expand_ansi_c_escapes(quoted: &[char]) -> String {
    if quoted.first() != Some(&'\'') || quoted.last() != Some(&'\'') {
        return quoted.iter().collect();
    }
    let inner = if quoted.len() >= 2 {
        &quoted[1..quoted.len() - 1]
    } else {
        &[][..]
    };
    let bytes = ansi_c_to_bytes(inner);
    sh_single_quote(&String::from_utf8_lossy(&bytes))
}

/// Whether the innermost open `${` in `text` has reached a pattern operand,
/// e.g. `${var//` or `${var#`
fn in_param_pattern(text: &str) -> bool {
    let Some(idx) = text.rfind("${") else {
        return false;
    };
    let after: Vec<char> = text[idx + 2..].chars().collect();
    let mut name_len = 0;
    if let Some(&first) = after.first() {
        if "@*#?-$!0123456789_".contains(first) {
            name_len = 1;
        } else if first.is_alphabetic() {
            while name_len < after.len() && is_name_char(after[name_len]) {
                name_len += 1;
            }
        }
    }
    if name_len > 0 && name_len < after.len() && !"#?-".contains(after[0]) {
        let mut op_start = &after[name_len..];
        if op_start.first() == Some(&'@') && op_start.len() > 1 {
            op_start = &op_start[1..];
        }
        let op_text: String = op_start.iter().collect();
        if PATTERN_OPS.iter().any(|op| op_text.starts_with(op)) {
            return true;
        }
        if let Some(&c) = op_start.first() {
            if !"%#/^,~:+-=?".contains(c) {
                return PATTERN_OPS.iter().any(|op| op_text.contains(op));
            }
        }
        false
    } else if name_len == 0 && after.len() > 1 && !"%#/^,".contains(after[0]) {
        let rest: String = after[1..].iter().collect();
        PATTERN_OPS.iter().any(|op| rest.contains(op))
    } else {
        false
    }
}

/// Replace every `$'...'` outside single quotes and backticks with its
/// decoded single-quoted form. Inside a double-quoted `${...}` that is not
/// in a pattern position the quotes are dropped as well.
pub(crate) fn expand_all_ansi_c_quotes(value: &str) -> String {
    let s = to_chars(value);
    let n = s.len();
    let mut result = String::with_capacity(value.len());
    let mut quote = QuoteState::new();
    let mut in_backtick = false;
    let mut brace_depth = 0usize;
    let mut i = 0;
    while i < n {
        let ch = s[i];
        if ch == '`' && !quote.single {
            in_backtick = !in_backtick;
            result.push(ch);
            i += 1;
            continue;
        }
        if in_backtick {
            result.push(ch);
            if ch == '\\' && i + 1 < n {
                result.push(s[i + 1]);
                i += 1;
            }
            i += 1;
            continue;
        }
        if !quote.single {
            if is_expansion_start(&s, i, "${") {
                brace_depth += 1;
                quote.push();
                result.push_str("${");
                i += 2;
                continue;
            } else if ch == '}' && brace_depth > 0 && !quote.double {
                brace_depth -= 1;
                result.push(ch);
                quote.pop();
                i += 1;
                continue;
            }
        }
        let in_dquote = quote.double;
        if ch == '\'' && !in_dquote {
            let is_ansi_c = !quote.single
                && i > 0
                && s[i - 1] == '$'
                && count_consecutive_dollars_before(&s, i - 1) % 2 == 0;
            if !is_ansi_c {
                quote.single = !quote.single;
            }
            result.push(ch);
            i += 1;
        } else if ch == '"' && !quote.single {
            quote.double = !quote.double;
            result.push(ch);
            i += 1;
        } else if ch == '\\' && i + 1 < n && !quote.single {
            result.push(ch);
            result.push(s[i + 1]);
            i += 2;
        } else if starts_with_at(&s, i, "$'")
            && !quote.single
            && !in_dquote
            && count_consecutive_dollars_before(&s, i) % 2 == 0
        {
            let mut j = i + 2;
            while j < n {
                if s[j] == '\\' && j + 1 < n {
                    j += 2;
                } else if s[j] == '\'' {
                    j += 1;
                    break;
                } else {
                    j += 1;
                }
            }
            let mut expanded = expand_ansi_c_escapes(&s[i + 1..j.min(n)]);
            if brace_depth > 0
                && quote.outer_double()
                && expanded.len() >= 2
                && expanded.starts_with('\'')
                && expanded.ends_with('\'')
            {
                let inner = &expanded[1..expanded.len() - 1];
                if !inner.contains(CTLESC) && !in_param_pattern(&result) {
                    expanded = inner.to_string();
                }
            }
            result.push_str(&expanded);
            i = j;
        } else {
            result.push(ch);
            i += 1;
        }
    }
    result
}

// =============================================================================
// LOCALE STRINGS
// =============================================================================

/// Turn `$"..."` into `"..."`, tracking quotes separately at top level,
/// inside `${...}` and inside `[...]` subscripts.
pub(crate) fn strip_locale_string_dollars(value: &str) -> String {
    let s = to_chars(value);
    let n = s.len();
    let mut result = String::with_capacity(value.len());
    let mut quote = QuoteState::new();
    let mut brace_quote = QuoteState::new();
    let mut brace_depth = 0usize;
    let mut bracket_depth = 0usize;
    let mut bracket_in_dquote = false;
    let mut i = 0;
    while i < n {
        let ch = s[i];
        if ch == '\\' && i + 1 < n && !quote.single && !brace_quote.single {
            result.push(ch);
            result.push(s[i + 1]);
            i += 2;
        } else if starts_with_at(&s, i, "${")
            && !quote.single
            && !brace_quote.single
            && (i == 0 || s[i - 1] != '$')
        {
            brace_depth += 1;
            brace_quote.double = false;
            brace_quote.single = false;
            result.push_str("${");
            i += 2;
        } else if ch == '}' && brace_depth > 0 && !quote.single && !brace_quote.in_quotes() {
            brace_depth -= 1;
            result.push(ch);
            i += 1;
        } else if ch == '[' && brace_depth > 0 && !quote.single && !brace_quote.double {
            bracket_depth += 1;
            bracket_in_dquote = false;
            result.push(ch);
            i += 1;
        } else if ch == ']' && bracket_depth > 0 && !quote.single && !bracket_in_dquote {
            bracket_depth -= 1;
            result.push(ch);
            i += 1;
        } else if ch == '\'' && !quote.double && brace_depth == 0 {
            quote.single = !quote.single;
            result.push(ch);
            i += 1;
        } else if ch == '"' && !quote.single && brace_depth == 0 {
            quote.double = !quote.double;
            result.push(ch);
            i += 1;
        } else if ch == '"' && !quote.single && bracket_depth > 0 {
            bracket_in_dquote = !bracket_in_dquote;
            result.push(ch);
            i += 1;
        } else if ch == '"' && !quote.single && !brace_quote.single && brace_depth > 0 {
            brace_quote.double = !brace_quote.double;
            result.push(ch);
            i += 1;
        } else if ch == '\'' && !quote.double && !brace_quote.double && brace_depth > 0 {
            brace_quote.single = !brace_quote.single;
            result.push(ch);
            i += 1;
        } else if starts_with_at(&s, i, "$\"")
            && !quote.single
            && !brace_quote.single
            && (brace_depth > 0 || bracket_depth > 0 || !quote.double)
            && !brace_quote.double
            && !bracket_in_dquote
        {
            let dollars = 1 + count_consecutive_dollars_before(&s, i);
            if dollars % 2 == 1 {
                result.push('"');
                if bracket_depth > 0 {
                    bracket_in_dquote = true;
                } else if brace_depth > 0 {
                    brace_quote.double = true;
                } else {
                    quote.double = true;
                }
                i += 2;
            } else {
                result.push(ch);
                i += 1;
            }
        } else {
            result.push(ch);
            i += 1;
        }
    }
    result
}

// =============================================================================
// ARRAY LITERALS
// =============================================================================

/// `name=( a   b )` and `name[i]+=(...)` with the element list collapsed to
/// single spaces and comments dropped; anything else is returned unchanged.
pub(crate) fn normalize_array_whitespace(value: &str) -> String {
    let s = to_chars(value);
    let n = s.len();
    let mut i = 0;
    if !(i < n && (s[i].is_alphabetic() || s[i] == '_')) {
        return value.to_string();
    }
    i += 1;
    while i < n && is_name_char(s[i]) {
        i += 1;
    }
    while i < n && s[i] == '[' {
        let mut depth = 1;
        i += 1;
        while i < n && depth > 0 {
            if s[i] == '[' {
                depth += 1;
            } else if s[i] == ']' {
                depth -= 1;
            }
            i += 1;
        }
        if depth != 0 {
            return value.to_string();
        }
    }
    if i < n && s[i] == '+' {
        i += 1;
    }
    if !(i + 1 < n && s[i] == '=' && s[i + 1] == '(') {
        return value.to_string();
    }
    let open = i + 1;
    let close = if s[n - 1] == ')' {
        n - 1
    } else {
        match find_matching_paren(&s, open) {
            Some(close) => close,
            None => return value.to_string(),
        }
    };
    format!(
        "{}({}){}",
        substring(&s, 0, open),
        normalize_array_inner(&s[open + 1..close]),
        substring(&s, close + 1, n)
    )
}

/// Index of the `)` closing the `(` at `open`, honoring quotes and comments
fn find_matching_paren(s: &[char], open: usize) -> Option<usize> {
    if s.get(open) != Some(&'(') {
        return None;
    }
    let n = s.len();
    let mut quote = QuoteState::new();
    let mut depth = 1;
    let mut i = open + 1;
    while i < n && depth > 0 {
        let ch = s[i];
        if ch == '\\' && i + 1 < n && !quote.single {
            i += 2;
            continue;
        }
        if ch == '\'' && !quote.double {
            quote.single = !quote.single;
        } else if ch == '"' && !quote.single {
            quote.double = !quote.double;
        } else if !quote.in_quotes() {
            match ch {
                '#' => {
                    while i < n && s[i] != '\n' {
                        i += 1;
                    }
                    continue;
                }
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// End of a `(`-balanced run starting at `j` (just past the opener), skipping
/// quoted text. `dollar_only` counts only `$(` as a nested opener.
fn skip_paren_run(s: &[char], mut j: usize, dollar_only: bool) -> usize {
    let n = s.len();
    let mut depth = 1;
    while j < n && depth > 0 {
        match s[j] {
            '(' if !dollar_only || (j > 0 && s[j - 1] == '$') => depth += 1,
            ')' => depth -= 1,
            '\'' => {
                j += 1;
                while j < n && s[j] != '\'' {
                    j += 1;
                }
            }
            '"' => {
                j += 1;
                while j < n {
                    if s[j] == '\\' && j + 1 < n {
                        j += 2;
                        continue;
                    }
                    if s[j] == '"' {
                        break;
                    }
                    j += 1;
                }
            }
            _ => {}
        }
        j += 1;
    }
    j
}

fn normalize_array_inner(inner: &[char]) -> String {
    let n = inner.len();
    let mut out = String::new();
    let mut in_whitespace = true;
    let mut brace_depth = 0usize;
    let mut bracket_depth = 0usize;
    let mut i = 0;
    while i < n {
        let ch = inner[i];
        if is_blank(ch) {
            if !in_whitespace && !out.is_empty() && brace_depth == 0 && bracket_depth == 0 {
                out.push(' ');
                in_whitespace = true;
            }
            if brace_depth > 0 || bracket_depth > 0 {
                out.push(ch);
            }
            i += 1;
        } else if ch == '\'' {
            in_whitespace = false;
            let mut j = i + 1;
            while j < n && inner[j] != '\'' {
                j += 1;
            }
            out.push_str(&substring(inner, i, j + 1));
            i = j + 1;
        } else if ch == '"' {
            in_whitespace = false;
            let mut j = i + 1;
            let mut dq_brace_depth = 0usize;
            out.push('"');
            while j < n {
                if inner[j] == '\\' && j + 1 < n {
                    if inner[j + 1] != '\n' {
                        out.push(inner[j]);
                        out.push(inner[j + 1]);
                    }
                    j += 2;
                } else if is_expansion_start(inner, j, "${") {
                    out.push_str("${");
                    dq_brace_depth += 1;
                    j += 2;
                } else if inner[j] == '}' && dq_brace_depth > 0 {
                    out.push('}');
                    dq_brace_depth -= 1;
                    j += 1;
                } else if inner[j] == '"' && dq_brace_depth == 0 {
                    out.push('"');
                    j += 1;
                    break;
                } else {
                    out.push(inner[j]);
                    j += 1;
                }
            }
            i = j;
        } else if ch == '\\' && i + 1 < n {
            if inner[i + 1] != '\n' {
                in_whitespace = false;
                out.push(ch);
                out.push(inner[i + 1]);
            }
            i += 2;
        } else if is_expansion_start(inner, i, "$((") {
            in_whitespace = false;
            let mut j = i + 3;
            let mut depth = 1;
            while j < n && depth > 0 {
                if starts_with_at(inner, j, "((") {
                    depth += 1;
                    j += 2;
                } else if starts_with_at(inner, j, "))") {
                    depth -= 1;
                    j += 2;
                } else {
                    j += 1;
                }
            }
            out.push_str(&substring(inner, i, j));
            i = j;
        } else if is_expansion_start(inner, i, "$(") {
            in_whitespace = false;
            let j = skip_paren_run(inner, i + 2, true);
            out.push_str(&substring(inner, i, j));
            i = j;
        } else if (ch == '<' || ch == '>') && inner.get(i + 1) == Some(&'(') {
            in_whitespace = false;
            let j = skip_paren_run(inner, i + 2, false);
            out.push_str(&substring(inner, i, j));
            i = j;
        } else if is_expansion_start(inner, i, "${") {
            in_whitespace = false;
            out.push_str("${");
            brace_depth += 1;
            i += 2;
        } else if ch == '{' && brace_depth > 0 {
            out.push(ch);
            brace_depth += 1;
            i += 1;
        } else if ch == '}' && brace_depth > 0 {
            out.push(ch);
            brace_depth -= 1;
            i += 1;
        } else if ch == '#' && brace_depth == 0 && in_whitespace {
            while i < n && inner[i] != '\n' {
                i += 1;
            }
        } else if ch == '[' {
            if in_whitespace || bracket_depth > 0 {
                bracket_depth += 1;
            }
            in_whitespace = false;
            out.push(ch);
            i += 1;
        } else if ch == ']' && bracket_depth > 0 {
            out.push(ch);
            bracket_depth -= 1;
            i += 1;
        } else {
            in_whitespace = false;
            out.push(ch);
            i += 1;
        }
    }
    out.trim_end_matches([' ', '\t', '\n', '\r', '\x0b', '\x0c'])
        .to_string()
}

// =============================================================================
// PARAMETER EXPANSIONS
// =============================================================================

/// `${\nname}` renders as `${ name }`; escaped newlines inside the braces
/// are dropped.
pub(crate) fn normalize_param_expansion_newlines(value: &str) -> String {
    let s = to_chars(value);
    let n = s.len();
    let mut result = String::with_capacity(value.len());
    let mut quote = QuoteState::new();
    let mut i = 0;
    while i < n {
        let c = s[i];
        if c == '\'' && !quote.double {
            quote.single = !quote.single;
            result.push(c);
            i += 1;
        } else if c == '"' && !quote.single {
            quote.double = !quote.double;
            result.push(c);
            i += 1;
        } else if is_expansion_start(&s, i, "${") && !quote.single {
            result.push_str("${");
            i += 2;
            let leading_newline = s.get(i) == Some(&'\n');
            if leading_newline {
                result.push(' ');
                i += 1;
            }
            let mut depth = 1;
            while i < n && depth > 0 {
                let ch = s[i];
                if ch == '\\' && i + 1 < n && !quote.single {
                    if s[i + 1] != '\n' {
                        result.push(ch);
                        result.push(s[i + 1]);
                    }
                    i += 2;
                    continue;
                }
                if ch == '\'' && !quote.double {
                    quote.single = !quote.single;
                } else if ch == '"' && !quote.single {
                    quote.double = !quote.double;
                } else if !quote.in_quotes() {
                    if ch == '{' {
                        depth += 1;
                    } else if ch == '}' {
                        depth -= 1;
                        if depth == 0 {
                            if leading_newline {
                                result.push(' ');
                            }
                            result.push(ch);
                            i += 1;
                            break;
                        }
                    }
                }
                result.push(ch);
                i += 1;
            }
        } else {
            result.push(c);
            i += 1;
        }
    }
    result
}

// =============================================================================
// ARITHMETIC
// =============================================================================

/// Remove `\`-newline pairs inside `$(( ... ))`. A pair preceded by an odd
/// run of backslashes is kept. An unbalanced `$((` is left as written.
pub(crate) fn strip_arith_line_continuations(value: &str) -> String {
    let s = to_chars(value);
    let n = s.len();
    let mut result = String::with_capacity(value.len());
    let mut i = 0;
    while i < n {
        if !is_expansion_start(&s, i, "$((") {
            result.push(s[i]);
            i += 1;
            continue;
        }
        let start = i;
        i += 3;
        let mut depth = 2;
        let mut content: Vec<char> = Vec::new();
        let mut first_close: Option<usize> = None;
        while i < n && depth > 0 {
            if s[i] == '(' {
                content.push('(');
                depth += 1;
                i += 1;
                if depth > 1 {
                    first_close = None;
                }
            } else if s[i] == ')' {
                if depth == 2 {
                    first_close = Some(content.len());
                }
                depth -= 1;
                if depth > 0 {
                    content.push(')');
                }
                i += 1;
            } else if s[i] == '\\' && s.get(i + 1) == Some(&'\n') {
                let backslashes = content
                    .iter()
                    .rev()
                    .skip_while(|&&c| c == '\n')
                    .take_while(|&&c| c == '\\')
                    .count();
                if backslashes % 2 == 1 {
                    content.push('\\');
                    content.push('\n');
                }
                i += 2;
                if depth == 1 {
                    first_close = None;
                }
            } else {
                content.push(s[i]);
                i += 1;
                if depth == 1 {
                    first_close = None;
                }
            }
        }
        if depth == 0 || (depth == 1 && first_close.is_some()) {
            match first_close {
                Some(idx) => {
                    let closing = if depth == 0 { "))" } else { ")" };
                    result.push_str("$((");
                    result.push_str(&substring(&content, 0, idx));
                    result.push_str(closing);
                }
                None => {
                    result.push_str("$((");
                    result.extend(content.iter());
                    result.push(')');
                }
            }
        } else {
            result.push_str(&substring(&s, start, i));
        }
    }
    result
}

// =============================================================================
// CTLESC
// =============================================================================

/// Double every `\x01`, except inside double quotes where one already
/// preceded by an odd run of backslashes is left single.
pub(crate) fn double_ctlesc_smart(value: &str) -> String {
    let mut result: Vec<char> = Vec::with_capacity(value.len());
    let mut quote = QuoteState::new();
    for c in value.chars() {
        if c == '\'' && !quote.double {
            quote.single = !quote.single;
        } else if c == '"' && !quote.single {
            quote.double = !quote.double;
        }
        result.push(c);
        if c == CTLESC {
            let escaped = quote.double
                && result.iter().rev().skip(1).take_while(|&&b| b == '\\').count() % 2 == 1;
            if !escaped {
                result.push(CTLESC);
            }
        }
    }
    result.into_iter().collect()
}

// =============================================================================
// PROCESS-SUBSTITUTION PATTERNS
// =============================================================================

/// Inside `${...}` operands, `<(a|b)` groups are written with ` | ` between
/// alternatives; alternatives containing `<<` keep their spacing.
pub(crate) fn normalize_extglob_whitespace(value: &str) -> String {
    let s = to_chars(value);
    let n = s.len();
    let mut result = String::with_capacity(value.len());
    let mut in_dquote = false;
    let mut deprecated_arith_depth = 0usize;
    let mut i = 0;
    while i < n {
        if s[i] == '"' {
            in_dquote = !in_dquote;
            result.push('"');
            i += 1;
            continue;
        }
        if starts_with_at(&s, i, "$[") && !is_backslash_escaped(&s, i) {
            deprecated_arith_depth += 1;
            result.push(s[i]);
            i += 1;
            continue;
        }
        if s[i] == ']' && deprecated_arith_depth > 0 {
            deprecated_arith_depth -= 1;
            result.push(s[i]);
            i += 1;
            continue;
        }
        let prefix = s[i];
        if s.get(i + 1) == Some(&'(')
            && (prefix == '<' || prefix == '>')
            && !in_dquote
            && deprecated_arith_depth == 0
        {
            result.push(prefix);
            result.push('(');
            i += 2;
            let mut depth = 1;
            let mut alternatives: Vec<String> = Vec::new();
            let mut current = String::new();
            let mut has_pipe = false;
            while i < n && depth > 0 {
                if s[i] == '\\' && i + 1 < n {
                    current.push(s[i]);
                    current.push(s[i + 1]);
                    i += 2;
                } else if s[i] == '(' {
                    depth += 1;
                    current.push('(');
                    i += 1;
                } else if s[i] == ')' {
                    depth -= 1;
                    if depth == 0 {
                        if current.contains("<<") || !has_pipe {
                            alternatives.push(current.clone());
                        } else {
                            alternatives.push(current.trim().to_string());
                        }
                        break;
                    }
                    current.push(')');
                    i += 1;
                } else if s[i] == '|' && depth == 1 {
                    if s.get(i + 1) == Some(&'|') {
                        current.push_str("||");
                        i += 2;
                    } else {
                        has_pipe = true;
                        if current.contains("<<") {
                            alternatives.push(std::mem::take(&mut current));
                        } else {
                            alternatives.push(current.trim().to_string());
                            current.clear();
                        }
                        i += 1;
                    }
                } else {
                    current.push(s[i]);
                    i += 1;
                }
            }
            result.push_str(&alternatives.join(" | "));
            if depth == 0 {
                result.push(')');
                i += 1;
            }
            continue;
        }
        result.push(s[i]);
        i += 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ansi_c_simple_escapes() {
        assert_eq!(expand_all_ansi_c_quotes("$'a\\tb'"), "'a\tb'");
        assert_eq!(expand_all_ansi_c_quotes("$'it\\'s'"), "'it'\\''s'");
        assert_eq!(expand_all_ansi_c_quotes("$'\\x41\\101\\u00e9'"), "'AAé'");
    }

    #[test]
    fn test_ansi_c_nul_truncates() {
        assert_eq!(expand_all_ansi_c_quotes("$'ab\\0cd'"), "'ab'");
        assert_eq!(expand_all_ansi_c_quotes("$'\\x00'"), "''");
    }

    #[test]
    fn test_ansi_c_untouched_in_quotes() {
        assert_eq!(expand_all_ansi_c_quotes("\"$'x'\""), "\"$'x'\"");
        assert_eq!(expand_all_ansi_c_quotes("'$'\\n"), "'$'\\n");
        assert_eq!(expand_all_ansi_c_quotes("$$'x'"), "$$'x'");
    }

    #[test]
    fn test_ansi_c_inside_quoted_brace_drops_quotes() {
        assert_eq!(expand_all_ansi_c_quotes("\"${x:-$'a'}\""), "\"${x:-a}\"");
        assert_eq!(expand_all_ansi_c_quotes("\"${x//$'a'/b}\""), "\"${x//'a'/b}\"");
    }

    #[test]
    fn test_ansi_c_control_escape() {
        assert_eq!(expand_all_ansi_c_quotes("$'\\cA'"), "'\x01'");
    }

    #[test]
    fn test_locale_dollars_stripped() {
        assert_eq!(strip_locale_string_dollars("$\"hello\""), "\"hello\"");
        assert_eq!(strip_locale_string_dollars("'$\"x\"'"), "'$\"x\"'");
        assert_eq!(strip_locale_string_dollars("$$\"x\""), "$$\"x\"");
        assert_eq!(strip_locale_string_dollars("${a:-$\"b\"}"), "${a:-\"b\"}");
    }

    #[test]
    fn test_array_whitespace() {
        assert_eq!(normalize_array_whitespace("a=(  1   2\n 3 )"), "a=(1 2 3)");
        assert_eq!(normalize_array_whitespace("a+=(x # note\n y)"), "a+=(x y)");
        assert_eq!(normalize_array_whitespace("arr[0]=( \"a  b\" )"), "arr[0]=(\"a  b\")");
        assert_eq!(normalize_array_whitespace("echo"), "echo");
        assert_eq!(normalize_array_whitespace("1=(x)"), "1=(x)");
    }

    #[test]
    fn test_param_newlines() {
        assert_eq!(normalize_param_expansion_newlines("${\nx}"), "${ x }");
        assert_eq!(normalize_param_expansion_newlines("${x\\\n}"), "${x}");
        assert_eq!(normalize_param_expansion_newlines("'${\nx}'"), "'${\nx}'");
    }

    #[test]
    fn test_arith_line_continuations() {
        assert_eq!(strip_arith_line_continuations("$((1 +\\\n2))"), "$((1 +2))");
        assert_eq!(strip_arith_line_continuations("$(( (1) ))"), "$(( (1) ))");
        assert_eq!(strip_arith_line_continuations("$((1"), "$((1");
    }

    #[test]
    fn test_ctlesc_doubling() {
        assert_eq!(double_ctlesc_smart("a\x01b"), "a\x01\x01b");
        assert_eq!(double_ctlesc_smart("\"\\\x01\""), "\"\\\x01\"");
        assert_eq!(double_ctlesc_smart("'\\\x01'"), "'\\\x01\x01'");
    }

    #[test]
    fn test_procsub_alternatives_spaced() {
        assert_eq!(normalize_extglob_whitespace("x<( a|b )"), "x<(a | b)");
        assert_eq!(normalize_extglob_whitespace("<( a )"), "<( a )");
        assert_eq!(normalize_extglob_whitespace("\"<(a|b)\""), "\"<(a|b)\"");
    }
}
