//! Utility functions for the Tokc compiler

use std::path::Path;

/// Convert a camelCase / snake_case / space-separated key to kebab-case.
pub fn to_kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;

    for ch in name.chars() {
        if ch == '_' || ch == ' ' || ch == '.' {
            if !out.ends_with('-') {
                out.push('-');
            }
            prev_lower = false;
        } else if ch.is_ascii_uppercase() {
            if prev_lower && !out.ends_with('-') {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            out.push(ch);
        }
    }

    out.trim_matches('-').to_string()
}

/// Render a float without a trailing `.0` and without exponent notation
/// for the magnitudes token values actually use.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        // Round to keep emitted values stable across platforms
        let rounded = (value * 1e6).round() / 1e6;
        let mut s = format!("{}", rounded);
        if s.contains('.') {
            while s.ends_with('0') {
                s.pop();
            }
            if s.ends_with('.') {
                s.pop();
            }
        }
        s
    }
}

/// Split a comma-separated argument list, respecting nested parentheses
/// and double quotes. Used for functional color expressions.
pub fn split_args(args: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;

    for ch in args.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '(' | '{' if !in_quotes => {
                depth += 1;
                current.push(ch);
            }
            ')' | '}' if !in_quotes => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 && !in_quotes => {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }

    parts
}

/// Whether a fully substituted string should be handed to the arithmetic
/// evaluator. The charset check alone is not enough: hyphenated literals
/// like dates ("2025-06-01") must stay strings, so a bare `-` only counts
/// as an operator when surrounded by whitespace.
pub fn looks_like_arithmetic(expr: &str) -> bool {
    let trimmed = expr.trim();
    if trimmed.is_empty() || trimmed.parse::<f64>().is_ok() {
        return false;
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || "+-*/(). \t".contains(c))
    {
        return false;
    }
    trimmed.contains('*')
        || trimmed.contains('/')
        || trimmed.contains('(')
        || trimmed.contains(" + ")
        || trimmed.contains(" - ")
}

/// Evaluate an arithmetic expression over already-substituted numbers.
pub fn evaluate_arithmetic(expr: &str) -> Option<f64> {
    if !looks_like_arithmetic(expr) {
        return None;
    }
    match meval::eval_str(expr) {
        Ok(value) if value.is_finite() => Some(value),
        Ok(_) => None,
        Err(e) => {
            log::debug!("Arithmetic evaluation failed for '{}': {}", expr, e);
            None
        }
    }
}

/// Source files and directories starting with `.` or `_` are skipped.
pub fn is_hidden_or_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') || n.starts_with('_'))
        .unwrap_or(false)
}

/// Base name of a source file without its extension.
pub fn file_stem_of(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Quote a map value when it contains characters SCSS would reinterpret.
pub fn quote_if_needed(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c == ' ' || c == ',' || c == ':' || c == '(' || c == ')' || c == '{');
    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}
