//! Defensive SQL surface: identifier quoting, clause length caps, and a
//! lexical sanitizer that flags disallowed function calls and dangerous
//! patterns without attempting to be a full SQL parser.
//!
//! The sanitizer does a left-to-right scan that tracks whether the cursor is
//! inside a single-quoted string, a double-quoted identifier, a line
//! comment, or a block comment, since function-call detection and
//! dangerous-pattern detection must both be blind to tokens inside those
//! regions.

use std::collections::HashSet;

use log::warn;

use crate::error::{Error, Result};

/// Default allow-list of SQL functions considered safe in column expressions,
/// WHERE/ORDER BY/GROUP BY clauses.
pub const DEFAULT_ALLOWED_FUNCTIONS: &[&str] = &[
    "COUNT", "SUM", "AVG", "MIN", "MAX", "LENGTH", "LOWER", "UPPER", "COALESCE",
    "DISTINCT", "CAST", "NULLIF", "IFNULL", "SUBSTR", "ABS", "ROUND", "DATE",
    "TIME", "DATETIME", "HEX", "TYPEOF", "TRIM", "LTRIM", "RTRIM",
    "GROUP_CONCAT", "TOTAL", "RANDOM", "UNICODE", "INSTR", "REPLACE", "PRINTF",
];

const STATEMENT_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "INSERT", "UPDATE", "ATTACH", "DETACH", "ALTER", "PRAGMA",
];

/// Handle-level and query-level knobs governing the safety layer.
#[derive(Debug, Clone)]
pub struct SqlSafetyConfig {
    pub strict_sql_validation: bool,
    pub max_clause_length: Option<usize>,
    pub handle_allowed_functions: HashSet<String>,
    pub forbidden_functions: HashSet<String>,
}

impl Default for SqlSafetyConfig {
    fn default() -> Self {
        SqlSafetyConfig {
            strict_sql_validation: true,
            max_clause_length: Some(1000),
            handle_allowed_functions: HashSet::new(),
            forbidden_functions: HashSet::new(),
        }
    }
}

/// Per-call overrides for the function allow/deny lists.
#[derive(Debug, Clone, Default)]
pub struct FunctionOverride<'a> {
    pub allowed: Option<&'a [String]>,
    pub override_allowed: bool,
    pub forbidden: Option<&'a [String]>,
}

/// Quotes a bare identifier for use in generated SQL, doubling any internal
/// double quotes. Rejects empty identifiers.
pub fn quote_identifier(identifier: &str) -> Result<String> {
    if identifier.is_empty() {
        return Err(Error::Validation("identifier cannot be empty".to_string()));
    }
    Ok(format!("\"{}\"", identifier.replace('"', "\"\"")))
}

fn is_bare_identifier(s: &str) -> bool {
    if s.is_empty() || s == "*" {
        return false;
    }
    let mut chars = s.chars();
    let first = chars.next().unwrap();
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Splits a `SELECT` column list on top-level commas (ignoring commas nested
/// inside function-call parentheses) and quotes every segment that is a bare
/// identifier, leaving `*`, qualified names, and expressions untouched.
///
/// This is what lets a reserved word like `group` pass as a column label
/// without SQLite choking on it, without mangling `COUNT(*) AS total` or
/// `t.id`.
pub fn quote_bare_columns(columns: &str) -> Result<String> {
    let chars: Vec<char> = columns.chars().collect();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(chars[start..i].iter().collect::<String>());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(chars[start..].iter().collect::<String>());

    let quoted: Vec<String> = parts
        .into_iter()
        .map(|part| {
            let trimmed = part.trim();
            if is_bare_identifier(trimmed) {
                quote_identifier(trimmed)
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect::<Result<Vec<String>>>()?;
    Ok(quoted.join(", "))
}

/// Validates a free-form SQL clause (WHERE / ORDER BY / GROUP BY / column
/// expression) against the length cap and the function allow/deny lists,
/// applying this precedence: forbidden (query) > allowed (query, possibly
/// overriding) > allowed (handle) > default allowed set.
///
/// On success, returns nothing. On failure: in strict mode, returns
/// `Err(Error::Validation(..))`; in non-strict mode, logs a warning via
/// `log::warn!` and returns `Ok(())` so the caller proceeds.
pub fn validate_clause(
    clause: &str,
    config: &SqlSafetyConfig,
    overrides: &FunctionOverride<'_>,
) -> Result<()> {
    check_length(clause, config.max_clause_length, config.strict_sql_validation)?;

    let calls = extract_function_calls(clause);
    for name in &calls {
        if !is_function_allowed(name, config, overrides) {
            let message = format!("SQL function '{name}' is not allowed");
            if config.strict_sql_validation {
                return Err(Error::Validation(message));
            }
            warn!("{message}");
        }
    }

    if let Some(pattern) = find_dangerous_pattern(clause) {
        let message = format!("Potentially dangerous SQL pattern detected: {pattern}");
        if config.strict_sql_validation {
            return Err(Error::Validation(message));
        }
        warn!("{message}");
    }

    Ok(())
}

fn check_length(clause: &str, max_len: Option<usize>, strict: bool) -> Result<()> {
    let Some(max_len) = max_len else {
        return Ok(());
    };
    if clause.len() > max_len {
        let message = format!(
            "clause exceeds maximum length of {max_len} characters (got {})",
            clause.len()
        );
        if strict {
            return Err(Error::Validation(message));
        }
        warn!("{message}");
    }
    Ok(())
}

fn is_function_allowed(
    name: &str,
    config: &SqlSafetyConfig,
    overrides: &FunctionOverride<'_>,
) -> bool {
    let upper = name.to_ascii_uppercase();

    if config.forbidden_functions.contains(&upper) {
        return false;
    }
    if let Some(forbidden) = overrides.forbidden {
        if forbidden.iter().any(|f| f.to_ascii_uppercase() == upper) {
            return false;
        }
    }

    if let Some(allowed) = overrides.allowed {
        let query_allows = allowed.iter().any(|f| f.to_ascii_uppercase() == upper);
        if overrides.override_allowed {
            return query_allows;
        }
        if query_allows {
            return true;
        }
    }

    if config.handle_allowed_functions.contains(&upper) {
        return true;
    }

    DEFAULT_ALLOWED_FUNCTIONS.contains(&upper.as_str())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    SingleQuote,
    DoubleQuote,
    LineComment,
    BlockComment,
}

/// Extracts candidate `IDENT(` function-call tokens from a clause, ignoring
/// anything lexically inside a string literal, a quoted identifier, or a
/// comment.
fn extract_function_calls(clause: &str) -> Vec<String> {
    let chars: Vec<char> = clause.chars().collect();
    let mut state = ScanState::Normal;
    let mut calls = Vec::new();
    let mut ident_start: Option<usize> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match state {
            ScanState::Normal => {
                if c == '\'' {
                    state = ScanState::SingleQuote;
                    ident_start = None;
                } else if c == '"' {
                    state = ScanState::DoubleQuote;
                    ident_start = None;
                } else if c == '-' && chars.get(i + 1) == Some(&'-') {
                    state = ScanState::LineComment;
                    ident_start = None;
                    i += 1;
                } else if c == '/' && chars.get(i + 1) == Some(&'*') {
                    state = ScanState::BlockComment;
                    ident_start = None;
                    i += 1;
                } else if c.is_alphabetic() || c == '_' {
                    if ident_start.is_none() {
                        ident_start = Some(i);
                    }
                } else if c.is_ascii_digit() && ident_start.is_some() {
                    // identifier continuation
                } else if c == '(' {
                    if let Some(start) = ident_start {
                        let name: String = chars[start..i].iter().collect();
                        if !name.is_empty() {
                            calls.push(name);
                        }
                    }
                    ident_start = None;
                } else {
                    ident_start = None;
                }
            }
            ScanState::SingleQuote => {
                if c == '\'' {
                    if chars.get(i + 1) == Some(&'\'') {
                        i += 1; // escaped '' inside string
                    } else {
                        state = ScanState::Normal;
                    }
                }
            }
            ScanState::DoubleQuote => {
                if c == '"' {
                    if chars.get(i + 1) == Some(&'"') {
                        i += 1; // escaped "" inside identifier
                    } else {
                        state = ScanState::Normal;
                    }
                }
            }
            ScanState::LineComment => {
                if c == '\n' {
                    state = ScanState::Normal;
                }
            }
            ScanState::BlockComment => {
                if c == '*' && chars.get(i + 1) == Some(&'/') {
                    state = ScanState::Normal;
                    i += 1;
                }
            }
        }
        i += 1;
    }

    calls
}

/// Looks for statement-terminator-followed-by-another-verb patterns and bare
/// `ATTACH`/`PRAGMA` occurrences outside of strings/comments.
fn find_dangerous_pattern(clause: &str) -> Option<String> {
    let chars: Vec<char> = clause.chars().collect();
    let mut state = ScanState::Normal;
    let mut i = 0;
    let mut saw_terminator = false;

    while i < chars.len() {
        let c = chars[i];
        match state {
            ScanState::Normal => {
                if c == '\'' {
                    state = ScanState::SingleQuote;
                } else if c == '"' {
                    state = ScanState::DoubleQuote;
                } else if c == '-' && chars.get(i + 1) == Some(&'-') {
                    state = ScanState::LineComment;
                    i += 1;
                } else if c == '/' && chars.get(i + 1) == Some(&'*') {
                    state = ScanState::BlockComment;
                    i += 1;
                } else if c == ';' {
                    saw_terminator = true;
                } else if saw_terminator && (c.is_alphabetic() || c == '_') {
                    let start = i;
                    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                        i += 1;
                    }
                    let word: String = chars[start..i].iter().collect::<String>().to_ascii_uppercase();
                    if STATEMENT_KEYWORDS.contains(&word.as_str()) {
                        return Some(format!("multiple statements ('; {word}')"));
                    }
                    saw_terminator = false;
                    continue;
                } else if !c.is_whitespace() {
                    saw_terminator = false;
                }
            }
            ScanState::SingleQuote => {
                if c == '\'' {
                    if chars.get(i + 1) == Some(&'\'') {
                        i += 1;
                    } else {
                        state = ScanState::Normal;
                    }
                }
            }
            ScanState::DoubleQuote => {
                if c == '"' {
                    if chars.get(i + 1) == Some(&'"') {
                        i += 1;
                    } else {
                        state = ScanState::Normal;
                    }
                }
            }
            ScanState::LineComment => {
                if c == '\n' {
                    state = ScanState::Normal;
                }
            }
            ScanState::BlockComment => {
                if c == '*' && chars.get(i + 1) == Some(&'/') {
                    state = ScanState::Normal;
                    i += 1;
                }
            }
        }
        i += 1;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_doubles_internal_quotes() {
        assert_eq!(quote_identifier("group").unwrap(), "\"group\"");
        assert_eq!(quote_identifier("a\"b").unwrap(), "\"a\"\"b\"");
    }

    #[test]
    fn quoting_rejects_empty() {
        assert!(quote_identifier("").is_err());
    }

    #[test]
    fn default_allowed_function_passes_strict() {
        let config = SqlSafetyConfig::default();
        let overrides = FunctionOverride::default();
        assert!(validate_clause("COUNT(*)", &config, &overrides).is_ok());
    }

    #[test]
    fn disallowed_function_fails_strict() {
        let config = SqlSafetyConfig::default();
        let overrides = FunctionOverride::default();
        let err = validate_clause("DANGEROUS_FUNC(*)", &config, &overrides).unwrap_err();
        assert!(matches!(err, Error::Validation(m) if m.contains("DANGEROUS_FUNC")));
    }

    #[test]
    fn disallowed_function_warns_non_strict() {
        let mut config = SqlSafetyConfig::default();
        config.strict_sql_validation = false;
        let overrides = FunctionOverride::default();
        assert!(validate_clause("DANGEROUS_FUNC(*)", &config, &overrides).is_ok());
    }

    #[test]
    fn function_call_inside_string_literal_is_invisible() {
        assert_eq!(extract_function_calls("key = 'X('"), Vec::<String>::new());
    }

    #[test]
    fn function_call_inside_comment_is_invisible() {
        assert_eq!(extract_function_calls("key = 1 -- X(\nAND y = 2"), Vec::<String>::new());
    }

    #[test]
    fn function_call_inside_block_comment_is_invisible() {
        assert_eq!(extract_function_calls("key = 1 /* X( */ AND y = 2"), Vec::<String>::new());
    }

    #[test]
    fn function_call_outside_string_is_detected() {
        assert_eq!(extract_function_calls("X(*)"), vec!["X".to_string()]);
    }

    #[test]
    fn length_cap_rejects_long_clause() {
        let mut config = SqlSafetyConfig::default();
        config.max_clause_length = Some(10);
        let overrides = FunctionOverride::default();
        let err = validate_clause("key = ?????????????", &config, &overrides).unwrap_err();
        assert!(matches!(err, Error::Validation(m) if m.contains("exceeds maximum length")));
    }

    #[test]
    fn forbidden_always_wins_over_query_allow() {
        let config = SqlSafetyConfig::default();
        let allowed = vec!["SOME_FUNC".to_string()];
        let forbidden = vec!["SOME_FUNC".to_string()];
        let overrides = FunctionOverride {
            allowed: Some(&allowed),
            override_allowed: false,
            forbidden: Some(&forbidden),
        };
        let err = validate_clause("SOME_FUNC(*)", &config, &overrides).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn override_allowed_replaces_handle_allow_set() {
        let mut config = SqlSafetyConfig::default();
        config.handle_allowed_functions.insert("FUNC_A".to_string());
        let allowed = vec!["FUNC_B".to_string()];
        let overrides = FunctionOverride {
            allowed: Some(&allowed),
            override_allowed: true,
            forbidden: None,
        };
        assert!(validate_clause("FUNC_A(*)", &config, &overrides).is_err());
        assert!(validate_clause("FUNC_B(*)", &config, &overrides).is_ok());
    }

    #[test]
    fn dangerous_statement_chaining_detected() {
        assert!(find_dangerous_pattern("1=1; DROP TABLE data").is_some());
    }

    #[test]
    fn semicolon_inside_string_is_not_dangerous() {
        assert!(find_dangerous_pattern("key = '1; DROP TABLE data'").is_none());
    }

    #[test]
    fn quote_bare_columns_quotes_reserved_words() {
        assert_eq!(
            quote_bare_columns("group, name").unwrap(),
            "\"group\", \"name\""
        );
    }

    #[test]
    fn quote_bare_columns_leaves_star_and_expressions_alone() {
        assert_eq!(quote_bare_columns("*").unwrap(), "*");
        assert_eq!(
            quote_bare_columns("COUNT(*) AS total, t.id").unwrap(),
            "COUNT(*) AS total, t.id"
        );
    }
}
