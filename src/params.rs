//! Query-parameter substitution.
//!
//! Replaces `:name` and `$name` placeholders with SQL literals. A
//! placeholder only matches when it ends at a word boundary, so `:user`
//! never rewrites the prefix of `:username`.

use regex::Regex;

/// Substitute every parameter into the SQL text.
pub fn substitute(sql: &str, params: &[(String, String)]) -> String {
    let mut out = sql.to_string();
    for (name, value) in params {
        let pattern = format!(r"[:$]{}\b", regex::escape(name));
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(_) => continue,
        };
        let literal = quote_literal(value);
        // Closure replacement: the literal must not be reinterpreted as a
        // capture-group reference.
        out = re
            .replace_all(&out, |_: &regex::Captures| literal.clone())
            .into_owned();
    }
    out
}

/// Render a parameter value as a SQL literal. Numbers and the keywords
/// `null`/`true`/`false` pass through bare; everything else is quoted
/// with embedded quotes doubled.
pub fn quote_literal(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.parse::<i64>().is_ok() {
        return trimmed.to_string();
    }
    if trimmed.parse::<f64>().map(|f| f.is_finite()).unwrap_or(false) {
        return trimmed.to_string();
    }
    if matches!(trimmed.to_lowercase().as_str(), "null" | "true" | "false") {
        return trimmed.to_string();
    }
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitute_both_sigils() {
        let p = params(&[("n", "42")]);
        assert_eq!(
            substitute("SELECT * FROM t WHERE a = :n OR b = $n", &p),
            "SELECT * FROM t WHERE a = 42 OR b = 42"
        );
    }

    #[test]
    fn test_quoting_rules() {
        assert_eq!(quote_literal("42"), "42");
        assert_eq!(quote_literal("1.5e3"), "1.5e3");
        assert_eq!(quote_literal("null"), "null");
        assert_eq!(quote_literal("TRUE"), "TRUE");
        assert_eq!(quote_literal("hello"), "'hello'");
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_embedded_quote_is_doubled() {
        let p = params(&[("n", "O'Brien")]);
        assert_eq!(
            substitute("SELECT * FROM t WHERE name = :n", &p),
            "SELECT * FROM t WHERE name = 'O''Brien'"
        );
    }

    // Word-boundary property: a parameter never replaces the prefix of a
    // longer identifier.
    #[test]
    fn test_word_boundary_guard() {
        let p = params(&[("user", "alice")]);
        let out = substitute("WHERE u = :user AND n = :username", &p);
        assert_eq!(out, "WHERE u = 'alice' AND n = :username");
    }

    #[test]
    fn test_value_with_dollar_is_literal() {
        let p = params(&[("n", "$1 and more")]);
        assert_eq!(
            substitute("SELECT :n", &p),
            "SELECT '$1 and more'"
        );
    }

    #[test]
    fn test_unknown_placeholders_untouched() {
        let p = params(&[("a", "1")]);
        assert_eq!(substitute("SELECT :b", &p), "SELECT :b");
    }
}
