//! Value-to-literal encoding for query text.
//!
//! Rules:
//! - `Null` renders as `NULL`
//! - integers and finite floats pass through; NaN and infinities render as `NULL`
//! - strings are single-quoted with embedded `'` doubled
//! - booleans render as `TRUE` / `FALSE`

use costflow_core::types::Scalar;

pub fn encode(value: &Scalar) -> String {
    match value {
        Scalar::Null => "NULL".to_string(),
        Scalar::Bool(true) => "TRUE".to_string(),
        Scalar::Bool(false) => "FALSE".to_string(),
        Scalar::I64(i) => i.to_string(),
        Scalar::F64(f) if f.is_finite() => f.to_string(),
        Scalar::F64(_) => "NULL".to_string(),
        Scalar::Str(s) => quote_str(s),
    }
}

pub fn quote_str(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Double-quoted identifier with embedded `"` doubled.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape `%`, `_` and the escape char itself for a `LIKE ... ESCAPE '\'` pattern.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_each_scalar_kind() {
        assert_eq!(encode(&Scalar::Null), "NULL");
        assert_eq!(encode(&Scalar::I64(-7)), "-7");
        assert_eq!(encode(&Scalar::F64(12.5)), "12.5");
        assert_eq!(encode(&Scalar::Bool(true)), "TRUE");
        assert_eq!(encode(&Scalar::Str("it's".into())), "'it''s'");
    }

    #[test]
    fn non_finite_floats_become_null() {
        assert_eq!(encode(&Scalar::F64(f64::NAN)), "NULL");
        assert_eq!(encode(&Scalar::F64(f64::INFINITY)), "NULL");
    }

    #[test]
    fn injection_attempt_stays_inside_the_literal() {
        let lit = encode(&Scalar::Str("x'); DROP VIEW v; --".into()));
        assert_eq!(lit, "'x''); DROP VIEW v; --'");
    }

    #[test]
    fn identifiers_and_like_patterns() {
        assert_eq!(quote_ident("Billed\"Cost"), "\"Billed\"\"Cost\"");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
