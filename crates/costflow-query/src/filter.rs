//! Row predicates with two renderings: in-process evaluation and SQL text.

use costflow_core::types::{Row, Scalar};
use regex::Regex;

use crate::literal::{encode, escape_like, quote_ident, quote_str};

#[derive(Debug, Clone)]
pub enum Predicate {
    /// Exact match (numbers compare numerically).
    Equals { column: String, value: Scalar },
    /// Substring match on the column's text.
    Contains { column: String, needle: String },
    StartsWith { column: String, prefix: String },
    /// Set membership; an empty set matches nothing.
    In { column: String, values: Vec<Scalar> },
    Regex { column: String, pattern: Regex },
    /// Conjunction; an empty list matches everything.
    And(Vec<Predicate>),
    IsNotNull { column: String },
}

impl Predicate {
    pub fn regex(column: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Predicate::Regex {
            column: column.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    /// Null cells never match a value predicate.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::Equals { column, value } => row.value(column).sql_eq(value),
            Predicate::Contains { column, needle } => row
                .value(column)
                .as_text()
                .map_or(false, |t| t.contains(needle.as_str())),
            Predicate::StartsWith { column, prefix } => row
                .value(column)
                .as_text()
                .map_or(false, |t| t.starts_with(prefix.as_str())),
            Predicate::In { column, values } => {
                let cell = row.value(column);
                values.iter().any(|v| cell.sql_eq(v))
            }
            Predicate::Regex { column, pattern } => row
                .value(column)
                .as_text()
                .map_or(false, |t| pattern.is_match(&t)),
            Predicate::And(parts) => parts.iter().all(|p| p.matches(row)),
            Predicate::IsNotNull { column } => !row.value(column).is_null(),
        }
    }

    /// Columns the predicate reads.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Predicate::Equals { column, .. }
            | Predicate::Contains { column, .. }
            | Predicate::StartsWith { column, .. }
            | Predicate::In { column, .. }
            | Predicate::Regex { column, .. }
            | Predicate::IsNotNull { column } => vec![column.as_str()],
            Predicate::And(parts) => parts.iter().flat_map(Predicate::columns).collect(),
        }
    }

    pub fn to_sql(&self) -> String {
        match self {
            Predicate::Equals { column, value } => {
                format!("{} = {}", quote_ident(column), encode(value))
            }
            Predicate::Contains { column, needle } => format!(
                "{} LIKE {} ESCAPE '\\'",
                quote_ident(column),
                quote_str(&format!("%{}%", escape_like(needle)))
            ),
            Predicate::StartsWith { column, prefix } => format!(
                "{} LIKE {} ESCAPE '\\'",
                quote_ident(column),
                quote_str(&format!("{}%", escape_like(prefix)))
            ),
            Predicate::In { values, .. } if values.is_empty() => "FALSE".to_string(),
            Predicate::In { column, values } => {
                let list: Vec<String> = values.iter().map(encode).collect();
                format!("{} IN ({})", quote_ident(column), list.join(", "))
            }
            Predicate::Regex { column, pattern } => format!(
                "regexp_matches({}, {})",
                quote_ident(column),
                quote_str(pattern.as_str())
            ),
            Predicate::And(parts) if parts.is_empty() => "TRUE".to_string(),
            Predicate::And(parts) => parts
                .iter()
                .map(|p| format!("({})", p.to_sql()))
                .collect::<Vec<_>>()
                .join(" AND "),
            Predicate::IsNotNull { column } => format!("{} IS NOT NULL", quote_ident(column)),
        }
    }
}
