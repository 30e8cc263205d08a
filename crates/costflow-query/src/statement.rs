//! Typed statements and their SQL rendering.

use costflow_core::types::Row;

use crate::filter::Predicate;
use crate::literal::{encode, quote_ident};

#[derive(Debug, Clone)]
pub enum Statement {
    /// Ephemeral named view over inlined rows, projected onto `columns`.
    CreateView {
        name: String,
        columns: Vec<String>,
        rows: Vec<Row>,
    },
    Select {
        view: String,
        columns: Vec<String>,
        filter: Option<Predicate>,
        distinct: bool,
        limit: Option<usize>,
    },
    /// `SUM` of each column in `sums`, grouped by `group_by` and ordered by it.
    /// Sum columns keep their source name in the output.
    Aggregate {
        view: String,
        group_by: Vec<String>,
        sums: Vec<String>,
        filter: Option<Predicate>,
    },
    DropView {
        name: String,
    },
}

impl Statement {
    pub fn select_distinct(view: impl Into<String>, columns: Vec<String>, filter: Predicate) -> Self {
        Statement::Select {
            view: view.into(),
            columns,
            filter: Some(filter),
            distinct: true,
            limit: None,
        }
    }

    pub fn to_sql(&self) -> String {
        match self {
            Statement::CreateView { name, columns, rows } => {
                let cols = idents(columns);
                let body = if rows.is_empty() {
                    // Keep the column list so later statements still resolve.
                    let nulls: Vec<String> = columns
                        .iter()
                        .map(|c| format!("CAST(NULL AS VARCHAR) AS {}", quote_ident(c)))
                        .collect();
                    format!("SELECT {} WHERE FALSE", nulls.join(", "))
                } else {
                    let tuples: Vec<String> = rows
                        .iter()
                        .map(|row| {
                            let vals: Vec<String> =
                                columns.iter().map(|c| encode(row.value(c))).collect();
                            format!("({})", vals.join(", "))
                        })
                        .collect();
                    format!("SELECT * FROM (VALUES {}) AS t({})", tuples.join(", "), cols)
                };
                format!("CREATE OR REPLACE TEMP VIEW {} AS {}", quote_ident(name), body)
            }
            Statement::Select {
                view,
                columns,
                filter,
                distinct,
                limit,
            } => {
                let mut sql = format!(
                    "SELECT {}{} FROM {}",
                    if *distinct { "DISTINCT " } else { "" },
                    if columns.is_empty() { "*".to_string() } else { idents(columns) },
                    quote_ident(view)
                );
                if let Some(f) = filter {
                    sql.push_str(&format!(" WHERE {}", f.to_sql()));
                }
                if let Some(n) = limit {
                    sql.push_str(&format!(" LIMIT {n}"));
                }
                sql
            }
            Statement::Aggregate {
                view,
                group_by,
                sums,
                filter,
            } => {
                let mut select: Vec<String> = group_by.iter().map(|c| quote_ident(c)).collect();
                select.extend(sums.iter().map(|c| {
                    let q = quote_ident(c);
                    format!("SUM({q}) AS {q}")
                }));
                let mut sql = format!("SELECT {} FROM {}", select.join(", "), quote_ident(view));
                if let Some(f) = filter {
                    sql.push_str(&format!(" WHERE {}", f.to_sql()));
                }
                if !group_by.is_empty() {
                    let g = idents(group_by);
                    sql.push_str(&format!(" GROUP BY {g} ORDER BY {g}"));
                }
                sql
            }
            Statement::DropView { name } => format!("DROP VIEW IF EXISTS {}", quote_ident(name)),
        }
    }
}

fn idents(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use costflow_core::types::Scalar;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn create_view_inlines_encoded_rows() {
        let stmt = Statement::CreateView {
            name: "src_1".into(),
            columns: cols(&["ResourceId", "BilledCost", "Active"]),
            rows: vec![
                Row::new().with("ResourceId", "it's").with("BilledCost", 1.5).with("Active", true),
                Row::new().with("ResourceId", "b"),
            ],
        };
        assert_eq!(
            stmt.to_sql(),
            "CREATE OR REPLACE TEMP VIEW \"src_1\" AS SELECT * FROM (VALUES ('it''s', 1.5, TRUE), ('b', NULL, NULL)) AS t(\"ResourceId\", \"BilledCost\", \"Active\")"
        );
    }

    #[test]
    fn empty_view_keeps_its_columns() {
        let stmt = Statement::CreateView {
            name: "v".into(),
            columns: cols(&["a"]),
            rows: vec![],
        };
        assert_eq!(
            stmt.to_sql(),
            "CREATE OR REPLACE TEMP VIEW \"v\" AS SELECT CAST(NULL AS VARCHAR) AS \"a\" WHERE FALSE"
        );
    }

    #[test]
    fn select_and_aggregate_render() {
        let select = Statement::select_distinct(
            "v",
            cols(&["ResourceId"]),
            Predicate::Equals { column: "Env".into(), value: Scalar::from("prod") },
        );
        assert_eq!(
            select.to_sql(),
            "SELECT DISTINCT \"ResourceId\" FROM \"v\" WHERE \"Env\" = 'prod'"
        );

        let agg = Statement::Aggregate {
            view: "v".into(),
            group_by: cols(&["ServiceName"]),
            sums: cols(&["BilledCost"]),
            filter: None,
        };
        assert_eq!(
            agg.to_sql(),
            "SELECT \"ServiceName\", SUM(\"BilledCost\") AS \"BilledCost\" FROM \"v\" GROUP BY \"ServiceName\" ORDER BY \"ServiceName\""
        );
    }
}
