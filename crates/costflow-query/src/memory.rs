//! In-process engine that interprets [`Statement`]s without SQL parsing.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use costflow_core::types::{scalar_tuple_cmp, Row, Scalar};

use crate::engine::QueryEngine;
use crate::error::{QueryError, Result};
use crate::filter::Predicate;
use crate::statement::Statement;

#[derive(Debug, Clone, Default)]
struct View {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl View {
    fn check_columns<'a>(&self, name: &str, cols: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for c in cols {
            if !self.columns.iter().any(|v| v == c) {
                return Err(QueryError::UnknownColumn {
                    view: name.to_string(),
                    column: c.to_string(),
                });
            }
        }
        Ok(())
    }

    fn filtered<'a>(&'a self, filter: &'a Option<Predicate>) -> impl Iterator<Item = &'a Row> + 'a {
        self.rows
            .iter()
            .filter(move |r| filter.as_ref().map_or(true, |p| p.matches(r)))
    }
}

/// Statement interpreter over named in-memory views.
///
/// Every executed statement's SQL rendering is recorded so callers can
/// inspect what a real engine would have received.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    views: Mutex<HashMap<String, View>>,
    history: Mutex<Vec<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Identity of a tuple for DISTINCT / GROUP BY.
fn tuple_key(values: &[Scalar]) -> String {
    format!("{values:?}")
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_view(&self, name: &str) -> bool {
        lock(&self.views).contains_key(name)
    }

    pub fn view_len(&self, name: &str) -> Option<usize> {
        lock(&self.views).get(name).map(|v| v.rows.len())
    }

    /// SQL renderings of every executed statement, oldest first.
    pub fn history(&self) -> Vec<String> {
        lock(&self.history).clone()
    }

    fn run(&self, stmt: &Statement) -> Result<Vec<Row>> {
        match stmt {
            Statement::CreateView { name, columns, rows } => {
                let projected: Vec<Row> = rows
                    .iter()
                    .map(|r| {
                        columns
                            .iter()
                            .map(|c| (c.clone(), r.value(c).clone()))
                            .collect::<Row>()
                    })
                    .collect();
                lock(&self.views).insert(
                    name.clone(),
                    View {
                        columns: columns.clone(),
                        rows: projected,
                    },
                );
                Ok(Vec::new())
            }
            Statement::DropView { name } => {
                lock(&self.views).remove(name);
                Ok(Vec::new())
            }
            Statement::Select {
                view,
                columns,
                filter,
                distinct,
                limit,
            } => {
                let views = lock(&self.views);
                let v = views.get(view).ok_or_else(|| QueryError::UnknownView(view.clone()))?;
                let wanted: Vec<String> = if columns.is_empty() {
                    v.columns.clone()
                } else {
                    columns.clone()
                };
                v.check_columns(view, wanted.iter().map(String::as_str))?;
                if let Some(f) = filter {
                    v.check_columns(view, f.columns())?;
                }

                let mut seen = HashSet::new();
                let mut out = Vec::new();
                for row in v.filtered(filter) {
                    let values: Vec<Scalar> = wanted.iter().map(|c| row.value(c).clone()).collect();
                    if *distinct && !seen.insert(tuple_key(&values)) {
                        continue;
                    }
                    out.push(wanted.iter().cloned().zip(values).collect());
                    if limit.map_or(false, |n| out.len() >= n) {
                        break;
                    }
                }
                Ok(out)
            }
            Statement::Aggregate {
                view,
                group_by,
                sums,
                filter,
            } => {
                let views = lock(&self.views);
                let v = views.get(view).ok_or_else(|| QueryError::UnknownView(view.clone()))?;
                v.check_columns(view, group_by.iter().chain(sums).map(String::as_str))?;
                if let Some(f) = filter {
                    v.check_columns(view, f.columns())?;
                }

                // key -> (group values, per-column sum; None until a numeric value is seen)
                let mut groups: HashMap<String, (Vec<Scalar>, Vec<Option<f64>>)> = HashMap::new();
                for row in v.filtered(filter) {
                    let key_vals: Vec<Scalar> = group_by.iter().map(|c| row.value(c).clone()).collect();
                    let entry = groups
                        .entry(tuple_key(&key_vals))
                        .or_insert_with(|| (key_vals, vec![None; sums.len()]));
                    for (acc, col) in entry.1.iter_mut().zip(sums) {
                        if let Some(x) = row.value(col).as_f64() {
                            *acc = Some(acc.unwrap_or(0.0) + x);
                        }
                    }
                }

                let mut grouped: Vec<(Vec<Scalar>, Vec<Option<f64>>)> = groups.into_values().collect();
                grouped.sort_by(|a, b| scalar_tuple_cmp(&a.0, &b.0));
                Ok(grouped
                    .into_iter()
                    .map(|(keys, totals)| {
                        let mut row: Row = group_by.iter().cloned().zip(keys).collect();
                        for (col, total) in sums.iter().zip(totals) {
                            row.insert(col.clone(), total);
                        }
                        row
                    })
                    .collect())
            }
        }
    }
}

impl QueryEngine for MemoryEngine {
    fn query(&self, sql: &str) -> Result<Vec<Row>> {
        Err(QueryError::Unsupported(format!(
            "MemoryEngine only executes typed statements (got {} bytes of SQL)",
            sql.len()
        )))
    }

    fn execute(&self, stmt: &Statement) -> Result<Vec<Row>> {
        lock(&self.history).push(stmt.to_sql());
        self.run(stmt)
    }
}
