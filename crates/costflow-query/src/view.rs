//! Capped materialization of dataset rows into an engine view.

use costflow_core::types::Row;

use crate::engine::QueryEngine;
use crate::error::Result;
use crate::statement::Statement;

/// A view created from at most `cap` source rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedView {
    pub name: String,
    pub columns: Vec<String>,
    pub row_count: usize,
    /// `true` when source rows beyond the cap were left out.
    pub truncated: bool,
}

impl MaterializedView {
    pub fn materialize(
        engine: &dyn QueryEngine,
        name: impl Into<String>,
        rows: &[Row],
        columns: Vec<String>,
        cap: usize,
    ) -> Result<Self> {
        let name = name.into();
        let taken = rows.len().min(cap);
        let truncated = rows.len() > cap;
        if truncated {
            tracing::warn!(view = %name, total = rows.len(), cap, "source rows truncated for view");
        }

        engine.execute(&Statement::CreateView {
            name: name.clone(),
            columns: columns.clone(),
            rows: rows[..taken].to_vec(),
        })?;

        Ok(Self {
            name,
            columns,
            row_count: taken,
            truncated,
        })
    }

    /// Best-effort drop; a failure is logged, not returned.
    pub fn release(self, engine: &dyn QueryEngine) {
        if let Err(e) = engine.execute(&Statement::DropView { name: self.name.clone() }) {
            tracing::debug!(view = %self.name, error = %e, "view drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;

    #[test]
    fn caps_rows_and_flags_truncation() {
        let engine = MemoryEngine::new();
        let rows: Vec<Row> = (0..5).map(|i| Row::new().with("ResourceId", format!("r-{i}"))).collect();

        let v = MaterializedView::materialize(&engine, "src", &rows, vec!["ResourceId".into()], 3).unwrap();
        assert!(v.truncated);
        assert_eq!(v.row_count, 3);
        assert_eq!(engine.view_len("src"), Some(3));

        v.release(&engine);
        assert!(!engine.has_view("src"));

        let v = MaterializedView::materialize(&engine, "src", &rows, vec!["ResourceId".into()], 5).unwrap();
        assert!(!v.truncated);
    }
}
