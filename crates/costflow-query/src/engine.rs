use crate::error::Result;
use crate::statement::Statement;
use costflow_core::types::Row;

/// Handle to the analytical query engine.
///
/// The only required operation is `query(text) -> ordered rows`. Engines that
/// can work on statements directly (and skip SQL parsing) override `execute`.
pub trait QueryEngine: Send + Sync {
    fn query(&self, sql: &str) -> Result<Vec<Row>>;

    fn execute(&self, stmt: &Statement) -> Result<Vec<Row>> {
        self.query(&stmt.to_sql())
    }
}
