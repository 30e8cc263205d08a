//! Per-run collaborators and typed run attributes.

use std::fmt;
use std::sync::Arc;

use costflow_cache::CacheProvider;
use costflow_core::id::RunId;
use costflow_query::QueryEngine;
use serde::{Deserialize, Serialize};

/// Caller-supplied facts about the run that steps may require.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunAttributes {
    pub data_source_id: Option<String>,
    pub file_name: Option<String>,
    pub connector: Option<String>,
}

/// A context value a step can declare as required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextField {
    OrgId,
    CallerId,
    DataSourceId,
    FileName,
    Connector,
}

impl ContextField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextField::OrgId => "org_id",
            ContextField::CallerId => "caller_id",
            ContextField::DataSourceId => "data_source_id",
            ContextField::FileName => "file_name",
            ContextField::Connector => "connector",
        }
    }
}

impl fmt::Display for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only bag of collaborators handed to every step of one run.
#[derive(Clone)]
pub struct PipelineContext {
    pub query: Arc<dyn QueryEngine>,
    pub cache: Arc<dyn CacheProvider>,
    pub run_id: RunId,
    pub caller_id: Option<String>,
    pub org_id: Option<String>,
    pub attributes: RunAttributes,
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("run_id", &self.run_id)
            .field("caller_id", &self.caller_id)
            .field("org_id", &self.org_id)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

impl PipelineContext {
    /// New context with a fresh run id.
    pub fn new(query: Arc<dyn QueryEngine>, cache: Arc<dyn CacheProvider>) -> Self {
        Self {
            query,
            cache,
            run_id: RunId::new_v4(),
            caller_id: None,
            org_id: None,
            attributes: RunAttributes::default(),
        }
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn with_caller(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }

    pub fn with_attributes(mut self, attributes: RunAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn field(&self, field: ContextField) -> Option<&str> {
        match field {
            ContextField::OrgId => self.org_id.as_deref(),
            ContextField::CallerId => self.caller_id.as_deref(),
            ContextField::DataSourceId => self.attributes.data_source_id.as_deref(),
            ContextField::FileName => self.attributes.file_name.as_deref(),
            ContextField::Connector => self.attributes.connector.as_deref(),
        }
    }

    /// First required field that is unset or empty.
    pub fn first_missing(&self, required: &[ContextField]) -> Option<ContextField> {
        required
            .iter()
            .copied()
            .find(|f| self.field(*f).map_or(true, str::is_empty))
    }

    /// Run-unique engine view name for a step.
    pub fn view_name(&self, step: &str) -> String {
        let safe: String = step
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("costflow_{}_{}", safe, self.run_id.get().simple())
    }
}
