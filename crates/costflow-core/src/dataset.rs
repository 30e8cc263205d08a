//! Raw and enriched datasets threaded through the pipeline.
//!
//! A `RawDataset` is produced once per ingestion run and never mutated. The
//! `EnrichedDataset` shares it behind an `Arc` and carries the optional
//! enrichment collections. A collection that is `None` has not been computed;
//! `Some(vec![])` was computed and came out empty.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::enrichment::{EmissionEstimate, TagOverlay, WorkloadClassification};
use crate::error::{Error, Result};
use crate::types::{Row, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Csv,
    Json,
    Parquet,
}

/// Where the rows came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Billing provider, e.g. "aws", "gcp", "azure", "openai".
    pub provider: String,
    pub format: DataFormat,
    /// Milliseconds since Unix epoch (UTC).
    pub received_at_ms: u64,
}

impl SourceMetadata {
    pub fn new(provider: impl Into<String>, format: DataFormat) -> Self {
        Self {
            provider: provider.into(),
            format,
            received_at_ms: now_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSummary {
    /// Column names in first-seen order.
    pub columns: Vec<String>,
    pub row_count: usize,
    pub size_estimate_bytes: u64,
}

impl SchemaSummary {
    pub fn from_rows(rows: &[Row]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut size = 0u64;
        for row in rows {
            for col in row.columns() {
                if !columns.iter().any(|c| c == col) {
                    columns.push(col.to_string());
                }
            }
            size += row.approx_size() as u64;
        }
        Self {
            columns,
            row_count: rows.len(),
            size_estimate_bytes: size,
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDataset {
    rows: Vec<Row>,
    source: SourceMetadata,
    schema: SchemaSummary,
}

impl RawDataset {
    /// Wrap ingested rows; the schema summary is derived from them.
    pub fn new(rows: Vec<Row>, source: SourceMetadata) -> Self {
        let schema = SchemaSummary::from_rows(&rows);
        Self {
            rows,
            source,
            schema,
        }
    }

    /// Decode CSV (header row required), inferring scalar types per cell.
    pub fn from_csv_reader<R: Read>(reader: R, source: SourceMetadata) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if headers.is_empty() {
            return Err(Error::Dataset("csv input has no header row".into()));
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let row: Row = headers
                .iter()
                .zip(record.iter())
                .map(|(h, cell)| (h.clone(), Scalar::infer(cell)))
                .collect();
            rows.push(row);
        }

        let mut ds = Self::new(rows, source);
        // Keep header order even for columns that are entirely empty.
        ds.schema.columns = headers;
        Ok(ds)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn source(&self) -> &SourceMetadata {
        &self.source
    }

    pub fn schema(&self) -> &SchemaSummary {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A raw dataset plus whatever enrichment collections steps have attached.
///
/// Steps receive `&EnrichedDataset` and return a new value; collections are
/// only ever extended through the `append_*` methods, never replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedDataset {
    raw: Arc<RawDataset>,
    tag_overlays: Option<Vec<TagOverlay>>,
    emissions: Option<Vec<EmissionEstimate>>,
    classifications: Option<Vec<WorkloadClassification>>,
    /// Collections attached by third-party steps, keyed by collection name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    extensions: BTreeMap<String, Vec<serde_json::Value>>,
}

impl EnrichedDataset {
    pub fn from_raw(raw: Arc<RawDataset>) -> Self {
        Self {
            raw,
            tag_overlays: None,
            emissions: None,
            classifications: None,
            extensions: BTreeMap::new(),
        }
    }

    pub fn raw(&self) -> &RawDataset {
        &self.raw
    }

    pub fn raw_arc(&self) -> Arc<RawDataset> {
        Arc::clone(&self.raw)
    }

    pub fn rows(&self) -> &[Row] {
        self.raw.rows()
    }

    pub fn tag_overlays(&self) -> Option<&[TagOverlay]> {
        self.tag_overlays.as_deref()
    }

    pub fn emissions(&self) -> Option<&[EmissionEstimate]> {
        self.emissions.as_deref()
    }

    pub fn classifications(&self) -> Option<&[WorkloadClassification]> {
        self.classifications.as_deref()
    }

    pub fn extension(&self, name: &str) -> Option<&[serde_json::Value]> {
        self.extensions.get(name).map(Vec::as_slice)
    }

    /// Tags attached to `resource_id`, if the tag collection has it.
    pub fn tags_for(&self, resource_id: &str) -> Option<&BTreeMap<String, String>> {
        self.tag_overlays
            .as_ref()?
            .iter()
            .find(|o| o.resource_id == resource_id)
            .map(|o| &o.tags)
    }

    /// Marks the tag collection computed (even if `items` is empty) and extends it.
    pub fn append_tag_overlays(&mut self, items: impl IntoIterator<Item = TagOverlay>) {
        self.tag_overlays.get_or_insert_with(Vec::new).extend(items);
    }

    pub fn append_emissions(&mut self, items: impl IntoIterator<Item = EmissionEstimate>) {
        self.emissions.get_or_insert_with(Vec::new).extend(items);
    }

    pub fn append_classifications(
        &mut self,
        items: impl IntoIterator<Item = WorkloadClassification>,
    ) {
        self.classifications
            .get_or_insert_with(Vec::new)
            .extend(items);
    }

    pub fn append_extension(
        &mut self,
        name: impl Into<String>,
        items: impl IntoIterator<Item = serde_json::Value>,
    ) {
        self.extensions.entry(name.into()).or_default().extend(items);
    }
}

impl From<RawDataset> for EnrichedDataset {
    fn from(raw: RawDataset) -> Self {
        Self::from_raw(Arc::new(raw))
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceMetadata {
        SourceMetadata::new("aws", DataFormat::Csv)
    }

    #[test]
    fn schema_summary_tracks_first_seen_columns() {
        let rows = vec![
            Row::new().with("ResourceId", "i-1").with("BilledCost", 1.0),
            Row::new().with("ResourceId", "i-2").with("RegionId", "us-east-1"),
        ];
        let ds = RawDataset::new(rows, source());
        assert_eq!(ds.schema().row_count, 2);
        assert_eq!(ds.schema().columns, vec!["BilledCost", "ResourceId", "RegionId"]);
        assert!(ds.schema().size_estimate_bytes > 0);
    }

    #[test]
    fn csv_reader_infers_types_and_keeps_header_order() {
        let csv = "ResourceId,ServiceName,BilledCost,ConsumedQuantity\n\
                   i-1,Amazon EC2,12.5,3\n\
                   i-2,Amazon S3,0.25,\n";
        let ds = RawDataset::from_csv_reader(csv.as_bytes(), source()).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(
            ds.schema().columns,
            vec!["ResourceId", "ServiceName", "BilledCost", "ConsumedQuantity"]
        );
        assert_eq!(ds.rows()[0].value("BilledCost"), &Scalar::F64(12.5));
        assert_eq!(ds.rows()[0].value("ConsumedQuantity"), &Scalar::I64(3));
        assert!(ds.rows()[1].value("ConsumedQuantity").is_null());
    }

    #[test]
    fn absent_collection_differs_from_empty_collection() {
        let mut enriched = EnrichedDataset::from(RawDataset::new(vec![], source()));
        assert!(enriched.tag_overlays().is_none());
        enriched.append_tag_overlays(Vec::new());
        assert_eq!(enriched.tag_overlays().map(<[_]>::len), Some(0));
        assert!(enriched.emissions().is_none());
    }

    #[test]
    fn appending_extends_previous_items() {
        let mut enriched = EnrichedDataset::from(RawDataset::new(vec![], source()));
        let overlay = |id: &str| TagOverlay {
            resource_id: id.into(),
            tags: BTreeMap::from([("Team".to_string(), "ops".to_string())]),
            rule_ids: vec!["r1".into()],
        };
        enriched.append_tag_overlays([overlay("a")]);
        enriched.append_tag_overlays([overlay("b")]);
        assert_eq!(enriched.tag_overlays().unwrap().len(), 2);
        assert_eq!(enriched.tags_for("b").unwrap()["Team"], "ops");

        enriched.append_extension("anomalies", [serde_json::json!({"score": 0.9})]);
        assert_eq!(enriched.extension("anomalies").unwrap().len(), 1);
    }
}
