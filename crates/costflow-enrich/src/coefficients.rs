//! Emission coefficients and the cascading (service, region) lookup.

use std::collections::HashMap;
use std::io::Read;

use costflow_core::enrichment::{CoefficientMatch, EstimationMethod};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Region value marking a region-agnostic coefficient.
pub const GLOBAL_REGION: &str = "global";

/// Confidence reported when only the flat fallback rate applied.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// kg CO2e per unit of billed cost when nothing better is known.
pub const DEFAULT_FLAT_RATE: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub service: String,
    pub region: String,
    #[serde(default)]
    pub kg_per_cost_unit: Option<f64>,
    #[serde(default)]
    pub kg_per_usage_unit: Option<f64>,
    pub confidence: f64,
    /// Where the figure comes from (methodology, dataset).
    #[serde(default)]
    pub reference: Option<String>,
}

impl Coefficient {
    fn has_usable_rate(&self, consumed_quantity: Option<f64>) -> bool {
        self.kg_per_cost_unit.is_some()
            || (self.kg_per_usage_unit.is_some() && consumed_quantity.is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub kg_co2e: f64,
    pub confidence: f64,
    pub method: EstimationMethod,
    pub matched: CoefficientMatch,
}

fn norm(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

#[derive(Debug, Clone)]
pub struct CoefficientTable {
    by_key: HashMap<(String, String), Coefficient>,
    flat_rate: f64,
}

impl CoefficientTable {
    /// Later entries for the same (service, region) replace earlier ones.
    pub fn new(coefficients: impl IntoIterator<Item = Coefficient>) -> Self {
        let by_key = coefficients
            .into_iter()
            .map(|c| ((norm(&c.service), norm(&c.region)), c))
            .collect();
        Self {
            by_key,
            flat_rate: DEFAULT_FLAT_RATE,
        }
    }

    pub fn with_flat_rate(mut self, rate: f64) -> Self {
        self.flat_rate = rate;
        self
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Exact (service, region), then (service, "global").
    pub fn lookup(&self, service: &str, region: Option<&str>) -> Option<(&Coefficient, CoefficientMatch)> {
        self.candidates(service, region).next()
    }

    /// Every cascade level present in the table, most specific first.
    fn candidates<'a>(
        &'a self,
        service: &str,
        region: Option<&str>,
    ) -> impl Iterator<Item = (&'a Coefficient, CoefficientMatch)> + 'a {
        let service = norm(service);
        let exact = region
            .and_then(|r| self.by_key.get(&(service.clone(), norm(r))))
            .map(|c| (c, CoefficientMatch::Exact));
        let global = self
            .by_key
            .get(&(service, GLOBAL_REGION.to_string()))
            .map(|c| (c, CoefficientMatch::GlobalRegion));
        exact.into_iter().chain(global)
    }

    /// Cost rate if the matched coefficient has one, else usage rate when a
    /// quantity is known. A level whose coefficient has neither usable rate
    /// is passed over; the flat fallback applies when no level is usable.
    pub fn estimate(
        &self,
        service: &str,
        region: Option<&str>,
        billed_cost: f64,
        consumed_quantity: Option<f64>,
    ) -> Estimate {
        let usable = self
            .candidates(service, region)
            .find(|(c, _)| c.has_usable_rate(consumed_quantity));
        match usable {
            Some((c, matched)) => {
                let (kg, method) = match (c.kg_per_cost_unit, c.kg_per_usage_unit, consumed_quantity) {
                    (Some(rate), _, _) => (rate * billed_cost, EstimationMethod::CostRate),
                    (None, Some(rate), Some(q)) => (rate * q, EstimationMethod::UsageRate),
                    _ => (billed_cost * self.flat_rate, EstimationMethod::FlatRate),
                };
                Estimate {
                    kg_co2e: kg,
                    confidence: c.confidence,
                    method,
                    matched,
                }
            }
            None => Estimate {
                kg_co2e: billed_cost * self.flat_rate,
                confidence: FALLBACK_CONFIDENCE,
                method: EstimationMethod::FlatRate,
                matched: CoefficientMatch::Fallback,
            },
        }
    }
}

pub(crate) fn read_csv<R: Read>(reader: R) -> Result<Vec<Coefficient>, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    rdr.deserialize().collect()
}

static DEFAULT_COEFFICIENTS: Lazy<Vec<Coefficient>> = Lazy::new(|| {
    let c = |service: &str, region: &str, cost: Option<f64>, usage: Option<f64>, confidence: f64| Coefficient {
        service: service.to_string(),
        region: region.to_string(),
        kg_per_cost_unit: cost,
        kg_per_usage_unit: usage,
        confidence,
        reference: Some("costflow default table".to_string()),
    };
    vec![
        c("Amazon Elastic Compute Cloud", "us-east-1", Some(0.42), None, 0.7),
        c("Amazon Elastic Compute Cloud", "us-west-2", Some(0.12), None, 0.7),
        c("Amazon Elastic Compute Cloud", "eu-west-1", Some(0.28), None, 0.7),
        c("Amazon Elastic Compute Cloud", GLOBAL_REGION, Some(0.35), None, 0.5),
        c("Amazon Simple Storage Service", GLOBAL_REGION, None, Some(0.0012), 0.6),
        c("Amazon Bedrock", GLOBAL_REGION, Some(0.18), None, 0.5),
        c("Compute Engine", "us-central1", Some(0.33), None, 0.7),
        c("Compute Engine", "europe-west4", Some(0.21), None, 0.7),
        c("Compute Engine", GLOBAL_REGION, Some(0.30), None, 0.5),
        c("Cloud Storage", GLOBAL_REGION, None, Some(0.0010), 0.6),
        c("Vertex AI", GLOBAL_REGION, Some(0.20), None, 0.5),
        c("Virtual Machines", "eastus", Some(0.38), None, 0.7),
        c("Virtual Machines", GLOBAL_REGION, Some(0.34), None, 0.5),
        c("Azure OpenAI Service", GLOBAL_REGION, Some(0.16), None, 0.5),
        c("OpenAI API", GLOBAL_REGION, Some(0.15), None, 0.4),
    ]
});

/// Built-in coefficients covering the common compute, storage and AI services.
pub fn default_coefficients() -> Vec<Coefficient> {
    DEFAULT_COEFFICIENTS.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CoefficientTable {
        CoefficientTable::new(vec![
            Coefficient {
                service: "Amazon EC2".into(),
                region: "us-east-1".into(),
                kg_per_cost_unit: Some(0.5),
                kg_per_usage_unit: None,
                confidence: 0.9,
                reference: None,
            },
            Coefficient {
                service: "Amazon EC2".into(),
                region: "global".into(),
                kg_per_cost_unit: Some(0.2),
                kg_per_usage_unit: None,
                confidence: 0.6,
                reference: None,
            },
            Coefficient {
                service: "Amazon S3".into(),
                region: "global".into(),
                kg_per_cost_unit: None,
                kg_per_usage_unit: Some(0.01),
                confidence: 0.7,
                reference: None,
            },
        ])
    }

    #[test]
    fn cascade_exact_then_global_then_fallback() {
        let t = table();
        let exact = t.estimate("Amazon EC2", Some("us-east-1"), 10.0, None);
        assert_eq!(exact.matched, CoefficientMatch::Exact);
        assert_eq!(exact.method, EstimationMethod::CostRate);
        assert!((exact.kg_co2e - 5.0).abs() < 1e-9);
        assert_eq!(exact.confidence, 0.9);

        let global = t.estimate("amazon ec2", Some("ap-south-1"), 10.0, None);
        assert_eq!(global.matched, CoefficientMatch::GlobalRegion);
        assert!((global.kg_co2e - 2.0).abs() < 1e-9);

        let none = t.estimate("Snowflake", None, 10.0, None);
        assert_eq!(none.matched, CoefficientMatch::Fallback);
        assert_eq!(none.confidence, FALLBACK_CONFIDENCE);
        assert!((none.kg_co2e - 10.0 * DEFAULT_FLAT_RATE).abs() < 1e-9);
    }

    #[test]
    fn usage_rate_needs_a_quantity() {
        let t = table();
        let with_q = t.estimate("Amazon S3", Some("us-east-1"), 3.0, Some(200.0));
        assert_eq!(with_q.method, EstimationMethod::UsageRate);
        assert!((with_q.kg_co2e - 2.0).abs() < 1e-9);

        let without_q = t.estimate("Amazon S3", Some("us-east-1"), 3.0, None);
        assert_eq!(without_q.matched, CoefficientMatch::Fallback);
        assert_eq!(without_q.method, EstimationMethod::FlatRate);
    }

    #[test]
    fn unusable_exact_row_falls_through_to_global() {
        let t = CoefficientTable::new(vec![
            Coefficient {
                service: "Amazon S3".into(),
                region: "us-east-1".into(),
                kg_per_cost_unit: None,
                kg_per_usage_unit: Some(0.01),
                confidence: 0.8,
                reference: None,
            },
            Coefficient {
                service: "Amazon S3".into(),
                region: "global".into(),
                kg_per_cost_unit: Some(0.5),
                kg_per_usage_unit: None,
                confidence: 0.6,
                reference: None,
            },
        ]);

        let est = t.estimate("Amazon S3", Some("us-east-1"), 10.0, None);
        assert_eq!(est.matched, CoefficientMatch::GlobalRegion);
        assert_eq!(est.method, EstimationMethod::CostRate);
        assert!((est.kg_co2e - 5.0).abs() < 1e-9);
        assert_eq!(est.confidence, 0.6);

        // With a quantity the exact row is usable again.
        let est = t.estimate("Amazon S3", Some("us-east-1"), 10.0, Some(100.0));
        assert_eq!(est.matched, CoefficientMatch::Exact);
        assert_eq!(est.method, EstimationMethod::UsageRate);
    }

    #[test]
    fn default_table_has_global_rows() {
        let t = CoefficientTable::new(default_coefficients());
        assert!(!t.is_empty());
        let (_, m) = t.lookup("Amazon Elastic Compute Cloud", Some("sa-east-1")).unwrap();
        assert_eq!(m, CoefficientMatch::GlobalRegion);
    }
}
