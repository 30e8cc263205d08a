//! Where rule sets and coefficient tables come from.

use std::fs::File;
use std::path::PathBuf;

use serde::de::DeserializeOwned;

use crate::coefficients::Coefficient;
use crate::error::StepError;

/// A loadable list of definitions (tag rules, coefficients, ...).
///
/// `describe` identifies the source and is part of the cache key, so two
/// sources with the same description must yield the same definitions.
pub trait DefinitionSource<T>: Send + Sync {
    fn describe(&self) -> String;

    fn load(&self) -> Result<Vec<T>, StepError>;
}

/// Definitions held in memory.
#[derive(Debug, Clone)]
pub struct StaticSource<T> {
    label: String,
    items: Vec<T>,
}

impl<T> StaticSource<T> {
    pub fn new(label: impl Into<String>, items: Vec<T>) -> Self {
        Self {
            label: label.into(),
            items,
        }
    }
}

impl<T: Clone + Send + Sync> DefinitionSource<T> for StaticSource<T> {
    fn describe(&self) -> String {
        format!("static:{}", self.label)
    }

    fn load(&self) -> Result<Vec<T>, StepError> {
        Ok(self.items.clone())
    }
}

/// A YAML document holding a sequence of definitions.
#[derive(Debug, Clone)]
pub struct YamlFileSource {
    path: PathBuf,
}

impl YamlFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl<T: DeserializeOwned> DefinitionSource<T> for YamlFileSource {
    fn describe(&self) -> String {
        format!("yaml:{}", self.path.display())
    }

    fn load(&self) -> Result<Vec<T>, StepError> {
        let origin = DefinitionSource::<T>::describe(self);
        let file = File::open(&self.path).map_err(|e| StepError::source_failure(&origin, e))?;
        serde_yaml::from_reader(file).map_err(|e| StepError::source_failure(&origin, e))
    }
}

/// Coefficient table in CSV with a header row:
/// `service,region,kg_per_cost_unit,kg_per_usage_unit,confidence,reference`.
/// Rate cells may be empty.
#[derive(Debug, Clone)]
pub struct CsvCoefficientSource {
    path: PathBuf,
}

impl CsvCoefficientSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DefinitionSource<Coefficient> for CsvCoefficientSource {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn load(&self) -> Result<Vec<Coefficient>, StepError> {
        let origin = self.describe();
        let file = File::open(&self.path).map_err(|e| StepError::source_failure(&origin, e))?;
        crate::coefficients::read_csv(file).map_err(|e| StepError::source_failure(&origin, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;
    use std::fs;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("costflow-source-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn yaml_source_loads_rules() {
        let path = temp_file(
            "rules.yaml",
            "- id: r1\n  condition: { field: ServiceName, operator: equals, value: Amazon EC2 }\n  tags: { Team: compute }\n",
        );
        let src = YamlFileSource::new(&path);
        let rules: Vec<Rule> = src.load().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].tags["Team"], "compute");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_file_is_a_source_error() {
        let src = YamlFileSource::new("/definitely/not/here.yaml");
        let err = DefinitionSource::<Rule>::load(&src).unwrap_err();
        assert!(matches!(err, StepError::Source { .. }));
        assert!(err.to_string().contains("yaml:/definitely/not/here.yaml"));
    }

    #[test]
    fn csv_source_allows_empty_rates() {
        let path = temp_file(
            "coefficients.csv",
            "service,region,kg_per_cost_unit,kg_per_usage_unit,confidence,reference\n\
             Amazon EC2,us-east-1,0.41,,0.8,grid-mix\n\
             Amazon S3,global,,0.0012,0.6,\n",
        );
        let coefs = CsvCoefficientSource::new(&path).load().unwrap();
        assert_eq!(coefs.len(), 2);
        assert_eq!(coefs[0].kg_per_cost_unit, Some(0.41));
        assert_eq!(coefs[0].kg_per_usage_unit, None);
        assert_eq!(coefs[1].reference, None);
        let _ = fs::remove_file(path);
    }
}
