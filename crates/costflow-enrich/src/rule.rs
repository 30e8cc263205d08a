//! Tag rules and their conditions.

use std::collections::BTreeMap;

use costflow_core::types::Scalar;
use costflow_query::Predicate;
use serde::{Deserialize, Serialize};

use crate::error::StepError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    Contains,
    StartsWith,
    In,
    Regex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Single(Scalar),
    List(Vec<Scalar>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Source column the condition reads.
    pub field: String,
    pub operator: Operator,
    pub value: ConditionValue,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Scalar>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: ConditionValue::Single(value.into()),
        }
    }

    pub fn one_of<V: Into<Scalar>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::In,
            value: ConditionValue::List(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Translate into a row filter.
    ///
    /// `equals` is exact, `contains`/`starts_with` are substring matches on
    /// the value's text, `in` is set membership (a single value is a set of
    /// one), `regex` compiles the value as a pattern.
    pub fn to_predicate(&self) -> Result<Predicate, StepError> {
        let column = self.field.clone();
        match (self.operator, &self.value) {
            (Operator::Equals, ConditionValue::Single(v)) => Ok(Predicate::Equals {
                column,
                value: v.clone(),
            }),
            (Operator::Contains, ConditionValue::Single(v)) => Ok(Predicate::Contains {
                column,
                needle: self.text(v)?,
            }),
            (Operator::StartsWith, ConditionValue::Single(v)) => Ok(Predicate::StartsWith {
                column,
                prefix: self.text(v)?,
            }),
            (Operator::In, ConditionValue::List(vs)) => Ok(Predicate::In {
                column,
                values: vs.clone(),
            }),
            (Operator::In, ConditionValue::Single(v)) => Ok(Predicate::In {
                column,
                values: vec![v.clone()],
            }),
            (Operator::Regex, ConditionValue::Single(v)) => Ok(Predicate::regex(column, &self.text(v)?)?),
            (op, ConditionValue::List(_)) => Err(StepError::Invalid(format!(
                "operator {op:?} on field '{}' takes a single value",
                self.field
            ))),
        }
    }

    fn text(&self, v: &Scalar) -> Result<String, StepError> {
        v.as_text().map(|t| t.into_owned()).ok_or_else(|| {
            StepError::Invalid(format!("condition on field '{}' has a null value", self.field))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleAudit {
    pub created_by: Option<String>,
    pub created_at_ms: Option<u64>,
    pub updated_at_ms: Option<u64>,
}

fn default_active() -> bool {
    true
}

/// A virtual-tag rule: when `condition` holds for a row, attach `tags` to
/// the row's resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub condition: Condition,
    #[serde(alias = "attributes_to_apply")]
    pub tags: BTreeMap<String, String>,
    /// Higher is evaluated first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub audit: RuleAudit,
}

impl Rule {
    pub fn new(id: impl Into<String>, priority: i32, condition: Condition) -> Self {
        Self {
            id: id.into(),
            name: None,
            condition,
            tags: BTreeMap::new(),
            priority,
            is_active: true,
            audit: RuleAudit::default(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Active rules in evaluation order: priority descending, then id.
pub fn evaluation_order(rules: Vec<Rule>) -> Vec<Rule> {
    let mut active: Vec<Rule> = rules.into_iter().filter(|r| r.is_active).collect();
    active.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
    active
}
