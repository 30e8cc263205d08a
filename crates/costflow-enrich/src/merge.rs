//! Resolution of tag-key collisions between rules matching one resource.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Rules are always processed highest priority first; the policy decides
/// which value survives when two matching rules set the same key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMergePolicy {
    /// The first (highest-priority) rule to set a key keeps it.
    #[default]
    HighestPriorityWins,
    /// Each later rule overwrites, so the lowest-priority match wins.
    LastProcessedWins,
}

impl TagMergePolicy {
    pub fn merge(&self, existing: &mut BTreeMap<String, String>, incoming: &BTreeMap<String, String>) {
        for (k, v) in incoming {
            match self {
                TagMergePolicy::HighestPriorityWins => {
                    existing.entry(k.clone()).or_insert_with(|| v.clone());
                }
                TagMergePolicy::LastProcessedWins => {
                    existing.insert(k.clone(), v.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn policies_differ_only_on_collisions() {
        let high = tags(&[("Environment", "Prod"), ("Owner", "alice")]);
        let low = tags(&[("Environment", "Dev"), ("CostCenter", "Ops")]);

        let mut a = high.clone();
        TagMergePolicy::HighestPriorityWins.merge(&mut a, &low);
        assert_eq!(a, tags(&[("CostCenter", "Ops"), ("Environment", "Prod"), ("Owner", "alice")]));

        let mut b = high.clone();
        TagMergePolicy::LastProcessedWins.merge(&mut b, &low);
        assert_eq!(b["Environment"], "Dev");
        assert_eq!(b["CostCenter"], "Ops");
    }
}
