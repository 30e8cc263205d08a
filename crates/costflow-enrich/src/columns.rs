use serde::{Deserialize, Serialize};

/// Source column names the built-in steps read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub resource_id: String,
    pub service: String,
    pub region: String,
    pub billed_cost: String,
    pub consumed_quantity: String,
    pub resource_name: String,
    pub instance_type: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            resource_id: "ResourceId".into(),
            service: "ServiceName".into(),
            region: "RegionId".into(),
            billed_cost: "BilledCost".into(),
            consumed_quantity: "ConsumedQuantity".into(),
            resource_name: "ResourceName".into(),
            instance_type: "InstanceType".into(),
        }
    }
}
