// SPDX-License-Identifier: MIT OR Apache-2.0
//! Point (port) definitions for block inputs/outputs.

use crate::block::BlockId;
use crate::connection::ConnectionId;
use crate::error::{GraphError, Result};
use crate::policy::PointPolicy;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointId(pub Uuid);

impl PointId {
    /// Create a new random point ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PointId {
    fn default() -> Self {
        Self::new()
    }
}

/// Point direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointDirection {
    /// Input (sink) point
    Input,
    /// Output (source) point
    Output,
}

impl PointDirection {
    /// The other direction
    pub fn opposite(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

/// Construction payload of a point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PointData {
    /// Point name, unique per direction within a block
    pub name: String,
    /// Template the point is typed by
    pub template: Option<String>,
    /// Declared value type, required unless `template` is set
    pub value_type: Option<String>,
    /// Initial value
    pub value: Value,
    /// Policy labels, `PointPolicy::DEFAULT` when absent
    pub policy: Option<PointPolicy>,
}

/// A typed port owned by a block.
///
/// A point holds either a literal value or connections, never both.
#[derive(Debug, Clone)]
pub struct Point {
    pub(crate) id: PointId,
    pub(crate) name: String,
    pub(crate) direction: PointDirection,
    pub(crate) template: Option<String>,
    pub(crate) value_type: Option<String>,
    pub(crate) value: Value,
    pub(crate) policy: PointPolicy,
    pub(crate) block: Option<BlockId>,
    pub(crate) connections: IndexSet<ConnectionId>,
}

impl Point {
    fn new(name: String, direction: PointDirection, value_type: Option<String>) -> Self {
        Self {
            id: PointId::new(),
            name,
            direction,
            template: None,
            value_type,
            value: Value::Null,
            policy: PointPolicy::DEFAULT,
            block: None,
            connections: IndexSet::new(),
        }
    }

    /// Create a new input point
    pub fn input(name: impl Into<String>, value_type: impl Into<String>) -> Self {
        Self::new(name.into(), PointDirection::Input, Some(value_type.into()))
    }

    /// Create a new output point
    pub fn output(name: impl Into<String>, value_type: impl Into<String>) -> Self {
        Self::new(name.into(), PointDirection::Output, Some(value_type.into()))
    }

    /// Create an input point typed by a block template
    pub fn template_input(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(name.into(), PointDirection::Input, None).with_template(template)
    }

    /// Create an output point typed by a block template
    pub fn template_output(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self::new(name.into(), PointDirection::Output, None).with_template(template)
    }

    /// Create a point from its construction payload
    pub fn from_data(direction: PointDirection, data: PointData) -> Result<Self> {
        if data.name.is_empty() {
            return Err(GraphError::InvalidPoint {
                name: data.name,
                reason: "name is required".to_string(),
            });
        }
        if data.template.is_none() && data.value_type.is_none() {
            return Err(GraphError::InvalidPoint {
                name: data.name,
                reason: "valueType is required unless template is set".to_string(),
            });
        }
        let mut point = Self::new(data.name, direction, data.value_type);
        point.template = data.template;
        point.value = data.value;
        point.policy = data.policy.unwrap_or_default();
        Ok(point)
    }

    /// Set the initial value
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    /// Set the policy
    pub fn with_policy(mut self, policy: PointPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Type the point by a block template
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Point ID
    pub fn id(&self) -> PointId {
        self.id
    }

    /// Point name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Point direction
    pub fn direction(&self) -> PointDirection {
        self.direction
    }

    /// Whether this is an output point
    pub fn is_output(&self) -> bool {
        self.direction == PointDirection::Output
    }

    /// Whether this is an input point
    pub fn is_input(&self) -> bool {
        self.direction == PointDirection::Input
    }

    /// Template the point is typed by
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// Resolved value type, `None` only while unresolved under a template
    pub fn value_type(&self) -> Option<&str> {
        self.value_type.as_deref()
    }

    /// Current literal value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Point policy
    pub fn policy(&self) -> PointPolicy {
        self.policy
    }

    /// Owning block, `None` while detached
    pub fn block(&self) -> Option<&BlockId> {
        self.block.as_ref()
    }

    /// Whether the point is bound to a block
    pub fn is_bound(&self) -> bool {
        self.block.is_some()
    }

    /// Connections in creation order
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.iter().copied()
    }

    /// Number of connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Whether the point holds a non-null value
    pub fn has_value(&self) -> bool {
        !self.value.is_null()
    }

    /// Whether the point has at least one connection
    pub fn has_connections(&self) -> bool {
        !self.connections.is_empty()
    }

    /// Whether the point holds neither a value nor a connection
    pub fn is_empty(&self) -> bool {
        !self.has_value() && !self.has_connections()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_point_creation() {
        let point = Point::input("in", "Number").with_value(json!(3));
        assert!(point.is_input());
        assert!(!point.is_bound());
        assert_eq!(point.value_type(), Some("Number"));
        assert_eq!(point.policy(), PointPolicy::DEFAULT);
        assert!(point.has_value());
        assert!(!point.has_connections());
    }

    #[test]
    fn test_template_point() {
        let point = Point::template_output("out", "T");
        assert!(point.is_output());
        assert_eq!(point.template(), Some("T"));
        assert_eq!(point.value_type(), None);
        assert!(point.is_empty());
    }

    #[test]
    fn test_point_from_data() {
        let data: PointData = serde_json::from_value(json!({
            "name": "count",
            "valueType": "Number",
            "value": 4,
            "policy": ["VALUE", "MULTIPLE_CONNECTIONS"]
        }))
        .unwrap();
        let point = Point::from_data(PointDirection::Input, data).unwrap();
        assert_eq!(point.name(), "count");
        assert_eq!(point.value(), &json!(4));
        assert!(point.policy().has(PointPolicy::MULTIPLE_CONNECTIONS));
        assert!(!point.policy().has(PointPolicy::CONVERSION));
    }

    #[test]
    fn test_point_from_data_requires_type() {
        let data = PointData {
            name: "lonely".to_string(),
            ..PointData::default()
        };
        let err = Point::from_data(PointDirection::Output, data).unwrap_err();
        assert!(matches!(err, GraphError::InvalidPoint { .. }));

        let data = PointData {
            template: Some("T".to_string()),
            ..PointData::default()
        };
        assert!(Point::from_data(PointDirection::Output, data).is_err());
    }
}
