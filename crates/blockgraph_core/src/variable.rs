// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph-scoped variables and the block mirroring them.

use crate::block::{Block, BlockBehavior, BlockId};
use crate::error::{GraphError, Result};
use crate::event::{GraphEvent, VariableEvent};
use crate::graph::Graph;
use crate::point::{Point, PointDirection};
use crate::policy::PointPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the output point a [`VariableBlock`] exposes
pub const VARIABLE_POINT: &str = "value";

/// Construction payload of a variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableData {
    /// Variable name, unique within the graph
    pub name: String,
    /// Value type
    pub value_type: String,
    /// Initial value
    #[serde(default)]
    pub value: Value,
}

/// A named, typed value scoped to a graph
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub(crate) name: String,
    pub(crate) value_type: String,
    pub(crate) value: Value,
    pub(crate) block: Option<BlockId>,
}

impl Variable {
    /// Create a variable
    pub fn new(name: impl Into<String>, value_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: value_type.into(),
            value: Value::Null,
            block: None,
        }
    }

    /// Set the initial value
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    /// Variable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value type
    pub fn value_type(&self) -> &str {
        &self.value_type
    }

    /// Current value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Block mirroring the variable
    pub fn block(&self) -> Option<&BlockId> {
        self.block.as_ref()
    }
}

impl From<VariableData> for Variable {
    fn from(data: VariableData) -> Self {
        Self::new(data.name, data.value_type).with_value(data.value)
    }
}

/// Block kind exposing the variable named like the block as an output point.
///
/// A variable is mirrored by at most one block.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariableBlock;

impl VariableBlock {
    /// Create a block mirroring `variable`
    pub fn block(variable: impl Into<String>) -> Block {
        Block::with_behavior(Self).with_name(variable)
    }
}

impl BlockBehavior for VariableBlock {
    fn type_name(&self) -> &str {
        "VariableBlock"
    }

    fn added(&self, graph: &mut Graph, block: &BlockId) -> Result<()> {
        let name = graph.require_block(block)?.name().to_string();
        let variable = graph
            .variables
            .get_mut(&name)
            .ok_or_else(|| GraphError::VariableNotFound(name.clone()))?;
        if let Some(bound) = variable.block.as_ref().filter(|bound| *bound != block) {
            return Err(GraphError::VariableAlreadyBound {
                variable: name,
                block: bound.clone(),
            });
        }
        variable.block = Some(block.clone());

        let mirror = Point::output(VARIABLE_POINT, variable.value_type.clone())
            .with_policy(PointPolicy::MULTIPLE_CONNECTIONS | PointPolicy::CONVERSION);
        graph.add_point(block, mirror, None)?;
        tracing::debug!("Variable {} bound to block {}", name, block);
        Ok(())
    }

    fn removed(&self, graph: &mut Graph, block: &BlockId) {
        for variable in graph.variables.values_mut() {
            if variable.block.as_ref() == Some(block) {
                variable.block = None;
            }
        }
    }
}

impl Graph {
    /// Add a variable, converting its initial value into its type
    pub fn add_variable(&mut self, mut variable: Variable) -> Result<()> {
        if self.variables.contains_key(&variable.name) {
            return Err(GraphError::VariableRedefinition(variable.name));
        }
        self.value_types.require(&variable.value_type)?;
        variable.value = self
            .value_types
            .convert_value(&variable.value_type, &variable.value)?;
        variable.block = None;

        let name = variable.name.clone();
        self.variables.insert(name.clone(), variable);
        tracing::debug!("Added variable {}", name);
        self.events.emit(&GraphEvent::VariableAdd { variable: name });
        Ok(())
    }

    /// Remove a variable, removing the block mirroring it first
    pub fn remove_variable(&mut self, name: &str) -> Result<Variable> {
        let bound = self.require_variable(name)?.block.clone();
        if let Some(block) = bound {
            self.remove_block(&block)?;
        }
        let variable = self
            .variables
            .shift_remove(name)
            .ok_or_else(|| GraphError::VariableNotFound(name.to_string()))?;
        tracing::debug!("Removed variable {}", name);
        self.events.emit_variable(name, &VariableEvent::Remove);
        self.events.emit(&GraphEvent::VariableRemove {
            variable: name.to_string(),
        });
        Ok(variable)
    }

    /// Get a variable by name
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    fn require_variable(&self, name: &str) -> Result<&Variable> {
        self.variables
            .get(name)
            .ok_or_else(|| GraphError::VariableNotFound(name.to_string()))
    }

    /// Get all variables
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    /// Get the number of variables
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Assign a variable's value
    pub fn change_variable_value(&mut self, name: &str, value: Value) -> Result<()> {
        let variable = self.require_variable(name)?;
        let value = self.value_types.convert_value(&variable.value_type, &value)?;
        let old_value = match self.variables.get_mut(name) {
            Some(variable) => std::mem::replace(&mut variable.value, value.clone()),
            None => return Err(GraphError::VariableNotFound(name.to_string())),
        };
        self.events.emit_variable(
            name,
            &VariableEvent::ValueChange {
                new_value: value.clone(),
                old_value: old_value.clone(),
            },
        );
        self.events.emit(&GraphEvent::VariableValueChange {
            variable: name.to_string(),
            new_value: value,
            old_value,
        });
        Ok(())
    }

    /// Retype a variable and the point mirroring it
    pub fn change_variable_value_type(&mut self, name: &str, value_type: &str) -> Result<()> {
        let variable = self.require_variable(name)?;
        self.value_types.require(value_type)?;
        let value = self.value_types.convert_value(value_type, &variable.value)?;
        let mirror = variable
            .block
            .as_ref()
            .and_then(|block| self.point_by_name(block, PointDirection::Output, VARIABLE_POINT));
        if let Some(point) = mirror {
            self.change_point_value_type(point, value_type, false)?;
        }

        let old_type = match self.variables.get_mut(name) {
            Some(variable) => {
                variable.value = value;
                std::mem::replace(&mut variable.value_type, value_type.to_string())
            }
            None => return Err(GraphError::VariableNotFound(name.to_string())),
        };
        self.events.emit_variable(
            name,
            &VariableEvent::ValueTypeChange {
                new_type: value_type.to_string(),
                old_type: old_type.clone(),
            },
        );
        self.events.emit(&GraphEvent::VariableValueTypeChange {
            variable: name.to_string(),
            new_type: value_type.to_string(),
            old_type,
        });
        Ok(())
    }
}
