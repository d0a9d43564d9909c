// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph aggregate owning blocks, points, variables and connections.
//!
//! The graph is the only entry point for mutations. Points are addressed by
//! [`PointId`] and blocks by [`BlockId`]; the graph validates every change
//! against the value-type registry and the point policies before applying
//! it, then notifies listeners.

use crate::block::{Block, BlockBehavior, BlockId, Template};
use crate::connection::{Connection, ConnectionId};
use crate::error::{GraphError, Result};
use crate::event::{
    BlockEvent, BlockListener, EventBus, GraphEvent, GraphListener, ListenerId, PointEvent,
    PointListener, VariableEvent, VariableListener,
};
use crate::point::{Point, PointDirection, PointId};
use crate::policy::PointPolicy;
use crate::value_type::{ValueTypeInfo, ValueTypeRegistry};
use crate::variable::Variable;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A typed block graph
#[derive(Debug)]
pub struct Graph {
    /// Graph name
    pub name: String,
    /// Blocks in attachment order
    pub(crate) blocks: IndexMap<BlockId, Block>,
    /// Owning block of every bound point
    pub(crate) point_owners: HashMap<PointId, BlockId>,
    /// Connections in creation order
    pub(crate) connections: IndexMap<ConnectionId, Connection>,
    /// Variables by name
    pub(crate) variables: IndexMap<String, Variable>,
    /// Known value types
    pub(crate) value_types: ValueTypeRegistry,
    /// Listeners
    pub(crate) events: EventBus,
}

impl Graph {
    /// Create an empty graph with the builtin value types
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_registry(name, ValueTypeRegistry::with_builtins())
    }

    /// Create an empty graph with a custom registry
    pub fn with_registry(name: impl Into<String>, value_types: ValueTypeRegistry) -> Self {
        Self {
            name: name.into(),
            blocks: IndexMap::new(),
            point_owners: HashMap::new(),
            connections: IndexMap::new(),
            variables: IndexMap::new(),
            value_types,
            events: EventBus::new(),
        }
    }

    // ------------------------------------------------------------------
    // Value types and listeners
    // ------------------------------------------------------------------

    /// Known value types
    pub fn value_types(&self) -> &ValueTypeRegistry {
        &self.value_types
    }

    /// Register a value type, failing if the name is taken
    pub fn register_value_type(&mut self, info: ValueTypeInfo) -> Result<()> {
        self.value_types.register(info)
    }

    /// Listen to every graph-wide event
    pub fn subscribe(&mut self, listener: impl FnMut(&GraphEvent) + Send + 'static) -> ListenerId {
        let listener: GraphListener = Box::new(listener);
        self.events.subscribe(listener)
    }

    /// Listen to the events of one block
    pub fn subscribe_block(
        &mut self,
        block: BlockId,
        listener: impl FnMut(&BlockEvent) + Send + 'static,
    ) -> ListenerId {
        let listener: BlockListener = Box::new(listener);
        self.events.subscribe_block(block, listener)
    }

    /// Listen to the events of one point
    pub fn subscribe_point(
        &mut self,
        point: PointId,
        listener: impl FnMut(&PointEvent) + Send + 'static,
    ) -> ListenerId {
        let listener: PointListener = Box::new(listener);
        self.events.subscribe_point(point, listener)
    }

    /// Listen to the events of one variable
    pub fn subscribe_variable(
        &mut self,
        variable: impl Into<String>,
        listener: impl FnMut(&VariableEvent) + Send + 'static,
    ) -> ListenerId {
        let listener: VariableListener = Box::new(listener);
        self.events.subscribe_variable(variable, listener)
    }

    /// Remove a listener
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Attach a block.
    ///
    /// Assigns an ID when the block has none, validates its templates, then
    /// adds its declared points and runs the `added` and `validate_points`
    /// hooks. If any of those fail the block is removed again.
    pub fn add_block(&mut self, mut block: Block) -> Result<BlockId> {
        let id = block.id.clone().unwrap_or_default();
        if self.blocks.contains_key(&id) {
            return Err(GraphError::BlockRedefinition(id));
        }
        for (name, template) in &block.templates {
            self.value_types.require(&template.value_type)?;
            if !template.allows(&template.value_type) {
                return Err(GraphError::TemplateTypeNotAllowed {
                    template: name.clone(),
                    value_type: template.value_type.clone(),
                });
            }
        }

        let declared = std::mem::take(&mut block.declared);
        let behavior = Arc::clone(&block.behavior);
        block.id = Some(id.clone());
        block.inputs.clear();
        block.outputs.clear();
        self.blocks.insert(id.clone(), block);
        tracing::debug!("Added block {} ({})", id, behavior.type_name());
        self.events.emit_block(&id, &BlockEvent::Add);
        self.events.emit(&GraphEvent::BlockAdd { block: id.clone() });

        if let Err(err) = self.attach_block(&id, declared, behavior.as_ref()) {
            tracing::debug!("Block {} rejected on attach: {}", id, err);
            if let Err(cleanup) = self.remove_block(&id) {
                tracing::warn!("Failed to undo block {}: {}", id, cleanup);
            }
            return Err(err);
        }
        Ok(id)
    }

    fn attach_block(
        &mut self,
        id: &BlockId,
        declared: Vec<Point>,
        behavior: &dyn BlockBehavior,
    ) -> Result<()> {
        for point in declared {
            self.add_point(id, point, None)?;
        }
        behavior.added(self, id)?;
        behavior.validate_points(self, id)
    }

    /// Detach a block, removing all of its points (and their connections) first
    pub fn remove_block(&mut self, id: &BlockId) -> Result<Block> {
        let behavior = Arc::clone(&self.require_block(id)?.behavior);
        self.remove_points(id)?;
        behavior.removed(self, id);
        let block = self
            .blocks
            .shift_remove(id)
            .ok_or_else(|| GraphError::BlockNotFound(id.clone()))?;
        tracing::debug!("Removed block {}", id);
        self.events.emit_block(id, &BlockEvent::Remove);
        self.events.emit(&GraphEvent::BlockRemove { block: id.clone() });
        Ok(block)
    }

    /// Get a block by ID
    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub(crate) fn require_block(&self, id: &BlockId) -> Result<&Block> {
        self.blocks
            .get(id)
            .ok_or_else(|| GraphError::BlockNotFound(id.clone()))
    }

    /// Get all blocks
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    /// Get all block IDs
    pub fn block_ids(&self) -> impl Iterator<Item = &BlockId> {
        self.blocks.keys()
    }

    /// Get the number of blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Templates of a block with their current types
    pub fn block_templates(&self, id: &BlockId) -> Result<&IndexMap<String, Template>> {
        Ok(self.require_block(id)?.templates())
    }

    // ------------------------------------------------------------------
    // Points
    // ------------------------------------------------------------------

    /// Get a bound point by ID
    pub fn point(&self, id: PointId) -> Option<&Point> {
        let owner = self.point_owners.get(&id)?;
        self.blocks.get(owner)?.point(id)
    }

    pub(crate) fn require_point(&self, id: PointId) -> Result<&Point> {
        self.point(id).ok_or(GraphError::PointNotFound(id))
    }

    pub(crate) fn point_mut(&mut self, id: PointId) -> Result<&mut Point> {
        let owner = self.point_owners.get(&id).ok_or(GraphError::PointNotFound(id))?;
        self.blocks
            .get_mut(owner)
            .and_then(|block| block.point_mut(id))
            .ok_or(GraphError::PointNotFound(id))
    }

    /// Owning block of a bound point
    pub fn point_owner(&self, id: PointId) -> Option<&BlockId> {
        self.point_owners.get(&id)
    }

    pub(crate) fn owner_behavior(&self, id: PointId) -> Result<(BlockId, Arc<dyn BlockBehavior>)> {
        let owner = self.point_owners.get(&id).ok_or(GraphError::PointNotFound(id))?;
        let block = self.require_block(owner)?;
        Ok((owner.clone(), Arc::clone(&block.behavior)))
    }

    /// Find a point of a block by direction and name
    pub fn point_by_name(
        &self,
        block: &BlockId,
        direction: PointDirection,
        name: &str,
    ) -> Option<PointId> {
        self.blocks
            .get(block)?
            .points_in(direction)
            .iter()
            .find(|p| p.name == name)
            .map(Point::id)
    }

    /// Bind a point to a block.
    ///
    /// The point is inserted at `position` within its own direction's list
    /// (at the end when `None`). Its type is resolved from its template or
    /// its own declaration, and its initial value is validated as
    /// [`Self::change_point_value`] would. On failure nothing is left bound.
    pub fn add_point(
        &mut self,
        block_id: &BlockId,
        mut point: Point,
        position: Option<usize>,
    ) -> Result<PointId> {
        let block = self.require_block(block_id)?;
        let direction = point.direction;
        if self.point_owners.contains_key(&point.id)
            || block.points_in(direction).iter().any(|p| p.name == point.name)
        {
            return Err(GraphError::PointRedefinition {
                block: block_id.clone(),
                direction,
                name: point.name,
            });
        }

        let value_type = match &point.template {
            Some(template) => block
                .template(template)
                .map(|t| t.value_type.clone())
                .ok_or_else(|| GraphError::TemplateNotFound {
                    block: block_id.clone(),
                    template: template.clone(),
                })?,
            None => point.value_type.clone().ok_or_else(|| GraphError::InvalidPoint {
                name: point.name.clone(),
                reason: "no value type".to_string(),
            })?,
        };
        self.value_types.require(&value_type)?;

        let len = block.points_in(direction).len();
        let position = position.unwrap_or(len);
        if position > len {
            return Err(GraphError::InvalidPosition { position, len });
        }

        PointPolicy::from_bits(point.policy.bits())?;
        if !point.value.is_null() && !point.policy.has(PointPolicy::VALUE) {
            return Err(GraphError::ValueNotAllowed(point.id));
        }
        let value = self.value_types.convert_value(&value_type, &point.value)?;

        let point_id = point.id;
        point.value_type = Some(value_type);
        point.value = value;
        point.block = Some(block_id.clone());
        point.connections.clear();

        let behavior = match self.blocks.get_mut(block_id) {
            Some(block) => {
                block.points_in_mut(direction).insert(position, point);
                Arc::clone(&block.behavior)
            }
            None => return Err(GraphError::BlockNotFound(block_id.clone())),
        };
        self.point_owners.insert(point_id, block_id.clone());

        if let Err(err) = behavior.point_added(self, block_id, point_id) {
            tracing::debug!("Point {:?} rejected by block {}: {}", point_id, block_id, err);
            if let Err(cleanup) = self.unbind_point(block_id, point_id) {
                tracing::warn!("Failed to undo point {:?}: {}", point_id, cleanup);
            }
            return Err(err);
        }

        self.events
            .emit_block(block_id, &BlockEvent::PointAdd { point: point_id });
        self.events.emit(&GraphEvent::BlockPointAdd {
            block: block_id.clone(),
            point: point_id,
        });
        Ok(point_id)
    }

    /// Unbind a point, disconnecting it first
    pub fn remove_point(&mut self, point_id: PointId) -> Result<Point> {
        let (block_id, behavior) = self.owner_behavior(point_id)?;
        self.disconnect_all(point_id)?;
        behavior.point_removed(self, &block_id, point_id);
        let point = self.unbind_point(&block_id, point_id)?;
        tracing::debug!("Removed point {} from block {}", point.name, block_id);
        self.events
            .emit_block(&block_id, &BlockEvent::PointRemove { point: point_id });
        self.events.emit(&GraphEvent::BlockPointRemove {
            block: block_id,
            point: point_id,
        });
        Ok(point)
    }

    /// Remove every point of a block: outputs then inputs, last added first
    pub fn remove_points(&mut self, block_id: &BlockId) -> Result<()> {
        let block = self.require_block(block_id)?;
        let ids: Vec<PointId> = block
            .outputs
            .iter()
            .rev()
            .chain(block.inputs.iter().rev())
            .map(Point::id)
            .collect();
        for id in ids {
            self.remove_point(id)?;
        }
        Ok(())
    }

    // Disconnects without running hooks or emitting point-remove events.
    fn unbind_point(&mut self, block_id: &BlockId, point_id: PointId) -> Result<Point> {
        self.disconnect_all(point_id)?;
        let block = self
            .blocks
            .get_mut(block_id)
            .ok_or_else(|| GraphError::BlockNotFound(block_id.clone()))?;
        let direction = if block.outputs.iter().any(|p| p.id == point_id) {
            PointDirection::Output
        } else {
            PointDirection::Input
        };
        let points = block.points_in_mut(direction);
        let index = points
            .iter()
            .position(|p| p.id == point_id)
            .ok_or(GraphError::PointNotFound(point_id))?;
        let mut point = points.remove(index);
        point.block = None;
        self.point_owners.remove(&point_id);
        Ok(point)
    }

    // ------------------------------------------------------------------
    // Values and types
    // ------------------------------------------------------------------

    /// Assign a literal value to a point.
    ///
    /// The point must have no connections, and a non-null value requires the
    /// `VALUE` policy bit. The value is converted into the point's type;
    /// a failed conversion leaves the point untouched.
    pub fn change_point_value(&mut self, point_id: PointId, value: Value, silent: bool) -> Result<()> {
        let point = self.require_point(point_id)?;
        if point.has_connections() {
            return Err(GraphError::PointHasConnections(point_id));
        }
        if !value.is_null() && !point.policy.has(PointPolicy::VALUE) {
            return Err(GraphError::ValueNotAllowed(point_id));
        }
        let value_type = point.value_type.as_deref().unwrap_or_default();
        let value = self.value_types.convert_value(value_type, &value)?;

        let old_value = std::mem::replace(&mut self.point_mut(point_id)?.value, value.clone());
        if silent {
            return Ok(());
        }
        self.events.emit_point(
            point_id,
            &PointEvent::ValueChange {
                new_value: value.clone(),
                old_value: old_value.clone(),
            },
        );
        self.events.emit(&GraphEvent::PointValueChange {
            point: point_id,
            new_value: value.clone(),
            old_value: old_value.clone(),
        });
        let (_, behavior) = self.owner_behavior(point_id)?;
        behavior.point_value_changed(self, point_id, &value, &old_value);
        Ok(())
    }

    /// Retype a point.
    ///
    /// The current value must convert into the new type, otherwise nothing
    /// changes. The value is then re-applied so it is stored in the new
    /// type's representation. A point typed by a template only accepts the
    /// template's current type; use [`Self::change_template`] to retype it.
    pub fn change_point_value_type(
        &mut self,
        point_id: PointId,
        value_type: &str,
        silent: bool,
    ) -> Result<()> {
        let point = self.require_point(point_id)?;
        if let Some(template) = point.template() {
            let recorded = self
                .point_owners
                .get(&point_id)
                .and_then(|owner| self.blocks.get(owner))
                .and_then(|block| block.template(template))
                .map(|t| t.value_type.as_str());
            if recorded != Some(value_type) {
                return Err(GraphError::TemplateTypeNotAllowed {
                    template: template.to_string(),
                    value_type: value_type.to_string(),
                });
            }
        }
        self.retype_point(point_id, value_type, silent)
    }

    // Retype without consulting the point's template.
    fn retype_point(&mut self, point_id: PointId, value_type: &str, silent: bool) -> Result<()> {
        let point = self.require_point(point_id)?;
        self.value_types.require(value_type)?;
        let value = point.value.clone();
        self.value_types.convert_value(value_type, &value)?;

        let old_type = self
            .point_mut(point_id)?
            .value_type
            .replace(value_type.to_string());
        if !silent {
            self.events.emit_point(
                point_id,
                &PointEvent::ValueTypeChange {
                    new_type: value_type.to_string(),
                    old_type: old_type.clone(),
                },
            );
            self.events.emit(&GraphEvent::PointValueTypeChange {
                point: point_id,
                new_type: value_type.to_string(),
                old_type,
            });
        }
        if value.is_null() {
            return Ok(());
        }
        self.change_point_value(point_id, value, silent)
    }

    // ------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------

    /// Retype a block template and every point referencing it, all or nothing.
    ///
    /// Points are retyped outputs first, then inputs. If one of them fails,
    /// the points already retyped are restored to their previous type and
    /// value, the template keeps its previous type and the error is returned.
    pub fn change_template(
        &mut self,
        block_id: &BlockId,
        template: &str,
        value_type: &str,
        silent: bool,
    ) -> Result<()> {
        let block = self.require_block(block_id)?;
        self.value_types.require(value_type)?;
        let current = block
            .template(template)
            .ok_or_else(|| GraphError::TemplateNotFound {
                block: block_id.clone(),
                template: template.to_string(),
            })?;
        if !current.allows(value_type) {
            return Err(GraphError::TemplateTypeNotAllowed {
                template: template.to_string(),
                value_type: value_type.to_string(),
            });
        }
        if current.value_type == value_type {
            return Ok(());
        }
        let old_type = current.value_type.clone();

        let snapshot: Vec<(PointId, Option<String>, Value)> = block
            .template_points(template)
            .map(|p| (p.id, p.value_type.clone(), p.value.clone()))
            .collect();

        for (index, (point_id, _, _)) in snapshot.iter().enumerate() {
            if let Err(err) = self.retype_point(*point_id, value_type, silent) {
                tracing::debug!(
                    "Template {} of block {} cannot become {}: {}",
                    template,
                    block_id,
                    value_type,
                    err
                );
                for (point_id, old_type, old_value) in &snapshot[..index] {
                    self.restore_point(*point_id, old_type.as_deref(), old_value);
                }
                return Err(err);
            }
        }

        if let Some(current) = self
            .blocks
            .get_mut(block_id)
            .and_then(|block| block.templates.get_mut(template))
        {
            current.value_type = value_type.to_string();
        }
        tracing::debug!("Template {} of block {} is now {}", template, block_id, value_type);
        if !silent {
            self.events.emit_block(
                block_id,
                &BlockEvent::TemplateUpdate {
                    template: template.to_string(),
                    new_type: value_type.to_string(),
                    old_type: old_type.clone(),
                },
            );
            self.events.emit(&GraphEvent::BlockTemplateUpdate {
                block: block_id.clone(),
                template: template.to_string(),
                new_type: value_type.to_string(),
                old_type,
            });
        }
        Ok(())
    }

    // The type goes back before the value: an old value is only guaranteed
    // to convert under the old type.
    fn restore_point(&mut self, point_id: PointId, value_type: Option<&str>, value: &Value) {
        match self.point_mut(point_id) {
            Ok(point) => point.value = Value::Null,
            Err(err) => {
                tracing::warn!("Cannot restore point {:?}: {}", point_id, err);
                return;
            }
        }
        if let Some(value_type) = value_type {
            if let Err(err) = self.retype_point(point_id, value_type, true) {
                tracing::warn!("Cannot restore type of point {:?}: {}", point_id, err);
            }
        }
        if !value.is_null() {
            if let Err(err) = self.change_point_value(point_id, value.clone(), true) {
                tracing::warn!("Cannot restore value of point {:?}: {}", point_id, err);
            }
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}
