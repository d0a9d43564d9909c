// SPDX-License-Identifier: MIT OR Apache-2.0
//! Block (node) definitions for the graph.

use crate::connection::Connection;
use crate::error::Result;
use crate::graph::Graph;
use crate::point::{Point, PointDirection, PointId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for a block
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub String);

impl BlockId {
    /// Create a new random block ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BlockId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A named type parameter shared by several points of a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Current type of every point referencing the template
    pub value_type: String,
    /// Types the template may take
    #[serde(rename = "templates")]
    pub allowed_types: Vec<String>,
}

impl Template {
    /// Create a template
    pub fn new<I, S>(value_type: impl Into<String>, allowed_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            value_type: value_type.into(),
            allowed_types: allowed_types.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the template may take `value_type`
    pub fn allows(&self, value_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == value_type)
    }
}

/// Construction payload of a block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockData {
    /// Block ID, assigned by the graph when absent
    pub id: Option<String>,
    /// Display name, the behavior's type name when absent
    pub name: Option<String>,
    /// Declared templates
    pub templates: IndexMap<String, Template>,
}

/// Lifecycle hooks of a block kind.
///
/// Every hook defaults to a no-op. Hooks returning a `Result` can abort the
/// operation that triggered them; the graph then undoes that operation.
pub trait BlockBehavior: Send + Sync {
    /// Concrete kind name, used as the default block name
    fn type_name(&self) -> &str {
        "Block"
    }

    /// The block was attached to the graph and its declared points added
    fn added(&self, _graph: &mut Graph, _block: &BlockId) -> Result<()> {
        Ok(())
    }

    /// The block is being detached; its points are already removed
    fn removed(&self, _graph: &mut Graph, _block: &BlockId) {}

    /// A point was bound to the block
    fn point_added(&self, _graph: &mut Graph, _block: &BlockId, _point: PointId) -> Result<()> {
        Ok(())
    }

    /// A point is about to be unbound; its connections are already removed
    fn point_removed(&self, _graph: &mut Graph, _block: &BlockId, _point: PointId) {}

    /// A point's value changed
    fn point_value_changed(&self, _graph: &mut Graph, _point: PointId, _new: &Value, _old: &Value) {}

    /// A point of the block got a connection
    fn point_connected(&self, _graph: &mut Graph, _point: PointId, _connection: &Connection) {}

    /// A point of the block lost a connection
    fn point_disconnected(&self, _graph: &mut Graph, _point: PointId, _connection: &Connection) {}

    /// Veto a connection between `point` (owned by this block) and `other`
    fn accept_connect(
        &self,
        _graph: &Graph,
        _point: PointId,
        _other: PointId,
    ) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Check the block's point layout once it is attached
    fn validate_points(&self, _graph: &Graph, _block: &BlockId) -> Result<()> {
        Ok(())
    }
}

/// Behavior of a block without custom hooks
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicBlock;

impl BlockBehavior for BasicBlock {}

/// A block instance
#[derive(Clone)]
pub struct Block {
    pub(crate) id: Option<BlockId>,
    pub(crate) name: String,
    pub(crate) inputs: Vec<Point>,
    pub(crate) outputs: Vec<Point>,
    pub(crate) templates: IndexMap<String, Template>,
    pub(crate) behavior: Arc<dyn BlockBehavior>,
    /// Points added right after the block is attached
    pub(crate) declared: Vec<Point>,
}

impl Block {
    /// Create a block without custom hooks
    pub fn new() -> Self {
        Self::with_behavior(BasicBlock)
    }

    /// Create a block of a custom kind
    pub fn with_behavior(behavior: impl BlockBehavior + 'static) -> Self {
        Self::from_behavior(Arc::new(behavior))
    }

    fn from_behavior(behavior: Arc<dyn BlockBehavior>) -> Self {
        Self {
            id: None,
            name: behavior.type_name().to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            templates: IndexMap::new(),
            behavior,
            declared: Vec::new(),
        }
    }

    /// Create a block from its construction payload
    pub fn from_data(data: BlockData, behavior: Arc<dyn BlockBehavior>) -> Self {
        let mut block = Self::from_behavior(behavior);
        block.id = data.id.map(BlockId);
        if let Some(name) = data.name {
            block.name = name;
        }
        block.templates = data.templates;
        block
    }

    /// Set the ID
    pub fn with_id(mut self, id: impl Into<BlockId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Declare a template
    pub fn with_template(mut self, name: impl Into<String>, template: Template) -> Self {
        self.templates.insert(name.into(), template);
        self
    }

    /// Declare a point, added once the block is attached
    pub fn with_point(mut self, point: Point) -> Self {
        self.declared.push(point);
        self
    }

    /// Block ID, `None` until attached or explicitly set
    pub fn id(&self) -> Option<&BlockId> {
        self.id.as_ref()
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind name of the block's behavior
    pub fn type_name(&self) -> &str {
        self.behavior.type_name()
    }

    /// Input points
    pub fn inputs(&self) -> &[Point] {
        &self.inputs
    }

    /// Output points
    pub fn outputs(&self) -> &[Point] {
        &self.outputs
    }

    /// Points of one direction
    pub fn points_in(&self, direction: PointDirection) -> &[Point] {
        match direction {
            PointDirection::Input => &self.inputs,
            PointDirection::Output => &self.outputs,
        }
    }

    pub(crate) fn points_in_mut(&mut self, direction: PointDirection) -> &mut Vec<Point> {
        match direction {
            PointDirection::Input => &mut self.inputs,
            PointDirection::Output => &mut self.outputs,
        }
    }

    /// Get an input point by name
    pub fn input(&self, name: &str) -> Option<&Point> {
        self.inputs.iter().find(|p| p.name == name)
    }

    /// Get an output point by name
    pub fn output(&self, name: &str) -> Option<&Point> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// Get a point by ID
    pub fn point(&self, point_id: PointId) -> Option<&Point> {
        self.points().find(|p| p.id == point_id)
    }

    pub(crate) fn point_mut(&mut self, point_id: PointId) -> Option<&mut Point> {
        self.outputs
            .iter_mut()
            .chain(self.inputs.iter_mut())
            .find(|p| p.id == point_id)
    }

    /// All points, outputs first
    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.outputs.iter().chain(self.inputs.iter())
    }

    /// Declared templates
    pub fn templates(&self) -> &IndexMap<String, Template> {
        &self.templates
    }

    /// Get a template by name
    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Points referencing a template, outputs then inputs
    pub fn template_points(&self, template: &str) -> impl Iterator<Item = &Point> + '_ {
        let template = template.to_string();
        self.points()
            .filter(move |p| p.template.as_deref() == Some(template.as_str()))
    }

    /// Block behavior
    pub fn behavior(&self) -> &Arc<dyn BlockBehavior> {
        &self.behavior
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type_name", &self.type_name())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("templates", &self.templates)
            .finish_non_exhaustive()
    }
}
