// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed block graph core.
//!
//! This crate provides the data model behind visual programming tools:
//! - Blocks owning named input/output points
//! - Directed connections validated against value types and point policies
//! - Templates that retype groups of points at once
//! - Graph variables mirrored by variable blocks
//!
//! ## Architecture
//!
//! The framework is built on a single [`Graph`] aggregate with:
//! - A value-type registry with conversion and compatibility rules
//! - Block behaviors hooked into every structural change
//! - Ordered change notifications for graphs, blocks, points and variables
//! - RON configuration for graph-level settings

pub mod block;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod graph;
pub mod point;
pub mod policy;
pub mod shared;
pub mod value_type;
pub mod variable;

pub use block::{BasicBlock, Block, BlockBehavior, BlockData, BlockId, Template};
pub use config::{GraphConfig, ValueTypeConfig};
pub use connection::{Connection, ConnectionId};
pub use error::{ErrorKind, GraphError, Result};
pub use event::{BlockEvent, EventBus, GraphEvent, ListenerId, PointEvent, VariableEvent};
pub use graph::Graph;
pub use point::{Point, PointData, PointDirection, PointId};
pub use policy::PointPolicy;
pub use shared::SharedGraph;
pub use value_type::{ValueTypeInfo, ValueTypeRegistry};
pub use variable::{Variable, VariableBlock, VariableData, VARIABLE_POINT};
