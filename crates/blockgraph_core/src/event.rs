// SPDX-License-Identifier: MIT OR Apache-2.0
//! Change notifications.
//!
//! Every mutation of the graph is reported twice: once on the affected
//! instance (block, point or variable) for listeners holding only that
//! reference, then once on the graph-wide bus. Listeners run in-line, after
//! the state they describe is committed, in subscription order.

use crate::block::BlockId;
use crate::connection::ConnectionId;
use crate::point::PointId;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Event emitted on the graph-wide bus
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// A block was attached
    BlockAdd {
        /// Attached block
        block: BlockId,
    },
    /// A block was detached
    BlockRemove {
        /// Detached block
        block: BlockId,
    },
    /// A point was bound to a block
    BlockPointAdd {
        /// Owning block
        block: BlockId,
        /// Bound point
        point: PointId,
    },
    /// A point was unbound from a block
    BlockPointRemove {
        /// Former owning block
        block: BlockId,
        /// Unbound point
        point: PointId,
    },
    /// A block template was retyped
    BlockTemplateUpdate {
        /// Owning block
        block: BlockId,
        /// Template name
        template: String,
        /// Type after the change
        new_type: String,
        /// Type before the change
        old_type: String,
    },
    /// A point value changed
    PointValueChange {
        /// Changed point
        point: PointId,
        /// Value after the change
        new_value: Value,
        /// Value before the change
        old_value: Value,
    },
    /// A point was retyped
    PointValueTypeChange {
        /// Changed point
        point: PointId,
        /// Type after the change
        new_type: String,
        /// Type before the change
        old_type: Option<String>,
    },
    /// A point got a connection; emitted once per endpoint
    PointConnect {
        /// Endpoint
        point: PointId,
        /// New connection
        connection: ConnectionId,
    },
    /// A point lost a connection; emitted once per endpoint
    PointDisconnect {
        /// Endpoint
        point: PointId,
        /// Removed connection
        connection: ConnectionId,
    },
    /// A variable was added
    VariableAdd {
        /// Variable name
        variable: String,
    },
    /// A variable was removed
    VariableRemove {
        /// Variable name
        variable: String,
    },
    /// A variable value changed
    VariableValueChange {
        /// Variable name
        variable: String,
        /// Value after the change
        new_value: Value,
        /// Value before the change
        old_value: Value,
    },
    /// A variable was retyped
    VariableValueTypeChange {
        /// Variable name
        variable: String,
        /// Type after the change
        new_type: String,
        /// Type before the change
        old_type: String,
    },
}

impl GraphEvent {
    /// Wire label of the event, e.g. `"point-connect"`
    pub fn label(&self) -> &'static str {
        match self {
            Self::BlockAdd { .. } => "block-add",
            Self::BlockRemove { .. } => "block-remove",
            Self::BlockPointAdd { .. } => "block-point-add",
            Self::BlockPointRemove { .. } => "block-point-remove",
            Self::BlockTemplateUpdate { .. } => "block-template-update",
            Self::PointValueChange { .. } => "point-value-change",
            Self::PointValueTypeChange { .. } => "point-value-type-change",
            Self::PointConnect { .. } => "point-connect",
            Self::PointDisconnect { .. } => "point-disconnect",
            Self::VariableAdd { .. } => "variable-add",
            Self::VariableRemove { .. } => "variable-remove",
            Self::VariableValueChange { .. } => "variable-value-change",
            Self::VariableValueTypeChange { .. } => "variable-value-type-change",
        }
    }
}

/// Event emitted on a single block
#[derive(Debug, Clone, PartialEq)]
pub enum BlockEvent {
    /// The block was attached
    Add,
    /// The block was detached
    Remove,
    /// A point was bound
    PointAdd {
        /// Bound point
        point: PointId,
    },
    /// A point was unbound
    PointRemove {
        /// Unbound point
        point: PointId,
    },
    /// A template was retyped
    TemplateUpdate {
        /// Template name
        template: String,
        /// Type after the change
        new_type: String,
        /// Type before the change
        old_type: String,
    },
}

impl BlockEvent {
    /// Wire label of the event
    pub fn label(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::PointAdd { .. } => "point-add",
            Self::PointRemove { .. } => "point-remove",
            Self::TemplateUpdate { .. } => "template-update",
        }
    }
}

/// Event emitted on a single point
#[derive(Debug, Clone, PartialEq)]
pub enum PointEvent {
    /// The value changed
    ValueChange {
        /// Value after the change
        new_value: Value,
        /// Value before the change
        old_value: Value,
    },
    /// The type changed
    ValueTypeChange {
        /// Type after the change
        new_type: String,
        /// Type before the change
        old_type: Option<String>,
    },
    /// A connection was added
    Connect {
        /// New connection
        connection: ConnectionId,
    },
    /// A connection was removed
    Disconnect {
        /// Removed connection
        connection: ConnectionId,
    },
}

impl PointEvent {
    /// Wire label of the event
    pub fn label(&self) -> &'static str {
        match self {
            Self::ValueChange { .. } => "value-change",
            Self::ValueTypeChange { .. } => "value-type-change",
            Self::Connect { .. } => "connect",
            Self::Disconnect { .. } => "disconnect",
        }
    }
}

/// Event emitted on a single variable
#[derive(Debug, Clone, PartialEq)]
pub enum VariableEvent {
    /// The value changed
    ValueChange {
        /// Value after the change
        new_value: Value,
        /// Value before the change
        old_value: Value,
    },
    /// The type changed
    ValueTypeChange {
        /// Type after the change
        new_type: String,
        /// Type before the change
        old_type: String,
    },
    /// The variable was removed from the graph
    Remove,
}

impl VariableEvent {
    /// Wire label of the event
    pub fn label(&self) -> &'static str {
        match self {
            Self::ValueChange { .. } => "value-change",
            Self::ValueTypeChange { .. } => "value-type-change",
            Self::Remove => "remove",
        }
    }
}

/// Handle returned by every `subscribe` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Graph-wide listener
pub type GraphListener = Box<dyn FnMut(&GraphEvent) + Send>;
/// Block listener
pub type BlockListener = Box<dyn FnMut(&BlockEvent) + Send>;
/// Point listener
pub type PointListener = Box<dyn FnMut(&PointEvent) + Send>;
/// Variable listener
pub type VariableListener = Box<dyn FnMut(&VariableEvent) + Send>;

/// Ordered subscriber lists of a graph
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    graph: Vec<(ListenerId, GraphListener)>,
    blocks: HashMap<BlockId, Vec<(ListenerId, BlockListener)>>,
    points: HashMap<PointId, Vec<(ListenerId, PointListener)>>,
    variables: HashMap<String, Vec<(ListenerId, VariableListener)>>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }

    /// Listen to every graph-wide event
    pub fn subscribe(&mut self, listener: GraphListener) -> ListenerId {
        let id = self.next_id();
        self.graph.push((id, listener));
        id
    }

    /// Listen to the events of one block
    pub fn subscribe_block(&mut self, block: BlockId, listener: BlockListener) -> ListenerId {
        let id = self.next_id();
        self.blocks.entry(block).or_default().push((id, listener));
        id
    }

    /// Listen to the events of one point
    pub fn subscribe_point(&mut self, point: PointId, listener: PointListener) -> ListenerId {
        let id = self.next_id();
        self.points.entry(point).or_default().push((id, listener));
        id
    }

    /// Listen to the events of one variable
    pub fn subscribe_variable(
        &mut self,
        variable: impl Into<String>,
        listener: VariableListener,
    ) -> ListenerId {
        let id = self.next_id();
        self.variables.entry(variable.into()).or_default().push((id, listener));
        id
    }

    /// Remove a listener, returning whether it was found
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        fn remove<L>(list: &mut Vec<(ListenerId, L)>, id: ListenerId) -> bool {
            let before = list.len();
            list.retain(|(listener_id, _)| *listener_id != id);
            list.len() != before
        }

        remove(&mut self.graph, id)
            || self.blocks.values_mut().any(|list| remove(list, id))
            || self.points.values_mut().any(|list| remove(list, id))
            || self.variables.values_mut().any(|list| remove(list, id))
    }

    /// Notify graph-wide listeners
    pub fn emit(&mut self, event: &GraphEvent) {
        tracing::trace!("Graph event {}", event.label());
        for (_, listener) in &mut self.graph {
            listener(event);
        }
    }

    /// Notify the listeners of a block
    pub fn emit_block(&mut self, block: &BlockId, event: &BlockEvent) {
        if let Some(listeners) = self.blocks.get_mut(block) {
            for (_, listener) in listeners {
                listener(event);
            }
        }
    }

    /// Notify the listeners of a point
    pub fn emit_point(&mut self, point: PointId, event: &PointEvent) {
        if let Some(listeners) = self.points.get_mut(&point) {
            for (_, listener) in listeners {
                listener(event);
            }
        }
    }

    /// Notify the listeners of a variable
    pub fn emit_variable(&mut self, variable: &str, event: &VariableEvent) {
        if let Some(listeners) = self.variables.get_mut(variable) {
            for (_, listener) in listeners {
                listener(event);
            }
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.graph.len()
            + self.blocks.values().map(Vec::len).sum::<usize>()
            + self.points.values().map(Vec::len).sum::<usize>()
            + self.variables.values().map(Vec::len).sum::<usize>()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_emit_in_subscription_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        for tag in ["first", "second"] {
            let log = Arc::clone(&log);
            bus.subscribe(Box::new(move |event| {
                log.lock().push(format!("{tag}:{}", event.label()));
            }));
        }

        bus.emit(&GraphEvent::BlockAdd { block: BlockId::from("b") });
        assert_eq!(*log.lock(), vec!["first:block-add", "second:block-add"]);
    }

    #[test]
    fn test_instance_listeners_are_scoped() {
        let hits = Arc::new(Mutex::new(0));
        let mut bus = EventBus::new();
        let point = PointId::new();
        let counter = Arc::clone(&hits);
        bus.subscribe_point(point, Box::new(move |_| *counter.lock() += 1));

        let event = PointEvent::Connect { connection: ConnectionId::new() };
        bus.emit_point(point, &event);
        bus.emit_point(PointId::new(), &event);
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = EventBus::new();
        let id = bus.subscribe_variable("speed", Box::new(|_| {}));
        assert_eq!(bus.listener_count(), 1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.listener_count(), 0);
    }
}
