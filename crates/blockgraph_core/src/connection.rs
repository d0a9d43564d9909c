// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) definitions and the graph's connection operations.

use crate::block::BlockId;
use crate::error::{GraphError, Result};
use crate::event::{GraphEvent, PointEvent};
use crate::graph::Graph;
use crate::point::{PointDirection, PointId};
use crate::policy::PointPolicy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A directed connection from an output point to an input point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    id: ConnectionId,
    output: PointId,
    output_block: BlockId,
    input: PointId,
    input_block: BlockId,
}

impl Connection {
    /// Create a new connection
    pub fn new(output: PointId, output_block: BlockId, input: PointId, input_block: BlockId) -> Self {
        Self {
            id: ConnectionId::new(),
            output,
            output_block,
            input,
            input_block,
        }
    }

    /// Connection ID
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Source point
    pub fn output(&self) -> PointId {
        self.output
    }

    /// Block owning the source point
    pub fn output_block(&self) -> &BlockId {
        &self.output_block
    }

    /// Target point
    pub fn input(&self) -> PointId {
        self.input
    }

    /// Block owning the target point
    pub fn input_block(&self) -> &BlockId {
        &self.input_block
    }

    /// Check if this connection involves a specific block
    pub fn involves_block(&self, block: &BlockId) -> bool {
        self.output_block == *block || self.input_block == *block
    }

    /// Check if this connection involves a specific point
    pub fn involves_point(&self, point: PointId) -> bool {
        self.output == point || self.input == point
    }

    /// The endpoint opposite to `point`
    pub fn other_end(&self, point: PointId) -> Option<PointId> {
        if point == self.output {
            Some(self.input)
        } else if point == self.input {
            Some(self.output)
        } else {
            None
        }
    }
}

// Template change that lets a connection through
struct TemplateRetype {
    block: BlockId,
    template: String,
    value_type: String,
}

impl Graph {
    /// Check whether `output` may be connected to `input`.
    ///
    /// Checks, in order: the input type is registered, the roles are right,
    /// neither endpoint holds a value, both endpoints have room for another
    /// connection, and the types match or convert. Identical types pass
    /// without consulting the blocks; otherwise both blocks may veto.
    pub fn check_connection(&self, output: PointId, input: PointId) -> Result<()> {
        let out = self.require_point(output)?;
        let inp = self.require_point(input)?;

        let input_type = inp.value_type().unwrap_or_default();
        self.value_types.require(input_type)?;

        if !out.is_output() {
            return Err(GraphError::WrongDirection {
                point: output,
                expected: PointDirection::Output,
            });
        }
        if !inp.is_input() {
            return Err(GraphError::WrongDirection {
                point: input,
                expected: PointDirection::Input,
            });
        }

        for point in [out, inp] {
            if point.has_value() {
                return Err(GraphError::PointHasValue(point.id()));
            }
        }
        for point in [out, inp] {
            let policy = point.policy();
            if policy.has(PointPolicy::SINGLE_CONNECTION) && point.has_connections() {
                return Err(GraphError::ConnectionLimit(point.id()));
            }
            if !policy.accepts_connections() {
                return Err(GraphError::ConnectionsNotAllowed(point.id()));
            }
        }

        let output_type = out.value_type().unwrap_or_default();
        if output_type == input_type {
            return Ok(());
        }
        for point in [out, inp] {
            if !point.policy().has(PointPolicy::CONVERSION) {
                return Err(GraphError::ConversionNotAllowed(point.id()));
            }
        }
        if !self.value_types.is_compatible(output_type, input_type) {
            return Err(GraphError::IncompatibleTypes {
                output_type: output_type.to_string(),
                input_type: input_type.to_string(),
            });
        }
        self.check_acceptance(output, input, None)
    }

    // Asks the output's block, then the input's block.
    fn check_acceptance(
        &self,
        output: PointId,
        input: PointId,
        previous: Option<GraphError>,
    ) -> Result<()> {
        for (point, other) in [(output, input), (input, output)] {
            let (block, behavior) = self.owner_behavior(point)?;
            if let Err(reason) = behavior.accept_connect(self, point, other) {
                return Err(GraphError::Vetoed {
                    block,
                    reason,
                    previous: previous.map(Box::new),
                });
            }
        }
        Ok(())
    }

    /// Connect an output point to an input point.
    ///
    /// When the pair fails only on its types and one endpoint is typed by a
    /// template, the output block's template is retyped to the input's type,
    /// or failing that the input block's template to the output's type. The
    /// blocks get a last chance to refuse the connection before any retype
    /// or registration, so a failed call leaves the graph untouched.
    pub fn connect(&mut self, output: PointId, input: PointId) -> Result<ConnectionId> {
        let out = self.require_point(output)?;
        let inp = self.require_point(input)?;
        if output == input {
            return Err(GraphError::SelfConnection(output));
        }
        if !out.is_output() {
            return Err(GraphError::WrongDirection {
                point: output,
                expected: PointDirection::Output,
            });
        }
        if !inp.is_input() {
            return Err(GraphError::WrongDirection {
                point: input,
                expected: PointDirection::Input,
            });
        }
        let templated = out.template().is_some() || inp.template().is_some();

        let mut recovered = None;
        let mut retype = None;
        if let Err(err) = self.check_connection(output, input) {
            let type_failure = matches!(
                err,
                GraphError::IncompatibleTypes { .. } | GraphError::ConversionNotAllowed(_)
            );
            if !type_failure || !templated {
                return Err(err);
            }
            match self.plan_template_retype(output, input) {
                Some(plan) => retype = Some(plan),
                None => return Err(err),
            }
            recovered = Some(err);
        }

        if self.connection_between(output, input).is_some() {
            return Err(GraphError::DuplicateConnection { output, input });
        }

        let (output_block, output_behavior) = self.owner_behavior(output)?;
        let (input_block, input_behavior) = self.owner_behavior(input)?;
        let connection = Connection::new(output, output_block, input, input_block);
        self.check_acceptance(output, input, recovered)?;

        if let Some(retype) = retype {
            self.change_template(&retype.block, &retype.template, &retype.value_type, false)?;
        }

        let id = connection.id;
        self.connections.insert(id, connection.clone());
        self.point_mut(output)?.connections.insert(id);
        self.point_mut(input)?.connections.insert(id);
        tracing::debug!("Connected {:?} -> {:?}", output, input);

        output_behavior.point_connected(self, output, &connection);
        input_behavior.point_connected(self, input, &connection);
        for point in [output, input] {
            self.events
                .emit_point(point, &PointEvent::Connect { connection: id });
            self.events.emit(&GraphEvent::PointConnect {
                point,
                connection: id,
            });
        }
        Ok(id)
    }

    // Finds the template retype that makes the pair connectable without
    // touching the graph. Only called after a type failure, so values and
    // cardinality already passed. After the retype both endpoints carry the
    // same type, which always connects.
    fn plan_template_retype(&self, output: PointId, input: PointId) -> Option<TemplateRetype> {
        [(output, input), (input, output)]
            .into_iter()
            .find_map(|(templated, other)| {
                let template = self.point(templated)?.template()?;
                let value_type = self.point(other)?.value_type()?;
                let block_id = self.point_owner(templated)?;
                let block = self.block(block_id)?;
                if !block.template(template)?.allows(value_type) {
                    return None;
                }
                let convertible = block
                    .template_points(template)
                    .all(|p| self.value_types.can_convert(value_type, p.value()));
                if !convertible {
                    tracing::debug!(
                        "Template {} of block {} cannot become {}",
                        template,
                        block_id,
                        value_type
                    );
                    return None;
                }
                Some(TemplateRetype {
                    block: block_id.clone(),
                    template: template.to_string(),
                    value_type: value_type.to_string(),
                })
            })
    }

    /// Remove the connection from `output` to `input`
    pub fn disconnect(&mut self, output: PointId, input: PointId) -> Result<Connection> {
        self.require_point(output)?;
        self.require_point(input)?;
        let id = self
            .connection_between(output, input)
            .ok_or(GraphError::ConnectionNotFound { output, input })?;
        let connection = self
            .connections
            .shift_remove(&id)
            .ok_or(GraphError::ConnectionNotFound { output, input })?;
        self.point_mut(output)?.connections.shift_remove(&id);
        self.point_mut(input)?.connections.shift_remove(&id);
        tracing::debug!("Disconnected {:?} -> {:?}", output, input);

        let (_, output_behavior) = self.owner_behavior(output)?;
        let (_, input_behavior) = self.owner_behavior(input)?;
        output_behavior.point_disconnected(self, output, &connection);
        input_behavior.point_disconnected(self, input, &connection);
        for point in [output, input] {
            self.events
                .emit_point(point, &PointEvent::Disconnect { connection: id });
            self.events.emit(&GraphEvent::PointDisconnect {
                point,
                connection: id,
            });
        }
        Ok(connection)
    }

    /// Connect two points in whichever order they are given
    pub fn connect_points(&mut self, a: PointId, b: PointId) -> Result<ConnectionId> {
        let (output, input) = self.orient(a, b)?;
        self.connect(output, input)
    }

    /// Disconnect two points in whichever order they are given
    pub fn disconnect_points(&mut self, a: PointId, b: PointId) -> Result<Connection> {
        let (output, input) = self.orient(a, b)?;
        self.disconnect(output, input)
    }

    fn orient(&self, a: PointId, b: PointId) -> Result<(PointId, PointId)> {
        if self.require_point(a)?.is_output() {
            Ok((a, b))
        } else {
            Ok((b, a))
        }
    }

    /// Remove every connection of a point, most recent first
    pub fn disconnect_all(&mut self, point: PointId) -> Result<()> {
        let pairs: Vec<(PointId, PointId)> = self
            .connections_of(point)
            .map(|c| (c.output, c.input))
            .collect();
        for (output, input) in pairs.into_iter().rev() {
            self.disconnect(output, input)?;
        }
        Ok(())
    }

    /// Get a connection by ID
    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Get all connections
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Get the number of connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Connections of a point in creation order
    pub fn connections_of(&self, point: PointId) -> impl Iterator<Item = &Connection> {
        self.point(point)
            .into_iter()
            .flat_map(|p| p.connections.iter())
            .filter_map(move |id| self.connections.get(id))
    }

    /// Connections touching a block
    pub fn connections_for_block<'a>(&'a self, block: &'a BlockId) -> impl Iterator<Item = &'a Connection> {
        self.connections.values().filter(move |c| c.involves_block(block))
    }

    /// The connection from `output` to `input`, if any
    pub fn connection_between(&self, output: PointId, input: PointId) -> Option<ConnectionId> {
        self.connections_of(output)
            .find(|c| c.output == output && c.input == input)
            .map(Connection::id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockBehavior, Template};
    use crate::error::ErrorKind;
    use crate::point::Point;
    use crate::value_type::builtin;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn pair(graph: &mut Graph, output_type: &str, input_type: &str) -> (PointId, PointId) {
        let source = graph.add_block(Block::new()).unwrap();
        let sink = graph.add_block(Block::new()).unwrap();
        let output = graph.add_point(&source, Point::output("out", output_type), None).unwrap();
        let input = graph.add_point(&sink, Point::input("in", input_type), None).unwrap();
        (output, input)
    }

    fn assert_counts_consistent(graph: &Graph) {
        let local: usize = graph
            .blocks()
            .flat_map(Block::points)
            .map(Point::connection_count)
            .sum();
        assert_eq!(local, graph.connection_count() * 2);
    }

    #[test]
    fn test_compatible_pairs_connect_and_disconnect() {
        let mut graph = Graph::default();
        let pairs: Vec<(String, String)> = builtin::NAMES
            .iter()
            .flat_map(|target| {
                let info = graph.value_types().get(target).unwrap();
                info.compatible_from()
                    .iter()
                    .map(|source| (source.clone(), target.to_string()))
                    .collect::<Vec<_>>()
            })
            .collect();
        assert!(!pairs.is_empty());

        for (source, target) in pairs {
            let (output, input) = pair(&mut graph, &source, &target);
            graph.connect(output, input).unwrap();
            assert_eq!(graph.point(output).unwrap().connection_count(), 1);
            assert_eq!(graph.point(input).unwrap().connection_count(), 1);
            graph.disconnect(output, input).unwrap();
            assert_eq!(graph.point(output).unwrap().connection_count(), 0);
            assert_eq!(graph.point(input).unwrap().connection_count(), 0);
        }
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn test_incompatible_pair_fails() {
        let mut graph = Graph::default();
        let (output, input) = pair(&mut graph, "String", "Number");
        let err = graph.connect(output, input).unwrap_err();
        assert!(matches!(err, GraphError::IncompatibleTypes { .. }));
        assert_eq!(graph.point(output).unwrap().connection_count(), 0);
        assert_eq!(graph.point(input).unwrap().connection_count(), 0);
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn test_connection_preconditions() {
        let mut graph = Graph::default();
        let (output, input) = pair(&mut graph, "Number", "Number");
        assert!(matches!(graph.connect(output, output), Err(GraphError::SelfConnection(_))));
        assert!(matches!(
            graph.connect(input, output),
            Err(GraphError::WrongDirection { .. })
        ));
        let detached = Point::input("loose", "Number");
        assert!(matches!(
            graph.connect(output, detached.id()),
            Err(GraphError::PointNotFound(_))
        ));
    }

    #[test]
    fn test_value_and_connection_are_exclusive() {
        let mut graph = Graph::default();
        let (output, input) = pair(&mut graph, "Number", "Number");
        graph.change_point_value(input, json!(4), false).unwrap();
        assert!(matches!(graph.connect(output, input), Err(GraphError::PointHasValue(_))));

        graph.change_point_value(input, serde_json::Value::Null, false).unwrap();
        graph.connect(output, input).unwrap();
        let err = graph.change_point_value(input, json!(4), false).unwrap_err();
        assert!(matches!(err, GraphError::PointHasConnections(_)));
        let err = graph
            .change_point_value(input, serde_json::Value::Null, false)
            .unwrap_err();
        assert!(matches!(err, GraphError::PointHasConnections(_)));
        assert!(graph.point(input).unwrap().value().is_null());
    }

    #[test]
    fn test_single_connection_limit() {
        let mut graph = Graph::default();
        let (first, input) = pair(&mut graph, "Number", "Number");
        let (second, _) = pair(&mut graph, "Number", "Number");
        let existing = graph.connect(first, input).unwrap();

        let err = graph.connect(second, input).unwrap_err();
        assert!(matches!(err, GraphError::ConnectionLimit(p) if p == input));
        assert_eq!(graph.connections_of(input).map(Connection::id).collect::<Vec<_>>(), vec![existing]);
        assert!(graph.connection(existing).is_some());
    }

    #[test]
    fn test_multiple_connections_and_duplicates() {
        let mut graph = Graph::default();
        let source = graph.add_block(Block::new()).unwrap();
        let sink = graph.add_block(Block::new()).unwrap();
        let multi = PointPolicy::MULTIPLE_CONNECTIONS | PointPolicy::CONVERSION;
        let output = graph
            .add_point(&source, Point::output("out", "Number").with_policy(multi), None)
            .unwrap();
        let a = graph
            .add_point(&sink, Point::input("a", "Number").with_policy(multi), None)
            .unwrap();
        let b = graph.add_point(&sink, Point::input("b", "String"), None).unwrap();

        graph.connect(output, a).unwrap();
        graph.connect(output, b).unwrap();
        assert_eq!(graph.point(output).unwrap().connection_count(), 2);
        assert!(matches!(
            graph.connect(output, a),
            Err(GraphError::DuplicateConnection { .. })
        ));
        assert_eq!(graph.connections_for_block(&sink).count(), 2);
        assert_counts_consistent(&graph);
    }

    #[test]
    fn test_policy_without_cardinality_refuses() {
        let mut graph = Graph::default();
        let source = graph.add_block(Block::new()).unwrap();
        let output = graph
            .add_point(&source, Point::output("out", "Number").with_policy(PointPolicy::VALUE), None)
            .unwrap();
        let (_, input) = pair(&mut graph, "Number", "Number");
        assert!(matches!(
            graph.check_connection(output, input),
            Err(GraphError::ConnectionsNotAllowed(_))
        ));
    }

    #[test]
    fn test_conversion_bit_required() {
        let mut graph = Graph::default();
        let source = graph.add_block(Block::new()).unwrap();
        let output = graph
            .add_point(
                &source,
                Point::output("out", "Number").with_policy(PointPolicy::SINGLE_CONNECTION),
                None,
            )
            .unwrap();
        let (number_output, string_input) = pair(&mut graph, "Number", "String");
        let err = graph.check_connection(output, string_input).unwrap_err();
        assert!(matches!(err, GraphError::ConversionNotAllowed(p) if p == output));
        graph.check_connection(number_output, string_input).unwrap();
    }

    #[test]
    fn test_invocation_order_does_not_matter() {
        let mut left = Graph::default();
        let (lo, li) = pair(&mut left, "Number", "Number");
        left.connect_points(lo, li).unwrap();

        let mut right = Graph::default();
        let (ro, ri) = pair(&mut right, "Number", "Number");
        right.connect_points(ri, ro).unwrap();

        assert_eq!(left.point(li).unwrap().connection_count(), right.point(ri).unwrap().connection_count());
        assert_eq!(left.connection_count(), right.connection_count());

        left.disconnect_points(li, lo).unwrap();
        right.disconnect_points(ro, ri).unwrap();
        assert_eq!(left.connection_count(), 0);
        assert_eq!(right.connection_count(), 0);
        assert!(left.point(lo).unwrap().is_empty());
        assert!(right.point(ri).unwrap().is_empty());
    }

    #[test]
    fn test_disconnect_missing_connection() {
        let mut graph = Graph::default();
        let (output, input) = pair(&mut graph, "Number", "Number");
        assert!(matches!(
            graph.disconnect(output, input),
            Err(GraphError::ConnectionNotFound { .. })
        ));
    }

    #[test]
    fn test_connect_event_order() {
        let mut graph = Graph::default();
        let (output, input) = pair(&mut graph, "Number", "Number");
        let log = Arc::new(Mutex::new(Vec::new()));
        for point in [output, input] {
            let sink = Arc::clone(&log);
            graph.subscribe_point(point, move |event| sink.lock().push(event.label().to_string()));
        }
        let sink = Arc::clone(&log);
        graph.subscribe(move |event| sink.lock().push(event.label().to_string()));

        graph.connect(output, input).unwrap();
        graph.disconnect(output, input).unwrap();
        assert_eq!(
            *log.lock(),
            vec![
                "connect",
                "point-connect",
                "connect",
                "point-connect",
                "disconnect",
                "point-disconnect",
                "disconnect",
                "point-disconnect",
            ]
        );
    }

    #[test]
    fn test_remove_block_drops_touching_connections() {
        let mut graph = Graph::default();
        let (output, input) = pair(&mut graph, "Number", "Number");
        let (other_output, other_input) = pair(&mut graph, "Boolean", "Number");
        graph.connect(output, input).unwrap();
        graph.connect(other_output, other_input).unwrap();

        let owner = graph.point_owner(input).cloned().unwrap();
        graph.remove_block(&owner).unwrap();
        assert_eq!(graph.connection_count(), 1);
        assert!(graph.point(output).unwrap().is_empty());
        assert_counts_consistent(&graph);
    }

    #[test]
    fn test_template_recovery_retypes_output_block() {
        let mut graph = Graph::default();
        let generic = Block::new()
            .with_template("T", Template::new("Number", ["Number", "Array"]))
            .with_point(Point::template_output("out", "T"));
        let generic = graph.add_block(generic).unwrap();
        let output = graph.point_by_name(&generic, PointDirection::Output, "out").unwrap();
        let sink = graph.add_block(Block::new()).unwrap();
        let input = graph
            .add_point(&sink, Point::input("in", "Object"), None)
            .unwrap();

        // Object is outside the template's allowed set: nothing changes
        assert!(graph.connect(output, input).is_err());
        assert_eq!(graph.point(output).unwrap().value_type(), Some("Number"));

        let list_sink = graph.add_block(Block::new()).unwrap();
        let list = graph
            .add_point(&list_sink, Point::input("list", "Array"), None)
            .unwrap();
        graph.connect(output, list).unwrap();
        assert_eq!(graph.point(output).unwrap().value_type(), Some("Array"));
        assert_eq!(graph.block(&generic).unwrap().template("T").unwrap().value_type, "Array");
    }

    #[test]
    fn test_template_recovery_falls_back_to_input_block() {
        let mut graph = Graph::default();
        let source = graph.add_block(Block::new()).unwrap();
        let output = graph
            .add_point(&source, Point::output("out", "Object"), None)
            .unwrap();
        let generic = Block::new()
            .with_template("T", Template::new("Number", ["Number", "Object"]))
            .with_point(Point::template_input("in", "T"));
        let generic = graph.add_block(generic).unwrap();
        let input = graph.point_by_name(&generic, PointDirection::Input, "in").unwrap();

        graph.connect(output, input).unwrap();
        assert_eq!(graph.point(input).unwrap().value_type(), Some("Object"));
    }

    #[test]
    fn test_veto_discards_connection() {
        struct Picky;
        impl BlockBehavior for Picky {
            fn accept_connect(
                &self,
                _graph: &Graph,
                _point: PointId,
                _other: PointId,
            ) -> std::result::Result<(), String> {
                Err("no visitors".to_string())
            }
        }

        let mut graph = Graph::default();
        let source = graph.add_block(Block::new()).unwrap();
        let output = graph.add_point(&source, Point::output("out", "Number"), None).unwrap();
        let picky = graph.add_block(Block::with_behavior(Picky)).unwrap();
        let input = graph.add_point(&picky, Point::input("in", "Number"), None).unwrap();

        let err = graph.connect(output, input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Veto);
        assert!(matches!(err, GraphError::Vetoed { ref block, .. } if *block == picky));
        assert_eq!(graph.connection_count(), 0);
        assert!(graph.point(input).unwrap().is_empty());
    }

    #[test]
    fn test_connected_hooks_run_before_events() {
        struct Recorder(Arc<Mutex<Vec<String>>>);
        impl BlockBehavior for Recorder {
            fn point_connected(&self, graph: &mut Graph, point: PointId, connection: &Connection) {
                let count = graph.point(point).map_or(0, Point::connection_count);
                self.0.lock().push(format!("hook:{count}:{}", connection.input() == point));
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut graph = Graph::default();
        let source = graph.add_block(Block::new()).unwrap();
        let output = graph.add_point(&source, Point::output("out", "Number"), None).unwrap();
        let sink = graph
            .add_block(Block::with_behavior(Recorder(Arc::clone(&log))))
            .unwrap();
        let input = graph.add_point(&sink, Point::input("in", "Number"), None).unwrap();
        let events = Arc::clone(&log);
        graph.subscribe(move |event| events.lock().push(event.label().to_string()));

        graph.connect(output, input).unwrap();
        assert_eq!(*log.lock(), vec!["hook:1:true", "point-connect", "point-connect"]);
    }

    fn record_labels(graph: &mut Graph) -> Arc<Mutex<Vec<&'static str>>> {
        let labels = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&labels);
        graph.subscribe(move |event| sink.lock().push(event.label()));
        labels
    }

    #[test]
    fn test_failed_connect_leaves_templated_value_alone() {
        let mut graph = Graph::default();
        let source = graph.add_block(Block::new()).unwrap();
        let output = graph.add_point(&source, Point::output("out", "Number"), None).unwrap();
        let generic = Block::new()
            .with_template("T", Template::new("String", ["String", "Number"]))
            .with_point(Point::template_input("in", "T").with_value(json!("007")));
        let generic = graph.add_block(generic).unwrap();
        let input = graph.point_by_name(&generic, PointDirection::Input, "in").unwrap();
        let labels = record_labels(&mut graph);

        let err = graph.connect(output, input).unwrap_err();
        assert!(matches!(err, GraphError::PointHasValue(p) if p == input));
        let stored = graph.point(input).unwrap();
        assert_eq!(stored.value_type(), Some("String"));
        assert_eq!(stored.value(), &json!("007"));
        assert_eq!(graph.block_templates(&generic).unwrap()["T"].value_type, "String");
        assert!(labels.lock().is_empty());
    }

    #[test]
    fn test_connection_limit_skips_template_recovery() {
        let mut graph = Graph::default();
        let generic = Block::new()
            .with_template("T", Template::new("String", ["String", "Number"]))
            .with_point(Point::template_input("in", "T"));
        let generic = graph.add_block(generic).unwrap();
        let input = graph.point_by_name(&generic, PointDirection::Input, "in").unwrap();
        let (first, _) = pair(&mut graph, "String", "String");
        let (number_output, _) = pair(&mut graph, "Number", "Number");
        graph.connect(first, input).unwrap();
        let labels = record_labels(&mut graph);

        let err = graph.connect(number_output, input).unwrap_err();
        assert!(matches!(err, GraphError::ConnectionLimit(p) if p == input));
        assert_eq!(graph.point(input).unwrap().value_type(), Some("String"));
        assert!(labels.lock().is_empty());
    }

    #[test]
    fn test_unconvertible_template_value_blocks_recovery() {
        let mut graph = Graph::default();
        let generic = Block::new()
            .with_template("T", Template::new("String", ["String", "Number"]))
            .with_point(Point::template_output("out", "T"))
            .with_point(Point::template_input("label", "T").with_value(json!("abc")));
        let generic = graph.add_block(generic).unwrap();
        let output = graph.point_by_name(&generic, PointDirection::Output, "out").unwrap();
        let label = graph.point_by_name(&generic, PointDirection::Input, "label").unwrap();
        let sink = graph.add_block(Block::new()).unwrap();
        let input = graph.add_point(&sink, Point::input("in", "Number"), None).unwrap();
        let labels = record_labels(&mut graph);

        let err = graph.connect(output, input).unwrap_err();
        assert!(matches!(err, GraphError::IncompatibleTypes { .. }));
        assert_eq!(graph.point(output).unwrap().value_type(), Some("String"));
        assert_eq!(graph.point(label).unwrap().value(), &json!("abc"));
        assert!(labels.lock().is_empty());
    }

    #[test]
    fn test_template_recovery_emits_update_once() {
        let mut graph = Graph::default();
        let generic = Block::new()
            .with_template("T", Template::new("Number", ["Number", "Array"]))
            .with_point(Point::template_output("out", "T"));
        let generic = graph.add_block(generic).unwrap();
        let output = graph.point_by_name(&generic, PointDirection::Output, "out").unwrap();
        let sink = graph.add_block(Block::new()).unwrap();
        let object = graph.add_point(&sink, Point::input("obj", "Object"), None).unwrap();
        let list = graph.add_point(&sink, Point::input("list", "Array"), None).unwrap();
        let labels = record_labels(&mut graph);

        assert!(graph.connect(output, object).is_err());
        assert!(labels.lock().is_empty());

        graph.connect(output, list).unwrap();
        assert_eq!(
            *labels.lock(),
            vec![
                "point-value-type-change",
                "block-template-update",
                "point-connect",
                "point-connect",
            ]
        );
    }

    #[test]
    fn test_veto_after_type_failure_keeps_template() {
        struct Picky;
        impl BlockBehavior for Picky {
            fn accept_connect(
                &self,
                _graph: &Graph,
                _point: PointId,
                _other: PointId,
            ) -> std::result::Result<(), String> {
                Err("closed".to_string())
            }
        }

        let mut graph = Graph::default();
        let generic = Block::new()
            .with_template("T", Template::new("Number", ["Number", "Array"]))
            .with_point(Point::template_output("out", "T"));
        let generic = graph.add_block(generic).unwrap();
        let output = graph.point_by_name(&generic, PointDirection::Output, "out").unwrap();
        let picky = graph.add_block(Block::with_behavior(Picky)).unwrap();
        let input = graph.add_point(&picky, Point::input("list", "Array"), None).unwrap();
        let labels = record_labels(&mut graph);

        let err = graph.connect(output, input).unwrap_err();
        assert!(matches!(
            err,
            GraphError::Vetoed { previous: Some(ref previous), .. }
                if matches!(**previous, GraphError::IncompatibleTypes { .. })
        ));
        assert_eq!(graph.point(output).unwrap().value_type(), Some("Number"));
        assert!(labels.lock().is_empty());
    }
}
