// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error type shared by every graph operation.

use crate::block::BlockId;
use crate::point::{PointDirection, PointId};
use serde_json::Value;
use std::path::PathBuf;

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Broad classification of a [`GraphError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Redefinition, detached entity, double registration, self-connection
    Structural,
    /// Unknown type, failed conversion, template type outside its allowed set
    Type,
    /// Cardinality or mutability violation of a point policy
    Policy,
    /// A block declined a connection
    Veto,
    /// Configuration could not be read or written
    Config,
}

/// Error raised by graph operations
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Block is not attached to the graph
    #[error("Block not found: {0}")]
    BlockNotFound(BlockId),

    /// Point is not bound to any block of the graph
    #[error("Point not found: {0:?}")]
    PointNotFound(PointId),

    /// Variable does not exist
    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    /// No connection links the two points
    #[error("No connection from {output:?} to {input:?}")]
    ConnectionNotFound {
        /// Output endpoint
        output: PointId,
        /// Input endpoint
        input: PointId,
    },

    /// A block with the same id is already attached
    #[error("Block already defined: {0}")]
    BlockRedefinition(BlockId),

    /// The block already has a point with this name in the same direction
    #[error("Block {block} already has an {direction:?} point named `{name}`")]
    PointRedefinition {
        /// Owning block
        block: BlockId,
        /// Direction of the clashing point
        direction: PointDirection,
        /// Point name
        name: String,
    },

    /// A variable with the same name already exists
    #[error("Variable already defined: {0}")]
    VariableRedefinition(String),

    /// The variable is already mirrored by another block
    #[error("Variable `{variable}` is already bound to block {block}")]
    VariableAlreadyBound {
        /// Variable name
        variable: String,
        /// Block holding the binding
        block: BlockId,
    },

    /// A point cannot be connected to itself
    #[error("Cannot connect point {0:?} to itself")]
    SelfConnection(PointId),

    /// The exact connection already exists
    #[error("Connection from {output:?} to {input:?} already exists")]
    DuplicateConnection {
        /// Output endpoint
        output: PointId,
        /// Input endpoint
        input: PointId,
    },

    /// A point was used in the wrong role
    #[error("Point {point:?} is not an {expected:?} point")]
    WrongDirection {
        /// Offending point
        point: PointId,
        /// Role it was used in
        expected: PointDirection,
    },

    /// The block declares no such template
    #[error("Block {block} has no template `{template}`")]
    TemplateNotFound {
        /// Owning block
        block: BlockId,
        /// Template name
        template: String,
    },

    /// Insertion index past the end of the point list
    #[error("Point position {position} out of range (len {len})")]
    InvalidPosition {
        /// Requested index
        position: usize,
        /// Current list length
        len: usize,
    },

    /// Point construction payload is incomplete
    #[error("Invalid point `{name}`: {reason}")]
    InvalidPoint {
        /// Point name
        name: String,
        /// What is missing
        reason: String,
    },

    /// The value type is not registered
    #[error("Unknown value type: {0}")]
    UnknownValueType(String),

    /// The value type is already registered
    #[error("Value type already registered: {0}")]
    ValueTypeRedefinition(String),

    /// The value cannot be represented in the type
    #[error("Cannot convert {value} to {value_type}")]
    ConversionFailed {
        /// Target type
        value_type: String,
        /// Rejected value
        value: Value,
    },

    /// The template does not accept this type
    #[error("Template `{template}` does not allow type {value_type}")]
    TemplateTypeNotAllowed {
        /// Template name
        template: String,
        /// Rejected type
        value_type: String,
    },

    /// The output type cannot flow into the input type
    #[error("Cannot connect {output_type} to {input_type}")]
    IncompatibleTypes {
        /// Type of the output endpoint
        output_type: String,
        /// Type of the input endpoint
        input_type: String,
    },

    /// The point policy forbids literal values
    #[error("Point {0:?} cannot hold a value")]
    ValueNotAllowed(PointId),

    /// The point is connected and cannot hold a value
    #[error("Point {0:?} has connections")]
    PointHasConnections(PointId),

    /// The point holds a value and cannot be connected
    #[error("Point {0:?} holds a value")]
    PointHasValue(PointId),

    /// The point accepts a single connection and already has it
    #[error("Point {0:?} is already connected")]
    ConnectionLimit(PointId),

    /// The point policy forbids any connection
    #[error("Point {0:?} does not accept connections")]
    ConnectionsNotAllowed(PointId),

    /// The point policy forbids type conversion on connection
    #[error("Point {0:?} does not allow conversion")]
    ConversionNotAllowed(PointId),

    /// Policy bits or labels are invalid
    #[error("Invalid point policy: {0}")]
    InvalidPolicy(String),

    /// A block declined the connection
    #[error("Block {block} refused the connection: {reason}")]
    Vetoed {
        /// Vetoing block
        block: BlockId,
        /// Reason given by the block
        reason: String,
        /// Earlier failure this veto was chained onto
        #[source]
        previous: Option<Box<GraphError>>,
    },

    /// RON parse error
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    /// RON write error
    #[error("Config write error: {0}")]
    ConfigWrite(#[from] ron::Error),

    /// Config file could not be read or written
    #[error("Config file {path:?}: {source}")]
    ConfigIo {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
}

impl GraphError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BlockNotFound(_)
            | Self::PointNotFound(_)
            | Self::VariableNotFound(_)
            | Self::ConnectionNotFound { .. }
            | Self::BlockRedefinition(_)
            | Self::PointRedefinition { .. }
            | Self::VariableRedefinition(_)
            | Self::VariableAlreadyBound { .. }
            | Self::SelfConnection(_)
            | Self::DuplicateConnection { .. }
            | Self::WrongDirection { .. }
            | Self::TemplateNotFound { .. }
            | Self::InvalidPosition { .. }
            | Self::InvalidPoint { .. } => ErrorKind::Structural,
            Self::UnknownValueType(_)
            | Self::ValueTypeRedefinition(_)
            | Self::ConversionFailed { .. }
            | Self::TemplateTypeNotAllowed { .. }
            | Self::IncompatibleTypes { .. } => ErrorKind::Type,
            Self::ValueNotAllowed(_)
            | Self::PointHasConnections(_)
            | Self::PointHasValue(_)
            | Self::ConnectionLimit(_)
            | Self::ConnectionsNotAllowed(_)
            | Self::ConversionNotAllowed(_)
            | Self::InvalidPolicy(_) => ErrorKind::Policy,
            Self::Vetoed { .. } => ErrorKind::Veto,
            Self::ConfigParse(_) | Self::ConfigWrite(_) | Self::ConfigIo { .. } => ErrorKind::Config,
        }
    }
}
