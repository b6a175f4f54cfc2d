//! Error types for graph compilation.

use flowgraph_core::{ContractError, NameError, PortKind, SortError, TagMapError};
use flowgraph_registry::SubgraphError;
use thiserror::Error;

/// Errors that can occur while expanding or validating a graph.
///
/// Structural problems abort at the first occurrence. Type, reference and
/// executor problems are collected across the whole graph and returned
/// together as [`CompileError::Multiple`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A name, tag or index failed the addressing grammar.
    #[error(transparent)]
    Name(#[from] NameError),

    /// A graph-level port list is malformed.
    #[error("graph {kind} list is malformed: {source}")]
    GraphPorts {
        /// Which list.
        kind: PortKind,
        /// Underlying error.
        #[source]
        source: TagMapError,
    },

    /// A node contract could not be built or filled.
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// A sub-graph could not be instantiated.
    #[error(transparent)]
    Subgraph(#[from] SubgraphError),

    /// Internal sorter misuse.
    #[error(transparent)]
    Sort(#[from] SortError),

    /// A sub-graph node sets a field only computation nodes support.
    #[error("sub-graph node \"{node}\" ({node_type}) sets \"{field}\", which only computation nodes support")]
    SubgraphField {
        /// Canonical node name.
        node: String,
        /// Sub-graph type.
        node_type: String,
        /// The offending field.
        field: &'static str,
    },

    /// A wrapping node binds a tag the sub-graph does not declare.
    #[error("node \"{node}\" binds {kind} tag \"{tag}\", which sub-graph \"{subgraph}\" does not declare")]
    UnknownSubgraphTag {
        /// Canonical name of the wrapping node.
        node: String,
        /// Sub-graph type.
        subgraph: String,
        /// Which port list.
        kind: PortKind,
        /// The unmatched tag.
        tag: String,
    },

    /// A wrapping node binds a different number of indices than declared.
    #[error(
        "node \"{node}\" binds {node_count} {kind} entries for tag \"{tag}\", but sub-graph \"{subgraph}\" declares {subgraph_count}"
    )]
    TagCountMismatch {
        /// Canonical name of the wrapping node.
        node: String,
        /// Sub-graph type.
        subgraph: String,
        /// Which port list.
        kind: PortKind,
        /// The tag.
        tag: String,
        /// Entries on the wrapping node.
        node_count: usize,
        /// Entries declared by the sub-graph.
        subgraph_count: usize,
    },

    /// Sub-graphs kept producing sub-graph nodes.
    #[error("sub-graph expansion did not settle after {passes} passes (\"{node_type}\" still expands)")]
    ExpansionLimit {
        /// Passes performed.
        passes: usize,
        /// A type still awaiting expansion.
        node_type: String,
    },

    /// Two producers for one stream or side packet.
    #[error("{what} \"{name}\" is produced by both \"{first}\" and \"{second}\"")]
    DuplicateProducer {
        /// `stream` or `side packet`.
        what: &'static str,
        /// Edge name.
        name: String,
        /// Producer seen first.
        first: String,
        /// Producer seen second.
        second: String,
    },

    /// A back-edge marker does not address an input stream of its node.
    #[error("back-edge marker \"{tag_index}\" of node \"{node}\" does not name an input stream")]
    BackEdgeNotAnInput {
        /// Canonical node name.
        node: String,
        /// The marker's `TAG:index`.
        tag_index: String,
    },

    /// The same input is marked as a back edge twice.
    #[error("input \"{tag_index}\" of node \"{node}\" is marked as a back edge more than once")]
    DuplicateBackEdge {
        /// Canonical node name.
        node: String,
        /// The marker's `TAG:index`.
        tag_index: String,
    },

    /// A packet generator consumes a side packet only a calculator makes.
    #[error(
        "packet generator \"{generator}\" consumes side packet \"{name}\", which calculator \"{producer}\" produces after generators have run"
    )]
    GeneratorUsesCalculatorSidePacket {
        /// Consuming generator.
        generator: String,
        /// Side packet name.
        name: String,
        /// Producing calculator.
        producer: String,
    },

    /// An input stream whose producer exists nowhere in the graph.
    #[error("input stream \"{name}\" of node \"{node}\" is not produced by any node or graph input")]
    UnresolvedStream {
        /// Canonical node name.
        node: String,
        /// Stream name.
        name: String,
    },

    /// A side packet consumed before the node that produces it can run.
    #[error("side packet \"{name}\" is used by \"{node}\" but produced after it was used")]
    ProducedAfterUse {
        /// Consuming node.
        node: String,
        /// Side packet name.
        name: String,
    },

    /// A graph-level output with no producer.
    #[error("graph output {what} \"{name}\" is not produced by any node")]
    UnresolvedGraphOutput {
        /// `stream` or `side packet`.
        what: &'static str,
        /// Edge name.
        name: String,
    },

    /// Producer and consumer types cannot be reconciled.
    #[error(
        "{what} \"{name}\": \"{consumer}\" expects {expected} but \"{producer}\" produces {produced}"
    )]
    TypeMismatch {
        /// `stream` or `side packet`.
        what: &'static str,
        /// Edge name.
        name: String,
        /// Producing node.
        producer: String,
        /// Produced type.
        produced: String,
        /// Consuming node.
        consumer: String,
        /// Expected type.
        expected: String,
    },

    /// Consumers of one required side packet disagree on its type.
    #[error(
        "required side packet \"{name}\" is expected as {first_type} by \"{first}\" but as {second_type} by \"{second}\""
    )]
    SidePacketTypeConflict {
        /// Side packet name.
        name: String,
        /// First consumer.
        first: String,
        /// Its type.
        first_type: String,
        /// Conflicting consumer.
        second: String,
        /// Its type.
        second_type: String,
    },

    /// The dependency graph contains a cycle that no back edge breaks.
    #[error("graph contains a cycle: {}", .nodes.join(" -> "))]
    Cycle {
        /// Canonical names of the nodes on the cycle, in edge order.
        nodes: Vec<String>,
    },

    /// Two executors share a name.
    #[error("executor \"{name}\" is declared more than once")]
    DuplicateExecutor {
        /// The name; empty for the default executor.
        name: String,
    },

    /// An executor declaration or reference uses a reserved name.
    #[error("executor name \"{name}\" is reserved")]
    ReservedExecutor {
        /// The reserved name.
        name: String,
    },

    /// A node references an executor that is not declared.
    #[error("node \"{node}\" references undeclared executor \"{executor}\"")]
    UndeclaredExecutor {
        /// Canonical node name.
        node: String,
        /// Executor name.
        executor: String,
    },

    /// Several independent errors.
    #[error("multiple compile errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<CompileError>),
}

/// Result type for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

impl CompileError {
    /// Collapses a list of errors: `Ok` when empty, the error itself when
    /// there is one, [`CompileError::Multiple`] otherwise.
    pub fn from_errors(mut errors: Vec<CompileError>) -> CompileResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.swap_remove(0)),
            _ => Err(CompileError::Multiple(errors)),
        }
    }

    /// Every leaf error, with nested `Multiple` lists flattened.
    pub fn flatten(&self) -> Vec<&CompileError> {
        match self {
            CompileError::Multiple(errors) => errors.iter().flat_map(Self::flatten).collect(),
            other => vec![other],
        }
    }

    /// Number of leaf errors.
    pub fn len(&self) -> usize {
        match self {
            CompileError::Multiple(errors) => errors.iter().map(Self::len).sum(),
            _ => 1,
        }
    }

    /// Always false; present for symmetry with [`len`](Self::len).
    pub fn is_empty(&self) -> bool {
        false
    }
}
