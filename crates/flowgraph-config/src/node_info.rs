//! Per-node and per-edge records of a validated graph.

use std::collections::BTreeSet;
use std::ops::Range;

use flowgraph_core::{CollectionItemId, NodeContract, PacketType};

/// What kind of declaration a [`NodeRef`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    /// Entry of the graph's `node` list.
    Calculator,
    /// Entry of the graph's `packet_generator` list.
    PacketGenerator,
    /// Entry of the graph's `status_handler` list.
    StatusHandler,
    /// The virtual node that produces the graph's input streams.
    GraphInputStream,
}

/// Index of a node within its kind's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    /// Which list.
    pub kind: NodeKind,
    /// Position in the list.
    pub index: usize,
}

impl NodeRef {
    /// Creates a reference.
    pub const fn new(kind: NodeKind, index: usize) -> Self {
        Self { kind, index }
    }

    /// The calculator at `index`.
    pub const fn calculator(index: usize) -> Self {
        Self::new(NodeKind::Calculator, index)
    }

    /// The packet generator at `index`.
    pub const fn packet_generator(index: usize) -> Self {
        Self::new(NodeKind::PacketGenerator, index)
    }

    /// The status handler at `index`.
    pub const fn status_handler(index: usize) -> Self {
        Self::new(NodeKind::StatusHandler, index)
    }

    /// The graph input stream pseudo-node.
    pub const fn graph_input() -> Self {
        Self::new(NodeKind::GraphInputStream, 0)
    }
}

/// One concrete stream or side-packet endpoint.
#[derive(Debug, Clone)]
pub struct EdgeInfo {
    /// Node owning the endpoint.
    pub parent_node: NodeRef,
    /// Stream or side-packet name.
    pub name: String,
    /// Type slot shared with the owning node's contract.
    pub packet_type: PacketType,
    /// For inputs, the index of the bound output in the matching output
    /// table. `None` for required side packets and unresolved back edges.
    pub upstream: Option<usize>,
    /// The input closes a deliberate cycle.
    pub back_edge: bool,
}

/// Contract and table positions of one node.
#[derive(Debug, Clone)]
pub struct NodeTypeInfo {
    pub(crate) node_ref: NodeRef,
    pub(crate) contract: NodeContract,
    pub(crate) back_edges: Vec<bool>,
    pub(crate) source_nodes: BTreeSet<usize>,
    pub(crate) input_stream_base: usize,
    pub(crate) output_stream_base: usize,
    pub(crate) input_side_packet_base: usize,
    pub(crate) output_side_packet_base: usize,
}

impl NodeTypeInfo {
    pub(crate) fn new(node_ref: NodeRef, contract: NodeContract, back_edges: Vec<bool>) -> Self {
        Self {
            node_ref,
            contract,
            back_edges,
            source_nodes: BTreeSet::new(),
            input_stream_base: 0,
            output_stream_base: 0,
            input_side_packet_base: 0,
            output_side_packet_base: 0,
        }
    }

    /// Where the node sits in the final graph.
    pub fn node_ref(&self) -> NodeRef {
        self.node_ref
    }

    /// Position in its kind's final order.
    pub fn order(&self) -> usize {
        self.node_ref.index
    }

    /// The node's resolved contract.
    pub fn contract(&self) -> &NodeContract {
        &self.contract
    }

    /// Whether the input with collection id `id` is marked as a back edge.
    pub fn is_back_edge(&self, id: CollectionItemId) -> bool {
        self.back_edges.get(id.index()).copied().unwrap_or(false)
    }

    /// Calculators without inputs that can feed this node, by index.
    /// A calculator without inputs lists only itself.
    pub fn source_nodes(&self) -> &BTreeSet<usize> {
        &self.source_nodes
    }

    /// Range of this node's entries in the input stream table.
    pub fn input_stream_range(&self) -> Range<usize> {
        self.input_stream_base..self.input_stream_base + self.contract.inputs().len()
    }

    /// Range of this node's entries in the output stream table.
    pub fn output_stream_range(&self) -> Range<usize> {
        self.output_stream_base..self.output_stream_base + self.contract.outputs().len()
    }

    /// Range of this node's entries in the input side-packet table.
    pub fn input_side_packet_range(&self) -> Range<usize> {
        let len = self.contract.input_side_packets().len();
        self.input_side_packet_base..self.input_side_packet_base + len
    }

    /// Range of this node's entries in the output side-packet table.
    pub fn output_side_packet_range(&self) -> Range<usize> {
        let len = self.contract.output_side_packets().len();
        self.output_side_packet_base..self.output_side_packet_base + len
    }
}
