//! Node contracts: the typed port declarations of one node.
//!
//! A [`NodeContract`] is built from a node's declared port lists, so every
//! port starts out [`TypeSpec::Unset`](crate::TypeSpec::Unset). The node
//! type's registered contract function then fills in the types it expects,
//! addressing ports by tag and index:
//!
//! ```rust
//! use flowgraph_core::{NodeConfig, NodeContract};
//!
//! let node = NodeConfig::new("Scale")
//!     .with_input("VALUE:raw")
//!     .with_output("VALUE:scaled");
//! let contract = NodeContract::for_node(&node, "Scale").unwrap();
//!
//! contract.inputs().require("VALUE", 0)?.set_exact("f32");
//! contract.outputs().require("VALUE", 0)?.set_exact("f32");
//! assert!(contract.untyped_ports().is_empty());
//! # Ok::<(), flowgraph_core::ContractError>(())
//! ```

use core::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::graph_config::{NodeConfig, PacketGeneratorConfig, StatusHandlerConfig};
use crate::packet_type::PacketType;
use crate::tag_map::{CollectionItemId, TagMap, TagMapError};

/// The four port collections a contract can declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortKind {
    /// Consumed stream.
    InputStream,
    /// Produced stream.
    OutputStream,
    /// Consumed side packet.
    InputSidePacket,
    /// Produced side packet.
    OutputSidePacket,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PortKind::InputStream => "input stream",
            PortKind::OutputStream => "output stream",
            PortKind::InputSidePacket => "input side packet",
            PortKind::OutputSidePacket => "output side packet",
        })
    }
}

/// Errors raised while building or filling a contract.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// A port list failed to parse into a [`TagMap`].
    #[error("{kind} list of node \"{node}\" is malformed: {source}")]
    Ports {
        /// Canonical node name.
        node: String,
        /// Which port list.
        kind: PortKind,
        /// Underlying grammar or index error.
        #[source]
        source: TagMapError,
    },

    /// A contract function asked for a port the node does not declare.
    #[error("node \"{node}\" requires {kind} \"{tag}\" index {index}, which is not declared")]
    MissingPort {
        /// Canonical node name.
        node: String,
        /// Which port list.
        kind: PortKind,
        /// Requested tag.
        tag: String,
        /// Requested index.
        index: u32,
    },

    /// A port was left without a type after the contract function ran.
    #[error("{kind} \"{tag}\" index {index} (\"{name}\") of node \"{node}\" has no type")]
    Untyped {
        /// Canonical node name.
        node: String,
        /// Which port list.
        kind: PortKind,
        /// Tag of the port.
        tag: String,
        /// Index of the port.
        index: u32,
        /// Edge name bound to the port.
        name: String,
    },

    /// No contract is registered for the node type.
    #[error("no contract registered for {role} type \"{node_type}\" (node \"{node}\")")]
    Unregistered {
        /// Canonical node name.
        node: String,
        /// Registered type name that was looked up.
        node_type: String,
        /// `calculator`, `packet generator` or `status handler`.
        role: &'static str,
    },

    /// The contract function rejected the node.
    #[error("node \"{node}\": {message}")]
    Rejected {
        /// Canonical node name.
        node: String,
        /// Reason given by the contract function.
        message: String,
    },
}

/// Types for one port collection, indexed like its [`TagMap`].
#[derive(Debug, Clone, Default)]
pub struct PacketTypeSet {
    tag_map: TagMap,
    types: Vec<PacketType>,
    kind: Option<PortKind>,
    node: String,
}

impl PacketTypeSet {
    /// One unset type per entry of `tag_map`.
    pub fn new(tag_map: TagMap) -> Self {
        let types = (0..tag_map.num_entries()).map(|_| PacketType::new()).collect();
        Self {
            tag_map,
            types,
            kind: None,
            node: String::new(),
        }
    }

    fn labelled(tag_map: TagMap, kind: PortKind, node: &str) -> Self {
        Self {
            kind: Some(kind),
            node: node.to_string(),
            ..Self::new(tag_map)
        }
    }

    /// The underlying tag map.
    pub fn tag_map(&self) -> &TagMap {
        &self.tag_map
    }

    /// Number of ports.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if there are no ports.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Port at `(tag, index)`.
    pub fn get(&self, tag: &str, index: u32) -> Option<&PacketType> {
        self.tag_map.get_id(tag, index).and_then(|id| self.by_id(id))
    }

    /// First port of `tag`.
    pub fn tag(&self, tag: &str) -> Option<&PacketType> {
        self.get(tag, 0)
    }

    /// Untagged port at `index`.
    pub fn index(&self, index: u32) -> Option<&PacketType> {
        self.get("", index)
    }

    /// Port by collection item id.
    pub fn by_id(&self, id: CollectionItemId) -> Option<&PacketType> {
        self.types.get(id.index())
    }

    /// Like [`get`](Self::get), but a missing port is a contract error.
    pub fn require(&self, tag: &str, index: u32) -> Result<&PacketType, ContractError> {
        self.get(tag, index).ok_or_else(|| ContractError::MissingPort {
            node: self.node.clone(),
            kind: self.kind.unwrap_or(PortKind::InputStream),
            tag: tag.to_string(),
            index,
        })
    }

    /// Ports in id order.
    pub fn iter(&self) -> impl Iterator<Item = (CollectionItemId, &PacketType)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (CollectionItemId::new(i), t))
    }

    /// Marks every port as a wildcard.
    pub fn set_all_any(&self) {
        for packet_type in &self.types {
            packet_type.set_any();
        }
    }
}

/// Typed port declarations of a single node.
#[derive(Debug, Clone)]
pub struct NodeContract {
    node_name: String,
    node_type: String,
    options: Value,
    inputs: PacketTypeSet,
    outputs: PacketTypeSet,
    input_side_packets: PacketTypeSet,
    output_side_packets: PacketTypeSet,
}

fn port_set<S: AsRef<str>>(
    node: &str,
    kind: PortKind,
    entries: &[S],
) -> Result<PacketTypeSet, ContractError> {
    let tag_map = TagMap::new(entries).map_err(|source| ContractError::Ports {
        node: node.to_string(),
        kind,
        source,
    })?;
    Ok(PacketTypeSet::labelled(tag_map, kind, node))
}

impl NodeContract {
    fn build(
        node_name: &str,
        node_type: &str,
        options: &Value,
        ports: [&[String]; 4],
    ) -> Result<Self, ContractError> {
        let [inputs, outputs, input_sides, output_sides] = ports;
        Ok(Self {
            node_name: node_name.to_string(),
            node_type: node_type.to_string(),
            options: options.clone(),
            inputs: port_set(node_name, PortKind::InputStream, inputs)?,
            outputs: port_set(node_name, PortKind::OutputStream, outputs)?,
            input_side_packets: port_set(node_name, PortKind::InputSidePacket, input_sides)?,
            output_side_packets: port_set(node_name, PortKind::OutputSidePacket, output_sides)?,
        })
    }

    /// Contract skeleton for a computation node.
    pub fn for_node(node: &NodeConfig, node_name: &str) -> Result<Self, ContractError> {
        Self::build(
            node_name,
            &node.node_type,
            &node.options,
            [
                &node.input_streams,
                &node.output_streams,
                &node.input_side_packets,
                &node.output_side_packets,
            ],
        )
    }

    /// Contract skeleton for a packet generator (side packets only).
    pub fn for_packet_generator(
        generator: &PacketGeneratorConfig,
        node_name: &str,
    ) -> Result<Self, ContractError> {
        Self::build(
            node_name,
            &generator.packet_generator,
            &generator.options,
            [
                &[],
                &[],
                &generator.input_side_packets,
                &generator.output_side_packets,
            ],
        )
    }

    /// Contract skeleton for a status handler (input side packets only).
    pub fn for_status_handler(
        handler: &StatusHandlerConfig,
        node_name: &str,
    ) -> Result<Self, ContractError> {
        Self::build(
            node_name,
            &handler.status_handler,
            &handler.options,
            [&[], &[], &handler.input_side_packets, &[]],
        )
    }

    /// Name used in diagnostics.
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Registered type name.
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    /// The node's options payload.
    pub fn options(&self) -> &Value {
        &self.options
    }

    /// Input stream types.
    pub fn inputs(&self) -> &PacketTypeSet {
        &self.inputs
    }

    /// Output stream types.
    pub fn outputs(&self) -> &PacketTypeSet {
        &self.outputs
    }

    /// Input side-packet types.
    pub fn input_side_packets(&self) -> &PacketTypeSet {
        &self.input_side_packets
    }

    /// Output side-packet types.
    pub fn output_side_packets(&self) -> &PacketTypeSet {
        &self.output_side_packets
    }

    /// Port collection of the given kind.
    pub fn ports(&self, kind: PortKind) -> &PacketTypeSet {
        match kind {
            PortKind::InputStream => &self.inputs,
            PortKind::OutputStream => &self.outputs,
            PortKind::InputSidePacket => &self.input_side_packets,
            PortKind::OutputSidePacket => &self.output_side_packets,
        }
    }

    /// Builds a [`ContractError::Rejected`] for this node.
    pub fn reject(&self, message: impl Into<String>) -> ContractError {
        ContractError::Rejected {
            node: self.node_name.clone(),
            message: message.into(),
        }
    }

    /// Every port still left [`Unset`](crate::TypeSpec::Unset).
    pub fn untyped_ports(&self) -> Vec<ContractError> {
        let mut errors = Vec::new();
        for kind in [
            PortKind::InputStream,
            PortKind::OutputStream,
            PortKind::InputSidePacket,
            PortKind::OutputSidePacket,
        ] {
            let set = self.ports(kind);
            for (id, packet_type) in set.iter() {
                if packet_type.is_set() {
                    continue;
                }
                let (tag, index) = set.tag_map.tag_and_index_from_id(id).unwrap_or(("", 0));
                errors.push(ContractError::Untyped {
                    node: self.node_name.clone(),
                    kind,
                    tag: tag.to_string(),
                    index,
                    name: set.tag_map.name(id).unwrap_or_default().to_string(),
                });
            }
        }
        errors
    }

    /// Fails with the first untyped port, if any.
    pub fn validate_types(&self) -> Result<(), ContractError> {
        match self.untyped_ports().into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
