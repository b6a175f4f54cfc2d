//! Validated graph: expansion, contracts, edge tables, ordering, and types.
//!
//! [`ValidatedGraphConfig::initialize`] runs the whole compile in fixed
//! phases:
//!
//! 1. Expand sub-graphs and add the default executor.
//! 2. Build every node's contract from the registry and parse its back-edge
//!    markers.
//! 3. Build the side-packet and stream tables in declared order. An input
//!    whose producer has not been seen yet asks for a sort instead of
//!    failing.
//! 4. If asked, sort generators and calculators topologically, reorder the
//!    graph, and rebuild the tables. The rebuild may not ask again.
//! 5. Bind back edges, compute source nodes, narrow wildcard and union
//!    types, and check every binding's types.
//! 6. Check graph outputs and executors.
//!
//! Structural problems abort at once; unresolved references, type errors and
//! executor errors are collected and reported together.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use flowgraph_core::tag::parse_tag_index;
use flowgraph_core::{
    ContractError, ExecutorConfig, GraphConfig, NodeConfig, NodeContract, PacketType, PortKind,
    TagMap, TopologicalSorter,
};
use flowgraph_registry::{ContractRegistry, NodeRole, ServiceSet, SubgraphRegistry};

use crate::error::{CompileError, CompileResult};
use crate::executors;
use crate::expand::Expander;
use crate::node_info::{EdgeInfo, NodeKind, NodeRef, NodeTypeInfo};
use crate::options::CompileOptions;

const STREAM: &str = "stream";
const SIDE_PACKET: &str = "side packet";

/// A fully expanded, ordered, and type-checked graph.
///
/// Read-only once built; share it freely between runs.
#[derive(Debug, Clone)]
pub struct ValidatedGraphConfig {
    config: GraphConfig,
    generators: Vec<NodeTypeInfo>,
    calculators: Vec<NodeTypeInfo>,
    status_handlers: Vec<NodeTypeInfo>,
    input_streams: Vec<EdgeInfo>,
    output_streams: Vec<EdgeInfo>,
    input_side_packets: Vec<EdgeInfo>,
    output_side_packets: Vec<EdgeInfo>,
    stream_to_producer: HashMap<String, usize>,
    side_packet_to_producer: HashMap<String, usize>,
    required_side_packets: BTreeMap<String, Vec<usize>>,
    graph_input_streams: usize,
    executors: Vec<ExecutorConfig>,
    warnings: Vec<String>,
}

impl ValidatedGraphConfig {
    /// Compiles `config`.
    pub fn initialize(
        config: GraphConfig,
        contracts: &ContractRegistry,
        subgraphs: &SubgraphRegistry,
        services: &ServiceSet,
        options: &CompileOptions,
    ) -> CompileResult<Self> {
        let mut expander =
            Expander::new(subgraphs, services).with_max_passes(options.max_expansion_passes);
        let config = expander.expand(config)?;
        tracing::debug!(
            instances = expander.instances(),
            nodes = config.nodes.len(),
            "sub-graphs expanded"
        );
        let executors = executors::with_default(&config, options);

        let mut graph = Self {
            config,
            generators: Vec::new(),
            calculators: Vec::new(),
            status_handlers: Vec::new(),
            input_streams: Vec::new(),
            output_streams: Vec::new(),
            input_side_packets: Vec::new(),
            output_side_packets: Vec::new(),
            stream_to_producer: HashMap::new(),
            side_packet_to_producer: HashMap::new(),
            required_side_packets: BTreeMap::new(),
            graph_input_streams: 0,
            executors,
            warnings: Vec::new(),
        };

        graph.build_contracts(contracts)?;

        let mut needs_sort = graph.build_side_packet_info(true)?;
        needs_sort |= graph.build_stream_info(true)?;
        if needs_sort {
            tracing::debug!("nodes are not in dependency order; sorting");
            graph.topological_sort()?;
            graph.reset_tables();
            graph.build_side_packet_info(false)?;
            graph.build_stream_info(false)?;
        }

        graph.fill_back_edge_upstreams()?;
        graph.compute_source_nodes();
        graph.resolve_types();

        let mut errors = graph.type_errors();
        errors.extend(graph.graph_output_errors()?);
        CompileError::from_errors(errors)?;

        let names: Vec<&str> = graph.calculators.iter().map(|c| c.contract.node_name()).collect();
        CompileError::from_errors(executors::validate(&graph.executors, &graph.config, &names))?;

        for warning in &graph.warnings {
            tracing::warn!("{warning}");
        }
        tracing::debug!(
            order = ?graph.node_order_names(),
            "graph validated"
        );
        Ok(graph)
    }

    // ------------------------------------------------------------------
    // Contracts
    // ------------------------------------------------------------------

    fn build_contracts(&mut self, registry: &ContractRegistry) -> CompileResult<()> {
        let mut errors = Vec::new();

        let names = self.config.canonical_packet_generator_names();
        for (i, generator) in self.config.packet_generators.iter().enumerate() {
            let skeleton = NodeContract::for_packet_generator(generator, &names[i]);
            match fill_contract(registry, NodeRole::PacketGenerator, skeleton) {
                Ok(contract) => self.generators.push(NodeTypeInfo::new(
                    NodeRef::packet_generator(i),
                    contract,
                    Vec::new(),
                )),
                Err(mut errs) => errors.append(&mut errs),
            }
        }

        let names = self.config.canonical_node_names();
        for (i, node) in self.config.nodes.iter().enumerate() {
            let skeleton = NodeContract::for_node(node, &names[i]);
            let contract = match fill_contract(registry, NodeRole::Calculator, skeleton) {
                Ok(contract) => contract,
                Err(mut errs) => {
                    errors.append(&mut errs);
                    continue;
                }
            };
            match back_edge_flags(node, &contract) {
                Ok(flags) => self.calculators.push(NodeTypeInfo::new(
                    NodeRef::calculator(i),
                    contract,
                    flags,
                )),
                Err(err) => errors.push(err),
            }
        }

        let names = self.config.canonical_status_handler_names();
        for (i, handler) in self.config.status_handlers.iter().enumerate() {
            let skeleton = NodeContract::for_status_handler(handler, &names[i]);
            match fill_contract(registry, NodeRole::StatusHandler, skeleton) {
                Ok(contract) => self.status_handlers.push(NodeTypeInfo::new(
                    NodeRef::status_handler(i),
                    contract,
                    Vec::new(),
                )),
                Err(mut errs) => errors.append(&mut errs),
            }
        }

        CompileError::from_errors(errors)
    }

    // ------------------------------------------------------------------
    // Edge tables
    // ------------------------------------------------------------------

    fn reset_tables(&mut self) {
        self.input_streams.clear();
        self.output_streams.clear();
        self.input_side_packets.clear();
        self.output_side_packets.clear();
        self.stream_to_producer.clear();
        self.side_packet_to_producer.clear();
        self.required_side_packets.clear();
        self.graph_input_streams = 0;
        self.warnings.clear();
    }

    fn info(&self, node: NodeRef) -> Option<&NodeTypeInfo> {
        match node.kind {
            NodeKind::Calculator => self.calculators.get(node.index),
            NodeKind::PacketGenerator => self.generators.get(node.index),
            NodeKind::StatusHandler => self.status_handlers.get(node.index),
            NodeKind::GraphInputStream => None,
        }
    }

    fn info_mut(&mut self, node: NodeRef) -> Option<&mut NodeTypeInfo> {
        match node.kind {
            NodeKind::Calculator => self.calculators.get_mut(node.index),
            NodeKind::PacketGenerator => self.generators.get_mut(node.index),
            NodeKind::StatusHandler => self.status_handlers.get_mut(node.index),
            NodeKind::GraphInputStream => None,
        }
    }

    /// Name used for `node` in diagnostics.
    pub fn node_name(&self, node: NodeRef) -> String {
        match self.info(node) {
            Some(info) => info.contract.node_name().to_string(),
            None => "graph input".to_string(),
        }
    }

    /// `(name, type)` of every port of `kind` on `node`, in id order.
    fn ports(&self, node: NodeRef, kind: PortKind) -> Vec<(String, PacketType)> {
        let Some(info) = self.info(node) else {
            return Vec::new();
        };
        let set = info.contract.ports(kind);
        set.iter()
            .map(|(id, packet_type)| {
                let name = set.tag_map().name(id).unwrap_or_default().to_string();
                (name, packet_type.clone())
            })
            .collect()
    }

    fn build_side_packet_info(&mut self, first_pass: bool) -> CompileResult<bool> {
        let mut needs_sort = false;
        for i in 0..self.generators.len() {
            let node = NodeRef::packet_generator(i);
            self.add_input_side_packets(node);
            needs_sort |= self.add_output_side_packets(node, first_pass)?;
        }
        for i in 0..self.calculators.len() {
            let node = NodeRef::calculator(i);
            self.add_input_side_packets(node);
            needs_sort |= self.add_output_side_packets(node, first_pass)?;
        }
        for i in 0..self.status_handlers.len() {
            self.add_input_side_packets(NodeRef::status_handler(i));
        }

        let graph_inputs = graph_ports(&self.config.input_side_packets, PortKind::InputSidePacket)?;
        for name in graph_inputs.names() {
            if let Some(&producer) = self.side_packet_to_producer.get(name) {
                return Err(CompileError::DuplicateProducer {
                    what: SIDE_PACKET,
                    name: name.clone(),
                    first: "graph input".to_string(),
                    second: self.node_name(self.output_side_packets[producer].parent_node),
                });
            }
            self.required_side_packets.entry(name.clone()).or_default();
        }
        Ok(needs_sort)
    }

    fn add_input_side_packets(&mut self, node: NodeRef) {
        let ports = self.ports(node, PortKind::InputSidePacket);
        let base = self.input_side_packets.len();
        if let Some(info) = self.info_mut(node) {
            info.input_side_packet_base = base;
        }
        for (name, packet_type) in ports {
            let upstream = self.side_packet_to_producer.get(&name).copied();
            if upstream.is_none() {
                self.required_side_packets
                    .entry(name.clone())
                    .or_default()
                    .push(self.input_side_packets.len());
            }
            self.input_side_packets.push(EdgeInfo {
                parent_node: node,
                name,
                packet_type,
                upstream,
                back_edge: false,
            });
        }
    }

    fn add_output_side_packets(&mut self, node: NodeRef, first_pass: bool) -> CompileResult<bool> {
        let ports = self.ports(node, PortKind::OutputSidePacket);
        let base = self.output_side_packets.len();
        if let Some(info) = self.info_mut(node) {
            info.output_side_packet_base = base;
        }
        let mut needs_sort = false;
        for (name, packet_type) in ports {
            if let Some(&existing) = self.side_packet_to_producer.get(&name) {
                return Err(CompileError::DuplicateProducer {
                    what: SIDE_PACKET,
                    name,
                    first: self.node_name(self.output_side_packets[existing].parent_node),
                    second: self.node_name(node),
                });
            }
            if let Some(consumers) = self.required_side_packets.remove(&name) {
                if first_pass {
                    needs_sort = true;
                } else {
                    return Err(self.produced_after_use(node, &name, &consumers));
                }
            }
            self.side_packet_to_producer
                .insert(name.clone(), self.output_side_packets.len());
            self.output_side_packets.push(EdgeInfo {
                parent_node: node,
                name,
                packet_type,
                upstream: None,
                back_edge: false,
            });
        }
        Ok(needs_sort)
    }

    fn produced_after_use(&self, producer: NodeRef, name: &str, consumers: &[usize]) -> CompileError {
        let consumer_nodes = consumers.iter().map(|&i| self.input_side_packets[i].parent_node);
        let generator = consumer_nodes
            .clone()
            .find(|consumer| consumer.kind == NodeKind::PacketGenerator);
        match generator {
            Some(generator) if producer.kind == NodeKind::Calculator => {
                CompileError::GeneratorUsesCalculatorSidePacket {
                    generator: self.node_name(generator),
                    name: name.to_string(),
                    producer: self.node_name(producer),
                }
            }
            _ => CompileError::ProducedAfterUse {
                node: consumer_nodes
                    .map(|consumer| self.node_name(consumer))
                    .next()
                    .unwrap_or_default(),
                name: name.to_string(),
            },
        }
    }

    fn build_stream_info(&mut self, first_pass: bool) -> CompileResult<bool> {
        let graph_inputs = graph_ports(&self.config.input_streams, PortKind::InputStream)?;
        for name in graph_inputs.names() {
            self.add_output_stream(NodeRef::graph_input(), name.clone(), PacketType::any())?;
        }
        self.graph_input_streams = graph_inputs.num_entries();

        let mut needs_sort = false;
        let mut unresolved = Vec::new();
        for i in 0..self.calculators.len() {
            let node = NodeRef::calculator(i);
            needs_sort |= self.add_input_streams(i, first_pass, &mut unresolved);

            let ports = self.ports(node, PortKind::OutputStream);
            self.calculators[i].output_stream_base = self.output_streams.len();
            for (name, packet_type) in ports {
                self.add_output_stream(node, name, packet_type)?;
            }
        }
        CompileError::from_errors(unresolved)?;
        Ok(needs_sort)
    }

    fn add_output_stream(
        &mut self,
        node: NodeRef,
        name: String,
        packet_type: PacketType,
    ) -> CompileResult<()> {
        if let Some(&existing) = self.stream_to_producer.get(&name) {
            return Err(CompileError::DuplicateProducer {
                what: STREAM,
                name,
                first: self.node_name(self.output_streams[existing].parent_node),
                second: self.node_name(node),
            });
        }
        self.stream_to_producer
            .insert(name.clone(), self.output_streams.len());
        self.output_streams.push(EdgeInfo {
            parent_node: node,
            name,
            packet_type,
            upstream: None,
            back_edge: false,
        });
        Ok(())
    }

    fn add_input_streams(
        &mut self,
        calculator: usize,
        first_pass: bool,
        unresolved: &mut Vec<CompileError>,
    ) -> bool {
        let node = NodeRef::calculator(calculator);
        let info = &self.calculators[calculator];
        let marked: Vec<bool> = (0..info.contract.inputs().len())
            .map(|i| info.back_edges.get(i).copied().unwrap_or(false))
            .collect();
        let ports = self.ports(node, PortKind::InputStream);
        self.calculators[calculator].input_stream_base = self.input_streams.len();

        let mut needs_sort = false;
        for ((name, packet_type), marked) in ports.into_iter().zip(marked) {
            let upstream = self.stream_to_producer.get(&name).copied();
            match upstream {
                // Warnings from a pass that triggers a sort are cleared with
                // the tables, so only the final order's warnings survive.
                Some(_) if marked => {
                    let node_name = self.node_name(node);
                    self.warnings.push(format!(
                        "input stream \"{name}\" of node \"{node_name}\" is marked as a back edge, \
                         but its producer already runs earlier; the marker is unnecessary"
                    ));
                }
                Some(_) => {}
                None if marked => {}
                None if first_pass => needs_sort = true,
                None => unresolved.push(CompileError::UnresolvedStream {
                    node: self.node_name(node),
                    name: name.clone(),
                }),
            }
            self.input_streams.push(EdgeInfo {
                parent_node: node,
                name,
                packet_type,
                upstream,
                back_edge: marked,
            });
        }
        needs_sort
    }

    // ------------------------------------------------------------------
    // Ordering
    // ------------------------------------------------------------------

    /// Sorts generators and calculators so every producer precedes its
    /// consumers, then reorders the graph and the node records to match.
    fn topological_sort(&mut self) -> CompileResult<()> {
        let num_generators = self.generators.len();
        let sort_id = |node: NodeRef| match node.kind {
            NodeKind::PacketGenerator => Some(node.index),
            NodeKind::Calculator => Some(num_generators + node.index),
            NodeKind::StatusHandler | NodeKind::GraphInputStream => None,
        };

        let mut sorter = TopologicalSorter::new(num_generators + self.calculators.len());
        for input in &self.input_side_packets {
            let Some(&producer) = self.side_packet_to_producer.get(&input.name) else {
                continue;
            };
            let from = sort_id(self.output_side_packets[producer].parent_node);
            if let (Some(from), Some(to)) = (from, sort_id(input.parent_node)) {
                sorter.add_edge(from, to)?;
            }
        }
        for input in &self.input_streams {
            if input.back_edge {
                continue;
            }
            let Some(&producer) = self.stream_to_producer.get(&input.name) else {
                continue;
            };
            let from = sort_id(self.output_streams[producer].parent_node);
            if let (Some(from), Some(to)) = (from, sort_id(input.parent_node)) {
                sorter.add_edge(from, to)?;
            }
        }

        let order = sorter.sort().map_err(|cycle| CompileError::Cycle {
            nodes: cycle
                .into_iter()
                .map(|id| {
                    if id < num_generators {
                        self.node_name(NodeRef::packet_generator(id))
                    } else {
                        self.node_name(NodeRef::calculator(id - num_generators))
                    }
                })
                .collect(),
        })?;

        let generator_order: Vec<usize> =
            order.iter().copied().filter(|&id| id < num_generators).collect();
        let calculator_order: Vec<usize> = order
            .iter()
            .filter_map(|&id| id.checked_sub(num_generators))
            .collect();

        self.config.packet_generators =
            permute(std::mem::take(&mut self.config.packet_generators), &generator_order);
        self.generators = permute(std::mem::take(&mut self.generators), &generator_order);
        self.config.nodes = permute(std::mem::take(&mut self.config.nodes), &calculator_order);
        self.calculators = permute(std::mem::take(&mut self.calculators), &calculator_order);
        for (i, info) in self.generators.iter_mut().enumerate() {
            info.node_ref = NodeRef::packet_generator(i);
        }
        for (i, info) in self.calculators.iter_mut().enumerate() {
            info.node_ref = NodeRef::calculator(i);
        }
        Ok(())
    }

    fn fill_back_edge_upstreams(&mut self) -> CompileResult<()> {
        let mut errors = Vec::new();
        for i in 0..self.input_streams.len() {
            let edge = &self.input_streams[i];
            if !edge.back_edge || edge.upstream.is_some() {
                continue;
            }
            let Some(producer) = self.stream_to_producer.get(&edge.name).copied() else {
                errors.push(CompileError::UnresolvedStream {
                    node: self.node_name(edge.parent_node),
                    name: edge.name.clone(),
                });
                continue;
            };
            self.input_streams[i].upstream = Some(producer);
        }
        CompileError::from_errors(errors)
    }

    fn compute_source_nodes(&mut self) {
        for i in 0..self.calculators.len() {
            let info = &self.calculators[i];
            let mut sources = BTreeSet::new();
            if info.contract.inputs().is_empty() {
                sources.insert(i);
            } else {
                for edge in &self.input_streams[info.input_stream_range()] {
                    if edge.back_edge {
                        continue;
                    }
                    let Some(upstream) = edge.upstream else {
                        continue;
                    };
                    let parent = self.output_streams[upstream].parent_node;
                    if parent.kind == NodeKind::Calculator && parent.index != i {
                        sources.extend(self.calculators[parent.index].source_nodes.iter());
                    }
                }
            }
            self.calculators[i].source_nodes = sources;
        }
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// Narrows wildcard types, then union types, across every bound edge:
    /// streams first, then side packets.
    ///
    /// Returns how many slots were narrowed. Narrowing never widens a type,
    /// so a second call on a resolved graph returns 0.
    pub fn resolve_types(&self) -> usize {
        narrow_any(&self.input_streams, &self.output_streams)
            + narrow_any(&self.input_side_packets, &self.output_side_packets)
            + narrow_one_of(&self.input_streams, &self.output_streams)
            + narrow_one_of(&self.input_side_packets, &self.output_side_packets)
    }

    fn type_errors(&self) -> Vec<CompileError> {
        let mut errors = Vec::new();
        for (what, inputs, outputs) in [
            (STREAM, &self.input_streams, &self.output_streams),
            (SIDE_PACKET, &self.input_side_packets, &self.output_side_packets),
        ] {
            for input in inputs {
                let Some(upstream) = input.upstream else {
                    continue;
                };
                let output = &outputs[upstream];
                if !output.packet_type.is_consistent_with(&input.packet_type) {
                    errors.push(CompileError::TypeMismatch {
                        what,
                        name: input.name.clone(),
                        producer: self.node_name(output.parent_node),
                        produced: output.packet_type.to_string(),
                        consumer: self.node_name(input.parent_node),
                        expected: input.packet_type.to_string(),
                    });
                }
            }
        }

        for (name, consumers) in &self.required_side_packets {
            let Some((&first, rest)) = consumers.split_first() else {
                continue;
            };
            let first = &self.input_side_packets[first];
            for &other in rest {
                let other = &self.input_side_packets[other];
                if !first.packet_type.is_consistent_with(&other.packet_type) {
                    errors.push(CompileError::SidePacketTypeConflict {
                        name: name.clone(),
                        first: self.node_name(first.parent_node),
                        first_type: first.packet_type.to_string(),
                        second: self.node_name(other.parent_node),
                        second_type: other.packet_type.to_string(),
                    });
                }
            }
        }
        errors
    }

    fn graph_output_errors(&self) -> CompileResult<Vec<CompileError>> {
        let mut errors = Vec::new();
        let streams = graph_ports(&self.config.output_streams, PortKind::OutputStream)?;
        for name in streams.names() {
            if !self.stream_to_producer.contains_key(name) {
                errors.push(CompileError::UnresolvedGraphOutput {
                    what: STREAM,
                    name: name.clone(),
                });
            }
        }
        let side_packets =
            graph_ports(&self.config.output_side_packets, PortKind::OutputSidePacket)?;
        for name in side_packets.names() {
            if !self.side_packet_to_producer.contains_key(name)
                && !self.required_side_packets.contains_key(name)
            {
                errors.push(CompileError::UnresolvedGraphOutput {
                    what: SIDE_PACKET,
                    name: name.clone(),
                });
            }
        }
        Ok(errors)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The expanded graph, in final node order.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Calculator records, in final order.
    pub fn calculators(&self) -> &[NodeTypeInfo] {
        &self.calculators
    }

    /// Packet generator records, in final order.
    pub fn packet_generators(&self) -> &[NodeTypeInfo] {
        &self.generators
    }

    /// Status handler records.
    pub fn status_handlers(&self) -> &[NodeTypeInfo] {
        &self.status_handlers
    }

    /// Record of `node`, if it is a real node.
    pub fn node_type_info(&self, node: NodeRef) -> Option<&NodeTypeInfo> {
        self.info(node)
    }

    /// The calculator declaration for a record.
    pub fn node_config(&self, info: &NodeTypeInfo) -> Option<&NodeConfig> {
        match info.node_ref.kind {
            NodeKind::Calculator => self.config.nodes.get(info.node_ref.index),
            _ => None,
        }
    }

    /// Every input stream endpoint, grouped by calculator.
    pub fn input_streams(&self) -> &[EdgeInfo] {
        &self.input_streams
    }

    /// Every output stream, graph inputs first.
    pub fn output_streams(&self) -> &[EdgeInfo] {
        &self.output_streams
    }

    /// Every input side-packet endpoint.
    pub fn input_side_packets(&self) -> &[EdgeInfo] {
        &self.input_side_packets
    }

    /// Every produced side packet.
    pub fn output_side_packets(&self) -> &[EdgeInfo] {
        &self.output_side_packets
    }

    /// Input stream endpoints of one node.
    pub fn node_input_streams(&self, info: &NodeTypeInfo) -> &[EdgeInfo] {
        self.input_streams.get(info.input_stream_range()).unwrap_or_default()
    }

    /// Output streams of one node.
    pub fn node_output_streams(&self, info: &NodeTypeInfo) -> &[EdgeInfo] {
        self.output_streams.get(info.output_stream_range()).unwrap_or_default()
    }

    /// Input side-packet endpoints of one node.
    pub fn node_input_side_packets(&self, info: &NodeTypeInfo) -> &[EdgeInfo] {
        self.input_side_packets
            .get(info.input_side_packet_range())
            .unwrap_or_default()
    }

    /// Output side packets of one node.
    pub fn node_output_side_packets(&self, info: &NodeTypeInfo) -> &[EdgeInfo] {
        self.output_side_packets
            .get(info.output_side_packet_range())
            .unwrap_or_default()
    }

    /// Number of graph input streams; they occupy the front of
    /// [`output_streams`](Self::output_streams).
    pub fn graph_input_stream_count(&self) -> usize {
        self.graph_input_streams
    }

    /// Index of the output stream called `name`.
    pub fn output_stream_index(&self, name: &str) -> Option<usize> {
        self.stream_to_producer.get(name).copied()
    }

    /// Index of the output side packet called `name`.
    pub fn output_side_packet_index(&self, name: &str) -> Option<usize> {
        self.side_packet_to_producer.get(name).copied()
    }

    /// Resolved type of the stream called `name`.
    pub fn stream_type(&self, name: &str) -> Option<&PacketType> {
        let index = self.output_stream_index(name)?;
        Some(&self.output_streams[index].packet_type)
    }

    /// Resolved type of the produced side packet called `name`.
    pub fn side_packet_type(&self, name: &str) -> Option<&PacketType> {
        let index = self.output_side_packet_index(name)?;
        Some(&self.output_side_packets[index].packet_type)
    }

    /// Side packets the runtime must supply, with the indices of their
    /// consumers in [`input_side_packets`](Self::input_side_packets).
    pub fn required_side_packets(&self) -> &BTreeMap<String, Vec<usize>> {
        &self.required_side_packets
    }

    /// Executors, including the synthesized default one.
    pub fn executors(&self) -> &[ExecutorConfig] {
        &self.executors
    }

    /// Soft problems found while compiling.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Generators, then calculators, in the order they run.
    pub fn node_order(&self) -> Vec<NodeRef> {
        self.generators
            .iter()
            .chain(&self.calculators)
            .map(|info| info.node_ref)
            .collect()
    }

    fn node_order_names(&self) -> Vec<String> {
        self.node_order()
            .into_iter()
            .map(|node| self.node_name(node))
            .collect()
    }
}

/// Builds a contract skeleton and fills it from the registry, reporting
/// every untyped port.
fn fill_contract(
    registry: &ContractRegistry,
    role: NodeRole,
    skeleton: Result<NodeContract, ContractError>,
) -> Result<NodeContract, Vec<CompileError>> {
    let mut contract = skeleton.map_err(|e| vec![e.into()])?;
    registry
        .fill_contract(role, &mut contract)
        .map_err(|e| vec![e.into()])?;
    let untyped = contract.untyped_ports();
    if untyped.is_empty() {
        Ok(contract)
    } else {
        Err(untyped.into_iter().map(CompileError::from).collect())
    }
}

/// One flag per input stream id, set for inputs marked as back edges.
fn back_edge_flags(node: &NodeConfig, contract: &NodeContract) -> CompileResult<Vec<bool>> {
    let mut flags = vec![false; contract.inputs().len()];
    for info in node.input_stream_info.iter().filter(|info| info.back_edge) {
        let (tag, index) = parse_tag_index(&info.tag_index)?;
        let Some(id) = contract.inputs().tag_map().get_id(&tag, index) else {
            return Err(CompileError::BackEdgeNotAnInput {
                node: contract.node_name().to_string(),
                tag_index: info.tag_index.clone(),
            });
        };
        if std::mem::replace(&mut flags[id.index()], true) {
            return Err(CompileError::DuplicateBackEdge {
                node: contract.node_name().to_string(),
                tag_index: info.tag_index.clone(),
            });
        }
    }
    Ok(flags)
}

fn graph_ports(entries: &[String], kind: PortKind) -> CompileResult<TagMap> {
    TagMap::new(entries).map_err(|source| CompileError::GraphPorts { kind, source })
}

fn permute<T>(items: Vec<T>, order: &[usize]) -> Vec<T> {
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    order.iter().filter_map(|&i| slots[i].take()).collect()
}

fn narrow_any(inputs: &[EdgeInfo], outputs: &[EdgeInfo]) -> usize {
    let mut narrowed = 0;
    for input in inputs {
        let Some(upstream) = input.upstream else {
            continue;
        };
        let output = &outputs[upstream].packet_type;
        let changed = if input.packet_type.is_any() {
            input.packet_type.narrow_to(output)
        } else if output.is_any() {
            output.narrow_to(&input.packet_type)
        } else {
            false
        };
        narrowed += usize::from(changed);
    }
    narrowed
}

fn narrow_one_of(inputs: &[EdgeInfo], outputs: &[EdgeInfo]) -> usize {
    let mut narrowed = 0;
    for input in inputs {
        let Some(upstream) = input.upstream else {
            continue;
        };
        let output = &outputs[upstream].packet_type;
        if !input.packet_type.is_consistent_with(output) {
            continue;
        }
        let changed = if input.packet_type.is_one_of() && output.is_exact() {
            input.packet_type.narrow_to(output)
        } else if output.is_one_of() && input.packet_type.is_exact() {
            output.narrow_to(&input.packet_type)
        } else {
            false
        };
        narrowed += usize::from(changed);
    }
    narrowed
}
