//! Sub-graph expansion.
//!
//! Every node whose type is a registered sub-graph is replaced by the
//! fragment the registry produces for it, until no sub-graph nodes remain.
//! Each instance gets a fresh `__sg<n>_` prefix on every internal stream,
//! side packet and node name, so two instances of one sub-graph never
//! collide. The fragment's declared graph inputs and outputs are then bound
//! to the names the wrapping node uses, matched by tag and index.
//!
//! ```rust
//! use flowgraph_config::expand_subgraphs;
//! use flowgraph_core::{GraphConfig, NodeConfig};
//! use flowgraph_registry::{ServiceSet, SubgraphRegistry};
//!
//! let mut registry = SubgraphRegistry::new();
//! registry
//!     .register_graph(
//!         GraphConfig::new()
//!             .with_type("Twice")
//!             .with_input_stream("IN:x")
//!             .with_output_stream("OUT:z")
//!             .with_node(NodeConfig::new("Double").with_input("x").with_output("y"))
//!             .with_node(NodeConfig::new("Double").with_input("y").with_output("z")),
//!     )
//!     .unwrap();
//!
//! let graph = GraphConfig::new().with_node(
//!     NodeConfig::new("Twice").with_input("IN:a").with_output("OUT:b"),
//! );
//! let expanded = expand_subgraphs(graph, &registry, &ServiceSet::new()).unwrap();
//!
//! assert_eq!(expanded.nodes[0].input_streams, vec!["a"]);
//! assert_eq!(expanded.nodes[0].output_streams, vec!["__sg0_y"]);
//! assert_eq!(expanded.nodes[1].output_streams, vec!["b"]);
//! ```

use std::collections::{HashMap, HashSet};

use flowgraph_core::tag::{replace_name, split_name};
use flowgraph_core::{GraphConfig, NodeConfig, PortKind, TagMap};
use flowgraph_registry::{ServiceSet, SubgraphContext, SubgraphRegistry};

use crate::error::{CompileError, CompileResult};
use crate::options::DEFAULT_MAX_EXPANSION_PASSES;

/// Expands every sub-graph node of `config` with the default pass limit.
pub fn expand_subgraphs(
    config: GraphConfig,
    registry: &SubgraphRegistry,
    services: &ServiceSet,
) -> CompileResult<GraphConfig> {
    Expander::new(registry, services).expand(config)
}

/// Sub-graph expander.
///
/// The instance counter lives here rather than in a global, so every call to
/// [`expand`](Self::expand) on a fresh expander starts at `__sg0_`.
#[derive(Debug)]
pub struct Expander<'a> {
    registry: &'a SubgraphRegistry,
    services: &'a ServiceSet,
    max_passes: usize,
    next_instance: usize,
}

impl<'a> Expander<'a> {
    /// Creates an expander over `registry`.
    pub fn new(registry: &'a SubgraphRegistry, services: &'a ServiceSet) -> Self {
        Self {
            registry,
            services,
            max_passes: DEFAULT_MAX_EXPANSION_PASSES,
            next_instance: 0,
        }
    }

    /// Sets the pass limit.
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Number of sub-graph instances expanded so far.
    pub fn instances(&self) -> usize {
        self.next_instance
    }

    /// Expands until no sub-graph nodes remain.
    ///
    /// A graph without sub-graph nodes is returned unchanged.
    pub fn expand(&mut self, mut config: GraphConfig) -> CompileResult<GraphConfig> {
        let declared_executors: HashSet<String> =
            config.executors.iter().map(|e| e.name.clone()).collect();

        let mut passes = 0;
        loop {
            let package = config.package.clone();
            let (ordinary, wrapped): (Vec<_>, Vec<_>) = config
                .nodes
                .iter()
                .enumerate()
                .partition(|(_, node)| !self.registry.is_subgraph(&package, &node.node_type));
            if wrapped.is_empty() {
                return Ok(config);
            }
            if passes == self.max_passes {
                return Err(CompileError::ExpansionLimit {
                    passes,
                    node_type: wrapped[0].1.node_type.clone(),
                });
            }
            passes += 1;

            let names = config.canonical_node_names();
            let mut fragments = Vec::with_capacity(wrapped.len());
            for &(index, node) in &wrapped {
                let fragment = self.instantiate(&package, node, &names[index])?;
                fragments.push(fragment);
            }
            tracing::debug!(
                pass = passes,
                expanded = fragments.len(),
                "expanded sub-graph nodes"
            );

            let mut nodes: Vec<NodeConfig> =
                ordinary.into_iter().map(|(_, node)| node.clone()).collect();
            for mut fragment in fragments {
                for executor in &fragment.executors {
                    if executor.name.is_empty() || declared_executors.contains(&executor.name) {
                        continue;
                    }
                    for node in &mut fragment.nodes {
                        if node.executor == executor.name {
                            tracing::warn!(
                                node = %node.display_name(),
                                executor = %executor.name,
                                "sub-graph executor is not declared by the enclosing graph; \
                                 node falls back to the default executor"
                            );
                            node.executor.clear();
                        }
                    }
                }
                nodes.append(&mut fragment.nodes);
                config
                    .packet_generators
                    .append(&mut fragment.packet_generators);
                config.status_handlers.append(&mut fragment.status_handlers);
            }
            config.nodes = nodes;
        }
    }

    /// Produces the renamed, rewired fragment for one wrapping node.
    fn instantiate(
        &mut self,
        package: &str,
        node: &NodeConfig,
        node_name: &str,
    ) -> CompileResult<GraphConfig> {
        check_subgraph_fields(node, node_name)?;
        let context = SubgraphContext::new(node, self.services);
        let mut fragment = self.registry.create(package, &context)?;

        let prefix = format!("__sg{}_", self.next_instance);
        self.next_instance += 1;

        let mut streams = HashMap::new();
        bind_ports(
            &mut streams,
            node,
            node_name,
            PortKind::InputStream,
            &node.input_streams,
            &fragment.input_streams,
        )?;
        bind_ports(
            &mut streams,
            node,
            node_name,
            PortKind::OutputStream,
            &node.output_streams,
            &fragment.output_streams,
        )?;
        let mut side_packets = HashMap::new();
        bind_ports(
            &mut side_packets,
            node,
            node_name,
            PortKind::InputSidePacket,
            &node.input_side_packets,
            &fragment.input_side_packets,
        )?;
        bind_ports(
            &mut side_packets,
            node,
            node_name,
            PortKind::OutputSidePacket,
            &node.output_side_packets,
            &fragment.output_side_packets,
        )?;

        let stream = Renamer {
            prefix: &prefix,
            bound: &streams,
        };
        let side_packet = Renamer {
            prefix: &prefix,
            bound: &side_packets,
        };

        for inner in &mut fragment.nodes {
            if !inner.name.is_empty() {
                inner.name = format!("{prefix}{}", inner.name);
            }
            stream.apply(&mut inner.input_streams);
            stream.apply(&mut inner.output_streams);
            side_packet.apply(&mut inner.input_side_packets);
            side_packet.apply(&mut inner.output_side_packets);
        }
        for generator in &mut fragment.packet_generators {
            side_packet.apply(&mut generator.input_side_packets);
            side_packet.apply(&mut generator.output_side_packets);
        }
        for handler in &mut fragment.status_handlers {
            side_packet.apply(&mut handler.input_side_packets);
        }
        Ok(fragment)
    }
}

/// Rejects fields that have no meaning on a node that disappears.
fn check_subgraph_fields(node: &NodeConfig, node_name: &str) -> CompileResult<()> {
    let field = if node.source_layer.is_some() {
        Some("source_layer")
    } else if node.buffer_size_hint.is_some() {
        Some("buffer_size_hint")
    } else if node.input_stream_handler.is_some() {
        Some("input_stream_handler")
    } else if node.output_stream_handler.is_some() {
        Some("output_stream_handler")
    } else if !node.input_stream_info.is_empty() {
        Some("input_stream_info")
    } else if !node.executor.is_empty() {
        Some("executor")
    } else {
        None
    };
    match field {
        Some(field) => Err(CompileError::SubgraphField {
            node: node_name.to_string(),
            node_type: node.node_type.clone(),
            field,
        }),
        None => Ok(()),
    }
}

fn port_map(entries: &[String], kind: PortKind) -> CompileResult<TagMap> {
    TagMap::new(entries).map_err(|source| CompileError::GraphPorts { kind, source })
}

/// Records, for every port the wrapping node binds, which fragment-internal
/// name it replaces.
fn bind_ports(
    bound: &mut HashMap<String, String>,
    node: &NodeConfig,
    node_name: &str,
    kind: PortKind,
    outer: &[String],
    inner: &[String],
) -> CompileResult<()> {
    let outer = TagMap::new(outer).map_err(|source| flowgraph_core::ContractError::Ports {
        node: node_name.to_string(),
        kind,
        source,
    })?;
    let inner = port_map(inner, kind)?;

    for (tag, data) in outer.mapping() {
        if !inner.has_tag(tag) {
            return Err(CompileError::UnknownSubgraphTag {
                node: node_name.to_string(),
                subgraph: node.node_type.clone(),
                kind,
                tag: tag.to_string(),
            });
        }
        let subgraph_count = inner.num_entries_for(tag);
        if subgraph_count != data.count {
            return Err(CompileError::TagCountMismatch {
                node: node_name.to_string(),
                subgraph: node.node_type.clone(),
                kind,
                tag: tag.to_string(),
                node_count: data.count,
                subgraph_count,
            });
        }
        for (outer_id, inner_id) in outer.ids_for(tag).zip(inner.ids_for(tag)) {
            if let (Some(from), Some(to)) = (inner.name(inner_id), outer.name(outer_id)) {
                bound.insert(from.to_string(), to.to_string());
            }
        }
    }
    // Every fragment port needs a binding; a missing tag counts as zero.
    if let Some((tag, data)) = inner.mapping().find(|(tag, _)| !outer.has_tag(tag)) {
        return Err(CompileError::TagCountMismatch {
            node: node_name.to_string(),
            subgraph: node.node_type.clone(),
            kind,
            tag: tag.to_string(),
            node_count: 0,
            subgraph_count: data.count,
        });
    }
    Ok(())
}

/// Rewrites the name part of port entries: bound names take the wrapping
/// node's name, everything else gets the instance prefix.
struct Renamer<'a> {
    prefix: &'a str,
    bound: &'a HashMap<String, String>,
}

impl Renamer<'_> {
    fn rename(&self, entry: &str) -> String {
        let (_, name) = split_name(entry);
        match self.bound.get(name) {
            Some(outer) => replace_name(entry, outer),
            None => replace_name(entry, &format!("{}{name}", self.prefix)),
        }
    }

    fn apply(&self, entries: &mut [String]) {
        for entry in entries {
            *entry = self.rename(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph_core::{ExecutorConfig, PacketGeneratorConfig};
    use flowgraph_registry::SubgraphError;

    fn registry_with(graph: GraphConfig) -> SubgraphRegistry {
        let mut registry = SubgraphRegistry::new();
        registry.register_graph(graph).unwrap();
        registry
    }

    fn scale_graph() -> GraphConfig {
        GraphConfig::new()
            .with_type("Scale")
            .with_input_stream("VALUE:in")
            .with_output_stream("VALUE:out")
            .with_input_side_packet("FACTOR:factor")
            .with_node(
                NodeConfig::new("Multiply")
                    .with_name("mul")
                    .with_input("in")
                    .with_input_side_packet("factor")
                    .with_output("tmp"),
            )
            .with_node(NodeConfig::new("Clamp").with_input("tmp").with_output("out"))
    }

    #[test]
    fn graph_without_subgraphs_is_unchanged() {
        let graph = GraphConfig::new()
            .with_input_stream("a")
            .with_node(NodeConfig::new("Pass").with_input("a").with_output("b"));
        let registry = registry_with(scale_graph());
        let expanded = expand_subgraphs(graph.clone(), &registry, &ServiceSet::new()).unwrap();
        assert_eq!(expanded, graph);
    }

    #[test]
    fn ports_bind_and_internals_get_prefixed() {
        let graph = GraphConfig::new().with_node(
            NodeConfig::new("Scale")
                .with_input("VALUE:raw")
                .with_output("VALUE:scaled")
                .with_input_side_packet("FACTOR:gain"),
        );
        let registry = registry_with(scale_graph());
        let expanded = expand_subgraphs(graph, &registry, &ServiceSet::new()).unwrap();

        assert_eq!(expanded.nodes.len(), 2);
        let mul = &expanded.nodes[0];
        assert_eq!(mul.name, "__sg0_mul");
        assert_eq!(mul.input_streams, vec!["raw"]);
        assert_eq!(mul.input_side_packets, vec!["gain"]);
        assert_eq!(mul.output_streams, vec!["__sg0_tmp"]);
        let clamp = &expanded.nodes[1];
        assert!(clamp.name.is_empty());
        assert_eq!(clamp.input_streams, vec!["__sg0_tmp"]);
        assert_eq!(clamp.output_streams, vec!["scaled"]);
    }

    #[test]
    fn tags_and_indices_survive_renaming() {
        let fragment = GraphConfig::new()
            .with_type("Fan")
            .with_input_stream("IN:src")
            .with_node(
                NodeConfig::new("Split")
                    .with_input("IN:src")
                    .with_output("OUT:0:left")
                    .with_output("OUT:1:right"),
            );
        let graph = GraphConfig::new().with_node(NodeConfig::new("Fan").with_input("IN:feed"));
        let expanded = expand_subgraphs(graph, &registry_with(fragment), &ServiceSet::new()).unwrap();
        let split = &expanded.nodes[0];
        assert_eq!(split.input_streams, vec!["IN:feed"]);
        assert_eq!(split.output_streams, vec!["OUT:0:__sg0_left", "OUT:1:__sg0_right"]);
    }

    #[test]
    fn ordinary_nodes_come_first() {
        let graph = GraphConfig::new()
            .with_node(
                NodeConfig::new("Scale")
                    .with_input("VALUE:a")
                    .with_output("VALUE:b")
                    .with_input_side_packet("FACTOR:f"),
            )
            .with_node(NodeConfig::new("Source").with_output("a"))
            .with_node(NodeConfig::new("Sink").with_input("b"));
        let expanded = expand_subgraphs(graph, &registry_with(scale_graph()), &ServiceSet::new())
            .unwrap();
        let types: Vec<&str> = expanded.nodes.iter().map(|n| n.node_type.as_str()).collect();
        assert_eq!(types, vec!["Source", "Sink", "Multiply", "Clamp"]);
    }

    #[test]
    fn count_mismatch_names_tag_and_counts() {
        let graph = GraphConfig::new().with_node(
            NodeConfig::new("Scale")
                .with_input("VALUE:0:a")
                .with_input("VALUE:1:b"),
        );
        let err = expand_subgraphs(graph, &registry_with(scale_graph()), &ServiceSet::new())
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::TagCountMismatch {
                node: "Scale".to_string(),
                subgraph: "Scale".to_string(),
                kind: PortKind::InputStream,
                tag: "VALUE".to_string(),
                node_count: 2,
                subgraph_count: 1,
            }
        );
    }

    #[test]
    fn omitted_fragment_tag_is_a_count_mismatch() {
        let fragment = GraphConfig::new()
            .with_type("Mix")
            .with_input_stream("VALUE:0:left")
            .with_input_stream("VALUE:1:right")
            .with_output_stream("out")
            .with_node(
                NodeConfig::new("Add")
                    .with_input("left")
                    .with_input("right")
                    .with_output("out"),
            );
        let graph = GraphConfig::new().with_node(NodeConfig::new("Mix").with_output("mixed"));
        let err = expand_subgraphs(graph, &registry_with(fragment), &ServiceSet::new())
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::TagCountMismatch {
                node: "Mix".to_string(),
                subgraph: "Mix".to_string(),
                kind: PortKind::InputStream,
                tag: "VALUE".to_string(),
                node_count: 0,
                subgraph_count: 2,
            }
        );
    }

    #[test]
    fn omitted_side_packet_tag_is_reported() {
        let graph = GraphConfig::new().with_node(
            NodeConfig::new("Scale")
                .with_input("VALUE:raw")
                .with_output("VALUE:scaled"),
        );
        let err = expand_subgraphs(graph, &registry_with(scale_graph()), &ServiceSet::new())
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::TagCountMismatch {
                kind: PortKind::InputSidePacket,
                node_count: 0,
                subgraph_count: 1,
                ref tag,
                ..
            } if tag == "FACTOR"
        ));
    }

    #[test]
    fn unknown_tag_on_wrapping_node() {
        let graph = GraphConfig::new().with_node(NodeConfig::new("Scale").with_input("OTHER:a"));
        let err = expand_subgraphs(graph, &registry_with(scale_graph()), &ServiceSet::new())
            .unwrap_err();
        assert!(matches!(err, CompileError::UnknownSubgraphTag { ref tag, .. } if tag == "OTHER"));
    }

    #[test]
    fn computation_only_fields_are_rejected() {
        let mut node = NodeConfig::new("Scale").with_name("scaler");
        node.buffer_size_hint = Some(4);
        let graph = GraphConfig::new().with_node(node);
        let err = expand_subgraphs(graph, &registry_with(scale_graph()), &ServiceSet::new())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "sub-graph node \"scaler\" (Scale) sets \"buffer_size_hint\", which only computation nodes support"
        );
    }

    #[test]
    fn nested_subgraphs_share_one_counter() {
        let outer = GraphConfig::new()
            .with_type("DoubleScale")
            .with_input_stream("VALUE:x")
            .with_output_stream("VALUE:y")
            .with_input_side_packet("FACTOR:factor")
            .with_node(
                NodeConfig::new("Scale")
                    .with_input("VALUE:x")
                    .with_output("VALUE:mid")
                    .with_input_side_packet("FACTOR:factor"),
            )
            .with_node(
                NodeConfig::new("Scale")
                    .with_input("VALUE:mid")
                    .with_output("VALUE:y")
                    .with_input_side_packet("FACTOR:factor"),
            );
        let mut registry = registry_with(scale_graph());
        registry.register_graph(outer).unwrap();

        let graph = GraphConfig::new().with_node(
            NodeConfig::new("DoubleScale")
                .with_input("VALUE:in")
                .with_output("VALUE:out")
                .with_input_side_packet("FACTOR:gain"),
        );
        let services = ServiceSet::new();
        let mut expander = Expander::new(&registry, &services);
        let expanded = expander.expand(graph).unwrap();
        assert_eq!(expander.instances(), 3);

        let streams: Vec<(&[String], &[String])> = expanded
            .nodes
            .iter()
            .map(|n| (n.input_streams.as_slice(), n.output_streams.as_slice()))
            .collect();
        assert_eq!(streams[0].0, ["in"]);
        assert_eq!(streams[0].1, ["__sg1_tmp"]);
        assert_eq!(streams[1].1, ["__sg0_mid"]);
        assert_eq!(streams[2].0, ["__sg0_mid"]);
        assert_eq!(streams[3].1, ["out"]);
        assert!(expanded.nodes.iter().all(|n| n.input_side_packets.iter().all(|p| p != "factor")));
        assert_eq!(expanded.nodes[0].input_side_packets, vec!["gain"]);
    }

    #[test]
    fn self_reference_hits_pass_limit() {
        let looping = GraphConfig::new()
            .with_type("Forever")
            .with_node(NodeConfig::new("Forever"));
        let registry = registry_with(looping);
        let services = ServiceSet::new();
        let err = Expander::new(&registry, &services)
            .with_max_passes(5)
            .expand(GraphConfig::new().with_node(NodeConfig::new("Forever")))
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::ExpansionLimit {
                passes: 5,
                node_type: "Forever".to_string(),
            }
        );
    }

    #[test]
    fn fragment_executors_are_not_imported() {
        let fragment = GraphConfig::new()
            .with_type("Offload")
            .with_executor(ExecutorConfig::new("private", "ThreadPoolExecutor"))
            .with_node(NodeConfig::new("Work").with_executor("private"))
            .with_node(NodeConfig::new("Work").with_executor("shared"))
            .with_packet_generator(PacketGeneratorConfig::new("Seed").with_output_side_packet("seed"));
        let graph = GraphConfig::new()
            .with_executor(ExecutorConfig::new("shared", "ThreadPoolExecutor"))
            .with_node(NodeConfig::new("Offload"));
        let expanded = expand_subgraphs(graph, &registry_with(fragment), &ServiceSet::new())
            .unwrap();

        assert_eq!(expanded.executors.len(), 1);
        assert_eq!(expanded.nodes[0].executor, "");
        assert_eq!(expanded.nodes[1].executor, "shared");
        assert_eq!(expanded.packet_generators[0].output_side_packets, vec!["__sg0_seed"]);
    }

    #[test]
    fn factory_errors_propagate() {
        let mut registry = SubgraphRegistry::new();
        registry.register_factory("Picky", |ctx| Err(ctx.invalid_options("nope")));
        let graph = GraphConfig::new().with_node(NodeConfig::new("Picky"));
        let err = expand_subgraphs(graph, &registry, &ServiceSet::new()).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Subgraph(SubgraphError::InvalidOptions { .. })
        ));
    }
}
