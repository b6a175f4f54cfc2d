//! Declarative graph specification.
//!
//! These are plain serde-friendly structs: the host decides how to load them.
//! Ports are lists of `TAG:index:name` strings (see [`crate::tag`]); options
//! are an opaque JSON value handed to contract and sub-graph callbacks.
//!
//! # Example
//!
//! ```rust
//! use flowgraph_core::{GraphConfig, NodeConfig};
//!
//! let graph = GraphConfig::new()
//!     .with_input_stream("frames")
//!     .with_node(
//!         NodeConfig::new("Blur")
//!             .with_input("IMAGE:frames")
//!             .with_output("IMAGE:blurred"),
//!     )
//!     .with_output_stream("blurred");
//!
//! assert_eq!(graph.nodes.len(), 1);
//! assert_eq!(graph.canonical_node_name(0).as_deref(), Some("Blur"));
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn is_null(value: &Value) -> bool {
    value.is_null()
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

/// A complete graph or sub-graph specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Type name the graph is registered under when used as a sub-graph.
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub graph_type: String,
    /// Namespace used to look up sub-graph types referenced by this graph.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub package: String,
    /// Computation nodes ("calculators").
    #[serde(rename = "node", skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<NodeConfig>,
    /// Side-packet generators, run once before any calculator.
    #[serde(rename = "packet_generator", skip_serializing_if = "Vec::is_empty")]
    pub packet_generators: Vec<PacketGeneratorConfig>,
    /// Status handlers, run when the graph finishes.
    #[serde(rename = "status_handler", skip_serializing_if = "Vec::is_empty")]
    pub status_handlers: Vec<StatusHandlerConfig>,
    /// Streams fed into the graph from outside.
    #[serde(rename = "input_stream", skip_serializing_if = "Vec::is_empty")]
    pub input_streams: Vec<String>,
    /// Streams observed from outside the graph.
    #[serde(rename = "output_stream", skip_serializing_if = "Vec::is_empty")]
    pub output_streams: Vec<String>,
    /// Side packets supplied from outside the graph.
    #[serde(rename = "input_side_packet", skip_serializing_if = "Vec::is_empty")]
    pub input_side_packets: Vec<String>,
    /// Side packets exported from the graph.
    #[serde(rename = "output_side_packet", skip_serializing_if = "Vec::is_empty")]
    pub output_side_packets: Vec<String>,
    /// Named executors nodes may be assigned to.
    #[serde(rename = "executor", skip_serializing_if = "Vec::is_empty")]
    pub executors: Vec<ExecutorConfig>,
    /// Thread count for the default executor; 0 leaves the choice to the host.
    #[serde(skip_serializing_if = "is_zero")]
    pub num_threads: usize,
    /// Graph-level options, visible to sub-graph factories.
    #[serde(skip_serializing_if = "is_null")]
    pub options: Value,
}

impl GraphConfig {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the type name used when registering this graph as a sub-graph.
    pub fn with_type(mut self, graph_type: impl Into<String>) -> Self {
        self.graph_type = graph_type.into();
        self
    }

    /// Sets the sub-graph lookup namespace.
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// Appends a computation node.
    pub fn with_node(mut self, node: NodeConfig) -> Self {
        self.nodes.push(node);
        self
    }

    /// Appends a packet generator.
    pub fn with_packet_generator(mut self, generator: PacketGeneratorConfig) -> Self {
        self.packet_generators.push(generator);
        self
    }

    /// Appends a status handler.
    pub fn with_status_handler(mut self, handler: StatusHandlerConfig) -> Self {
        self.status_handlers.push(handler);
        self
    }

    /// Declares a graph input stream.
    pub fn with_input_stream(mut self, entry: impl Into<String>) -> Self {
        self.input_streams.push(entry.into());
        self
    }

    /// Declares a graph output stream.
    pub fn with_output_stream(mut self, entry: impl Into<String>) -> Self {
        self.output_streams.push(entry.into());
        self
    }

    /// Declares a graph input side packet.
    pub fn with_input_side_packet(mut self, entry: impl Into<String>) -> Self {
        self.input_side_packets.push(entry.into());
        self
    }

    /// Declares a graph output side packet.
    pub fn with_output_side_packet(mut self, entry: impl Into<String>) -> Self {
        self.output_side_packets.push(entry.into());
        self
    }

    /// Declares an executor.
    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executors.push(executor);
        self
    }

    /// Sets the default executor's thread count.
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Sets graph-level options.
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    /// Name used for node `index` in diagnostics, or `None` when out of
    /// range.
    ///
    /// The node's own name when set, otherwise its type. A name shared by
    /// several nodes gets a 1-based `_<n>` occurrence suffix.
    pub fn canonical_node_name(&self, index: usize) -> Option<String> {
        let name = self.nodes.get(index)?.display_name();
        let mut total = 0;
        let mut occurrence = 0;
        for (i, node) in self.nodes.iter().enumerate() {
            if node.display_name() == name {
                total += 1;
                if i <= index {
                    occurrence += 1;
                }
            }
        }
        Some(if total == 1 {
            name.to_string()
        } else {
            format!("{name}_{occurrence}")
        })
    }

    /// Canonical names of all nodes, in node order.
    pub fn canonical_node_names(&self) -> Vec<String> {
        disambiguate(self.nodes.iter().map(NodeConfig::display_name).collect())
    }

    /// Diagnostic names of the packet generators: their type, with the same
    /// `_<n>` suffix as nodes when a type repeats.
    pub fn canonical_packet_generator_names(&self) -> Vec<String> {
        disambiguate(
            self.packet_generators
                .iter()
                .map(|g| g.packet_generator.as_str())
                .collect(),
        )
    }

    /// Diagnostic names of the status handlers, disambiguated like
    /// [`canonical_packet_generator_names`](Self::canonical_packet_generator_names).
    pub fn canonical_status_handler_names(&self) -> Vec<String> {
        disambiguate(
            self.status_handlers
                .iter()
                .map(|h| h.status_handler.as_str())
                .collect(),
        )
    }
}

fn disambiguate(base: Vec<&str>) -> Vec<String> {
    let mut totals: HashMap<&str, usize> = HashMap::new();
    for name in &base {
        *totals.entry(*name).or_default() += 1;
    }
    let mut seen: HashMap<&str, usize> = HashMap::new();
    base.iter()
        .map(|name| {
            if totals[name] == 1 {
                (*name).to_string()
            } else {
                let occurrence = seen.entry(*name).or_default();
                *occurrence += 1;
                format!("{name}_{occurrence}")
            }
        })
        .collect()
}

/// Back-edge marker for one input stream of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputStreamInfo {
    /// `TAG:index` address of the input.
    pub tag_index: String,
    /// The input closes a deliberate cycle; its producer need not run first.
    pub back_edge: bool,
}

/// A computation node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Optional instance name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Registered node type, or a sub-graph type.
    #[serde(rename = "calculator")]
    pub node_type: String,
    /// Consumed streams.
    #[serde(rename = "input_stream", skip_serializing_if = "Vec::is_empty")]
    pub input_streams: Vec<String>,
    /// Produced streams.
    #[serde(rename = "output_stream", skip_serializing_if = "Vec::is_empty")]
    pub output_streams: Vec<String>,
    /// Consumed side packets.
    #[serde(rename = "input_side_packet", skip_serializing_if = "Vec::is_empty")]
    pub input_side_packets: Vec<String>,
    /// Produced side packets.
    #[serde(rename = "output_side_packet", skip_serializing_if = "Vec::is_empty")]
    pub output_side_packets: Vec<String>,
    /// Opaque options payload.
    #[serde(skip_serializing_if = "is_null")]
    pub options: Value,
    /// Executor the node runs on; empty for the default executor.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub executor: String,
    /// Queue size hint for the node's input streams.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size_hint: Option<u32>,
    /// Explicit input stream handler type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_stream_handler: Option<String>,
    /// Explicit output stream handler type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_stream_handler: Option<String>,
    /// Per-input markers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub input_stream_info: Vec<InputStreamInfo>,
    /// Scheduling layer for source nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<i32>,
}

impl NodeConfig {
    /// Creates a node of the given type.
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            ..Self::default()
        }
    }

    /// Sets the instance name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Appends an input stream entry.
    pub fn with_input(mut self, entry: impl Into<String>) -> Self {
        self.input_streams.push(entry.into());
        self
    }

    /// Appends an output stream entry.
    pub fn with_output(mut self, entry: impl Into<String>) -> Self {
        self.output_streams.push(entry.into());
        self
    }

    /// Appends an input side-packet entry.
    pub fn with_input_side_packet(mut self, entry: impl Into<String>) -> Self {
        self.input_side_packets.push(entry.into());
        self
    }

    /// Appends an output side-packet entry.
    pub fn with_output_side_packet(mut self, entry: impl Into<String>) -> Self {
        self.output_side_packets.push(entry.into());
        self
    }

    /// Sets the options payload.
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    /// Assigns the node to an executor.
    pub fn with_executor(mut self, executor: impl Into<String>) -> Self {
        self.executor = executor.into();
        self
    }

    /// Marks the input at `tag_index` as a back edge.
    pub fn with_back_edge(mut self, tag_index: impl Into<String>) -> Self {
        self.input_stream_info.push(InputStreamInfo {
            tag_index: tag_index.into(),
            back_edge: true,
        });
        self
    }

    /// Instance name if set, else the node type.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.node_type
        } else {
            &self.name
        }
    }
}

/// A side-packet generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketGeneratorConfig {
    /// Registered generator type.
    pub packet_generator: String,
    /// Opaque options payload.
    #[serde(skip_serializing_if = "is_null")]
    pub options: Value,
    /// Consumed side packets.
    #[serde(rename = "input_side_packet", skip_serializing_if = "Vec::is_empty")]
    pub input_side_packets: Vec<String>,
    /// Produced side packets.
    #[serde(rename = "output_side_packet", skip_serializing_if = "Vec::is_empty")]
    pub output_side_packets: Vec<String>,
}

impl PacketGeneratorConfig {
    /// Creates a generator of the given type.
    pub fn new(packet_generator: impl Into<String>) -> Self {
        Self {
            packet_generator: packet_generator.into(),
            ..Self::default()
        }
    }

    /// Appends an input side-packet entry.
    pub fn with_input_side_packet(mut self, entry: impl Into<String>) -> Self {
        self.input_side_packets.push(entry.into());
        self
    }

    /// Appends an output side-packet entry.
    pub fn with_output_side_packet(mut self, entry: impl Into<String>) -> Self {
        self.output_side_packets.push(entry.into());
        self
    }

    /// Sets the options payload.
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }
}

/// A status handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusHandlerConfig {
    /// Registered handler type.
    pub status_handler: String,
    /// Opaque options payload.
    #[serde(skip_serializing_if = "is_null")]
    pub options: Value,
    /// Consumed side packets.
    #[serde(rename = "input_side_packet", skip_serializing_if = "Vec::is_empty")]
    pub input_side_packets: Vec<String>,
}

impl StatusHandlerConfig {
    /// Creates a handler of the given type.
    pub fn new(status_handler: impl Into<String>) -> Self {
        Self {
            status_handler: status_handler.into(),
            ..Self::default()
        }
    }

    /// Appends an input side-packet entry.
    pub fn with_input_side_packet(mut self, entry: impl Into<String>) -> Self {
        self.input_side_packets.push(entry.into());
        self
    }
}

/// A named executor declaration. The empty name is the default executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Executor name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Executor implementation type, e.g. `ThreadPoolExecutor`.
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub executor_type: String,
    /// Opaque options payload.
    #[serde(skip_serializing_if = "is_null")]
    pub options: Value,
}

impl ExecutorConfig {
    /// Creates an executor declaration.
    pub fn new(name: impl Into<String>, executor_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executor_type: executor_type.into(),
            options: Value::Null,
        }
    }

    /// Sets the options payload.
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_disambiguate_repeats() {
        let graph = GraphConfig::new()
            .with_node(NodeConfig::new("Pass"))
            .with_node(NodeConfig::new("Pass"))
            .with_node(NodeConfig::new("Pass").with_name("named"))
            .with_node(NodeConfig::new("Sink"));
        assert_eq!(
            graph.canonical_node_names(),
            vec!["Pass_1", "Pass_2", "named", "Sink"]
        );
        for (i, name) in graph.canonical_node_names().iter().enumerate() {
            assert_eq!(graph.canonical_node_name(i).as_ref(), Some(name));
        }
        assert_eq!(graph.canonical_node_name(4), None);
    }

    #[test]
    fn repeated_generators_and_handlers_get_suffixes() {
        let graph = GraphConfig::new()
            .with_packet_generator(PacketGeneratorConfig::new("Seed"))
            .with_packet_generator(PacketGeneratorConfig::new("Clock"))
            .with_packet_generator(PacketGeneratorConfig::new("Seed"))
            .with_status_handler(StatusHandlerConfig::new("Report"));
        assert_eq!(
            graph.canonical_packet_generator_names(),
            vec!["Seed_1", "Clock", "Seed_2"]
        );
        assert_eq!(graph.canonical_status_handler_names(), vec!["Report"]);
    }

    #[test]
    fn builders_fill_fields() {
        let node = NodeConfig::new("Loop")
            .with_name("loop")
            .with_input("in")
            .with_input("LOOP:fed_back")
            .with_output("out")
            .with_back_edge("LOOP")
            .with_executor("io");
        assert_eq!(node.display_name(), "loop");
        assert_eq!(node.input_streams, vec!["in", "LOOP:fed_back"]);
        assert_eq!(node.input_stream_info[0].tag_index, "LOOP");
        assert!(node.input_stream_info[0].back_edge);
        assert_eq!(node.executor, "io");
    }

    #[test]
    fn serde_skips_empty_fields() {
        let graph = GraphConfig::new().with_node(NodeConfig::new("Pass").with_input("a"));
        let json = serde_json::to_string(&graph).unwrap();
        assert_eq!(json, r#"{"node":[{"calculator":"Pass","input_stream":["a"]}]}"#);
        let back: GraphConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, graph);
    }
}
