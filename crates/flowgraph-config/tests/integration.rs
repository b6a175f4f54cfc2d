//! Integration tests for flowgraph-config.
//!
//! Graphs are written as TOML fixtures and compiled end to end: sub-graph
//! factories with options and services, reordering, back edges, type
//! narrowing across expanded fragments, and error aggregation.

use std::sync::{Arc, Mutex};

use flowgraph_config::{
    CompileError, CompileOptions, NodeKind, ValidatedGraphConfig, expand_subgraphs,
};
use flowgraph_core::{GraphConfig, NodeConfig, TypeSpec};
use flowgraph_registry::{
    ContractRegistry, GraphService, ServiceSet, SubgraphError, SubgraphRegistry,
};

// ============================================================================
// Fixtures
// ============================================================================

fn parse(toml_text: &str) -> GraphConfig {
    toml::from_str(toml_text).expect("fixture parses")
}

fn contracts() -> ContractRegistry {
    let mut registry = ContractRegistry::with_builtins();
    registry.register_calculator("X", |c| {
        c.inputs().set_all_any();
        c.outputs().set_all_any();
        if let (Some(input), Some(output)) = (c.inputs().get("", 0), c.outputs().get("", 0)) {
            output.set_same_as(input);
        }
        Ok(())
    });
    registry.register_calculator("IntSource", |c| {
        c.outputs().require("", 0)?.set_exact("i32");
        Ok(())
    });
    registry.register_calculator("NumberSink", |c| {
        c.inputs().require("", 0)?.set_one_of(["i32", "f64"]);
        Ok(())
    });
    registry.register_calculator("TextSink", |c| {
        c.inputs().require("", 0)?.set_exact("String");
        Ok(())
    });
    registry.register_calculator("Merge", |c| {
        c.inputs().set_all_any();
        c.outputs().require("", 0)?.set_same_as(c.inputs().require("", 0)?);
        Ok(())
    });
    registry
}

/// Registers `Chain`: `chain_length` nodes of `node_type` wired in series,
/// reading `stream_0` and writing `stream_<chain_length>`.
fn chain_factory(registry: &mut SubgraphRegistry) {
    registry.register_factory("Chain", |ctx| {
        let length = ctx
            .options()
            .get("chain_length")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| ctx.invalid_options("chain_length must be a positive integer"))?;
        let node_type = ctx
            .options()
            .get("node_type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ctx.invalid_options("node_type is required"))?;
        if length == 0 {
            return Err(ctx.invalid_options("chain_length must be a positive integer"));
        }

        let mut fragment = GraphConfig::new()
            .with_input_stream("stream_0")
            .with_output_stream(format!("stream_{length}"));
        for i in 0..length {
            fragment = fragment.with_node(
                NodeConfig::new(node_type)
                    .with_input(format!("stream_{i}"))
                    .with_output(format!("stream_{}", i + 1)),
            );
        }
        Ok(fragment)
    });
}

fn subgraphs() -> SubgraphRegistry {
    let mut registry = SubgraphRegistry::new();
    chain_factory(&mut registry);
    registry
}

fn compile(config: GraphConfig) -> Result<ValidatedGraphConfig, CompileError> {
    ValidatedGraphConfig::initialize(
        config,
        &contracts(),
        &subgraphs(),
        &ServiceSet::new(),
        &CompileOptions::default().with_default_num_threads(1),
    )
}

const CHAIN_GRAPH: &str = r#"
input_stream = ["in"]
output_stream = ["out"]

[[node]]
calculator = "Chain"
input_stream = ["in"]
output_stream = ["out"]
options = { chain_length = 3, node_type = "X" }
"#;

// ============================================================================
// 1. Sub-graph expansion
// ============================================================================

#[test]
fn chain_factory_expands_in_series() {
    let graph = compile(parse(CHAIN_GRAPH)).unwrap();
    let nodes = &graph.config().nodes;
    assert_eq!(nodes.len(), 3);
    assert!(nodes.iter().all(|n| n.node_type == "X"));
    assert_eq!(nodes[0].input_streams, vec!["in"]);
    assert_eq!(nodes[0].output_streams, vec!["__sg0_stream_1"]);
    assert_eq!(nodes[1].output_streams, vec!["__sg0_stream_2"]);
    assert_eq!(nodes[2].output_streams, vec!["out"]);
    assert_eq!(graph.output_stream_index("out"), Some(3));
}

#[test]
fn two_instances_do_not_collide() {
    let config = parse(
        r#"
input_stream = ["in"]

[[node]]
calculator = "Chain"
input_stream = ["in"]
output_stream = ["mid"]
options = { chain_length = 2, node_type = "X" }

[[node]]
calculator = "Chain"
input_stream = ["mid"]
output_stream = ["out"]
options = { chain_length = 2, node_type = "X" }
"#,
    );
    let graph = compile(config).unwrap();
    let outputs: Vec<&str> = graph
        .config()
        .nodes
        .iter()
        .flat_map(|n| n.output_streams.iter().map(String::as_str))
        .collect();
    assert_eq!(outputs, vec!["__sg0_stream_1", "mid", "__sg1_stream_1", "out"]);
}

#[test]
fn expansion_is_idempotent() {
    let services = ServiceSet::new();
    let registry = subgraphs();
    let once = expand_subgraphs(parse(CHAIN_GRAPH), &registry, &services).unwrap();
    let twice = expand_subgraphs(once.clone(), &registry, &services).unwrap();
    assert_eq!(
        serde_json::to_string(&once).unwrap(),
        serde_json::to_string(&twice).unwrap()
    );
}

#[test]
fn compiling_twice_gives_the_same_graph() {
    let first = compile(parse(CHAIN_GRAPH)).unwrap();
    let second = compile(parse(CHAIN_GRAPH)).unwrap();
    assert_eq!(
        serde_json::to_value(first.config()).unwrap(),
        serde_json::to_value(second.config()).unwrap()
    );
}

#[test]
fn factory_option_errors_surface() {
    let err = compile(parse(
        r#"
[[node]]
calculator = "Chain"
options = { node_type = "X" }
"#,
    ))
    .unwrap_err();
    assert_eq!(
        err,
        CompileError::Subgraph(SubgraphError::InvalidOptions {
            type_name: "Chain".to_string(),
            message: "chain_length must be a positive integer".to_string(),
        })
    );
}

#[test]
fn services_reach_nested_factories() {
    static LABEL: GraphService<String> = GraphService::new("test.label");

    let seen: Arc<Mutex<Vec<Arc<String>>>> = Arc::default();
    let mut registry = SubgraphRegistry::new();
    let outer_seen = Arc::clone(&seen);
    registry.register_factory("Outer", move |ctx| {
        outer_seen.lock().unwrap().push(ctx.service(&LABEL)?);
        Ok(GraphConfig::new()
            .with_input_stream("a")
            .with_output_stream("b")
            .with_node(NodeConfig::new("Inner").with_input("a").with_output("b")))
    });
    let inner_seen = Arc::clone(&seen);
    registry.register_factory("Inner", move |ctx| {
        inner_seen.lock().unwrap().push(ctx.service(&LABEL)?);
        Ok(GraphConfig::new()
            .with_input_stream("x")
            .with_output_stream("y")
            .with_node(NodeConfig::new("X").with_input("x").with_output("y")))
    });

    let label = Arc::new("shared".to_string());
    let services = ServiceSet::new().with(&LABEL, Arc::clone(&label));
    let graph = ValidatedGraphConfig::initialize(
        GraphConfig::new()
            .with_input_stream("in")
            .with_node(NodeConfig::new("Outer").with_input("in").with_output("out")),
        &contracts(),
        &registry,
        &services,
        &CompileOptions::default(),
    )
    .unwrap();

    assert_eq!(graph.calculators().len(), 1);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|s| Arc::ptr_eq(s, &label)));
}

#[test]
fn missing_service_names_its_key() {
    static LABEL: GraphService<String> = GraphService::new("test.missing");

    let mut registry = SubgraphRegistry::new();
    registry.register_factory("Needy", |ctx| {
        ctx.service(&LABEL)?;
        Ok(GraphConfig::new())
    });
    let err = ValidatedGraphConfig::initialize(
        GraphConfig::new().with_node(NodeConfig::new("Needy")),
        &contracts(),
        &registry,
        &ServiceSet::new(),
        &CompileOptions::default(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        CompileError::Subgraph(SubgraphError::MissingService {
            type_name: "Needy".to_string(),
            key: "test.missing".to_string(),
        })
    );
}

// ============================================================================
// 2. Ordering and back edges
// ============================================================================

#[test]
fn declared_order_is_repaired() {
    let graph = compile(parse(
        r#"
[[node]]
name = "sink"
calculator = "NumberSink"
input_stream = ["b"]

[[node]]
name = "relay"
calculator = "X"
input_stream = ["a"]
output_stream = ["b"]

[[node]]
name = "source"
calculator = "IntSource"
output_stream = ["a"]
"#,
    ))
    .unwrap();
    let names: Vec<&str> = graph.config().nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["source", "relay", "sink"]);
    assert!(
        graph
            .node_order()
            .iter()
            .all(|node| node.kind == NodeKind::Calculator)
    );
}

#[test]
fn cycles_are_reported_by_name() {
    let err = compile(parse(
        r#"
[[node]]
name = "left"
calculator = "X"
input_stream = ["r"]
output_stream = ["l"]

[[node]]
name = "right"
calculator = "X"
input_stream = ["l"]
output_stream = ["r"]
"#,
    ))
    .unwrap_err();
    assert_eq!(err.to_string(), "graph contains a cycle: left -> right");
}

#[test]
fn marked_back_edge_breaks_the_cycle() {
    let graph = compile(parse(
        r#"
input_stream = ["in"]

[[node]]
name = "merge"
calculator = "Merge"
input_stream = ["in", "LOOP:feedback"]
output_stream = ["merged"]

[[node.input_stream_info]]
tag_index = "LOOP"
back_edge = true

[[node]]
name = "delay"
calculator = "X"
input_stream = ["merged"]
output_stream = ["feedback"]
"#,
    ))
    .unwrap();
    let merge = &graph.calculators()[0];
    let inputs = graph.node_input_streams(merge);
    assert!(inputs[1].back_edge);
    assert_eq!(inputs[1].upstream, graph.output_stream_index("feedback"));
    assert!(graph.warnings().is_empty());
}

#[test]
fn unresolved_inputs_are_collected() {
    let err = compile(parse(
        r#"
[[node]]
calculator = "NumberSink"
input_stream = ["nowhere"]

[[node]]
calculator = "TextSink"
input_stream = ["nothing"]
"#,
    ))
    .unwrap_err();
    let messages: Vec<String> = err.flatten().iter().map(ToString::to_string).collect();
    assert_eq!(
        messages,
        vec![
            "input stream \"nowhere\" of node \"NumberSink\" is not produced by any node or graph input",
            "input stream \"nothing\" of node \"TextSink\" is not produced by any node or graph input",
        ]
    );
}

// ============================================================================
// 3. Types
// ============================================================================

#[test]
fn types_narrow_through_expanded_fragments() {
    let graph = compile(parse(
        r#"
output_stream = ["out"]

[[node]]
calculator = "IntSource"
output_stream = ["raw"]

[[node]]
calculator = "Chain"
input_stream = ["raw"]
output_stream = ["out"]
options = { chain_length = 2, node_type = "X" }

[[node]]
calculator = "NumberSink"
input_stream = ["out"]
"#,
    ))
    .unwrap();
    let exact = TypeSpec::Exact("i32".to_string());
    assert_eq!(graph.stream_type("__sg0_stream_1").unwrap().spec(), exact);
    assert_eq!(graph.stream_type("out").unwrap().spec(), exact);
    assert_eq!(graph.resolve_types(), 0);
}

#[test]
fn incompatible_consumer_is_rejected() {
    let err = compile(parse(
        r#"
[[node]]
calculator = "IntSource"
output_stream = ["n"]

[[node]]
calculator = "Chain"
input_stream = ["n"]
output_stream = ["s"]
options = { chain_length = 1, node_type = "X" }

[[node]]
calculator = "TextSink"
input_stream = ["s"]
"#,
    ))
    .unwrap_err();
    assert!(matches!(
        err,
        CompileError::TypeMismatch { ref name, ref expected, .. }
            if name == "s" && expected == "String"
    ));
}

// ============================================================================
// 4. Executors and side packets
// ============================================================================

#[test]
fn executor_problems_are_collected() {
    let err = compile(parse(
        r#"
[[executor]]
name = "io"
type = "ThreadPoolExecutor"

[[executor]]
name = "__private"
type = "ThreadPoolExecutor"

[[node]]
name = "reader"
calculator = "IntSource"
output_stream = ["a"]
executor = "net"
"#,
    ))
    .unwrap_err();
    assert_eq!(
        err.flatten(),
        vec![
            &CompileError::ReservedExecutor {
                name: "__private".to_string()
            },
            &CompileError::UndeclaredExecutor {
                node: "reader".to_string(),
                executor: "net".to_string()
            },
        ]
    );
}

#[test]
fn graph_thread_count_sizes_default_executor() {
    let graph = compile(parse(
        r#"
num_threads = 4

[[node]]
calculator = "IntSource"
output_stream = ["a"]
"#,
    ))
    .unwrap();
    let default = &graph.executors()[0];
    assert_eq!(default.name, "");
    assert_eq!(default.executor_type, "ThreadPoolExecutor");
    assert_eq!(default.options["num_threads"], 4);
}

#[test]
fn required_side_packets_are_listed() {
    let mut registry = contracts();
    registry.register_calculator("Configured", |c| {
        c.input_side_packets().set_all_any();
        c.outputs().set_all_any();
        Ok(())
    });
    let graph = ValidatedGraphConfig::initialize(
        parse(
            r#"
input_side_packet = ["model_path"]

[[node]]
calculator = "Configured"
input_side_packet = ["MODEL:model_path", "LABELS:labels"]
output_stream = ["out"]
"#,
        ),
        &registry,
        &SubgraphRegistry::new(),
        &ServiceSet::new(),
        &CompileOptions::default(),
    )
    .unwrap();
    let required: Vec<&str> = graph
        .required_side_packets()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(required, vec!["labels", "model_path"]);
}
