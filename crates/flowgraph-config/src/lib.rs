//! Graph compilation for flowgraph: sub-graph expansion and validation.
//!
//! This crate turns a declarative [`GraphConfig`](flowgraph_core::GraphConfig)
//! into a [`ValidatedGraphConfig`]: every sub-graph node inlined, every node
//! contract filled, every stream and side packet bound to its producer, the
//! nodes in dependency order, and every type narrowed and checked.
//!
//! # Features
//!
//! - **Expansion**: nested sub-graphs with namespaced internal names
//! - **Ordering**: topological sort when the declared order does not work
//! - **Back Edges**: deliberate cycles marked per input
//! - **Types**: wildcard and union narrowing across connected ports
//! - **Executors**: default executor synthesis and reference checks
//!
//! # Example
//!
//! ```rust
//! use flowgraph_config::{CompileOptions, ValidatedGraphConfig};
//! use flowgraph_core::GraphConfig;
//! use flowgraph_registry::{ContractRegistry, ServiceSet, SubgraphRegistry};
//!
//! let config: GraphConfig = serde_json::from_str(
//!     r#"{
//!         "input_stream": ["in"],
//!         "output_stream": ["out"],
//!         "node": [
//!             { "calculator": "PassThroughCalculator",
//!               "input_stream": ["in"], "output_stream": ["out"] }
//!         ]
//!     }"#,
//! )
//! .unwrap();
//!
//! let graph = ValidatedGraphConfig::initialize(
//!     config,
//!     &ContractRegistry::with_builtins(),
//!     &SubgraphRegistry::new(),
//!     &ServiceSet::new(),
//!     &CompileOptions::default(),
//! )
//! .unwrap();
//! assert_eq!(graph.calculators().len(), 1);
//! assert_eq!(graph.output_stream_index("out"), Some(1));
//! ```

mod error;
mod expand;
mod node_info;
mod options;
mod validated;

/// Executor declarations.
pub mod executors;

pub use error::{CompileError, CompileResult};
pub use executors::is_reserved_executor_name;
pub use expand::{Expander, expand_subgraphs};
pub use node_info::{EdgeInfo, NodeKind, NodeRef, NodeTypeInfo};
pub use options::{CompileOptions, DEFAULT_EXECUTOR_TYPE, DEFAULT_MAX_EXPANSION_PASSES};
pub use validated::ValidatedGraphConfig;
