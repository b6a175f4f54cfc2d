//! Flowgraph Core - building blocks for compiling dataflow graphs
//!
//! This crate holds the pieces a graph compiler is assembled from. Nothing
//! here knows about sub-graphs or registries; see `flowgraph-registry` and
//! `flowgraph-config` for those.
//!
//! # Core Abstractions
//!
//! ## Addressing
//!
//! Every edge a node touches is written as `TAG:index:name`, with the tag and
//! index optional:
//!
//! - [`tag`] - grammar for names, tags and indices
//! - [`TagMap`] - dense numbering of a node's port list by `(tag, index)`
//!
//! ## Ordering
//!
//! - [`TopologicalSorter`] - lowest-id-first Kahn sort with cycle extraction
//!
//! ## Types
//!
//! - [`PacketType`] - shared, narrowable type slot (exact, wildcard, union)
//! - [`NodeContract`] - typed port declarations of one node
//!
//! ## Graph Specification
//!
//! - [`GraphConfig`], [`NodeConfig`], [`PacketGeneratorConfig`],
//!   [`StatusHandlerConfig`], [`ExecutorConfig`] - serde data model
//!
//! # Example
//!
//! ```rust
//! use flowgraph_core::{TagMap, TopologicalSorter};
//!
//! let ports = TagMap::new(&["IMAGE:frame", "mask"]).unwrap();
//! assert!(ports.has_tag("IMAGE"));
//!
//! let mut sorter = TopologicalSorter::new(2);
//! sorter.add_edge(1, 0).unwrap();
//! assert_eq!(sorter.sort(), Ok(vec![1, 0]));
//! ```
//!
//! # Features
//!
//! - `tracing` - emit `tracing` events (cycle detection in the sorter)

pub mod contract;
pub mod graph_config;
pub mod packet_type;
pub mod tag;
pub mod tag_map;
pub mod topo;

// Re-export main types at crate root
pub use contract::{ContractError, NodeContract, PacketTypeSet, PortKind};
pub use graph_config::{
    ExecutorConfig, GraphConfig, InputStreamInfo, NodeConfig, PacketGeneratorConfig,
    StatusHandlerConfig,
};
pub use packet_type::{PacketType, TypeSpec};
pub use tag::{MAX_INDEX, NameError, TagIndexName};
pub use tag_map::{CollectionItemId, TagData, TagMap, TagMapError};
pub use topo::{SortError, TopologicalSorter, Visit};
