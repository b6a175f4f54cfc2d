//! Sub-graph registry.
//!
//! A node whose type names a registered sub-graph is replaced, at compile
//! time, by the fragment the registry produces for it. Entries are keyed by
//! `(namespace, type)` and are either a factory closure, which sees the
//! wrapping node and the [`ServiceSet`], or a literal [`GraphConfig`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use flowgraph_core::{GraphConfig, NodeConfig};
use serde_json::Value;
use thiserror::Error;

use crate::service::{GraphService, ServiceSet};

/// Errors raised while registering or instantiating sub-graphs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubgraphError {
    /// No sub-graph is registered under the type in either namespace.
    #[error("no sub-graph registered for type \"{type_name}\" (namespace \"{namespace}\")")]
    NotRegistered {
        /// Namespace searched first.
        namespace: String,
        /// Requested type.
        type_name: String,
    },

    /// A literal graph was registered without a type name.
    #[error("cannot register a sub-graph without a type name")]
    MissingType,

    /// The factory rejected the wrapping node's options.
    #[error("sub-graph \"{type_name}\" rejected its options: {message}")]
    InvalidOptions {
        /// Sub-graph type.
        type_name: String,
        /// Reason given by the factory.
        message: String,
    },

    /// The factory needs a service the caller did not provide.
    #[error("sub-graph \"{type_name}\" requires service \"{key}\"")]
    MissingService {
        /// Sub-graph type.
        type_name: String,
        /// Service key.
        key: String,
    },
}

/// What a factory sees when it is asked for a fragment.
#[derive(Debug, Clone, Copy)]
pub struct SubgraphContext<'a> {
    node: &'a NodeConfig,
    services: &'a ServiceSet,
}

impl<'a> SubgraphContext<'a> {
    /// Context for expanding `node`.
    pub fn new(node: &'a NodeConfig, services: &'a ServiceSet) -> Self {
        Self { node, services }
    }

    /// The wrapping node.
    pub fn node(&self) -> &'a NodeConfig {
        self.node
    }

    /// The wrapping node's options.
    pub fn options(&self) -> &'a Value {
        &self.node.options
    }

    /// Every service available to the expansion.
    pub fn services(&self) -> &'a ServiceSet {
        self.services
    }

    /// A service, or [`SubgraphError::MissingService`].
    pub fn service<T: std::any::Any + Send + Sync>(
        &self,
        service: &GraphService<T>,
    ) -> Result<Arc<T>, SubgraphError> {
        self.services
            .get(service)
            .ok_or_else(|| SubgraphError::MissingService {
                type_name: self.node.node_type.clone(),
                key: service.key().to_string(),
            })
    }

    /// Builds an [`SubgraphError::InvalidOptions`] for this node's type.
    pub fn invalid_options(&self, message: impl Into<String>) -> SubgraphError {
        SubgraphError::InvalidOptions {
            type_name: self.node.node_type.clone(),
            message: message.into(),
        }
    }
}

/// Factory producing a sub-graph fragment for one wrapping node.
pub type SubgraphFactory =
    Arc<dyn Fn(&SubgraphContext<'_>) -> Result<GraphConfig, SubgraphError> + Send + Sync>;

/// A registered sub-graph.
#[derive(Clone)]
pub enum SubgraphEntry {
    /// Generated per wrapping node.
    Factory(SubgraphFactory),
    /// Fixed fragment, cloned for every instance.
    Literal(GraphConfig),
}

impl fmt::Debug for SubgraphEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubgraphEntry::Factory(_) => f.write_str("Factory(..)"),
            SubgraphEntry::Literal(config) => f.debug_tuple("Literal").field(config).finish(),
        }
    }
}

/// Sub-graph types keyed by `(namespace, type)`.
#[derive(Debug, Clone, Default)]
pub struct SubgraphRegistry {
    entries: HashMap<(String, String), SubgraphEntry>,
}

impl SubgraphRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, namespace: String, type_name: String, entry: SubgraphEntry) {
        if self
            .entries
            .insert((namespace.clone(), type_name.clone()), entry)
            .is_some()
        {
            tracing::debug!(%namespace, %type_name, "replaced sub-graph registration");
        }
    }

    /// Registers a factory in the default namespace.
    pub fn register_factory<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&SubgraphContext<'_>) -> Result<GraphConfig, SubgraphError> + Send + Sync + 'static,
    {
        self.register_factory_in("", type_name, factory);
    }

    /// Registers a factory in `namespace`.
    pub fn register_factory_in<F>(
        &mut self,
        namespace: impl Into<String>,
        type_name: impl Into<String>,
        factory: F,
    ) where
        F: Fn(&SubgraphContext<'_>) -> Result<GraphConfig, SubgraphError> + Send + Sync + 'static,
    {
        self.insert(
            namespace.into(),
            type_name.into(),
            SubgraphEntry::Factory(Arc::new(factory)),
        );
    }

    /// Registers a literal fragment in `namespace`.
    pub fn register_literal(
        &mut self,
        namespace: impl Into<String>,
        type_name: impl Into<String>,
        config: GraphConfig,
    ) {
        self.insert(
            namespace.into(),
            type_name.into(),
            SubgraphEntry::Literal(config),
        );
    }

    /// Registers `config` under its own `package` and `type`.
    pub fn register_graph(&mut self, config: GraphConfig) -> Result<(), SubgraphError> {
        if config.graph_type.is_empty() {
            return Err(SubgraphError::MissingType);
        }
        let namespace = config.package.clone();
        let type_name = config.graph_type.clone();
        self.register_literal(namespace, type_name, config);
        Ok(())
    }

    /// Finds `type_name` in `namespace`, falling back to the default one.
    pub fn lookup(&self, namespace: &str, type_name: &str) -> Option<&SubgraphEntry> {
        self.entries
            .get(&(namespace.to_string(), type_name.to_string()))
            .or_else(|| self.entries.get(&(String::new(), type_name.to_string())))
    }

    /// Returns true if `type_name` resolves to a sub-graph.
    pub fn is_subgraph(&self, namespace: &str, type_name: &str) -> bool {
        self.lookup(namespace, type_name).is_some()
    }

    /// Produces the fragment for the wrapping node in `context`.
    pub fn create(
        &self,
        namespace: &str,
        context: &SubgraphContext<'_>,
    ) -> Result<GraphConfig, SubgraphError> {
        let type_name = &context.node().node_type;
        match self.lookup(namespace, type_name) {
            Some(SubgraphEntry::Factory(factory)) => factory(context),
            Some(SubgraphEntry::Literal(config)) => Ok(config.clone()),
            None => Err(SubgraphError::NotRegistered {
                namespace: namespace.to_string(),
                type_name: type_name.clone(),
            }),
        }
    }

    /// Number of registered sub-graphs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_graph() -> GraphConfig {
        GraphConfig::new()
            .with_type("Pair")
            .with_input_stream("IN:in")
            .with_output_stream("OUT:out")
            .with_node(
                NodeConfig::new("Pass")
                    .with_input("in")
                    .with_output("out"),
            )
    }

    #[test]
    fn namespace_falls_back_to_default() {
        let mut registry = SubgraphRegistry::new();
        registry.register_graph(pair_graph()).unwrap();
        registry.register_literal("vision", "Pair", GraphConfig::new().with_type("VisionPair"));

        assert!(registry.is_subgraph("", "Pair"));
        assert!(registry.is_subgraph("audio", "Pair"));
        let Some(SubgraphEntry::Literal(found)) = registry.lookup("vision", "Pair") else {
            panic!("expected a literal entry");
        };
        assert_eq!(found.graph_type, "VisionPair");
        assert!(!registry.is_subgraph("", "Missing"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn register_graph_requires_type() {
        let mut registry = SubgraphRegistry::new();
        assert_eq!(
            registry.register_graph(GraphConfig::new()),
            Err(SubgraphError::MissingType)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn factory_sees_node_and_services() {
        const PREFIX: GraphService<String> = GraphService::new("prefix");

        let mut registry = SubgraphRegistry::new();
        registry.register_factory("Named", |ctx| {
            let prefix = ctx.service(&PREFIX)?;
            let count = ctx
                .options()
                .get("count")
                .and_then(Value::as_u64)
                .ok_or_else(|| ctx.invalid_options("count is required"))?;
            let mut graph = GraphConfig::new();
            for i in 0..count {
                graph = graph.with_node(NodeConfig::new(format!("{prefix}{i}")));
            }
            Ok(graph)
        });

        let services = ServiceSet::new().with(&PREFIX, Arc::new("Stage".to_string()));
        let node = NodeConfig::new("Named").with_options(serde_json::json!({ "count": 2 }));
        let graph = registry
            .create("", &SubgraphContext::new(&node, &services))
            .unwrap();
        let types: Vec<&str> = graph.nodes.iter().map(|n| n.node_type.as_str()).collect();
        assert_eq!(types, vec!["Stage0", "Stage1"]);

        let err = registry
            .create("", &SubgraphContext::new(&node, &ServiceSet::new()))
            .unwrap_err();
        assert_eq!(
            err,
            SubgraphError::MissingService {
                type_name: "Named".to_string(),
                key: "prefix".to_string(),
            }
        );

        let bare = NodeConfig::new("Named");
        let err = registry
            .create("", &SubgraphContext::new(&bare, &services))
            .unwrap_err();
        assert!(matches!(err, SubgraphError::InvalidOptions { .. }));
    }

    #[test]
    fn unknown_type_is_reported() {
        let registry = SubgraphRegistry::new();
        let node = NodeConfig::new("Nowhere");
        let services = ServiceSet::new();
        let err = registry
            .create("pkg", &SubgraphContext::new(&node, &services))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "no sub-graph registered for type \"Nowhere\" (namespace \"pkg\")"
        );
    }
}
