//! Executor declarations: default synthesis and validation.

use std::collections::HashSet;

use flowgraph_core::{ExecutorConfig, GraphConfig};
use serde_json::json;

use crate::error::CompileError;
use crate::options::CompileOptions;

/// Returns true for names the runtime keeps for itself: `default`, `gpu`,
/// and anything starting with `__`.
pub fn is_reserved_executor_name(name: &str) -> bool {
    name == "default" || name == "gpu" || name.starts_with("__")
}

/// The graph's executors, with a default executor prepended when the graph
/// declares none.
pub(crate) fn with_default(config: &GraphConfig, options: &CompileOptions) -> Vec<ExecutorConfig> {
    let mut executors = Vec::with_capacity(config.executors.len() + 1);
    if !config.executors.iter().any(|e| e.name.is_empty()) {
        let num_threads = options.resolved_num_threads(config.num_threads);
        tracing::debug!(num_threads, "synthesized default executor");
        executors.push(
            ExecutorConfig::new("", options.default_executor_type.clone())
                .with_options(json!({ "num_threads": num_threads })),
        );
    }
    executors.extend(config.executors.iter().cloned());
    executors
}

/// Checks declarations and node references.
///
/// `node_names` holds the canonical name of each entry of `config.nodes`.
pub(crate) fn validate(
    executors: &[ExecutorConfig],
    config: &GraphConfig,
    node_names: &[&str],
) -> Vec<CompileError> {
    let mut errors = Vec::new();
    let mut declared = HashSet::new();
    for executor in executors {
        if is_reserved_executor_name(&executor.name) {
            errors.push(CompileError::ReservedExecutor {
                name: executor.name.clone(),
            });
        } else if !declared.insert(executor.name.as_str()) {
            errors.push(CompileError::DuplicateExecutor {
                name: executor.name.clone(),
            });
        }
    }

    for (node, name) in config.nodes.iter().zip(node_names) {
        if node.executor.is_empty() {
            continue;
        }
        if is_reserved_executor_name(&node.executor) {
            errors.push(CompileError::ReservedExecutor {
                name: node.executor.clone(),
            });
        } else if !declared.contains(node.executor.as_str()) {
            errors.push(CompileError::UndeclaredExecutor {
                node: (*name).to_string(),
                executor: node.executor.clone(),
            });
        }
    }
    errors
}
