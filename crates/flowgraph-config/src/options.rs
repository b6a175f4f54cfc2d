//! Compile-time knobs.

use serde::{Deserialize, Serialize};

/// Executor type used for the synthesized default executor.
pub const DEFAULT_EXECUTOR_TYPE: &str = "ThreadPoolExecutor";

/// Pass limit for sub-graph expansion.
pub const DEFAULT_MAX_EXPANSION_PASSES: usize = 64;

/// Options controlling [`ValidatedGraphConfig::initialize`](crate::ValidatedGraphConfig::initialize).
///
/// # Example
///
/// ```rust
/// use flowgraph_config::CompileOptions;
///
/// let options = CompileOptions::default().with_default_num_threads(4);
/// assert_eq!(options.resolved_num_threads(0), 4);
/// assert_eq!(options.resolved_num_threads(2), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Threads for the default executor when the graph does not say.
    ///
    /// `None` uses the machine's available parallelism.
    pub default_num_threads: Option<usize>,
    /// Type name of the synthesized default executor.
    pub default_executor_type: String,
    /// Expansion passes allowed before nested sub-graphs are deemed
    /// self-referential.
    pub max_expansion_passes: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            default_num_threads: None,
            default_executor_type: DEFAULT_EXECUTOR_TYPE.to_string(),
            max_expansion_passes: DEFAULT_MAX_EXPANSION_PASSES,
        }
    }
}

impl CompileOptions {
    /// Sets the default executor's thread count.
    pub fn with_default_num_threads(mut self, num_threads: usize) -> Self {
        self.default_num_threads = Some(num_threads);
        self
    }

    /// Sets the default executor's type.
    pub fn with_default_executor_type(mut self, executor_type: impl Into<String>) -> Self {
        self.default_executor_type = executor_type.into();
        self
    }

    /// Sets the expansion pass limit.
    pub fn with_max_expansion_passes(mut self, passes: usize) -> Self {
        self.max_expansion_passes = passes;
        self
    }

    /// Thread count for the default executor of a graph that asked for
    /// `graph_num_threads` (0 meaning unspecified).
    pub fn resolved_num_threads(&self, graph_num_threads: usize) -> usize {
        if graph_num_threads > 0 {
            return graph_num_threads;
        }
        self.default_num_threads
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(std::num::NonZeroUsize::get)
                    .unwrap_or(1)
            })
    }
}
