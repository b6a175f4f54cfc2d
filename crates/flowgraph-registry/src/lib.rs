//! Contract, sub-graph, and service registries for flowgraph.
//!
//! This crate holds the lookup tables a graph compiler consults by type name.
//! Nothing here is global: build the registries at startup and pass them to
//! the compiler, so tests can register fixtures without leaking into each
//! other.
//!
//! # Features
//!
//! - **Contract Registry**: per-type functions that fill in a node's
//!   [`NodeContract`]
//! - **Sub-graph Registry**: factories and literal fragments keyed by
//!   `(namespace, type)`
//! - **Services**: typed objects that sub-graph factories can query
//!
//! # Example
//!
//! ```rust
//! use flowgraph_core::{NodeConfig, NodeContract};
//! use flowgraph_registry::{ContractRegistry, NodeRole};
//!
//! let mut registry = ContractRegistry::with_builtins();
//! registry.register_calculator("Threshold", |contract| {
//!     contract.inputs().require("", 0)?.set_exact("f32");
//!     contract.outputs().require("", 0)?.set_exact("bool");
//!     Ok(())
//! });
//!
//! let node = NodeConfig::new("Threshold").with_input("level").with_output("loud");
//! let mut contract = NodeContract::for_node(&node, "Threshold").unwrap();
//! registry.fill_contract(NodeRole::Calculator, &mut contract).unwrap();
//! assert!(contract.validate_types().is_ok());
//! ```

pub mod service;
pub mod subgraph;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use flowgraph_core::ContractError;
use flowgraph_core::{NodeContract, PacketTypeSet};
pub use service::{GraphService, ServiceSet};
pub use subgraph::{
    SubgraphContext, SubgraphEntry, SubgraphError, SubgraphFactory, SubgraphRegistry,
};

/// Which table a contract function lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeRole {
    /// Computation node, runs once per input timestamp.
    Calculator,
    /// Produces side packets before the graph starts.
    PacketGenerator,
    /// Observes side packets when the graph finishes.
    StatusHandler,
}

impl NodeRole {
    /// Returns a human-readable name for the role.
    pub const fn name(&self) -> &'static str {
        match self {
            NodeRole::Calculator => "calculator",
            NodeRole::PacketGenerator => "packet generator",
            NodeRole::StatusHandler => "status handler",
        }
    }
}

/// Contract function: fills in the port types of a node.
///
/// Called once per node instance with the node's options visible through
/// [`NodeContract::options`]; must give the same answer for the same options.
pub type ContractFn = Arc<dyn Fn(&mut NodeContract) -> Result<(), ContractError> + Send + Sync>;

/// Contract functions keyed by role and type name.
#[derive(Clone, Default)]
pub struct ContractRegistry {
    entries: BTreeMap<(NodeRole, String), ContractFn>,
}

impl fmt::Debug for ContractRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractRegistry")
            .field("types", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ContractRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in node types registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        // Forwards every input to the output at the same (tag, index).
        self.register_calculator("PassThroughCalculator", |contract| {
            link_pairwise(contract, contract.inputs(), contract.outputs())?;
            link_pairwise(
                contract,
                contract.input_side_packets(),
                contract.output_side_packets(),
            )
        });

        // Accepts anything, produces nothing.
        self.register_calculator("SinkCalculator", |contract| {
            contract.inputs().set_all_any();
            contract.input_side_packets().set_all_any();
            if contract.outputs().is_empty() {
                Ok(())
            } else {
                Err(contract.reject("a sink cannot have outputs"))
            }
        });

        // Copies input side packets to output side packets before the run.
        self.register_packet_generator("PassThroughGenerator", |contract| {
            link_pairwise(
                contract,
                contract.input_side_packets(),
                contract.output_side_packets(),
            )
        });
    }

    /// Registers a function in the given role's table, replacing any previous
    /// registration of `type_name`.
    pub fn register<F>(&mut self, role: NodeRole, type_name: impl Into<String>, contract: F)
    where
        F: Fn(&mut NodeContract) -> Result<(), ContractError> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        if self
            .entries
            .insert((role, type_name.clone()), Arc::new(contract))
            .is_some()
        {
            tracing::debug!(role = role.name(), %type_name, "replaced contract registration");
        }
    }

    /// Registers a calculator contract.
    pub fn register_calculator<F>(&mut self, type_name: impl Into<String>, contract: F)
    where
        F: Fn(&mut NodeContract) -> Result<(), ContractError> + Send + Sync + 'static,
    {
        self.register(NodeRole::Calculator, type_name, contract);
    }

    /// Registers a packet generator contract.
    pub fn register_packet_generator<F>(&mut self, type_name: impl Into<String>, contract: F)
    where
        F: Fn(&mut NodeContract) -> Result<(), ContractError> + Send + Sync + 'static,
    {
        self.register(NodeRole::PacketGenerator, type_name, contract);
    }

    /// Registers a status handler contract.
    pub fn register_status_handler<F>(&mut self, type_name: impl Into<String>, contract: F)
    where
        F: Fn(&mut NodeContract) -> Result<(), ContractError> + Send + Sync + 'static,
    {
        self.register(NodeRole::StatusHandler, type_name, contract);
    }

    /// The contract function for `type_name` in `role`'s table.
    pub fn get(&self, role: NodeRole, type_name: &str) -> Option<&ContractFn> {
        self.entries.get(&(role, type_name.to_string()))
    }

    /// Calculator contract by type name.
    pub fn calculator(&self, type_name: &str) -> Option<&ContractFn> {
        self.get(NodeRole::Calculator, type_name)
    }

    /// Packet generator contract by type name.
    pub fn packet_generator(&self, type_name: &str) -> Option<&ContractFn> {
        self.get(NodeRole::PacketGenerator, type_name)
    }

    /// Status handler contract by type name.
    pub fn status_handler(&self, type_name: &str) -> Option<&ContractFn> {
        self.get(NodeRole::StatusHandler, type_name)
    }

    /// Returns true if a calculator of this type is registered.
    pub fn contains_calculator(&self, type_name: &str) -> bool {
        self.calculator(type_name).is_some()
    }

    /// Returns true if a packet generator of this type is registered.
    pub fn contains_packet_generator(&self, type_name: &str) -> bool {
        self.packet_generator(type_name).is_some()
    }

    /// Returns true if a status handler of this type is registered.
    pub fn contains_status_handler(&self, type_name: &str) -> bool {
        self.status_handler(type_name).is_some()
    }

    /// Type names registered in `role`'s table, sorted.
    pub fn type_names(&self, role: NodeRole) -> Vec<&str> {
        self.entries
            .keys()
            .filter(|(r, _)| *r == role)
            .map(|(_, name)| name.as_str())
            .collect()
    }

    /// Runs the registered function for the contract's node type.
    pub fn fill_contract(
        &self,
        role: NodeRole,
        contract: &mut NodeContract,
    ) -> Result<(), ContractError> {
        let Some(fill) = self.get(role, contract.node_type()) else {
            return Err(ContractError::Unregistered {
                node: contract.node_name().to_string(),
                node_type: contract.node_type().to_string(),
                role: role.name(),
            });
        };
        fill(contract)
    }

    /// Returns the number of registered contracts across all roles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Makes each input a wildcard and each output the same type as the input
/// at its `(tag, index)`. The two collections must have the same shape.
fn link_pairwise(
    contract: &NodeContract,
    inputs: &PacketTypeSet,
    outputs: &PacketTypeSet,
) -> Result<(), ContractError> {
    if !inputs.tag_map().is_equivalent_to(outputs.tag_map()) {
        return Err(contract.reject(format!(
            "inputs {} and outputs {} must match",
            inputs.tag_map(),
            outputs.tag_map()
        )));
    }
    for (id, input) in inputs.iter() {
        input.set_any();
        if let Some(output) = outputs.by_id(id) {
            output.set_same_as(input);
        }
    }
    Ok(())
}
