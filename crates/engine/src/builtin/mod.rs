//! Builtin network factory: networks are flat operator lists run in order.
//!
//! This is the default collaborator behind [`Workspace::default`](crate::Workspace).
//! Hosts with a real computation backend implement
//! [`NetworkFactory`](crate::network::NetworkFactory) themselves.

use std::{collections::HashSet, sync::Arc};

use anyhow::{Context, Result, bail};
use stepflow_types::{NetDef, OperatorDef};
use tracing::trace;

use crate::{
    blob::BlobStore,
    network::{Network, NetworkFactory, Operator},
};

mod ops;

pub use ops::OPERATOR_TYPES;

/// Factory for [`SequentialNet`]s built from the builtin operator library.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinFactory;

impl NetworkFactory for BuiltinFactory {
    fn build_net(&self, definition: &NetDef, store: &Arc<BlobStore>) -> Result<Box<dyn Network>> {
        let mut operators = Vec::with_capacity(definition.ops.len());
        for (index, op) in definition.ops.iter().enumerate() {
            let operator = ops::build(op, store)
                .with_context(|| format!("operator #{index} ({}) of network '{}'", op.display_name(), definition.name))?;
            operators.push(operator);
        }
        Ok(Box::new(SequentialNet {
            name: definition.name.clone(),
            external_inputs: definition.external_inputs.clone(),
            external_outputs: definition.external_outputs.clone(),
            produced: definition.ops.iter().flat_map(|op| op.outputs.iter().cloned()).collect(),
            operators,
        }))
    }

    fn build_operator(&self, definition: &OperatorDef, store: &Arc<BlobStore>) -> Result<Box<dyn Operator>> {
        ops::build(definition, store)
    }
}

/// Runs its operators in declaration order, stopping at the first failure.
pub struct SequentialNet {
    name: String,
    external_inputs: Vec<String>,
    external_outputs: Vec<String>,
    produced: HashSet<String>,
    operators: Vec<Box<dyn Operator>>,
}

impl Network for SequentialNet {
    fn name(&self) -> &str {
        &self.name
    }

    fn external_outputs(&self) -> &[String] {
        &self.external_outputs
    }

    /// Every declared external output must be written by an operator or be a
    /// pass-through external input.
    fn verify(&self) -> Result<()> {
        for output in &self.external_outputs {
            if !self.produced.contains(output) && !self.external_inputs.contains(output) {
                bail!("external output '{output}' is not produced by any operator");
            }
        }
        Ok(())
    }

    fn run(&self) -> Result<()> {
        for operator in &self.operators {
            trace!(net = %self.name, op_type = %operator.op_type(), "running operator");
            operator
                .run()
                .with_context(|| format!("operator {} in network '{}'", operator.op_type(), self.name))?;
        }
        Ok(())
    }
}
