//! Per-step continuation policy: fixed iteration counts or a criteria network.

use std::sync::Arc;

use stepflow_types::{ExecutionStep, IterationSpec};
use tracing::debug;

use crate::{
    blob::{BlobStore, ElementType},
    error::ExecutionError,
    network::Network,
    workspace::{Workspace, run_network},
};

/// Decides whether a step runs another iteration.
pub(crate) enum ContinuationPolicy {
    /// Continue while `iteration < count`.
    Fixed(u64),
    /// Run `network` before each prospective iteration and read its boolean output.
    Criteria {
        network: Arc<dyn Network>,
        output: String,
        store: Arc<BlobStore>,
    },
}

impl ContinuationPolicy {
    /// Derive the policy for `step`, resolving and checking its criteria network.
    pub(crate) fn for_step(workspace: &Workspace, step: &ExecutionStep) -> Result<Self, ExecutionError> {
        if step.mixes_iteration_modes() {
            return Err(ExecutionError::invalid_step(
                &step.name,
                "num_iter must not be set together with criteria_network",
            ));
        }

        match step.iteration_spec() {
            IterationSpec::Fixed(count) => {
                debug!(step = %step.name, iterations = count, "executing step for fixed iterations");
                Ok(ContinuationPolicy::Fixed(count))
            }
            IterationSpec::Criteria(name) => {
                let network = workspace
                    .get_net(name)
                    .ok_or_else(|| ExecutionError::NetNotFound(name.to_string()))?;
                let output = match network.external_outputs() {
                    [single] => single.clone(),
                    outputs => {
                        return Err(ExecutionError::criteria(
                            name,
                            format!("expected exactly one external output, found {}", outputs.len()),
                        ));
                    }
                };
                debug!(step = %step.name, criteria = %name, output = %output, "executing step controlled by criteria output");
                Ok(ContinuationPolicy::Criteria {
                    network,
                    output,
                    store: workspace.store().clone(),
                })
            }
        }
    }

    pub(crate) fn should_continue(&self, iteration: u64) -> Result<bool, ExecutionError> {
        match self {
            ContinuationPolicy::Fixed(count) => Ok(iteration < *count),
            ContinuationPolicy::Criteria { network, output, store } => {
                run_network(network.as_ref())?;
                let name = network.name();
                let blob = store
                    .get_blob(output)
                    .ok_or_else(|| ExecutionError::criteria(name, format!("output blob '{output}' does not exist")))?;
                let value = blob
                    .get()
                    .ok_or_else(|| ExecutionError::criteria(name, format!("output blob '{output}' is empty")))?;
                if value.len() != 1 {
                    return Err(ExecutionError::criteria(
                        name,
                        format!("output blob '{output}' has {} elements, expected 1", value.len()),
                    ));
                }
                match value.as_bool_scalar() {
                    Some(keep_going) => Ok(keep_going),
                    None => Err(ExecutionError::criteria(
                        name,
                        format!(
                            "output blob '{output}' holds {} elements, expected {}",
                            value.element_type(),
                            ElementType::Bool
                        ),
                    )),
                }
            }
        }
    }
}
