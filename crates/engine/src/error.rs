//! Error taxonomy for plan execution.

use thiserror::Error;

/// Failure surfaced by a workspace operation, a step, or a whole plan.
///
/// Collaborator failures (network construction, verification, runs) carry the
/// underlying `anyhow::Error` so the full cause chain is kept in log output.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A step declares an impossible shape or iteration policy.
    #[error("execution step '{step}' is invalid: {reason}")]
    InvalidStep { step: String, reason: String },
    /// A network definition was submitted without a name.
    #[error("network definition should have a name")]
    MissingNetName,
    /// A referenced network is not registered in the workspace.
    #[error("network '{0}' not found")]
    NetNotFound(String),
    /// A referenced blob does not exist in the store or its parents.
    #[error("blob '{0}' not found")]
    BlobNotFound(String),
    /// The network factory could not construct the network.
    #[error("error when creating network '{name}': {cause:#}")]
    NetBuild { name: String, cause: anyhow::Error },
    /// The network was constructed but failed its verification pass.
    #[error("error when setting up network '{name}': {cause:#}")]
    NetVerify { name: String, cause: anyhow::Error },
    /// A network run returned failure.
    #[error("error when running network '{name}': {cause:#}")]
    NetRun { name: String, cause: anyhow::Error },
    /// The network factory could not construct an operator.
    #[error("cannot create operator of type '{op_type}': {cause:#}")]
    OperatorBuild { op_type: String, cause: anyhow::Error },
    /// A standalone operator run returned failure.
    #[error("error when running operator '{op_type}': {cause:#}")]
    OperatorRun { op_type: String, cause: anyhow::Error },
    /// A criteria network broke its contract of producing exactly one boolean scalar.
    #[error("criteria network '{network}' violated its contract: {reason}")]
    CriteriaContract { network: String, reason: String },
}

impl ExecutionError {
    pub(crate) fn invalid_step(step: &str, reason: impl Into<String>) -> Self {
        ExecutionError::InvalidStep {
            step: step.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn criteria(network: &str, reason: impl Into<String>) -> Self {
        ExecutionError::CriteriaContract {
            network: network.to_string(),
            reason: reason.into(),
        }
    }
}
