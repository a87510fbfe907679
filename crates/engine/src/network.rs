//! Capability seams between the engine and whatever actually computes.
//!
//! The engine never looks inside a network. It builds instances through a
//! [`NetworkFactory`], verifies them once, runs them by name, and reads the
//! names of their external outputs when they act as criteria networks.

use std::sync::Arc;

use anyhow::Result;
use stepflow_types::{NetDef, OperatorDef};

use crate::blob::BlobStore;

/// A constructed, runnable computation graph.
///
/// Instances are shared between the orchestrating thread, concurrent substep
/// workers, and reporter threads, so `run` takes `&self`.
pub trait Network: Send + Sync {
    fn name(&self) -> &str;

    /// Blobs this network publishes.
    fn external_outputs(&self) -> &[String];

    /// Post-construction sanity check. The default accepts every instance.
    fn verify(&self) -> Result<()> {
        Ok(())
    }

    /// Execute the network once.
    fn run(&self) -> Result<()>;
}

/// A single computation unit, run on its own outside of any network.
pub trait Operator: Send + Sync {
    fn op_type(&self) -> &str;

    fn run(&self) -> Result<()>;
}

/// Builds networks and operators bound to a blob store.
pub trait NetworkFactory: Send + Sync {
    fn build_net(&self, definition: &NetDef, store: &Arc<BlobStore>) -> Result<Box<dyn Network>>;

    fn build_operator(&self, definition: &OperatorDef, store: &Arc<BlobStore>) -> Result<Box<dyn Operator>>;
}
