//! Execution context: a blob store plus the registry of constructed networks.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use stepflow_types::{ExecutionStep, NetDef, OperatorDef, PlanDef};
use tracing::{error, info, warn};

use crate::{
    blob::{Blob, BlobStore, BlobValue},
    builtin::BuiltinFactory,
    error::ExecutionError,
    executor::{self, PlanSummary},
    network::{Network, NetworkFactory},
};

/// Owns a [`BlobStore`] and a name-keyed registry of runnable networks.
///
/// The workspace is `Sync`: concurrent substep workers share it by reference.
/// Networks are handed out as `Arc`s so a run never holds the registry lock.
pub struct Workspace {
    store: Arc<BlobStore>,
    nets: RwLock<IndexMap<String, Arc<dyn Network>>>,
    factory: Arc<dyn NetworkFactory>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(Arc::new(BuiltinFactory))
    }
}

impl Workspace {
    /// Workspace with a fresh root store.
    pub fn new(factory: Arc<dyn NetworkFactory>) -> Self {
        Self::with_store(Arc::new(BlobStore::new()), factory)
    }

    /// Workspace over an existing store, e.g. a child of another workspace's store.
    pub fn with_store(store: Arc<BlobStore>, factory: Arc<dyn NetworkFactory>) -> Self {
        Self {
            store,
            nets: RwLock::new(IndexMap::new()),
            factory,
        }
    }

    pub fn store(&self) -> &Arc<BlobStore> {
        &self.store
    }

    pub fn create_blob(&self, name: &str) -> Arc<Blob> {
        self.store.create_blob(name)
    }

    pub fn get_blob(&self, name: &str) -> Option<Arc<Blob>> {
        self.store.get_blob(name)
    }

    pub fn has_blob(&self, name: &str) -> bool {
        self.store.has_blob(name)
    }

    pub fn list_blobs(&self) -> Vec<String> {
        self.store.list_blobs()
    }

    /// Snapshot of a blob's contents; `Ok(None)` when the blob exists but is empty.
    pub fn blob_value(&self, name: &str) -> Result<Option<BlobValue>, ExecutionError> {
        self.store
            .get_blob(name)
            .map(|blob| blob.get())
            .ok_or_else(|| ExecutionError::BlobNotFound(name.to_string()))
    }

    /// Build, verify, and register a network under `definition.name`.
    ///
    /// An existing network with the same name is dropped before the new one is
    /// built, since it may hold resources the replacement needs to open. When
    /// construction or verification fails nothing stays registered under the name.
    pub fn create_net(&self, definition: &NetDef) -> Result<Arc<dyn Network>, ExecutionError> {
        if definition.name.is_empty() {
            error!("network definition should have a name");
            return Err(ExecutionError::MissingNetName);
        }
        let name = definition.name.as_str();

        let previous = self.nets.write().shift_remove(name);
        if let Some(previous) = previous {
            warn!(net = %name, "overwriting existing network of the same name");
            drop(previous);
        }

        info!(net = %name, "initializing network");
        let network: Arc<dyn Network> = match self.factory.build_net(definition, &self.store) {
            Ok(network) => Arc::from(network),
            Err(cause) => {
                error!(net = %name, error = %format!("{cause:#}"), "error when creating the network");
                return Err(ExecutionError::NetBuild {
                    name: name.to_string(),
                    cause,
                });
            }
        };
        if let Err(cause) = network.verify() {
            error!(net = %name, error = %format!("{cause:#}"), "error when setting up network");
            return Err(ExecutionError::NetVerify {
                name: name.to_string(),
                cause,
            });
        }

        self.nets.write().insert(name.to_string(), network.clone());
        Ok(network)
    }

    /// Verify and register a network constructed outside the factory,
    /// replacing any network already registered under its name.
    pub fn register_net(&self, network: Arc<dyn Network>) -> Result<(), ExecutionError> {
        let name = network.name().to_string();
        if name.is_empty() {
            return Err(ExecutionError::MissingNetName);
        }
        if let Some(previous) = self.nets.write().shift_remove(&name) {
            warn!(net = %name, "overwriting existing network of the same name");
            drop(previous);
        }
        network.verify().map_err(|cause| ExecutionError::NetVerify { name: name.clone(), cause })?;
        self.nets.write().insert(name, network);
        Ok(())
    }

    pub fn get_net(&self, name: &str) -> Option<Arc<dyn Network>> {
        self.nets.read().get(name).cloned()
    }

    /// Remove a network; a missing name is a no-op.
    pub fn delete_net(&self, name: &str) {
        self.nets.write().shift_remove(name);
    }

    /// Registered network names in registration order.
    pub fn net_names(&self) -> Vec<String> {
        self.nets.read().keys().cloned().collect()
    }

    /// Run a registered network once.
    pub fn run_net(&self, name: &str) -> Result<(), ExecutionError> {
        let Some(network) = self.get_net(name) else {
            error!(net = %name, "network does not exist yet");
            return Err(ExecutionError::NetNotFound(name.to_string()));
        };
        run_network(network.as_ref())
    }

    /// Build, verify, and run a transient network without registering it.
    pub fn run_net_once(&self, definition: &NetDef) -> Result<(), ExecutionError> {
        let network = self
            .factory
            .build_net(definition, &self.store)
            .map_err(|cause| {
                error!(net = %definition.name, error = %format!("{cause:#}"), "error when creating the network");
                ExecutionError::NetBuild {
                    name: definition.name.clone(),
                    cause,
                }
            })?;
        if let Err(cause) = network.verify() {
            error!(net = %definition.name, error = %format!("{cause:#}"), "error when setting up network");
            return Err(ExecutionError::NetVerify {
                name: definition.name.clone(),
                cause,
            });
        }
        run_network(network.as_ref())
    }

    /// Build and run a single transient operator.
    pub fn run_operator_once(&self, definition: &OperatorDef) -> Result<(), ExecutionError> {
        let operator = self
            .factory
            .build_operator(definition, &self.store)
            .map_err(|cause| {
                error!(op_type = %definition.op_type, error = %format!("{cause:#}"), "cannot create operator");
                ExecutionError::OperatorBuild {
                    op_type: definition.op_type.clone(),
                    cause,
                }
            })?;
        operator.run().map_err(|cause| {
            error!(op_type = %definition.op_type, error = %format!("{cause:#}"), "error when running operator");
            ExecutionError::OperatorRun {
                op_type: definition.op_type.clone(),
                cause,
            }
        })
    }

    /// Execute one step tree against this workspace.
    pub fn execute_step(&self, step: &ExecutionStep, should_continue: &(dyn Fn(u64) -> bool + Sync)) -> Result<(), ExecutionError> {
        executor::execute_step(self, step, should_continue)
    }

    /// Create every declared network, then run the top-level steps in order.
    pub fn run_plan(&self, plan: &PlanDef, should_continue: &(dyn Fn(u64) -> bool + Sync)) -> Result<PlanSummary, ExecutionError> {
        executor::run_plan(self, plan, should_continue)
    }
}

pub(crate) fn run_network(network: &dyn Network) -> Result<(), ExecutionError> {
    network.run().map_err(|cause| ExecutionError::NetRun {
        name: network.name().to_string(),
        cause,
    })
}
