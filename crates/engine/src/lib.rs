//! # Stepflow Engine
//!
//! The Stepflow Engine owns a named blob store and a registry of networks, and
//! executes hierarchical execution plans against them. Steps either run a list
//! of networks or recurse into substeps, repeat a fixed number of times or while
//! a criteria network reports `true`, and may fan their substeps out across
//! threads.
//!
//! ## Key Features
//!
//! - **Blob Store**: Named, shared, interior-mutable storage with parent fallback
//! - **Network Registry**: Build, verify, replace, and delete named networks
//! - **Step Execution**: Fixed or criteria-driven iteration, sequential or concurrent substeps
//! - **Reporting**: Periodic report networks on a background thread scoped to a step
//!
//! ## Usage
//!
//! ```rust
//! use stepflow_engine::{Workspace, always_continue, parse_plan_file};
//!
//! let temp_dir = tempfile::tempdir()?;
//! let plan_path = temp_dir.path().join("plan.yaml");
//! std::fs::write(&plan_path, r#"
//! networks:
//!   - name: tick
//!     ops:
//!       - type: Increment
//!         outputs: [ticks]
//! steps:
//!   - name: main
//!     networks: [tick]
//!     num_iter: 3
//! "#)?;
//!
//! let plan = parse_plan_file(&plan_path)?;
//! let workspace = Workspace::default();
//! workspace.run_plan(&plan, &always_continue)?;
//! assert_eq!(workspace.get_blob("ticks").and_then(|blob| blob.get()).map(|value| value.to_string()), Some("[3]".to_string()));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`blob`**: Blob values and the hierarchical blob store
//! - **`network`**: Collaborator traits for networks, operators, and their factory
//! - **`builtin`**: Default factory backed by a small operator library
//! - **`workspace`**: Network registry and the public entry points
//! - **`executor`**: Step tree execution, criteria loops, reporters, and plan driving
//! - **`error`**: Failure kinds surfaced by the engine

pub mod blob;
pub mod builtin;
pub mod error;
pub mod executor;
pub mod network;
pub mod workspace;

// Re-export commonly used types for convenience
pub use blob::{Blob, BlobStore, BlobValue, ElementType};
pub use builtin::{BuiltinFactory, OPERATOR_TYPES, SequentialNet};
pub use error::ExecutionError;
pub use executor::{PlanSummary, RunLimits, ShouldContinue, StepTiming, always_continue, execute_step, run_plan};
pub use network::{Network, NetworkFactory, Operator};
pub use stepflow_types::{ExecutionStep, NetDef, OperatorDef, PlanDef, PlanIssue, parse_plan_file, parse_plan_str, validate_plan};
pub use workspace::Workspace;
