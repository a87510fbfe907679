//! Shared plan definitions for Stepflow.
//!
//! Plans arrive as YAML or JSON documents and are deserialized into the
//! structures in [`plan`]. The engine consumes them read-only.

use std::{fs, path::Path};

use anyhow::{Context, Result};

pub mod plan;

pub use plan::validation::{PlanIssue, validate_plan};
pub use plan::{ExecutionStep, IterationSpec, NetDef, OperatorDef, PlanDef};

/// Serialization format of a plan document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    Yaml,
    Json,
}

impl PlanFormat {
    /// Detect the format from a file extension; anything other than `.json` is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|extension| extension.to_str()) {
            Some(extension) if extension.eq_ignore_ascii_case("json") => PlanFormat::Json,
            _ => PlanFormat::Yaml,
        }
    }
}

/// Parse a plan document held in memory.
pub fn parse_plan_str(content: &str, format: PlanFormat) -> Result<PlanDef> {
    match format {
        PlanFormat::Json => serde_json::from_str(content).context("invalid JSON plan document"),
        PlanFormat::Yaml => serde_yaml::from_str(content).context("invalid YAML plan document"),
    }
}

/// Load a plan file from disk, detecting the format from its extension.
///
/// ```rust
/// let temp_dir = tempfile::tempdir()?;
/// let plan_path = temp_dir.path().join("plan.yaml");
/// std::fs::write(&plan_path, "steps: []\n")?;
///
/// let plan = stepflow_types::parse_plan_file(&plan_path)?;
/// assert!(plan.steps.is_empty());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn parse_plan_file(file_path: impl AsRef<Path>) -> Result<PlanDef> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read plan file: {}", file_path.display()))?;
    parse_plan_str(&content, PlanFormat::from_path(file_path)).with_context(|| format!("Failed to parse plan file: {}", file_path.display()))
}
