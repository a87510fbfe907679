//! Strongly typed plan definitions consumed by the execution engine.
//!
//! A plan pairs a list of network definitions with a tree of execution steps.
//! The engine never inspects network topology beyond the names declared here;
//! operators are handed to a network factory as opaque definitions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod validation;

/// Top-level execution plan: networks to instantiate and steps to run in order.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PlanDef {
    /// Optional plan name used in log lines and summaries.
    #[serde(default)]
    pub name: Option<String>,
    /// Networks constructed before any step runs, in declaration order.
    #[serde(default, alias = "network")]
    pub networks: Vec<NetDef>,
    /// Top-level steps executed strictly in order.
    #[serde(default, alias = "execution_steps", alias = "execution_step")]
    pub steps: Vec<ExecutionStep>,
}

/// Definition of a single computation network.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NetDef {
    /// Registry key; must be non-empty for the net to be registered.
    #[serde(default)]
    pub name: String,
    /// Operators making up the network, in execution order.
    #[serde(default, alias = "op")]
    pub ops: Vec<OperatorDef>,
    /// Blobs the network expects to already exist in the store.
    #[serde(default, alias = "external_input")]
    pub external_inputs: Vec<String>,
    /// Blobs the network publishes. Criteria networks declare exactly one.
    #[serde(default, alias = "external_output")]
    pub external_outputs: Vec<String>,
}

/// Definition of a single operator inside a network.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct OperatorDef {
    /// Operator type looked up in the operator library, e.g. `ConstantFill`.
    #[serde(rename = "type")]
    pub op_type: String,
    /// Optional instance name for log lines.
    #[serde(default)]
    pub name: Option<String>,
    /// Blob names read by the operator.
    #[serde(default, alias = "input")]
    pub inputs: Vec<String>,
    /// Blob names written by the operator.
    #[serde(default, alias = "output")]
    pub outputs: Vec<String>,
    /// Free-form operator arguments, preserving authoring order.
    #[serde(default, alias = "arg")]
    pub args: IndexMap<String, JsonValue>,
}

impl OperatorDef {
    /// Name used in diagnostics: the explicit name when set, else the type.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|name| !name.is_empty()).unwrap_or(&self.op_type)
    }
}

/// A node of the step tree: either a fan-out of substeps or a flat list of networks.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ExecutionStep {
    /// Step name for log lines and timing output.
    #[serde(default)]
    pub name: String,
    /// Child steps; mutually exclusive with `networks`.
    #[serde(default, alias = "substep")]
    pub substeps: Vec<ExecutionStep>,
    /// Names of registered networks to run each iteration; mutually exclusive with `substeps`.
    #[serde(default, alias = "network")]
    pub networks: Vec<String>,
    /// Run substeps on parallel workers instead of sequentially.
    #[serde(default)]
    pub concurrent_substeps: bool,
    /// Fixed iteration count. Defaults to one when no criteria network is set.
    #[serde(default)]
    pub num_iter: Option<u64>,
    /// Network whose single boolean output decides whether to run another iteration.
    #[serde(default)]
    pub criteria_network: Option<String>,
    /// Network run periodically in the background while this step is active.
    #[serde(default)]
    pub report_net: Option<String>,
    /// Reporting period in seconds; required when `report_net` is set.
    #[serde(default)]
    pub report_interval: Option<u64>,
}

/// How many times a step repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationSpec<'a> {
    /// Run exactly this many iterations.
    Fixed(u64),
    /// Run the named network before each iteration and stop when it reports false.
    Criteria(&'a str),
}

impl ExecutionStep {
    /// True when both substeps and networks are non-empty.
    pub fn mixes_substeps_and_networks(&self) -> bool {
        !self.substeps.is_empty() && !self.networks.is_empty()
    }

    /// True when both a fixed count and a criteria network are declared.
    pub fn mixes_iteration_modes(&self) -> bool {
        self.num_iter.is_some() && self.criteria_network.is_some()
    }

    /// True when substeps should fan out over parallel workers.
    pub fn runs_concurrently(&self) -> bool {
        self.concurrent_substeps && self.substeps.len() > 1
    }

    /// Iteration policy of this step. Callers must reject `mixes_iteration_modes` first;
    /// when both are set the criteria network wins.
    pub fn iteration_spec(&self) -> IterationSpec<'_> {
        match self.criteria_network.as_deref() {
            Some(criteria) => IterationSpec::Criteria(criteria),
            None => IterationSpec::Fixed(self.num_iter.unwrap_or(1)),
        }
    }

    /// Report network and interval when reporting is requested.
    pub fn report(&self) -> Option<(&str, Option<u64>)> {
        self.report_net
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(|name| (name, self.report_interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_plan_deserializes_nested_steps() {
        let yaml_text = r#"
name: train
networks:
  - name: init
    ops:
      - type: ConstantFill
        outputs: [counter]
        args:
          value: 0
  - name: check
    external_outputs: [keep_going]
steps:
  - name: setup
    networks: [init]
  - name: loop
    criteria_network: check
    concurrent_substeps: true
    substeps:
      - name: left
        networks: [init]
        num_iter: 3
      - name: right
        networks: [init]
"#;

        let plan: PlanDef = serde_yaml::from_str(yaml_text).expect("deserialize plan");

        assert_eq!(plan.name.as_deref(), Some("train"));
        assert_eq!(plan.networks.len(), 2);
        assert_eq!(plan.networks[0].ops[0].op_type, "ConstantFill");
        assert_eq!(plan.networks[0].ops[0].args["value"], JsonValue::from(0));
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.steps[1].runs_concurrently());
        assert_eq!(plan.steps[1].iteration_spec(), IterationSpec::Criteria("check"));
        assert_eq!(plan.steps[1].substeps[0].iteration_spec(), IterationSpec::Fixed(3));
        assert_eq!(plan.steps[1].substeps[1].iteration_spec(), IterationSpec::Fixed(1));
    }

    #[test]
    fn execution_steps_alias_is_accepted() {
        let json_text = r#"{ "execution_steps": [ { "name": "only", "networks": ["a"] } ] }"#;
        let plan: PlanDef = serde_json::from_str(json_text).expect("deserialize plan");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].networks, vec!["a".to_string()]);
    }

    #[test]
    fn single_substep_never_runs_concurrently() {
        let step = ExecutionStep {
            name: "solo".into(),
            concurrent_substeps: true,
            substeps: vec![ExecutionStep::default()],
            ..Default::default()
        };
        assert!(!step.runs_concurrently());
    }

    #[test]
    fn shape_helpers_flag_conflicts() {
        let step = ExecutionStep {
            name: "broken".into(),
            substeps: vec![ExecutionStep::default()],
            networks: vec!["a".into()],
            num_iter: Some(2),
            criteria_network: Some("c".into()),
            ..Default::default()
        };
        assert!(step.mixes_substeps_and_networks());
        assert!(step.mixes_iteration_modes());
    }

    #[test]
    fn empty_report_net_is_ignored() {
        let step = ExecutionStep {
            report_net: Some(String::new()),
            report_interval: Some(1),
            ..Default::default()
        };
        assert!(step.report().is_none());
    }
}
