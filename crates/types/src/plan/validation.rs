//! Structural checks over a plan that do not require building any network.
//!
//! The engine performs the same checks lazily while executing; this pass lets
//! the CLI report every problem in a plan up front.

use std::collections::HashSet;
use std::fmt;

use super::{ExecutionStep, PlanDef};

/// A single configuration problem found in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanIssue {
    /// Slash-separated path of step names leading to the problem, or `networks[i]`.
    pub location: String,
    /// Human readable description.
    pub message: String,
}

impl fmt::Display for PlanIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Validate a plan and return every issue found. An empty list means the plan is well formed.
///
/// Checks:
/// - every network definition has a non-empty name
/// - no step mixes substeps and networks
/// - no step mixes `num_iter` and `criteria_network`
/// - `report_net` comes with a positive `report_interval`
/// - every referenced network (step, criteria, report) is declared in the plan
pub fn validate_plan(plan: &PlanDef) -> Vec<PlanIssue> {
    let mut issues = Vec::new();
    let mut declared: HashSet<&str> = HashSet::new();

    for (index, net) in plan.networks.iter().enumerate() {
        if net.name.is_empty() {
            issues.push(PlanIssue {
                location: format!("networks[{index}]"),
                message: "network definition should have a name".to_string(),
            });
        } else {
            declared.insert(net.name.as_str());
        }
    }

    for step in &plan.steps {
        validate_step(step, "", &declared, &mut issues);
    }
    issues
}

fn validate_step(step: &ExecutionStep, parent: &str, declared: &HashSet<&str>, issues: &mut Vec<PlanIssue>) {
    let label = if step.name.is_empty() { "<unnamed>" } else { step.name.as_str() };
    let location = if parent.is_empty() {
        label.to_string()
    } else {
        format!("{parent}/{label}")
    };
    let mut push = |message: String| {
        issues.push(PlanIssue {
            location: location.clone(),
            message,
        })
    };

    if step.mixes_substeps_and_networks() {
        push("step should either have substeps or networks but not both".to_string());
    }
    if step.mixes_iteration_modes() {
        push("num_iter must not be set together with criteria_network".to_string());
    }
    if let Some((report_net, interval)) = step.report() {
        if !interval.is_some_and(|seconds| seconds > 0) {
            push(format!("report_net '{report_net}' requires a positive report_interval"));
        }
        if !declared.contains(report_net) {
            push(format!("report net '{report_net}' is not declared in the plan"));
        }
    }
    if let Some(criteria) = step.criteria_network.as_deref()
        && !declared.contains(criteria)
    {
        push(format!("criteria network '{criteria}' is not declared in the plan"));
    }
    for network in &step.networks {
        if !declared.contains(network.as_str()) {
            push(format!("network '{network}' is not declared in the plan"));
        }
    }

    for substep in &step.substeps {
        validate_step(substep, &location, declared, issues);
    }
}
