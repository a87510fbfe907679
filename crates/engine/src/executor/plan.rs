//! Plan driver: instantiate declared networks, then run top-level steps in order.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use stepflow_types::PlanDef;
use tracing::{error, info, warn};

use super::{ShouldContinue, execute_step};
use crate::{error::ExecutionError, workspace::Workspace};

/// Wall-clock time spent in one top-level step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepTiming {
    pub name: String,
    pub elapsed: Duration,
}

/// Timing record of a successful plan run.
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub plan: Option<String>,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepTiming>,
    pub elapsed: Duration,
}

/// Run `plan` against `workspace`.
///
/// A plan without steps succeeds immediately and creates no networks. Otherwise
/// every network is created first; the first creation failure or step failure
/// aborts the plan and skips the remaining top-level steps.
pub fn run_plan(workspace: &Workspace, plan: &PlanDef, should_continue: ShouldContinue<'_>) -> Result<PlanSummary, ExecutionError> {
    let started_at = Utc::now();
    let plan_label = plan.name.as_deref().unwrap_or("unnamed");
    info!(plan = %plan_label, step_count = plan.steps.len(), "started executing plan");

    let mut summary = PlanSummary {
        plan: plan.name.clone(),
        started_at,
        steps: Vec::with_capacity(plan.steps.len()),
        elapsed: Duration::ZERO,
    };
    if plan.steps.is_empty() {
        warn!(plan = %plan_label, "nothing to run; the plan has no execution steps");
        return Ok(summary);
    }

    info!(plan = %plan_label, network_count = plan.networks.len(), "initializing networks");
    for definition in &plan.networks {
        if let Err(error) = workspace.create_net(definition) {
            error!(plan = %plan_label, net = %definition.name, "failed initializing the networks");
            return Err(error);
        }
    }

    let plan_timer = Instant::now();
    for step in &plan.steps {
        let step_timer = Instant::now();
        if let Err(error) = execute_step(workspace, step, should_continue) {
            error!(plan = %plan_label, step = %step.name, error = %error, "failed executing step");
            return Err(error);
        }
        let elapsed = step_timer.elapsed();
        info!(plan = %plan_label, step = %step.name, elapsed_ms = elapsed.as_millis() as u64, "step finished");
        summary.steps.push(StepTiming {
            name: step.name.clone(),
            elapsed,
        });
    }
    summary.elapsed = plan_timer.elapsed();
    info!(
        plan = %plan_label,
        started_at = %started_at.to_rfc3339(),
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "plan executed successfully"
    );
    Ok(summary)
}
