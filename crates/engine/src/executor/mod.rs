//! Step execution: recursive walk of the step tree with iteration control,
//! concurrent substep fan-out, cooperative cancellation, and scoped reporters.
//!
//! - `continuation` derives each step's own iteration policy
//! - `reporter` runs a step's report net on a background thread
//! - `plan` drives a whole plan: network creation, then top-level steps in order
//! - `limits` builds the external continuation predicate handed to a plan

use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use stepflow_types::ExecutionStep;
use tracing::{debug, error, info, warn};

use crate::{error::ExecutionError, workspace::Workspace};

mod continuation;
pub mod limits;
pub mod plan;
mod reporter;

pub use limits::RunLimits;
pub use plan::{PlanSummary, StepTiming, run_plan};

use continuation::ContinuationPolicy;
use reporter::Reporter;

/// External continuation predicate consulted once per iteration, with the
/// iteration index of the loop asking.
pub type ShouldContinue<'a> = &'a (dyn Fn(u64) -> bool + Sync);

/// Always-true predicate for callers without an outer cancellation source.
pub fn always_continue(_iteration: u64) -> bool {
    true
}

/// Execute `step` and everything beneath it.
///
/// An iteration runs while `external(i)` holds and the step's own policy
/// (fixed count or criteria network) agrees. The first failure at any level
/// stops the remaining work at that level and is returned to the caller.
pub fn execute_step(workspace: &Workspace, step: &ExecutionStep, external: ShouldContinue<'_>) -> Result<(), ExecutionError> {
    info!(step = %step.name, "running execution step");
    if step.mixes_substeps_and_networks() {
        error!(step = %step.name, "an execution step should either have substeps or networks but not both");
        return Err(ExecutionError::invalid_step(
            &step.name,
            "an execution step should either have substeps or networks but not both",
        ));
    }

    let _reporter = start_reporter(workspace, step)?;

    let policy = ContinuationPolicy::for_step(workspace, step).inspect_err(|error| {
        error!(step = %step.name, error = %error, "could not derive continuation policy");
    })?;
    let should_continue = |iteration: u64| -> Result<bool, ExecutionError> {
        Ok(external(iteration) && policy.should_continue(iteration)?)
    };

    if step.substeps.is_empty() {
        run_networks(workspace, step, &should_continue)
    } else {
        run_substeps(workspace, step, external, &should_continue)
    }
}

fn start_reporter(workspace: &Workspace, step: &ExecutionStep) -> Result<Option<Reporter>, ExecutionError> {
    let Some((report_net, interval)) = step.report() else {
        return Ok(None);
    };
    let Some(seconds) = interval.filter(|seconds| *seconds > 0) else {
        error!(step = %step.name, report_net = %report_net, "report_interval must be provided if report_net is set");
        return Err(ExecutionError::invalid_step(
            &step.name,
            format!("report_net '{report_net}' requires a positive report_interval"),
        ));
    };
    match workspace.get_net(report_net) {
        Some(network) => Ok(Reporter::start(&step.name, network, Duration::from_secs(seconds))),
        None => {
            warn!(step = %step.name, report_net = %report_net, "report net not found; running without reporter");
            Ok(None)
        }
    }
}

fn run_networks(
    workspace: &Workspace,
    step: &ExecutionStep,
    should_continue: &dyn Fn(u64) -> Result<bool, ExecutionError>,
) -> Result<(), ExecutionError> {
    let mut networks = Vec::with_capacity(step.networks.len());
    for name in &step.networks {
        let Some(network) = workspace.get_net(name) else {
            error!(step = %step.name, net = %name, "network not found");
            return Err(ExecutionError::NetNotFound(name.clone()));
        };
        debug!(step = %step.name, net = %name, "going to execute network");
        networks.push(network);
    }

    let mut iteration = 0u64;
    while should_continue(iteration)? {
        debug!(step = %step.name, iteration, "executing network iteration");
        for network in &networks {
            if let Err(cause) = network.run() {
                error!(step = %step.name, net = %network.name(), iteration, error = %format!("{cause:#}"), "network run failed");
                return Err(ExecutionError::NetRun {
                    name: network.name().to_string(),
                    cause,
                });
            }
        }
        iteration += 1;
    }
    debug!(step = %step.name, iterations = iteration, "execution step finished");
    Ok(())
}

fn run_substeps(
    workspace: &Workspace,
    step: &ExecutionStep,
    external: ShouldContinue<'_>,
    should_continue: &dyn Fn(u64) -> Result<bool, ExecutionError>,
) -> Result<(), ExecutionError> {
    let substeps = &step.substeps;
    let mut iteration = 0u64;
    while should_continue(iteration)? {
        info!(step = %step.name, iteration, "starting iteration");

        let next_substep = AtomicUsize::new(0);
        let got_failure = AtomicBool::new(false);
        let first_failure: Mutex<Option<ExecutionError>> = Mutex::new(None);
        let substep_should_continue = |inner: u64| !got_failure.load(Ordering::SeqCst) && external(inner);

        let worker = || {
            loop {
                let index = next_substep.fetch_add(1, Ordering::SeqCst);
                if got_failure.load(Ordering::SeqCst) || index >= substeps.len() {
                    break;
                }
                if let Err(error) = execute_step(workspace, &substeps[index], &substep_should_continue) {
                    got_failure.store(true, Ordering::SeqCst);
                    first_failure.lock().get_or_insert(error);
                }
            }
        };

        if step.runs_concurrently() {
            thread::scope(|scope| {
                for _ in 0..substeps.len() {
                    scope.spawn(&worker);
                }
            });
        } else {
            worker();
        }

        if let Some(error) = first_failure.into_inner() {
            warn!(step = %step.name, iteration, error = %error, "substep failed; aborting step");
            return Err(error);
        }
        iteration += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{Result, bail};

    use super::*;
    use crate::{blob::BlobValue, network::Network};

    /// Appends its name to a shared log on every run; fails when told to.
    struct LoggingNet {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        fail_on_run: Option<usize>,
        runs: AtomicUsize,
    }

    impl Network for LoggingNet {
        fn name(&self) -> &str {
            &self.name
        }
        fn external_outputs(&self) -> &[String] {
            &[]
        }
        fn run(&self) -> Result<()> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            self.log.lock().push(self.name.clone());
            if self.fail_on_run == Some(run) {
                bail!("{} failed on run {run}", self.name);
            }
            Ok(())
        }
    }

    /// Writes the next scripted boolean into `flag` on each run.
    struct ScriptedCriteria {
        script: Mutex<Vec<bool>>,
        outputs: Vec<String>,
        workspace_flag: Arc<crate::blob::Blob>,
    }

    impl Network for ScriptedCriteria {
        fn name(&self) -> &str {
            "criteria"
        }
        fn external_outputs(&self) -> &[String] {
            &self.outputs
        }
        fn run(&self) -> Result<()> {
            let mut script = self.script.lock();
            let next = if script.is_empty() { false } else { script.remove(0) };
            self.workspace_flag.set(BlobValue::Bool(vec![next]));
            Ok(())
        }
    }

    fn register_logging(workspace: &Workspace, log: &Arc<Mutex<Vec<String>>>, name: &str, fail_on_run: Option<usize>) {
        workspace
            .register_net(Arc::new(LoggingNet {
                name: name.to_string(),
                log: log.clone(),
                fail_on_run,
                runs: AtomicUsize::new(0),
            }))
            .expect("register");
    }

    fn leaf(name: &str, networks: &[&str]) -> ExecutionStep {
        ExecutionStep {
            name: name.to_string(),
            networks: networks.iter().map(|net| net.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn leaf_step_runs_networks_in_order_for_each_iteration() {
        let workspace = Workspace::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        register_logging(&workspace, &log, "a", None);
        register_logging(&workspace, &log, "b", None);

        let step = ExecutionStep {
            num_iter: Some(3),
            ..leaf("train", &["a", "b"])
        };
        execute_step(&workspace, &step, &always_continue).expect("step succeeds");
        assert_eq!(log.lock().clone(), vec!["a", "b", "a", "b", "a", "b"]);
    }

    #[test]
    fn leaf_step_stops_at_first_failure() {
        let workspace = Workspace::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        register_logging(&workspace, &log, "a", Some(2));
        register_logging(&workspace, &log, "b", None);

        let step = ExecutionStep {
            num_iter: Some(5),
            ..leaf("train", &["a", "b"])
        };
        let error = execute_step(&workspace, &step, &always_continue).expect_err("step fails");
        assert!(matches!(error, ExecutionError::NetRun { ref name, .. } if name == "a"));
        assert_eq!(log.lock().clone(), vec!["a", "b", "a"]);
    }

    #[test]
    fn leaf_step_with_unknown_network_runs_nothing() {
        let workspace = Workspace::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        register_logging(&workspace, &log, "a", None);

        let error = execute_step(&workspace, &leaf("train", &["a", "ghost"]), &always_continue).expect_err("unresolved");
        assert!(matches!(error, ExecutionError::NetNotFound(ref name) if name == "ghost"));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn mixed_step_fails_validation_without_running() {
        let workspace = Workspace::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        register_logging(&workspace, &log, "a", None);

        let step = ExecutionStep {
            substeps: vec![leaf("child", &["a"])],
            ..leaf("mixed", &["a"])
        };
        let error = execute_step(&workspace, &step, &always_continue).expect_err("invalid");
        assert!(matches!(error, ExecutionError::InvalidStep { .. }));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn criteria_sequence_controls_iterations() {
        let workspace = Workspace::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        register_logging(&workspace, &log, "work", None);
        let flag = workspace.create_blob("keep_going");
        workspace
            .register_net(Arc::new(ScriptedCriteria {
                script: Mutex::new(vec![true, true, false]),
                outputs: vec!["keep_going".into()],
                workspace_flag: flag,
            }))
            .expect("register criteria");

        let step = ExecutionStep {
            criteria_network: Some("criteria".into()),
            ..leaf("loop", &["work"])
        };
        execute_step(&workspace, &step, &always_continue).expect("step succeeds");
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn external_predicate_caps_iterations() {
        let workspace = Workspace::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        register_logging(&workspace, &log, "a", None);

        let step = ExecutionStep {
            num_iter: Some(10),
            ..leaf("train", &["a"])
        };
        execute_step(&workspace, &step, &|iteration| iteration < 4).expect("step succeeds");
        assert_eq!(log.lock().len(), 4);
    }

    #[test]
    fn sequential_substeps_stop_after_failure() {
        let workspace = Workspace::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        register_logging(&workspace, &log, "one", None);
        register_logging(&workspace, &log, "two", Some(1));
        register_logging(&workspace, &log, "three", None);

        let step = ExecutionStep {
            name: "outer".into(),
            num_iter: Some(3),
            substeps: vec![leaf("s1", &["one"]), leaf("s2", &["two"]), leaf("s3", &["three"])],
            ..Default::default()
        };
        let error = execute_step(&workspace, &step, &always_continue).expect_err("fails");
        assert!(matches!(error, ExecutionError::NetRun { ref name, .. } if name == "two"));
        assert_eq!(log.lock().clone(), vec!["one", "two"]);
    }

    #[test]
    fn composite_step_repeats_all_substeps_per_iteration() {
        let workspace = Workspace::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        register_logging(&workspace, &log, "one", None);
        register_logging(&workspace, &log, "two", None);

        let step = ExecutionStep {
            name: "outer".into(),
            num_iter: Some(2),
            substeps: vec![leaf("s1", &["one"]), leaf("s2", &["two"])],
            ..Default::default()
        };
        execute_step(&workspace, &step, &always_continue).expect("succeeds");
        assert_eq!(log.lock().clone(), vec!["one", "two", "one", "two"]);
    }

    #[test]
    fn concurrent_substeps_run_every_child() {
        let workspace = Workspace::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let names = ["w0", "w1", "w2", "w3"];
        for name in names {
            register_logging(&workspace, &log, name, None);
        }

        let step = ExecutionStep {
            name: "fan_out".into(),
            concurrent_substeps: true,
            substeps: names.iter().map(|name| leaf(name, &[*name])).collect(),
            ..Default::default()
        };
        execute_step(&workspace, &step, &always_continue).expect("succeeds");
        let mut seen = log.lock().clone();
        seen.sort();
        assert_eq!(seen, vec!["w0", "w1", "w2", "w3"]);
    }

    #[test]
    fn concurrent_failure_fails_the_round() {
        let workspace = Workspace::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let names = ["w0", "w1", "w2", "w3"];
        for name in names {
            register_logging(&workspace, &log, name, (name == "w2").then_some(1));
        }

        let step = ExecutionStep {
            name: "fan_out".into(),
            concurrent_substeps: true,
            num_iter: Some(3),
            substeps: names.iter().map(|name| leaf(name, &[*name])).collect(),
            ..Default::default()
        };
        let error = execute_step(&workspace, &step, &always_continue).expect_err("fails");
        assert!(matches!(error, ExecutionError::NetRun { ref name, .. } if name == "w2"));
        let started = log.lock().len();
        assert!((1..=4).contains(&started), "started {started} substeps");
        assert!(log.lock().iter().any(|name| name == "w2"));
    }

    #[test]
    fn criteria_with_two_outputs_fails_before_any_leaf_run() {
        let workspace = Workspace::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        register_logging(&workspace, &log, "work", None);
        let flag = workspace.create_blob("keep_going");
        workspace
            .register_net(Arc::new(ScriptedCriteria {
                script: Mutex::new(vec![true, true]),
                outputs: vec!["keep_going".into(), "extra".into()],
                workspace_flag: flag,
            }))
            .expect("register criteria");

        let step = ExecutionStep {
            criteria_network: Some("criteria".into()),
            ..leaf("loop", &["work"])
        };
        let error = execute_step(&workspace, &step, &always_continue).expect_err("contract violation");
        assert!(matches!(error, ExecutionError::CriteriaContract { ref network, .. } if network == "criteria"));
        assert!(log.lock().is_empty());
    }

    /// Sleeps briefly on every run so a long loop can be observed mid-flight.
    struct SlowNet {
        runs: Arc<AtomicUsize>,
    }

    impl Network for SlowNet {
        fn name(&self) -> &str {
            "slow"
        }
        fn external_outputs(&self) -> &[String] {
            &[]
        }
        fn run(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
            Ok(())
        }
    }

    #[test]
    fn concurrent_failure_stops_sibling_inner_loop() {
        let workspace = Workspace::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let slow_runs = Arc::new(AtomicUsize::new(0));
        workspace
            .register_net(Arc::new(SlowNet { runs: slow_runs.clone() }))
            .expect("register slow");
        register_logging(&workspace, &log, "broken", Some(1));

        let step = ExecutionStep {
            name: "fan_out".into(),
            concurrent_substeps: true,
            substeps: vec![
                ExecutionStep {
                    num_iter: Some(10_000),
                    ..leaf("long", &["slow"])
                },
                leaf("failing", &["broken"]),
            ],
            ..Default::default()
        };
        let started = std::time::Instant::now();
        let error = execute_step(&workspace, &step, &always_continue).expect_err("fails");
        assert!(matches!(error, ExecutionError::NetRun { ref name, .. } if name == "broken"));
        let runs = slow_runs.load(Ordering::SeqCst);
        assert!(runs < 10_000, "sibling loop ran to completion ({runs} runs)");
        assert!(started.elapsed() < Duration::from_secs(5), "sibling loop was not cancelled promptly");
    }

    #[test]
    fn missing_report_net_is_not_fatal() {
        let workspace = Workspace::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        register_logging(&workspace, &log, "a", None);

        let step = ExecutionStep {
            report_net: Some("ghost".into()),
            report_interval: Some(1),
            ..leaf("train", &["a"])
        };
        execute_step(&workspace, &step, &always_continue).expect("succeeds");
        assert_eq!(log.lock().clone(), vec!["a"]);
    }

    #[test]
    fn report_net_without_interval_is_rejected() {
        let workspace = Workspace::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        register_logging(&workspace, &log, "a", None);
        register_logging(&workspace, &log, "report", None);

        let step = ExecutionStep {
            report_net: Some("report".into()),
            ..leaf("train", &["a"])
        };
        let error = execute_step(&workspace, &step, &always_continue).expect_err("invalid");
        assert!(error.to_string().contains("positive report_interval"), "unexpected error: {error}");
        assert!(log.lock().is_empty());
    }
}
