use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use stepflow_engine::{PlanSummary, RunLimits, Workspace};
use stepflow_types::{PlanDef, parse_plan_file, validate_plan};
use tracing::{error, warn};

fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    init_tracing(matches.get_one::<String>("log-level").map(String::as_str));

    match matches.subcommand() {
        Some(("run", sub)) => {
            let (plan, limits) = load(sub)?;
            let summary = execute(&Workspace::default(), &plan, limits)?;
            print_summary(&summary);
        }
        Some(("validate", sub)) => {
            let (plan, _) = load(sub)?;
            let issues = validate_plan(&plan);
            if issues.is_empty() {
                println!("plan is valid: {} network(s), {} top-level step(s)", plan.networks.len(), plan.steps.len());
            } else {
                for issue in &issues {
                    println!("{issue}");
                }
                bail!("plan has {} issue(s)", issues.len());
            }
        }
        Some(("blobs", sub)) => {
            let (plan, limits) = load(sub)?;
            let workspace = Workspace::default();
            execute(&workspace, &plan, limits)?;
            for name in workspace.list_blobs() {
                match workspace.blob_value(&name)? {
                    Some(value) => println!("{name}: {} {value}", value.element_type()),
                    None => println!("{name}: <empty>"),
                }
            }
        }
        _ => bail!("expected one of: run, validate, blobs"),
    }
    Ok(())
}

fn init_tracing(level: Option<&str>) {
    let filter = level
        .map(str::to_string)
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".into());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn build_cli() -> Command {
    let plan_file = Arg::new("file")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Path to plan YAML/JSON");
    let max_iterations = Arg::new("max-iterations")
        .long("max-iterations")
        .action(ArgAction::Set)
        .value_parser(value_parser!(u64))
        .help("Stop every loop after this many iterations");
    let timeout = Arg::new("timeout-secs")
        .long("timeout-secs")
        .action(ArgAction::Set)
        .value_parser(value_parser!(u64))
        .help("Stop all loops at their next iteration boundary after this many seconds");

    Command::new("stepflow")
        .about("Execute hierarchical network plans")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .action(ArgAction::Set)
                .help("Tracing filter, overrides RUST_LOG (e.g. debug, stepflow_engine=trace)"),
        )
        .subcommand(
            Command::new("run")
                .about("Run a plan and print step timings")
                .arg(plan_file.clone())
                .arg(max_iterations.clone())
                .arg(timeout.clone()),
        )
        .subcommand(Command::new("validate").about("Check a plan for structural issues").arg(plan_file.clone()))
        .subcommand(
            Command::new("blobs")
                .about("Run a plan and print every blob it leaves behind")
                .arg(plan_file)
                .arg(max_iterations)
                .arg(timeout),
        )
}

fn load(matches: &ArgMatches) -> Result<(PlanDef, RunLimits)> {
    let file = matches.get_one::<PathBuf>("file").context("expected a plan file")?;
    let plan = parse_plan_file(file)?;

    let mut limits = RunLimits::unlimited();
    if let Some(max) = matches.try_get_one::<u64>("max-iterations").ok().flatten() {
        limits = limits.with_max_iterations(*max);
    }
    if let Some(seconds) = matches.try_get_one::<u64>("timeout-secs").ok().flatten() {
        limits = limits.with_timeout(Duration::from_secs(*seconds));
    }
    Ok((plan, limits))
}

fn execute(workspace: &Workspace, plan: &PlanDef, limits: RunLimits) -> Result<PlanSummary> {
    for issue in validate_plan(plan) {
        warn!(location = %issue.location, "plan issue: {}", issue.message);
    }
    workspace
        .run_plan(plan, &|iteration| limits.should_continue(iteration))
        .inspect_err(|error| error!(error = %error, "plan failed"))
        .context("plan execution failed")
}

fn print_summary(summary: &PlanSummary) {
    let label = summary.plan.as_deref().unwrap_or("plan");
    println!("{label} started at {}", summary.started_at.to_rfc3339());
    for step in &summary.steps {
        println!("  {:<24} {:>10.3}s", step.name, step.elapsed.as_secs_f64());
    }
    println!("  {:<24} {:>10.3}s", "total", summary.elapsed.as_secs_f64());
}
