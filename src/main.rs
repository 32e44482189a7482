mod config;
mod error;
mod flows;
mod plan;
mod routes;
mod simulate;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use config::{CheckConfig, Config, Mode, ScaffoldConfig};
use error::SimError;
use plan::NetworkPlan;
use simulate::report::Category;
use simulate::Simulation;

fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // Initialize logging on stderr, stdout carries the report
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match config.mode {
        Mode::Check(check) => run_check(&check),
        Mode::Scaffold(scaffold) => run_scaffold(&scaffold),
    }
}

fn run_check(check: &CheckConfig) -> anyhow::Result<()> {
    tracing::info!("TGW route simulator starting...");

    let vpcs = plan::parser::read_plan(&check.plan_path)
        .map_err(explain)
        .with_context(|| format!("Failed to read plan {}", check.plan_path.display()))?;
    let network_plan = NetworkPlan::load_with(vpcs, &check.plan_options).map_err(explain)?;
    let simulation = Simulation::new(network_plan).map_err(explain)?;
    tracing::info!(
        "Route tables: {}",
        simulation.tables().names().collect::<Vec<_>>().join(", ")
    );

    let flows = flows::parser::read_flows(&check.flows_path)
        .map_err(explain)
        .with_context(|| format!("Failed to read flow log {}", check.flows_path.display()))?;

    let report = simulation.run(&flows, check.workers).map_err(explain)?;
    if check.render.show_warnings {
        for finding in report.by_category(Category::Unresolved) {
            tracing::warn!("No network for {} -> {}: {}", finding.src, finding.dst, finding.reason);
        }
    }

    let rendered = report.render(check.format, &check.render)?;
    println!("{}", rendered.trim_end());

    if report.has_regressions() {
        anyhow::bail!(
            "{} flow(s) that were accepted would fail under this plan",
            report.summary.newly_broken
        );
    }
    Ok(())
}

fn run_scaffold(scaffold: &ScaffoldConfig) -> anyhow::Result<()> {
    let count = plan::inventory::write_scaffold(
        &scaffold.export_path,
        &scaffold.output_path,
        &scaffold.exclude_cidrs,
        scaffold.force,
    )
    .map_err(explain)?;

    println!(
        "Wrote {} network(s) to {}. Fill in associate_with and propagate_to before running check.",
        count,
        scaffold.output_path.display()
    );
    Ok(())
}

/// Attach the operator hint; plan errors abort before any flow is evaluated
fn explain(err: SimError) -> anyhow::Error {
    if err.is_plan_error() {
        tracing::error!("Plan validation failed, no report produced");
    }
    let hint = err.user_message();
    anyhow::anyhow!("{}. {}", err, hint)
}
