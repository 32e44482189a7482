// Simulate module - builds the route tables once, then evaluates flows against them

pub mod evaluator;
pub mod report;

use crate::error::SimResult;
use crate::flows::FlowRecord;
use crate::plan::NetworkPlan;
use crate::routes::RouteTables;
use evaluator::FlowEvaluator;
use report::{Report, ResultAggregator};

/// A frozen plan and its route tables. Nothing is mutated after `new`.
#[derive(Debug, Clone)]
pub struct Simulation {
    plan: NetworkPlan,
    tables: RouteTables,
}

impl Simulation {
    pub fn new(plan: NetworkPlan) -> SimResult<Self> {
        let tables = plan.route_tables()?;
        if tables.is_empty() {
            tracing::warn!("Plan defines no networks, every flow will be unresolved");
        }
        for vpc in plan.vpcs() {
            tables.require(&vpc.associate_with)?;
        }
        tracing::info!(
            "Built {} route table(s) for {} network(s)",
            tables.len(),
            plan.vpcs().len()
        );
        Ok(Simulation { plan, tables })
    }

    pub fn tables(&self) -> &RouteTables {
        &self.tables
    }

    pub fn evaluator(&self) -> FlowEvaluator<'_> {
        FlowEvaluator::new(&self.plan, &self.tables)
    }

    /// Evaluate every flow exactly once and aggregate the verdicts
    pub fn run(&self, flows: &[FlowRecord], workers: usize) -> SimResult<Report> {
        let verdicts = self.evaluator().evaluate_all(flows, workers)?;

        let mut aggregator = ResultAggregator::new();
        for (flow, verdict) in flows.iter().zip(verdicts) {
            tracing::trace!(
                "{} -> {}: {} ({})",
                flow.src,
                flow.dst,
                verdict.simulated_action,
                verdict.reason
            );
            aggregator.record(flow, verdict);
        }

        let report = aggregator.finish();
        tracing::info!(
            "Evaluated {} flow(s): {} newly broken, {} unresolved",
            report.summary.total,
            report.summary.newly_broken,
            report.summary.unresolved
        );
        Ok(report)
    }
}
