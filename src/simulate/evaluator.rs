// Flow evaluator - decides reachability of one flow under the simulated plan

use crate::error::SimResult;
use crate::flows::{FlowRecord, ObservedAction};
use crate::plan::{NetworkPlan, Vpc};
use crate::routes::RouteTables;
use ipnet::IpNet;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulatedAction {
    Pass,
    Fail,
    UnresolvedSource,
    UnresolvedDest,
}

impl SimulatedAction {
    pub fn is_resolved(&self) -> bool {
        matches!(self, SimulatedAction::Pass | SimulatedAction::Fail)
    }
}

impl fmt::Display for SimulatedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SimulatedAction::Pass => "PASS",
            SimulatedAction::Fail => "FAIL",
            SimulatedAction::UnresolvedSource => "UNRESOLVED_SOURCE",
            SimulatedAction::UnresolvedDest => "UNRESOLVED_DEST",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reason {
    /// Source and destination are the same network
    SameNetwork,
    Routed { table: String, via: IpNet },
    NoRoute { table: String },
    /// The winning route points at a different attachment than the one
    /// owning the destination
    Misrouted {
        table: String,
        via: IpNet,
        target: String,
    },
    UnresolvedSource,
    UnresolvedDest,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::SameNetwork => write!(f, "same network"),
            Reason::Routed { table, via } => write!(f, "routed by {} via {}", table, via),
            Reason::NoRoute { table } => write!(f, "no route in {}", table),
            Reason::Misrouted { table, via, target } => {
                write!(f, "misrouted in {} via {} to {}", table, via, target)
            }
            Reason::UnresolvedSource => write!(f, "source matches no network in the plan"),
            Reason::UnresolvedDest => write!(f, "destination matches no network in the plan"),
        }
    }
}

/// The plan network a flow endpoint was attributed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribution {
    #[serde(skip)]
    pub vpc_index: usize,
    pub cidr: IpNet,
    pub name: String,
    pub vpc_id: Option<String>,
}

impl Attribution {
    fn new(vpc_index: usize, vpc: &Vpc) -> Self {
        Attribution {
            vpc_index,
            cidr: vpc.cidr,
            name: vpc.name.clone(),
            vpc_id: vpc.vpc_id.clone(),
        }
    }

    /// Same plan row, or two rows (primary and secondary CIDR) of one VPC
    pub fn same_network(&self, other: &Attribution) -> bool {
        self.vpc_index == other.vpc_index
            || matches!((&self.vpc_id, &other.vpc_id), (Some(a), Some(b)) if a == b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub simulated_action: SimulatedAction,
    /// None when an endpoint could not be attributed
    pub matches_observed: Option<bool>,
    pub reason: Reason,
    pub src_network: Option<Attribution>,
    pub dst_network: Option<Attribution>,
}

impl Verdict {
    fn resolved(
        passed: bool,
        reason: Reason,
        observed: ObservedAction,
        src: Attribution,
        dst: Attribution,
    ) -> Self {
        Verdict {
            simulated_action: if passed {
                SimulatedAction::Pass
            } else {
                SimulatedAction::Fail
            },
            matches_observed: Some(passed == (observed == ObservedAction::Accept)),
            reason,
            src_network: Some(src),
            dst_network: Some(dst),
        }
    }
}

/// Read-only view over a built plan; safe to share across threads
#[derive(Debug, Clone, Copy)]
pub struct FlowEvaluator<'a> {
    plan: &'a NetworkPlan,
    tables: &'a RouteTables,
}

impl<'a> FlowEvaluator<'a> {
    pub fn new(plan: &'a NetworkPlan, tables: &'a RouteTables) -> Self {
        FlowEvaluator { plan, tables }
    }

    pub fn evaluate(&self, flow: &FlowRecord) -> Verdict {
        let src = self
            .plan
            .attribute(&flow.src)
            .map(|(index, vpc)| (vpc, Attribution::new(index, vpc)));
        let dst = self
            .plan
            .attribute(&flow.dst)
            .map(|(index, vpc)| Attribution::new(index, vpc));

        let (src_vpc, src) = match src {
            Some(found) => found,
            None => {
                return Verdict {
                    simulated_action: SimulatedAction::UnresolvedSource,
                    matches_observed: None,
                    reason: Reason::UnresolvedSource,
                    src_network: None,
                    dst_network: dst,
                };
            }
        };
        let Some(dst) = dst else {
            return Verdict {
                simulated_action: SimulatedAction::UnresolvedDest,
                matches_observed: None,
                reason: Reason::UnresolvedDest,
                src_network: Some(src),
                dst_network: None,
            };
        };

        let observed = flow.observed_action;
        if src.same_network(&dst) {
            return Verdict::resolved(true, Reason::SameNetwork, observed, src, dst);
        }

        let table_name = src_vpc.associate_with.clone();
        let Some(table) = self.tables.get(&table_name) else {
            return Verdict::resolved(false, Reason::NoRoute { table: table_name }, observed, src, dst);
        };

        // Host endpoints take a per-address match, /24 buckets need a route covering all of it
        let route = if flow.dst.prefix_len() == flow.dst.max_prefix_len() {
            table.lookup(flow.dst.addr())
        } else {
            table.lookup_covering(&flow.dst)
        };
        match route {
            None => Verdict::resolved(false, Reason::NoRoute { table: table_name }, observed, src, dst),
            Some(route) if route.target.vpc_index != dst.vpc_index => {
                let reason = Reason::Misrouted {
                    table: table_name,
                    via: route.destination,
                    target: route.target.label(),
                };
                Verdict::resolved(false, reason, observed, src, dst)
            }
            Some(route) => {
                let reason = Reason::Routed {
                    table: table_name,
                    via: route.destination,
                };
                Verdict::resolved(true, reason, observed, src, dst)
            }
        }
    }

    /// Evaluate every flow on a pool of `workers` threads.
    /// Verdicts come back in input order.
    pub fn evaluate_all(&self, flows: &[FlowRecord], workers: usize) -> SimResult<Vec<Verdict>> {
        let workers = workers.max(1);
        if workers == 1 {
            return Ok(flows.iter().map(|flow| self.evaluate(flow)).collect());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("flow-eval-{}", i))
            .build()?;
        tracing::debug!("Evaluating {} flow(s) on {} worker(s)", flows.len(), workers);
        Ok(pool.install(|| flows.par_iter().map(|flow| self.evaluate(flow)).collect()))
    }
}
