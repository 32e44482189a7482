// Result aggregation and report rendering

use super::evaluator::{Attribution, Reason, SimulatedAction, Verdict};
use crate::error::SimResult;
use crate::flows::{FlowRecord, ObservedAction};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Report categories, declared in severity order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Observed ACCEPT, simulated FAIL
    NewlyBroken,
    /// Observed REJECT, simulated PASS
    NewlyPassing,
    Unresolved,
    Consistent,
}

impl Category {
    /// `matches_observed` is None for unattributed flows
    pub fn classify(matches_observed: Option<bool>, observed: ObservedAction) -> Self {
        match (matches_observed, observed) {
            (None, _) => Category::Unresolved,
            (Some(true), _) => Category::Consistent,
            (Some(false), ObservedAction::Accept) => Category::NewlyBroken,
            (Some(false), ObservedAction::Reject) => Category::NewlyPassing,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::NewlyBroken => "newly_broken",
            Category::NewlyPassing => "newly_passing",
            Category::Unresolved => "unresolved",
            Category::Consistent => "consistent",
        }
    }
}

/// One deduplicated (source bucket, destination bucket, outcome) finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub category: Category,
    pub src: IpNet,
    pub dst: IpNet,
    pub src_network: Option<Attribution>,
    pub dst_network: Option<Attribution>,
    pub simulated_action: SimulatedAction,
    pub observed_action: ObservedAction,
    pub reason: Reason,
    pub flows: u64,
    pub packets: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub unresolved: u64,
    pub newly_broken: u64,
    pub newly_passing: u64,
    pub findings: u64,
}

type Signature = (Category, IpNet, IpNet, SimulatedAction, ObservedAction);

/// Collects one verdict per flow into deduplicated findings
#[derive(Debug, Default)]
pub struct ResultAggregator {
    findings: BTreeMap<Signature, Finding>,
    summary: Summary,
}

impl ResultAggregator {
    pub fn new() -> Self {
        ResultAggregator::default()
    }

    pub fn record(&mut self, flow: &FlowRecord, verdict: Verdict) {
        let category = Category::classify(verdict.matches_observed, flow.observed_action);

        self.summary.total += 1;
        match verdict.simulated_action {
            SimulatedAction::Pass => self.summary.passed += 1,
            SimulatedAction::Fail => self.summary.failed += 1,
            SimulatedAction::UnresolvedSource | SimulatedAction::UnresolvedDest => {
                self.summary.unresolved += 1
            }
        }
        match category {
            Category::NewlyBroken => self.summary.newly_broken += 1,
            Category::NewlyPassing => self.summary.newly_passing += 1,
            _ => {}
        }

        // Resolved endpoints collapse onto their network's CIDR
        let src = verdict.src_network.as_ref().map_or(flow.src, |n| n.cidr);
        let dst = verdict.dst_network.as_ref().map_or(flow.dst, |n| n.cidr);
        let signature = (category, src, dst, verdict.simulated_action, flow.observed_action);
        let packets = flow.packets.unwrap_or(0);

        self.findings
            .entry(signature)
            .and_modify(|finding| {
                finding.flows += 1;
                finding.packets += packets;
            })
            .or_insert_with(|| Finding {
                category,
                src,
                dst,
                src_network: verdict.src_network,
                dst_network: verdict.dst_network,
                simulated_action: verdict.simulated_action,
                observed_action: flow.observed_action,
                reason: verdict.reason,
                flows: 1,
                packets,
            });
    }

    /// Findings sorted by severity, then source, then destination
    pub fn finish(self) -> Report {
        let findings: Vec<Finding> = self.findings.into_values().collect();
        let summary = Summary {
            findings: findings.len() as u64,
            ..self.summary
        };
        Report { summary, findings }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub show_warnings: bool,
    pub show_consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub summary: Summary,
    pub findings: Vec<Finding>,
}

fn describe(endpoint: &IpNet, network: &Option<Attribution>, side: &str) -> String {
    match network {
        Some(net) => format!(
            "{} ({} name: {}, {} id: {})",
            endpoint,
            side,
            net.name,
            side,
            net.vpc_id.as_deref().unwrap_or("-")
        ),
        None => endpoint.to_string(),
    }
}

impl Report {
    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.category == category)
    }

    pub fn has_regressions(&self) -> bool {
        self.summary.newly_broken > 0
    }

    pub fn render(&self, format: ReportFormat, options: &RenderOptions) -> SimResult<String> {
        match format {
            ReportFormat::Text => Ok(self.render_text(options)),
            ReportFormat::Json => self.render_json(),
        }
    }

    pub fn render_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn render_text(&self, options: &RenderOptions) -> String {
        let mut out = String::new();

        for finding in &self.findings {
            let shown = match finding.category {
                Category::NewlyBroken | Category::NewlyPassing => true,
                Category::Unresolved => options.show_warnings || !self.has_regressions(),
                Category::Consistent => options.show_consistent,
            };
            if !shown {
                continue;
            }

            let src = describe(&finding.src, &finding.src_network, "src");
            let dst = describe(&finding.dst, &finding.dst_network, "dst");
            let verb = match finding.simulated_action {
                SimulatedAction::Pass => "can reach",
                _ => "cannot reach",
            };
            let _ = writeln!(
                out,
                "[{}] {} {} {}: {} (observed {}, {} flow(s), {} packet(s))",
                finding.category.label(),
                src,
                verb,
                dst,
                finding.reason,
                finding.observed_action,
                finding.flows,
                finding.packets
            );
        }

        let s = &self.summary;
        let _ = writeln!(out);
        let _ = writeln!(out, "Total processed flows: {}", s.total);
        let _ = writeln!(out, "Unresolved flows: {}", s.unresolved);
        let _ = writeln!(out, "Passing flows: {}", s.passed);
        let _ = writeln!(out, "Failing flows: {}", s.failed);
        let _ = writeln!(out, "Newly broken flows: {}", s.newly_broken);
        let _ = writeln!(out, "Newly passing flows: {}", s.newly_passing);
        let _ = writeln!(out, "Deduplicated findings: {}", s.findings);

        if s.unresolved > 0 && !options.show_warnings && self.has_regressions() {
            let _ = writeln!(out, "\nRepeat the command with --show-warnings to see unresolved flows");
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribution(index: usize, cidr: &str, name: &str) -> Attribution {
        Attribution {
            vpc_index: index,
            cidr: cidr.parse().unwrap(),
            name: name.to_string(),
            vpc_id: Some(format!("vpc-{}", name)),
        }
    }

    fn verdict(
        action: SimulatedAction,
        observed: ObservedAction,
        reason: Reason,
        src: Option<Attribution>,
        dst: Option<Attribution>,
    ) -> Verdict {
        let passed = action == SimulatedAction::Pass;
        Verdict {
            simulated_action: action,
            matches_observed: action
                .is_resolved()
                .then_some(passed == (observed == ObservedAction::Accept)),
            reason,
            src_network: src,
            dst_network: dst,
        }
    }

    fn flow(src: &str, dst: &str, observed: ObservedAction, packets: u64) -> FlowRecord {
        FlowRecord::new(src.parse().unwrap(), dst.parse().unwrap(), observed).with_packets(packets)
    }

    #[test]
    fn test_classify() {
        use ObservedAction::*;
        assert_eq!(Category::classify(Some(false), Accept), Category::NewlyBroken);
        assert_eq!(Category::classify(Some(true), Reject), Category::Consistent);
        assert_eq!(Category::classify(Some(false), Reject), Category::NewlyPassing);
        assert_eq!(Category::classify(Some(true), Accept), Category::Consistent);
        assert_eq!(Category::classify(None, Accept), Category::Unresolved);
        assert!(Category::NewlyBroken < Category::Unresolved);
    }

    #[test]
    fn test_category_follows_verdict_outcome() {
        let a = attribution(0, "10.1.0.0/24", "a");
        let mut aggregator = ResultAggregator::new();
        // Same-network flow observed as rejected: the verdict says it does not match
        aggregator.record(
            &flow("10.1.0.1/32", "10.1.0.2/32", ObservedAction::Reject, 1),
            verdict(SimulatedAction::Pass, ObservedAction::Reject, Reason::SameNetwork, Some(a.clone()), Some(a)),
        );
        let report = aggregator.finish();
        assert_eq!(report.findings[0].category, Category::NewlyPassing);
        assert_eq!(report.summary.newly_passing, 1);
        assert!(!report.has_regressions());
    }

    #[test]
    fn test_dedup_by_network_bucket() {
        let a = attribution(0, "10.1.0.0/23", "a");
        let b = attribution(1, "10.2.0.0/24", "b");
        let no_route = Reason::NoRoute { table: "RT-A".to_string() };

        let mut aggregator = ResultAggregator::new();
        for src in ["10.1.0.0/24", "10.1.1.0/24"] {
            aggregator.record(
                &flow(src, "10.2.0.0/24", ObservedAction::Accept, 10),
                verdict(SimulatedAction::Fail, ObservedAction::Accept, no_route.clone(), Some(a.clone()), Some(b.clone())),
            );
        }
        let report = aggregator.finish();

        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.newly_broken, 2);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].flows, 2);
        assert_eq!(report.findings[0].packets, 20);
        assert_eq!(report.findings[0].src.to_string(), "10.1.0.0/23");
        assert!(report.has_regressions());
    }

    #[test]
    fn test_sorted_by_severity() {
        let a = attribution(0, "10.1.0.0/24", "a");
        let b = attribution(1, "10.2.0.0/24", "b");
        let mut aggregator = ResultAggregator::new();

        aggregator.record(
            &flow("10.1.0.1/32", "10.2.0.1/32", ObservedAction::Accept, 1),
            verdict(
                SimulatedAction::Pass,
                ObservedAction::Accept,
                Reason::Routed {
                    table: "RT-A".to_string(),
                    via: "10.2.0.0/24".parse().unwrap(),
                },
                Some(a.clone()),
                Some(b.clone()),
            ),
        );
        aggregator.record(
            &flow("10.1.0.1/32", "172.16.5.5/32", ObservedAction::Accept, 1),
            verdict(SimulatedAction::UnresolvedDest, ObservedAction::Accept, Reason::UnresolvedDest, Some(a.clone()), None),
        );
        aggregator.record(
            &flow("10.2.0.1/32", "10.1.0.1/32", ObservedAction::Accept, 1),
            verdict(
                SimulatedAction::Fail,
                ObservedAction::Accept,
                Reason::NoRoute { table: "RT-B".to_string() },
                Some(b),
                Some(a),
            ),
        );

        let report = aggregator.finish();
        let order: Vec<Category> = report.findings.iter().map(|f| f.category).collect();
        assert_eq!(
            order,
            vec![Category::NewlyBroken, Category::Unresolved, Category::Consistent]
        );
        assert_eq!(report.findings[1].dst.to_string(), "172.16.5.5/32");
        assert_eq!(report.by_category(Category::Unresolved).count(), 1);
    }

    #[test]
    fn test_render_text_shows_unresolved_without_regressions() {
        let a = attribution(0, "10.1.0.0/24", "a");
        let mut aggregator = ResultAggregator::new();
        aggregator.record(
            &flow("10.1.0.1/32", "172.16.5.5/32", ObservedAction::Accept, 4),
            verdict(SimulatedAction::UnresolvedDest, ObservedAction::Accept, Reason::UnresolvedDest, Some(a), None),
        );
        let report = aggregator.finish();
        assert!(!report.has_regressions());

        let text = report.render_text(&RenderOptions::default());
        assert!(text.contains("[unresolved]"));
        assert!(text.contains("172.16.5.5/32"));
        assert!(text.contains("Unresolved flows: 1"));
        assert!(!text.contains("--show-warnings"));
    }

    #[test]
    fn test_render_text_hides_unresolved_behind_regressions() {
        let a = attribution(0, "10.1.0.0/24", "a");
        let b = attribution(1, "10.2.0.0/24", "b");
        let mut aggregator = ResultAggregator::new();
        aggregator.record(
            &flow("10.1.0.1/32", "172.16.5.5/32", ObservedAction::Accept, 4),
            verdict(SimulatedAction::UnresolvedDest, ObservedAction::Accept, Reason::UnresolvedDest, Some(a.clone()), None),
        );
        aggregator.record(
            &flow("10.1.0.1/32", "10.2.0.1/32", ObservedAction::Accept, 2),
            verdict(
                SimulatedAction::Fail,
                ObservedAction::Accept,
                Reason::NoRoute { table: "RT-A".to_string() },
                Some(a),
                Some(b),
            ),
        );
        let report = aggregator.finish();
        assert!(report.has_regressions());

        let quiet = report.render_text(&RenderOptions::default());
        assert!(quiet.contains("[newly_broken]"));
        assert!(!quiet.contains("172.16.5.5"));
        assert!(quiet.contains("--show-warnings"));

        let loud = report.render_text(&RenderOptions {
            show_warnings: true,
            show_consistent: false,
        });
        assert!(loud.contains("[unresolved]"));
        assert!(loud.contains("172.16.5.5/32"));
    }

    #[test]
    fn test_render_json() {
        let report = ResultAggregator::new().finish();
        let json = report.render(ReportFormat::Json, &RenderOptions::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["total"], 0);
        assert!(value["findings"].as_array().unwrap().is_empty());
    }
}
