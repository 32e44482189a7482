// Plan module - validated network plan and VPC attribution

pub mod inventory;
pub mod parser;

use crate::error::{SimError, SimResult};
use crate::routes::builder::RouteTableBuilder;
use crate::routes::lookup::PrefixIndex;
use crate::routes::RouteTables;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Shortest VPC prefix the simulator accepts unless configured otherwise
pub const DEFAULT_MIN_PREFIX_LEN: u8 = 24;

/// One TGW attachment, or a non-VPC network such as an on-premises range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vpc {
    pub cidr: IpNet,
    pub account_id: Option<String>,
    pub name: String,
    pub vpc_id: Option<String>,
    /// Route table used for this attachment's outbound traffic
    pub associate_with: String,
    /// Route tables this attachment's CIDR is advertised into
    pub propagate_to: BTreeSet<String>,
}

impl Vpc {
    pub fn label(&self) -> String {
        match &self.vpc_id {
            Some(id) => format!("{} ({}, {})", self.name, id, self.cidr),
            None => format!("{} ({})", self.name, self.cidr),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub min_prefix_len: u8,
}

impl Default for PlanOptions {
    fn default() -> Self {
        PlanOptions {
            min_prefix_len: DEFAULT_MIN_PREFIX_LEN,
        }
    }
}

/// Immutable, validated VPC list with its attribution index
#[derive(Debug, Clone)]
pub struct NetworkPlan {
    vpcs: Vec<Vpc>,
    attribution: PrefixIndex<usize>,
}

impl NetworkPlan {
    pub fn load(entries: Vec<Vpc>) -> SimResult<Self> {
        Self::load_with(entries, &PlanOptions::default())
    }

    /// Validate every entry and build the attribution index.
    ///
    /// Fails on the first entry that is unassociated, too wide for
    /// `options.min_prefix_len`, or that repeats another entry's CIDR.
    pub fn load_with(entries: Vec<Vpc>, options: &PlanOptions) -> SimResult<Self> {
        let mut attribution: PrefixIndex<usize> = PrefixIndex::new();

        for (index, vpc) in entries.iter().enumerate() {
            if vpc.associate_with.trim().is_empty() {
                return Err(SimError::MissingAssociation {
                    name: vpc.name.clone(),
                    cidr: vpc.cidr.to_string(),
                });
            }

            if vpc.cidr.prefix_len() < options.min_prefix_len {
                return Err(SimError::InvalidCidr {
                    name: vpc.name.clone(),
                    cidr: vpc.cidr.to_string(),
                    prefix_len: vpc.cidr.prefix_len(),
                    min_prefix_len: options.min_prefix_len,
                });
            }

            if let Some(&first) = attribution.get(&vpc.cidr) {
                return Err(SimError::DuplicateVpcCidr {
                    cidr: vpc.cidr.to_string(),
                    first: entries[first].label(),
                    second: vpc.label(),
                });
            }
            attribution.insert(vpc.cidr, index)?;
        }

        tracing::info!("Loaded network plan with {} network(s)", entries.len());

        Ok(NetworkPlan {
            vpcs: entries,
            attribution,
        })
    }

    pub fn vpcs(&self) -> &[Vpc] {
        &self.vpcs
    }

    /// Classify a flow endpoint (host or bucket prefix) into the most
    /// specific network whose CIDR covers all of it.
    pub fn attribute(&self, endpoint: &IpNet) -> Option<(usize, &Vpc)> {
        let (_, &index) = self.attribution.lookup_covering(endpoint)?;
        self.vpcs.get(index).map(|vpc| (index, vpc))
    }

    /// Every route table name the plan references
    #[cfg(test)]
    pub fn table_names(&self) -> BTreeSet<&str> {
        self.vpcs
            .iter()
            .flat_map(|vpc| {
                std::iter::once(vpc.associate_with.as_str())
                    .chain(vpc.propagate_to.iter().map(String::as_str))
            })
            .collect()
    }

    pub fn route_tables(&self) -> SimResult<RouteTables> {
        RouteTableBuilder::from_vpcs(&self.vpcs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, cidr: &str, associate: &str) -> Vpc {
        Vpc {
            cidr: cidr.parse().unwrap(),
            account_id: Some("000000000000".to_string()),
            name: name.to_string(),
            vpc_id: Some(format!("vpc-{}", name)),
            associate_with: associate.to_string(),
            propagate_to: BTreeSet::new(),
        }
    }

    #[test]
    fn test_rejects_wide_cidr() {
        let err = NetworkPlan::load(vec![entry("wide", "10.0.0.0/16", "RT-A")]).unwrap_err();
        assert!(matches!(
            err,
            SimError::InvalidCidr {
                prefix_len: 16,
                min_prefix_len: 24,
                ..
            }
        ));
    }

    #[test]
    fn test_wide_cidr_allowed_when_configured() {
        let options = PlanOptions { min_prefix_len: 16 };
        let plan = NetworkPlan::load_with(vec![entry("wide", "10.0.0.0/16", "RT-A")], &options);
        assert!(plan.is_ok());
    }

    #[test]
    fn test_rejects_missing_association() {
        let err = NetworkPlan::load(vec![entry("lonely", "10.1.0.0/24", "  ")]).unwrap_err();
        assert!(matches!(err, SimError::MissingAssociation { ref name, .. } if name == "lonely"));
    }

    #[test]
    fn test_rejects_duplicate_cidr() {
        let err = NetworkPlan::load(vec![
            entry("a", "10.1.0.0/24", "RT-A"),
            entry("b", "10.1.0.0/24", "RT-B"),
        ])
        .unwrap_err();
        match err {
            SimError::DuplicateVpcCidr { first, second, .. } => {
                assert!(first.contains("vpc-a"));
                assert!(second.contains("vpc-b"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_attribution_prefers_most_specific() {
        let options = PlanOptions { min_prefix_len: 8 };
        let mut onprem = entry("datacenter", "10.0.0.0/8", "RT-ONPREM");
        onprem.vpc_id = None;
        let plan = NetworkPlan::load_with(
            vec![onprem, entry("app", "10.20.1.0/24", "RT-APP")],
            &options,
        )
        .unwrap();

        let (index, vpc) = plan.attribute(&"10.20.1.9/32".parse().unwrap()).unwrap();
        assert_eq!(index, 1);
        assert_eq!(vpc.name, "app");

        let (_, vpc) = plan.attribute(&"10.99.0.0/24".parse().unwrap()).unwrap();
        assert_eq!(vpc.name, "datacenter");
        assert!(vpc.vpc_id.is_none());

        assert!(plan.attribute(&"172.16.5.5/32".parse().unwrap()).is_none());
    }

    #[test]
    fn test_table_names() {
        let mut a = entry("a", "10.1.0.0/24", "RT-A");
        a.propagate_to.insert("RT-B".to_string());
        a.propagate_to.insert("RT-A".to_string());
        let plan = NetworkPlan::load(vec![a, entry("c", "10.3.0.0/24", "RT-C")]).unwrap();
        let names: Vec<&str> = plan.table_names().into_iter().collect();
        assert_eq!(names, vec!["RT-A", "RT-B", "RT-C"]);
    }
}
