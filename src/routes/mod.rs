// Routes module - simulated transit gateway route tables and prefix lookups

pub mod builder;
pub mod lookup;

use crate::error::{SimError, SimResult};
use crate::plan::Vpc;
use ipnet::IpNet;
use lookup::PrefixIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Parse CIDR notation, ignoring interior whitespace ("10.215.96.0 /21").
/// A bare address is read as a host prefix.
pub fn parse_prefix(value: &str) -> SimResult<IpNet> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(SimError::MalformedCidr {
            value: value.to_string(),
            reason: "empty value".to_string(),
        });
    }

    if compact.contains('/') {
        return compact
            .parse::<IpNet>()
            .map(|net| net.trunc())
            .map_err(|e| SimError::MalformedCidr {
                value: value.to_string(),
                reason: e.to_string(),
            });
    }

    let addr: IpAddr = compact.parse().map_err(|_| SimError::MalformedCidr {
        value: value.to_string(),
        reason: "not an IP address or CIDR".to_string(),
    })?;
    let host_len = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    IpNet::new(addr, host_len).map_err(|e| SimError::MalformedCidr {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// The attachment a route forwards to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTarget {
    /// Position of the owning row in the network plan
    pub vpc_index: usize,
    pub vpc_id: Option<String>,
    pub name: String,
}

impl RouteTarget {
    pub fn for_vpc(vpc_index: usize, vpc: &Vpc) -> Self {
        RouteTarget {
            vpc_index,
            vpc_id: vpc.vpc_id.clone(),
            name: vpc.name.clone(),
        }
    }

    /// Two targets are the same attachment when they come from the same plan
    /// row, or when both carry the same VPC id.
    pub fn same_attachment(&self, other: &RouteTarget) -> bool {
        if self.vpc_index == other.vpc_index {
            return true;
        }
        matches!((&self.vpc_id, &other.vpc_id), (Some(a), Some(b)) if a == b)
    }

    pub fn label(&self) -> String {
        match &self.vpc_id {
            Some(id) => format!("{} ({})", self.name, id),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: IpNet,
    pub target: RouteTarget,
}

/// One simulated TGW route table
#[derive(Debug, Clone)]
pub struct RouteTable {
    pub name: String,
    index: PrefixIndex<Route>,
}

impl RouteTable {
    pub fn new(name: &str) -> Self {
        RouteTable {
            name: name.to_string(),
            index: PrefixIndex::new(),
        }
    }

    /// Longest-prefix-match route for a single address
    pub fn lookup(&self, dest: IpAddr) -> Option<&Route> {
        self.index.lookup(dest)
    }

    /// Longest-prefix-match route covering a whole destination prefix
    pub fn lookup_covering(&self, dest: &IpNet) -> Option<&Route> {
        self.index.lookup_covering(dest).map(|(_, route)| route)
    }

    pub fn routes(&self) -> Vec<&Route> {
        self.index.entries().into_iter().map(|(_, route)| route).collect()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }
}

/// Every route table referenced by a plan, keyed by name
#[derive(Debug, Clone, Default)]
pub struct RouteTables {
    tables: BTreeMap<String, RouteTable>,
}

impl RouteTables {
    pub fn get(&self, name: &str) -> Option<&RouteTable> {
        self.tables.get(name)
    }

    pub fn require(&self, name: &str) -> SimResult<&RouteTable> {
        self.get(name)
            .ok_or_else(|| SimError::UnknownRouteTable(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteTable> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Plain view of every table's routes, for comparing two builds
    #[cfg(test)]
    pub fn snapshot(&self) -> BTreeMap<String, Vec<Route>> {
        self.tables
            .iter()
            .map(|(name, table)| {
                let routes = table.routes().into_iter().cloned().collect();
                (name.clone(), routes)
            })
            .collect()
    }
}
