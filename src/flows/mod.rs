// Flows module - summarized flow log records to evaluate

pub mod parser;

use crate::error::{SimError, SimResult};
use crate::routes::parse_prefix;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObservedAction {
    Accept,
    Reject,
}

impl FromStr for ObservedAction {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACCEPT" | "ACCEPTED" | "OK" => Ok(ObservedAction::Accept),
            "REJECT" | "REJECTED" => Ok(ObservedAction::Reject),
            _ => Err(SimError::InvalidAction(s.trim().to_string())),
        }
    }
}

impl fmt::Display for ObservedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservedAction::Accept => write!(f, "ACCEPT"),
            ObservedAction::Reject => write!(f, "REJECT"),
        }
    }
}

/// One pre-aggregated flow: endpoints are host prefixes or address buckets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowRecord {
    pub src: IpNet,
    pub dst: IpNet,
    pub observed_action: ObservedAction,
    pub packets: Option<u64>,
}

impl FlowRecord {
    pub fn new(src: IpNet, dst: IpNet, observed_action: ObservedAction) -> Self {
        FlowRecord {
            src,
            dst,
            observed_action,
            packets: None,
        }
    }

    pub fn with_packets(mut self, packets: u64) -> Self {
        self.packets = Some(packets);
        self
    }
}

/// Parse a flow endpoint.
///
/// Besides addresses and CIDRs this accepts the three-octet form the flow log
/// summary query produces, where `10.1.2` means `10.1.2.0/24`.
pub fn parse_endpoint(value: &str) -> SimResult<IpNet> {
    let trimmed = value.trim().trim_matches('"').trim();
    let octets: Vec<&str> = trimmed.split('.').collect();
    let is_bucket = octets.len() == 3
        && octets
            .iter()
            .all(|octet| !octet.is_empty() && octet.parse::<u8>().is_ok());

    if is_bucket {
        parse_prefix(&format!("{}.0/24", trimmed))
    } else {
        parse_prefix(trimmed)
    }
}
