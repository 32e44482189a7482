// Error types for the transit gateway route simulator

use thiserror::Error;

/// Main error type for plan loading, route table building and flow ingestion
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Unsupported CIDR {cidr} for {name}: /{prefix_len} is shorter than the minimum /{min_prefix_len}")]
    InvalidCidr {
        name: String,
        cidr: String,
        prefix_len: u8,
        min_prefix_len: u8,
    },

    #[error("Malformed CIDR or address '{value}': {reason}")]
    MalformedCidr { value: String, reason: String },

    #[error("{name} ({cidr}) has no associate_with route table")]
    MissingAssociation { name: String, cidr: String },

    #[error("CIDR {cidr} is declared by both {first} and {second}")]
    DuplicateVpcCidr {
        cidr: String,
        first: String,
        second: String,
    },

    #[error("CIDR {cidr} is already registered in this index")]
    DuplicateCidr { cidr: String },

    #[error("Route table {table} has conflicting routes for {cidr}: {existing} and {conflicting}")]
    RouteConflict {
        table: String,
        cidr: String,
        existing: String,
        conflicting: String,
    },

    #[error("Unknown route table: {0}")]
    UnknownRouteTable(String),

    #[error("Invalid plan row {row}: {reason}")]
    PlanRow { row: usize, reason: String },

    #[error("Invalid inventory export: {0}")]
    Inventory(String),

    #[error("Invalid flow log line {line}: {reason}")]
    FlowLine { line: usize, reason: String },

    #[error("Unknown flow action '{0}', expected ACCEPT or REJECT")]
    InvalidAction(String),

    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type alias using SimError
pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    /// Convert error to a remediation hint for the operator
    pub fn user_message(&self) -> String {
        match self {
            SimError::InvalidCidr { min_prefix_len, .. } => {
                format!(
                    "Split the CIDR into /{} blocks or lower plan.min_prefix_len in the config file.",
                    min_prefix_len
                )
            }
            SimError::MalformedCidr { .. } => {
                "Use dotted CIDR notation, for example 10.1.2.0/24.".to_string()
            }
            SimError::MissingAssociation { .. } => {
                "Every attachment must be associated with exactly one route table. Fill in associate_with.".to_string()
            }
            SimError::DuplicateVpcCidr { .. } => {
                "Two plan rows claim the same CIDR. Remove or correct one of them.".to_string()
            }
            SimError::DuplicateCidr { .. } => {
                "The same CIDR was registered twice. This is ambiguous and must be fixed in the plan.".to_string()
            }
            SimError::RouteConflict { table, .. } => {
                format!(
                    "Route table {} would receive the same CIDR from two attachments. Stop one of them propagating.",
                    table
                )
            }
            SimError::UnknownRouteTable(_) => {
                "The route table is not referenced by any plan row.".to_string()
            }
            SimError::PlanRow { .. } => {
                "Check the plan file columns: cidr, account_id, name, vpc_id, associate_with, propagate_to.".to_string()
            }
            SimError::Inventory(_) => {
                "Input does not look like an AWS Config VPC query export.".to_string()
            }
            SimError::FlowLine { .. } => {
                "Check the flow log summary: expected src,dest,numpackets columns.".to_string()
            }
            SimError::InvalidAction(_) => {
                "Flow actions must be ACCEPT or REJECT.".to_string()
            }
            SimError::UnsupportedFormat(_) => {
                "Use a .json or .toml plan file and a .csv or .json flow log.".to_string()
            }
            SimError::Io(_) => "File system error. Check paths and permissions.".to_string(),
            SimError::Serialization(_) | SimError::TomlParse(_) | SimError::TomlWrite(_) => {
                "Data format error. Check the file syntax.".to_string()
            }
            SimError::WorkerPool(_) => {
                "Lower --workers or [simulation] workers.".to_string()
            }
        }
    }

    /// Plan errors abort the run before any flow is evaluated
    pub fn is_plan_error(&self) -> bool {
        matches!(
            self,
            SimError::InvalidCidr { .. }
                | SimError::MissingAssociation { .. }
                | SimError::DuplicateVpcCidr { .. }
                | SimError::DuplicateCidr { .. }
                | SimError::RouteConflict { .. }
        )
    }
}
