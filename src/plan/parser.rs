// Plan file parsing - loosely typed spreadsheet-style rows into VPC records
//
// Rows come from a spreadsheet export or a generated file, so account ids may
// be numbers and propagate_to may be a comma-joined string.

use super::Vpc;
use crate::error::{SimError, SimResult};
use crate::routes::parse_prefix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// A string cell that a spreadsheet may have turned into a number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(u64),
}

impl Cell {
    /// Account ids are 12 digits; numeric cells lose their leading zeros
    fn into_account_id(self) -> String {
        match self {
            Cell::Text(text) => text.trim().to_string(),
            Cell::Number(n) => format!("{:012}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableList {
    List(Vec<String>),
    Joined(String),
}

impl TableList {
    fn into_set(self) -> BTreeSet<String> {
        let items: Vec<String> = match self {
            TableList::List(items) => items,
            TableList::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        };
        items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }
}

/// One plan row as written by the operator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRow {
    pub cidr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associate_with: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagate_to: Option<TableList>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl PlanRow {
    /// Convert to a typed record. `row` is 1-based and only used in errors.
    pub fn into_vpc(self, row: usize) -> SimResult<Vpc> {
        let cidr = parse_prefix(&self.cidr).map_err(|e| SimError::PlanRow {
            row,
            reason: e.to_string(),
        })?;

        let vpc_id = non_empty(self.vpc_id);
        let account_id = self
            .account_id
            .map(Cell::into_account_id)
            .filter(|id| !id.is_empty());
        let name = non_empty(self.name)
            .or_else(|| vpc_id.clone())
            .unwrap_or_else(|| cidr.to_string());

        Ok(Vpc {
            cidr,
            account_id,
            name,
            vpc_id,
            associate_with: non_empty(self.associate_with).unwrap_or_default(),
            propagate_to: self.propagate_to.map(TableList::into_set).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonPlan {
    Rows(Vec<PlanRow>),
    Wrapped { vpcs: Vec<PlanRow> },
}

/// TOML plans are a list of `[[vpc]]` tables
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TomlPlan {
    #[serde(default)]
    pub vpc: Vec<PlanRow>,
}

pub fn rows_to_vpcs(rows: Vec<PlanRow>) -> SimResult<Vec<Vpc>> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| row.into_vpc(i + 1))
        .collect()
}

pub fn parse_json(input: &str) -> SimResult<Vec<Vpc>> {
    let rows = match serde_json::from_str::<JsonPlan>(input)? {
        JsonPlan::Rows(rows) => rows,
        JsonPlan::Wrapped { vpcs } => vpcs,
    };
    rows_to_vpcs(rows)
}

pub fn parse_toml(input: &str) -> SimResult<Vec<Vpc>> {
    let plan: TomlPlan = toml::from_str(input)?;
    rows_to_vpcs(plan.vpc)
}

/// Read a plan file, choosing the format by extension
pub fn read_plan(path: &Path) -> SimResult<Vec<Vpc>> {
    let content = std::fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let vpcs = match extension.as_deref() {
        Some("json") => parse_json(&content)?,
        Some("toml") => parse_toml(&content)?,
        _ => {
            return Err(SimError::UnsupportedFormat(path.display().to_string()));
        }
    };

    tracing::debug!("Read {} plan row(s) from {}", vpcs.len(), path.display());
    Ok(vpcs)
}
