// Plan scaffolding from an AWS Config advanced query export of VPCs
//
// The generated plan has empty associate_with/propagate_to columns for the
// operator to fill in before it can be loaded.

use super::parser::{PlanRow, TableList, TomlPlan};
use crate::error::{SimError, SimResult};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ConfigExport {
    results: Option<Vec<ResultItem>>,
}

/// Advanced query results are JSON documents, sometimes encoded as strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResultItem {
    Object(ConfigResource),
    Encoded(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResource {
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    resource_id: Option<String>,
    #[serde(default)]
    configuration: ResourceConfiguration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceConfiguration {
    #[serde(default)]
    cidr_block: Option<String>,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    key: String,
    value: String,
}

/// Turn a Config export into plan rows, skipping `exclude_cidrs`
pub fn scaffold_rows(export_json: &str, exclude_cidrs: &[String]) -> SimResult<Vec<PlanRow>> {
    let export: ConfigExport = serde_json::from_str(export_json)?;
    let results = export
        .results
        .ok_or_else(|| SimError::Inventory("missing \"results\" block".to_string()))?;

    let mut rows = Vec::with_capacity(results.len());
    for (position, item) in results.into_iter().enumerate() {
        let resource = match item {
            ResultItem::Object(resource) => resource,
            ResultItem::Encoded(text) => serde_json::from_str(&text)?,
        };

        let cidr = resource.configuration.cidr_block.ok_or_else(|| {
            SimError::Inventory(format!("result {} has no cidrBlock", position + 1))
        })?;
        if exclude_cidrs.iter().any(|excluded| excluded == &cidr) {
            tracing::debug!("Skipping excluded CIDR {}", cidr);
            continue;
        }

        let name = resource
            .configuration
            .tags
            .iter()
            .find(|tag| tag.key == "Name")
            .map(|tag| tag.value.clone());
        if let Some(name) = &name {
            if name.contains(',') {
                return Err(SimError::Inventory(format!(
                    "{} ({}) has a comma in its name",
                    name,
                    resource.resource_id.as_deref().unwrap_or("unknown")
                )));
            }
        }

        rows.push(PlanRow {
            cidr,
            account_id: resource.account_id.map(super::parser::Cell::Text),
            name,
            vpc_id: resource.resource_id,
            associate_with: Some(String::new()),
            propagate_to: Some(TableList::List(Vec::new())),
        });
    }

    Ok(rows)
}

pub fn render_plan(rows: Vec<PlanRow>) -> SimResult<String> {
    Ok(toml::to_string(&TomlPlan { vpc: rows })?)
}

/// Write a plan skeleton. Refuses to replace an existing file unless `force`.
pub fn write_scaffold(
    export_path: &Path,
    output_path: &Path,
    exclude_cidrs: &[String],
    force: bool,
) -> SimResult<usize> {
    if output_path.exists() && !force {
        return Err(SimError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", output_path.display()),
        )));
    }

    let export_json = std::fs::read_to_string(export_path)?;
    let rows = scaffold_rows(&export_json, exclude_cidrs)?;
    let count = rows.len();
    std::fs::write(output_path, render_plan(rows)?)?;

    tracing::info!("Wrote {} plan row(s) to {}", count, output_path.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::parser::parse_toml;

    const EXPORT: &str = r#"{
        "results": [
            {"accountId": "012345678912", "resourceId": "vpc-aaa",
             "configuration": {"cidrBlock": "10.1.0.0/24",
                               "tags": [{"key": "Env", "value": "prod"}, {"key": "Name", "value": "App"}]}},
            {"accountId": "012345678912", "resourceId": "vpc-skip",
             "configuration": {"cidrBlock": "10.123.123.0/32"}},
            "{\"accountId\": \"111111111111\", \"resourceId\": \"vpc-bbb\", \"configuration\": {\"cidrBlock\": \"10.2.0.0/24\"}}"
        ]
    }"#;

    #[test]
    fn test_scaffold_rows() {
        let rows = scaffold_rows(EXPORT, &["10.123.123.0/32".to_string()]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name.as_deref(), Some("App"));
        assert_eq!(rows[0].vpc_id.as_deref(), Some("vpc-aaa"));
        assert_eq!(rows[1].vpc_id.as_deref(), Some("vpc-bbb"));
        assert_eq!(rows[1].name, None);
    }

    #[test]
    fn test_rendered_plan_reads_back() {
        let rows = scaffold_rows(EXPORT, &[]).unwrap();
        let text = render_plan(rows).unwrap();
        let vpcs = parse_toml(&text).unwrap();
        assert_eq!(vpcs.len(), 3);
        assert_eq!(vpcs[0].account_id.as_deref(), Some("012345678912"));
        assert!(vpcs.iter().all(|vpc| vpc.associate_with.is_empty()));
    }

    #[test]
    fn test_missing_results_block() {
        let err = scaffold_rows(r#"{"other": []}"#, &[]).unwrap_err();
        assert!(matches!(err, SimError::Inventory(_)));
    }

    #[test]
    fn test_comma_in_name_rejected() {
        let export = r#"{"results": [{"resourceId": "vpc-1", "configuration":
            {"cidrBlock": "10.1.0.0/24", "tags": [{"key": "Name", "value": "a,b"}]}}]}"#;
        assert!(matches!(scaffold_rows(export, &[]), Err(SimError::Inventory(_))));
    }
}
