// Flow log parsers - Athena summary CSV and JSON flow lists

use super::{parse_endpoint, FlowRecord, ObservedAction};
use crate::error::{SimError, SimResult};
use serde::Deserialize;
use std::path::Path;

/// Column positions found in the summary header
#[derive(Debug)]
struct Columns {
    src: usize,
    dst: usize,
    packets: Option<usize>,
    action: Option<usize>,
}

impl Columns {
    fn from_header(header: &[String], line: usize) -> SimResult<Self> {
        let find = |names: &[&str]| header.iter().position(|h| names.contains(&h.as_str()));

        let src = find(&["src", "source", "srcaddr", "sourceaddress"]).ok_or_else(|| {
            SimError::FlowLine {
                line,
                reason: "header has no src column".to_string(),
            }
        })?;
        let dst = find(&["dest", "dst", "dstaddr", "destinationaddress"]).ok_or_else(|| {
            SimError::FlowLine {
                line,
                reason: "header has no dest column".to_string(),
            }
        })?;

        Ok(Columns {
            src,
            dst,
            packets: find(&["numpackets", "packets"]),
            action: find(&["action", "observed_action"]),
        })
    }
}

fn split_fields(line: &str) -> Vec<String> {
    line.split(',')
        .map(|field| field.trim().trim_matches('"').trim().to_string())
        .collect()
}

/// Parse the summary CSV produced by the flow log aggregation query.
///
/// Rows without an action column are ACCEPT, as the query only selects
/// accepted traffic.
pub fn parse_athena_csv(input: &str) -> SimResult<Vec<FlowRecord>> {
    let mut lines = input
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .filter(|(_, line)| !line.trim().is_empty());

    let Some((header_line, header)) = lines.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<String> = split_fields(header)
        .into_iter()
        .map(|h| h.to_ascii_lowercase())
        .collect();
    let columns = Columns::from_header(&header, header_line)?;

    let mut flows = Vec::new();
    for (line, text) in lines {
        let fields = split_fields(text);
        let field = |index: usize| -> SimResult<&str> {
            fields
                .get(index)
                .map(String::as_str)
                .ok_or_else(|| SimError::FlowLine {
                    line,
                    reason: format!("expected at least {} columns", index + 1),
                })
        };
        let at_line = |e: SimError| SimError::FlowLine {
            line,
            reason: e.to_string(),
        };

        let src = parse_endpoint(field(columns.src)?).map_err(at_line)?;
        let dst = parse_endpoint(field(columns.dst)?).map_err(at_line)?;
        let observed_action = match columns.action {
            Some(index) => field(index)?.parse::<ObservedAction>().map_err(at_line)?,
            None => ObservedAction::Accept,
        };

        let mut record = FlowRecord::new(src, dst, observed_action);
        if let Some(index) = columns.packets {
            let raw = field(index)?;
            if !raw.is_empty() {
                let packets = raw.parse::<u64>().map_err(|e| SimError::FlowLine {
                    line,
                    reason: format!("bad packet count '{}': {}", raw, e),
                })?;
                record = record.with_packets(packets);
            }
        }
        flows.push(record);
    }

    Ok(flows)
}

#[derive(Debug, Deserialize)]
struct JsonFlow {
    src: String,
    #[serde(alias = "dest")]
    dst: String,
    /// Parsed with the same rules as the CSV action column
    #[serde(default, alias = "action")]
    observed_action: Option<String>,
    #[serde(default, alias = "numpackets")]
    packets: Option<u64>,
}

pub fn parse_json(input: &str) -> SimResult<Vec<FlowRecord>> {
    let raw: Vec<JsonFlow> = serde_json::from_str(input)?;
    raw.into_iter()
        .enumerate()
        .map(|(i, flow)| {
            let at_entry = |e: SimError| SimError::FlowLine {
                line: i + 1,
                reason: e.to_string(),
            };
            let observed_action = match flow.observed_action.as_deref() {
                Some(action) => action.parse::<ObservedAction>().map_err(at_entry)?,
                None => ObservedAction::Accept,
            };
            Ok(FlowRecord {
                src: parse_endpoint(&flow.src).map_err(at_entry)?,
                dst: parse_endpoint(&flow.dst).map_err(at_entry)?,
                observed_action,
                packets: flow.packets,
            })
        })
        .collect()
}

/// Read a flow log file; `.json` is a JSON list, anything else summary CSV
pub fn read_flows(path: &Path) -> SimResult<Vec<FlowRecord>> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let flows = if is_json {
        parse_json(&content)?
    } else {
        parse_athena_csv(&content)?
    };

    tracing::info!("Read {} flow(s) from {}", flows.len(), path.display());
    Ok(flows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_athena_summary() {
        let input = "\"src\",\"dest\",\"numpackets\",\"lines\"\n\
                     \"10.1.0\",\"10.2.0\",\"120\",\"3\"\n\
                     \n\
                     \"10.1.0\",\"172.16.5\",\"\",\"1\"\n";
        let flows = parse_athena_csv(input).unwrap();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].src.to_string(), "10.1.0.0/24");
        assert_eq!(flows[0].dst.to_string(), "10.2.0.0/24");
        assert_eq!(flows[0].packets, Some(120));
        assert_eq!(flows[0].observed_action, ObservedAction::Accept);
        assert_eq!(flows[1].packets, None);
    }

    #[test]
    fn test_parse_csv_with_action_column() {
        let input = "src,dst,action\n10.1.0.5,10.2.0.9,REJECT\n";
        let flows = parse_athena_csv(input).unwrap();
        assert_eq!(flows[0].observed_action, ObservedAction::Reject);
        assert_eq!(flows[0].src.prefix_len(), 32);
    }

    #[test]
    fn test_parse_csv_errors_name_line() {
        let err = parse_athena_csv("src,dest\n10.1.0,10.2.0\n10.1.0,bogus\n").unwrap_err();
        assert!(matches!(err, SimError::FlowLine { line: 3, .. }));

        let err = parse_athena_csv("from,to\n").unwrap_err();
        assert!(matches!(err, SimError::FlowLine { line: 1, .. }));

        let err = parse_athena_csv("src,dest,numpackets\n10.1.0,10.2.0\n").unwrap_err();
        assert!(matches!(err, SimError::FlowLine { line: 2, .. }));
    }

    #[test]
    fn test_parse_empty_csv() {
        assert!(parse_athena_csv("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_json_flows() {
        let input = r#"[
            {"src": "10.1.0.5", "dst": "10.2.0.0/24", "observed_action": "REJECT"},
            {"src": "10.1.0", "dest": "10.2.0", "packets": 9}
        ]"#;
        let flows = parse_json(input).unwrap();
        assert_eq!(flows[0].observed_action, ObservedAction::Reject);
        assert_eq!(flows[1].observed_action, ObservedAction::Accept);
        assert_eq!(flows[1].dst.to_string(), "10.2.0.0/24");
        assert_eq!(flows[1].packets, Some(9));
    }

    #[test]
    fn test_json_actions_follow_csv_rules() {
        let input = r#"[
            {"src": "10.1.0.5", "dst": "10.2.0.5", "action": "accept"},
            {"src": "10.1.0.5", "dst": "10.2.0.5", "observed_action": "REJECTED"}
        ]"#;
        let flows = parse_json(input).unwrap();
        assert_eq!(flows[0].observed_action, ObservedAction::Accept);
        assert_eq!(flows[1].observed_action, ObservedAction::Reject);

        let csv = parse_athena_csv("src,dest,action\n10.1.0.5,10.2.0.5,accept\n").unwrap();
        assert_eq!(csv[0].observed_action, flows[0].observed_action);

        let err = parse_json(r#"[{"src": "10.1.0.5", "dst": "10.2.0.5", "action": "DROP"}]"#).unwrap_err();
        assert!(matches!(err, SimError::FlowLine { line: 1, .. }));
    }
}
