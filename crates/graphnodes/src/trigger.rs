use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use graphcore::{Node, NodeContext, NodeData, NodeError, NodeKind};
use serde_json::{json, Map, Value};

/// Start of a run; optionally carries a pasted list of rows
pub struct ManualTriggerNode;

#[async_trait]
impl Node for ManualTriggerNode {
    fn kind(&self) -> NodeKind {
        NodeKind::TriggerManual
    }

    async fn compute(&self, ctx: NodeContext, data: NodeData) -> Result<NodeData, NodeError> {
        ctx.check_cancelled()?;
        let at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut payload = json!({ "triggered": true, "at": at });

        let rows = parse_rows(data.get_str("listInput").unwrap_or_default());
        if !rows.is_empty() {
            ctx.events.info(format!("Loaded {} row(s)", rows.len()));
            payload["rows"] = Value::Array(rows);
        }

        Ok(data.succeed(payload.to_string()))
    }
}

/// CSV with a header line when the first line has a comma, otherwise one
/// value per line.
fn parse_rows(list: &str) -> Vec<Value> {
    let mut lines = list.lines().map(str::trim).filter(|l| !l.is_empty());
    let Some(first) = lines.next() else {
        return Vec::new();
    };

    if !first.contains(',') {
        return std::iter::once(first)
            .chain(lines)
            .map(|line| json!({ "email": line, "value": line }))
            .collect();
    }

    let headers: Vec<&str> = first.split(',').map(str::trim).collect();
    lines
        .map(|line| {
            let row: Map<String, Value> = headers
                .iter()
                .zip(line.split(',').map(str::trim).chain(std::iter::repeat("")))
                .map(|(header, cell)| (header.to_string(), Value::String(cell.to_string())))
                .collect();
            Value::Object(row)
        })
        .collect()
}
