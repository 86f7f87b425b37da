use async_trait::async_trait;
use graphcore::{Node, NodeContext, NodeData, NodeError, NodeKind};
use serde_json::json;

/// Binary comparison that selects the live outgoing branch
pub struct ConditionNode;

/// `Number()` coercion: blank is zero, anything unparsable is NaN
fn to_number(operand: &str) -> f64 {
    if operand.is_empty() {
        return 0.0;
    }
    operand.parse().unwrap_or(f64::NAN)
}

fn evaluate(left: &str, operator: &str, right: &str) -> bool {
    match operator {
        "eq" => left == right,
        "neq" => left != right,
        "contains" => left.contains(right),
        "gt" => to_number(left) > to_number(right),
        "lt" => to_number(left) < to_number(right),
        _ => false,
    }
}

fn operand(data: &NodeData, key: &str) -> String {
    match data.get(key) {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

#[async_trait]
impl Node for ConditionNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ControlCondition
    }

    async fn compute(&self, ctx: NodeContext, mut data: NodeData) -> Result<NodeData, NodeError> {
        ctx.check_cancelled()?;
        let left = operand(&data, "leftOperand");
        let right = operand(&data, "rightOperand");
        let operator = data.get_str("operator").unwrap_or("eq").to_string();

        let result = evaluate(&left, &operator, &right);
        let branch = if result { "true" } else { "false" };
        ctx.events.info(format!("{left} {operator} {right} => {branch}"));

        data.set("branch", branch);
        Ok(data.succeed(json!({ "branch": branch, "result": result }).to_string()))
    }
}

/// Human-in-the-loop gate
pub struct ApprovalNode;

#[async_trait]
impl Node for ApprovalNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ControlApproval
    }

    async fn compute(&self, ctx: NodeContext, mut data: NodeData) -> Result<NodeData, NodeError> {
        ctx.check_cancelled()?;
        if data.get_bool("approved") == Some(true) {
            let output = ctx.last_input().unwrap_or("{}").to_string();
            data.set("approved", true);
            data.set("pendingApproval", false);
            return Ok(data.succeed(output));
        }

        let pending = json!({
            "status": "pending_approval",
            "title": data.get("title"),
            "description": data.get("description"),
        });
        data.set("pendingApproval", true);
        data.set("approved", false);
        ctx.events.info("Waiting for approval");
        Ok(data.succeed(pending.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;
    use graphcore::ComputeInput;

    #[test]
    fn operators() {
        assert!(evaluate("a", "eq", "a"));
        assert!(evaluate("a", "neq", "b"));
        assert!(evaluate("hello world", "contains", "lo w"));
        assert!(evaluate("10", "gt", "9"));
        assert!(evaluate("", "lt", "1"));
        assert!(!evaluate("abc", "gt", "1"));
        assert!(!evaluate("abc", "lt", "1"));
        assert!(!evaluate("1", "between", "2"));
    }

    #[tokio::test]
    async fn records_the_branch() {
        let data = NodeData::new()
            .with_field("leftOperand", " 5 ")
            .with_field("operator", "gt")
            .with_field("rightOperand", "3");
        let out = ConditionNode.compute(context(), data).await.unwrap();
        assert_eq!(out.get_str("branch"), Some("true"));
        assert_eq!(out.output.as_deref(), Some(r#"{"branch":"true","result":true}"#));

        let out = ConditionNode.compute(context(), NodeData::new().with_field("leftOperand", "x")).await.unwrap();
        assert_eq!(out.get_str("branch"), Some("false"));
    }

    #[tokio::test]
    async fn approval_pends_then_forwards() {
        let ctx = context().with_inputs(vec![ComputeInput::new("payload")]);
        let data = NodeData::new().with_field("title", "Ship it?");

        let pending = ApprovalNode.compute(ctx.clone(), data).await.unwrap();
        assert_eq!(pending.get_bool("pendingApproval"), Some(true));
        let output: serde_json::Value = serde_json::from_str(pending.output.as_deref().unwrap()).unwrap();
        assert_eq!(output["status"], "pending_approval");
        assert_eq!(output["title"], "Ship it?");

        let mut approved = pending;
        approved.set("approved", true);
        let done = ApprovalNode.compute(ctx, approved).await.unwrap();
        assert_eq!(done.output.as_deref(), Some("payload"));
        assert_eq!(done.get_bool("pendingApproval"), Some(false));
    }
}
