use crate::endpoints::ServiceEndpoints;
use crate::http::send;
use async_trait::async_trait;
use graphcore::{Node, NodeContext, NodeData, NodeError, NodeKind};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_CHANNEL: &str = "#general";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SlackConfig {
    operation: Option<String>,
    channel: Option<String>,
    message: Option<String>,
    email: Option<String>,
    user_id: Option<String>,
    channel_name: Option<String>,
    is_private: Option<bool>,
    users: Option<String>,
    limit: Option<f64>,
    timestamp: Option<String>,
    reaction_name: Option<String>,
    items: Option<Vec<SlackPost>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SlackPost {
    channel: Option<String>,
    message: Option<String>,
}

/// Trimmed, non-empty value of an optional field
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required(value: Option<&str>, message: &str) -> Result<String, NodeError> {
    value
        .map(str::to_string)
        .ok_or_else(|| NodeError::Configuration(message.to_string()))
}

impl SlackConfig {
    fn posts(&self) -> Vec<(String, String)> {
        let items = self.items.as_deref().unwrap_or_default();
        if items.is_empty() {
            let channel = present(&self.channel).unwrap_or(DEFAULT_CHANNEL);
            return vec![(channel.to_string(), self.message.clone().unwrap_or_default())];
        }
        items
            .iter()
            .map(|item| {
                let channel = present(&item.channel).unwrap_or(DEFAULT_CHANNEL);
                (channel.to_string(), item.message.clone().unwrap_or_default())
            })
            .collect()
    }

    fn limit(&self, default: f64) -> u32 {
        self.limit.unwrap_or(default).round().clamp(1.0, 100.0) as u32
    }
}

/// Slack Web API operations
pub struct SlackNode {
    client: reqwest::Client,
    endpoints: ServiceEndpoints,
}

impl SlackNode {
    pub fn new(endpoints: ServiceEndpoints) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
        }
    }

    /// POST a Web API method; `ok: false` becomes an error carrying Slack's reason
    async fn call(
        &self,
        ctx: &NodeContext,
        token: &str,
        method: &str,
        body: Value,
    ) -> Result<Value, NodeError> {
        let request = self
            .client
            .post(format!("{}/{}", self.endpoints.slack, method))
            .bearer_auth(token)
            .json(&body);
        let (status, text) = send(ctx, request).await?;
        let json: Value = serde_json::from_str(&text).map_err(|_| {
            NodeError::ExecutionFailed(format!("Slack {}: {}", status.as_u16(), text))
        })?;
        if json.get("ok").and_then(Value::as_bool) != Some(true) {
            let reason = json
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Slack request failed");
            return Err(NodeError::ExecutionFailed(reason.to_string()));
        }
        Ok(json)
    }

    async fn run(&self, ctx: &NodeContext, token: &str, config: &SlackConfig) -> Result<Value, NodeError> {
        let operation = config.operation.as_deref().unwrap_or("post_message");
        match operation {
            "post_message" => {
                let mut results = Vec::new();
                for (channel, message) in config.posts() {
                    ctx.check_cancelled()?;
                    let body = json!({ "channel": channel, "text": message });
                    results.push(self.call(ctx, token, "chat.postMessage", body).await?);
                    ctx.events.info(format!("Posted to {}", channel));
                }
                if results.len() == 1 {
                    Ok(results.remove(0))
                } else {
                    Ok(json!({ "sent": true, "count": results.len(), "results": results }))
                }
            }
            "invite_user" => {
                let email = present(&config.email).or(present(&config.user_id));
                let email = required(email, "Email is required for invite.")?;
                self.call(ctx, token, "users.admin.invite", json!({ "email": email }))
                    .await
            }
            "create_channel" => {
                let name = required(present(&config.channel_name), "Channel name is required.")?;
                let body = json!({ "name": name, "is_private": config.is_private.unwrap_or(false) });
                self.call(ctx, token, "conversations.create", body).await
            }
            "invite_to_channel" => {
                let message = "Channel and user IDs are required.";
                let channel = required(present(&config.channel), message)?;
                let users: Vec<&str> = present(&config.users)
                    .map(|u| u.split(',').map(str::trim).filter(|u| !u.is_empty()).collect())
                    .unwrap_or_default();
                if users.is_empty() {
                    return Err(NodeError::Configuration(message.to_string()));
                }
                let body = json!({ "channel": channel, "users": users });
                self.call(ctx, token, "conversations.invite", body).await
            }
            "channel_history" => {
                let channel = required(present(&config.channel), "Channel ID is required.")?;
                let body = json!({ "channel": channel, "limit": config.limit(10.0) });
                let json = self.call(ctx, token, "conversations.history", body).await?;
                let messages = json.get("messages").cloned().unwrap_or_else(|| json!([]));
                Ok(json!({ "messages": messages }))
            }
            "list_channels" => {
                let body = json!({ "limit": config.limit(100.0) });
                let json = self.call(ctx, token, "conversations.list", body).await?;
                let channels = json.get("channels").cloned().unwrap_or_else(|| json!([]));
                Ok(json!({ "channels": channels }))
            }
            "reaction" => {
                let message = "Channel, timestamp, and emoji name are required.";
                let channel = required(present(&config.channel), message)?;
                let timestamp = required(present(&config.timestamp), message)?;
                let name = required(present(&config.reaction_name), message)?;
                let body = json!({ "channel": channel, "timestamp": timestamp, "name": name });
                self.call(ctx, token, "reactions.add", body).await
            }
            other => Err(NodeError::Configuration(format!("Unsupported Slack operation: {other}"))),
        }
    }
}

#[async_trait]
impl Node for SlackNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ActionSlack
    }

    async fn compute(&self, ctx: NodeContext, data: NodeData) -> Result<NodeData, NodeError> {
        let config: SlackConfig = data.parse_config().unwrap_or_default();
        let Some(token) = ctx.credential("Slack") else {
            return Ok(data.failure(NodeError::MissingCredential("Slack".into()).to_string()));
        };

        match self.run(&ctx, &token, &config).await {
            Ok(output) => Ok(data.succeed(output.to_string())),
            Err(NodeError::Cancelled) => Err(NodeError::Cancelled),
            Err(e) => Ok(data.failure(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(value: Value) -> SlackConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn single_post_defaults_to_general() {
        assert_eq!(
            config(json!({"message": "hi"})).posts(),
            vec![("#general".to_string(), "hi".to_string())]
        );
    }

    #[test]
    fn items_fan_out() {
        let posts = config(json!({
            "channel": "#ignored",
            "items": [{"channel": "#ops", "message": "a"}, {"channel": " ", "message": "b"}]
        }))
        .posts();
        assert_eq!(
            posts,
            vec![
                ("#ops".to_string(), "a".to_string()),
                ("#general".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(config(json!({})).limit(10.0), 10);
        assert_eq!(config(json!({"limit": 500})).limit(10.0), 100);
        assert_eq!(config(json!({"limit": 0})).limit(100.0), 1);
    }
}
