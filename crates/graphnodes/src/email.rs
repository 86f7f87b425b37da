use crate::endpoints::ServiceEndpoints;
use crate::http::send;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use graphcore::{ComputeInput, Node, NodeContext, NodeData, NodeError, NodeKind};
use serde::Deserialize;
use serde_json::{json, Value};

const SENDER: &str = "noreply@workflow.local";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmailService {
    SendGrid,
    Gmail,
}

impl EmailService {
    fn parse(name: Option<&str>) -> Self {
        match name {
            Some("Gmail") => EmailService::Gmail,
            _ => EmailService::SendGrid,
        }
    }

    /// Credential key and display name
    fn name(&self) -> &'static str {
        match self {
            EmailService::SendGrid => "SendGrid",
            EmailService::Gmail => "Gmail",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct EmailConfig {
    service: Option<String>,
    operation: Option<String>,
    to: Option<String>,
    subject: Option<String>,
    body: Option<String>,
    to_source: Option<String>,
    to_list_field: Option<String>,
    query: Option<String>,
    max_results: Option<f64>,
    message_id: Option<String>,
    items: Option<Vec<EmailItem>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmailItem {
    to: Option<String>,
    subject: Option<String>,
    body: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct Outgoing {
    to: String,
    subject: String,
    body: String,
}

impl EmailConfig {
    /// Declared items first, then list rows, then the single recipient
    fn outgoing(&self, inputs: &[ComputeInput]) -> Vec<Outgoing> {
        let items = self.items.as_deref().unwrap_or_default();
        if !items.is_empty() {
            return items
                .iter()
                .map(|item| Outgoing {
                    to: item.to.clone().unwrap_or_default().trim().to_string(),
                    subject: item.subject.clone().unwrap_or_default(),
                    body: item.body.clone().unwrap_or_default(),
                })
                .filter(|o| !o.to.is_empty())
                .collect();
        }

        let recipients: Vec<String> = if self.to_source.as_deref() == Some("list") {
            let field = self.to_list_field.as_deref().unwrap_or("email");
            rows(inputs)
                .iter()
                .filter_map(|row| {
                    [field, "email", "value"]
                        .iter()
                        .find_map(|key| row.get(*key).filter(|v| !v.is_null()))
                        .map(|v| match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                })
                .filter(|to| !to.is_empty())
                .collect()
        } else {
            self.to.iter().filter(|to| !to.is_empty()).cloned().collect()
        };

        recipients
            .into_iter()
            .map(|to| Outgoing {
                to,
                subject: self.subject.clone().unwrap_or_default(),
                body: self.body.clone().unwrap_or_default(),
            })
            .collect()
    }
}

/// `rows` of the first input, when it is a JSON object carrying them
fn rows(inputs: &[ComputeInput]) -> Vec<Value> {
    inputs
        .first()
        .and_then(|input| serde_json::from_str::<Value>(&input.output).ok())
        .and_then(|value| value.get("rows").and_then(Value::as_array).cloned())
        .unwrap_or_default()
}

/// Plain-text message in RFC 2822 form
fn rfc2822(to: &str, subject: &str, body: &str) -> String {
    let subject = subject.replace("\r\n", " ").replace('\n', " ");
    [
        "Content-Type: text/plain; charset=UTF-8".to_string(),
        "From: me".to_string(),
        format!("To: {to}"),
        format!("Subject: {subject}"),
        String::new(),
        body.to_string(),
    ]
    .join("\r\n")
}

/// Email through SendGrid or Gmail
pub struct EmailNode {
    client: reqwest::Client,
    endpoints: ServiceEndpoints,
}

impl EmailNode {
    pub fn new(endpoints: ServiceEndpoints) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
        }
    }

    async fn send_one(
        &self,
        ctx: &NodeContext,
        service: EmailService,
        token: &str,
        mail: &Outgoing,
    ) -> Result<(), NodeError> {
        let request = match service {
            EmailService::SendGrid => self
                .client
                .post(format!("{}/v3/mail/send", self.endpoints.sendgrid))
                .bearer_auth(token)
                .json(&json!({
                    "personalizations": [{ "to": [{ "email": mail.to }] }],
                    "from": { "email": SENDER, "name": "Workflow" },
                    "subject": mail.subject,
                    "content": [{ "type": "text/plain", "value": mail.body }],
                })),
            EmailService::Gmail => {
                let raw = URL_SAFE_NO_PAD.encode(rfc2822(&mail.to, &mail.subject, &mail.body));
                self.client
                    .post(format!("{}/gmail/v1/users/me/messages/send", self.endpoints.gmail))
                    .bearer_auth(token)
                    .json(&json!({ "raw": raw }))
            }
        };

        let (status, text) = send(ctx, request).await?;
        if !status.is_success() {
            return Err(NodeError::ExecutionFailed(format!(
                "{} {}: {}",
                service.name(),
                status.as_u16(),
                text
            )));
        }
        Ok(())
    }

    async fn read_mailbox(
        &self,
        ctx: &NodeContext,
        config: &EmailConfig,
        token: &str,
        operation: &str,
    ) -> Result<String, NodeError> {
        let base = format!("{}/gmail/v1/users/me/messages", self.endpoints.gmail);
        let url = if operation == "list" {
            let max = config
                .max_results
                .map(|n| n.round().clamp(1.0, 100.0) as u32)
                .unwrap_or(50);
            match config.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
                Some(query) => format!("{base}?maxResults={max}&q={}", urlencoding::encode(query)),
                None => format!("{base}?maxResults={max}"),
            }
        } else {
            let id = config
                .message_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| NodeError::Configuration("Message ID is required.".into()))?;
            format!("{base}/{}", urlencoding::encode(id))
        };

        let (status, text) = send(ctx, self.client.get(url).bearer_auth(token)).await?;
        if !status.is_success() {
            return Err(NodeError::ExecutionFailed(format!("Gmail {}: {}", status.as_u16(), text)));
        }
        let json: Value = serde_json::from_str(&text)
            .map_err(|e| NodeError::ExecutionFailed(format!("Gmail returned invalid JSON: {e}")))?;
        Ok(json.to_string())
    }
}

#[async_trait]
impl Node for EmailNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ActionEmail
    }

    async fn compute(&self, ctx: NodeContext, data: NodeData) -> Result<NodeData, NodeError> {
        let config: EmailConfig = data.parse_config().unwrap_or_default();
        let operation = config.operation.as_deref().unwrap_or("send");

        if operation == "list" || operation == "get" {
            let Some(token) = ctx.credential(EmailService::Gmail.name()) else {
                return Ok(data.failure(NodeError::MissingCredential("Gmail".into()).to_string()));
            };
            return match self.read_mailbox(&ctx, &config, &token, operation).await {
                Ok(output) => Ok(data.succeed(output)),
                Err(NodeError::Cancelled) => Err(NodeError::Cancelled),
                Err(e) => Ok(data.failure(e.to_string())),
            };
        }

        let service = EmailService::parse(config.service.as_deref());
        let Some(token) = ctx.credential(service.name()) else {
            return Ok(data.failure(NodeError::MissingCredential(service.name().into()).to_string()));
        };

        let outgoing = config.outgoing(&ctx.inputs);
        if outgoing.is_empty() {
            return Ok(data.failure("No recipient (To or list column)."));
        }

        for mail in &outgoing {
            ctx.check_cancelled()?;
            match self.send_one(&ctx, service, &token, mail).await {
                Ok(()) => ctx.events.info(format!("Sent email to {}", mail.to)),
                Err(NodeError::Cancelled) => return Err(NodeError::Cancelled),
                Err(e) => return Ok(data.failure(e.to_string())),
            }
        }

        let to: Vec<&str> = outgoing.iter().map(|o| o.to.as_str()).collect();
        let output = json!({ "sent": true, "count": outgoing.len(), "to": to });
        Ok(data.succeed(output.to_string()))
    }
}
