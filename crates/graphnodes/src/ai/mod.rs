//! Text generation across the supported model providers.

mod providers;
mod streaming;

pub use providers::Provider;

use providers::Wire;
use streaming::{SseParser, Transcript};

use crate::endpoints::ServiceEndpoints;
use async_trait::async_trait;
use futures::StreamExt;
use graphcore::{format_inputs, Node, NodeContext, NodeData, NodeError, NodeKind};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 8192;
const THINKING_BUDGET: u32 = 8192;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GenerationConfig {
    model_id: Option<String>,
    system_prompt: Option<String>,
    reasoning: bool,
}

/// Streams a completion for the formatted inputs
pub struct GenerationNode {
    client: reqwest::Client,
    endpoints: ServiceEndpoints,
}

impl GenerationNode {
    pub fn new(endpoints: ServiceEndpoints) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
        }
    }

    fn request(
        &self,
        provider: Provider,
        key: &str,
        model: &str,
        config: &GenerationConfig,
        prompt: String,
    ) -> reqwest::RequestBuilder {
        let base = provider.base_url(&self.endpoints);
        let system = config
            .system_prompt
            .as_deref()
            .filter(|s| !s.trim().is_empty());

        match provider.wire() {
            Wire::ChatCompletions => {
                let mut messages = Vec::new();
                if let Some(system) = system {
                    messages.push(json!({ "role": "system", "content": system }));
                }
                messages.push(json!({ "role": "user", "content": prompt }));

                let mut body = json!({
                    "model": model,
                    "stream": true,
                    "messages": messages,
                });
                if config.reasoning {
                    body["reasoning_effort"] = json!("medium");
                }
                self.client
                    .post(format!("{base}/chat/completions"))
                    .bearer_auth(key)
                    .json(&body)
            }
            Wire::Messages => {
                let mut body = json!({
                    "model": model,
                    "max_tokens": MAX_TOKENS,
                    "stream": true,
                    "messages": [{ "role": "user", "content": prompt }],
                });
                if let Some(system) = system {
                    body["system"] = json!(system);
                }
                if config.reasoning {
                    body["max_tokens"] = json!(MAX_TOKENS + THINKING_BUDGET);
                    body["thinking"] = json!({ "type": "enabled", "budget_tokens": THINKING_BUDGET });
                }
                self.client
                    .post(format!("{base}/messages"))
                    .header("x-api-key", key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body)
            }
        }
    }

    /// Read the event stream to the end, publishing the display text after every delta
    async fn generate(
        &self,
        ctx: &NodeContext,
        wire: Wire,
        request: reqwest::RequestBuilder,
    ) -> Result<Transcript, NodeError> {
        let response = tokio::select! {
            _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
            response = request.send() => response.map_err(|e| NodeError::Transient(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let text = tokio::select! {
                _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
                text = response.text() => text.unwrap_or_default(),
            };
            return Err(NodeError::ExecutionFailed(format!(
                "{} {}",
                status.as_u16(),
                api_message(&text)
            )));
        }

        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();
        let mut transcript = Transcript::default();

        loop {
            let chunk = tokio::select! {
                _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(|e| NodeError::Transient(e.to_string()))?;

            for event in parser.feed(&chunk) {
                let deltas = match wire {
                    Wire::ChatCompletions => streaming::chat_deltas(&event)?,
                    Wire::Messages => streaming::message_deltas(&event)?,
                };
                if deltas.is_empty() {
                    continue;
                }
                for delta in deltas {
                    transcript.push(delta);
                }
                ctx.stream.push(transcript.display());
            }
        }

        debug!(
            node_id = %ctx.node_id,
            answer_len = transcript.answer.len(),
            reasoning_len = transcript.reasoning.len(),
            "generation finished"
        );
        Ok(transcript)
    }
}

/// Provider error message from a JSON body, or the body itself
fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[async_trait]
impl Node for GenerationNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Ai
    }

    async fn compute(&self, ctx: NodeContext, data: NodeData) -> Result<NodeData, NodeError> {
        let config: GenerationConfig = data.parse_config().unwrap_or_default();

        let Some(model) = config.model_id.clone().filter(|m| !m.is_empty()) else {
            return Ok(data.with_error("No model selected"));
        };
        let Some(provider) = Provider::for_model(&model) else {
            return Ok(data.with_error(format!("No provider found for model {model}")));
        };
        let Some(key) = ctx.credential(provider.name()) else {
            return Ok(data.with_error(format!("No API key found for model {model}")));
        };

        let prompt = format_inputs(&ctx.inputs);
        let request = self.request(provider, &key, &model, &config, prompt);

        match self.generate(&ctx, provider.wire(), request).await {
            Ok(transcript) => {
                let mut data = data.succeed(transcript.answer);
                data.dirty = false;
                Ok(data)
            }
            Err(NodeError::Cancelled) => Err(NodeError::Cancelled),
            Err(e) => Ok(data.with_error(format!("Error generating text: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;

    fn node() -> GenerationNode {
        GenerationNode::new(ServiceEndpoints::all("http://127.0.0.1:9"))
    }

    #[tokio::test]
    async fn model_is_required() {
        let data = node().compute(context(), NodeData::new()).await.unwrap();
        assert_eq!(data.error.as_deref(), Some("No model selected"));
    }

    #[tokio::test]
    async fn unknown_model_has_no_provider() {
        let data = NodeData::new().with_field("modelId", "llama-3");
        let data = node().compute(context(), data).await.unwrap();
        assert_eq!(data.error.as_deref(), Some("No provider found for model llama-3"));
    }

    #[tokio::test]
    async fn missing_key_fails_without_a_request() {
        let mut data = NodeData::new().with_field("modelId", "gpt-4o");
        data.output = Some("previous".into());
        let data = node().compute(context(), data).await.unwrap();
        assert_eq!(data.error.as_deref(), Some("No API key found for model gpt-4o"));
        assert_eq!(data.output.as_deref(), Some("previous"));
    }

    #[test]
    fn api_message_prefers_the_error_field() {
        assert_eq!(api_message(r#"{"error":{"message":"bad key"}}"#), "bad key");
        assert_eq!(api_message("plain"), "plain");
    }
}
