use async_trait::async_trait;
use graphcore::{Node, NodeContext, NodeData, NodeError, NodeKind};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// Fixed-delay retry schedule for outbound requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpRetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for HttpRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct HttpConfig {
    method: String,
    url: String,
    body: Option<Value>,
    headers: Option<Map<String, Value>>,
    body_type: String,
    catalog_param_values: Option<Map<String, Value>>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            url: String::new(),
            body: None,
            headers: None,
            body_type: "json".to_string(),
            catalog_param_values: None,
        }
    }
}

impl HttpConfig {
    /// Request body; GET never carries one
    fn body(&self, method: &Method) -> Option<String> {
        if *method == Method::GET {
            return None;
        }
        if let Some(params) = &self.catalog_param_values {
            return Some(Value::Object(params.clone()).to_string());
        }
        match self.body.as_ref().filter(|b| !b.is_null())? {
            Value::String(text) if self.body_type == "json" => Some(
                serde_json::from_str::<Value>(text)
                    .unwrap_or_else(|_| Value::String(text.clone()))
                    .to_string(),
            ),
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// HTTP request node
pub struct HttpRequestNode {
    client: reqwest::Client,
    retry: HttpRetryPolicy,
}

impl HttpRequestNode {
    pub fn new() -> Self {
        Self::with_retry(HttpRetryPolicy::default())
    }

    pub fn with_retry(retry: HttpRetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            retry,
        }
    }

    async fn attempt(
        &self,
        ctx: &NodeContext,
        method: &Method,
        config: &HttpConfig,
    ) -> Result<String, NodeError> {
        let mut request = self
            .client
            .request(method.clone(), config.url.trim())
            .header("Content-Type", "application/json");
        if let Some(headers) = &config.headers {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key, value);
                }
            }
        }
        if let Some(body) = config.body(method) {
            request = request.body(body);
        }

        let (status, text) = send(ctx, request).await?;
        if !status.is_success() {
            let snippet: String = text.chars().take(200).collect();
            return Err(NodeError::Transient(format!("HTTP {}: {}", status.as_u16(), snippet)));
        }
        Ok(text)
    }
}

/// Send a request and read its body, unwinding as soon as the run is cancelled
pub(crate) async fn send(
    ctx: &NodeContext,
    request: reqwest::RequestBuilder,
) -> Result<(StatusCode, String), NodeError> {
    let response = tokio::select! {
        _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
        response = request.send() => response.map_err(|e| NodeError::Transient(e.to_string()))?,
    };
    let status = response.status();
    let text = tokio::select! {
        _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
        text = response.text() => text.map_err(|e| NodeError::Transient(e.to_string()))?,
    };
    Ok((status, text))
}

impl Default for HttpRequestNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for HttpRequestNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ActionHttp
    }

    async fn compute(&self, ctx: NodeContext, data: NodeData) -> Result<NodeData, NodeError> {
        let config: HttpConfig = data.parse_config().unwrap_or_default();
        if config.url.trim().is_empty() {
            return Ok(data.failure("URL is required"));
        }
        let method = Method::from_bytes(config.method.to_uppercase().as_bytes())
            .map_err(|_| NodeError::Configuration(format!("Unsupported method: {}", config.method)))?;

        ctx.events.info(format!("{} {}", method, config.url));

        let mut last_error = None;
        for attempt in 0..=self.retry.max_retries {
            ctx.check_cancelled()?;
            match self.attempt(&ctx, &method, &config).await {
                Ok(text) => {
                    ctx.events.info(format!("Response received on attempt {}", attempt + 1));
                    return Ok(data.succeed(text));
                }
                Err(NodeError::Cancelled) => return Err(NodeError::Cancelled),
                Err(e) => {
                    tracing::debug!("HTTP attempt {} failed: {}", attempt + 1, e);
                    if attempt < self.retry.max_retries {
                        ctx.events.warn(format!("Attempt {} failed: {}", attempt + 1, e));
                        ctx.sleep(self.retry.delay).await?;
                    }
                    last_error = Some(e);
                }
            }
        }

        let error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Request failed".to_string());
        Ok(data.failure(error))
    }
}
