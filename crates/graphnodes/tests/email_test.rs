use graphcore::{ComputeInput, EventEmitter, MemoryCredentials, Node, NodeContext, NodeData};
use graphnodes::{EmailNode, ServiceEndpoints};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn context(credentials: MemoryCredentials) -> NodeContext {
    NodeContext::new("email", EventEmitter::detached("email"), Arc::new(credentials))
}

fn output(data: &NodeData) -> Value {
    serde_json::from_str(data.output.as_deref().unwrap()).unwrap()
}

#[tokio::test]
async fn missing_credential_names_the_service() {
    let node = EmailNode::new(ServiceEndpoints::all("http://127.0.0.1:9"));
    let data = NodeData::new().with_field("to", "a@example.com");
    let out = node.compute(context(MemoryCredentials::new()), data).await.unwrap();
    assert_eq!(out.error.as_deref(), Some("Connect SendGrid in Connections."));
    assert_eq!(out.output, None);
}

#[tokio::test]
async fn sendgrid_fans_out_over_list_rows() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .and(header("authorization", "Bearer sg-key"))
        .respond_with(ResponseTemplate::new(202))
        .expect(2)
        .mount(&server)
        .await;

    let node = EmailNode::new(ServiceEndpoints::all(server.uri()));
    let ctx = context(MemoryCredentials::new().with("SendGrid", "sg-key")).with_inputs(vec![
        ComputeInput::new(json!({"rows": [{"email": "a@example.com"}, {"email": "b@example.com"}]}).to_string()),
    ]);
    let data = NodeData::new()
        .with_field("toSource", "list")
        .with_field("subject", "Hello");

    let out = node.compute(ctx, data).await.unwrap();
    assert_eq!(out.error, None);
    assert_eq!(
        output(&out),
        json!({"sent": true, "count": 2, "to": ["a@example.com", "b@example.com"]})
    );
}

#[tokio::test]
async fn no_recipient_is_an_error() {
    let node = EmailNode::new(ServiceEndpoints::all("http://127.0.0.1:9"));
    let ctx = context(MemoryCredentials::new().with("SendGrid", "sg-key"));
    let out = node.compute(ctx, NodeData::new()).await.unwrap();
    assert_eq!(out.error.as_deref(), Some("No recipient (To or list column)."));
}

#[tokio::test]
async fn gmail_send_posts_a_raw_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gmail/v1/users/me/messages/send"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"id\":\"m1\"}"))
        .expect(1)
        .mount(&server)
        .await;

    let node = EmailNode::new(ServiceEndpoints::all(server.uri()));
    let data = NodeData::new()
        .with_field("service", "Gmail")
        .with_field("to", "a@example.com");
    let out = node
        .compute(context(MemoryCredentials::new().with("Gmail", "g-token")), data)
        .await
        .unwrap();
    assert_eq!(out.error, None);

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body["raw"].as_str().is_some_and(|raw| !raw.is_empty()));
}

#[tokio::test]
async fn gmail_list_passes_query_and_clamped_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages"))
        .and(query_param("maxResults", "100"))
        .and(query_param("q", "from:boss is:unread"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messages": []})))
        .expect(1)
        .mount(&server)
        .await;

    let node = EmailNode::new(ServiceEndpoints::all(server.uri()));
    let data = NodeData::new()
        .with_field("operation", "list")
        .with_field("query", "from:boss is:unread")
        .with_field("maxResults", 500);
    let out = node
        .compute(context(MemoryCredentials::new().with("Gmail", "g-token")), data)
        .await
        .unwrap();
    assert_eq!(output(&out), json!({"messages": []}));
}

#[tokio::test]
async fn gmail_get_requires_a_message_id() {
    let node = EmailNode::new(ServiceEndpoints::all("http://127.0.0.1:9"));
    let data = NodeData::new().with_field("operation", "get");
    let out = node
        .compute(context(MemoryCredentials::new().with("Gmail", "g-token")), data)
        .await
        .unwrap();
    assert_eq!(out.error.as_deref(), Some("Message ID is required."));
}
