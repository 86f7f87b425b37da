use async_trait::async_trait;
use graphcore::generator::{build_graph, GeneratedStep};
use graphcore::{
    ComputeInput, Edge, ExecutionEvent, ImportError, MemoryCredentials, Node, NodeContext, NodeData,
    NodeError, NodeKind, NodeSpec, WorkflowError,
};
use graphruntime::{FlowRuntime, NodeRegistry, RuntimeConfig};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type CallLog = Arc<Mutex<Vec<(String, Vec<String>)>>>;

/// Stand-in strategy that records each call and behaves according to its kind
struct FakeNode {
    kind: NodeKind,
    calls: CallLog,
}

#[async_trait]
impl Node for FakeNode {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    async fn compute(&self, ctx: NodeContext, mut data: NodeData) -> Result<NodeData, NodeError> {
        let inputs: Vec<String> = ctx.inputs.iter().map(|i| i.output.clone()).collect();
        self.calls
            .lock()
            .unwrap()
            .push((ctx.node_id.clone(), inputs.clone()));

        let value = data
            .get_str("value")
            .map(str::to_string)
            .unwrap_or_else(|| inputs.join("|"));
        data.dirty = false;

        match self.kind {
            NodeKind::ActionHttp => Ok(data.failure("boom")),
            NodeKind::ControlDelay => {
                let ms = data.get("ms").and_then(|v| v.as_u64()).unwrap_or(0);
                ctx.sleep(Duration::from_millis(ms)).await?;
                Ok(data.succeed(value))
            }
            NodeKind::ControlCondition => {
                let branch = data.get_str("answer").unwrap_or("true").to_string();
                data.set("branch", branch.clone());
                Ok(data.succeed(branch))
            }
            NodeKind::ControlApproval => {
                if data.get_bool("approved") == Some(true) {
                    data.set("pendingApproval", false);
                    Ok(data.succeed(ctx.last_input().unwrap_or("{}").to_string()))
                } else {
                    data.set("pendingApproval", true);
                    Ok(data.succeed("pending"))
                }
            }
            NodeKind::Ai if data.get_bool("stream") == Some(true) => {
                ctx.stream.push("partial");
                ctx.sleep(Duration::from_millis(50)).await?;
                Ok(data.succeed(value))
            }
            _ => Ok(data.succeed(value)),
        }
    }
}

struct Harness {
    runtime: Arc<FlowRuntime>,
    calls: CallLog,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    fn with_config(config: RuntimeConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        let mut registry = NodeRegistry::new();
        for kind in [
            NodeKind::TriggerManual,
            NodeKind::Prompt,
            NodeKind::Ai,
            NodeKind::Markdown,
            NodeKind::ActionHttp,
            NodeKind::ControlDelay,
            NodeKind::ControlCondition,
            NodeKind::ControlApproval,
        ] {
            registry.register(Arc::new(FakeNode {
                kind,
                calls: calls.clone(),
            }));
        }
        let runtime = FlowRuntime::with_registry(
            Arc::new(registry),
            Arc::new(MemoryCredentials::new()),
            config,
        );
        Self {
            runtime: Arc::new(runtime),
            calls,
        }
    }

    async fn load(&self, nodes: Vec<NodeSpec>, edges: Vec<Edge>) {
        let id = self.runtime.create_workflow(Some("test")).await;
        self.runtime
            .store()
            .write()
            .await
            .set_workflow_content(&id, nodes, edges)
            .unwrap();
    }

    fn count(&self, id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(n, _)| n == id).count()
    }

    fn inputs_of(&self, id: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(n, _)| n == id)
            .map(|(_, inputs)| inputs.clone())
            .unwrap_or_default()
    }

    async fn data(&self, id: &str) -> NodeData {
        self.runtime.store().read().await.node(id).unwrap().data.clone()
    }
}

fn fresh(kind: NodeKind, id: &str, output: &str) -> NodeSpec {
    NodeSpec::new(kind).with_id(id).with_output(output)
}

fn stale(kind: NodeKind, id: &str) -> NodeSpec {
    NodeSpec::new(kind).with_id(id).dirty()
}

#[tokio::test]
async fn fresh_parents_are_not_recomputed() {
    let h = Harness::new();
    h.load(
        vec![
            fresh(NodeKind::Prompt, "p", "hello"),
            stale(NodeKind::Ai, "a"),
            stale(NodeKind::Markdown, "m"),
        ],
        vec![Edge::new("p", "a"), Edge::new("a", "m")],
    )
    .await;

    let summary = h.runtime.run_node("m", false).await;

    assert_eq!(summary.computed, vec!["a".to_string(), "m".to_string()]);
    assert_eq!(h.count("p"), 0);
    assert_eq!(h.inputs_of("a"), vec!["hello"]);
    assert_eq!(h.data("m").await.output.as_deref(), Some("hello"));
}

#[tokio::test]
async fn first_run_marks_descendants_dirty() {
    let h = Harness::new();
    h.load(
        vec![
            fresh(NodeKind::ActionHttp, "h", "old"),
            fresh(NodeKind::Ai, "a", "x"),
            fresh(NodeKind::Markdown, "m", "y"),
        ],
        vec![Edge::new("h", "a"), Edge::new("a", "m")],
    )
    .await;

    h.runtime.run_node("h", true).await;

    let failed = h.data("h").await;
    assert_eq!(failed.error.as_deref(), Some("boom"));
    assert!(!failed.loading);
    assert!(h.data("a").await.dirty);
    assert!(h.data("m").await.dirty);
    assert_eq!(h.count("a"), 0);
}

#[tokio::test]
async fn edited_node_cascades_to_every_descendant() {
    let h = Harness::new();
    h.load(
        vec![
            fresh(NodeKind::Prompt, "p", "old").with_data("value", "old"),
            fresh(NodeKind::Ai, "a", "old"),
            fresh(NodeKind::Markdown, "m", "old"),
        ],
        vec![Edge::new("p", "a"), Edge::new("a", "m")],
    )
    .await;

    let mut patch = serde_json::Map::new();
    patch.insert("value".into(), json!("new"));
    h.runtime.edit_node_config("p", patch).await.unwrap();
    assert!(h.data("p").await.dirty);

    let summary = h.runtime.run_node("p", true).await;

    assert_eq!(summary.computed.len(), 3);
    for id in ["p", "a", "m"] {
        let data = h.data(id).await;
        assert_eq!(data.output.as_deref(), Some("new"), "node {id}");
        assert!(!data.dirty);
    }
}

#[tokio::test]
async fn condition_feeds_only_the_live_branch() {
    let h = Harness::new();
    let mut events = h.runtime.subscribe_events();
    h.load(
        vec![
            fresh(NodeKind::Prompt, "t", "5"),
            stale(NodeKind::ControlCondition, "c").with_data("answer", "true"),
            stale(NodeKind::Markdown, "yes"),
            fresh(NodeKind::Markdown, "no", "untouched"),
        ],
        vec![
            Edge::new("t", "c"),
            Edge::new("c", "yes").with_handle("true"),
            Edge::new("c", "no").with_handle("false"),
        ],
    )
    .await;

    h.runtime.run_node("c", true).await;

    assert_eq!(h.count("yes"), 1);
    assert_eq!(h.count("no"), 0);
    assert_eq!(h.data("yes").await.output.as_deref(), Some("true"));
    assert_eq!(h.data("no").await.output.as_deref(), Some("untouched"));

    let mut skipped = false;
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::NodeSkipped { node_id, reason, .. } = event {
            skipped |= node_id == "no" && reason == "no live inputs";
        }
    }
    assert!(skipped);
}

#[tokio::test]
async fn stale_condition_is_refreshed_before_branching() {
    let h = Harness::new();
    h.load(
        vec![
            fresh(NodeKind::Prompt, "t", "5"),
            fresh(NodeKind::ControlCondition, "c", "true")
                .with_data("branch", "true")
                .with_data("answer", "false")
                .dirty(),
            stale(NodeKind::Markdown, "no"),
        ],
        vec![Edge::new("t", "c"), Edge::new("c", "no").with_handle("false")],
    )
    .await;

    h.runtime.run_node("no", false).await;

    assert_eq!(h.count("c"), 1);
    assert_eq!(h.count("no"), 1);
    assert_eq!(h.data("c").await.get_str("branch"), Some("false"));
}

#[tokio::test]
async fn condition_edge_without_handle_is_always_live() {
    let h = Harness::new();
    h.load(
        vec![
            fresh(NodeKind::Prompt, "t", "5"),
            stale(NodeKind::ControlCondition, "c").with_data("answer", "true"),
            stale(NodeKind::Markdown, "m"),
        ],
        vec![Edge::new("t", "c"), Edge::new("c", "m")],
    )
    .await;

    h.runtime.run_node("c", true).await;

    assert_eq!(h.count("m"), 1);
    assert_eq!(h.data("m").await.output.as_deref(), Some("true"));
}

#[tokio::test]
async fn generated_chain_runs_through_its_condition() {
    let h = Harness::new();
    let steps = vec![
        GeneratedStep::new("1", "Check the amount").with_service("condition"),
        GeneratedStep::new("2", "Hold briefly").with_service("delay"),
    ];
    let (nodes, edges) = build_graph(&steps, "Generated");
    let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    h.load(nodes, edges).await;

    let summary = h.runtime.run_node(&ids[0], true).await;

    assert_eq!(summary.computed, ids[..3].to_vec());
    assert_eq!(h.data(&ids[1]).await.get_str("branch"), Some("true"));
    assert!(!h.data(&ids[2]).await.dirty);
}

#[tokio::test]
async fn inputs_follow_horizontal_position() {
    let h = Harness::new();
    h.load(
        vec![
            stale(NodeKind::ControlDelay, "left")
                .with_data("value", "L")
                .with_data("ms", 60)
                .with_position(0.0, 0.0),
            stale(NodeKind::Prompt, "right")
                .with_data("value", "R")
                .with_position(100.0, 0.0),
            stale(NodeKind::Ai, "child").with_position(50.0, 200.0),
        ],
        vec![Edge::new("right", "child"), Edge::new("left", "child")],
    )
    .await;

    h.runtime.run_node("child", false).await;

    assert_eq!(h.count("child"), 1);
    assert_eq!(h.inputs_of("child"), vec!["L", "R"]);
}

#[tokio::test]
async fn diamond_evaluates_join_once() {
    let h = Harness::new();
    h.load(
        vec![
            fresh(NodeKind::Prompt, "s", "s").with_data("value", "s"),
            fresh(NodeKind::Ai, "l", "old").with_position(0.0, 100.0),
            fresh(NodeKind::ControlDelay, "r", "old")
                .with_data("ms", 30)
                .with_position(200.0, 100.0),
            fresh(NodeKind::Markdown, "j", "old"),
        ],
        vec![
            Edge::new("s", "l"),
            Edge::new("s", "r"),
            Edge::new("l", "j"),
            Edge::new("r", "j"),
        ],
    )
    .await;

    let summary = h.runtime.run_node("s", true).await;

    assert_eq!(h.count("j"), 1);
    assert_eq!(h.inputs_of("j"), vec!["s", "s"]);
    assert_eq!(summary.computed.len(), 4);
    assert_eq!(summary.computed.last().map(String::as_str), Some("j"));
}

#[tokio::test]
async fn cycles_are_reported_not_followed() {
    let h = Harness::new();
    h.load(
        vec![stale(NodeKind::Ai, "a"), stale(NodeKind::Ai, "b")],
        vec![Edge::new("a", "b"), Edge::new("b", "a")],
    )
    .await;

    let summary = h.runtime.run_node("a", true).await;

    assert!(summary.computed.is_empty());
    assert_eq!(h.data("b").await.error.as_deref(), Some("Cyclic dependency detected"));
    assert!(!h.data("a").await.loading);
}

#[tokio::test]
async fn self_loop_is_a_cycle() {
    let h = Harness::new();
    h.load(vec![stale(NodeKind::Ai, "a")], vec![Edge::new("a", "a")]).await;

    h.runtime.run_node("a", false).await;

    assert_eq!(h.data("a").await.error.as_deref(), Some("Cyclic dependency detected"));
    assert_eq!(h.count("a"), 0);
}

#[tokio::test]
async fn stop_all_unwinds_without_cascading() {
    let h = Harness::new();
    h.load(
        vec![
            fresh(NodeKind::Prompt, "p", "in"),
            fresh(NodeKind::ControlDelay, "d", "previous").with_data("ms", 5_000),
            stale(NodeKind::Markdown, "m"),
        ],
        vec![Edge::new("p", "d"), Edge::new("d", "m")],
    )
    .await;

    let runtime = h.runtime.clone();
    let run = tokio::spawn(async move { runtime.run_node("d", false).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.data("d").await.loading);

    h.runtime.stop_all().await;
    let summary = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("run should unwind promptly")
        .unwrap();

    assert!(summary.cancelled);
    let store = h.runtime.store().read().await;
    assert!(store.nodes().iter().all(|n| !n.data.loading));
    assert!(store.edges().iter().all(|e| !e.animated));
    let d = &store.node("d").unwrap().data;
    assert_eq!(d.output.as_deref(), Some("previous"));
    assert!(d.error.is_none());
    drop(store);
    assert_eq!(h.count("m"), 0);
}

#[tokio::test]
async fn reentrant_run_is_ignored() {
    let h = Harness::new();
    h.load(
        vec![stale(NodeKind::ControlDelay, "d").with_data("ms", 100)],
        Vec::new(),
    )
    .await;

    let runtime = h.runtime.clone();
    let first = tokio::spawn(async move { runtime.run_node("d", false).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = h.runtime.run_node("d", false).await;

    assert!(second.computed.is_empty());
    assert_eq!(first.await.unwrap().computed, vec!["d".to_string()]);
    assert_eq!(h.count("d"), 1);
}

#[tokio::test]
async fn slow_node_times_out_into_an_error() {
    let h = Harness::with_config(RuntimeConfig {
        execution_timeout: Duration::from_millis(100),
        ..RuntimeConfig::default()
    });
    h.load(
        vec![
            fresh(NodeKind::ControlDelay, "d", "kept").with_data("ms", 5_000),
            stale(NodeKind::Markdown, "m"),
        ],
        vec![Edge::new("d", "m")],
    )
    .await;

    h.runtime.run_node("d", false).await;

    let d = h.data("d").await;
    assert!(d.error.unwrap_or_default().starts_with("Node execution timed out"));
    assert_eq!(d.output.as_deref(), Some("kept"));
    assert!(!d.loading);
    assert_eq!(h.count("m"), 0);
}

#[tokio::test]
async fn approval_gate_holds_until_approved() {
    let h = Harness::new();
    h.load(
        vec![
            fresh(NodeKind::Prompt, "p", "payload"),
            stale(NodeKind::ControlApproval, "g"),
            stale(NodeKind::Markdown, "m"),
        ],
        vec![Edge::new("p", "g"), Edge::new("g", "m")],
    )
    .await;

    h.runtime.run_node("g", false).await;
    assert_eq!(h.data("g").await.get_bool("pendingApproval"), Some(true));
    assert_eq!(h.count("m"), 0);

    h.runtime.approve("g", "reviewer").await.unwrap();

    let gate = h.data("g").await;
    assert_eq!(gate.get_str("approvedBy"), Some("reviewer"));
    assert_eq!(gate.output.as_deref(), Some("payload"));
    assert_eq!(h.data("m").await.output.as_deref(), Some("payload"));
}

#[tokio::test]
async fn child_below_a_pending_gate_waits() {
    let h = Harness::new();
    h.load(
        vec![
            fresh(NodeKind::Prompt, "p", "payload"),
            stale(NodeKind::ControlApproval, "g"),
            stale(NodeKind::Markdown, "m"),
        ],
        vec![Edge::new("p", "g"), Edge::new("g", "m")],
    )
    .await;

    h.runtime.run_node("g", false).await;
    let gate = h.data("g").await;
    assert_eq!(gate.output.as_deref(), Some("pending"));
    assert!(gate.dirty);

    let summary = h.runtime.run_node("m", false).await;

    assert_eq!(summary.computed, vec!["g".to_string()]);
    assert_eq!(h.count("m"), 0);
    assert!(h.data("m").await.output.is_none());

    h.runtime.approve("g", "reviewer").await.unwrap();
    assert!(!h.data("g").await.dirty);
    assert_eq!(h.inputs_of("m"), vec!["payload"]);
}

#[tokio::test]
async fn failure_halts_only_its_own_branch() {
    let h = Harness::new();
    h.load(
        vec![
            fresh(NodeKind::Prompt, "s", "go").with_data("value", "go"),
            stale(NodeKind::ActionHttp, "bad"),
            stale(NodeKind::Markdown, "after-bad"),
            stale(NodeKind::Markdown, "sibling"),
        ],
        vec![
            Edge::new("s", "bad"),
            Edge::new("bad", "after-bad"),
            Edge::new("s", "sibling"),
        ],
    )
    .await;

    h.runtime.run_node("s", true).await;

    assert_eq!(h.data("bad").await.error.as_deref(), Some("boom"));
    assert_eq!(h.count("after-bad"), 0);
    assert_eq!(h.data("sibling").await.output.as_deref(), Some("go"));
}

#[tokio::test]
async fn streamed_text_reaches_display_children() {
    let h = Harness::new();
    h.load(
        vec![
            fresh(NodeKind::Prompt, "p", "question"),
            stale(NodeKind::Ai, "a").with_data("stream", true),
            stale(NodeKind::Markdown, "m").with_data("text", ""),
        ],
        vec![Edge::new("p", "a"), Edge::new("a", "m")],
    )
    .await;

    h.runtime.run_node("a", false).await;

    let m = h.data("m").await;
    assert_eq!(m.get_str("text"), Some("partial"));
    assert_eq!(m.output.as_deref(), Some("question"));
}

#[tokio::test]
async fn unknown_node_type_is_a_no_op() {
    let h = Harness::new();
    let mut odd = NodeSpec::new(NodeKind::Prompt).with_id("odd");
    odd.node_type = Some("teleport".into());
    h.load(vec![odd], Vec::new()).await;

    let summary = h.runtime.run_node("odd", false).await;

    assert!(summary.computed.is_empty());
    assert!(h.data("odd").await.error.is_none());
}

#[tokio::test]
async fn switching_workflow_cancels_the_previous_one() {
    let h = Harness::new();
    h.load(
        vec![fresh(NodeKind::ControlDelay, "d", "before").with_data("ms", 5_000)],
        Vec::new(),
    )
    .await;
    let first = h.runtime.store().read().await.current_id().unwrap().to_string();
    let second = h.runtime.store().write().await.create_workflow(Some("other"));

    h.runtime.switch_workflow(&first).await.unwrap();
    let runtime = h.runtime.clone();
    let run = tokio::spawn(async move { runtime.run_node("d", false).await });
    tokio::time::sleep(Duration::from_millis(30)).await;

    h.runtime.switch_workflow(&second).await.unwrap();
    let summary = run.await.unwrap();

    assert!(summary.cancelled);
    let store = h.runtime.store().read().await;
    let d = store.workflow(&first).unwrap().find_node("d").unwrap();
    assert!(!d.data.loading);
    assert_eq!(d.data.output.as_deref(), Some("before"));
}

#[tokio::test]
async fn labelled_inputs_are_passed_through() {
    let calls: Arc<Mutex<HashMap<String, Vec<ComputeInput>>>> = Arc::default();

    struct Capture(Arc<Mutex<HashMap<String, Vec<ComputeInput>>>>);

    #[async_trait]
    impl Node for Capture {
        fn kind(&self) -> NodeKind {
            NodeKind::Ai
        }

        async fn compute(&self, ctx: NodeContext, data: NodeData) -> Result<NodeData, NodeError> {
            self.0.lock().unwrap().insert(ctx.node_id.clone(), ctx.inputs.clone());
            Ok(data.succeed("done"))
        }
    }

    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(Capture(calls.clone())));
    let runtime = FlowRuntime::with_registry(
        Arc::new(registry),
        Arc::new(MemoryCredentials::new()),
        RuntimeConfig::default(),
    );
    let id = runtime.create_workflow(None).await;
    runtime
        .store()
        .write()
        .await
        .set_workflow_content(
            &id,
            vec![
                fresh(NodeKind::Prompt, "a", "first").with_label("Topic A"),
                fresh(NodeKind::Prompt, "b", "second").with_position(10.0, 0.0),
                stale(NodeKind::Ai, "gen"),
            ],
            vec![Edge::new("a", "gen"), Edge::new("b", "gen")],
        )
        .unwrap();

    runtime.run_node("gen", false).await;

    let inputs = calls.lock().unwrap().get("gen").cloned().unwrap();
    assert_eq!(
        inputs,
        vec![
            ComputeInput::labelled("first", "Topic A"),
            ComputeInput::new("second"),
        ]
    );
}

#[tokio::test]
async fn duplicate_node_ids_never_reach_the_store() {
    let h = Harness::new();
    let id = h.runtime.create_workflow(Some("twins")).await;

    let err = h
        .runtime
        .store()
        .write()
        .await
        .set_workflow_content(
            &id,
            vec![stale(NodeKind::Prompt, "x"), stale(NodeKind::Markdown, "x")],
            vec![Edge::new("x", "x")],
        )
        .unwrap_err();
    assert_eq!(err, WorkflowError::DuplicateNode("x".to_string()));

    let json = r#"{"name": "twins", "edges": [], "nodes": [
        {"id": "x", "type": "prompt", "position": {"x": 0, "y": 0}},
        {"id": "x", "type": "markdown", "position": {"x": 0, "y": 0}}
    ]}"#;
    let err = h.runtime.import_json(json).await.unwrap_err();
    assert!(matches!(err, ImportError::Validation { .. }));
    assert!(err.to_string().contains("nodes.1.id: Duplicate node id x"));

    let store = h.runtime.store().read().await;
    assert_eq!(store.current_id(), Some(id.as_str()));
    assert_eq!(store.nodes().len(), 3);
}

#[tokio::test]
async fn deleting_the_current_workflow_resets_the_fallback() {
    let h = Harness::new();
    let first = h.runtime.create_workflow(Some("first")).await;
    {
        let mut store = h.runtime.store().write().await;
        let node = store.nodes()[0].id.clone();
        let mut patch = serde_json::Map::new();
        patch.insert("loading".into(), json!(true));
        store.update_node_data(&node, patch).unwrap();
    }
    let second = h.runtime.create_workflow(Some("second")).await;

    h.runtime.delete_workflow(&second).await.unwrap();

    let store = h.runtime.store().read().await;
    assert_eq!(store.current_id(), Some(first.as_str()));
    assert!(store.nodes().iter().all(|n| !n.data.loading));
}

#[tokio::test]
async fn cancelling_a_node_removed_mid_run_is_quiet() {
    let h = Harness::new();
    h.load(
        vec![stale(NodeKind::ControlDelay, "d").with_data("ms", 5_000)],
        Vec::new(),
    )
    .await;

    let runtime = h.runtime.clone();
    let run = tokio::spawn(async move { runtime.run_node("d", false).await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    h.runtime.store().write().await.remove_node("d").unwrap();

    h.runtime.stop_all().await;
    let summary = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("run should unwind promptly")
        .unwrap();

    assert!(summary.cancelled);
    assert!(h.runtime.store().read().await.node("d").is_none());
}
