use async_trait::async_trait;
use graphcore::{format_inputs, Node, NodeContext, NodeData, NodeError, NodeKind};

/// Free text; upstream inputs replace the typed prompt
pub struct PromptNode;

#[async_trait]
impl Node for PromptNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Prompt
    }

    async fn compute(&self, ctx: NodeContext, mut data: NodeData) -> Result<NodeData, NodeError> {
        ctx.check_cancelled()?;
        if !ctx.inputs.is_empty() {
            data.set("prompt", format_inputs(&ctx.inputs));
        }
        let prompt = data.get_str("prompt").unwrap_or_default().to_string();
        data.dirty = false;
        Ok(data.succeed(prompt))
    }
}

/// Display node: renders whatever reaches it
pub struct MarkdownNode;

#[async_trait]
impl Node for MarkdownNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Markdown
    }

    async fn compute(&self, ctx: NodeContext, mut data: NodeData) -> Result<NodeData, NodeError> {
        ctx.check_cancelled()?;
        let text = format_inputs(&ctx.inputs);
        data.set("text", text.clone());
        data.dirty = false;
        Ok(data.succeed(text))
    }
}

/// Canvas note; never produces anything
pub struct AnnotationNode;

#[async_trait]
impl Node for AnnotationNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Annotation
    }

    async fn compute(&self, _ctx: NodeContext, mut data: NodeData) -> Result<NodeData, NodeError> {
        data.dirty = false;
        data.error = None;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;
    use graphcore::ComputeInput;

    #[tokio::test]
    async fn prompt_without_inputs_outputs_its_text() {
        let data = NodeData::new().with_field("prompt", "Summarize this");
        let out = PromptNode.compute(context(), data).await.unwrap();
        assert_eq!(out.output.as_deref(), Some("Summarize this"));
        assert!(!out.dirty);
    }

    #[tokio::test]
    async fn labelled_inputs_become_tagged_blocks() {
        let ctx = context().with_inputs(vec![
            ComputeInput::labelled("  first  ", "a"),
            ComputeInput::labelled("second", "b"),
        ]);
        let out = PromptNode.compute(ctx, NodeData::new()).await.unwrap();
        assert_eq!(out.output.as_deref(), Some("<a>\nfirst\n</a>\n\n<b>\nsecond\n</b>"));
        assert_eq!(out.get_str("prompt"), out.output.as_deref());
    }

    #[tokio::test]
    async fn markdown_renders_inputs_verbatim() {
        let ctx = context().with_inputs(vec![ComputeInput::new("{\"pong\":true}")]);
        let mut data = NodeData::new();
        data.dirty = true;
        let out = MarkdownNode.compute(ctx, data).await.unwrap();
        assert_eq!(out.get_str("text"), Some("{\"pong\":true}"));
        assert_eq!(out.output.as_deref(), Some("{\"pong\":true}"));
        assert!(!out.dirty);
    }
}
