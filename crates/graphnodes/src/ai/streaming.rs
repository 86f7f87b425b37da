//! Server-sent events and the incremental text they carry.

use graphcore::NodeError;
use serde::Deserialize;

/// One parsed SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

/// Incremental SSE parser.
///
/// Bytes are buffered until a blank line closes an event, so a chunk may end
/// anywhere, including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and take every event they complete
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer
            .extend(chunk.iter().copied().filter(|b| *b != b'\r'));
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            let block = String::from_utf8_lossy(&block[..pos]);

            let mut event_type = None;
            let mut data_lines = Vec::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    event_type = Some(value.trim_start().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data_lines.push(value.strip_prefix(' ').unwrap_or(value).to_string());
                }
            }

            if !data_lines.is_empty() {
                events.push(SseEvent {
                    event_type,
                    data: data_lines.join("\n"),
                });
            }
        }

        events
    }
}

/// A piece of model output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    Reasoning(String),
    Text(String),
}

/// Accumulated output of one generation
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    pub reasoning: String,
    pub answer: String,
}

impl Transcript {
    pub fn push(&mut self, delta: Delta) {
        match delta {
            Delta::Reasoning(text) => self.reasoning.push_str(&text),
            Delta::Text(text) => self.answer.push_str(&text),
        }
    }

    /// Reasoning as a quote block, followed by the answer so far
    pub fn display(&self) -> String {
        if self.reasoning.is_empty() {
            return self.answer.clone();
        }
        let quoted = format!("> {}", self.reasoning.replace('\n', "\n> "));
        if self.answer.is_empty() {
            quoted
        } else {
            format!("{quoted}\n\n{}", self.answer)
        }
    }
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Deserialize, Default)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Decode one chunk of an OpenAI-style chat completion stream
pub fn chat_deltas(event: &SseEvent) -> Result<Vec<Delta>, NodeError> {
    if event.data.trim() == "[DONE]" {
        return Ok(Vec::new());
    }
    let chunk: ChatChunk = serde_json::from_str(&event.data)
        .map_err(|e| NodeError::ExecutionFailed(format!("Malformed stream chunk: {e}")))?;
    if let Some(error) = chunk.error {
        return Err(NodeError::ExecutionFailed(error.message));
    }

    let mut deltas = Vec::new();
    for choice in chunk.choices {
        let delta = choice.delta;
        if let Some(text) = delta.reasoning_content.or(delta.reasoning).filter(|t| !t.is_empty()) {
            deltas.push(Delta::Reasoning(text));
        }
        if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
            deltas.push(Delta::Text(text));
        }
    }
    Ok(deltas)
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessageEvent {
    ContentBlockDelta { delta: BlockDelta },
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    #[serde(other)]
    Other,
}

/// Decode one event of an Anthropic messages stream
pub fn message_deltas(event: &SseEvent) -> Result<Vec<Delta>, NodeError> {
    let parsed: MessageEvent = serde_json::from_str(&event.data)
        .map_err(|e| NodeError::ExecutionFailed(format!("Malformed stream event: {e}")))?;
    Ok(match parsed {
        MessageEvent::ContentBlockDelta { delta: BlockDelta::TextDelta { text } } => {
            vec![Delta::Text(text)]
        }
        MessageEvent::ContentBlockDelta { delta: BlockDelta::ThinkingDelta { thinking } } => {
            vec![Delta::Reasoning(thinking)]
        }
        MessageEvent::Error { error } => return Err(NodeError::ExecutionFailed(error.message)),
        _ => Vec::new(),
    })
}
