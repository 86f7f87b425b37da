//! Persisted workflow document: the import/export boundary.
//!
//! Imports are validated field by field before anything is deserialized, so
//! a rejected document reports every problem at once.

use crate::{Edge, ImportError, NodeSpec, Workflow};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// `{name, nodes, edges, createdAt?, updatedAt?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    pub name: String,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_date")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_date")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One rejected field: `nodes.0.position.x: Expected number, received string`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl WorkflowDocument {
    /// Parse and validate a JSON document
    pub fn parse(text: &str) -> Result<Self, ImportError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ImportError> {
        let issues = validate(&value);
        if !issues.is_empty() {
            return Err(ImportError::Validation { issues });
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Snapshot of a workflow with transient run state reset
    pub fn from_workflow(workflow: &Workflow) -> Self {
        let cleaned = workflow.cleaned();
        Self {
            name: cleaned.name,
            nodes: cleaned.nodes,
            edges: cleaned.edges,
            created_at: Some(cleaned.created_at),
            updated_at: Some(cleaned.updated_at),
        }
    }

    /// Materialize as a new workflow: fresh id, fresh timestamps, nothing
    /// loading or animated.
    pub fn into_workflow(self) -> Workflow {
        let mut workflow = Workflow::new(self.name);
        workflow.nodes = self.nodes;
        workflow.edges = self.edges;
        workflow.clear_transient();
        workflow
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Collect every schema violation in a candidate document
pub fn validate(value: &Value) -> Vec<ValidationIssue> {
    let mut v = Validator::default();
    let Some(root) = value.as_object() else {
        v.issue("", format!("Expected object, received {}", type_name(value)));
        return v.issues;
    };

    v.required(root.get("name"), "name", Kind::String);

    match root.get("nodes") {
        Some(Value::Array(nodes)) => {
            let mut seen = HashSet::new();
            for (i, node) in nodes.iter().enumerate() {
                v.node(node, &format!("nodes.{i}"));
                if let Some(id) = node.get("id").and_then(Value::as_str) {
                    if !seen.insert(id) {
                        v.issue(&format!("nodes.{i}.id"), format!("Duplicate node id {id}"));
                    }
                }
            }
        }
        other => v.required(other, "nodes", Kind::Array),
    }

    match root.get("edges") {
        Some(Value::Array(edges)) => {
            for (i, edge) in edges.iter().enumerate() {
                v.edge(edge, &format!("edges.{i}"));
            }
        }
        other => v.required(other, "edges", Kind::Array),
    }

    for key in ["createdAt", "updatedAt"] {
        if let Some(date) = root.get(key).filter(|d| !d.is_null()) {
            if parse_date(date).is_none() {
                v.issue(key, "Invalid date");
            }
        }
    }

    v.issues
}

#[derive(Clone, Copy)]
enum Kind {
    String,
    Number,
    Bool,
    Object,
    Array,
}

impl Kind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Kind::String => value.is_string(),
            Kind::Number => value.is_number(),
            Kind::Bool => value.is_boolean(),
            Kind::Object => value.is_object(),
            Kind::Array => value.is_array(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Number => "number",
            Kind::Bool => "boolean",
            Kind::Object => "object",
            Kind::Array => "array",
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Default)]
struct Validator {
    issues: Vec<ValidationIssue>,
}

impl Validator {
    fn issue(&mut self, path: &str, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            path: path.to_string(),
            message: message.into(),
        });
    }

    fn required(&mut self, value: Option<&Value>, path: &str, kind: Kind) {
        match value {
            None => self.issue(path, "Required"),
            Some(value) => self.expect(value, path, kind),
        }
    }

    fn optional(&mut self, value: Option<&Value>, path: &str, kind: Kind) {
        if let Some(value) = value.filter(|v| !v.is_null()) {
            self.expect(value, path, kind);
        }
    }

    /// Absent is fine, null is not
    fn defaulted(&mut self, value: Option<&Value>, path: &str, kind: Kind) {
        if let Some(value) = value {
            self.expect(value, path, kind);
        }
    }

    fn expect(&mut self, value: &Value, path: &str, kind: Kind) {
        if !kind.matches(value) {
            self.issue(
                path,
                format!("Expected {}, received {}", kind.name(), type_name(value)),
            );
        }
    }

    fn node(&mut self, node: &Value, path: &str) {
        let Some(obj) = node.as_object() else {
            self.expect(node, path, Kind::Object);
            return;
        };
        self.required(obj.get("id"), &format!("{path}.id"), Kind::String);
        self.optional(obj.get("type"), &format!("{path}.type"), Kind::String);
        self.optional(obj.get("width"), &format!("{path}.width"), Kind::Number);
        self.optional(obj.get("height"), &format!("{path}.height"), Kind::Number);

        match obj.get("position") {
            Some(Value::Object(position)) => {
                self.required(position.get("x"), &format!("{path}.position.x"), Kind::Number);
                self.required(position.get("y"), &format!("{path}.position.y"), Kind::Number);
            }
            other => self.required(other, &format!("{path}.position"), Kind::Object),
        }

        match obj.get("data") {
            Some(Value::Object(data)) => {
                for key in ["loading", "dirty"] {
                    self.defaulted(data.get(key), &format!("{path}.data.{key}"), Kind::Bool);
                }
                for key in ["output", "error", "label"] {
                    self.optional(data.get(key), &format!("{path}.data.{key}"), Kind::String);
                }
            }
            other => self.optional(other, &format!("{path}.data"), Kind::Object),
        }
    }

    fn edge(&mut self, edge: &Value, path: &str) {
        let Some(obj) = edge.as_object() else {
            self.expect(edge, path, Kind::Object);
            return;
        };
        for key in ["id", "source", "target"] {
            self.required(obj.get(key), &format!("{path}.{key}"), Kind::String);
        }
        self.optional(obj.get("type"), &format!("{path}.type"), Kind::String);
        self.optional(obj.get("sourceHandle"), &format!("{path}.sourceHandle"), Kind::String);
        self.defaulted(obj.get("animated"), &format!("{path}.animated"), Kind::Bool);
    }
}

/// Accepts rfc3339 strings or epoch milliseconds
fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_date))
}
