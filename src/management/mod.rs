//! Direct editing of test artifacts (management mode).
//!
//! A chain is an ordered list of request steps. Sequence numbers are unique
//! and strictly increasing; the editor keeps them as `1..=n` after every
//! change.

use crate::session::context::{placeholder_roots, SharedContextStore};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// Capture a value from a step's response under `variable`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRule {
    pub variable: String,
    /// Dot path into the JSON response body, e.g. `data.id`
    pub path: String,
}

/// One HTTP request definition within a chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    #[serde(default)]
    pub sequence: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub expected_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extract: Vec<ExtractionRule>,
}

impl TestStep {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            sequence: 0,
            name: None,
            method: method.to_uppercase(),
            path: path.to_string(),
            headers: BTreeMap::new(),
            body: None,
            expected_status: None,
            extract: Vec::new(),
        }
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.method, self.path))
    }

    /// Copy of this step with `${...}` placeholders in the path, header
    /// values and body strings filled from `ctx`. Unknown variables stay
    /// as written.
    pub fn render(&self, ctx: &SharedContextStore) -> TestStep {
        TestStep {
            path: ctx.substitute(&self.path),
            headers: self
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), ctx.substitute(v)))
                .collect(),
            body: self.body.as_ref().map(|b| render_value(b, ctx)),
            ..self.clone()
        }
    }

    /// Variables this step reads through `${...}` placeholders
    pub fn referenced_variables(&self) -> Vec<String> {
        let mut names = placeholder_roots(&self.path);
        for value in self.headers.values() {
            names.extend(placeholder_roots(value));
        }
        if let Some(body) = &self.body {
            names.extend(placeholder_roots(&body.to_string()));
        }
        names
    }
}

fn render_value(value: &Value, ctx: &SharedContextStore) -> Value {
    match value {
        Value::String(s) => Value::String(ctx.substitute(s)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Ordered group of steps executed as one test unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestChain {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    steps: Vec<TestStep>,
}

impl TestChain {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            description: None,
            steps: Vec::new(),
        }
    }

    pub fn steps(&self) -> &[TestStep] {
        &self.steps
    }

    pub fn step(&self, sequence: u32) -> Option<&TestStep> {
        self.steps.iter().find(|s| s.sequence == sequence)
    }

    /// Problems that break the chain's ordering or variable flow
    pub fn validate(&self) -> Vec<ChainIssue> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();
        let mut previous: Option<u32> = None;

        for step in &self.steps {
            if !seen.insert(step.sequence) {
                issues.push(ChainIssue::DuplicateSequence(step.sequence));
            } else if let Some(prev) = previous {
                if step.sequence <= prev {
                    issues.push(ChainIssue::OutOfOrder {
                        sequence: step.sequence,
                        after: prev,
                    });
                }
            }
            previous = Some(step.sequence);
        }

        // A variable must be extracted by an earlier step before it is used
        let extracted_at: HashMap<&str, usize> = self
            .steps
            .iter()
            .enumerate()
            .flat_map(|(i, s)| s.extract.iter().map(move |r| (r.variable.as_str(), i)))
            .fold(HashMap::new(), |mut acc, (name, i)| {
                acc.entry(name).or_insert(i);
                acc
            });

        for (i, step) in self.steps.iter().enumerate() {
            for name in step.referenced_variables() {
                if let Some(&defined) = extracted_at.get(name.as_str()) {
                    if defined >= i {
                        issues.push(ChainIssue::ForwardReference {
                            sequence: step.sequence,
                            variable: name,
                        });
                    }
                }
            }
        }

        issues
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainIssue {
    DuplicateSequence(u32),
    OutOfOrder { sequence: u32, after: u32 },
    /// A step uses a variable that only it or a later step extracts
    ForwardReference { sequence: u32, variable: String },
}

impl fmt::Display for ChainIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainIssue::DuplicateSequence(seq) => write!(f, "sequence {} is used twice", seq),
            ChainIssue::OutOfOrder { sequence, after } => {
                write!(f, "sequence {} follows {}", sequence, after)
            }
            ChainIssue::ForwardReference { sequence, variable } => write!(
                f,
                "step {} uses '{}' before any earlier step extracts it",
                sequence, variable
            ),
        }
    }
}

/// Ad-hoc edits to a chain. Every operation renumbers steps `1..=n`.
#[derive(Debug, Clone)]
pub struct ChainEditor {
    chain: TestChain,
}

impl ChainEditor {
    pub fn new(chain: TestChain) -> Self {
        let mut editor = Self { chain };
        editor.renumber();
        editor
    }

    pub fn chain(&self) -> &TestChain {
        &self.chain
    }

    pub fn into_chain(self) -> TestChain {
        self.chain
    }

    fn renumber(&mut self) {
        for (i, step) in self.chain.steps.iter_mut().enumerate() {
            step.sequence = i as u32 + 1;
        }
    }

    fn index_of(&self, sequence: u32) -> Option<usize> {
        self.chain.steps.iter().position(|s| s.sequence == sequence)
    }

    /// Add a step at the end; returns its sequence number
    pub fn append_step(&mut self, step: TestStep) -> u32 {
        self.chain.steps.push(step);
        self.renumber();
        self.chain.steps.len() as u32
    }

    /// Insert before the step currently at `sequence` (or append when past the end)
    pub fn insert_step(&mut self, sequence: u32, step: TestStep) -> u32 {
        let index = (sequence.max(1) as usize - 1).min(self.chain.steps.len());
        self.chain.steps.insert(index, step);
        self.renumber();
        index as u32 + 1
    }

    pub fn remove_step(&mut self, sequence: u32) -> Option<TestStep> {
        let index = self.index_of(sequence)?;
        let removed = self.chain.steps.remove(index);
        self.renumber();
        Some(removed)
    }

    /// Move a step so that it ends up at position `to` (1-based, clamped)
    pub fn move_step(&mut self, sequence: u32, to: u32) -> bool {
        let Some(from) = self.index_of(sequence) else {
            return false;
        };
        let step = self.chain.steps.remove(from);
        let to = (to.max(1) as usize - 1).min(self.chain.steps.len());
        self.chain.steps.insert(to, step);
        self.renumber();
        true
    }

    pub fn update_step(&mut self, sequence: u32, edit: impl FnOnce(&mut TestStep)) -> bool {
        let Some(index) = self.index_of(sequence) else {
            return false;
        };
        edit(&mut self.chain.steps[index]);
        // The edit may have touched the sequence number itself
        self.renumber();
        true
    }
}

/// Load a chain definition from a YAML file
pub fn load_chain(path: &Path) -> Result<TestChain> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read chain file: {}", path.display()))?;
    parse_chain(&content).with_context(|| format!("Invalid chain file: {}", path.display()))
}

pub fn parse_chain(content: &str) -> Result<TestChain> {
    let chain: TestChain = serde_yaml::from_str(content)?;
    Ok(chain)
}

pub fn save_chain(chain: &TestChain, path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(chain)?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write chain file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CHAIN_YAML: &str = r#"
name: order lifecycle
steps:
  - sequence: 1
    method: POST
    path: /orders
    body: { "sku": "A-1" }
    expectedStatus: 201
    extract:
      - variable: orderId
        path: data.id
  - sequence: 2
    method: GET
    path: /orders/${orderId}
    headers:
      Authorization: Bearer ${token}
    expectedStatus: 200
"#;

    #[test]
    fn test_parse_chain() {
        let chain = parse_chain(CHAIN_YAML).unwrap();
        assert_eq!(chain.name, "order lifecycle");
        assert_eq!(chain.steps().len(), 2);
        assert_eq!(chain.steps()[0].extract[0].variable, "orderId");
        assert_eq!(chain.steps()[1].expected_status, Some(200));
        assert!(chain.validate().is_empty());
    }

    #[test]
    fn test_validate_sequences() {
        let mut chain = TestChain::new("bad");
        for seq in [1, 3, 3, 2] {
            let mut step = TestStep::new("GET", "/ping");
            step.sequence = seq;
            chain.steps.push(step);
        }
        let issues = chain.validate();
        assert!(issues.contains(&ChainIssue::DuplicateSequence(3)));
        assert!(issues.contains(&ChainIssue::OutOfOrder { sequence: 2, after: 3 }));
    }

    #[test]
    fn test_validate_forward_reference() {
        let mut chain = TestChain::new("fwd");
        let mut first = TestStep::new("GET", "/orders/${orderId}");
        first.sequence = 1;
        let mut second = TestStep::new("POST", "/orders");
        second.sequence = 2;
        second.extract.push(ExtractionRule {
            variable: "orderId".into(),
            path: "id".into(),
        });
        chain.steps = vec![first, second];

        assert_eq!(
            chain.validate(),
            vec![ChainIssue::ForwardReference {
                sequence: 1,
                variable: "orderId".into()
            }]
        );
    }

    #[test]
    fn test_editor_keeps_sequences_contiguous() {
        let mut editor = ChainEditor::new(parse_chain(CHAIN_YAML).unwrap());
        assert_eq!(editor.append_step(TestStep::new("delete", "/orders/${orderId}")), 3);
        assert_eq!(editor.insert_step(1, TestStep::new("GET", "/health")), 1);

        let paths: Vec<&str> = editor.chain().steps().iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["/health", "/orders", "/orders/${orderId}", "/orders/${orderId}"]);
        assert_eq!(editor.chain().steps()[3].method, "DELETE");

        assert!(editor.remove_step(1).is_some());
        assert!(editor.remove_step(9).is_none());
        let seqs: Vec<u32> = editor.chain().steps().iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(editor.chain().validate().is_empty());
    }

    #[test]
    fn test_move_step_exposes_forward_reference() {
        let mut editor = ChainEditor::new(parse_chain(CHAIN_YAML).unwrap());
        assert!(editor.move_step(2, 1));
        assert_eq!(editor.chain().steps()[0].method, "GET");
        assert_eq!(editor.chain().validate().len(), 1);
        assert!(!editor.move_step(7, 1));
    }

    #[test]
    fn test_render_step_with_context() {
        let chain = parse_chain(CHAIN_YAML).unwrap();
        let mut ctx = SharedContextStore::new();
        ctx.set("orderId", "o-9");

        let rendered = chain.steps()[1].render(&ctx);
        assert_eq!(rendered.path, "/orders/o-9");
        // Unknown variables are left for a later pass
        assert_eq!(rendered.headers["Authorization"], "Bearer ${token}");
        assert_eq!(rendered.display_name(), "GET /orders/o-9");

        let mut create = TestStep::new("post", "/orders");
        create.name = Some("create order".into());
        create.body = Some(json!({"ref": "${orderId}", "qty": 2, "tags": ["${orderId}"]}));
        let rendered = create.render(&ctx);
        assert_eq!(rendered.body, Some(json!({"ref": "o-9", "qty": 2, "tags": ["o-9"]})));
        assert_eq!(rendered.display_name(), "create order");
    }

    #[test]
    fn test_update_step() {
        let mut editor = ChainEditor::new(parse_chain(CHAIN_YAML).unwrap());
        assert!(editor.update_step(2, |s| {
            s.expected_status = Some(404);
            s.sequence = 99;
        }));
        assert_eq!(editor.chain().step(2).unwrap().expected_status, Some(404));
    }
}
