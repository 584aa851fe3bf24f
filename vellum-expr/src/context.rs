//! The runtime state expressions evaluate against: the request and
//! response of the current step, workflow inputs/outputs, and reusable
//! components.

use indexmap::IndexMap;

use vellum_core::cst::Node;

/// A value produced by evaluating an expression, or seeded into the
//  context by the caller.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// A mapping or sequence from a document body, returned as-is.
    Node(Node),
    Map(IndexMap<String, Value>),
}

impl Value {
    /// The stringified form used by `simple` criterion comparison.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_owned(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Node(node) => serde_json::to_string(&node.to_json_value()).unwrap_or_default(),
            Value::Map(map) => serde_json::to_string(&value_map_to_json(map)).unwrap_or_default(),
        }
    }

    /// Converts to a JSON value for JSONPath queries.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => (*b).into(),
            Value::Int(i) => (*i).into(),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => s.clone().into(),
            Value::Node(node) => node.to_json_value(),
            Value::Map(map) => value_map_to_json(map),
        }
    }

    /// A numeric view, when one exists.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a.structural_eq(b),
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            _ => false,
        }
    }
}

fn value_map_to_json(map: &IndexMap<String, Value>) -> serde_json::Value {
    serde_json::Value::Object(
        map.iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    )
}

/// The inputs and outputs of one step or workflow.
#[derive(Clone, Debug, Default)]
pub struct StepIo {
    pub inputs: IndexMap<String, Value>,
    pub outputs: IndexMap<String, Value>,
}

/// One entry of `sourceDescriptions`.
#[derive(Clone, Debug, Default)]
pub struct SourceDescription {
    pub url: String,
}

/// Reusable components visible to `$components.*` expressions.
#[derive(Clone, Debug, Default)]
pub struct ComponentsTable {
    pub parameters: IndexMap<String, Value>,
    pub success_actions: IndexMap<String, Value>,
    pub failure_actions: IndexMap<String, Value>,
    pub inputs: IndexMap<String, Value>,
}

impl ComponentsTable {
    /// The table for a `$components.<kind>` lookup, if the kind exists.
    pub fn table(&self, kind: &str) -> Option<&IndexMap<String, Value>> {
        match kind {
            "parameters" => Some(&self.parameters),
            "successActions" => Some(&self.success_actions),
            "failureActions" => Some(&self.failure_actions),
            "inputs" => Some(&self.inputs),
            _ => None,
        }
    }
}

/// Everything an expression can read.
#[derive(Clone, Debug, Default)]
pub struct EvalContext {
    pub url: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<i64>,
    pub request_headers: IndexMap<String, String>,
    pub request_query: IndexMap<String, String>,
    pub request_path: IndexMap<String, String>,
    pub request_body: Option<Node>,
    pub response_headers: IndexMap<String, String>,
    pub response_body: Option<Node>,
    pub inputs: IndexMap<String, Value>,
    pub outputs: IndexMap<String, Value>,
    pub steps: IndexMap<String, StepIo>,
    pub workflows: IndexMap<String, StepIo>,
    pub source_descriptions: IndexMap<String, SourceDescription>,
    pub components: ComponentsTable,
}
