//! Expression evaluation over an [`EvalContext`].

use indexmap::IndexMap;

use vellum_core::cst::{Kind, Node, ResolveError, Tag};
use vellum_pointer::JsonPointer;

use crate::{
    context::{EvalContext, StepIo, Value},
    parse::{EmbeddedToken, ExprKind, Expression},
};

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("no context to evaluate against")]
    NilContext,
    #[error("the context has no {section}")]
    MissingSection { section: &'static str },
    #[error("{section} has no entry {property:?}")]
    MissingProperty {
        section: &'static str,
        property: String,
    },
    #[error("expression {raw:?} isn't supported")]
    UnsupportedExpression { raw: String },
    #[error("invalid JSON pointer in {raw:?}: {message}")]
    BadPointer { raw: String, message: String },
    #[error("pointer traversal failed in {raw:?}")]
    Pointer {
        raw: String,
        #[source]
        source: ResolveError,
    },
}

/// Evaluates one expression. `None` for the context reports
/// [`EvalError::NilContext`], matching callers that thread an optional
/// runtime state through.
pub fn evaluate(expression: &Expression, context: Option<&EvalContext>) -> Result<Value, EvalError> {
    let ctx = context.ok_or(EvalError::NilContext)?;
    match &expression.kind {
        ExprKind::Url => ctx
            .url
            .clone()
            .map(Value::String)
            .ok_or(EvalError::MissingSection { section: "url" }),
        ExprKind::Method => ctx
            .method
            .clone()
            .map(Value::String)
            .ok_or(EvalError::MissingSection { section: "method" }),
        ExprKind::StatusCode => ctx
            .status_code
            .map(Value::Int)
            .ok_or(EvalError::MissingSection {
                section: "statusCode",
            }),
        ExprKind::RequestHeader { name } => {
            header_lookup(&ctx.request_headers, name, "request headers")
        }
        ExprKind::ResponseHeader { name } => {
            header_lookup(&ctx.response_headers, name, "response headers")
        }
        ExprKind::RequestQuery { name } => {
            string_lookup(&ctx.request_query, name, "request query")
        }
        ExprKind::RequestPath { name } => string_lookup(&ctx.request_path, name, "request path"),
        ExprKind::RequestBody { pointer } => {
            body_lookup(ctx.request_body.as_ref(), pointer, expression, "request body")
        }
        ExprKind::ResponseBody { pointer } => body_lookup(
            ctx.response_body.as_ref(),
            pointer,
            expression,
            "response body",
        ),
        // The Arazzo specification doesn't define these; refuse rather
        // than guess.
        ExprKind::ResponseQuery { .. } | ExprKind::ResponsePath { .. } => {
            Err(EvalError::UnsupportedExpression {
                raw: expression.raw.clone(),
            })
        }
        ExprKind::Inputs { name } => value_lookup(&ctx.inputs, name, "inputs"),
        ExprKind::Outputs { name } => value_lookup(&ctx.outputs, name, "outputs"),
        ExprKind::Steps { name, tail } => {
            let step = ctx.steps.get(name).ok_or_else(|| EvalError::MissingProperty {
                section: "steps",
                property: name.clone(),
            })?;
            step_io_lookup(step, tail, "steps")
        }
        ExprKind::Workflows { name, tail } => {
            let workflow =
                ctx.workflows
                    .get(name)
                    .ok_or_else(|| EvalError::MissingProperty {
                        section: "workflows",
                        property: name.clone(),
                    })?;
            step_io_lookup(workflow, tail, "workflows")
        }
        ExprKind::SourceDescriptions { name, tail } => {
            let source =
                ctx.source_descriptions
                    .get(name)
                    .ok_or_else(|| EvalError::MissingProperty {
                        section: "sourceDescriptions",
                        property: name.clone(),
                    })?;
            match tail.first().map(String::as_str) {
                None => Ok(Value::Map(IndexMap::from([(
                    "url".to_owned(),
                    Value::String(source.url.clone()),
                )]))),
                Some("url") if tail.len() == 1 => Ok(Value::String(source.url.clone())),
                Some(other) => Err(EvalError::MissingProperty {
                    section: "sourceDescriptions",
                    property: other.to_owned(),
                }),
            }
        }
        ExprKind::ComponentParameters { name, tail } => {
            let value =
                ctx.components
                    .parameters
                    .get(name)
                    .ok_or_else(|| EvalError::MissingProperty {
                        section: "components.parameters",
                        property: name.clone(),
                    })?;
            descend(value.clone(), tail, "components.parameters")
        }
        ExprKind::Components { kind, name, tail } => {
            let table = ctx
                .components
                .table(kind)
                .ok_or_else(|| EvalError::MissingProperty {
                    section: "components",
                    property: kind.clone(),
                })?;
            let value = table.get(name).ok_or_else(|| EvalError::MissingProperty {
                section: "components",
                property: name.clone(),
            })?;
            descend(value.clone(), tail, "components")
        }
    }
}

/// Evaluates an embedded-token sequence to the concatenated string form.
pub fn evaluate_embedded(
    tokens: &[EmbeddedToken],
    context: Option<&EvalContext>,
) -> Result<String, EvalError> {
    let mut out = String::new();
    for token in tokens {
        match token {
            EmbeddedToken::Literal(text) => out.push_str(text),
            EmbeddedToken::Expression(expr) => {
                out.push_str(&evaluate(expr, context)?.to_display_string());
            }
        }
    }
    Ok(out)
}

fn header_lookup(
    headers: &IndexMap<String, String>,
    name: &str,
    section: &'static str,
) -> Result<Value, EvalError> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| Value::String(value.clone()))
        .ok_or_else(|| EvalError::MissingProperty {
            section,
            property: name.to_owned(),
        })
}

fn string_lookup(
    table: &IndexMap<String, String>,
    name: &str,
    section: &'static str,
) -> Result<Value, EvalError> {
    table
        .get(name)
        .map(|value| Value::String(value.clone()))
        .ok_or_else(|| EvalError::MissingProperty {
            section,
            property: name.to_owned(),
        })
}

fn value_lookup(
    table: &IndexMap<String, Value>,
    name: &str,
    section: &'static str,
) -> Result<Value, EvalError> {
    table
        .get(name)
        .cloned()
        .ok_or_else(|| EvalError::MissingProperty {
            section,
            property: name.to_owned(),
        })
}

fn body_lookup(
    body: Option<&Node>,
    pointer: &Option<String>,
    expression: &Expression,
    section: &'static str,
) -> Result<Value, EvalError> {
    let body = body.ok_or(EvalError::MissingSection { section })?;
    let node = match pointer {
        None => body.clone(),
        Some(raw_pointer) => {
            let parsed =
                JsonPointer::parse(raw_pointer).map_err(|err| EvalError::BadPointer {
                    raw: expression.raw.clone(),
                    message: err.to_string(),
                })?;
            body.resolve(&parsed).map_err(|err| EvalError::Pointer {
                raw: expression.raw.clone(),
                source: err,
            })?
        }
    };
    Ok(node_to_value(&node))
}

/// Scalar leaves convert to native values; mappings and sequences come
/// back as nodes.
fn node_to_value(node: &Node) -> Value {
    match node.kind() {
        Kind::Scalar => {
            let text = node.value();
            match node.tag() {
                Tag::Null => Value::Null,
                Tag::Bool => Value::Bool(matches!(text.as_str(), "true" | "True" | "TRUE")),
                Tag::Int => text
                    .parse::<i64>()
                    .map(Value::Int)
                    .unwrap_or(Value::String(text)),
                Tag::Float => text
                    .parse::<f64>()
                    .map(Value::Float)
                    .unwrap_or(Value::String(text)),
                _ => Value::String(text),
            }
        }
        _ => Value::Node(node.clone()),
    }
}

/// `steps.<id>.inputs` / `.outputs`, whole map or one field.
fn step_io_lookup(io: &StepIo, tail: &[String], section: &'static str) -> Result<Value, EvalError> {
    match tail.split_first() {
        None => Ok(Value::Map(IndexMap::from([
            ("inputs".to_owned(), Value::Map(io.inputs.clone())),
            ("outputs".to_owned(), Value::Map(io.outputs.clone())),
        ]))),
        Some((head, rest)) => {
            let table = match head.as_str() {
                "inputs" => &io.inputs,
                "outputs" => &io.outputs,
                other => {
                    return Err(EvalError::MissingProperty {
                        section,
                        property: other.to_owned(),
                    });
                }
            };
            match rest.split_first() {
                None => Ok(Value::Map(table.clone())),
                Some((field, deeper)) => {
                    let value = table.get(field).ok_or_else(|| EvalError::MissingProperty {
                        section,
                        property: field.clone(),
                    })?;
                    descend(value.clone(), deeper, section)
                }
            }
        }
    }
}

/// Walks `.`-separated segments through nested maps.
fn descend(value: Value, tail: &[String], section: &'static str) -> Result<Value, EvalError> {
    let mut current = value;
    for segment in tail {
        let Value::Map(map) = current else {
            return Err(EvalError::MissingProperty {
                section,
                property: segment.clone(),
            });
        };
        current = map
            .get(segment)
            .cloned()
            .ok_or_else(|| EvalError::MissingProperty {
                section,
                property: segment.clone(),
            })?;
    }
    Ok(current)
}
