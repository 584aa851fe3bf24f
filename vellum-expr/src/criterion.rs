//! Criterion evaluation for Arazzo success/failure checks: `simple`
//! boolean conditions, `regex` matches and `jsonpath` queries against the
//! expression context.
//!
//! An engine instance caches parsed expressions, compiled regexes and
//! compiled JSONPaths by raw text, remembering failures as well as
//! successes. The caches belong to one engine and are not thread-safe.

use std::{cell::RefCell, rc::Rc};

use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json_path::JsonPath;

use crate::{
    context::EvalContext,
    eval::{evaluate, EvalError},
    parse::{parse, Expression, ExpressionParseError},
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CriterionType {
    #[default]
    Simple,
    Regex,
    JsonPath,
    XPath,
}

/// One criterion as written in a workflow step.
#[derive(Clone, Debug, Default)]
pub struct Criterion {
    pub condition: String,
    /// The expression whose value the condition applies to. Required for
    /// `regex` and `jsonpath`.
    pub context: Option<String>,
    pub criterion_type: CriterionType,
}

#[derive(Debug, thiserror::Error)]
pub enum CriterionError {
    #[error("criterion type {criterion_type:?} requires a context expression")]
    MissingContext { criterion_type: CriterionType },
    #[error("xpath criteria aren't supported")]
    XPathUnsupported,
    #[error("invalid regex {pattern:?}: {message}")]
    BadRegex { pattern: String, message: String },
    #[error("invalid JSONPath {path:?}: {message}")]
    BadJsonPath { path: String, message: String },
    #[error("can't parse condition {condition:?} as a comparison")]
    BadCondition { condition: String },
    #[error(transparent)]
    Parse(#[from] ExpressionParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// A criterion evaluator with per-instance caches.
#[derive(Debug, Default)]
pub struct CriterionEngine {
    expressions: RefCell<FxHashMap<String, Result<Rc<Expression>, ExpressionParseError>>>,
    regexes: RefCell<FxHashMap<String, Result<Rc<Regex>, String>>>,
    json_paths: RefCell<FxHashMap<String, Result<Rc<JsonPath>, String>>>,
}

impl CriterionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates a criterion against the context.
    pub fn evaluate(
        &self,
        criterion: &Criterion,
        context: Option<&EvalContext>,
    ) -> Result<bool, CriterionError> {
        match criterion.criterion_type {
            CriterionType::Simple => self.evaluate_simple(criterion, context),
            CriterionType::Regex => {
                let subject = self.context_value(criterion, context)?;
                let regex = self.compiled_regex(&criterion.condition)?;
                Ok(regex.is_match(&subject))
            }
            CriterionType::JsonPath => {
                let expression = self.required_context(criterion)?;
                let parsed = self.parsed_expression(expression)?;
                let value = evaluate(&parsed, context)?;
                let json = value.to_json();
                let path = self.compiled_json_path(&criterion.condition)?;
                Ok(!path.query(&json).is_empty())
            }
            CriterionType::XPath => Err(CriterionError::XPathUnsupported),
        }
    }

    fn evaluate_simple(
        &self,
        criterion: &Criterion,
        context: Option<&EvalContext>,
    ) -> Result<bool, CriterionError> {
        if let Some(expression) = &criterion.context {
            let parsed = self.parsed_expression(expression)?;
            let value = evaluate(&parsed, context)?;
            return Ok(value.to_display_string() == criterion.condition);
        }
        let (lhs, op, rhs) =
            split_condition(&criterion.condition).ok_or_else(|| CriterionError::BadCondition {
                condition: criterion.condition.clone(),
            })?;
        let left = self.operand(&lhs, context)?;
        let right = self.operand(&rhs, context)?;
        Ok(compare(&left, op, &right))
    }

    fn required_context<'a>(&self, criterion: &'a Criterion) -> Result<&'a str, CriterionError> {
        criterion
            .context
            .as_deref()
            .ok_or(CriterionError::MissingContext {
                criterion_type: criterion.criterion_type,
            })
    }

    fn context_value(
        &self,
        criterion: &Criterion,
        context: Option<&EvalContext>,
    ) -> Result<String, CriterionError> {
        let expression = self.required_context(criterion)?;
        let parsed = self.parsed_expression(expression)?;
        let value = evaluate(&parsed, context)?;
        Ok(value.to_display_string())
    }

    fn operand(
        &self,
        text: &str,
        context: Option<&EvalContext>,
    ) -> Result<crate::context::Value, CriterionError> {
        use crate::context::Value;
        if text.starts_with('$') {
            let parsed = self.parsed_expression(text)?;
            return Ok(evaluate(&parsed, context)?);
        }
        if (text.starts_with('\'') && text.ends_with('\'') && text.len() >= 2)
            || (text.starts_with('"') && text.ends_with('"') && text.len() >= 2)
        {
            return Ok(Value::String(text[1..text.len() - 1].to_owned()));
        }
        match text {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            _ => {}
        }
        if let Ok(number) = text.parse::<f64>() {
            return Ok(Value::Float(number));
        }
        Ok(Value::String(text.to_owned()))
    }

    /// Parses an expression through the cache. Failures are cached too.
    pub fn parsed_expression(&self, raw: &str) -> Result<Rc<Expression>, CriterionError> {
        if let Some(cached) = self.expressions.borrow().get(raw) {
            return cached.clone().map_err(CriterionError::Parse);
        }
        let result = parse(raw).map(Rc::new);
        self.expressions
            .borrow_mut()
            .insert(raw.to_owned(), result.clone());
        result.map_err(CriterionError::Parse)
    }

    /// Compiles a regex through the cache; the same pattern always
    /// returns the same compiled object.
    pub fn compiled_regex(&self, pattern: &str) -> Result<Rc<Regex>, CriterionError> {
        if let Some(cached) = self.regexes.borrow().get(pattern) {
            return cached.clone().map_err(|message| CriterionError::BadRegex {
                pattern: pattern.to_owned(),
                message,
            });
        }
        let result = Regex::new(pattern)
            .map(Rc::new)
            .map_err(|err| err.to_string());
        self.regexes
            .borrow_mut()
            .insert(pattern.to_owned(), result.clone());
        result.map_err(|message| CriterionError::BadRegex {
            pattern: pattern.to_owned(),
            message,
        })
    }

    /// Compiles a JSONPath through the cache.
    pub fn compiled_json_path(&self, path: &str) -> Result<Rc<JsonPath>, CriterionError> {
        if let Some(cached) = self.json_paths.borrow().get(path) {
            return cached
                .clone()
                .map_err(|message| CriterionError::BadJsonPath {
                    path: path.to_owned(),
                    message,
                });
        }
        let result = JsonPath::parse(path)
            .map(Rc::new)
            .map_err(|err| err.to_string());
        self.json_paths
            .borrow_mut()
            .insert(path.to_owned(), result.clone());
        result.map_err(|message| CriterionError::BadJsonPath {
            path: path.to_owned(),
            message,
        })
    }

    pub fn clear_caches(&self) {
        self.expressions.borrow_mut().clear();
        self.regexes.borrow_mut().clear();
        self.json_paths.borrow_mut().clear();
    }
}

/// Evaluates a criterion without any caching.
pub fn evaluate_criterion(
    criterion: &Criterion,
    context: Option<&EvalContext>,
) -> Result<bool, CriterionError> {
    CriterionEngine::new().evaluate(criterion, context)
}

const OPERATORS: [&str; 6] = ["==", "!=", ">=", "<=", ">", "<"];

/// Splits `<operand> <op> <operand>`. Scanning starts after the leading
/// `$`-expression (first unescaped space), so operator-looking characters
/// inside a JSON pointer aren't misread.
fn split_condition(condition: &str) -> Option<(String, &'static str, String)> {
    let condition = condition.trim();
    let mut search_from = 0;
    if condition.starts_with('$') {
        let bytes = condition.as_bytes();
        let mut idx = 0;
        while idx < bytes.len() {
            if bytes[idx] == b' ' && bytes.get(idx.wrapping_sub(1)) != Some(&b'\\') {
                break;
            }
            idx += 1;
        }
        search_from = idx;
    }
    let tail = &condition[search_from..];
    let mut best: Option<(usize, &'static str)> = None;
    for op in OPERATORS {
        if let Some(pos) = tail.find(op) {
            best = match best {
                None => Some((pos, op)),
                Some((best_pos, best_op)) => {
                    if pos < best_pos || (pos == best_pos && op.len() > best_op.len()) {
                        Some((pos, op))
                    } else {
                        Some((best_pos, best_op))
                    }
                }
            };
        }
    }
    let (pos, op) = best?;
    let split_at = search_from + pos;
    let lhs = condition[..split_at].trim();
    let rhs = condition[split_at + op.len()..].trim();
    if lhs.is_empty() || rhs.is_empty() {
        return None;
    }
    Some((lhs.replace("\\ ", " "), op, rhs.replace("\\ ", " ")))
}

/// Numeric comparison when both sides coerce; lexicographic otherwise.
fn compare(left: &crate::context::Value, op: &str, right: &crate::context::Value) -> bool {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return match op {
            "==" => a == b,
            "!=" => a != b,
            ">=" => a >= b,
            "<=" => a <= b,
            ">" => a > b,
            "<" => a < b,
            _ => false,
        };
    }
    let a = left.to_display_string();
    let b = right.to_display_string();
    match op {
        "==" => a == b,
        "!=" => a != b,
        ">=" => a >= b,
        "<=" => a <= b,
        ">" => a > b,
        "<" => a < b,
        _ => false,
    }
}
