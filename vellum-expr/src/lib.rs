//! Arazzo runtime expressions for Vellum: the `$`-expression grammar, an
//! evaluator over a request/response context, and the criterion engine
//! used by workflow success/failure checks.

mod context;
mod criterion;
mod eval;
mod parse;

pub use context::{ComponentsTable, EvalContext, SourceDescription, StepIo, Value};
pub use criterion::{
    evaluate_criterion, Criterion, CriterionEngine, CriterionError, CriterionType,
};
pub use eval::{evaluate, evaluate_embedded, EvalError};
pub use parse::{
    parse, parse_embedded, EmbeddedToken, ExprKind, Expression, ExpressionParseError,
};
