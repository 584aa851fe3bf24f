//! The Arazzo runtime-expression grammar.
//!
//! ```text
//! expr     = "$" head
//! head     = "url" | "method" | "statusCode"
//!          | "request."  source
//!          | "response." source
//!          | "inputs."   name
//!          | "outputs."  name
//!          | "steps."    name [ "." tail ]
//!          | "workflows."name [ "." tail ]
//!          | "sourceDescriptions." name [ "." tail ]
//!          | "components." name [ "." tail ]
//! source   = "header." tchar+ | "query." name | "path." name
//!          | "body" [ "#" json-pointer ]
//! ```
//!
//! `tchar` is the RFC 7230 token character set. The parser keeps the raw
//! text on the returned expression, so `parse(expr.raw) == expr`.

use winnow::{
    Parser,
    combinator::eof,
    error::ContextError,
    token::take_while,
};

/// A parsed expression: its variant plus the raw text it came from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub raw: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExprKind {
    Url,
    Method,
    StatusCode,
    RequestHeader { name: String },
    RequestQuery { name: String },
    RequestPath { name: String },
    RequestBody { pointer: Option<String> },
    ResponseHeader { name: String },
    ResponseQuery { name: String },
    ResponsePath { name: String },
    ResponseBody { pointer: Option<String> },
    Inputs { name: String },
    Outputs { name: String },
    Steps { name: String, tail: Vec<String> },
    Workflows { name: String, tail: Vec<String> },
    SourceDescriptions { name: String, tail: Vec<String> },
    /// `$components.<kind>.<name>[...]` for every kind except
    /// `parameters`, which gets its own variant.
    Components {
        kind: String,
        name: String,
        tail: Vec<String>,
    },
    ComponentParameters { name: String, tail: Vec<String> },
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ExpressionParseError {
    #[error("expression is empty")]
    Empty,
    #[error("expression {raw:?} doesn't start with `$`")]
    MissingDollar { raw: String },
    #[error("unknown expression prefix {prefix:?} in {raw:?}")]
    UnknownPrefix { prefix: String, raw: String },
    #[error("empty name component in {raw:?}")]
    EmptyName { raw: String },
    #[error("invalid header name character {found:?} in {raw:?}")]
    InvalidHeaderName { found: char, raw: String },
    #[error("unknown {target} source {source_name:?} in {raw:?}")]
    UnknownSource {
        target: &'static str,
        source_name: String,
        raw: String,
    },
    #[error("unterminated segment in {raw:?}")]
    Unterminated { raw: String },
}

/// Parses one `$`-expression.
pub fn parse(raw: &str) -> Result<Expression, ExpressionParseError> {
    if raw.is_empty() {
        return Err(ExpressionParseError::Empty);
    }
    let Some(body) = raw.strip_prefix('$') else {
        return Err(ExpressionParseError::MissingDollar {
            raw: raw.to_owned(),
        });
    };

    let kind = match body {
        "url" => ExprKind::Url,
        "method" => ExprKind::Method,
        "statusCode" => ExprKind::StatusCode,
        _ => {
            let (prefix, rest) =
                body.split_once('.')
                    .ok_or_else(|| ExpressionParseError::UnknownPrefix {
                        prefix: body.to_owned(),
                        raw: raw.to_owned(),
                    })?;
            match prefix {
                "request" => parse_source(raw, "request", rest)?,
                "response" => parse_source(raw, "response", rest)?,
                "inputs" => ExprKind::Inputs {
                    name: single_name(raw, rest)?,
                },
                "outputs" => ExprKind::Outputs {
                    name: single_name(raw, rest)?,
                },
                "steps" => {
                    let (name, tail) = name_and_tail(raw, rest)?;
                    ExprKind::Steps { name, tail }
                }
                "workflows" => {
                    let (name, tail) = name_and_tail(raw, rest)?;
                    ExprKind::Workflows { name, tail }
                }
                "sourceDescriptions" => {
                    let (name, tail) = name_and_tail(raw, rest)?;
                    ExprKind::SourceDescriptions { name, tail }
                }
                "components" => {
                    let (kind, rest) =
                        rest.split_once('.')
                            .ok_or_else(|| ExpressionParseError::Unterminated {
                                raw: raw.to_owned(),
                            })?;
                    check_name(raw, kind)?;
                    let (name, tail) = name_and_tail(raw, rest)?;
                    if kind == "parameters" {
                        ExprKind::ComponentParameters { name, tail }
                    } else {
                        ExprKind::Components {
                            kind: kind.to_owned(),
                            name,
                            tail,
                        }
                    }
                }
                unknown => {
                    return Err(ExpressionParseError::UnknownPrefix {
                        prefix: unknown.to_owned(),
                        raw: raw.to_owned(),
                    });
                }
            }
        }
    };
    Ok(Expression {
        kind,
        raw: raw.to_owned(),
    })
}

fn parse_source(
    raw: &str,
    target: &'static str,
    rest: &str,
) -> Result<ExprKind, ExpressionParseError> {
    if rest == "body" || rest.starts_with("body#") {
        let pointer = rest.strip_prefix("body#").map(str::to_owned);
        return Ok(match target {
            "request" => ExprKind::RequestBody { pointer },
            _ => ExprKind::ResponseBody { pointer },
        });
    }
    let Some((source, name)) = rest.split_once('.') else {
        return Err(ExpressionParseError::UnknownSource {
            target,
            source_name: rest.to_owned(),
            raw: raw.to_owned(),
        });
    };
    match source {
        "header" => {
            check_header_name(raw, name)?;
            Ok(match target {
                "request" => ExprKind::RequestHeader {
                    name: name.to_owned(),
                },
                _ => ExprKind::ResponseHeader {
                    name: name.to_owned(),
                },
            })
        }
        "query" => {
            let name = single_name(raw, name)?;
            Ok(match target {
                "request" => ExprKind::RequestQuery { name },
                _ => ExprKind::ResponseQuery { name },
            })
        }
        "path" => {
            let name = single_name(raw, name)?;
            Ok(match target {
                "request" => ExprKind::RequestPath { name },
                _ => ExprKind::ResponsePath { name },
            })
        }
        other => Err(ExpressionParseError::UnknownSource {
            target,
            source_name: other.to_owned(),
            raw: raw.to_owned(),
        }),
    }
}

/// A single trailing name with nothing after it.
fn single_name(raw: &str, name: &str) -> Result<String, ExpressionParseError> {
    check_name(raw, name)?;
    Ok(name.to_owned())
}

/// `name [ "." tail ]`: a leading name plus any dotted tail segments.
fn name_and_tail(raw: &str, rest: &str) -> Result<(String, Vec<String>), ExpressionParseError> {
    let mut segments = rest.split('.');
    let name = segments.next().unwrap_or_default();
    check_name(raw, name)?;
    let tail: Vec<String> = segments.map(str::to_owned).collect();
    for segment in &tail {
        if segment.is_empty() {
            return Err(ExpressionParseError::EmptyName {
                raw: raw.to_owned(),
            });
        }
    }
    Ok((name.to_owned(), tail))
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-')
}

fn check_name(raw: &str, name: &str) -> Result<(), ExpressionParseError> {
    if name.is_empty() {
        return Err(ExpressionParseError::EmptyName {
            raw: raw.to_owned(),
        });
    }
    (take_while(1.., is_name_char), eof::<&str, ContextError>)
        .parse(name)
        .map_err(|_| ExpressionParseError::EmptyName {
            raw: raw.to_owned(),
        })?;
    Ok(())
}

/// RFC 7230 token characters: visible ASCII minus separators.
fn is_tchar(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' | '^' | '_' | '`' | '|'
                | '~'
        )
}

fn check_header_name(raw: &str, name: &str) -> Result<(), ExpressionParseError> {
    if name.is_empty() {
        return Err(ExpressionParseError::EmptyName {
            raw: raw.to_owned(),
        });
    }
    if let Err(err) = (take_while(1.., is_tchar), eof::<&str, ContextError>).parse(name) {
        let offset = err.offset();
        let found = name[offset..].chars().next().unwrap_or('?');
        return Err(ExpressionParseError::InvalidHeaderName {
            found,
            raw: raw.to_owned(),
        });
    }
    Ok(())
}

/// One token of an embedded-expression string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EmbeddedToken {
    Literal(String),
    Expression(Expression),
}

/// Tokenizes text containing `{$expr}` interpolations into literal runs
/// and parsed expressions. A `{` with no closing `}` is an error, as is a
/// brace-enclosed `$`-expression that doesn't parse.
pub fn parse_embedded(text: &str) -> Result<Vec<EmbeddedToken>, ExpressionParseError> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        literal.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            return Err(ExpressionParseError::Unterminated {
                raw: text.to_owned(),
            });
        };
        let inner = &after[..close];
        if inner.trim_start().starts_with('$') {
            if !literal.is_empty() {
                tokens.push(EmbeddedToken::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(EmbeddedToken::Expression(parse(inner.trim())?));
        } else {
            // Braces without an expression stay literal text.
            literal.push('{');
            literal.push_str(inner);
            literal.push('}');
        }
        rest = &after[close + 1..];
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        tokens.push(EmbeddedToken::Literal(literal));
    }
    Ok(tokens)
}
