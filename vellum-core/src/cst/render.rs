//! Serializes a CST back to text.
//!
//! YAML rendering walks the tree in insertion order and reproduces each
//! node's recorded style, indent and comments, so an unmutated subtree comes
//! back out the way it went in. JSON rendering goes through an
//! order-preserving [`serde_json::Value`] and ignores styles and comments.

use itertools::Itertools;
use serde::Serialize;

use super::{Kind, Node, Style};

/// Renders a document as YAML.
pub fn render_yaml(root: &Node) -> Vec<u8> {
    let mut out = String::new();
    let node = if root.kind() == Kind::Document {
        let data = root.borrow();
        if let Some(head) = &data.head_comment {
            push_comment_block(&mut out, head, 0);
        }
        root.unwrap_document()
    } else {
        root.clone()
    };
    emit_block(&mut out, &node, block_indent(&node, 0));
    if root.kind() == Kind::Document {
        if let Some(foot) = &root.borrow().foot_comment {
            push_comment_block(&mut out, foot, 0);
        }
    }
    out.into_bytes()
}

/// Renders a document as JSON with the given indent width. An indent of
/// zero produces compact output.
pub fn render_json(root: &Node, indent: usize) -> Vec<u8> {
    let value = root.to_json_value();
    if indent == 0 {
        return serde_json::to_vec(&value).unwrap_or_default();
    }
    let pad = " ".repeat(indent);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(pad.as_bytes());
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    if value.serialize(&mut ser).is_err() {
        return serde_json::to_vec(&value).unwrap_or_default();
    }
    out
}

/// The indent a node was parsed at, or `fallback` for synthesized nodes.
fn block_indent(node: &Node, fallback: usize) -> usize {
    match node.column() {
        0 => fallback,
        col => col - 1,
    }
}

fn push_indent(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push(' ');
    }
}

fn push_comment_block(out: &mut String, comment: &str, indent: usize) {
    for line in comment.split('\n') {
        push_indent(out, indent);
        if line.is_empty() {
            out.push_str("#\n");
        } else {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
    }
}

fn push_line_comment(out: &mut String, node: &Node) {
    if let Some(comment) = &node.borrow().line_comment {
        out.push_str(" # ");
        out.push_str(comment);
    }
}

/// Emits a node in block context, starting at column `indent`.
fn emit_block(out: &mut String, node: &Node, indent: usize) {
    match node.kind() {
        Kind::Mapping if node.style() == Style::Flow => {
            push_indent(out, indent);
            out.push_str(&flow_string(node));
            out.push('\n');
        }
        Kind::Mapping => emit_block_mapping(out, node, indent),
        Kind::Sequence if node.style() == Style::Flow => {
            push_indent(out, indent);
            out.push_str(&flow_string(node));
            out.push('\n');
        }
        Kind::Sequence => emit_block_sequence(out, node, indent),
        Kind::Scalar | Kind::Alias => {
            push_indent(out, indent);
            out.push_str(&scalar_token(node));
            push_line_comment(out, node);
            out.push('\n');
        }
        Kind::Document => emit_block(out, &node.unwrap_document(), indent),
    }
}

fn emit_block_mapping(out: &mut String, map: &Node, indent: usize) {
    for (key, value) in map.entries() {
        if let Some(head) = &key.borrow().head_comment {
            push_comment_block(out, head, indent);
        }
        push_indent(out, indent);
        out.push_str(&scalar_token(&key));
        out.push(':');
        emit_entry_value(out, &value, indent);
    }
}

fn emit_block_sequence(out: &mut String, seq: &Node, indent: usize) {
    for item in seq.items() {
        if let Some(head) = &item.borrow().head_comment {
            push_comment_block(out, head, indent);
        }
        push_indent(out, indent);
        out.push('-');
        match item.kind() {
            Kind::Scalar | Kind::Alias => match item.style() {
                Style::Literal | Style::Folded => emit_block_scalar(out, &item, indent + 2),
                _ => {
                    out.push(' ');
                    out.push_str(&scalar_token(&item));
                    push_line_comment(out, &item);
                    out.push('\n');
                }
            },
            _ if item.style() == Style::Flow || item.borrow().children.is_empty() => {
                out.push(' ');
                out.push_str(&flow_string(&item));
                push_line_comment(out, &item);
                out.push('\n');
            }
            Kind::Mapping => {
                // Compact notation: the first entry shares the dash line.
                out.push(' ');
                let inner = block_indent(&item, indent + 2);
                let mut nested = String::new();
                emit_block_mapping(&mut nested, &item, inner);
                push_compact(out, &nested, indent + 1);
            }
            Kind::Sequence => {
                out.push(' ');
                let inner = block_indent(&item, indent + 2);
                let mut nested = String::new();
                emit_block_sequence(&mut nested, &item, inner);
                push_compact(out, &nested, indent + 1);
            }
            Kind::Document => {}
        }
    }
}

/// Splices nested block output onto a dash line: the first line sheds its
/// indent, the rest keep theirs.
fn push_compact(out: &mut String, nested: &str, _dash_col: usize) {
    let mut lines = nested.split_inclusive('\n');
    if let Some(first) = lines.next() {
        out.push_str(first.trim_start_matches(' '));
    }
    for line in lines {
        out.push_str(line);
    }
}

/// Emits the value part of `key:`, inline for scalars and flow
/// collections, on following lines for block collections.
fn emit_entry_value(out: &mut String, value: &Node, key_indent: usize) {
    match value.kind() {
        Kind::Scalar | Kind::Alias => match value.style() {
            Style::Literal | Style::Folded => {
                emit_block_scalar(out, value, key_indent + 2);
            }
            _ => {
                let token = scalar_token(value);
                if !token.is_empty() {
                    out.push(' ');
                    out.push_str(&token);
                }
                push_line_comment(out, value);
                out.push('\n');
            }
        },
        Kind::Mapping | Kind::Sequence => {
            let data = value.borrow();
            if data.style == Style::Flow || data.children.is_empty() {
                drop(data);
                out.push(' ');
                out.push_str(&flow_string(value));
                push_line_comment(out, value);
                out.push('\n');
            } else {
                drop(data);
                push_line_comment(out, value);
                out.push('\n');
                emit_block(out, value, block_indent(value, key_indent + 2));
            }
        }
        Kind::Document => {
            out.push('\n');
            emit_block(out, &value.unwrap_document(), key_indent + 2);
        }
    }
}

/// Emits `|` / `>` block scalars with their chomping indicator inferred
/// from the stored text.
fn emit_block_scalar(out: &mut String, node: &Node, content_indent: usize) {
    let data = node.borrow();
    out.push(' ');
    out.push(if data.style == Style::Literal { '|' } else { '>' });
    let text = data.value.as_str();
    if !text.ends_with('\n') {
        out.push('-');
    } else if text.ends_with("\n\n") {
        out.push('+');
    }
    if let Some(comment) = &data.line_comment {
        out.push_str(" # ");
        out.push_str(comment);
    }
    out.push('\n');
    let body = text.strip_suffix('\n').unwrap_or(text);
    if body.is_empty() {
        return;
    }
    for line in body.split('\n') {
        if line.is_empty() {
            out.push('\n');
        } else {
            push_indent(out, content_indent);
            out.push_str(line);
            out.push('\n');
        }
    }
}

/// Renders a node as a single-line flow value.
fn flow_string(node: &Node) -> String {
    match node.kind() {
        Kind::Mapping => format!(
            "{{{}}}",
            node.entries()
                .into_iter()
                .map(|(k, v)| format!("{}: {}", scalar_token(&k), flow_string(&v)))
                .format(", "),
        ),
        Kind::Sequence => format!(
            "[{}]",
            node.items().iter().map(flow_string).format(", "),
        ),
        Kind::Scalar | Kind::Alias | Kind::Document => scalar_token(node),
    }
}

/// Renders a scalar in its recorded style.
fn scalar_token(node: &Node) -> String {
    let data = node.borrow();
    if data.kind == Kind::Alias {
        return format!("*{}", data.value);
    }
    let anchor = data
        .anchor
        .as_ref()
        .map(|name| format!("&{name} "))
        .unwrap_or_default();
    let body = match data.style {
        Style::SingleQuoted => format!("'{}'", data.value.replace('\'', "''")),
        Style::DoubleQuoted => format!("\"{}\"", escape_double(&data.value)),
        // Block scalars are handled by their emitters; fall back to a
        // quoted form if one ends up in a flow position.
        Style::Literal | Style::Folded => format!("\"{}\"", escape_double(&data.value)),
        Style::Plain | Style::Flow => data.value.clone(),
    };
    format!("{anchor}{body}")
}

fn escape_double(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::super::{parse, Tag};
    use super::*;
    use indoc::indoc;

    fn round_trip(src: &str) -> String {
        let doc = parse(src).unwrap();
        String::from_utf8(render_yaml(&doc)).unwrap()
    }

    #[test]
    fn byte_identical_round_trip() {
        let src = indoc! {"
            openapi: 3.1.0
            info:
              title: This is a title
              contact:
                name: Some Person
                email: some@emailaddress.com
        "};
        assert_eq!(round_trip(src), src);
    }

    #[test]
    fn comments_survive() {
        let src = indoc! {"
            # Root comment.
            openapi: 3.0.1 # trailing
            info:
              # Nested head comment.
              title: Example
        "};
        assert_eq!(round_trip(src), src);
    }

    #[test]
    fn sequences_round_trip() {
        let src = indoc! {"
            tags:
              - name: pets
                description: All pets
              - name: stores
            servers:
              - url: https://example.com
        "};
        assert_eq!(round_trip(src), src);
    }

    #[test]
    fn zero_indented_sequences_round_trip() {
        let src = indoc! {"
            tags:
            - name: pets
            - name: stores
        "};
        assert_eq!(round_trip(src), src);
    }

    #[test]
    fn styles_survive() {
        let src = indoc! {"
            single: 'hello there'
            double: \"line\\nbreak\"
            block: |
              literal text
              more text
            flow: {a: 1, b: [x, y]}
        "};
        assert_eq!(round_trip(src), src);
    }

    #[test]
    fn reparse_is_structurally_equal() {
        let src = indoc! {"
            openapi: 3.1.0
            paths:
              /pets:
                get:
                  operationId: listPets
                  responses:
                    '200':
                      description: ok
            components:
              schemas:
                Pet:
                  type: object
                  properties:
                    name:
                      type: string
        "};
        let first = parse(src).unwrap();
        let rendered = String::from_utf8(render_yaml(&first)).unwrap();
        let second = parse(&rendered).unwrap();
        assert!(first.structural_eq(&second));
        // Key order holds across the round trip.
        let keys: Vec<_> = second
            .unwrap_document()
            .entries()
            .into_iter()
            .map(|(k, _)| k.value())
            .collect();
        assert_eq!(keys, ["openapi", "paths", "components"]);
    }

    #[test]
    fn mutated_scalar_renders_in_place() {
        let src = indoc! {"
            openapi: 3.1.0
            info:
              title: This is a title
              contact:
                name: Some Person
                email: some@emailaddress.com
        "};
        let doc = parse(src).unwrap();
        let root = doc.unwrap_document();
        root.get("info")
            .unwrap()
            .get("title")
            .unwrap()
            .set_scalar(Tag::Str, "A new title for a useless spec");
        root.get("info")
            .unwrap()
            .get("contact")
            .unwrap()
            .get("name")
            .unwrap()
            .set_scalar(Tag::Str, "Buckaroo");
        let rendered = String::from_utf8(render_yaml(&doc)).unwrap();
        assert_eq!(
            rendered,
            indoc! {"
                openapi: 3.1.0
                info:
                  title: A new title for a useless spec
                  contact:
                    name: Buckaroo
                    email: some@emailaddress.com
            "},
        );
    }

    #[test]
    fn json_rendering() {
        let doc = parse("name: scout\ncounts:\n  - 1\n  - 2\n").unwrap();
        let compact = String::from_utf8(render_json(&doc, 0)).unwrap();
        assert_eq!(compact, r#"{"name":"scout","counts":[1,2]}"#);
        let pretty = String::from_utf8(render_json(&doc, 2)).unwrap();
        assert_eq!(
            pretty,
            indoc! {r#"
                {
                  "name": "scout",
                  "counts": [
                    1,
                    2
                  ]
                }"#},
        );
    }

    #[test]
    fn null_values_render_bare() {
        let src = indoc! {"
            explicit: null
            absent:
            tilde: ~
        "};
        let doc = parse(src).unwrap();
        let rendered = String::from_utf8(render_yaml(&doc)).unwrap();
        assert_eq!(rendered, "explicit: null\nabsent:\ntilde: ~\n");
    }
}
