//! The concrete syntax tree.
//!
//! Every node remembers where it came from: line, column, scalar style, and
//! the comments that surrounded it in the source. Mapping children are kept
//! as an alternating key/value sequence in textual order, which is what lets
//! the renderer reproduce a document without shuffling unrelated content.
//!
//! Nodes are reference-counted handles, so the spec index, the low model and
//! the resolver can all address the same node without copying. The tree is
//! not thread-safe; a document and everything built from it stay on one
//! thread.

mod parse;
mod render;

use std::{
    cell::{Ref, RefCell, RefMut},
    fmt,
    rc::Rc,
};

pub use parse::{parse, parse_bytes, SyntaxError};
pub use render::{render_json, render_yaml};

use vellum_pointer::{JsonPointer, PointerSegment};

/// What a [`Node`] is.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    /// The document wrapper; has exactly one child.
    Document,
    /// An ordered mapping; children alternate key, value, key, value.
    Mapping,
    /// An ordered sequence.
    Sequence,
    /// A scalar leaf.
    Scalar,
    /// An alias (`*name`) referring back to an anchored node.
    Alias,
}

/// The resolved tag of a node. Scalars carry one of the five core scalar
/// tags; collections carry [`Tag::Map`] or [`Tag::Seq`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tag {
    Str,
    Int,
    Float,
    Bool,
    Null,
    Map,
    Seq,
}

/// The source style of a node, used to re-render it the way it was written.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Style {
    /// Plain (unquoted) scalar, or a block collection.
    #[default]
    Plain,
    SingleQuoted,
    DoubleQuoted,
    /// `|` block scalar.
    Literal,
    /// `>` block scalar.
    Folded,
    /// Flow collection (`{...}` / `[...]`), also how all JSON input parses.
    Flow,
}

/// The data behind one node. Access goes through [`Node`].
#[derive(Debug)]
pub struct NodeData {
    pub kind: Kind,
    pub tag: Tag,
    /// Scalar text (decoded), or the referent name for an alias.
    pub value: String,
    /// Anchor name, if the node carried `&name`.
    pub anchor: Option<String>,
    pub style: Style,
    /// 1-based source line. Zero for synthesized nodes.
    pub line: usize,
    /// 1-based source column. Zero for synthesized nodes.
    pub column: usize,
    pub head_comment: Option<String>,
    pub line_comment: Option<String>,
    pub foot_comment: Option<String>,
    /// Mapping: alternating key/value. Sequence: items. Document: one child.
    pub children: Vec<Node>,
}

impl NodeData {
    fn new(kind: Kind, tag: Tag) -> Self {
        Self {
            kind,
            tag,
            value: String::new(),
            anchor: None,
            style: Style::default(),
            line: 0,
            column: 0,
            head_comment: None,
            line_comment: None,
            foot_comment: None,
            children: Vec::new(),
        }
    }
}

/// A reference-counted handle to a CST node.
#[derive(Clone)]
pub struct Node(Rc<RefCell<NodeData>>);

impl Node {
    pub fn scalar(tag: Tag, value: impl Into<String>) -> Self {
        let mut data = NodeData::new(Kind::Scalar, tag);
        data.value = value.into();
        Self(Rc::new(RefCell::new(data)))
    }

    pub fn mapping() -> Self {
        Self(Rc::new(RefCell::new(NodeData::new(Kind::Mapping, Tag::Map))))
    }

    pub fn sequence() -> Self {
        Self(Rc::new(RefCell::new(NodeData::new(
            Kind::Sequence,
            Tag::Seq,
        ))))
    }

    pub fn document(child: Node) -> Self {
        let mut data = NodeData::new(Kind::Document, Tag::Map);
        data.children.push(child);
        Self(Rc::new(RefCell::new(data)))
    }

    pub fn alias(name: impl Into<String>) -> Self {
        let mut data = NodeData::new(Kind::Alias, Tag::Str);
        data.value = name.into();
        Self(Rc::new(RefCell::new(data)))
    }

    pub fn borrow(&self) -> Ref<'_, NodeData> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, NodeData> {
        self.0.borrow_mut()
    }

    pub fn kind(&self) -> Kind {
        self.borrow().kind
    }

    pub fn tag(&self) -> Tag {
        self.borrow().tag
    }

    pub fn style(&self) -> Style {
        self.borrow().style
    }

    pub fn line(&self) -> usize {
        self.borrow().line
    }

    pub fn column(&self) -> usize {
        self.borrow().column
    }

    pub fn value(&self) -> String {
        self.borrow().value.clone()
    }

    pub fn is_mapping(&self) -> bool {
        self.kind() == Kind::Mapping
    }

    pub fn is_sequence(&self) -> bool {
        self.kind() == Kind::Sequence
    }

    pub fn is_scalar(&self) -> bool {
        self.kind() == Kind::Scalar
    }

    /// Two handles to the same underlying node.
    pub fn same(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// A stable identity for hashing nodes in side tables.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// The document's single child, if this is a document node; otherwise
    /// the node itself.
    pub fn unwrap_document(&self) -> Node {
        let data = self.borrow();
        if data.kind == Kind::Document {
            if let Some(child) = data.children.first() {
                return child.clone();
            }
        }
        drop(data);
        self.clone()
    }

    /// Iterates a mapping's `(key, value)` pairs in textual order.
    /// Empty for non-mappings.
    pub fn entries(&self) -> Vec<(Node, Node)> {
        let data = self.borrow();
        if data.kind != Kind::Mapping {
            return Vec::new();
        }
        data.children
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect()
    }

    /// A sequence's items, in order. Empty for non-sequences.
    pub fn items(&self) -> Vec<Node> {
        let data = self.borrow();
        if data.kind != Kind::Sequence {
            return Vec::new();
        }
        data.children.clone()
    }

    /// Looks up a mapping value by scalar key.
    pub fn get(&self, key: &str) -> Option<Node> {
        self.get_entry(key).map(|(_, value)| value)
    }

    /// Looks up a mapping entry by scalar key, returning both nodes.
    pub fn get_entry(&self, key: &str) -> Option<(Node, Node)> {
        let data = self.borrow();
        if data.kind != Kind::Mapping {
            return None;
        }
        data.children.chunks_exact(2).find_map(|pair| {
            let key_data = pair[0].borrow();
            (key_data.kind == Kind::Scalar && key_data.value == key)
                .then(|| (pair[0].clone(), pair[1].clone()))
        })
    }

    /// Appends a key/value pair to a mapping.
    pub fn push_entry(&self, key: Node, value: Node) {
        let mut data = self.borrow_mut();
        debug_assert_eq!(data.kind, Kind::Mapping);
        data.children.push(key);
        data.children.push(value);
    }

    /// Appends an item to a sequence.
    pub fn push_item(&self, item: Node) {
        let mut data = self.borrow_mut();
        debug_assert_eq!(data.kind, Kind::Sequence);
        data.children.push(item);
    }

    /// Rewrites a scalar in place, keeping position, style and comments so
    /// re-rendering only changes this one token.
    pub fn set_scalar(&self, tag: Tag, value: impl Into<String>) {
        let mut data = self.borrow_mut();
        data.kind = Kind::Scalar;
        data.tag = tag;
        data.value = value.into();
        data.children.clear();
    }

    /// Replaces this node's contents with `other`'s, keeping this node's
    /// position and comments. The children are shared, not copied; this is
    /// the substitution step of reference resolution.
    pub fn graft(&self, other: &Node) {
        let (kind, tag, value, style, children) = {
            let src = other.borrow();
            (
                src.kind,
                src.tag,
                src.value.clone(),
                src.style,
                src.children.clone(),
            )
        };
        let mut data = self.borrow_mut();
        data.kind = kind;
        data.tag = tag;
        data.value = value;
        data.style = style;
        data.children = children;
    }

    /// Deep-copies this subtree, including provenance.
    pub fn deep_copy(&self) -> Node {
        let data = self.borrow();
        let copy = NodeData {
            kind: data.kind,
            tag: data.tag,
            value: data.value.clone(),
            anchor: data.anchor.clone(),
            style: data.style,
            line: data.line,
            column: data.column,
            head_comment: data.head_comment.clone(),
            line_comment: data.line_comment.clone(),
            foot_comment: data.foot_comment.clone(),
            children: data.children.iter().map(Node::deep_copy).collect(),
        };
        Node(Rc::new(RefCell::new(copy)))
    }

    /// Resolves an RFC 6901 pointer against this subtree.
    pub fn resolve(&self, pointer: &JsonPointer<'_>) -> Result<Node, ResolveError> {
        let mut current = self.unwrap_document();
        for segment in pointer.segments() {
            current = current.step(segment)?;
        }
        Ok(current)
    }

    fn step(&self, segment: &PointerSegment<'_>) -> Result<Node, ResolveError> {
        let data = self.borrow();
        match data.kind {
            Kind::Mapping => {
                drop(data);
                self.get(segment.as_str()).ok_or_else(|| ResolveError::MissingKey {
                    key: segment.as_str().to_owned(),
                })
            }
            Kind::Sequence => {
                let Some(index) = segment.to_index() else {
                    return Err(ResolveError::BadIndex {
                        segment: segment.as_str().to_owned(),
                    });
                };
                data.children
                    .get(index)
                    .cloned()
                    .ok_or(ResolveError::IndexOutOfBounds {
                        index,
                        len: data.children.len(),
                    })
            }
            Kind::Scalar | Kind::Alias => Err(ResolveError::ScalarTraversal {
                segment: segment.as_str().to_owned(),
            }),
            Kind::Document => {
                drop(data);
                self.unwrap_document().step(segment)
            }
        }
    }

    /// Converts this subtree to an order-preserving JSON value. Styles and
    /// comments don't survive; order does.
    pub fn to_json_value(&self) -> serde_json::Value {
        use serde_json::{Map, Number, Value};
        let data = self.borrow();
        match data.kind {
            Kind::Document => data
                .children
                .first()
                .map(Node::to_json_value)
                .unwrap_or(Value::Null),
            Kind::Mapping => {
                let mut map = Map::new();
                for pair in data.children.chunks_exact(2) {
                    map.insert(pair[0].borrow().value.clone(), pair[1].to_json_value());
                }
                Value::Object(map)
            }
            Kind::Sequence => {
                Value::Array(data.children.iter().map(Node::to_json_value).collect())
            }
            Kind::Scalar => match data.tag {
                Tag::Null => Value::Null,
                Tag::Bool => Value::Bool(data.value == "true" || data.value == "True"),
                Tag::Int => data
                    .value
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::String(data.value.clone())),
                Tag::Float => data
                    .value
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(data.value.clone())),
                Tag::Str | Tag::Map | Tag::Seq => Value::String(data.value.clone()),
            },
            // Aliases render as their name; they're never expanded.
            Kind::Alias => Value::String(format!("*{}", data.value)),
        }
    }

    /// Structural equality: kind, tag, scalar value, and children, ignoring
    /// positions, styles and comments.
    pub fn structural_eq(&self, other: &Node) -> bool {
        let a = self.borrow();
        let b = other.borrow();
        if a.kind != b.kind || a.tag != b.tag {
            return false;
        }
        if a.kind == Kind::Scalar && a.value != b.value {
            return false;
        }
        a.children.len() == b.children.len()
            && a.children
                .iter()
                .zip(b.children.iter())
                .all(|(x, y)| x.structural_eq(y))
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.borrow();
        let mut s = f.debug_struct("Node");
        s.field("kind", &data.kind).field("tag", &data.tag);
        if data.kind == Kind::Scalar || data.kind == Kind::Alias {
            s.field("value", &data.value);
        }
        s.field("line", &data.line)
            .field("column", &data.column)
            .field("children", &data.children.len())
            .finish()
    }
}

/// A failed RFC 6901 traversal.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no key {key:?} in mapping")]
    MissingKey { key: String },
    #[error("{segment:?} is not a sequence index")]
    BadIndex { segment: String },
    #[error("index {index} out of bounds for sequence of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("can't traverse into a scalar with segment {segment:?}")]
    ScalarTraversal { segment: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Node {
        let map = Node::mapping();
        map.push_entry(
            Node::scalar(Tag::Str, "name"),
            Node::scalar(Tag::Str, "scout"),
        );
        let seq = Node::sequence();
        seq.push_item(Node::scalar(Tag::Int, "1"));
        seq.push_item(Node::scalar(Tag::Int, "2"));
        map.push_entry(Node::scalar(Tag::Str, "counts"), seq);
        Node::document(map)
    }

    #[test]
    fn entries_preserve_insertion_order() {
        let root = fixture().unwrap_document();
        let keys: Vec<_> = root
            .entries()
            .into_iter()
            .map(|(k, _)| k.value())
            .collect();
        assert_eq!(keys, ["name", "counts"]);
    }

    #[test]
    fn pointer_resolution() {
        let doc = fixture();
        let pointer = JsonPointer::parse("/counts/1").unwrap();
        let node = doc.resolve(&pointer).unwrap();
        assert_eq!(node.value(), "2");
    }

    #[test]
    fn pointer_errors() {
        let doc = fixture();
        assert!(matches!(
            doc.resolve(&JsonPointer::parse("/missing").unwrap()),
            Err(ResolveError::MissingKey { .. }),
        ));
        assert!(matches!(
            doc.resolve(&JsonPointer::parse("/counts/7").unwrap()),
            Err(ResolveError::IndexOutOfBounds { index: 7, len: 2 }),
        ));
        assert!(matches!(
            doc.resolve(&JsonPointer::parse("/counts/x").unwrap()),
            Err(ResolveError::BadIndex { .. }),
        ));
        assert!(matches!(
            doc.resolve(&JsonPointer::parse("/name/deeper").unwrap()),
            Err(ResolveError::ScalarTraversal { .. }),
        ));
    }

    #[test]
    fn scalar_mutation_is_visible_through_other_handles() {
        let doc = fixture();
        let title = doc
            .resolve(&JsonPointer::parse("/name").unwrap())
            .unwrap();
        title.set_scalar(Tag::Str, "ranger");
        let again = doc
            .resolve(&JsonPointer::parse("/name").unwrap())
            .unwrap();
        assert_eq!(again.value(), "ranger");
        assert!(title.same(&again));
    }

    #[test]
    fn graft_shares_children() {
        let target = fixture().unwrap_document();
        let hole = Node::mapping();
        hole.push_entry(
            Node::scalar(Tag::Str, "$ref"),
            Node::scalar(Tag::Str, "#/x"),
        );
        hole.graft(&target);
        assert_eq!(hole.get("name").unwrap().value(), "scout");
        // Shared, not copied.
        target.get("name").unwrap().set_scalar(Tag::Str, "shared");
        assert_eq!(hole.get("name").unwrap().value(), "shared");
    }

    #[test]
    fn structural_equality_ignores_provenance() {
        let a = fixture();
        let b = fixture();
        {
            let doc = b.unwrap_document();
            let mut data = doc.borrow_mut();
            data.line = 99;
            data.head_comment = Some("different".into());
        }
        assert!(a.structural_eq(&b));
    }

    #[test]
    fn json_value_keeps_order_and_types() {
        let value = fixture().to_json_value();
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"{"name":"scout","counts":[1,2]}"#);
    }
}
