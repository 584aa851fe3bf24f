//! Field-shape helpers for populating typed low-model structs from a
//! mapping node. Absent keys leave fields at their default; present keys
//! with the wrong shape are a [`BuilderError::TypeMismatch`].

use indexmap::IndexMap;

use crate::cst::Node;

use super::{NodeRef, ScalarValue};

/// A typed value that can be built from a mapping node.
pub trait FromCst: Sized {
    fn from_cst(node: &Node) -> Result<Self, BuilderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error("expected {expected} for {key:?}, found {found} at line {line}, column {column}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: String,
        line: usize,
        column: usize,
    },
    #[error("expected a mapping to build from, found {found} at line {line}, column {column}")]
    NotAMapping {
        found: String,
        line: usize,
        column: usize,
    },
}

impl BuilderError {
    fn mismatch(key: &str, expected: &'static str, node: &Node) -> Self {
        Self::TypeMismatch {
            key: key.to_owned(),
            expected,
            found: describe(node),
            line: node.line(),
            column: node.column(),
        }
    }
}

fn describe(node: &Node) -> String {
    use crate::cst::Kind;
    match node.kind() {
        Kind::Mapping => "a mapping".to_owned(),
        Kind::Sequence => "a sequence".to_owned(),
        Kind::Scalar => format!("the scalar {:?}", node.value()),
        Kind::Alias => format!("the alias *{}", node.value()),
        Kind::Document => "a document".to_owned(),
    }
}

/// Requires `node` to be a mapping, the precondition of every builder.
pub fn expect_mapping(node: &Node) -> Result<(), BuilderError> {
    if node.is_mapping() {
        Ok(())
    } else {
        Err(BuilderError::NotAMapping {
            found: describe(node),
            line: node.line(),
            column: node.column(),
        })
    }
}

/// Reads an optional typed scalar field.
pub fn scalar_field<T: ScalarValue>(
    map: &Node,
    key: &str,
) -> Result<Option<NodeRef<T>>, BuilderError> {
    let Some((key_node, value_node)) = map.get_entry(key) else {
        return Ok(None);
    };
    let value =
        T::from_scalar(&value_node).ok_or_else(|| BuilderError::mismatch(key, T::EXPECTED, &value_node))?;
    Ok(Some(NodeRef::new(value, key_node, value_node)))
}

/// Reads an optional list of typed scalars. The [`NodeRef`]'s value node is
/// the sequence itself.
pub fn scalar_list_field<T: ScalarValue>(
    map: &Node,
    key: &str,
) -> Result<Option<NodeRef<Vec<T>>>, BuilderError> {
    let Some((key_node, value_node)) = map.get_entry(key) else {
        return Ok(None);
    };
    if !value_node.is_sequence() {
        return Err(BuilderError::mismatch(key, "a sequence", &value_node));
    }
    let values = value_node
        .items()
        .iter()
        .map(|item| {
            T::from_scalar(item).ok_or_else(|| BuilderError::mismatch(key, T::EXPECTED, item))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(NodeRef::new(values, key_node, value_node)))
}

/// Reads an opaque subtree, keeping the key and value nodes as they are.
pub fn object_field(map: &Node, key: &str) -> Option<(Node, Node)> {
    map.get_entry(key)
}

/// Reads a field that may be declared as a `$ref` mapping instead of an
/// inline value. When it is, the returned [`NodeRef`] carries the
/// reference string and reports `is_reference()`.
pub fn ref_or_object_field(
    map: &Node,
    key: &str,
) -> Result<Option<NodeRef<Node>>, BuilderError> {
    let Some((key_node, value_node)) = map.get_entry(key) else {
        return Ok(None);
    };
    if !value_node.is_mapping() {
        return Err(BuilderError::mismatch(key, "a mapping", &value_node));
    }
    let node_ref = NodeRef::new(value_node.clone(), key_node, value_node.clone());
    match value_node.get("$ref") {
        Some(target) if target.is_scalar() => {
            Ok(Some(node_ref.with_reference(target.value())))
        }
        _ => Ok(Some(node_ref)),
    }
}

/// Reads an ordered map of string keys to opaque subtrees.
pub fn map_of_nodes(
    map: &Node,
    key: &str,
) -> Result<Option<IndexMap<String, (Node, Node)>>, BuilderError> {
    let Some((_, value_node)) = map.get_entry(key) else {
        return Ok(None);
    };
    if !value_node.is_mapping() {
        return Err(BuilderError::mismatch(key, "a mapping", &value_node));
    }
    Ok(Some(
        value_node
            .entries()
            .into_iter()
            .map(|(k, v)| (k.value(), (k, v)))
            .collect(),
    ))
}

/// Reads an ordered map of string keys to typed values.
pub fn map_of<T: FromCst>(
    map: &Node,
    key: &str,
) -> Result<Option<IndexMap<String, T>>, BuilderError> {
    let Some((_, value_node)) = map.get_entry(key) else {
        return Ok(None);
    };
    if !value_node.is_mapping() {
        return Err(BuilderError::mismatch(key, "a mapping", &value_node));
    }
    value_node
        .entries()
        .into_iter()
        .map(|(k, v)| Ok((k.value(), T::from_cst(&v)?)))
        .collect::<Result<IndexMap<_, _>, _>>()
        .map(Some)
}
