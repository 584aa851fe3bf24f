//! The low model: typed values that never lose sight of the CST nodes they
//! came from. Mutating a [`NodeRef`] rewrites the underlying scalar, so the
//! next render reflects the change without reordering anything.

mod build;
mod low;

pub use build::{
    map_of, map_of_nodes, object_field, ref_or_object_field, scalar_field, scalar_list_field,
    BuilderError, FromCst,
};
pub use low::{
    LowContact, LowDocument, LowInfo, LowLicense, LowServer, LowSourceDescription, LowTag,
    SchemaProxy,
};

use crate::cst::{Node, Tag};

/// A typed primitive paired with the key and value nodes it was read from.
#[derive(Clone, Debug)]
pub struct NodeRef<T> {
    value: T,
    key_node: Node,
    value_node: Node,
    is_reference: bool,
    reference: String,
}

impl<T> NodeRef<T> {
    pub(crate) fn new(value: T, key_node: Node, value_node: Node) -> Self {
        Self {
            value,
            key_node,
            value_node,
            is_reference: false,
            reference: String::new(),
        }
    }

    pub(crate) fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.is_reference = true;
        self.reference = reference.into();
        self
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn key_node(&self) -> &Node {
        &self.key_node
    }

    pub fn value_node(&self) -> &Node {
        &self.value_node
    }

    pub fn is_reference(&self) -> bool {
        self.is_reference
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl<T: ScalarValue> NodeRef<T> {
    /// Replaces the typed value and the CST scalar behind it in one step.
    pub fn mutate(&mut self, new: T) {
        self.value_node.set_scalar(T::TAG, new.to_scalar_text());
        self.value = new;
    }
}

impl NodeRef<String> {
    /// Convenience for the common string case.
    pub fn mutate_str(&mut self, new: impl Into<String>) {
        self.mutate(new.into());
    }
}

/// A primitive that can be read from and written back to a scalar node.
pub trait ScalarValue: Sized {
    const TAG: Tag;
    const EXPECTED: &'static str;

    fn from_scalar(node: &Node) -> Option<Self>;
    fn to_scalar_text(&self) -> String;
}

impl ScalarValue for String {
    const TAG: Tag = Tag::Str;
    const EXPECTED: &'static str = "string";

    fn from_scalar(node: &Node) -> Option<Self> {
        node.is_scalar().then(|| node.value())
    }

    fn to_scalar_text(&self) -> String {
        self.clone()
    }
}

impl ScalarValue for i64 {
    const TAG: Tag = Tag::Int;
    const EXPECTED: &'static str = "integer";

    fn from_scalar(node: &Node) -> Option<Self> {
        (node.is_scalar() && node.tag() == Tag::Int)
            .then(|| node.value().parse().ok())
            .flatten()
    }

    fn to_scalar_text(&self) -> String {
        self.to_string()
    }
}

impl ScalarValue for f64 {
    const TAG: Tag = Tag::Float;
    const EXPECTED: &'static str = "number";

    fn from_scalar(node: &Node) -> Option<Self> {
        (node.is_scalar() && matches!(node.tag(), Tag::Float | Tag::Int))
            .then(|| node.value().parse().ok())
            .flatten()
    }

    fn to_scalar_text(&self) -> String {
        self.to_string()
    }
}

impl ScalarValue for bool {
    const TAG: Tag = Tag::Bool;
    const EXPECTED: &'static str = "boolean";

    fn from_scalar(node: &Node) -> Option<Self> {
        if !node.is_scalar() || node.tag() != Tag::Bool {
            return None;
        }
        match node.value().as_str() {
            "true" | "True" | "TRUE" => Some(true),
            "false" | "False" | "FALSE" => Some(false),
            _ => None,
        }
    }

    fn to_scalar_text(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cst;

    #[test]
    fn mutate_updates_the_tree() {
        let doc = cst::parse("info:\n  title: Old title\n").unwrap();
        let root = doc.unwrap_document();
        let info = root.get("info").unwrap();
        let mut title: NodeRef<String> = scalar_field(&info, "title").unwrap().unwrap();
        assert_eq!(title.value(), "Old title");

        title.mutate_str("New title");
        assert_eq!(title.value(), "New title");
        assert_eq!(
            root.get("info").unwrap().get("title").unwrap().value(),
            "New title",
        );
        // Provenance survives mutation.
        assert_eq!(title.value_node().line(), 2);
    }

    #[test]
    fn typed_scalars() {
        let doc = cst::parse("count: 3\nratio: 0.5\nenabled: true\n").unwrap();
        let root = doc.unwrap_document();
        let count: NodeRef<i64> = scalar_field(&root, "count").unwrap().unwrap();
        assert_eq!(*count.value(), 3);
        let ratio: NodeRef<f64> = scalar_field(&root, "ratio").unwrap().unwrap();
        assert_eq!(*ratio.value(), 0.5);
        let enabled: NodeRef<bool> = scalar_field(&root, "enabled").unwrap().unwrap();
        assert!(*enabled.value());
    }

    #[test]
    fn integer_widens_to_float() {
        let doc = cst::parse("ratio: 2\n").unwrap();
        let root = doc.unwrap_document();
        let ratio: NodeRef<f64> = scalar_field(&root, "ratio").unwrap().unwrap();
        assert_eq!(*ratio.value(), 2.0);
    }
}
