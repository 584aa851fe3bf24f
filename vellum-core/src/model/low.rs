//! A minimal position-preserving view of a document's root: the version
//! scalar, the `info` block, and proxies for the component schemas. The
//! full per-dialect mirrors live outside this crate; this is the low model
//! the facade exposes and the mirrors drop down to.

use indexmap::IndexMap;

use crate::cst::Node;

use super::{
    build::{expect_mapping, map_of_nodes, object_field, scalar_field},
    BuilderError, FromCst, NodeRef,
};

#[derive(Debug)]
pub struct LowDocument {
    /// The `swagger` / `openapi` / `asyncapi` / `arazzo` version scalar.
    pub version: Option<NodeRef<String>>,
    pub info: Option<LowInfo>,
    /// The `paths` subtree, untyped.
    pub paths: Option<Node>,
    /// The `webhooks` subtree (OpenAPI 3.1), untyped.
    pub webhooks: Option<Node>,
    pub tags: Vec<LowTag>,
    pub servers: Vec<LowServer>,
    /// Arazzo `sourceDescriptions`, in document order.
    pub source_descriptions: Vec<LowSourceDescription>,
    /// Arazzo `workflows`, untyped.
    pub workflows: Vec<Node>,
    /// Component schemas by name, in document order.
    pub schemas: IndexMap<String, SchemaProxy>,
    root: Node,
}

impl LowDocument {
    /// Builds the low view over `root`. `discriminator` names the version
    /// key; `schemas_pointer` is walked key-by-key to the schema table
    /// (`components` / `schemas` for 3.x, `definitions` for 2.0).
    pub fn build(
        root: &Node,
        discriminator: &str,
        schemas_path: &[&str],
        merge_referenced_properties: bool,
    ) -> Result<Self, BuilderError> {
        let root = root.unwrap_document();
        expect_mapping(&root)?;
        let version = scalar_field(&root, discriminator)?;
        let info = match object_field(&root, "info") {
            Some((_, node)) => Some(LowInfo::from_cst(&node)?),
            None => None,
        };
        let paths = root.get("paths");
        let webhooks = root.get("webhooks");
        let tags = typed_sequence::<LowTag>(&root, "tags")?;
        let servers = typed_sequence::<LowServer>(&root, "servers")?;
        let source_descriptions =
            typed_sequence::<LowSourceDescription>(&root, "sourceDescriptions")?;
        let workflows = match root.get("workflows") {
            Some(node) if node.is_sequence() => node.items(),
            _ => Vec::new(),
        };

        let mut schema_table = if schemas_path.is_empty() {
            None
        } else {
            Some(root.clone())
        };
        for (idx, step) in schemas_path.iter().enumerate() {
            schema_table = match schema_table {
                Some(node) if idx + 1 == schemas_path.len() => {
                    map_of_nodes(&node, step)?;
                    node.get(step)
                }
                Some(node) => node.get(step),
                None => None,
            };
        }
        let schemas = match schema_table {
            Some(table) if table.is_mapping() => table
                .entries()
                .into_iter()
                .map(|(key, value)| {
                    let name = key.value();
                    (
                        name.clone(),
                        SchemaProxy::new(name, key, value, merge_referenced_properties, &root),
                    )
                })
                .collect(),
            _ => IndexMap::new(),
        };

        Ok(Self {
            version,
            info,
            paths,
            webhooks,
            tags,
            servers,
            source_descriptions,
            workflows,
            schemas,
            root,
        })
    }

    pub fn root(&self) -> &Node {
        &self.root
    }
}

/// Builds each item of an optional sequence into a typed value.
fn typed_sequence<T: FromCst>(root: &Node, key: &str) -> Result<Vec<T>, BuilderError> {
    match root.get(key) {
        Some(node) if node.is_sequence() => node.items().iter().map(T::from_cst).collect(),
        _ => Ok(Vec::new()),
    }
}

#[derive(Debug)]
pub struct LowTag {
    pub name: Option<NodeRef<String>>,
    pub description: Option<NodeRef<String>>,
    node: Node,
}

impl LowTag {
    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl FromCst for LowTag {
    fn from_cst(node: &Node) -> Result<Self, BuilderError> {
        expect_mapping(node)?;
        Ok(Self {
            name: scalar_field(node, "name")?,
            description: scalar_field(node, "description")?,
            node: node.clone(),
        })
    }
}

/// One Arazzo `sourceDescriptions` entry.
#[derive(Debug)]
pub struct LowSourceDescription {
    pub name: Option<NodeRef<String>>,
    pub url: Option<NodeRef<String>>,
    /// The `type` field (`openapi` or `arazzo`).
    pub kind: Option<NodeRef<String>>,
    node: Node,
}

impl LowSourceDescription {
    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl FromCst for LowSourceDescription {
    fn from_cst(node: &Node) -> Result<Self, BuilderError> {
        expect_mapping(node)?;
        Ok(Self {
            name: scalar_field(node, "name")?,
            url: scalar_field(node, "url")?,
            kind: scalar_field(node, "type")?,
            node: node.clone(),
        })
    }
}

#[derive(Debug)]
pub struct LowServer {
    pub url: Option<NodeRef<String>>,
    pub description: Option<NodeRef<String>>,
    /// The `variables` subtree, untyped.
    pub variables: Option<Node>,
    node: Node,
}

impl LowServer {
    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl FromCst for LowServer {
    fn from_cst(node: &Node) -> Result<Self, BuilderError> {
        expect_mapping(node)?;
        Ok(Self {
            url: scalar_field(node, "url")?,
            description: scalar_field(node, "description")?,
            variables: node.get("variables"),
            node: node.clone(),
        })
    }
}

#[derive(Debug)]
pub struct LowInfo {
    pub title: Option<NodeRef<String>>,
    pub description: Option<NodeRef<String>>,
    pub terms_of_service: Option<NodeRef<String>>,
    pub version: Option<NodeRef<String>>,
    pub contact: Option<LowContact>,
    pub license: Option<LowLicense>,
    node: Node,
}

impl LowInfo {
    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl FromCst for LowInfo {
    fn from_cst(node: &Node) -> Result<Self, BuilderError> {
        expect_mapping(node)?;
        Ok(Self {
            title: scalar_field(node, "title")?,
            description: scalar_field(node, "description")?,
            terms_of_service: scalar_field(node, "termsOfService")?,
            version: scalar_field(node, "version")?,
            contact: match object_field(node, "contact") {
                Some((_, contact)) => Some(LowContact::from_cst(&contact)?),
                None => None,
            },
            license: match object_field(node, "license") {
                Some((_, license)) => Some(LowLicense::from_cst(&license)?),
                None => None,
            },
            node: node.clone(),
        })
    }
}

#[derive(Debug)]
pub struct LowContact {
    pub name: Option<NodeRef<String>>,
    pub url: Option<NodeRef<String>>,
    pub email: Option<NodeRef<String>>,
    node: Node,
}

impl LowContact {
    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl FromCst for LowContact {
    fn from_cst(node: &Node) -> Result<Self, BuilderError> {
        expect_mapping(node)?;
        Ok(Self {
            name: scalar_field(node, "name")?,
            url: scalar_field(node, "url")?,
            email: scalar_field(node, "email")?,
            node: node.clone(),
        })
    }
}

#[derive(Debug)]
pub struct LowLicense {
    pub name: Option<NodeRef<String>>,
    pub identifier: Option<NodeRef<String>>,
    pub url: Option<NodeRef<String>>,
    node: Node,
}

impl LowLicense {
    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl FromCst for LowLicense {
    fn from_cst(node: &Node) -> Result<Self, BuilderError> {
        expect_mapping(node)?;
        Ok(Self {
            name: scalar_field(node, "name")?,
            identifier: scalar_field(node, "identifier")?,
            url: scalar_field(node, "url")?,
            node: node.clone(),
        })
    }
}

/// A named schema as the model sees it: either an inline definition, or a
/// still-unresolved reference (when external resolution was skipped or
/// failed).
#[derive(Debug)]
pub struct SchemaProxy {
    name: String,
    key_node: Node,
    node: Node,
    /// The `$ref` target recorded at build time, if the schema was one.
    reference: Option<String>,
    merge_referenced_properties: bool,
    document_root: Node,
}

impl SchemaProxy {
    fn new(
        name: String,
        key_node: Node,
        node: Node,
        merge_referenced_properties: bool,
        document_root: &Node,
    ) -> Self {
        let reference = node.get("$ref").map(|r| r.value());
        Self {
            name,
            key_node,
            node,
            reference,
            merge_referenced_properties,
            document_root: document_root.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_node(&self) -> &Node {
        &self.key_node
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Whether this schema was declared as a `$ref`.
    pub fn is_reference(&self) -> bool {
        self.reference.is_some()
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// The schema definition, or `None` while it's still an unresolved
    /// reference (the `$ref` key survives in the tree).
    pub fn schema(&self) -> Option<Node> {
        if self.node.get("$ref").is_some() {
            None
        } else {
            Some(self.node.clone())
        }
    }

    /// The schema's properties in document order. With
    /// `merge_referenced_properties`, properties of a locally-referenced
    /// target schema are unioned into the view without touching the tree.
    pub fn properties(&self) -> IndexMap<String, Node> {
        let mut out = IndexMap::new();
        collect_properties(&self.node, &mut out);
        if self.merge_referenced_properties {
            if let Some(target) = self
                .node
                .get("$ref")
                .map(|r| r.value())
                .filter(|r| r.starts_with("#/"))
                .and_then(|r| {
                    let pointer = vellum_pointer::JsonPointer::parse_owned(&r[1..]).ok()?;
                    self.document_root.resolve(&pointer).ok()
                })
            {
                collect_properties(&target, &mut out);
            }
        }
        out
    }
}

fn collect_properties(schema: &Node, out: &mut IndexMap<String, Node>) {
    if let Some(properties) = schema.get("properties") {
        for (key, value) in properties.entries() {
            out.entry(key.value()).or_insert(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cst;
    use indoc::indoc;

    fn v3_document(src: &str) -> LowDocument {
        let doc = cst::parse(src).unwrap();
        LowDocument::build(&doc, "openapi", &["components", "schemas"], false).unwrap()
    }

    #[test]
    fn builds_info_block() {
        let low = v3_document(indoc! {"
            openapi: 3.1.0
            info:
              title: This is a title
              contact:
                name: Some Person
                email: some@emailaddress.com
        "});
        assert_eq!(low.version.as_ref().unwrap().value(), "3.1.0");
        let info = low.info.as_ref().unwrap();
        assert_eq!(info.title.as_ref().unwrap().value(), "This is a title");
        let contact = info.contact.as_ref().unwrap();
        assert_eq!(contact.name.as_ref().unwrap().value(), "Some Person");
        assert_eq!(
            contact.email.as_ref().unwrap().value(),
            "some@emailaddress.com",
        );
    }

    #[test]
    fn schema_proxies_keep_order() {
        let low = v3_document(indoc! {"
            openapi: 3.0.1
            components:
              schemas:
                Zebra:
                  type: object
                Aardvark:
                  type: string
        "});
        let names: Vec<_> = low.schemas.keys().cloned().collect();
        assert_eq!(names, ["Zebra", "Aardvark"]);
        let zebra = &low.schemas["Zebra"];
        assert!(!zebra.is_reference());
        assert!(zebra.schema().is_some());
    }

    #[test]
    fn unresolved_reference_schema() {
        let low = v3_document(indoc! {"
            openapi: 3.0.1
            components:
              schemas:
                Pet:
                  $ref: './models/pet.yaml'
                Local:
                  type: object
        "});
        let pet = &low.schemas["Pet"];
        assert!(pet.is_reference());
        assert_eq!(pet.reference(), Some("./models/pet.yaml"));
        assert!(pet.schema().is_none());
        // Sibling schemas stay fully accessible.
        assert!(low.schemas["Local"].schema().is_some());
    }

    #[test]
    fn merged_properties_view() {
        let doc = cst::parse(indoc! {"
            openapi: 3.1.0
            components:
              schemas:
                Base:
                  type: object
                  properties:
                    id:
                      type: string
                Extended:
                  $ref: '#/components/schemas/Base'
                  properties:
                    extra:
                      type: integer
        "})
        .unwrap();
        let low = LowDocument::build(&doc, "openapi", &["components", "schemas"], true).unwrap();
        let extended = &low.schemas["Extended"];
        let keys: Vec<_> = extended.properties().keys().cloned().collect();
        // Sibling keys come first, in insertion order; merged keys follow.
        assert_eq!(keys, ["extra", "id"]);
    }

    #[test]
    fn swagger_definitions_table() {
        let doc = cst::parse(indoc! {"
            swagger: '2.0'
            definitions:
              Pet:
                type: object
        "})
        .unwrap();
        let low = LowDocument::build(&doc, "swagger", &["definitions"], false).unwrap();
        assert!(low.schemas.contains_key("Pet"));
    }
}
