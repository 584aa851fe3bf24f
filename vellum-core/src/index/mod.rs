//! The spec index: one pass over the CST that records every reference,
//! path, operation, schema, enum, parameter, security scheme and
//! polymorphic construct, with ordered iteration and O(1) lookup.
//!
//! The index is the address book; the rolodex is the transport. When the
//! walk meets a reference into another file, it asks the rolodex to open
//! that file and builds a child index over it, recursively. Open failures
//! are caught on the rolodex and the walk keeps going.

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::trace;
use url::Url;

use vellum_pointer::JsonPointer;

use crate::{
    config::DocumentConfig,
    cst::Node,
    rolodex::{normalize, Origin, Rolodex},
};

const METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Where a reference points, judged by its leading characters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Locality {
    /// `#/...` within the same document.
    Local,
    /// A relative or absolute file path.
    File,
    /// An absolute URL.
    Url,
}

/// One discovered `$ref`.
#[derive(Debug)]
pub struct Reference {
    /// The reference exactly as written.
    pub definition: String,
    /// Absolute location plus fragment, unique across the whole document
    /// graph.
    pub full_definition: String,
    /// The absolute location of the target document.
    pub target_location: String,
    /// The `#/...` fragment, if the reference carries one.
    pub fragment: Option<String>,
    pub locality: Locality,
    /// The mapping node that carries the `$ref` key.
    pub node: Node,
    /// The `$ref` value scalar.
    pub ref_node: Node,
    pub parent_node: Option<Node>,
    /// JSON pointer from the owning document's root to [`Self::node`].
    pub path: JsonPointer<'static>,
    pub circular: Cell<bool>,
    /// The index that discovered this reference.
    pub index: Weak<SpecIndex>,
}

impl Reference {
    pub fn is_circular(&self) -> bool {
        self.circular.get()
    }
}

/// A recorded `oneOf` / `anyOf` / `allOf` array.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PolyKind {
    OneOf,
    AnyOf,
    AllOf,
}

impl PolyKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::OneOf => "oneOf",
            Self::AnyOf => "anyOf",
            Self::AllOf => "allOf",
        }
    }
}

#[derive(Debug)]
pub struct PolyEntry {
    pub kind: PolyKind,
    /// Pointer to the mapping holding the keyword.
    pub path: JsonPointer<'static>,
    /// The keyword's sequence node.
    pub node: Node,
}

#[derive(Debug, Default)]
struct IndexData {
    /// First reference per full definition; `IndexMap` keeps discovery
    /// order for iteration and O(1) lookup by key.
    all_refs: IndexMap<String, Rc<Reference>>,
    /// Every reference in discovery order, including repeats of the same
    /// target.
    all_refs_sequenced: Vec<Rc<Reference>>,
    /// Reference lookup by containing-node identity, for graph edges.
    refs_by_node: FxHashMap<usize, Rc<Reference>>,
    /// Sibling-`$ref` schemas (a `$ref` plus other keywords), recorded
    /// when `transform_sibling_refs` is on.
    sibling_refs: Vec<Rc<Reference>>,
    paths: IndexMap<String, Node>,
    webhooks: IndexMap<String, Node>,
    /// Operations keyed by `<path pointer>` (`/paths/~1pets/get`).
    operations: IndexMap<String, Node>,
    /// Schemas keyed by fragment (`#/components/schemas/Pet`, or the
    /// pointer of an inline schema).
    schemas: IndexMap<String, Node>,
    /// Mappings that carry an `enum`, keyed by pointer; the value is the
    /// enum sequence.
    enums: IndexMap<String, Node>,
    parameters: IndexMap<String, Node>,
    security_schemes: IndexMap<String, Node>,
    examples: IndexMap<String, Node>,
    responses: IndexMap<String, Node>,
    request_bodies: IndexMap<String, Node>,
    headers: IndexMap<String, Node>,
    links: IndexMap<String, Node>,
    callbacks: IndexMap<String, Node>,
    tags: Vec<Node>,
    servers: Vec<Node>,
    poly_one_of: Vec<PolyEntry>,
    poly_any_of: Vec<PolyEntry>,
    poly_all_of: Vec<PolyEntry>,
    children: IndexMap<String, Rc<SpecIndex>>,
}

/// The address book for one document.
pub struct SpecIndex {
    location: String,
    origin: Origin,
    root: Node,
    config: Rc<DocumentConfig>,
    rolodex: Weak<Rolodex>,
    data: RefCell<IndexData>,
    hits: Cell<u64>,
    misses: Cell<u64>,
}

impl std::fmt::Debug for SpecIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.borrow();
        f.debug_struct("SpecIndex")
            .field("location", &self.location)
            .field("refs", &data.all_refs_sequenced.len())
            .field("paths", &data.paths.len())
            .field("schemas", &data.schemas.len())
            .field("children", &data.children.len())
            .finish_non_exhaustive()
    }
}

impl SpecIndex {
    /// Builds the root index for a document. `location` is the document's
    /// absolute location (its file path, URL, or a placeholder).
    pub fn build_root(root: &Node, location: impl Into<String>, rolodex: &Rc<Rolodex>) -> Rc<Self> {
        Self::build(root, location.into(), rolodex.root_origin(), rolodex)
    }

    fn build(root: &Node, location: String, origin: Origin, rolodex: &Rc<Rolodex>) -> Rc<Self> {
        let index = Self::shell(root, location, origin, rolodex);
        index.walk_root();
        index
    }

    /// An index that hasn't walked its document yet. Splitting this out
    /// lets a child index be registered on its rolodex entry before the
    /// walk, so reference cycles between files terminate.
    fn shell(root: &Node, location: String, origin: Origin, rolodex: &Rc<Rolodex>) -> Rc<Self> {
        Rc::new(Self {
            location,
            origin,
            root: root.clone(),
            config: rolodex.config_rc(),
            rolodex: Rc::downgrade(rolodex),
            data: RefCell::new(IndexData::default()),
            hits: Cell::new(0),
            misses: Cell::new(0),
        })
    }

    fn walk_root(self: &Rc<Self>) {
        let unwrapped = self.root.unwrap_document();
        let mut stack = Vec::new();
        self.walk(&unwrapped, None, &mut stack);
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn rolodex(&self) -> Option<Rc<Rolodex>> {
        self.rolodex.upgrade()
    }

    pub(crate) fn config(&self) -> &DocumentConfig {
        &self.config
    }

    fn walk(self: &Rc<Self>, node: &Node, parent: Option<&Node>, stack: &mut Vec<String>) {
        if node.is_mapping() {
            self.record_mapping(node, parent, stack);
            for (key, value) in node.entries() {
                stack.push(key.value());
                self.walk(&value, Some(node), stack);
                stack.pop();
            }
        } else if node.is_sequence() {
            for (idx, item) in node.items().into_iter().enumerate() {
                stack.push(idx.to_string());
                self.walk(&item, Some(node), stack);
                stack.pop();
            }
        }
    }

    fn record_mapping(self: &Rc<Self>, node: &Node, parent: Option<&Node>, stack: &[String]) {
        // References first; everything else may coexist with one.
        if let Some((_, ref_node)) = node.get_entry("$ref") {
            if ref_node.is_scalar() {
                self.record_reference(node, parent, &ref_node, stack);
            }
        }

        let pointer = JsonPointer::from_segments(stack.iter().cloned());
        let segs = stack;
        match segs {
            [top, name] if top == "paths" => {
                self.data.borrow_mut().paths.insert(name.clone(), node.clone());
            }
            [top, name] if top == "webhooks" => {
                self.data
                    .borrow_mut()
                    .webhooks
                    .insert(name.clone(), node.clone());
            }
            [top, _, method] if (top == "paths" || top == "webhooks") && is_method(method) => {
                self.data
                    .borrow_mut()
                    .operations
                    .insert(pointer.to_string(), node.clone());
            }
            [c, s, _] if c == "components" && s == "schemas" => {
                self.data
                    .borrow_mut()
                    .schemas
                    .insert(format!("#{pointer}"), node.clone());
            }
            [top, _] if top == "definitions" => {
                self.data
                    .borrow_mut()
                    .schemas
                    .insert(format!("#{pointer}"), node.clone());
            }
            [c, s, _] if c == "components" && s == "securitySchemes" => {
                self.data
                    .borrow_mut()
                    .security_schemes
                    .insert(format!("#{pointer}"), node.clone());
            }
            [top, _] if top == "securityDefinitions" => {
                self.data
                    .borrow_mut()
                    .security_schemes
                    .insert(format!("#{pointer}"), node.clone());
            }
            [c, s, _] if c == "components" && s == "parameters" => {
                self.data
                    .borrow_mut()
                    .parameters
                    .insert(format!("#{pointer}"), node.clone());
            }
            [c, s, _] if c == "components" && s == "examples" => {
                self.data
                    .borrow_mut()
                    .examples
                    .insert(format!("#{pointer}"), node.clone());
            }
            [c, s, _] if c == "components" => {
                let mut data = self.data.borrow_mut();
                let table = match s.as_str() {
                    "responses" => Some(&mut data.responses),
                    "requestBodies" => Some(&mut data.request_bodies),
                    "headers" => Some(&mut data.headers),
                    "links" => Some(&mut data.links),
                    "callbacks" => Some(&mut data.callbacks),
                    _ => None,
                };
                if let Some(table) = table {
                    table.insert(format!("#{pointer}"), node.clone());
                }
            }
            // Swagger 2 keeps reusable parameters and responses at the
            // document root.
            [top, _] if top == "parameters" => {
                self.data
                    .borrow_mut()
                    .parameters
                    .insert(format!("#{pointer}"), node.clone());
            }
            [top, _] if top == "responses" => {
                self.data
                    .borrow_mut()
                    .responses
                    .insert(format!("#{pointer}"), node.clone());
            }
            _ => {}
        }

        // Inline schemas: `schema` values, polymorphic variants, `items`.
        match segs.last().map(String::as_str) {
            Some("schema") => {
                self.data
                    .borrow_mut()
                    .schemas
                    .insert(format!("#{pointer}"), node.clone());
            }
            Some("items") if segs.len() >= 2 => {
                self.data
                    .borrow_mut()
                    .schemas
                    .insert(format!("#{pointer}"), node.clone());
            }
            Some(last) if last.parse::<usize>().is_ok() && segs.len() >= 2 => {
                if matches!(
                    segs[segs.len() - 2].as_str(),
                    "oneOf" | "anyOf" | "allOf"
                ) {
                    self.data
                        .borrow_mut()
                        .schemas
                        .insert(format!("#{pointer}"), node.clone());
                }
            }
            _ => {}
        }

        // Operation- and path-level parameter lists.
        if segs.len() >= 2
            && segs[segs.len() - 1].parse::<usize>().is_ok()
            && segs[segs.len() - 2] == "parameters"
            && segs.first().map(String::as_str) != Some("components")
        {
            self.data
                .borrow_mut()
                .parameters
                .insert(format!("#{pointer}"), node.clone());
        }

        if let Some((_, enum_node)) = node.get_entry("enum") {
            if enum_node.is_sequence() {
                self.data
                    .borrow_mut()
                    .enums
                    .insert(pointer.to_string(), enum_node);
            }
        }

        for (kind, keyword) in [
            (PolyKind::OneOf, "oneOf"),
            (PolyKind::AnyOf, "anyOf"),
            (PolyKind::AllOf, "allOf"),
        ] {
            if let Some(poly_node) = node.get(keyword) {
                if poly_node.is_sequence() {
                    let entry = PolyEntry {
                        kind,
                        path: pointer.clone().into_owned(),
                        node: poly_node,
                    };
                    let mut data = self.data.borrow_mut();
                    match kind {
                        PolyKind::OneOf => data.poly_one_of.push(entry),
                        PolyKind::AnyOf => data.poly_any_of.push(entry),
                        PolyKind::AllOf => data.poly_all_of.push(entry),
                    }
                }
            }
        }

        if segs.is_empty() {
            // Root mapping: collect tags and servers once.
            if let Some(tags) = node.get("tags") {
                self.data.borrow_mut().tags = tags.items();
            }
            if let Some(servers) = node.get("servers") {
                self.data.borrow_mut().servers = servers.items();
            }
        }
    }

    fn record_reference(
        self: &Rc<Self>,
        node: &Node,
        parent: Option<&Node>,
        ref_node: &Node,
        stack: &[String],
    ) {
        let definition = ref_node.value();
        let (locality, target_location, fragment) = self.locate(&definition);
        let full_definition = match &fragment {
            Some(fragment) => format!("{target_location}{fragment}"),
            None => target_location.clone(),
        };
        trace!(reference = %full_definition, "indexed reference");
        let reference = Rc::new(Reference {
            definition: definition.clone(),
            full_definition: full_definition.clone(),
            target_location: target_location.clone(),
            fragment,
            locality,
            node: node.clone(),
            ref_node: ref_node.clone(),
            parent_node: parent.cloned(),
            path: JsonPointer::from_segments(stack.iter().cloned()),
            circular: Cell::new(false),
            index: Rc::downgrade(self),
        });

        {
            let mut data = self.data.borrow_mut();
            data.all_refs
                .entry(full_definition)
                .or_insert_with(|| reference.clone());
            data.all_refs_sequenced.push(reference.clone());
            data.refs_by_node.insert(node.id(), reference.clone());
            if self.config.transform_sibling_refs && node.entries().len() > 1 {
                data.sibling_refs.push(reference.clone());
            }
        }

        // Non-local targets get opened and indexed now, so lookups later
        // are pure pointer chases.
        if locality != Locality::Local && !self.config.skip_external_ref_resolution {
            self.ensure_child_index(&target_location, &definition);
        }
    }

    /// Splits a reference into its locality, absolute target location and
    /// fragment. Fragments arrive percent-encoded inside URLs.
    fn locate(&self, definition: &str) -> (Locality, String, Option<String>) {
        if let Some(fragment) = definition.strip_prefix('#') {
            return (
                Locality::Local,
                self.location.clone(),
                Some(format!("#{}", decode_fragment(fragment))),
            );
        }
        let (file_part, fragment) = match definition.split_once('#') {
            Some((file, frag)) => (file, Some(format!("#{}", decode_fragment(frag)))),
            None => (definition, None),
        };
        if file_part.starts_with("http://") || file_part.starts_with("https://") {
            return (Locality::Url, file_part.to_owned(), fragment);
        }
        let location = match &self.origin {
            Origin::Local(dir) => normalize(&dir.join(file_part)).display().to_string(),
            Origin::Remote(base) => base
                .join(file_part)
                .map(|url: Url| url.to_string())
                .unwrap_or_else(|_| file_part.to_owned()),
        };
        let locality = if file_part.starts_with("http") {
            Locality::Url
        } else {
            Locality::File
        };
        (locality, location, fragment)
    }

    /// Opens an external target through the rolodex and indexes it, once.
    fn ensure_child_index(self: &Rc<Self>, target_location: &str, definition: &str) {
        if self.data.borrow().children.contains_key(target_location) {
            return;
        }
        let Some(rolodex) = self.rolodex.upgrade() else {
            return;
        };
        let file_part = definition.split('#').next().unwrap_or(definition);
        match rolodex.open_from(&self.origin, file_part) {
            Ok(entry) => {
                let existing = entry.index.borrow().clone();
                let child = match existing {
                    Some(index) => index,
                    None => {
                        let shell = SpecIndex::shell(
                            &entry.root,
                            entry.absolute_location.clone(),
                            entry.origin.clone(),
                            &rolodex,
                        );
                        // Register before walking: a cycle back into this
                        // file reuses the shell instead of recursing.
                        *entry.index.borrow_mut() = Some(shell.clone());
                        shell.walk_root();
                        shell
                    }
                };
                self.data
                    .borrow_mut()
                    .children
                    .insert(target_location.to_owned(), child);
            }
            Err(err) => rolodex.catch(err),
        }
    }

    /// Finds a component by `#/...` fragment. Table lookups count as cache
    /// hits; falling back to a pointer walk counts as a miss.
    pub fn find_component(&self, fragment: &str) -> Option<Node> {
        let data = self.data.borrow();
        if let Some(node) = data
            .schemas
            .get(fragment)
            .or_else(|| data.security_schemes.get(fragment))
            .or_else(|| data.parameters.get(fragment))
            .or_else(|| data.examples.get(fragment))
            .or_else(|| data.responses.get(fragment))
            .or_else(|| data.request_bodies.get(fragment))
            .or_else(|| data.headers.get(fragment))
            .or_else(|| data.links.get(fragment))
            .or_else(|| data.callbacks.get(fragment))
        {
            self.hits.set(self.hits.get() + 1);
            return Some(node.clone());
        }
        drop(data);
        self.misses.set(self.misses.get() + 1);
        let pointer = JsonPointer::parse_owned(fragment.trim_start_matches('#')).ok()?;
        self.root.resolve(&pointer).ok()
    }

    /// The index owning `location`: this one, or a child.
    pub fn index_for_location(self: &Rc<Self>, location: &str) -> Option<Rc<SpecIndex>> {
        if self.location == location {
            return Some(self.clone());
        }
        self.data.borrow().children.get(location).cloned()
    }

    /// This index and every child index, in discovery order.
    pub fn all_indexes(self: &Rc<Self>) -> Vec<Rc<SpecIndex>> {
        let mut out = vec![self.clone()];
        let mut seen = std::collections::HashSet::new();
        seen.insert(self.location.clone());
        let mut cursor = 0;
        while cursor < out.len() {
            let current = out[cursor].clone();
            cursor += 1;
            for child in current.data.borrow().children.values() {
                if seen.insert(child.location.clone()) {
                    out.push(child.clone());
                }
            }
        }
        out
    }

    pub fn all_references(&self) -> IndexMap<String, Rc<Reference>> {
        self.data.borrow().all_refs.clone()
    }

    pub fn all_references_sequenced(&self) -> Vec<Rc<Reference>> {
        self.data.borrow().all_refs_sequenced.clone()
    }

    pub fn reference_for_node(&self, node: &Node) -> Option<Rc<Reference>> {
        self.data.borrow().refs_by_node.get(&node.id()).cloned()
    }

    pub fn sibling_ref_schemas(&self) -> Vec<Rc<Reference>> {
        self.data.borrow().sibling_refs.clone()
    }

    pub fn all_paths(&self) -> IndexMap<String, Node> {
        self.data.borrow().paths.clone()
    }

    pub fn all_webhooks(&self) -> IndexMap<String, Node> {
        self.data.borrow().webhooks.clone()
    }

    pub fn all_operations(&self) -> IndexMap<String, Node> {
        self.data.borrow().operations.clone()
    }

    pub fn all_schemas(&self) -> IndexMap<String, Node> {
        self.data.borrow().schemas.clone()
    }

    pub fn all_enums(&self) -> IndexMap<String, Node> {
        self.data.borrow().enums.clone()
    }

    pub fn all_parameters(&self) -> IndexMap<String, Node> {
        self.data.borrow().parameters.clone()
    }

    pub fn all_security_schemes(&self) -> IndexMap<String, Node> {
        self.data.borrow().security_schemes.clone()
    }

    pub fn all_examples(&self) -> IndexMap<String, Node> {
        self.data.borrow().examples.clone()
    }

    pub fn all_responses(&self) -> IndexMap<String, Node> {
        self.data.borrow().responses.clone()
    }

    pub fn all_request_bodies(&self) -> IndexMap<String, Node> {
        self.data.borrow().request_bodies.clone()
    }

    pub fn all_headers(&self) -> IndexMap<String, Node> {
        self.data.borrow().headers.clone()
    }

    pub fn all_links(&self) -> IndexMap<String, Node> {
        self.data.borrow().links.clone()
    }

    pub fn all_callbacks(&self) -> IndexMap<String, Node> {
        self.data.borrow().callbacks.clone()
    }

    pub fn all_tags(&self) -> Vec<Node> {
        self.data.borrow().tags.clone()
    }

    pub fn all_servers(&self) -> Vec<Node> {
        self.data.borrow().servers.clone()
    }

    pub fn poly_one_of(&self) -> std::cell::Ref<'_, Vec<PolyEntry>> {
        std::cell::Ref::map(self.data.borrow(), |data| &data.poly_one_of)
    }

    pub fn poly_any_of(&self) -> std::cell::Ref<'_, Vec<PolyEntry>> {
        std::cell::Ref::map(self.data.borrow(), |data| &data.poly_any_of)
    }

    pub fn poly_all_of(&self) -> std::cell::Ref<'_, Vec<PolyEntry>> {
        std::cell::Ref::map(self.data.borrow(), |data| &data.poly_all_of)
    }

    pub fn children(&self) -> IndexMap<String, Rc<SpecIndex>> {
        self.data.borrow().children.clone()
    }

    pub fn cache_hits(&self) -> u64 {
        self.hits.get()
    }

    pub fn cache_misses(&self) -> u64 {
        self.misses.get()
    }
}

fn is_method(key: &str) -> bool {
    METHODS.contains(&key)
}

fn decode_fragment(fragment: &str) -> std::borrow::Cow<'_, str> {
    percent_encoding::percent_decode_str(fragment)
        .decode_utf8()
        .unwrap_or_else(|_| fragment.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cst;
    use indoc::indoc;

    fn index_for(src: &str) -> Rc<SpecIndex> {
        let rolodex = Rc::new(Rolodex::new(Rc::new(DocumentConfig::new())));
        let doc = cst::parse(src).unwrap();
        SpecIndex::build_root(&doc, "root.yaml", &rolodex)
    }

    const PETSTORE: &str = indoc! {"
        openapi: 3.0.1
        tags:
          - name: pets
        servers:
          - url: https://example.com
        paths:
          /pets:
            get:
              operationId: listPets
              parameters:
                - name: limit
                  in: query
                  schema:
                    type: integer
              responses:
                '200':
                  content:
                    application/json:
                      schema:
                        $ref: '#/components/schemas/Pet'
          /pets/{petId}:
            get:
              operationId: getPet
              responses:
                '200':
                  content:
                    application/json:
                      schema:
                        $ref: '#/components/schemas/Pet'
        components:
          schemas:
            Pet:
              type: object
              properties:
                status:
                  type: string
                  enum:
                    - available
                    - sold
                kind:
                  oneOf:
                    - $ref: '#/components/schemas/Cat'
                    - $ref: '#/components/schemas/Dog'
            Cat:
              type: object
            Dog:
              type: object
          securitySchemes:
            api_key:
              type: apiKey
              name: key
              in: header
    "};

    #[test]
    fn records_paths_and_operations() {
        let index = index_for(PETSTORE);
        let paths = index.all_paths();
        assert_eq!(
            paths.keys().cloned().collect::<Vec<_>>(),
            ["/pets", "/pets/{petId}"],
        );
        let operations = index.all_operations();
        assert_eq!(operations.len(), 2);
        assert!(operations.contains_key("/paths/~1pets/get"));
        assert!(operations.contains_key("/paths/~1pets~1{petId}/get"));
    }

    #[test]
    fn records_references_in_discovery_order() {
        let index = index_for(PETSTORE);
        let sequenced = index.all_references_sequenced();
        assert_eq!(sequenced.len(), 4);
        assert_eq!(
            sequenced[0].full_definition,
            "root.yaml#/components/schemas/Pet",
        );
        assert_eq!(sequenced[0].locality, Locality::Local);
        // Keyed access deduplicates; sequenced access keeps repeats.
        assert_eq!(index.all_references().len(), 3);
    }

    #[test]
    fn reference_paths_point_at_their_nodes() {
        let index = index_for(PETSTORE);
        let sequenced = index.all_references_sequenced();
        let first = &sequenced[0];
        assert_eq!(
            first.path.to_string(),
            "/paths/~1pets/get/responses/200/content/application~1json/schema",
        );
        let resolved = index.root().resolve(&first.path).unwrap();
        assert!(resolved.same(&first.node));
    }

    #[test]
    fn records_schemas_enums_and_polys() {
        let index = index_for(PETSTORE);
        let schemas = index.all_schemas();
        assert!(schemas.contains_key("#/components/schemas/Pet"));
        assert!(schemas.contains_key("#/components/schemas/Cat"));
        // Inline schema under the parameter.
        assert!(schemas
            .keys()
            .any(|key| key.ends_with("/parameters/0/schema")));

        let enums = index.all_enums();
        assert_eq!(enums.len(), 1);
        let (pointer, values) = enums.first().unwrap();
        assert!(pointer.ends_with("/properties/status"));
        assert_eq!(values.items().len(), 2);

        assert_eq!(index.poly_one_of().len(), 1);
        assert_eq!(index.poly_any_of().len(), 0);
    }

    #[test]
    fn records_parameters_security_tags_servers() {
        let index = index_for(PETSTORE);
        assert_eq!(index.all_parameters().len(), 1);
        assert!(index
            .all_security_schemes()
            .contains_key("#/components/securitySchemes/api_key"));
        assert_eq!(index.all_tags().len(), 1);
        assert_eq!(index.all_servers().len(), 1);
    }

    #[test]
    fn find_component_counts_hits_and_misses() {
        let index = index_for(PETSTORE);
        let pet = index.find_component("#/components/schemas/Pet").unwrap();
        assert!(pet.is_mapping());
        assert_eq!(index.cache_hits(), 1);
        // Not in any table, but resolvable by pointer.
        let op = index.find_component("#/paths/~1pets/get").unwrap();
        assert!(op.is_mapping());
        assert_eq!(index.cache_misses(), 1);
        assert!(index.find_component("#/nope").is_none());
    }

    #[test]
    fn external_reference_builds_child_index() {
        let dir = std::env::temp_dir().join(format!("vellum-index-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("pet.yaml"),
            "components:\n  schemas:\n    Pet:\n      type: object\n",
        )
        .unwrap();
        let src = indoc! {"
            openapi: 3.0.1
            components:
              schemas:
                Pet:
                  $ref: './pet.yaml#/components/schemas/Pet'
        "};
        let config = DocumentConfig::new()
            .with_base_path(&dir)
            .allow_file_references(true);
        let rolodex = Rc::new(Rolodex::new(Rc::new(config)));
        let doc = cst::parse(src).unwrap();
        let index = SpecIndex::build_root(&doc, "root.yaml", &rolodex);

        let children = index.children();
        assert_eq!(children.len(), 1);
        let (location, child) = children.first().unwrap();
        assert!(location.ends_with("pet.yaml"));
        assert!(child
            .find_component("#/components/schemas/Pet")
            .is_some());
        assert_eq!(index.all_indexes().len(), 2);
    }

    #[test]
    fn skipping_external_resolution_leaves_no_children() {
        let src = indoc! {"
            openapi: 3.0.1
            components:
              schemas:
                Pet:
                  $ref: './models/pet.yaml'
        "};
        let mut config = DocumentConfig::new();
        config.skip_external_ref_resolution = true;
        let rolodex = Rc::new(Rolodex::new(Rc::new(config)));
        let doc = cst::parse(src).unwrap();
        let index = SpecIndex::build_root(&doc, "root.yaml", &rolodex);
        assert!(index.children().is_empty());
        assert_eq!(rolodex.caught_errors().len(), 0);
        let refs = index.all_references_sequenced();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].locality, Locality::File);
        assert_eq!(refs[0].definition, "./models/pet.yaml");
    }

    #[test]
    fn unreachable_external_reference_is_caught() {
        let src = indoc! {"
            openapi: 3.0.1
            components:
              schemas:
                Pet:
                  $ref: './missing/pet.yaml'
        "};
        let config = DocumentConfig::new().allow_file_references(true);
        let rolodex = Rc::new(Rolodex::new(Rc::new(config)));
        let doc = cst::parse(src).unwrap();
        let index = SpecIndex::build_root(&doc, "root.yaml", &rolodex);
        assert!(index.children().is_empty());
        assert_eq!(rolodex.caught_errors().len(), 1);
    }

    #[test]
    fn sibling_refs_recorded_when_enabled() {
        let src = indoc! {"
            openapi: 3.1.0
            components:
              schemas:
                Extended:
                  $ref: '#/components/schemas/Base'
                  description: extra keywords ride along
                Base:
                  type: object
        "};
        let mut config = DocumentConfig::new();
        config.transform_sibling_refs = true;
        let rolodex = Rc::new(Rolodex::new(Rc::new(config)));
        let doc = cst::parse(src).unwrap();
        let index = SpecIndex::build_root(&doc, "root.yaml", &rolodex);
        let siblings = index.sibling_ref_schemas();
        assert_eq!(siblings.len(), 1);
        assert_eq!(
            siblings[0].full_definition,
            "root.yaml#/components/schemas/Base",
        );
    }
}
