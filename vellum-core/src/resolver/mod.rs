//! The reference resolver. Two modes over the same traversal: `resolve`
//! substitutes every `$ref` target into the tree in place, while
//! `check_for_circular_references` leaves the tree alone. Both classify
//! cycles and report the journey taken to rediscover each loop point.
//!
//! Cycle discovery runs Tarjan's algorithm once over the whole reference
//! graph instead of a DFS per reference; only members of cyclic components
//! pay for journey reporting.

use std::rc::Rc;

use indexmap::IndexMap;
use petgraph::{algo::tarjan_scc, graph::DiGraph};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    cst::Node,
    index::{Locality, Reference, SpecIndex},
};

/// One discovered cycle, described by the hops taken from its first
/// reference back to the repeating one.
#[derive(Clone, Debug)]
pub struct CircularReferenceResult {
    /// Every hop, first to repeating; the last entry repeats the loop
    /// point.
    pub journey: Vec<Rc<Reference>>,
    /// The reference at which the traversal came back around.
    pub loop_point: Rc<Reference>,
    /// The loop passes through `oneOf` / `anyOf` / `allOf`.
    pub is_polymorphic: bool,
    /// The loop passes through `items` of an array schema.
    pub is_array: bool,
    /// Every hop lies on a `required` property, so the cycle can't be
    /// broken by omitting a field.
    pub is_required: bool,
}

impl CircularReferenceResult {
    /// The journey as full definitions, for reporting.
    pub fn journey_locations(&self) -> Vec<String> {
        self.journey
            .iter()
            .map(|hop| hop.full_definition.clone())
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolvingError {
    #[error("infinite circular reference: {}", .0.journey_locations().join(" -> "))]
    Circular(CircularReferenceResult),
    #[error("can't resolve reference {reference} pointed to by {pointer}")]
    NotFound { reference: String, pointer: String },
}

/// Walks a root index's reference graph.
pub struct Resolver {
    index: Rc<SpecIndex>,
    /// Location → index, across the root and every child.
    indexes: IndexMap<String, Rc<SpecIndex>>,
    circular: Vec<CircularReferenceResult>,
    ignored_polymorphic: Vec<CircularReferenceResult>,
    ignored_array: Vec<CircularReferenceResult>,
    ignored_other: Vec<CircularReferenceResult>,
}

impl Resolver {
    pub fn new(index: Rc<SpecIndex>) -> Self {
        let indexes = index
            .all_indexes()
            .into_iter()
            .map(|idx| (idx.location().to_owned(), idx))
            .collect();
        Self {
            index,
            indexes,
            circular: Vec::new(),
            ignored_polymorphic: Vec::new(),
            ignored_array: Vec::new(),
            ignored_other: Vec::new(),
        }
    }

    /// Destructively resolves every reference, substituting targets into
    /// the tree. Returns fatal cycles and unresolvable references.
    pub fn resolve(&mut self) -> Vec<ResolvingError> {
        self.run(true)
    }

    /// The same traversal without mutation; may be run repeatedly.
    pub fn check_for_circular_references(&mut self) -> Vec<ResolvingError> {
        self.run(false)
    }

    /// Cycles that were classified non-fatal because they pass through a
    /// polymorphic keyword.
    pub fn ignored_polymorphic_circular_references(&self) -> &[CircularReferenceResult] {
        &self.ignored_polymorphic
    }

    /// Cycles that were classified non-fatal because they pass through an
    /// array's `items`.
    pub fn ignored_array_circular_references(&self) -> &[CircularReferenceResult] {
        &self.ignored_array
    }

    /// Every cycle discovered by the last run, fatal or not.
    pub fn all_circular_references(&self) -> &[CircularReferenceResult] {
        &self.circular
    }

    fn run(&mut self, destructive: bool) -> Vec<ResolvingError> {
        self.circular.clear();
        self.ignored_polymorphic.clear();
        self.ignored_array.clear();
        self.ignored_other.clear();

        let skip_check = self.index.config().skip_circular_reference_check;
        let refs = self.collect_references();
        if !skip_check {
            self.mark_cyclic_definitions(&refs);
        }

        let mut errors = Vec::new();
        let mut done = FxHashSet::default();
        let mut reported = FxHashSet::default();
        for reference in &refs {
            let mut journey = Vec::new();
            self.visit(
                reference,
                &mut journey,
                &mut done,
                &mut reported,
                destructive,
                skip_check,
                &mut errors,
            );
        }
        errors
    }

    /// Every reference of every index, in discovery order: the root's
    /// references first, then each child's.
    fn collect_references(&self) -> Vec<Rc<Reference>> {
        self.indexes
            .values()
            .flat_map(|index| index.all_references_sequenced())
            .collect()
    }

    /// Builds the full-definition graph and marks everything in a cyclic
    /// strongly-connected component, one Tarjan pass instead of a DFS per
    /// field.
    fn mark_cyclic_definitions(&self, refs: &[Rc<Reference>]) {
        let mut graph = DiGraph::<&str, ()>::new();
        let mut nodes = FxHashMap::default();
        for reference in refs {
            nodes
                .entry(reference.full_definition.as_str())
                .or_insert_with(|| graph.add_node(reference.full_definition.as_str()));
        }
        for reference in refs {
            let from = nodes[reference.full_definition.as_str()];
            let Some((owner, target)) = self.lookup(reference) else {
                continue;
            };
            for contained in contained_references(&owner, &target) {
                if let Some(&to) = nodes.get(contained.full_definition.as_str()) {
                    graph.update_edge(from, to, ());
                }
            }
        }

        let mut cyclic = FxHashSet::default();
        for component in tarjan_scc(&graph) {
            let looped = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| graph.find_edge(n, n).is_some());
            if looped {
                for node in component {
                    cyclic.insert(graph[node]);
                }
            }
        }
        for reference in refs {
            if cyclic.contains(reference.full_definition.as_str()) {
                reference.circular.set(true);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn visit(
        &mut self,
        reference: &Rc<Reference>,
        journey: &mut Vec<Rc<Reference>>,
        done: &mut FxHashSet<String>,
        reported: &mut FxHashSet<String>,
        destructive: bool,
        skip_check: bool,
        errors: &mut Vec<ResolvingError>,
    ) {
        if let Some(first) = journey
            .iter()
            .position(|hop| hop.full_definition == reference.full_definition)
        {
            if skip_check {
                return;
            }
            let mut cycle_journey: Vec<_> = journey[first..].to_vec();
            cycle_journey.push(reference.clone());
            self.report_cycle(cycle_journey, reference.clone(), reported, errors);
            return;
        }

        let traversed = done.contains(&reference.full_definition);
        let Some((owner, target)) = self.lookup(reference) else {
            if !traversed {
                errors.push(ResolvingError::NotFound {
                    reference: reference.definition.clone(),
                    pointer: reference.path.to_string(),
                });
                done.insert(reference.full_definition.clone());
            }
            return;
        };

        // Each definition is traversed once, but every textual occurrence
        // of a reference still gets its own substitution.
        if !traversed {
            journey.push(reference.clone());
            for contained in contained_references(&owner, &target) {
                self.visit(
                    &contained, journey, done, reported, destructive, skip_check, errors,
                );
            }
            journey.pop();
            done.insert(reference.full_definition.clone());
        }

        if destructive && !reference.is_circular() {
            substitute(reference, &target);
        }
    }

    fn report_cycle(
        &mut self,
        journey: Vec<Rc<Reference>>,
        loop_point: Rc<Reference>,
        reported: &mut FxHashSet<String>,
        errors: &mut Vec<ResolvingError>,
    ) {
        // One report per distinct cycle, regardless of entry point.
        let mut key: Vec<_> = journey
            .iter()
            .map(|hop| hop.full_definition.clone())
            .collect();
        key.sort();
        key.dedup();
        if !reported.insert(key.join("|")) {
            return;
        }

        for hop in &journey {
            hop.circular.set(true);
        }
        let result = CircularReferenceResult {
            is_polymorphic: journey.iter().any(|hop| is_polymorphic_hop(hop)),
            is_array: journey.iter().any(|hop| is_array_hop(hop)),
            is_required: journey.iter().all(|hop| is_required_hop(hop)),
            journey,
            loop_point,
        };
        self.circular.push(result.clone());

        let config = self.index.config();
        let fatal = result.is_required
            && !(result.is_polymorphic && config.ignore_polymorphic_circular_references)
            && !(result.is_array && config.ignore_array_circular_references);
        if fatal {
            errors.push(ResolvingError::Circular(result));
        } else if result.is_polymorphic {
            self.ignored_polymorphic.push(result);
        } else if result.is_array {
            self.ignored_array.push(result);
        } else {
            self.ignored_other.push(result);
        }
    }

    /// Finds the target node of a reference, along with the index that
    /// owns the target document.
    fn lookup(&self, reference: &Reference) -> Option<(Rc<SpecIndex>, Node)> {
        match reference.locality {
            Locality::Local => {
                let owner = reference.index.upgrade()?;
                let fragment = reference.fragment.as_deref()?;
                let node = owner.find_component(fragment)?;
                Some((owner, node))
            }
            Locality::File | Locality::Url => {
                let child = self.indexes.get(&reference.target_location)?.clone();
                match reference.fragment.as_deref() {
                    Some(fragment) => {
                        let node = child.find_component(fragment)?;
                        Some((child, node))
                    }
                    None => {
                        let node = child.root().unwrap_document();
                        Some((child, node))
                    }
                }
            }
        }
    }
}

/// References contained in a target subtree, in document order.
fn contained_references(owner: &Rc<SpecIndex>, target: &Node) -> Vec<Rc<Reference>> {
    let mut out = Vec::new();
    let mut seen = FxHashSet::default();
    walk_contained(owner, target, &mut seen, &mut out);
    out
}

fn walk_contained(
    owner: &Rc<SpecIndex>,
    node: &Node,
    seen: &mut FxHashSet<usize>,
    out: &mut Vec<Rc<Reference>>,
) {
    if !seen.insert(node.id()) {
        return;
    }
    if node.is_mapping() {
        if let Some(reference) = owner.reference_for_node(node) {
            out.push(reference);
        }
        for (_, value) in node.entries() {
            walk_contained(owner, &value, seen, out);
        }
    } else if node.is_sequence() {
        for item in node.items() {
            walk_contained(owner, &item, seen, out);
        }
    }
}

/// Substitutes the target into the reference's node. A sibling-`$ref`
/// mapping keeps its siblings (in their original order) when the
/// transform is enabled; otherwise the node becomes the target outright.
fn substitute(reference: &Reference, target: &Node) {
    let has_siblings = reference.node.entries().len() > 1;
    let transform = reference
        .index
        .upgrade()
        .map(|idx| idx.config().transform_sibling_refs)
        .unwrap_or(false);
    if has_siblings && transform {
        let existing: FxHashSet<String> = reference
            .node
            .entries()
            .iter()
            .map(|(key, _)| key.value())
            .collect();
        {
            let mut data = reference.node.borrow_mut();
            let mut kept = Vec::with_capacity(data.children.len());
            for pair in data.children.chunks_exact(2) {
                if pair[0].value() != "$ref" {
                    kept.push(pair[0].clone());
                    kept.push(pair[1].clone());
                }
            }
            data.children = kept;
        }
        for (key, value) in target.entries() {
            if !existing.contains(&key.value()) {
                reference.node.push_entry(key, value);
            }
        }
    } else {
        reference.node.graft(target);
    }
}

fn is_polymorphic_hop(hop: &Reference) -> bool {
    hop.path
        .segments()
        .any(|segment| matches!(segment.as_str(), "oneOf" | "anyOf" | "allOf"))
}

fn is_array_hop(hop: &Reference) -> bool {
    if hop.path.last().map(|s| s.as_str()) != Some("items") {
        return false;
    }
    hop.parent_node
        .as_ref()
        .and_then(|parent| parent.get("type"))
        .map(|ty| ty.value() == "array")
        .unwrap_or(false)
}

/// A hop is required when the property it hangs off appears in its
/// schema's `required` list.
fn is_required_hop(hop: &Reference) -> bool {
    let segments: Vec<String> = hop
        .path
        .segments()
        .map(|s| s.as_str().to_owned())
        .collect();
    let Some(prop_at) = segments.iter().rposition(|s| s == "properties") else {
        return false;
    };
    let Some(property) = segments.get(prop_at + 1) else {
        return false;
    };
    let Some(owner) = hop.index.upgrade() else {
        return false;
    };
    let schema_pointer = vellum_pointer::JsonPointer::from_segments(segments[..prop_at].to_vec());
    let Ok(schema) = owner.root().resolve(&schema_pointer) else {
        return false;
    };
    schema
        .get("required")
        .map(|required| {
            required
                .items()
                .iter()
                .any(|item| item.value() == *property)
        })
        .unwrap_or(false)
}
