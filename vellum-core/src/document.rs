//! The document facade: construct from bytes, build dialect-checked model
//! views, render, and reload. Diffing and overlay application belong to
//! external engines; this module only defines the contracts they plug into.

use std::rc::Rc;

use tracing::debug;

use crate::{
    config::DocumentConfig,
    cst::{self, Node},
    error::{DocumentError, MultiError},
    index::SpecIndex,
    info::{self, FileType, SpecInfo, SpecInfoError, SpecType},
    model::LowDocument,
    resolver::{CircularReferenceResult, Resolver, ResolvingError},
    rolodex::Rolodex,
};

/// Default indent width for JSON rendering.
const JSON_INDENT: usize = 2;

/// A parsed specification document and everything hanging off it: spec
/// info, rolodex, index.
pub struct Document {
    info: SpecInfo,
    config: Rc<DocumentConfig>,
    rolodex: Rc<Rolodex>,
    index: Option<Rc<SpecIndex>>,
}

impl Document {
    /// Parses a document with the default configuration.
    pub fn new(bytes: &[u8]) -> Result<Self, SpecInfoError> {
        Self::with_config(bytes, DocumentConfig::default())
    }

    /// Reads and parses a document from disk. The file's directory seeds
    /// the rolodex, so relative references resolve next to the spec.
    pub fn from_file(
        path: impl AsRef<std::path::Path>,
        mut config: DocumentConfig,
    ) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|err| {
            DocumentError::Rolodex(crate::rolodex::RolodexError::NotFound {
                location: path.display().to_string(),
                message: err.to_string(),
            })
        })?;
        config.spec_file_path = Some(path.to_path_buf());
        Ok(Self::with_config(&bytes, config)?)
    }

    /// Parses a document with explicit configuration.
    pub fn with_config(bytes: &[u8], config: DocumentConfig) -> Result<Self, SpecInfoError> {
        let info = info::extract_with_document_check(bytes, config.bypass_document_check)?;
        let config = Rc::new(config);
        let rolodex = Rc::new(Rolodex::new(config.clone()));
        let location = config
            .spec_file_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "root.yaml".to_owned());
        let index = if config.avoid_index_build {
            None
        } else {
            debug!(location, "building root spec index");
            Some(SpecIndex::build_root(&info.root_node, location, &rolodex))
        };
        Ok(Self {
            info,
            config,
            rolodex,
            index,
        })
    }

    pub fn info(&self) -> &SpecInfo {
        &self.info
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn rolodex(&self) -> &Rolodex {
        &self.rolodex
    }

    /// The root index, unless the configuration avoided building it.
    pub fn index(&self) -> Option<&Rc<SpecIndex>> {
        self.index.as_ref()
    }

    pub fn root_node(&self) -> &Node {
        &self.info.root_node
    }

    /// Builds the Swagger 2 low-model view.
    pub fn build_v2_model(&self) -> Result<DocumentModel, MultiError> {
        self.build_model(SpecType::Swagger, "swagger", &["definitions"])
    }

    /// Builds the OpenAPI 3.x low-model view.
    pub fn build_v3_model(&self) -> Result<DocumentModel, MultiError> {
        self.build_model(SpecType::OpenApi, "openapi", &["components", "schemas"])
    }

    /// Builds the Arazzo low-model view.
    pub fn build_arazzo_model(&self) -> Result<DocumentModel, MultiError> {
        self.build_model(SpecType::Arazzo, "arazzo", &[])
    }

    fn build_model(
        &self,
        wanted: SpecType,
        discriminator: &str,
        schemas_path: &[&str],
    ) -> Result<DocumentModel, MultiError> {
        let mut errors: MultiError = MultiError::new();
        if self.info.spec_type != wanted {
            errors.push(DocumentError::DialectMismatch {
                wanted: discriminator.to_owned(),
                actual: if self.info.spec_type == SpecType::Unknown {
                    "unknown".to_owned()
                } else {
                    self.info.spec_type.discriminator().to_owned()
                },
            });
            return Err(errors);
        }

        let mut circular = Vec::new();
        if let Some(index) = &self.index {
            if !self.config.skip_circular_reference_check {
                let mut resolver = Resolver::new(index.clone());
                errors.extend(resolver.check_for_circular_references());
                circular = resolver.all_circular_references().to_vec();
            }
        }

        let low = match LowDocument::build(
            &self.info.root_node,
            discriminator,
            schemas_path,
            self.config.merge_referenced_properties,
        ) {
            Ok(low) => Some(low),
            Err(err) => {
                errors.push(err);
                None
            }
        };

        match (low, errors.or_nil()) {
            (Some(low), None) => Ok(DocumentModel {
                low,
                index: self.index.clone(),
                circular,
            }),
            (_, Some(errors)) => Err(errors),
            (None, None) => unreachable!("a failed build always records its error"),
        }
    }

    /// Destructively resolves every reference in place. The index keeps
    /// its recorded references; rebuild after this for a fresh view.
    pub fn resolve(&self) -> Vec<ResolvingError> {
        match &self.index {
            Some(index) => Resolver::new(index.clone()).resolve(),
            None => Vec::new(),
        }
    }

    /// Serializes the (possibly mutated) document in its original format.
    pub fn render(&self) -> Vec<u8> {
        match self.info.file_type {
            FileType::Yaml => cst::render_yaml(&self.info.root_node),
            FileType::Json => cst::render_json(&self.info.root_node, JSON_INDENT),
        }
    }

    /// Renders, then re-parses the output into a fresh document with the
    /// same configuration. Source positions in the new document refer to
    /// the rendered bytes, not the originals.
    pub fn render_and_reload(&self) -> Result<(Vec<u8>, Document), SpecInfoError> {
        let bytes = self.render();
        let reloaded = Document::with_config(&bytes, (*self.config).clone())?;
        Ok((bytes, reloaded))
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("spec_type", &self.info.spec_type)
            .field("format", &self.info.format)
            .field("version", &self.info.version)
            .field("indexed", &self.index.is_some())
            .finish_non_exhaustive()
    }
}

/// A built model view: the low model plus the index it was built against.
#[derive(Debug)]
pub struct DocumentModel {
    pub low: LowDocument,
    pub index: Option<Rc<SpecIndex>>,
    /// Non-fatal cycles found while building.
    pub circular: Vec<CircularReferenceResult>,
}

/// Contract consumed by the external what-changed engine.
pub trait CompareEngine {
    type Report;

    fn compare(&self, left: &Document, right: &Document) -> Self::Report;
}

/// Delegates document comparison to an external engine.
pub fn compare_documents<E: CompareEngine>(
    engine: &E,
    left: &Document,
    right: &Document,
) -> E::Report {
    engine.compare(left, right)
}

/// Contract consumed by the external overlay applier.
pub trait OverlayApplier {
    type Outcome;

    fn apply(&self, document: &Document, overlay: &Node) -> Self::Outcome;
}

/// Delegates overlay application to an external applier.
pub fn apply_overlay<A: OverlayApplier>(
    applier: &A,
    document: &Document,
    overlay: &Node,
) -> A::Outcome {
    applier.apply(document, overlay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn minimal_v3_document_builds() {
        let document = Document::new(b"openapi: 3.0.1\n").unwrap();
        let model = document.build_v3_model().unwrap();
        assert_eq!(model.low.version.as_ref().unwrap().value(), "3.0.1");
        assert_eq!(document.info().version, "3.0.1");
    }

    #[test]
    fn v2_builds_and_v3_fails_with_one_error() {
        let document = Document::new(b"swagger: 2.0.1\n").unwrap();
        assert!(document.build_v2_model().is_ok());

        let errors = document.build_v3_model().unwrap_err();
        assert_eq!(errors.count(), 1);
        assert!(matches!(
            errors.errors()[0],
            DocumentError::DialectMismatch { .. },
        ));
    }

    #[test]
    fn mutation_round_trip() {
        let src = indoc! {"
            openapi: 3.1.0
            info:
              title: This is a title
              contact:
                name: Some Person
                email: some@emailaddress.com
        "};
        let document = Document::new(src.as_bytes()).unwrap();
        let mut model = document.build_v3_model().unwrap();
        let info = model.low.info.as_mut().unwrap();
        info.title
            .as_mut()
            .unwrap()
            .mutate_str("A new title for a useless spec");
        info.contact
            .as_mut()
            .unwrap()
            .name
            .as_mut()
            .unwrap()
            .mutate_str("Buckaroo");

        let rendered = String::from_utf8(document.render()).unwrap();
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
    fn required_circular_reference_fails_the_build() {
        let src = indoc! {"
            openapi: 3.0.1
            components:
              schemas:
                One:
                  type: object
                  required:
                    - things
                  properties:
                    things:
                      $ref: '#/components/schemas/Two'
                Two:
                  type: object
                  required:
                    - testThing
                  properties:
                    testThing:
                      $ref: '#/components/schemas/One'
        "};
        let document = Document::new(src.as_bytes()).unwrap();
        let errors = document.build_v3_model().unwrap_err();
        assert_eq!(errors.count(), 1);
        let DocumentError::Resolving(ResolvingError::Circular(result)) = &errors.errors()[0]
        else {
            panic!("expected a circular error, got {}", errors.errors()[0]);
        };
        assert_eq!(
            result.journey_locations(),
            [
                "root.yaml#/components/schemas/Two",
                "root.yaml#/components/schemas/One",
                "root.yaml#/components/schemas/Two",
            ],
        );
    }

    #[test]
    fn optional_circular_reference_builds_cleanly() {
        let src = indoc! {"
            openapi: 3.0.1
            components:
              schemas:
                One:
                  type: object
                  properties:
                    things:
                      $ref: '#/components/schemas/Two'
                Two:
                  type: object
                  properties:
                    testThing:
                      $ref: '#/components/schemas/One'
        "};
        let document = Document::new(src.as_bytes()).unwrap();
        let model = document.build_v3_model().unwrap();
        assert_eq!(model.circular.len(), 1);
        assert!(!model.circular[0].is_required);
    }

    #[test]
    fn skipped_external_reference_stays_a_reference() {
        let src = indoc! {"
            openapi: 3.0.1
            components:
              schemas:
                Pet:
                  $ref: './models/pet.yaml'
                Local:
                  type: object
                  properties:
                    name:
                      type: string
        "};
        let mut config = DocumentConfig::new();
        config.skip_external_ref_resolution = true;
        let document = Document::with_config(src.as_bytes(), config).unwrap();
        let model = document.build_v3_model().unwrap();

        let pet = &model.low.schemas["Pet"];
        assert!(pet.is_reference());
        assert_eq!(pet.reference(), Some("./models/pet.yaml"));
        assert!(pet.schema().is_none());

        let local = &model.low.schemas["Local"];
        assert!(!local.is_reference());
        assert!(local.schema().is_some());
    }

    #[test]
    fn arazzo_documents_build_their_own_view() {
        let src = indoc! {"
            arazzo: 1.0.1
            info:
              title: Pet onboarding
              version: 1.0.0
            sourceDescriptions:
              - name: petstore
                url: https://example.com/openapi.yaml
                type: openapi
            workflows:
              - workflowId: adopt-a-pet
                steps:
                  - stepId: find
                    operationId: listPets
        "};
        let document = Document::new(src.as_bytes()).unwrap();
        let model = document.build_arazzo_model().unwrap();
        assert_eq!(model.low.source_descriptions.len(), 1);
        let source = &model.low.source_descriptions[0];
        assert_eq!(source.name.as_ref().unwrap().value(), "petstore");
        assert_eq!(source.kind.as_ref().unwrap().value(), "openapi");
        assert_eq!(model.low.workflows.len(), 1);
        assert_eq!(
            model.low.workflows[0]
                .get("workflowId")
                .unwrap()
                .value(),
            "adopt-a-pet",
        );
        // An Arazzo document isn't an OpenAPI document.
        assert!(document.build_v3_model().is_err());
    }

    #[test]
    fn render_and_reload_produces_a_fresh_document() {
        let src = "openapi: 3.0.1\ninfo:\n  title: Original\n";
        let document = Document::new(src.as_bytes()).unwrap();
        let mut model = document.build_v3_model().unwrap();
        model
            .low
            .info
            .as_mut()
            .unwrap()
            .title
            .as_mut()
            .unwrap()
            .mutate_str("Renamed");

        let (bytes, reloaded) = document.render_and_reload().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "openapi: 3.0.1\ninfo:\n  title: Renamed\n",
        );
        let fresh = reloaded.build_v3_model().unwrap();
        assert_eq!(
            fresh.low.info.unwrap().title.unwrap().value(),
            "Renamed",
        );
    }

    #[test]
    fn json_documents_render_as_json() {
        let document = Document::new(br#"{"openapi": "3.0.1"}"#).unwrap();
        let rendered = String::from_utf8(document.render()).unwrap();
        assert_eq!(rendered, "{\n  \"openapi\": \"3.0.1\"\n}");
    }

    #[test]
    fn avoid_index_build_skips_the_index() {
        let mut config = DocumentConfig::new();
        config.avoid_index_build = true;
        let document = Document::with_config(b"openapi: 3.0.1\n", config).unwrap();
        assert!(document.index().is_none());
        assert!(document.build_v3_model().is_ok());
    }

    #[test]
    fn external_engines_plug_into_the_contracts() {
        struct CountSchemas;
        impl CompareEngine for CountSchemas {
            type Report = (usize, usize);

            fn compare(&self, left: &Document, right: &Document) -> Self::Report {
                let count = |doc: &Document| {
                    doc.index()
                        .map(|idx| idx.all_schemas().len())
                        .unwrap_or_default()
                };
                (count(left), count(right))
            }
        }
        let a = Document::new(b"openapi: 3.0.1\n").unwrap();
        let b = Document::new(
            b"openapi: 3.0.1\ncomponents:\n  schemas:\n    Pet:\n      type: object\n",
        )
        .unwrap();
        let report = compare_documents(&CountSchemas, &a, &b);
        assert_eq!(report, (0, 1));
    }
}
