//! Configuration for document construction. Everything defaults to the
//! safest behavior: no file access, no network access, full index build,
//! strict document check.

use std::{path::PathBuf, rc::Rc};

use url::Url;

use crate::{rolodex::RemoteUrlHandler, translate::CancelToken};

#[derive(Clone, Default)]
pub struct DocumentConfig {
    /// Base URL for resolving relative remote references.
    pub base_url: Option<Url>,
    /// Base directory for resolving relative file references.
    pub base_path: Option<PathBuf>,
    /// Where the spec itself was read from; its directory seeds the local
    /// base when `base_path` is unset.
    pub spec_file_path: Option<PathBuf>,
    /// Handler for remote fetches. `None` means the built-in blocking HTTP
    /// client with its default timeout.
    pub remote_url_handler: Option<Rc<dyn RemoteUrlHandler>>,
    pub allow_file_references: bool,
    pub allow_remote_references: bool,
    pub avoid_index_build: bool,
    pub bypass_document_check: bool,
    pub allow_unknown_extension_content_detection: bool,
    pub skip_external_ref_resolution: bool,
    pub skip_circular_reference_check: bool,
    pub ignore_polymorphic_circular_references: bool,
    pub ignore_array_circular_references: bool,
    pub transform_sibling_refs: bool,
    pub merge_referenced_properties: bool,
    /// When set, only files whose name appears here may be opened.
    pub file_filter: Option<Vec<String>>,
    /// Cooperative cancellation for remote fetches.
    pub cancel: Option<CancelToken>,
}

impl std::fmt::Debug for DocumentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentConfig")
            .field("base_url", &self.base_url)
            .field("base_path", &self.base_path)
            .field("spec_file_path", &self.spec_file_path)
            .field(
                "remote_url_handler",
                &self.remote_url_handler.as_ref().map(|_| "custom"),
            )
            .field("allow_file_references", &self.allow_file_references)
            .field("allow_remote_references", &self.allow_remote_references)
            .field("avoid_index_build", &self.avoid_index_build)
            .field("bypass_document_check", &self.bypass_document_check)
            .field(
                "allow_unknown_extension_content_detection",
                &self.allow_unknown_extension_content_detection,
            )
            .field(
                "skip_external_ref_resolution",
                &self.skip_external_ref_resolution,
            )
            .field(
                "skip_circular_reference_check",
                &self.skip_circular_reference_check,
            )
            .field(
                "ignore_polymorphic_circular_references",
                &self.ignore_polymorphic_circular_references,
            )
            .field(
                "ignore_array_circular_references",
                &self.ignore_array_circular_references,
            )
            .field("transform_sibling_refs", &self.transform_sibling_refs)
            .field(
                "merge_referenced_properties",
                &self.merge_referenced_properties,
            )
            .field("file_filter", &self.file_filter)
            .finish_non_exhaustive()
    }
}

impl DocumentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    pub fn with_spec_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec_file_path = Some(path.into());
        self
    }

    pub fn with_remote_url_handler(mut self, handler: Rc<dyn RemoteUrlHandler>) -> Self {
        self.remote_url_handler = Some(handler);
        self
    }

    pub fn allow_file_references(mut self, allow: bool) -> Self {
        self.allow_file_references = allow;
        self
    }

    pub fn allow_remote_references(mut self, allow: bool) -> Self {
        self.allow_remote_references = allow;
        self
    }

    pub fn with_file_filter(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.file_filter = Some(names.into_iter().map(Into::into).collect());
        self
    }
}
