//! The rolodex: a virtual filesystem over every document a reference can
//! lead to. Local directories and remote endpoints sit behind the same
//! `open` call; each absolute location is fetched and parsed at most once,
//! and the parsed entry (bytes, CST, child index) is retained for the life
//! of the rolodex.
//!
//! Per-file failures are *caught*, not thrown: a broken external reference
//! shouldn't take down the whole build, so the error lands in
//! [`Rolodex::caught_errors`] and the caller keeps whatever else resolved.

mod local;
mod remote;

pub use local::{normalize, LocalFs};
pub use remote::{HttpRemoteHandler, RemoteFetchError, RemoteUrlHandler, DEFAULT_REMOTE_TIMEOUT};

use std::{
    cell::{Cell, RefCell},
    path::{Path, PathBuf},
    rc::Rc,
};

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::DocumentConfig,
    cst::{self, Node, SyntaxError},
    index::SpecIndex,
};

/// Where a document came from, which is also the base for resolving its
/// own relative references.
#[derive(Clone, Debug)]
pub enum Origin {
    /// A local document; the path is its containing directory.
    Local(PathBuf),
    /// A remote document; the URL is the document's own URL.
    Remote(Url),
}

/// One opened and parsed document.
#[derive(Debug)]
pub struct RolodexEntry {
    pub absolute_location: String,
    pub bytes: Vec<u8>,
    pub root: Node,
    pub extension: String,
    pub origin: Origin,
    /// Filesystem mtime for local files; `None` for remote and in-memory
    /// entries.
    pub last_modified: Option<std::time::SystemTime>,
    /// The child index built over this document, once the spec index gets
    /// around to it.
    pub index: RefCell<Option<Rc<SpecIndex>>>,
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct Rolodex {
    config: Rc<DocumentConfig>,
    local: LocalFs,
    entries: RefCell<IndexMap<String, Rc<RolodexEntry>>>,
    opening: RefCell<FxHashSet<String>>,
    caught: RefCell<Vec<RolodexError>>,
    hits: Cell<u64>,
    misses: Cell<u64>,
}

impl Rolodex {
    pub fn new(config: Rc<DocumentConfig>) -> Self {
        let base = config
            .base_path
            .clone()
            .or_else(|| {
                config
                    .spec_file_path
                    .as_ref()
                    .and_then(|p| p.parent().map(Path::to_path_buf))
            })
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            local: LocalFs::new(base),
            config,
            entries: RefCell::new(IndexMap::new()),
            opening: RefCell::new(FxHashSet::default()),
            caught: RefCell::new(Vec::new()),
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn config_rc(&self) -> Rc<DocumentConfig> {
        self.config.clone()
    }

    /// The origin the root document resolves its references from.
    pub fn root_origin(&self) -> Origin {
        match &self.config.base_url {
            Some(url) => Origin::Remote(url.clone()),
            None => Origin::Local(self.local.base().to_path_buf()),
        }
    }

    /// Opens a reference relative to the root document.
    pub fn open(&self, reference: &str) -> Result<Rc<RolodexEntry>, RolodexError> {
        self.open_from(&self.root_origin(), reference)
    }

    /// Opens a reference relative to the document at `origin`.
    pub fn open_from(
        &self,
        origin: &Origin,
        reference: &str,
    ) -> Result<Rc<RolodexEntry>, RolodexError> {
        if is_remote(reference) {
            let url = Url::parse(reference).map_err(|err| RolodexError::BadLocation {
                location: reference.to_owned(),
                message: err.to_string(),
            })?;
            return self.open_remote(url);
        }
        match origin {
            Origin::Remote(base) => {
                let url = base
                    .join(reference)
                    .map_err(|err| RolodexError::BadLocation {
                        location: reference.to_owned(),
                        message: err.to_string(),
                    })?;
                self.open_remote(url)
            }
            Origin::Local(dir) => self.open_local(dir, Path::new(reference)),
        }
    }

    fn open_local(&self, dir: &Path, path: &Path) -> Result<Rc<RolodexEntry>, RolodexError> {
        if !self.config.allow_file_references {
            return Err(RolodexError::FileReferencesDisallowed {
                location: path.display().to_string(),
            });
        }
        let resolved = if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&dir.join(path))
        };
        let location = resolved.display().to_string();
        if let Some(entry) = self.cached(&location) {
            return Ok(entry);
        }
        self.check_admissible(&location)?;
        let guard = OpenGuard::enter(self, &location)?;
        let (actual, bytes) = self
            .local
            .open(&resolved)
            .map_err(|err| RolodexError::NotFound {
                location: location.clone(),
                message: err.to_string(),
            })?;
        let origin = Origin::Local(
            actual
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        );
        let last_modified = std::fs::metadata(&actual)
            .and_then(|meta| meta.modified())
            .ok();
        let entry = self.admit_with_mtime(location, bytes, origin, last_modified)?;
        drop(guard);
        Ok(entry)
    }

    fn open_remote(&self, url: Url) -> Result<Rc<RolodexEntry>, RolodexError> {
        if !self.config.allow_remote_references {
            return Err(RolodexError::RemoteReferencesDisallowed {
                location: url.to_string(),
            });
        }
        // Fragments never reach the transport.
        let mut url = url;
        url.set_fragment(None);
        let location = url.to_string();
        if let Some(entry) = self.cached(&location) {
            return Ok(entry);
        }
        self.check_admissible(&location)?;
        if let Some(cancel) = &self.config.cancel {
            if cancel.is_cancelled() {
                return Err(RolodexError::Cancelled {
                    location: location.clone(),
                });
            }
        }
        let guard = OpenGuard::enter(self, &location)?;
        let bytes = match &self.config.remote_url_handler {
            Some(handler) => handler.fetch(&url),
            None => {
                let handler =
                    HttpRemoteHandler::new().map_err(|err| RolodexError::RemoteFetch {
                        location: location.clone(),
                        message: err.to_string(),
                    })?;
                handler.fetch(&url)
            }
        }
        .map_err(|err| RolodexError::RemoteFetch {
            location: location.clone(),
            message: err.message,
        })?;
        let entry = self.admit(location, bytes, Origin::Remote(url))?;
        drop(guard);
        Ok(entry)
    }

    fn cached(&self, location: &str) -> Option<Rc<RolodexEntry>> {
        let hit = self.entries.borrow().get(location).cloned();
        match hit {
            Some(entry) => {
                self.hits.set(self.hits.get() + 1);
                debug!(location, "rolodex cache hit");
                Some(entry)
            }
            None => {
                self.misses.set(self.misses.get() + 1);
                None
            }
        }
    }

    /// Extension and filter checks that happen before any I/O.
    fn check_admissible(&self, location: &str) -> Result<(), RolodexError> {
        let name = location.rsplit(['/', '\\']).next().unwrap_or(location);
        if let Some(filter) = &self.config.file_filter {
            if !filter.iter().any(|allowed| allowed == name) {
                return Err(RolodexError::Filtered {
                    location: location.to_owned(),
                });
            }
        }
        let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
        let known = matches!(extension, "yaml" | "yml" | "json");
        if !known && !self.config.allow_unknown_extension_content_detection {
            return Err(RolodexError::UnsupportedExtension {
                location: location.to_owned(),
                extension: extension.to_owned(),
            });
        }
        Ok(())
    }

    /// Parses fetched bytes and caches the entry. With content detection
    /// on, anything that parses to a YAML/JSON tree is admitted.
    fn admit(
        &self,
        location: String,
        bytes: Vec<u8>,
        origin: Origin,
    ) -> Result<Rc<RolodexEntry>, RolodexError> {
        self.admit_with_mtime(location, bytes, origin, None)
    }

    fn admit_with_mtime(
        &self,
        location: String,
        bytes: Vec<u8>,
        origin: Origin,
        last_modified: Option<std::time::SystemTime>,
    ) -> Result<Rc<RolodexEntry>, RolodexError> {
        let extension = location
            .rsplit(['/', '\\'])
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_owned())
            .unwrap_or_default();
        let root = cst::parse_bytes(&bytes).map_err(|err| RolodexError::Syntax {
            location: location.clone(),
            source: err,
        })?;
        let entry = Rc::new(RolodexEntry {
            absolute_location: location.clone(),
            bytes,
            root,
            extension,
            origin,
            last_modified,
            index: RefCell::new(None),
        });
        self.entries.borrow_mut().insert(location, entry.clone());
        Ok(entry)
    }

    /// Seeds the cache with an in-memory file, so references to
    /// `location` resolve without touching disk or network. Useful for
    /// composing documents that were never written anywhere.
    pub fn add_in_memory_file(
        &self,
        location: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Result<Rc<RolodexEntry>, RolodexError> {
        let location = location.into();
        if location.starts_with("http://") || location.starts_with("https://") {
            let url = Url::parse(&location).map_err(|err| RolodexError::BadLocation {
                location: location.clone(),
                message: err.to_string(),
            })?;
            return self.admit(location, bytes.into(), Origin::Remote(url));
        }
        // Store under the same normalized key `open` computes, so a later
        // reference to the same path is a cache hit.
        let normalized = normalize(&self.local.base().join(&location));
        let origin = Origin::Local(
            normalized
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        );
        self.admit(normalized.display().to_string(), bytes.into(), origin)
    }

    /// Records a non-fatal error for later inspection.
    pub fn catch(&self, err: RolodexError) {
        warn!(error = %err, "caught rolodex error");
        self.caught.borrow_mut().push(err);
    }

    pub fn caught_errors(&self) -> std::cell::Ref<'_, Vec<RolodexError>> {
        self.caught.borrow()
    }

    pub fn entries(&self) -> Vec<Rc<RolodexEntry>> {
        self.entries.borrow().values().cloned().collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.get(),
            misses: self.misses.get(),
        }
    }

    pub fn clear_cache(&self) {
        self.entries.borrow_mut().clear();
        self.hits.set(0);
        self.misses.set(0);
    }
}

impl std::fmt::Debug for Rolodex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rolodex")
            .field("entries", &self.entries.borrow().len())
            .field("caught", &self.caught.borrow().len())
            .field("stats", &self.cache_stats())
            .finish_non_exhaustive()
    }
}

/// Marks a location as being parsed, so a reference cycle that re-enters
/// the same file mid-parse fails fast instead of recursing forever.
struct OpenGuard<'a> {
    rolodex: &'a Rolodex,
    location: String,
}

impl<'a> OpenGuard<'a> {
    fn enter(rolodex: &'a Rolodex, location: &str) -> Result<Self, RolodexError> {
        if !rolodex.opening.borrow_mut().insert(location.to_owned()) {
            return Err(RolodexError::ReentrantOpen {
                location: location.to_owned(),
            });
        }
        Ok(Self {
            rolodex,
            location: location.to_owned(),
        })
    }
}

impl Drop for OpenGuard<'_> {
    fn drop(&mut self) {
        self.rolodex.opening.borrow_mut().remove(&self.location);
    }
}

fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

#[derive(Debug, thiserror::Error)]
pub enum RolodexError {
    #[error("can't open {location}: {message}")]
    NotFound { location: String, message: String },
    #[error("remote fetch of {location} failed: {message}")]
    RemoteFetch { location: String, message: String },
    #[error("{location} has unsupported extension {extension:?}; enable content detection to open it")]
    UnsupportedExtension {
        location: String,
        extension: String,
    },
    #[error("{location} was excluded by the file filter")]
    Filtered { location: String },
    #[error("file references are disabled; can't open {location}")]
    FileReferencesDisallowed { location: String },
    #[error("remote references are disabled; can't open {location}")]
    RemoteReferencesDisallowed { location: String },
    #[error("{location} isn't a valid location: {message}")]
    BadLocation { location: String, message: String },
    #[error("{location} failed to parse")]
    Syntax {
        location: String,
        #[source]
        source: SyntaxError,
    },
    #[error("{location} is already being opened; reference cycle between files")]
    ReentrantOpen { location: String },
    #[error("open of {location} was cancelled")]
    Cancelled { location: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vellum-rolodex-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn file_config(base: &Path) -> Rc<DocumentConfig> {
        Rc::new(
            DocumentConfig::new()
                .with_base_path(base)
                .allow_file_references(true),
        )
    }

    #[test]
    fn opens_and_caches_local_files() {
        let dir = temp_dir("cache");
        write_temp(&dir, "pet.yaml", "type: object\n");
        let rolodex = Rolodex::new(file_config(&dir));

        let first = rolodex.open("pet.yaml").unwrap();
        assert!(first.root.unwrap_document().is_mapping());
        let second = rolodex.open("pet.yaml").unwrap();
        assert!(Rc::ptr_eq(&first, &second));

        let stats = rolodex.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn relative_references_resolve_against_origin() {
        let dir = temp_dir("origin");
        std::fs::create_dir_all(dir.join("models")).unwrap();
        write_temp(&dir, "root.yaml", "openapi: 3.0.1\n");
        write_temp(&dir.join("models"), "pet.yaml", "type: object\n");

        let rolodex = Rolodex::new(file_config(&dir));
        let entry = rolodex.open("models/pet.yaml").unwrap();
        // A reference inside pet.yaml resolves against models/, not the root.
        let sibling_origin = entry.origin.clone();
        write_temp(&dir.join("models"), "tag.yaml", "type: string\n");
        let tag = rolodex.open_from(&sibling_origin, "tag.yaml").unwrap();
        assert!(tag.absolute_location.ends_with("models/tag.yaml"));
    }

    #[test]
    fn file_references_require_opt_in() {
        let dir = temp_dir("optin");
        write_temp(&dir, "pet.yaml", "type: object\n");
        let rolodex = Rolodex::new(Rc::new(DocumentConfig::new().with_base_path(&dir)));
        assert!(matches!(
            rolodex.open("pet.yaml"),
            Err(RolodexError::FileReferencesDisallowed { .. }),
        ));
    }

    #[test]
    fn remote_references_require_opt_in() {
        let rolodex = Rolodex::new(Rc::new(DocumentConfig::new()));
        assert!(matches!(
            rolodex.open("https://example.com/openapi.yaml"),
            Err(RolodexError::RemoteReferencesDisallowed { .. }),
        ));
    }

    #[test]
    fn unknown_extensions_need_content_detection() {
        let dir = temp_dir("ext");
        write_temp(&dir, "spec.txt", "openapi: 3.0.1\n");
        let strict = Rolodex::new(file_config(&dir));
        assert!(matches!(
            strict.open("spec.txt"),
            Err(RolodexError::UnsupportedExtension { .. }),
        ));

        let mut config = DocumentConfig::new()
            .with_base_path(&dir)
            .allow_file_references(true);
        config.allow_unknown_extension_content_detection = true;
        let lenient = Rolodex::new(Rc::new(config));
        let entry = lenient.open("spec.txt").unwrap();
        assert_eq!(
            entry.root.unwrap_document().get("openapi").unwrap().value(),
            "3.0.1",
        );
    }

    #[test]
    fn file_filter_blocks_unlisted_names() {
        let dir = temp_dir("filter");
        write_temp(&dir, "pet.yaml", "type: object\n");
        write_temp(&dir, "secret.yaml", "type: object\n");
        let config = DocumentConfig::new()
            .with_base_path(&dir)
            .allow_file_references(true)
            .with_file_filter(["pet.yaml"]);
        let rolodex = Rolodex::new(Rc::new(config));
        assert!(rolodex.open("pet.yaml").is_ok());
        assert!(matches!(
            rolodex.open("secret.yaml"),
            Err(RolodexError::Filtered { .. }),
        ));
    }

    #[test]
    fn caught_errors_accumulate() {
        let dir = temp_dir("caught");
        let rolodex = Rolodex::new(file_config(&dir));
        let err = rolodex.open("missing.yaml").unwrap_err();
        rolodex.catch(err);
        assert_eq!(rolodex.caught_errors().len(), 1);
    }

    #[test]
    fn in_memory_files_resolve_without_io() {
        let config = DocumentConfig::new().allow_file_references(true);
        let rolodex = Rolodex::new(Rc::new(config));
        rolodex
            .add_in_memory_file("./models/pet.yaml", "type: object\n")
            .unwrap();
        let entry = rolodex.open("./models/pet.yaml").unwrap();
        assert_eq!(
            entry.root.unwrap_document().get("type").unwrap().value(),
            "object",
        );
        assert_eq!(rolodex.cache_stats().hits, 1);
    }

    #[test]
    fn custom_remote_handler() {
        struct Stub;
        impl RemoteUrlHandler for Stub {
            fn fetch(&self, _url: &Url) -> Result<Vec<u8>, RemoteFetchError> {
                Ok(b"type: object\n".to_vec())
            }
        }
        let mut config = DocumentConfig::new();
        config.allow_remote_references = true;
        config.remote_url_handler = Some(Rc::new(Stub));
        let rolodex = Rolodex::new(Rc::new(config));
        let entry = rolodex
            .open("https://example.com/models/pet.yaml")
            .unwrap();
        assert!(entry.root.unwrap_document().is_mapping());
        assert!(matches!(entry.origin, Origin::Remote(_)));
    }
}
