//! Identifies what kind of specification a blob of bytes claims to be
//! (Swagger 2, OpenAPI 3.x, AsyncAPI, Arazzo) before anything downstream
//! commits to a dialect.

use std::cell::RefCell;

use crossbeam_channel::Receiver;
use semver::Version;

use crate::cst::{self, Node, SyntaxError};

/// The discriminator keyword a document carried at its root.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SpecType {
    Swagger,
    OpenApi,
    AsyncApi,
    Arazzo,
    Unknown,
}

impl SpecType {
    pub fn discriminator(self) -> &'static str {
        match self {
            Self::Swagger => "swagger",
            Self::OpenApi => "openapi",
            Self::AsyncApi => "asyncapi",
            Self::Arazzo => "arazzo",
            Self::Unknown => "",
        }
    }
}

/// The refined dialect, once the version has been inspected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SpecFormat {
    Oas2,
    Oas3,
    Oas31,
    AsyncApi,
    Arazzo,
    Unknown,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileType {
    Yaml,
    Json,
}

/// Canonical schema identifiers for each dialect, kept for downstream
/// tooling that wants to validate against the official schemas.
pub const OAS2_SCHEMA_ID: &str = "https://swagger.io/v2/schema.json";
pub const OAS3_SCHEMA_ID: &str = "https://spec.openapis.org/oas/3.0/schema/2021-09-28";
pub const OAS31_SCHEMA_ID: &str = "https://spec.openapis.org/oas/3.1/schema/2022-10-07";
pub const ASYNCAPI_SCHEMA_ID: &str = "https://asyncapi.com/definitions/asyncapi.json";
pub const ARAZZO_SCHEMA_ID: &str = "https://spec.openapis.org/arazzo/1.0/schema/2024-07-01";

/// Everything learned from the first look at a document.
#[derive(Debug)]
pub struct SpecInfo {
    pub spec_type: SpecType,
    pub format: SpecFormat,
    pub file_type: FileType,
    /// The version string exactly as written in the document.
    pub version: String,
    /// The scalar node carrying the version, for error reporting.
    pub version_node: Option<Node>,
    pub root_node: Node,
    pub spec_bytes: Vec<u8>,
    /// Schema identifier for the detected dialect, if known.
    pub api_schema: Option<&'static str>,
    json_rx: Receiver<Vec<u8>>,
    json_bytes: RefCell<Option<Vec<u8>>>,
}

impl SpecInfo {
    /// A one-shot completion signal for the JSON byte form, which is
    /// derived on a background thread. Callers may keep working with the
    /// CST while it materializes.
    pub fn json_signal(&self) -> &Receiver<Vec<u8>> {
        &self.json_rx
    }

    /// The document re-encoded as JSON. Blocks until the background
    /// derivation finishes; subsequent calls return the cached bytes.
    pub fn json_bytes(&self) -> Vec<u8> {
        if let Some(bytes) = self.json_bytes.borrow().as_ref() {
            return bytes.clone();
        }
        let bytes = self.json_rx.recv().unwrap_or_default();
        *self.json_bytes.borrow_mut() = Some(bytes.clone());
        bytes
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpecInfoError {
    #[error("document is empty")]
    Empty,
    #[error("document is not valid UTF-8")]
    Encoding,
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("no `swagger`, `openapi`, `asyncapi` or `arazzo` key at the document root")]
    UnknownSpecType,
    #[error("can't parse {discriminator} version {version:?}")]
    VersionParse {
        discriminator: &'static str,
        version: String,
    },
    #[error("version {version:?} isn't valid for a {discriminator} document")]
    VersionMismatch {
        discriminator: &'static str,
        version: String,
    },
}

/// Extracts [`SpecInfo`] from raw bytes, requiring a recognized dialect.
pub fn extract(bytes: &[u8]) -> Result<SpecInfo, SpecInfoError> {
    extract_with_document_check(bytes, false)
}

/// As [`extract`], but `bypass_document_check` lets unrecognized documents
/// through with [`SpecType::Unknown`].
pub fn extract_with_document_check(
    bytes: &[u8],
    bypass_document_check: bool,
) -> Result<SpecInfo, SpecInfoError> {
    let text = std::str::from_utf8(bytes).map_err(|_| SpecInfoError::Encoding)?;
    if text.trim().is_empty() {
        return Err(SpecInfoError::Empty);
    }
    let trimmed = text.trim();
    let file_type = if trimmed.starts_with('{') && trimmed.ends_with('}') {
        FileType::Json
    } else {
        FileType::Yaml
    };
    let doc = cst::parse(text)?;
    let root = doc.unwrap_document();

    let mut detected = None;
    for spec_type in [
        SpecType::Swagger,
        SpecType::OpenApi,
        SpecType::AsyncApi,
        SpecType::Arazzo,
    ] {
        if let Some(node) = root.get(spec_type.discriminator()) {
            detected = Some((spec_type, node));
            break;
        }
    }

    let (spec_type, format, version, version_node) = match detected {
        Some((spec_type, node)) => {
            let version = node.value();
            let format = classify(spec_type, &version)?;
            (spec_type, format, version, Some(node))
        }
        None if bypass_document_check => {
            (SpecType::Unknown, SpecFormat::Unknown, String::new(), None)
        }
        None => return Err(SpecInfoError::UnknownSpecType),
    };

    let api_schema = match format {
        SpecFormat::Oas2 => Some(OAS2_SCHEMA_ID),
        SpecFormat::Oas3 => Some(OAS3_SCHEMA_ID),
        SpecFormat::Oas31 => Some(OAS31_SCHEMA_ID),
        SpecFormat::AsyncApi => Some(ASYNCAPI_SCHEMA_ID),
        SpecFormat::Arazzo => Some(ARAZZO_SCHEMA_ID),
        SpecFormat::Unknown => None,
    };

    // Derive the JSON byte form off-thread; the signal fires once the
    // bytes are ready. The source is re-parsed locally so nothing
    // thread-bound crosses over.
    let (tx, rx) = crossbeam_channel::bounded(1);
    let source = text.to_owned();
    std::thread::spawn(move || {
        let bytes = cst::parse(&source)
            .map(|doc| cst::render_json(&doc, 0))
            .unwrap_or_default();
        let _ = tx.send(bytes);
    });

    Ok(SpecInfo {
        spec_type,
        format,
        file_type,
        version,
        version_node,
        root_node: doc,
        spec_bytes: bytes.to_vec(),
        api_schema,
        json_rx: rx,
        json_bytes: RefCell::new(None),
    })
}

/// Checks the version string against the dialect's allowed majors and
/// refines the format.
fn classify(spec_type: SpecType, version: &str) -> Result<SpecFormat, SpecInfoError> {
    let discriminator = match spec_type {
        SpecType::Swagger => "swagger",
        SpecType::OpenApi => "openapi",
        SpecType::AsyncApi => "asyncapi",
        SpecType::Arazzo => "arazzo",
        SpecType::Unknown => return Ok(SpecFormat::Unknown),
    };
    let parsed = parse_loose_version(version).ok_or_else(|| SpecInfoError::VersionParse {
        discriminator,
        version: version.to_owned(),
    })?;
    let mismatch = || SpecInfoError::VersionMismatch {
        discriminator,
        version: version.to_owned(),
    };
    match spec_type {
        SpecType::Swagger => {
            if parsed.major > 2 {
                return Err(mismatch());
            }
            Ok(SpecFormat::Oas2)
        }
        SpecType::OpenApi => {
            if parsed.major < 3 {
                return Err(mismatch());
            }
            if parsed.major == 3 && parsed.minor == 0 {
                Ok(SpecFormat::Oas3)
            } else {
                Ok(SpecFormat::Oas31)
            }
        }
        SpecType::AsyncApi => {
            if parsed.major != 2 && parsed.major != 3 {
                return Err(mismatch());
            }
            Ok(SpecFormat::AsyncApi)
        }
        SpecType::Arazzo => {
            if parsed.major != 1 {
                return Err(mismatch());
            }
            Ok(SpecFormat::Arazzo)
        }
        SpecType::Unknown => Ok(SpecFormat::Unknown),
    }
}

/// Parses version strings that aren't full semver triples (`2.0`, `3`)
/// by padding the missing components.
fn parse_loose_version(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let dots = raw.split('.').count();
    let padded = match dots {
        1 => format!("{raw}.0.0"),
        2 => format!("{raw}.0"),
        _ => raw.to_owned(),
    };
    Version::parse(&padded).ok()
}
