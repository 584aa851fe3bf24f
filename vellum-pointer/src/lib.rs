use std::{
    borrow::Cow,
    fmt::{self, Display},
    ops::Deref,
};

use itertools::Itertools;

/// A parsed RFC 6901 JSON Pointer.
///
/// Segments are stored unescaped; `~1` and `~0` are decoded at parse time
/// and re-encoded by [`Display`]. An empty pointer addresses the value it's
/// resolved against.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct JsonPointer<'a>(Cow<'a, [PointerSegment<'a>]>);

impl JsonPointer<'static> {
    /// Parses a pointer whose segments own their contents, so the result
    /// can outlive the input string.
    pub fn parse_owned(s: &str) -> Result<Self, PointerSyntaxError> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = s.strip_prefix('/') else {
            return Err(PointerSyntaxError::MissingLeadingSlash);
        };
        let segments = rest
            .split('/')
            .map(|raw| PointerSegment::unescape(raw.to_owned()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(segments.into()))
    }

    /// Builds a pointer from already-unescaped segment values.
    pub fn from_segments<I>(segments: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self(
            segments
                .into_iter()
                .map(|s| PointerSegment(Cow::Owned(s.into())))
                .collect_vec()
                .into(),
        )
    }
}

impl<'a> JsonPointer<'a> {
    /// The empty pointer, which resolves to the current value.
    pub fn root() -> Self {
        Self(Cow::Borrowed(&[]))
    }

    /// Parses a pointer whose segments borrow from the input string
    /// wherever no unescaping is needed.
    pub fn parse(s: &'a str) -> Result<Self, PointerSyntaxError> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = s.strip_prefix('/') else {
            return Err(PointerSyntaxError::MissingLeadingSlash);
        };
        let segments = rest
            .split('/')
            .map(PointerSegment::unescape)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(segments.into()))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the first segment, or `None` for the root pointer.
    pub fn head(&self) -> Option<&PointerSegment<'a>> {
        self.0.first()
    }

    /// Returns the final segment, or `None` for the root pointer.
    pub fn last(&self) -> Option<&PointerSegment<'a>> {
        self.0.last()
    }

    /// Returns everything after the first segment. The tail of a root or
    /// single-segment pointer is the root pointer.
    pub fn tail(&self) -> JsonPointer<'_> {
        self.0
            .get(1..)
            .map(|rest| JsonPointer(rest.into()))
            .unwrap_or_else(JsonPointer::root)
    }

    /// Returns a new pointer with `segment` appended, taking ownership of
    /// all current segments.
    pub fn join(&self, segment: impl Into<String>) -> JsonPointer<'static> {
        let mut segments = self
            .0
            .iter()
            .map(|s| PointerSegment(Cow::Owned(s.as_str().to_owned())))
            .collect_vec();
        segments.push(PointerSegment(Cow::Owned(segment.into())));
        JsonPointer(segments.into())
    }

    /// Iterates this pointer's unescaped segments.
    pub fn segments(&self) -> impl DoubleEndedIterator<Item = &PointerSegment<'a>> + ExactSizeIterator
    {
        self.0.iter()
    }

    /// Returns a pointer whose segments all own their contents.
    pub fn into_owned(self) -> JsonPointer<'static> {
        JsonPointer(
            self.0
                .iter()
                .map(|s| PointerSegment(Cow::Owned(s.as_str().to_owned())))
                .collect_vec()
                .into(),
        )
    }
}

impl Display for JsonPointer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            [] => Ok(()),
            segments => write!(f, "/{}", segments.iter().format("/")),
        }
    }
}

/// A single unescaped pointer segment.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PointerSegment<'a>(Cow<'a, str>);

impl<'a> PointerSegment<'a> {
    /// Decodes one raw (escaped) reference token.
    ///
    /// A bare `~` not followed by `0` or `1` is invalid per RFC 6901 §3.
    pub fn unescape(raw: impl Into<Cow<'a, str>>) -> Result<Self, PointerSyntaxError> {
        let raw = raw.into();
        if !raw.contains('~') {
            return Ok(Self(raw));
        }
        let mut out = String::with_capacity(raw.len());
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            if c != '~' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return Err(PointerSyntaxError::BadEscape(raw.into_owned())),
            }
        }
        Ok(Self(Cow::Owned(out)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interprets this segment as a sequence index. RFC 6901 forbids
    /// leading zeros and signs.
    pub fn to_index(&self) -> Option<usize> {
        match self.0.as_bytes() {
            [b'0'] => Some(0),
            [b'1'..=b'9', rest @ ..] if rest.iter().all(u8::is_ascii_digit) => {
                self.0.parse().ok()
            }
            _ => None,
        }
    }
}

impl Deref for PointerSegment<'_> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for PointerSegment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", escape(&self.0))
    }
}

/// Escapes one reference token for embedding in a pointer string
/// (`~` before `/`, per RFC 6901 §3).
pub fn escape(token: &str) -> Cow<'_, str> {
    if token.contains(['~', '/']) {
        Cow::Owned(token.replace('~', "~0").replace('/', "~1"))
    } else {
        Cow::Borrowed(token)
    }
}

/// Unescapes one reference token (`~1` → `/`, `~0` → `~`).
pub fn unescape(token: &str) -> Result<Cow<'_, str>, PointerSyntaxError> {
    Ok(match PointerSegment::unescape(token)?.0 {
        Cow::Borrowed(s) => Cow::Borrowed(s),
        Cow::Owned(s) => Cow::Owned(s),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum PointerSyntaxError {
    #[error("JSON Pointer must start with `/`")]
    MissingLeadingSlash,
    #[error("invalid `~` escape in reference token {0:?}")]
    BadEscape(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple() {
        let pointer = JsonPointer::parse("/components/schemas/Pet").unwrap();
        let segments: Vec<_> = pointer.segments().map(|s| s.as_str()).collect();
        assert_eq!(segments, ["components", "schemas", "Pet"]);
    }

    #[test]
    fn parse_root() {
        let pointer = JsonPointer::parse("").unwrap();
        assert!(pointer.is_root());
        assert_eq!(pointer.to_string(), "");
    }

    #[test]
    fn reject_missing_slash() {
        assert!(matches!(
            JsonPointer::parse("components/schemas"),
            Err(PointerSyntaxError::MissingLeadingSlash),
        ));
    }

    #[test]
    fn unescape_tokens() {
        let pointer = JsonPointer::parse("/paths/~1pets~1{petId}/get").unwrap();
        assert_eq!(
            pointer.segments().map(|s| s.as_str()).collect::<Vec<_>>(),
            ["paths", "/pets/{petId}", "get"],
        );
    }

    #[test]
    fn tilde_order() {
        // `~01` decodes to the literal text `~1`, not `/`.
        let pointer = JsonPointer::parse("/a~01b").unwrap();
        assert_eq!(pointer.head().unwrap().as_str(), "a~1b");
    }

    #[test]
    fn reject_dangling_tilde() {
        assert!(matches!(
            JsonPointer::parse("/bad~"),
            Err(PointerSyntaxError::BadEscape(_)),
        ));
        assert!(matches!(
            JsonPointer::parse("/bad~2"),
            Err(PointerSyntaxError::BadEscape(_)),
        ));
    }

    #[test]
    fn display_round_trip() {
        for raw in ["", "/a/b/0", "/paths/~1pets/get", "/x~0y~1z"] {
            let pointer = JsonPointer::parse(raw).unwrap();
            assert_eq!(pointer.to_string(), raw);
            let reparsed = JsonPointer::parse_owned(&pointer.to_string()).unwrap();
            assert_eq!(reparsed.to_string(), raw);
        }
    }

    #[test]
    fn escape_unescape_inverse() {
        for token in ["plain", "with/slash", "with~tilde", "~/both/~"] {
            assert_eq!(unescape(&escape(token)).unwrap(), token);
        }
    }

    #[test]
    fn indexes() {
        let pointer = JsonPointer::parse("/data/0/10/01/-1").unwrap();
        let indexes: Vec<_> = pointer.segments().map(|s| s.to_index()).collect();
        assert_eq!(indexes[1], Some(0));
        assert_eq!(indexes[2], Some(10));
        // Leading zeros and signs aren't array indexes.
        assert_eq!(indexes[3], None);
        assert_eq!(indexes[4], None);
    }

    #[test]
    fn join_and_tail() {
        let pointer = JsonPointer::parse("/components/schemas").unwrap();
        let joined = pointer.join("Pet");
        assert_eq!(joined.to_string(), "/components/schemas/Pet");

        let tail = joined.tail();
        assert_eq!(tail.to_string(), "/schemas/Pet");
        assert_eq!(tail.tail().tail().to_string(), "");
    }

    #[test]
    fn join_escapes_on_display() {
        let pointer = JsonPointer::root().join("paths").join("/pets/{petId}");
        assert_eq!(pointer.to_string(), "/paths/~1pets~1{petId}");
    }
}
