//! Error accumulation. A single user-visible operation (a model build, a
//! resolver pass) can produce several independent failures; they're
//! collected rather than truncated to the first.

use std::fmt::{self, Display};

use crate::{
    info::SpecInfoError, model::BuilderError, resolver::ResolvingError, rolodex::RolodexError,
};

/// Any error a document operation can surface.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error(transparent)]
    Info(#[from] SpecInfoError),
    #[error(transparent)]
    Builder(#[from] BuilderError),
    #[error(transparent)]
    Resolving(#[from] ResolvingError),
    #[error(transparent)]
    Rolodex(#[from] RolodexError),
    #[error("can't build a {wanted} model from a {actual} document")]
    DialectMismatch { wanted: String, actual: String },
}

/// A collection of errors from one operation. Displaying a `MultiError`
/// prefixes each child with its 0-based position.
#[derive(Debug, Default)]
pub struct MultiError<E = DocumentError> {
    errors: Vec<E>,
}

impl<E> MultiError<E> {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn push(&mut self, error: impl Into<E>) {
        self.errors.push(error.into());
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = impl Into<E>>) {
        self.errors.extend(errors.into_iter().map(Into::into));
    }

    pub fn count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The collected errors, in the order they were recorded.
    pub fn errors(&self) -> &[E] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<E> {
        self.errors
    }

    /// `None` if nothing was collected, so `?`-style call sites can treat
    /// an empty collection as success.
    pub fn or_nil(self) -> Option<Self> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl<E: Display> Display for MultiError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, error) in self.errors.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "[{idx}] {error}")?;
        }
        Ok(())
    }
}

impl<E: Display + fmt::Debug> std::error::Error for MultiError<E> {}
