//! Error types shared across the workspace.

use std::fmt;

/// Contract violation on the document surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocError {
    /// A local edit named an index outside the live character range.
    IndexOutOfRange { index: usize, len: usize },
}

impl fmt::Display for DocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocError::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for document of length {len}")
            }
        }
    }
}

impl std::error::Error for DocError {}

/// A peer address that does not match `name@a.b.c.d`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrError {
    input: String,
}

impl AddrError {
    #[must_use]
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for AddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid peer address: {:?}", self.input)
    }
}

impl std::error::Error for AddrError {}
