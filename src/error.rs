//! Error types for `$ref` parsing, resolution, bundling and dereferencing.

use thiserror::Error;

/// Marker carried by every parser error message.
///
/// Parser dispatch rethrows errors that already start with it instead of
/// wrapping them a second time.
pub const PARSE_ERROR_MARKER: &str = "Error parsing";

/// Errors raised while reading, parsing or walking a schema graph.
///
/// Messages are kept as strings so a failed load can be shared by every
/// caller waiting on the same URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // Parse errors (exit code 2)
    #[error("{message}")]
    Parser { url: String, message: String },

    // IO errors (exit code 3)
    #[error("Error resolving {url}: {message}")]
    Resolver { url: String, message: String },

    // Pointer errors (exit code 2)
    #[error("Missing $ref pointer \"{pointer}\". Token \"{token}\" does not exist in {url}")]
    MissingPointer {
        token: String,
        pointer: String,
        url: String,
    },

    #[error("Invalid $ref pointer \"{pointer}\" in {url}: pointers must begin with \"#/\"")]
    InvalidPointer { pointer: String, url: String },

    #[error("Circular $ref pointer found at {url}{pointer}")]
    Circular { url: String, pointer: String },

    #[error("invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("failed to bundle schema: {message}")]
    Bundle { message: String },
}

impl Error {
    /// Build a parser error, prefixing the message with [`PARSE_ERROR_MARKER`].
    pub fn parser(url: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        let url = url.into();
        Error::Parser {
            message: format!("{PARSE_ERROR_MARKER} {url}: {detail}"),
            url,
        }
    }

    pub fn resolver(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Resolver {
            url: url.into(),
            message: message.into(),
        }
    }

    /// The URL of the document the error refers to, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Error::Parser { url, .. }
            | Error::Resolver { url, .. }
            | Error::MissingPointer { url, .. }
            | Error::InvalidPointer { url, .. }
            | Error::Circular { url, .. }
            | Error::InvalidUrl { url, .. } => Some(url),
            Error::Bundle { .. } => None,
        }
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Resolver { .. } => 3,
            _ => 2,
        }
    }
}
