//! Schema Refs
//!
//! Parse, resolve, dereference and bundle JSON Schema / OpenAPI documents
//! whose `$ref`s point within the document, at other files, or at HTTP(S) URLs.
//!
//! # Example
//!
//! ```
//! use schema_refs::{bundle_value, dereference_value, Options};
//! use serde_json::json;
//!
//! let schema = json!({
//!     "definitions": {
//!         "node": {
//!             "type": "object",
//!             "properties": { "next": { "$ref": "#/definitions/node" } }
//!         }
//!     },
//!     "properties": { "head": { "$ref": "#/definitions/node" } }
//! });
//!
//! let options = Options::default();
//! let result = dereference_value(schema.clone(), "/schemas/list.json", &options).unwrap();
//!
//! // "head" and the definition are the same node, and it points at itself
//! assert!(result.circular);
//! assert_eq!(result.get("#/properties/head"), result.get("#/definitions/node"));
//! assert_eq!(
//!     result.get("#/properties/head/properties/next"),
//!     result.get("#/definitions/node")
//! );
//!
//! // Internal refs survive bundling unchanged
//! assert_eq!(bundle_value(schema.clone(), "/schemas/list.json", &options).unwrap(), schema);
//! ```
//!
//! # Circular refs
//!
//! | `Circular` | Effect at a cycle |
//! |------------|-------------------|
//! | `Allow` (default) | The ref becomes a back-edge to the node being built |
//! | `Ignore` | The `$ref` object is kept as-is |
//! | `Forbid` | Fails with `Error::Circular` |
//!
//! # Formats
//!
//! JSON and YAML documents are decoded to values; text files become strings
//! and images become byte arrays. Extra formats and URL schemes plug in via
//! [`Options::with_parser`] and [`Options::with_resolver`].

mod bundle;
mod dereference;
mod error;
mod file;
mod graph;
mod options;
mod parsers;
mod paths;
mod plugins;
mod pointer;
mod refs;
mod resolvers;

use serde_json::Value;

pub use bundle::{bundle, bundle_value, EXTERNAL_KEY};
pub use dereference::{dereference, dereference_value, Dereferenced};
pub use error::Error;
pub use file::{Document, FileData, FileInfo};
pub use graph::{Graph, Node, NodeId};
pub use options::{
    Circular, DereferenceOptions, FetchOptions, Method, Options, ParseOptions, ResolveOptions,
    Settings, HTTP_TIMEOUT, MAX_REDIRECTS,
};
pub use parsers::{parse_file, BinaryParser, JsonParser, Parser, TextParser, YamlParser};
pub use paths::{resolve as resolve_url, to_absolute};
pub use plugins::Plugin;
pub use pointer::evaluate as evaluate_pointer;
pub use refs::{Refs, Target};
pub use resolvers::{read_file, FileResolver, Resolver};

#[cfg(feature = "remote")]
pub use resolvers::{send_request, HttpResolver, RequestOptions};

/// Read and decode the document at `path` without following any `$ref`.
///
/// # Errors
///
/// Returns `Error::Resolver` if it cannot be read and `Error::Parser` if no
/// enabled parser can decode it.
pub fn parse(path: &str, options: &Options) -> Result<Value, Error> {
    let absolute = to_absolute(path)?;
    let refs = Refs::new(&absolute);
    let document = refs.load(&absolute, options)?;
    Ok(document.value.clone())
}

/// Load the document at `path` and every document its `$ref`s reach.
///
/// Nothing is rewritten; the returned [`Refs`] maps each URL to its decoded
/// document and evaluates refs against them.
pub fn resolve(path: &str, options: &Options) -> Result<Refs, Error> {
    let absolute = to_absolute(path)?;
    let refs = Refs::new(&absolute);
    let document = refs.load(&absolute, options)?;
    refs.crawl(&document.value, refs.root_url(), options)?;
    Ok(refs)
}

/// [`resolve`] for an already-decoded root located at `base`.
pub fn resolve_value(schema: Value, base: &str, options: &Options) -> Result<Refs, Error> {
    let refs = dereference::root_refs(schema, base, options)?;
    let document = refs.load(refs.root_url(), options)?;
    refs.crawl(&document.value, refs.root_url(), options)?;
    Ok(refs)
}
