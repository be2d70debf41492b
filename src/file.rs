//! File descriptors: one record per logical input document.

use serde_json::Value;

use crate::paths::{get_hash, strip_hash};

/// Raw payload of a file once it has been read.
#[derive(Debug, Clone, PartialEq)]
pub enum FileData {
    /// Bytes as read from disk or the network.
    Bytes(Vec<u8>),
    /// Text supplied by the caller.
    Text(String),
    /// An already-decoded value; parsers pass it through unchanged.
    Value(Value),
}

impl FileData {
    /// The payload as text, if it is textual or valid UTF-8.
    pub fn as_text(&self) -> Option<std::borrow::Cow<'_, str>> {
        match self {
            FileData::Text(s) => Some(std::borrow::Cow::Borrowed(s)),
            FileData::Bytes(b) => std::str::from_utf8(b).ok().map(std::borrow::Cow::Borrowed),
            FileData::Value(_) => None,
        }
    }

    pub fn is_bytes(&self) -> bool {
        matches!(self, FileData::Bytes(_))
    }
}

/// One input document.
///
/// The fragment is split off into `hash` and never stays in `url`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    /// Absolute URL of the document, without fragment.
    pub url: String,
    /// JSON-pointer fragment requested for this file, `#` included (may be empty).
    pub hash: String,
    /// Lower-cased extension of the last path segment, dot included (may be empty).
    ///
    /// Only a hint for plugin selection.
    pub extension: String,
    /// Raw payload, present once the file has been read.
    pub data: Option<FileData>,
}

impl FileInfo {
    /// Describe `path` without touching the filesystem or network.
    pub fn new(path: &str) -> Self {
        let url = strip_hash(path);
        Self {
            url: url.to_string(),
            hash: get_hash(path).to_string(),
            extension: extension_of(url),
            data: None,
        }
    }

    /// Attach a payload.
    pub fn with_data(mut self, data: FileData) -> Self {
        self.data = Some(data);
        self
    }

    /// True if the URL ends with one of `extensions` (case-insensitive, dot included).
    pub fn has_extension(&self, extensions: &[&str]) -> bool {
        extensions.contains(&self.extension.as_str())
    }
}

/// A file after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub file: FileInfo,
    pub value: Value,
}

fn extension_of(url: &str) -> String {
    let path = match url.find('?') {
        Some(idx) => &url[..idx],
        None => url,
    };
    let segment = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match segment.rfind('.') {
        Some(idx) => segment[idx..].to_lowercase(),
        None => String::new(),
    }
}
