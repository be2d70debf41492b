//! Parser plugins: turn a file's raw payload into a value tree.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, PARSE_ERROR_MARKER};
use crate::file::{FileData, FileInfo};
use crate::options::Options;
use crate::plugins::{run, select, Plugin};

const JSON_EXTENSIONS: &[&str] = &[".json"];
const YAML_EXTENSIONS: &[&str] = &[".yaml", ".yml", ".json"];
const TEXT_EXTENSIONS: &[&str] = &[
    ".txt", ".htm", ".html", ".md", ".xml", ".js", ".min", ".map", ".css", ".scss", ".less",
    ".svg",
];
const BINARY_EXTENSIONS: &[&str] = &[".jpeg", ".jpg", ".gif", ".png", ".bmp", ".ico"];

/// A parser plugin.
///
/// `parse` returns `Ok(None)` for a file with no content (e.g. an empty
/// YAML document), which is a success, not an error.
pub trait Parser: Plugin {
    /// Whether an empty result counts as success.
    fn allow_empty(&self) -> bool {
        true
    }

    fn parse(&self, file: &FileInfo) -> Result<Option<Value>, Error>;
}

/// Parse `file` with the configured parsers.
///
/// Parsers that claim the file are tried first, in configured order; if
/// none claims it every parser is tried. Empty content yields `Value::Null`.
///
/// # Errors
///
/// Returns `Error::Parser` carrying `file.url` when every candidate fails.
pub fn parse_file(file: &FileInfo, options: &Options) -> Result<Value, Error> {
    let parsers = options.parse.plugins();
    if parsers.is_empty() {
        return Err(Error::parser(&file.url, "no parsers are enabled"));
    }

    let candidates = select(&parsers, file);
    let outcome = run(&candidates, |parser| {
        let parsed = parser.parse(file)?;
        if !parser.allow_empty() && is_empty(parsed.as_ref()) {
            return Err(Error::parser(
                &file.url,
                format!("parsed value is empty (as {})", parser.name()),
            ));
        }
        Ok(parsed)
    });

    match outcome {
        Ok(Some(handled)) => {
            tracing::debug!(url = %file.url, parser = %handled.plugin, "parsed file");
            Ok(handled.result.unwrap_or(Value::Null))
        }
        Ok(None) => Err(Error::parser(&file.url, "unable to parse")),
        Err(e) if e.to_string().starts_with(PARSE_ERROR_MARKER) => Err(e),
        Err(e) => Err(Error::parser(&file.url, e)),
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::Array(arr)) => arr.is_empty(),
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn require_data(file: &FileInfo) -> Result<&FileData, Error> {
    file.data
        .as_ref()
        .ok_or_else(|| Error::parser(&file.url, "file has not been read"))
}

fn require_text<'a>(file: &'a FileInfo, data: &'a FileData) -> Result<std::borrow::Cow<'a, str>, Error> {
    data.as_text()
        .ok_or_else(|| Error::parser(&file.url, "content is not valid UTF-8 text"))
}

/// JSON parser with leading-noise recovery.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonParser;

impl Plugin for JsonParser {
    fn name(&self) -> &str {
        "json"
    }

    fn can_handle(&self, file: &FileInfo) -> bool {
        file.has_extension(JSON_EXTENSIONS)
    }
}

impl Parser for JsonParser {
    fn parse(&self, file: &FileInfo) -> Result<Option<Value>, Error> {
        let data = require_data(file)?;
        if let FileData::Value(value) = data {
            return Ok(Some(value.clone()));
        }

        let text = require_text(file, data)?;
        let text = text.trim_start_matches('\u{feff}');
        if text.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str(text) {
            Ok(value) => Ok(Some(value)),
            Err(first) => {
                // Servers sometimes prepend banners or comments before the body
                match text.find('{') {
                    Some(idx) if idx > 0 => serde_json::from_str(&text[idx..])
                        .map(Some)
                        .map_err(|e| Error::parser(&file.url, e)),
                    _ => Err(Error::parser(&file.url, first)),
                }
            }
        }
    }
}

/// YAML parser (a superset of JSON).
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlParser;

impl Plugin for YamlParser {
    fn name(&self) -> &str {
        "yaml"
    }

    fn can_handle(&self, file: &FileInfo) -> bool {
        file.has_extension(YAML_EXTENSIONS)
    }
}

impl Parser for YamlParser {
    fn parse(&self, file: &FileInfo) -> Result<Option<Value>, Error> {
        let data = require_data(file)?;
        if let FileData::Value(value) = data {
            return Ok(Some(value.clone()));
        }

        let text = require_text(file, data)?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_yaml::from_str::<Value>(&text)
            .map(Some)
            .map_err(|e| Error::parser(&file.url, e))
    }
}

/// Plain-text parser for text-like extensions.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextParser;

impl Plugin for TextParser {
    fn name(&self) -> &str {
        "text"
    }

    fn can_handle(&self, file: &FileInfo) -> bool {
        matches!(file.data, Some(FileData::Text(_) | FileData::Bytes(_)))
            && file.has_extension(TEXT_EXTENSIONS)
    }
}

impl Parser for TextParser {
    fn parse(&self, file: &FileInfo) -> Result<Option<Value>, Error> {
        match require_data(file)? {
            FileData::Text(s) => Ok(Some(Value::String(s.clone()))),
            FileData::Bytes(b) => Ok(Some(Value::String(String::from_utf8_lossy(b).into_owned()))),
            FileData::Value(_) => Err(Error::parser(&file.url, "data is not text")),
        }
    }
}

/// Binary parser for image-like extensions.
///
/// The bytes become an array of numbers.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryParser;

impl Plugin for BinaryParser {
    fn name(&self) -> &str {
        "binary"
    }

    fn can_handle(&self, file: &FileInfo) -> bool {
        file.data.as_ref().map_or(false, FileData::is_bytes)
            && file.has_extension(BINARY_EXTENSIONS)
    }
}

impl Parser for BinaryParser {
    fn parse(&self, file: &FileInfo) -> Result<Option<Value>, Error> {
        let bytes: &[u8] = match require_data(file)? {
            FileData::Bytes(b) => b,
            FileData::Text(s) => s.as_bytes(),
            FileData::Value(_) => return Err(Error::parser(&file.url, "data is not binary")),
        };
        Ok(Some(Value::Array(
            bytes.iter().map(|b| Value::from(*b)).collect(),
        )))
    }
}

/// The built-in parsers in priority order.
pub fn default_parsers() -> Vec<Arc<dyn Parser>> {
    vec![
        Arc::new(JsonParser),
        Arc::new(YamlParser),
        Arc::new(TextParser),
        Arc::new(BinaryParser),
    ]
}
