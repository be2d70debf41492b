//! Bundling: fold a multi-file schema into one self-contained document.
//!
//! Refs that already point inside the root document are kept. Every other
//! target is copied once under `$$external` in the root and each ref to it
//! is rewritten to `#/$$external/<name>`. Only internal refs remain.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::dereference::root_refs;
use crate::error::Error;
use crate::file::Document;
use crate::options::Options;
use crate::paths::{get_hash, resolve, strip_hash, to_absolute};
use crate::pointer::{self, escape};
use crate::refs::Refs;

/// Root key holding inlined external content.
pub const EXTERNAL_KEY: &str = "$$external";

/// Bundle the document at `path` (file path or URL).
///
/// # Errors
///
/// Returns load errors for unreadable documents, `Error::MissingPointer` for
/// refs to missing locations, and `Error::Bundle` if external content must be
/// inlined but the root is not an object.
pub fn bundle(path: &str, options: &Options) -> Result<Value, Error> {
    let absolute = to_absolute(path)?;
    let refs = Refs::new(&absolute);
    let document = refs.load(&absolute, options)?;
    bundle_document(&refs, &document, options)
}

/// Bundle an already-decoded schema located at `base`.
pub fn bundle_value(schema: Value, base: &str, options: &Options) -> Result<Value, Error> {
    let refs = root_refs(schema, base, options)?;
    let document = refs.load(refs.root_url(), options)?;
    bundle_document(&refs, &document, options)
}

fn bundle_document(refs: &Refs, document: &Arc<Document>, options: &Options) -> Result<Value, Error> {
    let mut root = document.value.clone();

    // Keep names already present from an earlier bundle
    let used: HashSet<String> = root
        .get(EXTERNAL_KEY)
        .and_then(Value::as_object)
        .map(|existing| existing.keys().cloned().collect())
        .unwrap_or_default();

    let mut bundler = Bundler {
        refs,
        options,
        root_url: refs.root_url().to_string(),
        names: HashMap::new(),
        used,
        inlined: Map::new(),
    };
    let root_url = bundler.root_url.clone();
    bundler.rewrite(&mut root, &root_url)?;

    if bundler.inlined.is_empty() {
        return Ok(root);
    }
    tracing::debug!(url = %root_url, inlined = bundler.inlined.len(), "bundled external refs");

    let Some(obj) = root.as_object_mut() else {
        return Err(Error::Bundle {
            message: format!(
                "root of {root_url} is not an object; cannot hold {EXTERNAL_KEY}"
            ),
        });
    };
    match obj.get_mut(EXTERNAL_KEY) {
        Some(Value::Object(existing)) => existing.extend(bundler.inlined),
        Some(other) => {
            return Err(Error::Bundle {
                message: format!(
                    "{EXTERNAL_KEY} in {root_url} is {}, not an object; refusing to overwrite it",
                    kind(other)
                ),
            });
        }
        None => {
            obj.insert(EXTERNAL_KEY.to_string(), Value::Object(bundler.inlined));
        }
    }
    Ok(root)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

struct Bundler<'a> {
    refs: &'a Refs,
    options: &'a Options,
    root_url: String,
    /// Document URL -> (pointer, name) of each target inlined from it.
    names: HashMap<String, Vec<(String, String)>>,
    used: HashSet<String>,
    inlined: Map<String, Value>,
}

impl Bundler<'_> {
    /// Rewrite every `$ref` inside `value`, which lives in document `url`.
    fn rewrite(&mut self, value: &mut Value, url: &str) -> Result<(), Error> {
        match value {
            Value::Object(obj) => {
                let reference = obj.get("$ref").and_then(Value::as_str).map(str::to_string);
                if let Some(reference) = reference {
                    if let Some(rewritten) = self.rewrite_ref(&reference, url)? {
                        obj.insert("$ref".to_string(), Value::String(rewritten));
                    }
                }
                for (key, child) in obj.iter_mut() {
                    if key != "$ref" {
                        self.rewrite(child, url)?;
                    }
                }
            }
            Value::Array(arr) => {
                for child in arr {
                    self.rewrite(child, url)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// The new value for a `$ref` found in document `url`; `None` keeps it.
    fn rewrite_ref(&mut self, reference: &str, url: &str) -> Result<Option<String>, Error> {
        let absolute = resolve(url, reference)?;
        let target_url = strip_hash(&absolute);

        if target_url != url && !self.options.resolve.external {
            return Ok(None);
        }
        if target_url == self.root_url {
            if url == self.root_url && reference.starts_with('#') {
                return Ok(None);
            }
            let pointer = pointer::normalize(get_hash(&absolute), target_url)?;
            return Ok(Some(format!("#{pointer}")));
        }

        let target = self
            .refs
            .locate(target_url, get_hash(&absolute), self.options)?;
        if target.url() == self.root_url {
            return Ok(Some(format!("#{}", target.pointer)));
        }

        if let Some(existing) = self.inlined_pointer(target.url(), &target.pointer) {
            return Ok(Some(existing));
        }

        let name = self.unique_name(target.url(), &target.pointer)?;
        tracing::trace!(url = %target.url(), pointer = %target.pointer, name = %name, "inlining external $ref");
        // Registered before its content is rewritten, so refs back to it terminate
        self.names
            .entry(target.url().to_string())
            .or_default()
            .push((target.pointer.clone(), name.clone()));
        self.inlined.insert(name.clone(), Value::Null);

        let mut content = target.value()?.clone();
        self.rewrite(&mut content, target.url())?;
        self.inlined.insert(name.clone(), content);
        Ok(Some(format!("#{}", external_pointer(&name))))
    }

    /// Where `url#pointer` already lives in the bundle: an inlined target
    /// itself, or the deepest inlined target containing it.
    fn inlined_pointer(&self, url: &str, pointer: &str) -> Option<String> {
        self.names
            .get(url)?
            .iter()
            .filter_map(|(inlined, name)| {
                let rest = pointer.strip_prefix(inlined.as_str())?;
                (rest.is_empty() || rest.starts_with('/')).then(|| (inlined.len(), name, rest))
            })
            .max_by_key(|(len, _, _)| *len)
            .map(|(_, name, rest)| format!("#{}{}", external_pointer(name), rest))
    }

    /// File stem plus pointer tokens, sanitized and made unique.
    fn unique_name(&mut self, url: &str, pointer: &str) -> Result<String, Error> {
        let segment = url.rsplit('/').next().unwrap_or(url);
        let stem = match segment.rfind('.') {
            Some(idx) if idx > 0 => &segment[..idx],
            _ => segment,
        };
        let mut parts = vec![if stem.is_empty() { "external".to_string() } else { stem.to_string() }];
        parts.extend(pointer::parse(pointer, url)?);

        let base: String = parts
            .join("_")
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        let mut name = base.clone();
        let mut n = 2;
        while self.used.contains(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        self.used.insert(name.clone());
        Ok(name)
    }
}

/// Pointer (without `#`) to an inlined target.
fn external_pointer(name: &str) -> String {
    format!("/{}/{}", escape(EXTERNAL_KEY), escape(name))
}
