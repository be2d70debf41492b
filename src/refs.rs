//! Per-call document cache.
//!
//! Each absolute URL is read and parsed at most once per top-level call.
//! Loads go through an in-flight cell per URL, so concurrent callers asking
//! for the same URL wait for one fetch and share its result.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use serde_json::Value;

use crate::error::Error;
use crate::file::{Document, FileInfo};
use crate::options::Options;
use crate::parsers::parse_file;
use crate::paths::{get_hash, resolve, strip_hash};
use crate::pointer;
use crate::resolvers::read_file;

/// Refs followed part-way through a single pointer before giving up.
const MAX_POINTER_HOPS: usize = 64;

type Slot = Arc<OnceLock<Result<Arc<Document>, Error>>>;

#[derive(Default)]
struct Slots {
    by_url: HashMap<String, Slot>,
    order: Vec<String>,
}

/// The `$ref` string of a `{"$ref": "..."}` object.
pub fn ref_of(value: &Value) -> Option<&str> {
    value.as_object()?.get("$ref")?.as_str()
}

/// A pointer target inside a loaded document.
#[derive(Debug, Clone)]
pub struct Target {
    pub document: Arc<Document>,
    /// Canonical pointer (escaped tokens, no `#`).
    pub pointer: String,
}

impl Target {
    pub fn url(&self) -> &str {
        &self.document.file.url
    }

    /// The value the pointer designates.
    pub fn value(&self) -> Result<&Value, Error> {
        pointer::evaluate(&self.document.value, &self.pointer, &self.document.file.url)
    }
}

/// URL -> document cache owned by one top-level call.
pub struct Refs {
    root: String,
    slots: Mutex<Slots>,
    circular: AtomicBool,
}

impl Refs {
    /// Empty cache for a call rooted at `root_url` (no fragment).
    pub fn new(root_url: &str) -> Self {
        Self {
            root: strip_hash(root_url).to_string(),
            slots: Mutex::new(Slots::default()),
            circular: AtomicBool::new(false),
        }
    }

    pub fn root_url(&self) -> &str {
        &self.root
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self, url: &str) -> Slot {
        let mut slots = self.lock();
        if let Some(slot) = slots.by_url.get(url) {
            return Arc::clone(slot);
        }
        let slot: Slot = Arc::new(OnceLock::new());
        slots.by_url.insert(url.to_string(), Arc::clone(&slot));
        slots.order.push(url.to_string());
        slot
    }

    /// Store an already-parsed document.
    ///
    /// Has no effect if the URL was loaded before.
    pub fn insert(&self, document: Document) -> Arc<Document> {
        let url = document.file.url.clone();
        let document = Arc::new(document);
        let stored = self.slot(&url).get_or_init(|| Ok(Arc::clone(&document))).clone();
        stored.unwrap_or(document)
    }

    /// Read and parse `url` (fragment ignored), or reuse the cached result.
    ///
    /// # Errors
    ///
    /// Propagates `Error::Resolver` / `Error::Parser` from the first attempt;
    /// later calls for the same URL get the same error without refetching.
    pub fn load(&self, url: &str, options: &Options) -> Result<Arc<Document>, Error> {
        let url = strip_hash(url);
        self.slot(url)
            .get_or_init(|| fetch(url, options))
            .clone()
    }

    /// The document at `url` if it has been loaded successfully.
    pub fn get(&self, url: &str) -> Option<Arc<Document>> {
        let slot = self.lock().by_url.get(strip_hash(url)).cloned()?;
        slot.get()?.as_ref().ok().cloned()
    }

    /// URLs of every successfully loaded document, in first-load order.
    pub fn paths(&self) -> Vec<String> {
        self.documents()
            .into_iter()
            .map(|d| d.file.url.clone())
            .collect()
    }

    /// Every successfully loaded document, in first-load order.
    pub fn documents(&self) -> Vec<Arc<Document>> {
        let slots = self.lock();
        slots
            .order
            .iter()
            .filter_map(|url| slots.by_url.get(url))
            .filter_map(|slot| slot.get().and_then(|r| r.as_ref().ok()).cloned())
            .collect()
    }

    /// Evaluate a ref (absolute, or relative to the root) against loaded documents.
    ///
    /// # Errors
    ///
    /// Returns `Error::Resolver` if the document was never loaded and
    /// `Error::MissingPointer` if the pointer does not resolve.
    pub fn lookup(&self, reference: &str) -> Result<Value, Error> {
        let absolute = resolve(&self.root, reference)?;
        let url = strip_hash(&absolute);
        let document = self
            .get(url)
            .ok_or_else(|| Error::resolver(url, "document has not been loaded"))?;
        pointer::evaluate(&document.value, get_hash(&absolute), url).cloned()
    }

    /// Whether `reference` points at an existing value in a loaded document.
    pub fn exists(&self, reference: &str) -> bool {
        self.lookup(reference).is_ok()
    }

    /// Whether a circular reference was found.
    pub fn circular(&self) -> bool {
        self.circular.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_circular(&self) {
        self.circular.store(true, Ordering::Relaxed);
    }

    /// Find the value `pointer` designates in the document at `url`.
    ///
    /// A `$ref` met part-way along the pointer is followed and the walk
    /// continues inside its target, so the returned location is where the
    /// value really lives. A `$ref` at the final position is not followed.
    ///
    /// # Errors
    ///
    /// Returns load errors, `Error::MissingPointer` for tokens that do not
    /// exist, and `Error::Circular` if refs along the path loop.
    pub fn locate(&self, url: &str, pointer: &str, options: &Options) -> Result<Target, Error> {
        let tokens = pointer::parse(pointer, url)?;
        let mut document = self.load(url, options)?;
        let mut path: Vec<String> = Vec::new();
        let mut hops = 0;
        let mut i = 0;

        while i < tokens.len() {
            let current = path
                .iter()
                .try_fold(&document.value, |v, t| pointer::step(v, t))
                .ok_or_else(|| missing(&tokens[i], pointer, &document.file.url))?;

            if let Some(reference) = ref_of(current) {
                let absolute = resolve(&document.file.url, reference)?;
                let next_url = strip_hash(&absolute);
                if next_url != document.file.url && !options.resolve.external {
                    return Err(missing(&tokens[i], pointer, &document.file.url));
                }
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(Error::Circular {
                        url: url.to_string(),
                        pointer: pointer.to_string(),
                    });
                }
                path = pointer::parse(get_hash(&absolute), next_url)?;
                document = self.load(next_url, options)?;
                continue;
            }

            if pointer::step(current, &tokens[i]).is_none() {
                return Err(missing(&tokens[i], pointer, &document.file.url));
            }
            path.push(tokens[i].clone());
            i += 1;
        }

        Ok(Target {
            document,
            pointer: pointer::join(&path),
        })
    }

    /// Load every document reachable from `value` (located at `url`).
    ///
    /// # Errors
    ///
    /// Stops at the first document that cannot be read or parsed.
    pub fn crawl(&self, value: &Value, url: &str, options: &Options) -> Result<(), Error> {
        let mut visited = HashSet::new();
        visited.insert(strip_hash(url).to_string());
        self.crawl_inner(value, strip_hash(url), options, &mut visited)
    }

    fn crawl_inner(
        &self,
        value: &Value,
        url: &str,
        options: &Options,
        visited: &mut HashSet<String>,
    ) -> Result<(), Error> {
        match value {
            Value::Object(obj) => {
                if let Some(reference) = ref_of(value) {
                    let absolute = resolve(url, reference)?;
                    let target = strip_hash(&absolute);
                    if options.resolve.external && visited.insert(target.to_string()) {
                        let document = self.load(target, options)?;
                        self.crawl_inner(&document.value, target, options, visited)?;
                    }
                }
                for child in obj.values() {
                    self.crawl_inner(child, url, options, visited)?;
                }
            }
            Value::Array(arr) => {
                for child in arr {
                    self.crawl_inner(child, url, options, visited)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl std::fmt::Debug for Refs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refs")
            .field("root", &self.root)
            .field("paths", &self.paths())
            .field("circular", &self.circular())
            .finish()
    }
}

fn missing(token: &str, pointer: &str, url: &str) -> Error {
    Error::MissingPointer {
        token: token.to_string(),
        pointer: pointer.to_string(),
        url: url.to_string(),
    }
}

fn fetch(url: &str, options: &Options) -> Result<Arc<Document>, Error> {
    let file = FileInfo::new(url);
    let data = read_file(&file, options)?;
    let file = file.with_data(data);
    let value = parse_file(&file, options)?;
    Ok(Arc::new(Document { file, value }))
}
