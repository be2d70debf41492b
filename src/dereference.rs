//! Dereferencing: replace every `$ref` with the value it points to.
//!
//! The walk is depth-first in document order. Every object and array is
//! registered under its location (document URL + pointer) while it is being
//! built (`Pending`) and once finished (`Done`), so:
//!
//! - all refs to one location share the node built first;
//! - a ref whose target is still `Pending` points at one of its own
//!   ancestors, which is a cycle.
//!
//! A `$ref` being followed is marked `Following` with the location it leads
//! to. Meeting such a mark again closes a cycle, whose back-edge is the
//! container at the end of that chain of refs.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::error::Error;
use crate::file::{Document, FileData, FileInfo};
use crate::graph::{Graph, Node, NodeId};
use crate::options::{Circular, Options};
use crate::parsers::parse_file;
use crate::paths::{get_hash, resolve, strip_hash, to_absolute};
use crate::pointer::escape;
use crate::refs::{ref_of, Refs};

/// Result of a dereference.
#[derive(Debug, Clone)]
pub struct Dereferenced {
    pub graph: Graph,
    pub root: NodeId,
    /// Number of `$ref`s resolved into each absolute document URL.
    pub refs: BTreeMap<String, usize>,
    /// Whether any circular `$ref` was found.
    pub circular: bool,
    /// Every document loaded, root first.
    pub files: Vec<String>,
}

impl Dereferenced {
    /// Render as a tree; cycles become `$ref`s to the first position of the node.
    pub fn to_value(&self) -> Value {
        self.graph.to_value(self.root)
    }

    /// Follow a JSON pointer from the root.
    pub fn get(&self, pointer: &str) -> Option<NodeId> {
        self.graph.pointer(self.root, pointer)
    }
}

/// Dereference the document at `path` (file path or URL).
///
/// A fragment on `path` selects the part of the document to dereference.
///
/// # Errors
///
/// Returns `Error::Resolver` / `Error::Parser` for documents that cannot be
/// loaded, `Error::MissingPointer` for refs to missing locations, and
/// `Error::Circular` for cycles when circular refs are forbidden.
pub fn dereference(path: &str, options: &Options) -> Result<Dereferenced, Error> {
    let absolute = to_absolute(path)?;
    let refs = Refs::new(&absolute);
    refs.load(&absolute, options)?;
    walk_root(refs, get_hash(&absolute), options)
}

/// Dereference an already-decoded schema located at `base`.
///
/// Relative refs in `schema` resolve against `base`.
pub fn dereference_value(
    schema: Value,
    base: &str,
    options: &Options,
) -> Result<Dereferenced, Error> {
    let refs = root_refs(schema, base, options)?;
    walk_root(refs, "", options)
}

/// Build a cache holding `schema` as the root document at `base`.
pub(crate) fn root_refs(schema: Value, base: &str, options: &Options) -> Result<Refs, Error> {
    let absolute = to_absolute(base)?;
    let url = strip_hash(&absolute);
    let refs = Refs::new(url);
    let file = FileInfo::new(url).with_data(FileData::Value(schema));
    let value = parse_file(&file, options)?;
    refs.insert(Document { file, value });
    Ok(refs)
}

fn walk_root(refs: Refs, hash: &str, options: &Options) -> Result<Dereferenced, Error> {
    let root_url = refs.root_url().to_string();
    let target = refs.locate(&root_url, hash, options)?;

    let mut walker = Walker {
        refs: &refs,
        options,
        graph: Graph::new(),
        memo: HashMap::new(),
        counts: BTreeMap::new(),
        circular: false,
    };
    let root = walker.walk(target.value()?, target.url(), &target.pointer)?;
    tracing::debug!(
        url = %root_url,
        nodes = walker.graph.len(),
        circular = walker.circular,
        "dereferenced"
    );

    let Walker {
        graph,
        counts,
        circular,
        ..
    } = walker;
    Ok(Dereferenced {
        graph,
        root,
        refs: counts,
        circular,
        files: refs.paths(),
    })
}

/// Build state of one location.
#[derive(Debug, Clone)]
enum Slot {
    /// Container allocated, children still being built.
    Pending(NodeId),
    /// A `$ref` at this location is being followed to the given location.
    Following(String),
    Done(NodeId),
}

struct Walker<'a> {
    refs: &'a Refs,
    options: &'a Options,
    graph: Graph,
    memo: HashMap<String, Slot>,
    counts: BTreeMap<String, usize>,
    circular: bool,
}

fn location(url: &str, pointer: &str) -> String {
    format!("{url}#{pointer}")
}

impl Walker<'_> {
    /// Build the node for `value`, found at `pointer` inside document `url`.
    fn walk(&mut self, value: &Value, url: &str, pointer: &str) -> Result<NodeId, Error> {
        if let Some(reference) = ref_of(value) {
            if self.follows(url, reference)? {
                return self.walk_ref(value, reference, url, pointer);
            }
        }

        let key = location(url, pointer);
        match self.memo.get(&key) {
            Some(Slot::Done(id)) => return Ok(*id),
            Some(Slot::Pending(id)) => {
                // Reached an ancestor again through a ref further up
                let id = *id;
                return self.circular(Some(id), value, url, pointer);
            }
            _ => {}
        }

        let node = match value {
            Value::Object(map) => {
                let id = self.graph.reserve();
                self.memo.insert(key.clone(), Slot::Pending(id));
                let mut entries = Vec::with_capacity(map.len());
                for (k, v) in map {
                    let child = self.walk(v, url, &format!("{pointer}/{}", escape(k)))?;
                    entries.push((k.clone(), child));
                }
                self.graph.set(id, Node::Object(entries));
                id
            }
            Value::Array(arr) => {
                let id = self.graph.reserve();
                self.memo.insert(key.clone(), Slot::Pending(id));
                let mut items = Vec::with_capacity(arr.len());
                for (i, v) in arr.iter().enumerate() {
                    items.push(self.walk(v, url, &format!("{pointer}/{i}"))?);
                }
                self.graph.set(id, Node::Array(items));
                id
            }
            scalar => return Ok(self.graph.push_scalar(scalar)),
        };
        self.memo.insert(key, Slot::Done(node));
        Ok(node)
    }

    /// Whether a `$ref` found in `url` should be followed.
    fn follows(&self, url: &str, reference: &str) -> Result<bool, Error> {
        if self.options.resolve.external {
            return Ok(true);
        }
        let absolute = resolve(url, reference)?;
        Ok(strip_hash(&absolute) == url)
    }

    fn walk_ref(
        &mut self,
        value: &Value,
        reference: &str,
        url: &str,
        pointer: &str,
    ) -> Result<NodeId, Error> {
        let own_key = location(url, pointer);
        match self.memo.get(&own_key) {
            Some(Slot::Done(id)) => return Ok(*id),
            // A chain of refs that leads back to this one
            Some(Slot::Following(_)) => {
                let back = self.back_edge(&own_key);
                return self.circular(back, value, url, pointer);
            }
            _ => {}
        }

        let absolute = resolve(url, reference)?;
        *self
            .counts
            .entry(strip_hash(&absolute).to_string())
            .or_default() += 1;

        let target = self
            .refs
            .locate(strip_hash(&absolute), get_hash(&absolute), self.options)?;
        let target_key = location(target.url(), &target.pointer);
        tracing::trace!(from = %own_key, to = %target_key, "resolving $ref");

        let resolved = match self.memo.get(&target_key) {
            Some(Slot::Done(id)) => *id,
            Some(Slot::Pending(id)) => {
                let id = *id;
                return self.circular(Some(id), value, url, pointer);
            }
            Some(Slot::Following(_)) => {
                let back = self.back_edge(&target_key);
                return self.circular(back, value, url, pointer);
            }
            None => {
                self.memo.insert(own_key.clone(), Slot::Following(target_key.clone()));
                self.walk(target.value()?, target.url(), &target.pointer)?
            }
        };

        let node = match value.as_object() {
            Some(obj) if obj.len() > 1 => self.merge_siblings(obj, resolved, url, pointer)?,
            _ => resolved,
        };
        self.memo.insert(own_key, Slot::Done(node));
        Ok(node)
    }

    /// The container a chain of `Following` refs starting at `key` ends on.
    ///
    /// `None` when the chain never reaches a container, i.e. the loop is made
    /// only of `$ref`s.
    fn back_edge(&self, key: &str) -> Option<NodeId> {
        let mut key = key;
        for _ in 0..=self.memo.len() {
            match self.memo.get(key)? {
                Slot::Following(next) => key = next.as_str(),
                Slot::Pending(id) | Slot::Done(id) => return Some(*id),
            }
        }
        None
    }

    /// Combine the keys next to a `$ref` with its resolved object.
    ///
    /// Sibling keys win over resolved keys of the same name. Non-object
    /// targets are returned as they are and the siblings dropped.
    fn merge_siblings(
        &mut self,
        obj: &serde_json::Map<String, Value>,
        resolved: NodeId,
        url: &str,
        pointer: &str,
    ) -> Result<NodeId, Error> {
        let Some(resolved_entries) = self.graph.node(resolved).as_object() else {
            return Ok(resolved);
        };
        let resolved_entries = resolved_entries.to_vec();

        let mut entries = Vec::with_capacity(obj.len() + resolved_entries.len());
        for (k, v) in obj {
            if k == "$ref" {
                continue;
            }
            let child = self.walk(v, url, &format!("{pointer}/{}", escape(k)))?;
            entries.push((k.clone(), child));
        }
        for (k, child) in resolved_entries {
            if !entries.iter().any(|(existing, _)| *existing == k) {
                entries.push((k, child));
            }
        }
        Ok(self.graph.push(Node::Object(entries)))
    }

    /// Apply the circular policy at a cycle point.
    ///
    /// `back` is the node the cycle closes on; `None` for a loop made only
    /// of `$ref`s, which has no node to point back to.
    fn circular(
        &mut self,
        back: Option<NodeId>,
        value: &Value,
        url: &str,
        pointer: &str,
    ) -> Result<NodeId, Error> {
        self.circular = true;
        self.refs.mark_circular();
        tracing::debug!(url, pointer, "circular $ref");

        match (self.options.dereference.circular, back) {
            (Circular::Forbid, _) => Err(Error::Circular {
                url: url.to_string(),
                pointer: format!("#{pointer}"),
            }),
            (Circular::Allow, Some(id)) => Ok(id),
            (Circular::Allow, None) | (Circular::Ignore, _) => Ok(self.graph.push_value(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "file:///schemas/root.json";

    fn deref(schema: Value) -> Dereferenced {
        dereference_value(schema, BASE, &Options::default()).unwrap()
    }

    #[test]
    fn no_refs_is_identity() {
        let schema = json!({
            "type": "object",
            "properties": {"id": {"type": "string"}, "tags": {"type": "array", "items": [1, 2]}}
        });
        let result = deref(schema.clone());
        assert_eq!(result.to_value(), schema);
        assert!(!result.circular);
        assert!(result.refs.is_empty());
    }

    #[test]
    fn internal_ref_is_replaced() {
        let result = deref(json!({
            "definitions": {"id": {"type": "string"}},
            "properties": {"id": {"$ref": "#/definitions/id"}}
        }));
        assert_eq!(
            result.to_value()["properties"]["id"],
            json!({"type": "string"})
        );
        assert_eq!(result.refs.get(BASE), Some(&1));
    }

    #[test]
    fn shared_refs_share_identity() {
        let result = deref(json!({
            "a": {"$ref": "#/definitions/thing"},
            "b": {"$ref": "#/definitions/thing"},
            "definitions": {"thing": {"type": "object"}}
        }));
        let a = result.get("#/a").unwrap();
        let b = result.get("#/b").unwrap();
        let def = result.get("#/definitions/thing").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, def);
        assert_eq!(result.refs.get(BASE), Some(&2));
    }

    #[test]
    fn self_cycle_is_real() {
        let result = deref(json!({
            "definitions": {
                "node": {
                    "type": "object",
                    "properties": {"next": {"$ref": "#/definitions/node"}}
                }
            }
        }));
        assert!(result.circular);
        let node = result.get("#/definitions/node").unwrap();
        assert_eq!(result.get("#/definitions/node/properties/next"), Some(node));
        assert_eq!(
            result.get("#/definitions/node/properties/next/properties/next"),
            Some(node)
        );
        assert!(result.graph.is_cyclic(result.root));
        assert_eq!(
            result.to_value()["definitions"]["node"]["properties"]["next"],
            json!({"$ref": "#/definitions/node"})
        );
    }

    #[test]
    fn mutual_cycle_terminates() {
        let result = deref(json!({
            "a": {"properties": {"b": {"$ref": "#/b"}}},
            "b": {"properties": {"a": {"$ref": "#/a"}}}
        }));
        assert!(result.circular);
        let a = result.get("#/a").unwrap();
        assert_eq!(result.get("#/a/properties/b/properties/a"), Some(a));
        assert_eq!(result.get("#/b/properties/a"), Some(a));
    }

    #[test]
    fn ref_to_root_cycles() {
        let result = deref(json!({"properties": {"self": {"$ref": "#"}}}));
        assert!(result.circular);
        assert_eq!(result.get("#/properties/self"), Some(result.root));
    }

    #[test]
    fn circular_forbid_fails() {
        let options = Options::default().circular(Circular::Forbid);
        let err = dereference_value(
            json!({"a": {"properties": {"x": {"$ref": "#/a"}}}}),
            BASE,
            &options,
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::Circular {
                url: BASE.to_string(),
                pointer: "#/a/properties/x".to_string(),
            }
        );
    }

    #[test]
    fn circular_ignore_keeps_ref() {
        let options = Options::default().circular(Circular::Ignore);
        let result = dereference_value(
            json!({"a": {"properties": {"x": {"$ref": "#/a"}}}}),
            BASE,
            &options,
        )
        .unwrap();
        assert!(result.circular);
        assert!(!result.graph.is_cyclic(result.root));
        assert_eq!(
            result.to_value(),
            json!({"a": {"properties": {"x": {"$ref": "#/a"}}}})
        );
    }

    #[test]
    fn ref_only_loop_keeps_ref() {
        let result = deref(json!({"a": {"$ref": "#/b"}, "b": {"$ref": "#/a"}}));
        assert!(result.circular);
        assert_eq!(result.to_value(), json!({"a": {"$ref": "#/a"}, "b": {"$ref": "#/a"}}));
    }

    #[test]
    fn cycle_through_ref_hop_is_real_in_any_key_order() {
        let ref_first = deref(json!({
            "a": {"$ref": "#/c"},
            "c": {"properties": {"p": {"$ref": "#/a"}}}
        }));
        let container_first = deref(json!({
            "c": {"properties": {"p": {"$ref": "#/a"}}},
            "a": {"$ref": "#/c"}
        }));

        for result in [&ref_first, &container_first] {
            assert!(result.circular);
            assert!(result.graph.is_cyclic(result.root));
            let c = result.get("#/c").unwrap();
            assert_eq!(result.get("#/a"), Some(c));
            assert_eq!(result.get("#/a/properties/p"), Some(c));
            assert_eq!(result.get("#/c/properties/p"), Some(c));
        }
    }

    #[test]
    fn ref_chain_resolves_to_final_target() {
        let result = deref(json!({
            "a": {"$ref": "#/b"},
            "b": {"$ref": "#/c"},
            "c": {"type": "integer"}
        }));
        assert!(!result.circular);
        let c = result.get("#/c").unwrap();
        assert_eq!(result.get("#/a"), Some(c));
        assert_eq!(result.get("#/b"), Some(c));
    }

    #[test]
    fn siblings_win_over_resolved_keys() {
        let result = deref(json!({
            "definitions": {"pet": {"type": "object", "description": "a pet"}},
            "properties": {
                "cat": {"$ref": "#/definitions/pet", "description": "a cat"}
            }
        }));
        let value = result.to_value();
        assert_eq!(
            value["properties"]["cat"],
            json!({"description": "a cat", "type": "object"})
        );
        // The shared definition itself is untouched
        assert_eq!(value["definitions"]["pet"]["description"], "a pet");
    }

    #[test]
    fn siblings_dropped_for_scalar_target() {
        let result = deref(json!({
            "definitions": {"max": 10},
            "maximum": {"$ref": "#/definitions/max", "description": "ignored"}
        }));
        assert_eq!(result.to_value()["maximum"], json!(10));
    }

    #[test]
    fn missing_pointer_fails() {
        let err = dereference_value(json!({"a": {"$ref": "#/does/not/exist"}}), BASE, &Options::default())
            .unwrap_err();
        assert!(matches!(err, Error::MissingPointer { token, url, .. }
            if token == "does" && url == BASE));
    }
}
