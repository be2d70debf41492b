//! Arena-backed value graph for dereferenced schemas.
//!
//! Dereferencing can produce real cycles and shared nodes, which a
//! `serde_json::Value` tree cannot hold. Nodes live in one arena and refer to
//! their children by [`NodeId`]; two positions holding the same id are the
//! same object, and a cycle is an id pointing back to an ancestor.

use std::collections::HashMap;

use serde_json::{Map, Number, Value};

use crate::pointer;

/// Handle of a node in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One value in the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<NodeId>),
    /// Entries in document order.
    Object(Vec<(String, NodeId)>),
}

impl Node {
    pub fn as_object(&self) -> Option<&[(String, NodeId)]> {
        match self {
            Node::Object(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[NodeId]> {
        match self {
            Node::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    fn scalar(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Node::Null),
            Value::Bool(b) => Some(Node::Bool(*b)),
            Value::Number(n) => Some(Node::Number(n.clone())),
            Value::String(s) => Some(Node::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// Node arena.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Allocate a slot to fill later with [`Graph::set`], so children can
    /// refer back to it while it is being built.
    pub(crate) fn reserve(&mut self) -> NodeId {
        self.push(Node::Null)
    }

    pub(crate) fn set(&mut self, id: NodeId, node: Node) {
        self.nodes[id.0] = node;
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Copy a value tree into the arena as fresh, unshared nodes.
    pub fn push_value(&mut self, value: &Value) -> NodeId {
        if let Some(node) = Node::scalar(value) {
            return self.push(node);
        }
        let node = match value {
            Value::Array(arr) => Node::Array(arr.iter().map(|v| self.push_value(v)).collect()),
            Value::Object(map) => Node::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.push_value(v)))
                    .collect(),
            ),
            _ => Node::Null,
        };
        self.push(node)
    }

    pub(crate) fn push_scalar(&mut self, value: &Value) -> NodeId {
        match Node::scalar(value) {
            Some(node) => self.push(node),
            None => self.push_value(value),
        }
    }

    /// Child of an object node by key.
    pub fn get_key(&self, id: NodeId, key: &str) -> Option<NodeId> {
        self.node(id)
            .as_object()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, child)| *child)
    }

    /// Child of an array node by index.
    pub fn get_index(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.node(id).as_array()?.get(index).copied()
    }

    /// Follow a JSON pointer from `id`. Cycles can be followed indefinitely.
    pub fn pointer(&self, id: NodeId, pointer: &str) -> Option<NodeId> {
        let tokens = pointer::parse(pointer, "").ok()?;
        tokens.iter().try_fold(id, |current, token| match self.node(current) {
            Node::Object(_) => self.get_key(current, token),
            Node::Array(_) => token
                .parse::<usize>()
                .ok()
                .and_then(|i| self.get_index(current, i)),
            _ => None,
        })
    }

    /// Whether a cycle is reachable from `root`.
    pub fn is_cyclic(&self, root: NodeId) -> bool {
        // 0 = unvisited, 1 = on stack, 2 = done
        let mut state = vec![0u8; self.nodes.len()];
        let mut stack = vec![(root, 0usize)];
        state[root.0] = 1;

        while let Some((id, next)) = stack.pop() {
            let child = match self.node(id) {
                Node::Array(items) => items.get(next).copied(),
                Node::Object(entries) => entries.get(next).map(|(_, c)| *c),
                _ => None,
            };
            match child {
                Some(child) => {
                    stack.push((id, next + 1));
                    match state[child.0] {
                        1 => return true,
                        0 => {
                            state[child.0] = 1;
                            stack.push((child, 0));
                        }
                        _ => {}
                    }
                }
                None => state[id.0] = 2,
            }
        }
        false
    }

    /// Render the graph below `root` as a tree.
    ///
    /// Shared nodes are copied at each position. A node met again inside
    /// itself becomes `{"$ref": "#<pointer of its first position>"}`.
    pub fn to_value(&self, root: NodeId) -> Value {
        let mut path = Vec::new();
        let mut ancestors = HashMap::new();
        self.render(root, &mut path, &mut ancestors)
    }

    fn render(
        &self,
        id: NodeId,
        path: &mut Vec<String>,
        ancestors: &mut HashMap<NodeId, String>,
    ) -> Value {
        if let Some(at) = ancestors.get(&id) {
            let mut back = Map::new();
            back.insert("$ref".to_string(), Value::String(format!("#{at}")));
            return Value::Object(back);
        }

        match self.node(id) {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Number(n) => Value::Number(n.clone()),
            Node::String(s) => Value::String(s.clone()),
            Node::Array(items) => {
                ancestors.insert(id, pointer::join(path));
                let mut out = Vec::with_capacity(items.len());
                for (i, child) in items.iter().enumerate() {
                    path.push(i.to_string());
                    out.push(self.render(*child, path, ancestors));
                    path.pop();
                }
                ancestors.remove(&id);
                Value::Array(out)
            }
            Node::Object(entries) => {
                ancestors.insert(id, pointer::join(path));
                let mut out = Map::new();
                for (key, child) in entries {
                    path.push(key.clone());
                    out.insert(key.clone(), self.render(*child, path, ancestors));
                    path.pop();
                }
                ancestors.remove(&id);
                Value::Object(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_value_round_trips() {
        let value = json!({"a": [1, "two", null], "b": {"c": false}});
        let mut graph = Graph::new();
        let root = graph.push_value(&value);
        assert_eq!(graph.to_value(root), value);
        assert!(!graph.is_cyclic(root));
    }

    #[test]
    fn pointer_and_accessors() {
        let mut graph = Graph::new();
        let root = graph.push_value(&json!({"a": [{"b/c": 1}]}));
        let leaf = graph.pointer(root, "#/a/0/b~1c").unwrap();
        assert_eq!(graph.node(leaf), &Node::Number(1.into()));
        assert!(graph.pointer(root, "#/a/1").is_none());
    }

    #[test]
    fn cycles_render_as_back_refs() {
        let mut graph = Graph::new();
        let node = graph.reserve();
        let name = graph.push(Node::String("node".into()));
        graph.set(
            node,
            Node::Object(vec![("name".into(), name), ("next".into(), node)]),
        );
        let root = graph.push(Node::Object(vec![("node".into(), node)]));

        assert!(graph.is_cyclic(root));
        assert_eq!(graph.pointer(root, "#/node/next/next/next"), Some(node));
        assert_eq!(
            graph.to_value(root),
            json!({"node": {"name": "node", "next": {"$ref": "#/node"}}})
        );
    }

    #[test]
    fn shared_nodes_are_copied_when_rendered() {
        let mut graph = Graph::new();
        let shared = graph.push_value(&json!({"type": "string"}));
        let root = graph.push(Node::Object(vec![("a".into(), shared), ("b".into(), shared)]));

        assert!(!graph.is_cyclic(root));
        assert_eq!(
            graph.to_value(root),
            json!({"a": {"type": "string"}, "b": {"type": "string"}})
        );
    }
}
