//! Graph entity snapshots: nodes, relationships and paths.
//!
//! Entities are plain owned data hydrated from result payloads. They carry
//! no live connection back to the server; identities are server-assigned
//! and immutable once hydrated.

use std::collections::BTreeMap;

use crate::error::{GraphError, Result};
use crate::value::Value;

pub type PropertyMap = BTreeMap<String, Value>;

/// A graph vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: i64,
    labels: Vec<String>,
    properties: PropertyMap,
}

impl Node {
    /// Duplicate labels are dropped, first occurrence wins.
    pub fn new(id: i64, labels: Vec<String>, properties: PropertyMap) -> Self {
        let mut deduped: Vec<String> = Vec::with_capacity(labels.len());
        for label in labels {
            if !deduped.contains(&label) {
                deduped.push(label);
            }
        }
        Self {
            id,
            labels: deduped,
            properties,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// A directed graph edge between two nodes of the same result snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    id: i64,
    start: i64,
    end: i64,
    rel_type: String,
    properties: PropertyMap,
}

impl Relationship {
    pub fn new(
        id: i64,
        start: i64,
        end: i64,
        rel_type: impl Into<String>,
        properties: PropertyMap,
    ) -> Self {
        Self {
            id,
            start,
            end,
            rel_type: rel_type.into(),
            properties,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// The identity at the other end of the edge, if `from` is an endpoint.
    pub fn other(&self, from: i64) -> Option<i64> {
        if from == self.start {
            Some(self.end)
        } else if from == self.end {
            Some(self.start)
        } else {
            None
        }
    }
}

/// An alternating sequence of nodes and relationships in traversal order.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    nodes: Vec<Node>,
    relationships: Vec<Relationship>,
}

impl Path {
    /// Requires `relationships.len() == nodes.len() - 1` and that each
    /// relationship connects the adjacent pair of nodes (either direction).
    /// The empty path is a single node with no relationships.
    pub fn new(nodes: Vec<Node>, relationships: Vec<Relationship>) -> Result<Self> {
        if nodes.is_empty() || relationships.len() != nodes.len() - 1 {
            return Err(GraphError::Protocol {
                status: None,
                message: format!(
                    "path with {} nodes cannot have {} relationships",
                    nodes.len(),
                    relationships.len()
                ),
            });
        }
        for (i, rel) in relationships.iter().enumerate() {
            let (a, b) = (nodes[i].id(), nodes[i + 1].id());
            let connects = (rel.start() == a && rel.end() == b)
                || (rel.start() == b && rel.end() == a);
            if !connects {
                return Err(GraphError::Protocol {
                    status: None,
                    message: format!(
                        "path segment {i} ({} -> {}) does not join nodes {a} and {b}",
                        rel.start(),
                        rel.end()
                    ),
                });
            }
        }
        Ok(Self {
            nodes,
            relationships,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Number of relationships traversed.
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn start_node(&self) -> &Node {
        &self.nodes[0]
    }

    pub fn end_node(&self) -> &Node {
        &self.nodes[self.nodes.len() - 1]
    }
}
