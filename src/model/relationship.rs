//! Edge in the property graph.

use serde::{Deserialize, Serialize};

use super::{NodeId, PropertyMap, Value};

/// Opaque edge identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Outgoing => Direction::Incoming,
            Direction::Incoming => Direction::Outgoing,
            Direction::Both => Direction::Both,
        }
    }
}

/// A directed edge. Endpoints are immutable after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: String,
    pub weight: f64,
    pub properties: PropertyMap,
}

impl Edge {
    pub fn new(id: EdgeId, source: NodeId, target: NodeId, edge_type: impl Into<String>) -> Self {
        Self {
            id,
            source,
            target,
            edge_type: edge_type.into(),
            weight: 1.0,
            properties: PropertyMap::new(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The "other" end of the edge from the given node.
    pub fn other_node(&self, from: NodeId) -> Option<NodeId> {
        if from == self.source {
            Some(self.target)
        } else if from == self.target {
            Some(self.source)
        } else {
            None
        }
    }

    /// True if this edge can be traversed from `node` in `dir`.
    pub fn matches_direction(&self, node: NodeId, dir: Direction) -> bool {
        match dir {
            Direction::Outgoing => self.source == node,
            Direction::Incoming => self.target == node,
            Direction::Both => self.source == node || self.target == node,
        }
    }
}
