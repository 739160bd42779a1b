//! In-memory store.
//!
//! The reference implementation of `GraphStore`: HashMaps behind parking_lot
//! locks, an adjacency list, and a label index. Used by tests and by
//! embedders that do not need persistence. Scans return id-ascending order,
//! matching what the host-table adapter produces.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::model::{Direction, Edge, EdgeId, LabelSet, Node, NodeId, PropertyMap, Value};

use super::{EdgeIter, GraphStore, NodeIter};

/// In-memory property graph storage.
#[derive(Default)]
pub struct MemoryStore {
    nodes: RwLock<HashMap<NodeId, Node>>,
    edges: RwLock<HashMap<EdgeId, Edge>>,
    /// node id → connected edge ids (both directions).
    adjacency: RwLock<HashMap<NodeId, Vec<EdgeId>>>,
    /// label → node ids.
    label_index: RwLock<HashMap<String, Vec<NodeId>>>,
    next_node_id: AtomicU64,
    next_edge_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_node_id: AtomicU64::new(1),
            next_edge_id: AtomicU64::new(1),
            ..Default::default()
        }
    }

    fn with_node_mut<T>(
        &self,
        id: NodeId,
        f: impl FnOnce(&mut Node) -> Result<T>,
    ) -> Result<T> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(&id)
            .ok_or_else(|| Error::Runtime(format!("node {id} not found")))?;
        f(node)
    }

    fn with_edge_mut<T>(
        &self,
        id: EdgeId,
        f: impl FnOnce(&mut Edge) -> Result<T>,
    ) -> Result<T> {
        let mut edges = self.edges.write();
        let edge = edges
            .get_mut(&id)
            .ok_or_else(|| Error::Runtime(format!("edge {id} not found")))?;
        f(edge)
    }

    fn unindex_labels(&self, id: NodeId, labels: &[String]) {
        let mut index = self.label_index.write();
        for label in labels {
            if let Some(ids) = index.get_mut(label) {
                ids.retain(|nid| *nid != id);
            }
        }
    }
}

impl GraphStore for MemoryStore {
    // ========================================================================
    // Node CRUD
    // ========================================================================

    fn add_node(
        &self,
        id: Option<NodeId>,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId> {
        if props.keys().any(|k| k.is_empty()) {
            return Err(Error::Constraint("property keys must be non-empty".into()));
        }
        let id = match id {
            Some(explicit) => {
                if self.nodes.read().contains_key(&explicit) {
                    return Err(Error::Constraint(format!("node {explicit} already exists")));
                }
                // Keep the allocator ahead of explicit ids.
                self.next_node_id.fetch_max(explicit.0 + 1, Ordering::Relaxed);
                explicit
            }
            None => NodeId(self.next_node_id.fetch_add(1, Ordering::Relaxed)),
        };

        let mut label_set = LabelSet::new();
        for label in labels {
            if !label_set.iter().any(|l| l == label) {
                label_set.push((*label).to_string());
            }
        }

        let node = Node { id, labels: label_set, properties: props };

        {
            let mut index = self.label_index.write();
            for label in &node.labels {
                index.entry(label.clone()).or_default().push(id);
            }
        }
        self.nodes.write().insert(id, node);
        self.adjacency.write().insert(id, Vec::new());

        Ok(id)
    }

    fn node(&self, id: NodeId) -> Result<Option<Node>> {
        Ok(self.nodes.read().get(&id).cloned())
    }

    fn delete_node(&self, id: NodeId, cascade: bool) -> Result<bool> {
        let connected: Vec<EdgeId> = self
            .adjacency
            .read()
            .get(&id)
            .cloned()
            .unwrap_or_default();

        if !connected.is_empty() {
            if !cascade {
                return Err(Error::NodeHasEdges { id: id.0, edges: connected.len() });
            }
            for edge_id in connected {
                self.delete_edge(edge_id)?;
            }
        }

        let removed = self.nodes.write().remove(&id);
        self.adjacency.write().remove(&id);
        if let Some(node) = &removed {
            self.unindex_labels(id, &node.labels);
        }
        Ok(removed.is_some())
    }

    fn update_node_properties(&self, id: NodeId, props: PropertyMap) -> Result<()> {
        self.with_node_mut(id, |node| {
            node.properties = props;
            Ok(())
        })
    }

    fn set_node_property(&self, id: NodeId, key: &str, value: Value) -> Result<()> {
        self.with_node_mut(id, |node| {
            if value.is_null() {
                node.properties.remove(key);
            } else {
                node.properties.insert(key.to_string(), value);
            }
            Ok(())
        })
    }

    fn remove_node_property(&self, id: NodeId, key: &str) -> Result<()> {
        self.with_node_mut(id, |node| {
            node.properties.remove(key);
            Ok(())
        })
    }

    fn set_node_labels(&self, id: NodeId, labels: &[&str]) -> Result<()> {
        let old = self.with_node_mut(id, |node| {
            let old = std::mem::take(&mut node.labels);
            node.labels = labels.iter().map(|l| l.to_string()).collect();
            Ok(old)
        })?;
        self.unindex_labels(id, &old);
        let mut index = self.label_index.write();
        for label in labels {
            index.entry(label.to_string()).or_default().push(id);
        }
        Ok(())
    }

    fn add_label(&self, id: NodeId, label: &str) -> Result<()> {
        let added = self.with_node_mut(id, |node| {
            if node.has_label(label) {
                Ok(false)
            } else {
                node.labels.push(label.to_string());
                Ok(true)
            }
        })?;
        if added {
            self.label_index
                .write()
                .entry(label.to_string())
                .or_default()
                .push(id);
        }
        Ok(())
    }

    fn remove_label(&self, id: NodeId, label: &str) -> Result<()> {
        self.with_node_mut(id, |node| {
            node.labels.retain(|l| l != label);
            Ok(())
        })?;
        self.unindex_labels(id, &[label.to_string()]);
        Ok(())
    }

    // ========================================================================
    // Edge CRUD
    // ========================================================================

    fn add_edge(
        &self,
        source: NodeId,
        target: NodeId,
        edge_type: &str,
        weight: f64,
        props: PropertyMap,
    ) -> Result<EdgeId> {
        {
            let nodes = self.nodes.read();
            if !nodes.contains_key(&source) {
                return Err(Error::MissingEndpoint(source.0));
            }
            if !nodes.contains_key(&target) {
                return Err(Error::MissingEndpoint(target.0));
            }
        }

        let id = EdgeId(self.next_edge_id.fetch_add(1, Ordering::Relaxed));
        let edge = Edge {
            id,
            source,
            target,
            edge_type: edge_type.to_string(),
            weight,
            properties: props,
        };

        self.edges.write().insert(id, edge);

        let mut adjacency = self.adjacency.write();
        adjacency.entry(source).or_default().push(id);
        if source != target {
            adjacency.entry(target).or_default().push(id);
        }

        Ok(id)
    }

    fn edge(&self, id: EdgeId) -> Result<Option<Edge>> {
        Ok(self.edges.read().get(&id).cloned())
    }

    fn delete_edge(&self, id: EdgeId) -> Result<bool> {
        let removed = self.edges.write().remove(&id);
        if let Some(edge) = &removed {
            let mut adjacency = self.adjacency.write();
            if let Some(ids) = adjacency.get_mut(&edge.source) {
                ids.retain(|eid| *eid != id);
            }
            if edge.source != edge.target {
                if let Some(ids) = adjacency.get_mut(&edge.target) {
                    ids.retain(|eid| *eid != id);
                }
            }
        }
        Ok(removed.is_some())
    }

    fn set_edge_property(&self, id: EdgeId, key: &str, value: Value) -> Result<()> {
        self.with_edge_mut(id, |edge| {
            if value.is_null() {
                edge.properties.remove(key);
            } else {
                edge.properties.insert(key.to_string(), value);
            }
            Ok(())
        })
    }

    fn remove_edge_property(&self, id: EdgeId, key: &str) -> Result<()> {
        self.with_edge_mut(id, |edge| {
            edge.properties.remove(key);
            Ok(())
        })
    }

    // ========================================================================
    // Scans
    // ========================================================================

    fn all_nodes(&self) -> Result<NodeIter<'_>> {
        let mut nodes: Vec<Node> = self.nodes.read().values().cloned().collect();
        nodes.sort_by_key(|n| n.id);
        Ok(Box::new(nodes.into_iter().map(Ok)))
    }

    fn find_nodes_by_label(&self, label: &str) -> Result<NodeIter<'_>> {
        let ids = self
            .label_index
            .read()
            .get(label)
            .cloned()
            .unwrap_or_default();
        let nodes_guard = self.nodes.read();
        let mut nodes: Vec<Node> = ids
            .iter()
            .filter_map(|id| nodes_guard.get(id).cloned())
            .collect();
        drop(nodes_guard);
        nodes.sort_by_key(|n| n.id);
        Ok(Box::new(nodes.into_iter().map(Ok)))
    }

    fn all_edges(&self) -> Result<EdgeIter<'_>> {
        let mut edges: Vec<Edge> = self.edges.read().values().cloned().collect();
        edges.sort_by_key(|e| e.id);
        Ok(Box::new(edges.into_iter().map(Ok)))
    }

    fn find_edges_by_type(&self, edge_type: &str) -> Result<EdgeIter<'_>> {
        let mut edges: Vec<Edge> = self
            .edges
            .read()
            .values()
            .filter(|e| e.edge_type == edge_type)
            .cloned()
            .collect();
        edges.sort_by_key(|e| e.id);
        Ok(Box::new(edges.into_iter().map(Ok)))
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    fn iter_outgoing(&self, id: NodeId, edge_type: Option<&str>) -> Result<EdgeIter<'_>> {
        self.directed_edges(id, Direction::Outgoing, edge_type)
    }

    fn iter_incoming(&self, id: NodeId, edge_type: Option<&str>) -> Result<EdgeIter<'_>> {
        self.directed_edges(id, Direction::Incoming, edge_type)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    fn node_count(&self) -> Result<u64> {
        Ok(self.nodes.read().len() as u64)
    }

    fn edge_count(&self) -> Result<u64> {
        Ok(self.edges.read().len() as u64)
    }

    fn labels(&self) -> Result<Vec<String>> {
        let mut labels: Vec<String> = self
            .label_index
            .read()
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(label, _)| label.clone())
            .collect();
        labels.sort();
        Ok(labels)
    }

    fn edge_types(&self) -> Result<Vec<String>> {
        let mut types: Vec<String> = self
            .edges
            .read()
            .values()
            .map(|e| e.edge_type.clone())
            .collect();
        types.sort();
        types.dedup();
        Ok(types)
    }
}

impl MemoryStore {
    fn directed_edges(
        &self,
        id: NodeId,
        dir: Direction,
        edge_type: Option<&str>,
    ) -> Result<EdgeIter<'_>> {
        let edge_ids = self
            .adjacency
            .read()
            .get(&id)
            .cloned()
            .unwrap_or_default();
        let edges_guard = self.edges.read();
        let mut result: Vec<Edge> = edge_ids
            .iter()
            .filter_map(|eid| edges_guard.get(eid))
            .filter(|e| e.matches_direction(id, dir))
            .filter(|e| edge_type.map_or(true, |t| e.edge_type == t))
            .cloned()
            .collect();
        drop(edges_guard);
        result.sort_by_key(|e| e.id);
        Ok(Box::new(result.into_iter().map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    fn props(pairs: &[(&str, Value)]) -> PropertyMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_create_and_get_node() {
        let store = MemoryStore::new();
        let id = store
            .add_node(None, &["Person"], props(&[("name", Value::from("Ada"))]))
            .unwrap();
        let node = store.node(id).unwrap().unwrap();
        assert!(node.has_label("Person"));
        assert_eq!(node.get("name"), Some(&Value::from("Ada")));
    }

    #[test]
    fn test_explicit_id_conflict() {
        let store = MemoryStore::new();
        store.add_node(Some(NodeId(7)), &[], PropertyMap::new()).unwrap();
        let err = store.add_node(Some(NodeId(7)), &[], PropertyMap::new()).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Constraint);
        // The allocator stays ahead of explicit ids.
        let next = store.add_node(None, &[], PropertyMap::new()).unwrap();
        assert!(next.0 > 7);
    }

    #[test]
    fn test_edge_requires_endpoints() {
        let store = MemoryStore::new();
        let a = store.add_node(None, &[], PropertyMap::new()).unwrap();
        let err = store
            .add_edge(a, NodeId(99), "KNOWS", 1.0, PropertyMap::new())
            .unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Constraint);
    }

    #[test]
    fn test_delete_connected_node_needs_cascade() {
        let store = MemoryStore::new();
        let a = store.add_node(None, &["Person"], PropertyMap::new()).unwrap();
        let b = store.add_node(None, &["Person"], PropertyMap::new()).unwrap();
        store.add_edge(a, b, "KNOWS", 1.0, PropertyMap::new()).unwrap();

        let err = store.delete_node(a, false).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Constraint);
        // Nothing was mutated.
        assert!(store.node(a).unwrap().is_some());
        assert_eq!(store.edge_count().unwrap(), 1);

        assert!(store.delete_node(a, true).unwrap());
        assert_eq!(store.edge_count().unwrap(), 0);
    }

    #[test]
    fn test_scans_are_id_ascending() {
        let store = MemoryStore::new();
        for _ in 0..5 {
            store.add_node(None, &["N"], PropertyMap::new()).unwrap();
        }
        let ids: Vec<u64> = store
            .all_nodes()
            .unwrap()
            .map(|n| n.unwrap().id.0)
            .collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_label_index_tracks_set_labels() {
        let store = MemoryStore::new();
        let id = store.add_node(None, &["A"], PropertyMap::new()).unwrap();
        store.set_node_labels(id, &["B", "C"]).unwrap();

        assert_eq!(store.find_nodes_by_label("A").unwrap().count(), 0);
        assert_eq!(store.find_nodes_by_label("B").unwrap().count(), 1);
        assert_eq!(store.labels().unwrap(), vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_directed_adjacency() {
        let store = MemoryStore::new();
        let a = store.add_node(None, &[], PropertyMap::new()).unwrap();
        let b = store.add_node(None, &[], PropertyMap::new()).unwrap();
        store.add_edge(a, b, "KNOWS", 1.0, PropertyMap::new()).unwrap();
        store.add_edge(b, a, "LIKES", 1.0, PropertyMap::new()).unwrap();

        assert_eq!(store.iter_outgoing(a, None).unwrap().count(), 1);
        assert_eq!(store.iter_incoming(a, None).unwrap().count(), 1);
        assert_eq!(store.iter_outgoing(a, Some("KNOWS")).unwrap().count(), 1);
        assert_eq!(store.iter_outgoing(a, Some("LIKES")).unwrap().count(), 0);
        assert_eq!(store.adjacent_edges(a, Direction::Both, None).unwrap().len(), 2);
    }

    #[test]
    fn test_set_property_null_removes() {
        let store = MemoryStore::new();
        let id = store
            .add_node(None, &[], props(&[("x", Value::Int(1))]))
            .unwrap();
        store.set_node_property(id, "x", Value::Null).unwrap();
        assert!(store.node(id).unwrap().unwrap().get("x").is_none());
    }
}
