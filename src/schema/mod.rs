//! Schema tracker.
//!
//! Observed labels, edge types, and coarse per-label frequencies, kept for
//! cardinality estimation. Updated opportunistically on writes and
//! rebuildable by scanning the store. Planning input only — never consulted
//! for correctness.

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;

use crate::error::Result;
use crate::storage::GraphStore;

#[derive(Debug, Default)]
struct Inner {
    node_count: u64,
    edge_count: u64,
    label_freq: HashMap<String, u64>,
    edge_types: HashSet<String>,
    /// (label, property) pairs covered by a host-side index.
    indexes: HashSet<(String, String)>,
}

/// Process-wide mutable planning state; writers synchronize on the mutex.
#[derive(Debug, Default)]
pub struct SchemaTracker {
    inner: Mutex<Inner>,
}

/// A point-in-time copy handed to the physical planner.
#[derive(Debug, Clone, Default)]
pub struct SchemaStats {
    pub node_count: u64,
    pub edge_count: u64,
    pub label_freq: HashMap<String, u64>,
    pub edge_types: HashSet<String>,
    pub indexes: HashSet<(String, String)>,
}

impl SchemaStats {
    pub fn label_frequency(&self, label: &str) -> u64 {
        self.label_freq.get(label).copied().unwrap_or(0)
    }

    /// Average out-degree, floored at 1 to keep estimates monotone.
    pub fn avg_out_degree(&self) -> f64 {
        if self.node_count == 0 {
            1.0
        } else {
            (self.edge_count as f64 / self.node_count as f64).max(1.0)
        }
    }

    pub fn has_index(&self, label: &str, property: &str) -> bool {
        self.indexes.contains(&(label.to_string(), property.to_string()))
    }
}

impl SchemaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_node_created(&self, labels: &[String]) {
        let mut inner = self.inner.lock();
        inner.node_count += 1;
        for label in labels {
            *inner.label_freq.entry(label.clone()).or_insert(0) += 1;
        }
    }

    pub fn observe_node_deleted(&self, labels: &[String]) {
        let mut inner = self.inner.lock();
        inner.node_count = inner.node_count.saturating_sub(1);
        for label in labels {
            if let Some(freq) = inner.label_freq.get_mut(label) {
                *freq = freq.saturating_sub(1);
            }
        }
    }

    pub fn observe_label_added(&self, label: &str) {
        let mut inner = self.inner.lock();
        *inner.label_freq.entry(label.to_string()).or_insert(0) += 1;
    }

    pub fn observe_edge_created(&self, edge_type: &str) {
        let mut inner = self.inner.lock();
        inner.edge_count += 1;
        inner.edge_types.insert(edge_type.to_string());
    }

    pub fn observe_edge_deleted(&self, count: u64) {
        let mut inner = self.inner.lock();
        inner.edge_count = inner.edge_count.saturating_sub(count);
    }

    /// Record a host-side index covering (label, property) lookups.
    pub fn register_index(&self, label: &str, property: &str) {
        self.inner
            .lock()
            .indexes
            .insert((label.to_string(), property.to_string()));
    }

    pub fn snapshot(&self) -> SchemaStats {
        let inner = self.inner.lock();
        SchemaStats {
            node_count: inner.node_count,
            edge_count: inner.edge_count,
            label_freq: inner.label_freq.clone(),
            edge_types: inner.edge_types.clone(),
            indexes: inner.indexes.clone(),
        }
    }

    /// Rescan the store and replace all estimates. Registered indexes are
    /// kept.
    pub fn rebuild(&self, store: &dyn GraphStore) -> Result<()> {
        let mut label_freq: HashMap<String, u64> = HashMap::new();
        let mut node_count = 0u64;
        for node in store.all_nodes()? {
            let node = node?;
            node_count += 1;
            for label in &node.labels {
                *label_freq.entry(label.clone()).or_insert(0) += 1;
            }
        }

        let mut edge_types = HashSet::new();
        let mut edge_count = 0u64;
        for edge in store.all_edges()? {
            let edge = edge?;
            edge_count += 1;
            edge_types.insert(edge.edge_type);
        }

        let mut inner = self.inner.lock();
        inner.node_count = node_count;
        inner.edge_count = edge_count;
        inner.label_freq = label_freq;
        inner.edge_types = edge_types;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PropertyMap;
    use crate::storage::MemoryStore;

    #[test]
    fn test_observe_and_snapshot() {
        let tracker = SchemaTracker::new();
        tracker.observe_node_created(&["Person".into()]);
        tracker.observe_node_created(&["Person".into(), "Admin".into()]);
        tracker.observe_edge_created("KNOWS");

        let stats = tracker.snapshot();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.label_frequency("Person"), 2);
        assert_eq!(stats.label_frequency("Admin"), 1);
        assert_eq!(stats.label_frequency("Ghost"), 0);
        assert!(stats.edge_types.contains("KNOWS"));
    }

    #[test]
    fn test_delete_decrements() {
        let tracker = SchemaTracker::new();
        tracker.observe_node_created(&["A".into()]);
        tracker.observe_node_deleted(&["A".into()]);
        let stats = tracker.snapshot();
        assert_eq!(stats.node_count, 0);
        assert_eq!(stats.label_frequency("A"), 0);
    }

    #[test]
    fn test_rebuild_from_store() {
        let store = MemoryStore::new();
        let a = store.add_node(None, &["Person"], PropertyMap::new()).unwrap();
        let b = store.add_node(None, &["Dog"], PropertyMap::new()).unwrap();
        store.add_edge(a, b, "OWNS", 1.0, PropertyMap::new()).unwrap();

        let tracker = SchemaTracker::new();
        tracker.register_index("Person", "name");
        tracker.rebuild(&store).unwrap();

        let stats = tracker.snapshot();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.edge_count, 1);
        assert_eq!(stats.label_frequency("Person"), 1);
        assert!(stats.edge_types.contains("OWNS"));
        assert!(stats.has_index("Person", "name"));
    }

    #[test]
    fn test_avg_out_degree_floor() {
        let stats = SchemaStats::default();
        assert_eq!(stats.avg_out_degree(), 1.0);
    }
}
