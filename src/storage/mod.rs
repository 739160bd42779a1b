//! # Graph storage adapter
//!
//! `GraphStore` is the contract between the query engine and whatever holds
//! the graph. The executor is the only caller; the adapter is the only
//! component that touches backing storage.
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory reference store for tests/embedding |
//! | `TableStore` | `table` | Host-table adapter issuing SQL via `HostConnection` |

pub mod memory;
pub mod table;

use crate::error::Result;
use crate::model::{Direction, Edge, EdgeId, Node, NodeId, PropertyMap, Value};

pub use memory::MemoryStore;
pub use table::{HostConnection, HostValue, TableStore};

/// Streaming scan result. Rows surface adapter failures lazily.
pub type NodeIter<'a> = Box<dyn Iterator<Item = Result<Node>> + 'a>;
pub type EdgeIter<'a> = Box<dyn Iterator<Item = Result<Edge>> + 'a>;

/// The storage contract.
///
/// All operations are atomic with respect to the host's statement-level
/// transaction. Methods take `&self`; implementations synchronize
/// internally. Scans yield rows in identifier-ascending order.
pub trait GraphStore: Send + Sync {
    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Create a node. `id` is auto-generated when absent; an explicit id that
    /// already exists is a CONSTRAINT error.
    fn add_node(&self, id: Option<NodeId>, labels: &[&str], props: PropertyMap)
        -> Result<NodeId>;

    /// Fetch a node by id.
    fn node(&self, id: NodeId) -> Result<Option<Node>>;

    /// Delete a node. Without `cascade`, a node with connected edges is a
    /// CONSTRAINT error and nothing is mutated. Returns whether it existed.
    fn delete_node(&self, id: NodeId, cascade: bool) -> Result<bool>;

    /// Replace the node's whole property map.
    fn update_node_properties(&self, id: NodeId, props: PropertyMap) -> Result<()>;

    /// Upsert one property. A NULL value removes the key.
    fn set_node_property(&self, id: NodeId, key: &str, value: Value) -> Result<()>;

    fn remove_node_property(&self, id: NodeId, key: &str) -> Result<()>;

    /// Replace the node's label set.
    fn set_node_labels(&self, id: NodeId, labels: &[&str]) -> Result<()>;

    fn add_label(&self, id: NodeId, label: &str) -> Result<()>;

    fn remove_label(&self, id: NodeId, label: &str) -> Result<()>;

    // ========================================================================
    // Edge CRUD
    // ========================================================================

    /// Create an edge. Both endpoints must exist (CONSTRAINT otherwise).
    fn add_edge(
        &self,
        source: NodeId,
        target: NodeId,
        edge_type: &str,
        weight: f64,
        props: PropertyMap,
    ) -> Result<EdgeId>;

    fn edge(&self, id: EdgeId) -> Result<Option<Edge>>;

    fn delete_edge(&self, id: EdgeId) -> Result<bool>;

    fn set_edge_property(&self, id: EdgeId, key: &str, value: Value) -> Result<()>;

    fn remove_edge_property(&self, id: EdgeId, key: &str) -> Result<()>;

    // ========================================================================
    // Scans
    // ========================================================================

    fn all_nodes(&self) -> Result<NodeIter<'_>>;

    fn find_nodes_by_label(&self, label: &str) -> Result<NodeIter<'_>>;

    fn all_edges(&self) -> Result<EdgeIter<'_>>;

    fn find_edges_by_type(&self, edge_type: &str) -> Result<EdgeIter<'_>>;

    // ========================================================================
    // Traversal
    // ========================================================================

    fn iter_outgoing(&self, id: NodeId, edge_type: Option<&str>) -> Result<EdgeIter<'_>>;

    fn iter_incoming(&self, id: NodeId, edge_type: Option<&str>) -> Result<EdgeIter<'_>>;

    /// Adjacent edges in `dir`, deduplicated for self-loops.
    fn adjacent_edges(
        &self,
        id: NodeId,
        dir: Direction,
        edge_type: Option<&str>,
    ) -> Result<Vec<Edge>> {
        let mut edges: Vec<Edge> = match dir {
            Direction::Outgoing => self.iter_outgoing(id, edge_type)?.collect::<Result<_>>()?,
            Direction::Incoming => self.iter_incoming(id, edge_type)?.collect::<Result<_>>()?,
            Direction::Both => {
                let mut out: Vec<Edge> =
                    self.iter_outgoing(id, edge_type)?.collect::<Result<_>>()?;
                let incoming: Vec<Edge> =
                    self.iter_incoming(id, edge_type)?.collect::<Result<_>>()?;
                for edge in incoming {
                    if !out.iter().any(|e| e.id == edge.id) {
                        out.push(edge);
                    }
                }
                out
            }
        };
        edges.sort_by_key(|e| e.id);
        Ok(edges)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    fn node_count(&self) -> Result<u64>;

    fn edge_count(&self) -> Result<u64>;

    /// All distinct labels.
    fn labels(&self) -> Result<Vec<String>>;

    /// All distinct edge types.
    fn edge_types(&self) -> Result<Vec<String>>;
}
