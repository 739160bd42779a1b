//! # cypherite — embeddable property-graph query engine
//!
//! A property-graph engine with an openCypher-dialect front end, designed to
//! live inside a host relational database: the graph persists in two
//! ordinary host tables, and the engine only ever touches them through a
//! narrow storage adapter.
//!
//! ## Design principles
//!
//! 1. **Trait-first**: `GraphStore` is the contract between the query
//!    pipeline and storage
//! 2. **Clean DTOs**: `Node`, `Edge`, `Value` cross all boundaries
//! 3. **Parser owns nothing**: Cypher → AST is a pure function
//! 4. **Storage-agnostic planner**: plans never know where rows live
//!
//! ## Quick start
//!
//! ```rust
//! use cypherite::{Graph, PropertyMap};
//!
//! # fn example() -> cypherite::Result<()> {
//! let graph = Graph::open_memory();
//!
//! graph.execute(
//!     "CREATE (n:Person {name: 'Ada', age: 36})",
//!     PropertyMap::new(),
//! )?;
//!
//! let result = graph.execute(
//!     "MATCH (n:Person) WHERE n.age > 30 RETURN n.name",
//!     PropertyMap::new(),
//! )?;
//! for row in &result.rows {
//!     println!("{:?}", row.get_value("n.name"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! query string → lexer → parser (AST) → logical planner → optimizer
//!              → physical planner (cost) → volcano executor → rows
//! ```
//!
//! ## Stores
//!
//! | Store | Description |
//! |-------|-------------|
//! | `MemoryStore` | In-memory graph for testing/embedding |
//! | `TableStore` | Host tables via SQL through `HostConnection` |

pub mod config;
pub mod cypher;
pub mod error;
pub mod eval;
pub mod exec;
pub mod model;
pub mod planner;
pub mod schema;
pub mod storage;

use tracing::debug;

// ============================================================================
// Re-exports: model
// ============================================================================

pub use model::{Direction, Edge, EdgeId, Node, NodeId, Path, PropertyMap, Value};

// ============================================================================
// Re-exports: errors and config
// ============================================================================

pub use config::GraphConfig;
pub use error::{Error, ErrorCategory, Location, Result};

// ============================================================================
// Re-exports: storage and execution
// ============================================================================

pub use exec::{CancelFlag, ExecutionStats, QueryResult, ResultRow};
pub use schema::SchemaTracker;
pub use storage::{GraphStore, HostConnection, HostValue, MemoryStore, TableStore};

// ============================================================================
// Top-level Graph handle
// ============================================================================

/// The primary entry point. A `Graph` wraps a storage adapter, a schema
/// tracker, and the resource-cap configuration.
pub struct Graph<S: GraphStore> {
    store: S,
    tracker: SchemaTracker,
    config: GraphConfig,
}

impl<S: GraphStore> Graph<S> {
    pub fn with_store(store: S) -> Self {
        Self::with_config(store, GraphConfig::default())
    }

    pub fn with_config(store: S, config: GraphConfig) -> Self {
        Self { store, tracker: SchemaTracker::new(), config }
    }

    /// Execute a Cypher query with parameters.
    pub fn execute<P>(&self, query: &str, params: P) -> Result<QueryResult>
    where
        P: Into<PropertyMap>,
    {
        self.execute_with(query, params.into(), CancelFlag::new())
    }

    /// Execute with an external cancellation flag. Setting the flag makes
    /// the next iterator step return a CANCELLED error.
    pub fn execute_with(
        &self,
        query: &str,
        params: PropertyMap,
        cancel: CancelFlag,
    ) -> Result<QueryResult> {
        debug!(query, "execute");
        let statement = cypher::parse_with_limit(query, self.config.max_parser_depth)?;
        let physical = self.plan_statement(statement.query)?;

        if statement.explain {
            let rendered = planner::explain(&physical);
            return Ok(QueryResult {
                columns: vec!["plan".into()],
                rows: vec![ResultRow {
                    values: vec![("plan".into(), Value::String(rendered))],
                }],
                stats: ExecutionStats::default(),
            });
        }

        exec::execute(
            &physical,
            &self.store,
            &params,
            Some(&self.tracker),
            &self.config,
            cancel,
        )
    }

    /// Render the physical plan for a query without executing it.
    pub fn explain(&self, query: &str) -> Result<String> {
        let statement = cypher::parse_with_limit(query, self.config.max_parser_depth)?;
        let physical = self.plan_statement(statement.query)?;
        Ok(planner::explain(&physical))
    }

    fn plan_statement(&self, query: cypher::ast::Query) -> Result<planner::PhysicalPlan> {
        let logical = planner::plan(query)?;
        let logical = planner::optimize(logical);
        let stats = self.tracker.snapshot();
        Ok(planner::plan_physical(logical, &stats))
    }

    /// Rebuild the schema tracker by scanning the store.
    pub fn refresh_schema(&self) -> Result<()> {
        self.tracker.rebuild(&self.store)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn tracker(&self) -> &SchemaTracker {
        &self.tracker
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }
}

/// In-memory graph for testing and embedding.
impl Graph<MemoryStore> {
    pub fn open_memory() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

/// Graph persisted in a host's companion tables.
impl<C: HostConnection> Graph<TableStore<C>> {
    /// Wrap a host connection, creating `<name>_nodes` / `<name>_edges` if
    /// absent, and prime the schema tracker from the existing rows.
    pub fn open_table(conn: C, name: &str) -> Result<Self> {
        let store = TableStore::new(conn, name)?;
        store.create_tables()?;
        let graph = Self::with_store(store);
        graph.refresh_schema()?;
        Ok(graph)
    }
}
