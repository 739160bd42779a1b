//! # Property Graph Model
//!
//! The DTOs that cross every boundary: storage ↔ planner ↔ execution ↔ user.
//! This module is pure data — no I/O, no state.

pub mod json;
pub mod node;
pub mod path;
pub mod property_map;
pub mod relationship;
pub mod value;

pub use node::{LabelSet, Node, NodeId};
pub use path::Path;
pub use property_map::PropertyMap;
pub use relationship::{Direction, Edge, EdgeId};
pub use value::Value;
