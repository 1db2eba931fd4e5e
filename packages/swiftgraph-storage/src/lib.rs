//! swiftgraph-storage: the persisted graph + the read path over it.
//!
//! - `schema`: table/index/materialized-view DDL (`spec.md` §6).
//! - `repository`: the write-path façade — upsert/version/tombstone/rebuild
//!   (`spec.md` §4.5).
//! - `graph`: the centered-graph query engine — fast path, lazy path, and the
//!   master/feature overlay merge (`spec.md` §4.6).
//! - `search`: `find_entities`/`get_members`, supplemented per
//!   `SPEC_FULL.md` §C.
//! - `error`: `StorageError`.

pub mod error;
pub mod graph;
pub mod repository;
pub mod schema;
pub mod search;

pub use error::{ErrorKind, Result, StorageError};
pub use graph::{Direction, GraphEdge, GraphNode, GraphPayload, GraphQuery, TargetTypeFilter};
pub use repository::Repository;
