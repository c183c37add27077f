//! Domain models shared by the stores and the router
//!
//! These types cross every boundary: classifier ↔ coordinator ↔ store ↔ gateway.
//! Pure data, no I/O.

mod content;
mod graph;
mod query;
mod vector;

pub use content::Content;
pub use graph::{validate_properties, GraphEntitySpec, GraphRelationshipSpec, GraphRow, Properties};
pub use query::{
    AliasTarget, Filter, GraphQuery, Hop, NodePattern, RelationshipPattern, ReturnItem,
    MAX_HOPS,
};
pub use vector::{HitSource, RankingPolicy, SearchHit, VectorRecord};
