//! Canonical read/write traversal: the glue between a compiled [`crate::planner::Plan`],
//! the normalized [`crate::graph::Graph`], and the [`crate::optimistic::OptimisticStack`]
//! overlaid on top of it.

mod identify;
mod read;
mod stage;
mod write;

pub use identify::{identify, identify_required};
pub use read::{read_entity, DecisionMode, ReadContext};
pub use stage::stage_entity_write;
pub use write::write_selection;
