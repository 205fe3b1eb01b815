//! Core graph data structures: categories, segments and the BELONGS_TO link

mod category;
mod contract;
mod segment;

pub use category::{Category, ClauseExplanation, ContractExplanation};
pub use contract::ContractId;
pub use segment::{join_segment_text, ScoredSegment, SegmentId, TextSegment, BELONGS_TO};
