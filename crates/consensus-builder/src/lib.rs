//! Consensus Builder
//!
//! Ranks fused signals for reporting and flags disagreement between
//! analysis roles. Neither output gates portfolio construction.

pub mod conflicts;
pub mod consensus;

pub use conflicts::{detect_conflicts, DEFAULT_CONFIDENCE_GAP};
pub use consensus::{build_consensus, final_score, BEARISH_FLOOR};
