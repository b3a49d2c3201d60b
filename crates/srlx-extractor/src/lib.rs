//! srlx Extractor - Relation extraction from SRL annotations
//!
//! Maps the argument and modifier spans of semantic-role-labeling frames
//! back onto the sentence's tokens, chunk tags and POS tags, and turns
//! each frame into (entity, entity, verb) relation records.

use srlx_core::{RelationRecord, Result};

pub mod align;
pub mod annotator;
pub mod relation;
pub mod text;

pub use align::{find_subsequence, locate_span, EntityAligner, FormedEntity};
pub use annotator::{Annotator, PrecomputedAnnotator};
pub use relation::RelationFormer;
pub use text::{DefaultAnalyzer, TextAnalyzer};

/// Trait for relation extractors
///
/// Implementations are called from blocking worker threads and must be
/// shareable across them.
pub trait RelationExtractor: Send + Sync {
    /// Extract every relation found in a piece of free text
    fn extract(&self, text: &str) -> Result<Vec<RelationRecord>>;
}
