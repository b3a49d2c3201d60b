//! Relation forming module
//!
//! Turns the SRL frames of a sentence into relation records:
//! - every pair of arguments becomes an (argument, argument, verb) record
//! - every modifier is linked to the nearest argument and becomes an
//!   (argument, modifier, verb) record

use std::sync::Arc;

use tracing::debug;

use crate::align::{EntityAligner, FormedEntity};
use crate::annotator::Annotator;
use crate::text::{ascii_only, TextAnalyzer};
use crate::RelationExtractor;
use srlx_core::{Annotation, Frame, RelationRecord, Result};

// ============================================================================
// Pairing rules
// ============================================================================

/// Index pairs `(i, j)` with `i < j` over `count` arguments, in order
pub fn argument_pairs(count: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..count).flat_map(move |i| (i + 1..count).map(move |j| (i, j)))
}

/// Pick the argument whose first occurrence is closest to the modifier
///
/// Distances are absolute byte offsets between first occurrences in the
/// sentence; ties go to the earliest argument. Returns `None` when the
/// modifier does not occur in the sentence or there are no arguments.
/// Arguments that do not occur in the sentence rank last.
pub fn link_modifier(sentence: &str, modifier: &str, arguments: &[&str]) -> Option<usize> {
    let modifier_at = sentence.find(modifier)?;

    arguments
        .iter()
        .enumerate()
        .min_by_key(|(_, argument)| {
            sentence
                .find(*argument)
                .map_or(usize::MAX, |at| at.abs_diff(modifier_at))
        })
        .map(|(index, _)| index)
}

// ============================================================================
// Relation former
// ============================================================================

/// Forms relation records from SRL annotations
pub struct RelationFormer {
    annotator: Arc<dyn Annotator>,
    analyzer: Arc<dyn TextAnalyzer>,
    aligner: EntityAligner,
}

impl RelationFormer {
    /// Create a new former with the default entity aligner
    pub fn new(annotator: Arc<dyn Annotator>, analyzer: Arc<dyn TextAnalyzer>) -> Self {
        Self {
            annotator,
            analyzer,
            aligner: EntityAligner::default(),
        }
    }

    /// Use a custom entity aligner
    pub fn with_aligner(mut self, aligner: EntityAligner) -> Self {
        self.aligner = aligner;
        self
    }

    /// Form relations for every sentence of a text
    pub fn form_relations(&self, text: &str) -> Result<Vec<RelationRecord>> {
        let mut records = Vec::new();
        for sentence in self.analyzer.sentences(text) {
            records.extend(self.sentence_relations(&sentence)?);
        }
        Ok(records)
    }

    /// Form relations for a single sentence
    pub fn sentence_relations(&self, sentence: &str) -> Result<Vec<RelationRecord>> {
        let sentence = ascii_only(sentence);
        if sentence.trim().is_empty() {
            return Ok(Vec::new());
        }

        let annotation = self.annotator.annotate(&sentence)?;
        if annotation.frames.is_empty() {
            debug!(sentence = %sentence, "no SRL frames, skipping sentence");
            return Ok(Vec::new());
        }
        annotation.validate()?;

        let records: Vec<RelationRecord> = annotation
            .frames
            .iter()
            .flat_map(|frame| self.frame_relations(&sentence, &annotation, frame))
            .collect();

        debug!(
            sentence = %sentence,
            frames = annotation.frames.len(),
            relations = records.len(),
            "formed sentence relations"
        );
        Ok(records)
    }

    /// Form the relations of one frame
    pub fn frame_relations(
        &self,
        sentence: &str,
        annotation: &Annotation,
        frame: &Frame,
    ) -> Vec<RelationRecord> {
        let arguments = frame.arguments.present();
        if arguments.is_empty() {
            return Vec::new();
        }

        let verb = self.analyzer.normalize_verb(&frame.verb);
        let entities: Vec<Option<FormedEntity>> = arguments
            .iter()
            .map(|argument| self.aligner.form_entity(annotation, argument))
            .collect();

        let mut records = Vec::new();

        for (i, j) in argument_pairs(arguments.len()) {
            let (Some(left), Some(right)) = (&entities[i], &entities[j]) else {
                continue;
            };
            records.push(RelationRecord::new(
                left.text.as_str(),
                right.text.as_str(),
                verb.as_str(),
                sentence,
            ));
        }

        for (kind, modifier) in frame.modifiers.present() {
            let Some(linked) = link_modifier(sentence, modifier, &arguments) else {
                debug!(modifier = %kind, "modifier not found in sentence");
                continue;
            };
            let Some(argument) = &entities[linked] else {
                continue;
            };
            let Some(phrase) = self.aligner.form_entity(annotation, modifier) else {
                continue;
            };

            records.push(RelationRecord::new(
                argument.text.as_str(),
                phrase.phrase(),
                verb.as_str(),
                sentence,
            ));
        }

        records
    }
}

impl RelationExtractor for RelationFormer {
    fn extract(&self, text: &str) -> Result<Vec<RelationRecord>> {
        self.form_relations(text)
    }
}

// ============================================================================
// Tests
// ============================================================================
