//! SRL annotator seam
//!
//! The semantic role labeller itself is an external tool. Extraction only
//! needs something that turns a sentence into an [`Annotation`]; the
//! [`PrecomputedAnnotator`] serves annotations produced offline (SENNA style
//! JSON) so a corpus can be annotated once and extracted many times.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use srlx_core::{Annotation, Result, SrlxError};

/// Trait for semantic role labelling annotators
pub trait Annotator: Send + Sync {
    /// Annotate one plain-ASCII sentence
    fn annotate(&self, sentence: &str) -> Result<Annotation>;
}

/// One entry of a precomputed annotation file
#[derive(Debug, Deserialize)]
struct AnnotatedSentence {
    sentence: String,
    #[serde(flatten)]
    annotation: Annotation,
}

/// Annotator backed by annotations computed ahead of time
///
/// Sentences are matched after collapsing whitespace. Unknown sentences get
/// an empty annotation, which extraction treats as "no frames".
#[derive(Debug, Clone, Default)]
pub struct PrecomputedAnnotator {
    annotations: HashMap<String, Annotation>,
}

impl PrecomputedAnnotator {
    /// Create an empty annotator
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the annotation of a sentence
    pub fn insert(&mut self, sentence: &str, annotation: Annotation) {
        self.annotations.insert(sentence_key(sentence), annotation);
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(mut self, sentence: &str, annotation: Annotation) -> Self {
        self.insert(sentence, annotation);
        self
    }

    /// Parse a JSON array of `{sentence, words, pos, chunk, srl}` entries
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<AnnotatedSentence> = serde_json::from_str(json)
            .map_err(|e| SrlxError::AnnotationError(format!("Invalid annotation file: {e}")))?;

        let mut annotator = Self::new();
        for entry in entries {
            annotator.insert(&entry.sentence, entry.annotation);
        }
        Ok(annotator)
    }

    /// Load annotations from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SrlxError::AnnotationError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Number of annotated sentences
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}

impl Annotator for PrecomputedAnnotator {
    fn annotate(&self, sentence: &str) -> Result<Annotation> {
        match self.annotations.get(&sentence_key(sentence)) {
            Some(annotation) => Ok(annotation.clone()),
            None => {
                debug!(sentence, "no precomputed annotation");
                Ok(Annotation::default())
            }
        }
    }
}

fn sentence_key(sentence: &str) -> String {
    sentence.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANNOTATIONS: &str = r#"[
        {
            "sentence": "The cat  chased the mouse",
            "words": ["The", "cat", "chased", "the", "mouse"],
            "pos": ["DT", "NN", "VBD", "DT", "NN"],
            "chunk": ["B-NP", "E-NP", "S-VP", "B-NP", "E-NP"],
            "srl": [{"V": "chased", "A0": "The cat", "A1": "the mouse"}]
        }
    ]"#;

    #[test]
    fn test_from_json_and_lookup() {
        let annotator = PrecomputedAnnotator::from_json(ANNOTATIONS).unwrap();
        assert_eq!(annotator.len(), 1);

        let annotation = annotator.annotate("The cat chased the mouse").unwrap();
        assert_eq!(annotation.tokens.len(), 5);
        assert_eq!(annotation.frames[0].verb, "chased");
        assert_eq!(annotation.frames[0].arguments.a1.as_deref(), Some("the mouse"));
    }

    #[test]
    fn test_unknown_sentence_is_empty() {
        let annotator = PrecomputedAnnotator::from_json(ANNOTATIONS).unwrap();
        let annotation = annotator.annotate("Nothing here").unwrap();
        assert!(annotation.frames.is_empty());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            PrecomputedAnnotator::from_json("{not json"),
            Err(SrlxError::AnnotationError(_))
        ));
    }
}
