//! srlx Core - Domain models, errors and shared configuration
//!
//! This crate defines the types shared by every stage of the extraction
//! pipeline:
//! - SRL annotation models (annotations, frames, arguments, modifiers)
//! - The relation record produced by extraction
//! - Common error types
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, LoggingConfig, PipelineConfig, SinkConfig, StoreBackend, StoreConfig,
    MAX_QUEUE_CAPACITY, MAX_WORKERS,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for srlx operations
#[derive(Error, Debug)]
pub enum SrlxError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Annotation error: {0}")]
    AnnotationError(String),

    #[error("Extraction error: {0}")]
    ExtractionError(String),

    #[error("Source error: {0}")]
    SourceError(String),

    #[error("Sink error: {0}")]
    SinkError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SrlxError>;

impl From<ConfigError> for SrlxError {
    fn from(err: ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

// ============================================================================
// SRL Annotation Models
// ============================================================================

/// Core arguments of one SRL frame, in role order A0 < A1 < A2 < A3
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(rename = "A0", default, skip_serializing_if = "Option::is_none")]
    pub a0: Option<String>,

    #[serde(rename = "A1", default, skip_serializing_if = "Option::is_none")]
    pub a1: Option<String>,

    #[serde(rename = "A2", default, skip_serializing_if = "Option::is_none")]
    pub a2: Option<String>,

    #[serde(rename = "A3", default, skip_serializing_if = "Option::is_none")]
    pub a3: Option<String>,
}

impl Arguments {
    /// Non-empty arguments in role order
    pub fn present(&self) -> Vec<&str> {
        [&self.a0, &self.a1, &self.a2, &self.a3]
            .into_iter()
            .filter_map(|a| a.as_deref())
            .filter(|a| !a.trim().is_empty())
            .collect()
    }
}

/// Adjunct modifier roles carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKind {
    Direction,
    Manner,
    Location,
    Time,
    Extent,
    Purpose,
    Cause,
    Negation,
}

impl ModifierKind {
    /// All modifier kinds in enumeration order
    pub const ALL: [ModifierKind; 8] = [
        Self::Direction,
        Self::Manner,
        Self::Location,
        Self::Time,
        Self::Extent,
        Self::Purpose,
        Self::Cause,
        Self::Negation,
    ];

    /// SRL label used on the wire
    pub fn label(&self) -> &'static str {
        match self {
            Self::Direction => "AM-DIR",
            Self::Manner => "AM-MNR",
            Self::Location => "AM-LOC",
            Self::Time => "AM-TMP",
            Self::Extent => "AM-EXT",
            Self::Purpose => "AM-PNC",
            Self::Cause => "AM-CAU",
            Self::Negation => "AM-NEG",
        }
    }
}

impl std::fmt::Display for ModifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Adjunct modifiers of one SRL frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(rename = "AM-DIR", default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,

    #[serde(rename = "AM-MNR", default, skip_serializing_if = "Option::is_none")]
    pub manner: Option<String>,

    #[serde(rename = "AM-LOC", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(rename = "AM-TMP", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    #[serde(rename = "AM-EXT", default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<String>,

    #[serde(rename = "AM-PNC", default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    #[serde(rename = "AM-CAU", default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,

    #[serde(rename = "AM-NEG", default, skip_serializing_if = "Option::is_none")]
    pub negation: Option<String>,
}

impl Modifiers {
    /// Get the modifier text for a kind
    pub fn get(&self, kind: ModifierKind) -> Option<&str> {
        let value = match kind {
            ModifierKind::Direction => &self.direction,
            ModifierKind::Manner => &self.manner,
            ModifierKind::Location => &self.location,
            ModifierKind::Time => &self.time,
            ModifierKind::Extent => &self.extent,
            ModifierKind::Purpose => &self.purpose,
            ModifierKind::Cause => &self.cause,
            ModifierKind::Negation => &self.negation,
        };
        value.as_deref()
    }

    /// Non-empty modifiers in enumeration order
    pub fn present(&self) -> Vec<(ModifierKind, &str)> {
        ModifierKind::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|text| (kind, text)))
            .filter(|(_, text)| !text.trim().is_empty())
            .collect()
    }
}

/// One predicate of a sentence with its labelled spans
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Predicate verb as it appears in the sentence
    #[serde(rename = "V", default)]
    pub verb: String,

    #[serde(flatten)]
    pub arguments: Arguments,

    #[serde(flatten)]
    pub modifiers: Modifiers,
}

impl Frame {
    /// Create a frame for a verb with no arguments
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            ..Default::default()
        }
    }

    /// Builder: set argument `A{slot}` (slots above 3 are ignored)
    pub fn with_argument(mut self, slot: usize, text: impl Into<String>) -> Self {
        let text = Some(text.into());
        match slot {
            0 => self.arguments.a0 = text,
            1 => self.arguments.a1 = text,
            2 => self.arguments.a2 = text,
            3 => self.arguments.a3 = text,
            _ => {}
        }
        self
    }

    /// Builder: set a modifier
    pub fn with_modifier(mut self, kind: ModifierKind, text: impl Into<String>) -> Self {
        let text = Some(text.into());
        match kind {
            ModifierKind::Direction => self.modifiers.direction = text,
            ModifierKind::Manner => self.modifiers.manner = text,
            ModifierKind::Location => self.modifiers.location = text,
            ModifierKind::Time => self.modifiers.time = text,
            ModifierKind::Extent => self.modifiers.extent = text,
            ModifierKind::Purpose => self.modifiers.purpose = text,
            ModifierKind::Cause => self.modifiers.cause = text,
            ModifierKind::Negation => self.modifiers.negation = text,
        }
        self
    }
}

/// Annotation bundle returned by an SRL annotator for one sentence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Sentence tokens as the annotator split them
    #[serde(rename = "words", alias = "tokens", default)]
    pub tokens: Vec<String>,

    /// Part-of-speech tag per token
    #[serde(rename = "pos", default)]
    pub pos_tags: Vec<String>,

    /// Noun-phrase chunk tag per token (IOBES scheme)
    #[serde(rename = "chunk", default)]
    pub chunk_tags: Vec<String>,

    /// SRL frames, one per predicate
    #[serde(rename = "srl", default)]
    pub frames: Vec<Frame>,
}

impl Annotation {
    /// Check that the tag arrays line up with the token array
    pub fn validate(&self) -> Result<()> {
        let tokens = self.tokens.len();
        if self.pos_tags.len() != tokens || self.chunk_tags.len() != tokens {
            return Err(SrlxError::AnnotationError(format!(
                "tag arrays do not match {} tokens (pos: {}, chunk: {})",
                tokens,
                self.pos_tags.len(),
                self.chunk_tags.len()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Relation Records
// ============================================================================

/// A relation between two entities, linked by a normalized verb
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationRecord {
    pub left_entity: String,
    pub right_entity: String,
    pub relation: String,
    pub sentence: String,
}

impl RelationRecord {
    pub fn new(
        left_entity: impl Into<String>,
        right_entity: impl Into<String>,
        relation: impl Into<String>,
        sentence: impl Into<String>,
    ) -> Self {
        Self {
            left_entity: left_entity.into(),
            right_entity: right_entity.into(),
            relation: relation.into(),
            sentence: sentence.into(),
        }
    }
}

impl std::fmt::Display for RelationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.left_entity, self.right_entity, self.relation
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_keep_role_order() {
        let frame = Frame::new("gave")
            .with_argument(2, "the dog")
            .with_argument(0, "John")
            .with_argument(1, "");

        assert_eq!(frame.arguments.present(), vec!["John", "the dog"]);
    }

    #[test]
    fn test_modifiers_fixed_order() {
        let frame = Frame::new("ran")
            .with_modifier(ModifierKind::Negation, "not")
            .with_modifier(ModifierKind::Location, "in the park")
            .with_modifier(ModifierKind::Direction, "home");

        let kinds: Vec<ModifierKind> = frame
            .modifiers
            .present()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ModifierKind::Direction,
                ModifierKind::Location,
                ModifierKind::Negation
            ]
        );
    }

    #[test]
    fn test_frame_deserializes_senna_labels() {
        let json = r#"{"V": "chased", "A0": "The cat", "A1": "the mouse", "AM-LOC": "in the garden", "AM-DIS": "so"}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();

        assert_eq!(frame.verb, "chased");
        assert_eq!(frame.arguments.a0.as_deref(), Some("The cat"));
        assert_eq!(frame.modifiers.location.as_deref(), Some("in the garden"));
        assert!(frame.arguments.a2.is_none());
    }

    #[test]
    fn test_annotation_validate() {
        let mut annotation = Annotation {
            tokens: vec!["The".into(), "cat".into()],
            pos_tags: vec!["DT".into(), "NN".into()],
            chunk_tags: vec!["B-NP".into(), "E-NP".into()],
            frames: vec![],
        };
        assert!(annotation.validate().is_ok());

        annotation.pos_tags.pop();
        assert!(matches!(
            annotation.validate(),
            Err(SrlxError::AnnotationError(_))
        ));
    }

    #[test]
    fn test_relation_record_display() {
        let record = RelationRecord::new("cat", "mouse", "chase", "The cat chased the mouse");
        assert_eq!(record.to_string(), "(cat, mouse, chase)");
    }
}
