//! Entity alignment module
//!
//! SRL annotators return argument and modifier spans as flat strings that do
//! not always agree with the sentence tokenization. This module realigns a
//! span onto the sentence tokens, locates it in the sentence, and merges the
//! noun-phrase chunks it covers into a normalized entity string.

use std::collections::{HashMap, HashSet};

use srlx_core::Annotation;

/// POS tags whose tokens may appear in an entity
pub const ENTITY_POS_TAGS: &[&str] = &[
    "NN", "NNS", "NNP", "NNPS", "PRP", "PRP$", "WP", "WP$", "CD", "FW",
];

/// Chunk tags of pronoun phrases; they only ever extend an open span
pub const PRONOUN_PHRASE_TAGS: &[&str] = &["B-PRP", "I-PRP", "E-PRP", "S-PRP"];

// ============================================================================
// Span realignment
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Cut {
    /// Segment starts at the beginning of the span
    Start,
    /// Segment starts right after the given char position
    After(usize),
}

/// Split a raw span into tokens drawn from the sentence vocabulary
///
/// The vocabulary is the sentence tokens plus a single space. Each char
/// position is covered by the split point whose trailing segment occurs most
/// often in the vocabulary; ties go to the most recent split point. The
/// returned tokens carry no whitespace, so joining them with single spaces
/// reconstructs the span. An uncoverable tail is kept as whitespace
/// separated tokens.
pub fn locate_span<S: AsRef<str>>(sentence_tokens: &[S], span: &str) -> Vec<String> {
    if span.trim().is_empty() {
        return Vec::new();
    }

    let mut vocabulary: HashMap<&str, usize> = HashMap::new();
    for token in sentence_tokens {
        *vocabulary.entry(token.as_ref()).or_default() += 1;
    }
    *vocabulary.entry(" ").or_default() += 1;
    let count = |segment: &str| vocabulary.get(segment).copied().unwrap_or(0);

    // Byte offset just past each char
    let ends: Vec<usize> = span.char_indices().map(|(i, c)| i + c.len_utf8()).collect();
    let mut cuts: Vec<Option<Cut>> = vec![None; ends.len()];

    for end in 0..ends.len() {
        let mut best: Option<(Cut, usize)> = None;

        for split in (0..end).rev() {
            if cuts[split].is_none() {
                continue;
            }
            let score = count(&span[ends[split]..ends[end]]);
            if score > best.map_or(0, |(_, s)| s) {
                best = Some((Cut::After(split), score));
            }
        }

        let score = count(&span[..ends[end]]);
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((Cut::Start, score));
        }

        cuts[end] = best.map(|(cut, _)| cut);
    }

    let last_covered = (0..ends.len()).rev().find(|&i| cuts[i].is_some());
    let tail_start = last_covered.map_or(0, |i| ends[i]);

    let mut tokens = Vec::new();
    let mut cursor = last_covered;
    while let Some(end) = cursor {
        let Some(cut) = cuts[end] else { break };
        let (start, next) = match cut {
            Cut::Start => (0, None),
            Cut::After(split) => (ends[split], Some(split)),
        };

        let segment = &span[start..ends[end]];
        if !segment.trim().is_empty() {
            tokens.push(segment.to_string());
        }
        cursor = next;
    }
    tokens.reverse();

    tokens.extend(span[tail_start..].split_whitespace().map(String::from));
    tokens
}

/// Find the first index at which `needle` occurs consecutively in `haystack`
///
/// Returns `None` when the needle is empty or never fully matches.
pub fn find_subsequence<T: PartialEq>(haystack: &[T], needle: &[T]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }

    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ============================================================================
// Chunk merging
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkTag {
    Begin,
    Inside,
    End,
    Single,
    Pronoun,
    Other,
}

/// Span accumulator while walking chunk tags
#[derive(Debug)]
enum SpanState {
    Idle,
    /// Open span; holds the token positions collected so far
    InSpan(Vec<usize>),
}

impl SpanState {
    fn step(self, tag: ChunkTag, index: usize, flushed: &mut Vec<Vec<usize>>) -> Self {
        match (self, tag) {
            (Self::InSpan(mut members), ChunkTag::End) => {
                members.push(index);
                flushed.push(members);
                Self::Idle
            }
            (Self::Idle, ChunkTag::End) => {
                flushed.push(vec![index]);
                Self::Idle
            }
            (_, ChunkTag::Begin) => Self::InSpan(vec![index]),
            (Self::InSpan(mut members), ChunkTag::Inside | ChunkTag::Pronoun) => {
                members.push(index);
                Self::InSpan(members)
            }
            (Self::Idle, ChunkTag::Inside) => Self::InSpan(vec![index]),
            (state, ChunkTag::Single) => {
                flushed.push(vec![index]);
                state
            }
            (state, ChunkTag::Pronoun | ChunkTag::Other) => state,
        }
    }
}

/// An entity formed from an SRL span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormedEntity {
    /// Normalized entity text
    pub text: String,
    /// Span tokens after realignment
    pub tokens: Vec<String>,
    /// Position of the first span token in the sentence
    pub offset: usize,
}

impl FormedEntity {
    /// The realigned span joined with single spaces
    pub fn phrase(&self) -> String {
        self.tokens.join(" ")
    }
}

/// Merges noun-phrase chunks into normalized entities
#[derive(Debug, Clone)]
pub struct EntityAligner {
    entity_pos_tags: HashSet<String>,
    pronoun_phrase_tags: HashSet<String>,
}

impl EntityAligner {
    /// Create an aligner with the default POS and pronoun-phrase tag sets
    pub fn new() -> Self {
        Self {
            entity_pos_tags: ENTITY_POS_TAGS.iter().map(|t| t.to_string()).collect(),
            pronoun_phrase_tags: PRONOUN_PHRASE_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Replace the set of entity-eligible POS tags
    pub fn with_entity_pos_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_pos_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    fn classify(&self, tag: &str) -> ChunkTag {
        match tag {
            "B-NP" => ChunkTag::Begin,
            "I-NP" => ChunkTag::Inside,
            "E-NP" => ChunkTag::End,
            "S-NP" => ChunkTag::Single,
            t if self.pronoun_phrase_tags.contains(t) => ChunkTag::Pronoun,
            _ => ChunkTag::Other,
        }
    }

    /// Merge span tokens into an entity string
    ///
    /// `chunk_tags` and `pos_tags` are aligned with `tokens`. Every flushed
    /// noun-phrase span keeps only its entity-eligible tokens; surviving spans
    /// are joined with single spaces. Returns `None` if nothing survives.
    pub fn normalize_entity<S: AsRef<str>>(
        &self,
        tokens: &[S],
        chunk_tags: &[S],
        pos_tags: &[S],
    ) -> Option<String> {
        let mut flushed = Vec::new();
        let mut state = SpanState::Idle;

        for (index, chunk) in chunk_tags.iter().enumerate().take(tokens.len()) {
            state = state.step(self.classify(chunk.as_ref()), index, &mut flushed);
        }
        if let SpanState::InSpan(members) = state {
            flushed.push(members);
        }

        let entities: Vec<String> = flushed
            .into_iter()
            .filter_map(|members| {
                let kept: Vec<&str> = members
                    .into_iter()
                    .filter(|&i| {
                        pos_tags
                            .get(i)
                            .is_some_and(|pos| self.entity_pos_tags.contains(pos.as_ref()))
                    })
                    .map(|i| tokens[i].as_ref())
                    .collect();
                (!kept.is_empty()).then(|| kept.join(" "))
            })
            .collect();

        (!entities.is_empty()).then(|| entities.join(" "))
    }

    /// Form an entity from a raw SRL span of an annotated sentence
    ///
    /// Realigns the span, locates it among the sentence tokens and normalizes
    /// the chunk/POS slice it covers.
    pub fn form_entity(&self, annotation: &Annotation, span: &str) -> Option<FormedEntity> {
        let tokens = locate_span(&annotation.tokens, span);
        let offset = find_subsequence(&annotation.tokens, &tokens)?;
        let end = offset + tokens.len();

        let chunk_tags = annotation.chunk_tags.get(offset..end)?;
        let pos_tags = annotation.pos_tags.get(offset..end)?;
        let text = self.normalize_entity(&tokens, chunk_tags, pos_tags)?;

        Some(FormedEntity {
            text,
            tokens,
            offset,
        })
    }
}

impl Default for EntityAligner {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn garden_annotation() -> Annotation {
        Annotation {
            tokens: strings(&[
                "The", "cat", "chased", "the", "mouse", "in", "the", "garden",
            ]),
            pos_tags: strings(&["DT", "NN", "VBD", "DT", "NN", "IN", "DT", "NN"]),
            chunk_tags: strings(&[
                "B-NP", "E-NP", "S-VP", "B-NP", "E-NP", "S-PP", "B-NP", "E-NP",
            ]),
            frames: vec![],
        }
    }

    #[test]
    fn test_locate_span_simple() {
        let sentence = strings(&["The", "cat", "chased", "the", "mouse"]);
        assert_eq!(locate_span(&sentence, "the mouse"), strings(&["the", "mouse"]));
        assert_eq!(locate_span(&sentence, "The cat"), strings(&["The", "cat"]));
    }

    #[test]
    fn test_locate_span_splits_glued_tokens() {
        // Annotators sometimes return clitics glued to their host
        let sentence = strings(&["the", "cat", "'s", "toy"]);
        assert_eq!(
            locate_span(&sentence, "the cat's toy"),
            strings(&["the", "cat", "'s", "toy"])
        );
    }

    #[test]
    fn test_locate_span_single_char_first_token() {
        let sentence = strings(&["a", "cat", "sat"]);
        assert_eq!(locate_span(&sentence, "a cat"), strings(&["a", "cat"]));
    }

    #[test]
    fn test_locate_span_repeated_whitespace() {
        let sentence = strings(&["big", "red", "dog"]);
        assert_eq!(
            locate_span(&sentence, "big  red dog"),
            strings(&["big", "red", "dog"])
        );
    }

    #[test]
    fn test_locate_span_empty() {
        let sentence = strings(&["a"]);
        assert!(locate_span(&sentence, "").is_empty());
        assert!(locate_span(&sentence, "   ").is_empty());
    }

    #[test]
    fn test_locate_span_uncovered_tail() {
        let sentence = strings(&["the", "dog"]);
        assert_eq!(
            locate_span(&sentence, "the dog barked loudly"),
            strings(&["the", "dog", "barked", "loudly"])
        );
    }

    #[test]
    fn test_locate_span_tie_prefers_latest_split() {
        // "NewYork" scores the same as a whole token and as "New" + "York"
        let sentence = strings(&["New", "York", "NewYork"]);
        assert_eq!(
            locate_span(&sentence, "NewYork"),
            strings(&["New", "York"])
        );
    }

    #[test]
    fn test_find_subsequence() {
        let haystack = strings(&["a", "b", "c", "a", "b"]);
        assert_eq!(find_subsequence(&haystack, &strings(&["a", "b"])), Some(0));
        assert_eq!(find_subsequence(&haystack, &strings(&["c", "a"])), Some(2));
        assert_eq!(find_subsequence(&haystack, &strings(&["b", "a"])), None);
        assert_eq!(find_subsequence(&haystack, &[] as &[String]), None);
    }

    #[test]
    fn test_find_subsequence_after_partial_match() {
        let haystack = strings(&["a", "a", "b"]);
        assert_eq!(find_subsequence(&haystack, &strings(&["a", "b"])), Some(1));
    }

    #[test]
    fn test_find_subsequence_longer_needle() {
        let haystack = strings(&["a"]);
        assert_eq!(find_subsequence(&haystack, &strings(&["a", "b"])), None);
    }

    #[test]
    fn test_normalize_drops_determiners() {
        let aligner = EntityAligner::new();
        let entity = aligner.normalize_entity(
            &["the", "big", "mouse"],
            &["B-NP", "I-NP", "E-NP"],
            &["DT", "JJ", "NN"],
        );
        assert_eq!(entity.as_deref(), Some("mouse"));
    }

    #[test]
    fn test_normalize_multiple_phrases() {
        let aligner = EntityAligner::new();
        let entity = aligner.normalize_entity(
            &["John", "Smith", "and", "Mary"],
            &["B-NP", "E-NP", "O", "S-NP"],
            &["NNP", "NNP", "CC", "NNP"],
        );
        assert_eq!(entity.as_deref(), Some("John Smith Mary"));
    }

    #[test]
    fn test_normalize_single_phrase_keeps_open_span() {
        let aligner = EntityAligner::new();
        let entity = aligner.normalize_entity(
            &["New", "York", "city"],
            &["B-NP", "S-NP", "E-NP"],
            &["NNP", "NNP", "NN"],
        );
        // S-NP flushes "York" on its own; the open span still closes on "city"
        assert_eq!(entity.as_deref(), Some("York New city"));
    }

    #[test]
    fn test_normalize_pronoun_never_opens_span() {
        let aligner = EntityAligner::new();
        assert_eq!(
            aligner.normalize_entity(&["him"], &["S-PRP"], &["PRP"]),
            None
        );

        let entity = aligner.normalize_entity(
            &["the", "man", "himself"],
            &["B-NP", "I-NP", "E-PRP"],
            &["DT", "NN", "PRP"],
        );
        assert_eq!(entity.as_deref(), Some("man himself"));
    }

    #[test]
    fn test_normalize_inside_opens_span() {
        let aligner = EntityAligner::new();
        let entity =
            aligner.normalize_entity(&["red", "apples"], &["I-NP", "I-NP"], &["JJ", "NNS"]);
        assert_eq!(entity.as_deref(), Some("apples"));
    }

    #[test]
    fn test_normalize_end_without_open_span() {
        let aligner = EntityAligner::new();
        assert_eq!(
            aligner.normalize_entity(&["cat"], &["E-NP"], &["NN"]).as_deref(),
            Some("cat")
        );
    }

    #[test]
    fn test_normalize_begin_discards_open_span() {
        let aligner = EntityAligner::new();
        let entity = aligner.normalize_entity(
            &["dog", "cat", "mouse"],
            &["B-NP", "B-NP", "E-NP"],
            &["NN", "NN", "NN"],
        );
        assert_eq!(entity.as_deref(), Some("cat mouse"));
    }

    #[test]
    fn test_normalize_nothing_eligible() {
        let aligner = EntityAligner::new();
        assert_eq!(
            aligner.normalize_entity(&["in", "the"], &["S-PP", "B-NP"], &["IN", "DT"]),
            None
        );
    }

    #[test]
    fn test_form_entity() {
        let aligner = EntityAligner::new();
        let annotation = garden_annotation();

        let entity = aligner.form_entity(&annotation, "the mouse").unwrap();
        assert_eq!(entity.text, "mouse");
        assert_eq!(entity.offset, 3);

        let modifier = aligner.form_entity(&annotation, "in the garden").unwrap();
        assert_eq!(modifier.text, "garden");
        assert_eq!(modifier.phrase(), "in the garden");
    }

    #[test]
    fn test_form_entity_missing_span() {
        let aligner = EntityAligner::new();
        assert!(aligner.form_entity(&garden_annotation(), "the dog").is_none());
    }

    fn word() -> impl Strategy<Value = String> {
        "[a-z]{4}"
    }

    proptest! {
        #[test]
        fn prop_locate_span_reconstructs(
            sentence in prop::collection::vec(word(), 1..12),
            bounds in (0usize..12, 1usize..6),
        ) {
            let start = bounds.0 % sentence.len();
            let end = (start + bounds.1).min(sentence.len());
            let span = sentence[start..end].join(" ");

            let tokens = locate_span(&sentence, &span);
            prop_assert_eq!(tokens.join(" "), span);
        }

        #[test]
        fn prop_find_subsequence_first_match(
            haystack in prop::collection::vec(0u8..4, 0..20),
            needle in prop::collection::vec(0u8..4, 1..4),
        ) {
            let expected = (0..haystack.len())
                .find(|&i| haystack[i..].starts_with(&needle));
            prop_assert_eq!(find_subsequence(&haystack, &needle), expected);
        }
    }
}
