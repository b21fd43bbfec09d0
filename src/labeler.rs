//! Strict labelling used to build the training dataset.
//!
//! Collected poems are held to a tighter standard than interactive
//! submissions: every line is checked on its own, not on the average.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::{count_syllables, normalize_lines, rhyme_scheme, NatureVocabulary, Quality, RhymeScheme};

const WORDS_PER_LINE: std::ops::RangeInclusive<usize> = 4..=5;
const SYLLABLES_PER_LINE: std::ops::RangeInclusive<usize> = 8..=12;
const MAX_MODERATE_REASONS: usize = 2;

const GOOD_REASON: &str =
    "Good structure, ABAB rhyme, sufficient syllables & words, contains good metaphors";

/// One training row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetRecord {
    pub id: usize,
    pub pantun: String,
    pub quality: Quality,
    pub reason: String,
    pub avg_syllables: f64,
    pub rhyme_type: RhymeScheme,
    pub line_count: usize,
}

/// Outcome of the strict labelling rule.
#[derive(Debug, Clone, PartialEq)]
pub struct PantunLabel {
    pub quality: Quality,
    /// `; `-joined reasons, or the fixed praise for a good poem.
    pub reason: String,
    pub rhyme_scheme: RhymeScheme,
}

/// Label a normalized poem.
pub fn label_pantun<S: AsRef<str>>(lines: &[S], vocabulary: &NatureVocabulary) -> PantunLabel {
    let scheme = rhyme_scheme(lines);
    let label = |quality, reason: String| PantunLabel {
        quality,
        reason,
        rhyme_scheme: scheme,
    };
    if lines.len() != 4 {
        return label(Quality::Poor, "Number of lines is not 4".to_string());
    }

    let mut reasons: Vec<&str> = Vec::new();

    let word_counts_ok = lines
        .iter()
        .all(|l| WORDS_PER_LINE.contains(&l.as_ref().split_whitespace().count()));
    if !word_counts_ok {
        reasons.push("Word count per line is not in the range of 4-5");
    }

    let syllables_ok = lines
        .iter()
        .all(|l| SYLLABLES_PER_LINE.contains(&count_syllables(l.as_ref())));
    if !syllables_ok {
        reasons.push("Syllable count per line is not in the range of 8-12");
    }

    match scheme {
        RhymeScheme::Aaaa => reasons.push("End rhyme A-A-A-A"),
        RhymeScheme::Other => reasons.push("Rhyme doesn't follow ABAB or AAAA pattern"),
        RhymeScheme::Abab => {}
    }

    let last_words: Vec<String> = lines
        .iter()
        .filter_map(|l| l.as_ref().split_whitespace().last())
        .map(str::to_lowercase)
        .collect();
    if last_words.len() == lines.len() && last_words.iter().all(|w| *w == last_words[0]) {
        reasons.push("Word repetition at line endings");
    }

    let full_text = lines
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join("\n");
    if !vocabulary.contains_any(&full_text) {
        reasons.push("No nature elements");
    }

    if reasons.is_empty() && scheme == RhymeScheme::Abab {
        label(Quality::Good, GOOD_REASON.to_string())
    } else if reasons.len() <= MAX_MODERATE_REASONS {
        label(Quality::Moderate, reasons.join("; "))
    } else {
        label(Quality::Poor, reasons.join("; "))
    }
}

/// Accumulates labelled records, skipping poems already seen.
#[derive(Debug)]
pub struct Labeler<'a> {
    vocabulary: &'a NatureVocabulary,
    seen: HashSet<String>,
    records: Vec<DatasetRecord>,
}

impl<'a> Labeler<'a> {
    pub fn new(vocabulary: &'a NatureVocabulary) -> Self {
        Self {
            vocabulary,
            seen: HashSet::new(),
            records: Vec::new(),
        }
    }

    /// Label `text` and keep it. Returns `None` for an empty or duplicate poem.
    pub fn add(&mut self, text: &str) -> Option<&DatasetRecord> {
        let lines = normalize_lines(text);
        if lines.is_empty() {
            return None;
        }
        let pantun = lines.join("\n");
        if !self.seen.insert(pantun.clone()) {
            debug!("duplicate pantun skipped");
            return None;
        }

        let label = label_pantun(&lines, self.vocabulary);
        let total: usize = lines.iter().map(|l| count_syllables(l)).sum();
        self.records.push(DatasetRecord {
            id: self.records.len() + 1,
            quality: label.quality,
            reason: label.reason,
            avg_syllables: total as f64 / lines.len() as f64,
            rhyme_type: label.rhyme_scheme,
            line_count: lines.len(),
            pantun,
        });
        self.records.last()
    }

    pub fn records(&self) -> &[DatasetRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<DatasetRecord> {
        self.records
    }
}
