use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

pub mod config;
pub mod labeler;
pub mod model;
pub mod schema;
pub mod vocabulary;

pub use config::Config;
pub use model::{Consultant, LabelLookup, ModelFeatures, QualityClassifier};
pub use schema::{EvaluateRequest, VerdictResponse};
pub use vocabulary::NatureVocabulary;

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RhymeScheme {
    #[serde(rename = "ABAB")]
    Abab,
    #[serde(rename = "AAAA")]
    Aaaa,
    Other,
}

impl RhymeScheme {
    pub fn label(self) -> &'static str {
        match self {
            RhymeScheme::Abab => "ABAB",
            RhymeScheme::Aaaa => "AAAA",
            RhymeScheme::Other => "Other",
        }
    }
}

impl fmt::Display for RhymeScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Quality {
    Good,
    Moderate,
    Poor,
}

impl Quality {
    pub fn label(self) -> &'static str {
        match self {
            Quality::Good => "Good",
            Quality::Moderate => "Moderate",
            Quality::Poor => "Poor",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineMetrics {
    pub text: String,
    pub syllables: usize,
    pub word_count: usize,
    pub last_word: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureMetrics {
    pub line_count: usize,
    pub avg_syllables: f64,
    pub has_nature: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuralVerdict {
    pub quality: Quality,
    pub reason: String,
    pub tips: Vec<String>,
    pub rhyme_scheme: RhymeScheme,
    pub metrics: StructureMetrics,
    pub lines: Vec<LineMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_quality: Option<String>,
}

// ---------------------------------------------------------------------------
// Hyperparameters
// ---------------------------------------------------------------------------

struct Hyperparameters {
    expected_lines: usize,
    min_lines: usize,
    gibberish_avg_syllables: f64,
    syllable_min: f64,
    syllable_max: f64,
    rhyme_suffix_max_len: usize,
}

static HP: Hyperparameters = Hyperparameters {
    expected_lines: 4,
    min_lines: 2,
    gibberish_avg_syllables: 5.0,
    syllable_min: 8.0,
    syllable_max: 12.0,
    rhyme_suffix_max_len: 3,
};

/// How long a statistical model may take before the verdict goes out without it.
pub const DEFAULT_MODEL_TIMEOUT_MS: u64 = 250;

// ---------------------------------------------------------------------------
// Compiled patterns
// ---------------------------------------------------------------------------

static VOWEL_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[aeiouAEIOU]+").unwrap());

static NON_ALPHA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z]").unwrap());

// ---------------------------------------------------------------------------
// Canned feedback
// ---------------------------------------------------------------------------

const EMPTY_REASON: &str = "Pantun cannot be empty.";
const EMPTY_TIP: &str = "Write a 4-line traditional pantun with ABAB rhyme.";
const GIBBERISH_REASON: &str = "This doesn't look like a pantun.";
const GIBBERISH_TIP: &str =
    "A good pantun has 4 lines with 8-12 syllables each and uses ABAB rhyme.";
const GOOD_REASON: &str = "Excellent! Your pantun matches all traditional structure elements.";
const MODERATE_REASON: &str = "Your pantun meets some structural criteria.";
const POOR_REASON: &str = "Your pantun doesn't follow the typical structure.";
const POOR_TIP: &str = "A good pantun has 4 lines of 8-12 syllables, uses nature imagery in its \
                        opening couplet and follows an ABAB rhyme.";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Split raw text into trimmed, non-empty lines.
pub fn normalize_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Syllables
// ---------------------------------------------------------------------------

/// Estimate syllables as the number of vowel runs. Never returns 0.
pub fn count_syllables(line: &str) -> usize {
    VOWEL_RUN_RE.find_iter(line).count().max(1)
}

pub fn line_metrics(line: &str) -> LineMetrics {
    let words: Vec<&str> = line.split_whitespace().collect();
    LineMetrics {
        text: line.to_string(),
        syllables: count_syllables(line),
        word_count: words.len(),
        last_word: words.last().map(|w| w.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Rhyme
// ---------------------------------------------------------------------------

/// Last 1..=3 letters of `word` after dropping non-letters and lowercasing.
pub fn rhyme_suffixes(word: &str) -> Vec<String> {
    let cleaned = NON_ALPHA_RE.replace_all(word, "").to_lowercase();
    let max = cleaned.len().min(HP.rhyme_suffix_max_len);
    // Only ASCII letters survive, so byte offsets are char boundaries.
    (1..=max)
        .map(|n| cleaned[cleaned.len() - n..].to_string())
        .collect()
}

/// Two words rhyme if they share any suffix of length 1 to 3.
pub fn is_rhyme_match(a: &str, b: &str) -> bool {
    let sa = rhyme_suffixes(a);
    let sb = rhyme_suffixes(b);
    sa.iter().any(|x| sb.contains(x))
}

pub fn rhyme_scheme<S: AsRef<str>>(lines: &[S]) -> RhymeScheme {
    if lines.len() != HP.expected_lines {
        return RhymeScheme::Other;
    }
    let mut words = Vec::with_capacity(HP.expected_lines);
    for line in lines {
        match line.as_ref().split_whitespace().last() {
            Some(w) => words.push(w),
            None => return RhymeScheme::Other,
        }
    }

    let m = |i: usize, j: usize| is_rhyme_match(words[i], words[j]);

    // Requiring lines 1 and 2 to differ keeps AAAA endings, which overlap
    // everywhere, from being reported as ABAB.
    if m(0, 2) && m(1, 3) && !m(0, 1) {
        RhymeScheme::Abab
    } else if m(0, 1) && m(0, 2) && m(0, 3) {
        RhymeScheme::Aaaa
    } else {
        RhymeScheme::Other
    }
}

// ---------------------------------------------------------------------------
// Nature imagery
// ---------------------------------------------------------------------------

pub fn contains_nature(text: &str, vocabulary: &NatureVocabulary) -> bool {
    vocabulary.contains_any(text)
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

fn canned(quality: Quality, reason: &str, tip: &str, metrics: StructureMetrics) -> StructuralVerdict {
    StructuralVerdict {
        quality,
        reason: reason.to_string(),
        tips: vec![tip.to_string()],
        rhyme_scheme: RhymeScheme::Other,
        metrics,
        lines: Vec::new(),
        model_quality: None,
    }
}

/// Classify a poem from its already-measured signals.
///
/// `syllables` holds one estimate per entry of `lines`. The result is a pure
/// function of the arguments.
pub fn score<S: AsRef<str>>(
    lines: &[S],
    syllables: &[usize],
    scheme: RhymeScheme,
    has_nature: bool,
) -> StructuralVerdict {
    let line_count = lines.len();
    if line_count == 0 || syllables.is_empty() {
        return canned(
            Quality::Poor,
            EMPTY_REASON,
            EMPTY_TIP,
            StructureMetrics {
                line_count: 0,
                avg_syllables: 0.0,
                has_nature,
            },
        );
    }

    let avg_syllables = syllables.iter().sum::<usize>() as f64 / syllables.len() as f64;
    let metrics = StructureMetrics {
        line_count,
        avg_syllables,
        has_nature,
    };

    if line_count < HP.min_lines || avg_syllables < HP.gibberish_avg_syllables {
        let mut verdict = canned(Quality::Poor, GIBBERISH_REASON, GIBBERISH_TIP, metrics);
        verdict.rhyme_scheme = scheme;
        return verdict;
    }

    let four_lines = line_count == HP.expected_lines;
    let syllable_range = (HP.syllable_min..=HP.syllable_max).contains(&avg_syllables);
    let rhyme_abab = scheme == RhymeScheme::Abab;

    let checks = [
        (
            four_lines,
            format!("Write your pantun in exactly 4 lines (found {line_count})."),
        ),
        (
            syllable_range,
            format!("Aim for 8-12 syllables per line (yours average {avg_syllables:.1})."),
        ),
        (
            has_nature,
            "Add nature imagery such as laut, bulan or bunga to the opening couplet.".to_string(),
        ),
        (
            rhyme_abab,
            format!("Try to use an ABAB rhyme pattern (detected {scheme})."),
        ),
    ];
    let met = checks.iter().filter(|(ok, _)| *ok).count();

    let (quality, reason, tips) = match met {
        4 => (Quality::Good, GOOD_REASON, Vec::new()),
        2 | 3 => (
            Quality::Moderate,
            MODERATE_REASON,
            checks
                .into_iter()
                .filter(|(ok, _)| !ok)
                .map(|(_, tip)| tip)
                .collect(),
        ),
        _ => (Quality::Poor, POOR_REASON, vec![POOR_TIP.to_string()]),
    };

    debug!(
        line_count,
        avg_syllables,
        rhyme = %scheme,
        has_nature,
        met,
        quality = %quality,
        "scored pantun"
    );

    StructuralVerdict {
        quality,
        reason: reason.to_string(),
        tips,
        rhyme_scheme: scheme,
        metrics,
        lines: Vec::new(),
        model_quality: None,
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Scores poems against an injected vocabulary and optional model.
#[derive(Clone)]
pub struct Evaluator {
    vocabulary: Arc<NatureVocabulary>,
    consultant: Option<Consultant>,
    model_timeout: Duration,
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("vocabulary_terms", &self.vocabulary.len())
            .field("classifier", &self.consultant.is_some())
            .field("model_timeout", &self.model_timeout)
            .finish()
    }
}

impl Evaluator {
    pub fn new(vocabulary: Arc<NatureVocabulary>) -> Self {
        Self {
            vocabulary,
            consultant: None,
            model_timeout: Duration::from_millis(DEFAULT_MODEL_TIMEOUT_MS),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn QualityClassifier>) -> Self {
        self.consultant = Some(Consultant::new(classifier));
        self
    }

    pub fn model_timeout(&self) -> Duration {
        self.model_timeout
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn vocabulary(&self) -> &NatureVocabulary {
        &self.vocabulary
    }

    pub fn evaluate(&self, text: &str) -> StructuralVerdict {
        let mut verdict = evaluate(text, &self.vocabulary);
        if let Some(consultant) = &self.consultant {
            if verdict.metrics.line_count > 0 {
                let features = ModelFeatures {
                    avg_syllables: verdict.metrics.avg_syllables,
                    line_count: verdict.metrics.line_count,
                    rhyme_scheme: verdict.rhyme_scheme,
                };
                verdict.model_quality = consultant.consult(features, self.model_timeout);
            }
        }
        verdict
    }

    /// Evaluate and convert to the wire response.
    pub fn respond(&self, request: &EvaluateRequest) -> VerdictResponse {
        VerdictResponse::from(&self.evaluate(&request.pantun))
    }
}

/// Evaluate `text` with no statistical model.
pub fn evaluate(text: &str, vocabulary: &NatureVocabulary) -> StructuralVerdict {
    let lines = normalize_lines(text);
    let per_line: Vec<LineMetrics> = lines.iter().map(|l| line_metrics(l)).collect();
    let syllables: Vec<usize> = per_line.iter().map(|m| m.syllables).collect();
    let mut verdict = score(
        &lines,
        &syllables,
        rhyme_scheme(&lines),
        contains_nature(text, vocabulary),
    );
    verdict.lines = per_line;
    verdict
}

pub(crate) fn rounded_avg(verdict: &StructuralVerdict) -> f64 {
    round2(verdict.metrics.avg_syllables)
}
