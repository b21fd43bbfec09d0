//! Nature vocabulary used to detect alam (nature) imagery in a pantun.
//!
//! The word list is loaded once at startup and shared read-only between
//! evaluations. Loading never takes the process down: a missing or unreadable
//! list degrades to an empty vocabulary, which simply never matches.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum VocabularyError {
    #[error("failed to read vocabulary {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Set of lowercase nature keywords.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NatureVocabulary {
    terms: BTreeSet<String>,
}

impl NatureVocabulary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a vocabulary from arbitrary terms. Blank entries are dropped,
    /// since an empty needle would match every poem.
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { terms }
    }

    /// Read a newline-delimited word list.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, VocabularyError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| VocabularyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let vocabulary = Self::from_terms(content.lines());
        info!(
            path = %path.display(),
            terms = vocabulary.len(),
            "loaded nature vocabulary"
        );
        Ok(vocabulary)
    }

    /// Like [`NatureVocabulary::load`], but falls back to an empty vocabulary.
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(vocabulary) => vocabulary,
            Err(e) => {
                warn!("{e}; nature detection disabled");
                Self::empty()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }

    /// True if any term occurs as a case-insensitive substring of `text`.
    /// Terms can match inside longer words ("kala" in "kalau").
    pub fn contains_any(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.terms.iter().any(|t| lowered.contains(t.as_str()))
    }

    /// Every term found in `text`, in sorted order.
    pub fn matches(&self, text: &str) -> Vec<&str> {
        let lowered = text.to_lowercase();
        self.terms
            .iter()
            .filter(|t| lowered.contains(t.as_str()))
            .map(String::as_str)
            .collect()
    }
}
