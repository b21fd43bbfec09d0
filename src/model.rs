//! Optional statistical quality classifier.
//!
//! The rule-based verdict never depends on this module. When a model artifact
//! is configured, the evaluator asks it for a coarse quality label over
//! `(avg_syllables, line_count, rhyme_label)` and reports the answer next to
//! the rule-based verdict. A slow, failing or missing model just means no
//! label.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::RhymeScheme;

const FALLBACK_RHYME_LABEL: &str = "Other";
const FEATURE_COUNT: usize = 3;
const DEFAULT_MAX_IN_FLIGHT: usize = 4;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to read model {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse model: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("malformed model: {0}")]
    Shape(String),
    #[error("model produced a non-finite decision value")]
    NonFinite,
}

/// Inputs the classifier was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelFeatures {
    pub avg_syllables: f64,
    pub line_count: usize,
    pub rhyme_scheme: RhymeScheme,
}

/// Outcome of mapping a rhyme label onto the classifier's label encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelLookup {
    /// The encoder knows the label.
    Found(String),
    /// The label is unknown; this substitute was chosen instead.
    Fallback(String),
    /// The encoder has no labels at all.
    Unavailable,
}

impl LabelLookup {
    pub fn label(&self) -> Option<&str> {
        match self {
            LabelLookup::Found(l) | LabelLookup::Fallback(l) => Some(l),
            LabelLookup::Unavailable => None,
        }
    }
}

/// Map `label` onto `known`, substituting "Other" (or the first known label)
/// when the encoder has never seen it.
pub fn resolve_rhyme_label(known: &[String], label: &str) -> LabelLookup {
    if known.iter().any(|k| k == label) {
        return LabelLookup::Found(label.to_string());
    }
    if known.iter().any(|k| k == FALLBACK_RHYME_LABEL) {
        return LabelLookup::Fallback(FALLBACK_RHYME_LABEL.to_string());
    }
    match known.first() {
        Some(first) => LabelLookup::Fallback(first.clone()),
        None => LabelLookup::Unavailable,
    }
}

pub trait QualityClassifier: Send + Sync {
    /// Rhyme labels known to the classifier's encoder, in encoding order.
    fn rhyme_labels(&self) -> &[String];

    fn predict(&self, features: &ModelFeatures) -> Result<String, ModelError>;
}

/// Logistic-regression artifact exported from the training pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    pub rhyme_classes: Vec<String>,
    pub quality_classes: Vec<String>,
    /// One row per class, or a single row for a binary model.
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl LogisticModel {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let model: LogisticModel = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ModelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::from_json(&content)?;
        info!(
            path = %path.display(),
            classes = model.quality_classes.len(),
            "loaded quality model"
        );
        Ok(model)
    }

    fn validate(&self) -> Result<(), ModelError> {
        let classes = self.quality_classes.len();
        if classes < 2 {
            return Err(ModelError::Shape(format!(
                "need at least 2 quality classes, got {classes}"
            )));
        }
        let rows = self.coefficients.len();
        let binary = classes == 2 && rows == 1;
        if !binary && rows != classes {
            return Err(ModelError::Shape(format!(
                "{rows} coefficient rows for {classes} classes"
            )));
        }
        if let Some(row) = self.coefficients.iter().find(|r| r.len() != FEATURE_COUNT) {
            return Err(ModelError::Shape(format!(
                "coefficient row has {} weights, expected {FEATURE_COUNT}",
                row.len()
            )));
        }
        if self.intercepts.len() != rows {
            return Err(ModelError::Shape(format!(
                "{} intercepts for {rows} coefficient rows",
                self.intercepts.len()
            )));
        }
        Ok(())
    }

    fn encode(&self, features: &ModelFeatures) -> [f64; FEATURE_COUNT] {
        let lookup = resolve_rhyme_label(self.rhyme_labels(), features.rhyme_scheme.label());
        if let LabelLookup::Fallback(ref used) = lookup {
            warn!(
                label = features.rhyme_scheme.label(),
                used = %used,
                "rhyme label unknown to model encoder, using fallback"
            );
        }
        let rhyme_index = lookup
            .label()
            .and_then(|l| self.rhyme_classes.iter().position(|k| k == l))
            .unwrap_or(0);
        [
            features.avg_syllables,
            features.line_count as f64,
            rhyme_index as f64,
        ]
    }
}

impl QualityClassifier for LogisticModel {
    fn rhyme_labels(&self) -> &[String] {
        &self.rhyme_classes
    }

    fn predict(&self, features: &ModelFeatures) -> Result<String, ModelError> {
        let x = self.encode(features);
        let decisions: Vec<f64> = self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| row.iter().zip(&x).map(|(w, v)| w * v).sum::<f64>() + b)
            .collect();
        if decisions.iter().any(|d| !d.is_finite()) {
            return Err(ModelError::NonFinite);
        }

        let class = if decisions.len() == 1 {
            usize::from(decisions[0] > 0.0)
        } else {
            let mut best = 0;
            for (i, d) in decisions.iter().enumerate() {
                if *d > decisions[best] {
                    best = i;
                }
            }
            best
        };
        Ok(self.quality_classes[class].clone())
    }
}

/// Load a model, or disable consultation if the artifact is unusable.
pub fn load_or_disabled<P: AsRef<Path>>(path: P) -> Option<Arc<dyn QualityClassifier>> {
    match LogisticModel::load(path) {
        Ok(model) => Some(Arc::new(model)),
        Err(e) => {
            warn!("{e}; statistical consultation disabled");
            None
        }
    }
}

/// Releases an in-flight slot when the worker finishes, even on panic.
struct Slot(Arc<AtomicUsize>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs predictions off the caller's thread with a bounded wait.
///
/// At most `max_in_flight` workers exist at any time. A worker abandoned after
/// a timeout keeps its slot until the prediction returns, so a hung model
/// exhausts the slots and later calls answer `None` without spawning.
#[derive(Clone)]
pub struct Consultant {
    classifier: Arc<dyn QualityClassifier>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: usize,
}

impl Consultant {
    pub fn new(classifier: Arc<dyn QualityClassifier>) -> Self {
        Self {
            classifier,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    /// Workers currently running a prediction.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn claim(&self) -> Option<Slot> {
        self.in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_in_flight).then_some(n + 1)
            })
            .ok()
            .map(|_| Slot(Arc::clone(&self.in_flight)))
    }

    /// Ask the classifier for a label, waiting at most `timeout`.
    pub fn consult(&self, features: ModelFeatures, timeout: Duration) -> Option<String> {
        let Some(slot) = self.claim() else {
            warn!(
                in_flight = self.max_in_flight,
                "quality model busy, skipping consultation"
            );
            return None;
        };

        let (tx, rx) = mpsc::sync_channel(1);
        let worker = Arc::clone(&self.classifier);
        let spawned = thread::Builder::new()
            .name("quality-model".to_string())
            .spawn(move || {
                let _slot = slot;
                // The receiver is gone if we already timed out.
                let _ = tx.send(worker.predict(&features));
            });
        if let Err(e) = spawned {
            warn!("failed to start quality model worker: {e}");
            return None;
        }

        match rx.recv_timeout(timeout) {
            Ok(Ok(label)) => Some(label),
            Ok(Err(e)) => {
                warn!("quality model failed: {e}");
                None
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "quality model timed out"
                );
                None
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("quality model worker exited without an answer");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn features(avg: f64, lines: usize, scheme: RhymeScheme) -> ModelFeatures {
        ModelFeatures {
            avg_syllables: avg,
            line_count: lines,
            rhyme_scheme: scheme,
        }
    }

    #[test]
    fn known_label_is_found() {
        let known = labels(&["AAAA", "ABAB", "Other"]);
        assert_eq!(
            resolve_rhyme_label(&known, "ABAB"),
            LabelLookup::Found("ABAB".into())
        );
    }

    #[test]
    fn unknown_label_prefers_other() {
        let known = labels(&["AAAA", "ABAB", "Other"]);
        assert_eq!(
            resolve_rhyme_label(&known, "Invalid"),
            LabelLookup::Fallback("Other".into())
        );
    }

    #[test]
    fn unknown_label_without_other_uses_first() {
        let known = labels(&["AAAA", "ABAB"]);
        assert_eq!(
            resolve_rhyme_label(&known, "Other"),
            LabelLookup::Fallback("AAAA".into())
        );
        assert_eq!(resolve_rhyme_label(&[], "Other"), LabelLookup::Unavailable);
    }

    #[test]
    fn multiclass_model_takes_argmax() {
        // Class score is driven by avg_syllables alone.
        let model = LogisticModel::from_json(
            r#"{
                "rhyme_classes": ["AAAA", "ABAB", "Other"],
                "quality_classes": ["Good", "Moderate", "Poor"],
                "coefficients": [[1.0, 0.0, 0.0], [0.5, 0.0, 0.0], [-1.0, 0.0, 0.0]],
                "intercepts": [-5.0, -0.5, 5.0]
            }"#,
        )
        .unwrap();
        assert_eq!(
            model.predict(&features(10.0, 4, RhymeScheme::Abab)).unwrap(),
            "Good"
        );
        assert_eq!(
            model.predict(&features(1.0, 4, RhymeScheme::Other)).unwrap(),
            "Poor"
        );
    }

    #[test]
    fn binary_model_uses_sign() {
        let model = LogisticModel::from_json(
            r#"{
                "rhyme_classes": ["ABAB", "Other"],
                "quality_classes": ["Good", "Poor"],
                "coefficients": [[0.0, 0.0, 2.0]],
                "intercepts": [-1.0]
            }"#,
        )
        .unwrap();
        // ABAB encodes to 0 -> negative decision -> first class.
        assert_eq!(
            model.predict(&features(9.0, 4, RhymeScheme::Abab)).unwrap(),
            "Good"
        );
        // AAAA is unknown, falls back to Other (index 1) -> positive.
        assert_eq!(
            model.predict(&features(9.0, 4, RhymeScheme::Aaaa)).unwrap(),
            "Poor"
        );
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let err = LogisticModel::from_json(
            r#"{
                "rhyme_classes": ["ABAB"],
                "quality_classes": ["Good", "Moderate", "Poor"],
                "coefficients": [[1.0, 0.0, 0.0]],
                "intercepts": [0.0]
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::Shape(_)));

        let err = LogisticModel::from_json(r#"{"rhyme_classes": []"#).unwrap_err();
        assert!(matches!(err, ModelError::Parse(_)));
    }

    struct Sleepy;

    impl QualityClassifier for Sleepy {
        fn rhyme_labels(&self) -> &[String] {
            &[]
        }

        fn predict(&self, _: &ModelFeatures) -> Result<String, ModelError> {
            thread::sleep(Duration::from_millis(500));
            Ok("Good".into())
        }
    }

    struct Broken;

    impl QualityClassifier for Broken {
        fn rhyme_labels(&self) -> &[String] {
            &[]
        }

        fn predict(&self, _: &ModelFeatures) -> Result<String, ModelError> {
            Err(ModelError::NonFinite)
        }
    }

    /// Blocks every prediction until released, counting how many started.
    #[derive(Default)]
    struct Hung {
        started: AtomicUsize,
        released: AtomicBool,
    }

    impl QualityClassifier for Hung {
        fn rhyme_labels(&self) -> &[String] {
            &[]
        }

        fn predict(&self, _: &ModelFeatures) -> Result<String, ModelError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            while !self.released.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            Ok("Moderate".into())
        }
    }

    #[test]
    fn slow_classifier_is_abandoned() {
        let consultant = Consultant::new(Arc::new(Sleepy));
        let answer = consultant.consult(
            features(9.0, 4, RhymeScheme::Abab),
            Duration::from_millis(10),
        );
        assert_eq!(answer, None);
    }

    #[test]
    fn failing_classifier_yields_none() {
        let consultant = Consultant::new(Arc::new(Broken));
        let answer = consultant.consult(
            features(9.0, 4, RhymeScheme::Abab),
            Duration::from_secs(1),
        );
        assert_eq!(answer, None);
        assert_eq!(consultant.in_flight(), 0);
    }

    #[test]
    fn hung_classifier_keeps_worker_count_bounded() {
        let hung = Arc::new(Hung::default());
        let consultant = Consultant::new(hung.clone()).with_max_in_flight(2);

        for _ in 0..50 {
            let answer = consultant.consult(
                features(9.0, 4, RhymeScheme::Abab),
                Duration::from_millis(1),
            );
            assert_eq!(answer, None);
        }
        assert!(consultant.in_flight() <= 2, "got {}", consultant.in_flight());
        assert!(
            hung.started.load(Ordering::SeqCst) <= 2,
            "spawned {} workers",
            hung.started.load(Ordering::SeqCst)
        );

        hung.released.store(true, Ordering::SeqCst);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while consultant.in_flight() > 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(consultant.in_flight(), 0, "slots freed once workers return");

        let answer = consultant.consult(
            features(9.0, 4, RhymeScheme::Abab),
            Duration::from_secs(5),
        );
        assert_eq!(answer.as_deref(), Some("Moderate"));
    }

    #[test]
    fn missing_artifact_disables_model() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_or_disabled(dir.path().join("model.json")).is_none());
    }
}
