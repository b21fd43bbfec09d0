//! Typed request/response bodies for callers that speak JSON.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{rounded_avg, Quality, RhymeScheme, StructuralVerdict};

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("malformed request body: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluateRequest {
    #[serde(default)]
    pub pantun: String,
}

/// Parse a JSON request body, rejecting anything that is not
/// `{"pantun": "<text>"}`.
pub fn parse_request(body: &str) -> Result<EvaluateRequest, RequestError> {
    Ok(serde_json::from_str(body)?)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureSummary {
    pub line_count: usize,
    pub avg_syllables: f64,
    pub has_nature: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerdictResponse {
    pub quality: Quality,
    pub reason: String,
    pub tips: String,
    pub rhyme_scheme: RhymeScheme,
    pub structure: StructureSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_quality: Option<String>,
}

impl From<&StructuralVerdict> for VerdictResponse {
    fn from(verdict: &StructuralVerdict) -> Self {
        Self {
            quality: verdict.quality,
            reason: verdict.reason.clone(),
            tips: verdict.tips.join(" "),
            rhyme_scheme: verdict.rhyme_scheme,
            structure: StructureSummary {
                line_count: verdict.metrics.line_count,
                avg_syllables: rounded_avg(verdict),
                has_nature: verdict.metrics.has_nature,
            },
            model_quality: verdict.model_quality.clone(),
        }
    }
}
