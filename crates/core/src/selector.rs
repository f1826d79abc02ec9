//! Output-score decoding and top-K label selection.

use anyhow::{bail, Result};

use crate::types::TensorBuffer;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.2;
pub const DEFAULT_TOP_K: usize = 1;

/// Which scores survive and how many are reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionPolicy {
    /// Scores strictly below this are discarded; equal scores are kept.
    pub min_confidence: f64,
    /// Maximum number of results. `0` keeps every surviving score.
    pub top_k: usize,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedResult {
    pub score: f64,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledScore {
    pub label: String,
    pub score: f64,
    pub index: usize,
}

impl LabeledScore {
    /// `{"<label>":<score>}` with six fractional digits.
    pub fn to_json_line(&self) -> String {
        let label = serde_json::Value::String(self.label.clone());
        format!("{{{label}:{:.6}}}", self.score)
    }
}

/// Per-class confidence: float scores as-is, byte scores over 255.
pub fn decode_scores(output: &TensorBuffer) -> Vec<f64> {
    match output {
        TensorBuffer::Float32(data) => data.iter().map(|&v| v as f64).collect(),
        TensorBuffer::UInt8(data) => data.iter().map(|&v| v as f64 / 255.0).collect(),
    }
}

/// Min and max of a float score vector. Informational only; never applied to scores.
pub fn score_range(output: &TensorBuffer) -> Option<(f32, f32)> {
    let TensorBuffer::Float32(data) = output else {
        return None;
    };
    let min = data.iter().cloned().reduce(f32::min)?;
    let max = data.iter().cloned().reduce(f32::max)?;
    Some((min, max))
}

/// Filter by the confidence floor, then sort by descending score.
///
/// The sort is stable, so equal scores stay in ascending index order.
pub fn rank(scores: &[f64], policy: &SelectionPolicy) -> Vec<RankedResult> {
    let mut ranked: Vec<RankedResult> = scores
        .iter()
        .enumerate()
        .filter(|(_, score)| **score >= policy.min_confidence)
        .map(|(index, &score)| RankedResult { score, index })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    if policy.top_k > 0 {
        ranked.truncate(policy.top_k);
    }
    ranked
}

/// Decode `output`, rank it and attach labels.
///
/// `output` and `labels` must be the same length; a mismatch means the label
/// file does not describe this model.
pub fn select(
    output: &TensorBuffer,
    labels: &[String],
    policy: &SelectionPolicy,
) -> Result<Vec<LabeledScore>> {
    if output.len() != labels.len() {
        bail!(
            "output has {} classes but the label list has {} entries",
            output.len(),
            labels.len()
        );
    }

    let scores = decode_scores(output);
    Ok(rank(&scores, policy)
        .into_iter()
        .map(|r| LabeledScore {
            label: labels[r.index].clone(),
            score: r.score,
            index: r.index,
        })
        .collect())
}
