//! Embedding comparison under cosine and Euclidean metrics.

use crate::types::{DetectedFace, Embedding};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompareError {
    #[error("embedding dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("zero-length embedding encountered")]
    ZeroNorm,
    #[error("embedding contains NaN or infinite values")]
    NonFinite,
    #[error("unsupported metric: {0}")]
    UnsupportedMetric(String),
    #[error("no face embedding at index {index}")]
    MissingEmbedding { index: usize },
}

impl CompareError {
    /// Stable machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::ZeroNorm => "zero_norm",
            Self::NonFinite => "non_finite_input",
            Self::UnsupportedMetric(_) => "unsupported_metric",
            Self::MissingEmbedding { .. } => "missing_embedding",
        }
    }
}

/// Similarity metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Cosine similarity mapped to [0, 1].
    #[default]
    CosineNorm,
    /// Cosine similarity in [-1, 1].
    CosineRaw,
    /// `1 / (1 + ‖a − b‖)`, in (0, 1].
    #[serde(alias = "euclidean_sim")]
    Euclidean,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::CosineNorm => "cosine_norm",
            Metric::CosineRaw => "cosine_raw",
            Metric::Euclidean => "euclidean",
        }
    }
}

impl FromStr for Metric {
    type Err = CompareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine_norm" => Ok(Metric::CosineNorm),
            "cosine_raw" => Ok(Metric::CosineRaw),
            "euclidean" | "euclidean_sim" => Ok(Metric::Euclidean),
            other => Err(CompareError::UnsupportedMetric(other.to_string())),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of comparing two embeddings.
///
/// Serializes as `{"score", "metric"}` plus `"cosine"` for [`Metric::CosineNorm`]
/// and `"distance"` for [`Metric::Euclidean`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub score: f64,
    pub metric: Metric,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cosine: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

/// Compare two embedding vectors.
///
/// Both vectors must have the same length, finite components and a non-zero
/// norm, whatever the metric. Accumulation is done in f64.
pub fn compare(a: &[f32], b: &[f32], metric: Metric) -> Result<SimilarityResult, CompareError> {
    if a.len() != b.len() {
        return Err(CompareError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    let mut dist_sq = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
        dist_sq += (x - y) * (x - y);
    }

    if ![dot, norm_a, norm_b, dist_sq].iter().all(|v| v.is_finite()) {
        return Err(CompareError::NonFinite);
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return Err(CompareError::ZeroNorm);
    }

    let result = match metric {
        Metric::CosineRaw | Metric::CosineNorm => {
            let cosine = (dot / denom).clamp(-1.0, 1.0);
            if metric == Metric::CosineRaw {
                SimilarityResult { score: cosine, metric, cosine: None, distance: None }
            } else {
                SimilarityResult {
                    score: (cosine + 1.0) / 2.0,
                    metric,
                    cosine: Some(cosine),
                    distance: None,
                }
            }
        }
        Metric::Euclidean => {
            let distance = dist_sq.sqrt();
            SimilarityResult {
                score: 1.0 / (1.0 + distance),
                metric,
                cosine: None,
                distance: Some(distance),
            }
        }
    };
    Ok(result)
}

/// [`compare`] with the metric given by name, e.g. from a request body.
pub fn compare_named(a: &[f32], b: &[f32], metric: &str) -> Result<SimilarityResult, CompareError> {
    compare(a, b, metric.parse()?)
}

/// Pick the embedding of face `index`.
pub fn select_embedding(faces: &[DetectedFace], index: usize) -> Result<&Embedding, CompareError> {
    faces
        .get(index)
        .and_then(|f| f.embedding.as_ref())
        .ok_or(CompareError::MissingEmbedding { index })
}

/// Compare face `index` of one image against face `index` of another.
pub fn compare_faces(
    left: &[DetectedFace],
    right: &[DetectedFace],
    index: usize,
    metric: Metric,
) -> Result<SimilarityResult, CompareError> {
    let a = select_embedding(left, index)?;
    let b = select_embedding(right, index)?;
    tracing::debug!(
        index,
        dim = a.dim(),
        left_norm = a.norm(),
        right_norm = b.norm(),
        %metric,
        "comparing face embeddings"
    );
    compare(&a.values, &b.values, metric)
}
