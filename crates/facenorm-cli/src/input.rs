//! Parsing of command-line landmark lists and JSON face/embedding files.

use anyhow::{bail, Context, Result};
use facenorm_core::{select_embedding, CompareError, DetectedFace, Landmarks};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;

/// Parse `x1,y1,x2,y2,...,x5,y5` into a landmark set.
pub fn parse_landmarks(s: &str) -> Result<Landmarks> {
    let values = s
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f32>()
                .with_context(|| format!("invalid landmark coordinate {v:?}"))
        })
        .collect::<Result<Vec<f32>>>()?;

    if values.len() != 10 {
        bail!("expected 10 landmark coordinates (5 points), got {}", values.len());
    }
    Ok(std::array::from_fn(|i| (values[2 * i], values[2 * i + 1])))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Contents of a `compare` input file: a bare embedding or the faces of one image.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Vector(Vec<f32>),
    Faces(Vec<DetectedFace>),
}

impl EmbeddingInput {
    /// Embedding values of face `index`. A bare embedding only has index 0.
    pub fn select(&self, index: usize) -> Result<&[f32], CompareError> {
        match self {
            EmbeddingInput::Vector(v) if index == 0 => Ok(v),
            EmbeddingInput::Vector(_) => Err(CompareError::MissingEmbedding { index }),
            EmbeddingInput::Faces(faces) => {
                select_embedding(faces, index).map(|e| e.values.as_slice())
            }
        }
    }
}
