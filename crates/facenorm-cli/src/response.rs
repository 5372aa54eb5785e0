//! JSON replies for each subcommand, built apart from I/O so they can be checked in tests.

use crate::input::EmbeddingInput;
use anyhow::Result;
use facenorm_core::{
    compare, estimate_norm, AlignError, AlignedFace, DetectedFace, Landmarks, Metric,
    SimilarityTransform,
};
use image::Rgb;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct EstimateResponse {
    transform: SimilarityTransform,
    scale: f64,
    rotation_deg: f64,
}

/// Body printed on stdout plus whether the command succeeded.
#[derive(Debug)]
pub struct Reply {
    pub body: Value,
    pub success: bool,
}

impl Reply {
    fn ok<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self {
            body: serde_json::to_value(value)?,
            success: true,
        })
    }

    fn rejected(kind: &'static str, message: String) -> Result<Self> {
        tracing::warn!(kind, %message, "request rejected");
        Ok(Self {
            body: serde_json::to_value(ErrorResponse {
                error: ErrorBody { kind, message },
            })?,
            success: false,
        })
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.success {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

pub fn estimate(landmarks: &Landmarks, size: u32) -> Result<Reply> {
    match estimate_norm(landmarks, size) {
        Ok(transform) => Reply::ok(&EstimateResponse {
            transform,
            scale: transform.scale(),
            rotation_deg: transform.rotation().to_degrees(),
        }),
        Err(e) => Reply::rejected(e.kind(), e.to_string()),
    }
}

pub fn compare_inputs(
    left: &EmbeddingInput,
    right: &EmbeddingInput,
    metric: Option<&str>,
    default_metric: Metric,
    face_index: usize,
) -> Result<Reply> {
    let metric: Metric = match metric {
        Some(name) => match name.parse() {
            Ok(m) => m,
            Err(e) => return Reply::rejected(e.kind(), e.to_string()),
        },
        None => default_metric,
    };

    let result = left
        .select(face_index)
        .and_then(|a| Ok((a, right.select(face_index)?)))
        .and_then(|(a, b)| compare(a, b, metric));

    match result {
        Ok(similarity) => Reply::ok(&similarity),
        Err(e) => Reply::rejected(e.kind(), e.to_string()),
    }
}

/// One line of the `align` report.
#[derive(Debug, Serialize)]
pub struct AlignEntry {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<SimilarityTransform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl AlignEntry {
    fn failed(index: usize, kind: &'static str, message: String) -> Self {
        tracing::warn!(index, kind, %message, "face alignment failed");
        Self {
            index,
            path: None,
            transform: None,
            error: Some(ErrorBody { kind, message }),
        }
    }
}

/// Landmarks of every face that has them, with the face's index.
pub fn landmark_jobs(faces: &[DetectedFace]) -> (Vec<usize>, Vec<Landmarks>) {
    faces
        .iter()
        .enumerate()
        .filter_map(|(i, f)| f.bbox.landmarks.map(|l| (i, l)))
        .unzip()
}

/// Build the per-face report, writing each successful crop to `out_dir`.
///
/// Faces without landmarks, faces that failed to align and crops that could
/// not be written each get their own error entry; the rest are unaffected.
pub fn align_entries<I>(face_count: usize, results: I, out_dir: &Path) -> Vec<AlignEntry>
where
    I: IntoIterator<Item = (usize, Result<AlignedFace<Rgb<u8>>, AlignError>)>,
{
    let mut entries: Vec<AlignEntry> = (0..face_count)
        .map(|i| AlignEntry {
            index: i,
            path: None,
            transform: None,
            error: Some(ErrorBody {
                kind: "missing_landmarks",
                message: "face has no landmarks".to_string(),
            }),
        })
        .collect();

    for (index, result) in results {
        entries[index] = match result {
            Ok(face) => {
                let path = out_dir.join(format!("face_{index}.png"));
                match face.crop.save(&path) {
                    Ok(()) => AlignEntry {
                        index,
                        path: Some(path),
                        transform: Some(face.transform),
                        error: None,
                    },
                    Err(e) => AlignEntry::failed(
                        index,
                        "write_failed",
                        format!("writing {}: {e}", path.display()),
                    ),
                }
            }
            Err(e) => AlignEntry::failed(index, e.kind(), e.to_string()),
        };
    }

    entries
}
