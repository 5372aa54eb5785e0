use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

/// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
pub type Landmarks = [(f32, f32); 5];

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub landmarks: Option<Landmarks>,
}

/// Face embedding vector (typically 512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// L2 norm, accumulated in f64.
    pub fn norm(&self) -> f64 {
        self.values
            .iter()
            .map(|&v| f64::from(v) * f64::from(v))
            .sum::<f64>()
            .sqrt()
    }
}

/// One face reported for an image: where it is, and its embedding if one was extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFace {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub embedding: Option<Embedding>,
}

/// 2×3 similarity transform mapping source pixels to destination pixels.
///
/// ```text
/// | m00  m01  tx |
/// | m10  m11  ty |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimilarityTransform {
    pub matrix: [[f64; 3]; 2],
}

impl SimilarityTransform {
    pub const IDENTITY: Self = Self {
        matrix: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    };

    pub(crate) fn from_parts(linear: &Matrix2<f64>, translation: &Vector2<f64>) -> Self {
        Self {
            matrix: [
                [linear[(0, 0)], linear[(0, 1)], translation[0]],
                [linear[(1, 0)], linear[(1, 1)], translation[1]],
            ],
        }
    }

    pub(crate) fn linear(&self) -> Matrix2<f64> {
        let m = &self.matrix;
        Matrix2::new(m[0][0], m[0][1], m[1][0], m[1][1])
    }

    pub(crate) fn translation(&self) -> Vector2<f64> {
        Vector2::new(self.matrix[0][2], self.matrix[1][2])
    }

    /// Map a source point to the destination frame.
    pub fn apply(&self, (x, y): (f64, f64)) -> (f64, f64) {
        let m = &self.matrix;
        (
            m[0][0] * x + m[0][1] * y + m[0][2],
            m[1][0] * x + m[1][1] * y + m[1][2],
        )
    }

    /// Inverse mapping (destination → source). `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        let inv = self.linear().try_inverse()?;
        let t = -(inv * self.translation());
        Some(Self::from_parts(&inv, &t))
    }

    /// Uniform scale factor (square root of the linear part's determinant).
    pub fn scale(&self) -> f64 {
        self.linear().determinant().abs().sqrt()
    }

    /// Rotation angle in radians, counter-clockwise in a y-up frame.
    pub fn rotation(&self) -> f64 {
        self.matrix[1][0].atan2(self.matrix[0][0])
    }
}
