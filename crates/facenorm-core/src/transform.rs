//! Closed-form least-squares similarity fit (Umeyama, 1991).
//!
//! Estimates the rotation, uniform scale and translation that best map one
//! point set onto another. All arithmetic is carried out in f64 regardless of
//! the f32 input precision.

use crate::types::SimilarityTransform;
use nalgebra::{Matrix2, Vector2};
use thiserror::Error;

/// Singular values at or below this fraction of the largest one count as zero.
pub(crate) const RANK_TOLERANCE: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("degenerate point configuration: covariance has rank 0")]
    Degenerate,
    #[error("non-finite coordinate at point {0}")]
    NonFinite(usize),
    #[error("singular value decomposition did not converge")]
    Decomposition,
}

impl TransformError {
    /// Stable machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Degenerate => "degenerate_input",
            Self::NonFinite(_) => "non_finite_input",
            Self::Decomposition => "decomposition_failed",
        }
    }
}

/// Demeaned point cloud together with its centroid.
pub(crate) struct Centered<const N: usize> {
    pub mean: Vector2<f64>,
    pub points: [Vector2<f64>; N],
}

pub(crate) fn center<const N: usize>(pts: &[(f32, f32); N]) -> Result<Centered<N>, TransformError> {
    if N == 0 {
        return Err(TransformError::Degenerate);
    }
    let mut sum = Vector2::zeros();
    for (i, &(x, y)) in pts.iter().enumerate() {
        if !x.is_finite() || !y.is_finite() {
            return Err(TransformError::NonFinite(i));
        }
        sum += Vector2::new(f64::from(x), f64::from(y));
    }
    let mean = sum / N as f64;
    let points = std::array::from_fn(|i| {
        Vector2::new(f64::from(pts[i].0), f64::from(pts[i].1)) - mean
    });
    Ok(Centered { mean, points })
}

/// Number of singular values above the relative tolerance.
pub(crate) fn rank(singular_values: &Vector2<f64>) -> usize {
    let max = singular_values.max();
    if max <= 0.0 {
        return 0;
    }
    singular_values
        .iter()
        .filter(|&&s| s > max * RANK_TOLERANCE)
        .count()
}

/// Rotation for a rank-1 covariance: flip the last singular direction when
/// `U·Vᵗ` would be a reflection.
fn rank_one_rotation(u: &Matrix2<f64>, v_t: &Matrix2<f64>, d: &Vector2<f64>) -> Matrix2<f64> {
    if u.determinant() * v_t.determinant() > 0.0 {
        u * v_t
    } else {
        u * Matrix2::from_diagonal(&Vector2::new(d[0], -1.0)) * v_t
    }
}

/// Estimate the similarity transform mapping `src` onto `dst`.
///
/// Returns [`TransformError::Degenerate`] when the cross-covariance of the two
/// sets has rank 0 (e.g. every source point coincides). A rank-deficient but
/// non-zero covariance (collinear points) still yields a proper rotation.
pub fn estimate_similarity<const N: usize>(
    src: &[(f32, f32); N],
    dst: &[(f32, f32); N],
) -> Result<SimilarityTransform, TransformError> {
    let src = center(src)?;
    let dst = center(dst)?;

    // Eq. (38)
    let mut a = Matrix2::<f64>::zeros();
    for (s, d) in src.points.iter().zip(dst.points.iter()) {
        a += d * s.transpose();
    }
    a /= N as f64;

    // Eq. (39)
    let mut d = Vector2::new(1.0, 1.0);
    if a.determinant() < 0.0 {
        d[1] = -1.0;
    }

    let svd = a.svd(true, true);
    let u = svd.u.ok_or(TransformError::Decomposition)?;
    let v_t = svd.v_t.ok_or(TransformError::Decomposition)?;
    let s = svd.singular_values;

    // Eq. (40) and (43)
    let rotation = match rank(&s) {
        0 => return Err(TransformError::Degenerate),
        1 => {
            tracing::debug!(singular_values = ?s, "rank-1 covariance");
            rank_one_rotation(&u, &v_t, &d)
        }
        _ => u * Matrix2::from_diagonal(&d) * v_t,
    };

    // Eq. (41) and (42)
    let variance: f64 = src.points.iter().map(|p| p.norm_squared()).sum::<f64>() / N as f64;
    let scale = s.dot(&d) / variance;

    let linear = rotation * scale;
    let translation = dst.mean - linear * src.mean;
    Ok(SimilarityTransform::from_parts(&linear, &translation))
}
