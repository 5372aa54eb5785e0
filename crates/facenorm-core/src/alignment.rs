//! Face alignment via 4-DOF similarity transform.
//!
//! Aligns detected faces to a canonical 112×112 position using the five
//! InsightFace reference landmarks and an Umeyama least-squares fit.

use crate::transform::{self, TransformError};
use crate::types::{Landmarks, SimilarityTransform};
use image::{ImageBuffer, Pixel};
use nalgebra::Matrix2;
use rayon::prelude::*;
use thiserror::Error;

/// ArcFace reference landmarks for a 112×112 output.
pub const REFERENCE_LANDMARKS_112: Landmarks = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignError {
    #[error("degenerate landmarks: points are coincident or collinear")]
    Degenerate,
    #[error("unsupported output size {0}: reference landmarks are defined for 112x112 only")]
    UnsupportedSize(u32),
    #[error("transform is not invertible")]
    SingularTransform,
    #[error(transparent)]
    Transform(TransformError),
}

impl From<TransformError> for AlignError {
    fn from(e: TransformError) -> Self {
        match e {
            TransformError::Degenerate => AlignError::Degenerate,
            other => AlignError::Transform(other),
        }
    }
}

impl AlignError {
    /// Stable machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Degenerate => "degenerate_input",
            Self::UnsupportedSize(_) => "unsupported_size",
            Self::SingularTransform => "singular_transform",
            Self::Transform(e) => e.kind(),
        }
    }
}

/// A canonical face crop and the transform that produced it.
#[derive(Debug, Clone)]
pub struct AlignedFace<P: Pixel<Subpixel = u8>> {
    pub crop: ImageBuffer<P, Vec<u8>>,
    pub transform: SimilarityTransform,
}

/// Estimate the transform taking `landmarks` onto the reference template.
///
/// Landmark sets whose points are coincident or all on one line are rejected:
/// a detector never produces such a face, and the resulting warp would
/// collapse the crop.
pub fn estimate_norm(landmarks: &Landmarks, image_size: u32) -> Result<SimilarityTransform, AlignError> {
    if image_size != ALIGNED_SIZE {
        return Err(AlignError::UnsupportedSize(image_size));
    }

    let centered = transform::center(landmarks)?;
    let mut scatter = Matrix2::<f64>::zeros();
    for p in &centered.points {
        scatter += p * p.transpose();
    }
    let spread = scatter.singular_values();
    if transform::rank(&spread) < 2 {
        tracing::debug!(?landmarks, singular_values = ?spread, "rejecting degenerate landmarks");
        return Err(AlignError::Degenerate);
    }

    Ok(transform::estimate_similarity(landmarks, &REFERENCE_LANDMARKS_112)?)
}

/// [`estimate_norm`] over many faces; result `i` belongs to `landmarks[i]`.
pub fn estimate_norm_batch(
    landmarks: &[Landmarks],
    image_size: u32,
) -> Vec<Result<SimilarityTransform, AlignError>> {
    landmarks
        .par_iter()
        .map(|lmk| estimate_norm(lmk, image_size))
        .collect()
}

/// Resample `image` through `transform` into a `width`×`height` output.
///
/// Each output pixel is mapped back to the source with the inverse transform
/// and sampled bilinearly. Neighbours outside the source contribute 0.
pub fn warp_affine<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    transform: &SimilarityTransform,
    width: u32,
    height: u32,
) -> Result<ImageBuffer<P, Vec<u8>>, AlignError>
where
    P: Pixel<Subpixel = u8>,
{
    let inv = transform.inverse().ok_or(AlignError::SingularTransform)?;
    let (src_w, src_h) = (i64::from(image.width()), i64::from(image.height()));

    let sample = |x: i64, y: i64, c: usize| -> f64 {
        if x >= 0 && x < src_w && y >= 0 && y < src_h {
            f64::from(image.get_pixel(x as u32, y as u32).channels()[c])
        } else {
            0.0
        }
    };

    let mut output = ImageBuffer::<P, Vec<u8>>::new(width, height);
    for (ox, oy, px) in output.enumerate_pixels_mut() {
        let (sx, sy) = inv.apply((f64::from(ox), f64::from(oy)));

        let x0 = sx.floor() as i64;
        let y0 = sy.floor() as i64;
        let fx = sx - x0 as f64;
        let fy = sy - y0 as f64;

        for (c, value) in px.channels_mut().iter_mut().enumerate() {
            let v = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1, c) * fx * fy;
            *value = v.round().clamp(0.0, 255.0) as u8;
        }
    }

    Ok(output)
}

/// Align one detected face to a canonical `image_size`×`image_size` crop.
pub fn norm_crop<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    landmarks: &Landmarks,
    image_size: u32,
) -> Result<AlignedFace<P>, AlignError>
where
    P: Pixel<Subpixel = u8>,
{
    let transform = estimate_norm(landmarks, image_size)?;
    let crop = warp_affine(image, &transform, image_size, image_size)?;
    Ok(AlignedFace { crop, transform })
}

/// Align every face in `landmarks` against the same source image.
///
/// Faces are processed in parallel. The output has one entry per input, in
/// input order; a face that fails carries its own error and does not affect
/// the others.
pub fn norm_crop_batch<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    landmarks: &[Landmarks],
    image_size: u32,
) -> Vec<Result<AlignedFace<P>, AlignError>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    landmarks
        .par_iter()
        .map(|lmk| norm_crop(image, lmk, image_size))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn scaled_reference(s: f32, dx: f32, dy: f32) -> Landmarks {
        REFERENCE_LANDMARKS_112.map(|(x, y)| (x * s + dx, y * s + dy))
    }

    #[test]
    fn test_identity_transform() {
        let m = estimate_norm(&REFERENCE_LANDMARKS_112, ALIGNED_SIZE).unwrap();
        let expected = SimilarityTransform::IDENTITY.matrix;
        for r in 0..2 {
            for c in 0..3 {
                assert!(
                    (m.matrix[r][c] - expected[r][c]).abs() < 1e-6,
                    "m[{r}][{c}] = {}",
                    m.matrix[r][c]
                );
            }
        }
    }

    #[test]
    fn test_scaled_transform() {
        // Source landmarks at 2x scale → transform should have scale ≈ 0.5
        let src = scaled_reference(2.0, 0.0, 0.0);
        let m = estimate_norm(&src, ALIGNED_SIZE).unwrap();
        assert!((m.scale() - 0.5).abs() < 1e-4, "scale = {}, expected 0.5", m.scale());
        assert!(m.rotation().abs() < 1e-4, "rotation = {}", m.rotation());
    }

    #[test]
    fn test_rotated_template_recovered() {
        let (s, theta) = (1.8f64, 0.35f64);
        let (c, sn) = (theta.cos(), theta.sin());
        let src: Landmarks = REFERENCE_LANDMARKS_112.map(|(x, y)| {
            let (x, y) = (f64::from(x), f64::from(y));
            ((s * (c * x - sn * y) + 40.0) as f32, (s * (sn * x + c * y) + 25.0) as f32)
        });
        // The fit maps src → reference, so it inverts the applied rotation and scale.
        let m = estimate_norm(&src, ALIGNED_SIZE).unwrap();
        assert!((m.scale() - 1.0 / s).abs() < 1e-4, "scale = {}", m.scale());
        assert!((m.rotation() + theta).abs() < 1e-4, "rotation = {}", m.rotation());
    }

    #[test]
    fn test_unsupported_size() {
        assert_eq!(
            estimate_norm(&REFERENCE_LANDMARKS_112, 224),
            Err(AlignError::UnsupportedSize(224))
        );
    }

    #[test]
    fn test_coincident_landmarks_rejected() {
        let lmk = [(50.0f32, 50.0f32); 5];
        assert_eq!(estimate_norm(&lmk, ALIGNED_SIZE), Err(AlignError::Degenerate));
    }

    #[test]
    fn test_collinear_landmarks_rejected() {
        let lmk: Landmarks = [(10.0, 10.0), (20.0, 20.0), (30.0, 30.0), (40.0, 40.0), (50.0, 50.0)];
        assert_eq!(estimate_norm(&lmk, ALIGNED_SIZE), Err(AlignError::Degenerate));
    }

    #[test]
    fn test_non_finite_landmarks_rejected() {
        let mut lmk = REFERENCE_LANDMARKS_112;
        lmk[2].0 = f32::INFINITY;
        let err = estimate_norm(&lmk, ALIGNED_SIZE).unwrap_err();
        assert_eq!(err, AlignError::Transform(TransformError::NonFinite(2)));
        assert_eq!(err.kind(), "non_finite_input");
    }

    #[test]
    fn test_warp_output_size() {
        let frame = GrayImage::from_pixel(640, 480, Luma([128]));
        let out = warp_affine(&frame, &SimilarityTransform::IDENTITY, 112, 112).unwrap();
        assert_eq!(out.dimensions(), (112, 112));
        assert_eq!(out.get_pixel(50, 50), &Luma([128]));
    }

    #[test]
    fn test_warp_out_of_bounds_is_zero() {
        let frame = RgbImage::from_pixel(20, 20, Rgb([200, 100, 50]));
        // Shift content 100px right: the left part of the output samples x < 0.
        let shift = SimilarityTransform {
            matrix: [[1.0, 0.0, 100.0], [0.0, 1.0, 0.0]],
        };
        let out = warp_affine(&frame, &shift, 112, 112).unwrap();
        assert_eq!(out.get_pixel(10, 10), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(105, 10), &Rgb([200, 100, 50]));
    }

    #[test]
    fn test_warp_singular_transform() {
        let frame = GrayImage::new(10, 10);
        let flat = SimilarityTransform {
            matrix: [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
        };
        assert_eq!(
            warp_affine(&frame, &flat, 4, 4).unwrap_err(),
            AlignError::SingularTransform
        );
    }

    #[test]
    fn test_align_face_output_size() {
        let frame = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
        let aligned = norm_crop(&frame, &REFERENCE_LANDMARKS_112, ALIGNED_SIZE).unwrap();
        assert_eq!(aligned.crop.dimensions(), (112, 112));
    }

    #[test]
    fn test_landmark_roundtrip() {
        // Place a bright patch at a landmark position, verify it lands near the
        // reference position after alignment.
        let (w, h) = (200u32, 200u32);
        let mut frame = GrayImage::new(w, h);

        let src_landmarks: Landmarks = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        let (lx, ly) = (src_landmarks[0].0 as u32, src_landmarks[0].1 as u32);
        for y in ly - 2..=ly + 2 {
            for x in lx - 2..=lx + 2 {
                frame.put_pixel(x, y, Luma([255]));
            }
        }

        let aligned = norm_crop(&frame, &src_landmarks, ALIGNED_SIZE).unwrap();

        let ref_x = REFERENCE_LANDMARKS_112[0].0.round() as u32;
        let ref_y = REFERENCE_LANDMARKS_112[0].1.round() as u32;
        let mut max_val = 0u8;
        for y in ref_y - 1..=ref_y + 1 {
            for x in ref_x - 1..=ref_x + 1 {
                max_val = max_val.max(aligned.crop.get_pixel(x, y)[0]);
            }
        }
        assert!(max_val > 100, "Expected bright patch near reference left eye ({ref_x}, {ref_y}), max={max_val}");
    }

    #[test]
    fn test_batch_preserves_order() {
        let mut frame = RgbImage::new(300, 300);
        for (x, y, px) in frame.enumerate_pixels_mut() {
            *px = Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
        }
        let faces: Vec<Landmarks> = (0..6)
            .map(|i| scaled_reference(1.0 + i as f32 * 0.2, i as f32 * 10.0, i as f32 * 5.0))
            .collect();

        let batch = norm_crop_batch(&frame, &faces, ALIGNED_SIZE);
        assert_eq!(batch.len(), faces.len());
        for (i, item) in batch.iter().enumerate() {
            let single = norm_crop(&frame, &faces[i], ALIGNED_SIZE).unwrap();
            let item = item.as_ref().unwrap();
            assert_eq!(item.transform, single.transform, "transform {i}");
            assert_eq!(item.crop, single.crop, "crop {i}");
        }
    }

    #[test]
    fn test_batch_partial_failure() {
        let frame = GrayImage::from_pixel(200, 200, Luma([90]));
        let faces = vec![
            REFERENCE_LANDMARKS_112,
            [(5.0, 5.0); 5],
            scaled_reference(1.2, 3.0, 3.0),
        ];
        let batch = norm_crop_batch(&frame, &faces, ALIGNED_SIZE);
        assert_eq!(batch.len(), 3);
        assert!(batch[0].is_ok());
        assert_eq!(batch[1].as_ref().unwrap_err(), &AlignError::Degenerate);
        assert!(batch[2].is_ok());
    }

    #[test]
    fn test_estimate_norm_batch() {
        let faces = vec![scaled_reference(2.0, 0.0, 0.0), [(0.0, 0.0); 5]];
        let out = estimate_norm_batch(&faces, ALIGNED_SIZE);
        assert!((out[0].as_ref().unwrap().scale() - 0.5).abs() < 1e-4);
        assert_eq!(out[1], Err(AlignError::Degenerate));
    }
}
