//! Packing aligned crops for an ArcFace-style embedding extractor.

use crate::alignment::ALIGNED_SIZE;
use image::RgbImage;
use ndarray::Array4;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike the detector's 128.0

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    #[error("crop {index} is {width}x{height}, expected 112x112")]
    CropSize { index: usize, width: u32, height: u32 },
}

/// Stack aligned RGB crops into a normalized `(n, 3, 112, 112)` NCHW tensor.
pub fn crops_to_tensor(crops: &[RgbImage]) -> Result<Array4<f32>, TensorError> {
    let size = ALIGNED_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((crops.len(), 3, size, size));

    for (n, crop) in crops.iter().enumerate() {
        if crop.dimensions() != (ALIGNED_SIZE, ALIGNED_SIZE) {
            return Err(TensorError::CropSize {
                index: n,
                width: crop.width(),
                height: crop.height(),
            });
        }
        for (x, y, pixel) in crop.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                tensor[[n, c, y, x]] = (f32::from(pixel[c]) - ARCFACE_MEAN) / ARCFACE_STD;
            }
        }
    }

    Ok(tensor)
}

/// L2-normalize a raw extractor output. A zero vector is returned unchanged.
pub fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
