//! facenorm-core: face alignment and embedding similarity.
//!
//! Fits the similarity transform taking five detected landmarks onto the
//! ArcFace reference layout, warps faces into canonical 112×112 crops, and
//! scores embedding pairs under cosine and Euclidean metrics.

pub mod alignment;
pub mod comparator;
pub mod tensor;
pub mod transform;
pub mod types;

pub use alignment::{
    estimate_norm, estimate_norm_batch, norm_crop, norm_crop_batch, warp_affine, AlignError,
    AlignedFace, ALIGNED_SIZE, REFERENCE_LANDMARKS_112,
};
pub use comparator::{
    compare, compare_faces, compare_named, select_embedding, CompareError, Metric,
    SimilarityResult,
};
pub use tensor::{crops_to_tensor, l2_normalize, TensorError};
pub use transform::{estimate_similarity, TransformError};
pub use types::{BoundingBox, DetectedFace, Embedding, Landmarks, SimilarityTransform};
