//! CLIP (Contrastive Language-Image Pre-training) embeddings module
//!
//! Text and images are encoded into the same 512-dimensional space, so a
//! dot product between two unit-normalised embeddings is their cosine
//! similarity. Used for:
//! - Semantic search (text-to-image)
//! - Image similarity (image-to-image)

mod device;
mod model;
mod preprocess;

use anyhow::Result;

pub use device::AccelerationInfo;
pub use model::{ClipEmbedding, ClipModel};
pub use preprocess::{preprocess_image, INPUT_SIZE};

/// Anything that maps text and images into a shared, unit-normalised
/// embedding space.
pub trait Embedder: Send + Sync {
    /// Whether initialisation has completed and encoders can be called.
    fn is_ready(&self) -> bool;

    /// Model name for display
    fn model_name(&self) -> &str;

    /// Execution device the encoders run on. Sessions only register ONNX
    /// Runtime's CPU execution provider, so this stays `"cpu"` even when
    /// [`AccelerationInfo`] reports a usable CUDA device.
    fn device(&self) -> &str {
        "cpu"
    }

    fn embed_text(&self, text: &str) -> Result<ClipEmbedding>;

    /// Decode, preprocess and encode an encoded image (JPEG, PNG, ...).
    fn embed_image(&self, bytes: &[u8]) -> Result<ClipEmbedding>;
}
