//! CLIP model implementation using ONNX Runtime

use anyhow::{anyhow, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tokenizers::Tokenizer;

use super::preprocess::{preprocess_image, INPUT_SIZE};
use super::Embedder;
use crate::config::ModelConfig;

/// CLIP embedding (512-dimensional vector for ViT-B/32)
pub type ClipEmbedding = Vec<f32>;

/// CLIP's text context length
const CONTEXT_LENGTH: usize = 77;
const END_OF_TEXT: i64 = 49407;

struct TextEncoder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

/// CLIP visual and text encoders.
///
/// Created once per process; `init` must succeed before the model is used.
/// Sessions need exclusive access to run, so each encoder sits behind its
/// own mutex while decoding and tokenization stay outside the lock.
pub struct ClipModel {
    config: ModelConfig,
    visual: OnceLock<Mutex<Session>>,
    text: OnceLock<TextEncoder>,
}

impl ClipModel {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            config: config.clone(),
            visual: OnceLock::new(),
            text: OnceLock::new(),
        }
    }

    /// Load both encoders, downloading model files on first use.
    pub fn init(&self) -> Result<()> {
        tracing::info!(model = %self.config.name, "Loading CLIP model...");
        self.init_visual_model()?;
        self.init_text_model()?;
        tracing::info!(model = %self.config.name, "CLIP model loaded successfully on cpu");
        Ok(())
    }

    /// Download a model file if it doesn't exist
    fn ensure_model(&self, filename: &str, url: &str) -> Result<PathBuf> {
        let models_dir = &self.config.models_dir;
        std::fs::create_dir_all(models_dir)
            .with_context(|| format!("Failed to create {}", models_dir.display()))?;
        let model_path = models_dir.join(filename);

        if !model_path.exists() {
            tracing::info!(model = %filename, "Downloading CLIP model...");
            let response = ureq::get(url)
                .call()
                .map_err(|e| anyhow!("Failed to download model: {}", e))?;

            // Download next to the target so an interrupted transfer is never
            // mistaken for a complete file
            let partial = model_path.with_extension("part");
            let mut file = std::fs::File::create(&partial)?;
            std::io::copy(&mut response.into_reader(), &mut file)?;
            std::fs::rename(&partial, &model_path)?;
            tracing::info!(model = %filename, path = ?model_path, "CLIP model downloaded");
        }

        Ok(model_path)
    }

    fn build_session(&self, path: &Path) -> Result<Session> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.config.intra_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        Ok(session)
    }

    fn init_visual_model(&self) -> Result<()> {
        if self.visual.get().is_some() {
            return Ok(());
        }

        let model_path = self.ensure_model("clip-vit-b32-vision.onnx", &self.config.visual_url)?;
        let session = self.build_session(&model_path)?;

        let _ = self.visual.set(Mutex::new(session));
        Ok(())
    }

    fn init_text_model(&self) -> Result<()> {
        if self.text.get().is_some() {
            return Ok(());
        }

        let model_path = self.ensure_model("clip-vit-b32-text.onnx", &self.config.text_url)?;
        let tokenizer_path =
            self.ensure_model("clip-vit-b32-tokenizer.json", &self.config.tokenizer_url)?;

        let session = self.build_session(&model_path)?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            anyhow!("Tokenizer load failed at {}: {}", tokenizer_path.display(), e)
        })?;

        let _ = self.text.set(TextEncoder {
            session: Mutex::new(session),
            tokenizer,
        });
        Ok(())
    }

    /// Run the visual encoder on a preprocessed NCHW buffer
    fn run_visual_encoder(&self, input_data: Vec<f32>) -> Result<ClipEmbedding> {
        let mut model = self
            .visual
            .get()
            .ok_or_else(|| anyhow!("Visual model not initialized"))?
            .lock()
            .map_err(|e| anyhow!("Failed to lock model: {}", e))?;

        let input_tensor = Tensor::from_array((
            [1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize],
            input_data.into_boxed_slice(),
        ))?;

        let outputs = model.run(ort::inputs!["pixel_values" => input_tensor])?;

        let embedding_output = outputs
            .iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding output"))?;

        let (_shape, embedding_data) = embedding_output.1.try_extract_tensor::<f32>()?;

        l2_normalize(embedding_data.to_vec())
    }

    /// Run the text encoder on a string
    fn run_text_encoder(&self, text: &str) -> Result<ClipEmbedding> {
        let encoder = self
            .text
            .get()
            .ok_or_else(|| anyhow!("Text model not initialized"))?;

        let encoding = encoder
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("Failed to tokenize text: {}", e))?;
        let (input_ids, attention_mask) =
            pad_tokens(encoding.get_ids(), encoding.get_attention_mask());

        let ids_tensor = Tensor::from_array(([1usize, CONTEXT_LENGTH], input_ids.into_boxed_slice()))?;
        let mask_tensor =
            Tensor::from_array(([1usize, CONTEXT_LENGTH], attention_mask.into_boxed_slice()))?;

        let mut model = encoder
            .session
            .lock()
            .map_err(|e| anyhow!("Failed to lock model: {}", e))?;

        let outputs = model.run(ort::inputs![
            "input_ids" => ids_tensor,
            "attention_mask" => mask_tensor
        ])?;

        // The pooled embedding is the only 2-d output ([1, 512]); the others
        // are per-token hidden states
        for (_name, value) in outputs.iter() {
            let (shape, data) = value.try_extract_tensor::<f32>()?;
            if shape.len() == 2 {
                return l2_normalize(data.to_vec());
            }
        }

        Err(anyhow!("No embedding output"))
    }
}

impl Embedder for ClipModel {
    fn is_ready(&self) -> bool {
        self.visual.get().is_some() && self.text.get().is_some()
    }

    fn model_name(&self) -> &str {
        &self.config.name
    }

    fn embed_text(&self, text: &str) -> Result<ClipEmbedding> {
        self.run_text_encoder(text)
    }

    fn embed_image(&self, bytes: &[u8]) -> Result<ClipEmbedding> {
        let input_data = preprocess_image(bytes)?;
        self.run_visual_encoder(input_data)
    }
}

/// Fit token ids and mask to CLIP's fixed context length.
///
/// Overlong inputs keep their end-of-text token in the last slot.
fn pad_tokens(ids: &[u32], mask: &[u32]) -> (Vec<i64>, Vec<i64>) {
    let mut input_ids: Vec<i64> = ids.iter().take(CONTEXT_LENGTH).map(|&t| t as i64).collect();
    let mut attention_mask: Vec<i64> = mask.iter().take(CONTEXT_LENGTH).map(|&m| m as i64).collect();

    if ids.len() > CONTEXT_LENGTH {
        input_ids[CONTEXT_LENGTH - 1] = END_OF_TEXT;
    }

    input_ids.resize(CONTEXT_LENGTH, 0);
    attention_mask.resize(CONTEXT_LENGTH, 0);
    (input_ids, attention_mask)
}

/// L2 normalize the embedding
fn l2_normalize(embedding: Vec<f32>) -> Result<ClipEmbedding> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm > 0.0 && norm.is_finite() {
        Ok(embedding.iter().map(|x| x / norm).collect())
    } else {
        Err(anyhow!("Encoder produced a degenerate embedding"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        assert!(l2_normalize(vec![0.0, 0.0]).is_err());
        assert!(l2_normalize(vec![f32::NAN, 1.0]).is_err());
    }

    #[test]
    fn test_pad_tokens_short() {
        let (ids, mask) = pad_tokens(&[49406, 320, 1929, 49407], &[1, 1, 1, 1]);
        assert_eq!(ids.len(), CONTEXT_LENGTH);
        assert_eq!(mask.len(), CONTEXT_LENGTH);
        assert_eq!(&ids[..4], &[49406, 320, 1929, 49407]);
        assert!(ids[4..].iter().all(|&t| t == 0));
        assert_eq!(mask.iter().sum::<i64>(), 4);
    }

    #[test]
    fn test_pad_tokens_truncates_with_end_token() {
        let ids: Vec<u32> = (0..100).collect();
        let mask = vec![1u32; 100];
        let (ids, mask) = pad_tokens(&ids, &mask);
        assert_eq!(ids.len(), CONTEXT_LENGTH);
        assert_eq!(ids[CONTEXT_LENGTH - 2], 75);
        assert_eq!(ids[CONTEXT_LENGTH - 1], END_OF_TEXT);
        assert!(mask.iter().all(|&m| m == 1));
    }

    #[test]
    fn test_not_ready_before_init() {
        let model = ClipModel::new(&ModelConfig::default());
        assert!(!model.is_ready());
        assert_eq!(model.model_name(), "ViT-B/32");
        assert!(model.embed_text("a dog").is_err());
    }
}
