//! In-memory embedder and fetcher for exercising the service without a model.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clipserve::clip::{AccelerationInfo, ClipEmbedding, Embedder};
use clipserve::fetch::{FetchError, ImageFetcher};
use clipserve::SearchService;

/// Text queries map through a fixed table; "images" are UTF-8 lists of
/// comma-separated floats, so `b"1,0"` embeds to `[1.0, 0.0]`.
pub struct StubEmbedder {
    pub ready: bool,
    pub texts: HashMap<String, Vec<f32>>,
    pub image_calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new(texts: &[(&str, Vec<f32>)]) -> Self {
        Self {
            ready: true,
            texts: texts.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            image_calls: AtomicUsize::new(0),
        }
    }

    pub fn not_ready() -> Self {
        Self {
            ready: false,
            ..Self::new(&[])
        }
    }
}

impl Embedder for StubEmbedder {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn model_name(&self) -> &str {
        "stub"
    }

    fn embed_text(&self, text: &str) -> Result<ClipEmbedding> {
        self.texts
            .get(text)
            .cloned()
            .ok_or_else(|| anyhow!("unknown text {:?}", text))
    }

    fn embed_image(&self, bytes: &[u8]) -> Result<ClipEmbedding> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        let text = std::str::from_utf8(bytes)?;
        text.split(',')
            .map(|v| v.trim().parse::<f32>().map_err(|e| anyhow!("corrupt image: {}", e)))
            .collect()
    }
}

/// Serves bytes from a table; unknown locators answer 404.
pub struct StubFetcher {
    pub images: HashMap<String, Vec<u8>>,
    pub calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new(images: &[(&str, &str)]) -> Self {
        Self {
            images: images
                .iter()
                .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl ImageFetcher for StubFetcher {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.images.get(locator).cloned().ok_or(FetchError::Status(404))
    }
}

pub fn service(embedder: Arc<StubEmbedder>, fetcher: Arc<StubFetcher>) -> SearchService {
    SearchService::new(embedder, fetcher, 5).with_acceleration(AccelerationInfo::default())
}

/// Three candidates: A matches `[1,0]`, B is orthogonal, C is corrupt;
/// anything else 404s.
pub fn standard_fixture() -> (Arc<StubEmbedder>, Arc<StubFetcher>) {
    let embedder = Arc::new(StubEmbedder::new(&[
        ("a red car", vec![1.0, 0.0]),
        ("a blue sky", vec![0.0, 1.0]),
    ]));
    let fetcher = Arc::new(StubFetcher::new(&[
        ("http://img/a.jpg", "1,0"),
        ("http://img/b.jpg", "0,1"),
        ("http://img/c.jpg", "not-an-image"),
        ("http://img/d.jpg", "0.6,0.8"),
    ]));
    (embedder, fetcher)
}

pub fn urls(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
