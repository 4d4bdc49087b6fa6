//! Image preprocessing for the CLIP visual encoder.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;

/// CLIP input resolution (224x224)
pub const INPUT_SIZE: u32 = 224;

// CLIP normalization constants
const MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Decode an encoded image and turn it into a normalised NCHW tensor
/// buffer of `3 * 224 * 224` floats.
///
/// The centre square is cropped, then resized to 224x224 (bicubic).
pub fn preprocess_image(bytes: &[u8]) -> Result<Vec<f32>> {
    let img = image::load_from_memory(bytes).map_err(|e| anyhow!("Failed to decode image: {}", e))?;
    let rgb = img.to_rgb8();

    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(anyhow!("Image has no pixels"));
    }

    Ok(normalize(&crop_and_resize(&rgb)))
}

/// Crop the centred `min(w, h)` square first so thin images never get
/// upscaled along their long side, then resize it to 224x224.
fn crop_and_resize(rgb: &RgbImage) -> RgbImage {
    let (w, h) = rgb.dimensions();
    let side = w.min(h);
    let x = (w - side) / 2;
    let y = (h - side) / 2;

    let square = imageops::crop_imm(rgb, x, y, side, side).to_image();
    imageops::resize(&square, INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom)
}

fn normalize(rgb: &RgbImage) -> Vec<f32> {
    let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
    let mut input_data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = y as usize * INPUT_SIZE as usize + x as usize;
        for c in 0..3 {
            input_data[c * plane + idx] = ((pixel[c] as f32 / 255.0) - MEAN[c]) / STD[c];
        }
    }

    input_data
}
