use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use candle::{DType, Device, Module, Tensor};
use candle_nn::Linear;
use candle_transformers::models::siglip::{VisionConfig, VisionModel};
use image::{imageops::FilterType, DynamicImage};
use serde_json::{json, Value};

use super::{
    hub::ModelFiles,
    logits_argmax,
    sequence_classifier::{build_var_builder, extract_id2label, json_usize, load_config_json},
    softmax,
};

/// Bicubic, as the SigLIP image processors resize.
const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// Resize + normalize settings from `preprocessor_config.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocess {
    pub width: u32,
    pub height: u32,
    pub rescale: f32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Preprocess {
    pub fn siglip(image_size: u32) -> Self {
        Self {
            width: image_size,
            height: image_size,
            rescale: 1.0 / 255.0,
            mean: [0.5; 3],
            std: [0.5; 3],
        }
    }

    pub fn from_json(raw: &Value, image_size: u32) -> Self {
        let mut pre = Self::siglip(image_size);
        if let Some(size) = raw.get("size") {
            let dim = |key: &str| size.get(key).and_then(|v| v.as_u64()).map(|v| v as u32);
            if let (Some(h), Some(w)) = (dim("height"), dim("width")) {
                pre.height = h;
                pre.width = w;
            } else if let Some(edge) = dim("shortest_edge") {
                pre.height = edge;
                pre.width = edge;
            }
        }
        if let Some(r) = raw.get("rescale_factor").and_then(|v| v.as_f64()) {
            pre.rescale = r as f32;
        }
        if let Some(mean) = triple(raw.get("image_mean")) {
            pre.mean = mean;
        }
        if let Some(std) = triple(raw.get("image_std")) {
            pre.std = std;
        }
        pre
    }

    /// `(1, 3, H, W)` float tensor.
    pub fn pixels(&self, image: &DynamicImage, device: &Device) -> Result<Tensor> {
        let rgb = image
            .resize_exact(self.width, self.height, RESIZE_FILTER)
            .to_rgb8();
        let (w, h) = (rgb.width() as usize, rgb.height() as usize);
        let data = rgb.into_raw();

        let mean = Tensor::new(&self.mean, device)?.reshape((3, 1, 1))?;
        let std = Tensor::new(&self.std, device)?.reshape((3, 1, 1))?;
        let pixels = Tensor::from_vec(data, (h, w, 3), device)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?
            .affine(self.rescale as f64, 0.0)?
            .broadcast_sub(&mean)?
            .broadcast_div(&std)?
            .unsqueeze(0)?;
        Ok(pixels)
    }
}

fn triple(value: Option<&Value>) -> Option<[f32; 3]> {
    let arr = value?.as_array()?;
    if arr.len() != 3 {
        return None;
    }
    let mut out = [0f32; 3];
    for (slot, v) in out.iter_mut().zip(arr) {
        *slot = v.as_f64()? as f32;
    }
    Some(out)
}

/// SigLIP vision tower + linear head over mean-pooled patch embeddings.
pub struct SiglipImageClassifier {
    vision: VisionModel,
    classifier: Linear,
    preprocess: Preprocess,
    device: Device,
    id2label: BTreeMap<usize, String>,
}

impl SiglipImageClassifier {
    pub fn load(files: &ModelFiles, device: &Device) -> Result<Self> {
        let config = load_config_json(&files.config)?;
        let vision_json = vision_config_with_defaults(&config);
        let vision_cfg: VisionConfig = serde_json::from_value(vision_json.clone())
            .context("invalid SigLIP vision config")?;
        let hidden = json_usize(&vision_json, "hidden_size")?;
        let image_size = json_usize(&vision_json, "image_size")? as u32;

        let preprocess = match &files.preprocessor {
            Some(path) => Preprocess::from_json(&load_config_json(path)?, image_size),
            None => Preprocess::siglip(image_size),
        };

        let id2label = extract_id2label(&config);
        let vb = build_var_builder(&files.weights, DType::F32, device)?;
        let vision = VisionModel::new(&vision_cfg, false, vb.pp("vision_model"))?;
        let classifier = candle_nn::linear(hidden, id2label.len(), vb.pp("classifier"))?;

        Ok(Self {
            vision,
            classifier,
            preprocess,
            device: device.clone(),
            id2label,
        })
    }

    /// Top class name and its softmax probability.
    pub fn classify(&self, image: &DynamicImage) -> Result<(String, f32)> {
        let pixels = self.preprocess.pixels(image, &self.device)?;
        let hidden = self
            .vision
            .forward(&pixels)
            .context("image model forward pass failed")?;
        let pooled = hidden.mean(1)?;
        let logits = self
            .classifier
            .forward(&pooled)?
            .squeeze(0)?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?;

        let probs = softmax(&logits);
        let (idx, prob) = logits_argmax(&probs)?;
        let label = self
            .id2label
            .get(&idx)
            .cloned()
            .ok_or_else(|| anyhow!("class {idx} missing from id2label"))?;
        Ok((label, prob))
    }
}

/// Checkpoint configs often omit fields equal to the SigLIP defaults.
fn vision_config_with_defaults(config: &Value) -> Value {
    let mut merged = json!({
        "hidden_size": 768,
        "intermediate_size": 3072,
        "num_hidden_layers": 12,
        "num_attention_heads": 12,
        "num_channels": 3,
        "image_size": 224,
        "patch_size": 16,
        "hidden_act": "gelu_pytorch_tanh",
        "layer_norm_eps": 1e-6,
    });
    if let (Some(target), Some(source)) = (
        merged.as_object_mut(),
        config.get("vision_config").and_then(|v| v.as_object()),
    ) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
    merged
}
