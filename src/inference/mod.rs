pub mod hub;
pub mod image_classifier;
pub mod sequence_classifier;
pub mod zero_shot;

use anyhow::{anyhow, Result};
use candle::Device;
use tracing::warn;

pub use hub::{FetchPolicy, ModelFiles, ModelLocator};
pub use image_classifier::SiglipImageClassifier;
pub use sequence_classifier::SequenceClassifier;
pub use zero_shot::{ZeroShotClassifier, ZeroShotScore};

/// `cpu`, `cuda` or `cuda:N`. Anything unusable degrades to CPU.
pub fn select_device(preference: &str) -> Device {
    match parse_device_preference(preference) {
        Ok(device) => device,
        Err(err) => {
            warn!("{err}; running models on CPU");
            Device::Cpu
        }
    }
}

fn parse_device_preference(value: &str) -> Result<Device> {
    let trimmed = value.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.is_empty() || lower == "cpu" {
        Ok(Device::Cpu)
    } else if lower.starts_with("cuda") || lower.starts_with("gpu") {
        let ordinal = trimmed
            .split(':')
            .nth(1)
            .and_then(|part| part.parse::<usize>().ok())
            .unwrap_or(0);
        Device::new_cuda(ordinal).map_err(|err| {
            anyhow!(
                "requested CUDA device {} but initialization failed ({err}). Build with the \
                 `cuda` feature and ensure CUDA libraries are available",
                ordinal
            )
        })
    } else {
        Err(anyhow!("unrecognized MODEL_DEVICE value '{trimmed}'"))
    }
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

pub fn logits_argmax(logits: &[f32]) -> Result<(usize, f32)> {
    let (idx, value) = logits
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .ok_or_else(|| anyhow!("empty logits tensor"))?;
    Ok((idx, *value))
}
