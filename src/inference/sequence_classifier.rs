use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{anyhow, Context, Result};
use candle::{DType, Device, IndexOp, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::{
    bert::{BertModel, Config as BertConfig},
    debertav2::{Config as DebertaConfig, DebertaV2SeqClassificationModel},
    distilbert::{Config as DistilBertConfig, DistilBertModel},
    xlm_roberta::{Config as RobertaConfig, XLMRobertaModel},
};
use serde_json::Value;
use tokenizers::{Encoding, Tokenizer, TruncationParams};

use super::hub::ModelFiles;

pub const MAX_TOKENS: usize = 512;

/// Encoder families we know how to put a classification head on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    Bert,
    Roberta,
    DistilBert,
    DebertaV2,
}

impl Architecture {
    pub fn from_config(config: &Value) -> Result<Self> {
        let model_type = config
            .get("model_type")
            .and_then(|v| v.as_str())
            .unwrap_or("bert");
        match model_type {
            "bert" => Ok(Architecture::Bert),
            "roberta" | "xlm-roberta" => Ok(Architecture::Roberta),
            "distilbert" => Ok(Architecture::DistilBert),
            "deberta-v2" => Ok(Architecture::DebertaV2),
            other => Err(anyhow!("unsupported text model architecture '{other}'")),
        }
    }

    /// Prefix of the encoder weights inside a sequence-classification checkpoint.
    pub fn encoder_prefix(self) -> &'static str {
        match self {
            Architecture::Bert => "bert",
            Architecture::Roberta => "roberta",
            Architecture::DistilBert => "distilbert",
            Architecture::DebertaV2 => "deberta",
        }
    }
}

pub enum ClassifierModel {
    Bert {
        encoder: BertModel,
        pooler: Linear,
        classifier: Linear,
    },
    Roberta {
        encoder: XLMRobertaModel,
        dense: Linear,
        out_proj: Linear,
    },
    DistilBert {
        encoder: DistilBertModel,
        pre_classifier: Linear,
        classifier: Linear,
    },
    DebertaV2(Box<DebertaV2SeqClassificationModel>),
}

impl ClassifierModel {
    /// Builds encoder + head from `vb`. Works for both mmaped checkpoints and a
    /// trainable `VarMap`.
    pub fn build(
        arch: Architecture,
        config: &Value,
        vb: VarBuilder,
        num_labels: usize,
    ) -> Result<Self> {
        match arch {
            Architecture::Bert => {
                let cfg: BertConfig =
                    serde_json::from_value(config.clone()).context("invalid BERT config")?;
                let hidden = json_usize(config, "hidden_size")?;
                let encoder = BertModel::load(vb.pp("bert"), &cfg)?;
                let pooler = candle_nn::linear(hidden, hidden, vb.pp("bert.pooler.dense"))?;
                let classifier = candle_nn::linear(hidden, num_labels, vb.pp("classifier"))?;
                Ok(ClassifierModel::Bert {
                    encoder,
                    pooler,
                    classifier,
                })
            }
            Architecture::Roberta => {
                let cfg: RobertaConfig =
                    serde_json::from_value(config.clone()).context("invalid RoBERTa config")?;
                let hidden = json_usize(config, "hidden_size")?;
                let encoder = XLMRobertaModel::new(&cfg, vb.pp("roberta"))?;
                let dense = candle_nn::linear(hidden, hidden, vb.pp("classifier.dense"))?;
                let out_proj =
                    candle_nn::linear(hidden, num_labels, vb.pp("classifier.out_proj"))?;
                Ok(ClassifierModel::Roberta {
                    encoder,
                    dense,
                    out_proj,
                })
            }
            Architecture::DistilBert => {
                let cfg: DistilBertConfig = serde_json::from_value(config.clone())
                    .context("invalid DistilBERT config")?;
                let dim = json_usize(config, "dim")?;
                let encoder = DistilBertModel::load(vb.pp("distilbert"), &cfg)?;
                let pre_classifier = candle_nn::linear(dim, dim, vb.pp("pre_classifier"))?;
                let classifier = candle_nn::linear(dim, num_labels, vb.pp("classifier"))?;
                Ok(ClassifierModel::DistilBert {
                    encoder,
                    pre_classifier,
                    classifier,
                })
            }
            Architecture::DebertaV2 => {
                let cfg: DebertaConfig =
                    serde_json::from_value(config.clone()).context("invalid DeBERTa config")?;
                let model = DebertaV2SeqClassificationModel::load(vb, &cfg, None)?;
                Ok(ClassifierModel::DebertaV2(Box::new(model)))
            }
        }
    }

    /// Raw logits, shape `(batch, num_labels)`.
    pub fn forward_logits(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        token_type_ids: &Tensor,
    ) -> candle::Result<Tensor> {
        match self {
            ClassifierModel::Bert {
                encoder,
                pooler,
                classifier,
            } => {
                let hidden = encoder.forward(input_ids, token_type_ids, Some(attention_mask))?;
                let cls = hidden.i((.., 0))?;
                let pooled = pooler.forward(&cls)?.tanh()?;
                classifier.forward(&pooled)
            }
            ClassifierModel::Roberta {
                encoder,
                dense,
                out_proj,
            } => {
                let hidden =
                    encoder.forward(input_ids, attention_mask, token_type_ids, None, None, None)?;
                let cls = hidden.i((.., 0))?;
                let x = dense.forward(&cls)?.tanh()?;
                out_proj.forward(&x)
            }
            ClassifierModel::DistilBert {
                encoder,
                pre_classifier,
                classifier,
            } => {
                // DistilBERT masks out nonzero entries, so invert the padding mask
                let mask = attention_mask.eq(0u32)?.unsqueeze(1)?.unsqueeze(1)?;
                let hidden = encoder.forward(input_ids, &mask)?;
                let cls = hidden.i((.., 0))?;
                let x = pre_classifier.forward(&cls)?.relu()?;
                classifier.forward(&x)
            }
            ClassifierModel::DebertaV2(model) => model.forward(
                input_ids,
                Some(token_type_ids.clone()),
                Some(attention_mask.clone()),
            ),
        }
    }
}

/// A fine-tuned sequence classifier with its tokenizer and label table.
pub struct SequenceClassifier {
    model: ClassifierModel,
    arch: Architecture,
    tokenizer: Tokenizer,
    device: Device,
    id2label: BTreeMap<usize, String>,
}

impl SequenceClassifier {
    pub fn load(files: &ModelFiles, device: &Device) -> Result<Self> {
        let config = load_config_json(&files.config)?;
        let arch = Architecture::from_config(&config)?;

        let tokenizer_path = files
            .tokenizer
            .as_ref()
            .ok_or_else(|| anyhow!("text classifier requires tokenizer.json"))?;
        let mut tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            anyhow!(
                "Tokenizer load failed ({}): {e}",
                tokenizer_path.display()
            )
        })?;
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_sequence_len(&config, arch),
                ..Default::default()
            }))
            .map_err(|e| anyhow!("Tokenizer truncation config failed: {e}"))?;

        let id2label = extract_id2label(&config);
        let num_labels = id2label.len().max(2);

        let vb = build_var_builder(&files.weights, DType::F32, device)?;
        let model = ClassifierModel::build(arch, &config, vb, num_labels)?;

        Ok(Self {
            model,
            arch,
            tokenizer,
            device: device.clone(),
            id2label,
        })
    }

    pub fn id2label(&self) -> &BTreeMap<usize, String> {
        &self.id2label
    }

    /// Softmax probabilities for a single text.
    pub fn predict_probs(&self, text: &str) -> Result<Vec<f32>> {
        let enc = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("Tokenizer encode error: {e}"))?;
        let logits = self.logits_for(&enc)?;
        Ok(super::softmax(&logits))
    }

    /// Raw logits for a (premise, hypothesis) pair, as NLI models expect.
    pub fn pair_logits(&self, premise: &str, hypothesis: &str) -> Result<Vec<f32>> {
        let enc = self
            .tokenizer
            .encode((premise, hypothesis), true)
            .map_err(|e| anyhow!("Tokenizer encode error: {e}"))?;
        self.logits_for(&enc)
    }

    fn logits_for(&self, enc: &Encoding) -> Result<Vec<f32>> {
        if enc.get_ids().is_empty() {
            return Err(anyhow!("tokenizer produced no tokens"));
        }
        let (input_ids, attention_mask, token_type_ids) =
            batch_tensors(self.arch, std::slice::from_ref(enc), &self.device)?;

        let logits = self
            .model
            .forward_logits(&input_ids, &attention_mask, &token_type_ids)
            .context("classifier forward pass failed")?;
        tensor_to_vec(logits)
    }
}

/// `(input_ids, attention_mask, token_type_ids)`, each `(batch, seq)`.
///
/// Encodings must already share one length (batch padding on the tokenizer).
pub fn batch_tensors(
    arch: Architecture,
    encodings: &[Encoding],
    device: &Device,
) -> Result<(Tensor, Tensor, Tensor)> {
    let batch = encodings.len();
    let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);
    if batch == 0 || seq_len == 0 {
        return Err(anyhow!("cannot build tensors for an empty batch"));
    }

    let mut ids = Vec::with_capacity(batch * seq_len);
    let mut mask = Vec::with_capacity(batch * seq_len);
    let mut type_ids = Vec::with_capacity(batch * seq_len);
    for enc in encodings {
        if enc.get_ids().len() != seq_len {
            return Err(anyhow!(
                "ragged batch: expected {seq_len} tokens, got {}",
                enc.get_ids().len()
            ));
        }
        ids.extend_from_slice(enc.get_ids());
        mask.extend_from_slice(enc.get_attention_mask());
        match arch {
            // single-segment embeddings
            Architecture::Roberta | Architecture::DistilBert => {
                type_ids.extend(std::iter::repeat(0u32).take(seq_len))
            }
            _ => type_ids.extend_from_slice(enc.get_type_ids()),
        }
    }

    let shape = (batch, seq_len);
    Ok((
        Tensor::from_vec(ids, shape, device)?,
        Tensor::from_vec(mask, shape, device)?,
        Tensor::from_vec(type_ids, shape, device)?,
    ))
}

pub fn load_config_json(path: &Path) -> Result<Value> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// `id2label` from a raw config, defaulting to `LABEL_i` names.
pub fn extract_id2label(config: &Value) -> BTreeMap<usize, String> {
    let parsed: BTreeMap<usize, String> = config
        .get("id2label")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| {
                    let idx = k.parse::<usize>().ok()?;
                    let label = v.as_str()?.to_string();
                    Some((idx, label))
                })
                .collect()
        })
        .unwrap_or_default();

    if !parsed.is_empty() {
        return parsed;
    }

    let num_labels = config
        .get("num_labels")
        .and_then(|v| v.as_u64())
        .unwrap_or(2) as usize;
    (0..num_labels).map(|i| (i, format!("LABEL_{i}"))).collect()
}

pub fn json_usize(config: &Value, key: &str) -> Result<usize> {
    config
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .ok_or_else(|| anyhow!("config.json is missing '{key}'"))
}

fn max_sequence_len(config: &Value, arch: Architecture) -> usize {
    let positions = json_usize(config, "max_position_embeddings").unwrap_or(MAX_TOKENS);
    let usable = match arch {
        // RoBERTa reserves padding_idx + 1 position slots
        Architecture::Roberta => positions.saturating_sub(2),
        _ => positions,
    };
    usable.clamp(16, MAX_TOKENS)
}

pub fn build_var_builder(path: &Path, dtype: DType, device: &Device) -> Result<VarBuilder<'static>> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if ext == "safetensors" {
        let files = vec![path.to_path_buf()];
        unsafe {
            VarBuilder::from_mmaped_safetensors(&files, dtype, device)
                .map_err(|e| anyhow!("failed to load {}: {e}", path.display()))
        }
    } else {
        VarBuilder::from_pth(path, dtype, device)
            .map_err(|e| anyhow!("failed to load {}: {e}", path.display()))
    }
}

fn tensor_to_vec(tensor: Tensor) -> Result<Vec<f32>> {
    let logits = tensor
        .to_dtype(DType::F32)?
        .to_vec2::<f32>()
        .map_err(|e| anyhow!("failed to decode logits: {e}"))?;
    logits
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("logits tensor missing batch dimension"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{FetchPolicy, ModelLocator};
    use serde_json::json;

    #[test]
    fn architecture_follows_model_type() {
        let arch = |t: &str| Architecture::from_config(&json!({ "model_type": t }));
        assert_eq!(arch("roberta").unwrap(), Architecture::Roberta);
        assert_eq!(arch("distilbert").unwrap(), Architecture::DistilBert);
        assert_eq!(arch("deberta-v2").unwrap(), Architecture::DebertaV2);
        assert!(arch("bart").is_err());
        assert_eq!(
            Architecture::from_config(&json!({})).unwrap(),
            Architecture::Bert
        );
    }

    #[test]
    fn id2label_is_read_in_index_order() {
        let table = extract_id2label(&json!({ "id2label": { "1": "TRUE", "0": "FAKE" } }));
        let labels: Vec<_> = table.values().cloned().collect();
        assert_eq!(labels, vec!["FAKE", "TRUE"]);
    }

    #[test]
    fn id2label_defaults_to_generic_names() {
        let table = extract_id2label(&json!({ "num_labels": 3 }));
        assert_eq!(table.len(), 3);
        assert_eq!(table[&2], "LABEL_2");
        assert_eq!(extract_id2label(&json!({})).len(), 2);
    }

    #[test]
    fn roberta_sequence_length_skips_reserved_positions() {
        let cfg = json!({ "max_position_embeddings": 514 });
        assert_eq!(max_sequence_len(&cfg, Architecture::Roberta), 512);
        let cfg = json!({ "max_position_embeddings": 2048 });
        assert_eq!(max_sequence_len(&cfg, Architecture::Bert), MAX_TOKENS);
    }

    #[test]
    fn classifier_snapshot_smoke_test() {
        let snapshot = std::path::PathBuf::from("models/text-fakenews");
        if !snapshot.join("model.safetensors").exists() {
            eprintln!(
                "text classifier snapshot missing under {}, skipping test",
                snapshot.display()
            );
            return;
        }
        let locator = ModelLocator::new(None, FetchPolicy::CacheOnly);
        let files = locator
            .resolve(snapshot.to_str().unwrap(), true)
            .expect("failed to resolve snapshot");
        let classifier =
            SequenceClassifier::load(&files, &Device::Cpu).expect("failed to load classifier");
        let probs = classifier
            .predict_probs("This is a quick smoke test")
            .expect("classifier inference failed");
        assert_eq!(probs.len(), classifier.id2label().len());
    }
}
