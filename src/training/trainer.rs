//! Fine-tuning loop: pretrained encoder, fresh two-way head, AdamW, best
//! checkpoint kept by weighted F1 on the evaluation split.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use candle::{DType, Device, Tensor, D};
use candle_nn::{loss::cross_entropy, AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde_json::{json, Value};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{info, warn};

use crate::inference::{
    select_device,
    sequence_classifier::{batch_tensors, load_config_json, Architecture, ClassifierModel},
    FetchPolicy, ModelLocator,
};

use super::dataset::{Example, Splits};
use super::metrics::{evaluate, EvalMetrics};

const NUM_LABELS: usize = 2;

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub model: String,
    pub output_dir: PathBuf,
    pub epochs: usize,
    pub batch_size: usize,
    pub lr: f64,
    pub weight_decay: f64,
    pub max_length: usize,
    pub seed: u64,
    pub device: String,
    pub allow_downloads: bool,
    pub cache_dir: Option<PathBuf>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model: "distilbert-base-uncased".to_string(),
            output_dir: PathBuf::from("models/text-fakenews"),
            epochs: 3,
            batch_size: 16,
            lr: 5e-5,
            weight_decay: 0.01,
            max_length: 256,
            seed: 42,
            device: "cpu".to_string(),
            allow_downloads: false,
            cache_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EpochReport {
    pub epoch: usize,
    pub train_loss: f64,
    pub eval: EvalMetrics,
    pub improved: bool,
}

#[derive(Debug, Clone)]
pub struct TrainReport {
    pub epochs: Vec<EpochReport>,
    pub best_epoch: usize,
    pub best: EvalMetrics,
    /// Best checkpoint scored on the test split, if there is one.
    pub test: Option<EvalMetrics>,
}

struct Session {
    model: ClassifierModel,
    arch: Architecture,
    tokenizer: Tokenizer,
    device: Device,
}

impl Session {
    fn logits(&self, batch: &[&Example]) -> Result<Tensor> {
        let texts: Vec<&str> = batch.iter().map(|e| e.text.as_str()).collect();
        let encodings = self
            .tokenizer
            .encode_batch(texts, true)
            .map_err(|e| anyhow!("Tokenizer encode error: {e}"))?;
        let (input_ids, attention_mask, token_type_ids) =
            batch_tensors(self.arch, &encodings, &self.device)?;
        Ok(self
            .model
            .forward_logits(&input_ids, &attention_mask, &token_type_ids)?)
    }

    fn predict(&self, examples: &[Example], batch_size: usize) -> Result<Vec<u32>> {
        let mut out = Vec::with_capacity(examples.len());
        for chunk in examples.chunks(batch_size.max(1)) {
            let batch: Vec<&Example> = chunk.iter().collect();
            let preds = self.logits(&batch)?.argmax(D::Minus1)?.to_vec1::<u32>()?;
            out.extend(preds);
        }
        Ok(out)
    }

    fn score(&self, examples: &[Example], batch_size: usize) -> Result<EvalMetrics> {
        let preds = self.predict(examples, batch_size)?;
        let labels: Vec<u32> = examples.iter().map(|e| e.label).collect();
        Ok(evaluate(&preds, &labels))
    }
}

pub fn train(config: &TrainConfig, splits: &Splits) -> Result<TrainReport> {
    if splits.train.is_empty() {
        bail!("training split is empty");
    }

    let locator = ModelLocator::new(
        config.cache_dir.clone(),
        FetchPolicy::from_flag(config.allow_downloads),
    );
    let files = locator
        .resolve(&config.model, true)
        .with_context(|| format!("cannot locate base model {}", config.model))?;

    let base_config = load_config_json(&files.config)?;
    let arch = Architecture::from_config(&base_config)?;
    let model_config = classifier_config(&base_config);

    let tokenizer_path = files
        .tokenizer
        .as_ref()
        .ok_or_else(|| anyhow!("base model has no tokenizer.json"))?;
    let pristine_tokenizer = Tokenizer::from_file(tokenizer_path)
        .map_err(|e| anyhow!("Tokenizer load failed ({}): {e}", tokenizer_path.display()))?;
    let tokenizer = batching_tokenizer(pristine_tokenizer.clone(), config.max_length)?;

    let device = select_device(&config.device);
    let mut varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = ClassifierModel::build(arch, &model_config, vb, NUM_LABELS)?;
    let (loaded, fresh) = load_pretrained(&varmap, &files.weights, arch, &device)?;
    info!(
        loaded,
        fresh,
        "initialized {:?} encoder from {}",
        arch,
        files.weights.display()
    );

    let mut optimizer = AdamW::new(
        varmap.all_vars(),
        ParamsAdamW {
            lr: config.lr,
            weight_decay: config.weight_decay,
            ..Default::default()
        },
    )?;

    let session = Session {
        model,
        arch,
        tokenizer,
        device: device.clone(),
    };

    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("failed to create {}", config.output_dir.display()))?;
    let weights_path = config.output_dir.join("model.safetensors");

    let eval_set = splits.eval_set();
    if eval_set.is_empty() {
        warn!("no validation or test rows, keeping the checkpoint of the latest epoch");
    }

    info!(
        lr = config.lr,
        weight_decay = config.weight_decay,
        batch_size = config.batch_size,
        epochs = config.epochs,
        "training started"
    );

    let mut order: Vec<usize> = (0..splits.train.len()).collect();
    let mut history = Vec::with_capacity(config.epochs);
    let mut best: Option<(usize, EvalMetrics)> = None;

    for epoch in 1..=config.epochs {
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(epoch as u64));
        order.shuffle(&mut rng);

        let mut loss_sum = 0.0;
        let mut batches = 0usize;
        for chunk in order.chunks(config.batch_size.max(1)) {
            let batch: Vec<&Example> = chunk.iter().map(|&i| &splits.train[i]).collect();
            let targets: Vec<u32> = batch.iter().map(|e| e.label).collect();
            let targets = Tensor::new(targets.as_slice(), &device)?;

            let logits = session.logits(&batch)?;
            let loss = cross_entropy(&logits, &targets)?;
            optimizer.backward_step(&loss)?;

            loss_sum += loss.to_scalar::<f32>()? as f64;
            batches += 1;
        }
        let train_loss = if batches > 0 {
            loss_sum / batches as f64
        } else {
            0.0
        };

        let eval = session.score(eval_set, config.batch_size)?;
        let improved = is_improvement(&eval, best.map(|(_, b)| b), !eval_set.is_empty());
        if improved {
            varmap
                .save(&weights_path)
                .with_context(|| format!("failed to save {}", weights_path.display()))?;
            best = Some((epoch, eval));
        }

        info!(epoch, improved, "train_loss={train_loss:.4} eval {eval}");
        history.push(EpochReport {
            epoch,
            train_loss,
            eval,
            improved,
        });
    }

    let (best_epoch, best_metrics) = best.ok_or_else(|| anyhow!("no epochs were run"))?;

    pristine_tokenizer
        .save(config.output_dir.join("tokenizer.json"), false)
        .map_err(|e| anyhow!("failed to save tokenizer: {e}"))?;
    let config_path = config.output_dir.join("config.json");
    fs::write(&config_path, serde_json::to_vec_pretty(&model_config)?)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    varmap
        .load(&weights_path)
        .context("failed to reload best checkpoint")?;
    let test = if splits.test.is_empty() {
        None
    } else {
        Some(session.score(&splits.test, config.batch_size)?)
    };

    info!(
        best_epoch,
        output = %config.output_dir.display(),
        "best checkpoint {best_metrics}"
    );
    if let Some(test) = &test {
        info!("test split {test}");
    }

    Ok(TrainReport {
        epochs: history,
        best_epoch,
        best: best_metrics,
        test,
    })
}

/// Strictly better weighted F1 wins. Without held-out rows there is nothing
/// to compare, so the newest epoch always replaces the saved one.
fn is_improvement(eval: &EvalMetrics, best: Option<EvalMetrics>, scored: bool) -> bool {
    match best {
        None => true,
        Some(_) if !scored => true,
        Some(best) => eval.f1_weighted > best.f1_weighted,
    }
}

/// Base encoder config plus the binary FAKE/REAL label table.
pub fn classifier_config(base: &Value) -> Value {
    let mut config = base.clone();
    if let Some(obj) = config.as_object_mut() {
        obj.insert("id2label".into(), json!({ "0": "FAKE", "1": "REAL" }));
        obj.insert("label2id".into(), json!({ "FAKE": 0, "REAL": 1 }));
        obj.insert("num_labels".into(), json!(NUM_LABELS));
    }
    config
}

fn batching_tokenizer(mut tokenizer: Tokenizer, max_length: usize) -> Result<Tokenizer> {
    let (pad_id, pad_token) = pad_token(&tokenizer);
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        pad_id,
        pad_token,
        ..Default::default()
    }));
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| anyhow!("Tokenizer truncation config failed: {e}"))?;
    Ok(tokenizer)
}

fn pad_token(tokenizer: &Tokenizer) -> (u32, String) {
    if let Some(padding) = tokenizer.get_padding() {
        return (padding.pad_id, padding.pad_token.clone());
    }
    ["[PAD]", "<pad>"]
        .iter()
        .find_map(|tok| tokenizer.token_to_id(tok).map(|id| (id, tok.to_string())))
        .unwrap_or((0, "[PAD]".to_string()))
}

/// Copy pretrained tensors into matching variables. Returns `(loaded, fresh)`.
fn load_pretrained(
    varmap: &VarMap,
    weights: &Path,
    arch: Architecture,
    device: &Device,
) -> Result<(usize, usize)> {
    let tensors = read_weights(weights, device)?;
    let prefix = arch.encoder_prefix();

    let vars = varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("variable map lock poisoned"))?;
    let (mut loaded, mut fresh) = (0usize, 0usize);
    for (name, var) in vars.iter() {
        let source = pretrained_names(name, prefix)
            .into_iter()
            .find_map(|candidate| tensors.get(&candidate))
            .filter(|t| t.dims() == var.dims());
        match source {
            Some(tensor) => {
                var.set(&tensor.to_dtype(var.dtype())?)?;
                loaded += 1;
            }
            None => fresh += 1,
        }
    }
    Ok((loaded, fresh))
}

fn read_weights(path: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let is_safetensors = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("safetensors"));
    if is_safetensors {
        return candle::safetensors::load(path, device)
            .with_context(|| format!("failed to read {}", path.display()));
    }
    candle::pickle::read_all(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .into_iter()
        .map(|(name, tensor)| Ok((name, tensor.to_device(device)?)))
        .collect()
}

/// Checkpoint keys a variable may be stored under: with or without the
/// encoder prefix, and the legacy `gamma`/`beta` LayerNorm names.
fn pretrained_names(var_name: &str, prefix: &str) -> Vec<String> {
    let dotted = format!("{prefix}.");
    let mut names = vec![var_name.to_string()];
    match var_name.strip_prefix(&dotted) {
        Some(bare) => names.push(bare.to_string()),
        None => names.push(format!("{dotted}{var_name}")),
    }

    let legacy: Vec<String> = names
        .iter()
        .filter_map(|n| {
            n.strip_suffix("LayerNorm.weight")
                .map(|stem| format!("{stem}LayerNorm.gamma"))
                .or_else(|| {
                    n.strip_suffix("LayerNorm.bias")
                        .map(|stem| format!("{stem}LayerNorm.beta"))
                })
        })
        .collect();
    names.extend(legacy);
    names
}
