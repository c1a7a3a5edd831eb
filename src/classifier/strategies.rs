use std::{collections::BTreeMap, sync::Arc};

use anyhow::{anyhow, Result};

use crate::inference::ZeroShotScore;
use crate::manager::ModelManager;

use super::calibration::text_confidence;
use super::text_chain::{StrategyOutcome, TextStrategy};
use super::{Label, LabelMapper, Prediction};

pub const HEURISTIC_CONFIDENCE: f32 = 0.6;
const SENSATIONAL_KEYWORDS: &[&str] = &["shocking", "breaking", "exclusive"];

/// A fine-tuned fake/real classifier, labels resolved through the synonym lists.
pub struct DedicatedClassifier {
    models: Arc<ModelManager>,
    mapper: Arc<LabelMapper>,
}

impl DedicatedClassifier {
    pub fn new(models: Arc<ModelManager>, mapper: Arc<LabelMapper>) -> Self {
        Self { models, mapper }
    }
}

impl TextStrategy for DedicatedClassifier {
    fn name(&self) -> &'static str {
        "dedicated-classifier"
    }

    fn classify(&self, text: &str) -> StrategyOutcome {
        let Some(model) = self.models.text_classifier() else {
            return StrategyOutcome::Skipped("text classifier unavailable");
        };
        model
            .predict_probs(text)
            .and_then(|probs| decide_by_label_table(&probs, model.id2label(), &self.mapper, text))
            .into()
    }
}

pub fn decide_by_label_table(
    probs: &[f32],
    id2label: &BTreeMap<usize, String>,
    mapper: &LabelMapper,
    text: &str,
) -> Result<Prediction> {
    let (fake_idx, real_idx) = mapper.resolve_indices(id2label);
    let p_fake = prob_at(probs, fake_idx)?;
    let p_real = prob_at(probs, real_idx)?;
    let label = if p_real >= p_fake {
        Label::Real
    } else {
        Label::Fake
    };
    Ok(Prediction::new(label, text_confidence(max_prob(probs), text)))
}

/// NLI zero-shot scoring over configurable candidate labels.
pub struct ZeroShotNli {
    models: Arc<ModelManager>,
    mapper: Arc<LabelMapper>,
    candidates: Vec<String>,
    template: String,
}

impl ZeroShotNli {
    pub fn new(
        models: Arc<ModelManager>,
        mapper: Arc<LabelMapper>,
        candidates: Vec<String>,
        template: String,
    ) -> Self {
        Self {
            models,
            mapper,
            candidates,
            template,
        }
    }
}

impl TextStrategy for ZeroShotNli {
    fn name(&self) -> &'static str {
        "zero-shot-nli"
    }

    fn classify(&self, text: &str) -> StrategyOutcome {
        let Some(model) = self.models.zero_shot() else {
            return StrategyOutcome::Skipped("zero-shot model unavailable");
        };
        model
            .classify(text, &self.candidates, &self.template)
            .and_then(|scores| decide_by_top_candidate(&scores, &self.mapper, text))
            .into()
    }
}

pub fn decide_by_top_candidate(
    scores: &[ZeroShotScore],
    mapper: &LabelMapper,
    text: &str,
) -> Result<Prediction> {
    let top = scores
        .first()
        .ok_or_else(|| anyhow!("zero-shot returned no scores"))?;
    Ok(Prediction::new(
        mapper.map(&top.label),
        text_confidence(top.score, text),
    ))
}

/// Sentiment model from the local cache; index 1 is read as Real, index 0 as Fake.
pub struct CachedSentiment {
    models: Arc<ModelManager>,
}

impl CachedSentiment {
    pub fn new(models: Arc<ModelManager>) -> Self {
        Self { models }
    }
}

impl TextStrategy for CachedSentiment {
    fn name(&self) -> &'static str {
        "cached-sentiment"
    }

    fn classify(&self, text: &str) -> StrategyOutcome {
        let Some(model) = self.models.sentiment() else {
            return StrategyOutcome::Skipped("sentiment model not cached");
        };
        model
            .predict_probs(text)
            .and_then(|probs| decide_by_position(&probs, text))
            .into()
    }
}

pub fn decide_by_position(probs: &[f32], text: &str) -> Result<Prediction> {
    let p_fake = prob_at(probs, 0)?;
    let p_real = prob_at(probs, 1)?;
    let label = if p_real >= p_fake {
        Label::Real
    } else {
        Label::Fake
    };
    Ok(Prediction::new(label, text_confidence(max_prob(probs), text)))
}

/// Last resort; never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordHeuristic;

impl KeywordHeuristic {
    pub fn predict(&self, text: &str) -> Prediction {
        let lower = text.to_lowercase();
        let label = if SENSATIONAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Label::Fake
        } else {
            Label::Real
        };
        Prediction::new(label, HEURISTIC_CONFIDENCE)
    }
}

impl TextStrategy for KeywordHeuristic {
    fn name(&self) -> &'static str {
        "keyword-heuristic"
    }

    fn classify(&self, text: &str) -> StrategyOutcome {
        StrategyOutcome::Decided(self.predict(text))
    }
}

fn prob_at(probs: &[f32], idx: usize) -> Result<f32> {
    probs
        .get(idx)
        .copied()
        .ok_or_else(|| anyhow!("class index {idx} out of range for {} outputs", probs.len()))
}

fn max_prob(probs: &[f32]) -> f32 {
    probs.iter().copied().fold(0.0, f32::max)
}
