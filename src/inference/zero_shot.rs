//! Zero-shot text classification on top of an NLI sequence classifier.
//!
//! Each candidate label is turned into a hypothesis through the template and
//! scored as `(text, hypothesis)`. Entailment logits are softmaxed across the
//! candidates, so scores sum to 1 and labels are mutually exclusive.

use anyhow::{anyhow, Result};
use candle::Device;

use super::{hub::ModelFiles, sequence_classifier::SequenceClassifier, softmax};

#[derive(Debug, Clone, PartialEq)]
pub struct ZeroShotScore {
    pub label: String,
    pub score: f32,
}

pub struct ZeroShotClassifier {
    nli: SequenceClassifier,
    entailment_idx: usize,
}

impl ZeroShotClassifier {
    pub fn load(files: &ModelFiles, device: &Device) -> Result<Self> {
        let nli = SequenceClassifier::load(files, device)?;
        let entailment_idx = nli
            .id2label()
            .iter()
            .find(|(_, label)| label.to_lowercase().starts_with("entail"))
            .map(|(idx, _)| *idx)
            .ok_or_else(|| anyhow!("NLI model has no entailment label in id2label"))?;
        Ok(Self {
            nli,
            entailment_idx,
        })
    }

    /// Ranked scores, best first.
    pub fn classify(
        &self,
        text: &str,
        candidates: &[String],
        template: &str,
    ) -> Result<Vec<ZeroShotScore>> {
        if candidates.is_empty() {
            return Err(anyhow!("zero-shot classification needs at least one label"));
        }

        let mut entailment = Vec::with_capacity(candidates.len());
        for label in candidates {
            let hypothesis = hypothesis(template, label)?;
            let logits = self.nli.pair_logits(text, &hypothesis)?;
            let logit = logits.get(self.entailment_idx).copied().ok_or_else(|| {
                anyhow!(
                    "entailment index {} out of range for {} logits",
                    self.entailment_idx,
                    logits.len()
                )
            })?;
            entailment.push(logit);
        }

        Ok(rank(candidates, &entailment))
    }
}

/// Fill the `{}` placeholder of a hypothesis template.
pub fn hypothesis(template: &str, label: &str) -> Result<String> {
    if !template.contains("{}") {
        return Err(anyhow!(
            "hypothesis template '{template}' has no '{{}}' placeholder"
        ));
    }
    Ok(template.replacen("{}", label, 1))
}

fn rank(candidates: &[String], entailment_logits: &[f32]) -> Vec<ZeroShotScore> {
    let probs = softmax(entailment_logits);
    let mut scores: Vec<ZeroShotScore> = candidates
        .iter()
        .zip(probs)
        .map(|(label, score)| ZeroShotScore {
            label: label.clone(),
            score,
        })
        .collect();
    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scores
}
