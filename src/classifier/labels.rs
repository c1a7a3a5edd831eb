use std::collections::BTreeMap;

use crate::config::SynonymSets;

use super::Label;

/// Folds model-card-specific class names into Real/Fake by substring match.
#[derive(Debug, Clone, Default)]
pub struct LabelMapper {
    synonyms: SynonymSets,
}

impl LabelMapper {
    pub fn new(synonyms: SynonymSets) -> Self {
        Self { synonyms }
    }

    pub fn is_fake(&self, label: &str) -> bool {
        contains_any(&label.to_lowercase(), &self.synonyms.fake)
    }

    pub fn is_real(&self, label: &str) -> bool {
        contains_any(&label.to_lowercase(), &self.synonyms.real)
    }

    /// Fake wins over real; labels matching neither list are treated as Real.
    pub fn map(&self, label: &str) -> Label {
        if self.is_fake(label) {
            Label::Fake
        } else {
            // unmatched labels fall through to Real as well
            Label::Real
        }
    }

    /// Returns `(fake_idx, real_idx)` for a classifier's `id2label` table.
    ///
    /// The first index (ascending) matching each synonym list wins. A side with
    /// no match falls back to 0 (fake) or 1 (real).
    pub fn resolve_indices(&self, id2label: &BTreeMap<usize, String>) -> (usize, usize) {
        let fake_idx = id2label
            .iter()
            .find(|(_, label)| self.is_fake(label))
            .map(|(idx, _)| *idx);
        let real_idx = id2label
            .iter()
            .find(|(_, label)| self.is_real(label))
            .map(|(idx, _)| *idx);

        (fake_idx.unwrap_or(0), real_idx.unwrap_or(1))
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}
