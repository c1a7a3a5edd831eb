//! Accuracy and support-weighted F1 over integer class predictions.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalMetrics {
    pub accuracy: f64,
    pub f1_weighted: f64,
    pub support: usize,
}

/// Per-class F1 weighted by how often each class occurs in `labels`.
/// Undefined precision or recall counts as zero.
pub fn evaluate(predictions: &[u32], labels: &[u32]) -> EvalMetrics {
    let n = predictions.len().min(labels.len());
    if n == 0 {
        return EvalMetrics {
            accuracy: 0.0,
            f1_weighted: 0.0,
            support: 0,
        };
    }

    let pairs = || predictions.iter().zip(labels).take(n);
    let correct = pairs().filter(|(p, l)| p == l).count();

    let mut support: BTreeMap<u32, usize> = BTreeMap::new();
    for &label in labels.iter().take(n) {
        *support.entry(label).or_default() += 1;
    }

    let mut f1_weighted = 0.0;
    for (&class, &class_support) in &support {
        let tp = pairs().filter(|(p, l)| **p == class && **l == class).count();
        let predicted = pairs().filter(|(p, _)| **p == class).count();

        let precision = ratio(tp, predicted);
        let recall = ratio(tp, class_support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        f1_weighted += f1 * class_support as f64 / n as f64;
    }

    EvalMetrics {
        accuracy: correct as f64 / n as f64,
        f1_weighted,
        support: n,
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl std::fmt::Display for EvalMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "acc={:.4} f1_weighted={:.4} (n={})",
            self.accuracy, self.f1_weighted, self.support
        )
    }
}
