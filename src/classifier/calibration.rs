//! Display-range confidence shaping. These are heuristics layered over the raw
//! model probability, not a statistical calibration.

pub const MIN_CONFIDENCE: f32 = 0.55;
pub const MAX_CONFIDENCE: f32 = 0.90;
pub const CLAIM_PENALTY: f32 = 0.9;

const RECENT_YEARS: &[&str] = &[" 2019", " 2020", " 2021", " 2022", " 2023", " 2024", " 2025"];
const CLAIM_KEYWORDS: &[&str] = &[
    "won by",
    "defeated",
    "champion",
    "world cup",
    "breaking",
    "exclusive",
];

pub fn calibrate(p: f32) -> f32 {
    p.max(MIN_CONFIDENCE).min(MAX_CONFIDENCE)
}

/// 0.9 for text that reads like a specific factual claim, 1.0 otherwise.
pub fn claim_penalty(text: &str) -> f32 {
    let lower = text.to_lowercase();
    let claim_heavy = lower.chars().any(|c| c.is_ascii_digit())
        || RECENT_YEARS.iter().any(|y| lower.contains(y))
        || CLAIM_KEYWORDS.iter().any(|k| lower.contains(k));

    if claim_heavy {
        CLAIM_PENALTY
    } else {
        1.0
    }
}

/// Confidence reported for a model-backed text decision.
pub fn text_confidence(top_probability: f32, text: &str) -> f32 {
    calibrate(top_probability * claim_penalty(text))
}
