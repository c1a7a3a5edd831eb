pub mod calibration;
pub mod image;
pub mod labels;
pub mod strategies;
pub mod text_chain;

use serde::Serialize;

pub use self::image::ImagePredictor;
pub use labels::LabelMapper;
pub use text_chain::TextPredictor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Label {
    Real,
    Fake,
    Unknown,
}

/// What both prediction endpoints return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub label: Label,
    pub confidence: f32,
}

impl Prediction {
    pub fn new(label: Label, confidence: f32) -> Self {
        Self { label, confidence }
    }

    pub fn unknown() -> Self {
        Self::new(Label::Unknown, 0.0)
    }
}
