use std::sync::Arc;

use image::DynamicImage;
use tracing::{debug, warn};

use crate::manager::ModelManager;

use super::{Label, Prediction};

pub const EVEN_LENGTH_GUESS: Prediction = Prediction {
    label: Label::Fake,
    confidence: 0.55,
};
pub const ODD_LENGTH_GUESS: Prediction = Prediction {
    label: Label::Real,
    confidence: 0.65,
};

/// Image verdicts: model when available, byte-length parity otherwise.
pub struct ImagePredictor {
    use_ml: bool,
    models: Arc<ModelManager>,
}

impl ImagePredictor {
    pub fn new(use_ml: bool, models: Arc<ModelManager>) -> Self {
        Self { use_ml, models }
    }

    pub fn predict(&self, bytes: &[u8]) -> Prediction {
        let decoded = match image::load_from_memory(bytes) {
            Ok(img) => img,
            Err(err) => {
                debug!(len = bytes.len(), error = %err, "upload is not a decodable image");
                return Prediction::unknown();
            }
        };

        if self.use_ml {
            if let Some(prediction) = self.classify_with_model(&decoded) {
                return prediction;
            }
        }
        parity_guess(bytes.len())
    }

    fn classify_with_model(&self, img: &DynamicImage) -> Option<Prediction> {
        let model = self.models.image()?;
        match model.classify(img) {
            Ok((label, prob)) => {
                debug!(%label, prob, "image classified");
                Some(Prediction::new(image_label(&label), prob))
            }
            Err(err) => {
                warn!(error = %err, "image model failed, using parity guess");
                None
            }
        }
    }
}

/// Only the literal substring "fake" marks a class as Fake.
pub fn image_label(class_name: &str) -> Label {
    if class_name.to_lowercase().contains("fake") {
        Label::Fake
    } else {
        Label::Real
    }
}

/// Not a real signal; keeps the endpoint answering without a model.
pub fn parity_guess(len: usize) -> Prediction {
    if len % 2 == 0 {
        EVEN_LENGTH_GUESS
    } else {
        ODD_LENGTH_GUESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(w, h, Rgb([12, 200, 90]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn predictor() -> ImagePredictor {
        let config = AppConfig::default();
        ImagePredictor::new(config.use_ml, Arc::new(ModelManager::new(&config)))
    }

    #[test]
    fn undecodable_bytes_are_unknown() {
        let p = predictor();
        assert_eq!(p.predict(b"definitely not an image"), Prediction::unknown());
        assert_eq!(p.predict(&[]), Prediction::unknown());
    }

    #[test]
    fn decodable_image_uses_length_parity_without_ml() {
        let bytes = png_bytes(4, 4);
        let expected = if bytes.len() % 2 == 0 {
            EVEN_LENGTH_GUESS
        } else {
            ODD_LENGTH_GUESS
        };
        assert_eq!(predictor().predict(&bytes), expected);
    }

    #[test]
    fn trailing_byte_flips_the_parity_guess() {
        let mut bytes = png_bytes(3, 5);
        let before = predictor().predict(&bytes);
        // PNG decoders ignore data after IEND
        bytes.push(0);
        let after = predictor().predict(&bytes);
        assert_ne!(before, after);
        assert!([EVEN_LENGTH_GUESS, ODD_LENGTH_GUESS].contains(&after));
    }

    #[test]
    fn enabled_ml_without_image_model_uses_parity_guess() {
        let cache = tempfile::tempdir().unwrap();
        let config = AppConfig {
            use_ml: true,
            model_cache_dir: Some(cache.path().to_path_buf()),
            ..AppConfig::default()
        };
        let p = ImagePredictor::new(config.use_ml, Arc::new(ModelManager::new(&config)));

        let mut bytes = png_bytes(4, 4);
        let first = p.predict(&bytes);
        bytes.push(0);
        let second = p.predict(&bytes);

        let mut got = [first, second];
        got.sort_by(|a, b| a.confidence.total_cmp(&b.confidence));
        assert_eq!(got, [EVEN_LENGTH_GUESS, ODD_LENGTH_GUESS]);
        assert_eq!(p.predict(b"still not an image"), Prediction::unknown());
    }

    #[test]
    fn class_names_containing_fake_are_fake() {
        assert_eq!(image_label("Fake"), Label::Fake);
        assert_eq!(image_label("deepfake"), Label::Fake);
        assert_eq!(image_label("Realism"), Label::Real);
        assert_eq!(image_label("hoax"), Label::Real);
    }
}
