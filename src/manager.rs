use std::sync::Arc;

use anyhow::Result;
use candle::Device;
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::inference::{
    select_device, FetchPolicy, ModelLocator, SequenceClassifier, SiglipImageClassifier,
    ZeroShotClassifier,
};

/// Owns every model handle. Each handle is built at most once per process,
/// the first time something asks for it; a failed load is remembered and the
/// caller treats the model as unavailable from then on.
pub struct ModelManager {
    locator: ModelLocator,
    device: Device,
    text_classifier_id: Option<String>,
    zero_shot_id: String,
    sentiment_id: String,
    image_id: String,
    text_classifier: OnceCell<Option<Arc<SequenceClassifier>>>,
    zero_shot: OnceCell<Option<Arc<ZeroShotClassifier>>>,
    sentiment: OnceCell<Option<Arc<SequenceClassifier>>>,
    image: OnceCell<Option<Arc<SiglipImageClassifier>>>,
}

impl ModelManager {
    pub fn new(config: &AppConfig) -> Self {
        let locator = ModelLocator::new(
            config.model_cache_dir.clone(),
            FetchPolicy::from_flag(config.allow_downloads),
        );
        Self {
            locator,
            device: select_device(&config.device),
            text_classifier_id: config.text_classifier_model.clone(),
            zero_shot_id: config.zero_shot_model.clone(),
            sentiment_id: config.sentiment_model.clone(),
            image_id: config.image_model.clone(),
            text_classifier: OnceCell::new(),
            zero_shot: OnceCell::new(),
            sentiment: OnceCell::new(),
            image: OnceCell::new(),
        }
    }

    pub fn text_classifier(&self) -> Option<Arc<SequenceClassifier>> {
        let model_id = self.text_classifier_id.as_deref()?;
        load_once(&self.text_classifier, "text classifier", model_id, || {
            let files = self.locator.resolve(model_id, true)?;
            SequenceClassifier::load(&files, &self.device)
        })
    }

    pub fn zero_shot(&self) -> Option<Arc<ZeroShotClassifier>> {
        let model_id = self.zero_shot_id.as_str();
        load_once(&self.zero_shot, "zero-shot classifier", model_id, || {
            let files = self.locator.resolve(model_id, true)?;
            ZeroShotClassifier::load(&files, &self.device)
        })
    }

    /// Never downloads, whatever the download policy says.
    pub fn sentiment(&self) -> Option<Arc<SequenceClassifier>> {
        let model_id = self.sentiment_id.as_str();
        load_once(&self.sentiment, "sentiment model", model_id, || {
            let files = self.locator.cache_only().resolve(model_id, true)?;
            SequenceClassifier::load(&files, &self.device)
        })
    }

    pub fn image(&self) -> Option<Arc<SiglipImageClassifier>> {
        let model_id = self.image_id.as_str();
        load_once(&self.image, "image classifier", model_id, || {
            let files = self.locator.resolve(model_id, false)?;
            SiglipImageClassifier::load(&files, &self.device)
        })
    }

    /// Load every handle up front instead of on the first request.
    pub fn warm_up(&self) {
        let loaded = [
            self.text_classifier().is_some(),
            self.zero_shot().is_some(),
            self.sentiment().is_some(),
            self.image().is_some(),
        ];
        let ready = loaded.iter().filter(|ok| **ok).count();
        info!("model warm-up finished: {ready}/{} handles available", loaded.len());
    }
}

fn load_once<T, F>(
    cell: &OnceCell<Option<Arc<T>>>,
    what: &str,
    model_id: &str,
    loader: F,
) -> Option<Arc<T>>
where
    F: FnOnce() -> Result<T>,
{
    cell.get_or_init(|| match loader() {
        Ok(model) => {
            info!(model = model_id, "loaded {what}");
            Some(Arc::new(model))
        }
        Err(err) => {
            warn!(model = model_id, error = %err, "{what} unavailable");
            None
        }
    })
    .clone()
}
