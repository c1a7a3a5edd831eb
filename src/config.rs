use std::path::PathBuf;

use tracing::warn;

pub const DEFAULT_IMAGE_MODEL: &str = "prithivMLmods/deepfake-detector-model-v1";
pub const DEFAULT_SENTIMENT_MODEL: &str = "distilbert-base-uncased-finetuned-sst-2-english";
pub const DEFAULT_ZERO_SHOT_MODEL: &str = "MoritzLaurer/DeBERTa-v3-base-mnli-fever-anli";
pub const DEFAULT_TEXT_CLASSIFIER_MODEL: &str = "hamzab/roberta-fake-news-classification";
pub const DEFAULT_ZERO_SHOT_TEMPLATE: &str = "This news is {}.";
pub const DEFAULT_ZERO_SHOT_CANDIDATES: &str = "fake,real";
pub const DEFAULT_FAKE_SYNONYMS: &str =
    "fake,false,fabricated,hoax,misleading,untrue,deceptive,clickbait";
pub const DEFAULT_REAL_SYNONYMS: &str = "real,true,accurate,verified,authentic,reliable,genuine";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Which text strategies the dedicated classifier participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    Classifier,
    Auto,
    Heuristic,
}

impl TextMode {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "classifier" => TextMode::Classifier,
            "auto" => TextMode::Auto,
            "heuristic" => TextMode::Heuristic,
            other => {
                warn!("unrecognized TEXT_MODE '{other}', dedicated classifier disabled");
                TextMode::Heuristic
            }
        }
    }

    pub fn uses_classifier(self) -> bool {
        matches!(self, TextMode::Classifier | TextMode::Auto)
    }
}

/// Fake/real word lists used to fold arbitrary model labels into the binary taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynonymSets {
    pub fake: Vec<String>,
    pub real: Vec<String>,
}

impl Default for SynonymSets {
    fn default() -> Self {
        Self {
            fake: split_list(DEFAULT_FAKE_SYNONYMS, true),
            real: split_list(DEFAULT_REAL_SYNONYMS, true),
        }
    }
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub use_ml: bool,
    pub allow_downloads: bool,
    pub image_model: String,
    pub sentiment_model: String,
    pub zero_shot_model: String,
    pub zero_shot_template: String,
    pub zero_shot_candidates: Vec<String>,
    pub text_classifier_model: Option<String>,
    pub text_mode: TextMode,
    pub synonyms: SynonymSets,
    pub device: String,
    pub model_cache_dir: Option<PathBuf>,
    pub eager_load: bool,
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AppConfig {
    /// Read configuration from the process environment (and `.env`, if loaded).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let text_classifier_model = match lookup("TEXT_CLASSIFIER_MODEL") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v.trim().to_string()),
            None => Some(DEFAULT_TEXT_CLASSIFIER_MODEL.to_string()),
        };

        let text_mode = get("TEXT_MODE")
            .map(|v| TextMode::parse(&v))
            .unwrap_or(if text_classifier_model.is_some() {
                TextMode::Classifier
            } else {
                TextMode::Heuristic
            });

        let port = parse_port(get("PORT").as_deref());

        let max_upload_bytes = get("MAX_UPLOAD_BYTES")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            use_ml: get("USE_HF").map(|v| parse_flag(&v)).unwrap_or(false),
            allow_downloads: get("HF_ALLOW_DOWNLOADS")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            image_model: get("IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.into()),
            sentiment_model: get("TEXT_MODEL").unwrap_or_else(|| DEFAULT_SENTIMENT_MODEL.into()),
            zero_shot_model: get("ZERO_SHOT_MODEL")
                .unwrap_or_else(|| DEFAULT_ZERO_SHOT_MODEL.into()),
            zero_shot_template: get("ZERO_SHOT_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_ZERO_SHOT_TEMPLATE.into()),
            zero_shot_candidates: split_list(
                &lookup("ZERO_SHOT_CANDIDATES")
                    .unwrap_or_else(|| DEFAULT_ZERO_SHOT_CANDIDATES.into()),
                false,
            ),
            text_classifier_model,
            text_mode,
            synonyms: SynonymSets {
                fake: split_list(
                    &get("FAKE_SYNONYMS").unwrap_or_else(|| DEFAULT_FAKE_SYNONYMS.into()),
                    true,
                ),
                real: split_list(
                    &get("REAL_SYNONYMS").unwrap_or_else(|| DEFAULT_REAL_SYNONYMS.into()),
                    true,
                ),
            },
            device: get("MODEL_DEVICE").unwrap_or_else(|| "cpu".into()),
            model_cache_dir: get("MODEL_CACHE_DIR").map(|v| expand_home(v.trim())),
            eager_load: get("EAGER_LOAD_MODELS")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            max_upload_bytes,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Candidate labels for zero-shot scoring; never empty.
    pub fn zero_shot_labels(&self) -> Vec<String> {
        if self.zero_shot_candidates.is_empty() {
            split_list(DEFAULT_ZERO_SHOT_CANDIDATES, false)
        } else {
            self.zero_shot_candidates.clone()
        }
    }
}

/// `PORT` value, falling back to 8000 when unset or unparsable.
pub fn parse_port(raw: Option<&str>) -> u16 {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.parse::<u16>().unwrap_or_else(|_| {
            warn!("invalid PORT '{v}', defaulting to {DEFAULT_PORT}");
            DEFAULT_PORT
        }),
        None => DEFAULT_PORT,
    }
}

/// Anything except an explicit "off" value enables a flag.
pub fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

fn split_list(raw: &str, lowercase: bool) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if lowercase {
                s.to_lowercase()
            } else {
                s.to_string()
            }
        })
        .collect()
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(raw)
}
