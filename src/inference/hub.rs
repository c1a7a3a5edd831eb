use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use hf_hub::{api::sync::ApiBuilder, Cache};
use tracing::debug;

use crate::config::expand_home;

/// Where model files may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    CacheOnly,
    AllowDownload,
}

impl FetchPolicy {
    pub fn from_flag(allow_downloads: bool) -> Self {
        if allow_downloads {
            FetchPolicy::AllowDownload
        } else {
            FetchPolicy::CacheOnly
        }
    }
}

/// Files making up one model snapshot.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub weights: PathBuf,
    pub tokenizer: Option<PathBuf>,
    pub preprocessor: Option<PathBuf>,
}

const WEIGHT_CANDIDATES: &[&str] = &["model.safetensors", "pytorch_model.bin"];

/// Resolves a model id (hub repo or local directory) to files on disk.
#[derive(Debug, Clone)]
pub struct ModelLocator {
    cache_dir: Option<PathBuf>,
    policy: FetchPolicy,
}

impl ModelLocator {
    pub fn new(cache_dir: Option<PathBuf>, policy: FetchPolicy) -> Self {
        Self { cache_dir, policy }
    }

    pub fn policy(&self) -> FetchPolicy {
        self.policy
    }

    /// Same cache root, never touches the network.
    pub fn cache_only(&self) -> Self {
        Self {
            cache_dir: self.cache_dir.clone(),
            policy: FetchPolicy::CacheOnly,
        }
    }

    pub fn resolve(&self, model_id: &str, needs_tokenizer: bool) -> Result<ModelFiles> {
        let local = expand_home(model_id.trim());
        if local.is_dir() {
            debug!("resolving {} from local directory", local.display());
            return resolve_local(&local, needs_tokenizer);
        }

        let fetch = |name: &str| self.fetch(model_id, name);
        let config = fetch("config.json")?;
        let weights = WEIGHT_CANDIDATES
            .iter()
            .find_map(|name| fetch(name).ok())
            .ok_or_else(|| anyhow!("no model weights found for {model_id}"))?;
        let tokenizer = if needs_tokenizer {
            Some(fetch("tokenizer.json")?)
        } else {
            None
        };
        let preprocessor = fetch("preprocessor_config.json").ok();

        Ok(ModelFiles {
            config,
            weights,
            tokenizer,
            preprocessor,
        })
    }

    fn fetch(&self, model_id: &str, filename: &str) -> Result<PathBuf> {
        match self.policy {
            FetchPolicy::CacheOnly => {
                let cache = match &self.cache_dir {
                    Some(dir) => Cache::new(dir.clone()),
                    None => Cache::default(),
                };
                cache
                    .model(model_id.to_string())
                    .get(filename)
                    .ok_or_else(|| anyhow!("{filename} for {model_id} is not in the local cache"))
            }
            FetchPolicy::AllowDownload => {
                let mut builder = ApiBuilder::new().with_progress(false);
                if let Some(dir) = &self.cache_dir {
                    builder = builder.with_cache_dir(dir.clone());
                }
                let api = builder
                    .build()
                    .context("failed to create HF hub client")?;
                api.model(model_id.to_string())
                    .get(filename)
                    .with_context(|| format!("failed to fetch {filename} for {model_id}"))
            }
        }
    }
}

fn resolve_local(dir: &Path, needs_tokenizer: bool) -> Result<ModelFiles> {
    let config = dir.join("config.json");
    if !config.exists() {
        return Err(anyhow!("config.json not found under {}", dir.display()));
    }

    let weights = find_model_weights(dir)
        .ok_or_else(|| anyhow!("no model weights found under {}", dir.display()))?;

    let tokenizer = dir.join("tokenizer.json");
    let tokenizer = if tokenizer.exists() {
        Some(tokenizer)
    } else if needs_tokenizer {
        return Err(anyhow!("tokenizer.json not found under {}", dir.display()));
    } else {
        None
    };

    let preprocessor = Some(dir.join("preprocessor_config.json")).filter(|p| p.exists());

    Ok(ModelFiles {
        config,
        weights,
        tokenizer,
        preprocessor,
    })
}

pub fn find_model_weights(dir: &Path) -> Option<PathBuf> {
    WEIGHT_CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}
