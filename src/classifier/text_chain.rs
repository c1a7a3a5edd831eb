use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::manager::ModelManager;

use super::strategies::{
    CachedSentiment, DedicatedClassifier, KeywordHeuristic, ZeroShotNli,
};
use super::{LabelMapper, Prediction};

/// Result of one strategy attempt.
#[derive(Debug)]
pub enum StrategyOutcome {
    Decided(Prediction),
    Skipped(&'static str),
    Failed(anyhow::Error),
}

impl From<anyhow::Result<Prediction>> for StrategyOutcome {
    fn from(result: anyhow::Result<Prediction>) -> Self {
        match result {
            Ok(prediction) => StrategyOutcome::Decided(prediction),
            Err(err) => StrategyOutcome::Failed(err),
        }
    }
}

pub trait TextStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `text` is already trimmed and non-empty.
    fn classify(&self, text: &str) -> StrategyOutcome;
}

/// Ordered strategies ending in the keyword heuristic, which always decides.
pub struct TextPredictor {
    strategies: Vec<Box<dyn TextStrategy>>,
    fallback: KeywordHeuristic,
}

impl TextPredictor {
    pub fn new(strategies: Vec<Box<dyn TextStrategy>>) -> Self {
        Self {
            strategies,
            fallback: KeywordHeuristic,
        }
    }

    pub fn from_config(config: &AppConfig, models: Arc<ModelManager>) -> Self {
        let mapper = Arc::new(LabelMapper::new(config.synonyms.clone()));
        let mut strategies: Vec<Box<dyn TextStrategy>> = Vec::new();

        if config.use_ml {
            if config.text_classifier_model.is_some() && config.text_mode.uses_classifier() {
                strategies.push(Box::new(DedicatedClassifier::new(
                    models.clone(),
                    mapper.clone(),
                )));
            }
            strategies.push(Box::new(ZeroShotNli::new(
                models.clone(),
                mapper,
                config.zero_shot_labels(),
                config.zero_shot_template.clone(),
            )));
            strategies.push(Box::new(CachedSentiment::new(models)));
        }

        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies
            .iter()
            .map(|s| s.name())
            .chain(std::iter::once(self.fallback.name()))
            .collect()
    }

    pub fn predict(&self, raw: &str) -> Prediction {
        let text = raw.trim();
        if text.is_empty() {
            return Prediction::unknown();
        }

        for strategy in &self.strategies {
            match strategy.classify(text) {
                StrategyOutcome::Decided(prediction) => {
                    debug!(strategy = strategy.name(), ?prediction, "text classified");
                    return prediction;
                }
                StrategyOutcome::Skipped(reason) => {
                    debug!(strategy = strategy.name(), reason, "strategy skipped");
                }
                StrategyOutcome::Failed(err) => {
                    warn!(strategy = strategy.name(), error = %err, "strategy failed, falling through");
                }
            }
        }

        self.fallback.predict(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Label;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        outcome: fn() -> StrategyOutcome,
        calls: Arc<AtomicUsize>,
    }

    impl TextStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn classify(&self, _text: &str) -> StrategyOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }
    }

    fn scripted(
        name: &'static str,
        outcome: fn() -> StrategyOutcome,
    ) -> (Box<dyn TextStrategy>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Scripted {
                name,
                outcome,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[test]
    fn first_decided_strategy_wins() {
        let (a, a_calls) = scripted("a", || StrategyOutcome::Skipped("no model"));
        let (b, b_calls) = scripted("b", || {
            StrategyOutcome::Failed(anyhow::anyhow!("shape mismatch"))
        });
        let (c, c_calls) = scripted("c", || {
            StrategyOutcome::Decided(Prediction::new(Label::Fake, 0.8))
        });
        let (d, d_calls) = scripted("d", || {
            StrategyOutcome::Decided(Prediction::new(Label::Real, 0.7))
        });

        let predictor = TextPredictor::new(vec![a, b, c, d]);
        let got = predictor.predict("some claim");

        assert_eq!(got, Prediction::new(Label::Fake, 0.8));
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 1);
        assert_eq!(d_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn exhausted_chain_lands_on_keyword_heuristic() {
        let (a, _) = scripted("a", || StrategyOutcome::Failed(anyhow::anyhow!("boom")));
        let predictor = TextPredictor::new(vec![a]);
        assert_eq!(
            predictor.predict("Shocking celebrity secret"),
            Prediction::new(Label::Fake, 0.6)
        );
        assert_eq!(
            predictor.predict("Council approves budget"),
            Prediction::new(Label::Real, 0.6)
        );
    }

    #[test]
    fn blank_text_short_circuits_before_any_strategy() {
        let (a, calls) = scripted("a", || {
            StrategyOutcome::Decided(Prediction::new(Label::Real, 0.9))
        });
        let predictor = TextPredictor::new(vec![a]);
        for blank in ["", "   ", "\n\t "] {
            assert_eq!(predictor.predict(blank), Prediction::unknown());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn disabled_ml_stack_only_runs_the_heuristic() {
        let config = AppConfig::default();
        let models = Arc::new(ModelManager::new(&config));
        let predictor = TextPredictor::from_config(&config, models);
        assert_eq!(predictor.strategy_names(), vec!["keyword-heuristic"]);
        assert_eq!(
            predictor.predict("BREAKING: shocking news"),
            Prediction::new(Label::Fake, 0.6)
        );
        assert_eq!(
            predictor.predict("The weather is nice today"),
            Prediction::new(Label::Real, 0.6)
        );
    }

    #[test]
    fn enabled_ml_stack_orders_strategies() {
        let config = AppConfig {
            use_ml: true,
            ..AppConfig::default()
        };
        let models = Arc::new(ModelManager::new(&config));
        let predictor = TextPredictor::from_config(&config, models);
        assert_eq!(
            predictor.strategy_names(),
            vec![
                "dedicated-classifier",
                "zero-shot-nli",
                "cached-sentiment",
                "keyword-heuristic"
            ]
        );
    }

    #[test]
    fn enabled_ml_stack_without_models_lands_on_heuristic() {
        let cache = tempfile::tempdir().unwrap();
        let config = AppConfig {
            use_ml: true,
            model_cache_dir: Some(cache.path().to_path_buf()),
            ..AppConfig::default()
        };
        let models = Arc::new(ModelManager::new(&config));
        let predictor = TextPredictor::from_config(&config, models);
        assert_eq!(predictor.strategy_names().len(), 4);
        assert_eq!(
            predictor.predict("BREAKING: shocking news"),
            Prediction::new(Label::Fake, 0.6)
        );
        assert_eq!(
            predictor.predict("The weather is nice today"),
            Prediction::new(Label::Real, 0.6)
        );
    }

    #[test]
    fn heuristic_text_mode_drops_dedicated_classifier() {
        let config = AppConfig {
            use_ml: true,
            text_mode: crate::config::TextMode::Heuristic,
            ..AppConfig::default()
        };
        let models = Arc::new(ModelManager::new(&config));
        let predictor = TextPredictor::from_config(&config, models);
        assert_eq!(predictor.strategy_names()[0], "zero-shot-nli");
    }
}
