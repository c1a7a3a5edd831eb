//! Fine-tune a binary fake/real text classifier and write a checkpoint the
//! service can load through `TEXT_CLASSIFIER_MODEL=<output-dir>`.

use std::path::PathBuf;

use clap::Parser;

use deepfake_ml_service::{
    config::expand_home,
    init_tracing,
    training::{dataset, train, DatasetKind, TrainConfig},
};

#[derive(Parser)]
#[command(name = "train-text-classifier", about = "Fine-tune a fake-news text classifier")]
struct Cli {
    /// Base encoder: hub id or local snapshot directory.
    #[arg(long, default_value = "distilbert-base-uncased")]
    model: String,

    #[arg(long, value_enum, default_value = "liar")]
    dataset: DatasetKind,

    /// Directory holding LIAR's train.tsv, valid.tsv and test.tsv.
    #[arg(long, default_value = "data/liar")]
    data_dir: PathBuf,

    /// LIAR column used as the input text.
    #[arg(long, default_value = "statement")]
    text_column: String,

    #[arg(long, default_value = "models/text-fakenews")]
    output_dir: PathBuf,

    #[arg(long, default_value = "3")]
    epochs: usize,

    #[arg(long, default_value = "16")]
    batch_size: usize,

    #[arg(long, default_value = "5e-5")]
    lr: f64,

    #[arg(long, default_value = "0.01")]
    weight_decay: f64,

    /// Token budget per statement.
    #[arg(long, default_value = "256")]
    max_length: usize,

    #[arg(long, default_value = "42")]
    seed: u64,

    /// `cpu`, `cuda` or `cuda:N`.
    #[arg(long, default_value = "cpu")]
    device: String,

    /// Fetch the base model from the hub when it is not cached.
    #[arg(long)]
    allow_downloads: bool,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let splits = dataset::load(cli.dataset, &cli.data_dir, &cli.text_column, cli.seed);

    let config = TrainConfig {
        model: cli.model,
        output_dir: cli.output_dir,
        epochs: cli.epochs,
        batch_size: cli.batch_size,
        lr: cli.lr,
        weight_decay: cli.weight_decay,
        max_length: cli.max_length,
        seed: cli.seed,
        device: cli.device,
        allow_downloads: cli.allow_downloads,
        cache_dir: dotenvy::var("MODEL_CACHE_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| expand_home(v.trim())),
    };

    println!("🧠 Training {} on {:?} data", config.model, cli.dataset);
    let report = train(&config, &splits)?;

    println!(
        "✅ Best epoch {}: {} -> {}",
        report.best_epoch,
        report.best,
        config.output_dir.display()
    );
    if let Some(test) = report.test {
        println!("🧪 Test split: {test}");
    }
    Ok(())
}
