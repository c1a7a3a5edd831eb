use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::{info, warn};

pub const FAKE: u32 = 0;
pub const REAL: u32 = 1;

const FAKE_LABELS: &[&str] = &["pants-fire", "false", "barely-true", "fake"];
const REAL_LABELS: &[&str] = &["half-true", "mostly-true", "true", "real"];
/// LIAR's integer encoding of its six truthfulness classes.
const LIAR_CLASSES: &[&str] = &[
    "pants-fire",
    "false",
    "barely-true",
    "half-true",
    "mostly-true",
    "true",
];
const LIAR_COLUMNS: &[&str] = &[
    "id",
    "label",
    "statement",
    "subject",
    "speaker",
    "job_title",
    "state_info",
    "party_affiliation",
    "barely_true_counts",
    "false_counts",
    "half_true_counts",
    "mostly_true_counts",
    "pants_on_fire_counts",
    "context",
];

const SAMPLE: &[(&str, &str)] = &[
    ("The government approved a new education budget.", "true"),
    ("NASA confirms water found on Mars in 2020.", "true"),
    ("The vaccine contains microchips to track people.", "false"),
    ("5G towers cause COVID-19 symptoms.", "false"),
    ("Local council launches free community health program.", "true"),
    ("Drinking bleach cures viral infections.", "false"),
    ("The unemployment rate decreased this quarter.", "true"),
    ("Celebrity endorses miracle cure for cancer.", "false"),
    ("A new tax credit supports small businesses.", "true"),
    ("Eating chocolate daily results in 50% weight loss.", "false"),
    ("City introduces electric buses to reduce emissions.", "true"),
    ("Climate change was invented as a hoax.", "false"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DatasetKind {
    /// LIAR TSV files, falling back to the built-in sample when missing.
    Liar,
    /// Twelve built-in statements.
    Sample,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    pub text: String,
    pub label: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Splits {
    pub train: Vec<Example>,
    pub validation: Vec<Example>,
    pub test: Vec<Example>,
}

impl Splits {
    /// Validation split, or the test split when validation is empty.
    pub fn eval_set(&self) -> &[Example] {
        if self.validation.is_empty() {
            &self.test
        } else {
            &self.validation
        }
    }
}

/// Fold a six-way truthfulness label (name or 0-5 integer) into Fake/Real.
/// Anything unrecognised counts as Fake.
pub fn collapse_label(raw: &str) -> u32 {
    let lower = raw.trim().to_lowercase();
    let name = match lower.parse::<usize>() {
        Ok(idx) => match LIAR_CLASSES.get(idx) {
            Some(name) => *name,
            None => return FAKE,
        },
        Err(_) => lower.as_str(),
    };

    if FAKE_LABELS.contains(&name) {
        FAKE
    } else if REAL_LABELS.contains(&name) {
        REAL
    } else {
        FAKE
    }
}

pub fn sample_examples() -> Vec<Example> {
    SAMPLE
        .iter()
        .map(|(text, label)| Example {
            text: text.to_string(),
            label: collapse_label(label),
        })
        .collect()
}

/// 60/20/20 split after a seeded shuffle; held-out sizes round up.
pub fn split_examples(mut examples: Vec<Example>, seed: u64) -> Splits {
    let mut rng = StdRng::seed_from_u64(seed);
    examples.shuffle(&mut rng);

    let held_out = (examples.len() as f64 * 0.4).ceil() as usize;
    let mut rest = examples.split_off(examples.len() - held_out);
    let test_len = (rest.len() as f64 * 0.5).ceil() as usize;
    let test = rest.split_off(rest.len() - test_len);

    Splits {
        train: examples,
        validation: rest,
        test,
    }
}

pub fn liar_column_index(name: &str) -> Result<usize> {
    LIAR_COLUMNS
        .iter()
        .position(|c| c.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| anyhow!("unknown LIAR column '{name}'"))
}

/// Rows of one LIAR TSV file. Short or blank rows are skipped.
pub fn parse_liar_tsv(raw: &str, text_column: usize) -> Vec<Example> {
    raw.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            let label = cols.get(1)?;
            let text = cols.get(text_column)?.trim();
            if text.is_empty() {
                return None;
            }
            Some(Example {
                text: text.to_string(),
                label: collapse_label(label),
            })
        })
        .collect()
}

/// `train.tsv`, `valid.tsv` and `test.tsv` under `dir`.
pub fn load_liar(dir: &Path, text_column: &str) -> Result<Splits> {
    let column = liar_column_index(text_column)?;
    let read = |file: &str| -> Result<Vec<Example>> {
        let path = dir.join(file);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(parse_liar_tsv(&raw, column))
    };

    let splits = Splits {
        train: read("train.tsv")?,
        validation: read("valid.tsv")?,
        test: read("test.tsv")?,
    };
    if splits.train.is_empty() {
        return Err(anyhow!("{} has no usable training rows", dir.display()));
    }
    Ok(splits)
}

pub fn load(kind: DatasetKind, data_dir: &Path, text_column: &str, seed: u64) -> Splits {
    let splits = match kind {
        DatasetKind::Liar => match load_liar(data_dir, text_column) {
            Ok(splits) => splits,
            Err(err) => {
                warn!(error = %err, "LIAR dataset unavailable, using built-in sample");
                split_examples(sample_examples(), seed)
            }
        },
        DatasetKind::Sample => split_examples(sample_examples(), seed),
    };
    info!(
        train = splits.train.len(),
        validation = splits.validation.len(),
        test = splits.test.len(),
        "dataset ready"
    );
    splits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_way_labels_collapse_to_binary() {
        for fake in ["pants-fire", "false", "barely-true", "fake", "FALSE"] {
            assert_eq!(collapse_label(fake), FAKE, "{fake}");
        }
        for real in ["half-true", "mostly-true", "true", "real", " True "] {
            assert_eq!(collapse_label(real), REAL, "{real}");
        }
    }

    #[test]
    fn integer_labels_follow_liar_order() {
        let got: Vec<u32> = (0..6).map(|i| collapse_label(&i.to_string())).collect();
        assert_eq!(got, vec![FAKE, FAKE, FAKE, REAL, REAL, REAL]);
        assert_eq!(collapse_label("9"), FAKE);
        assert_eq!(collapse_label("satire"), FAKE);
    }

    #[test]
    fn sample_set_is_balanced() {
        let examples = sample_examples();
        assert_eq!(examples.len(), 12);
        assert_eq!(examples.iter().filter(|e| e.label == REAL).count(), 6);
    }

    #[test]
    fn sample_split_is_deterministic_and_complete() {
        let a = split_examples(sample_examples(), 42);
        let b = split_examples(sample_examples(), 42);
        assert_eq!(a.train, b.train);
        assert_eq!((a.train.len(), a.validation.len(), a.test.len()), (7, 2, 3));

        let mut all: Vec<String> = a
            .train
            .iter()
            .chain(&a.validation)
            .chain(&a.test)
            .map(|e| e.text.clone())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 12);
    }

    #[test]
    fn liar_rows_use_label_and_statement_columns() {
        let raw = "2635.json\tfalse\tSays the Annies List political group supports abortion.\tabortion\n\
                   10540.json\thalf-true\tWhen did the decline of coal start?\tenergy\n\
                   broken-row\n\
                   1.json\ttrue\t   \tempty\n";
        let rows = parse_liar_tsv(raw, liar_column_index("statement").unwrap());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, FAKE);
        assert_eq!(rows[1].label, REAL);
        assert!(rows[1].text.starts_with("When did"));
    }

    #[test]
    fn missing_liar_directory_falls_back_to_sample() {
        let splits = load(
            DatasetKind::Liar,
            Path::new("definitely/not/here"),
            "statement",
            42,
        );
        assert_eq!(
            splits.train.len() + splits.validation.len() + splits.test.len(),
            12
        );
        assert!(liar_column_index("nope").is_err());
    }
}
