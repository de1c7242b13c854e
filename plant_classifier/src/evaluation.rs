use crate::{catalog::LabelCatalog, classifier::Classifier, model_service::ModelService};
use serde::Serialize;
use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Failed to read test directory {0:?}: {1}")]
    ReadDir(PathBuf, std::io::Error),
    #[error("No labelled images found under {0:?}")]
    NoSamples(PathBuf),
}

/// Row-major confusion matrix: `counts[truth][predicted]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    size: usize,
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            counts: vec![0; size * size],
        }
    }

    pub fn record(&mut self, truth: usize, predicted: usize) {
        self.counts[truth * self.size + predicted] += 1;
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u64 {
        self.counts[truth * self.size + predicted]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn correct(&self) -> u64 {
        (0..self.size).map(|i| self.get(i, i)).sum()
    }

    fn support(&self, class: usize) -> u64 {
        (0..self.size).map(|p| self.get(class, p)).sum()
    }

    fn predicted(&self, class: usize) -> u64 {
        (0..self.size).map(|t| self.get(t, class)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub weighted_f1: f64,
    pub evaluated: u64,
    pub skipped: u64,
    pub classes: Vec<ClassMetrics>,
    pub confusion: ConfusionMatrix,
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl EvaluationReport {
    pub fn from_confusion(
        confusion: ConfusionMatrix,
        catalog: &LabelCatalog,
        skipped: u64,
    ) -> Self {
        let classes: Vec<ClassMetrics> = catalog
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let hits = confusion.get(i, i);
                let support = confusion.support(i);
                let precision = ratio(hits, confusion.predicted(i));
                let recall = ratio(hits, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label: label.to_string(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        // Averages only cover classes that appear in the test set.
        let present: Vec<&ClassMetrics> = classes.iter().filter(|c| c.support > 0).collect();
        let mean = |f: fn(&ClassMetrics) -> f64| {
            if present.is_empty() {
                0.0
            } else {
                present.iter().map(|c| f(c)).sum::<f64>() / present.len() as f64
            }
        };
        let total = confusion.total();
        let weighted_f1 = if total == 0 {
            0.0
        } else {
            present.iter().map(|c| c.f1 * c.support as f64).sum::<f64>() / total as f64
        };

        Self {
            accuracy: ratio(confusion.correct(), total),
            macro_precision: mean(|c| c.precision),
            macro_recall: mean(|c| c.recall),
            macro_f1: mean(|c| c.f1),
            weighted_f1,
            evaluated: total,
            skipped,
            classes,
            confusion,
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.label.len())
            .max()
            .unwrap_or(0)
            .max(12);

        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for class in self.classes.iter().filter(|c| c.support > 0) {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                class.label, class.precision, class.recall, class.f1, class.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.evaluated
        )?;
        writeln!(
            f,
            "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            "macro avg", self.macro_precision, self.macro_recall, self.macro_f1, self.evaluated
        )?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "weighted f1", "", "", self.weighted_f1, self.evaluated
        )?;
        write!(f, "skipped: {}", self.skipped)
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, EvaluationError> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| EvaluationError::ReadDir(dir.to_path_buf(), e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    Ok(entries)
}

/// Classifies every image under `test_dir/<label>/` and scores the results.
///
/// Directories that name no catalog label and files that fail to classify
/// are counted as skipped.
pub async fn evaluate_directory<M: ModelService>(
    classifier: &Classifier<M>,
    test_dir: &Path,
) -> Result<EvaluationReport, EvaluationError> {
    let catalog = classifier.catalog();
    let mut confusion = ConfusionMatrix::new(catalog.len());
    let mut skipped = 0u64;

    for class_dir in sorted_entries(test_dir)?.into_iter().filter(|p| p.is_dir()) {
        let name = class_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let files: Vec<PathBuf> = sorted_entries(&class_dir)?
            .into_iter()
            .filter(|p| p.is_file())
            .collect();

        let Some(truth) = catalog.index_of(&name) else {
            tracing::warn!("Skipping {} files in unknown class directory {}", files.len(), name);
            skipped += files.len() as u64;
            continue;
        };

        for file in files {
            let image_data = match fs::read(&file) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!("Failed to read {:?}: {}", file, e);
                    skipped += 1;
                    continue;
                }
            };

            match classifier.classify(&image_data).await {
                Ok(prediction) => confusion.record(truth, prediction.index),
                Err(e) => {
                    tracing::warn!("Failed to classify {:?}: {}", file, e);
                    skipped += 1;
                }
            }
        }

        tracing::info!("Evaluated class {}", name);
    }

    if confusion.total() == 0 {
        return Err(EvaluationError::NoSamples(test_dir.to_path_buf()));
    }

    Ok(EvaluationReport::from_confusion(confusion, catalog, skipped))
}
