//! Field-level accuracy against hand-labelled documents.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::types::FinalRecord;

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse expectations: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Expected export values per document, keyed by sample name.
///
/// ```toml
/// [documents."S2.jpg"]
/// "Tarih" = "01.10.2019"
/// "Toplam" = "45.67"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Expectations {
    #[serde(default)]
    pub documents: BTreeMap<String, BTreeMap<String, String>>,
}

impl Expectations {
    pub fn from_toml(content: &str) -> Result<Self, EvaluationError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, EvaluationError> {
        let content = std::fs::read_to_string(path).map_err(|source| EvaluationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    fn field_count(&self) -> usize {
        self.documents.values().map(BTreeMap::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldResult {
    pub key: String,
    pub expected: String,
    pub predicted: String,
}

impl FieldResult {
    pub fn passed(&self) -> bool {
        self.expected == self.predicted
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEvaluation {
    pub name: String,
    pub fields: Vec<FieldResult>,
}

impl DocumentEvaluation {
    pub fn passed(&self) -> bool {
        self.fields.iter().all(FieldResult::passed)
    }

    pub fn correct(&self) -> usize {
        self.fields.iter().filter(|f| f.passed()).count()
    }
}

/// Compares each expected key with the prediction's rendering. Keys the
/// prediction lacks compare as the empty string; explicit nulls as `None`.
pub fn evaluate_document(
    name: &str,
    expected: &BTreeMap<String, String>,
    predicted: &FinalRecord,
) -> DocumentEvaluation {
    let rendered = predicted.export_strings();
    let fields = expected
        .iter()
        .map(|(key, want)| FieldResult {
            key: key.clone(),
            expected: want.trim().to_string(),
            predicted: rendered.get(key).map(|s| s.trim().to_string()).unwrap_or_default(),
        })
        .collect();
    DocumentEvaluation { name: name.to_string(), fields }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub correct: usize,
    /// Expected fields across every labelled document, evaluated or not.
    pub total: usize,
    pub failed_documents: usize,
    pub documents: usize,
    /// Labelled documents that had no sample to evaluate.
    pub missing: Vec<String>,
}

impl Summary {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64 * 100.0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Correct fields: {}/{}", self.correct, self.total)?;
        writeln!(f, "Incorrect fields: {}", self.total - self.correct)?;
        writeln!(f, "Documents with any error: {}/{}", self.failed_documents, self.documents)?;
        if !self.missing.is_empty() {
            writeln!(f, "Missing samples: {}", self.missing.join(", "))?;
        }
        write!(f, "Accuracy: {:.2}%", self.accuracy())
    }
}

pub fn summarize(expectations: &Expectations, evaluations: &[DocumentEvaluation]) -> Summary {
    let missing = expectations
        .documents
        .keys()
        .filter(|name| !evaluations.iter().any(|e| &e.name == *name))
        .cloned()
        .collect();
    Summary {
        correct: evaluations.iter().map(DocumentEvaluation::correct).sum(),
        total: expectations.field_count(),
        failed_documents: evaluations.iter().filter(|e| !e.passed()).count(),
        documents: expectations.documents.len(),
        missing,
    }
}
