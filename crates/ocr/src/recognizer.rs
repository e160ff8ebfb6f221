use std::collections::HashMap;
use std::io::Write;
use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("OCR backend not available: {0}")]
    BackendNotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tesseract page segmentation modes used by the recognition passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecognitionMode {
    /// PSM 11: as much text as possible, in no particular order.
    SparseText,
    /// PSM 4: a single column of variable-size text.
    SingleColumn,
    /// PSM 6: a single uniform block of text.
    UniformBlock,
    /// PSM 3: fully automatic page segmentation.
    FullAuto,
}

impl RecognitionMode {
    /// Default pass order.
    pub const ALL: [RecognitionMode; 4] = [
        RecognitionMode::SparseText,
        RecognitionMode::SingleColumn,
        RecognitionMode::UniformBlock,
        RecognitionMode::FullAuto,
    ];

    pub fn psm(self) -> u8 {
        match self {
            RecognitionMode::SparseText => 11,
            RecognitionMode::SingleColumn => 4,
            RecognitionMode::UniformBlock => 6,
            RecognitionMode::FullAuto => 3,
        }
    }
}

impl TryFrom<u8> for RecognitionMode {
    type Error = String;
    fn try_from(psm: u8) -> Result<Self, Self::Error> {
        RecognitionMode::ALL
            .into_iter()
            .find(|m| m.psm() == psm)
            .ok_or_else(|| format!("Unsupported page segmentation mode: {psm}"))
    }
}

/// Abstraction over an OCR backend.
/// Implementations accept PNG bytes and a segmentation hint and return the
/// recognized text. They must be callable from several threads at once.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, png: &[u8], mode: RecognitionMode) -> Result<String, OcrError>;
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns pre-set text, optionally per mode, so the pipeline can be exercised
/// without Tesseract installed.
#[derive(Debug, Clone, Default)]
pub struct MockRecognizer {
    text: String,
    per_mode: HashMap<RecognitionMode, String>,
    fail_modes: Vec<RecognitionMode>,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn with_mode(mut self, mode: RecognitionMode, text: impl Into<String>) -> Self {
        self.per_mode.insert(mode, text.into());
        self
    }

    pub fn failing_on(mut self, mode: RecognitionMode) -> Self {
        self.fail_modes.push(mode);
        self
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _png: &[u8], mode: RecognitionMode) -> Result<String, OcrError> {
        if self.fail_modes.contains(&mode) {
            return Err(OcrError::Engine(format!("mock failure in PSM {}", mode.psm())));
        }
        Ok(self.per_mode.get(&mode).unwrap_or(&self.text).clone())
    }
}

// ── Tesseract CLI backend ─────────────────────────────────────────────────────

/// Runs the `tesseract` executable on a temporary PNG.
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    program: String,
    language: String,
}

impl CommandRecognizer {
    pub fn new(language: impl Into<String>) -> Self {
        Self { program: "tesseract".to_string(), language: language.into() }
    }

    /// Use a tesseract binary that is not on `PATH`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl OcrBackend for CommandRecognizer {
    fn recognize(&self, png: &[u8], mode: RecognitionMode) -> Result<String, OcrError> {
        let mut input = tempfile::Builder::new().suffix(".png").tempfile()?;
        input.write_all(png)?;
        input.flush()?;

        let output = Command::new(&self.program)
            .arg(input.path())
            .arg("stdout")
            .args(["--oem", "3", "--psm", &mode.psm().to_string(), "-l", &self.language])
            .output();

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => Err(OcrError::Engine(format!(
                "{} failed: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(OcrError::BackendNotFound(
                format!("{} not found (install tesseract-ocr)", self.program),
            )),
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{OcrBackend, OcrError, RecognitionMode};
    use leptess::{LepTess, Variable};

    /// In-process Tesseract. A fresh engine is created per call since
    /// `LepTess` is not `Sync`.
    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self { data_path, lang: lang.to_string() }
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, png: &[u8], mode: RecognitionMode) -> Result<String, OcrError> {
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_variable(Variable::TesseditPagesegMode, &mode.psm().to_string())
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_image_from_mem(png)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
        }
    }
}
