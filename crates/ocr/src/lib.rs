/// Declares a function returning a lazily compiled, cached `Regex`.
macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static regex::Regex {
            static R: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
            R.get_or_init(|| regex::Regex::new($pat).expect("invalid regex"))
        }
    };
}

pub mod classify;
pub mod date;
pub mod document;
pub mod evaluate;
pub mod extract;
pub mod fusion;
pub mod hash;
pub mod items;
pub mod normalize;
pub mod numeric;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod reconcile;
pub mod types;

pub use classify::{classify_document_kind, combine_votes};
pub use date::repair_date;
pub use document::{assemble, DocumentEngine, PassOutput};
pub use evaluate::{evaluate_document, summarize, DocumentEvaluation, EvaluationError, Expectations, Summary};
pub use extract::{extract_fields, Extractor};
pub use fusion::{fuse_fields, Fuser};
pub use hash::{sha256_bytes, to_hex};
pub use items::parse_line_items;
pub use normalize::normalize;
pub use numeric::parse_amount;
pub use pipeline::{spawn_intake_watcher, DocumentPipeline, DocumentResult, PassTranscript, PipelineError, Scenario};
pub use preprocess::{encode_png, ImageProvider, PreprocessError, StandardImageProvider};
pub use recognizer::{CommandRecognizer, MockRecognizer, OcrBackend, OcrError, RecognitionMode};
pub use reconcile::{closest_sum, most_recurring_sum, reconcile_items};
pub use types::{DocumentKind, FieldName, FieldRecord, FieldValue, FinalRecord, LineItem, TaxRate};

#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
