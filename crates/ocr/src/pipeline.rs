use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use makbuz_core::Settings;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::document::{DocumentEngine, PassOutput};
use crate::hash;
use crate::preprocess::{encode_png, ImageProvider, PreprocessError};
use crate::recognizer::{OcrBackend, OcrError, RecognitionMode};
use crate::types::FinalRecord;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("Invalid pipeline configuration: {0}")]
    Config(String),
}

/// One way of preparing the image before recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scenario {
    pub crop: bool,
    pub preprocess: bool,
}

impl Scenario {
    pub const RAW: Scenario = Scenario { crop: false, preprocess: false };

    /// Every scenario, in pass order.
    pub const ALL: [Scenario; 4] = [
        Scenario::RAW,
        Scenario { crop: false, preprocess: true },
        Scenario { crop: true, preprocess: false },
        Scenario { crop: true, preprocess: true },
    ];

    /// 1-based number used in artifact names.
    pub fn iteration(self) -> u8 {
        u8::from(self.crop) * 2 + u8::from(self.preprocess) + 1
    }

    /// The raw scenario always runs.
    fn enabled(crop: bool, preprocess: bool) -> Vec<Scenario> {
        Self::ALL
            .into_iter()
            .filter(|s| (!s.crop || crop) && (!s.preprocess || preprocess))
            .collect()
    }
}

/// Raw text of one successful recognition pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassTranscript {
    pub scenario: Scenario,
    pub mode: RecognitionMode,
    pub text: String,
}

/// The result of processing one document.
#[derive(Debug)]
pub struct DocumentResult {
    /// SHA-256 hex digest of the input bytes.
    pub hash_hex: String,
    pub record: FinalRecord,
    /// Successful passes, in scenario then mode order.
    pub transcripts: Vec<PassTranscript>,
}

/// Orchestrates: hash → decode → classify → prepare scenarios → recognize
/// every (scenario, mode) pass concurrently → extract → assemble.
pub struct DocumentPipeline<R, P> {
    recognizer: Arc<R>,
    images: Arc<P>,
    engine: DocumentEngine,
    modes: Vec<RecognitionMode>,
    item_modes_exclude: Vec<RecognitionMode>,
    scenarios: Vec<Scenario>,
    artifacts_dir: Option<PathBuf>,
}

impl<R, P> DocumentPipeline<R, P>
where
    R: OcrBackend + 'static,
    P: ImageProvider + 'static,
{
    pub fn new(recognizer: R, images: P, settings: &Settings) -> Result<Self, PipelineError> {
        let to_modes = |psms: &[u8]| -> Result<Vec<RecognitionMode>, PipelineError> {
            psms.iter()
                .map(|&p| RecognitionMode::try_from(p).map_err(PipelineError::Config))
                .collect()
        };
        let p = &settings.pipeline;
        Ok(Self {
            recognizer: Arc::new(recognizer),
            images: Arc::new(images),
            engine: DocumentEngine::new(settings),
            modes: to_modes(&p.modes)?,
            item_modes_exclude: to_modes(&p.item_modes_exclude)?,
            scenarios: Scenario::enabled(p.crop, p.preprocess),
            artifacts_dir: p.artifacts_dir.clone(),
        })
    }

    /// Process an image file on disk. The hash covers the file bytes; the
    /// image itself comes from the provider's `load`.
    pub async fn process_file(&self, path: &Path) -> Result<DocumentResult, PipelineError> {
        let bytes = tokio::fs::read(path).await?;
        let hash_hex = hash::to_hex(&hash::sha256_bytes(&bytes));

        let images = Arc::clone(&self.images);
        let owned = path.to_path_buf();
        let raw = tokio::task::spawn_blocking(move || images.load(&owned))
            .await
            .map_err(|e| PipelineError::Io(std::io::Error::other(e)))??;
        self.process_image(hash_hex, raw).await
    }

    /// Process encoded image bytes (PNG / JPEG / TIFF / …).
    pub async fn process_bytes(&self, data: &[u8]) -> Result<DocumentResult, PipelineError> {
        let hash_hex = hash::to_hex(&hash::sha256_bytes(data));
        let raw = self.images.decode(data)?;
        self.process_image(hash_hex, raw).await
    }

    async fn process_image(&self, hash_hex: String, raw: DynamicImage) -> Result<DocumentResult, PipelineError> {
        let raw_png = Arc::new(encode_png(&raw)?);

        // Kind is decided on the raw image; those transcripts double as the
        // raw scenario's passes.
        let raw_jobs = self.modes.iter().map(|&m| (Scenario::RAW, Arc::clone(&raw_png), m)).collect();
        let raw_passes = self.recognize_all(raw_jobs).await;
        let kind = self.engine.classify(raw_passes.iter().map(|p| p.text.as_str()));
        debug!(hash = %&hash_hex[..12], %kind, "document classified");

        let mut jobs = Vec::new();
        for &scenario in self.scenarios.iter().filter(|s| **s != Scenario::RAW) {
            let png = match self.prepare(&raw, scenario).await {
                Ok(png) => Arc::new(png),
                Err(e) => {
                    warn!(iteration = scenario.iteration(), error = %e, "scenario skipped");
                    continue;
                }
            };
            jobs.extend(self.modes.iter().map(|&m| (scenario, Arc::clone(&png), m)));
        }

        let mut transcripts = raw_passes;
        transcripts.extend(self.recognize_all(jobs).await);

        let passes: Vec<PassOutput> = transcripts
            .iter()
            .map(|t| {
                let for_items = !self.item_modes_exclude.contains(&t.mode);
                self.engine.extract_pass(&t.text, kind, for_items)
            })
            .collect();

        if let Some(base) = &self.artifacts_dir {
            if let Err(e) = write_artifacts(base, &hash_hex, &transcripts).await {
                warn!(error = %e, "failed to write transcript artifacts");
            }
        }

        let record = self.engine.assemble(kind, &passes);
        info!(
            hash = %&hash_hex[..12],
            %kind,
            passes = passes.len(),
            missing = record.missing_mandatory().len(),
            "document processed"
        );

        Ok(DocumentResult { hash_hex, record, transcripts })
    }

    async fn prepare(&self, raw: &DynamicImage, scenario: Scenario) -> Result<Vec<u8>, PipelineError> {
        let images = Arc::clone(&self.images);
        let raw = raw.clone();
        let prepared = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, PreprocessError> {
            let img = if scenario.crop { images.crop(&raw)? } else { raw };
            let img = if scenario.preprocess { images.preprocess(&img)? } else { img };
            encode_png(&img)
        })
        .await
        .map_err(|e| PipelineError::Io(std::io::Error::other(e)))??;
        Ok(prepared)
    }

    /// Runs every job on the blocking pool. Failed passes are logged and
    /// dropped; the rest come back in job order.
    async fn recognize_all(&self, jobs: Vec<(Scenario, Arc<Vec<u8>>, RecognitionMode)>) -> Vec<PassTranscript> {
        let mut set = JoinSet::new();
        for (index, (scenario, png, mode)) in jobs.into_iter().enumerate() {
            let recognizer = Arc::clone(&self.recognizer);
            set.spawn_blocking(move || {
                let text: Result<String, OcrError> = recognizer.recognize(&png, mode);
                (index, scenario, mode, text)
            });
        }

        let mut done = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, scenario, mode, Ok(text))) => {
                    done.push((index, PassTranscript { scenario, mode, text }));
                }
                Ok((_, scenario, mode, Err(e))) => {
                    warn!(iteration = scenario.iteration(), psm = mode.psm(), error = %e, "recognition pass failed");
                }
                Err(e) => warn!(error = %e, "recognition task aborted"),
            }
        }
        done.sort_by_key(|(index, _)| *index);
        done.into_iter().map(|(_, t)| t).collect()
    }
}

async fn write_artifacts(base: &Path, hash_hex: &str, transcripts: &[PassTranscript]) -> std::io::Result<()> {
    let dir = hash::artifact_dir(base, hash_hex);
    tokio::fs::create_dir_all(&dir).await?;
    for t in transcripts {
        let name = hash::artifact_file_name(t.scenario.iteration(), t.mode);
        tokio::fs::write(dir.join(name), &t.text).await?;
    }
    Ok(())
}

// ── Watch-folder integration ──────────────────────────────────────────────────

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "webp"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Spawn a notify watcher on `watch_dir` that sends new image paths to `tx`.
/// Returns the watcher, which must be kept alive for watching to continue.
pub fn spawn_intake_watcher(
    watch_dir: &Path,
    tx: mpsc::Sender<PathBuf>,
) -> notify::Result<impl notify::Watcher> {
    use notify::{EventKind, RecursiveMode, Watcher};

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        if let Ok(ev) = event {
            if matches!(ev.kind, EventKind::Create(_)) {
                for path in ev.paths.into_iter().filter(|p| is_image(p)) {
                    let _ = tx.try_send(path);
                }
            }
        }
    })?;

    watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
