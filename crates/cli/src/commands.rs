use std::path::{Path, PathBuf};

use anyhow::Context;
use makbuz_core::Settings;
use makbuz_ocr::{
    evaluate_document, parse_line_items, spawn_intake_watcher, summarize, DocumentEngine,
    DocumentKind, DocumentPipeline, Expectations, FieldRecord, FinalRecord, PassOutput,
    StandardImageProvider,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::KindArg;

#[cfg(feature = "tesseract")]
type Recognizer = makbuz_ocr::TesseractRecognizer;
#[cfg(not(feature = "tesseract"))]
type Recognizer = makbuz_ocr::CommandRecognizer;

#[cfg(feature = "tesseract")]
fn recognizer(settings: &Settings) -> Recognizer {
    makbuz_ocr::TesseractRecognizer::new(None, &settings.pipeline.language)
}

#[cfg(not(feature = "tesseract"))]
fn recognizer(settings: &Settings) -> Recognizer {
    makbuz_ocr::CommandRecognizer::new(settings.pipeline.language.clone())
}

fn pipeline(settings: &Settings) -> anyhow::Result<DocumentPipeline<Recognizer, StandardImageProvider>> {
    let images = StandardImageProvider::new(settings.pipeline.upscale_min_side);
    Ok(DocumentPipeline::new(recognizer(settings), images, settings)?)
}

fn to_json(record: &FinalRecord) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&serde_json::Value::Object(record.to_export()))?)
}

fn read_all(paths: &[PathBuf]) -> anyhow::Result<Vec<String>> {
    paths
        .iter()
        .map(|p| std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display())))
        .collect()
}

/// Each transcript is one pass. Item-only transcripts contribute line items
/// and nothing else.
fn fuse_transcripts(
    settings: &Settings,
    transcripts: &[String],
    kind: KindArg,
    item_transcripts: &[String],
) -> FinalRecord {
    let engine = DocumentEngine::new(settings);
    let kind = match kind {
        KindArg::Auto => engine.classify(transcripts.iter().map(String::as_str)),
        KindArg::Receipt => DocumentKind::Receipt,
        KindArg::Invoice => DocumentKind::Invoice,
    };

    let mut passes: Vec<PassOutput> = transcripts
        .iter()
        .map(|t| engine.extract_pass(t, kind, item_transcripts.is_empty()))
        .collect();
    if kind.is_receipt() {
        passes.extend(item_transcripts.iter().map(|t| PassOutput {
            fields: FieldRecord::new(),
            items: Some(parse_line_items(t)),
        }));
    }
    engine.assemble(kind, &passes)
}

pub fn fuse(settings: &Settings, transcripts: &[PathBuf], kind: KindArg, items_from: &[PathBuf]) -> anyhow::Result<()> {
    let record = fuse_transcripts(settings, &read_all(transcripts)?, kind, &read_all(items_from)?);
    println!("{}", to_json(&record)?);
    Ok(())
}

pub async fn scan(settings: &Settings, image: &Path) -> anyhow::Result<()> {
    let result = pipeline(settings)?
        .process_file(image)
        .await
        .with_context(|| format!("processing {}", image.display()))?;
    println!("{}", to_json(&result.record)?);
    Ok(())
}

pub async fn watch(settings: &Settings, intake_dir: &Path, out: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(intake_dir)?;
    std::fs::create_dir_all(out)?;
    let pipeline = pipeline(settings)?;

    // The channel bridges the notify watcher thread and the async processor.
    let (tx, mut rx) = mpsc::channel::<PathBuf>(64);
    let _watcher = spawn_intake_watcher(intake_dir, tx)?;
    info!("Watching {}", intake_dir.display());

    loop {
        tokio::select! {
            Some(path) = rx.recv() => {
                info!("Processing document: {}", path.display());
                match pipeline.process_file(&path).await {
                    Ok(result) => {
                        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(&result.hash_hex);
                        let dest = out.join(format!("{stem}.json"));
                        match to_json(&result.record).map(|json| std::fs::write(&dest, json)) {
                            Ok(Ok(())) => info!("Record written: {}", dest.display()),
                            Ok(Err(e)) => warn!("Failed to write {}: {e}", dest.display()),
                            Err(e) => warn!("Failed to serialize record: {e}"),
                        }
                    }
                    Err(e) => warn!("Document processing failed for {}: {e}", path.display()),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watcher");
                return Ok(());
            }
        }
    }
}

/// Transcript files of one sample directory, in name order.
fn sample_transcripts(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|e| e == "txt"))
        .collect();
    paths.sort();
    read_all(&paths)
}

pub async fn evaluate(settings: &Settings, expectations: &Path, samples_dir: &Path) -> anyhow::Result<()> {
    let expectations = Expectations::load(expectations)?;
    let mut scanner = None;
    let mut evaluations = Vec::new();

    for (name, expected) in &expectations.documents {
        let sample = samples_dir.join(name);
        let record = if sample.is_dir() {
            fuse_transcripts(settings, &sample_transcripts(&sample)?, KindArg::Auto, &[])
        } else if sample.is_file() {
            if scanner.is_none() {
                scanner = Some(pipeline(settings)?);
            }
            let Some(p) = scanner.as_ref() else { continue };
            p.process_file(&sample).await?.record
        } else {
            warn!("Missing sample: {}", sample.display());
            continue;
        };

        let eval = evaluate_document(name, expected, &record);
        println!("{name}");
        for field in &eval.fields {
            let mark = if field.passed() { "ok  " } else { "FAIL" };
            println!("  {mark} {}: expected '{}', got '{}'", field.key, field.expected, field.predicted);
        }
        evaluations.push(eval);
    }

    println!("\n{}", summarize(&expectations, &evaluations));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use makbuz_core::Money;
    use makbuz_ocr::FieldName;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fuses_transcripts_with_auto_kind() {
        let passes = texts(&["FIS NO: 12\nTOPLAM *145,67", "FIS NO: 12\nTOPLAM *45,67", "TOPLAM *45,67"]);
        let record = fuse_transcripts(&Settings::default(), &passes, KindArg::Auto, &[]);
        assert_eq!(record.kind, DocumentKind::Receipt);
        assert_eq!(record.total(), Some(Money::from_cents(4567)));
    }

    #[test]
    fn explicit_kind_overrides_classification() {
        let passes = texts(&["FIS NO: 12\nKDV ORANI %18\nTOPLAM *10,00"]);
        let record = fuse_transcripts(&Settings::default(), &passes, KindArg::Invoice, &[]);
        assert_eq!(record.kind, DocumentKind::Invoice);
        assert!(record.line_items.is_none());
        assert!(record.fields.contains_key(&FieldName::TaxRate));
    }

    #[test]
    fn item_transcripts_supply_line_items_only() {
        let passes = texts(&["FIS NO: 3\nTOPLAM *10,00"]);
        let items = texts(&["FIS NO: 3\nSIMIT SUSAMLI 01 *10,00\nTOPLAM *99,99"]);
        let record = fuse_transcripts(&Settings::default(), &passes, KindArg::Auto, &items);
        assert_eq!(record.total(), Some(Money::from_cents(1000)));
        assert_eq!(record.line_items.map(|i| i.len()), Some(1));
    }

    #[test]
    fn sample_directories_are_read_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "second").unwrap();
        std::fs::write(dir.path().join("a.txt"), "first").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();
        assert_eq!(sample_transcripts(dir.path()).unwrap(), vec!["first", "second"]);
    }
}
