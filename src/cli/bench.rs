//! Benchmark command: run the configured engines against local files.

use std::path::{Path, PathBuf};

use chrono::Utc;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::config::Settings;
use crate::models::{Document, EngineKind, FileType, OcrResult};
use crate::orchestrator::OrchestratorError;

use super::build_runtime;

/// Per-engine row of a benchmark report.
#[derive(Debug, Serialize)]
struct EngineReport {
    engine: EngineKind,
    success: bool,
    confidence: Option<f64>,
    processing_time_ms: u64,
    estimated_cost: Option<f64>,
    chars_per_second: f64,
    text_length: usize,
    error: Option<String>,
}

impl EngineReport {
    fn from_result(result: &OcrResult) -> Self {
        Self {
            engine: result.engine,
            success: result.is_success(),
            confidence: result.confidence_score,
            processing_time_ms: result.processing_time_ms,
            estimated_cost: result.estimated_cost,
            chars_per_second: result.chars_per_second(),
            text_length: result.extracted_text.as_deref().map(str::len).unwrap_or(0),
            error: result.error_message.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FileReport {
    file: PathBuf,
    document_id: String,
    completed: bool,
    recommendation: Option<String>,
    engines: Vec<EngineReport>,
}

#[derive(Debug, Serialize)]
struct BenchReport {
    generated_at: chrono::DateTime<Utc>,
    language: String,
    files: Vec<FileReport>,
}

pub async fn cmd_bench(
    settings: &Settings,
    path: &Path,
    engines_str: Option<&str>,
    output: Option<PathBuf>,
    limit: usize,
) -> anyhow::Result<()> {
    let files = collect_files(path, limit)?;
    if files.is_empty() {
        anyhow::bail!("No PDF or image files found at {}", path.display());
    }

    let engines = match engines_str {
        Some(names) => parse_engines(names)?,
        None => settings.default_engines()?,
    };

    std::fs::create_dir_all(&settings.data_dir)?;
    let (orchestrator, gateway, publisher) = build_runtime(settings)?;
    let options = settings.run_options();

    eprintln!(
        "Benchmarking {} file(s) with {} engine(s)...",
        files.len(),
        engines.len()
    );

    let mut report = BenchReport {
        generated_at: Utc::now(),
        language: settings.language.clone(),
        files: Vec::new(),
    };

    for file in &files {
        let Some(file_type) = FileType::from_path(file) else {
            eprintln!(
                "  {} skipping unsupported file: {}",
                style("!").yellow(),
                file.display()
            );
            continue;
        };
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        let document = Document::new(filename.clone(), file_type, file.clone());
        let document_id = document.id.clone();
        gateway.save_document(&document).await?;

        // Progress bar fed by the run's own event stream.
        let mut subscription = publisher.subscribe(&document_id).await;
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
                .unwrap()
                .progress_chars("█▓░"),
        );
        pb.set_message(filename.clone());
        let pb_task = {
            let pb = pb.clone();
            tokio::spawn(async move {
                while let Some(event) = subscription.next_event().await {
                    pb.set_position(event.percentage.round() as u64);
                    pb.set_message(event.message.clone());
                    if event.is_final() {
                        break;
                    }
                }
            })
        };

        let handle = orchestrator
            .submit(&document_id, engines.clone(), options)
            .await?;
        let outcome = handle.wait().await;
        let _ = pb_task.await;
        pb.finish_and_clear();

        let completed = match outcome {
            Ok(_) => true,
            Err(OrchestratorError::AllEnginesFailed { .. }) => false,
            Err(e) => return Err(e.into()),
        };

        let stored = gateway.ocr_results(&document_id).await?;
        let refreshed = gateway
            .load_document(&document_id)
            .await?
            .unwrap_or(document);

        print_file_summary(&filename, &stored, refreshed.recommendation.as_deref());
        report.files.push(FileReport {
            file: file.clone(),
            document_id,
            completed,
            recommendation: refreshed.recommendation,
            engines: stored.iter().map(EngineReport::from_result).collect(),
        });
    }

    let output_dir = output.unwrap_or_else(|| settings.reports_dir());
    let (json_path, csv_path) = write_reports(&output_dir, &report)?;
    println!(
        "{} Reports written to {} and {}",
        style("✓").green(),
        json_path.display(),
        csv_path.display()
    );
    Ok(())
}

/// Files to benchmark: the path itself, or the supported files directly
/// inside it, name-sorted.
fn collect_files(path: &Path, limit: usize) -> anyhow::Result<Vec<PathBuf>> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && FileType::from_path(p).is_some())
        .collect();
    files.sort();
    if limit > 0 {
        files.truncate(limit);
    }
    Ok(files)
}

fn parse_engines(names: &str) -> anyhow::Result<Vec<EngineKind>> {
    let mut engines = Vec::new();
    for name in names.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind = EngineKind::from_str(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown engine: {}", name))?;
        if !engines.contains(&kind) {
            engines.push(kind);
        }
    }
    if engines.is_empty() {
        anyhow::bail!("No engines specified");
    }
    Ok(engines)
}

fn print_file_summary(filename: &str, results: &[OcrResult], recommendation: Option<&str>) {
    println!("\n{}", style(filename).bold());
    println!(
        "  {:<12} {:>6} {:>10} {:>9} {:>10}",
        "engine", "conf", "time", "cost", "chars/s"
    );
    for result in results {
        if result.is_success() {
            println!(
                "  {:<12} {:>5.1}% {:>8}ms {:>9} {:>10.0}",
                result.engine.as_str(),
                result.confidence_score.unwrap_or(0.0) * 100.0,
                result.processing_time_ms,
                result
                    .estimated_cost
                    .map(|c| format!("${:.4}", c))
                    .unwrap_or_else(|| "-".to_string()),
                result.chars_per_second(),
            );
        } else {
            println!(
                "  {:<12} {}",
                result.engine.as_str(),
                style(result.error_message.as_deref().unwrap_or("failed")).red()
            );
        }
    }
    match recommendation {
        Some(text) => println!("  {}", style(text).green()),
        None => println!("  {}", style("No engine succeeded").red()),
    }
}

/// Write the full JSON report and a flat CSV summary, timestamped.
fn write_reports(dir: &Path, report: &BenchReport) -> anyhow::Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;
    let stamp = report.generated_at.format("%Y%m%d-%H%M%S");
    let json_path = dir.join(format!("bench-{}.json", stamp));
    let csv_path = dir.join(format!("bench-{}.csv", stamp));

    std::fs::write(&json_path, serde_json::to_string_pretty(report)?)?;

    let mut csv = String::from(
        "file,engine,success,confidence,processing_time_ms,estimated_cost,chars_per_second,text_length,error\n",
    );
    for file in &report.files {
        for engine in &file.engines {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{:.1},{},{}\n",
                file.file.display(),
                engine.engine,
                engine.success,
                engine
                    .confidence
                    .map(|c| format!("{:.4}", c))
                    .unwrap_or_default(),
                engine.processing_time_ms,
                engine
                    .estimated_cost
                    .map(|c| format!("{:.6}", c))
                    .unwrap_or_default(),
                engine.chars_per_second,
                engine.text_length,
                engine
                    .error
                    .as_deref()
                    .map(|e| e.replace(',', ";"))
                    .unwrap_or_default(),
            ));
        }
    }
    std::fs::write(&csv_path, csv)?;

    Ok((json_path, csv_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_engines() {
        let engines = parse_engines("tesseract, easyocr,tesseract").unwrap();
        assert_eq!(engines, vec![EngineKind::Tesseract, EngineKind::EasyOcr]);
        assert!(parse_engines("abbyy").is_err());
        assert!(parse_engines(" , ").is_err());
    }

    #[test]
    fn test_collect_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.pdf", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let files = collect_files(dir.path(), 0).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.png"]);

        let limited = collect_files(dir.path(), 1).unwrap();
        assert_eq!(limited.len(), 1);
    }
}
