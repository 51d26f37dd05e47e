//! Tesseract OCR adapter.
//!
//! Invokes the tesseract command-line binary in TSV mode so word
//! confidences can be collected per page. PDF inputs are rendered to
//! page images with pdftoppm (Poppler) first.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tempfile::TempDir;
use tokio::process::Command;

use super::{DocumentInput, EngineAdapter, EngineFailure, Recognition};
use crate::models::{EngineKind, FileType, PageMetrics};

/// Check if a binary exists in PATH.
fn check_binary(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Tesseract OCR adapter using the system binary.
pub struct TesseractEngine;

impl TesseractEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run tesseract in TSV mode on one image, returning the
    /// reconstructed text and per-word confidence figures.
    async fn run_tesseract(
        &self,
        image_path: &Path,
        language: &str,
    ) -> Result<(String, f64, u32), String> {
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", language])
            .arg("tsv")
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(format!("tesseract failed: {}", stderr.trim()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err("tesseract not found (install tesseract-ocr)".to_string())
            }
            Err(e) => Err(format!("tesseract io error: {}", e)),
        }
    }

    /// Number of pages in a PDF, via pdfinfo.
    async fn pdf_page_count(&self, pdf_path: &Path) -> Result<u32, String> {
        let output = Command::new("pdfinfo")
            .arg(pdf_path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    "pdfinfo not found (install poppler-utils)".to_string()
                } else {
                    format!("pdfinfo io error: {}", e)
                }
            })?;

        if !output.status.success() {
            return Err("pdfinfo failed to read PDF".to_string());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .find_map(|line| line.strip_prefix("Pages:"))
            .and_then(|rest| rest.trim().parse::<u32>().ok())
            .ok_or_else(|| "pdfinfo reported no page count".to_string())
    }

    /// Render one PDF page to a PNG in `output_dir`.
    async fn pdf_page_to_image(
        &self,
        pdf_path: &Path,
        page: u32,
        output_dir: &Path,
    ) -> Result<PathBuf, String> {
        let page_str = page.to_string();
        let output_prefix = output_dir.join("page");

        let status = Command::new("pdftoppm")
            .args(["-png", "-r", "300", "-f", &page_str, "-l", &page_str])
            .arg(pdf_path)
            .arg(&output_prefix)
            .status()
            .await;

        match status {
            Ok(s) if s.success() => find_page_image(output_dir, page)
                .ok_or_else(|| format!("no image generated for page {}", page)),
            Ok(_) => Err("pdftoppm failed to convert PDF page".to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err("pdftoppm not found (install poppler-utils)".to_string())
            }
            Err(e) => Err(format!("pdftoppm io error: {}", e)),
        }
    }

    async fn recognize_inner(&self, input: &DocumentInput) -> Result<Recognition, String> {
        let start = Instant::now();

        let (text, page_metrics) = match input.file_type {
            FileType::Image => {
                let (text, confidence, words) =
                    self.run_tesseract(&input.path, &input.language).await?;
                let metrics = vec![PageMetrics {
                    page_index: 0,
                    confidence,
                    word_count: words,
                }];
                (text, metrics)
            }
            FileType::Pdf => {
                let pages = self.pdf_page_count(&input.path).await?;
                let temp_dir = TempDir::new().map_err(|e| format!("tempdir: {}", e))?;

                let mut texts = Vec::with_capacity(pages as usize);
                let mut metrics = Vec::with_capacity(pages as usize);
                for page in 1..=pages {
                    let image = self
                        .pdf_page_to_image(&input.path, page, temp_dir.path())
                        .await?;
                    let (text, confidence, words) =
                        self.run_tesseract(&image, &input.language).await?;
                    texts.push(text);
                    metrics.push(PageMetrics {
                        page_index: page - 1,
                        confidence,
                        word_count: words,
                    });
                }
                (texts.join("\n\n"), metrics)
            }
        };

        let confidence = mean_confidence(&page_metrics);
        Ok(Recognition {
            text,
            confidence,
            page_metrics,
            cost: None,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EngineAdapter for TesseractEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Tesseract
    }

    fn is_available(&self) -> bool {
        check_binary("tesseract")
    }

    fn availability_hint(&self) -> String {
        if !check_binary("tesseract") {
            "Tesseract not installed. Install with: apt install tesseract-ocr".to_string()
        } else if !check_binary("pdftoppm") || !check_binary("pdfinfo") {
            "poppler-utils not installed. Install with: apt install poppler-utils".to_string()
        } else {
            "Tesseract is available".to_string()
        }
    }

    async fn recognize(&self, input: &DocumentInput) -> Result<Recognition, EngineFailure> {
        let start = Instant::now();
        self.recognize_inner(input)
            .await
            .map_err(|reason| EngineFailure::new(reason, start.elapsed().as_millis() as u64))
    }
}

/// Word-count-weighted mean page confidence.
fn mean_confidence(pages: &[PageMetrics]) -> f64 {
    let total_words: u64 = pages.iter().map(|p| p.word_count as u64).sum();
    if total_words == 0 {
        return 0.0;
    }
    pages
        .iter()
        .map(|p| p.confidence * p.word_count as f64)
        .sum::<f64>()
        / total_words as f64
}

/// Parse tesseract TSV output into (text, mean confidence, word count).
///
/// TSV rows: level page block par line word left top width height conf text.
/// Level 5 rows are words; conf is -1 on structural rows.
fn parse_tsv(tsv: &str) -> (String, f64, u32) {
    let mut lines: Vec<String> = Vec::new();
    let mut current_line = String::new();
    let mut current_key: Option<(u32, u32, u32)> = None;
    let mut conf_sum = 0.0f64;
    let mut words = 0u32;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let conf: f64 = match cols[10].parse() {
            Ok(c) if c >= 0.0 => c,
            _ => continue,
        };
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }

        let key = (
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        if current_key.is_some() && current_key != Some(key) {
            lines.push(std::mem::take(&mut current_line));
        }
        current_key = Some(key);

        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
        conf_sum += conf / 100.0;
        words += 1;
    }
    if !current_line.is_empty() {
        lines.push(current_line);
    }

    let confidence = if words > 0 {
        conf_sum / words as f64
    } else {
        0.0
    };
    (lines.join("\n"), confidence, words)
}

/// Find the image pdftoppm generated for a page (page-01.png, page-001.png, ...).
fn find_page_image(temp_path: &Path, page_num: u32) -> Option<PathBuf> {
    for digits in [1, 2, 3, 4] {
        let filename = format!("page-{:0width$}.png", page_num, width = digits);
        let path = temp_path.join(&filename);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t\n\
5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t96\tHello\n\
5\t1\t1\t1\t1\t2\t12\t0\t10\t10\t88\tworld\n\
5\t1\t1\t1\t2\t1\t0\t12\t10\t10\t92\tsecond\n";

    #[test]
    fn test_parse_tsv_words_and_lines() {
        let (text, confidence, words) = parse_tsv(SAMPLE_TSV);
        assert_eq!(text, "Hello world\nsecond");
        assert_eq!(words, 3);
        assert!((confidence - 0.92).abs() < 1e-9);
    }

    #[test]
    fn test_parse_tsv_empty() {
        let (text, confidence, words) = parse_tsv("level\tpage_num\n");
        assert!(text.is_empty());
        assert_eq!(confidence, 0.0);
        assert_eq!(words, 0);
    }

    #[test]
    fn test_mean_confidence_weighted_by_words() {
        let pages = vec![
            PageMetrics {
                page_index: 0,
                confidence: 1.0,
                word_count: 30,
            },
            PageMetrics {
                page_index: 1,
                confidence: 0.5,
                word_count: 10,
            },
        ];
        assert!((mean_confidence(&pages) - 0.875).abs() < 1e-9);
        assert_eq!(mean_confidence(&[]), 0.0);
    }
}
