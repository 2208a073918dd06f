use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::process::Command;
use tracing::{debug, warn};

/// Candidates at or below this many characters are OCR noise.
const MIN_CANDIDATE_CHARS: usize = 20;

pub fn non_whitespace_char_count(text: &str) -> usize {
    text.chars()
        .filter(|character| !character.is_whitespace())
        .count()
}

pub async fn command_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok()
}

/// Text layer of the first `max_pages` pages, one string per page.
pub async fn extract_pages_with_pdftotext(pdf_path: &Path, max_pages: u32) -> Result<Vec<String>> {
    let output = Command::new("pdftotext")
        .arg("-enc")
        .arg("UTF-8")
        .arg("-layout")
        .arg("-f")
        .arg("1")
        .arg("-l")
        .arg(max_pages.to_string())
        .arg(pdf_path)
        .arg("-")
        .output()
        .await
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect();

    while let Some(last_page) = pages.last() {
        if last_page.trim().is_empty() {
            pages.pop();
            continue;
        }
        break;
    }

    Ok(pages)
}

/// Renders pages `1..=max_pages` to PNG files inside `output_dir`, in page order.
pub async fn rasterize_pages(
    pdf_path: &Path,
    output_dir: &Path,
    dpi: u32,
    max_pages: u32,
) -> Result<Vec<PathBuf>> {
    let output_root = output_dir.join("page");
    let output = Command::new("pdftoppm")
        .arg("-r")
        .arg(dpi.to_string())
        .arg("-f")
        .arg("1")
        .arg("-l")
        .arg(max_pages.to_string())
        .arg("-png")
        .arg(pdf_path)
        .arg(&output_root)
        .output()
        .await
        .with_context(|| format!("failed to execute pdftoppm for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftoppm returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    let mut pages = Vec::new();
    let entries = std::fs::read_dir(output_dir)
        .with_context(|| format!("failed to list {}", output_dir.display()))?;
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to list {}", output_dir.display()))?
            .path();
        let is_page = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("page-") && name.ends_with(".png"))
            .unwrap_or(false);
        if is_page {
            pages.push(path);
        }
    }
    // pdftoppm pads page numbers to a fixed width per document.
    pages.sort();

    if pages.is_empty() {
        bail!("pdftoppm produced no page images for {}", pdf_path.display());
    }

    Ok(pages)
}

#[derive(Debug, Clone)]
pub struct OcrRunner {
    pub lang: String,
    pub psm_modes: Vec<u8>,
    pub timeout: Duration,
}

impl OcrRunner {
    /// One candidate per page-segmentation mode that produced usable text.
    pub async fn candidates(&self, image_path: &Path) -> Vec<String> {
        let mut candidates = Vec::with_capacity(self.psm_modes.len());
        for &psm in &self.psm_modes {
            if let Some(text) = self.recognize(image_path, psm).await {
                candidates.push(text);
            }
        }
        candidates
    }

    /// A failed, timed-out or near-empty pass yields `None` and is only logged.
    pub async fn recognize(&self, image_path: &Path, psm: u8) -> Option<String> {
        let mut command = Command::new("tesseract");
        command
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .arg("--psm")
            .arg(psm.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                warn!(
                    image = %image_path.display(),
                    psm,
                    error = %err,
                    "failed to execute tesseract"
                );
                return None;
            }
            Err(_) => {
                warn!(
                    image = %image_path.display(),
                    psm,
                    timeout_secs = self.timeout.as_secs(),
                    "tesseract timed out"
                );
                return None;
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(
                image = %image_path.display(),
                psm,
                stderr = %stderr.trim(),
                "tesseract pass failed"
            );
            return None;
        }

        let text = String::from_utf8_lossy(&output.stdout)
            .replace('\u{0000}', "")
            .trim()
            .to_string();
        if text.chars().count() <= MIN_CANDIDATE_CHARS {
            debug!(
                image = %image_path.display(),
                psm,
                chars = text.chars().count(),
                "dropping short OCR candidate"
            );
            return None;
        }

        Some(text)
    }
}
