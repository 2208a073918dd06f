use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use super::ocr_tools::{
    OcrRunner, command_available, extract_pages_with_pdftotext, non_whitespace_char_count,
    rasterize_pages,
};
use super::preprocess::{PreparedPage, Variant, prepare_page};
use crate::cli::{OcrArgs, OcrMode};

/// Page-segmentation mode used for the header crop and for follow-on pages.
const BLOCK_PSM: u8 = 6;

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub mode: OcrMode,
    pub lang: String,
    pub min_text_chars: usize,
    pub dpi: u32,
    pub psm_modes: Vec<u8>,
    pub max_pages: u32,
    pub timeout: Duration,
}

impl OcrSettings {
    pub fn from_args(args: &OcrArgs) -> Self {
        Self {
            mode: args.ocr_mode,
            lang: args.ocr_lang.clone(),
            min_text_chars: args.ocr_min_text_chars,
            dpi: args.dpi,
            psm_modes: args.psm_modes.clone(),
            max_pages: args.max_pages.max(1),
            timeout: Duration::from_secs(args.ocr_timeout_secs.max(1)),
        }
    }

    fn runner(&self) -> OcrRunner {
        OcrRunner {
            lang: self.lang.clone(),
            psm_modes: self.psm_modes.clone(),
            timeout: self.timeout,
        }
    }
}

/// All text recovered from one PDF.
#[derive(Debug, Clone, Default)]
pub struct DocumentText {
    pub header_text: String,
    pub candidates: Vec<String>,
    pub text_layer_used: bool,
    pub ocr_passes: usize,
}

impl DocumentText {
    /// Header first, then every candidate, separated by blank lines.
    pub fn search_text(&self) -> String {
        let mut parts = Vec::with_capacity(self.candidates.len() + 1);
        if !self.header_text.trim().is_empty() {
            parts.push(self.header_text.as_str());
        }
        parts.extend(self.candidates.iter().map(String::as_str));
        parts.join("\n\n")
    }

    pub fn method(&self) -> &'static str {
        match (self.text_layer_used, self.ocr_passes > 0) {
            (true, true) => "text_layer+ocr",
            (true, false) => "text_layer",
            (false, true) => "ocr_multi_pass",
            (false, false) => "none",
        }
    }
}

pub async fn collect_document_text(
    pdf_path: &Path,
    settings: &OcrSettings,
) -> Result<DocumentText> {
    let mut document = DocumentText::default();

    if settings.mode != OcrMode::Force {
        match extract_pages_with_pdftotext(pdf_path, settings.max_pages).await {
            Ok(pages) => {
                let text = pages.join("\n\n");
                if non_whitespace_char_count(&text) >= settings.min_text_chars {
                    document.text_layer_used = true;
                    document.candidates.push(text);
                }
            }
            Err(err) => {
                warn!(path = %pdf_path.display(), error = %err, "text layer unavailable");
            }
        }

        if document.text_layer_used || settings.mode == OcrMode::Off {
            debug!(
                path = %pdf_path.display(),
                text_layer = document.text_layer_used,
                "skipping OCR"
            );
            return finish(pdf_path, document);
        }
    }

    let tools_ready = command_available("pdftoppm").await && command_available("tesseract").await;
    if !tools_ready {
        if settings.mode == OcrMode::Force {
            bail!("OCR requested but pdftoppm/tesseract are not available on PATH");
        }
        warn!(path = %pdf_path.display(), "OCR tools unavailable; using text layer only");
        return finish(pdf_path, document);
    }

    let work_dir = tempfile::Builder::new()
        .prefix("cp2000_ocr_")
        .tempdir()
        .context("failed to create OCR work directory")?;
    let pages = rasterize_pages(pdf_path, work_dir.path(), settings.dpi, settings.max_pages).await?;

    let runner = settings.runner();
    for (index, page_path) in pages.iter().enumerate() {
        let first_page = index == 0;
        let variants: &[Variant] = if first_page {
            &Variant::ALL
        } else {
            &[Variant::Otsu]
        };

        let prepared =
            prepare_page_blocking(page_path, work_dir.path(), variants, first_page).await?;

        if let Some(header_path) = &prepared.header {
            if let Some(text) = runner.recognize(header_path, BLOCK_PSM).await {
                document.header_text = text;
                document.ocr_passes += 1;
            }
        }

        for (variant, variant_path) in &prepared.variants {
            let candidates = if first_page {
                runner.candidates(variant_path).await
            } else {
                runner
                    .recognize(variant_path, BLOCK_PSM)
                    .await
                    .into_iter()
                    .collect()
            };
            debug!(
                path = %pdf_path.display(),
                page = index + 1,
                variant = variant.as_str(),
                candidates = candidates.len(),
                "OCR variant complete"
            );
            document.ocr_passes += candidates.len();
            document.candidates.extend(candidates);
        }
    }

    finish(pdf_path, document)
}

fn finish(pdf_path: &Path, document: DocumentText) -> Result<DocumentText> {
    if document.candidates.is_empty() && document.header_text.trim().is_empty() {
        bail!("no text could be recovered from {}", pdf_path.display());
    }
    Ok(document)
}

async fn prepare_page_blocking(
    page_path: &Path,
    work_dir: &Path,
    variants: &[Variant],
    with_header: bool,
) -> Result<PreparedPage> {
    let page_path = page_path.to_path_buf();
    let work_dir = work_dir.to_path_buf();
    let variants = variants.to_vec();
    tokio::task::spawn_blocking(move || prepare_page(&page_path, &work_dir, &variants, with_header))
        .await
        .context("image preprocessing task panicked")?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_text_puts_header_before_candidates() {
        let document = DocumentText {
            header_text: "HEADER".to_string(),
            candidates: vec!["one".to_string(), "two".to_string()],
            text_layer_used: false,
            ocr_passes: 3,
        };
        assert_eq!(document.search_text(), "HEADER\n\none\n\ntwo");
        assert_eq!(document.method(), "ocr_multi_pass");
    }

    #[test]
    fn empty_header_is_not_joined() {
        let document = DocumentText {
            header_text: "  ".to_string(),
            candidates: vec!["body".to_string()],
            text_layer_used: true,
            ocr_passes: 0,
        };
        assert_eq!(document.search_text(), "body");
        assert_eq!(document.method(), "text_layer");
    }
}
