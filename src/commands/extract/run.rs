use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::discovery::{SourceDocument, describe, discover_pdfs};
use super::document::FieldExtractor;
use super::fields_ssn::SeenSsns;
use super::ledger::ProcessingLedger;
use super::page_text::{DocumentText, OcrSettings, collect_document_text};
use super::report::log_summary;
use crate::cli::{ExtractArgs, OcrArgs, SourceArgs};
use crate::model::{
    ExtractionCounts, ExtractionResult, ExtractionRunManifest, MANIFEST_VERSION, QualityIssue,
    WorkPaths,
};
use crate::rules::ExtractionRules;
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

/// Everything one extraction pass needs, independent of how it was invoked.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub input_dirs: Vec<PathBuf>,
    pub folder_filter: Option<String>,
    pub limit: Option<usize>,
    pub full: bool,
    pub ocr: OcrSettings,
    pub workers: usize,
    pub rules: ExtractionRules,
    pub paths: WorkPaths,
    pub command: String,
    pub output_path: Option<PathBuf>,
}

impl BatchRequest {
    pub fn new(
        paths: WorkPaths,
        source: &SourceArgs,
        ocr: &OcrArgs,
        rules: ExtractionRules,
        command: String,
    ) -> Self {
        let workers = ocr.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(2)
        });
        Self {
            input_dirs: source.input_dirs.clone(),
            folder_filter: source.folder_filter().map(str::to_string),
            limit: source.effective_limit(),
            full: source.full,
            ocr: OcrSettings::from_args(ocr),
            workers: workers.max(1),
            rules,
            paths,
            command,
            output_path: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub manifest_path: PathBuf,
    pub manifest: ExtractionRunManifest,
}

pub async fn run(args: ExtractArgs) -> Result<()> {
    let rules = ExtractionRules::load(args.rules_path.as_deref())?;
    let mut request = BatchRequest::new(
        WorkPaths::new(&args.cache_root),
        &args.source,
        &args.ocr,
        rules,
        render_extract_command(&args),
    );
    request.output_path = args.output_path.clone();

    let outcome = extract_batch(&request).await?;
    info!(
        manifest = %outcome.manifest_path.display(),
        processed = outcome.manifest.counts.processed,
        needs_review = outcome.manifest.counts.needs_review,
        "extraction complete"
    );
    Ok(())
}

pub async fn extract_batch(request: &BatchRequest) -> Result<BatchOutcome> {
    let started = Utc::now();
    let run_id = format!("extract-{}", utc_compact_string(started));
    ensure_directory(&request.paths.manifest_dir)?;

    let extractor = FieldExtractor::new(&request.rules)?;
    let mut ledger = ProcessingLedger::load(&request.paths.ledger_path)?;

    info!(
        run_id = %run_id,
        inputs = request.input_dirs.len(),
        folder_filter = request.folder_filter.as_deref().unwrap_or("<none>"),
        ocr_mode = request.ocr.mode.as_str(),
        workers = request.workers,
        full = request.full,
        "starting extraction"
    );

    let discovered = discover_pdfs(&request.input_dirs, request.folder_filter.as_deref())?;
    let PendingScan { pending, skipped } =
        select_pending(&discovered, &ledger, request.full, request.limit);

    info!(
        discovered = discovered.len(),
        pending = pending.len(),
        skipped_already_processed = skipped,
        "intake scan complete"
    );

    let texts = collect_texts(pending, &request.ocr, request.workers).await;

    let today = Local::now().date_naive();
    let mut seen_ssns = SeenSsns::new();
    let mut results = Vec::with_capacity(texts.len());
    for (source, text) in &texts {
        let result = extractor.extract(
            source,
            text.as_ref(),
            &mut seen_ssns,
            today,
            &now_utc_string(),
        );
        info!(
            file = %result.filename,
            confidence = result.extraction_confidence,
            issues = result.quality_issues.len(),
            method = %result.extraction_method,
            "document extracted"
        );
        record_in_ledger(&mut ledger, source, &result);
        results.push(result);
    }
    ledger.save()?;
    info!(
        ledger_entries = ledger.len(),
        distinct_ssns = seen_ssns.len(),
        "ledger saved"
    );

    log_summary(&results);

    let counts = ExtractionCounts {
        discovered: discovered.len(),
        skipped_already_processed: skipped,
        processed: results.len(),
        needs_review: results.iter().filter(|result| result.needs_review).count(),
        complete: results.iter().filter(|result| !result.needs_review).count(),
        extraction_errors: results
            .iter()
            .filter(|result| result.quality_issues.contains(&QualityIssue::ExtractionError))
            .count(),
    };

    let manifest = ExtractionRunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id,
        generated_at: now_utc_string(),
        command: request.command.clone(),
        source_directories: request
            .input_dirs
            .iter()
            .map(|dir| dir.display().to_string())
            .collect(),
        ocr_mode: request.ocr.mode.as_str().to_string(),
        counts,
        results,
    };

    let manifest_path = request.output_path.clone().unwrap_or_else(|| {
        request
            .paths
            .manifest_dir
            .join(format!("extraction_{}.json", utc_compact_string(started)))
    });
    write_json_pretty(&manifest_path, &manifest)?;

    Ok(BatchOutcome {
        manifest_path,
        manifest,
    })
}

/// OCR fan-out bounded by `workers`; results come back sorted by filename.
async fn collect_texts(
    pending: Vec<SourceDocument>,
    settings: &OcrSettings,
    workers: usize,
) -> Vec<(SourceDocument, Option<DocumentText>)> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();

    for source in pending {
        let semaphore = Arc::clone(&semaphore);
        let settings = settings.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let text = match collect_document_text(&source.path, &settings).await {
                Ok(text) => Some(text),
                Err(err) => {
                    warn!(path = %source.path.display(), error = %err, "text recovery failed");
                    None
                }
            };
            (source, text)
        });
    }

    let mut collected = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(entry) => collected.push(entry),
            Err(err) => warn!(error = %err, "OCR task aborted"),
        }
    }

    collected.sort_by(|left, right| {
        left.0
            .filename
            .cmp(&right.0.filename)
            .then_with(|| left.0.path.cmp(&right.0.path))
    });
    collected
}

#[derive(Debug, Default)]
pub(super) struct PendingScan {
    pub pending: Vec<SourceDocument>,
    pub skipped: usize,
}

/// Hashes discovered files and keeps those not yet in the ledger (all of them
/// when `full`), dropping repeated content within the scan.
pub(super) fn select_pending(
    discovered: &[PathBuf],
    ledger: &ProcessingLedger,
    full: bool,
    limit: Option<usize>,
) -> PendingScan {
    let mut scan = PendingScan::default();
    let mut seen_hashes = HashSet::new();
    for path in discovered {
        if limit.is_some_and(|limit| scan.pending.len() >= limit) {
            break;
        }
        let source = match describe(path) {
            Ok(source) => source,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable document");
                continue;
            }
        };
        if !full && ledger.contains(&source.sha256) {
            scan.skipped += 1;
            continue;
        }
        if !seen_hashes.insert(source.sha256.clone()) {
            scan.skipped += 1;
            continue;
        }
        scan.pending.push(source);
    }
    scan
}

/// Documents with no recoverable text stay out of the ledger and are retried on the next pass.
pub(super) fn record_in_ledger(
    ledger: &mut ProcessingLedger,
    source: &SourceDocument,
    result: &ExtractionResult,
) {
    if !result.quality_issues.contains(&QualityIssue::ExtractionError) {
        ledger.record(&source.sha256, &source.filename, ledger_status(result));
    }
}

fn ledger_status(result: &ExtractionResult) -> &'static str {
    if result.needs_review {
        "needs_review"
    } else {
        "complete"
    }
}

fn render_extract_command(args: &ExtractArgs) -> String {
    let mut command = vec![
        "cp2000".to_string(),
        "extract".to_string(),
        "--cache-root".to_string(),
        args.cache_root.display().to_string(),
    ];
    for dir in &args.source.input_dirs {
        command.push("--input".to_string());
        command.push(dir.display().to_string());
    }
    if let Some(limit) = args.source.limit {
        command.push("--limit".to_string());
        command.push(limit.to_string());
    }
    if args.source.test {
        command.push("--test".to_string());
    }
    if args.source.full {
        command.push("--full".to_string());
    }
    command.push("--ocr-mode".to_string());
    command.push(args.ocr.ocr_mode.as_str().to_string());
    if let Some(path) = &args.rules_path {
        command.push("--rules-path".to_string());
        command.push(path.display().to_string());
    }
    command.join(" ")
}
