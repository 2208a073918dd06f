use anyhow::Result;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::review::{open_review_db, status_counts, uploaded_count};
use crate::model::{ExtractionCounts, ManifestHeader, MatchCounts, ProcessingHistory, WorkPaths};
use crate::util::{latest_manifest, read_json};

pub fn run(args: StatusArgs) -> Result<()> {
    let paths = WorkPaths::new(&args.cache_root);
    info!(cache_root = %paths.cache_root.display(), "status requested");

    if paths.ledger_path.exists() {
        let history: ProcessingHistory = read_json(&paths.ledger_path)?;
        info!(
            path = %paths.ledger_path.display(),
            processed_documents = history.entries.len(),
            last_check = %history.last_check.unwrap_or_default(),
            "processing ledger"
        );
    } else {
        warn!(path = %paths.ledger_path.display(), "processing ledger missing");
    }

    match latest_manifest(&paths.manifest_dir, "extraction_")? {
        Some(path) => {
            let header: ManifestHeader<ExtractionCounts> = read_json(&path)?;
            info!(
                path = %path.display(),
                run_id = %header.run_id,
                generated_at = %header.generated_at,
                discovered = header.counts.discovered,
                processed = header.counts.processed,
                needs_review = header.counts.needs_review,
                complete = header.counts.complete,
                extraction_errors = header.counts.extraction_errors,
                "latest extraction"
            );
        }
        None => warn!(dir = %paths.manifest_dir.display(), "no extraction manifest yet"),
    }

    match latest_manifest(&paths.manifest_dir, "match_")? {
        Some(path) => {
            let header: ManifestHeader<MatchCounts> = read_json(&path)?;
            info!(
                path = %path.display(),
                run_id = %header.run_id,
                generated_at = %header.generated_at,
                total = header.counts.total,
                matched = header.counts.matched,
                matched_by_enhancement = header.counts.matched_by_enhancement,
                not_found = header.counts.not_found,
                skipped = header.counts.skipped,
                errors = header.counts.errors,
                "latest match"
            );
        }
        None => warn!(dir = %paths.manifest_dir.display(), "no match manifest yet"),
    }

    if paths.review_db_path.exists() {
        let connection = open_review_db(&paths.review_db_path)?;
        for (status, count) in status_counts(&connection)? {
            info!(status = %status, count, "review queue");
        }
        info!(uploaded = uploaded_count(&connection)?, "review queue uploads");
    } else {
        warn!(path = %paths.review_db_path.display(), "review database missing");
    }

    Ok(())
}
