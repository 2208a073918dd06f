use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use super::enhanced::CaseMatcher;
use crate::cli::MatchArgs;
use crate::crm::{CaseSearch, CrmClient, CrmConfig};
use crate::model::{
    ExtractionManifestInput, ExtractionResult, MANIFEST_VERSION, MatchRunManifest, WorkPaths,
};
use crate::rules::ExtractionRules;
use crate::util::{
    latest_manifest, now_utc_string, read_json, utc_compact_string, write_json_pretty,
};

#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub manifest_path: PathBuf,
    pub manifest: MatchRunManifest,
}

pub async fn run(args: MatchArgs) -> Result<()> {
    let paths = WorkPaths::new(&args.cache_root);
    let rules = ExtractionRules::load(args.rules_path.as_deref())?;
    let client = CrmClient::new(CrmConfig::from_args(&args.crm)?)?;

    let extraction_path = match &args.extraction_manifest_path {
        Some(path) => path.clone(),
        None => latest_manifest(&paths.manifest_dir, "extraction_")?.with_context(|| {
            format!(
                "no extraction manifest found in {}; run `cp2000 extract` first",
                paths.manifest_dir.display()
            )
        })?,
    };
    let input: ExtractionManifestInput = read_json(&extraction_path)?;
    info!(
        manifest = %extraction_path.display(),
        run_id = %input.run_id,
        documents = input.results.len(),
        "loaded extraction manifest"
    );

    let outcome = match_documents(
        &client,
        &rules,
        Duration::from_millis(args.crm.attempt_delay_ms),
        input.results,
        &extraction_path,
        &paths,
        !args.no_enhanced,
        args.output_path.clone(),
    )
    .await?;

    info!(
        manifest = %outcome.manifest_path.display(),
        matched = outcome.manifest.counts.matched,
        total = outcome.manifest.counts.total,
        "matching complete"
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn match_documents<S: CaseSearch + ?Sized>(
    search: &S,
    rules: &ExtractionRules,
    attempt_delay: Duration,
    extractions: Vec<ExtractionResult>,
    extraction_path: &Path,
    paths: &WorkPaths,
    enhanced: bool,
    output_path: Option<PathBuf>,
) -> Result<MatchOutcome> {
    let started = Utc::now();
    let matcher = CaseMatcher::new(search, rules, attempt_delay);
    let (records, counts) = matcher.match_all(extractions, enhanced).await;

    info!(
        total = counts.total,
        matched = counts.matched,
        matched_by_enhancement = counts.matched_by_enhancement,
        not_found = counts.not_found,
        skipped = counts.skipped,
        errors = counts.errors,
        "match summary"
    );

    let manifest = MatchRunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id: format!("match-{}", utc_compact_string(started)),
        generated_at: now_utc_string(),
        extraction_manifest_path: extraction_path.display().to_string(),
        enhanced,
        counts,
        records,
    };

    let manifest_path = output_path.unwrap_or_else(|| {
        paths
            .manifest_dir
            .join(format!("match_{}.json", utc_compact_string(started)))
    });
    write_json_pretty(&manifest_path, &manifest)?;

    Ok(MatchOutcome {
        manifest_path,
        manifest,
    })
}
