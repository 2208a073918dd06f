use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::Connection;
use tracing::info;

use super::db_setup::open_review_db;
use super::queue::{self, EnqueueSummary, QueueEntry, ReviewRow};
use crate::cli::{ReviewAction, ReviewArgs, ReviewEnqueueArgs, ReviewListArgs, ReviewSetArgs};
use crate::commands::routing::DocumentNamer;
use crate::model::{MatchManifestInput, MatchRecord, WorkPaths};
use crate::rules::ExtractionRules;
use crate::util::{latest_manifest, now_utc_string, read_json};

pub fn run(args: ReviewArgs) -> Result<()> {
    let paths = WorkPaths::new(&args.cache_root);
    let db_path = paths.review_db(args.db_path.as_deref());
    let mut connection = open_review_db(&db_path)?;

    match args.action {
        ReviewAction::List(list_args) => list_rows(&connection, &list_args),
        ReviewAction::Set(set_args) => set_row(&connection, &set_args),
        ReviewAction::Enqueue(enqueue_args) => {
            enqueue_manifest(&mut connection, &paths, &enqueue_args)
        }
    }
}

/// Queues match records for review, stamping each with its upload date.
pub fn enqueue_records(
    connection: &mut Connection,
    records: &[MatchRecord],
    namer: &DocumentNamer,
) -> Result<EnqueueSummary> {
    let entries: Vec<QueueEntry<'_>> = records
        .iter()
        .map(|record| QueueEntry {
            record,
            document_date: namer.document_date(&record.extraction),
        })
        .collect();
    let summary = queue::enqueue(connection, &entries, &now_utc_string())?;
    info!(
        inserted = summary.inserted,
        refreshed = summary.refreshed,
        "review queue updated"
    );
    Ok(summary)
}

pub(super) fn enqueue_manifest(
    connection: &mut Connection,
    paths: &WorkPaths,
    args: &ReviewEnqueueArgs,
) -> Result<()> {
    let manifest_path = match &args.match_manifest_path {
        Some(path) => path.clone(),
        None => latest_manifest(&paths.manifest_dir, "match_")?.with_context(|| {
            format!(
                "no match manifest found in {}; run `cp2000 match` first",
                paths.manifest_dir.display()
            )
        })?,
    };
    let manifest: MatchManifestInput = read_json(&manifest_path)?;
    info!(
        manifest = %manifest_path.display(),
        run_id = %manifest.run_id,
        records = manifest.records.len(),
        "loaded match manifest"
    );

    let rules = ExtractionRules::load(args.rules_path.as_deref())?;
    let namer = DocumentNamer::new(&rules, Local::now().date_naive())?;
    enqueue_records(connection, &manifest.records, &namer)?;
    Ok(())
}

fn set_row(connection: &Connection, args: &ReviewSetArgs) -> Result<()> {
    queue::set_status(
        connection,
        args.id,
        args.status,
        args.case_id.as_deref(),
        args.notes.as_deref(),
        &now_utc_string(),
    )?;
    info!(
        id = args.id,
        status = args.status.as_str(),
        case_id = args.case_id.as_deref().unwrap_or(""),
        "review status updated"
    );
    Ok(())
}

fn list_rows(connection: &Connection, args: &ReviewListArgs) -> Result<()> {
    let rows = queue::list(connection, args.status)?;
    let mut output = io::BufWriter::new(io::stdout().lock());

    if args.json {
        serde_json::to_writer_pretty(&mut output, &rows)
            .context("failed to serialize review rows")?;
        writeln!(output)?;
    } else {
        write_row_table(&mut output, &rows)?;
    }

    output.flush()?;
    Ok(())
}

fn write_row_table(output: &mut impl Write, rows: &[ReviewRow]) -> Result<()> {
    writeln!(output, "Rows: {}", rows.len())?;
    for row in rows {
        writeln!(
            output,
            "{}\t{}\t{}\tcase={}\tmatch={}\tconfidence={:.2}",
            row.id,
            row.status,
            row.filename,
            row.case_id.as_deref().unwrap_or("-"),
            row.match_status,
            row.extraction_confidence,
        )?;
        writeln!(
            output,
            "\tname={} ssn=***-**-{} type={} tax_year={} due={} urgency={}",
            row.taxpayer_name.as_deref().unwrap_or("-"),
            row.ssn_last_4.as_deref().unwrap_or("????"),
            row.letter_type.as_deref().unwrap_or("-"),
            row.tax_year.as_deref().unwrap_or("-"),
            row.response_due_date.as_deref().unwrap_or("-"),
            row.urgency_status.as_deref().unwrap_or("-"),
        )?;
        if !row.quality_issues.is_empty() {
            writeln!(output, "\tissues={}", row.quality_issues)?;
        }
        if let Some(uploaded_at) = &row.uploaded_at {
            writeln!(
                output,
                "\tuploaded={} as {} task={}",
                uploaded_at,
                row.uploaded_filename.as_deref().unwrap_or("-"),
                row.task_id.as_deref().unwrap_or("-"),
            )?;
        } else if let Some(error) = &row.upload_error {
            writeln!(output, "\tupload_error={error}")?;
        }
    }
    Ok(())
}
