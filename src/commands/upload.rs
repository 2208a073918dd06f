use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{Days, Local, NaiveDate, Utc};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::UploadArgs;
use crate::commands::review::{ReviewRow, open_review_db, pending_uploads, record_upload};
use crate::commands::routing::proposed_document_name;
use crate::crm::{CrmClient, CrmConfig, TaskRequest};
use crate::model::{MANIFEST_VERSION, UploadOutcome, UploadRunManifest, WorkPaths};
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

const DEFAULT_RESPONSE_DAYS: u64 = 30;

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub limit: Option<usize>,
    pub dry_run: bool,
    pub skip_tasks: bool,
    pub delay: Duration,
    pub manifest_dir: PathBuf,
}

pub async fn run(args: UploadArgs) -> Result<()> {
    let paths = WorkPaths::new(&args.cache_root);
    let connection = open_review_db(&paths.review_db(args.db_path.as_deref()))?;

    let client = if args.dry_run {
        None
    } else {
        Some(CrmClient::new(CrmConfig::from_args(&args.crm)?)?)
    };

    let request = UploadRequest {
        limit: args.limit,
        dry_run: args.dry_run,
        skip_tasks: args.skip_tasks,
        delay: Duration::from_millis(args.crm.attempt_delay_ms),
        manifest_dir: paths.manifest_dir.clone(),
    };
    let (manifest_path, manifest) = upload_approved(client.as_ref(), &connection, &request).await?;

    info!(
        manifest = %manifest_path.display(),
        attempted = manifest.outcomes.len(),
        uploaded = manifest.outcomes.iter().filter(|outcome| outcome.document_uploaded).count(),
        dry_run = manifest.dry_run,
        "upload complete"
    );
    Ok(())
}

/// Uploads every approved, not yet uploaded row and records each outcome on
/// its row. A dry run only reports what would be sent.
pub async fn upload_approved(
    client: Option<&CrmClient>,
    connection: &Connection,
    request: &UploadRequest,
) -> Result<(PathBuf, UploadRunManifest)> {
    let client = match (client, request.dry_run) {
        (_, true) => None,
        (Some(client), false) => Some(client),
        (None, false) => bail!("CRM client is required unless --dry-run is set"),
    };
    if let Some(client) = client {
        if !request.skip_tasks && !client.has_secret_token() {
            bail!(
                "CRM secret token is not set (use --secret-token or LOGIQS_SECRET_TOKEN, or --skip-tasks)"
            );
        }
    }

    let started = Utc::now();
    let today = Local::now().date_naive();
    let rows = pending_uploads(connection, request.limit)?;
    info!(rows = rows.len(), dry_run = request.dry_run, "approved rows pending upload");

    let mut outcomes = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let outcome = match client {
            Some(client) => {
                if index > 0 && !request.delay.is_zero() {
                    tokio::time::sleep(request.delay).await;
                }
                let outcome = upload_row(client, row, request.skip_tasks, today).await;
                record_upload(connection, &outcome, &now_utc_string())?;
                outcome
            }
            None => plan_row(row),
        };
        outcomes.push(outcome);
    }

    let manifest = UploadRunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id: format!("upload-{}", utc_compact_string(started)),
        generated_at: now_utc_string(),
        dry_run: request.dry_run,
        outcomes,
    };
    let manifest_path = request
        .manifest_dir
        .join(format!("upload_{}.json", utc_compact_string(started)));
    write_json_pretty(&manifest_path, &manifest)?;

    Ok((manifest_path, manifest))
}

async fn upload_row(
    client: &CrmClient,
    row: &ReviewRow,
    skip_tasks: bool,
    today: NaiveDate,
) -> UploadOutcome {
    let mut outcome = plan_row(row);
    if outcome.error.is_some() {
        warn!(id = row.id, error = outcome.error.as_deref().unwrap_or(""), "row not uploadable");
        return outcome;
    }

    let last_name = row.last_name().unwrap_or("Unknown");
    let tax_year = row.tax_year.as_deref().unwrap_or("");
    let comment = format!("IRS {tax_year} - {last_name} - Uploaded via API");

    match client
        .upload_document(
            &outcome.case_id,
            Path::new(&row.source_path),
            &outcome.uploaded_filename,
            &comment,
        )
        .await
    {
        Ok(status) => {
            outcome.document_uploaded = true;
            info!(
                id = row.id,
                case_id = %outcome.case_id,
                filename = %outcome.uploaded_filename,
                status,
                "document uploaded"
            );
        }
        Err(err) => {
            warn!(id = row.id, case_id = %outcome.case_id, error = %err, "document upload failed");
            outcome.error = Some(format!("upload failed: {err}"));
            return outcome;
        }
    }

    if skip_tasks {
        return outcome;
    }

    let task = TaskRequest {
        case_id: outcome.case_id.clone(),
        letter_type: row.letter_type.clone().unwrap_or_else(|| "CP2000".to_string()),
        tax_year: tax_year.to_string(),
        last_name: last_name.to_string(),
        ssn_last_4: row.ssn_last_4.clone().unwrap_or_default(),
        due_date: task_due_date(row, today),
    };
    match client.create_task(&task).await {
        Ok(task_id) => {
            info!(
                id = row.id,
                case_id = %outcome.case_id,
                task_id = task_id.as_deref().unwrap_or(""),
                "follow-up task created"
            );
            outcome.task_id = task_id;
        }
        Err(err) => {
            warn!(id = row.id, case_id = %outcome.case_id, error = %err, "task creation failed");
            outcome.error = Some(format!("task creation failed: {err}"));
        }
    }

    outcome
}

/// Outcome skeleton with the upload name filled in, or an error if the row
/// cannot be uploaded as it stands.
fn plan_row(row: &ReviewRow) -> UploadOutcome {
    let case_id = row
        .case_id
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    let mut outcome = UploadOutcome {
        review_id: row.id,
        case_id,
        original_filename: row.filename.clone(),
        uploaded_filename: String::new(),
        document_uploaded: false,
        task_id: None,
        error: None,
    };

    match row.document_date() {
        Ok(date) => outcome.uploaded_filename = proposed_document_name(&outcome.case_id, date),
        Err(err) => outcome.error = Some(err.to_string()),
    }
    if outcome.error.is_none() && !Path::new(&row.source_path).is_file() {
        outcome.error = Some(format!("source file missing: {}", row.source_path));
    }
    outcome
}

/// Response due date, or 30 days out when the notice had none.
fn task_due_date(row: &ReviewRow, today: NaiveDate) -> NaiveDate {
    row.response_due()
        .or_else(|| today.checked_add_days(Days::new(DEFAULT_RESPONSE_DAYS)))
        .unwrap_or(today)
}
