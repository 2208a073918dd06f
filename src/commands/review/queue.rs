use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::cli::ReviewStatus;
use crate::model::{MatchRecord, UploadOutcome, long_date};

const ROW_COLUMNS: &str = "id, document_sha256, filename, source_path, taxpayer_name, ssn_last_4, \
    letter_type, tax_year, notice_date, response_due_date, urgency_status, document_date, \
    extraction_confidence, quality_issues, match_status, match_strategy, case_id, status, notes, \
    queued_at, updated_at, uploaded_at, uploaded_filename, task_id, upload_error";

/// One document awaiting, or past, operator review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRow {
    pub id: i64,
    pub document_sha256: String,
    pub filename: String,
    pub source_path: String,
    pub taxpayer_name: Option<String>,
    pub ssn_last_4: Option<String>,
    pub letter_type: Option<String>,
    pub tax_year: Option<String>,
    pub notice_date: Option<String>,
    pub response_due_date: Option<String>,
    pub urgency_status: Option<String>,
    pub document_date: String,
    pub extraction_confidence: f64,
    pub quality_issues: String,
    pub match_status: String,
    pub match_strategy: Option<String>,
    pub case_id: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub queued_at: String,
    pub updated_at: String,
    pub uploaded_at: Option<String>,
    pub uploaded_filename: Option<String>,
    pub task_id: Option<String>,
    pub upload_error: Option<String>,
}

impl ReviewRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            document_sha256: row.get("document_sha256")?,
            filename: row.get("filename")?,
            source_path: row.get("source_path")?,
            taxpayer_name: row.get("taxpayer_name")?,
            ssn_last_4: row.get("ssn_last_4")?,
            letter_type: row.get("letter_type")?,
            tax_year: row.get("tax_year")?,
            notice_date: row.get("notice_date")?,
            response_due_date: row.get("response_due_date")?,
            urgency_status: row.get("urgency_status")?,
            document_date: row.get("document_date")?,
            extraction_confidence: row.get("extraction_confidence")?,
            quality_issues: row.get("quality_issues")?,
            match_status: row.get("match_status")?,
            match_strategy: row.get("match_strategy")?,
            case_id: row.get("case_id")?,
            status: row.get("status")?,
            notes: row.get("notes")?,
            queued_at: row.get("queued_at")?,
            updated_at: row.get("updated_at")?,
            uploaded_at: row.get("uploaded_at")?,
            uploaded_filename: row.get("uploaded_filename")?,
            task_id: row.get("task_id")?,
            upload_error: row.get("upload_error")?,
        })
    }

    /// Date stamped into the upload filename.
    pub fn document_date(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.document_date, "%Y-%m-%d").with_context(|| {
            format!(
                "review row {} has an invalid document_date '{}'",
                self.id, self.document_date
            )
        })
    }

    pub fn response_due(&self) -> Option<NaiveDate> {
        self.response_due_date.as_deref().and_then(long_date::parse)
    }

    pub fn last_name(&self) -> Option<&str> {
        self.taxpayer_name
            .as_deref()
            .and_then(|name| name.split_whitespace().last())
    }
}

/// A match record paired with the date used for its upload filename.
#[derive(Debug, Clone, Copy)]
pub struct QueueEntry<'a> {
    pub record: &'a MatchRecord,
    pub document_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueSummary {
    pub inserted: usize,
    pub refreshed: usize,
}

/// Inserts new documents as `UNDER_REVIEW`. Re-queued documents get fresh
/// extraction and match fields; their status, notes and any case id already
/// on the row are left alone.
pub fn enqueue(
    connection: &mut Connection,
    entries: &[QueueEntry<'_>],
    now: &str,
) -> Result<EnqueueSummary> {
    let tx = connection.transaction()?;
    let mut summary = EnqueueSummary::default();

    {
        let mut exists = tx.prepare("SELECT 1 FROM review_queue WHERE document_sha256 = ?1")?;
        let mut upsert = tx.prepare(
            "
            INSERT INTO review_queue(
              document_sha256, filename, source_path, taxpayer_name, ssn_last_4, letter_type,
              tax_year, notice_date, response_due_date, urgency_status, document_date,
              extraction_confidence, quality_issues, match_status, match_strategy, case_id,
              status, queued_at, updated_at
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                   'UNDER_REVIEW', ?17, ?17)
            ON CONFLICT(document_sha256) DO UPDATE SET
              filename=excluded.filename,
              source_path=excluded.source_path,
              taxpayer_name=excluded.taxpayer_name,
              ssn_last_4=excluded.ssn_last_4,
              letter_type=excluded.letter_type,
              tax_year=excluded.tax_year,
              notice_date=excluded.notice_date,
              response_due_date=excluded.response_due_date,
              urgency_status=excluded.urgency_status,
              document_date=excluded.document_date,
              extraction_confidence=excluded.extraction_confidence,
              quality_issues=excluded.quality_issues,
              match_status=excluded.match_status,
              match_strategy=excluded.match_strategy,
              case_id=COALESCE(review_queue.case_id, excluded.case_id),
              updated_at=excluded.updated_at
            ",
        )?;

        for entry in entries {
            let extraction = &entry.record.extraction;
            let case_match = &entry.record.case_match;
            let known = exists
                .query_row(params![extraction.sha256], |_| Ok(()))
                .optional()?
                .is_some();

            let issues = extraction
                .quality_issues
                .iter()
                .map(|issue| issue.as_str())
                .collect::<Vec<_>>()
                .join(",");

            upsert
                .execute(params![
                    extraction.sha256,
                    extraction.filename,
                    extraction.source_path,
                    extraction.taxpayer_name,
                    extraction.ssn_last_4,
                    extraction.letter_type,
                    extraction.tax_year,
                    extraction.notice_date.map(long_date::format),
                    extraction.response_due_date.map(long_date::format),
                    extraction.urgency_status.map(|status| status.as_str()),
                    entry.document_date.format("%Y-%m-%d").to_string(),
                    extraction.extraction_confidence,
                    issues,
                    case_match.status.as_str(),
                    case_match.strategy.map(|strategy| strategy.as_str()),
                    case_match.case_id,
                    now,
                ])
                .with_context(|| format!("failed to queue {}", extraction.filename))?;

            if known {
                summary.refreshed += 1;
            } else {
                summary.inserted += 1;
            }
        }
    }

    tx.commit()?;
    Ok(summary)
}

pub fn list(connection: &Connection, status: Option<ReviewStatus>) -> Result<Vec<ReviewRow>> {
    let mut statement = connection.prepare(&format!(
        "SELECT {ROW_COLUMNS} FROM review_queue WHERE ?1 IS NULL OR status = ?1 ORDER BY id"
    ))?;
    let rows = statement
        .query_map(params![status.map(ReviewStatus::as_str)], ReviewRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get(connection: &Connection, id: i64) -> Result<Option<ReviewRow>> {
    let row = connection
        .query_row(
            &format!("SELECT {ROW_COLUMNS} FROM review_queue WHERE id = ?1"),
            params![id],
            ReviewRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Operator decision. A supplied case id or note replaces the stored one.
pub fn set_status(
    connection: &Connection,
    id: i64,
    status: ReviewStatus,
    case_id: Option<&str>,
    notes: Option<&str>,
    now: &str,
) -> Result<()> {
    let case_id = case_id.map(str::trim).filter(|value| !value.is_empty());
    let updated = connection.execute(
        "
        UPDATE review_queue SET
          status = ?2,
          case_id = COALESCE(?3, case_id),
          notes = COALESCE(?4, notes),
          updated_at = ?5
        WHERE id = ?1
        ",
        params![id, status.as_str(), case_id, notes, now],
    )?;
    if updated == 0 {
        bail!("no review row with id {id}");
    }
    Ok(())
}

/// Approved rows with a case id that have not been uploaded yet, oldest first.
pub fn pending_uploads(connection: &Connection, limit: Option<usize>) -> Result<Vec<ReviewRow>> {
    let limit = limit
        .map(|value| i64::try_from(value).unwrap_or(i64::MAX))
        .unwrap_or(-1);
    let mut statement = connection.prepare(&format!(
        "SELECT {ROW_COLUMNS} FROM review_queue
         WHERE status = 'APPROVE'
           AND case_id IS NOT NULL AND TRIM(case_id) <> ''
           AND uploaded_at IS NULL
         ORDER BY id
         LIMIT ?1"
    ))?;
    let rows = statement
        .query_map(params![limit], ReviewRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Stores an upload attempt. Once the document itself is accepted the row is
/// marked uploaded, even if the follow-up task failed.
pub fn record_upload(connection: &Connection, outcome: &UploadOutcome, now: &str) -> Result<()> {
    if outcome.document_uploaded {
        connection.execute(
            "
            UPDATE review_queue SET
              uploaded_at = ?2,
              uploaded_filename = ?3,
              task_id = ?4,
              upload_error = ?5,
              updated_at = ?2
            WHERE id = ?1
            ",
            params![
                outcome.review_id,
                now,
                outcome.uploaded_filename,
                outcome.task_id,
                outcome.error
            ],
        )?;
    } else {
        connection.execute(
            "UPDATE review_queue SET upload_error = ?2, updated_at = ?3 WHERE id = ?1",
            params![outcome.review_id, outcome.error, now],
        )?;
    }
    Ok(())
}

pub fn status_counts(connection: &Connection) -> Result<Vec<(String, i64)>> {
    let mut statement = connection
        .prepare("SELECT status, COUNT(*) FROM review_queue GROUP BY status ORDER BY status")?;
    let counts = statement
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(counts)
}

pub fn uploaded_count(connection: &Connection) -> Result<i64> {
    let count = connection.query_row(
        "SELECT COUNT(*) FROM review_queue WHERE uploaded_at IS NOT NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
