use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::util::ensure_directory;

pub fn open_review_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }
    let connection = Connection::open(path)
        .with_context(|| format!("failed to open review database {}", path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

pub(super) fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
        CREATE TABLE IF NOT EXISTS review_queue (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          document_sha256 TEXT NOT NULL UNIQUE,
          filename TEXT NOT NULL,
          source_path TEXT NOT NULL,
          taxpayer_name TEXT,
          ssn_last_4 TEXT,
          letter_type TEXT,
          tax_year TEXT,
          notice_date TEXT,
          response_due_date TEXT,
          urgency_status TEXT,
          document_date TEXT NOT NULL,
          extraction_confidence REAL NOT NULL,
          quality_issues TEXT NOT NULL DEFAULT '',
          match_status TEXT NOT NULL,
          match_strategy TEXT,
          case_id TEXT,
          status TEXT NOT NULL DEFAULT 'UNDER_REVIEW'
            CHECK(status IN ('APPROVE', 'UNDER_REVIEW', 'REJECT')),
          notes TEXT,
          queued_at TEXT NOT NULL,
          updated_at TEXT NOT NULL,
          uploaded_at TEXT,
          uploaded_filename TEXT,
          task_id TEXT,
          upload_error TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_review_queue_status ON review_queue(status);
        ",
        )
        .context("failed to create review_queue schema")?;
    Ok(())
}
