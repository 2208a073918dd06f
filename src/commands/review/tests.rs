use chrono::NaiveDate;
use rusqlite::{Connection, params};

use super::db_setup::open_review_db;
use super::queue::{self, EnqueueSummary, QueueEntry};
use super::run::enqueue_manifest;
use crate::cli::{ReviewEnqueueArgs, ReviewStatus};
use crate::model::{
    CaseMatch, ExtractionResult, MatchRecord, MatchStatus, MatchStrategy, QualityIssue,
    UploadOutcome, WorkPaths,
};

const NOW: &str = "2024-07-20T12:00:00Z";

fn open(dir: &tempfile::TempDir) -> Connection {
    open_review_db(&dir.path().join("review.sqlite")).expect("review db should open")
}

fn record(sha: &str, case_id: Option<&str>) -> MatchRecord {
    let extraction = ExtractionResult {
        filename: format!("{sha}.pdf"),
        source_path: format!("/intake/{sha}.pdf"),
        sha256: sha.to_string(),
        taxpayer_name: Some("Jane Doe".into()),
        spouse_name: None,
        ssn_last_4: Some("6789".into()),
        full_ssn: None,
        letter_type: Some("CP2000".into()),
        notice_date: NaiveDate::from_ymd_opt(2024, 7, 15),
        notice_ref_number: None,
        tax_year: Some("2022".into()),
        urgency_level: None,
        urgency_status: None,
        response_due_date: NaiveDate::from_ymd_opt(2024, 8, 14),
        days_remaining: None,
        response_days_allowed: Some(30),
        urgency_description: None,
        extraction_confidence: 0.8,
        quality_issues: vec![QualityIssue::NoNoticeRef],
        needs_review: true,
        processing_timestamp: NOW.into(),
        extraction_method: "ocr_multi_pass".into(),
    };
    let case_match = match case_id {
        Some(case_id) => CaseMatch {
            case_id: Some(case_id.to_string()),
            strategy: Some(MatchStrategy::Direct),
            detail: None,
            ..CaseMatch::unmatched(MatchStatus::Matched, "")
        },
        None => CaseMatch::unmatched(MatchStatus::NotFound, "no case"),
    };
    MatchRecord {
        extraction,
        case_match,
    }
}

fn enqueue(connection: &mut Connection, records: &[MatchRecord]) -> EnqueueSummary {
    let date = NaiveDate::from_ymd_opt(2024, 7, 15).expect("valid date");
    let entries: Vec<QueueEntry<'_>> = records
        .iter()
        .map(|record| QueueEntry {
            record,
            document_date: date,
        })
        .collect();
    queue::enqueue(connection, &entries, NOW).expect("enqueue should succeed")
}

#[test]
fn new_documents_are_queued_under_review() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let mut connection = open(&dir);

    let summary = enqueue(&mut connection, &[record("aaa", Some("104233")), record("bbb", None)]);
    assert_eq!(summary, EnqueueSummary { inserted: 2, refreshed: 0 });

    let rows = queue::list(&connection, None).expect("list rows");
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row.status == "UNDER_REVIEW"));
    assert_eq!(rows[0].case_id.as_deref(), Some("104233"));
    assert_eq!(rows[0].match_strategy.as_deref(), Some("direct"));
    assert_eq!(rows[0].quality_issues, "no_notice_ref");
    assert_eq!(rows[0].notice_date.as_deref(), Some("July 15, 2024"));
    assert_eq!(rows[1].match_status, "not_found");
    assert_eq!(
        rows[0].response_due(),
        NaiveDate::from_ymd_opt(2024, 8, 14)
    );
}

#[test]
fn requeue_keeps_operator_decisions() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let mut connection = open(&dir);
    enqueue(&mut connection, &[record("bbb", None)]);
    let id = queue::list(&connection, None).expect("list rows")[0].id;

    queue::set_status(
        &connection,
        id,
        ReviewStatus::Approve,
        Some(" 555001 "),
        Some("confirmed by phone"),
        NOW,
    )
    .expect("status update");

    let summary = enqueue(&mut connection, &[record("bbb", None)]);
    assert_eq!(summary, EnqueueSummary { inserted: 0, refreshed: 1 });

    let row = queue::get(&connection, id)
        .expect("get row")
        .expect("row exists");
    assert_eq!(row.status, ReviewStatus::Approve.as_str());
    assert_eq!(row.case_id.as_deref(), Some("555001"));
    assert_eq!(row.notes.as_deref(), Some("confirmed by phone"));
}

#[test]
fn only_approved_rows_with_case_ids_are_pending_upload() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let mut connection = open(&dir);
    enqueue(
        &mut connection,
        &[
            record("aaa", Some("104233")),
            record("bbb", None),
            record("ccc", Some("104999")),
        ],
    );
    let rows = queue::list(&connection, None).expect("list rows");
    for row in &rows {
        queue::set_status(&connection, row.id, ReviewStatus::Approve, None, None, NOW)
            .expect("approve");
    }
    queue::set_status(&connection, rows[2].id, ReviewStatus::Reject, None, None, NOW)
        .expect("reject");

    let pending = queue::pending_uploads(&connection, None).expect("pending rows");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].document_sha256, "aaa");

    let approved = queue::list(&connection, Some(ReviewStatus::Approve)).expect("approved rows");
    assert_eq!(approved.len(), 2);
}

#[test]
fn recorded_upload_is_never_pending_again() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let mut connection = open(&dir);
    enqueue(&mut connection, &[record("aaa", Some("104233"))]);
    let id = queue::list(&connection, None).expect("list rows")[0].id;
    queue::set_status(&connection, id, ReviewStatus::Approve, None, None, NOW).expect("approve");

    let failed = UploadOutcome {
        review_id: id,
        case_id: "104233".into(),
        original_filename: "aaa.pdf".into(),
        uploaded_filename: "104233_CP2000_07.15.2024.pdf".into(),
        document_uploaded: false,
        task_id: None,
        error: Some("CRM returned 503".into()),
    };
    queue::record_upload(&connection, &failed, NOW).expect("record failure");
    assert_eq!(queue::pending_uploads(&connection, None).expect("pending").len(), 1);

    let uploaded = UploadOutcome {
        document_uploaded: true,
        task_id: Some("77".into()),
        error: None,
        ..failed
    };
    queue::record_upload(&connection, &uploaded, NOW).expect("record success");
    assert!(queue::pending_uploads(&connection, None).expect("pending").is_empty());

    let row = queue::get(&connection, id).expect("get").expect("row exists");
    assert_eq!(row.task_id.as_deref(), Some("77"));
    assert_eq!(row.upload_error, None);
    assert_eq!(queue::uploaded_count(&connection).expect("count"), 1);
}

#[test]
fn status_column_rejects_unknown_values() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let mut connection = open(&dir);
    enqueue(&mut connection, &[record("aaa", None)]);

    let result = connection.execute(
        "UPDATE review_queue SET status = ?1 WHERE document_sha256 = 'aaa'",
        params!["MAYBE"],
    );
    assert!(result.is_err());

    let missing = queue::set_status(&connection, 9999, ReviewStatus::Reject, None, None, NOW);
    assert!(missing.is_err());

    let counts = queue::status_counts(&connection).expect("counts");
    assert_eq!(counts, vec![("UNDER_REVIEW".to_string(), 1)]);
}

#[test]
fn enqueue_stamps_document_dates_with_the_given_rules() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let mut connection = open(&dir);
    let paths = WorkPaths::new(&dir.path().join("work"));

    let mut old_notice = record("ccc", Some("104233"));
    old_notice.extraction.filename = "DTD_05.01.2012_SMITH.pdf".into();
    old_notice.extraction.notice_date = None;
    let manifest_path = dir.path().join("match_20240720T120000Z.json");
    let manifest = serde_json::json!({
        "run_id": "match-20240720T120000Z",
        "records": [old_notice],
    });
    std::fs::write(
        &manifest_path,
        serde_json::to_vec_pretty(&manifest).expect("manifest should serialize"),
    )
    .expect("manifest should be written");

    let rules_path = dir.path().join("rules.toml");
    std::fs::write(&rules_path, "notice_year_min = 2010\n").expect("rules should be written");

    let args = ReviewEnqueueArgs {
        match_manifest_path: Some(manifest_path),
        rules_path: Some(rules_path),
    };
    enqueue_manifest(&mut connection, &paths, &args).expect("enqueue should succeed");

    let rows = queue::list(&connection, None).expect("list rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].document_date, "2012-05-01");
}

