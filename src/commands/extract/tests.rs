use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;

use super::discovery::{SourceDocument, discover_pdfs};
use super::document::FieldExtractor;
use super::fields_dates::{NoticeDateExtractor, month_number};
use super::fields_identity::IdentityExtractor;
use super::fields_letter_type::LetterTypeExtractor;
use super::fields_reference::ReferenceExtractor;
use super::fields_ssn::{SeenSsns, SsnExtractor, SsnRejection};
use super::ledger::ProcessingLedger;
use super::page_text::DocumentText;
use super::report::{field_compliance, issue_tally};
use super::run::{record_in_ledger, select_pending};
use super::urgency::{assess, profile_for};
use crate::model::{QualityIssue, UrgencyLevel, UrgencyStatus};
use crate::rules::ExtractionRules;

fn rules() -> ExtractionRules {
    ExtractionRules::default()
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

fn source(filename: &str) -> SourceDocument {
    SourceDocument {
        path: PathBuf::from("/intake/CP2000").join(filename),
        filename: filename.to_string(),
        sha256: format!("sha-{filename}"),
    }
}

fn ocr_text(body: &str) -> DocumentText {
    DocumentText {
        header_text: String::new(),
        candidates: vec![body.to_string()],
        text_layer_used: false,
        ocr_passes: 1,
    }
}

const FULL_NOTICE: &str = "Department of the Treasury\n\
Internal Revenue Service\n\
Notice CP2000\n\
Notice date July 15, 2024\n\
Tax year 2022\n\
Social Security number 123-45-6789\n\
Notice number 92606-8278\n\
Spouse's name: Maria Lopez\n";

#[test]
fn control_number_shaped_ssns_are_rejected() {
    let extractor = SsnExtractor::new(&rules()).expect("patterns compile");
    let mut seen = SeenSsns::new();

    for candidate in ["872345678", "87123-45-6789", "881234567", "89012-34-5678"] {
        assert_eq!(
            extractor.validate(candidate, &mut seen),
            Err(SsnRejection::ControlNumber),
            "{candidate}"
        );
    }
    assert_eq!(
        extractor.validate("12345-6789", &mut seen),
        Err(SsnRejection::ReferenceShaped)
    );
    assert_eq!(seen.len(), 0);
}

#[test]
fn ssn_validation_normalizes_and_rejects_invalid_areas() {
    let extractor = SsnExtractor::new(&rules()).expect("patterns compile");
    let mut seen = SeenSsns::new();

    assert_eq!(
        extractor.validate("123456789", &mut seen).as_deref(),
        Ok("123-45-6789")
    );
    assert_eq!(extractor.validate("6789", &mut seen).as_deref(), Ok("6789"));
    assert_eq!(
        extractor.validate("000-12-3456", &mut seen),
        Err(SsnRejection::InvalidArea)
    );
    assert_eq!(
        extractor.validate("666-12-3456", &mut seen),
        Err(SsnRejection::InvalidArea)
    );
    assert_eq!(
        extractor.validate("912-34-5678", &mut seen),
        Err(SsnRejection::InvalidArea)
    );
    assert_eq!(
        extractor.validate("12-345", &mut seen),
        Err(SsnRejection::Malformed)
    );
}

#[test]
fn ssn_seen_earlier_in_the_run_is_a_duplicate() {
    let extractor = SsnExtractor::new(&rules()).expect("patterns compile");
    let mut seen = SeenSsns::new();

    let first = extractor
        .extract("SSN: 123-45-6789", "", &mut seen)
        .expect("first notice yields an SSN");
    assert_eq!(first.full_ssn.as_deref(), Some("123-45-6789"));
    assert_eq!(first.last_4, "6789");
    assert_eq!(first.method, "labeled");

    assert_eq!(extractor.extract("SSN: 123-45-6789", "", &mut seen), None);
}

#[test]
fn flexible_ssn_skips_control_numbers_and_finds_the_real_one() {
    let extractor = SsnExtractor::new(&rules()).expect("patterns compile");
    let mut seen = SeenSsns::new();

    let text = "AUR control 872345678 and taxpayer 234 56 7890";
    let found = extractor
        .extract(text, "", &mut seen)
        .expect("flexible pass should find the taxpayer SSN");
    assert_eq!(found.full_ssn.as_deref(), Some("234-56-7890"));
    assert_eq!(found.method, "flexible");
}

#[test]
fn header_last_four_is_kept_without_full_ssn() {
    let extractor = SsnExtractor::new(&rules()).expect("patterns compile");
    let mut seen = SeenSsns::new();

    let found = extractor
        .extract("no identifiers here", "SSN ending in 4321", &mut seen)
        .expect("header should yield last four");
    assert_eq!(found.full_ssn, None);
    assert_eq!(found.last_4, "4321");
    assert_eq!(found.method, "header");
}

#[test]
fn ocr_confused_letter_types_normalize_to_cp2000() {
    let extractor = LetterTypeExtractor::new(&rules()).expect("patterns compile");

    for text in ["Notice CP7000 enclosed", "form CP 0000", "CP29OO notice", "CP20O0"] {
        assert_eq!(extractor.extract(text).as_deref(), Some("CP2000"), "{text}");
    }
}

#[test]
fn letter_types_are_normalized_and_prioritized() {
    let extractor = LetterTypeExtractor::new(&rules()).expect("patterns compile");

    assert_eq!(extractor.extract("Letter LT 11 demand").as_deref(), Some("LTR11"));
    assert_eq!(extractor.extract("See cp 3219a").as_deref(), Some("CP3219A"));
    assert_eq!(extractor.extract("Notice CP2000 and CP504").as_deref(), Some("CP2000"));
    assert_eq!(extractor.extract("reply to CP 9876").as_deref(), Some("CP9876"));
    assert_eq!(extractor.extract("CPOOOO smudge"), None);
    assert_eq!(extractor.extract("nothing to see"), None);
    assert!(extractor.is_known("LTR226J"));
    assert!(!extractor.is_known("XYZ1"));
}

#[test]
fn notice_date_prefers_labels_and_checks_the_calendar() {
    let extractor = NoticeDateExtractor::new(&rules()).expect("patterns compile");

    let (found, method) = extractor
        .extract("Notice date: JULY 15, 2024", "", "scan.pdf")
        .expect("labeled date");
    assert_eq!(found, date(2024, 7, 15));
    assert_eq!(method, "labeled");

    assert_eq!(extractor.extract("Notice date February 30, 2024", "", "scan.pdf"), None);
    assert_eq!(extractor.extract("Notice date July 15, 2019", "", "scan.pdf"), None);
}

#[test]
fn notice_date_falls_back_to_filename_token() {
    let extractor = NoticeDateExtractor::new(&rules()).expect("patterns compile");

    let (found, method) = extractor
        .extract("smudged header without dates", "", "DTD_07.15.2024_SMITH.pdf")
        .expect("filename date");
    assert_eq!(found, date(2024, 7, 15));
    assert_eq!(method, "filename_dtd");

    let (found, _) = extractor
        .extract("", "", "DTD 3.4.2025_JONES - 2.pdf")
        .expect("single digit filename date");
    assert_eq!(found, date(2025, 3, 4));
}

#[test]
fn flexible_notice_date_accepts_abbreviated_months() {
    let extractor = NoticeDateExtractor::new(&rules()).expect("patterns compile");
    let (found, method) = extractor
        .extract("We sent this on Sept 9 2024 to you", "", "scan.pdf")
        .expect("abbreviated date");
    assert_eq!(found, date(2024, 9, 9));
    assert_eq!(method, "flexible");
    assert_eq!(month_number("Dec"), Some(12));
    assert_eq!(month_number("Notice"), None);
}

#[test]
fn reference_validation_filters_noise() {
    let extractor = ReferenceExtractor::new(&rules()).expect("patterns compile");

    assert!(extractor.is_valid("92606-8278"));
    assert!(extractor.is_valid("CA92606-8278"));
    assert!(extractor.is_valid("1234567"));
    assert!(!extractor.is_valid("12345"));
    assert!(!extractor.is_valid("PAYMENTS-1234"));
    assert!(!extractor.is_valid("12-345678"));
    assert!(!extractor.is_valid("AB$12-3456"));
}

#[test]
fn reference_cascade_normalizes_ocr_spacing() {
    let extractor = ReferenceExtractor::new(&rules()).expect("patterns compile");

    let (labeled, method) = extractor
        .extract("Notice number: ca92606-8278", "")
        .expect("labeled reference");
    assert_eq!(labeled, "CA92606-8278");
    assert_eq!(method, "labeled");

    let (flexible, method) = extractor
        .extract("printed as 92606 8278 on the stub", "")
        .expect("flexible reference");
    assert_eq!(flexible, "92606-8278");
    assert_eq!(method, "flexible");
}

#[test]
fn taxpayer_name_comes_from_intake_filename() {
    let extractor = IdentityExtractor::new(&rules()).expect("patterns compile");

    assert_eq!(
        extractor.taxpayer_name("DTD_07.15.2024_SMITH.pdf").as_deref(),
        Some("Smith")
    );
    assert_eq!(
        extractor.taxpayer_name("DTD 07.15.2024_GARCIA - 2.pdf").as_deref(),
        Some("Garcia")
    );
    assert_eq!(
        extractor.taxpayer_name("DTD 07.15.2024 MARY ANN LEE.pdf").as_deref(),
        Some("Mary Ann Lee")
    );
    assert_eq!(extractor.taxpayer_name("scan0001.pdf"), None);
}

#[test]
fn tax_year_prefers_filename_then_content() {
    let extractor = IdentityExtractor::new(&rules()).expect("patterns compile");

    assert_eq!(
        extractor.tax_year("", "CP2000_2021_SMITH.pdf"),
        Some(("2021".to_string(), "filename"))
    );
    assert_eq!(
        extractor.tax_year("", "DTD_07.15.2024_SMITH.pdf"),
        Some(("2023".to_string(), "filename_dtd"))
    );
    assert_eq!(
        extractor.tax_year("Tax year: 2022", "scan.pdf"),
        Some(("2022".to_string(), "content"))
    );
    assert_eq!(extractor.tax_year("Tax year: 2012", "scan.pdf"), None);
}

#[test]
fn spouse_name_rejects_keyword_captures() {
    let extractor = IdentityExtractor::new(&rules()).expect("patterns compile");

    assert_eq!(
        extractor
            .spouse_name("Spouse's name: Maria Lopez", "")
            .as_deref(),
        Some("Maria Lopez")
    );
    assert_eq!(extractor.spouse_name("Spouse name: Notice Date", ""), None);
}

#[test]
fn due_date_and_days_remaining_follow_the_profile() {
    let notice = date(2024, 7, 15);

    let pending = assess(notice, "CP2000", date(2024, 7, 20));
    assert_eq!(pending.due_date, date(2024, 8, 14));
    assert_eq!(pending.days_remaining, 25);
    assert_eq!(pending.status, UrgencyStatus::Pending);
    assert_eq!(pending.level, UrgencyLevel::High);

    let urgent = assess(notice, "CP2000", date(2024, 8, 1));
    assert_eq!(urgent.days_remaining, 13);
    assert_eq!(urgent.status, UrgencyStatus::Urgent);

    let immediate = assess(notice, "CP2000", date(2024, 8, 14));
    assert_eq!(immediate.days_remaining, 0);
    assert_eq!(immediate.status, UrgencyStatus::Immediate);
    assert_eq!(immediate.level, UrgencyLevel::Critical);

    let overdue = assess(notice, "CP504", date(2024, 8, 1));
    assert_eq!(overdue.due_date, date(2024, 7, 25));
    assert_eq!(overdue.status, UrgencyStatus::Overdue);

    assert_eq!(profile_for("CP3219A").response_days, 90);
    assert_eq!(profile_for("LTR1058").urgency_level, UrgencyLevel::Critical);
    assert_eq!(profile_for("CP14").urgency_level, UrgencyLevel::Medium);
}

#[test]
fn complete_notice_needs_no_review() {
    let extractor = FieldExtractor::new(&rules()).expect("patterns compile");
    let mut seen = SeenSsns::new();
    let text = ocr_text(FULL_NOTICE);

    let result = extractor.extract(
        &source("DTD_07.15.2024_SMITH.pdf"),
        Some(&text),
        &mut seen,
        date(2024, 7, 20),
        "2024-07-20T00:00:00Z",
    );

    assert_eq!(result.taxpayer_name.as_deref(), Some("Smith"));
    assert_eq!(result.ssn_last_4.as_deref(), Some("6789"));
    assert_eq!(result.letter_type.as_deref(), Some("CP2000"));
    assert_eq!(result.notice_date, Some(date(2024, 7, 15)));
    assert_eq!(result.notice_ref_number.as_deref(), Some("92606-8278"));
    assert_eq!(result.tax_year.as_deref(), Some("2023"));
    assert_eq!(result.spouse_name.as_deref(), Some("Maria Lopez"));
    assert_eq!(result.response_due_date, Some(date(2024, 8, 14)));
    assert_eq!(result.days_remaining, Some(25));
    assert_eq!(result.extraction_confidence, 1.0);
    assert!(result.quality_issues.is_empty());
    assert!(!result.needs_review);
}

#[test]
fn filename_date_is_used_when_text_has_none() {
    let extractor = FieldExtractor::new(&rules()).expect("patterns compile");
    let mut seen = SeenSsns::new();
    let text = ocr_text("Notice CP2000\nSocial Security number 123-45-6789\n");

    let result = extractor.extract(
        &source("DTD_07.15.2024_SMITH.pdf"),
        Some(&text),
        &mut seen,
        date(2024, 7, 20),
        "2024-07-20T00:00:00Z",
    );

    let rendered = serde_json::to_value(&result).expect("result serializes");
    assert_eq!(rendered["notice_date"], "July 15, 2024");
    assert_eq!(rendered["response_due_date"], "August 14, 2024");
    assert_eq!(result.quality_issues, vec![QualityIssue::NoNoticeRef]);
    assert!(result.needs_review);
}

#[test]
fn control_number_only_notice_reports_no_valid_ssn() {
    let extractor = FieldExtractor::new(&rules()).expect("patterns compile");
    let mut seen = SeenSsns::new();
    let text = ocr_text("Notice CP2000\nNotice date July 15, 2024\nSSN 872345678\n");

    let result = extractor.extract(
        &source("DTD_07.15.2024_SMITH.pdf"),
        Some(&text),
        &mut seen,
        date(2024, 7, 20),
        "2024-07-20T00:00:00Z",
    );

    assert_eq!(result.ssn_last_4, None);
    assert!(result.quality_issues.contains(&QualityIssue::NoValidSsn));
    assert!(result.needs_review);
    assert_eq!(result.extraction_confidence, 0.8);
}

#[test]
fn failed_text_recovery_still_reads_the_filename() {
    let extractor = FieldExtractor::new(&rules()).expect("patterns compile");
    let mut seen = SeenSsns::new();

    let result = extractor.extract(
        &source("DTD_07.15.2024_SMITH.pdf"),
        None,
        &mut seen,
        date(2024, 7, 20),
        "2024-07-20T00:00:00Z",
    );

    assert_eq!(result.quality_issues.first(), Some(&QualityIssue::ExtractionError));
    assert_eq!(result.taxpayer_name.as_deref(), Some("Smith"));
    assert_eq!(result.notice_date, Some(date(2024, 7, 15)));
    assert_eq!(result.tax_year.as_deref(), Some("2023"));
    assert!(result.quality_issues.contains(&QualityIssue::NoLetterType));
    assert!(result.quality_issues.contains(&QualityIssue::CannotCalculateUrgency));
    assert_eq!(result.extraction_method, "filename_only");
    assert!(result.needs_review);
}

#[test]
fn report_counts_fields_and_issues() {
    let extractor = FieldExtractor::new(&rules()).expect("patterns compile");
    let mut seen = SeenSsns::new();
    let results = vec![
        extractor.extract(
            &source("DTD_07.15.2024_SMITH.pdf"),
            Some(&ocr_text(FULL_NOTICE)),
            &mut seen,
            date(2024, 7, 20),
            "now",
        ),
        extractor.extract(&source("scan.pdf"), None, &mut seen, date(2024, 7, 20), "now"),
    ];

    let compliance = field_compliance(&results);
    let names = compliance
        .iter()
        .find(|entry| entry.field == "taxpayer_name")
        .expect("name compliance row");
    assert_eq!((names.populated, names.total), (1, 2));
    assert_eq!(names.percent(), 50.0);

    let tally = issue_tally(&results);
    assert_eq!(tally.get("extraction_error"), Some(&1));
    assert_eq!(tally.get("no_taxpayer_name_from_filename"), Some(&1));
}

#[test]
fn ledger_skips_recorded_hashes_after_reload() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("manifests").join("processing_history.json");

    let mut ledger = ProcessingLedger::load(&path).expect("missing ledger loads empty");
    assert_eq!(ledger.len(), 0);
    ledger.record("abc123", "DTD_07.15.2024_SMITH.pdf", "complete");
    ledger.save().expect("ledger saves");

    let reloaded = ProcessingLedger::load(&path).expect("ledger reloads");
    assert!(reloaded.contains("abc123"));
    assert!(!reloaded.contains("def456"));

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("ledger readable"))
            .expect("ledger is json");
    assert_eq!(raw["entries"]["abc123"]["status"], "complete");
    assert!(raw["last_check"].is_string());
}

#[test]
fn discovery_respects_folder_filter() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let root = dir.path().join("intake");
    let wanted = root.join("2024").join("CP2000 Letters");
    let other = root.join("Misc");
    fs::create_dir_all(&wanted).expect("wanted dir");
    fs::create_dir_all(&other).expect("other dir");
    fs::write(wanted.join("b.pdf"), b"%PDF-1.4").expect("pdf fixture");
    fs::write(wanted.join("a.PDF"), b"%PDF-1.4").expect("pdf fixture");
    fs::write(wanted.join("notes.txt"), b"text").expect("text fixture");
    fs::write(other.join("c.pdf"), b"%PDF-1.4").expect("pdf fixture");

    let filtered = discover_pdfs(&[root.clone()], Some("cp2000")).expect("discovery runs");
    let names: Vec<_> = filtered
        .iter()
        .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
        .collect();
    assert_eq!(names, vec!["a.PDF", "b.pdf"]);

    let everything = discover_pdfs(&[root], None).expect("discovery runs");
    assert_eq!(everything.len(), 3);
}

#[test]
fn seen_ssns_reject_repeated_full_ssns() {
    let extractor = SsnExtractor::new(&rules()).expect("patterns compile");
    let mut seen = SeenSsns::new();

    assert_eq!(
        extractor.validate("123456789", &mut seen),
        Ok("123-45-6789".to_string())
    );
    assert!(seen.contains("123-45-6789"));
    assert_eq!(
        extractor.validate("123-45-6789", &mut seen),
        Err(SsnRejection::Duplicate)
    );
    assert_eq!(seen.len(), 1);
    assert!(!seen.insert("123-45-6789"));
}

fn intake_with_duplicate(root: &std::path::Path) -> Vec<PathBuf> {
    let intake = root.join("intake");
    fs::create_dir_all(&intake).expect("intake dir");
    fs::write(intake.join("DTD_07.15.2024_SMITH.pdf"), b"%PDF-smith").expect("pdf fixture");
    fs::write(intake.join("DTD_08.01.2024_JONES.pdf"), b"%PDF-jones").expect("pdf fixture");
    fs::write(intake.join("copy of smith.pdf"), b"%PDF-smith").expect("pdf fixture");
    discover_pdfs(&[intake], None).expect("discovery runs")
}

#[test]
fn second_pass_over_unchanged_intake_processes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let discovered = intake_with_duplicate(dir.path());
    let ledger_path = dir.path().join("manifests").join("processing_history.json");
    let extractor = FieldExtractor::new(&rules()).expect("patterns compile");

    let mut ledger = ProcessingLedger::load(&ledger_path).expect("missing ledger loads empty");
    let first = select_pending(&discovered, &ledger, false, None);
    assert_eq!(first.pending.len(), 2, "repeated content is extracted once");
    assert_eq!(first.skipped, 1);

    let mut seen = SeenSsns::new();
    for source in &first.pending {
        let result = extractor.extract(
            source,
            Some(&ocr_text(FULL_NOTICE)),
            &mut seen,
            date(2024, 7, 20),
            "now",
        );
        record_in_ledger(&mut ledger, source, &result);
    }
    ledger.save().expect("ledger saves");

    let reloaded = ProcessingLedger::load(&ledger_path).expect("ledger reloads");
    let second = select_pending(&discovered, &reloaded, false, None);
    assert!(second.pending.is_empty());
    assert_eq!(second.skipped, discovered.len());

    let full = select_pending(&discovered, &reloaded, true, None);
    assert_eq!(full.pending.len(), 2, "full pass ignores the ledger");
    assert_eq!(full.skipped, 1);

    let limited = select_pending(&discovered, &reloaded, true, Some(1));
    assert_eq!(limited.pending.len(), 1);
}

#[test]
fn documents_without_text_stay_out_of_the_ledger() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let discovered = intake_with_duplicate(dir.path());
    let ledger_path = dir.path().join("processing_history.json");
    let extractor = FieldExtractor::new(&rules()).expect("patterns compile");

    let mut ledger = ProcessingLedger::load(&ledger_path).expect("missing ledger loads empty");
    let scan = select_pending(&discovered, &ledger, false, None);
    let mut seen = SeenSsns::new();
    for source in &scan.pending {
        let result = extractor.extract(source, None, &mut seen, date(2024, 7, 20), "now");
        assert!(result.quality_issues.contains(&QualityIssue::ExtractionError));
        record_in_ledger(&mut ledger, source, &result);
    }
    assert_eq!(ledger.len(), 0);

    let retry = select_pending(&discovered, &ledger, false, None);
    assert_eq!(retry.pending.len(), 2, "unreadable documents are retried");
}

