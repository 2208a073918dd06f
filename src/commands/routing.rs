use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::commands::extract::NoticeDateExtractor;
use crate::model::{ExtractionResult, MatchRecord, WorkPaths};
use crate::rules::ExtractionRules;
use crate::util::{ensure_directory, sha256_file};

const MAX_NAME_ATTEMPTS: usize = 100;

/// Chooses the date stamped into CRM upload filenames.
#[derive(Debug, Clone)]
pub struct DocumentNamer {
    dates: NoticeDateExtractor,
    today: NaiveDate,
}

impl DocumentNamer {
    pub fn new(rules: &ExtractionRules, today: NaiveDate) -> Result<Self> {
        Ok(Self {
            dates: NoticeDateExtractor::new(rules)?,
            today,
        })
    }

    /// Intake `DTD` token first, then the notice date, then today.
    pub fn document_date(&self, extraction: &ExtractionResult) -> NaiveDate {
        self.dates
            .from_filename(&extraction.filename)
            .map(|(date, _)| date)
            .or(extraction.notice_date)
            .unwrap_or(self.today)
    }
}

pub fn proposed_document_name(case_id: &str, date: NaiveDate) -> String {
    format!("{}_CP2000_{}.pdf", case_id.trim(), date.format("%m.%d.%Y"))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteSummary {
    pub matched: usize,
    pub unmatched: usize,
    pub failed: usize,
}

/// Copies each source PDF into `matched/` under its proposed CRM name or into
/// `unmatched/` under its original name. Sources are never moved, and a name
/// held by a different document gets a numeric suffix instead of being overwritten.
pub fn route_documents(
    records: &[MatchRecord],
    namer: &DocumentNamer,
    paths: &WorkPaths,
) -> Result<RouteSummary> {
    ensure_directory(&paths.matched_dir)?;
    ensure_directory(&paths.unmatched_dir)?;

    let mut summary = RouteSummary::default();
    for record in records {
        let extraction = &record.extraction;
        let (dir, name) = match record.case_match.case_id.as_deref() {
            Some(case_id) if record.case_match.is_matched() => (
                &paths.matched_dir,
                proposed_document_name(case_id, namer.document_date(extraction)),
            ),
            _ => (&paths.unmatched_dir, extraction.filename.clone()),
        };

        let routed = free_target(dir, &name, &extraction.sha256).and_then(|target| {
            copy_document(Path::new(&extraction.source_path), &target)?;
            Ok(target)
        });
        match routed {
            Ok(target) => {
                if target.file_name().and_then(|value| value.to_str()) != Some(name.as_str()) {
                    warn!(
                        file = %extraction.filename,
                        proposed = %name,
                        routed = %target.display(),
                        "routed name already taken by another document"
                    );
                }
                if record.case_match.is_matched() {
                    summary.matched += 1;
                } else {
                    summary.unmatched += 1;
                }
            }
            Err(err) => {
                warn!(file = %extraction.filename, error = %err, "failed to route document");
                summary.failed += 1;
            }
        }
    }

    info!(
        matched = summary.matched,
        unmatched = summary.unmatched,
        failed = summary.failed,
        matched_dir = %paths.matched_dir.display(),
        unmatched_dir = %paths.unmatched_dir.display(),
        "documents routed"
    );
    Ok(summary)
}

/// First of `name`, `stem_2.ext`, `stem_3.ext`, ... in `dir` that is either free
/// or already holds the document with `sha256`.
fn free_target(dir: &Path, name: &str, sha256: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or(name);
    let extension = path.extension().and_then(|value| value.to_str());

    for attempt in 1..=MAX_NAME_ATTEMPTS {
        let candidate = match (attempt, extension) {
            (1, _) => name.to_string(),
            (_, Some(extension)) => format!("{stem}_{attempt}.{extension}"),
            (_, None) => format!("{stem}_{attempt}"),
        };
        let target = dir.join(candidate);
        if !target.exists() || sha256_file(&target)? == sha256 {
            return Ok(target);
        }
    }
    bail!("no free routed name for {name} in {}", dir.display())
}

fn copy_document(source: &Path, target: &Path) -> Result<()> {
    fs::copy(source, target).with_context(|| {
        format!(
            "failed to copy {} to {}",
            source.display(),
            target.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CaseMatch, MatchStatus, MatchStrategy};

    fn record(filename: &str, source: &Path, case_id: Option<&str>) -> MatchRecord {
        let extraction: ExtractionResult = serde_json::from_value(serde_json::json!({
            "filename": filename,
            "source_path": source.display().to_string(),
            "sha256": format!("hash-{filename}"),
            "taxpayer_name": "Jane Doe",
            "spouse_name": null,
            "ssn_last_4": "6789",
            "full_ssn": null,
            "letter_type": "CP2000",
            "notice_date": "July 15, 2024",
            "notice_ref_number": null,
            "tax_year": "2022",
            "urgency_level": null,
            "urgency_status": null,
            "response_due_date": null,
            "days_remaining": null,
            "response_days_allowed": null,
            "urgency_description": null,
            "extraction_confidence": 0.8,
            "quality_issues": [],
            "needs_review": true,
            "processing_timestamp": "2024-07-20T12:00:00Z",
            "extraction_method": "ocr_multi_pass"
        }))
        .expect("fixture should deserialize");

        let case_match = match case_id {
            Some(case_id) => CaseMatch {
                case_id: Some(case_id.to_string()),
                status: MatchStatus::Matched,
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

    fn namer() -> DocumentNamer {
        let today = NaiveDate::from_ymd_opt(2024, 9, 1).expect("valid date");
        DocumentNamer::new(&ExtractionRules::default(), today).expect("namer should build")
    }

    #[test]
    fn document_date_prefers_filename_token() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let source = dir.path().join("doe.pdf");
        let with_token = record("DOE JANE CP2000 DTD 08.02.2024.pdf", &source, Some("1"));
        let without_token = record("DOE JANE CP2000.pdf", &source, Some("1"));

        let namer = namer();
        assert_eq!(
            namer.document_date(&with_token.extraction),
            NaiveDate::from_ymd_opt(2024, 8, 2).expect("valid date")
        );
        assert_eq!(
            namer.document_date(&without_token.extraction),
            NaiveDate::from_ymd_opt(2024, 7, 15).expect("valid date")
        );

        let mut undated = without_token.extraction.clone();
        undated.notice_date = None;
        assert_eq!(
            namer.document_date(&undated),
            NaiveDate::from_ymd_opt(2024, 9, 1).expect("valid date")
        );
    }

    #[test]
    fn proposed_name_uses_case_id_and_us_date() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 5).expect("valid date");
        assert_eq!(proposed_document_name("104233", date), "104233_CP2000_07.05.2024.pdf");
    }

    #[test]
    fn routing_copies_into_matched_and_unmatched() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let source_a = dir.path().join("a.pdf");
        let source_b = dir.path().join("b.pdf");
        fs::write(&source_a, b"%PDF-a").expect("write source a");
        fs::write(&source_b, b"%PDF-b").expect("write source b");
        let missing = dir.path().join("missing.pdf");

        let records = vec![
            record("a.pdf", &source_a, Some("104233")),
            record("b.pdf", &source_b, None),
            record("missing.pdf", &missing, None),
        ];
        let paths = WorkPaths::new(&dir.path().join("work"));

        let summary = route_documents(&records, &namer(), &paths).expect("routing should run");
        assert_eq!(
            summary,
            RouteSummary {
                matched: 1,
                unmatched: 1,
                failed: 1
            }
        );
        assert!(paths.matched_dir.join("104233_CP2000_07.15.2024.pdf").is_file());
        assert!(paths.unmatched_dir.join("b.pdf").is_file());
        assert!(source_a.is_file(), "sources stay in place");
    }

    #[test]
    fn same_case_and_date_keeps_both_documents() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let first = dir.path().join("first.pdf");
        let second = dir.path().join("second.pdf");
        fs::write(&first, b"FIRST-NOTICE").expect("write first");
        fs::write(&second, b"SECOND-NOTICE").expect("write second");

        let mut records = vec![
            record("first.pdf", &first, Some("42")),
            record("second.pdf", &second, Some("42")),
        ];
        for (entry, source) in records.iter_mut().zip([&first, &second]) {
            entry.extraction.sha256 = sha256_file(source).expect("source should hash");
        }
        let paths = WorkPaths::new(&dir.path().join("work"));

        let summary = route_documents(&records, &namer(), &paths).expect("routing should run");
        assert_eq!(summary.matched, 2);
        assert_eq!(
            fs::read(paths.matched_dir.join("42_CP2000_07.15.2024.pdf")).expect("first routed"),
            b"FIRST-NOTICE"
        );
        assert_eq!(
            fs::read(paths.matched_dir.join("42_CP2000_07.15.2024_2.pdf")).expect("second routed"),
            b"SECOND-NOTICE"
        );

        route_documents(&records, &namer(), &paths).expect("rerouting should run");
        let routed = fs::read_dir(&paths.matched_dir)
            .expect("matched dir should list")
            .count();
        assert_eq!(routed, 2, "routing the same documents again adds no copies");
    }

    #[test]
    fn unmatched_documents_with_the_same_filename_both_survive() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let intake_a = dir.path().join("intake-a");
        let intake_b = dir.path().join("intake-b");
        fs::create_dir_all(&intake_a).expect("create intake a");
        fs::create_dir_all(&intake_b).expect("create intake b");
        let source_a = intake_a.join("notice.pdf");
        let source_b = intake_b.join("notice.pdf");
        fs::write(&source_a, b"%PDF-a").expect("write source a");
        fs::write(&source_b, b"%PDF-b").expect("write source b");

        let records = vec![
            record("notice.pdf", &source_a, None),
            record("notice.pdf", &source_b, None),
        ];
        let paths = WorkPaths::new(&dir.path().join("work"));

        let summary = route_documents(&records, &namer(), &paths).expect("routing should run");
        assert_eq!(summary.unmatched, 2);
        assert_eq!(
            fs::read(paths.unmatched_dir.join("notice.pdf")).expect("first kept"),
            b"%PDF-a"
        );
        assert_eq!(
            fs::read(paths.unmatched_dir.join("notice_2.pdf")).expect("second kept"),
            b"%PDF-b"
        );
    }
}
