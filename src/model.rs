use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssue {
    NoTaxpayerNameFromFilename,
    NoLetterType,
    NoValidSsn,
    NoNoticeDate,
    NoNoticeRef,
    NoTaxYear,
    CannotCalculateUrgency,
    ExtractionError,
}

impl QualityIssue {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoTaxpayerNameFromFilename => "no_taxpayer_name_from_filename",
            Self::NoLetterType => "no_letter_type",
            Self::NoValidSsn => "no_valid_ssn",
            Self::NoNoticeDate => "no_notice_date",
            Self::NoNoticeRef => "no_notice_ref",
            Self::NoTaxYear => "no_tax_year",
            Self::CannotCalculateUrgency => "cannot_calculate_urgency",
            Self::ExtractionError => "extraction_error",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UrgencyLevel {
    Critical,
    High,
    Medium,
}

impl UrgencyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UrgencyStatus {
    Overdue,
    Immediate,
    Urgent,
    Pending,
}

impl UrgencyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overdue => "OVERDUE",
            Self::Immediate => "IMMEDIATE",
            Self::Urgent => "URGENT",
            Self::Pending => "PENDING",
        }
    }
}

/// Fields extracted from one scanned notice. Written once per document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub filename: String,
    pub source_path: String,
    pub sha256: String,
    pub taxpayer_name: Option<String>,
    pub spouse_name: Option<String>,
    pub ssn_last_4: Option<String>,
    pub full_ssn: Option<String>,
    pub letter_type: Option<String>,
    #[serde(default, with = "long_date::option")]
    pub notice_date: Option<NaiveDate>,
    pub notice_ref_number: Option<String>,
    pub tax_year: Option<String>,
    pub urgency_level: Option<UrgencyLevel>,
    pub urgency_status: Option<UrgencyStatus>,
    #[serde(default, with = "long_date::option")]
    pub response_due_date: Option<NaiveDate>,
    pub days_remaining: Option<i64>,
    pub response_days_allowed: Option<i64>,
    pub urgency_description: Option<String>,
    pub extraction_confidence: f64,
    pub quality_issues: Vec<QualityIssue>,
    pub needs_review: bool,
    pub processing_timestamp: String,
    pub extraction_method: String,
}

impl ExtractionResult {
    /// Last token of the taxpayer name, used as the CRM surname.
    pub fn last_name(&self) -> Option<&str> {
        self.taxpayer_name
            .as_deref()
            .and_then(|name| name.split_whitespace().last())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionCounts {
    pub discovered: usize,
    pub skipped_already_processed: usize,
    pub processed: usize,
    pub needs_review: usize,
    pub complete: usize,
    pub extraction_errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub command: String,
    pub source_directories: Vec<String>,
    pub ocr_mode: String,
    pub counts: ExtractionCounts,
    pub results: Vec<ExtractionResult>,
}

/// Read side of [`ExtractionRunManifest`]; only the results are needed downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionManifestInput {
    pub run_id: String,
    pub results: Vec<ExtractionResult>,
}

/// Header of any run manifest, enough for status reporting.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestHeader<C> {
    pub run_id: String,
    pub generated_at: String,
    pub counts: C,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    NotFound,
    Skipped,
    Error,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::NotFound => "not_found",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Direct,
    NameVariation,
    SsnCorrection,
}

impl MatchStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::NameVariation => "name_variation",
            Self::SsnCorrection => "ssn_correction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseMatch {
    pub case_id: Option<String>,
    pub taxpayer_name: Option<String>,
    pub ssn: Option<String>,
    pub status: MatchStatus,
    pub match_confidence: Option<f64>,
    pub match_type: Option<String>,
    pub strategy: Option<MatchStrategy>,
    pub name_used: Option<String>,
    pub original_ssn: Option<String>,
    pub detail: Option<String>,
}

impl CaseMatch {
    pub fn unmatched(status: MatchStatus, detail: impl Into<String>) -> Self {
        Self {
            case_id: None,
            taxpayer_name: None,
            ssn: None,
            status,
            match_confidence: None,
            match_type: None,
            strategy: None,
            name_used: None,
            original_ssn: None,
            detail: Some(detail.into()),
        }
    }

    pub fn is_matched(&self) -> bool {
        self.status == MatchStatus::Matched && self.case_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub extraction: ExtractionResult,
    pub case_match: CaseMatch,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchCounts {
    pub total: usize,
    pub matched: usize,
    pub matched_by_enhancement: usize,
    pub not_found: usize,
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub extraction_manifest_path: String,
    pub enhanced: bool,
    pub counts: MatchCounts,
    pub records: Vec<MatchRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchManifestInput {
    pub run_id: String,
    pub records: Vec<MatchRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub review_id: i64,
    pub case_id: String,
    pub original_filename: String,
    pub uploaded_filename: String,
    pub document_uploaded: bool,
    pub task_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub dry_run: bool,
    pub outcomes: Vec<UploadOutcome>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub filename: String,
    pub processed_at: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingHistory {
    #[serde(default)]
    pub entries: BTreeMap<String, LedgerEntry>,
    #[serde(default)]
    pub last_check: Option<String>,
}

/// Locations of every artifact kept under the working root.
#[derive(Debug, Clone, Serialize)]
pub struct WorkPaths {
    pub cache_root: PathBuf,
    pub manifest_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub review_db_path: PathBuf,
    pub matched_dir: PathBuf,
    pub unmatched_dir: PathBuf,
}

impl WorkPaths {
    pub fn new(cache_root: &Path) -> Self {
        let manifest_dir = cache_root.join("manifests");
        Self {
            cache_root: cache_root.to_path_buf(),
            ledger_path: manifest_dir.join("processing_history.json"),
            manifest_dir,
            review_db_path: cache_root.join("review.sqlite"),
            matched_dir: cache_root.join("routed").join("matched"),
            unmatched_dir: cache_root.join("routed").join("unmatched"),
        }
    }

    pub fn review_db(&self, override_path: Option<&Path>) -> PathBuf {
        override_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.review_db_path.clone())
    }
}

/// Long-form notice dates such as `July 15, 2024`.
pub mod long_date {
    use chrono::NaiveDate;

    pub fn format(date: NaiveDate) -> String {
        date.format("%B %-d, %Y").to_string()
    }

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(raw.trim(), "%B %d, %Y").ok()
    }

    pub mod option {
        use chrono::NaiveDate;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDate>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(date) => serializer.serialize_some(&super::format(*date)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDate>, D::Error> {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            match raw {
                None => Ok(None),
                Some(text) => super::parse(&text).map(Some).ok_or_else(|| {
                    serde::de::Error::custom(format!("invalid long-form date: {text}"))
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_date_renders_without_zero_padding() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 5).expect("valid date");
        assert_eq!(long_date::format(date), "July 5, 2024");
        assert_eq!(long_date::parse("July 5, 2024"), Some(date));
        assert_eq!(long_date::parse("Julember 5, 2024"), None);
    }

    #[test]
    fn quality_issue_tags_serialize_as_snake_case() {
        let tags = serde_json::to_string(&vec![
            QualityIssue::NoValidSsn,
            QualityIssue::CannotCalculateUrgency,
        ])
        .expect("tags should serialize");
        assert_eq!(tags, r#"["no_valid_ssn","cannot_calculate_urgency"]"#);
        assert_eq!(
            QualityIssue::NoTaxpayerNameFromFilename.as_str(),
            "no_taxpayer_name_from_filename"
        );
    }
}
