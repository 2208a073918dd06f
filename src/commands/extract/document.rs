use anyhow::Result;
use chrono::NaiveDate;
use tracing::debug;

use super::discovery::SourceDocument;
use super::fields_dates::NoticeDateExtractor;
use super::fields_identity::IdentityExtractor;
use super::fields_letter_type::LetterTypeExtractor;
use super::fields_reference::ReferenceExtractor;
use super::fields_ssn::{SeenSsns, SsnExtractor};
use super::page_text::DocumentText;
use super::urgency;
use crate::model::{ExtractionResult, QualityIssue};
use crate::rules::ExtractionRules;

const CRITICAL_FIELDS: f64 = 5.0;

/// Every field extractor, compiled once per run.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    ssn: SsnExtractor,
    letter_type: LetterTypeExtractor,
    notice_date: NoticeDateExtractor,
    reference: ReferenceExtractor,
    identity: IdentityExtractor,
}

impl FieldExtractor {
    pub fn new(rules: &ExtractionRules) -> Result<Self> {
        Ok(Self {
            ssn: SsnExtractor::new(rules)?,
            letter_type: LetterTypeExtractor::new(rules)?,
            notice_date: NoticeDateExtractor::new(rules)?,
            reference: ReferenceExtractor::new(rules)?,
            identity: IdentityExtractor::new(rules)?,
        })
    }

    /// Builds the result for one document.
    ///
    /// `text` is `None` when no text could be recovered; filename-based fields are
    /// still extracted and the result carries `extraction_error`.
    pub fn extract(
        &self,
        source: &SourceDocument,
        text: Option<&DocumentText>,
        seen: &mut SeenSsns,
        today: NaiveDate,
        processed_at: &str,
    ) -> ExtractionResult {
        let mut issues = Vec::new();
        if text.is_none() {
            issues.push(QualityIssue::ExtractionError);
        }

        let search_text = text.map(DocumentText::search_text).unwrap_or_default();
        let header_text = text.map(|value| value.header_text.as_str()).unwrap_or("");
        let filename = source.filename.as_str();

        let taxpayer_name = self.identity.taxpayer_name(filename);
        if taxpayer_name.is_none() {
            issues.push(QualityIssue::NoTaxpayerNameFromFilename);
        }

        let letter_type = self.letter_type.extract(&search_text);
        match &letter_type {
            Some(code) if !self.letter_type.is_known(code) => {
                debug!(
                    file = %filename,
                    letter_type = %code,
                    "unrecognized letter type kept as-is"
                );
            }
            Some(_) => {}
            None => issues.push(QualityIssue::NoLetterType),
        }

        let ssn = self.ssn.extract(&search_text, header_text, seen);
        match &ssn {
            Some(found) => debug!(file = %filename, method = found.method, "SSN extracted"),
            None => issues.push(QualityIssue::NoValidSsn),
        }

        let notice_date = self.notice_date.extract(&search_text, header_text, filename);
        match notice_date {
            Some((_, method)) => debug!(file = %filename, method, "notice date extracted"),
            None => issues.push(QualityIssue::NoNoticeDate),
        }
        let notice_date = notice_date.map(|(date, _)| date);

        let notice_ref_number = self
            .reference
            .extract(&search_text, header_text)
            .map(|(reference, _)| reference);
        if notice_ref_number.is_none() {
            issues.push(QualityIssue::NoNoticeRef);
        }

        let tax_year = self
            .identity
            .tax_year(&search_text, filename)
            .map(|(year, _)| year);
        if tax_year.is_none() {
            issues.push(QualityIssue::NoTaxYear);
        }

        let spouse_name = self.identity.spouse_name(&search_text, header_text);

        let assessment = match (notice_date, letter_type.as_deref()) {
            (Some(date), Some(code)) => Some(urgency::assess(date, code, today)),
            _ => {
                issues.push(QualityIssue::CannotCalculateUrgency);
                None
            }
        };

        let populated = [
            taxpayer_name.is_some(),
            ssn.is_some(),
            letter_type.is_some(),
            notice_date.is_some(),
            assessment.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();

        let extraction_method = match text {
            Some(document) => document.method().to_string(),
            None => "filename_only".to_string(),
        };

        ExtractionResult {
            filename: source.filename.clone(),
            source_path: source.path.display().to_string(),
            sha256: source.sha256.clone(),
            taxpayer_name,
            spouse_name,
            ssn_last_4: ssn.as_ref().map(|found| found.last_4.clone()),
            full_ssn: ssn.and_then(|found| found.full_ssn),
            letter_type,
            notice_date,
            notice_ref_number,
            tax_year,
            urgency_level: assessment.as_ref().map(|value| value.level),
            urgency_status: assessment.as_ref().map(|value| value.status),
            response_due_date: assessment.as_ref().map(|value| value.due_date),
            days_remaining: assessment.as_ref().map(|value| value.days_remaining),
            response_days_allowed: assessment.as_ref().map(|value| value.response_days),
            urgency_description: assessment
                .as_ref()
                .map(|value| value.description.to_string()),
            extraction_confidence: populated as f64 / CRITICAL_FIELDS,
            needs_review: !issues.is_empty(),
            quality_issues: issues,
            processing_timestamp: processed_at.to_string(),
            extraction_method,
        }
    }
}
