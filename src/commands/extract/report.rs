use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::model::ExtractionResult;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldCompliance {
    pub field: &'static str,
    pub populated: usize,
    pub total: usize,
}

impl FieldCompliance {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.populated as f64 * 100.0 / self.total as f64
        }
    }
}

pub fn field_compliance(results: &[ExtractionResult]) -> Vec<FieldCompliance> {
    let fields: [(&'static str, fn(&ExtractionResult) -> bool); 7] = [
        ("taxpayer_name", |r| r.taxpayer_name.is_some()),
        ("ssn_last_4", |r| r.ssn_last_4.is_some()),
        ("letter_type", |r| r.letter_type.is_some()),
        ("notice_date", |r| r.notice_date.is_some()),
        ("notice_ref_number", |r| r.notice_ref_number.is_some()),
        ("tax_year", |r| r.tax_year.is_some()),
        ("urgency_level", |r| r.urgency_level.is_some()),
    ];

    fields
        .iter()
        .map(|&(field, present)| FieldCompliance {
            field,
            populated: results.iter().filter(|result| present(result)).count(),
            total: results.len(),
        })
        .collect()
}

pub fn issue_tally(results: &[ExtractionResult]) -> BTreeMap<&'static str, usize> {
    let mut tally = BTreeMap::new();
    for result in results {
        for issue in &result.quality_issues {
            *tally.entry(issue.as_str()).or_insert(0) += 1;
        }
    }
    tally
}

pub fn log_summary(results: &[ExtractionResult]) {
    if results.is_empty() {
        info!("no new documents extracted");
        return;
    }

    for compliance in field_compliance(results) {
        info!(
            field = compliance.field,
            populated = compliance.populated,
            total = compliance.total,
            percent = %format!("{:.1}", compliance.percent()),
            "field compliance"
        );
    }

    for (issue, count) in issue_tally(results) {
        warn!(issue, count, "quality issue");
    }

    let mut urgency: BTreeMap<&'static str, usize> = BTreeMap::new();
    for result in results {
        if let Some(status) = result.urgency_status {
            *urgency.entry(status.as_str()).or_insert(0) += 1;
        }
    }
    for (status, count) in urgency {
        info!(status, count, "urgency");
    }

    let average = results
        .iter()
        .map(|result| result.extraction_confidence)
        .sum::<f64>()
        / results.len() as f64;
    let needs_review = results.iter().filter(|result| result.needs_review).count();
    info!(
        documents = results.len(),
        needs_review,
        average_confidence = %format!("{average:.2}"),
        "extraction summary"
    );
}
