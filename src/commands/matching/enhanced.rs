use std::time::Duration;

use tracing::{info, warn};

use super::variants::{name_variations, ssn_corrections};
use crate::crm::{CaseHit, CaseQuery, CaseSearch};
use crate::model::{
    CaseMatch, ExtractionResult, MatchCounts, MatchRecord, MatchStatus, MatchStrategy,
};
use crate::rules::ExtractionRules;
use crate::util::mask_ssn;

/// Sequential case matcher over any [`CaseSearch`] backend.
pub struct CaseMatcher<'a, S: CaseSearch + ?Sized> {
    search: &'a S,
    rules: &'a ExtractionRules,
    attempt_delay: Duration,
}

impl<'a, S: CaseSearch + ?Sized> CaseMatcher<'a, S> {
    pub fn new(search: &'a S, rules: &'a ExtractionRules, attempt_delay: Duration) -> Self {
        Self {
            search,
            rules,
            attempt_delay,
        }
    }

    /// Direct pass over every record, then the retry pass over the misses.
    pub async fn match_all(
        &self,
        extractions: Vec<ExtractionResult>,
        enhanced: bool,
    ) -> (Vec<MatchRecord>, MatchCounts) {
        let mut records = Vec::with_capacity(extractions.len());
        for (index, extraction) in extractions.into_iter().enumerate() {
            if index > 0 {
                self.pause().await;
            }
            let case_match = self.match_direct(&extraction).await;
            records.push(MatchRecord {
                extraction,
                case_match,
            });
        }

        let mut counts = MatchCounts {
            total: records.len(),
            ..MatchCounts::default()
        };

        if enhanced {
            let retry_count = records
                .iter()
                .filter(|record| retry_eligible(&record.case_match))
                .count();
            if retry_count > 0 {
                info!(documents = retry_count, "starting enhanced matching pass");
            }
            for record in records
                .iter_mut()
                .filter(|record| retry_eligible(&record.case_match))
            {
                if let Some(found) = self.match_enhanced(&record.extraction).await {
                    counts.matched_by_enhancement += 1;
                    record.case_match = found;
                }
            }
        }

        for record in &records {
            match record.case_match.status {
                MatchStatus::Matched => counts.matched += 1,
                MatchStatus::NotFound => counts.not_found += 1,
                MatchStatus::Skipped => counts.skipped += 1,
                MatchStatus::Error => counts.errors += 1,
            }
        }

        for record in records.iter().filter(|record| !record.case_match.is_matched()) {
            warn!(
                file = %record.extraction.filename,
                status = record.case_match.status.as_str(),
                detail = record.case_match.detail.as_deref().unwrap_or(""),
                "document not matched to a case"
            );
        }

        (records, counts)
    }

    pub async fn match_direct(&self, extraction: &ExtractionResult) -> CaseMatch {
        let Some(ssn_last_4) = extraction.ssn_last_4.as_deref() else {
            return CaseMatch::unmatched(MatchStatus::Skipped, "no SSN last four extracted");
        };
        let Some(query) = extraction
            .taxpayer_name
            .as_deref()
            .and_then(|name| CaseQuery::from_taxpayer(ssn_last_4, name))
        else {
            return CaseMatch::unmatched(MatchStatus::Skipped, "no taxpayer name extracted");
        };

        match self.search.search_case(&query).await {
            Ok(Some(hit)) => {
                info!(
                    file = %extraction.filename,
                    case_id = %hit.case_id,
                    "case matched"
                );
                matched(hit, MatchStrategy::Direct, &query, None)
            }
            Ok(None) => CaseMatch::unmatched(MatchStatus::NotFound, "no case for name and SSN"),
            Err(err) => {
                warn!(file = %extraction.filename, error = %err, "case search failed");
                CaseMatch::unmatched(MatchStatus::Error, err.to_string())
            }
        }
    }

    /// Name variants with the original SSN, then SSN corrections with the
    /// original surname when the last four is a known OCR misread.
    pub async fn match_enhanced(&self, extraction: &ExtractionResult) -> Option<CaseMatch> {
        let ssn_last_4 = extraction.ssn_last_4.as_deref()?;
        let name = extraction.taxpayer_name.as_deref()?;
        let direct = CaseQuery::from_taxpayer(ssn_last_4, name)?;

        for variant in name_variations(&surname_phrase(name)) {
            if variant == direct.last_name {
                continue;
            }
            let query = CaseQuery {
                ssn_last_4: ssn_last_4.to_string(),
                last_name: variant,
                first_name: None,
            };
            if let Some(hit) = self.attempt(&extraction.filename, &query).await {
                return Some(matched(hit, MatchStrategy::NameVariation, &query, None));
            }
        }

        if !self.rules.is_suspicious_ssn(ssn_last_4) {
            return None;
        }

        for correction in ssn_corrections(ssn_last_4, self.rules.max_ssn_corrections) {
            let query = CaseQuery {
                ssn_last_4: correction,
                last_name: direct.last_name.clone(),
                first_name: None,
            };
            if let Some(hit) = self.attempt(&extraction.filename, &query).await {
                return Some(matched(
                    hit,
                    MatchStrategy::SsnCorrection,
                    &query,
                    Some(ssn_last_4.to_string()),
                ));
            }
        }

        None
    }

    /// One retry-pass lookup; failures are logged and treated as a miss.
    async fn attempt(&self, filename: &str, query: &CaseQuery) -> Option<CaseHit> {
        self.pause().await;
        match self.search.search_case(query).await {
            Ok(Some(hit)) => {
                info!(
                    file = %filename,
                    case_id = %hit.case_id,
                    name_used = %query.last_name,
                    ssn = %mask_ssn(&query.ssn_last_4),
                    "case matched by enhanced pass"
                );
                Some(hit)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(
                    file = %filename,
                    name_used = %query.last_name,
                    error = %err,
                    "enhanced case search failed"
                );
                None
            }
        }
    }

    async fn pause(&self) {
        if !self.attempt_delay.is_zero() {
            tokio::time::sleep(self.attempt_delay).await;
        }
    }
}

fn retry_eligible(case_match: &CaseMatch) -> bool {
    matches!(case_match.status, MatchStatus::NotFound | MatchStatus::Error)
}

/// Everything after the given name, or the whole name when it is one token.
fn surname_phrase(name: &str) -> String {
    let tokens: Vec<&str> = name.split_whitespace().collect();
    match tokens.as_slice() {
        [single] => (*single).to_string(),
        [_, rest @ ..] => rest.join(" "),
        [] => String::new(),
    }
}

fn matched(
    hit: CaseHit,
    strategy: MatchStrategy,
    query: &CaseQuery,
    original_ssn: Option<String>,
) -> CaseMatch {
    CaseMatch {
        case_id: Some(hit.case_id),
        taxpayer_name: hit.taxpayer_name,
        ssn: Some(query.ssn_last_4.clone()),
        status: MatchStatus::Matched,
        match_confidence: hit.name_similarity,
        match_type: hit.match_type,
        strategy: Some(strategy),
        name_used: Some(query.last_name.clone()),
        original_ssn,
        detail: None,
    }
}
