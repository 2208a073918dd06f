use std::collections::HashSet;

use anyhow::Result;
use regex::Regex;
use tracing::debug;

use super::cascade::{Cascade, Scope, Strategy, joined_groups};
use crate::rules::ExtractionRules;
use crate::util::mask_ssn;

const LABELED: &[&str] = &[
    r"(?i)Social\s+Security\s+number[:\s]*(\d{3}-\d{2}-\d{4})",
    r"(?i)SSN[:\s]*(\d{3}-\d{2}-\d{4})",
    r"(?i)Taxpayer\s+identification\s+number[:\s]*(\d{3}-\d{2}-\d{4})",
];

/// Everything that may appear in the letter header, labeled or not.
const HEADER: &[&str] = &[
    r"(?i)Social\s+Security\s+number[:\s]*(\d{3}-\d{2}-\d{4})",
    r"(?i)SSN[:\s]*(\d{3}-\d{2}-\d{4})",
    r"(?i)Taxpayer\s+identification\s+number[:\s]*(\d{3}-\d{2}-\d{4})",
    r"(?i)(?:SSN|Social\s+Security)[:\s]*(\d{3}[\s-]\d{2}[\s-]\d{4})",
    r"(\d{3})\s*-?\s*(\d{2})\s*-?\s*(\d{4})",
    r"\b(\d{3}-\d{2}-\d{4})\b",
    r"(?i)(?:SSN|Social\s+Security)[:\s]*(\d{9})",
    r"(?i)(?:ending\s+in|last\s+four)[:\s]*(\d{4})",
    r"(?i)XXX-XX-(\d{4})",
    r"Ssn\s+(\d{3}-\d{2}-\d{4})",
];

const CONTEXT: &[&str] = &[
    r"(?i)Social\s+Security\s+number(?s:.{0,50}?)(\d{3}-\d{2}-\d{4})",
    r"(?i)Social\s+Security(?s:.{0,30}?)(\d{3}-\d{2}-\d{4})",
    r"(?i)SSN(?s:.{0,20}?)(\d{3}-\d{2}-\d{4})",
];

const FLEXIBLE: &[&str] = &[
    r"(\d{3})\s*-?\s*(\d{2})\s*-?\s*(\d{4})",
    r"(\d{3})[\s-](\d{2})[\s-](\d{4})",
];

/// SSNs accepted so far in the current run.
///
/// A value printed on one notice that shows up again on another is almost always a
/// template number rather than a taxpayer SSN.
#[derive(Debug, Default)]
pub struct SeenSsns(HashSet<String>);

impl SeenSsns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, ssn: &str) -> bool {
        self.0.contains(ssn)
    }

    /// Returns false when the SSN was already recorded.
    pub fn insert(&mut self, ssn: &str) -> bool {
        self.0.insert(ssn.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SsnRejection {
    ControlNumber,
    ReferenceShaped,
    Malformed,
    InvalidArea,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsnMatch {
    /// Dashed `ddd-dd-dddd`; absent when only the last four digits were printed.
    pub full_ssn: Option<String>,
    pub last_4: String,
    pub method: &'static str,
}

#[derive(Debug, Clone)]
pub struct SsnExtractor {
    labeled: Cascade,
    header: Cascade,
    context: Cascade,
    flexible: Cascade,
    control_patterns: Vec<Regex>,
    reference_shape: Regex,
    dashed: Regex,
    control_prefixes: Vec<String>,
}

impl SsnExtractor {
    pub fn new(rules: &ExtractionRules) -> Result<Self> {
        Ok(Self {
            labeled: Cascade::from_patterns("labeled", LABELED, Scope::First)?,
            header: Cascade::from_patterns("header", HEADER, Scope::First)?,
            context: Cascade::from_patterns("context", CONTEXT, Scope::First)?,
            flexible: Cascade::new(
                FLEXIBLE
                    .iter()
                    .map(|pattern| Strategy::new("flexible", pattern, Scope::All))
                    .collect::<Result<Vec<_>>>()?,
            ),
            control_patterns: vec![
                Regex::new(r"^87\d{3}-?\d{2}-?\d{4}$")?,
                Regex::new(r"^(88|89)\d{3}-?\d{2}-?\d{4}$")?,
            ],
            reference_shape: Regex::new(r"^\d{5}-\d{4}$")?,
            dashed: Regex::new(r"^\d{3}-\d{2}-\d{4}$")?,
            control_prefixes: rules.control_number_prefixes.clone(),
        })
    }

    /// Validates a raw candidate and, when accepted, records it in `seen`.
    ///
    /// Returns the normalized value: dashed for full SSNs, four digits for last-4 only.
    pub fn validate(&self, raw: &str, seen: &mut SeenSsns) -> Result<String, SsnRejection> {
        let cleaned: String = raw
            .chars()
            .filter(|character| character.is_ascii_digit() || *character == '-')
            .collect();
        let digits: String = cleaned.chars().filter(char::is_ascii_digit).collect();

        if self.control_patterns.iter().any(|pattern| pattern.is_match(&cleaned)) {
            return Err(SsnRejection::ControlNumber);
        }
        if digits.len() == 9
            && self
                .control_prefixes
                .iter()
                .any(|prefix| digits.starts_with(prefix.as_str()))
        {
            return Err(SsnRejection::ControlNumber);
        }
        if self.reference_shape.is_match(&cleaned) {
            return Err(SsnRejection::ReferenceShaped);
        }

        let normalized = if self.dashed.is_match(&cleaned) {
            cleaned
        } else if cleaned == digits && digits.len() == 9 {
            format!("{}-{}-{}", &digits[..3], &digits[3..5], &digits[5..])
        } else if cleaned == digits && digits.len() == 4 {
            return Ok(digits);
        } else {
            return Err(SsnRejection::Malformed);
        };

        if normalized.starts_with("000-")
            || normalized.starts_with("666-")
            || normalized.starts_with('9')
        {
            return Err(SsnRejection::InvalidArea);
        }
        if seen.contains(&normalized) {
            return Err(SsnRejection::Duplicate);
        }

        seen.insert(&normalized);
        Ok(normalized)
    }

    pub fn extract(&self, text: &str, header_text: &str, seen: &mut SeenSsns) -> Option<SsnMatch> {
        let mut accept = |_: &Strategy, captures: &regex::Captures<'_>| {
            let raw = joined_groups(captures)?;
            match self.validate(raw.trim(), seen) {
                Ok(value) => Some(value),
                Err(reason) => {
                    debug!(candidate = %mask_ssn(&raw), reason = ?reason, "rejected SSN candidate");
                    None
                }
            }
        };

        let found = self
            .labeled
            .first_accepted(text, &mut accept)
            .or_else(|| {
                if header_text.trim().is_empty() {
                    None
                } else {
                    self.header.first_accepted(header_text, &mut accept)
                }
            })
            .or_else(|| self.context.first_accepted(text, &mut accept))
            .or_else(|| self.flexible.first_accepted(text, &mut accept))?;

        let (value, method) = found;
        Some(to_match(value, method))
    }
}

fn to_match(value: String, method: &'static str) -> SsnMatch {
    if value.len() == 4 {
        return SsnMatch {
            full_ssn: None,
            last_4: value,
            method,
        };
    }
    let last_4 = value[value.len() - 4..].to_string();
    SsnMatch {
        full_ssn: Some(value),
        last_4,
        method,
    }
}
