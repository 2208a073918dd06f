use anyhow::Result;
use regex::Regex;

use super::cascade::{Cascade, Scope, Strategy, group};
use crate::rules::ExtractionRules;

const LABELED: &[&str] = &[
    r"(?i)(?:Notice\s+number|Notice\s+#)[:\s]+([A-Z0-9]{5,15}-[A-Z0-9]{4,8})",
    r"(?i)(?:Reference\s+number|Ref\s+#)[:\s]+([A-Z0-9]{5,15}-[A-Z0-9]{4,8})",
    r"(?i)Control\s+number[:\s]+([A-Z0-9]{5,15}-[A-Z0-9]{4,8})",
    r"(?i)Document\s+ID[:\s]+([A-Z0-9]{5,15}-[A-Z0-9]{4,8})",
];

const HEADER: &[&str] = &[
    r"\b([A-Z]{2}\d{4,6}-\d{4})\b",
    r"\b(\d{5,6}-\d{4})\b",
    r"\b([A-Z]+\d{5}-\d{4})\b",
    r"\b(\d{5}-\d{4,5})\b",
];

const CONTEXT: &[&str] = &[
    r"(?i)Social\s+Security\s+number\s+\d{3}-\d{2}-\d{4}(?s:.{0,200}?)(\d{5,6}-\d{4})",
    r"(?i)Notice\s+date(?s:.{0,100}?)(\d{5,6}-\d{4})",
    r"(?i)IRS(?s:.{0,100}?)(\d{5,6}-\d{4})",
    r"(?i)Contact\s+us(?s:.{0,100}?)(\d{5,6}-\d{4})",
];

/// Tolerates a space where OCR lost the dash.
const FLEXIBLE: &[&str] = &[
    r"(\d{5,6}[-\s]\d{4})",
    r"([A-Z]{2,3}\d{4,6}[-\s]\d{4})",
    r"(\d{5}[-\s]\d{4,5})",
];

const LABEL_WINDOW: usize = 1000;

#[derive(Debug, Clone)]
pub struct ReferenceExtractor {
    labeled: Cascade,
    header: Cascade,
    context: Cascade,
    flexible: Cascade,
    allowed: Regex,
    whitespace: Regex,
    noise_words: Vec<String>,
}

impl ReferenceExtractor {
    pub fn new(rules: &ExtractionRules) -> Result<Self> {
        let labeled = LABELED
            .iter()
            .map(|pattern| {
                Strategy::new("labeled", pattern, Scope::First)
                    .map(|strategy| strategy.within(LABEL_WINDOW))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            labeled: Cascade::new(labeled),
            header: Cascade::from_patterns("header", HEADER, Scope::First)?,
            context: Cascade::from_patterns("context", CONTEXT, Scope::First)?,
            flexible: Cascade::from_patterns("flexible", FLEXIBLE, Scope::All)?,
            allowed: Regex::new(r"^[A-Z0-9\-\s]+$")?,
            whitespace: Regex::new(r"\s+")?,
            noise_words: rules
                .reference_noise_words
                .iter()
                .map(|word| word.to_uppercase())
                .collect(),
        })
    }

    pub fn extract(&self, text: &str, header_text: &str) -> Option<(String, &'static str)> {
        let accept = |_: &Strategy, captures: &regex::Captures<'_>| {
            let raw = group(captures, 1)?.trim();
            self.is_valid(raw).then(|| raw.to_uppercase())
        };

        self.labeled
            .first_accepted(text, accept)
            .or_else(|| {
                if header_text.trim().is_empty() {
                    None
                } else {
                    self.header.first_accepted(header_text, accept)
                }
            })
            .or_else(|| self.context.first_accepted(text, accept))
            .or_else(|| {
                self.flexible.first_accepted(text, |_, captures| {
                    let normalized = self
                        .whitespace
                        .replace_all(group(captures, 1)?.trim(), "-")
                        .into_owned();
                    self.is_valid(&normalized).then(|| normalized.to_uppercase())
                })
            })
    }

    pub fn is_valid(&self, reference: &str) -> bool {
        let length = reference.chars().count();
        if !(6..=20).contains(&length) {
            return false;
        }

        let upper = reference.to_uppercase();
        if !self.allowed.is_match(&upper) {
            return false;
        }
        if self.noise_words.iter().any(|noise| upper.contains(noise.as_str())) {
            return false;
        }

        if reference.contains('-') {
            let parts: Vec<&str> = reference.split('-').collect();
            if parts.len() == 2 && parts.iter().all(|part| part.chars().count() >= 3) {
                return true;
            }
        }

        reference.chars().all(|character| character.is_ascii_digit()) && length >= 5
    }
}
