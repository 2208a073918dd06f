use std::collections::HashSet;

use anyhow::Result;
use regex::Regex;

use super::cascade::{Cascade, Scope, Strategy, group};
use crate::rules::ExtractionRules;

/// Specific notice codes first, generic code shapes last.
const PATTERNS: &[&str] = &[
    r"(?i)(?:Notice|Letter|Form)\s+(CP\s*2000)\b",
    r"(?i)\b(CP\s*2000)\b",
    r"(?i)\b(CP\s*2501)\b",
    r"(?i)\b(CP\s*3219[A-Z]?)\b",
    r"(?i)\b(CP\s*504)\b",
    r"(?i)\b(CP\s*566)\b",
    r"(?i)\b(CP\s*14)\b",
    r"(?i)\b(CP\s*501)\b",
    r"(?i)\b(CP\s*503)\b",
    r"(?i)\b(CP\s*505)\b",
    r"(?i)\b(CP\s*71[A-Z]?)\b",
    r"(?i)\b(CP\s*90)\b",
    r"(?i)\b(CP\s*91)\b",
    r"(?i)\b(CP\s*92)\b",
    r"(?i)\b(CP\s*297)\b",
    r"(?i)\b(LTR\s*3172)\b",
    r"(?i)\b(LT\s*11)\b",
    r"(?i)\b(LTR\s*11)\b",
    r"(?i)\b(LT\s*1058)\b",
    r"(?i)\b(LTR\s*1058)\b",
    r"(?i)\b(LTR\s*226J?)\b",
    r"(?i)\b(FORM\s*4549)\b",
    r"(?i)\b(FORM\s*668[A-Z]?)\b",
    r"(?i)\b(CP\s*\d{3,4})\b",
    r"(?i)\b(LT\s*\d{4})\b",
    r"(?i)\b(LTR\s*\d{4})\b",
    r"(?i)(CP-\d{4})",
];

/// OCR-damaged CP2000 such as `CP29OO`; accepted only when listed as a known confusion.
const OCR_TOLERANT: &str = r"(?i)\b(CP\s*[0-9O]{4})\b";

const KNOWN_TYPES: &[&str] = &[
    "CP2000", "CP2501", "CP3219", "CP3219A", "CP504", "CP566", "CP14", "CP501", "CP503", "CP505",
    "CP71", "CP71A", "CP90", "CP91", "CP92", "CP297", "LTR3172", "LTR11", "LTR1058", "LTR226",
    "LTR226J", "FORM4549", "FORM668", "FORM668A",
];

#[derive(Debug, Clone)]
pub struct LetterTypeExtractor {
    cascade: Cascade,
    confusions: HashSet<String>,
    lt_code: Regex,
    known_shapes: Vec<Regex>,
}

impl LetterTypeExtractor {
    pub fn new(rules: &ExtractionRules) -> Result<Self> {
        let mut strategies = PATTERNS
            .iter()
            .map(|pattern| Strategy::new("letter_pattern", pattern, Scope::First))
            .collect::<Result<Vec<_>>>()?;
        strategies.push(Strategy::new("ocr_tolerant", OCR_TOLERANT, Scope::All)?);

        Ok(Self {
            cascade: Cascade::new(strategies),
            confusions: rules
                .letter_type_confusions
                .iter()
                .map(|value| value.to_uppercase())
                .collect(),
            lt_code: Regex::new(r"^LT\d+")?,
            known_shapes: vec![
                Regex::new(r"^CP\d{2,4}[A-Z]?$")?,
                Regex::new(r"^LTR\d{4}[A-Z]?$")?,
                Regex::new(r"^FORM\d{4}[A-Z]?$")?,
            ],
        })
    }

    pub fn extract(&self, text: &str) -> Option<String> {
        self.cascade
            .first_accepted(text, |strategy, captures| {
                let raw = group(captures, 1)?;
                let compact = compact_code(raw);
                let confused = self.confusions.contains(&compact);
                if strategy.method == "ocr_tolerant" && !confused {
                    return None;
                }
                Some(self.normalize(&compact))
            })
            .map(|(value, _)| value)
    }

    /// Uppercases, corrects OCR confusions to `CP2000` and rewrites `LT<n>` as `LTR<n>`.
    pub fn normalize(&self, raw: &str) -> String {
        let compact = compact_code(raw);
        if self.confusions.contains(&compact) {
            return "CP2000".to_string();
        }
        if self.lt_code.is_match(&compact) {
            return format!("LTR{}", &compact[2..]);
        }
        compact
    }

    pub fn is_known(&self, letter_type: &str) -> bool {
        KNOWN_TYPES.contains(&letter_type)
            || self
                .known_shapes
                .iter()
                .any(|shape| shape.is_match(letter_type))
    }
}

fn compact_code(raw: &str) -> String {
    raw.chars()
        .filter(|character| !character.is_whitespace() && *character != '-')
        .flat_map(char::to_uppercase)
        .collect()
}
