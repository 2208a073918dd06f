use anyhow::Result;
use regex::Regex;

use super::cascade::{Cascade, Scope, group};
use crate::rules::ExtractionRules;
use crate::util::title_case;

/// Intake filenames look like `DTD 07.15.2024_SMITH - 2.pdf`; the stem is searched.
const FILENAME_NAME: &[&str] = &[
    r"DTD[\s_]+[\d\.\-_\s]+_([A-Z]+)\s+-",
    r"(?:DTD[\s_]+[\d\.\-_\s]+)([A-Z][A-Z\s]{2,40})\s*(?:-\s*\d+)*$",
    r"_([A-Z]{3,})$",
    r"([A-Z][A-Z\s]+)$",
];

const SPOUSE: &[&str] = &[
    r"(?i)Spouse'?s?\s+name[:\s]+([A-Z][a-z]+(?:\s+[A-Z][a-z]+){0,2})",
    r"(?i)Name\s+of\s+spouse[:\s]+([A-Z][a-z]+(?:\s+[A-Z][a-z]+){0,2})",
    r"(?i)Joint\s+filer[:\s]+([A-Z][a-z]+(?:\s+[A-Z][a-z]+){0,2})",
    r"(?i)Filing\s+jointly\s+with[:\s]+([A-Z][a-z]+(?:\s+[A-Z][a-z]+){0,2})",
];

const TAX_YEAR_CONTENT: &[&str] = &[
    r"(?i)(?:Tax\s+year|Year)[:\s]+(20\d{2})",
    r"(?i)Return\s+for[:\s]+(20\d{2})",
    r"(?i)\b(20\d{2})\s*(?:tax|return)",
    r"(?i)Form\s+1040.*?(20\d{2})",
];

#[derive(Debug, Clone)]
pub struct IdentityExtractor {
    filename_name: Cascade,
    trailing_noise: Regex,
    spouse: Cascade,
    spouse_excluded: Vec<String>,
    tax_year_filename: Regex,
    tax_year_dtd: Regex,
    tax_year_content: Cascade,
    tax_year_min: i32,
    tax_year_max: i32,
}

impl IdentityExtractor {
    pub fn new(rules: &ExtractionRules) -> Result<Self> {
        Ok(Self {
            filename_name: Cascade::from_patterns("filename", FILENAME_NAME, Scope::First)?,
            trailing_noise: Regex::new(r"[\s\-\d]+$")?,
            spouse: Cascade::from_patterns("spouse", SPOUSE, Scope::First)?,
            spouse_excluded: rules
                .spouse_excluded_words
                .iter()
                .map(|word| word.to_lowercase())
                .collect(),
            tax_year_filename: Regex::new(r"(?i)CP2000[_\s]+(20\d{2})")?,
            tax_year_dtd: Regex::new(r"DTD[\s_]+[\d\.\-_]*(\d{4})")?,
            tax_year_content: Cascade::from_patterns("content", TAX_YEAR_CONTENT, Scope::First)?,
            tax_year_min: rules.tax_year_min,
            tax_year_max: rules.tax_year_max,
        })
    }

    /// Taxpayer surname as typed into the intake filename, title cased.
    pub fn taxpayer_name(&self, filename: &str) -> Option<String> {
        let stem = strip_pdf_extension(filename);
        self.filename_name
            .first_accepted(stem, |_, captures| {
                let raw = group(captures, 1)?;
                let cleaned = self.trailing_noise.replace(raw.trim(), "");
                let cleaned = cleaned.trim();
                let letters: String = cleaned.chars().filter(|c| !c.is_whitespace()).collect();
                if cleaned.chars().count() >= 3
                    && !letters.is_empty()
                    && letters.chars().all(char::is_alphabetic)
                {
                    Some(title_case(cleaned))
                } else {
                    None
                }
            })
            .map(|(name, _)| name)
    }

    pub fn spouse_name(&self, text: &str, header_text: &str) -> Option<String> {
        let search_text = format!("{header_text}\n{text}");
        self.spouse
            .first_accepted(&search_text, |_, captures| {
                let name = group(captures, 1)?.trim();
                let lower = name.to_lowercase();
                let keyword = self
                    .spouse_excluded
                    .iter()
                    .any(|word| lower.contains(word.as_str()));
                (!name.is_empty() && !keyword).then(|| name.to_string())
            })
            .map(|(name, _)| name)
    }

    /// Filename first (`CP2000_<year>`, then the `DTD` year minus one), then content.
    pub fn tax_year(&self, text: &str, filename: &str) -> Option<(String, &'static str)> {
        if let Some(year) = self
            .tax_year_filename
            .captures(filename)
            .and_then(|captures| group(&captures, 1)?.parse::<i32>().ok())
            .filter(|year| self.in_range(*year))
        {
            return Some((year.to_string(), "filename"));
        }

        if let Some(dtd_year) = self
            .tax_year_dtd
            .captures(filename)
            .and_then(|captures| group(&captures, 1)?.parse::<i32>().ok())
        {
            if let Some(year) = (1..=3)
                .map(|offset| dtd_year - offset)
                .find(|year| self.in_range(*year))
            {
                return Some((year.to_string(), "filename_dtd"));
            }
        }

        self.tax_year_content.first_accepted(text, |_, captures| {
            let year: i32 = group(captures, 1)?.parse().ok()?;
            self.in_range(year).then(|| year.to_string())
        })
    }

    fn in_range(&self, year: i32) -> bool {
        (self.tax_year_min..=self.tax_year_max).contains(&year)
    }
}

fn strip_pdf_extension(filename: &str) -> &str {
    let trimmed = filename.trim();
    match trimmed.len().checked_sub(4) {
        Some(split)
            if trimmed.is_char_boundary(split)
                && trimmed[split..].eq_ignore_ascii_case(".pdf") =>
        {
            &trimmed[..split]
        }
        _ => trimmed,
    }
}
