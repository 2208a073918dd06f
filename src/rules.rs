use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Heuristic constants used by the field extractors and the enhanced matcher.
///
/// Built-in defaults reflect the current notice template; a TOML file passed via
/// `--rules-path` overrides any subset of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionRules {
    /// Leading digits of CRM/AUR control numbers that look like SSNs.
    pub control_number_prefixes: Vec<String>,
    pub reference_noise_words: Vec<String>,
    pub letter_type_confusions: Vec<String>,
    pub suspicious_ssn_last_4: Vec<String>,
    pub spouse_excluded_words: Vec<String>,
    pub notice_year_min: i32,
    pub notice_year_max: i32,
    pub tax_year_min: i32,
    pub tax_year_max: i32,
    pub max_ssn_corrections: usize,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self {
            control_number_prefixes: strings(&["87", "88", "89"]),
            reference_noise_words: strings(&[
                "PAYMENTS", "OAYMENTS", "ENAEEEE", "PLEASE", "PHONE", "EMAIL", "ADDRESS", "STREET",
                "AVENUE", "CONTACT", "VISIT", "WEBSITE",
            ]),
            letter_type_confusions: strings(&[
                "CP7000", "CP0000", "CPOOO0", "CP2900", "CP29OO", "CP20O0",
            ]),
            suspicious_ssn_last_4: strings(&[
                "0021", "0521", "1505", "9012", "0000", "1111", "9999",
            ]),
            spouse_excluded_words: strings(&[
                "Notice",
                "Number",
                "Date",
                "Tax",
                "Year",
                "SSN",
                "Address",
                "Department",
                "Treasury",
            ]),
            notice_year_min: 2020,
            notice_year_max: 2030,
            tax_year_min: 2015,
            tax_year_max: 2030,
            max_ssn_corrections: 3,
        }
    }
}

impl ExtractionRules {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read rules file: {}", path.display()))?;
        let rules: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse rules file: {}", path.display()))?;
        rules.validate()?;

        info!(path = %path.display(), "loaded extraction rules override");
        Ok(rules)
    }

    fn validate(&self) -> Result<()> {
        if self.notice_year_min > self.notice_year_max {
            bail!(
                "notice_year_min ({}) must not exceed notice_year_max ({})",
                self.notice_year_min,
                self.notice_year_max
            );
        }
        if self.tax_year_min > self.tax_year_max {
            bail!(
                "tax_year_min ({}) must not exceed tax_year_max ({})",
                self.tax_year_min,
                self.tax_year_max
            );
        }
        if let Some(bad) = self
            .control_number_prefixes
            .iter()
            .find(|prefix| prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_digit()))
        {
            bail!("control number prefix must be non-empty digits, got '{bad}'");
        }
        Ok(())
    }

    pub fn is_suspicious_ssn(&self, last_4: &str) -> bool {
        self.suspicious_ssn_last_4.iter().any(|value| value == last_4)
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}
