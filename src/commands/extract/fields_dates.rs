use anyhow::Result;
use chrono::NaiveDate;

use super::cascade::{Cascade, Scope, Strategy, group};
use crate::rules::ExtractionRules;

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const MONTH_DATE: &str = concat!(
    r"(January|February|March|April|May|June|July|August|September|October|November|December)",
    r"\s+(\d{1,2}),?\s+(\d{4})"
);

const LABELS: &[&str] = &[
    r"Notice\s+date",
    r"Date\s+of\s+this\s+notice",
    r"Date\s+issued",
    r"Letter\s+date",
];

const CONTEXT_ANCHORS: &[(&str, usize)] = &[
    (r"Social\s+Security\s+number\s+\d{3}-\d{2}-\d{4}", 200),
    (r"\d{5,6}-\d{4}", 100),
    (r"IRS", 150),
];

const FLEXIBLE: &[&str] = &[
    r"(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+(\d{1,2})[,\s]+(\d{4})",
    r"([A-Z][a-z]{2,8})\s+(\d{1,2})[,\s]*(\d{4})",
];

/// Human-assigned intake token, e.g. `DTD 07.15.2024` or `DTD_07.15.2024`.
const FILENAME: &[&str] = &[
    r"DTD[\s_]+(\d{1,2})\.(\d{1,2})\.(\d{4})",
    r"DTD[\s_]+(\d{1,2})\s+(\d{1,2})\s+(\d{4})",
    r"DTD[\s_]+(\d{1,2})-(\d{1,2})-(\d{4})",
];

const LABEL_WINDOW: usize = 800;
const FLEXIBLE_WINDOW: usize = 1000;

#[derive(Debug, Clone)]
pub struct NoticeDateExtractor {
    labeled: Cascade,
    header: Cascade,
    context: Cascade,
    filename: Cascade,
    flexible: Cascade,
    year_min: i32,
    year_max: i32,
}

impl NoticeDateExtractor {
    pub fn new(rules: &ExtractionRules) -> Result<Self> {
        let labeled = LABELS
            .iter()
            .map(|label| {
                Strategy::new(
                    "labeled",
                    &format!(r"(?i)(?:{label})[:\s]+{MONTH_DATE}"),
                    Scope::First,
                )
                .map(|strategy| strategy.within(LABEL_WINDOW))
            })
            .collect::<Result<Vec<_>>>()?;

        let context = CONTEXT_ANCHORS
            .iter()
            .map(|(anchor, gap)| {
                Strategy::new(
                    "context",
                    &format!(r"(?i)(?:{anchor})(?s:.{{0,{gap}}}?){MONTH_DATE}"),
                    Scope::First,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let flexible = FLEXIBLE
            .iter()
            .map(|pattern| {
                Strategy::new("flexible", pattern, Scope::First)
                    .map(|strategy| strategy.within(FLEXIBLE_WINDOW))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            labeled: Cascade::new(labeled),
            header: Cascade::new(vec![Strategy::new(
                "header",
                &format!("(?i){MONTH_DATE}"),
                Scope::First,
            )?]),
            context: Cascade::new(context),
            filename: Cascade::from_patterns("filename_dtd", FILENAME, Scope::First)?,
            flexible: Cascade::new(flexible),
            year_min: rules.notice_year_min,
            year_max: rules.notice_year_max,
        })
    }

    /// Labeled, header, context, filename `DTD` token, then OCR-tolerant month names.
    pub fn extract(
        &self,
        text: &str,
        header_text: &str,
        filename: &str,
    ) -> Option<(NaiveDate, &'static str)> {
        let from_month_name = |_: &Strategy, captures: &regex::Captures<'_>| {
            self.month_name_date(group(captures, 1)?, group(captures, 2)?, group(captures, 3)?)
        };

        self.labeled
            .first_accepted(text, from_month_name)
            .or_else(|| {
                if header_text.trim().is_empty() {
                    None
                } else {
                    self.header.first_accepted(header_text, from_month_name)
                }
            })
            .or_else(|| self.context.first_accepted(text, from_month_name))
            .or_else(|| self.from_filename(filename))
            .or_else(|| self.flexible.first_accepted(text, from_month_name))
    }

    pub fn from_filename(&self, filename: &str) -> Option<(NaiveDate, &'static str)> {
        self.filename.first_accepted(filename, |_, captures| {
            let month: u32 = group(captures, 1)?.parse().ok()?;
            let day: u32 = group(captures, 2)?.parse().ok()?;
            let year: i32 = group(captures, 3)?.parse().ok()?;
            self.calendar_date(year, month, day)
        })
    }

    fn month_name_date(&self, month: &str, day: &str, year: &str) -> Option<NaiveDate> {
        let month = month_number(month)?;
        self.calendar_date(year.parse().ok()?, month, day.parse().ok()?)
    }

    fn calendar_date(&self, year: i32, month: u32, day: u32) -> Option<NaiveDate> {
        if !(self.year_min..=self.year_max).contains(&year) {
            return None;
        }
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

/// Month number from a full or abbreviated (three letters or more) English name.
pub fn month_number(name: &str) -> Option<u32> {
    let abbreviation = name.get(..3)?;
    MONTHS
        .iter()
        .position(|month| month[..3].eq_ignore_ascii_case(abbreviation))
        .map(|index| index as u32 + 1)
}
