mod cascade;
pub mod discovery;
mod document;
mod fields_dates;
mod fields_identity;
mod fields_letter_type;
mod fields_reference;
mod fields_ssn;
mod ledger;
mod ocr_tools;
mod page_text;
mod preprocess;
mod report;
mod run;
mod urgency;

pub use fields_dates::NoticeDateExtractor;
pub use run::{BatchRequest, extract_batch, run};

#[cfg(test)]
mod tests;
