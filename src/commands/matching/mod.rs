mod enhanced;
mod run;
mod variants;

pub use run::{match_documents, run};
