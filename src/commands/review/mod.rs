mod db_setup;
mod queue;
mod run;

pub use db_setup::open_review_db;
pub use queue::{ReviewRow, pending_uploads, record_upload, status_counts, uploaded_count};
pub use run::{enqueue_records, run};

#[cfg(test)]
mod tests;
