//! REST client for the practice-management CRM: case search, document
//! upload and follow-up tasks.

mod client;
mod error;
mod retry;

pub use client::{CaseHit, CaseQuery, CaseSearch, CrmClient, CrmConfig, TaskRequest};
pub use error::CrmError;
