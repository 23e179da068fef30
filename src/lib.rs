//! Contact enrichment service
//!
//! Forwards contact batches to an asynchronous enrichment provider, polls the
//! provider until each job settles, stores the discovered emails and phone
//! numbers, and charges the owner's credit ledger exactly once per job.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod ports;
pub mod routes;
pub mod services;
