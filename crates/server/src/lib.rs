//! HTTP server for the batch curation service.
//!
//! Exposes the review workflow and admin views of [`curator_core`] under
//! `/api/v1`.

pub mod api;
pub mod metrics;
pub mod state;
