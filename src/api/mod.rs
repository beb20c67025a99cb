//! HTTP API for draftmill.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `GET /api/records` - List all records, newest first
//! - `POST /api/records` - Create a record
//! - `GET /api/records/:id` - Get one record
//! - `PUT /api/records/:id` - Apply a manual field edit
//! - `POST /api/records/import` - Bulk import from CSV
//! - `GET /api/records/export` - Export every record as CSV
//! - `POST /api/pipeline/:stage/run` - Run one stage over a record selection

pub mod pipeline;
pub mod records;
mod routes;

pub use routes::{serve, AppState};
