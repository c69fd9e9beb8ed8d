//! Core data models for the file gateway.
//!
//! `object` holds the backend record and its client-facing view, `listing`
//! the paginated query types, `upload` the request-scoped upload types.
//! `bucket` maps the SQLite bucket table via `sqlx::FromRow`.

pub mod bucket;
pub mod listing;
pub mod object;
pub mod upload;
