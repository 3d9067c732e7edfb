//! Content-addressable file ingestion and retrieval service.
//!
//! Clients PUT raw bytes under a per-account namespace; the service
//! verifies the content digest, persists bytes and metadata in two
//! independent backends kept consistent by an event pipeline, and serves
//! content, metadata and filtered listings back out.

pub mod config;
pub mod errors;
pub mod events;
pub mod format;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod query;
pub mod resource;
pub mod routes;
pub mod store;
