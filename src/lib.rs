//! Multipart Relay Library
//!
//! HTTP facade over S3 multipart uploads. The binary in main.rs wires these
//! modules to configuration and a listener.
//!
//! # Modules
//!
//! - `upload`: Session tracking, part ordering and upload sequencing
//! - `storage`: Multipart store trait with S3 and in-memory backends
//! - `routes`: axum handlers and router

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod storage;
pub mod upload;
