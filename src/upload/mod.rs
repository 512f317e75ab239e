//! Multipart Upload Module
//!
//! Tracks in-flight multipart uploads between the HTTP surface and the store:
//! - Part ledger per session, ordered by part number
//! - Session registry with atomic take-for-completion
//! - Orchestrator sequencing initiate, part upload, complete and abort
//!
//! Protocol Flow:
//! 1. Client declares a file name and part count; the store issues an upload id
//! 2. Client uploads parts in any order, possibly concurrently
//! 3. Client completes; parts are handed to the store in ascending order

pub mod ledger;
pub mod orchestrator;
pub mod session;
pub mod types;

pub use ledger::PartLedger;
pub use orchestrator::UploadOrchestrator;
pub use session::{SessionRegistry, UploadSession};
pub use types::*;
