//! Approval pipeline.
//!
//! Every unread message flows through:
//! 1. `classifier::classify()` — original report or reviewer reply
//! 2. Original: `extractor::extract_records()` → `artifact::build_artifact()` → notify
//! 3. Reply: resolve the bracketed identifier → upload
//!
//! `coordinator` drives the batch and owns the mark-processed policy.

pub mod artifact;
pub mod classifier;
pub mod coordinator;
pub mod extractor;
pub mod types;

pub use coordinator::{BatchSummary, MessageReport, Outcome, WorkflowCoordinator, WorkflowDeps};
