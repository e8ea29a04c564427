//! Domain layer - pure business logic with no external dependencies.
//!
//! This layer contains the core concepts of the anti-fraud subsystem:
//! - Token usage records and their votes
//! - Answer signatures and question ordering
//! - Sliding-window vote logs and admission decisions
//! - Minute buckets, suspicion clusters and detection reports
//!
//! All types in this layer are pure and easily testable.

pub mod bucket;
pub mod decision;
pub mod report;
pub mod signature;
pub mod usage;
pub mod window;
