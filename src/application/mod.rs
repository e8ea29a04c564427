//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Window registry (per-option vote logs in a counter store)
//! - Vote gate (admission decisions)
//! - Temporal cluster detector (suspicion reports)
//! - Anti-fraud service (reports and clean exports over a usage source)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod detector;
pub mod gate;
pub mod metrics;
pub mod ports;
pub mod registry;
pub mod service;
