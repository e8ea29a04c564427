//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs manually driven)
//! - Counter stores (sharded in-process map, Redis)
//! - Usage sources (in-memory)

pub mod clock;
pub mod source;
pub mod storage;

#[cfg(feature = "redis-storage")]
pub mod redis_storage;
