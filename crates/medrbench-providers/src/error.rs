//! Provider error types.
//!
//! The enum lives in `medrbench-core` so the eval engine can classify
//! failures for retries; it is re-exported here for provider code.

pub use medrbench_core::error::ProviderError;
