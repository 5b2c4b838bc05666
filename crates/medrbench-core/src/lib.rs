//! medrbench-core: Dataset assembly, answer extraction, judging and scoring.
//!
//! This crate defines the data model, the text-completion seam and the
//! pipeline that turns upstream MedRBench records into scored results:
//! record → evaluation item → parsed answer → judge verdict → reward.

pub mod answer;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod judge;
pub mod model;
pub mod normalize;
pub mod prompts;
pub mod report;
pub mod results;
pub mod scorer;
pub mod statistics;
pub mod traits;
