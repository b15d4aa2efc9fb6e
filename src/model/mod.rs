//! Data model shared by the detectors, the defense engine, and the pipeline.
//!
//! Line numbers in this module are 1-based and inclusive, and are valid only
//! against the content revision they were computed from.

mod context;
mod patterns;
mod result;

pub use context::*;
pub use patterns::*;
pub use result::*;
