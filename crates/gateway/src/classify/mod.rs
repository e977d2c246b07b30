//! Local threat analysis: the scoring engine shared by every channel
//! processor and the per-source tracking that powers flood detection.

pub mod engine;
pub mod tracker;

pub use engine::ClassifierEngine;
pub use tracker::SourceTracker;
