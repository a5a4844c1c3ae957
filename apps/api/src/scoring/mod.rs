//! Claim scoring: feature vectors, per-claim classification, explanations
//! and the document-level trust score.

pub mod classifier;
pub mod explain;
pub mod features;
pub mod trust;
