pub mod claim;
pub mod prediction;
pub mod resume;
pub mod verification;
