//! Resume records: storage, background processing and the HTTP surface.

pub mod handlers;
pub mod jobs;
pub mod postgres;
pub mod repository;
