//! GitHub webhook payload models

pub mod models;

pub use models::*;
