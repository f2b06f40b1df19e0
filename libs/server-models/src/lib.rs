//! Deployhook server models

pub mod models;

pub use models::*;
