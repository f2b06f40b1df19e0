//! GitHub webhook intake

pub mod classify;
pub mod extract;
pub mod validate;
