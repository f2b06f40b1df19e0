//! Domain models

pub mod deployment;
