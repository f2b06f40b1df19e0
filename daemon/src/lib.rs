//! Deployhook Library
//!
//! Core modules for the deployhook webhook daemon.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod notify;
pub mod server;
pub mod storage;
pub mod utils;
pub mod webhook;
pub mod workers;
