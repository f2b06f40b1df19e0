//! Deployment module

pub mod archive;
pub mod compose;
pub mod context;
pub mod docker;
pub mod fsm;
pub mod git;
pub mod locks;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod update;
