//! Drip Outreach: one personalised cold email per run.

pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pitch;
pub mod runner;
pub mod store;
pub mod sync;
