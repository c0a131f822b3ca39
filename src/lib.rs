//! GitHub activity bot: answers questions about recent commits over Discord
//! and a JSON API, remembers each user's questions, and drives a
//! spec → plan → tasks workflow for new features.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod llm;
pub mod logger;
pub mod models;
pub mod prompt;
pub mod subsystems;
