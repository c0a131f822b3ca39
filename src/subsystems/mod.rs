//! Subsystem modules for the activity bot.

pub mod assistant;
pub mod comms;
pub mod github;
pub mod memory;
pub mod pipeline;
pub mod runtime;
pub mod spec_kit;
