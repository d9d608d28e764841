//! Event handling module.
//!
//! Parses inbound events from the console driver, dispatches them into the
//! task flow and renders plain-text replies.

mod handler;
mod types;

pub use handler::CommandHandler;
pub use types::{BotCommand, CommandResult, Inbound};
