// Slash commands
pub mod streaming;
