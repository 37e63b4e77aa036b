pub mod chain;
pub mod commands;
pub mod error;
pub mod invoke;
pub mod netns;
pub mod plugin;
pub mod types;
pub mod validation;
pub mod version;
