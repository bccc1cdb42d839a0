//! Configuration module
//!
//! Handles CLI configuration including the scheduler URL and workspace.

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the scheduler service
    pub scheduler_url: String,

    /// Workspace used by process commands
    pub workspace: String,

    /// Print raw JSON instead of formatted output
    pub json: bool,
}
