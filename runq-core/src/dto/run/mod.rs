//! Run DTOs
//!
//! Request bodies accepted by the scheduler's run endpoint.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::build::BuildOptions;

/// Options supplied by a caller when submitting a run
///
/// Every field is optional; unset fields fall back to the project's declared
/// runner configuration and then to scheduler defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOptions {
    pub environment_id: Option<String>,
    pub memory_size_mb: Option<u64>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub skip_build: bool,
    pub build_options: Option<BuildOptions>,
    #[serde(default)]
    pub options: HashMap<String, String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// Query parameters of the run endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunQuery {
    pub project: String,
}
