//! Process execution mode

use serde::{Deserialize, Serialize};

/// Execution mode selected once at startup (`NODE_ENV`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Local development: verbose, human-readable output
    #[default]
    Development,
    /// Deployed service: structured output, info level and above
    Production,
    /// Automated test runs
    Test,
}

impl ExecutionMode {
    pub fn is_production(self) -> bool {
        self == ExecutionMode::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Development => "development",
            ExecutionMode::Production => "production",
            ExecutionMode::Test => "test",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
