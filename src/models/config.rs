use serde::{Deserialize, Serialize};

/// Persisted user configuration from `.replace_tool.yaml`
///
/// A single `settings` section holding the last chosen target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory, or `;`-joined list of files, chosen last time.
    #[serde(default)]
    pub last_target: String,
}

impl UserConfig {
    pub fn with_last_target(target: impl Into<String>) -> Self {
        Self {
            settings: Settings {
                last_target: target.into(),
            },
        }
    }

    pub fn last_target(&self) -> &str {
        &self.settings.last_target
    }
}
