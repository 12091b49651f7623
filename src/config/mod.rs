use crate::models::UserConfig;
use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the user configuration, stored beside the executable.
pub const USER_CONFIG_FILE: &str = ".replace_tool.yaml";

/// Configuration manager for loading and saving the YAML user configuration.
///
/// The file holds a single `settings` section with the last chosen target.
/// Reading is forgiving: a missing file, missing key or unparseable content
/// all yield an empty target.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    user_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager storing its file in `config_dir`.
    ///
    /// The directory is created if it does not exist yet.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            user_config_path: config_dir.join(USER_CONFIG_FILE),
            config_dir,
        })
    }

    /// ConfigManager for the directory holding the running executable.
    pub fn beside_executable() -> Result<Self> {
        Self::new(executable_dir()?)
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn user_config_path(&self) -> &Utf8Path {
        &self.user_config_path
    }

    /// Load the user configuration file.
    ///
    /// Returns the default configuration when the file is missing or is not
    /// valid YAML. Only a file that exists but cannot be read is an error.
    pub fn load_user_config(&self) -> Result<UserConfig> {
        if !self.user_config_path.exists() {
            tracing::info!(
                "User config file not found at {}, using defaults",
                self.user_config_path
            );
            return Ok(UserConfig::default());
        }

        let file_contents = fs::read_to_string(&self.user_config_path)
            .with_context(|| format!("Failed to read user config: {}", self.user_config_path))?;

        if file_contents.trim().is_empty() {
            return Ok(UserConfig::default());
        }

        match serde_yaml_ng::from_str::<UserConfig>(&file_contents) {
            Ok(config) => {
                tracing::info!("Loaded user config from {}", self.user_config_path);
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    "Ignoring malformed user config {}: {}",
                    self.user_config_path,
                    e
                );
                Ok(UserConfig::default())
            }
        }
    }

    /// Save the user configuration file, replacing any previous content.
    pub fn save_user_config(&self, config: &UserConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize user config to YAML")?;

        fs::write(&self.user_config_path, yaml_string)
            .with_context(|| format!("Failed to write user config: {}", self.user_config_path))?;

        tracing::info!("Saved user config to {}", self.user_config_path);
        Ok(())
    }

    /// The last saved target, or an empty string when there is none.
    pub fn load_last_target(&self) -> String {
        match self.load_user_config() {
            Ok(config) => config.settings.last_target,
            Err(e) => {
                tracing::warn!("Could not load last target: {:#}", e);
                String::new()
            }
        }
    }

    pub fn save_last_target(&self, target: &str) -> Result<()> {
        self.save_user_config(&UserConfig::with_last_target(target))
    }
}

/// Directory containing the running executable.
fn executable_dir() -> Result<Utf8PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    let exe = Utf8PathBuf::try_from(exe).context("Executable path is not valid UTF-8")?;
    exe.parent()
        .map(Utf8Path::to_path_buf)
        .ok_or_else(|| anyhow!("Executable path has no parent directory: {}", exe))
}
