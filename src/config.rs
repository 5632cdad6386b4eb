use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ai_client::Provider;
use crate::language::Language;

const CONFIG_DIR: &str = ".codepad";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodepadConfig {
    pub sandbox: SandboxConfig,
    pub assistant: AssistantConfig,
    pub editor: EditorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub mode: SandboxMode,
    pub address: String,
    pub scratch_dir: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mode: SandboxMode::Local,
            address: "127.0.0.1:5001".to_string(),
            scratch_dir: "~/.codepad/build".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub endpoint: String,
    pub provider: Provider,
    pub timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5000".to_string(),
            provider: Provider::OpenAi,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub default_language: Language,
    pub diagnostics_debounce_ms: u64,
    pub theme_file: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            default_language: Language::Python,
            diagnostics_debounce_ms: 300,
            theme_file: "~/.codepad/theme.toml".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: String,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: "~/.codepad/codepad.log".to_string(),
            level: "info".to_string(),
        }
    }
}

impl CodepadConfig {
    pub fn from_toml_str(text: &str) -> io::Result<Self> {
        toml::from_str(text).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    pub fn to_toml_string(&self) -> io::Result<String> {
        toml::to_string_pretty(self).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    pub fn scratch_dir(&self) -> io::Result<PathBuf> {
        expand_home(&self.sandbox.scratch_dir)
    }

    pub fn theme_file(&self) -> io::Result<PathBuf> {
        expand_home(&self.editor.theme_file)
    }

    pub fn log_file(&self) -> io::Result<PathBuf> {
        expand_home(&self.logging.file)
    }

    pub fn diagnostics_debounce(&self) -> Duration {
        Duration::from_millis(self.editor.diagnostics_debounce_ms)
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.assistant.timeout_secs.max(1))
    }
}

pub fn default_config_path() -> io::Result<PathBuf> {
    Ok(home_dir()?.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Reads the config file. The default location is created with defaults on
/// first use; an explicit path must already exist.
pub fn load_config(explicit: Option<&Path>) -> io::Result<CodepadConfig> {
    let config_file = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = default_config_path()?;
            if !path.exists() {
                if let Some(dir) = path.parent() {
                    fs::create_dir_all(dir)?;
                }
                fs::write(&path, CodepadConfig::default().to_toml_string()?)?;
                tracing::info!(path = %path.display(), "wrote default config");
            }
            path
        }
    };
    let text = fs::read_to_string(&config_file)?;
    CodepadConfig::from_toml_str(&text)
}

pub fn expand_home(raw_path: &str) -> io::Result<PathBuf> {
    if raw_path == "~" {
        return home_dir();
    }
    if let Some(rest) = raw_path.strip_prefix("~/") {
        return Ok(home_dir()?.join(rest));
    }
    Ok(PathBuf::from(raw_path))
}

fn home_dir() -> io::Result<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "HOME is not set"))
}
