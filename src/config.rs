use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

fn default_chat_endpoint() -> String {
    "http://127.0.0.1:8000/api/chat/".to_string()
}

fn default_upload_endpoint() -> String {
    "http://127.0.0.1:8000/upload-kafka".to_string()
}

fn default_chat_twin_version_id() -> String {
    "c0badfc6-653e-444d-9c35-a3eb549486c6".to_string()
}

fn default_upload_twin_version_id() -> String {
    "b7586e58-9a07-47f6-8049-43d6d6f2c5e54455".to_string()
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

/// Which generation of the chat backend we are talking to. The two
/// generations disagree on request field names and on where the answer
/// lives in the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendVersion {
    #[default]
    V1,
    V2,
    /// Send the v1 request, accept either response shape.
    Auto,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    #[serde(default = "default_chat_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_chat_twin_version_id")]
    pub twin_version_id: String,
    #[serde(default)]
    pub session_id: i64,
    #[serde(default)]
    pub backend: BackendVersion,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    #[serde(default = "default_upload_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_upload_twin_version_id")]
    pub twin_version_id: String,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Dark,
    Light,
}

impl ThemeMode {
    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Dark => ThemeMode::Light,
            ThemeMode::Light => ThemeMode::Dark,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UiConfig {
    #[serde(default)]
    pub theme: ThemeMode,
    #[serde(default)]
    pub desktop_notifications: bool,
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            endpoint: default_chat_endpoint(),
            twin_version_id: default_chat_twin_version_id(),
            session_id: 0,
            backend: BackendVersion::V1,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            endpoint: default_upload_endpoint(),
            twin_version_id: default_upload_twin_version_id(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 480,
            height: 720,
            min_width: 360,
            min_height: 480,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&Self::get_config_path())
    }

    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match fs::read_to_string(config_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!(
                        path = %config_path.display(),
                        error = %e,
                        "error parsing config, using defaults"
                    ),
                },
                Err(e) => tracing::warn!(
                    path = %config_path.display(),
                    error = %e,
                    "error reading config, using defaults"
                ),
            }
        } else if let Some(parent) = config_path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        Config::default()
    }

    pub fn get_config_path() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/twin-chat/config.toml")
        } else {
            PathBuf::from("config.toml")
        }
    }

    /// Where "save a copy" writes documents when no directory is configured.
    pub fn download_dir(&self) -> PathBuf {
        if let Some(dir) = &self.ui.download_dir {
            return dir.clone();
        }
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join("Downloads")
        } else {
            PathBuf::from(".")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [chat]
            twin_version_id = "twin-1"
            session_id = 42
            backend = "v2"
            "#,
        )
        .unwrap();

        assert_eq!(config.chat.twin_version_id, "twin-1");
        assert_eq!(config.chat.session_id, 42);
        assert_eq!(config.chat.backend, BackendVersion::V2);
        assert_eq!(config.chat.endpoint, "http://127.0.0.1:8000/api/chat/");
        assert_eq!(config.upload.max_file_size, 10 * 1024 * 1024);
        assert_eq!(
            config.upload.twin_version_id,
            "b7586e58-9a07-47f6-8049-43d6d6f2c5e54455"
        );
        assert_eq!(config.ui.theme, ThemeMode::Dark);
        assert_eq!(config.window.width, 480);
    }

    #[test]
    fn test_default_twin_ids_are_never_empty() {
        let config = Config::default();
        assert_eq!(config.chat.twin_version_id, "c0badfc6-653e-444d-9c35-a3eb549486c6");
        assert_eq!(
            config.upload.twin_version_id,
            "b7586e58-9a07-47f6-8049-43d6d6f2c5e54455"
        );

        let from_empty: Config = toml::from_str("[chat]\nsession_id = 1\n").unwrap();
        assert_eq!(from_empty.chat.twin_version_id, config.chat.twin_version_id);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[chat\nendpoint = ").unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.chat.backend, BackendVersion::V1);
        assert_eq!(config.upload.endpoint, "http://127.0.0.1:8000/upload-kafka");
    }

    #[test]
    fn test_missing_file_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path);
        assert!(path.parent().unwrap().exists());
        assert_eq!(config.ui.theme, ThemeMode::Dark);
    }

    #[test]
    fn test_download_dir_prefers_configured_path() {
        let mut config = Config::default();
        config.ui.download_dir = Some(PathBuf::from("/tmp/twin-docs"));
        assert_eq!(config.download_dir(), PathBuf::from("/tmp/twin-docs"));
    }

    #[test]
    fn test_theme_toggle() {
        assert_eq!(ThemeMode::Dark.toggled(), ThemeMode::Light);
        assert_eq!(ThemeMode::Light.toggled(), ThemeMode::Dark);
    }
}
