use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::annotation::DEFAULT_BACKGROUND_LABEL;
use crate::db::models::{Experimenter, Sex};

/// Application configuration loaded from TOML config file.
/// Every field has a default; the config file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Video frame rate used when `import` has no `--fps`.
    pub fps: u32,
    /// Label directory used when `import` has no `--labels`.
    pub label_dir: Option<PathBuf>,
    /// Pose directory used when `import` has no `--poses`.
    pub pose_dir: Option<PathBuf>,
    pub experimenter: ExperimenterConfig,
    /// Defaults for mice created on import.
    pub mouse: MouseConfig,
    pub annotation: AnnotationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            fps: 30,
            label_dir: None,
            pose_dir: None,
            experimenter: ExperimenterConfig::default(),
            mouse: MouseConfig::default(),
            annotation: AnnotationConfig::default(),
        }
    }
}

/// Experimenter recorded on imported sessions.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ExperimenterConfig {
    pub id: i64,
    pub name: Option<String>,
    pub sex: Sex,
}

impl ExperimenterConfig {
    pub fn to_experimenter(&self) -> Experimenter {
        Experimenter {
            experimenter_id: self.id,
            name: self.name.clone(),
            sex: self.sex,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MouseConfig {
    pub genotype: String,
    pub sex: Sex,
}

impl Default for MouseConfig {
    fn default() -> Self {
        Self {
            genotype: "C57BL/6J".to_string(),
            sex: Sex::Unknown,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Label for frames no interval covers.
    pub background_label: String,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            background_label: DEFAULT_BACKGROUND_LABEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/behavior-ingest/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path, falling back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("behavior.db")
    } else {
        // Fallback: current directory
        PathBuf::from("behavior.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.fps, 30);
        assert_eq!(config.mouse.genotype, "C57BL/6J");
        assert_eq!(config.mouse.sex, Sex::Unknown);
        assert_eq!(config.annotation.background_label, "none");
        assert_eq!(config.experimenter.id, 0);
    }

    #[test]
    fn test_partial_sections() {
        let config: AppConfig = toml::from_str(
            r#"
            fps = 25
            label_dir = "/data/labels"

            [experimenter]
            id = 3
            name = "Ada"
            sex = "F"

            [annotation]
            background_label = "other"
            "#,
        )
        .unwrap();
        assert_eq!(config.fps, 25);
        assert_eq!(config.label_dir, Some(PathBuf::from("/data/labels")));
        assert!(config.pose_dir.is_none());
        let e = config.experimenter.to_experimenter();
        assert_eq!(e.experimenter_id, 3);
        assert_eq!(e.name.as_deref(), Some("Ada"));
        assert_eq!(e.sex, Sex::Female);
        assert_eq!(config.annotation.background_label, "other");
        assert_eq!(config.mouse.genotype, "C57BL/6J");
    }

    #[test]
    fn test_unparseable_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "fps = \"fast\"").unwrap();
        let config = AppConfig::load_from(&path);
        assert_eq!(config.fps, 30);
    }
}
