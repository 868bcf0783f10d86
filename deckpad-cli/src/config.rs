use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use deckpad_core::session::expand_home;
use deckpad_core::{Rgb, ScriptLimits};
use directories::ProjectDirs;
use serde::Deserialize;

/// Settings read from `config.toml`; every key is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub icons_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_filter: Option<String>,
    /// Inches.
    pub slide_width: f64,
    /// Inches.
    pub slide_height: f64,
    pub default_icon_color: Rgb,
    pub script: ScriptLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            icons_dir: None,
            log_dir: None,
            log_filter: None,
            slide_width: 10.0,
            slide_height: 7.5,
            default_icon_color: Rgb::new(0x33, 0x33, 0x33),
            script: ScriptLimits::default(),
        }
    }
}

impl Config {
    /// Reads `explicit` if given, which must exist, or else the default
    /// location, which may be absent.
    pub fn load(explicit: Option<&Path>, project_dirs: &ProjectDirs) -> Result<Self> {
        let path = match explicit {
            Some(path) => expand_home(path),
            None => {
                let path = project_dirs.config_dir().join("config.toml");
                if !path.is_file() {
                    return Ok(Self::default());
                }
                path
            }
        };
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {:?}", path))?;
        Self::parse(&contents).with_context(|| format!("invalid config {:?}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        config.icons_dir = config.icons_dir.as_deref().map(expand_home);
        config.log_dir = config.log_dir.as_deref().map(expand_home);
        Ok(config)
    }

    pub fn log_dir(&self, project_dirs: &ProjectDirs) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| project_dirs.data_local_dir().join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.default_icon_color.hex(), "333333");
    }

    #[test]
    fn keys_override_defaults() {
        let config = Config::parse(
            r##"
icons_dir = "/opt/deckpad/icons"
log_filter = "deckpad_core=debug"
slide_width = 13.333
default_icon_color = "#1F6FEB"

[script]
max_operations = 50000
"##,
        )
        .unwrap();
        assert_eq!(config.icons_dir, Some(PathBuf::from("/opt/deckpad/icons")));
        assert_eq!(config.log_filter.as_deref(), Some("deckpad_core=debug"));
        assert_eq!(config.slide_width, 13.333);
        assert_eq!(config.slide_height, 7.5);
        assert_eq!(config.default_icon_color, Rgb::new(0x1F, 0x6F, 0xEB));
        assert_eq!(config.script.max_operations, 50_000);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(Config::parse("default_icon_color = \"blue\"").is_err());
        assert!(Config::parse("slide_widht = 4.0").is_err());
    }
}
