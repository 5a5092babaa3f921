use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SniffError};
use crate::magic::Options;

/// Root configuration, loaded from `~/.config/filesniff/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SniffConfig {
    pub magic: MagicConfig,
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagicConfig {
    /// Magic database to load. Unset uses libmagic's compiled-in default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// Exact libmagic file to load instead of searching the usual names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub follow_symlinks: bool,
    pub decompress: bool,
    pub preserve_atime: bool,
    pub raw: bool,
}

// ─── Load / Save ───────────────────────────────────────────

impl SniffConfig {
    /// Standard config file path: `~/.config/filesniff/config.toml`
    pub fn config_path() -> PathBuf {
        // Allow override via env var
        if let Ok(path) = std::env::var("FILESNIFF_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("filesniff")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if let Some(lib) = &self.magic.library_path {
            if lib.contains('\0') {
                return Err(SniffError::ConfigError(
                    "magic.library_path contains a NUL byte".to_string(),
                ));
            }
        }
        Ok(())
    }

    // ─── Derived values ────────────────────────────────────

    /// Database path with empty strings treated as unset.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.magic
            .database_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }

    pub fn options(&self) -> Options {
        Options {
            follow_symlinks: self.detection.follow_symlinks,
            decompress: self.detection.decompress,
            preserve_atime: self.detection.preserve_atime,
            raw: self.detection.raw,
        }
    }

    /// Flattened `key = value` view used by `filesniff config list`.
    pub fn key_values(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "magic.database_path",
                self.magic
                    .database_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ),
            (
                "magic.library_path",
                self.magic.library_path.clone().unwrap_or_default(),
            ),
            ("detection.follow_symlinks", self.detection.follow_symlinks.to_string()),
            ("detection.decompress", self.detection.decompress.to_string()),
            ("detection.preserve_atime", self.detection.preserve_atime.to_string()),
            ("detection.raw", self.detection.raw.to_string()),
        ]
    }

    /// Set one `key_values` entry from its string form. An empty value
    /// clears the path keys. On error `self` is left unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let path = || (!value.is_empty()).then(|| value.to_string());
        let mut next = self.clone();
        match key {
            "magic.database_path" => next.magic.database_path = path().map(PathBuf::from),
            "magic.library_path" => next.magic.library_path = path(),
            "detection.follow_symlinks" => next.detection.follow_symlinks = parse_bool(key, value)?,
            "detection.decompress" => next.detection.decompress = parse_bool(key, value)?,
            "detection.preserve_atime" => next.detection.preserve_atime = parse_bool(key, value)?,
            "detection.raw" => next.detection.raw = parse_bool(key, value)?,
            _ => return Err(SniffError::ConfigError(format!("unknown config key: {key}"))),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value.parse().map_err(|_| {
        SniffError::ConfigError(format!("{key} expects true or false, got {value:?}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let cfg = SniffConfig::default();
        assert!(cfg.database_path().is_none());
        assert!(cfg.magic.library_path.is_none());
        assert_eq!(cfg.options(), Options::default());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = SniffConfig::default();
        cfg.magic.database_path = Some(PathBuf::from("/usr/share/misc/magic.mgc"));
        cfg.detection.decompress = true;
        cfg.save_to(&path).unwrap();

        let loaded = SniffConfig::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);
        assert!(loaded.options().decompress);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[detection]\nfollow_symlinks = true\n").unwrap();

        let cfg = SniffConfig::load_from(&path).unwrap();
        assert!(cfg.detection.follow_symlinks);
        assert!(!cfg.detection.raw);
        assert!(cfg.database_path().is_none());
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let cfg = SniffConfig::load_from(Path::new("/tmp/nonexistent_filesniff_config.toml")).unwrap();
        assert_eq!(cfg, SniffConfig::default());
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[magic\ndatabase_path = ").unwrap();
        assert!(matches!(
            SniffConfig::load_from(&path),
            Err(SniffError::TomlParse(_))
        ));
    }

    #[test]
    fn test_empty_database_path_is_unset() {
        let mut cfg = SniffConfig::default();
        cfg.magic.database_path = Some(PathBuf::new());
        assert!(cfg.database_path().is_none());
    }

    #[test]
    fn test_key_values() {
        let kv = SniffConfig::default().key_values();
        assert!(kv.iter().any(|(k, v)| *k == "detection.raw" && v == "false"));
        assert_eq!(kv.len(), 6);
    }

    #[test]
    fn test_set_then_save_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = SniffConfig::load_from(&path).unwrap();
        cfg.set("magic.database_path", "/opt/magic/custom.mgc").unwrap();
        cfg.set("detection.decompress", "true").unwrap();
        cfg.save_to(&path).unwrap();

        let loaded = SniffConfig::load_from(&path).unwrap();
        assert_eq!(loaded.database_path(), Some(PathBuf::from("/opt/magic/custom.mgc")));
        assert!(loaded.detection.decompress);

        let mut cleared = loaded.clone();
        cleared.set("magic.database_path", "").unwrap();
        assert!(cleared.magic.database_path.is_none());
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut cfg = SniffConfig::default();
        assert!(matches!(
            cfg.set("detection.raw", "yes"),
            Err(SniffError::ConfigError(_))
        ));
        assert!(matches!(
            cfg.set("magic.nope", "x"),
            Err(SniffError::ConfigError(_))
        ));
        assert!(matches!(
            cfg.set("magic.library_path", "lib\0magic"),
            Err(SniffError::ConfigError(_))
        ));
        assert_eq!(cfg, SniffConfig::default());
    }

    #[cfg(unix)]
    #[test]
    fn test_database_path_keeps_non_utf8_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let raw = OsStr::from_bytes(b"/tmp/\xffmagic.mgc");
        let mut cfg = SniffConfig::default();
        cfg.magic.database_path = Some(PathBuf::from(raw));
        assert_eq!(cfg.database_path().unwrap().as_os_str().as_bytes(), raw.as_bytes());
    }
}
