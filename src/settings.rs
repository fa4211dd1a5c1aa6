use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn, Level};
use ts_rs::TS;

use crate::dsl::registry::Registry;
use crate::error::{AppError, AppResult};

const SETTINGS_VERSION: u32 = 1;

/// Compiler configuration, read from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
#[serde(default)]
pub struct CompilerSettings {
    pub version: u32,
    /// JSON registry merged over the built-in tables.
    pub registry: Option<PathBuf>,
    /// Pretty-print JSON output.
    pub pretty: bool,
    /// `tracing` level used when `-v` is not given.
    pub log_level: Option<String>,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            registry: None,
            pretty: false,
            log_level: None,
        }
    }
}

impl CompilerSettings {
    /// Reject settings this compiler can't honour.
    pub fn validate(&self) -> AppResult<()> {
        if self.version > SETTINGS_VERSION {
            return Err(AppError::Config(format!(
                "version {} is newer than the supported version {SETTINGS_VERSION}",
                self.version
            )));
        }
        if let Some(level) = &self.log_level {
            level
                .parse::<Level>()
                .map_err(|_| AppError::Config(format!("unknown log level '{level}'")))?;
        }
        Ok(())
    }

    /// Built-in registry, extended with the configured registry file. A
    /// relative registry path is resolved against `base_dir`.
    pub fn load_registry(&self, base_dir: &Path) -> AppResult<Registry> {
        let mut registry = Registry::builtin();
        if let Some(path) = &self.registry {
            let path = base_dir.join(path);
            registry.extend(read_registry(&path)?);
        }
        Ok(registry)
    }
}

/// Read a registry extension file.
pub fn read_registry(path: &Path) -> AppResult<Registry> {
    let data = std::fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
    let registry: Registry =
        serde_json::from_str(&data).map_err(|e| AppError::registry(path, e.to_string()))?;
    debug!(
        path = %path.display(),
        settings = registry.settings.len(),
        prefixes = registry.prefixes.len(),
        "loaded registry extension"
    );
    Ok(registry)
}

/// Load settings from `path`. Returns None if the file does not exist or
/// cannot be parsed.
pub fn load_settings(path: &Path) -> Option<CompilerSettings> {
    if !path.exists() {
        return None;
    }
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read config");
            return None;
        }
    };
    match serde_json::from_str::<CompilerSettings>(&data) {
        Ok(settings) => Some(settings),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unparsable config");
            None
        }
    }
}

/// Save settings to `path`.
pub fn save_settings(path: &Path, settings: &CompilerSettings) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| AppError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json).map_err(|e| AppError::io(path, e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dsl::registry::ValueType;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_settings_round_trip() {
        let dir = temp_dir("evoscript_test_settings");
        let path = dir.join("evoscript.json");
        let settings = CompilerSettings {
            pretty: true,
            log_level: Some("debug".into()),
            ..CompilerSettings::default()
        };
        save_settings(&path, &settings).unwrap();

        let loaded = load_settings(&path).expect("should load");
        assert_eq!(loaded, settings);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_fields_default() {
        let dir = temp_dir("evoscript_test_partial");
        let path = dir.join("evoscript.json");
        std::fs::write(&path, r#"{ "pretty": true }"#).unwrap();

        let loaded = load_settings(&path).expect("should load");
        assert!(loaded.pretty);
        assert_eq!(loaded.version, SETTINGS_VERSION);
        assert!(loaded.registry.is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_or_broken_returns_none() {
        let dir = temp_dir("evoscript_test_broken");
        assert!(load_settings(&dir.join("absent.json")).is_none());
        let path = dir.join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_settings(&path).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_validate_rejects_unsupported_config() {
        assert!(CompilerSettings::default().validate().is_ok());

        let newer = CompilerSettings {
            version: SETTINGS_VERSION + 1,
            ..CompilerSettings::default()
        };
        let err = newer.validate().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().starts_with("invalid config: version 2"));

        let noisy = CompilerSettings {
            log_level: Some("loud".into()),
            ..CompilerSettings::default()
        };
        assert_eq!(
            noisy.validate().unwrap_err().to_string(),
            "invalid config: unknown log level 'loud'"
        );
    }

    #[test]
    fn test_registry_extension_is_merged() {
        let dir = temp_dir("evoscript_test_registry");
        std::fs::write(
            dir.join("extra.json"),
            r#"{ "settings": { "autoFleet": "boolean" } }"#,
        )
        .unwrap();
        let settings = CompilerSettings {
            registry: Some(PathBuf::from("extra.json")),
            ..CompilerSettings::default()
        };
        let registry = settings.load_registry(&dir).unwrap();
        assert_eq!(registry.setting_type("autoFleet"), Some(ValueType::Boolean));
        assert_eq!(registry.setting_type("autoBuild"), Some(ValueType::Boolean));

        let bad = CompilerSettings {
            registry: Some(PathBuf::from("missing.json")),
            ..CompilerSettings::default()
        };
        assert!(matches!(bad.load_registry(&dir), Err(AppError::Io { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
