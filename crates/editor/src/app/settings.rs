use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};
use vtt_engine::LoopConfig;

pub(crate) const SETTINGS_FILE_NAME: &str = "vtt.settings.json";

#[derive(Debug, Error)]
pub(crate) enum SettingsError {
    #[error("read settings '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse settings '{path}'{}: {source}", field_suffix(.field))]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

fn field_suffix(field: &str) -> String {
    if field.is_empty() || field == "." {
        String::new()
    } else {
        format!(" at {field}")
    }
}

/// Settings file beside the content root; `Ok(None)` when there is none.
pub(crate) fn read_settings(root: &Path) -> Result<Option<LoopConfig>, SettingsError> {
    let path = root.join(SETTINGS_FILE_NAME);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(SettingsError::Read { path, source }),
    };
    parse_settings(&raw)
        .map(Some)
        .map_err(|(field, source)| SettingsError::Parse {
            path,
            field,
            source,
        })
}

fn parse_settings(raw: &str) -> Result<LoopConfig, (String, serde_json::Error)> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, LoopConfig>(&mut deserializer).map_err(|error| {
        let field = error.path().to_string();
        (field, error.into_inner())
    })
}

/// Reads the settings file, keeping defaults when it is absent or broken.
pub(crate) fn load_settings(root: &Path) -> LoopConfig {
    match read_settings(root) {
        Ok(Some(config)) => {
            info!(file = SETTINGS_FILE_NAME, "settings_loaded");
            config
        }
        Ok(None) => LoopConfig::default(),
        Err(error) => {
            warn!(error = %error, "settings_rejected_using_defaults");
            LoopConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use vtt_engine::SaveFormat;

    use super::*;

    fn write_settings(temp: &TempDir, body: &str) {
        fs::write(temp.path().join(SETTINGS_FILE_NAME), body).expect("write settings");
    }

    #[test]
    fn missing_file_means_no_overrides() {
        let temp = TempDir::new().expect("temp");
        assert!(read_settings(temp.path()).expect("read").is_none());
        assert_eq!(load_settings(temp.path()), LoopConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let temp = TempDir::new().expect("temp");
        write_settings(
            &temp,
            r#"{ "save_format": "legacy", "player_window": { "width": 1920, "height": 1080 } }"#,
        );

        let config = load_settings(temp.path());
        assert_eq!(config.save_format, SaveFormat::Legacy);
        assert_eq!(config.player_window.width, 1920);
        assert_eq!(config.player_window.title, "VTT");
        assert_eq!(config.operator_window, LoopConfig::default().operator_window);
    }

    #[test]
    fn parse_error_names_the_field_path() {
        let temp = TempDir::new().expect("temp");
        write_settings(&temp, r#"{ "operator_window": { "width": "wide" } }"#);

        let error = read_settings(temp.path()).expect_err("bad width");
        let message = error.to_string();
        assert!(message.contains("operator_window.width"), "{message}");
        assert_eq!(load_settings(temp.path()), LoopConfig::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let temp = TempDir::new().expect("temp");
        write_settings(&temp, r#"{ "slot_count": 20 }"#);

        assert!(matches!(
            read_settings(temp.path()),
            Err(SettingsError::Parse { .. })
        ));
    }
}
