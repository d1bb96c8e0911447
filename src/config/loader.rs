//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::schema::Config;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("parsing TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config document: {0}")]
    Invalid(#[source] serde_json::Error),
}

/// Document format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

impl Format {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Format::Toml,
            _ => Format::Json,
        }
    }
}

/// Parse `content` into a raw document.
pub fn parse_document(content: &str, format: Format) -> Result<Value, ConfigError> {
    match format {
        Format::Json => serde_json::from_str(content).map_err(ConfigError::Json),
        Format::Toml => {
            let table: toml::Table = toml::from_str(content)?;
            serde_json::to_value(table).map_err(ConfigError::Invalid)
        }
    }
}

/// Decode a raw document into a [`Config`].
pub fn parse_config(document: Value) -> Result<Config, ConfigError> {
    serde_json::from_value(document).map_err(ConfigError::Invalid)
}

/// Load configuration from a JSON or TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(parse_document(&content, Format::from_path(path))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_and_json_agree() {
        let toml = r#"
            [admin]
            listen = "127.0.0.1:2999"

            [apps.http.servers.main]
            listen = [":8080"]

            [[apps.http.servers.main.routes]]
            handle = [{ handler = "static_response", body = "hi" }]
        "#;
        let json = r#"{
            "admin": {"listen": "127.0.0.1:2999"},
            "apps": {"http": {"servers": {"main": {
                "listen": [":8080"],
                "routes": [{"handle": [{"handler": "static_response", "body": "hi"}]}]
            }}}}
        }"#;

        let from_toml = parse_config(parse_document(toml, Format::Toml).unwrap()).unwrap();
        let from_json = parse_config(parse_document(json, Format::Json).unwrap()).unwrap();
        assert_eq!(from_toml.admin.listen, "127.0.0.1:2999");
        assert_eq!(from_toml.apps, from_json.apps);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(Format::from_path(Path::new("a/b.TOML")), Format::Toml);
        assert_eq!(Format::from_path(Path::new("a/b.json")), Format::Json);
        assert_eq!(Format::from_path(Path::new("noext")), Format::Json);
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/switchyard.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
