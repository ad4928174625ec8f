use serde::Deserialize;
use std::path::PathBuf;

fn default_port() -> u16 {
    8000
}

fn default_db_path() -> PathBuf {
    PathBuf::from("session_hub.sqlite")
}

/// Server configuration file structure (TOML)
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Gemini API key; falls back to the GEMINI_API_KEY environment variable
    pub gemini_api_key: Option<String>,
    /// Model name for text/multimodal calls (default: the gateway's default)
    pub model: Option<String>,
    /// HTTP endpoint executing Workspace actions (task execution is
    /// rejected when unset)
    pub workspace_url: Option<String>,
    /// SQLite database file (default: session_hub.sqlite)
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// HTTP/WebSocket listen port (default: 8000)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed by CORS; empty means any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gemini_api_key: None,
            model: None,
            workspace_url: None,
            db_path: default_db_path(),
            port: default_port(),
            allowed_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Load from a TOML file
    pub fn load(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;
        Ok(config)
    }

    /// Resolve the API key from the file or the environment
    pub fn resolve_api_key(&self) -> Result<String, Box<dyn std::error::Error>> {
        if let Some(key) = &self.gemini_api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }
        match std::env::var("GEMINI_API_KEY") {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err("No Gemini API key: set gemini_api_key in the config file \
                      or the GEMINI_API_KEY environment variable"
                .into()),
        }
    }

    /// Reject configurations that cannot possibly serve
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.port == 0 {
            return Err("port must be non-zero".into());
        }
        if let Some(url) = &self.workspace_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("workspace_url must be an HTTP(S) URL, got '{}'", url).into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_gets_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.db_path, PathBuf::from("session_hub.sqlite"));
        assert!(config.allowed_origins.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bad_workspace_url_is_rejected() {
        let config: Config = toml::from_str(r#"workspace_url = "ftp://nope""#).unwrap();
        assert!(config.validate().is_err());
    }
}
