use serde_derive::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Server configuration, loadable from a file via `confy` or built from
/// CLI flags. Every field has a sensible default so a missing or
/// unreadable config file never stops the server from starting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ServerConfig {
    /// Loads the config at `path`, falling back to defaults if the file
    /// is missing or malformed rather than failing startup over it.
    pub fn load(path: &str) -> Self {
        match confy::load_path(path) {
            Ok(cfg) => cfg,
            Err(_) => ServerConfig::default(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
