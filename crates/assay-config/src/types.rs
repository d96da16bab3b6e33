//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [server]                 # HTTP API settings
//! [storage]                # data directory and database
//! [pipeline]               # step resolution and workspace conventions
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Application name used for platform directory resolution.
pub const APP_NAME: &str = "assay";

/// Default bind address for the HTTP API.
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Default max body size for REST requests (1 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Conventional name of the shared document inside each artifact directory.
pub const DEFAULT_SHARED_DOCUMENT: &str = "data.json";

/// Conventional name of the final report a workflow may leave behind.
pub const DEFAULT_REPORT_FILE: &str = "report.docx";

/// Environment variable carrying the workspace path into each step.
pub const DEFAULT_WORKSPACE_ENV: &str = "WORK_DIR";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssayConfig {
    /// HTTP server configuration.
    pub server: Option<ServerSection>,

    /// Storage locations.
    pub storage: Option<StorageSection>,

    /// Pipeline execution settings.
    pub pipeline: Option<PipelineSection>,
}

impl AssayConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: AssayConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.storage.is_some() {
            self.storage = other.storage;
        }
        if other.pipeline.is_some() {
            self.pipeline = other.pipeline;
        }
    }

    /// The `[server]` section, or its defaults.
    pub fn server(&self) -> ServerSection {
        self.server.clone().unwrap_or_default()
    }

    /// The `[storage]` section, or its defaults.
    pub fn storage(&self) -> StorageSection {
        self.storage.clone().unwrap_or_default()
    }

    /// The `[pipeline]` section, or its defaults.
    pub fn pipeline(&self) -> PipelineSection {
        self.pipeline.clone().unwrap_or_default()
    }

    /// Directory holding all persistent state.
    pub fn data_dir(&self) -> PathBuf {
        self.storage()
            .data_dir
            .unwrap_or_else(default_data_dir)
    }

    /// Path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        match self.storage().database {
            Some(path) => resolve_relative(&self.data_dir(), path),
            None => self.data_dir().join(format!("{APP_NAME}.db")),
        }
    }

    /// Root directory under which one artifact directory per job is created.
    pub fn results_dir(&self) -> PathBuf {
        match self.pipeline().results_dir {
            Some(path) => resolve_relative(&self.data_dir(), path),
            None => self.data_dir().join("results"),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from(".assay"))
}

/// Relative paths are resolved from the data directory.
fn resolve_relative(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address to bind to (`host:port`).
    pub bind: String,
    /// Enable request logging.
    pub request_logging: bool,
    /// Maximum REST request body size in bytes.
    pub max_body_size: usize,
    /// CORS allowed origins (empty disables CORS, `*` allows any origin).
    pub cors_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            request_logging: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerSection {
    /// Parse the configured bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind.parse().map_err(|e| ConfigError::InvalidValue {
            field: "server.bind".to_string(),
            reason: format!("{e}"),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Storage configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Base directory for persistent state.
    /// Default: platform data dir + `/assay`.
    pub data_dir: Option<PathBuf>,
    /// SQLite database path. Relative paths are resolved from `data_dir`.
    pub database: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Pipeline configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Directory that step identifiers are resolved against.
    pub steps_dir: PathBuf,
    /// Root for per-job artifact directories. Relative paths are resolved
    /// from the data directory.
    pub results_dir: Option<PathBuf>,
    /// Interpreter for `.py` steps.
    pub python: String,
    /// Interpreter for `.js` / `.cjs` steps.
    pub node: String,
    /// File name of the shared document seeded into every workspace.
    pub shared_document: String,
    /// File name of the report a workflow may produce.
    pub report_file: String,
    /// Environment variable carrying the workspace path.
    pub workspace_env: String,
    /// Per-step deadline in seconds. Unset means steps may run indefinitely.
    pub step_timeout_secs: Option<u64>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            steps_dir: PathBuf::from("scripts"),
            results_dir: None,
            python: "python3".to_string(),
            node: "node".to_string(),
            shared_document: DEFAULT_SHARED_DOCUMENT.to_string(),
            report_file: DEFAULT_REPORT_FILE.to_string(),
            workspace_env: DEFAULT_WORKSPACE_ENV.to_string(),
            step_timeout_secs: None,
        }
    }
}

impl PipelineSection {
    /// Step deadline as a [`Duration`], if configured.
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AssayConfig::from_toml("").unwrap();
        let server = config.server();
        assert_eq!(server.bind, DEFAULT_BIND);
        assert!(server.request_logging);

        let pipeline = config.pipeline();
        assert_eq!(pipeline.python, "python3");
        assert_eq!(pipeline.node, "node");
        assert_eq!(pipeline.shared_document, "data.json");
        assert_eq!(pipeline.workspace_env, "WORK_DIR");
        assert!(pipeline.step_timeout().is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let config = AssayConfig::from_toml(
            r#"
[server]
bind = "0.0.0.0:9000"
request_logging = false

[storage]
data_dir = "/var/lib/assay"
database = "jobs.db"

[pipeline]
steps_dir = "/opt/steps"
python = "python3.12"
step_timeout_secs = 600
"#,
        )
        .unwrap();

        assert_eq!(config.server().socket_addr().unwrap().port(), 9000);
        assert!(!config.server().request_logging);
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/assay/jobs.db"));
        assert_eq!(config.results_dir(), PathBuf::from("/var/lib/assay/results"));

        let pipeline = config.pipeline();
        assert_eq!(pipeline.steps_dir, PathBuf::from("/opt/steps"));
        assert_eq!(pipeline.python, "python3.12");
        assert_eq!(pipeline.node, "node");
        assert_eq!(pipeline.step_timeout(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_absolute_results_dir_is_kept() {
        let config = AssayConfig::from_toml(
            r#"
[storage]
data_dir = "/data"

[pipeline]
results_dir = "/srv/results"
"#,
        )
        .unwrap();
        assert_eq!(config.results_dir(), PathBuf::from("/srv/results"));
        assert_eq!(config.database_path(), PathBuf::from("/data/assay.db"));
    }

    #[test]
    fn test_merge_overrides_sections() {
        let mut base = AssayConfig::from_toml("[server]\nbind = \"127.0.0.1:1\"\n").unwrap();
        let overlay = AssayConfig::from_toml("[pipeline]\nnode = \"nodejs\"\n").unwrap();
        base.merge(overlay);

        assert_eq!(base.server().bind, "127.0.0.1:1");
        assert_eq!(base.pipeline().node, "nodejs");

        let overlay = AssayConfig::from_toml("[server]\nbind = \"127.0.0.1:2\"\n").unwrap();
        base.merge(overlay);
        assert_eq!(base.server().bind, "127.0.0.1:2");
    }

    #[test]
    fn test_invalid_bind_address() {
        let config = AssayConfig::from_toml("[server]\nbind = \"not-an-address\"\n").unwrap();
        let err = config.server().socket_addr().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_unknown_toml_is_rejected() {
        assert!(AssayConfig::from_toml("[server\nbind=").is_err());
    }
}
