//! Layered configuration: defaults → optional `config.yaml` file →
//! environment variables.

use serde::Deserialize;

use crate::models::ProbeConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// HS256 secret for the bearer-auth middleware. Empty disables auth.
    #[serde(default)]
    pub jwt_secret: String,
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            jwt_secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,
    #[serde(default = "default_true")]
    pub cleanup_after_report: bool,
    #[serde(default = "default_port_list_name")]
    pub default_port_list: String,
    #[serde(default = "default_scan_config_name")]
    pub scan_config_name: String,
    #[serde(default = "default_scanner_name")]
    pub scanner_name: String,
    /// Accepted but not enforced by the selector — load-minimum with
    /// explicit-name override is canonical regardless of this value.
    #[serde(default = "default_max_consecutive")]
    pub max_consecutive_same_probe: u32,
}

fn default_poll_interval() -> u64 {
    30
}
fn default_max_duration() -> u64 {
    86_400
}
fn default_true() -> bool {
    true
}
fn default_port_list_name() -> String {
    "All IANA assigned TCP".to_string()
}
fn default_scan_config_name() -> String {
    "Full and fast".to_string()
}
fn default_scanner_name() -> String {
    "OpenVAS Default".to_string()
}
fn default_max_consecutive() -> u32 {
    3
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_duration_secs: default_max_duration(),
            cleanup_after_report: true,
            default_port_list: default_port_list_name(),
            scan_config_name: default_scan_config_name(),
            scanner_name: default_scanner_name(),
            max_consecutive_same_probe: default_max_consecutive(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,
    #[serde(default)]
    pub callback_url: String,
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_scheduler_interval")]
    pub scheduler_interval_secs: u64,
}

fn default_sync_interval() -> u64 {
    300
}
fn default_source_timeout() -> u64 {
    30
}
fn default_scheduler_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "console".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub probes: Vec<ProbeConfig>,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "scans.db".to_string()
}

impl AppConfig {
    /// Load from `CONFIG_PATH` (default `config.yaml`) if present, then
    /// apply environment variable overrides — env wins.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        let mut builder = config::Config::builder();
        if std::path::Path::new(&config_path).exists() {
            builder = builder.add_source(config::File::with_name(&config_path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("SCANHUB")
                .separator("__")
                .try_parsing(true),
        );

        let raw = builder.build()?;
        let mut app: AppConfig = raw.try_deserialize().or_else(|_| {
            // No file and no SCANHUB__* env vars: fall back to a single
            // probe sourced from flat GVM_* env vars (legacy compatibility).
            Ok::<AppConfig, config::ConfigError>(AppConfig {
                probes: vec![ProbeConfig {
                    name: "default".to_string(),
                    gvm: crate::models::GvmConfig {
                        host: "127.0.0.1".to_string(),
                        port: 9390,
                        username: "admin".to_string(),
                        password: "admin".to_string(),
                        timeout_secs: 300,
                        retry_attempts: 3,
                        retry_delay_secs: 5,
                    },
                }],
                api: ApiConfig::default(),
                scan: ScanConfig::default(),
                source: SourceConfig::default(),
                logging: LoggingConfig::default(),
                database_path: default_database_path(),
            })
        })?;

        apply_legacy_env_overrides(&mut app);
        Ok(app)
    }
}

/// Flat, single-value env vars for legacy deployments, applied after
/// structured config so either style of deployment works.
fn apply_legacy_env_overrides(app: &mut AppConfig) {
    if let Ok(v) = std::env::var("API_HOST") {
        app.api.host = v;
    }
    if let Ok(v) = std::env::var("API_PORT") {
        if let Ok(p) = v.parse() {
            app.api.port = p;
        }
    }
    if let Ok(v) = std::env::var("JWT_SECRET") {
        app.api.jwt_secret = v;
    }
    if let Ok(v) = std::env::var("SCAN_POLL_INTERVAL") {
        if let Ok(p) = v.parse() {
            app.scan.poll_interval_secs = p;
        }
    }
    if let Ok(v) = std::env::var("SCAN_MAX_DURATION") {
        if let Ok(p) = v.parse() {
            app.scan.max_duration_secs = p;
        }
    }
    if let Ok(v) = std::env::var("SCAN_CLEANUP") {
        app.scan.cleanup_after_report = matches!(v.to_lowercase().as_str(), "true" | "1" | "yes");
    }
    if let Ok(v) = std::env::var("SOURCE_URL") {
        app.source.url = v;
    }
    if let Ok(v) = std::env::var("SOURCE_AUTH_TOKEN") {
        app.source.auth_token = v;
    }
    if let Ok(v) = std::env::var("SOURCE_SYNC_INTERVAL") {
        if let Ok(p) = v.parse() {
            app.source.sync_interval_secs = p;
        }
    }
    if let Ok(v) = std::env::var("SOURCE_CALLBACK_URL") {
        app.source.callback_url = v;
    }
    if let Ok(v) = std::env::var("SOURCE_TIMEOUT") {
        if let Ok(p) = v.parse() {
            app.source.timeout_secs = p;
        }
    }
    if let Ok(v) = std::env::var("SOURCE_SCHEDULER_INTERVAL") {
        if let Ok(p) = v.parse() {
            app.source.scheduler_interval_secs = p;
        }
    }
    if let Ok(v) = std::env::var("LOG_LEVEL") {
        app.logging.level = v;
    }
    if let Ok(v) = std::env::var("LOG_FORMAT") {
        app.logging.format = v;
    }
    if let Ok(v) = std::env::var("DATABASE_PATH") {
        app.database_path = v;
    }

    if let Some(first) = app.probes.first_mut() {
        if let Ok(v) = std::env::var("GVM_HOST") {
            first.gvm.host = v;
        }
        if let Ok(v) = std::env::var("GVM_PORT") {
            if let Ok(p) = v.parse() {
                first.gvm.port = p;
            }
        }
        if let Ok(v) = std::env::var("GVM_USERNAME") {
            first.gvm.username = v;
        }
        if let Ok(v) = std::env::var("GVM_PASSWORD") {
            first.gvm.password = v;
        }
        if let Ok(v) = std::env::var("GVM_TIMEOUT") {
            if let Ok(p) = v.parse() {
                first.gvm.timeout_secs = p;
            }
        }
        if let Ok(v) = std::env::var("GVM_RETRY_ATTEMPTS") {
            if let Ok(p) = v.parse() {
                first.gvm.retry_attempts = p;
            }
        }
        if let Ok(v) = std::env::var("GVM_RETRY_DELAY") {
            if let Ok(p) = v.parse() {
                first.gvm.retry_delay_secs = p;
            }
        }
    }
}
