use serde::Deserialize;

/// Static GMP endpoint configuration for one probe.
#[derive(Debug, Clone, Deserialize)]
pub struct GvmConfig {
    pub host: String,
    #[serde(default = "default_gvm_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

fn default_gvm_port() -> u16 {
    9390
}

fn default_timeout() -> u64 {
    300
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    pub name: String,
    pub gvm: GvmConfig,
}
