use crate::error::AppError;
use crate::observability::init_tracing;
use serde::Deserialize;

/// Telemetry settings shared by every LIS component: where logs go and how
/// verbose they are. Components embed it as their `telemetry` section.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_service_name() -> String {
    "lis".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

impl Config {
    /// Install the global tracing subscriber for this component.
    pub fn init_tracing(&self) -> Result<(), AppError> {
        init_tracing(
            &self.service_name,
            &self.log_level,
            self.otlp_endpoint.as_deref(),
        )
    }
}
