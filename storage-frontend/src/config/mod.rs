use lis_core::config::Config as TelemetryConfig;
use lis_core::error::AppError;
use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    #[serde(default)]
    pub storage_api: StorageApiSettings,
    #[serde(default)]
    pub workflow: WorkflowSettings,
    #[serde(default = "default_telemetry")]
    pub telemetry: TelemetryConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct StorageApiSettings {
    /// Base URL the `/rest/storage/...` paths are appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Session token forwarded as bearer auth, when the embedding shell has one.
    #[serde(default)]
    pub session_token: Option<Secret<String>>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StorageApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_token: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl StorageApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api/OpenELIS-Global".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Deserialize, Clone, Debug)]
pub struct WorkflowSettings {
    /// Persist a chosen location without an explicit confirm.
    #[serde(default)]
    pub auto_save: bool,
    #[serde(default = "default_autosave_delay_ms")]
    pub autosave_delay_ms: u64,
    #[serde(default = "default_indicator_ms")]
    pub autosaved_indicator_ms: u64,
    #[serde(default = "default_indicator_ms")]
    pub barcode_error_ms: u64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            auto_save: false,
            autosave_delay_ms: default_autosave_delay_ms(),
            autosaved_indicator_ms: default_indicator_ms(),
            barcode_error_ms: default_indicator_ms(),
        }
    }
}

impl WorkflowSettings {
    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }

    pub fn autosaved_indicator(&self) -> Duration {
        Duration::from_millis(self.autosaved_indicator_ms)
    }

    pub fn barcode_error(&self) -> Duration {
        Duration::from_millis(self.barcode_error_ms)
    }
}

fn default_autosave_delay_ms() -> u64 {
    500
}

fn default_indicator_ms() -> u64 {
    3_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_api: StorageApiSettings::default(),
            workflow: WorkflowSettings::default(),
            telemetry: default_telemetry(),
        }
    }
}

fn default_telemetry() -> TelemetryConfig {
    TelemetryConfig {
        service_name: "storage-frontend".to_string(),
        ..TelemetryConfig::default()
    }
}

impl Settings {
    /// Build settings from an inline YAML document, without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }

    /// Install the global tracing subscriber from the telemetry section.
    pub fn init_telemetry(&self) -> Result<(), AppError> {
        self.telemetry.init_tracing()
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    dotenvy::dotenv().ok();

    let base_path =
        std::env::current_dir().map_err(|e| config::ConfigError::Foreign(Box::new(e)))?;

    // Either run from the crate directory or from the workspace root
    let configuration_directory = if base_path.ends_with("storage-frontend") {
        base_path.join("config")
    } else {
        base_path.join("storage-frontend").join("config")
    };

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")).required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults_apply_to_empty_document() {
        let settings = Settings::from_yaml("{}").unwrap();
        assert_eq!(
            settings.storage_api.base_url,
            "http://localhost:8080/api/OpenELIS-Global"
        );
        assert!(settings.storage_api.session_token.is_none());
        assert!(!settings.workflow.auto_save);
        assert_eq!(settings.workflow.autosave_delay(), Duration::from_millis(500));
        assert_eq!(settings.workflow.autosaved_indicator(), Duration::from_secs(3));
        assert_eq!(settings.telemetry.service_name, "storage-frontend");
        assert_eq!(settings.telemetry.log_level, "info");
        assert!(settings.telemetry.otlp_endpoint.is_none());
    }

    #[test]
    fn test_yaml_overrides() {
        let settings = Settings::from_yaml(
            r#"
storage_api:
  base_url: "http://lis.test/api"
  session_token: "abc"
  timeout_ms: 2500
workflow:
  auto_save: true
telemetry:
  log_level: "debug"
  otlp_endpoint: "http://collector:4317"
"#,
        )
        .unwrap();
        assert_eq!(settings.storage_api.base_url, "http://lis.test/api");
        assert_eq!(
            settings
                .storage_api
                .session_token
                .as_ref()
                .map(|t| t.expose_secret().as_str()),
            Some("abc")
        );
        assert_eq!(settings.storage_api.timeout(), Duration::from_millis(2500));
        assert!(settings.workflow.auto_save);
        assert_eq!(settings.workflow.barcode_error_ms, 3000);
        assert_eq!(settings.telemetry.log_level, "debug");
        assert_eq!(
            settings.telemetry.otlp_endpoint.as_deref(),
            Some("http://collector:4317")
        );
    }
}
