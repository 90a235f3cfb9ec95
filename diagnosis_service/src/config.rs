use leaf_inference::config::{ModelsConfig, Validatable};
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub models: ModelsConfig,
    #[serde(default)]
    pub annotation: AnnotationConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnnotationConfig {
    /// TrueType font overriding the embedded DejaVu Sans for label text.
    pub font_path: Option<PathBuf>,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_thickness")]
    pub thickness: u32,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            font_size: default_font_size(),
            thickness: default_thickness(),
        }
    }
}

fn default_font_size() -> f32 {
    16.0
}

fn default_thickness() -> u32 {
    2
}

impl Validatable for AnnotationConfig {
    fn validate(&self) -> Result<(), String> {
        if let Some(path) = &self.font_path {
            if !path.exists() {
                return Err(format!("Font file not found: {:?}", path));
            }
        }
        if self.font_size <= 0.0 {
            return Err(format!(
                "annotation font_size must be positive, got {}",
                self.font_size
            ));
        }
        if self.thickness == 0 {
            return Err("annotation thickness must be greater than zero".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            request_timeout_ms: default_request_timeout_ms(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_in_flight() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl LimitsConfig {
    pub fn get_request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Validatable for LimitsConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_in_flight == 0 {
            return Err("limits max_in_flight must be greater than zero".into());
        }
        if self.request_timeout_ms == 0 {
            return Err("limits request_timeout_ms must be greater than zero".into());
        }
        Ok(())
    }
}

impl Validatable for Config {
    fn validate(&self) -> Result<(), String> {
        self.models.validate()?;
        self.annotation.validate()?;
        self.limits.validate()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

/// Loads `configuration/base.yaml`, then `configuration/{APP_ENVIRONMENT}.yaml`,
/// then `LEAF_*` environment variables (`__` separates nested keys).
pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("LEAF")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;
    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    const YAML: &str = r#"
server:
  host: 127.0.0.1
  port: 8080
log_level: Debug
models:
  detector_model_path: models/detector.onnx
  classifier_model_path: models/classifier.onnx
  classifier:
    layout: nchw
limits:
  max_in_flight: 2
"#;

    fn parse(yaml: &str) -> Result<Config, config::ConfigError> {
        config::Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Config>()
    }

    #[test]
    fn test_parse_with_defaults() {
        let config = parse(YAML).unwrap();

        assert_eq!(config.server.get_address(), "127.0.0.1:8080");
        assert_eq!(config.log_level.as_str(), "debug");
        assert_eq!(
            config.models.detector_model_path,
            PathBuf::from("models/detector.onnx")
        );
        assert_eq!(config.models.detector.input_size, 640);
        assert_eq!(config.models.classifier.input_size, 224);
        assert_eq!(
            config.models.classifier.layout,
            leaf_inference::config::TensorLayout::Nchw
        );
        assert!(config.annotation.font_path.is_none());
        assert_eq!(config.annotation.thickness, 2);
        assert_eq!(config.limits.max_in_flight, 2);
        assert_eq!(config.limits.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.limits.get_request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_model_path_is_rejected() {
        let yaml = r#"
server:
  host: 127.0.0.1
  port: 8080
log_level: info
models:
  detector_model_path: models/detector.onnx
"#;
        assert!(parse(yaml).is_err());
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let yaml = YAML.replace("log_level: Debug", "log_level: trace");
        assert!(parse(&yaml).is_err());
    }

    #[test]
    fn test_validation_reports_missing_models() {
        let config = parse(YAML).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("model file not found"));
    }

    #[test]
    fn test_environment_parsing() {
        let env: Environment = "Production".to_string().try_into().unwrap();
        assert_eq!(env.as_str(), "production");
        assert!(Environment::try_from("staging".to_string()).is_err());
    }
}
