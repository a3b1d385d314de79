use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use tracing_subscriber::filter::LevelFilter;

use super::diagnostics::{format_diagnostics, Diagnostic, Error, SourceInfo, ValidationError, Warning};
use super::partial::{PartialConfig, PartialSensor};

/// Default display name for a sensor that doesn't set one.
pub const DEFAULT_SENSOR_NAME: &str = "JSON REST Sensor";

/// Default poll interval in seconds.
pub const DEFAULT_SCAN_INTERVAL_S: u64 = 300;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_S: u64 = 10;

#[derive(Debug, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub api: ApiConfig,
    pub sensors: HashMap<String, SensorConfig>,
}

// LogLevel needs Deserialize because it's used in PartialLoggingConfig with toml::Spanned
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    pub overrides: HashMap<String, LogLevel>,
}

/// HTTP API surface configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub listen: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "127.0.0.1".to_string(),
            port: 8732,
        }
    }
}

/// One configured sensor: a URL polled on an interval and republished as
/// a state string plus attributes.
#[derive(Debug, Clone)]
pub struct SensorConfig {
    /// Display name of the sensor.
    pub name: String,

    /// Endpoint to GET; must be an absolute http/https URL.
    pub url: String,

    /// Value for the `Authorization` request header. Wins over any
    /// `Authorization` entry in `headers`.
    pub authorization: Option<String>,

    /// Additional request headers.
    pub headers: HashMap<String, String>,

    /// Time between poll cycles.
    pub scan_interval: Duration,

    /// Bound on each HTTP request.
    pub timeout: Duration,

    /// Optional template reshaping the response before publication. The
    /// parsed response body is bound as `value_json` during rendering.
    pub attributes_template: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("invalid header name '{0}'")]
    Name(String),

    #[error("invalid value for header '{0}'")]
    Value(String),
}

impl SensorConfig {
    /// Build the effective request header map: configured `headers`
    /// first, then `authorization` inserted as `Authorization`, which
    /// wins any collision.
    pub fn header_map(&self) -> Result<HeaderMap, HeaderError> {
        let mut map = HeaderMap::new();

        for (name, value) in &self.headers {
            let header_name = HeaderName::try_from(name.as_str())
                .map_err(|_| HeaderError::Name(name.clone()))?;
            let header_value = HeaderValue::try_from(value.as_str())
                .map_err(|_| HeaderError::Value(name.clone()))?;
            map.insert(header_name, header_value);
        }

        if let Some(authorization) = &self.authorization {
            let header_value = HeaderValue::try_from(authorization.as_str())
                .map_err(|_| HeaderError::Value("Authorization".to_string()))?;
            map.insert(AUTHORIZATION, header_value);
        }

        Ok(map)
    }
}

impl Config {
    /// Load configuration from multiple TOML files with import resolution
    ///
    /// Supports:
    /// - Multiple config files (e.g., base + secrets holding authorization tokens)
    /// - Import statements within config files
    /// - Conflict detection across all sources
    /// - Validation with all errors and warnings reported together
    ///
    /// Returns Ok((Config, diagnostics)) where diagnostics contains warnings and errors.
    /// Only returns Err if there are actual errors (not just warnings).
    pub fn from_files(
        paths: &[PathBuf],
    ) -> Result<(Self, Vec<Diagnostic>), Box<dyn std::error::Error>> {
        // Load all configs
        let configs = PartialConfig::load_with_imports(paths)?;

        // Merge with first-wins semantics, collecting diagnostics
        let (partial, diagnostics) = PartialConfig::merge(configs);

        // Convert to Config and validate, combining all diagnostics
        Self::from_partial(partial, diagnostics)
    }

    /// Convert a PartialConfig to a Config, validating all fields
    ///
    /// Takes diagnostics from the merge step and adds validation diagnostics.
    /// Returns Ok((Config, diagnostics)) if no errors, Err if there are errors.
    pub fn from_partial(
        partial: PartialConfig,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<(Self, Vec<Diagnostic>), Box<dyn std::error::Error>> {
        // Convert logging config
        let logging = if let Some(partial_logging) = partial.logging {
            LoggingConfig {
                level: partial_logging
                    .level
                    .map(|s| *s.get_ref())
                    .unwrap_or_default(),
                overrides: partial_logging
                    .overrides
                    .map(|hm| hm.into_iter().map(|(k, v)| (k, *v.get_ref())).collect())
                    .unwrap_or_default(),
            }
        } else {
            LoggingConfig::default()
        };

        // Convert API config
        let api = if let Some(partial_api) = partial.api {
            let defaults = ApiConfig::default();
            ApiConfig {
                enabled: partial_api
                    .enabled
                    .map(|s| *s.get_ref())
                    .unwrap_or(defaults.enabled),
                listen: partial_api
                    .listen
                    .map(|s| s.into_inner())
                    .unwrap_or(defaults.listen),
                port: partial_api
                    .port
                    .map(|s| *s.get_ref())
                    .unwrap_or(defaults.port),
            }
        } else {
            ApiConfig::default()
        };

        // Validate and convert each sensor
        let mut sensors = HashMap::new();
        if let Some(partial_sensors) = partial.sensors {
            for (id, partial_sensor) in partial_sensors {
                match Self::validate_sensor(&id, partial_sensor, &partial.source) {
                    Ok(sensor) => {
                        sensors.insert(id, sensor);
                    }
                    Err(errors) => {
                        diagnostics.extend(
                            errors
                                .into_iter()
                                .map(|e| Diagnostic::Error(Error::Validation(e))),
                        );
                    }
                }
            }
        }

        if sensors.is_empty() && !diagnostics.iter().any(|d| d.is_error()) {
            diagnostics.push(Diagnostic::Warning(Warning::NoSensors));
        }

        let config = Config {
            logging,
            api,
            sensors,
        };

        // Check if there are any errors (not just warnings)
        let has_errors = diagnostics.iter().any(|d| d.is_error());

        if has_errors {
            Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format_diagnostics(&diagnostics),
            )))
        } else {
            Ok((config, diagnostics))
        }
    }

    /// Validate a partial sensor and convert it to a complete SensorConfig
    fn validate_sensor(
        id: &str,
        partial: PartialSensor,
        source: &Option<SourceInfo>,
    ) -> Result<SensorConfig, Vec<ValidationError>> {
        let mut errors = Vec::new();

        // URL is required and must be an absolute http/https URL
        let url = if let Some(url) = partial.url {
            match reqwest::Url::parse(&url) {
                Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => Some(url),
                Ok(parsed) => {
                    errors.push(ValidationError {
                        field_path: format!("sensors.{}.url", id),
                        message: format!("unsupported URL scheme '{}'", parsed.scheme()),
                        span: None,
                        source: source.clone(),
                    });
                    None
                }
                Err(e) => {
                    errors.push(ValidationError {
                        field_path: format!("sensors.{}.url", id),
                        message: format!("not a valid URL: {}", e),
                        span: None,
                        source: source.clone(),
                    });
                    None
                }
            }
        } else {
            errors.push(ValidationError {
                field_path: format!("sensors.{}.url", id),
                message: "url is required".to_string(),
                span: None,
                source: source.clone(),
            });
            None
        };

        let scan_interval = match partial.scan_interval {
            Some(seconds) if seconds > 0 => Duration::from_secs(seconds as u64),
            Some(_) => {
                errors.push(ValidationError {
                    field_path: format!("sensors.{}.scan_interval", id),
                    message: "scan_interval must be a positive number of seconds".to_string(),
                    span: None,
                    source: source.clone(),
                });
                Duration::from_secs(DEFAULT_SCAN_INTERVAL_S)
            }
            None => Duration::from_secs(DEFAULT_SCAN_INTERVAL_S),
        };

        let timeout = match partial.timeout {
            Some(seconds) if seconds > 0 => Duration::from_secs(seconds as u64),
            Some(_) => {
                errors.push(ValidationError {
                    field_path: format!("sensors.{}.timeout", id),
                    message: "timeout must be a positive number of seconds".to_string(),
                    span: None,
                    source: source.clone(),
                });
                Duration::from_secs(DEFAULT_TIMEOUT_S)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_S),
        };

        let sensor = SensorConfig {
            name: partial.name.unwrap_or_else(|| DEFAULT_SENSOR_NAME.to_string()),
            url: url.unwrap_or_default(),
            authorization: partial.authorization,
            headers: partial.headers.unwrap_or_default(),
            scan_interval,
            timeout,
            attributes_template: partial.attributes_template,
        };

        // Surface bad header names/values at load time rather than on the
        // first poll cycle.
        if let Err(e) = sensor.header_map() {
            errors.push(ValidationError {
                field_path: format!("sensors.{}.headers", id),
                message: e.to_string(),
                span: None,
                source: source.clone(),
            });
        }

        if errors.is_empty() {
            Ok(sensor)
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    // All tests use Config::from_files() with actual file I/O
    // This ensures we test the real loading path

    #[test]
    fn test_merge_non_overlapping_configs() {
        let temp_dir = tempfile::tempdir().unwrap();

        let base_path = temp_dir.path().join("base.toml");
        let mut base_file = fs::File::create(&base_path).unwrap();
        write!(
            base_file,
            r#"
[logging]
level = "info"

[sensors.weather]
url = "https://api.example.com/weather.json"
"#
        )
        .unwrap();

        let extra_path = temp_dir.path().join("extra.toml");
        let mut extra_file = fs::File::create(&extra_path).unwrap();
        write!(
            extra_file,
            r#"
[logging.overrides]
"restpolld::api" = "debug"

[sensors.tickets]
url = "https://api.example.com/tickets"
scan_interval = 60
"#
        )
        .unwrap();

        let result = Config::from_files(&[base_path.clone(), extra_path.clone()]);
        assert!(result.is_ok(), "Config loading failed: {:?}", result.err());

        let (config, diagnostics) = result.unwrap();
        assert_eq!(diagnostics.len(), 0, "Expected no diagnostics");
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.overrides.len(), 1);
        assert_eq!(
            config.logging.overrides.get("restpolld::api"),
            Some(&LogLevel::Debug)
        );
        assert_eq!(config.sensors.len(), 2);
        assert!(config.sensors.contains_key("weather"));
        assert!(config.sensors.contains_key("tickets"));
    }

    #[test]
    fn test_conflict_detection() {
        let temp_dir = tempfile::tempdir().unwrap();

        let base_path = temp_dir.path().join("base.toml");
        let mut base_file = fs::File::create(&base_path).unwrap();
        write!(
            base_file,
            r#"
[logging]
level = "info"

[sensors.weather]
url = "https://api.example.com/weather.json"
"#
        )
        .unwrap();

        let conflict_path = temp_dir.path().join("conflict.toml");
        let mut conflict_file = fs::File::create(&conflict_path).unwrap();
        write!(
            conflict_file,
            r#"
[logging]
level = "debug"
"#
        )
        .unwrap();

        let result = Config::from_files(&[base_path.clone(), conflict_path.clone()]);
        assert!(result.is_err());

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("Merge conflict"));
        assert!(err_msg.contains("logging.level"));
    }

    #[test]
    fn test_sensor_conflict_across_files() {
        let temp_dir = tempfile::tempdir().unwrap();

        let base_path = temp_dir.path().join("base.toml");
        let mut base_file = fs::File::create(&base_path).unwrap();
        write!(
            base_file,
            r#"
[sensors.weather]
url = "https://api.example.com/weather.json"
"#
        )
        .unwrap();

        let conflict_path = temp_dir.path().join("conflict.toml");
        let mut conflict_file = fs::File::create(&conflict_path).unwrap();
        write!(
            conflict_file,
            r#"
[sensors.weather]
url = "https://other.example.com/weather.json"
"#
        )
        .unwrap();

        let result = Config::from_files(&[base_path.clone(), conflict_path.clone()]);
        assert!(result.is_err());

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("sensors.weather"));
    }

    #[test]
    fn test_import_resolution() {
        let temp_dir = tempfile::tempdir().unwrap();

        let base_path = temp_dir.path().join("base.toml");
        let mut base_file = fs::File::create(&base_path).unwrap();
        write!(
            base_file,
            r#"
[logging]
level = "info"
"#
        )
        .unwrap();

        let main_path = temp_dir.path().join("main.toml");
        let mut main_file = fs::File::create(&main_path).unwrap();
        write!(
            main_file,
            r#"
imports = ["base.toml"]

[sensors.weather]
url = "https://api.example.com/weather.json"
"#
        )
        .unwrap();

        let result = Config::from_files(&[main_path.clone()]);
        assert!(result.is_ok());

        let (config, _diagnostics) = result.unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.sensors.len(), 1);
    }

    #[test]
    fn test_import_cycle_detection() {
        let temp_dir = tempfile::tempdir().unwrap();

        let a_path = temp_dir.path().join("a.toml");
        let mut a_file = fs::File::create(&a_path).unwrap();
        write!(
            a_file,
            r#"
imports = ["b.toml"]

[logging]
level = "info"
"#
        )
        .unwrap();

        let b_path = temp_dir.path().join("b.toml");
        let mut b_file = fs::File::create(&b_path).unwrap();
        write!(
            b_file,
            r#"
imports = ["a.toml"]
"#
        )
        .unwrap();

        let result = Config::from_files(&[a_path.clone()]);
        assert!(result.is_err());

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("cycle") || err_msg.contains("Import"));
    }

    #[test]
    fn test_sensor_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();

        let path = temp_dir.path().join("minimal.toml");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
[sensors.weather]
url = "https://api.example.com/weather.json"
"#
        )
        .unwrap();

        let result = Config::from_files(&[path.clone()]);
        assert!(result.is_ok(), "Minimal config should parse: {:?}", result.err());

        let (config, diagnostics) = result.unwrap();
        assert_eq!(diagnostics.len(), 0, "Expected no diagnostics for valid config");

        // Logging and API should use defaults
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.api.enabled);
        assert_eq!(config.api.listen, "127.0.0.1");
        assert_eq!(config.api.port, 8732);

        let sensor = config.sensors.get("weather").unwrap();
        assert_eq!(sensor.name, DEFAULT_SENSOR_NAME);
        assert_eq!(sensor.scan_interval, Duration::from_secs(300));
        assert_eq!(sensor.timeout, Duration::from_secs(10));
        assert!(sensor.authorization.is_none());
        assert!(sensor.headers.is_empty());
        assert!(sensor.attributes_template.is_none());
    }

    #[test]
    fn test_url_required() {
        let temp_dir = tempfile::tempdir().unwrap();

        let path = temp_dir.path().join("bad.toml");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
[sensors.weather]
name = "Weather"
"#
        )
        .unwrap();

        let result = Config::from_files(&[path.clone()]);
        assert!(result.is_err());

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("sensors.weather.url"));
        assert!(err_msg.contains("required"));
    }

    #[test]
    fn test_rejects_non_http_url() {
        let temp_dir = tempfile::tempdir().unwrap();

        let path = temp_dir.path().join("bad.toml");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
[sensors.weather]
url = "ftp://example.com/data"
"#
        )
        .unwrap();

        let result = Config::from_files(&[path.clone()]);
        assert!(result.is_err());

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("scheme"));
    }

    #[test]
    fn test_rejects_zero_scan_interval() {
        let temp_dir = tempfile::tempdir().unwrap();

        let path = temp_dir.path().join("bad.toml");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
[sensors.weather]
url = "https://api.example.com/weather.json"
scan_interval = 0
"#
        )
        .unwrap();

        let result = Config::from_files(&[path.clone()]);
        assert!(result.is_err());

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("scan_interval"));
        assert!(err_msg.contains("positive"));
    }

    #[test]
    fn test_empty_config_file() {
        let temp_dir = tempfile::tempdir().unwrap();

        let empty_path = temp_dir.path().join("empty.toml");
        let _empty_file = fs::File::create(&empty_path).unwrap();
        // File is completely empty

        let result = Config::from_files(&[empty_path.clone()]);

        // Empty file should parse successfully but emit warnings
        assert!(result.is_ok(), "Empty config should parse successfully");

        let (config, diagnostics) = result.unwrap();
        // One warning for the empty file, one because no sensors are configured
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.is_warning()));

        assert_eq!(config.logging.level, LogLevel::Info); // Default
        assert_eq!(config.sensors.len(), 0);
    }

    #[test]
    fn test_missing_file_error() {
        let missing_path = PathBuf::from("/nonexistent/restpolld.toml");

        let result = Config::from_files(&[missing_path.clone()]);
        assert!(result.is_err(), "Should fail when file doesn't exist");

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("Failed to read"), "Error should mention read failure");
        assert!(err_msg.contains("/nonexistent/restpolld.toml"), "Error should include file path");
    }

    #[test]
    fn test_authorization_wins_header_collision() {
        let sensor = SensorConfig {
            name: DEFAULT_SENSOR_NAME.to_string(),
            url: "https://api.example.com/data".to_string(),
            authorization: Some("Bearer X".to_string()),
            headers: HashMap::from([
                ("Authorization".to_string(), "Bearer Y".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
            ]),
            scan_interval: Duration::from_secs(300),
            timeout: Duration::from_secs(10),
            attributes_template: None,
        };

        let map = sensor.header_map().unwrap();
        assert_eq!(map.get("Authorization").unwrap(), "Bearer X");
        assert_eq!(map.get("Accept").unwrap(), "application/json");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_invalid_header_name_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();

        let path = temp_dir.path().join("bad.toml");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
[sensors.weather]
url = "https://api.example.com/weather.json"

[sensors.weather.headers]
"bad header" = "value"
"#
        )
        .unwrap();

        let result = Config::from_files(&[path.clone()]);
        assert!(result.is_err());

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("sensors.weather.headers"));
    }
}
