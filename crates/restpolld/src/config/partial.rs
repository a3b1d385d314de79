use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::diagnostics::{
    Diagnostic, Error, LoadError, MergeConflictLocation, MergeError, SourceInfo, Warning,
};
use super::LogLevel;

#[derive(Debug, Default, Deserialize)]
pub struct PartialConfig {
    #[serde(default)]
    pub imports: Vec<String>,

    pub logging: Option<PartialLoggingConfig>,
    pub api: Option<PartialApiConfig>,
    pub sensors: Option<HashMap<String, PartialSensor>>,

    /// Source information for error reporting (not serialized)
    #[serde(skip)]
    pub source: Option<SourceInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartialLoggingConfig {
    pub level: Option<toml::Spanned<LogLevel>>,
    pub overrides: Option<HashMap<String, toml::Spanned<LogLevel>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartialApiConfig {
    pub enabled: Option<toml::Spanned<bool>>,
    pub listen: Option<toml::Spanned<String>>,
    pub port: Option<toml::Spanned<u16>>,
}

/// One `[sensors.<id>]` table before validation. Everything is optional
/// here; required fields are enforced when converting to `SensorConfig`.
#[derive(Debug, Clone, Deserialize)]
pub struct PartialSensor {
    pub url: Option<String>,
    pub name: Option<String>,
    pub authorization: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub scan_interval: Option<i64>,
    pub timeout: Option<i64>,
    pub attributes_template: Option<String>,
}

impl PartialConfig {
    /// Load a single config file without processing imports
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            error: e,
        })?;

        let mut config: PartialConfig = toml::from_str(&content).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            error: e,
        })?;

        config.source = Some(SourceInfo {
            file_path: path.to_path_buf(),
            content,
        });

        Ok(config)
    }

    /// Load config files with import resolution
    ///
    /// Each config file is loaded, then its imports are recursively processed.
    /// Cycle detection prevents infinite loops.
    ///
    /// Returns a Vec of all loaded configs in order (imports first, then parent)
    pub fn load_with_imports(paths: &[PathBuf]) -> Result<Vec<Self>, LoadError> {
        let mut visited = HashSet::new();
        let mut all_configs = Vec::new();

        for path in paths {
            Self::load_recursive(path, &mut visited, &mut all_configs)?;
        }

        Ok(all_configs)
    }

    /// Recursively load a config file and its imports
    fn load_recursive(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        configs: &mut Vec<Self>,
    ) -> Result<(), LoadError> {
        // Canonicalize the path to detect cycles reliably
        let canonical_path = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        // Check for import cycles
        if visited.contains(&canonical_path) {
            return Err(LoadError::ImportCycle {
                path: canonical_path.clone(),
                cycle: visited.iter().cloned().collect(),
            });
        }

        visited.insert(canonical_path.clone());

        // Load the config file
        let config = Self::from_file(path)?;

        // Process imports first (depth-first)
        for import_path in &config.imports {
            let import_path_buf = PathBuf::from(import_path);

            // Resolve relative imports from the parent file's directory
            let resolved_path = if import_path_buf.is_absolute() {
                import_path_buf
            } else {
                let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
                parent_dir.join(import_path_buf)
            };

            Self::load_recursive(&resolved_path, visited, configs)?;
        }

        // Add this config after its imports
        configs.push(config);

        // Remove from visited set to allow imports from sibling branches
        visited.remove(&canonical_path);

        Ok(())
    }

    /// Merge multiple partial configs together
    ///
    /// Uses first-wins semantics: the first occurrence of a field is kept.
    /// Conflicts (same field defined in multiple configs) are collected as errors
    /// but merging continues to find all conflicts at once (compiler-style error collection).
    ///
    /// Sensors conflict per `<id>`: two files may each define sensors, but the
    /// same sensor table in two files is an error.
    ///
    /// Returns (merged, diagnostics) where diagnostics may contain warnings and errors
    pub fn merge<I>(configs: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = Self>,
    {
        let mut result = PartialConfig::default();
        let mut diagnostics = Vec::new();
        let mut imports = Vec::new();

        // Track which file set each field with span information (for first-wins)
        let mut logging_level_loc: Option<MergeConflictLocation> = None;
        let mut logging_overrides_locs: HashMap<String, MergeConflictLocation> = HashMap::new();
        let mut api_enabled_loc: Option<MergeConflictLocation> = None;
        let mut api_listen_loc: Option<MergeConflictLocation> = None;
        let mut api_port_loc: Option<MergeConflictLocation> = None;
        let mut sensor_locs: HashMap<String, MergeConflictLocation> = HashMap::new();

        for config in configs {
            // Collect all imports
            imports.extend(config.imports.clone());

            let source_info = config.source.as_ref().cloned().unwrap_or_else(|| SourceInfo {
                file_path: PathBuf::from("<unknown>"),
                content: String::new(),
            });

            // Check if config is empty (no meaningful content)
            let is_empty = config.logging.is_none()
                && config.api.is_none()
                && config.sensors.is_none()
                && config.imports.is_empty();

            if is_empty {
                diagnostics.push(Diagnostic::Warning(Warning::EmptyConfig {
                    file_path: source_info.file_path.clone(),
                }));
            }

            // Merge logging config
            if let Some(logging) = config.logging {
                if result.logging.is_none() {
                    result.logging = Some(PartialLoggingConfig {
                        level: None,
                        overrides: None,
                    });
                }

                let result_logging = result.logging.as_mut().unwrap();

                // Check logging level conflict (first-wins)
                if let Some(level_spanned) = logging.level {
                    let conflict_loc = MergeConflictLocation {
                        file_path: source_info.file_path.clone(),
                        span: level_spanned.span(),
                        content: source_info.content.clone(),
                    };

                    if let Some(prev_loc) = logging_level_loc.as_ref() {
                        // Conflict: keep first value, record error
                        diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                            field_path: "logging.level".to_string(),
                            message: "Logging level defined in multiple config files".to_string(),
                            conflicts: vec![prev_loc.clone(), conflict_loc],
                        })));
                    } else {
                        // First occurrence: keep it
                        result_logging.level = Some(level_spanned);
                        logging_level_loc = Some(conflict_loc);
                    }
                }

                // Check logging overrides conflicts (first-wins per key)
                if let Some(overrides) = logging.overrides {
                    if result_logging.overrides.is_none() {
                        result_logging.overrides = Some(HashMap::new());
                    }

                    let result_overrides = result_logging.overrides.as_mut().unwrap();
                    for (key, value_spanned) in overrides {
                        let conflict_loc = MergeConflictLocation {
                            file_path: source_info.file_path.clone(),
                            span: value_spanned.span(),
                            content: source_info.content.clone(),
                        };

                        if let Some(prev_loc) = logging_overrides_locs.get(&key) {
                            // Conflict: keep first value, record error
                            diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                                field_path: format!("logging.overrides.{}", key),
                                message: format!(
                                    "Logging override for '{}' defined in multiple config files",
                                    key
                                ),
                                conflicts: vec![prev_loc.clone(), conflict_loc],
                            })));
                        } else {
                            // First occurrence: keep it
                            result_overrides.insert(key.clone(), value_spanned);
                            logging_overrides_locs.insert(key, conflict_loc);
                        }
                    }
                }
            }

            // Merge API config field by field (first-wins per field)
            if let Some(api) = config.api {
                if result.api.is_none() {
                    result.api = Some(PartialApiConfig {
                        enabled: None,
                        listen: None,
                        port: None,
                    });
                }

                let result_api = result.api.as_mut().unwrap();

                if let Some(enabled_spanned) = api.enabled {
                    let conflict_loc = MergeConflictLocation {
                        file_path: source_info.file_path.clone(),
                        span: enabled_spanned.span(),
                        content: source_info.content.clone(),
                    };

                    if let Some(prev_loc) = api_enabled_loc.as_ref() {
                        diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                            field_path: "api.enabled".to_string(),
                            message: "API enabled flag defined in multiple config files"
                                .to_string(),
                            conflicts: vec![prev_loc.clone(), conflict_loc],
                        })));
                    } else {
                        result_api.enabled = Some(enabled_spanned);
                        api_enabled_loc = Some(conflict_loc);
                    }
                }

                if let Some(listen_spanned) = api.listen {
                    let conflict_loc = MergeConflictLocation {
                        file_path: source_info.file_path.clone(),
                        span: listen_spanned.span(),
                        content: source_info.content.clone(),
                    };

                    if let Some(prev_loc) = api_listen_loc.as_ref() {
                        diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                            field_path: "api.listen".to_string(),
                            message: "API listen address defined in multiple config files"
                                .to_string(),
                            conflicts: vec![prev_loc.clone(), conflict_loc],
                        })));
                    } else {
                        result_api.listen = Some(listen_spanned);
                        api_listen_loc = Some(conflict_loc);
                    }
                }

                if let Some(port_spanned) = api.port {
                    let conflict_loc = MergeConflictLocation {
                        file_path: source_info.file_path.clone(),
                        span: port_spanned.span(),
                        content: source_info.content.clone(),
                    };

                    if let Some(prev_loc) = api_port_loc.as_ref() {
                        diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                            field_path: "api.port".to_string(),
                            message: "API port defined in multiple config files".to_string(),
                            conflicts: vec![prev_loc.clone(), conflict_loc],
                        })));
                    } else {
                        result_api.port = Some(port_spanned);
                        api_port_loc = Some(conflict_loc);
                    }
                }
            }

            // Merge sensor definitions (first-wins per sensor id)
            if let Some(sensors) = config.sensors {
                if result.sensors.is_none() {
                    result.sensors = Some(HashMap::new());
                }

                let result_sensors = result.sensors.as_mut().unwrap();

                for (id, sensor) in sensors {
                    // Find the span of the sensor table header in the source
                    let sensor_header = format!("[sensors.{}]", id);
                    let span = source_info
                        .content
                        .find(&sensor_header)
                        .map(|start| start..(start + sensor_header.len()))
                        .unwrap_or(0..0);

                    let conflict_loc = MergeConflictLocation {
                        file_path: source_info.file_path.clone(),
                        span,
                        content: source_info.content.clone(),
                    };

                    if let Some(prev_loc) = sensor_locs.get(&id) {
                        // Conflict: keep first value, record error
                        diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                            field_path: format!("sensors.{}", id),
                            message: format!("Sensor '{}' defined in multiple config files", id),
                            conflicts: vec![prev_loc.clone(), conflict_loc],
                        })));
                    } else {
                        // First occurrence: keep it
                        result_sensors.insert(id.clone(), sensor);
                        sensor_locs.insert(id, conflict_loc);
                    }
                }
            }
        }

        result.imports = imports;

        (result, diagnostics)
    }
}
