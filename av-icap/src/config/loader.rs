//! Properties-file parsing and schema validation.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::holder::ScannerConfig;
use crate::config::key::PropertyKey;
use crate::error::ConfigError;

/// The outcome of one successful configuration load: every scanner id whose
/// mandatory properties passed validation.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    scanners: HashMap<String, Arc<ScannerConfig>>,
}

impl LoadedConfig {
    pub fn get(&self, scanner_id: &str) -> Option<Arc<ScannerConfig>> {
        self.scanners.get(scanner_id).cloned()
    }

    pub fn scanner_ids(&self) -> impl Iterator<Item = &str> {
        self.scanners.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.scanners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }

    pub(crate) fn scanners(&self) -> &HashMap<String, Arc<ScannerConfig>> {
        &self.scanners
    }
}

/// Load and validate a scanner properties file.
///
/// Each line has the form `<scannerId>.<propertyName>=<value>`. Blank lines
/// and lines starting with `#` or `!` are comments. A key without a dot is
/// fatal for the whole load; an unknown property name is only skipped. Per
/// scanner id, a missing or invalid value for a mandatory key without a
/// default drops that id, while keys with defaults fall back to them.
pub fn load(path: &Path) -> Result<LoadedConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(ConfigError::NotAFile(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let grouped = group_by_scanner(&contents)?;

    let mut scanners = HashMap::new();
    for (scanner_id, raw) in grouped {
        match validate_scanner(&scanner_id, &raw) {
            Some(properties) => {
                debug!(scanner = %scanner_id, "scanner configuration accepted");
                scanners.insert(
                    scanner_id.clone(),
                    Arc::new(ScannerConfig::from_properties(&scanner_id, &properties)),
                );
            }
            None => {
                error!(
                    scanner = %scanner_id,
                    "mandatory properties missing or invalid, scanner dropped"
                );
            }
        }
    }

    if scanners.is_empty() {
        return Err(ConfigError::ValidationFailed);
    }
    info!(path = %path.display(), scanners = scanners.len(), "scanner configuration loaded");
    Ok(LoadedConfig { scanners })
}

/// Group raw property text by scanner id, preserving a stable id order for
/// deterministic logging.
fn group_by_scanner(
    contents: &str,
) -> Result<BTreeMap<String, HashMap<PropertyKey, String>>, ConfigError> {
    let mut grouped: BTreeMap<String, HashMap<PropertyKey, String>> = BTreeMap::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| ConfigError::Parse(line.to_string()))?;
        let key = key.trim();
        let value = value.trim();

        let (scanner_id, property_name) = key
            .split_once('.')
            .ok_or_else(|| ConfigError::MalformedKey(key.to_string()))?;
        if scanner_id.is_empty() {
            return Err(ConfigError::MalformedKey(key.to_string()));
        }

        match PropertyKey::from_name(property_name) {
            Some(property) => {
                grouped
                    .entry(scanner_id.to_string())
                    .or_default()
                    .insert(property, value.to_string());
            }
            None => {
                warn!(key = %key, "unknown property name, line skipped");
            }
        }
    }

    Ok(grouped)
}

/// Check one scanner's raw values against the schema. Returns the completed
/// property map (defaults applied) or `None` when a mandatory value is
/// missing or invalid.
fn validate_scanner(
    scanner_id: &str,
    raw: &HashMap<PropertyKey, String>,
) -> Option<HashMap<PropertyKey, String>> {
    let mut properties = HashMap::with_capacity(PropertyKey::ALL.len());
    let mut valid = true;

    for key in PropertyKey::ALL {
        let value = raw.get(&key).map(String::as_str);
        match key.validator() {
            Some(validator) => {
                let accepted = value.map(|v| validator.validate(v)).unwrap_or(false);
                if accepted {
                    properties.insert(key, raw[&key].clone());
                } else if let Some(default) = key.default_value() {
                    if value.is_some() {
                        warn!(
                            scanner = %scanner_id,
                            property = %key,
                            default,
                            "invalid value, falling back to default"
                        );
                    }
                    properties.insert(key, default.to_string());
                } else {
                    error!(
                        scanner = %scanner_id,
                        property = %key,
                        "mandatory property missing or invalid"
                    );
                    valid = false;
                }
            }
            None => {
                // Restriction lists are free-form; absent means empty.
                if value.is_none() {
                    info!(scanner = %scanner_id, property = %key, "no restriction configured");
                }
                properties.insert(key, value.unwrap_or("").to_string());
            }
        }
    }

    valid.then_some(properties)
}
