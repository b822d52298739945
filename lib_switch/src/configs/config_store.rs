//! # Layered Runtime Configuration
//!
//! File-based configuration for the switching services. Four JSON layers are
//! merged in order, later layers overriding earlier ones:
//!
//! 1. `config.global.json` - platform-wide settings
//! 2. `{service}.common.json` - per-service settings shared by every mode
//! 3. `{service}.{mode}.json` - per-running-mode overrides
//! 4. `{service}.{mode}.{os}.json` - per-OS overrides
//!
//! The directory defaults to the executable's location and can be moved with
//! `CONFIGS_LOCATION`. The running mode (e.g. `dev`, `uat`, `prod`) comes
//! from `RUNNING_MODE_{SERVICE}` and is mandatory: refusing to guess the
//! mode keeps a mis-deployed service from silently using dev settings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{env, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use config::{ext::*, *};

const CONFIG_GLOBAL_NAME: &str = "config.global.json";

#[derive(Debug, Error)]
pub enum RuntimeConfigError {
    #[error("I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    VarError(#[from] env::VarError),

    #[error("Environment variable {0} is not present")]
    MissingEnvVar(String),

    #[error("Configuration build failed: {0}")]
    BuildError(String),
}

/// The merged configuration of one service process, with the layer files
/// that contributed to it. Absent layers are recorded as empty paths.
#[derive(Default, Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all(deserialize = "PascalCase"))]
#[serde(rename_all(serialize = "PascalCase"))]
pub struct RuntimeConfig {
    pub config_running_mode: String,
    pub config_dir: String,
    pub config_global_file: String,
    pub config_common_file: String,
    pub config_mode_file: String,
    pub config_platform_file: String,
    /// Flattened key/value view of the merged layers. Nested JSON keys are
    /// joined with `:` (e.g. `redis:host`).
    pub config_options: BTreeMap<String, String>,
}

impl RuntimeConfig {
    /// Reassembles the flattened options under `prefix` into a JSON value.
    ///
    /// `:`-separated segments become nested objects; runs of numeric
    /// segments become arrays; leaf strings are narrowed to booleans and
    /// numbers where they parse as such. The result feeds the typed config
    /// parsers of the connection wrappers.
    pub fn section(&self, prefix: &str) -> Option<Value> {
        let want = format!("{prefix}:");
        let subset: BTreeMap<&str, &str> = self
            .config_options
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(&want).map(|rest| (rest, v.as_str())))
            .collect();
        if subset.is_empty() {
            return None;
        }
        Some(assemble(&subset))
    }
}

impl fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RuntimeConfig
    Running mode: {},
    Config dir: {},
    Global file: {},
    Common file: {},
    Mode file: {},
    Platform file: {},
    Options: {:?}
",
            self.config_running_mode,
            self.config_dir,
            self.config_global_file,
            self.config_common_file,
            self.config_mode_file,
            self.config_platform_file,
            self.config_options
        )
    }
}

/// Loads the layered configuration for the current process.
pub fn load_runtime_config() -> Result<RuntimeConfig, RuntimeConfigError> {
    let current_exec: PathBuf = get_current_exe()?;
    let basename: String = get_process_basename(&current_exec)?;
    let location: String = get_process_location(&current_exec)?;
    let running_mode: String = get_running_mode(&basename)?;
    let config_dir: String = env::var("CONFIGS_LOCATION").unwrap_or(location);

    let layers = layer_files(&config_dir, &basename, &running_mode);
    let config_options = merge_layers(&layers)?;

    Ok(RuntimeConfig {
        config_running_mode: running_mode,
        config_dir,
        config_global_file: layers[0].clone(),
        config_common_file: layers[1].clone(),
        config_mode_file: layers[2].clone(),
        config_platform_file: layers[3].clone(),
        config_options,
    })
}

/// Resolves the four layer files in override order. A layer that does not
/// exist on disk is recorded as an empty string and skipped by the merge.
fn layer_files(config_dir: &str, basename: &str, running_mode: &str) -> [String; 4] {
    let names = [
        CONFIG_GLOBAL_NAME.to_string(),
        format!("{basename}.common.json"),
        format!("{basename}.{running_mode}.json"),
        format!(
            "{basename}.{running_mode}.{}.json",
            std::env::consts::OS
        ),
    ];
    names.map(|name| {
        let path = PathBuf::from(config_dir).join(name);
        if path.is_file() {
            path.to_string_lossy().to_string()
        } else {
            String::new()
        }
    })
}

fn merge_layers(layers: &[String; 4]) -> Result<BTreeMap<String, String>, RuntimeConfigError> {
    let config_data: Box<dyn ConfigurationRoot> = DefaultConfigurationBuilder::new()
        .add_json_file(&layers[0].is().optional())
        .add_json_file(&layers[1].is().optional())
        .add_json_file(&layers[2].is().optional())
        .add_json_file(&layers[3].is().optional())
        .build()
        .map_err(|e| RuntimeConfigError::BuildError(format!("{e:?}")))?;

    let mut config_options: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in config_data.iter(None) {
        config_options.insert(key.to_string(), value.to_string());
    }
    Ok(config_options)
}

fn assemble(flat: &BTreeMap<&str, &str>) -> Value {
    let mut direct: Vec<(&str, Value)> = Vec::new();
    let mut children: BTreeMap<&str, BTreeMap<&str, &str>> = BTreeMap::new();
    for (key, value) in flat {
        match key.split_once(':') {
            None => direct.push((key, narrow(value))),
            Some((head, rest)) => {
                children.entry(head).or_default().insert(rest, value);
            }
        }
    }
    for (head, subset) in children {
        direct.push((head, assemble(&subset)));
    }

    let is_array = !direct.is_empty()
        && direct.iter().all(|(k, _)| k.parse::<usize>().is_ok());
    if is_array {
        direct.sort_by_key(|(k, _)| k.parse::<usize>().unwrap_or(usize::MAX));
        Value::Array(direct.into_iter().map(|(_, v)| v).collect())
    } else {
        Value::Object(
            direct
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}

/// Narrows a flattened string value back to its most specific JSON type.
fn narrow(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

fn get_current_exe() -> Result<PathBuf, RuntimeConfigError> {
    Ok(env::current_exe()?)
}

fn get_process_basename(exe_path: &Path) -> Result<String, RuntimeConfigError> {
    exe_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            RuntimeConfigError::IoError(std::io::Error::other(
                "Failed to get the process basename",
            ))
        })
}

fn get_process_location(exe_path: &Path) -> Result<String, RuntimeConfigError> {
    exe_path
        .parent()
        .and_then(|dir| dir.to_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            RuntimeConfigError::IoError(std::io::Error::other(
                "Failed to get the process location",
            ))
        })
}

fn get_running_mode(basename: &str) -> Result<String, RuntimeConfigError> {
    let envar: String = format!("RUNNING_MODE_{}", basename.to_uppercase());
    match env::var(&envar) {
        Ok(mode) => Ok(mode),
        Err(env::VarError::NotPresent) => Err(RuntimeConfigError::MissingEnvVar(envar)),
        Err(e) => Err(RuntimeConfigError::VarError(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).expect("write layer file");
    }

    #[test]
    fn later_layers_override_earlier_ones() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "config.global.json",
            r#"{"redis": {"host": "global-host", "port": 6379}}"#,
        );
        write(
            dir.path(),
            "swxgate.common.json",
            r#"{"redis": {"host": "common-host"}}"#,
        );
        write(
            dir.path(),
            "swxgate.dev.json",
            r#"{"redis": {"port": 7000}}"#,
        );

        let layers = layer_files(&dir.path().to_string_lossy(), "swxgate", "dev");
        assert!(layers[3].is_empty()); // no platform layer on disk
        let options = merge_layers(&layers).expect("merge");
        assert_eq!(options.get("redis:host").map(String::as_str), Some("common-host"));
        assert_eq!(options.get("redis:port").map(String::as_str), Some("7000"));
    }

    #[test]
    fn section_rebuilds_nested_json_with_narrowed_types() {
        let mut options = BTreeMap::new();
        options.insert("redis:host".to_string(), "10.0.0.5".to_string());
        options.insert("redis:port".to_string(), "6379".to_string());
        options.insert("redis:lazyConnect".to_string(), "true".to_string());
        options.insert("other:x".to_string(), "1".to_string());
        let cfg = RuntimeConfig {
            config_options: options,
            ..RuntimeConfig::default()
        };

        let section = cfg.section("redis").expect("section exists");
        assert_eq!(
            section,
            json!({"host": "10.0.0.5", "port": 6379, "lazyConnect": true})
        );
        assert!(cfg.section("missing").is_none());
    }

    #[test]
    fn numeric_segments_become_arrays() {
        let mut options = BTreeMap::new();
        options.insert("redis:cluster:0:host".to_string(), "n1".to_string());
        options.insert("redis:cluster:0:port".to_string(), "7000".to_string());
        options.insert("redis:cluster:1:host".to_string(), "n2".to_string());
        options.insert("redis:cluster:1:port".to_string(), "7001".to_string());
        let cfg = RuntimeConfig {
            config_options: options,
            ..RuntimeConfig::default()
        };

        assert_eq!(
            cfg.section("redis").expect("section"),
            json!({"cluster": [
                {"host": "n1", "port": 7000},
                {"host": "n2", "port": 7001}
            ]})
        );
    }

    #[test]
    fn running_mode_env_var_is_mandatory() {
        let err = get_running_mode("no_such_service_xyz").unwrap_err();
        assert!(matches!(err, RuntimeConfigError::MissingEnvVar(_)));
    }
}
