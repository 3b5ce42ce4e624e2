//! Config resolver (C9): loads a YAML file, recursively substitutes
//! `${VAR}` / `${VAR:default}` / `${VAR:-default}` environment references,
//! and coerces scalars. Nothing here reads the filesystem or environment
//! ambiently beyond [`Config::load`] itself — callers pass an explicit
//! path or rely on `CONFIG_PATH`, there is no process-wide singleton the
//! rest of the core depends on (see SPEC_FULL.md Design Notes).

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

/// A resolved, hierarchical configuration value.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    root: Value,
}

impl Config {
    /// Wrap an already-resolved YAML value (mainly for tests and for
    /// building sub-configs).
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Parse and resolve a YAML document from a string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: Value =
            serde_yaml::from_str(yaml).map_err(|e| Error::config(e.to_string()))?;
        Ok(Self {
            root: resolve_value(raw),
        })
    }

    /// Load configuration from `path`, falling back to the `CONFIG_PATH`
    /// environment variable, then to `config/config.yml`. A missing file
    /// is not an error: it yields an empty mapping (with a warning).
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = resolve_config_path(path);

        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found, using empty configuration");
            return Ok(Self {
                root: Value::Mapping(Mapping::new()),
            });
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_yaml_str(&content)
    }

    /// Merge the top-level `event_bus` and `logging` sections into
    /// `service_name`'s own sub-map, with the service's own keys winning
    /// over the top-level defaults on overlap.
    pub fn get_service_config(&self, service_name: &str) -> Config {
        let mut service_value = self
            .root
            .as_mapping()
            .and_then(|m| m.get(&key(service_name)))
            .cloned()
            .unwrap_or_else(|| Value::Mapping(Mapping::new()));

        for section in ["event_bus", "logging"] {
            let section_key = key(section);
            let Some(default_section) = self.root.as_mapping().and_then(|m| m.get(&section_key))
            else {
                continue;
            };

            let existing = service_value
                .as_mapping()
                .and_then(|m| m.get(&section_key))
                .cloned()
                .unwrap_or_else(|| Value::Mapping(Mapping::new()));

            let mut merged = default_section.clone();
            merge_yaml(&mut merged, existing);

            if let Value::Mapping(ref mut map) = service_value {
                map.insert(section_key, merged);
            } else {
                let mut map = Mapping::new();
                map.insert(section_key, merged);
                service_value = Value::Mapping(map);
            }
        }

        Config { root: service_value }
    }

    /// The topics a service subscribes to / publishes, from its own
    /// `topics.subscribe` / `topics.publish` lists.
    pub fn get_topics_for_service(&self) -> (Vec<String>, Vec<String>) {
        let topics = self.get_section("topics");
        (
            topics.get_string_list("subscribe"),
            topics.get_string_list("publish"),
        )
    }

    /// A nested mapping as its own `Config`; an empty mapping if absent.
    pub fn get_section(&self, key_name: &str) -> Config {
        let value = self
            .root
            .as_mapping()
            .and_then(|m| m.get(&key(key_name)))
            .cloned()
            .unwrap_or_else(|| Value::Mapping(Mapping::new()));
        Config { root: value }
    }

    pub fn get_str(&self, key_name: &str) -> Option<String> {
        self.root
            .as_mapping()?
            .get(&key(key_name))?
            .as_str()
            .map(str::to_string)
    }

    pub fn get_str_or(&self, key_name: &str, default: &str) -> String {
        self.get_str(key_name).unwrap_or_else(|| default.to_string())
    }

    pub fn get_i64(&self, key_name: &str) -> Option<i64> {
        self.root.as_mapping()?.get(&key(key_name))?.as_i64()
    }

    pub fn get_bool(&self, key_name: &str) -> Option<bool> {
        self.root.as_mapping()?.get(&key(key_name))?.as_bool()
    }

    /// A string coerced from common "truthy" spellings
    /// (`true`/`1`/`yes`/`on`, case-insensitive), else `false`.
    pub fn get_bool_coerced(&self, key_name: &str) -> bool {
        match self.root.as_mapping().and_then(|m| m.get(&key(key_name))) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => {
                matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
            }
            Some(Value::Number(n)) => n.as_i64().map(|n| n != 0).unwrap_or(false),
            _ => false,
        }
    }

    pub fn get_string_list(&self, key_name: &str) -> Vec<String> {
        self.root
            .as_mapping()
            .and_then(|m| m.get(&key(key_name)))
            .and_then(Value::as_sequence)
            .map(|seq| {
                seq.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        matches!(&self.root, Value::Mapping(m) if m.is_empty()) || self.root.is_null()
    }
}

/// An owned lookup key for [`Mapping::get`]; `serde_yaml` has no
/// borrowed-key overload, but there is no reason to leak one either.
fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if let Ok(path) = std::env::var("CONFIG_PATH") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/config.yml")
}

fn resolve_value(value: Value) -> Value {
    match value {
        Value::String(s) => coerce_scalar(resolve_env_vars(&s)),
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| (k, resolve_value(v)))
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(resolve_value).collect()),
        other => other,
    }
}

/// Substitute every `${VAR}` / `${VAR:default}` / `${VAR:-default}`
/// reference in `input`. Absent variable with no default resolves to the
/// empty string.
fn resolve_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                result.push_str(&resolve_one(&after[..end]));
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated reference: keep it literal.
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

fn resolve_one(inner: &str) -> String {
    match inner.split_once(':') {
        Some((var, default)) => {
            let default = default.strip_prefix('-').unwrap_or(default);
            std::env::var(var).unwrap_or_else(|_| default.to_string())
        }
        None => std::env::var(inner).unwrap_or_default(),
    }
}

fn coerce_scalar(s: String) -> Value {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = s.parse::<i64>() {
            return Value::Number(n.into());
        }
    }
    match s.to_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(s),
    }
}

/// Deep-merge `source` into `target`; `source` wins on overlapping scalar
/// or non-mapping keys, mappings merge recursively.
fn merge_yaml(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Mapping(target_map), Value::Mapping(source_map)) => {
            for (k, v) in source_map {
                match target_map.get_mut(&k) {
                    Some(existing) => merge_yaml(existing, v),
                    None => {
                        target_map.insert(k, v);
                    }
                }
            }
        }
        (target, source) => {
            *target = source;
        }
    }
}

#[allow(dead_code)]
fn _path_unused(_: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_substitution_all_three_forms() {
        std::env::set_var("CORE_TEST_VAR", "actual");
        assert_eq!(resolve_env_vars("${CORE_TEST_VAR}"), "actual");
        assert_eq!(resolve_env_vars("${MISSING_VAR_X:fallback}"), "fallback");
        assert_eq!(resolve_env_vars("${MISSING_VAR_Y:-fallback}"), "fallback");
        assert_eq!(resolve_env_vars("${MISSING_VAR_Z}"), "");
        std::env::remove_var("CORE_TEST_VAR");
    }

    #[test]
    fn scalar_coercion_digits_and_bools() {
        assert_eq!(coerce_scalar("8080".to_string()), Value::Number(8080.into()));
        assert_eq!(coerce_scalar("True".to_string()), Value::Bool(true));
        assert_eq!(coerce_scalar("FALSE".to_string()), Value::Bool(false));
        assert_eq!(
            coerce_scalar("localhost".to_string()),
            Value::String("localhost".to_string())
        );
    }

    #[test]
    fn load_from_yaml_str_resolves_and_coerces() {
        std::env::set_var("CORE_TEST_HOST", "redis.internal");
        let cfg = Config::from_yaml_str(
            r#"
event_bus:
  stream_prefix: ai-re
  redis:
    host: ${CORE_TEST_HOST}
    port: "6379"
    db: "0"
"#,
        )
        .unwrap();
        let bus_cfg = cfg.get_section("event_bus");
        assert_eq!(bus_cfg.get_str("stream_prefix"), Some("ai-re".to_string()));
        let redis_cfg = bus_cfg.get_section("redis");
        assert_eq!(redis_cfg.get_str("host"), Some("redis.internal".to_string()));
        assert_eq!(redis_cfg.get_i64("port"), Some(6379));
        std::env::remove_var("CORE_TEST_HOST");
    }

    #[test]
    fn service_config_merge_service_keys_win() {
        let cfg = Config::from_yaml_str(
            r#"
event_bus:
  stream_prefix: ai-re
  redis:
    host: default-host
logging:
  level: info
nlu:
  event_bus:
    redis:
      host: nlu-specific-host
  topics:
    subscribe: ["user_message_raw"]
    publish: ["nlu_result"]
"#,
        )
        .unwrap();

        let service = cfg.get_service_config("nlu");
        let bus_cfg = service.get_section("event_bus");
        assert_eq!(bus_cfg.get_str("stream_prefix"), Some("ai-re".to_string()));
        assert_eq!(
            bus_cfg.get_section("redis").get_str("host"),
            Some("nlu-specific-host".to_string())
        );
        assert_eq!(
            service.get_section("logging").get_str("level"),
            Some("info".to_string())
        );

        let (subscribe, publish) = service.get_topics_for_service();
        assert_eq!(subscribe, vec!["user_message_raw".to_string()]);
        assert_eq!(publish, vec!["nlu_result".to_string()]);
    }

    #[test]
    fn missing_file_yields_empty_config() {
        let cfg = Config::load(Some(PathBuf::from("/nonexistent/path/config.yml"))).unwrap();
        assert!(cfg.is_empty());
    }

    #[test]
    fn bool_coercion_from_string_variants() {
        let cfg = Config::from_yaml_str("debug_mode: \"Yes\"").unwrap();
        assert!(cfg.get_bool_coerced("debug_mode"));
        let cfg = Config::from_yaml_str("debug_mode: \"no\"").unwrap();
        assert!(!cfg.get_bool_coerced("debug_mode"));
    }
}
