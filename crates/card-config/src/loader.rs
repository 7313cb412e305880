//! YAML card configuration loader
//!
//! Supported tags:
//! - `!include path` - Include another YAML file, relative to the including file
//! - `!env_var NAME [default]` - Environment variable substitution
//!
//! The processed YAML is converted to a `serde_json::Value` tree, which is
//! what the engine consumes.

use crate::error::{ConfigError, ConfigResult};
use serde_json::Value as JsonValue;
use serde_yaml::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// YAML loader for card configurations
pub struct CardConfigLoader {
    /// Base directory for resolving relative paths
    config_dir: PathBuf,
    /// Files currently being loaded, to detect circular includes
    include_stack: HashSet<PathBuf>,
}

impl CardConfigLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            include_stack: HashSet::new(),
        }
    }

    /// Load, process and convert a YAML file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<JsonValue> {
        let path = self.resolve_path(path.as_ref());
        let value = self.load_yaml_file(&path)?;
        to_json(value, "")
    }

    /// Load, process and convert YAML from a string
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<JsonValue> {
        let value = self.parse(content, source_path)?;
        to_json(value, "")
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn load_yaml_file(&mut self, path: &Path) -> ConfigResult<Value> {
        debug!("Loading YAML file: {:?}", path);

        if self.include_stack.contains(path) {
            return Err(ConfigError::CircularInclude {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.include_stack.insert(path.to_path_buf());
        let result = self.parse(&content, path);
        self.include_stack.remove(path);

        result
    }

    fn parse(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        self.process_value(value, source_path)
    }

    fn process_value(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = serde_yaml::Mapping::new();
                for (k, v) in map {
                    result.insert(k, self.process_value(v, source_path)?);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => {
                let result: ConfigResult<Vec<Value>> = seq
                    .into_iter()
                    .map(|v| self.process_value(v, source_path))
                    .collect();
                Ok(Value::Sequence(result?))
            }
            _ => Ok(value),
        }
    }

    fn process_tagged(
        &mut self,
        tagged: serde_yaml::value::TaggedValue,
        source_path: &Path,
    ) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!("Processing tag '{}' with value {:?}", tag, tagged.value);

        match tag.as_str() {
            "!include" => {
                let include_path = self.value_to_path(&tagged.value, source_path)?;
                debug!("Including file: {:?}", include_path);
                self.load_yaml_file(&include_path)
            }
            "!env_var" => process_env_var(tagged.value),
            _ => Err(ConfigError::UnsupportedTag {
                tag,
                path: source_path.to_path_buf(),
            }),
        }
    }

    /// Resolve an include target relative to the including file
    fn value_to_path(&self, value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
        let Value::String(path_str) = value else {
            return Err(ConfigError::InvalidIncludePath {
                path: format!("{:?}", value),
                reason: "path must be a string".to_string(),
            });
        };
        if path_str.trim().is_empty() {
            return Err(ConfigError::InvalidIncludePath {
                path: path_str.clone(),
                reason: "path is empty".to_string(),
            });
        }

        let base_dir = source_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(&self.config_dir);
        Ok(if Path::new(path_str).is_absolute() {
            PathBuf::from(path_str)
        } else {
            base_dir.join(path_str)
        })
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }
}

/// `!env_var NAME` or `!env_var NAME default value`
fn process_env_var(value: Value) -> ConfigResult<Value> {
    let Value::String(spec) = value else {
        return Err(ConfigError::InvalidValue {
            key: "!env_var".to_string(),
            reason: "environment variable name must be a string".to_string(),
        });
    };

    let mut parts = spec.trim().splitn(2, char::is_whitespace);
    let var_name = parts.next().unwrap_or_default();
    let default = parts.next().map(str::trim);

    match (std::env::var(var_name), default) {
        (Ok(env_value), _) => {
            debug!("Substituted env var: {}", var_name);
            Ok(Value::String(env_value))
        }
        (Err(_), Some(default)) => {
            debug!("Env var {} not set, using default", var_name);
            Ok(Value::String(default.to_string()))
        }
        (Err(_), None) => Err(ConfigError::EnvVarNotFound {
            var: var_name.to_string(),
        }),
    }
}

/// Convert processed YAML into JSON; `at` names the location for errors
fn to_json(value: Value, at: &str) -> ConfigResult<JsonValue> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                JsonValue::from(i)
            } else if let Some(u) = n.as_u64() {
                JsonValue::from(u)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                serde_json::Number::from_f64(f)
                    .map(JsonValue::Number)
                    .ok_or_else(|| ConfigError::InvalidValue {
                        key: at.to_string(),
                        reason: format!("{f} is not a finite number"),
                    })?
            }
        }
        Value::String(s) => JsonValue::String(s),
        Value::Sequence(seq) => JsonValue::Array(
            seq.into_iter()
                .enumerate()
                .map(|(i, v)| to_json(v, &format!("{at}[{i}]")))
                .collect::<ConfigResult<Vec<_>>>()?,
        ),
        Value::Mapping(map) => {
            let mut object = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let key = match k {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => {
                        return Err(ConfigError::InvalidValue {
                            key: at.to_string(),
                            reason: format!("unsupported mapping key {other:?}"),
                        })
                    }
                };
                let path = if at.is_empty() {
                    key.clone()
                } else {
                    format!("{at}.{key}")
                };
                object.insert(key, to_json(v, &path)?);
            }
            JsonValue::Object(object)
        }
        Value::Tagged(tagged) => {
            return Err(ConfigError::InvalidValue {
                key: at.to_string(),
                reason: format!("unprocessed tag {}", tagged.tag),
            })
        }
    })
}

/// Load a card configuration file; the root must be a mapping
pub fn load_card_config(path: impl AsRef<Path>) -> ConfigResult<JsonValue> {
    let path = path.as_ref();
    let config_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let mut loader = CardConfigLoader::new(config_dir);
    let value = loader.load_file(path)?;
    require_mapping(value)
}

/// Load a card configuration from a string; includes resolve against `config_dir`
pub fn load_card_config_str(
    config_dir: impl Into<PathBuf>,
    content: &str,
) -> ConfigResult<JsonValue> {
    let mut loader = CardConfigLoader::new(config_dir);
    let source = loader.config_dir().join("<inline>");
    let value = loader.load_string(content, &source)?;
    require_mapping(value)
}

fn require_mapping(value: JsonValue) -> ConfigResult<JsonValue> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            key: "<root>".to_string(),
            reason: "card configuration must be a mapping".to_string(),
        })
    }
}
