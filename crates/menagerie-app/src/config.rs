//! Layered configuration: built-in defaults, then an optional JSON file, then `--set` overrides.
//!
//! Patches are strict. Every key must already exist in the default configuration and keep its
//! JSON type, so a typo fails loudly instead of being ignored.

use std::fs;
use std::path::{Path, PathBuf};

use menagerie_core::{ConfigError, MenagerieConfig};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    InvalidPatch(String),
    #[error("unknown config path: {0}")]
    UnknownPath(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Build the effective configuration and validate it.
pub fn load_config(
    file: Option<&Path>,
    overrides: &[(String, Value)],
) -> Result<MenagerieConfig, ConfigLoadError> {
    let mut config = MenagerieConfig::default();
    if let Some(path) = file {
        let raw = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let patch: Value = serde_json::from_str(&raw).map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config = apply_patch(&config, &patch)?;
    }
    if !overrides.is_empty() {
        config = apply_patch(&config, &overrides_patch(overrides)?)?;
    }
    config.validate()?;
    Ok(config)
}

/// Merge a JSON object onto `base`, returning the resulting configuration (not yet validated).
pub fn apply_patch(
    base: &MenagerieConfig,
    patch: &Value,
) -> Result<MenagerieConfig, ConfigLoadError> {
    if !patch.is_object() {
        return Err(ConfigLoadError::InvalidPatch(
            "configuration patch must be a JSON object".into(),
        ));
    }
    let mut value = serde_json::to_value(base)?;
    let mut path = SmallVec::<[&str; 8]>::new();
    merge_value(&mut value, patch, &mut path)?;
    serde_path_to_error::deserialize(value).map_err(|err| {
        ConfigLoadError::InvalidPatch(format!("{} at {}", err.inner(), err.path()))
    })
}

/// Nest every `a.b.c=value` override into one JSON object, later overrides winning.
fn overrides_patch(overrides: &[(String, Value)]) -> Result<Value, ConfigLoadError> {
    let mut patch = Value::Object(Map::new());
    for (path, value) in overrides {
        let segments: SmallVec<[&str; 8]> = path.split('.').filter(|s| !s.is_empty()).collect();
        let Some((leaf, parents)) = segments.split_last() else {
            return Err(ConfigLoadError::InvalidPatch(format!(
                "override '{path}' names no config key"
            )));
        };
        let mut node = &mut patch;
        for segment in parents {
            let Value::Object(map) = node else {
                return Err(nested_under_value(path));
            };
            node = map
                .entry((*segment).to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        let Value::Object(map) = node else {
            return Err(nested_under_value(path));
        };
        map.insert((*leaf).to_owned(), value.clone());
    }
    Ok(patch)
}

fn nested_under_value(path: &str) -> ConfigLoadError {
    ConfigLoadError::InvalidPatch(format!("override '{path}' nests under a non-object value"))
}

fn path_display(path: &[&str]) -> String {
    path.join(".")
}

fn mismatch(path: &[&str]) -> ConfigLoadError {
    ConfigLoadError::InvalidPatch(format!("type mismatch at {}", path_display(path)))
}

fn merge_value<'a>(
    target: &mut Value,
    patch: &'a Value,
    path: &mut SmallVec<[&'a str; 8]>,
) -> Result<(), ConfigLoadError> {
    match target {
        Value::Object(target_map) => {
            let Value::Object(patch_map) = patch else {
                return Err(mismatch(path));
            };
            for (key, patch_value) in patch_map {
                path.push(key);
                let Some(target_value) = target_map.get_mut(key) else {
                    return Err(ConfigLoadError::UnknownPath(path_display(path)));
                };
                merge_value(target_value, patch_value, path)?;
                path.pop();
            }
            Ok(())
        }
        // Sprite rosters are replaced wholesale.
        Value::Array(_) => match patch {
            Value::Array(_) => {
                *target = patch.clone();
                Ok(())
            }
            _ => Err(mismatch(path)),
        },
        Value::Number(_) => match patch {
            Value::Number(_) => {
                *target = patch.clone();
                Ok(())
            }
            _ => Err(mismatch(path)),
        },
        Value::String(_) => match patch {
            Value::String(_) => {
                *target = patch.clone();
                Ok(())
            }
            _ => Err(mismatch(path)),
        },
        Value::Bool(_) => match patch {
            Value::Bool(_) => {
                *target = patch.clone();
                Ok(())
            }
            _ => Err(mismatch(path)),
        },
        // Optional fields (e.g. the seed) accept anything; deserialisation checks the shape.
        Value::Null => {
            *target = patch.clone();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_patch_updates_only_named_fields() {
        let patched = apply_patch(
            &MenagerieConfig::default(),
            &json!({"behavior": {"avoidance_margin": 80.0}, "rng_seed": 9}),
        )
        .expect("valid patch");
        assert_eq!(patched.behavior.avoidance_margin, 80.0);
        assert_eq!(patched.behavior.repulsion_strength, 5.0);
        assert_eq!(patched.rng_seed, Some(9));
        assert_eq!(patched.sprites.len(), 4);
    }

    #[test]
    fn unknown_keys_are_rejected_with_their_path() {
        let err = apply_patch(
            &MenagerieConfig::default(),
            &json!({"behavior": {"avoidance_margn": 80.0}}),
        )
        .expect_err("typo must fail");
        assert!(matches!(err, ConfigLoadError::UnknownPath(path) if path == "behavior.avoidance_margn"));
    }

    #[test]
    fn type_mismatches_are_rejected() {
        let err = apply_patch(
            &MenagerieConfig::default(),
            &json!({"sensors": {"shake_threshold": "loud"}}),
        )
        .expect_err("string for number");
        assert!(matches!(err, ConfigLoadError::InvalidPatch(msg) if msg.contains("sensors.shake_threshold")));
    }

    #[test]
    fn overrides_nest_by_dotted_path() {
        let patch = overrides_patch(&[
            ("pose.poll_interval_ms".into(), json!(200)),
            ("behavior.base_size".into(), json!(40.0)),
            ("behavior.size_range".into(), json!(60.0)),
        ])
        .expect("nested patch");
        assert_eq!(
            patch,
            json!({
                "pose": {"poll_interval_ms": 200},
                "behavior": {"base_size": 40.0, "size_range": 60.0}
            })
        );
        assert!(overrides_patch(&[(".".into(), json!(1))]).is_err());
        assert!(
            overrides_patch(&[
                ("rng_seed".into(), json!(3)),
                ("rng_seed.low".into(), json!(1)),
            ])
            .is_err()
        );
    }

    #[test]
    fn null_is_rejected_for_numbers() {
        let err = apply_patch(
            &MenagerieConfig::default(),
            &json!({"behavior": {"base_size": null}}),
        )
        .expect_err("null for number");
        assert!(matches!(err, ConfigLoadError::InvalidPatch(msg) if msg.contains("behavior.base_size")));
    }

    #[test]
    fn deserialisation_errors_name_the_field() {
        let err = apply_patch(
            &MenagerieConfig::default(),
            &json!({"sprites": [{"name": "ant"}]}),
        )
        .expect_err("sprite without start");
        let ConfigLoadError::InvalidPatch(msg) = err else {
            panic!("unexpected error: {err}");
        };
        assert!(msg.contains("start"), "{msg}");
        assert!(msg.contains("sprites[0]"), "{msg}");
    }

    #[test]
    fn invalid_overrides_fail_validation() {
        let config = load_config(None, &[("pose.poll_interval_ms".into(), json!(0))]);
        assert!(matches!(config, Err(ConfigLoadError::Invalid(_))));
    }
}
