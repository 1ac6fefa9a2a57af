//! Environment variable substitution for configuration values
//!
//! String scalars anywhere in the configuration tree may reference
//! environment variables using the `${VAR_NAME}` syntax. Keys are left
//! untouched.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;
use std::env;

use crate::config::ConfigError;

/// Regex pattern for matching environment variable references: ${VAR_NAME}
static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var pattern"));

/// Substitute environment variable references in every string of `value`.
///
/// Returns an error listing all missing variables if any are not set.
pub fn substitute_env_vars(value: &mut Value) -> Result<(), ConfigError> {
    let mut missing_vars = Vec::new();
    substitute_in(value, &mut missing_vars);

    if !missing_vars.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(())
}

fn substitute_in(value: &mut Value, missing_vars: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            if let Some(replaced) = substitute_str(s, missing_vars) {
                *s = replaced;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                substitute_in(item, missing_vars);
            }
        }
        Value::Mapping(mapping) => {
            for (_, item) in mapping.iter_mut() {
                substitute_in(item, missing_vars);
            }
        }
        Value::Tagged(tagged) => substitute_in(&mut tagged.value, missing_vars),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Returns the substituted string, or `None` when nothing matched
fn substitute_str(input: &str, missing_vars: &mut Vec<String>) -> Option<String> {
    if !ENV_VAR_PATTERN.is_match(input) {
        return None;
    }

    let result = ENV_VAR_PATTERN.replace_all(input, |caps: &regex::Captures<'_>| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                if !missing_vars.iter().any(|v| v == var_name) {
                    missing_vars.push(var_name.to_string());
                }
                caps[0].to_string()
            }
        }
    });
    Some(result.into_owned())
}
