use anyhow::Result;
use regex::{Captures, Regex};
use std::env;
use tracing::{debug, warn};

const PLACEHOLDER: &str = r"\$\{(\w+)(?::-([^}]*))?\}|\$(\w+)";

/// Substitute `${VAR}`, `${VAR:-fallback}` and `$VAR` from the environment
///
/// Unset variables without a fallback are left in place; the validator
/// reports them.
pub fn substitute_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(PLACEHOLDER)?;
    let mut missing_vars = Vec::new();

    let result = re.replace_all(content, |caps: &Captures| {
        let Some(name) = caps.get(1).or_else(|| caps.get(3)) else {
            return caps[0].to_string();
        };
        match env::var(name.as_str()) {
            Ok(value) => {
                debug!(var = name.as_str(), "Substituted environment variable");
                value
            }
            Err(_) => match caps.get(2) {
                Some(fallback) => fallback.as_str().to_string(),
                None => {
                    missing_vars.push(name.as_str().to_string());
                    caps[0].to_string()
                }
            },
        }
    });
    let result = result.into_owned();

    if !missing_vars.is_empty() {
        warn!(?missing_vars, "Environment variables not set");
    }
    Ok(result)
}

/// Names of placeholders still present in `value`
pub fn unresolved_env_vars(value: &str) -> Vec<String> {
    let Ok(re) = Regex::new(PLACEHOLDER) else {
        return Vec::new();
    };
    re.captures_iter(value)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(3)))
        .map(|name| name.as_str().to_string())
        .collect()
}
