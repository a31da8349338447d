//! Environment variables and `${name}` substitution
//!
//! Pipeline steps are described with templates such as
//! `go build -o ${artifact} .`. The values come from an ordered list of
//! name/value pairs accumulated while a version moves through the
//! pipeline (`version`, `artifact`, `port`, ...).

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

static ENV_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z0-9_]*)\}").expect("valid env pattern"));

/// Errors raised while resolving variables
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// A `${name}` placeholder has no value
    #[error("missing environment variable: {0}")]
    MissingEnv(String),

    /// The same name appears twice in one collection
    #[error("duplicate environment variable: {0}")]
    DuplicateKeys(String),
}

/// A single name/value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered collection of variables
///
/// Insertion order is kept for display. Names are expected to be unique;
/// this is checked when the collection is turned into a lookup map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvVars(Vec<EnvVar>);

impl EnvVars {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Snapshot of the process environment
    pub fn from_process_env() -> Self {
        Self(
            std::env::vars()
                .map(|(name, value)| EnvVar { name, value })
                .collect(),
        )
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(EnvVar::new(name, value));
    }

    pub fn push_var(&mut self, var: EnvVar) {
        self.0.push(var);
    }

    /// Returns the first value registered under `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EnvVar> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builds a lookup map, failing on the first duplicated name
    pub fn to_map(&self) -> Result<HashMap<String, String>, EnvError> {
        let mut keys = HashMap::with_capacity(self.0.len());
        for var in &self.0 {
            if keys.contains_key(&var.name) {
                return Err(EnvError::DuplicateKeys(var.name.clone()));
            }
            keys.insert(var.name.clone(), var.value.clone());
        }
        Ok(keys)
    }

    /// Replaces every `${name}` occurrence in `template`
    pub fn replace(&self, template: &str) -> Result<String, EnvError> {
        let envs = self.to_map()?;
        substitute(template, &envs)
    }
}

impl From<Vec<EnvVar>> for EnvVars {
    fn from(vars: Vec<EnvVar>) -> Self {
        Self(vars)
    }
}

impl FromIterator<EnvVar> for EnvVars {
    fn from_iter<I: IntoIterator<Item = EnvVar>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<EnvVar> for EnvVars {
    fn extend<I: IntoIterator<Item = EnvVar>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for EnvVars {
    type Item = EnvVar;
    type IntoIter = std::vec::IntoIter<EnvVar>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a EnvVars {
    type Item = &'a EnvVar;
    type IntoIter = std::slice::Iter<'a, EnvVar>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Replaces `${name}` placeholders using an already built lookup map
///
/// Every placeholder is checked before anything is replaced, so either the
/// whole template resolves or `MissingEnv` names the first unresolved key.
/// Substituted values are never scanned again.
pub fn substitute(template: &str, envs: &HashMap<String, String>) -> Result<String, EnvError> {
    for captures in ENV_PATTERN.captures_iter(template) {
        let key = &captures[1];
        if !envs.contains_key(key) {
            return Err(EnvError::MissingEnv(key.to_string()));
        }
    }

    let replaced = ENV_PATTERN.replace_all(template, |captures: &Captures<'_>| {
        envs.get(&captures[1]).cloned().unwrap_or_default()
    });
    Ok(replaced.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envs(pairs: &[(&str, &str)]) -> EnvVars {
        pairs.iter().map(|(n, v)| EnvVar::new(*n, *v)).collect()
    }

    #[test]
    fn test_replace_all_occurrences() {
        let vars = envs(&[("version", "123"), ("x", "abc")]);

        assert_eq!(vars.replace("abc-${version}-${x}").unwrap(), "abc-123-abc");
        assert_eq!(vars.replace("abc-${version}").unwrap(), "abc-123");
        assert_eq!(vars.replace("${version}").unwrap(), "123");
        assert_eq!(
            vars.replace("${version}/${version}.${x}").unwrap(),
            "123/123.abc"
        );
    }

    #[test]
    fn test_replace_without_placeholder_is_identity() {
        let vars = envs(&[("version", "123")]);

        for input in ["", "plain", "$version", "{version}", "$ {version}", "${not-valid}"] {
            assert_eq!(vars.replace(input).unwrap(), input);
        }
    }

    #[test]
    fn test_replace_missing_env() {
        let vars = envs(&[("x", "abc")]);

        assert_eq!(
            vars.replace("abc-${version}-${x}"),
            Err(EnvError::MissingEnv("version".to_string()))
        );
        assert_eq!(
            vars.replace("abc-${version}"),
            Err(EnvError::MissingEnv("version".to_string()))
        );
    }

    #[test]
    fn test_replace_does_not_rescan_values() {
        let vars = envs(&[("a", "${b}"), ("b", "loop")]);

        assert_eq!(vars.replace("${a}").unwrap(), "${b}");
    }

    #[test]
    fn test_to_map() {
        let vars = envs(&[("VERSION", "1.0"), ("PORT", "8080")]);

        let map = vars.to_map().unwrap();
        assert_eq!(map.get("VERSION"), Some(&"1.0".to_string()));
        assert_eq!(map.get("PORT"), Some(&"8080".to_string()));
    }

    #[test]
    fn test_duplicate_keys() {
        let vars = envs(&[("VERSION", "1.0"), ("VERSION", "2.0")]);

        assert_eq!(
            vars.to_map(),
            Err(EnvError::DuplicateKeys("VERSION".to_string()))
        );
        assert_eq!(
            vars.replace("no placeholder"),
            Err(EnvError::DuplicateKeys("VERSION".to_string()))
        );

        let same_value = envs(&[("VERSION", "1.0"), ("VERSION", "1.0")]);
        assert!(matches!(
            same_value.to_map(),
            Err(EnvError::DuplicateKeys(_))
        ));
    }

    #[test]
    fn test_get_and_push() {
        let mut vars = EnvVars::new();
        assert!(vars.is_empty());

        vars.push("version", "abc");
        vars.push_var(EnvVar::new("port", "8090"));

        assert_eq!(vars.len(), 2);
        assert_eq!(vars.get("version"), Some("abc"));
        assert_eq!(vars.get("port"), Some("8090"));
        assert_eq!(vars.get("missing"), None);
    }

    #[test]
    fn test_serialize_as_list() {
        let vars = envs(&[("version", "abc")]);

        let json = serde_json::to_string(&vars).unwrap();
        assert_eq!(json, r#"[{"name":"version","value":"abc"}]"#);
    }
}
