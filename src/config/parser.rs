//! Parsers for tag and parameter documents.
//!
//! Documents are YAML (and therefore also JSON) flat key-value objects.
//! Each value is coerced to its string encoding and then expanded for
//! environment variable actions.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use crate::cloud::{Parameter, Tag};
use crate::error::{ConfigError, Result, StackforgeError};

use super::coerce::{coerce_value, CoerceOptions};
use super::envsubst::{expand_env, expand_with};

/// Where environment variables are resolved from.
#[derive(Debug, Clone, Default)]
enum EnvSource {
    /// The process environment.
    #[default]
    Process,
    /// A fixed set of variables.
    Fixed(HashMap<String, String>),
}

/// Parser for tag and parameter documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentParser {
    env: EnvSource,
}

impl DocumentParser {
    /// Creates a parser that resolves variables from the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parser that resolves variables from a fixed set only.
    #[must_use]
    pub fn with_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            env: EnvSource::Fixed(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Parses a tags document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a flat key-value object, if a
    /// value cannot be coerced, or if templating fails.
    pub fn parse_tags(&self, document: &str) -> Result<Vec<Tag>> {
        let entries = self.parse_entries(document, "Tag", CoerceOptions::TAGS)?;
        Ok(entries.into_iter().map(|(k, v)| Tag::new(k, v)).collect())
    }

    /// Parses and merges parameter documents.
    ///
    /// Documents are applied in order; a key defined by a later document
    /// replaces the value from any earlier one.
    ///
    /// # Errors
    ///
    /// Same as [`Self::parse_tags`], for any of the documents.
    pub fn parse_parameters<S: AsRef<str>>(&self, documents: &[S]) -> Result<Vec<Parameter>> {
        let mut merged: Vec<Parameter> = Vec::new();

        for document in documents {
            for (key, value) in
                self.parse_entries(document.as_ref(), "Parameter", CoerceOptions::PARAMETERS)?
            {
                if let Some(existing) = merged.iter_mut().find(|p| p.key == key) {
                    debug!("Parameter {key} overridden by a later document");
                    existing.value = value;
                } else {
                    merged.push(Parameter::new(key, value));
                }
            }
        }

        Ok(merged)
    }

    /// Expands `env` actions in a single value.
    ///
    /// # Errors
    ///
    /// Returns an error for undefined variables or malformed actions.
    pub fn expand(&self, value: &str) -> Result<String> {
        let expanded = match &self.env {
            EnvSource::Process => expand_env(value),
            EnvSource::Fixed(vars) => expand_with(value, |name| vars.get(name).cloned()),
        }?;
        Ok(expanded)
    }

    fn parse_entries(
        &self,
        document: &str,
        kind: &'static str,
        options: CoerceOptions,
    ) -> Result<Vec<(String, String)>> {
        let mapping = decode_mapping(document, kind)?;
        let mut entries = Vec::with_capacity(mapping.len());

        for (key, value) in &mapping {
            let key = key_string(key, kind)?;
            if value.is_mapping() {
                return Err(invalid_format(format!(
                    "{kind}s must be a basic key-value object, but {key} is a nested object"
                )));
            }

            let coerced = coerce_value(value, options).map_err(|source| {
                StackforgeError::Config(ConfigError::InvalidValue {
                    kind,
                    key: key.clone(),
                    source,
                })
            })?;

            entries.push((key, self.expand(&coerced)?));
        }

        Ok(entries)
    }
}

/// Parses a tags document, resolving variables from the process environment.
///
/// # Errors
///
/// See [`DocumentParser::parse_tags`].
pub fn parse_tags(document: &str) -> Result<Vec<Tag>> {
    DocumentParser::new().parse_tags(document)
}

/// Parses and merges parameter documents, resolving variables from the
/// process environment.
///
/// # Errors
///
/// See [`DocumentParser::parse_parameters`].
pub fn parse_parameters<S: AsRef<str>>(documents: &[S]) -> Result<Vec<Parameter>> {
    DocumentParser::new().parse_parameters(documents)
}

/// Parses `KEY=VALUE` override arguments.
///
/// Only the first `=` separates key from value.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidOverride`] for an argument without `=`.
pub fn parse_parameter_overrides<S: AsRef<str>>(args: &[S]) -> Result<BTreeMap<String, String>> {
    let mut overrides = BTreeMap::new();

    for arg in args {
        let arg = arg.as_ref();
        let (key, value) = arg.split_once('=').ok_or_else(|| {
            StackforgeError::Config(ConfigError::InvalidOverride {
                input: arg.to_string(),
            })
        })?;
        overrides.insert(key.to_string(), value.to_string());
    }

    Ok(overrides)
}

/// Reads a document from disk.
///
/// # Errors
///
/// Returns an error if the file does not exist or cannot be read.
pub fn load_document(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    info!("Loading document from: {}", path.display());

    if !path.exists() {
        return Err(StackforgeError::Config(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        }));
    }

    Ok(std::fs::read_to_string(path)?)
}

/// Loads a `.env` file from `base` (or the working directory) into the
/// process environment, if one exists.
///
/// Variables already set in the environment are left untouched.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be parsed.
pub fn load_dotenv(base: Option<&Path>) -> Result<()> {
    let env_path = base.map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

    if env_path.exists() {
        info!("Loading environment from: {}", env_path.display());
        dotenvy::from_path(&env_path).map_err(|e| {
            invalid_format(format!(
                "Failed to load .env file {}: {e}",
                env_path.display()
            ))
        })?;
    } else {
        debug!(".env file not found at: {}", env_path.display());
    }

    Ok(())
}

fn decode_mapping(document: &str, kind: &str) -> Result<Mapping> {
    let value: Value = serde_yaml::from_str(document)
        .map_err(|e| invalid_format(format!("Failed to decode {kind}s: {e}")))?;

    match value {
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(invalid_format(format!(
            "{kind}s must be a basic key-value object"
        ))),
    }
}

fn key_string(key: &Value, kind: &str) -> Result<String> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(_) | Value::Bool(_) => coerce_value(key, CoerceOptions::TAGS)
            .map_err(|e| invalid_format(format!("Invalid {kind} key: {e}"))),
        _ => Err(invalid_format(format!("{kind} keys must be scalars"))),
    }
}

fn invalid_format(message: String) -> StackforgeError {
    StackforgeError::Config(ConfigError::InvalidFormat { message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parser() -> DocumentParser {
        DocumentParser::with_vars([("TEST_VAR1", "VALUE_HERE")])
    }

    fn pairs(tags: &[Tag]) -> Vec<(&str, &str)> {
        tags.iter().map(|t| (t.key.as_str(), t.value.as_str())).collect()
    }

    #[test]
    fn test_parse_tags_json_and_yaml() {
        let json = r#"{
            "String": "Foobar",
            "Int": 123,
            "Float": 123.456,
            "Boolean": true
        }"#;
        let yaml = "---\nString: Foobar\nInt: 123\nFloat: 123.456\nBoolean: true\n";

        let expected = vec![
            ("String", "Foobar"),
            ("Int", "123"),
            ("Float", "123.456"),
            ("Boolean", "true"),
        ];

        assert_eq!(pairs(&parser().parse_tags(json).expect("json tags")), expected);
        assert_eq!(pairs(&parser().parse_tags(yaml).expect("yaml tags")), expected);
    }

    #[test]
    fn test_parse_tags_float_canonical_form() {
        let tags = parser()
            .parse_tags("ThisKey: 3.1415926535897932384626433832795028841971")
            .expect("tags");
        assert_eq!(pairs(&tags), vec![("ThisKey", "3.141592653589793")]);
    }

    #[test]
    fn test_parse_tags_with_env_variables() {
        let tags = parser()
            .parse_tags(r#"{"ThisKey":"ThisValue-{{ env \"TEST_VAR1\"}}"}"#)
            .expect("tags");
        assert_eq!(pairs(&tags), vec![("ThisKey", "ThisValue-VALUE_HERE")]);
    }

    #[test]
    fn test_parse_tags_rejects_bad_shapes() {
        for document in ["- one\n- two", "just a string", "Outer:\n  Inner: value", ""] {
            let err = parser().parse_tags(document).expect_err("should fail");
            assert!(
                matches!(err, StackforgeError::Config(ConfigError::InvalidFormat { .. })),
                "unexpected error for {document:?}: {err}"
            );
        }

        let list = parser().parse_tags("Key: [a, b]").expect_err("lists are not tags");
        assert!(matches!(
            list,
            StackforgeError::Config(ConfigError::InvalidValue { kind: "Tag", .. })
        ));
    }

    #[test]
    fn test_parse_tags_missing_env_variable() {
        let err = parser()
            .parse_tags("Key: '{{ env \"UNDEFINED_VAR\" }}'")
            .expect_err("should fail");
        assert!(matches!(err, StackforgeError::Config(ConfigError::MissingEnvVar { .. })));
    }

    #[test]
    fn test_parse_parameters_lists_and_commas() {
        let params = parser()
            .parse_parameters(&["Subnets: [subnet-a, subnet-b]\nDescription: one,two\n"])
            .expect("parameters");
        assert_eq!(params[0], Parameter::new("Subnets", "subnet-a,subnet-b"));
        assert_eq!(params[1], Parameter::new("Description", "one,two"));
    }

    #[test]
    fn test_parse_parameters_last_document_wins() {
        let documents = [
            "A: first\nB: first\n",
            r#"{"B": "second", "C": 3}"#,
            "C: third\n",
        ];
        let params = parser().parse_parameters(&documents).expect("parameters");

        assert_eq!(
            params,
            vec![
                Parameter::new("A", "first"),
                Parameter::new("B", "second"),
                Parameter::new("C", "third"),
            ]
        );
    }

    #[test]
    fn test_parse_parameters_fails_on_any_document() {
        let documents = ["A: ok", "B: {nested: true}"];
        assert!(parser().parse_parameters(&documents).is_err());
    }

    #[test]
    fn test_parse_parameter_overrides() {
        let overrides =
            parse_parameter_overrides(&["Env=prod", "Url=https://x/?a=b"]).expect("overrides");
        assert_eq!(overrides["Env"], "prod");
        assert_eq!(overrides["Url"], "https://x/?a=b");

        let err = parse_parameter_overrides(&["NoEquals"]).expect_err("should fail");
        assert!(matches!(err, StackforgeError::Config(ConfigError::InvalidOverride { .. })));
    }

    #[test]
    fn test_load_document() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("tags.yaml");
        std::fs::write(&path, "Owner: platform\n").expect("write");

        assert_eq!(load_document(&path).expect("load"), "Owner: platform\n");

        let missing = load_document(dir.path().join("missing.yaml")).expect_err("should fail");
        assert!(matches!(missing, StackforgeError::Config(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_load_dotenv_feeds_env_templates() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        load_dotenv(Some(dir.path())).expect("a missing .env is not an error");

        std::fs::write(
            dir.path().join(".env"),
            "STACKFORGE_DOTENV_TEST_OWNER=platform-team\n",
        )
        .expect("write");
        load_dotenv(Some(dir.path())).expect("load");

        let tags = parse_tags("Owner: '{{ env \"STACKFORGE_DOTENV_TEST_OWNER\" }}'").expect("tags");
        assert_eq!(pairs(&tags), vec![("Owner", "platform-team")]);
    }
}
