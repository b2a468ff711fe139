//! Configuration loaded from a TOML file.
//!
//! Relative paths (schema, fixture directories) resolve against the
//! directory holding the config file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kgfed_core::{Response, SchemaGraph};
use kgfed_query::{
    BackendRegistry, Engine, ExecutionMode, ExecutionOptions, FailurePolicy, InMemoryBackend,
    StaticNameResolver,
};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the YAML schema graph.
    pub schema: PathBuf,
    pub log_level: Option<String>,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,
    /// Static name table: name -> identifiers, most significant first.
    #[serde(default)]
    pub names: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub policy: FailurePolicy,
    #[serde(default)]
    pub resolve_names: bool,
}

impl ExecutionConfig {
    #[must_use]
    pub fn options(&self) -> ExecutionOptions {
        ExecutionOptions {
            mode: self.mode,
            timeout: self.timeout_ms.map(Duration::from_millis),
            policy: self.policy,
            resolve_names: self.resolve_names,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Directory of canned responses, one JSON file per question type signature.
    pub fixtures: PathBuf,
}

/// One fixture file: the node types it answers and the response it returns.
#[derive(Debug, Deserialize)]
struct Fixture {
    types: Vec<String>,
    response: Response,
}

impl Config {
    /// Read and parse a config file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not valid TOML for [`Config`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config: Self = toml::from_str(&text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// # Errors
    ///
    /// Fails if the schema file cannot be read or parsed.
    pub fn load_schema(&self) -> Result<SchemaGraph> {
        load_schema(&self.resolve(&self.schema))
    }

    /// Build an engine with one fixture-backed backend per `[backends.*]` entry.
    ///
    /// # Errors
    ///
    /// Fails on an unreadable schema or a malformed fixture file.
    pub fn build_engine(&self) -> Result<Engine> {
        let schema = self.load_schema()?;
        let mut registry = BackendRegistry::new();
        for (id, backend) in &self.backends {
            registry.register(self.load_fixtures(id, &self.resolve(&backend.fixtures))?);
        }

        let mut resolver = StaticNameResolver::new();
        for (name, ids) in &self.names {
            resolver.insert(name, ids.clone());
        }

        info!(backends = self.backends.len(), names = self.names.len(), "engine configured");
        Ok(Engine::new(Arc::new(schema), registry)
            .with_options(self.execution.options())
            .with_resolver(resolver))
    }

    fn load_fixtures(&self, id: &str, dir: &Path) -> Result<InMemoryBackend> {
        let mut backend = InMemoryBackend::new(id);
        let mut paths = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read fixtures for '{id}' in {}", dir.display()))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        paths.sort();

        for path in paths
            .into_iter()
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let fixture: Fixture = serde_json::from_str(&text)
                .with_context(|| format!("invalid fixture {}", path.display()))?;
            let types: Vec<&str> = fixture.types.iter().map(String::as_str).collect();
            debug!(backend = id, fixture = %path.display(), "fixture loaded");
            backend = backend.with_response(&types, fixture.response);
        }
        Ok(backend)
    }
}

/// # Errors
///
/// Fails if the file cannot be read or is not a valid schema graph.
pub fn load_schema(path: &Path) -> Result<SchemaGraph> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema {}", path.display()))?;
    SchemaGraph::from_yaml(&text).with_context(|| format!("invalid schema {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SCHEMA: &str = "backends:\n  robokop:\n    url: /graph/gamma/quick\n    transitions:\n      chemical_substance:\n        disease: [treats]\n";

    #[test]
    fn parses_full_config() {
        let config: Config = toml::from_str(
            r#"
            schema = "schema.yaml"
            log_level = "info"
            [execution]
            mode = "sequential"
            timeout_ms = 250
            policy = "best_effort"
            [backends.robokop]
            fixtures = "fixtures/robokop"
            [names]
            asthma = ["MONDO:0004979"]
            "#,
        )
        .unwrap();
        let options = config.execution.options();
        assert_eq!(options.mode, ExecutionMode::Sequential);
        assert_eq!(options.timeout, Some(Duration::from_millis(250)));
        assert_eq!(options.policy, FailurePolicy::BestEffort);
        assert!(!options.resolve_names);
        assert_eq!(config.names["asthma"], vec!["MONDO:0004979"]);
        assert_eq!(config.backends["robokop"].fixtures, PathBuf::from("fixtures/robokop"));
    }

    #[test]
    fn execution_defaults() {
        let config: Config = toml::from_str(r#"schema = "s.yaml""#).unwrap();
        assert_eq!(config.execution.options(), ExecutionOptions::default());
        assert!(config.backends.is_empty());
        assert!(config.log_level.is_none());
    }

    #[test]
    fn loads_schema_and_fixtures_relative_to_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("schema.yaml"), SCHEMA).unwrap();
        std::fs::create_dir(dir.path().join("robokop")).unwrap();
        std::fs::write(
            dir.path().join("robokop").join("chem-disease.json"),
            r#"{"types": ["chemical_substance", "disease"], "response": {"knowledge_map": []}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("robokop").join("README"), "ignored").unwrap();
        let config_path = dir.path().join("kgfed.toml");
        std::fs::write(
            &config_path,
            "schema = \"schema.yaml\"\n[backends.robokop]\nfixtures = \"robokop\"\n",
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        let engine = config.build_engine().unwrap();
        assert!(engine.schema().has_type("disease"));
    }

    #[test]
    fn malformed_fixture_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("schema.yaml"), SCHEMA).unwrap();
        std::fs::create_dir(dir.path().join("robokop")).unwrap();
        std::fs::write(dir.path().join("robokop").join("bad.json"), "{").unwrap();
        let config_path = dir.path().join("kgfed.toml");
        std::fs::write(
            &config_path,
            "schema = \"schema.yaml\"\n[backends.robokop]\nfixtures = \"robokop\"\n",
        )
        .unwrap();

        let err = Config::load(&config_path).unwrap().build_engine().unwrap_err();
        assert!(format!("{err:#}").contains("invalid fixture"));
    }
}
