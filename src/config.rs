use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resource::{ExcludeSet, ResourceQuery};
use crate::types::ResourceKind;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// The first entry is the baseline every other environment is compared to.
    #[serde(default)]
    pub envs: Vec<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lambdas: Option<ResourceQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployments: Option<ResourceQuery>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub cluster_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("yaml" | "yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no environments configured")]
    NoEnvironments,
    #[error("environment #{0} has no name")]
    UnnamedEnvironment(usize),
    #[error("environment `{0}` is configured more than once")]
    DuplicateEnvironment(String),
    #[error("environment `{0}` has no role")]
    MissingRole(String),
    #[error("environment `{0}` has no clusterName but deployments are configured")]
    MissingClusterName(String),
    #[error("{kind} exclude pattern `{pattern}` is not a valid regex")]
    InvalidExclude { kind: ResourceKind, pattern: String },
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let config = Self::parse(&data, Format::from_path(path))
            .with_context(|| format!("failed parsing config: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config: {}", path.display()))?;
        Ok(config)
    }

    fn parse(data: &str, format: Format) -> Result<Self> {
        let parsed: Self = match format {
            Format::Yaml => serde_yaml::from_str(data)?,
            Format::Json => serde_json::from_str(data)?,
        };
        Ok(parsed)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Self::parse(data, Format::Json)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        Self::parse(data, Format::Yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.envs.is_empty() {
            return Err(ConfigError::NoEnvironments);
        }
        let mut seen = BTreeSet::new();
        for (idx, env) in self.envs.iter().enumerate() {
            if env.name.trim().is_empty() {
                return Err(ConfigError::UnnamedEnvironment(idx));
            }
            if !seen.insert(env.name.as_str()) {
                return Err(ConfigError::DuplicateEnvironment(env.name.clone()));
            }
            if env.role.trim().is_empty() {
                return Err(ConfigError::MissingRole(env.name.clone()));
            }
            if self.deployments.is_some() && env.cluster_name.trim().is_empty() {
                return Err(ConfigError::MissingClusterName(env.name.clone()));
            }
        }
        for (kind, query) in self.queries() {
            if query.is_name_based() {
                continue;
            }
            for pattern in &query.exclude {
                if ExcludeSet::compile(std::slice::from_ref(pattern)).is_err() {
                    return Err(ConfigError::InvalidExclude {
                        kind,
                        pattern: pattern.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Configured queries in discovery order.
    pub fn queries(&self) -> Vec<(ResourceKind, &ResourceQuery)> {
        ResourceKind::ALL
            .into_iter()
            .filter_map(|kind| self.query(kind).map(|q| (kind, q)))
            .collect()
    }

    pub fn query(&self, kind: ResourceKind) -> Option<&ResourceQuery> {
        match kind {
            ResourceKind::Lambda => self.lambdas.as_ref(),
            ResourceKind::Deployment => self.deployments.as_ref(),
        }
    }

    pub fn baseline(&self) -> Option<&Environment> {
        self.envs.first()
    }
}

impl Environment {
    pub fn region_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.region.trim().is_empty() {
            fallback
        } else {
            &self.region
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{Config, ConfigError};
    use crate::types::ResourceKind;

    const JSON: &str = r#"{
        "envs": [
            {"name": "prod", "region": "us-east-1", "role": "arn:aws:iam::1:role/ro", "clusterName": "prod-eks"},
            {"name": "staging", "role": "arn:aws:iam::2:role/ro", "clusterName": "staging-eks"}
        ],
        "lambdas": {"tags": {"team": ["payments"]}, "exclude": ["^test-.*"]},
        "deployments": {"namespace": "shop", "include": ["orders", "billing"]}
    }"#;

    #[test]
    fn parses_json_schema() {
        let config = Config::from_json(JSON).expect("parse json");
        config.validate().expect("valid config");
        assert_eq!(config.baseline().map(|e| e.name.as_str()), Some("prod"));
        assert_eq!(config.envs[1].cluster_name, "staging-eks");
        assert_eq!(config.envs[1].region_or("us-east-1"), "us-east-1");
        let kinds = config.queries().into_iter().map(|(k, _)| k).collect::<Vec<_>>();
        assert_eq!(kinds, vec![ResourceKind::Lambda, ResourceKind::Deployment]);
        assert_eq!(
            config.deployments.as_ref().map(|q| q.include.len()),
            Some(2)
        );
    }

    #[test]
    fn loads_yaml_by_extension() {
        let mut file = tempfile::Builder::new()
            .suffix(".yml")
            .tempfile()
            .expect("create temp file");
        write!(
            file,
            "envs:\n  - name: dev\n    role: arn:aws:iam::1:role/ro\nlambdas:\n  include: [checkout]\n"
        )
        .expect("write config");

        let config = Config::load(file.path()).expect("load yaml");
        assert_eq!(config.envs.len(), 1);
        assert!(config.deployments.is_none());
        assert_eq!(config.queries().len(), 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::load(std::path::Path::new("/nonexistent/drifter.json")).unwrap_err();
        assert!(err.to_string().contains("failed reading config"));
    }

    #[test]
    fn rejects_invalid_configs() {
        assert_eq!(Config::default().validate(), Err(ConfigError::NoEnvironments));

        let mut config = Config::from_json(JSON).expect("parse json");
        config.envs[1].name = "prod".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateEnvironment("prod".to_string()))
        );

        let mut config = Config::from_json(JSON).expect("parse json");
        config.envs[0].cluster_name.clear();
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingClusterName("prod".to_string()))
        );

        let mut config = Config::from_json(JSON).expect("parse json");
        if let Some(lambdas) = config.lambdas.as_mut() {
            lambdas.exclude.push("(".to_string());
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidExclude { kind: ResourceKind::Lambda, .. })
        ));
    }
}
