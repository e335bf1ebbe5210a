pub mod deployment;
pub mod filter;
pub mod lambda;
pub mod version;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Resource, ResourceKind};

pub use filter::ExcludeSet;
pub use version::extract_version;

/// What a finder should look for.
///
/// A non-empty `include` list switches the finder to name-based lookup, in
/// which case `tags` and `exclude` are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceQuery {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub tags: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub include: Vec<String>,
}

impl ResourceQuery {
    pub fn by_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_tag<I, S>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags
            .insert(key.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_exclude(mut self, pattern: &str) -> Self {
        self.exclude.push(pattern.to_string());
        self
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn is_name_based(&self) -> bool {
        !self.include.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum FinderError {
    #[error("invalid exclude pattern `{pattern}`")]
    InvalidExclude {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("failed to look up {kind} `{name}`")]
    Lookup {
        kind: ResourceKind,
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to enumerate {kind} resources")]
    Enumerate {
        kind: ResourceKind,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to create {kind} client")]
    Client {
        kind: ResourceKind,
        #[source]
        source: anyhow::Error,
    },
}

/// Discovers resources of a single kind and resolves their running versions.
///
/// Implementors provide the two lookup strategies; [`Finder::find_resources`]
/// picks between them from the query.
#[async_trait]
pub trait Finder: Send + Sync {
    /// Looks every name up directly. Names the provider does not know are skipped.
    async fn find_by_name(
        &self,
        query: &ResourceQuery,
        names: &[String],
    ) -> Result<Vec<Resource>, FinderError>;

    /// Enumerates everything matching `query.tags`, minus excluded names.
    async fn find_by_filter(
        &self,
        query: &ResourceQuery,
        excluded: &ExcludeSet,
    ) -> Result<Vec<Resource>, FinderError>;

    async fn find_resources(&self, query: &ResourceQuery) -> Result<Vec<Resource>, FinderError> {
        if query.is_name_based() {
            return self.find_by_name(query, &query.include).await;
        }
        let excluded = ExcludeSet::compile(&query.exclude)?;
        self.find_by_filter(query, &excluded).await
    }
}
