use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

use crate::resource::FinderError;

/// Compiled exclude patterns. A name is excluded when any pattern matches it.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<Regex>,
}

impl ExcludeSet {
    pub fn compile(patterns: &[String]) -> Result<Self, FinderError> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| FinderError::InvalidExclude {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(name))
    }
}

/// Renders tags as a Kubernetes label selector.
///
/// One value gives `key=value`, several give `key in (a,b)`, none gives the
/// bare `key` existence term. Terms are ordered by key.
pub fn label_selector(tags: &BTreeMap<String, BTreeSet<String>>) -> String {
    tags.iter()
        .map(|(key, values)| match values.len() {
            0 => key.clone(),
            1 => {
                let value = values.iter().next().map(String::as_str).unwrap_or_default();
                format!("{key}={value}")
            }
            _ => {
                let joined = values.iter().map(String::as_str).collect::<Vec<_>>().join(",");
                format!("{key} in ({joined})")
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    pub key: String,
    /// Empty means "tag present with any value".
    pub values: Vec<String>,
}

pub fn tag_filters(tags: &BTreeMap<String, BTreeSet<String>>) -> Vec<TagFilter> {
    tags.iter()
        .map(|(key, values)| TagFilter {
            key: key.clone(),
            values: values.iter().cloned().collect(),
        })
        .collect()
}
