use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::config::Environment;
use crate::scanner::DiscoveryFailure;
use crate::types::{Inventory, ResourceKind};

/// How one environment's version compares to the baseline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "version", rename_all = "snake_case")]
pub enum VersionCell {
    Baseline(String),
    BaselineMissing,
    Match(String),
    Mismatch(String),
    Missing,
    /// Discovery failed for this environment, so presence is unknown.
    Unavailable,
}

impl VersionCell {
    pub fn is_drift(&self) -> bool {
        !matches!(self, Self::Baseline(_) | Self::Match(_) | Self::Unavailable)
    }
}

impl Display for VersionCell {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Baseline(v) => write!(f, "{v}"),
            Self::BaselineMissing => write!(f, "NOT FOUND"),
            Self::Match(v) => write!(f, "✅ {v}"),
            Self::Mismatch(v) => write!(f, "❌ {v}"),
            Self::Missing => write!(f, "❗ NOT FOUND"),
            Self::Unavailable => write!(f, "⚠ ERROR"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriftRow {
    pub sequence: usize,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub name: String,
    /// One cell per environment, baseline first.
    pub versions: Vec<VersionCell>,
}

/// Compares versions aligned to the environment list; index 0 is the baseline
/// and an empty string means the resource is missing there.
pub fn compare_versions(versions: &[String]) -> (Vec<VersionCell>, bool) {
    let Some((baseline, others)) = versions.split_first() else {
        return (Vec::new(), false);
    };

    let mut drift = false;
    let mut cells = Vec::with_capacity(versions.len());
    if baseline.is_empty() {
        drift = true;
        cells.push(VersionCell::BaselineMissing);
    } else {
        cells.push(VersionCell::Baseline(baseline.clone()));
    }

    for version in others {
        let cell = if version.is_empty() {
            VersionCell::Missing
        } else if version == baseline {
            VersionCell::Match(version.clone())
        } else {
            VersionCell::Mismatch(version.clone())
        };
        drift |= cell.is_drift();
        cells.push(cell);
    }
    (cells, drift)
}

/// Rows for every baseline resource whose version is not the same everywhere.
///
/// Rows follow the baseline environment's discovery order. Resources that only
/// exist outside the baseline are not reported. Environments listed in
/// `failures` for the resource's kind get [`VersionCell::Unavailable`] instead
/// of a missing cell, and do not count as drift on their own.
pub fn detect_drift(
    environments: &[Environment],
    inventory: &Inventory,
    failures: &[DiscoveryFailure],
) -> Vec<DriftRow> {
    let Some(baseline) = environments.first() else {
        return Vec::new();
    };

    let mut aligned: HashMap<(ResourceKind, &str), Vec<String>> = HashMap::new();
    for (idx, env) in environments.iter().enumerate() {
        for resource in inventory.resources(&env.name) {
            let slots = aligned
                .entry((resource.kind, resource.name.as_str()))
                .or_insert_with(|| vec![String::new(); environments.len()]);
            slots[idx] = resource.version.clone();
        }
    }

    let mut rows = Vec::new();
    let mut reported = HashSet::new();
    for resource in inventory.resources(&baseline.name) {
        let key = (resource.kind, resource.name.as_str());
        if !reported.insert(key) {
            continue;
        }
        let Some(versions) = aligned.get(&key) else {
            continue;
        };
        let (mut cells, _) = compare_versions(versions);
        for (idx, env) in environments.iter().enumerate().skip(1) {
            if is_unavailable(failures, &env.name, resource.kind) {
                cells[idx] = VersionCell::Unavailable;
            }
        }
        if !cells.iter().any(VersionCell::is_drift) {
            continue;
        }
        rows.push(DriftRow {
            sequence: rows.len() + 1,
            kind: resource.kind,
            name: resource.name.clone(),
            versions: cells,
        });
    }
    rows
}

/// A failure without a kind covers every kind in that environment.
fn is_unavailable(failures: &[DiscoveryFailure], environment: &str, kind: ResourceKind) -> bool {
    failures
        .iter()
        .any(|f| f.environment == environment && f.kind.map_or(true, |k| k == kind))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{compare_versions, detect_drift, VersionCell};
    use crate::config::Environment;
    use crate::scanner::{DiscoveryError, DiscoveryFailure};
    use crate::types::{Inventory, Resource, ResourceKind};

    fn envs(names: &[&str]) -> Vec<Environment> {
        names
            .iter()
            .map(|name| Environment {
                name: name.to_string(),
                ..Environment::default()
            })
            .collect()
    }

    fn deployment(name: &str, version: &str) -> Resource {
        Resource::new(ResourceKind::Deployment, name).with_version(version)
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn identical_versions_are_not_drift() {
        let (cells, drift) = compare_versions(&strings(&["1.0.0", "1.0.0", "1.0.0"]));
        assert!(!drift);
        assert_eq!(cells[1], VersionCell::Match("1.0.0".to_string()));
    }

    #[test]
    fn empty_baseline_forces_drift() {
        let (cells, drift) = compare_versions(&strings(&["", "1.0.0"]));
        assert!(drift);
        assert_eq!(cells[0].to_string(), "NOT FOUND");
        assert_eq!(cells[1], VersionCell::Mismatch("1.0.0".to_string()));
    }

    #[test]
    fn missing_in_other_environment_is_drift() {
        let (cells, drift) = compare_versions(&strings(&["2.0.0", "2.0.0", ""]));
        assert!(drift);
        assert_eq!(cells[2], VersionCell::Missing);
        assert_eq!(cells[2].to_string(), "❗ NOT FOUND");
    }

    #[test]
    fn unversioned_is_compared_like_any_version() {
        let (_, drift) = compare_versions(&strings(&["N/A", "N/A"]));
        assert!(!drift);
        let (cells, drift) = compare_versions(&strings(&["N/A", "1.0.0"]));
        assert!(drift);
        assert_eq!(cells[1].to_string(), "❌ 1.0.0");
    }

    #[test]
    fn aligns_by_environment_position() {
        let environments = envs(&["prod", "staging", "dev"]);
        let mut inventory = Inventory::new();
        inventory.extend("prod", [deployment("api", "3.0.0")]);
        inventory.extend("dev", [deployment("api", "3.0.0")]);

        let rows = detect_drift(&environments, &inventory, &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].versions,
            vec![
                VersionCell::Baseline("3.0.0".to_string()),
                VersionCell::Missing,
                VersionCell::Match("3.0.0".to_string()),
            ]
        );
    }

    #[test]
    fn follows_baseline_order_and_numbers_emitted_rows() {
        let environments = envs(&["prod", "staging"]);
        let mut inventory = Inventory::new();
        inventory.extend(
            "prod",
            [
                deployment("zeta", "1.0.0"),
                deployment("alpha", "1.0.0"),
                deployment("mid", "1.0.0"),
            ],
        );
        inventory.extend(
            "staging",
            [
                deployment("zeta", "1.1.0"),
                deployment("alpha", "1.0.0"),
                deployment("mid", "0.9.0"),
                deployment("staging-only", "1.0.0"),
            ],
        );

        let rows = detect_drift(&environments, &inventory, &[]);
        let summary = rows
            .iter()
            .map(|r| (r.sequence, r.name.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(summary, vec![(1, "zeta"), (2, "mid")]);
    }

    #[test]
    fn kinds_with_the_same_name_are_separate() {
        let environments = envs(&["prod", "staging"]);
        let mut inventory = Inventory::new();
        inventory.extend(
            "prod",
            [
                Resource::new(ResourceKind::Lambda, "orders").with_version("1.0.0"),
                deployment("orders", "2.0.0"),
            ],
        );
        inventory.extend(
            "staging",
            [
                Resource::new(ResourceKind::Lambda, "orders").with_version("1.0.0"),
                deployment("orders", "2.0.0"),
            ],
        );
        assert!(detect_drift(&environments, &inventory, &[]).is_empty());
    }

    #[test]
    fn single_environment_never_drifts() {
        let environments = envs(&["prod"]);
        let mut inventory = Inventory::new();
        inventory.extend("prod", [deployment("api", "1.0.0")]);
        assert!(detect_drift(&environments, &inventory, &[]).is_empty());
        assert!(detect_drift(&[], &inventory, &[]).is_empty());
    }

    #[test]
    fn failed_environment_is_unavailable_not_missing() {
        let environments = envs(&["prod", "staging", "dev"]);
        let mut inventory = Inventory::new();
        inventory.extend("prod", [deployment("api", "3.0.0"), deployment("web", "1.0.0")]);
        inventory.extend("dev", [deployment("api", "3.1.0"), deployment("web", "1.0.0")]);
        let failures = vec![DiscoveryFailure {
            environment: "staging".to_string(),
            kind: None,
            error: DiscoveryError::Credentials {
                role: "arn:aws:iam::2:role/ro".to_string(),
                source: anyhow::anyhow!("AccessDenied"),
            },
        }];

        let rows = detect_drift(&environments, &inventory, &failures);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "api");
        assert_eq!(
            rows[0].versions,
            vec![
                VersionCell::Baseline("3.0.0".to_string()),
                VersionCell::Unavailable,
                VersionCell::Mismatch("3.1.0".to_string()),
            ]
        );
        assert_eq!(rows[0].versions[1].to_string(), "⚠ ERROR");
    }

    #[test]
    fn failed_kind_only_affects_that_kind() {
        let environments = envs(&["prod", "staging"]);
        let mut inventory = Inventory::new();
        inventory.extend(
            "prod",
            [
                Resource::new(ResourceKind::Lambda, "orders").with_version("1.0.0"),
                deployment("api", "2.0.0"),
            ],
        );
        inventory.extend(
            "staging",
            [Resource::new(ResourceKind::Lambda, "orders").with_version("1.1.0")],
        );
        let failures = vec![DiscoveryFailure {
            environment: "staging".to_string(),
            kind: Some(ResourceKind::Deployment),
            error: DiscoveryError::TimedOut(Duration::from_secs(120)),
        }];

        let rows = detect_drift(&environments, &inventory, &failures);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, ResourceKind::Lambda);
        assert_eq!(rows[0].versions[1], VersionCell::Mismatch("1.1.0".to_string()));
    }
}
