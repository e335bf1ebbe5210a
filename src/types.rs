use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Version reported for a resource that exists but carries no recognizable version.
pub const UNVERSIONED: &str = "N/A";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Lambda,
    Deployment,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Lambda, ResourceKind::Deployment];

    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Lambda => "lambda",
            Self::Deployment => "deployment",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::Lambda => "Lambda",
            Self::Deployment => "Deployment",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub name: String,
    pub version: String,
}

impl Resource {
    pub fn new(kind: ResourceKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            version: UNVERSIONED.to_string(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// Resources discovered per environment, keyed by environment name.
///
/// Within an environment, resources keep the order in which discovery tasks
/// delivered them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Inventory {
    environments: BTreeMap<String, Vec<Resource>>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, environment: &str, resources: impl IntoIterator<Item = Resource>) {
        self.environments
            .entry(environment.to_string())
            .or_default()
            .extend(resources);
    }

    pub fn resources(&self, environment: &str) -> &[Resource] {
        self.environments
            .get(environment)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.environments.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::{Inventory, Resource, ResourceKind};

    #[test]
    fn inventory_appends_in_delivery_order() {
        let mut inventory = Inventory::new();
        inventory.extend(
            "prod",
            [Resource::new(ResourceKind::Lambda, "billing").with_version("1.0.0")],
        );
        inventory.extend(
            "prod",
            [Resource::new(ResourceKind::Deployment, "api").with_version("2.0.0")],
        );

        let names = inventory
            .resources("prod")
            .iter()
            .map(|r| r.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["billing", "api"]);
        assert!(inventory.resources("staging").is_empty());
        assert_eq!(inventory.total(), 2);
    }

    #[test]
    fn serializes_as_plain_environment_map() {
        let mut inventory = Inventory::new();
        inventory.extend("prod", [Resource::new(ResourceKind::Deployment, "api")]);
        let value = serde_json::to_value(&inventory).expect("serialize inventory");
        assert_eq!(
            value,
            serde_json::json!({
                "prod": [{ "type": "Deployment", "name": "api", "version": "N/A" }]
            })
        );
    }
}
