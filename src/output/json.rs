use anyhow::{Context, Result};

use crate::types::Inventory;

/// The raw environment -> resources map, pretty-printed.
pub fn render_inventory_json(inventory: &Inventory) -> Result<String> {
    serde_json::to_string_pretty(inventory).context("failed encoding inventory as JSON")
}

#[cfg(test)]
mod tests {
    use super::render_inventory_json;
    use crate::types::{Inventory, Resource, ResourceKind};

    #[test]
    fn renders_environments_with_their_resources() {
        let mut inventory = Inventory::new();
        inventory.extend(
            "staging",
            [Resource::new(ResourceKind::Lambda, "checkout").with_version("1.4.0")],
        );
        inventory.extend("prod", Vec::<Resource>::new());

        let rendered = render_inventory_json(&inventory).expect("render");
        let parsed: serde_json::Value = serde_json::from_str(&rendered).expect("valid json");
        assert_eq!(parsed["staging"][0]["type"], "Lambda");
        assert_eq!(parsed["staging"][0]["version"], "1.4.0");
        assert_eq!(parsed["prod"], serde_json::json!([]));
    }
}
