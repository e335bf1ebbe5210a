use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::config::Environment;
use crate::drift::{DriftRow, VersionCell};

pub fn render_drift_table(environments: &[Environment], rows: &[DriftRow]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec!["#".to_string(), "TYPE".to_string(), "NAME".to_string()];
    header.extend(environments.iter().map(|e| e.name.to_uppercase()));
    table.set_header(header);

    for row in rows {
        let mut cells = vec![
            Cell::new(row.sequence),
            Cell::new(row.kind.to_string()),
            Cell::new(&row.name),
        ];
        cells.extend(row.versions.iter().map(version_cell));
        table.add_row(Row::from(cells));
    }
    table.to_string()
}

fn version_cell(version: &VersionCell) -> Cell {
    let cell = Cell::new(version.to_string());
    match version {
        VersionCell::Baseline(_) => cell,
        VersionCell::Match(_) => cell.fg(Color::Green),
        VersionCell::Mismatch(_) => cell.fg(Color::Red),
        VersionCell::BaselineMissing | VersionCell::Missing => cell.fg(Color::Yellow),
        VersionCell::Unavailable => cell.fg(Color::Magenta),
    }
}

#[cfg(test)]
mod tests {
    use super::render_drift_table;
    use crate::config::Environment;
    use crate::drift::{DriftRow, VersionCell};
    use crate::types::ResourceKind;

    #[test]
    fn renders_uppercase_environment_headers_and_markers() {
        let environments = ["prod", "staging"]
            .iter()
            .map(|name| Environment {
                name: name.to_string(),
                ..Environment::default()
            })
            .collect::<Vec<_>>();
        let rows = vec![DriftRow {
            sequence: 1,
            kind: ResourceKind::Deployment,
            name: "svc-b".to_string(),
            versions: vec![
                VersionCell::Baseline("2.0.0".to_string()),
                VersionCell::Mismatch("2.1.0".to_string()),
            ],
        }];

        let rendered = render_drift_table(&environments, &rows);
        assert!(rendered.contains("PROD"));
        assert!(rendered.contains("STAGING"));
        assert!(rendered.contains("Deployment"));
        assert!(rendered.contains("svc-b"));
        assert!(rendered.contains("❌ 2.1.0"));
    }
}
