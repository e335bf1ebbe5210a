use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::UNVERSIONED;

static ARTIFACT_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r".+:(\d+\.\d+\.\d+(?:-[0-9A-Za-z][0-9A-Za-z.\-]*)?)")
        .expect("artifact version pattern is valid")
});

/// Pulls the semantic version out of an artifact reference such as
/// `registry/app:1.4.2-SNAPSHOT-20240101`, or returns `N/A`.
pub fn extract_version(reference: &str) -> String {
    ARTIFACT_VERSION
        .captures(reference)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNVERSIONED.to_string())
}
