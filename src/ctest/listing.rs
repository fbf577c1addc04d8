//! Model of `ctest --show-only=json-v1` output.
//!
//! Only the fields the orchestrator consumes are modelled; everything else in
//! the document (`backtraceGraph`, `installers`, ...) is ignored.

use serde::{Deserialize, Serialize};

/// Top-level `json-v1` document.
#[derive(Debug, Clone, Deserialize)]
pub struct CtestListing {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub tests: Vec<CtestEntry>,
}

/// One test in the listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CtestEntry {
    pub name: String,
    /// Absent for tests whose executable was not built.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub properties: Vec<CtestProperty>,
}

/// A `{ "name": ..., "value": ... }` test property.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CtestProperty {
    pub name: String,
    pub value: serde_json::Value,
}

impl CtestListing {
    /// Parses a listing from raw query output.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl CtestEntry {
    fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// Values of the `LABELS` property.
    pub fn labels(&self) -> Vec<String> {
        match self.property("LABELS") {
            Some(serde_json::Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Value of the `WORKING_DIRECTORY` property.
    pub fn working_directory(&self) -> Option<String> {
        self.property("WORKING_DIRECTORY")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"{
        "kind": "ctestInfo",
        "version": { "major": 1, "minor": 0 },
        "backtraceGraph": { "commands": [], "files": [], "nodes": [] },
        "tests": [
            {
                "backtrace": 1,
                "command": ["/__w/repo/repo/build/unittests/unit_test", "--run_test=auth"],
                "name": "auth_unit_test",
                "properties": [
                    { "name": "LABELS", "value": ["nonparallelizable_tests", "wasm"] },
                    { "name": "WORKING_DIRECTORY", "value": "/__w/repo/repo/build/unittests" }
                ]
            },
            {
                "name": "not_built",
                "properties": [ { "name": "LABELS", "value": "wasm" } ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_listing() {
        let listing = CtestListing::parse(LISTING).unwrap();
        assert_eq!(listing.kind.as_deref(), Some("ctestInfo"));
        assert_eq!(listing.tests.len(), 2);

        let first = &listing.tests[0];
        assert_eq!(first.name, "auth_unit_test");
        assert_eq!(first.command.len(), 2);
        assert_eq!(first.labels(), vec!["nonparallelizable_tests", "wasm"]);
        assert_eq!(
            first.working_directory().as_deref(),
            Some("/__w/repo/repo/build/unittests")
        );

        let second = &listing.tests[1];
        assert!(second.command.is_empty());
        assert_eq!(second.labels(), vec!["wasm"]);
        assert!(second.working_directory().is_none());
    }

    #[test]
    fn test_listing_without_tests() {
        let listing = CtestListing::parse(r#"{"kind":"ctestInfo"}"#).unwrap();
        assert!(listing.tests.is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CtestListing::parse("Test project /build\nNo tests were found").is_err());
    }
}
