//! The blueprint model: a typed, serde-backed representation of a
//! declarative image description, independent of how it is persisted.

pub mod diff;
pub mod version;

use serde::{Deserialize, Serialize};

use crate::errors::{ComposerError, Result};

/// One entry in a blueprint's `modules` or `packages` list: a name paired
/// with a version glob (e.g. `"4.*"`), or, on a frozen blueprint, the exact
/// matched version-release string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dependency {
    pub name: String,
    pub version: String,
}

/// A declarative description of an image's contents.
///
/// Equality compares every field, including list order: two blueprints are
/// equal iff `modules` and `packages` match element-for-element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Blueprint {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub modules: Vec<Dependency>,
    #[serde(default)]
    pub packages: Vec<Dependency>,
}

impl Blueprint {
    /// Validate the invariants that parsing alone cannot express: a
    /// non-empty name and no duplicate names within `modules` or within
    /// `packages`.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ComposerError::ParseError(
                "blueprint is missing a name".to_string(),
            ));
        }
        Self::check_unique(&self.modules, "modules")?;
        Self::check_unique(&self.packages, "packages")?;
        Ok(())
    }

    fn check_unique(deps: &[Dependency], field: &str) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for dep in deps {
            if !seen.insert(dep.name.as_str()) {
                return Err(ComposerError::ParseError(format!(
                    "duplicate name '{}' in {field}",
                    dep.name
                )));
            }
        }
        Ok(())
    }

    /// Parse a blueprint from TOML bytes. Rejects inputs lacking a `name`
    /// and any unrecognized top-level field.
    pub fn parse_toml(bytes: &[u8]) -> Result<Blueprint> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ComposerError::ParseError(format!("invalid UTF-8: {e}")))?;
        let blueprint: Blueprint =
            toml::from_str(text).map_err(|e| ComposerError::ParseError(e.to_string()))?;
        blueprint.validate()?;
        Ok(blueprint)
    }

    /// Serialize a blueprint to canonical TOML bytes.
    pub fn to_toml(&self) -> Result<Vec<u8>> {
        toml::to_string_pretty(self)
            .map(String::into_bytes)
            .map_err(|e| ComposerError::ParseError(e.to_string()))
    }

    /// Parse a blueprint from a JSON body (used by `POST /blueprints/new`
    /// with `Content-Type: application/json`).
    pub fn parse_json(bytes: &[u8]) -> Result<Blueprint> {
        let blueprint: Blueprint =
            serde_json::from_slice(bytes).map_err(|e| ComposerError::ParseError(e.to_string()))?;
        blueprint.validate()?;
        Ok(blueprint)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ComposerError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Blueprint {
        Blueprint {
            name: "glusterfs".to_string(),
            description: "An example GlusterFS server".to_string(),
            version: Some("0.2.0".to_string()),
            modules: vec![Dependency {
                name: "glusterfs".to_string(),
                version: "4.*".to_string(),
            }],
            packages: vec![Dependency {
                name: "python".to_string(),
                version: "2.7.*".to_string(),
            }],
        }
    }

    #[test]
    fn round_trips_through_toml() {
        let b = sample();
        let bytes = b.to_toml().unwrap();
        let parsed = Blueprint::parse_toml(&bytes).unwrap();
        assert_eq!(b, parsed);
    }

    #[test]
    fn rejects_missing_name() {
        let err = Blueprint::parse_toml(b"description = \"no name\"\n").unwrap_err();
        assert_eq!(err.kind(), "ParseError");
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = Blueprint::parse_toml(b"name = \"x\"\nbogus = 1\n").unwrap_err();
        assert_eq!(err.kind(), "ParseError");
    }

    #[test]
    fn rejects_duplicate_package_names() {
        let toml = br#"
            name = "dup"
            [[packages]]
            name = "bash"
            version = "4.*"
            [[packages]]
            name = "bash"
            version = "5.*"
        "#;
        let err = Blueprint::parse_toml(toml).unwrap_err();
        assert_eq!(err.kind(), "ParseError");
    }

    #[test]
    fn absent_fields_default_to_empty() {
        let b = Blueprint::parse_toml(b"name = \"minimal\"\n").unwrap();
        assert_eq!(b.version, None);
        assert!(b.modules.is_empty());
        assert!(b.packages.is_empty());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn ident() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_-]{0,15}".prop_map(String::from)
    }

    fn version() -> impl Strategy<Value = String> {
        (0u64..50, 0u64..50, 0u64..50).prop_map(|(a, b, c)| format!("{a}.{b}.{c}"))
    }

    fn dependency() -> impl Strategy<Value = Dependency> {
        (ident(), "[a-zA-Z0-9.*]{1,10}").prop_map(|(name, version)| Dependency { name, version })
    }

    fn dependencies() -> impl Strategy<Value = Vec<Dependency>> {
        prop::collection::vec(dependency(), 0..5).prop_map(|mut deps| {
            let mut seen = std::collections::HashSet::new();
            deps.retain(|d| seen.insert(d.name.clone()));
            deps
        })
    }

    fn blueprint() -> impl Strategy<Value = Blueprint> {
        (ident(), ".{0,40}", proptest::option::of(version()), dependencies(), dependencies()).prop_map(
            |(name, description, version, modules, packages)| Blueprint {
                name,
                description,
                version,
                modules,
                packages,
            },
        )
    }

    proptest! {
        #[test]
        fn toml_round_trip(b in blueprint()) {
            let bytes = b.to_toml().unwrap();
            let parsed = Blueprint::parse_toml(&bytes).unwrap();
            prop_assert_eq!(parsed, b);
        }

        #[test]
        fn json_round_trip(b in blueprint()) {
            let bytes = b.to_json().unwrap();
            let parsed = Blueprint::parse_json(&bytes).unwrap();
            prop_assert_eq!(parsed, b);
        }

        #[test]
        fn diff_of_self_is_always_empty(b in blueprint()) {
            prop_assert!(diff::diff(&b, &b).is_empty());
        }
    }
}
