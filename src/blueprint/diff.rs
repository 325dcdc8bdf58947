//! Structured blueprint diff: scalar fields compared as whole values,
//! `modules`/`packages` compared as sets keyed by name.

use serde::Serialize;
use serde_json::json;

use super::{Blueprint, Dependency};

/// One changed field or dependency entry. `old`/`new` are `None` when the
/// entry represents a pure addition or removal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    pub old: Option<serde_json::Value>,
    pub new: Option<serde_json::Value>,
}

/// Compare two blueprints, in declaration order: scalar fields (`Name`,
/// `Description`, `Version`) first, then `modules`, then `packages`. Within
/// a dependency category, entries are ordered added, removed, changed, each
/// sorted by name. `diff(b, b)` is always `[]`.
pub fn diff(old: &Blueprint, new: &Blueprint) -> Vec<DiffEntry> {
    let mut entries = Vec::new();

    push_scalar(&mut entries, "Name", &old.name, &new.name);
    push_scalar(&mut entries, "Description", &old.description, &new.description);
    push_scalar_opt(&mut entries, "Version", old.version.as_deref(), new.version.as_deref());

    entries.extend(diff_dependencies("Modules", &old.modules, &new.modules));
    entries.extend(diff_dependencies("Packages", &old.packages, &new.packages));

    entries
}

fn push_scalar(entries: &mut Vec<DiffEntry>, field: &str, old: &str, new: &str) {
    if old != new {
        entries.push(DiffEntry {
            old: Some(json!({ field: old })),
            new: Some(json!({ field: new })),
        });
    }
}

fn push_scalar_opt(entries: &mut Vec<DiffEntry>, field: &str, old: Option<&str>, new: Option<&str>) {
    if old != new {
        entries.push(DiffEntry {
            old: old.map(|v| json!({ field: v })),
            new: new.map(|v| json!({ field: v })),
        });
    }
}

fn diff_dependencies(field: &str, old: &[Dependency], new: &[Dependency]) -> Vec<DiffEntry> {
    let old_map: std::collections::BTreeMap<&str, &str> =
        old.iter().map(|d| (d.name.as_str(), d.version.as_str())).collect();
    let new_map: std::collections::BTreeMap<&str, &str> =
        new.iter().map(|d| (d.name.as_str(), d.version.as_str())).collect();

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut changed = Vec::new();

    let mut names: Vec<&str> = old_map.keys().chain(new_map.keys()).copied().collect();
    names.sort_unstable();
    names.dedup();

    for name in names {
        match (old_map.get(name), new_map.get(name)) {
            (None, Some(new_version)) => added.push(DiffEntry {
                old: None,
                new: Some(json!({ field: { "name": name, "version": new_version } })),
            }),
            (Some(old_version), None) => removed.push(DiffEntry {
                old: Some(json!({ field: { "name": name, "version": old_version } })),
                new: None,
            }),
            (Some(old_version), Some(new_version)) if old_version != new_version => {
                changed.push(DiffEntry {
                    old: Some(json!({ field: { "name": name, "version": old_version } })),
                    new: Some(json!({ field: { "name": name, "version": new_version } })),
                })
            }
            _ => {}
        }
    }

    added.into_iter().chain(removed).chain(changed).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::Blueprint;

    fn bp(version: &str) -> Blueprint {
        Blueprint {
            name: "glusterfs".to_string(),
            description: "d".to_string(),
            version: Some(version.to_string()),
            modules: vec![],
            packages: vec![],
        }
    }

    #[test]
    fn diff_of_identical_blueprints_is_empty() {
        let b = bp("0.0.1");
        assert!(diff(&b, &b).is_empty());
    }

    #[test]
    fn version_change_scenario() {
        let old = bp("0.0.1");
        let new = bp("0.2.1");
        let entries = diff(&old, &new);
        assert_eq!(
            entries,
            vec![DiffEntry {
                old: Some(json!({"Version": "0.0.1"})),
                new: Some(json!({"Version": "0.2.1"})),
            }]
        );
    }

    #[test]
    fn module_added_removed_changed() {
        let old = Blueprint {
            name: "n".to_string(),
            description: "d".to_string(),
            version: None,
            modules: vec![
                Dependency { name: "toml".to_string(), version: "2.1".to_string() },
                Dependency { name: "bash".to_string(), version: "4.*".to_string() },
                Dependency { name: "httpd".to_string(), version: "3.7.*".to_string() },
            ],
            packages: vec![],
        };
        let new = Blueprint {
            name: "n".to_string(),
            description: "d".to_string(),
            version: None,
            modules: vec![
                Dependency { name: "toml".to_string(), version: "2.1".to_string() },
                Dependency { name: "httpd".to_string(), version: "3.8.*".to_string() },
                Dependency { name: "openssh".to_string(), version: "2.8.1".to_string() },
            ],
            packages: vec![],
        };

        let entries = diff(&old, &new);
        assert_eq!(
            entries,
            vec![
                DiffEntry {
                    old: None,
                    new: Some(json!({"Modules": {"name": "openssh", "version": "2.8.1"}})),
                },
                DiffEntry {
                    old: Some(json!({"Modules": {"name": "bash", "version": "4.*"}})),
                    new: None,
                },
                DiffEntry {
                    old: Some(json!({"Modules": {"name": "httpd", "version": "3.7.*"}})),
                    new: Some(json!({"Modules": {"name": "httpd", "version": "3.8.*"}})),
                },
            ]
        );
    }
}
