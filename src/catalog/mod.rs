//! The package catalog (C3): a lock-serialized, read-through facade over a
//! package-manager backend.
//!
//! The production backend that talks to a real package manager is an
//! external collaborator and out of scope for this project (see
//! SPEC_FULL.md §1/§4.3); [`FixtureBackend`] is the one concrete backend
//! shipped here, reading a small repository manifest from disk so the
//! catalog, handlers, and depsolve logic are fully exercised without a live
//! DNF/yum install.

pub mod fixture;

use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ComposerError, Result};

/// One buildable RPM's exact identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Nevra {
    pub name: String,
    #[serde(default)]
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
}

impl Nevra {
    /// `name-[epoch:]version-release.arch`, epoch omitted when zero.
    pub fn render(&self) -> String {
        if self.epoch == 0 {
            format!("{}-{}-{}.{}", self.name, self.version, self.release, self.arch)
        } else {
            format!(
                "{}-{}:{}-{}.{}",
                self.name, self.epoch, self.version, self.release, self.arch
            )
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub name: String,
    pub summary: String,
    pub description: String,
    pub homepage: String,
    pub upstream_vcs: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
    /// `YYYY-MM-DDTHH:MM:SS`, rendered from Unix epoch seconds in UTC.
    pub build_time: String,
    /// The first changelog entry's text, or empty if there is none.
    pub changelog: String,
    pub license: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectInfo {
    #[serde(flatten)]
    pub project: Project,
    pub builds: Vec<BuildInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Module {
    pub name: String,
    pub group_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleInfo {
    #[serde(flatten)]
    pub module: Module,
    pub dependencies: Vec<String>,
}

/// One fixture record: a project plus its builds and direct requirements.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRecord {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default = "default_vcs")]
    pub upstream_vcs: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub builds: Vec<FixtureBuild>,
    #[serde(default)]
    pub requires: Vec<String>,
}

fn default_vcs() -> String {
    "UPSTREAM_VCS".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureBuild {
    #[serde(default)]
    pub epoch: u32,
    pub version: String,
    pub release: String,
    #[serde(default = "default_arch")]
    pub arch: String,
    pub build_time: i64,
    #[serde(default)]
    pub changelog: Vec<(i64, String, String)>,
}

fn default_arch() -> String {
    "x86_64".to_string()
}

/// A backend capable of answering catalog queries. The real implementation
/// talks to a package manager; [`FixtureBackend`] reads static TOML records.
pub trait CatalogBackend: Send {
    fn records(&self) -> Result<Vec<CatalogRecord>>;
}

/// Lock-serialized facade over a [`CatalogBackend`].
pub struct PackageCatalog {
    backend: Mutex<Box<dyn CatalogBackend>>,
}

impl PackageCatalog {
    pub fn new(backend: Box<dyn CatalogBackend>) -> PackageCatalog {
        PackageCatalog {
            backend: Mutex::new(backend),
        }
    }

    fn records(&self) -> Result<Vec<CatalogRecord>> {
        let backend = self.backend.lock().unwrap();
        backend.records()
    }

    pub fn projects_list(&self) -> Result<Vec<Project>> {
        let mut projects: Vec<Project> = self
            .records()?
            .into_iter()
            .map(|r| Project {
                name: r.name,
                summary: r.summary,
                description: r.description,
                homepage: r.homepage,
                upstream_vcs: r.upstream_vcs,
            })
            .collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    pub fn projects_info(&self, names: &[String]) -> Result<Vec<ProjectInfo>> {
        let records = self.records()?;
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let record = records
                .iter()
                .find(|r| &r.name == name)
                .ok_or_else(|| ComposerError::CatalogError(format!("unknown project '{name}'")))?;
            out.push(ProjectInfo {
                project: Project {
                    name: record.name.clone(),
                    summary: record.summary.clone(),
                    description: record.description.clone(),
                    homepage: record.homepage.clone(),
                    upstream_vcs: record.upstream_vcs.clone(),
                },
                builds: record.builds.iter().map(|b| render_build(b, &record.license)).collect(),
            });
        }
        out.sort_by(|a, b| a.project.name.cmp(&b.project.name));
        Ok(out)
    }

    pub fn modules_list(&self, globs: &[String]) -> Result<Vec<Module>> {
        let patterns: Result<Vec<glob::Pattern>> = globs
            .iter()
            .map(|g| glob::Pattern::new(g).map_err(|e| ComposerError::CatalogError(e.to_string())))
            .collect();
        let patterns = patterns?;

        let mut modules: Vec<Module> = self
            .records()?
            .into_iter()
            .filter(|r| patterns.is_empty() || patterns.iter().any(|p| p.matches(&r.name)))
            .map(|r| Module {
                name: r.name,
                group_type: "rpm".to_string(),
            })
            .collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(modules)
    }

    pub fn modules_info(&self, names: &[String]) -> Result<Vec<ModuleInfo>> {
        let records = self.records()?;
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            records
                .iter()
                .find(|r| &r.name == name)
                .ok_or_else(|| ComposerError::CatalogError(format!("unknown module '{name}'")))?;
            let deps = transitive_deps(&records, std::slice::from_ref(name))?;
            out.push(ModuleInfo {
                module: Module {
                    name: name.clone(),
                    group_type: "rpm".to_string(),
                },
                dependencies: deps.into_iter().map(|d| d.render()).collect(),
            });
        }
        out.sort_by(|a, b| a.module.name.cmp(&b.module.name));
        Ok(out)
    }

    /// Flat, deduped dependency closure for `names`, stably ordered by name.
    pub fn depsolve(&self, names: &[String]) -> Result<Vec<Nevra>> {
        let records = self.records()?;
        transitive_deps(&records, names)
    }
}

fn render_build(build: &FixtureBuild, license: &str) -> BuildInfo {
    let build_time = Utc
        .timestamp_opt(build.build_time, 0)
        .single()
        .map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_default();
    let changelog = build
        .changelog
        .first()
        .map(|(_, _, text)| text.clone())
        .unwrap_or_default();
    BuildInfo {
        epoch: build.epoch,
        version: build.version.clone(),
        release: build.release.clone(),
        arch: build.arch.clone(),
        build_time,
        changelog,
        license: license.to_string(),
    }
}

fn transitive_deps(records: &[CatalogRecord], names: &[String]) -> Result<Vec<Nevra>> {
    let mut seen = std::collections::HashSet::new();
    let mut queue: Vec<String> = names.to_vec();
    let mut resolved = Vec::new();

    while let Some(name) = queue.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        let record = records
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| ComposerError::CatalogError(format!("unknown project '{name}'")))?;
        let Some(build) = record.builds.first() else {
            continue;
        };
        resolved.push(Nevra {
            name: record.name.clone(),
            epoch: build.epoch,
            version: build.version.clone(),
            release: build.release.clone(),
            arch: build.arch.clone(),
        });
        queue.extend(record.requires.iter().cloned());
    }

    resolved.sort();
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixture::FixtureBackend;

    fn catalog() -> PackageCatalog {
        PackageCatalog::new(Box::new(FixtureBackend::in_memory(vec![
            CatalogRecord {
                name: "bash".to_string(),
                summary: "shell".to_string(),
                description: "d".to_string(),
                homepage: "h".to_string(),
                upstream_vcs: default_vcs(),
                license: "GPLv3+".to_string(),
                builds: vec![FixtureBuild {
                    epoch: 0,
                    version: "4.4.12".to_string(),
                    release: "5.fc26".to_string(),
                    arch: "x86_64".to_string(),
                    build_time: 1_508_765_606,
                    changelog: vec![(1_507_641_600, "a@b.com".to_string(), "- change".to_string())],
                }],
                requires: vec!["glibc".to_string()],
            },
            CatalogRecord {
                name: "glibc".to_string(),
                summary: "libc".to_string(),
                description: "d".to_string(),
                homepage: "h".to_string(),
                upstream_vcs: default_vcs(),
                license: "LGPLv2+".to_string(),
                builds: vec![FixtureBuild {
                    epoch: 0,
                    version: "2.26".to_string(),
                    release: "1.fc26".to_string(),
                    arch: "x86_64".to_string(),
                    build_time: 1_508_765_606,
                    changelog: vec![],
                }],
                requires: vec![],
            },
        ])))
    }

    #[test]
    fn nevra_renders_epoch_only_when_nonzero() {
        let n = Nevra {
            name: "bash".to_string(),
            epoch: 0,
            version: "4.4".to_string(),
            release: "1".to_string(),
            arch: "x86_64".to_string(),
        };
        assert_eq!(n.render(), "bash-4.4-1.x86_64");
        let n2 = Nevra { epoch: 2, ..n };
        assert_eq!(n2.render(), "bash-2:4.4-1.x86_64");
    }

    #[test]
    fn projects_info_formats_time_and_changelog() {
        let info = catalog().projects_info(&["bash".to_string()]).unwrap();
        assert_eq!(info[0].builds[0].build_time, "2017-10-23T12:33:26");
        assert_eq!(info[0].builds[0].changelog, "- change");
        assert_eq!(info[0].builds[0].license, "GPLv3+");
    }

    #[test]
    fn depsolve_is_flat_deduped_and_name_ordered() {
        let deps = catalog().depsolve(&["bash".to_string()]).unwrap();
        let names: Vec<&str> = deps.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["bash", "glibc"]);
    }

    #[test]
    fn missing_project_in_info_is_a_catalog_error_not_partial() {
        let err = catalog().projects_info(&["nope".to_string()]).unwrap_err();
        assert_eq!(err.kind(), "CatalogError");
    }

    #[test]
    fn modules_list_filters_by_glob() {
        let modules = catalog().modules_list(&["ba*".to_string()]).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "bash");
        assert_eq!(modules[0].group_type, "rpm");
    }
}
